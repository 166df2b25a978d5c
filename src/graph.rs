//! `Graph`: the user-facing composition algebra over nodes.
//!
//! Grounded on `original_source/.../engine.py`'s `Graph`/`GraphImpl` usage
//! (`GraphImpl(engine=self) & graph`, `self._graph |= graph`) and the
//! `AbsNonterminalNode`/`AbsTrieNonterminalNode` merge/copy machinery in
//! `std.py`/`trie.py` that backs those operators.
//!
//! Every `Graph` wraps exactly one nonterminal root — even a graph with a
//! single registered handler is, structurally, an `IdentityNode` (or
//! whatever nonterminal the caller started from) with that handler attached
//! as a terminal successor. A fresh, uncomposed `Graph` starts from an
//! `IdentityNode`, which behaves as a no-op until something is attached to
//! it.

use crate::error::{Result, RouteError, RouteOutcome};
use crate::handler::Handler;
use crate::node::{IdentityNode, NodeMap, NodeRef, Nonterminal, Priority, TerminalNode};
use crate::state::RouteState;
use std::sync::Arc;
use tracing::instrument;

#[derive(Clone)]
pub struct Graph {
    root: NodeRef,
    /// Set once a terminal has been applied along every open edge. A closed
    /// graph can still be unioned (`|`) or copied, but never extended with
    /// `&` — matches `engine.py`'s `GraphImpl.__call__` raising once the
    /// graph it wraps is closed.
    closed: bool,
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            root: NodeRef::Nonterminal(IdentityNode::new()),
            closed: false,
        }
    }

    pub fn from_root(root: Arc<dyn Nonterminal>) -> Self {
        Graph {
            root: NodeRef::Nonterminal(root),
            closed: false,
        }
    }

    pub fn root(&self) -> NodeRef {
        self.root.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Sequential-then: splice `next`'s root onto every open edge of this
    /// graph's root.
    pub fn then(self, next: Graph) -> Result<Graph> {
        if self.closed {
            return Err(RouteError::ClosedGraphCompose("&"));
        }
        match &self.root {
            NodeRef::Nonterminal(n) => n.attach_tail(next.root.clone())?,
            NodeRef::Terminal(_) => return Err(RouteError::ClosedGraphCompose("&")),
        }
        Ok(Graph {
            root: self.root,
            closed: next.closed,
        })
    }

    /// Union: a new graph that routes into both `self` and `other`
    /// unconditionally. Used both for user-level `a | b` composition and,
    /// by `Engine::subscribe`, to fold a newly subscribed closed graph into
    /// the engine's running union of everything it has ever been given.
    pub fn union(self, other: Graph) -> Result<Graph> {
        let joined = IdentityNode::new();
        joined.add_successor(self.root)?;
        joined.add_successor(other.root)?;
        Ok(Graph {
            root: NodeRef::Nonterminal(joined),
            closed: self.closed || other.closed,
        })
    }

    /// Apply a handler as a terminal along every open edge of this graph's
    /// root, closing the graph. Returns the graph and a handle to the new
    /// terminal (needed by `Engine::unsubscribe_terminals`).
    pub fn apply(self, handler: Handler) -> Result<(Graph, Arc<TerminalNode>)> {
        self.apply_with(TerminalNode::new(handler))
    }

    pub fn apply_with_priority(self, handler: Handler, priority: Priority) -> Result<(Graph, Arc<TerminalNode>)> {
        self.apply_with(TerminalNode::new(handler).with_priority(priority))
    }

    fn apply_with(self, terminal: TerminalNode) -> Result<(Graph, Arc<TerminalNode>)> {
        if self.closed {
            return Err(RouteError::ClosedGraphCompose("apply"));
        }
        let terminal = Arc::new(terminal);
        match &self.root {
            NodeRef::Nonterminal(n) => n.attach_tail(NodeRef::Terminal(terminal.clone()))?,
            NodeRef::Terminal(_) => return Err(RouteError::ClosedGraphCompose("apply")),
        }
        Ok((
            Graph {
                root: self.root,
                closed: true,
            },
            terminal,
        ))
    }

    /// Deep-copy this graph, preserving shared substructure (a node
    /// reachable via two paths copies to one shared instance, not two).
    pub fn copy(&self) -> Graph {
        let mut node_map = NodeMap::new();
        Graph {
            root: self.root.copy(&mut node_map),
            closed: self.closed,
        }
    }

    /// Deactivate a previously applied terminal so it is no longer matched,
    /// and unwire it from every nonterminal's successor table reachable from
    /// this graph's root, matching `std.py`'s `remove_successor` cleanup.
    pub fn remove_terminal(&self, terminal: &Arc<TerminalNode>) {
        terminal.deactivate();
        crate::node::prune_terminal(&self.root, terminal.id());
    }

    /// Count the distinct nodes reachable from this graph's root, counting a
    /// node shared across several paths once. Diagnostic only — see
    /// [`crate::visualization`] for a full structural dump.
    pub fn node_count(&self) -> usize {
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![self.root.clone()];
        while let Some(node) = stack.pop() {
            if !seen.insert(node.id()) {
                continue;
            }
            if let NodeRef::Nonterminal(n) = &node {
                for (_, successors) in n.successors_snapshot() {
                    stack.extend(successors);
                }
            }
        }
        seen.len()
    }

    /// Traverse the graph and return every reached outcome, deduplicating
    /// terminal matches discovered via more than one path — `route_result`
    /// equality is by terminal identity alone, matching `RouteResult`'s
    /// Python counterpart, so the same handler reached twice through a
    /// diamond in the DAG still only runs once.
    #[instrument(skip(self, state), fields(root = ?self.root.id()))]
    pub(crate) async fn route(&self, state: &Arc<RouteState>) -> Result<Vec<RouteOutcome>> {
        let raw = match &self.root {
            NodeRef::Nonterminal(n) => n.route(state).await?,
            NodeRef::Terminal(t) => vec![RouteOutcome::Matched(state.wrap(t.clone()))],
        };
        Ok(crate::error::union_outcomes(std::iter::once(raw)))
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("root", &self.root.id())
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use crate::value::value;

    #[test]
    fn fresh_graph_is_open() {
        let g = Graph::new();
        assert!(!g.is_closed());
    }

    #[test]
    fn apply_closes_the_graph() {
        let g = Graph::new();
        let (g, _terminal) = g
            .apply(Handler::new(|_params| async { value(()) }))
            .expect("apply on a fresh graph must succeed");
        assert!(g.is_closed());
    }

    #[test]
    fn applying_twice_to_a_closed_graph_fails() {
        let g = Graph::new();
        let (g, _t) = g.apply(Handler::new(|_params| async { value(()) })).unwrap();
        let err = g.apply(Handler::new(|_params| async { value(()) })).unwrap_err();
        assert!(matches!(err, RouteError::ClosedGraphCompose(_)));
    }

    #[test]
    fn node_count_collapses_shared_successors() {
        let g = Graph::new();
        let (g, _terminal) = g.apply(Handler::new(|_params| async { value(()) })).unwrap();
        // IdentityNode root + one terminal.
        assert_eq!(g.node_count(), 2);
    }
}
