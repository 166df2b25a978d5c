//! The node model: terminal handler leaves, nonterminal decision nodes, and
//! the shared plumbing (identity, predecessor tracking, copy-with-sharing,
//! merge-union) every nonterternal kind builds on.
//!
//! Grounded on `original_source/.../std.py`'s `AbsNonterminalNode` (the
//! common `_successors` table, `add_key`/`_add_successor`/`__ior__`/`copy`
//! logic shared by `PredicateNode`, `EqualNode`, `ProcessorNode`) and
//! `original_source/.../trie.py`'s parallel `AbsTrieNonterminalNode`.

pub mod equal;
pub mod identity;
pub mod predicate;
pub mod prefix;
pub mod processor;
pub mod terminal;

pub use equal::EqualNode;
pub use identity::IdentityNode;
pub use predicate::PredicateNode;
pub use prefix::PrefixNode;
pub use processor::ProcessorNode;
pub use terminal::{Priority, TerminalNode};

use crate::error::{Result, RouteError, RouteOutcome};
use crate::keyfunc::KeyFunctionId;
use crate::state::RouteState;
use crate::value::DispatchKey;
use async_trait::async_trait;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Structural identity of a node. Stable for the lifetime of one node
/// instance; a fresh id is minted on every construction, including each
/// node produced by `copy()` — mirroring Python's default `id(self)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// What decides whether two nonterminals merge during `|=`.
///
/// `Instance` nodes (`PredicateNode`, `ProcessorNode`, `IdentityNode`) only
/// merge with themselves — two nodes built independently never unify, even
/// if structurally identical, so subscribing the same closed graph twice is
/// idempotent (same node instances) while subscribing two separately-built
/// but similar graphs is not silently collapsed. `Keyed` nodes (`EqualNode`,
/// `PrefixNode`) merge with any other node sharing the same key-function
/// identity, regardless of instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MergeKey {
    Instance(NodeId),
    Keyed(&'static str, KeyFunctionId),
}

/// The edge-key space unified across all nonterminal kinds, so a single
/// predecessor set and a single generic [`SuccessorTable`] can serve all of
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeKey {
    KeyFn(KeyFunctionId),
    Value(DispatchKey),
    Prefix(String),
    Unit,
}

/// Fields every node (terminal or nonterminal) carries: its identity and
/// the set of `(parent, edge-key)` pairs it is reachable from.
pub struct NodeCore {
    id: NodeId,
    predecessors: Mutex<HashSet<(NodeId, EdgeKey)>>,
}

impl NodeCore {
    pub fn new() -> Self {
        NodeCore {
            id: NodeId::fresh(),
            predecessors: Mutex::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn add_predecessor(&self, parent: NodeId, edge: EdgeKey) {
        self.predecessors.lock().unwrap().insert((parent, edge));
    }

    pub fn predecessors(&self) -> HashSet<(NodeId, EdgeKey)> {
        self.predecessors.lock().unwrap().clone()
    }
}

impl Default for NodeCore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeCore({:?})", self.id)
    }
}

/// A reference to either kind of node, as stored in a successor set.
#[derive(Clone)]
pub enum NodeRef {
    Terminal(Arc<TerminalNode>),
    Nonterminal(Arc<dyn Nonterminal>),
}

impl NodeRef {
    pub fn id(&self) -> NodeId {
        match self {
            NodeRef::Terminal(t) => t.id(),
            NodeRef::Nonterminal(n) => n.id(),
        }
    }

    pub(crate) fn add_predecessor(&self, parent: NodeId, edge: EdgeKey) {
        match self {
            NodeRef::Terminal(t) => t.core().add_predecessor(parent, edge),
            NodeRef::Nonterminal(n) => n.core().add_predecessor(parent, edge),
        }
    }

    pub(crate) fn copy(&self, node_map: &mut NodeMap) -> NodeRef {
        if let Some(existing) = node_map.get(self.id()) {
            return existing;
        }
        match self {
            NodeRef::Terminal(t) => {
                let copied = NodeRef::Terminal(Arc::new(t.copy()));
                node_map.insert(self.id(), copied.clone());
                copied
            }
            NodeRef::Nonterminal(n) => n.copy(node_map),
        }
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Terminal(t) => write!(f, "{:?}", t),
            NodeRef::Nonterminal(n) => write!(f, "{:?}", n),
        }
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
impl Eq for NodeRef {}
impl std::hash::Hash for NodeRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state)
    }
}

/// old-id → new-node map threaded through a single `copy()` call, so a
/// node reachable via several paths copies to one shared instance instead
/// of being expanded into a tree.
#[derive(Default)]
pub struct NodeMap {
    map: HashMap<NodeId, NodeRef>,
}

impl NodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<NodeRef> {
        self.map.get(&id).cloned()
    }

    pub fn insert(&mut self, id: NodeId, node: NodeRef) {
        self.map.insert(id, node);
    }
}

/// The nonterminal node trait: every concrete decision-node kind
/// (`Predicate`, `Equal`, `Processor`, `Identity`, `Prefix`) implements
/// this. `route` is the public entry point (it manages the traversal's
/// scope stack); `route_inner` is each kind's actual dispatch logic —
/// the `_route` split mirrors the abstract-base/override shape of
/// `original_source/.../std.py`'s `AbsNonterminalNode`.
#[async_trait]
pub trait Nonterminal: Send + Sync + fmt::Debug {
    fn core(&self) -> &NodeCore;
    fn merge_key(&self) -> MergeKey;
    fn is_empty(&self) -> bool;
    fn kind_name(&self) -> &'static str;
    fn successors_snapshot(&self) -> Vec<(EdgeKey, Vec<NodeRef>)>;
    fn copy(&self, node_map: &mut NodeMap) -> NodeRef;
    fn merge_from(&self, other: &dyn Nonterminal) -> Result<()>;
    fn as_any(&self) -> &dyn Any;
    /// The node's own successor table, exposed so `&` (sequential-then)
    /// composition can splice a continuation onto every currently-open
    /// edge without each concrete kind re-implementing the splice.
    fn raw_table(&self) -> &SuccessorTable;

    fn id(&self) -> NodeId {
        self.core().id()
    }

    /// Attach `node` as a successor under every edge key this node already
    /// has registered (merging into any existing same-key successor in
    /// place). This is the mechanism behind `Graph`'s `&` operator: an
    /// "open" nonterminal (one whose edges don't yet lead anywhere) gets a
    /// continuation spliced onto all of them at once.
    fn attach_tail(&self, node: NodeRef) -> Result<()> {
        self.raw_table().add_successor_all_keys(node, self.id())
    }

    async fn route_inner(&self, state: &Arc<RouteState>) -> Result<Vec<RouteOutcome>>;

    /// Public routing entry point: pushes a fresh scope, delegates to
    /// `route_inner`, pops the scope. Bindings written by this node (or its
    /// descendants) during the call are visible to the call but discarded
    /// once it returns, so sibling branches explored afterwards don't see
    /// them — only ancestors' scopes remain on the stack.
    async fn route(&self, state: &Arc<RouteState>) -> Result<Vec<RouteOutcome>> {
        state.enter();
        let result = self.route_inner(state).await;
        state.exit();
        result
    }
}

/// Route into a successor that may be a terminal (immediate match) or a
/// nonterminal (recurse).
pub(crate) async fn route_successor(succ: &NodeRef, state: &Arc<RouteState>) -> Result<Vec<RouteOutcome>> {
    match succ {
        NodeRef::Terminal(t) if t.is_active() => Ok(vec![RouteOutcome::Matched(state.wrap(t.clone()))]),
        NodeRef::Terminal(_) => Ok(Vec::new()),
        NodeRef::Nonterminal(n) => n.route(state).await,
    }
}

/// Shared `(edge-key → successor set)` storage used by `PredicateNode`,
/// `EqualNode`, `ProcessorNode`, and `IdentityNode`. `PrefixNode` has its
/// own trie-backed table instead, since its lookup is "all registered keys
/// that are a prefix of the query" rather than exact match.
#[derive(Default)]
pub(crate) struct SuccessorTable {
    table: Mutex<HashMap<EdgeKey, HashSet<NodeRef>>>,
}

impl SuccessorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_key(&self, key: EdgeKey) {
        self.table.lock().unwrap().entry(key).or_default();
    }

    pub fn add_successor_under_key(&self, key: EdgeKey, node: NodeRef, owner: NodeId) -> Result<()> {
        let merged_into_existing = {
            let mut table = self.table.lock().unwrap();
            let set = table.entry(key.clone()).or_default();
            if let NodeRef::Nonterminal(new_n) = &node {
                let existing = set.iter().find_map(|existing| match existing {
                    NodeRef::Nonterminal(existing_n) if existing_n.merge_key() == new_n.merge_key() => {
                        Some(existing_n.clone())
                    }
                    _ => None,
                });
                if let Some(existing_n) = existing {
                    Some(existing_n)
                } else {
                    set.insert(node.clone());
                    None
                }
            } else {
                set.insert(node.clone());
                None
            }
        };

        if let Some(existing_n) = merged_into_existing {
            existing_n.merge_from(node_as_nonterminal(&node))?;
        }
        node.add_predecessor(owner, key);
        Ok(())
    }

    pub fn add_successor_all_keys(&self, node: NodeRef, owner: NodeId) -> Result<()> {
        let keys: Vec<EdgeKey> = self.table.lock().unwrap().keys().cloned().collect();
        for key in keys {
            self.add_successor_under_key(key, node.clone(), owner)?;
        }
        Ok(())
    }

    /// Drop `node_id` from every edge it's registered under, deleting any
    /// edge whose successor set becomes empty as a result. Mirrors
    /// `std.py`'s `AbsNonterminalNode.remove_successor`'s `del
    /// self._successors[key]` for keys left with nothing reachable through
    /// them — as opposed to `add_key`'s empty-but-present edges, which stay
    /// open for a future successor to be attached.
    pub fn remove_successor(&self, node_id: NodeId) {
        let mut table = self.table.lock().unwrap();
        let mut drained = Vec::new();
        for (key, set) in table.iter_mut() {
            set.retain(|n| n.id() != node_id);
            if set.is_empty() {
                drained.push(key.clone());
            }
        }
        for key in drained {
            table.remove(&key);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().unwrap().values().all(HashSet::is_empty)
    }

    pub fn snapshot(&self) -> Vec<(EdgeKey, Vec<NodeRef>)> {
        self.table
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
            .collect()
    }

    pub fn merge_union(&self, other: &SuccessorTable, owner: NodeId) -> Result<()> {
        for (key, nodes) in other.snapshot() {
            if nodes.is_empty() {
                self.add_key(key);
                continue;
            }
            for node in nodes {
                self.add_successor_under_key(key.clone(), node, owner)?;
            }
        }
        Ok(())
    }
}

/// Walk every nonterminal reachable from `root` and drop `terminal_id` from
/// each one's own successor table, structurally unwiring a removed terminal
/// instead of leaving dead edges behind for `deactivate` alone to mask.
pub(crate) fn prune_terminal(root: &NodeRef, terminal_id: NodeId) {
    let mut seen = HashSet::new();
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        if !seen.insert(node.id()) {
            continue;
        }
        if let NodeRef::Nonterminal(n) = &node {
            n.raw_table().remove_successor(terminal_id);
            for (_, successors) in n.successors_snapshot() {
                stack.extend(successors);
            }
        }
    }
}

fn node_as_nonterminal(node: &NodeRef) -> &dyn Nonterminal {
    match node {
        NodeRef::Nonterminal(n) => n.as_ref(),
        NodeRef::Terminal(_) => unreachable!("terminals never carry a merge_key"),
    }
}

pub(crate) fn merge_kind_mismatch(expected: &'static str, found: &'static str) -> RouteError {
    RouteError::MergeKindMismatch { expected, found }
}
