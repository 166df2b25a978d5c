//! `Engine`: the public facade tying graph construction, subscription, and
//! dispatch together.
//!
//! Grounded on `original_source/.../engine.py`'s `Engine` class: `on`,
//! `subscribe`, `unsubscribe_terminals`, `forward`, and the
//! accumulate-then-compile-on-dirty structure that isolates an in-flight
//! traversal from a concurrent `subscribe`/`unsubscribe`/`clear`. `engine.py`
//! holds a live graph `G`, a `dirty` flag, and a compiled copy `G'` that
//! `forward` rebuilds (`G' = G.copy()`) whenever `G` has changed since the
//! last compile; every `forward` call routes against its own handle to `G'`,
//! so mutating `G` mid-traversal can never change what that traversal sees.

use crate::error::{Result, RouteError, RouteOutcome};
use crate::graph::Graph;
use crate::handler::Handler;
use crate::executor::{PriorityExecutor, Task};
use crate::node::{IdentityNode, NodeRef, Nonterminal, Priority, TerminalNode};
use crate::state::RouteState;
use crate::store::KeyStore;
use crate::value::{value, DynValue};
use async_stream::stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_stream::{Stream, StreamExt};
use tracing::instrument;

/// One item produced by [`Engine::forward`]: either a routing-layer signal
/// raised along the way, or the result of invoking one matched handler.
/// Signals are always yielded before any handler runs, matching
/// `engine.py`'s `forward` yielding its exception partition first.
pub enum ForwardItem {
    Exception(DynValue),
    Internal(String),
    Handled(std::result::Result<DynValue, RouteError>),
}

impl std::fmt::Debug for ForwardItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardItem::Exception(_) => write!(f, "ForwardItem::Exception(..)"),
            ForwardItem::Internal(msg) => write!(f, "ForwardItem::Internal({msg:?})"),
            ForwardItem::Handled(Ok(_)) => write!(f, "ForwardItem::Handled(Ok(..))"),
            ForwardItem::Handled(Err(e)) => write!(f, "ForwardItem::Handled(Err({e}))"),
        }
    }
}

pub struct Engine {
    /// `G`: the live, ever-growing union of everything ever subscribed.
    /// Mutated in place by `subscribe`/`unsubscribe_terminals`/`clear`.
    live: Mutex<Arc<IdentityNode>>,
    /// `G'`: the snapshot most recently compiled from `live`. `None` until
    /// the first `forward` call compiles one.
    compiled: Mutex<Option<Graph>>,
    /// Set by every mutation of `live`; cleared once `forward` recompiles.
    dirty: AtomicBool,
}

impl Engine {
    pub fn new() -> Arc<Self> {
        Arc::new(Engine {
            live: Mutex::new(IdentityNode::new()),
            compiled: Mutex::new(None),
            dirty: AtomicBool::new(true),
        })
    }

    /// Begin building a handler registration against `graph`: `on` returns
    /// a builder that, once a handler is applied, subscribes the result
    /// automatically — the Rust shape of `engine.on(graph)(handler)`.
    pub fn on(self: &Arc<Self>, graph: Graph) -> OnGraph {
        OnGraph {
            engine: self.clone(),
            graph,
        }
    }

    /// Fold a closed graph into the engine's running union of everything
    /// it has ever been asked to route through. Idempotent for the same
    /// graph object subscribed twice, since re-adding the same root under
    /// the same edge merges in place rather than duplicating it.
    #[instrument(skip(self, graph))]
    pub fn subscribe(&self, graph: Graph) -> Result<()> {
        if !graph.is_closed() {
            return Err(RouteError::OpenGraphSubscribe);
        }
        let root = self.live.lock().unwrap().clone();
        root.add_successor(graph.root())?;
        self.dirty.store(true, Ordering::SeqCst);
        tracing::debug!("subscribed graph rooted at {:?}", graph.root().id());
        Ok(())
    }

    /// Deactivate the given terminals and unwire them from the live graph's
    /// successor tables. A compiled snapshot's terminals are independent
    /// copies that capture `active` at copy time (see `TerminalNode::copy`),
    /// so this also marks the engine dirty — without it, an in-flight or
    /// already-compiled `G'` would never see the change until some unrelated
    /// mutation forced a recompile.
    pub fn unsubscribe_terminals(&self, terminals: &[Arc<TerminalNode>]) {
        let root = NodeRef::Nonterminal(self.live.lock().unwrap().clone());
        for terminal in terminals {
            terminal.deactivate();
            crate::node::prune_terminal(&root, terminal.id());
        }
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Discard everything subscribed so far, starting fresh.
    pub fn clear(&self) {
        *self.live.lock().unwrap() = IdentityNode::new();
        *self.compiled.lock().unwrap() = None;
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Return the compiled snapshot `forward` should route against,
    /// rebuilding it from `live` first if anything changed since the last
    /// build. Matches `engine.py`'s `_compile` lazily recomputing `G'` from
    /// `G` on the next `forward` after a dirtying mutation.
    ///
    /// The rebuild itself (`Graph::copy`'s tree walk) is not atomic against
    /// a `subscribe` racing concurrently with it — each node's own
    /// successor table is locked only while that node is visited, not for
    /// the whole walk — but that window is one synchronous copy, versus the
    /// unbounded window of routing an async traversal directly against the
    /// live, mutable tree across many await points. Once `compiled_snapshot`
    /// returns, the handle it hands back is fully isolated: nothing `live`
    /// does afterwards can change what this traversal sees.
    fn compiled_snapshot(&self) -> Graph {
        if self.dirty.swap(false, Ordering::SeqCst) {
            let live_root = self.live.lock().unwrap().clone();
            let fresh = Graph::from_root(live_root).copy();
            *self.compiled.lock().unwrap() = Some(fresh.clone());
            tracing::debug!("recompiled graph snapshot");
            fresh
        } else {
            self.compiled
                .lock()
                .unwrap()
                .clone()
                .expect("dirty starts true, so a clean flag implies a prior compile")
        }
    }

    /// Route one event through the engine and run every matched handler.
    ///
    /// Yields routing-layer signals (`RouteOutcome::Exception`/`Internal`)
    /// first, in discovery order, then drains matched handlers through the
    /// priority executor, yielding each result as it completes.
    #[instrument(skip(self, args, kwargs), fields(arg_count = args.len()))]
    pub async fn forward(
        &self,
        args: Vec<DynValue>,
        kwargs: HashMap<String, DynValue>,
    ) -> Result<impl Stream<Item = ForwardItem>> {
        let store = KeyStore::new(kwargs);
        let state = RouteState::new(args, store);
        // `engine.py`'s forward publishes the traversal's own store/state
        // back into the store under reserved names, so a handler parameter
        // can bind `_store`/`_state` like any other named kwarg.
        state.store().seed("_store", value(state.store_handle()));
        state.store().seed("_state", value(state.clone()));

        let compiled = self.compiled_snapshot();
        tracing::info!("forwarding event");
        let outcomes = compiled.route(&state).await?;

        let mut signals = Vec::new();
        let mut tasks = Vec::new();
        for outcome in outcomes {
            match outcome {
                RouteOutcome::Matched(result) => tasks.push(Task {
                    terminal: result.node,
                    mapping: result.mapping,
                    state: state.clone(),
                }),
                RouteOutcome::Exception(v) => signals.push(ForwardItem::Exception(v)),
                RouteOutcome::Internal(msg) => signals.push(ForwardItem::Internal(msg)),
            }
        }
        tracing::debug!(matched = tasks.len(), signals = signals.len(), "routing complete");

        let executor = PriorityExecutor::new(tasks);
        Ok(stream! {
            for item in signals {
                yield item;
            }
            let mut results = Box::pin(executor.run());
            while let Some(res) = results.next().await {
                yield ForwardItem::Handled(res);
            }
        })
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Engine(root={:?}, dirty={})",
            self.live.lock().unwrap().id(),
            self.dirty.load(Ordering::SeqCst)
        )
    }
}

/// Builder returned by [`Engine::on`]: applies a handler to the wrapped
/// graph and subscribes the result in one step.
pub struct OnGraph {
    engine: Arc<Engine>,
    graph: Graph,
}

impl OnGraph {
    pub fn apply(self, handler: Handler) -> Result<Arc<TerminalNode>> {
        self.apply_with_priority(handler, Priority::default())
    }

    pub fn apply_with_priority(self, handler: Handler, priority: Priority) -> Result<Arc<TerminalNode>> {
        let (graph, terminal) = self.graph.apply_with_priority(handler, priority)?;
        self.engine.subscribe(graph)?;
        Ok(terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyfunc::first_argument;
    use crate::node::EqualNode;
    use crate::value::{value, DispatchKey};

    #[tokio::test]
    async fn forward_with_no_subscriptions_yields_nothing() {
        let engine = Engine::new();
        let mut stream = Box::pin(engine.forward(vec![value(1i64)], HashMap::new()).await.unwrap());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn matched_terminal_runs_its_handler() {
        let engine = Engine::new();
        let key = first_argument::<i64>();
        let equal = EqualNode::new(key).unwrap();
        equal.add_successor(DispatchKey::new(7i64), NodeRef::Nonterminal(IdentityNode::new())).unwrap();
        let graph = Graph::from_root(equal.clone());
        engine
            .on(graph)
            .apply(Handler::new(|_p| async { value("matched".to_string()) }))
            .unwrap();

        let mut stream = Box::pin(engine.forward(vec![value(7i64)], HashMap::new()).await.unwrap());
        let item = stream.next().await.expect("the matching terminal's handler should run");
        match item {
            ForwardItem::Handled(Ok(v)) => assert_eq!(v.downcast_ref::<String>().unwrap(), "matched"),
            other => panic!("unexpected forward item: {other:?}"),
        }
        assert!(stream.next().await.is_none());
    }
}
