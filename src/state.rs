//! Per-traversal state: the incoming arguments, the memoizing key store,
//! and the stack of binding scopes built up as routing descends through
//! nonterternal nodes.
//!
//! Ported from `original_source/.../state.py`'s `RouteState`/`RouteResult`.
//! The scope stack exists so a [`crate::node::ProcessorNode`] can publish a
//! name visible to its descendants without that name leaking into sibling
//! branches explored after the current one returns — `RouteState::enter`/
//! `exit` bracket every [`crate::node::Nonterminal::route`] call.

use crate::keyfunc::KeyFunctionId;
use crate::node::TerminalNode;
use crate::store::KeyStore;
use crate::value::DynValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The state threaded through one call to [`crate::graph::Graph::route`].
pub struct RouteState {
    args: Vec<DynValue>,
    store: Arc<KeyStore>,
    scopes: Mutex<Vec<HashMap<String, KeyFunctionId>>>,
}

impl RouteState {
    pub fn new(args: Vec<DynValue>, store: KeyStore) -> Arc<Self> {
        Arc::new(RouteState {
            args,
            store: Arc::new(store),
            scopes: Mutex::new(vec![HashMap::new()]),
        })
    }

    pub fn args(&self) -> &[DynValue] {
        &self.args
    }

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    /// A cloneable handle to this traversal's store, published under `_store`
    /// by `Engine::forward` so a handler parameter can bind to it like any
    /// other named value (`engine.py`'s `state.store['_store'] = state.store`).
    pub(crate) fn store_handle(&self) -> Arc<KeyStore> {
        self.store.clone()
    }

    pub(crate) fn enter(&self) {
        self.scopes.lock().unwrap().push(HashMap::new());
    }

    pub(crate) fn exit(&self) {
        self.scopes.lock().unwrap().pop();
    }

    /// Bind `name` to `key_fn`'s identity in the current (innermost) scope.
    /// The actual value stays in the key store, addressed by key-function
    /// identity — the scope only records which key function a name resolves
    /// to, matching `keystore.py`'s `state[_key_function.key] = _key_function`.
    pub(crate) fn bind_name(&self, name: impl Into<String>, key_fn: KeyFunctionId) {
        let mut scopes = self.scopes.lock().unwrap();
        let top = scopes.last_mut().expect("scope stack is never empty while routing");
        top.insert(name.into(), key_fn);
    }

    /// Flatten the scope stack into one mapping, outer scopes first so inner
    /// (more specific) bindings win on name collision.
    pub(crate) fn build(&self) -> HashMap<String, KeyFunctionId> {
        let scopes = self.scopes.lock().unwrap();
        let mut out = HashMap::new();
        for scope in scopes.iter() {
            out.extend(scope.iter().map(|(k, v)| (k.clone(), *v)));
        }
        out
    }

    /// Snapshot the current mapping against a matched terminal.
    pub(crate) fn wrap(&self, node: Arc<TerminalNode>) -> RouteResult {
        RouteResult {
            node,
            mapping: self.build(),
        }
    }
}

impl std::fmt::Debug for RouteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteState")
            .field("args_len", &self.args.len())
            .finish()
    }
}

/// A matched terminal plus the name → key-function mapping visible at the
/// point it was reached. Equality and hashing are by terminal identity
/// alone, matching `state.py`'s `RouteResult.__hash__`/`__eq__` — two
/// matches of the same terminal collapse even if reached with different
/// mappings (the first one discovered wins, per [`crate::error::union_outcomes`]).
#[derive(Clone, Debug)]
pub struct RouteResult {
    pub node: Arc<TerminalNode>,
    pub mapping: HashMap<String, KeyFunctionId>,
}

impl PartialEq for RouteResult {
    fn eq(&self, other: &Self) -> bool {
        self.node.id() == other.node.id()
    }
}
impl Eq for RouteResult {}

impl std::hash::Hash for RouteResult {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.node.id().hash(state)
    }
}
