//! Convenience constructors for the common graph shapes.
//!
//! Ported from `original_source/.../std.py`'s `make_graph_deco` family
//! (`true`, `equals`, `if_`, `is_`) and `store_`. Each returns an open
//! [`Graph`] with exactly one dangling edge, ready to have a continuation
//! spliced on via `Graph::then` or a handler applied via `Graph::apply`.
//!
//! `is_::<T>()` ports the original's runtime `type(x)` dispatch as an
//! `EqualNode` keyed on `TypeId` rather than a `PredicateNode`: every call
//! shares one process-wide type-tag [`KeyFunction`] (see `type_tag_key`
//! below), so independently written `is_::<Foo>()`/`is_::<Bar>()` calls merge
//! into a single shared dispatch table under `EqualNode`'s
//! `MergeKey::Keyed` rule, exactly like the Python original's `is_` calls
//! sharing one key function — a fresh per-call key function would give each
//! `is_::<T>()` graph its own `EqualNode` identity and the merge would never
//! happen.

use crate::error::{Result, RouteSignal};
use crate::graph::Graph;
use crate::keyfunc::KeyFunction;
use crate::node::{EqualNode, PredicateNode, PrefixNode, ProcessorNode};
use crate::state::RouteState;
use crate::value::{downcast, value, DispatchKey, DynValue};
use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, OnceLock};

/// A graph that matches unconditionally — useful as a base to union
/// several independent rules onto with `|`.
pub fn true_() -> Graph {
    let node = PredicateNode::new();
    node.open(KeyFunction::new(|_state: Arc<RouteState>| async { Ok::<bool, RouteSignal>(true) }));
    Graph::from_root(node)
}

/// Route only when `predicate` evaluates truthy.
pub fn if_(predicate: KeyFunction) -> Graph {
    let node = PredicateNode::new();
    node.open(predicate);
    Graph::from_root(node)
}

/// Route when `key`'s value equals any of `values` — the Rust shape of
/// `original_source/.../std.py`'s `equals(*values)`. All values share one
/// open edge set, so `equals(key, [1, 2]).then(handler)` matches on either.
pub fn equals<T, I>(key: KeyFunction, values: I) -> Result<Graph>
where
    T: Eq + Hash + Debug + Send + Sync + 'static,
    I: IntoIterator<Item = T>,
{
    let node = EqualNode::new(key)?;
    for value in values {
        node.open(DispatchKey::new(value));
    }
    Ok(Graph::from_root(node))
}

/// The single, process-wide key function every `is_::<T>()` call dispatches
/// through. Its identity (not its behavior) is what lets two independently
/// constructed `is_` graphs merge into one shared `EqualNode`.
fn type_tag_key() -> KeyFunction {
    static KEY: OnceLock<KeyFunction> = OnceLock::new();
    KEY.get_or_init(|| {
        KeyFunction::hashable(|state: Arc<RouteState>| async move {
            state
                .args()
                .first()
                .map(|v| v.as_ref().type_id())
                .ok_or_else(|| RouteSignal::internal("is_: no positional argument to read a type from"))
        })
    })
    .clone()
}

/// Route only when the traversal's first positional argument is a `T`.
pub fn is_<T>() -> Graph
where
    T: Send + Sync + 'static,
{
    let node = EqualNode::new(type_tag_key()).expect("the type-tag key function is always hashable");
    node.open(DispatchKey::new(TypeId::of::<T>()));
    Graph::from_root(node)
}

/// Run `compute` for its side effect (publishing a value into the
/// traversal's scope) and unconditionally continue.
pub fn process(compute: KeyFunction) -> Graph {
    let node = ProcessorNode::new();
    node.open(compute);
    Graph::from_root(node)
}

/// Publish the value computed by `compute` under `name`, so later handler
/// parameters can bind to it by that name. Equivalent to
/// `process(compute.named(name))`.
pub fn store_(name: impl Into<String>, compute: KeyFunction) -> Graph {
    process(compute.named(name))
}

/// Dispatch on a string key's prefixes rather than its exact value.
///
/// `prefix(key)` itself builds nothing yet — call [`PrefixRoot::at`] once per
/// registered literal. Each call returns its own small open graph around a
/// *fresh* `PrefixNode` sharing `key`'s identity; applying a different
/// handler to each and subscribing (or `|`-unioning) them merges them back
/// into one shared trie, by the same `MergeKey::Keyed` rule `EqualNode` uses
/// — mirroring how `original_source/.../trie.py`'s prefix registrations
/// accumulate onto one node over several `graph |= ...` calls rather than
/// requiring every prefix's handler to be known up front.
pub fn prefix(key: KeyFunction) -> PrefixRoot {
    PrefixRoot(key)
}

pub struct PrefixRoot(KeyFunction);

impl PrefixRoot {
    pub fn at(&self, literal: impl Into<String>) -> Result<Graph> {
        let node = PrefixNode::new(self.0.clone())?;
        node.open(literal);
        Ok(Graph::from_root(node))
    }
}

/// Wrap a plain value as a [`DynValue`] for use as a `RouteSignal::Exception`
/// payload or a handler result.
pub fn wrap_value<T: std::any::Any + Send + Sync>(v: T) -> DynValue {
    value(v)
}

pub fn unwrap_value<T: Clone + 'static>(v: &DynValue) -> Option<T> {
    downcast(v)
}
