//! Handler registration and parameter binding.
//!
//! The original router resolves handler parameters by inspecting a Python
//! function's signature at registration time (`original_source/.../utils.py`'s
//! `wrap_function`). Rust has no equivalent reflection, so binding here is
//! declared explicitly by the caller when building a [`Handler`] — the
//! "builder declares bindings" approach the specification calls out as the
//! right fit for a statically typed host language. The *resolution order*
//! is kept identical to the original: a bound name is looked up first in
//! the traversal's mapping (name → key function), then as a raw keyword
//! argument, and binding fails hard if neither has it.

use crate::error::{Result, RouteError};
use crate::keyfunc::KeyFunctionId;
use crate::state::RouteState;
use crate::value::DynValue;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Pull a concretely typed value back out of a resolved parameter map slot.
///
/// Handler bodies receive `HashMap<String, DynValue>`; `Extract` is the
/// small convenience layer over `DynValue::downcast_ref` so a handler reads
/// `p.extract::<i64>("count")?` instead of repeating the downcast-or-bind-
/// error boilerplate at every call site.
pub trait Extract {
    fn extract<T: Clone + 'static>(&self, name: &str) -> Result<T>;
}

impl Extract for HashMap<String, DynValue> {
    fn extract<T: Clone + 'static>(&self, name: &str) -> Result<T> {
        self.get(name)
            .and_then(|v| v.downcast_ref::<T>().cloned())
            .ok_or_else(|| RouteError::Binding {
                name: name.to_string(),
                key: name.to_string(),
            })
    }
}

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// How a declared parameter resolves to a value at call time.
#[derive(Debug, Clone)]
pub enum Bind {
    /// Take the `DynValue` at this 0-based position in the traversal's
    /// positional arguments directly, bypassing the mapping/store lookup.
    Positional(usize),
    /// Resolve this parameter by `key`: first against the current mapping
    /// (a name published by a `ProcessorNode`/key function during
    /// traversal), falling back to a raw keyword argument of the same name.
    Key(String),
    /// Same two-tier resolution as `Key`, but under a name different from
    /// the parameter itself. Ported from `original_source/.../utils.py`'s
    /// `Alias`.
    Alias(String),
}

type Call = Arc<dyn Fn(HashMap<String, DynValue>) -> BoxFuture<'static, DynValue> + Send + Sync>;

/// A callable registered as a terminal's payload, together with its
/// declared parameter bindings.
#[derive(Clone)]
pub struct Handler {
    id: HandlerId,
    call: Call,
    bindings: Vec<(String, Bind)>,
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("params", &self.bindings.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}

impl Handler {
    /// Wrap an async function taking the resolved-parameter map and
    /// returning a [`DynValue`] result.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(HashMap<String, DynValue>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = DynValue> + Send + 'static,
    {
        Handler {
            id: HandlerId(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed)),
            call: Arc::new(move |params| Box::pin(f(params))),
            bindings: Vec::new(),
        }
    }

    pub fn bind(mut self, name: impl Into<String>, source: Bind) -> Self {
        self.bindings.push((name.into(), source));
        self
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Resolve every declared binding and invoke the wrapped function.
    pub(crate) async fn invoke(
        &self,
        state: &Arc<RouteState>,
        mapping: &HashMap<String, KeyFunctionId>,
    ) -> Result<DynValue> {
        let mut params = HashMap::with_capacity(self.bindings.len());
        for (name, source) in &self.bindings {
            let value = match source {
                Bind::Positional(i) => state.args().get(*i).cloned().ok_or_else(|| RouteError::Binding {
                    name: name.clone(),
                    key: format!("args[{i}]"),
                })?,
                Bind::Key(key) => self.resolve(state, mapping, name, key).await?,
                Bind::Alias(key) => self.resolve(state, mapping, name, key).await?,
            };
            params.insert(name.clone(), value);
        }
        Ok((self.call)(params).await)
    }

    async fn resolve(
        &self,
        state: &Arc<RouteState>,
        mapping: &HashMap<String, KeyFunctionId>,
        name: &str,
        key: &str,
    ) -> Result<DynValue> {
        if let Some(key_fn_id) = mapping.get(key) {
            if let Some(value) = state.store().get_cached(*key_fn_id).await {
                return Ok(value);
            }
        }
        if let Some(value) = state.store().get_kwarg(key) {
            return Ok(value);
        }
        Err(RouteError::Binding {
            name: name.to_string(),
            key: key.to_string(),
        })
    }
}
