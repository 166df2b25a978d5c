//! The per-traversal key-function memoization cache.
//!
//! Ported from `original_source/.../keystore.py`. A [`KeyFunction`] may be
//! referenced as an edge selector from several nonterminals that all see
//! the same traversal; [`KeyStore`] guarantees it runs at most once per
//! traversal by caching on first evaluation and handing every later caller
//! the same (possibly still-in-flight) result.

use crate::error::RouteSignal;
use crate::keyfunc::{KeyFunction, KeyFunctionId};
use crate::state::RouteState;
use crate::value::DynValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OnceCell};

type Cached = Arc<OnceCell<Result<DynValue, RouteSignal>>>;

/// Raw keyword arguments plus the memoizing cache for key-function results.
///
/// `keystore.py` distinguishes `KeyStore` (memoizing) from `NoneKeyStore`
/// (bypasses memoization entirely, evaluating a key function fresh on every
/// call). [`KeyStore::passthrough`] builds the latter — useful for a
/// single-shot `route()` call outside a traversal where caching would only
/// add overhead.
pub struct KeyStore {
    kwargs: StdMutex<HashMap<String, DynValue>>,
    cache: Mutex<HashMap<KeyFunctionId, Cached>>,
    memoize: bool,
}

impl KeyStore {
    pub fn new(kwargs: HashMap<String, DynValue>) -> Self {
        KeyStore {
            kwargs: StdMutex::new(kwargs),
            cache: Mutex::new(HashMap::new()),
            memoize: true,
        }
    }

    /// Build a store that never memoizes — each call to `evaluate`
    /// re-invokes the key function. Mirrors `NoneKeyStore`.
    pub fn passthrough(kwargs: HashMap<String, DynValue>) -> Self {
        KeyStore {
            kwargs: StdMutex::new(kwargs),
            cache: Mutex::new(HashMap::new()),
            memoize: false,
        }
    }

    /// Publish `name` into the raw kwargs map after construction — used by
    /// `Engine::forward` to seed the `_store`/`_state` back-references
    /// (`engine.py`'s `state.store['_store'] = state.store`), which must be
    /// set once the `RouteState`/`KeyStore` already exist and so can't go
    /// through the constructor.
    pub(crate) fn seed(&self, name: impl Into<String>, value: DynValue) {
        self.kwargs.lock().unwrap().insert(name.into(), value);
    }

    /// Evaluate `key_fn` against `state`, memoizing by its identity. If
    /// `key_fn` carries a name, also publish that name in the traversal's
    /// current scope on success, so later handler binding can look it up
    /// by name via the mapping.
    pub(crate) async fn evaluate(&self, key_fn: &KeyFunction, state: &Arc<RouteState>) -> Result<DynValue, RouteSignal> {
        let result = if self.memoize {
            let cell = {
                let mut cache = self.cache.lock().await;
                cache.entry(key_fn.id()).or_insert_with(|| Arc::new(OnceCell::new())).clone()
            };
            cell.get_or_init(|| async { key_fn.evaluate(state.clone()).await }).await.clone()
        } else {
            key_fn.evaluate(state.clone()).await
        };

        if result.is_ok() {
            if let Some(name) = key_fn.name() {
                state.bind_name(name.to_string(), key_fn.id());
            }
        }
        result
    }

    /// Look up a raw keyword argument by name, as opposed to a value
    /// produced by a key function.
    pub fn get_kwarg(&self, name: &str) -> Option<DynValue> {
        self.kwargs.lock().unwrap().get(name).cloned()
    }

    /// Fetch an already-evaluated key function's result, if its cache entry
    /// is present and completed. Used by handler binding, which runs after
    /// traversal has finished populating the cache.
    pub(crate) async fn get_cached(&self, id: KeyFunctionId) -> Option<DynValue> {
        let cell = self.cache.lock().await.get(&id).cloned()?;
        cell.get().and_then(|r| r.as_ref().ok().cloned())
    }

    pub fn kwargs(&self) -> HashMap<String, DynValue> {
        self.kwargs.lock().unwrap().clone()
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("kwargs", &self.kwargs.lock().unwrap().keys().cloned().collect::<Vec<_>>())
            .field("memoize", &self.memoize)
            .finish()
    }
}
