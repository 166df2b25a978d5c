//! Identity-bearing callables used both as edge selectors on nonterminals
//! and as binding sources for handler parameters.
//!
//! A [`KeyFunction`] computes a [`DynValue`] from the current [`RouteState`].
//! Its *identity* — not its behavior — is what the rest of the engine keys
//! on: two key functions that happen to produce equal output are still
//! distinct if constructed separately, and [`KeyStore`](crate::store::KeyStore)
//! memoizes by identity so a value is computed at most once per traversal
//! regardless of how many nonterminals reference the same key function.

use crate::error::RouteSignal;
use crate::state::RouteState;
use crate::value::{DispatchKey, DynValue};
use futures::future::BoxFuture;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_KEYFN_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a [`KeyFunction`], stable across a traversal and across
/// `Graph::copy()` (copying a graph never re-wraps key functions, it only
/// re-wraps the nodes that reference them).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyFunctionId(u64);

impl KeyFunctionId {
    fn fresh() -> Self {
        KeyFunctionId(NEXT_KEYFN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type Compute = Arc<dyn Fn(Arc<RouteState>) -> BoxFuture<'static, Result<DynValue, RouteSignal>> + Send + Sync>;
type ToDispatchKey = Arc<dyn Fn(&DynValue) -> Option<DispatchKey> + Send + Sync>;

/// A named or anonymous, identity-bearing key function.
#[derive(Clone)]
pub struct KeyFunction {
    id: KeyFunctionId,
    /// When set, a successful evaluation also binds this name in the
    /// traversal's current scope to this key function's identity (the
    /// mechanism `ProcessorNode` uses to publish values for later handler
    /// parameter resolution).
    key: Option<String>,
    compute: Compute,
    to_dispatch_key: Option<ToDispatchKey>,
}

impl fmt::Debug for KeyFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyFunction")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish()
    }
}

impl PartialEq for KeyFunction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for KeyFunction {}

impl KeyFunction {
    /// Build a key function for use as a predicate edge or processor edge —
    /// anything that does not need to serve as an `EqualNode`/`PrefixNode`
    /// dispatch key.
    pub fn new<F, Fut, T>(f: F) -> Self
    where
        F: Fn(Arc<RouteState>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, RouteSignal>> + Send + 'static,
        T: Send + Sync + 'static,
    {
        KeyFunction {
            id: KeyFunctionId::fresh(),
            key: None,
            compute: Arc::new(move |state| {
                let fut = f(state);
                Box::pin(async move { fut.await.map(|v| Arc::new(v) as DynValue) })
            }),
            to_dispatch_key: None,
        }
    }

    /// Build a key function whose output type is `Eq + Hash`, so it can be
    /// used as the dispatch key of an `EqualNode` or `PrefixNode`.
    pub fn hashable<F, Fut, T>(f: F) -> Self
    where
        F: Fn(Arc<RouteState>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, RouteSignal>> + Send + 'static,
        T: Eq + Hash + fmt::Debug + Clone + Send + Sync + 'static,
    {
        let mut kf = KeyFunction::new(f);
        kf.to_dispatch_key = Some(Arc::new(|v: &DynValue| {
            v.downcast_ref::<T>().cloned().map(DispatchKey::new)
        }));
        kf
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.key = Some(name.into());
        self
    }

    pub fn id(&self) -> KeyFunctionId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn is_hashable(&self) -> bool {
        self.to_dispatch_key.is_some()
    }

    pub(crate) async fn evaluate(&self, state: Arc<RouteState>) -> Result<DynValue, RouteSignal> {
        (self.compute)(state).await
    }

    pub(crate) fn to_dispatch_key(&self, value: &DynValue) -> Option<DispatchKey> {
        self.to_dispatch_key.as_ref().and_then(|f| f(value))
    }
}

/// The default key function used by `EqualNode`/`PrefixNode`/`is_` when no
/// explicit key is given: the first positional argument of the traversal.
///
/// Ported from `original_source/.../std.py`'s `first_argument` default.
pub fn first_argument<T>() -> KeyFunction
where
    T: Eq + Hash + fmt::Debug + Clone + Send + Sync + 'static,
{
    KeyFunction::hashable(|state: Arc<RouteState>| async move {
        state
            .args()
            .first()
            .and_then(|v| v.downcast_ref::<T>().cloned())
            .ok_or_else(|| RouteSignal::internal("first_argument: no positional argument of the expected type"))
    })
}
