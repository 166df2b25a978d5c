//! Type-erased values flowing through a traversal.
//!
//! Positional arguments, raw keyword parameters, key-function results, and
//! handler-bound parameters are all represented as [`DynValue`] — the
//! dynamically typed `Any` that Python's router leans on, ported as a
//! cheaply cloneable trait object rather than `serde_json::Value`, since
//! values routed here (arbitrary bot-framework payloads) are not
//! necessarily JSON-shaped.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A single type-erased, reference-counted value.
pub type DynValue = Arc<dyn Any + Send + Sync>;

/// Wrap a concrete value as a [`DynValue`].
pub fn value<T: Any + Send + Sync>(v: T) -> DynValue {
    Arc::new(v)
}

/// Downcast a [`DynValue`] back to a concrete, `Clone` type.
///
/// Handler parameter slots go through this — see [`crate::handler::Extract`].
pub fn downcast<T: Clone + 'static>(v: &DynValue) -> Option<T> {
    v.downcast_ref::<T>().cloned()
}

/// Object-safe `Eq + Hash` for a type-erased value, so concrete dispatch
/// keys (`EqualNode`'s value table, `is_`'s type tags) can be stored in a
/// plain `HashMap` despite not knowing the concrete type ahead of time.
///
/// Blanket-implemented for anything that's actually hashable; a key
/// function whose output type never implements this can only be used to
/// build a [`crate::keyfunc::KeyFunction`] that is rejected for `EqualNode`/
/// `PrefixNode` use at construction time (see `KeyFunction::hashable`).
pub trait DynHashEq: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn DynHashEq) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl<T> DynHashEq for T
where
    T: Eq + Hash + fmt::Debug + Any + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn DynHashEq) -> bool {
        other.as_any().downcast_ref::<T>().is_some_and(|o| o == self)
    }

    fn dyn_hash(&self, state: &mut dyn Hasher) {
        let mut proxy = HasherProxy(state);
        self.hash(&mut proxy);
    }
}

struct HasherProxy<'a>(&'a mut dyn Hasher);

impl Hasher for HasherProxy<'_> {
    fn finish(&self) -> u64 {
        self.0.finish()
    }

    fn write(&mut self, bytes: &[u8]) {
        self.0.write(bytes)
    }
}

/// A hashable, type-erased dispatch key used by [`EqualNode`](crate::node::equal::EqualNode)'s
/// value table and `is_`'s type-tag dispatch.
#[derive(Clone)]
pub struct DispatchKey(pub Arc<dyn DynHashEq>);

impl DispatchKey {
    pub fn new<T: Eq + Hash + fmt::Debug + Any + Send + Sync>(v: T) -> Self {
        DispatchKey(Arc::new(v))
    }
}

impl PartialEq for DispatchKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.dyn_eq(other.0.as_ref())
    }
}

impl Eq for DispatchKey {}

impl Hash for DispatchKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.dyn_hash(state)
    }
}

impl fmt::Debug for DispatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_key_equality_is_by_value_not_instance() {
        let a = DispatchKey::new(42i64);
        let b = DispatchKey::new(42i64);
        let c = DispatchKey::new(43i64);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn dispatch_key_rejects_mismatched_types() {
        let a = DispatchKey::new(1i64);
        let b = DispatchKey::new("1".to_string());
        assert_ne!(a, b);
    }

    #[test]
    fn downcast_roundtrips() {
        let v = value(7i64);
        assert_eq!(downcast::<i64>(&v), Some(7));
        assert_eq!(downcast::<String>(&v), None);
    }
}
