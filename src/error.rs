//! Error types for graph construction and routing.
//!
//! Two distinct families exist here, matching the propagation policy in the
//! specification this crate implements:
//!
//! - [`RouteError`] — programmer errors (non-hashable dispatch key, open-graph
//!   subscribe, missing handler binding, …). These abort the operation; they
//!   are ordinary `Result::Err` values propagated with `?`.
//! - [`RouteSignal`] / [`RouteOutcome`] — routing-layer signals. A key
//!   function may raise a `RouteSignal::Exception` to abort one subtree
//!   with a payload, or fail unexpectedly (`RouteSignal::Internal`). Neither
//!   aborts the traversal; both become [`RouteOutcome`] values collected
//!   alongside matched terminals and yielded to the caller before any
//!   handler runs.

use crate::value::DynValue;
use thiserror::Error;

/// Convenience result type for fallible, eagerly-propagated operations.
pub type Result<T> = std::result::Result<T, RouteError>;

/// A programmer error: something about the graph or a handler registration
/// is wrong in a way routing cannot route around.
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("graph validation failed: {0}")]
    Validation(String),

    #[error("handler parameter `{name}` could not be bound: key `{key}` was not found in the match mapping or the key store")]
    Binding { name: String, key: String },

    #[error("a key function used for EqualNode/PrefixNode dispatch must be constructed via KeyFunction::hashable")]
    NonHashableKey,

    #[error("cannot subscribe an open graph to an engine")]
    OpenGraphSubscribe,

    #[error("cannot write a KeyFunction identity as a plain KeyStore key")]
    ReservedStoreKey,

    #[error("cannot compose `& {0}` onto a graph that is already closed")]
    ClosedGraphCompose(&'static str),

    #[error("cannot merge a {expected} successor with a {found} successor under the same key")]
    MergeKindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// What a key function (or, transitively, a nonterminal's routing step) can
/// signal besides a plain value.
#[derive(Debug, Clone)]
pub enum RouteSignal {
    /// `RouteException` — an intentional, user-raised signal that aborts the
    /// enclosing subtree and carries a payload back to the caller.
    Exception(DynValue),
    /// `RouteInternalException` — an unexpected error from user code,
    /// distinguished from `Exception` so callers can tell "this predicate
    /// meant to reject" apart from "this predicate crashed".
    Internal(String),
}

impl RouteSignal {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        RouteSignal::Internal(err.to_string())
    }
}

/// One outcome of routing: either a matched terminal with its captured
/// bindings, or a routing-layer signal raised along the way.
#[derive(Debug, Clone)]
pub enum RouteOutcome {
    Matched(crate::state::RouteResult),
    Exception(DynValue),
    Internal(String),
}

impl From<RouteSignal> for RouteOutcome {
    fn from(sig: RouteSignal) -> Self {
        match sig {
            RouteSignal::Exception(v) => RouteOutcome::Exception(v),
            RouteSignal::Internal(msg) => RouteOutcome::Internal(msg),
        }
    }
}

/// Concatenate routing results from independent edges/branches, in
/// discovery order, collapsing duplicate terminal matches by node identity.
///
/// Mirrors the Python source's `res |= await node.route(state)` set-union:
/// exceptions are never deduplicated (each raised instance is distinct),
/// but the same terminal reached via two paths collapses to one match.
pub(crate) fn union_outcomes(lists: impl IntoIterator<Item = Vec<RouteOutcome>>) -> Vec<RouteOutcome> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for list in lists {
        for outcome in list {
            if let RouteOutcome::Matched(ref r) = outcome {
                if !seen.insert(r.node.id()) {
                    continue;
                }
            }
            out.push(outcome);
        }
    }
    out
}
