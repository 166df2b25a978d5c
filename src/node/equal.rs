//! `EqualNode`: dispatches on the exact value of a hashable key function.
//!
//! Ported from `original_source/.../std.py`'s `EqualNode`. Its identity for
//! merge purposes incorporates the key function's identity (`MergeKey::Keyed`)
//! — two `EqualNode`s built against the *same* key function merge into one
//! dispatch table on union, even if constructed independently, so repeated
//! `equals(key, value) >> handler` registrations against a shared key
//! function accumulate rather than shadow each other.

use super::{route_successor, MergeKey, NodeCore, NodeId, NodeMap, NodeRef, Nonterminal, SuccessorTable};
use crate::error::{Result, RouteError, RouteOutcome};
use super::merge_kind_mismatch;
use crate::keyfunc::KeyFunction;
use crate::state::RouteState;
use crate::value::DispatchKey;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub struct EqualNode {
    core: NodeCore,
    key: Arc<KeyFunction>,
    table: SuccessorTable,
}

impl EqualNode {
    pub fn new(key: KeyFunction) -> Result<Arc<Self>> {
        if !key.is_hashable() {
            return Err(RouteError::NonHashableKey);
        }
        Ok(Arc::new(EqualNode {
            core: NodeCore::new(),
            key: Arc::new(key),
            table: SuccessorTable::new(),
        }))
    }

    pub fn add_successor(&self, value: DispatchKey, node: NodeRef) -> Result<()> {
        let edge = super::EdgeKey::Value(value);
        self.table.add_key(edge.clone());
        self.table.add_successor_under_key(edge, node, self.id())
    }

    /// Register `value` with no successor yet, leaving its edge open for a
    /// later `&` composition to attach a continuation onto.
    pub fn open(&self, value: DispatchKey) {
        self.table.add_key(super::EdgeKey::Value(value));
    }
}

#[async_trait]
impl Nonterminal for EqualNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn merge_key(&self) -> MergeKey {
        MergeKey::Keyed("EqualNode", self.key.id())
    }

    fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn kind_name(&self) -> &'static str {
        "EqualNode"
    }

    fn successors_snapshot(&self) -> Vec<(super::EdgeKey, Vec<NodeRef>)> {
        self.table.snapshot()
    }

    fn raw_table(&self) -> &SuccessorTable {
        &self.table
    }

    fn copy(&self, node_map: &mut NodeMap) -> NodeRef {
        let copied = Arc::new(EqualNode {
            core: NodeCore::new(),
            key: self.key.clone(),
            table: SuccessorTable::new(),
        });
        node_map.insert(self.id(), NodeRef::Nonterminal(copied.clone()));
        for (key, nodes) in self.table.snapshot() {
            for node in nodes {
                let copied_succ = node.copy(node_map);
                let _ = copied.table.add_successor_under_key(key.clone(), copied_succ, copied.id());
            }
        }
        NodeRef::Nonterminal(copied)
    }

    fn merge_from(&self, other: &dyn Nonterminal) -> Result<()> {
        let other = other
            .as_any()
            .downcast_ref::<EqualNode>()
            .ok_or_else(|| merge_kind_mismatch("EqualNode", other.kind_name()))?;
        self.table.merge_union(&other.table, self.id())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn route_inner(&self, state: &Arc<RouteState>) -> Result<Vec<RouteOutcome>> {
        let value = match state.store().evaluate(&self.key, state).await {
            Ok(v) => v,
            Err(signal) => return Ok(vec![RouteOutcome::from(signal)]),
        };
        let Some(dispatch_key) = self.key.to_dispatch_key(&value) else {
            // The key function was constructed via `hashable`, so this
            // should be unreachable; fail hard rather than silently no-op.
            return Err(RouteError::NonHashableKey);
        };
        let edge = super::EdgeKey::Value(dispatch_key);
        let successors = self
            .table
            .snapshot()
            .into_iter()
            .find(|(k, _)| *k == edge)
            .map(|(_, nodes)| nodes)
            .unwrap_or_default();
        let mut outcomes = Vec::new();
        for succ in successors {
            outcomes.extend(route_successor(&succ, state).await?);
        }
        Ok(outcomes)
    }
}

impl fmt::Debug for EqualNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EqualNode({:?}, key={:?})", self.core.id(), self.key.id())
    }
}
