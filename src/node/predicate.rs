//! `PredicateNode`: routes into a successor set when its key function
//! evaluates truthy.
//!
//! Ported from `original_source/.../std.py`'s `PredicateNode`. Each
//! registered `(predicate, successors)` pair is evaluated independently —
//! one predicate raising an exception does not prevent the others from
//! being tried, and a predicate that raises never short-circuits the node
//! as a whole.

use super::{route_successor, MergeKey, NodeCore, NodeId, NodeMap, NodeRef, Nonterminal, SuccessorTable};
use crate::error::{Result, RouteOutcome};
use super::merge_kind_mismatch;
use crate::keyfunc::{KeyFunction, KeyFunctionId};
use crate::state::RouteState;
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

pub struct PredicateNode {
    core: NodeCore,
    predicates: Mutex<HashMap<KeyFunctionId, Arc<KeyFunction>>>,
    table: SuccessorTable,
}

impl PredicateNode {
    pub fn new() -> Arc<Self> {
        Arc::new(PredicateNode {
            core: NodeCore::new(),
            predicates: Mutex::new(HashMap::new()),
            table: SuccessorTable::new(),
        })
    }

    pub fn add_successor(self: &Arc<Self>, predicate: KeyFunction, node: NodeRef) -> Result<()> {
        let key_id = predicate.id();
        self.predicates.lock().unwrap().entry(key_id).or_insert_with(|| Arc::new(predicate));
        self.table.add_key(super::EdgeKey::KeyFn(key_id));
        self.table.add_successor_under_key(super::EdgeKey::KeyFn(key_id), node, self.id())
    }

    /// Register `predicate` with no successor yet, leaving its edge open
    /// for a later `&` composition to attach a continuation onto.
    pub fn open(self: &Arc<Self>, predicate: KeyFunction) {
        let key_id = predicate.id();
        self.predicates.lock().unwrap().entry(key_id).or_insert_with(|| Arc::new(predicate));
        self.table.add_key(super::EdgeKey::KeyFn(key_id));
    }
}

#[async_trait]
impl Nonterminal for PredicateNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn merge_key(&self) -> MergeKey {
        MergeKey::Instance(self.id())
    }

    fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn kind_name(&self) -> &'static str {
        "PredicateNode"
    }

    fn successors_snapshot(&self) -> Vec<(super::EdgeKey, Vec<NodeRef>)> {
        self.table.snapshot()
    }

    fn raw_table(&self) -> &SuccessorTable {
        &self.table
    }

    fn copy(&self, node_map: &mut NodeMap) -> NodeRef {
        let copied = PredicateNode::new();
        node_map.insert(self.id(), NodeRef::Nonterminal(copied.clone()));
        let predicates = self.predicates.lock().unwrap().clone();
        for (key_id, pred) in predicates {
            copied.predicates.lock().unwrap().insert(key_id, pred.clone());
            copied.table.add_key(super::EdgeKey::KeyFn(key_id));
        }
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
            .downcast_ref::<PredicateNode>()
            .ok_or_else(|| merge_kind_mismatch("PredicateNode", other.kind_name()))?;
        let predicates = other.predicates.lock().unwrap().clone();
        for (key_id, pred) in predicates {
            self.predicates.lock().unwrap().entry(key_id).or_insert(pred);
        }
        self.table.merge_union(&other.table, self.id())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn route_inner(&self, state: &Arc<RouteState>) -> Result<Vec<RouteOutcome>> {
        let predicates = self.predicates.lock().unwrap().clone();
        let mut outcomes = Vec::new();
        for (key_id, predicate) in predicates {
            let value = match state.store().evaluate(&predicate, state).await {
                Ok(v) => v,
                Err(signal) => {
                    outcomes.push(RouteOutcome::from(signal));
                    continue;
                }
            };
            let truthy = value.downcast_ref::<bool>().copied().unwrap_or(false);
            if !truthy {
                continue;
            }
            let successors = self
                .table
                .snapshot()
                .into_iter()
                .find(|(k, _)| *k == super::EdgeKey::KeyFn(key_id))
                .map(|(_, nodes)| nodes)
                .unwrap_or_default();
            for succ in successors {
                outcomes.extend(route_successor(&succ, state).await?);
            }
        }
        Ok(outcomes)
    }
}

impl fmt::Debug for PredicateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PredicateNode({:?})", self.core.id())
    }
}
