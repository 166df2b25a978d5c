//! `ProcessorNode`: runs a key function for its side effect (typically
//! publishing a named value into the traversal's scope) and always recurses
//! into its successors, whether or not the key function raised.
//!
//! Ported from `original_source/.../std.py`'s `ProcessorNode`. Unlike
//! `PredicateNode`, an exception here does not skip the associated
//! successors — it is recorded as an outcome and traversal continues
//! regardless, since a processor's purpose is to make data available, not
//! to gate routing.

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

pub struct ProcessorNode {
    core: NodeCore,
    processors: Mutex<HashMap<KeyFunctionId, Arc<KeyFunction>>>,
    table: SuccessorTable,
}

impl ProcessorNode {
    pub fn new() -> Arc<Self> {
        Arc::new(ProcessorNode {
            core: NodeCore::new(),
            processors: Mutex::new(HashMap::new()),
            table: SuccessorTable::new(),
        })
    }

    pub fn add_successor(&self, processor: KeyFunction, node: NodeRef) -> Result<()> {
        let key_id = processor.id();
        self.processors.lock().unwrap().entry(key_id).or_insert_with(|| Arc::new(processor));
        let edge = super::EdgeKey::KeyFn(key_id);
        self.table.add_key(edge.clone());
        self.table.add_successor_under_key(edge, node, self.id())
    }

    /// Register `processor` with no successor yet, leaving its edge open
    /// for a later `&` composition to attach a continuation onto.
    pub fn open(&self, processor: KeyFunction) {
        let key_id = processor.id();
        self.processors.lock().unwrap().entry(key_id).or_insert_with(|| Arc::new(processor));
        self.table.add_key(super::EdgeKey::KeyFn(key_id));
    }
}

#[async_trait]
impl Nonterminal for ProcessorNode {
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
        "ProcessorNode"
    }

    fn successors_snapshot(&self) -> Vec<(super::EdgeKey, Vec<NodeRef>)> {
        self.table.snapshot()
    }

    fn raw_table(&self) -> &SuccessorTable {
        &self.table
    }

    fn copy(&self, node_map: &mut NodeMap) -> NodeRef {
        let copied = ProcessorNode::new();
        node_map.insert(self.id(), NodeRef::Nonterminal(copied.clone()));
        let processors = self.processors.lock().unwrap().clone();
        for (key_id, proc) in processors {
            copied.processors.lock().unwrap().insert(key_id, proc.clone());
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
            .downcast_ref::<ProcessorNode>()
            .ok_or_else(|| merge_kind_mismatch("ProcessorNode", other.kind_name()))?;
        let processors = other.processors.lock().unwrap().clone();
        for (key_id, proc) in processors {
            self.processors.lock().unwrap().entry(key_id).or_insert(proc);
        }
        self.table.merge_union(&other.table, self.id())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn route_inner(&self, state: &Arc<RouteState>) -> Result<Vec<RouteOutcome>> {
        let processors = self.processors.lock().unwrap().clone();
        let mut outcomes = Vec::new();
        for (key_id, processor) in processors {
            if let Err(signal) = state.store().evaluate(&processor, state).await {
                outcomes.push(RouteOutcome::from(signal));
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

impl fmt::Debug for ProcessorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessorNode({:?})", self.core.id())
    }
}
