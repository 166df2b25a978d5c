//! `IdentityNode`: an unconditional pass-through nonterminal, routing into
//! every registered successor with no key evaluation at all.
//!
//! Used as the join point `Graph::union` creates when merging two graphs
//! that don't otherwise share a root, and as the synthetic head a fresh
//! `Graph` starts from before anything is composed onto it.

use super::{route_successor, EdgeKey, MergeKey, NodeCore, NodeId, NodeMap, NodeRef, Nonterminal, SuccessorTable};
use crate::error::{Result, RouteOutcome};
use super::merge_kind_mismatch;
use crate::state::RouteState;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub struct IdentityNode {
    core: NodeCore,
    table: SuccessorTable,
}

impl IdentityNode {
    pub fn new() -> Arc<Self> {
        let node = IdentityNode {
            core: NodeCore::new(),
            table: SuccessorTable::new(),
        };
        node.table.add_key(EdgeKey::Unit);
        Arc::new(node)
    }

    pub fn add_successor(&self, node: NodeRef) -> Result<()> {
        self.table.add_successor_under_key(EdgeKey::Unit, node, self.id())
    }
}

#[async_trait]
impl Nonterminal for IdentityNode {
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
        "IdentityNode"
    }

    fn successors_snapshot(&self) -> Vec<(EdgeKey, Vec<NodeRef>)> {
        self.table.snapshot()
    }

    fn raw_table(&self) -> &SuccessorTable {
        &self.table
    }

    fn copy(&self, node_map: &mut NodeMap) -> NodeRef {
        let copied = IdentityNode::new();
        node_map.insert(self.id(), NodeRef::Nonterminal(copied.clone()));
        for (_, nodes) in self.table.snapshot() {
            for node in nodes {
                let copied_succ = node.copy(node_map);
                let _ = copied.add_successor(copied_succ);
            }
        }
        NodeRef::Nonterminal(copied)
    }

    fn merge_from(&self, other: &dyn Nonterminal) -> Result<()> {
        let other = other
            .as_any()
            .downcast_ref::<IdentityNode>()
            .ok_or_else(|| merge_kind_mismatch("IdentityNode", other.kind_name()))?;
        self.table.merge_union(&other.table, self.id())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn route_inner(&self, state: &Arc<RouteState>) -> Result<Vec<RouteOutcome>> {
        let successors = self
            .table
            .snapshot()
            .into_iter()
            .find(|(k, _)| *k == EdgeKey::Unit)
            .map(|(_, nodes)| nodes)
            .unwrap_or_default();
        let mut outcomes = Vec::new();
        for succ in successors {
            outcomes.extend(route_successor(&succ, state).await?);
        }
        Ok(outcomes)
    }
}

impl fmt::Debug for IdentityNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityNode({:?})", self.core.id())
    }
}
