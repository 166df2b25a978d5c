//! `PrefixNode`: dispatches into every registered successor whose key is a
//! prefix of the string produced by this node's key function — not just
//! the longest match.
//!
//! Ported from `original_source/.../trie.py`'s `PrefixNode`/
//! `AbsTrieNonterminalNode`, which iterates `self._successors.prefixes(key)`
//! (a `pygtrie.CharTrie` operation returning *all* stored prefixes of
//! `key`, shortest first). `radix_trie` has no equivalent "all ancestors"
//! walk in its stable API, so prefix membership is tested by exact lookup
//! at every prefix length instead — equivalent in result, O(n) exact
//! lookups instead of one trie walk for a key of length n. Bookkeeping
//! (predecessors, emptiness, copy, merge) is delegated to the same
//! [`SuccessorTable`] every other nonterminal uses, keyed by
//! `EdgeKey::Prefix`; the trie only answers "is this exact string
//! registered", mirrored in lockstep with the table.

use super::{route_successor, EdgeKey, MergeKey, NodeCore, NodeId, NodeMap, NodeRef, Nonterminal, SuccessorTable};
use crate::error::{Result, RouteError, RouteOutcome};
use super::merge_kind_mismatch;
use crate::keyfunc::KeyFunction;
use crate::state::RouteState;
use async_trait::async_trait;
use radix_trie::Trie;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};

pub struct PrefixNode {
    core: NodeCore,
    key: Arc<KeyFunction>,
    /// Exact-match index of every registered prefix string, used only to
    /// test "is this candidate substring a registered prefix" quickly.
    registered: Mutex<Trie<String, ()>>,
    table: SuccessorTable,
}

impl PrefixNode {
    pub fn new(key: KeyFunction) -> Result<Arc<Self>> {
        if !key.is_hashable() {
            return Err(RouteError::NonHashableKey);
        }
        Ok(Arc::new(PrefixNode {
            core: NodeCore::new(),
            key: Arc::new(key),
            registered: Mutex::new(Trie::new()),
            table: SuccessorTable::new(),
        }))
    }

    pub fn add_successor(&self, prefix: impl Into<String>, node: NodeRef) -> Result<()> {
        let prefix = prefix.into();
        self.registered.lock().unwrap().insert(prefix.clone(), ());
        let edge = EdgeKey::Prefix(prefix);
        self.table.add_key(edge.clone());
        self.table.add_successor_under_key(edge, node, self.id())
    }

    /// Register `prefix` with no successor yet, leaving its edge open for a
    /// later `&` composition to attach a continuation onto.
    pub fn open(&self, prefix: impl Into<String>) {
        let prefix = prefix.into();
        self.registered.lock().unwrap().insert(prefix.clone(), ());
        self.table.add_key(EdgeKey::Prefix(prefix));
    }

    fn prefixes_of(&self, key: &str) -> Vec<NodeRef> {
        let registered = self.registered.lock().unwrap();
        let mut hits = Vec::new();
        for (idx, ch) in key.char_indices() {
            let candidate = &key[..idx + ch.len_utf8()];
            if registered.get(candidate).is_some() {
                hits.push(candidate.to_string());
            }
        }
        drop(registered);
        let snapshot = self.table.snapshot();
        let mut nodes = Vec::new();
        for prefix in hits {
            if let Some((_, succs)) = snapshot.iter().find(|(k, _)| *k == EdgeKey::Prefix(prefix.clone())) {
                nodes.extend(succs.iter().cloned());
            }
        }
        nodes
    }
}

#[async_trait]
impl Nonterminal for PrefixNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn merge_key(&self) -> MergeKey {
        MergeKey::Keyed("PrefixNode", self.key.id())
    }

    fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn kind_name(&self) -> &'static str {
        "PrefixNode"
    }

    fn successors_snapshot(&self) -> Vec<(EdgeKey, Vec<NodeRef>)> {
        self.table.snapshot()
    }

    fn raw_table(&self) -> &SuccessorTable {
        &self.table
    }

    fn copy(&self, node_map: &mut NodeMap) -> NodeRef {
        let copied = Arc::new(PrefixNode {
            core: NodeCore::new(),
            key: self.key.clone(),
            registered: Mutex::new(Trie::new()),
            table: SuccessorTable::new(),
        });
        node_map.insert(self.id(), NodeRef::Nonterminal(copied.clone()));
        for (key, nodes) in self.table.snapshot() {
            let EdgeKey::Prefix(prefix) = &key else { continue };
            for node in nodes {
                let copied_succ = node.copy(node_map);
                let _ = copied.add_successor(prefix.clone(), copied_succ);
            }
        }
        NodeRef::Nonterminal(copied)
    }

    fn merge_from(&self, other: &dyn Nonterminal) -> Result<()> {
        let other = other
            .as_any()
            .downcast_ref::<PrefixNode>()
            .ok_or_else(|| merge_kind_mismatch("PrefixNode", other.kind_name()))?;
        for (key, nodes) in other.table.snapshot() {
            let EdgeKey::Prefix(prefix) = &key else { continue };
            for node in nodes {
                self.add_successor(prefix.clone(), node)?;
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn route_inner(&self, state: &Arc<RouteState>) -> Result<Vec<RouteOutcome>> {
        let value = match state.store().evaluate(&self.key, state).await {
            Ok(v) => v,
            Err(signal) => return Ok(vec![RouteOutcome::from(signal)]),
        };
        let Some(key_str) = value.downcast_ref::<String>() else {
            // Non-string keys never match anything; this is not an error,
            // matching `trie.py`'s early `return ()` for a non-string key.
            return Ok(Vec::new());
        };
        let mut outcomes = Vec::new();
        for succ in self.prefixes_of(key_str) {
            outcomes.extend(route_successor(&succ, state).await?);
        }
        Ok(outcomes)
    }
}

impl fmt::Debug for PrefixNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrefixNode({:?}, key={:?})", self.core.id(), self.key.id())
    }
}
