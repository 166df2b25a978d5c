//! Structural graph dump for debugging and documentation.
//!
//! Grounded on the teacher's `visualization.rs` (DOT/Mermaid/ASCII rendering
//! of a compiled graph), scaled down to this crate's node model: a
//! [`Graph`] has no named nodes the way a `StateGraph` does, so nodes are
//! labeled by kind and a short numeric id, and edges are labeled by their
//! [`EdgeKey`](crate::node::EdgeKey) (a predicate's key-function id, an
//! equality value, a prefix literal, or `*` for an unconditional edge).
//! Diagnostic tooling only — it carries no persistence and never rendered by
//! the engine itself.

use crate::graph::Graph;
use crate::node::{EdgeKey, NodeId, NodeRef};
use std::collections::HashMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualizationFormat {
    Dot,
    Mermaid,
    Ascii,
}

#[derive(Debug, Clone)]
pub struct VisualizationOptions {
    pub format: VisualizationFormat,
    pub title: Option<String>,
}

impl VisualizationOptions {
    pub fn dot() -> Self {
        VisualizationOptions { format: VisualizationFormat::Dot, title: None }
    }

    pub fn mermaid() -> Self {
        VisualizationOptions { format: VisualizationFormat::Mermaid, title: None }
    }

    pub fn ascii() -> Self {
        VisualizationOptions { format: VisualizationFormat::Ascii, title: None }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

struct Collected {
    nodes: Vec<(String, String)>,
    edges: Vec<(String, String, String)>,
}

fn node_kind_label(node: &NodeRef) -> String {
    match node {
        NodeRef::Terminal(t) => format!("Terminal({:?})", t.priority()),
        NodeRef::Nonterminal(n) => n.kind_name().to_string(),
    }
}

fn edge_label(key: &EdgeKey) -> String {
    match key {
        EdgeKey::KeyFn(id) => format!("key#{id:?}"),
        EdgeKey::Value(v) => format!("{v:?}"),
        EdgeKey::Prefix(s) => format!("prefix({s:?})"),
        EdgeKey::Unit => "*".to_string(),
    }
}

/// Assign every distinct [`NodeId`] a short, DOT/Mermaid-safe identifier in
/// discovery order, so the same node reached via several paths renders once.
fn walk(node: &NodeRef, ids: &mut HashMap<NodeId, String>, out: &mut Collected) {
    let already_seen = ids.contains_key(&node.id());
    let next_id = ids.len();
    let label_id = ids
        .entry(node.id())
        .or_insert_with(|| format!("n{next_id}"))
        .clone();
    if already_seen {
        return;
    }
    out.nodes.push((label_id.clone(), node_kind_label(node)));
    if let NodeRef::Nonterminal(n) = node {
        for (key, successors) in n.successors_snapshot() {
            for succ in successors {
                let succ_already_seen = ids.contains_key(&succ.id());
                let succ_next_id = ids.len();
                let succ_id = ids
                    .entry(succ.id())
                    .or_insert_with(|| format!("n{succ_next_id}"))
                    .clone();
                out.edges.push((label_id.clone(), succ_id, edge_label(&key)));
                if !succ_already_seen {
                    walk(&succ, ids, out);
                }
            }
        }
    }
}

fn collect(graph: &Graph) -> Collected {
    let mut out = Collected { nodes: Vec::new(), edges: Vec::new() };
    let mut ids = HashMap::new();
    walk(&graph.root(), &mut ids, &mut out);
    out
}

/// Render `graph`'s structure in `options.format`.
pub fn visualize(graph: &Graph, options: &VisualizationOptions) -> String {
    let collected = collect(graph);
    match options.format {
        VisualizationFormat::Dot => render_dot(&collected, options),
        VisualizationFormat::Mermaid => render_mermaid(&collected, options),
        VisualizationFormat::Ascii => render_ascii(&collected),
    }
}

fn render_dot(collected: &Collected, options: &VisualizationOptions) -> String {
    let mut out = String::new();
    writeln!(out, "digraph G {{").unwrap();
    if let Some(title) = &options.title {
        writeln!(out, "  labelloc=\"t\";\n  label=\"{title}\";").unwrap();
    }
    for (id, label) in &collected.nodes {
        writeln!(out, "  {id} [label=\"{label}\"];").unwrap();
    }
    for (from, to, label) in &collected.edges {
        writeln!(out, "  {from} -> {to} [label=\"{label}\"];").unwrap();
    }
    writeln!(out, "}}").unwrap();
    out
}

fn render_mermaid(collected: &Collected, options: &VisualizationOptions) -> String {
    let mut out = String::new();
    if let Some(title) = &options.title {
        writeln!(out, "---\ntitle: {title}\n---").unwrap();
    }
    writeln!(out, "graph TD").unwrap();
    for (id, label) in &collected.nodes {
        writeln!(out, "  {id}[\"{label}\"]").unwrap();
    }
    for (from, to, label) in &collected.edges {
        writeln!(out, "  {from} -->|{label}| {to}").unwrap();
    }
    out
}

fn render_ascii(collected: &Collected) -> String {
    let mut out = String::new();
    for (id, label) in &collected.nodes {
        writeln!(out, "[{id}] {label}").unwrap();
    }
    for (from, to, label) in &collected.edges {
        writeln!(out, "  {from} --{label}--> {to}").unwrap();
    }
    out
}
