//! Small weighted graph with GraphViz DOT output and a circular layout.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeAttrs {
    pub label: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub weight: f64,
    pub color: Option<String>,
}

/// Node coordinates of a drawn graph, one CSV row per node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub node: String,
    pub x: f64,
    pub y: f64,
}

/// Nodes and edges in insertion-independent (sorted) order.
///
/// Undirected graphs store each edge once with its endpoints sorted.
#[derive(Debug, Clone, Default)]
pub struct WeightedGraph {
    pub directed: bool,
    nodes: BTreeMap<String, NodeAttrs>,
    edges: BTreeMap<(String, String), Edge>,
}

impl WeightedGraph {
    pub fn directed() -> Self {
        Self {
            directed: true,
            ..Default::default()
        }
    }

    pub fn undirected() -> Self {
        Self::default()
    }

    fn edge_key(&self, a: &str, b: &str) -> (String, String) {
        if !self.directed && b < a {
            (b.to_string(), a.to_string())
        } else {
            (a.to_string(), b.to_string())
        }
    }

    pub fn add_node(&mut self, id: &str, attrs: NodeAttrs) {
        self.nodes.insert(id.to_string(), attrs);
    }

    fn ensure_node(&mut self, id: &str) {
        self.nodes.entry(id.to_string()).or_default();
    }

    /// Insert or replace an edge
    pub fn set_edge(&mut self, source: &str, target: &str, weight: f64, color: Option<&str>) {
        self.ensure_node(source);
        self.ensure_node(target);
        let (s, t) = self.edge_key(source, target);
        self.edges.insert(
            (s.clone(), t.clone()),
            Edge {
                source: s,
                target: t,
                weight,
                color: color.map(str::to_string),
            },
        );
    }

    /// Add `by` to an edge's weight, creating it at zero first
    pub fn increment_edge(&mut self, source: &str, target: &str, by: f64) {
        self.ensure_node(source);
        self.ensure_node(target);
        let (s, t) = self.edge_key(source, target);
        self.edges
            .entry((s.clone(), t.clone()))
            .or_insert(Edge {
                source: s,
                target: t,
                weight: 0.0,
                color: None,
            })
            .weight += by;
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&String, &NodeAttrs)> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn edge_weight(&self, a: &str, b: &str) -> Option<f64> {
        self.edges.get(&self.edge_key(a, b)).map(|e| e.weight)
    }

    pub fn degree(&self, id: &str) -> usize {
        self.edges
            .values()
            .filter(|e| e.source == id || e.target == id)
            .count()
    }

    /// Nodes on the unit circle in sorted id order, the first at angle zero.
    /// A lone node sits at the origin.
    pub fn circular_layout(&self) -> Vec<NodePosition> {
        let n = self.nodes.len();
        self.nodes
            .keys()
            .enumerate()
            .map(|(i, id)| {
                let (x, y) = if n == 1 {
                    (0.0, 0.0)
                } else {
                    let angle = 2.0 * PI * i as f64 / n as f64;
                    (angle.cos(), angle.sin())
                };
                NodePosition {
                    node: id.clone(),
                    x,
                    y,
                }
            })
            .collect()
    }

    /// Render as GraphViz DOT; edge weight also sets the pen width
    pub fn to_dot(&self, name: &str, title: &str) -> String {
        let (keyword, arrow) = if self.directed {
            ("digraph", "->")
        } else {
            ("graph", "--")
        };

        let mut dot = String::new();
        dot.push_str(&format!("{} {} {{\n", keyword, name));
        dot.push_str("    node [shape=circle, style=filled, fillcolor=lightblue];\n");
        dot.push_str(&format!("    label=\"{}\";\n", escape(title)));
        dot.push_str("    labelloc=t;\n\n");

        for (id, attrs) in &self.nodes {
            let mut parts = Vec::new();
            if let Some(label) = &attrs.label {
                parts.push(format!("label=\"{}\"", escape(label)));
            }
            if let Some(color) = &attrs.color {
                parts.push(format!("fillcolor={}", color));
            }
            if parts.is_empty() {
                dot.push_str(&format!("    \"{}\";\n", escape(id)));
            } else {
                dot.push_str(&format!("    \"{}\" [{}];\n", escape(id), parts.join(", ")));
            }
        }

        dot.push('\n');
        for edge in self.edges.values() {
            let mut attrs = format!("weight={}, penwidth={:.2}", edge.weight, edge.weight);
            if let Some(color) = &edge.color {
                attrs.push_str(&format!(", color={}", color));
            }
            dot.push_str(&format!(
                "    \"{}\" {} \"{}\" [{}];\n",
                escape(&edge.source),
                arrow,
                escape(&edge.target),
                attrs
            ));
        }

        dot.push_str("}\n");
        dot
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
