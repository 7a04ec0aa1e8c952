// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::expression::ExprRef;

use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;
use std::fmt::Write as FmtWrite;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Per-node display data of the rendered search tree.
#[derive(Debug)]
struct NodeData {
    /// The order in which the node was first visited; 0 until visited.
    display_id: u64,
    /// Function name and instruction text of the node's program point.
    name: String,
    subsumed: bool,
    /// Constraints added at this node: a stable key, the rendered text, and
    /// whether the constraint made it into the interpolant.
    path_conditions: Vec<(usize, String, bool)>,
}

/// The branch sense of a tree edge, or a subsumption pointer from a pruned
/// node to the node whose summary subsumed it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum EdgeData {
    False,
    True,
    Subsumption,
}

/// Storage of the search tree for display. Nodes and edges accumulate in a
/// petgraph graph as the interpolation tree runs; `save` renders the graph in
/// Graphviz dot format with record-shaped nodes, F/T child ports and dashed
/// subsumption edges.
#[derive(Debug)]
pub struct SearchGraph {
    graph: Graph<NodeData, EdgeData>,
    root: NodeIndex,
    /// Interpolation-tree node id to graph node.
    node_index: HashMap<u64, NodeIndex>,
    /// Subsumption-table entry (program point, bucket index) to the graph
    /// node whose removal created the entry.
    entry_index: HashMap<(u64, usize), NodeIndex>,
    /// Path-condition cell key to the graph node that added it.
    pc_index: HashMap<usize, NodeIndex>,
    next_display_id: u64,
}

impl SearchGraph {
    pub fn new(root_node_id: u64) -> SearchGraph {
        let mut graph = Graph::new();
        let root = graph.add_node(NodeData {
            display_id: 0,
            name: String::new(),
            subsumed: false,
            path_conditions: Vec::new(),
        });
        let mut node_index = HashMap::new();
        node_index.insert(root_node_id, root);
        SearchGraph {
            graph,
            root,
            node_index,
            entry_index: HashMap::new(),
            pc_index: HashMap::new(),
            next_display_id: 1,
        }
    }

    fn index_of(&self, node_id: u64) -> Option<NodeIndex> {
        self.node_index.get(&node_id).copied()
    }

    /// Registers the two children created by a split, false child first.
    pub fn add_children(&mut self, parent_id: u64, false_id: u64, true_id: u64) {
        let parent = match self.index_of(parent_id) {
            Some(parent) => parent,
            None => return,
        };
        let false_child = self.graph.add_node(NodeData {
            display_id: 0,
            name: String::new(),
            subsumed: false,
            path_conditions: Vec::new(),
        });
        let true_child = self.graph.add_node(NodeData {
            display_id: 0,
            name: String::new(),
            subsumed: false,
            path_conditions: Vec::new(),
        });
        self.graph.add_edge(parent, false_child, EdgeData::False);
        self.graph.add_edge(parent, true_child, EdgeData::True);
        self.node_index.insert(false_id, false_child);
        self.node_index.insert(true_id, true_child);
    }

    /// Names a node on its first visit and assigns its traversal order.
    pub fn set_current_node(&mut self, node_id: u64, name: &str) {
        if let Some(index) = self.index_of(node_id) {
            let data = &mut self.graph[index];
            if data.display_id == 0 {
                data.display_id = self.next_display_id;
                self.next_display_id += 1;
                data.name = name.to_string();
            }
        }
    }

    pub fn add_path_condition(&mut self, node_id: u64, pc_key: usize, constraint: &ExprRef) {
        if let Some(index) = self.index_of(node_id) {
            let text = dot_escape(&constraint.to_string());
            self.graph[index].path_conditions.push((pc_key, text, false));
            self.pc_index.insert(pc_key, index);
        }
    }

    /// Marks a constraint as included in the interpolant.
    pub fn include_in_interpolant(&mut self, pc_key: usize) {
        if let Some(index) = self.pc_index.get(&pc_key).copied() {
            for (key, _, in_interpolant) in &mut self.graph[index].path_conditions {
                if *key == pc_key {
                    *in_interpolant = true;
                }
            }
        }
    }

    /// Remembers which node's removal produced a table entry, so subsumption
    /// edges can point back at it.
    pub fn add_table_entry_mapping(&mut self, node_id: u64, entry_key: (u64, usize)) {
        if let Some(index) = self.index_of(node_id) {
            self.entry_index.insert(entry_key, index);
        }
    }

    /// Marks a node as subsumed by the given table entry, drawing a dashed
    /// edge to the subsuming node.
    pub fn mark_as_subsumed(&mut self, node_id: u64, entry_key: (u64, usize)) {
        let index = match self.index_of(node_id) {
            Some(index) => index,
            None => return,
        };
        self.graph[index].subsumed = true;
        if let Some(subsuming) = self.entry_index.get(&entry_key).copied() {
            self.graph.add_edge(index, subsuming, EdgeData::Subsumption);
        }
    }

    fn child(&self, index: NodeIndex, sense: EdgeData) -> Option<NodeIndex> {
        self.graph
            .edges_directed(index, Direction::Outgoing)
            .find(|edge| *edge.weight() == sense)
            .map(|edge| edge.target())
    }

    fn recurse_render(&self, index: NodeIndex, out: &mut String) {
        let data = &self.graph[index];
        let node_name = format!("Node{}", index.index());
        let _ = write!(out, "{} [shape=record,label=\"{{{}: {}\\l", node_name, data.display_id, data.name);
        for (_, text, in_interpolant) in &data.path_conditions {
            out.push_str(text);
            if *in_interpolant {
                out.push_str(" ITP");
            }
            out.push_str("\\l");
        }
        if data.subsumed {
            out.push_str("(subsumed)\\l");
        }
        let false_child = self.child(index, EdgeData::False);
        let true_child = self.child(index, EdgeData::True);
        if false_child.is_some() || true_child.is_some() {
            out.push_str("|{<s0>F|<s1>T}");
        }
        out.push_str("}\"];\n");
        if let Some(child) = false_child {
            let _ = writeln!(out, "{}:s0 -> Node{};", node_name, child.index());
        }
        if let Some(child) = true_child {
            let _ = writeln!(out, "{}:s1 -> Node{};", node_name, child.index());
        }
        if let Some(child) = false_child {
            self.recurse_render(child, out);
        }
        if let Some(child) = true_child {
            self.recurse_render(child, out);
        }
    }

    /// Renders the recorded tree in dot format.
    pub fn render(&self) -> String {
        let mut out = String::from("digraph search_tree {\n");
        self.recurse_render(self.root, &mut out);
        for edge in self.graph.edge_references() {
            if *edge.weight() == EdgeData::Subsumption {
                let _ = writeln!(
                    out,
                    "Node{} -> Node{} [style=dashed];",
                    edge.source().index(),
                    edge.target().index()
                );
            }
        }
        out.push_str("}\n");
        out
    }

    /// Saves the rendered graph to the given path.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(self.render().as_bytes())
    }
}

/// Escapes a rendered expression for inclusion in a dot record label:
/// comparison and shift operators use angle brackets, which delimit ports in
/// record shapes and must be backslash-escaped.
fn dot_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("\\<"),
            '>' => out.push_str("\\>"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            '|' => out.push_str("\\|"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}
