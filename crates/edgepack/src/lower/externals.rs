//! External input/output identification.

use std::collections::HashMap;

use crate::graph::{EdgeGraph, Node, NodeId, Opcode};

/// Role of an external slot at the graph boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    Input,
    Output,
}

/// One external slot: a stable id the runtime binds caller tensors to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalMeta {
    pub external_id: u32,
    pub io_kind: IoKind,
}

/// External slots in id order: inputs first, then outputs, ids contiguous
/// from 0.
///
/// A node can legitimately hold more than one entry — a placeholder that is
/// also returned gets an input role and an output role with two distinct
/// ids, and an output listed twice gets one entry per listed occurrence.
#[derive(Debug, Default)]
pub struct ExternalMap {
    entries: Vec<(NodeId, ExternalMeta)>,
    input_ids: HashMap<NodeId, u32>,
    output_nodes: HashMap<NodeId, u32>,
}

impl ExternalMap {
    /// Total number of external slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries ordered by external id.
    pub fn entries(&self) -> &[(NodeId, ExternalMeta)] {
        &self.entries
    }

    /// External id of the node's input role, if it has one.
    pub fn input_id(&self, node: NodeId) -> Option<u32> {
        self.input_ids.get(&node).copied()
    }

    pub fn is_output(&self, node: NodeId) -> bool {
        self.output_nodes.contains_key(&node)
    }

    fn push(&mut self, node: NodeId, io_kind: IoKind) {
        let external_id = self.entries.len() as u32;
        self.entries.push((
            node,
            ExternalMeta {
                external_id,
                io_kind,
            },
        ));
        match io_kind {
            IoKind::Input => {
                self.input_ids.insert(node, external_id);
            }
            IoKind::Output => {
                // First occurrence wins for the lookup; every occurrence
                // still owns its own entry above.
                self.output_nodes.entry(node).or_insert(external_id);
            }
        }
    }
}

/// Walks the graph once and assigns external ids to true inputs and outputs.
///
/// Pass 1 visits placeholders in declaration order, skipping those the
/// caller's predicate marks as parameter-backed; the runtime binds call
/// arguments to these slots positionally, so the order is load-bearing.
/// Pass 2 continues the same counter over the operands of every output
/// node, in listed order. Identical graphs always produce identical ids.
pub fn resolve_externals(graph: &EdgeGraph, is_param: &dyn Fn(&Node) -> bool) -> ExternalMap {
    let mut map = ExternalMap::default();

    for node in graph.nodes() {
        if node.opcode == Opcode::Placeholder && !is_param(node) {
            map.push(node.id, IoKind::Input);
        }
    }

    for node in graph.nodes() {
        if node.opcode == Opcode::Output {
            for operand in &node.operands {
                map.push(*operand, IoKind::Output);
            }
        }
    }

    map
}
