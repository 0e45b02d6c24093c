//! Read-only input graph consumed by the lowering pipeline.
//!
//! Nodes live in a flat arena and are identified by [`NodeId`], assigned in
//! declaration order. The pipeline never mutates a graph after
//! [`GraphBuilder::finish`]; lowering is a pure read-then-build pass.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::schema::DType;

/// Stable arena index of a node, assigned in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Structural role of a node in the traced graph.
///
/// Only the first four kinds are recognized by the delegate; `CallMethod`
/// and `CallModule` exist in the source dialect and are rejected during
/// lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Placeholder,
    CallOperator,
    GetAttr,
    Output,
    CallMethod,
    CallModule,
}

/// Interned operator identity used as the visitor registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpIdentity(Arc<str>);

impl OpIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::<str>::from(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OpIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for OpIdentity {
    fn from(name: &str) -> Self {
        OpIdentity::new(name)
    }
}

impl From<String> for OpIdentity {
    fn from(name: String) -> Self {
        OpIdentity::new(name)
    }
}

/// Scalar attribute payloads attached to call nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    I64(i64),
    F64(f64),
    Bool(bool),
    String(String),
    I64Array(Vec<i64>),
    F64Array(Vec<f64>),
}

/// Tensor metadata coupling dtype and static dims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSpec {
    pub dtype: DType,
    pub dims: Vec<usize>,
}

impl TensorSpec {
    pub fn new(dtype: DType, dims: impl Into<Vec<usize>>) -> Self {
        Self {
            dtype,
            dims: dims.into(),
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn byte_len(&self) -> usize {
        self.element_count() * self.dtype.size_in_bytes()
    }
}

/// Dense constant payload backing a parameter or attribute node.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorLiteral {
    pub spec: TensorSpec,
    pub bytes: Arc<[u8]>,
}

impl TensorLiteral {
    pub fn new(spec: TensorSpec, bytes: Arc<[u8]>) -> Self {
        Self { spec, bytes }
    }

    /// Convenience constructor packing little-endian f32 data.
    pub fn from_f32(dims: impl Into<Vec<usize>>, data: &[f32]) -> Self {
        let mut bytes = Vec::with_capacity(data.len() * 4);
        for value in data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        Self {
            spec: TensorSpec::new(DType::F32, dims),
            bytes: Arc::from(bytes),
        }
    }
}

/// One traced node. Operand references always point at earlier nodes.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub opcode: Opcode,
    pub name: String,
    pub op: Option<OpIdentity>,
    pub operands: SmallVec<[NodeId; 4]>,
    pub spec: Option<TensorSpec>,
    pub attrs: BTreeMap<String, AttrValue>,
    pub debug_handle: Option<u32>,
}

impl Node {
    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }
}

/// The traced graph handed to the pipeline, immutable once built.
#[derive(Debug, Clone, Default)]
pub struct EdgeGraph {
    nodes: Vec<Node>,
    literals: HashMap<NodeId, TensorLiteral>,
}

impl EdgeGraph {
    /// Nodes in declaration order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    /// Constant payload attached to a parameter or attribute node.
    pub fn literal(&self, id: NodeId) -> Option<&TensorLiteral> {
        self.literals.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Incremental builder recording nodes in declaration order.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    literals: HashMap<NodeId, TensorLiteral>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        node.id = id;
        self.nodes.push(node);
        id
    }

    fn blank(opcode: Opcode, name: impl Into<String>) -> Node {
        Node {
            id: NodeId(0),
            opcode,
            name: name.into(),
            op: None,
            operands: SmallVec::new(),
            spec: None,
            attrs: BTreeMap::new(),
            debug_handle: None,
        }
    }

    /// Declares a graph boundary placeholder (a true runtime input unless the
    /// caller's parameter predicate says otherwise).
    pub fn placeholder(&mut self, name: impl Into<String>, spec: TensorSpec) -> NodeId {
        let mut node = Self::blank(Opcode::Placeholder, name);
        node.spec = Some(spec);
        self.push(node)
    }

    /// Declares a placeholder backed by captured parameter data.
    pub fn parameter(&mut self, name: impl Into<String>, literal: TensorLiteral) -> NodeId {
        let mut node = Self::blank(Opcode::Placeholder, name);
        node.spec = Some(literal.spec.clone());
        let id = self.push(node);
        self.literals.insert(id, literal);
        id
    }

    /// Declares an attribute fetch carrying captured constant data.
    pub fn get_attr(&mut self, name: impl Into<String>, literal: TensorLiteral) -> NodeId {
        let mut node = Self::blank(Opcode::GetAttr, name);
        node.spec = Some(literal.spec.clone());
        let id = self.push(node);
        self.literals.insert(id, literal);
        id
    }

    /// Records an operator call over earlier nodes.
    pub fn call(
        &mut self,
        op: impl Into<OpIdentity>,
        name: impl Into<String>,
        operands: &[NodeId],
        spec: TensorSpec,
    ) -> NodeId {
        let mut node = Self::blank(Opcode::CallOperator, name);
        node.op = Some(op.into());
        node.operands = SmallVec::from_slice(operands);
        node.spec = Some(spec);
        self.push(node)
    }

    /// Records a method call. The delegate rejects these during lowering;
    /// the builder keeps them so callers can represent the full dialect.
    pub fn call_method(
        &mut self,
        name: impl Into<String>,
        operands: &[NodeId],
        spec: TensorSpec,
    ) -> NodeId {
        let mut node = Self::blank(Opcode::CallMethod, name);
        node.operands = SmallVec::from_slice(operands);
        node.spec = Some(spec);
        self.push(node)
    }

    /// Records the graph output list in declared order.
    pub fn output(&mut self, operands: &[NodeId]) -> NodeId {
        let mut node = Self::blank(Opcode::Output, "output");
        node.operands = SmallVec::from_slice(operands);
        self.push(node)
    }

    pub fn set_attr(&mut self, id: NodeId, key: impl Into<String>, value: AttrValue) {
        if let Some(node) = self.nodes.get_mut(id.0 as usize) {
            node.attrs.insert(key.into(), value);
        }
    }

    pub fn set_debug_handle(&mut self, id: NodeId, handle: u32) {
        if let Some(node) = self.nodes.get_mut(id.0 as usize) {
            node.debug_handle = Some(handle);
        }
    }

    pub fn finish(self) -> EdgeGraph {
        EdgeGraph {
            nodes: self.nodes,
            literals: self.literals,
        }
    }
}
