//! Graph lowering: turns a traced [`EdgeGraph`] into a [`BackendGraph`]
//! plus a packed constant buffer.
//!
//! One compilation owns its own value table, constant packer, and output
//! graph; nothing is shared across concurrent compilations except the
//! read-only visitor registry. Any failure discards the partial graph and
//! propagates — there is no degraded artifact.

pub mod constants;
pub mod externals;
pub mod values;
pub mod visitors;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::diagnostics::{Diagnostic, DiagnosticsSink, Stage};
use crate::graph::{EdgeGraph, Node, NodeId, Opcode, TensorSpec};
use crate::schema::{
    BackendGraph, BackendOperator, BackendValue, OperatorKind, ValidateError, ValueId,
    VALUE_FLAG_EXTERNAL_INPUT, VALUE_FLAG_EXTERNAL_OUTPUT,
};

pub use constants::ConstantPacker;
pub use externals::{resolve_externals, ExternalMap, ExternalMeta, IoKind};
pub use values::ValueTable;
pub use visitors::{
    ensure_builtin_visitors, list_visitors, register_visitor, visitor_for, NodeVisitor,
};

/// Debug handle recorded for nodes the tracer left unannotated.
pub const DEFAULT_DEBUG_HANDLE: u32 = 65535;

/// Failures raised while lowering a graph.
#[derive(Debug, Error)]
pub enum LowerError {
    #[error("operator `{op}` is not supported by the delegate (node `{node}`, debug handle {debug_handle})")]
    UnsupportedOperator {
        op: String,
        node: String,
        debug_handle: u32,
    },
    #[error("opcode {opcode:?} is not supported by the delegate (node `{node}`)")]
    UnsupportedOpcode { opcode: Opcode, node: String },
    #[error("value for node `{node}` was allocated twice")]
    DuplicateValue { node: String },
    #[error("node `{node}` is missing operand {index}")]
    MissingOperand { node: String, index: usize },
    #[error("operand references unknown node id {id}")]
    UnknownNode { id: u32 },
    #[error("node `{node}` carries no tensor spec")]
    MissingTensorSpec { node: String },
    #[error("node `{node}` must be backed by captured constant data")]
    MissingLiteral { node: String },
    #[error("call node `{node}` carries no operator identity")]
    MissingOperatorIdentity { node: String },
    #[error("invalid attribute `{attr}` on node `{node}`: {message}")]
    InvalidAttribute {
        node: String,
        attr: String,
        message: String,
    },
    #[error("assembled graph failed validation: {0}")]
    Validation(#[from] ValidateError),
}

/// Opaque record stating that an upstream rewrite pass already ran.
///
/// The assembler consumes these as facts about the incoming graph; it never
/// re-validates or re-runs the passes themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileSpec {
    pub key: String,
    pub value: Vec<u8>,
}

impl CompileSpec {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Output of [`assemble`]: the backend graph, its constant buffer, and the
/// per-operator debug handles (operator emission index -> handle).
#[derive(Debug)]
pub struct AssembledGraph {
    pub graph: BackendGraph,
    pub constants: Vec<u8>,
    pub debug_handles: BTreeMap<u32, u32>,
}

/// Final result of [`preprocess`]: the encoded artifact plus diagnostics
/// metadata for mapping emitted operators back to the traced graph.
#[derive(Debug)]
pub struct PreprocessResult {
    pub bytes: Vec<u8>,
    pub debug_handle_map: BTreeMap<u32, u32>,
}

/// Mutable lowering state handed to visitors.
///
/// Bundles the read-only input graph and external map with the value table,
/// constant packer, and the backend graph under construction.
pub struct LowerContext<'a> {
    graph: &'a EdgeGraph,
    externals: &'a ExternalMap,
    values: &'a mut ValueTable,
    constants: &'a mut ConstantPacker,
    out: &'a mut BackendGraph,
}

impl<'a> LowerContext<'a> {
    fn node(&self, id: NodeId) -> Result<&'a Node, LowerError> {
        let graph = self.graph;
        graph.node(id).ok_or(LowerError::UnknownNode { id: id.0 })
    }

    /// Operand node at `index`, or a `MissingOperand` failure.
    pub fn operand(&self, node: &Node, index: usize) -> Result<NodeId, LowerError> {
        node.operands
            .get(index)
            .copied()
            .ok_or_else(|| LowerError::MissingOperand {
                node: node.name.clone(),
                index,
            })
    }

    /// Tensor spec recorded for a node.
    pub fn tensor_spec(&self, id: NodeId) -> Result<&'a TensorSpec, LowerError> {
        let node = self.node(id)?;
        node.spec
            .as_ref()
            .ok_or_else(|| LowerError::MissingTensorSpec {
                node: node.name.clone(),
            })
    }

    /// Fails unless the node carries captured constant data.
    pub fn require_literal(&self, id: NodeId) -> Result<(), LowerError> {
        let node = self.node(id)?;
        let graph = self.graph;
        if graph.literal(id).is_some() {
            Ok(())
        } else {
            Err(LowerError::MissingLiteral {
                node: node.name.clone(),
            })
        }
    }

    /// Returns the backend value id for a node, creating the value record on
    /// first use.
    ///
    /// First use allocates the next sequential id, stamps external flags
    /// from the resolved boundary map, and packs attached constant bytes.
    /// Every later call for the same node returns the same id.
    pub fn define_tensor(&mut self, id: NodeId) -> Result<ValueId, LowerError> {
        if let Some(existing) = self.values.get(id) {
            return Ok(existing);
        }

        let node = self.node(id)?;
        let spec = node
            .spec
            .as_ref()
            .ok_or_else(|| LowerError::MissingTensorSpec {
                node: node.name.clone(),
            })?;
        let value = self.values.allocate(id, &node.name)?;

        let mut flags = 0u32;
        if self.externals.input_id(id).is_some() {
            flags |= VALUE_FLAG_EXTERNAL_INPUT;
        }
        if self.externals.is_output(id) {
            flags |= VALUE_FLAG_EXTERNAL_OUTPUT;
        }

        let graph = self.graph;
        let constant_id = match graph.literal(id) {
            Some(literal) => Some(self.constants.append(&literal.bytes).0),
            None => None,
        };

        self.out.values.push(BackendValue {
            id: value,
            dtype: spec.dtype,
            dims: spec.dims.clone(),
            flags,
            constant_id,
        });
        Ok(value)
    }

    /// Appends one backend operator record in emission order.
    pub fn push_operator(
        &mut self,
        op: OperatorKind,
        inputs: Vec<ValueId>,
        outputs: Vec<ValueId>,
        debug_handle: u32,
    ) {
        self.out.operators.push(BackendOperator {
            op,
            inputs,
            outputs,
            debug_handle,
        });
    }
}

/// Lowers the graph into backend records.
///
/// Traverses nodes in declaration order, dispatching each call node to its
/// registered visitor. `is_param` distinguishes true runtime inputs from
/// parameter-backed placeholders. Identical graphs yield identical output;
/// the runtime binds caller tensors to slots by position and relies on it.
pub fn assemble(
    graph: &EdgeGraph,
    is_param: &dyn Fn(&Node) -> bool,
    sink: &dyn DiagnosticsSink,
) -> Result<AssembledGraph, LowerError> {
    ensure_builtin_visitors();

    let externals = resolve_externals(graph, is_param);
    sink.emit(Diagnostic::new(
        Stage::Externals,
        None,
        format!("resolved {} external slots", externals.len()),
    ));

    let mut out = BackendGraph::new(externals.len() as u32);
    let mut values = ValueTable::new();
    let mut constants = ConstantPacker::new();
    let mut debug_handles = BTreeMap::new();

    {
        let mut ctx = LowerContext {
            graph,
            externals: &externals,
            values: &mut values,
            constants: &mut constants,
            out: &mut out,
        };

        for node in graph.nodes() {
            match node.opcode {
                Opcode::Placeholder | Opcode::GetAttr | Opcode::Output => continue,
                Opcode::CallOperator => {
                    let identity =
                        node.op
                            .as_ref()
                            .ok_or_else(|| LowerError::MissingOperatorIdentity {
                                node: node.name.clone(),
                            })?;
                    // The input graph must already be topologically ordered;
                    // lowering never re-sorts.
                    debug_assert!(
                        node.operands.iter().all(|operand| operand.0 < node.id.0),
                        "operand declared after its consumer"
                    );
                    tracing::debug!(node = %node.name, op = %identity, "lowering operator");

                    let handle = node.debug_handle.unwrap_or(DEFAULT_DEBUG_HANDLE);
                    let visitor = visitor_for(identity.as_str()).ok_or_else(|| {
                        LowerError::UnsupportedOperator {
                            op: identity.as_str().to_string(),
                            node: node.name.clone(),
                            debug_handle: handle,
                        }
                    })?;

                    let first = ctx.out.operators.len();
                    visitor.define_node(node, handle, &mut ctx)?;
                    for index in first..ctx.out.operators.len() {
                        debug_handles.insert(index as u32, handle);
                    }
                }
                opcode => {
                    return Err(LowerError::UnsupportedOpcode {
                        opcode,
                        node: node.name.clone(),
                    })
                }
            }
        }

        // Boundary slots in external-id order. define_tensor is idempotent,
        // so values already emitted by visitors keep their ids; an extern
        // nothing referenced still gets a record here.
        for (node, meta) in externals.entries() {
            let id = ctx.define_tensor(*node)?;
            match meta.io_kind {
                IoKind::Input => ctx.out.input_ids.push(id),
                IoKind::Output => ctx.out.output_ids.push(id),
            }
        }
    }

    let (buffer, table) = constants.into_parts();
    out.constant_table = table;
    out.validate(buffer.len() as u64)?;
    sink.emit(Diagnostic::new(
        Stage::Validate,
        None,
        format!(
            "{} operators, {} values, {} constant bytes",
            out.operators.len(),
            out.values.len(),
            buffer.len()
        ),
    ));

    Ok(AssembledGraph {
        graph: out,
        constants: buffer,
        debug_handles,
    })
}

/// Lowers and encodes a graph into the final binary artifact.
///
/// Compile specs are consumed as statements about rewrites that already ran
/// upstream; they are surfaced through the sink and otherwise do not steer
/// lowering. Encoder failures propagate unchanged.
pub fn preprocess(
    graph: &EdgeGraph,
    compile_specs: &[CompileSpec],
    is_param: &dyn Fn(&Node) -> bool,
    sink: &dyn DiagnosticsSink,
) -> anyhow::Result<PreprocessResult> {
    for spec in compile_specs {
        sink.emit(Diagnostic::new(
            Stage::Lower,
            None,
            format!("graph reflects upstream pass `{}`", spec.key),
        ));
    }

    let assembled = assemble(graph, is_param, sink)?;
    let bytes = crate::serialize::encode(&assembled.graph, &assembled.constants)?;
    sink.emit(Diagnostic::new(
        Stage::Encode,
        None,
        format!("encoded {} bytes", bytes.len()),
    ));

    Ok(PreprocessResult {
        bytes,
        debug_handle_map: assembled.debug_handles,
    })
}
