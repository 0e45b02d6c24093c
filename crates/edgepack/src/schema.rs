//! Backend IR records handed to the binary encoder.
//!
//! The schema is the sole contract between the assembler and the artifact
//! container: any change here must ship together with a container version
//! bump in [`crate::serialize`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Frozen schema version recorded in every assembled graph.
pub const SCHEMA_VERSION: &str = "edgeir.v1";

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// Marks a value as an external input slot of the delegated graph.
pub const VALUE_FLAG_EXTERNAL_INPUT: u32 = 1 << 0;
/// Marks a value as an external output slot of the delegated graph.
pub const VALUE_FLAG_EXTERNAL_OUTPUT: u32 = 1 << 1;

/// Scalar element types representable in the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    F32,
    F16,
    Si32,
    Si8,
    Ui8,
}

impl DType {
    /// Storage size of one element in bytes.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F32 | DType::Si32 => 4,
            DType::F16 => 2,
            DType::Si8 | DType::Ui8 => 1,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F16)
    }
}

/// Unique identifier for backend values within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueId(pub u32);

/// Placement of one packed constant inside the shared constant buffer.
///
/// Offsets are relative to the start of the constant payload, not the
/// artifact file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantSegment {
    pub offset: u64,
    pub length: u64,
}

/// Backend tensor descriptor referenced by id from operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendValue {
    pub id: ValueId,
    pub dtype: DType,
    pub dims: Vec<usize>,
    pub flags: u32,
    /// Index into [`BackendGraph::constant_table`] when the value is backed
    /// by packed constant data.
    pub constant_id: Option<u32>,
}

impl BackendValue {
    pub fn is_external_input(&self) -> bool {
        self.flags & VALUE_FLAG_EXTERNAL_INPUT != 0
    }

    pub fn is_external_output(&self) -> bool {
        self.flags & VALUE_FLAG_EXTERNAL_OUTPUT != 0
    }

    /// Total byte length implied by dims and dtype.
    pub fn byte_len(&self) -> u64 {
        let elems: usize = self.dims.iter().product();
        (elems * self.dtype.size_in_bytes()) as u64
    }
}

/// Elementwise binary arithmetic kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Elementwise unary activation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Relu,
    Sigmoid,
}

/// Attribute payload for `hardtanh`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClampSpec {
    pub min: f64,
    pub max: f64,
}

/// Attribute payload for `softmax`. The axis is already normalized to the
/// last dimension by lowering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftmaxSpec {
    pub axis: usize,
}

/// Permutation payload for `static_transpose`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransposeSpec {
    pub perm: Vec<usize>,
}

/// Declarative form of backend operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperatorKind {
    ElementwiseBinary(BinaryOp),
    ElementwiseUnary(UnaryOp),
    Hardtanh(ClampSpec),
    FullyConnected,
    Softmax(SoftmaxSpec),
    StaticTranspose(TransposeSpec),
}

/// Single backend operator record, ordered by emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendOperator {
    pub op: OperatorKind,
    pub inputs: Vec<ValueId>,
    pub outputs: Vec<ValueId>,
    pub debug_handle: u32,
}

/// The assembled backend graph handed to the binary encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendGraph {
    #[serde(default = "default_schema_version")]
    pub version: String,
    pub operators: Vec<BackendOperator>,
    pub values: Vec<BackendValue>,
    pub num_externs: u32,
    pub input_ids: Vec<ValueId>,
    pub output_ids: Vec<ValueId>,
    pub constant_table: Vec<ConstantSegment>,
}

impl BackendGraph {
    /// Creates an empty graph for the given number of external slots.
    ///
    /// Entry 0 of the constant table is the reserved empty segment; real
    /// constants always occupy indices >= 1.
    pub fn new(num_externs: u32) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            operators: Vec::new(),
            values: Vec::new(),
            num_externs,
            input_ids: Vec::new(),
            output_ids: Vec::new(),
            constant_table: vec![ConstantSegment {
                offset: 0,
                length: 0,
            }],
        }
    }

    pub fn value(&self, id: ValueId) -> Option<&BackendValue> {
        self.values.iter().find(|value| value.id == id)
    }

    /// Human-readable dump for diagnostics and golden tests.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Checks the structural invariants the encoder relies on.
    ///
    /// `constant_len` is the length of the constant buffer paired with this
    /// graph. Failures here indicate an assembler or visitor bug, never a
    /// malformed user graph.
    pub fn validate(&self, constant_len: u64) -> Result<(), ValidateError> {
        let mut seen = std::collections::HashSet::with_capacity(self.values.len());
        for value in &self.values {
            if !seen.insert(value.id) {
                return Err(ValidateError::DuplicateValueId { id: value.id.0 });
            }
        }

        let check_ref = |id: ValueId, context: &'static str| {
            if seen.contains(&id) {
                Ok(())
            } else {
                Err(ValidateError::UnknownValueId {
                    id: id.0,
                    context,
                })
            }
        };

        for operator in &self.operators {
            for id in &operator.inputs {
                check_ref(*id, "operator input")?;
            }
            for id in &operator.outputs {
                check_ref(*id, "operator output")?;
            }
        }

        if self.input_ids.len() + self.output_ids.len() != self.num_externs as usize {
            return Err(ValidateError::ExternCount {
                num_externs: self.num_externs,
                inputs: self.input_ids.len(),
                outputs: self.output_ids.len(),
            });
        }
        for id in &self.input_ids {
            check_ref(*id, "graph input")?;
            if !self.value(*id).is_some_and(BackendValue::is_external_input) {
                return Err(ValidateError::MissingExternalFlag {
                    id: id.0,
                    expected: "external-input",
                });
            }
        }
        for id in &self.output_ids {
            check_ref(*id, "graph output")?;
            if !self.value(*id).is_some_and(BackendValue::is_external_output) {
                return Err(ValidateError::MissingExternalFlag {
                    id: id.0,
                    expected: "external-output",
                });
            }
        }

        for segment in &self.constant_table {
            let end = segment
                .offset
                .checked_add(segment.length)
                .ok_or(ValidateError::ConstantOutOfBounds {
                    offset: segment.offset,
                    length: segment.length,
                    buffer_len: constant_len,
                })?;
            if end > constant_len {
                return Err(ValidateError::ConstantOutOfBounds {
                    offset: segment.offset,
                    length: segment.length,
                    buffer_len: constant_len,
                });
            }
        }

        // Non-empty segments must not overlap; the packer never aliases.
        let mut occupied: Vec<&ConstantSegment> = self
            .constant_table
            .iter()
            .filter(|segment| segment.length > 0)
            .collect();
        occupied.sort_by_key(|segment| segment.offset);
        for pair in occupied.windows(2) {
            if pair[0].offset + pair[0].length > pair[1].offset {
                return Err(ValidateError::ConstantOverlap {
                    first_offset: pair[0].offset,
                    second_offset: pair[1].offset,
                });
            }
        }

        for value in &self.values {
            if let Some(index) = value.constant_id {
                let segment = self.constant_table.get(index as usize).ok_or(
                    ValidateError::UnknownConstantIndex {
                        id: value.id.0,
                        index,
                    },
                )?;
                if segment.length != value.byte_len() {
                    return Err(ValidateError::ConstantSizeMismatch {
                        id: value.id.0,
                        expected: value.byte_len(),
                        got: segment.length,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Structural invariant violations detected before encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidateError {
    #[error("value id {id} is declared twice")]
    DuplicateValueId { id: u32 },
    #[error("{context} references unknown value id {id}")]
    UnknownValueId { id: u32, context: &'static str },
    #[error("num_externs is {num_externs} but the graph lists {inputs} inputs and {outputs} outputs")]
    ExternCount {
        num_externs: u32,
        inputs: usize,
        outputs: usize,
    },
    #[error("value id {id} is listed as a graph boundary but lacks the {expected} flag")]
    MissingExternalFlag { id: u32, expected: &'static str },
    #[error("constant segment (offset {offset}, length {length}) exceeds buffer of {buffer_len} bytes")]
    ConstantOutOfBounds {
        offset: u64,
        length: u64,
        buffer_len: u64,
    },
    #[error("constant segments at offsets {first_offset} and {second_offset} overlap")]
    ConstantOverlap {
        first_offset: u64,
        second_offset: u64,
    },
    #[error("value id {id} references constant table index {index} which does not exist")]
    UnknownConstantIndex { id: u32, index: u32 },
    #[error("constant data for value id {id} is {got} bytes but the value spec implies {expected}")]
    ConstantSizeMismatch { id: u32, expected: u64, got: u64 },
}
