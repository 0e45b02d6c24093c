//! Softmax lowering.

use crate::graph::Node;
use crate::schema::{OperatorKind, SoftmaxSpec};

use super::super::{LowerContext, LowerError};
use super::{invalid_attr, require_attr_i64, NodeVisitor};

/// Lowers `softmax(input, axis)`. The backend only evaluates softmax over
/// the last dimension, so any other axis is rejected up front rather than
/// producing an operator the runtime would misexecute.
pub(super) struct SoftmaxVisitor;

impl NodeVisitor for SoftmaxVisitor {
    fn name(&self) -> &str {
        "softmax"
    }

    fn define_node(
        &self,
        node: &Node,
        debug_handle: u32,
        ctx: &mut LowerContext<'_>,
    ) -> Result<(), LowerError> {
        let input_node = ctx.operand(node, 0)?;
        let rank = ctx.tensor_spec(input_node)?.rank();

        let axis = require_attr_i64(node, "axis")?;
        let normalized = if axis < 0 { axis + rank as i64 } else { axis };
        if normalized < 0 || normalized as usize >= rank {
            return Err(invalid_attr(
                node,
                "axis",
                format!("axis {axis} is out of range for rank {rank}"),
            ));
        }
        if normalized as usize != rank - 1 {
            return Err(invalid_attr(
                node,
                "axis",
                "only the last dimension is supported",
            ));
        }

        let input = ctx.define_tensor(input_node)?;
        let out = ctx.define_tensor(node.id)?;
        ctx.push_operator(
            OperatorKind::Softmax(SoftmaxSpec {
                axis: normalized as usize,
            }),
            vec![input],
            vec![out],
            debug_handle,
        );
        Ok(())
    }
}
