//! Static transpose (permute) lowering.

use crate::graph::Node;
use crate::schema::{OperatorKind, TransposeSpec};

use super::super::{LowerContext, LowerError};
use super::{invalid_attr, require_attr_i64_array, NodeVisitor};

pub(super) struct TransposeVisitor;

impl NodeVisitor for TransposeVisitor {
    fn name(&self) -> &str {
        "static_transpose"
    }

    fn define_node(
        &self,
        node: &Node,
        debug_handle: u32,
        ctx: &mut LowerContext<'_>,
    ) -> Result<(), LowerError> {
        let input_node = ctx.operand(node, 0)?;
        let rank = ctx.tensor_spec(input_node)?.rank();

        let raw = require_attr_i64_array(node, "perm")?;
        if raw.len() != rank {
            return Err(invalid_attr(
                node,
                "perm",
                format!("permutation lists {} axes for rank {rank}", raw.len()),
            ));
        }
        let mut perm = Vec::with_capacity(raw.len());
        let mut seen = vec![false; rank];
        for &axis in raw {
            let axis = usize::try_from(axis)
                .ok()
                .filter(|axis| *axis < rank)
                .ok_or_else(|| {
                    invalid_attr(node, "perm", format!("axis {axis} is out of range"))
                })?;
            if seen[axis] {
                return Err(invalid_attr(
                    node,
                    "perm",
                    format!("axis {axis} appears twice"),
                ));
            }
            seen[axis] = true;
            perm.push(axis);
        }

        let input = ctx.define_tensor(input_node)?;
        let out = ctx.define_tensor(node.id)?;
        ctx.push_operator(
            OperatorKind::StaticTranspose(TransposeSpec { perm }),
            vec![input],
            vec![out],
            debug_handle,
        );
        Ok(())
    }
}
