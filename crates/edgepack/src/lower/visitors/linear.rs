//! Fully-connected (linear) lowering.

use crate::graph::Node;
use crate::schema::OperatorKind;

use super::super::{LowerContext, LowerError};
use super::NodeVisitor;

/// Lowers `linear(input, weight[, bias])`. Weight and bias must be backed by
/// captured constant data so their bytes can be packed into the artifact.
pub(super) struct LinearVisitor;

impl NodeVisitor for LinearVisitor {
    fn name(&self) -> &str {
        "linear"
    }

    fn define_node(
        &self,
        node: &Node,
        debug_handle: u32,
        ctx: &mut LowerContext<'_>,
    ) -> Result<(), LowerError> {
        let input = ctx.define_tensor(ctx.operand(node, 0)?)?;

        let weight_node = ctx.operand(node, 1)?;
        ctx.require_literal(weight_node)?;
        let weight = ctx.define_tensor(weight_node)?;

        let mut inputs = vec![input, weight];
        if node.operands.len() > 2 {
            let bias_node = ctx.operand(node, 2)?;
            ctx.require_literal(bias_node)?;
            inputs.push(ctx.define_tensor(bias_node)?);
        }

        let out = ctx.define_tensor(node.id)?;
        ctx.push_operator(OperatorKind::FullyConnected, inputs, vec![out], debug_handle);
        Ok(())
    }
}
