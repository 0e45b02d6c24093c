//! Unary activation lowering: relu, sigmoid, hardtanh.

use std::sync::Arc;

use crate::graph::Node;
use crate::schema::{ClampSpec, OperatorKind, UnaryOp};

use super::super::{LowerContext, LowerError};
use super::{attr_f64_or, NodeVisitor};

struct UnaryActivationVisitor {
    name: &'static str,
    op: UnaryOp,
}

impl NodeVisitor for UnaryActivationVisitor {
    fn name(&self) -> &str {
        self.name
    }

    fn define_node(
        &self,
        node: &Node,
        debug_handle: u32,
        ctx: &mut LowerContext<'_>,
    ) -> Result<(), LowerError> {
        let input = ctx.define_tensor(ctx.operand(node, 0)?)?;
        let out = ctx.define_tensor(node.id)?;
        ctx.push_operator(
            OperatorKind::ElementwiseUnary(self.op),
            vec![input],
            vec![out],
            debug_handle,
        );
        Ok(())
    }
}

/// Hardtanh clamps to `[min, max]`, defaulting to `[-1, 1]` when the traced
/// call left the bounds implicit.
struct HardtanhVisitor;

impl NodeVisitor for HardtanhVisitor {
    fn name(&self) -> &str {
        "hardtanh"
    }

    fn define_node(
        &self,
        node: &Node,
        debug_handle: u32,
        ctx: &mut LowerContext<'_>,
    ) -> Result<(), LowerError> {
        let min = attr_f64_or(node, "min", -1.0)?;
        let max = attr_f64_or(node, "max", 1.0)?;
        let input = ctx.define_tensor(ctx.operand(node, 0)?)?;
        let out = ctx.define_tensor(node.id)?;
        ctx.push_operator(
            OperatorKind::Hardtanh(ClampSpec { min, max }),
            vec![input],
            vec![out],
            debug_handle,
        );
        Ok(())
    }
}

pub(super) fn visitors() -> Vec<Arc<dyn NodeVisitor>> {
    vec![
        Arc::new(UnaryActivationVisitor {
            name: "relu",
            op: UnaryOp::Relu,
        }),
        Arc::new(UnaryActivationVisitor {
            name: "sigmoid",
            op: UnaryOp::Sigmoid,
        }),
        Arc::new(HardtanhVisitor),
    ]
}
