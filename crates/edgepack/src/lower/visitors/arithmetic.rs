//! Elementwise binary arithmetic lowering.

use std::sync::Arc;

use crate::graph::Node;
use crate::schema::{BinaryOp, OperatorKind};

use super::super::{LowerContext, LowerError};
use super::NodeVisitor;

struct BinaryArithmeticVisitor {
    name: &'static str,
    op: BinaryOp,
}

impl NodeVisitor for BinaryArithmeticVisitor {
    fn name(&self) -> &str {
        self.name
    }

    fn define_node(
        &self,
        node: &Node,
        debug_handle: u32,
        ctx: &mut LowerContext<'_>,
    ) -> Result<(), LowerError> {
        let lhs = ctx.define_tensor(ctx.operand(node, 0)?)?;
        let rhs = ctx.define_tensor(ctx.operand(node, 1)?)?;
        let out = ctx.define_tensor(node.id)?;
        ctx.push_operator(
            OperatorKind::ElementwiseBinary(self.op),
            vec![lhs, rhs],
            vec![out],
            debug_handle,
        );
        Ok(())
    }
}

pub(super) fn visitors() -> Vec<Arc<dyn NodeVisitor>> {
    vec![
        Arc::new(BinaryArithmeticVisitor {
            name: "add",
            op: BinaryOp::Add,
        }),
        Arc::new(BinaryArithmeticVisitor {
            name: "sub",
            op: BinaryOp::Sub,
        }),
        Arc::new(BinaryArithmeticVisitor {
            name: "mul",
            op: BinaryOp::Mul,
        }),
        Arc::new(BinaryArithmeticVisitor {
            name: "div",
            op: BinaryOp::Div,
        }),
    ]
}
