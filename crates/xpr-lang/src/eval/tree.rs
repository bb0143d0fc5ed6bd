use super::{EvalContext, Flow, error::EvalError, eval_operand, normal, ops};
use crate::{
    ast::{NodeId, NodeKind, Operator},
    range::Range,
    value::Value,
};

/// Evaluates the folded statements of a block; the last one is the result.
pub(crate) fn eval_roots(ctx: &EvalContext<'_>, roots: &[NodeId]) -> Result<Flow, EvalError> {
    let mut last = Value::Null;
    for &root in roots {
        last = normal!(eval_operand(ctx, root)?);
    }
    Ok(Flow::Normal(last))
}

pub(crate) fn eval_node(ctx: &EvalContext<'_>, id: NodeId) -> Result<Flow, EvalError> {
    let value = match ctx.arena[id].kind {
        NodeKind::BinaryOp { .. } => return binary(ctx, id),
        NodeKind::And { left, right } => {
            let left = normal!(eval_operand(ctx, left)?);
            Value::Bool(ops::truthy(&left)? && ops::truthy(&normal!(eval_operand(ctx, right)?))?)
        }
        NodeKind::Or { left, right } => {
            let left = normal!(eval_operand(ctx, left)?);
            Value::Bool(ops::truthy(&left)? || ops::truthy(&normal!(eval_operand(ctx, right)?))?)
        }
        NodeKind::Ternary { cond, then, otherwise } => {
            let cond = normal!(eval_operand(ctx, cond)?);
            return eval_operand(ctx, if ops::truthy(&cond)? { then } else { otherwise });
        }
        _ => return eval_operand(ctx, id),
    };
    Ok(Flow::Normal(value))
}

/// Evaluates a run of equal-precedence operators left to right.
///
/// `(a op1 b) op2 c` that fails on `op1` with a type mismatch is retried
/// once as `a op1 (b op2 c)` when `c` is a plain operand.
fn binary(ctx: &EvalContext<'_>, id: NodeId) -> Result<Flow, EvalError> {
    let arena = ctx.arena;
    let NodeKind::BinaryOp { op: root, .. } = arena[id].kind else {
        return eval_operand(ctx, id);
    };
    let precedence = root.precedence();

    let mut steps: Vec<(Operator, NodeId, Option<Range>)> = Vec::new();
    let mut leftmost = id;
    while let NodeKind::BinaryOp { op, left, right } = arena[leftmost].kind
        && op.precedence() == precedence
    {
        steps.push((op, right, arena[leftmost].span));
        leftmost = left;
    }
    steps.reverse();

    let decimal = &ctx.options().decimal;
    let mut acc = normal!(eval_operand(ctx, leftmost)?);
    let mut i = 0;
    while let Some(&(op, right, span)) = steps.get(i) {
        let right = normal!(eval_operand(ctx, right)?);
        acc = match ops::binary(op, &acc, &right, decimal) {
            Ok(result) => result,
            Err(err) if err.is_type_mismatch() => match steps.get(i + 1) {
                Some(&(op2, n, _)) if !matches!(arena[n].kind, NodeKind::BinaryOp { .. }) => {
                    let Ok(Flow::Normal(n)) = eval_operand(ctx, n) else {
                        return Err(err.at(span));
                    };
                    let merged = ops::binary(op2, &right, &n, decimal)
                        .and_then(|inner| ops::binary(op, &acc, &inner, decimal))
                        .map_err(|_| err.at(span))?;
                    i += 1;
                    merged
                }
                _ => return Err(err.at(span)),
            },
            Err(err) => return Err(err.at(span)),
        };
        i += 1;
    }
    Ok(Flow::Normal(acc))
}
