use super::{EvalContext, Flow, error::EvalError, eval_operand, normal, ops};
use crate::{
    ast::{Block, NodeId, Operator},
    range::Range,
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingOperand,
    HaveOperand,
    /// An operator node was taken; pending entries bound at least as tight
    /// are reduced before it is applied.
    Reducing(Operator, Option<Range>),
    Done,
}

/// An operator waiting for its right operand.
#[derive(Debug, Clone, Copy)]
enum Deferred {
    Binary { op: Operator, span: Option<Range> },
    /// The right side of a non short-circuited `&&` or `||`; reducing it
    /// turns the operand into a boolean.
    Check(Operator),
}

impl Deferred {
    fn precedence(&self) -> u8 {
        match self {
            Deferred::Binary { op, .. } | Deferred::Check(op) => op.precedence(),
        }
    }
}

/// Evaluates a block's flat chain with an operand stack and a stack of
/// deferred operators.
pub(crate) struct StackEvaluator<'c, 'a> {
    ctx: &'c EvalContext<'a>,
    ids: Vec<NodeId>,
    pos: usize,
    operands: Vec<Value>,
    deferred: Vec<Deferred>,
}

impl<'c, 'a> StackEvaluator<'c, 'a> {
    pub(crate) fn new(ctx: &'c EvalContext<'a>) -> Self {
        Self {
            ctx,
            ids: Vec::new(),
            pos: 0,
            operands: Vec::with_capacity(8),
            deferred: Vec::with_capacity(4),
        }
    }

    pub(crate) fn run(mut self, block: &Block) -> Result<Flow, EvalError> {
        self.ids = block.chain(self.ctx.arena).map(|(id, _)| id).collect();
        let mut last = Value::Null;
        let mut state = State::AwaitingOperand;

        loop {
            state = match state {
                State::AwaitingOperand | State::HaveOperand => match self.ids.get(self.pos) {
                    Some(&id) => {
                        self.pos += 1;
                        let node = &self.ctx.arena[id];
                        match node.operator() {
                            Some(op) => State::Reducing(op, node.span),
                            None => {
                                let value = normal!(eval_operand(self.ctx, id)?);
                                self.operands.push(value);
                                State::HaveOperand
                            }
                        }
                    }
                    None => State::Reducing(Operator::EndOfStatement, None),
                },
                State::Reducing(Operator::EndOfStatement, _) => {
                    self.reduce(Operator::EndOfStatement)?;
                    if let Some(value) = self.operands.pop() {
                        last = value;
                    }
                    self.operands.clear();
                    if self.pos < self.ids.len() {
                        State::AwaitingOperand
                    } else {
                        State::Done
                    }
                }
                State::Reducing(op, span) => self.apply(op, span)?,
                State::Done => return Ok(Flow::Normal(last)),
            };
        }
    }

    fn apply(&mut self, op: Operator, span: Option<Range>) -> Result<State, EvalError> {
        match op {
            Operator::And | Operator::Or => {
                self.reduce(op)?;
                let value = ops::truthy(&self.pop()).map_err(|err| err.at(span))?;
                if value == (op == Operator::Or) {
                    self.skip_operand(op);
                    self.operands.push(Value::Bool(value));
                    Ok(State::HaveOperand)
                } else {
                    self.deferred.push(Deferred::Check(op));
                    Ok(State::AwaitingOperand)
                }
            }
            Operator::Ternary => {
                self.reduce(op)?;
                if ops::truthy(&self.pop()).map_err(|err| err.at(span))? {
                    return Ok(State::AwaitingOperand);
                }
                self.skip_branch();
                if let Some(&id) = self.ids.get(self.pos)
                    && self.ctx.arena[id].operator() == Some(Operator::TernaryElse)
                {
                    self.pos += 1;
                    return Ok(State::AwaitingOperand);
                }
                // no else branch
                self.operands.push(Value::Null);
                Ok(State::HaveOperand)
            }
            Operator::TernaryElse => {
                self.reduce(op)?;
                self.skip_branch();
                Ok(State::HaveOperand)
            }
            _ => {
                if !self.reduce(op)? {
                    self.deferred.push(Deferred::Binary { op, span });
                    return Ok(State::AwaitingOperand);
                }
                Ok(State::HaveOperand)
            }
        }
    }

    /// Reduces every deferred entry binding at least as tight as `arriving`.
    /// Returns true when the retry merged `arriving` and its operand into the
    /// last reduction, consuming both.
    fn reduce(&mut self, arriving: Operator) -> Result<bool, EvalError> {
        let min = arriving.precedence();
        while self.deferred.last().is_some_and(|entry| entry.precedence() >= min) {
            let Some(entry) = self.deferred.pop() else {
                break;
            };
            match entry {
                Deferred::Check(_) => {
                    let value = ops::truthy(&self.pop())?;
                    self.operands.push(Value::Bool(value));
                }
                Deferred::Binary { op, span } => {
                    let right = self.pop();
                    let left = self.pop();
                    match ops::binary(op, &left, &right, &self.ctx.options().decimal) {
                        Ok(value) => self.operands.push(value),
                        Err(err) if err.is_type_mismatch() => match self.retry(op, arriving, &left, &right) {
                            Some(value) => {
                                self.operands.push(value);
                                return Ok(true);
                            }
                            None => return Err(err.at(span)),
                        },
                        Err(err) => return Err(err.at(span)),
                    }
                }
            }
        }
        Ok(false)
    }

    /// `l op1 r` failed; tries `l op1 (r op2 n)` when `op2` has the same
    /// precedence and `n` is not claimed by a tighter operator.
    fn retry(&mut self, op1: Operator, op2: Operator, left: &Value, right: &Value) -> Option<Value> {
        if !op2.is_binary() || op2.precedence() != op1.precedence() {
            return None;
        }
        let arena = self.ctx.arena;
        let &n = self.ids.get(self.pos)?;
        if arena[n].operator().is_some() {
            return None;
        }
        if let Some(&after) = self.ids.get(self.pos + 1)
            && arena[after].operator().is_some_and(|op3| op3.precedence() > op2.precedence())
        {
            return None;
        }

        let Ok(Flow::Normal(n)) = eval_operand(self.ctx, n) else {
            return None;
        };
        let decimal = &self.ctx.options().decimal;
        let inner = ops::binary(op2, right, &n, decimal).ok()?;
        let value = ops::binary(op1, left, &inner, decimal).ok()?;
        self.pos += 1;
        Some(value)
    }

    /// Skips the right side of a short-circuited `&&`/`||` without
    /// evaluating it.
    fn skip_operand(&mut self, op: Operator) {
        let arena = self.ctx.arena;
        while let Some(&id) = self.ids.get(self.pos) {
            let stop = match arena[id].operator() {
                Some(Operator::Or) => op == Operator::And,
                Some(Operator::Ternary | Operator::TernaryElse | Operator::EndOfStatement) => true,
                _ => false,
            };
            if stop {
                return;
            }
            self.pos += 1;
        }
    }

    /// Skips to the `:` closing the current ternary branch, or the end of
    /// the statement, stepping over nested ternaries.
    fn skip_branch(&mut self) {
        let arena = self.ctx.arena;
        let mut depth = 0usize;
        while let Some(&id) = self.ids.get(self.pos) {
            match arena[id].operator() {
                Some(Operator::Ternary) => depth += 1,
                Some(Operator::TernaryElse) if depth == 0 => return,
                Some(Operator::TernaryElse) => depth -= 1,
                Some(Operator::EndOfStatement) => return,
                _ => {}
            }
            self.pos += 1;
        }
    }

    fn pop(&mut self) -> Value {
        self.operands.pop().unwrap_or_default()
    }
}
