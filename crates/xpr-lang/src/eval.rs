//! Evaluation of compiled and interpreted programs.
//!
//! Two evaluators share the operand semantics in this module: the stack
//! evaluator in [`stack`] walks a block's flat chain, and the tree evaluator
//! in [`tree`] walks the folded roots. Control constructs, assignments and
//! property reads are operands to both.

use std::sync::Arc;

use smol_str::SmolStr;

pub mod error;
pub(crate) mod ops;
pub mod scope;
pub(crate) mod stack;
pub(crate) mod tree;

use error::EvalError;
use scope::{Scope, VariableScope};

use crate::{
    accessor::{self, overload},
    arena::Arena,
    ast::{Block, Function, Node, NodeId, NodeKind, node::Assignment},
    compiler::Metadata,
    engine::Runtime,
    number::DecimalContext,
    shape::{BuiltinType, TypeHint, TypeRef},
    value::{MapKey, Value, convert},
};

/// Limits and arithmetic settings applied while evaluating.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Iterations a single loop may run before failing.
    pub max_loop_iterations: usize,
    /// Nested user function calls allowed.
    pub max_call_depth: usize,
    pub decimal: DecimalContext,
}

#[cfg(debug_assertions)]
impl Default for Options {
    fn default() -> Self {
        Self {
            max_loop_iterations: 1_000_000,
            // debug frames are large
            max_call_depth: 64,
            decimal: DecimalContext::default(),
        }
    }
}

#[cfg(not(debug_assertions))]
impl Default for Options {
    fn default() -> Self {
        Self {
            max_loop_iterations: 1_000_000,
            max_call_depth: 256,
            decimal: DecimalContext::default(),
        }
    }
}

/// Which representation of a block to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Folded roots where available.
    Compiled,
    /// Always the flat chain.
    Interpreted,
}

/// Result of evaluating a statement sequence. `Return` ends the enclosing
/// function body, or the whole expression at top level.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Flow {
    Normal(Value),
    Return(Value),
}

impl Flow {
    pub(crate) fn into_value(self) -> Value {
        match self {
            Flow::Normal(value) | Flow::Return(value) => value,
        }
    }
}

/// Evaluates to the value of a `Normal` flow, returning a `Return` flow from
/// the enclosing function.
macro_rules! normal {
    ($flow:expr) => {
        match $flow {
            $crate::eval::Flow::Normal(value) => value,
            flow @ $crate::eval::Flow::Return(_) => return Ok(flow),
        }
    };
}
pub(crate) use normal;

pub(crate) struct EvalContext<'a> {
    pub(crate) arena: &'a Arena<Node>,
    pub(crate) root: &'a Value,
    pub(crate) scope: Arc<dyn VariableScope>,
    pub(crate) runtime: &'a Runtime,
    pub(crate) meta: &'a Metadata,
    pub(crate) depth: usize,
    pub(crate) mode: Mode,
    /// No expression scope: paths resolved through `Engine::resolve_get`
    /// and `Engine::resolve_set`.
    pub(crate) detached: bool,
}

impl<'a> EvalContext<'a> {
    pub(crate) fn options(&self) -> &Options {
        &self.runtime.options.eval
    }

    fn with_scope(&self, scope: Arc<dyn VariableScope>) -> EvalContext<'a> {
        EvalContext {
            arena: self.arena,
            root: self.root,
            scope,
            runtime: self.runtime,
            meta: self.meta,
            depth: self.depth,
            mode: self.mode,
            detached: self.detached,
        }
    }

    fn child(&self) -> EvalContext<'a> {
        self.with_scope(Arc::new(Scope::with_parent(Arc::clone(&self.scope))))
    }
}

pub(crate) fn eval_block(ctx: &EvalContext<'_>, block: &Block) -> Result<Flow, EvalError> {
    match ctx.mode {
        Mode::Compiled if block.folded => tree::eval_roots(ctx, &block.roots),
        _ => stack::StackEvaluator::new(ctx).run(block),
    }
}

/// Evaluates a block in value position; an empty block is `null`.
pub(crate) fn eval_value(ctx: &EvalContext<'_>, block: &Block) -> Result<Value, EvalError> {
    eval_block(ctx, block).map(Flow::into_value)
}

pub(crate) fn eval_operand(ctx: &EvalContext<'_>, id: NodeId) -> Result<Flow, EvalError> {
    let node = &ctx.arena[id];
    operand(ctx, id, node).map_err(|err| err.at(node.span))
}

fn operand(ctx: &EvalContext<'_>, id: NodeId, node: &Node) -> Result<Flow, EvalError> {
    let value = match &node.kind {
        NodeKind::Literal(literal) => literal.to_value(),
        NodeKind::Property(property) => accessor::get(ctx, &property.path, &property.cache)?,
        NodeKind::Operator(_) => Value::Null,
        NodeKind::Unary { op, operand } => {
            let value = normal!(eval_operand(ctx, *operand)?);
            ops::unary(*op, &value)?
        }
        NodeKind::Substatement(block) => return eval_block(ctx, block),
        NodeKind::Assignment(assignment) => assign(ctx, assignment)?,
        NodeKind::BinaryOp { .. } | NodeKind::And { .. } | NodeKind::Or { .. } | NodeKind::Ternary { .. } => {
            return tree::eval_node(ctx, id);
        }
        NodeKind::InlineList(items) => Value::list(
            items
                .iter()
                .map(|item| eval_value(ctx, item))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        NodeKind::InlineMap(entries) => {
            let mut map = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                let key = eval_value(ctx, key)?;
                let key = MapKey::from_value(&key).ok_or_else(|| EvalError::Conversion {
                    value: key.type_name(),
                    target: "map key".into(),
                })?;
                map.push((key, eval_value(ctx, value)?));
            }
            Value::map(map)
        }
        NodeKind::Constructor { type_name, args } => {
            let args = args
                .iter()
                .map(|arg| eval_value(ctx, arg))
                .collect::<Result<Vec<_>, _>>()?;
            construct(ctx, type_name, &args)?
        }
        NodeKind::If { branches, otherwise } => {
            for (cond, body) in branches {
                if ops::truthy(&eval_value(ctx, cond)?)? {
                    return eval_block(ctx, body);
                }
            }
            match otherwise {
                Some(body) => return eval_block(ctx, body),
                None => Value::Null,
            }
        }
        NodeKind::Foreach { var, collection, body } => {
            let items = iterate(&eval_value(ctx, collection)?)?;
            let ctx = ctx.child();
            let limit = ctx.options().max_loop_iterations;
            for (i, item) in items.enumerate() {
                if i >= limit {
                    return Err(EvalError::IterationLimit(limit));
                }
                ctx.scope.define(var, item);
                normal!(eval_block(&ctx, body)?);
            }
            Value::Null
        }
        NodeKind::For { init, cond, step, body } => {
            let ctx = ctx.child();
            let limit = ctx.options().max_loop_iterations;
            normal!(eval_block(&ctx, init)?);
            let mut iterations = 0usize;
            while cond.is_empty() || ops::truthy(&eval_value(&ctx, cond)?)? {
                iterations += 1;
                if iterations > limit {
                    return Err(EvalError::IterationLimit(limit));
                }
                normal!(eval_block(&ctx, body)?);
                normal!(eval_block(&ctx, step)?);
            }
            Value::Null
        }
        NodeKind::Loop { kind, cond, body } => {
            let limit = ctx.options().max_loop_iterations;
            let mut iterations = 0usize;
            let mut check = !kind.is_post_test();
            loop {
                if check && ops::truthy(&eval_value(ctx, cond)?)? != kind.continue_on() {
                    break;
                }
                check = true;
                iterations += 1;
                if iterations > limit {
                    return Err(EvalError::IterationLimit(limit));
                }
                normal!(eval_block(ctx, body)?);
            }
            Value::Null
        }
        NodeKind::Def(function) => {
            ctx.scope
                .define(function.name(), Value::Function(Arc::clone(function)));
            Value::Null
        }
        NodeKind::Return(block) => return Ok(Flow::Return(eval_value(ctx, block)?)),
    };
    Ok(Flow::Normal(value))
}

fn assign(ctx: &EvalContext<'_>, assignment: &Assignment) -> Result<Value, EvalError> {
    let target = &assignment.target;
    let value = eval_value(ctx, &assignment.value)?;
    let value = match assignment.op {
        Some(op) => {
            let current = accessor::get(ctx, &target.path, &target.cache)?;
            ops::binary(op, &current, &value, &ctx.options().decimal)?
        }
        None => value,
    };
    accessor::set(ctx, &target.path, &assignment.set_cache, value.clone())?;
    Ok(value)
}

/// Elements visited by `foreach`. Numeric counts are produced lazily so the
/// iteration limit applies before any range is materialized.
fn iterate(collection: &Value) -> Result<Box<dyn Iterator<Item = Value>>, EvalError> {
    match collection {
        Value::List(items) => Ok(Box::new(items.read().clone().into_iter())),
        Value::Map(map) => Ok(Box::new(
            map.read().keys().map(MapKey::to_value).collect::<Vec<_>>().into_iter(),
        )),
        Value::String(s) => Ok(Box::new(s.chars().map(Value::Char).collect::<Vec<_>>().into_iter())),
        Value::Number(n) if n.is_integral() => {
            let count = n.to_i64().unwrap_or(0);
            Ok(Box::new(
                (1..=count).map(|i| i32::try_from(i).map_or(Value::from(i), Value::from)),
            ))
        }
        Value::Null => Ok(Box::new(std::iter::empty())),
        other => Err(EvalError::NotIterable(other.type_name())),
    }
}

/// Invokes a user-defined function. The body runs in a fresh scope whose
/// parent is the caller's scope.
pub(crate) fn call_function(ctx: &EvalContext<'_>, function: &Function, args: Vec<Value>) -> Result<Value, EvalError> {
    let params = function.params();
    if args.len() != params.len() {
        return Err(EvalError::Arity {
            name: function.name().clone(),
            expected: params.len(),
            got: args.len(),
        });
    }
    let max_depth = ctx.options().max_call_depth;
    if ctx.depth >= max_depth {
        return Err(EvalError::RecursionLimit(max_depth));
    }

    let scope = Scope::with_parent(Arc::clone(&ctx.scope));
    for (param, arg) in params.iter().zip(args) {
        scope.define(param, arg);
    }
    let body = EvalContext {
        arena: &function.program.arena,
        root: ctx.root,
        scope: Arc::new(scope),
        runtime: ctx.runtime,
        meta: ctx.meta,
        depth: ctx.depth + 1,
        mode: ctx.mode,
        detached: false,
    };
    eval_block(&body, &function.program.root).map(Flow::into_value)
}

/// Looks a type name up in the imports, the registry, then the builtins.
pub(crate) fn resolve_type(ctx: &EvalContext<'_>, name: &str) -> Option<TypeRef> {
    let types = ctx.runtime.types.read();
    let qualified = ctx.meta.imports.get(name).map(SmolStr::as_str).unwrap_or(name);
    if let Some(shape) = types.get(qualified) {
        return Some(TypeRef::Host(Arc::clone(shape)));
    }
    BuiltinType::from_name(name).map(TypeRef::Builtin)
}

fn construct(ctx: &EvalContext<'_>, type_name: &SmolStr, args: &[Value]) -> Result<Value, EvalError> {
    let ty = resolve_type(ctx, type_name).ok_or_else(|| EvalError::UnknownType(type_name.clone()))?;
    let no_constructor = || EvalError::NoConstructor {
        ty: ty.name(),
        args: overload::describe(args),
    };

    match &ty {
        TypeRef::Host(shape) => {
            let constructor = overload::select(shape.constructors(), args).ok_or_else(no_constructor)?;
            let args = overload::prepare(constructor, args).ok_or_else(no_constructor)?;
            constructor.invoke(&Value::Null, &args).map_err(|source| EvalError::Host {
                context: shape.name().clone(),
                source,
            })
        }
        TypeRef::Builtin(BuiltinType::List) => match args {
            [] => Ok(Value::list([])),
            [Value::List(items)] => Ok(Value::list(items.read().iter().cloned())),
            _ => Err(no_constructor()),
        },
        TypeRef::Builtin(BuiltinType::Map) => match args {
            [] => Ok(Value::map([])),
            [Value::Map(map)] => Ok(Value::map(map.read().iter().map(|(k, v)| (k.clone(), v.clone())))),
            _ => Err(no_constructor()),
        },
        TypeRef::Builtin(BuiltinType::String) => match args {
            [] => Ok(Value::from("")),
            [value] => Ok(Value::from(value.to_string())),
            _ => Err(no_constructor()),
        },
        TypeRef::Builtin(builtin) => match args {
            [value] if builtin.hint() != TypeHint::Any => convert::coerce(value, &builtin.hint()).ok_or_else(|| {
                EvalError::Conversion {
                    value: value.type_name(),
                    target: builtin.name().into(),
                }
            }),
            _ => Err(no_constructor()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Value::list([Value::from(1), Value::from(2)]), vec![Value::from(1), Value::from(2)])]
    #[case(Value::from("ab"), vec![Value::Char('a'), Value::Char('b')])]
    #[case(Value::from(3), vec![Value::from(1), Value::from(2), Value::from(3)])]
    #[case(Value::from(0), vec![])]
    #[case(Value::Null, vec![])]
    fn test_iterate(#[case] collection: Value, #[case] expected: Vec<Value>) {
        assert_eq!(iterate(&collection).unwrap().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_iterate_count_is_lazy() {
        let mut items = iterate(&Value::from(i64::MAX)).unwrap();
        assert_eq!(items.next(), Some(Value::from(1)));
        assert_eq!(items.nth(1), Some(Value::from(3)));
    }

    #[test]
    fn test_iterate_rejects_bool() {
        assert!(matches!(
            iterate(&Value::from(true)),
            Err(EvalError::NotIterable(name)) if name == "boolean"
        ));
    }

    #[test]
    fn test_flow_into_value() {
        assert_eq!(Flow::Return(Value::from(1)).into_value(), Value::from(1));
    }
}
