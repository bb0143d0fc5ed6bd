use std::ops::ControlFlow;
use std::sync::Arc;

use crate::{
    accessor::error::PropertyError,
    accessor::chain::{
        AccessFailure, AccessorChain, AccessorKind, AccessorNode, Inputs, SetNode, char_at, host_error, list_get,
        map_get, null_dereference,
    },
    ast::PropertyPath,
    eval::EvalContext,
    value::{MapKey, Value},
};

/// A promoted accessor. It must produce exactly what the generic chain it
/// was built from produces, and report `Deopt` wherever that chain would.
pub(crate) trait DirectAccessor: Send + Sync {
    fn get(&self, ctx: &EvalContext<'_>, path: &PropertyPath) -> Result<Value, AccessFailure>;

    fn set(&self, ctx: &EvalContext<'_>, path: &PropertyPath, value: Value) -> Result<(), AccessFailure>;
}

/// Produces promoted accessors; `None` keeps the chain generic.
pub(crate) trait SpecializationBackend: Send + Sync {
    fn specialize(&self, chain: &AccessorChain) -> Option<Arc<dyn DirectAccessor>>;
}

type Step = Box<
    dyn Fn(&EvalContext<'_>, &PropertyPath, &Value) -> Result<ControlFlow<Value, Value>, AccessFailure> + Send + Sync,
>;

/// Composes the chain into one closure per segment, each bound directly to
/// the member it reads, so execution skips the per-node kind dispatch.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ClosureBackend;

impl SpecializationBackend for ClosureBackend {
    fn specialize(&self, chain: &AccessorChain) -> Option<Arc<dyn DirectAccessor>> {
        let steps = chain
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| step(index, node.clone()))
            .collect();
        Some(Arc::new(ClosureAccessor {
            steps,
            target: chain.target.clone().map(|target| (chain.nodes.len(), target)),
        }))
    }
}

struct ClosureAccessor {
    steps: Vec<Step>,
    target: Option<(usize, SetNode)>,
}

impl ClosureAccessor {
    fn walk(&self, ctx: &EvalContext<'_>, path: &PropertyPath) -> Result<ControlFlow<Value, Value>, AccessFailure> {
        let mut value = ctx.root.clone();
        for step in &self.steps {
            value = match step(ctx, path, &value)? {
                ControlFlow::Continue(next) => next,
                ControlFlow::Break(value) => return Ok(ControlFlow::Break(value)),
            };
        }
        Ok(ControlFlow::Continue(value))
    }
}

impl DirectAccessor for ClosureAccessor {
    fn get(&self, ctx: &EvalContext<'_>, path: &PropertyPath) -> Result<Value, AccessFailure> {
        match self.walk(ctx, path)? {
            ControlFlow::Continue(value) | ControlFlow::Break(value) => Ok(value),
        }
    }

    fn set(&self, ctx: &EvalContext<'_>, path: &PropertyPath, value: Value) -> Result<(), AccessFailure> {
        let Some((index, target)) = &self.target else {
            return Err(PropertyError::NotWritable {
                segment: path.text.clone(),
                path: path.text.clone(),
                shape: ctx.root.type_name(),
            }
            .into());
        };
        let ControlFlow::Continue(base) = self.walk(ctx, path)? else {
            return Ok(());
        };
        if *index > 0 && base.is_null() {
            if target.null_safe {
                return Ok(());
            }
            return Err(null_dereference(path, *index).into());
        }
        let inputs = Inputs::of(ctx, &path.segments[*index])?;
        target.apply(ctx, path, *index, &base, inputs, value)
    }
}

/// Null handling shared by every non-root step.
fn guard_null(
    index: usize,
    null_safe: bool,
    path: &PropertyPath,
    base: &Value,
) -> Option<Result<ControlFlow<Value, Value>, AccessFailure>> {
    if index == 0 || !base.is_null() {
        return None;
    }
    Some(if null_safe {
        Ok(ControlFlow::Break(Value::Null))
    } else {
        Err(null_dereference(path, index).into())
    })
}

fn step(index: usize, node: AccessorNode) -> Step {
    let AccessorNode {
        expected, null_safe, ..
    } = node;

    // Member reads carry no inputs, so their guard needs no evaluation.
    let shape_guard = move |base: &Value| base.shape_key() == expected;
    let slow = move |node: &AccessorNode,
                     ctx: &EvalContext<'_>,
                     path: &PropertyPath,
                     base: &Value|
          -> Result<ControlFlow<Value, Value>, AccessFailure> {
        let inputs = Inputs::of(ctx, &path.segments[index])?;
        node.apply(ctx, path, index, base, inputs).map(ControlFlow::Continue)
    };

    match node.kind.clone() {
        AccessorKind::Getter(method) => Box::new(move |ctx, path, base| {
            if let Some(result) = guard_null(index, null_safe, path, base) {
                return result;
            }
            if !shape_guard(base) {
                return slow(&node, ctx, path, base);
            }
            method
                .invoke(base, &[])
                .map(ControlFlow::Continue)
                .map_err(|err| host_error(method.name(), base, err).into())
        }),
        AccessorKind::Field(field) => Box::new(move |ctx, path, base| {
            if let Some(result) = guard_null(index, null_safe, path, base) {
                return result;
            }
            if !shape_guard(base) {
                return slow(&node, ctx, path, base);
            }
            field
                .get(base)
                .map(ControlFlow::Continue)
                .map_err(|err| host_error(field.name(), base, err).into())
        }),
        AccessorKind::MapKey(key) => Box::new(move |ctx, path, base| {
            if let Some(result) = guard_null(index, null_safe, path, base) {
                return result;
            }
            match base {
                Value::Map(map) => Ok(ControlFlow::Continue(map.read().get(&key).cloned().unwrap_or_default())),
                _ => slow(&node, ctx, path, base),
            }
        }),
        AccessorKind::ListIndex | AccessorKind::MapIndex | AccessorKind::CharAt => {
            let read: fn(&PropertyPath, &Value, &Value) -> Result<Value, AccessFailure> = match node.kind {
                AccessorKind::ListIndex => list_get,
                AccessorKind::MapIndex => map_get,
                _ => char_at,
            };
            Box::new(move |ctx, path, base| {
                if let Some(result) = guard_null(index, null_safe, path, base) {
                    return result;
                }
                if !shape_guard(base) {
                    return slow(&node, ctx, path, base);
                }
                let Inputs::Index(key) = Inputs::of(ctx, &path.segments[index])? else {
                    return slow(&node, ctx, path, base);
                };
                read(path, base, &key).map(ControlFlow::Continue)
            })
        }
        AccessorKind::RootMapKey(name) => {
            let key = MapKey::String(name);
            Box::new(move |ctx, path, base| {
                let found = match base {
                    Value::Map(map) => map.read().get(&key).cloned(),
                    _ => None,
                };
                match found {
                    Some(value) => Ok(ControlFlow::Continue(value)),
                    None => slow(&node, ctx, path, base),
                }
            })
        }
        _ => Box::new(move |ctx, path, base| {
            if let Some(result) = guard_null(index, null_safe, path, base) {
                return result;
            }
            slow(&node, ctx, path, base)
        }),
    }
}
