//! Resolution of path segments against the values they meet.
//!
//! Resolution and execution are interleaved: each segment is resolved
//! against the concrete base produced by the previous one, applied, and
//! recorded. The recorded chain then serves later evaluations until some
//! node's shape guard fails, at which point resolution resumes from that
//! node.

use std::sync::Arc;

use smol_str::SmolStr;
use tracing::trace;

use super::chain::{AccessFailure, AccessorChain, AccessorKind, AccessorNode, Deopt, Inputs, SetKind, SetNode};
use super::error::PropertyError;
use super::overload;
use super::{AccessorCache, chain::null_dereference};
use crate::{
    ast::{PropertyPath, Segment},
    eval::{self, EvalContext, error::EvalError},
    optimizer::TieredAccessor,
    value::{MapKey, Value},
};

enum Walked {
    /// All requested segments applied; `pending` holds inputs already
    /// evaluated for the segment at the stopping point.
    Reached { value: Value, pending: Option<Inputs> },
    /// A null-safe segment met null.
    NullSafe,
}

fn unresolvable(path: &PropertyPath, index: usize, base: &Value) -> PropertyError {
    PropertyError::Unresolvable {
        segment: path.segments[index].to_string().into(),
        path: path.text.clone(),
        shape: base.type_name(),
    }
}

fn not_writable(path: &PropertyPath, index: usize, base: &Value) -> PropertyError {
    PropertyError::NotWritable {
        segment: path.segments[index].to_string().into(),
        path: path.text.clone(),
        shape: base.type_name(),
    }
}

pub(crate) struct Resolver<'c, 'a> {
    ctx: &'c EvalContext<'a>,
    path: &'c PropertyPath,
}

impl<'c, 'a> Resolver<'c, 'a> {
    pub(crate) fn new(ctx: &'c EvalContext<'a>, path: &'c PropertyPath) -> Self {
        Self { ctx, path }
    }

    /// The starting point of a fresh resolution.
    pub(crate) fn start(&self) -> Result<Deopt, EvalError> {
        Ok(Deopt {
            index: 0,
            base: self.ctx.root.clone(),
            inputs: Inputs::of(self.ctx, &self.path.segments[0])?,
        })
    }

    pub(crate) fn get(&self, cache: &AccessorCache, prefix: &[AccessorNode], from: Deopt) -> Result<Value, EvalError> {
        let mut nodes = prefix[..from.index.min(prefix.len())].to_vec();
        match self.walk(&mut nodes, from, self.path.segments.len())? {
            Walked::Reached { value, .. } => {
                self.store(cache, nodes, None);
                Ok(value)
            }
            Walked::NullSafe => Ok(Value::Null),
        }
    }

    pub(crate) fn set(
        &self,
        cache: &AccessorCache,
        prefix: &[AccessorNode],
        from: Deopt,
        value: Value,
    ) -> Result<(), EvalError> {
        let last = self.path.segments.len() - 1;
        let mut nodes = prefix[..from.index.min(prefix.len()).min(last)].to_vec();
        let Walked::Reached { value: base, pending } = self.walk(&mut nodes, from, last)? else {
            return Ok(());
        };

        let inputs = match pending {
            Some(inputs) => inputs,
            None => {
                if last > 0 && base.is_null() {
                    if self.path.segments[last].is_null_safe() {
                        return Ok(());
                    }
                    return Err(null_dereference(self.path, last).into());
                }
                Inputs::of(self.ctx, &self.path.segments[last])?
            }
        };

        let target = self.target(last, &base)?;
        match target.apply(self.ctx, self.path, last, &base, inputs, value) {
            Ok(()) => {
                self.store(cache, nodes, Some(target));
                Ok(())
            }
            Err(AccessFailure::Error(err)) => Err(err),
            Err(AccessFailure::Deopt(_)) => Err(not_writable(self.path, last, &base).into()),
        }
    }

    fn store(&self, cache: &AccessorCache, nodes: Vec<AccessorNode>, target: Option<SetNode>) {
        trace!(path = %self.path, nodes = nodes.len(), "Resolved accessor chain");
        let chain = AccessorChain { nodes, target };
        cache.store(Arc::new(TieredAccessor::new(
            chain,
            Arc::clone(&self.ctx.runtime.optimizer),
        )));
    }

    fn walk(&self, nodes: &mut Vec<AccessorNode>, from: Deopt, end: usize) -> Result<Walked, EvalError> {
        let Deopt {
            mut index,
            base: mut value,
            inputs,
        } = from;
        let mut pending = Some(inputs);

        while index < end {
            let inputs = match pending.take() {
                Some(inputs) => inputs,
                None => {
                    if index > 0 && value.is_null() {
                        if self.path.segments[index].is_null_safe() {
                            return Ok(Walked::NullSafe);
                        }
                        return Err(null_dereference(self.path, index).into());
                    }
                    Inputs::of(self.ctx, &self.path.segments[index])?
                }
            };

            let node = self.node(index, &value, &inputs)?;
            value = match node.apply(self.ctx, self.path, index, &value, inputs) {
                Ok(next) => next,
                Err(AccessFailure::Error(err)) => return Err(err),
                Err(AccessFailure::Deopt(_)) => return Err(unresolvable(self.path, index, &value).into()),
            };
            nodes.push(node);
            index += 1;
        }

        Ok(Walked::Reached { value, pending })
    }

    fn node(&self, index: usize, base: &Value, inputs: &Inputs) -> Result<AccessorNode, EvalError> {
        let segment = &self.path.segments[index];
        let kind = match (index, segment) {
            (0, Segment::Name { name, .. }) => self.root_name(name, base)?,
            (0, Segment::Call { name, .. }) => match self.ctx.scope.get(name) {
                Some(Value::Function(_)) => AccessorKind::Function(name.clone()),
                _ => self.method(index, name, base, inputs)?,
            },
            (_, Segment::Name { name, .. }) => self.member(index, name, base)?,
            (_, Segment::Call { name, .. }) => self.method(index, name, base, inputs)?,
            (_, Segment::Index { .. }) => match base {
                Value::List(_) => AccessorKind::ListIndex,
                Value::Map(_) => AccessorKind::MapIndex,
                Value::String(_) => AccessorKind::CharAt,
                _ => return Err(unresolvable(self.path, index, base).into()),
            },
        };

        Ok(AccessorNode {
            kind,
            expected: base.shape_key(),
            null_safe: segment.is_null_safe(),
        })
    }

    fn root_name(&self, name: &SmolStr, root: &Value) -> Result<AccessorKind, EvalError> {
        let scope = &self.ctx.scope;
        if name == "this" {
            return Ok(AccessorKind::This);
        }
        if self.ctx.meta.known_inputs.contains_key(name) && scope.is_resolvable(name) {
            return Ok(AccessorKind::Variable {
                name: name.clone(),
                known: true,
            });
        }

        let key = MapKey::String(name.clone());
        match root {
            Value::Map(map) if map.read().contains_key(&key) => return Ok(AccessorKind::RootMapKey(name.clone())),
            Value::Map(_) => {}
            _ => {
                if let Some(shape) = root.shape() {
                    if let Some(getter) = shape.getter(name) {
                        return Ok(AccessorKind::Getter(Arc::clone(getter)));
                    }
                    if let Some(field) = shape.field(name) {
                        return Ok(AccessorKind::Field(Arc::clone(field)));
                    }
                }
            }
        }

        if scope.is_resolvable(name) {
            return Ok(AccessorKind::Variable {
                name: name.clone(),
                known: false,
            });
        }
        if let Some(ty) = eval::resolve_type(self.ctx, name) {
            return Ok(AccessorKind::TypeLiteral(ty));
        }
        if matches!(root, Value::Map(_)) {
            return Ok(AccessorKind::RootMapKey(name.clone()));
        }
        Err(unresolvable(self.path, 0, root).into())
    }

    fn member(&self, index: usize, name: &SmolStr, base: &Value) -> Result<AccessorKind, EvalError> {
        if matches!(base, Value::Map(_)) {
            return Ok(AccessorKind::MapKey(MapKey::String(name.clone())));
        }
        let shape = base.shape().ok_or_else(|| unresolvable(self.path, index, base))?;
        if let Some(getter) = shape.getter(name) {
            return Ok(AccessorKind::Getter(Arc::clone(getter)));
        }
        if let Some(field) = shape.field(name) {
            return Ok(AccessorKind::Field(Arc::clone(field)));
        }
        Err(unresolvable(self.path, index, base).into())
    }

    fn method(&self, index: usize, name: &SmolStr, base: &Value, inputs: &Inputs) -> Result<AccessorKind, EvalError> {
        let args = match inputs {
            Inputs::Args(args) => args.as_slice(),
            _ => &[],
        };
        let shape = base.shape().ok_or_else(|| unresolvable(self.path, index, base))?;
        let candidates = shape.methods(name);
        if candidates.is_empty() {
            return Err(unresolvable(self.path, index, base).into());
        }
        let method = overload::select(candidates, args).ok_or_else(|| PropertyError::NoOverload {
            method: name.clone(),
            shape: shape.name().clone(),
            args: overload::describe(args),
        })?;
        Ok(AccessorKind::Method {
            method: Arc::clone(method),
            arg_shapes: args.iter().map(Value::shape_key).collect(),
        })
    }

    /// Assignment target for the last segment.
    fn target(&self, index: usize, base: &Value) -> Result<SetNode, EvalError> {
        let segment = &self.path.segments[index];
        let kind = match (index, segment) {
            (0, Segment::Name { name, .. }) => self.root_target(name, base)?,
            (_, Segment::Name { name, .. }) => self.member_target(index, name, base)?,
            (_, Segment::Index { .. }) => match base {
                Value::List(_) => SetKind::ListIndex,
                Value::Map(_) => SetKind::MapIndex,
                _ => return Err(not_writable(self.path, index, base).into()),
            },
            (_, Segment::Call { .. }) => return Err(not_writable(self.path, index, base).into()),
        };

        Ok(SetNode {
            kind,
            expected: base.shape_key(),
            null_safe: segment.is_null_safe(),
        })
    }

    fn root_target(&self, name: &SmolStr, root: &Value) -> Result<SetKind, EvalError> {
        if self.ctx.meta.known_inputs.contains_key(name) || self.ctx.scope.is_resolvable(name) {
            return Ok(SetKind::Variable(name.clone()));
        }
        match root {
            Value::Map(map) if map.read().contains_key(&MapKey::String(name.clone())) => {
                Ok(SetKind::RootMapPut(name.clone()))
            }
            // Outside an expression there is no scope to hold a variable.
            Value::Map(_) if self.ctx.detached => Ok(SetKind::MapPut(MapKey::String(name.clone()))),
            Value::Map(_) => Ok(SetKind::Variable(name.clone())),
            _ => match self.writable_member(0, name, root)? {
                Some(kind) => Ok(kind),
                None if self.ctx.detached => Err(not_writable(self.path, 0, root).into()),
                None => Ok(SetKind::Variable(name.clone())),
            },
        }
    }

    fn member_target(&self, index: usize, name: &SmolStr, base: &Value) -> Result<SetKind, EvalError> {
        if matches!(base, Value::Map(_)) {
            return Ok(SetKind::MapPut(MapKey::String(name.clone())));
        }
        self.writable_member(index, name, base)?
            .ok_or_else(|| not_writable(self.path, index, base).into())
    }

    /// Setter, then writable field; a read-only field is an error.
    fn writable_member(&self, index: usize, name: &SmolStr, base: &Value) -> Result<Option<SetKind>, EvalError> {
        let Some(shape) = base.shape() else {
            return Ok(None);
        };
        if let Some(setter) = shape.setter(name) {
            return Ok(Some(SetKind::Setter(Arc::clone(setter))));
        }
        match shape.field(name) {
            Some(field) if field.is_writable() => Ok(Some(SetKind::Field(Arc::clone(field)))),
            Some(_) => Err(not_writable(self.path, index, base).into()),
            None => Ok(None),
        }
    }
}
