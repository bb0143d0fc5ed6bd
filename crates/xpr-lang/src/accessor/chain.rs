use std::ops::ControlFlow;
use std::sync::Arc;

use smallvec::SmallVec;
use smol_str::SmolStr;

use super::error::PropertyError;
use super::overload::{self, Args};
use crate::{
    ast::{PropertyPath, Segment},
    eval::{self, EvalContext, error::EvalError},
    shape::{Field, HostError, Method, ShapeKey, TypeHint, TypeRef},
    value::{MapKey, Value, convert},
};

/// Evaluated sub-expressions of one path segment.
#[derive(Debug, Clone)]
pub(crate) enum Inputs {
    None,
    Index(Value),
    Args(Args),
}

impl Inputs {
    pub(crate) fn of(ctx: &EvalContext<'_>, segment: &Segment) -> Result<Inputs, EvalError> {
        Ok(match segment {
            Segment::Name { .. } => Inputs::None,
            Segment::Index { expr } => Inputs::Index(eval::eval_value(ctx, expr)?),
            Segment::Call { args, .. } => Inputs::Args(
                args.iter()
                    .map(|arg| eval::eval_value(ctx, arg))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    fn args(&self) -> &[Value] {
        match self {
            Inputs::Args(args) => args,
            _ => &[],
        }
    }

    fn index(&self) -> &Value {
        match self {
            Inputs::Index(index) => index,
            _ => &Value::Null,
        }
    }
}

/// A cached node no longer matches the values it meets.
///
/// Carries everything needed to resume resolution at `index` without
/// evaluating any segment input twice.
#[derive(Debug)]
pub(crate) struct Deopt {
    pub(crate) index: usize,
    pub(crate) base: Value,
    pub(crate) inputs: Inputs,
}

#[derive(Debug)]
pub(crate) enum AccessFailure {
    Deopt(Box<Deopt>),
    Error(EvalError),
}

impl From<EvalError> for AccessFailure {
    fn from(err: EvalError) -> Self {
        AccessFailure::Error(err)
    }
}

impl From<PropertyError> for AccessFailure {
    fn from(err: PropertyError) -> Self {
        AccessFailure::Error(err.into())
    }
}

fn deopt(index: usize, base: &Value, inputs: Inputs) -> AccessFailure {
    AccessFailure::Deopt(Box::new(Deopt {
        index,
        base: base.clone(),
        inputs,
    }))
}

pub(crate) fn host_error(member: &str, base: &Value, source: HostError) -> PropertyError {
    match source {
        HostError::IndexOutOfBounds { index, len } => PropertyError::IndexOutOfBounds {
            path: member.into(),
            index,
            len,
        },
        source => PropertyError::Host {
            member: member.into(),
            shape: base.type_name(),
            source,
        },
    }
}

pub(crate) fn null_dereference(path: &PropertyPath, index: usize) -> PropertyError {
    PropertyError::NullDereference {
        segment: path.segments[index].to_string().into(),
        path: path.text.clone(),
    }
}

#[derive(Debug, Clone)]
pub(crate) enum AccessorKind {
    This,
    /// A scope variable; `known` inputs outrank members of a map root.
    Variable { name: SmolStr, known: bool },
    /// A key of a map root, falling back to a variable when absent.
    RootMapKey(SmolStr),
    TypeLiteral(TypeRef),
    /// A user-defined function from the scope.
    Function(SmolStr),
    Getter(Arc<Method>),
    Field(Arc<Field>),
    MapKey(MapKey),
    Method {
        method: Arc<Method>,
        arg_shapes: SmallVec<[ShapeKey; 4]>,
    },
    ListIndex,
    MapIndex,
    CharAt,
}

/// One resolved segment, valid while the base keeps the `expected` shape.
#[derive(Debug, Clone)]
pub(crate) struct AccessorNode {
    pub(crate) kind: AccessorKind,
    pub(crate) expected: ShapeKey,
    pub(crate) null_safe: bool,
}

impl AccessorNode {
    pub(crate) fn apply(
        &self,
        ctx: &EvalContext<'_>,
        path: &PropertyPath,
        index: usize,
        base: &Value,
        inputs: Inputs,
    ) -> Result<Value, AccessFailure> {
        if base.shape_key() != self.expected {
            return Err(deopt(index, base, inputs));
        }

        match &self.kind {
            AccessorKind::This => Ok(ctx.root.clone()),
            AccessorKind::Variable { name, known } => {
                if !known
                    && let Value::Map(map) = base
                    && map.read().contains_key(&MapKey::String(name.clone()))
                {
                    return Err(deopt(index, base, inputs));
                }
                match ctx.scope.get(name) {
                    Some(value) => Ok(value),
                    None => Err(deopt(index, base, inputs)),
                }
            }
            AccessorKind::RootMapKey(name) => {
                let found = match base {
                    Value::Map(map) => map.read().get(&MapKey::String(name.clone())).cloned(),
                    _ => None,
                };
                match found {
                    Some(value) => Ok(value),
                    None if ctx.scope.is_resolvable(name) => Err(deopt(index, base, inputs)),
                    None => Ok(Value::Null),
                }
            }
            AccessorKind::TypeLiteral(ty) => Ok(Value::Type(ty.clone())),
            AccessorKind::Function(name) => match ctx.scope.get(name) {
                Some(Value::Function(function)) => {
                    eval::call_function(ctx, &function, inputs.args().to_vec()).map_err(AccessFailure::Error)
                }
                _ => Err(deopt(index, base, inputs)),
            },
            AccessorKind::Getter(method) => method
                .invoke(base, &[])
                .map_err(|err| host_error(method.name(), base, err).into()),
            AccessorKind::Field(field) => field
                .get(base)
                .map_err(|err| host_error(field.name(), base, err).into()),
            AccessorKind::MapKey(key) => match base {
                Value::Map(map) => Ok(map.read().get(key).cloned().unwrap_or_default()),
                _ => Err(deopt(index, base, inputs)),
            },
            AccessorKind::Method { method, arg_shapes } => {
                let args = inputs.args();
                if args.len() != arg_shapes.len() || args.iter().zip(arg_shapes).any(|(arg, key)| arg.shape_key() != *key)
                {
                    return Err(deopt(index, base, inputs));
                }
                match overload::prepare(method, args) {
                    Some(prepared) => method
                        .invoke(base, &prepared)
                        .map_err(|err| host_error(method.name(), base, err).into()),
                    None => Err(deopt(index, base, inputs)),
                }
            }
            AccessorKind::ListIndex => list_get(path, base, inputs.index()),
            AccessorKind::MapIndex => map_get(path, base, inputs.index()),
            AccessorKind::CharAt => char_at(path, base, inputs.index()),
        }
    }
}

fn invalid_index(path: &PropertyPath, base: &Value, index: &Value) -> PropertyError {
    PropertyError::InvalidIndex {
        path: path.text.clone(),
        index: index.to_string().into(),
        shape: base.type_name(),
    }
}

fn checked_index(path: &PropertyPath, base: &Value, index: &Value, len: usize) -> Result<usize, PropertyError> {
    let raw = index.as_i64().ok_or_else(|| invalid_index(path, base, index))?;
    usize::try_from(raw)
        .ok()
        .filter(|i| *i < len)
        .ok_or_else(|| PropertyError::IndexOutOfBounds {
            path: path.text.clone(),
            index: raw,
            len,
        })
}

pub(crate) fn list_get(path: &PropertyPath, base: &Value, index: &Value) -> Result<Value, AccessFailure> {
    let Value::List(list) = base else {
        return Err(invalid_index(path, base, index).into());
    };
    let list = list.read();
    let i = checked_index(path, base, index, list.len())?;
    Ok(list[i].clone())
}

pub(crate) fn map_get(path: &PropertyPath, base: &Value, index: &Value) -> Result<Value, AccessFailure> {
    let (Value::Map(map), Some(key)) = (base, MapKey::from_value(index)) else {
        return Err(invalid_index(path, base, index).into());
    };
    Ok(map.read().get(&key).cloned().unwrap_or_default())
}

pub(crate) fn char_at(path: &PropertyPath, base: &Value, index: &Value) -> Result<Value, AccessFailure> {
    let Value::String(s) = base else {
        return Err(invalid_index(path, base, index).into());
    };
    let i = checked_index(path, base, index, s.chars().count())?;
    Ok(s.chars().nth(i).map(Value::Char).unwrap_or_default())
}

#[derive(Debug, Clone)]
pub(crate) enum SetKind {
    Variable(SmolStr),
    Setter(Arc<Method>),
    Field(Arc<Field>),
    MapPut(MapKey),
    /// Overwrites an existing key of a map root.
    RootMapPut(SmolStr),
    MapIndex,
    ListIndex,
}

#[derive(Debug, Clone)]
pub(crate) struct SetNode {
    pub(crate) kind: SetKind,
    pub(crate) expected: ShapeKey,
    pub(crate) null_safe: bool,
}

fn conversion(value: &Value, target: impl ToString) -> EvalError {
    EvalError::Conversion {
        value: value.type_name(),
        target: target.to_string().into(),
    }
}

impl SetNode {
    pub(crate) fn apply(
        &self,
        ctx: &EvalContext<'_>,
        path: &PropertyPath,
        index: usize,
        base: &Value,
        inputs: Inputs,
        value: Value,
    ) -> Result<(), AccessFailure> {
        if base.shape_key() != self.expected {
            return Err(deopt(index, base, inputs));
        }

        match &self.kind {
            SetKind::Variable(name) => {
                ctx.scope.set(name, value);
                Ok(())
            }
            SetKind::Setter(method) => {
                let hint = method.params().first().cloned().unwrap_or(TypeHint::Any);
                let value = convert::coerce(&value, &hint).ok_or_else(|| conversion(&value, &hint))?;
                method
                    .invoke(base, &[value])
                    .map(|_| ())
                    .map_err(|err| host_error(method.name(), base, err).into())
            }
            SetKind::Field(field) => {
                let value = convert::coerce(&value, field.ty()).ok_or_else(|| conversion(&value, field.ty()))?;
                field
                    .set(base, value)
                    .map_err(|err| host_error(field.name(), base, err).into())
            }
            SetKind::MapPut(key) => match base {
                Value::Map(map) => {
                    map.write().insert(key.clone(), value);
                    Ok(())
                }
                _ => Err(deopt(index, base, inputs)),
            },
            SetKind::RootMapPut(name) => {
                let key = MapKey::String(name.clone());
                match base {
                    Value::Map(map) if map.read().contains_key(&key) => {
                        map.write().insert(key, value);
                        Ok(())
                    }
                    _ => Err(deopt(index, base, inputs)),
                }
            }
            SetKind::MapIndex => {
                let (Value::Map(map), Some(key)) = (base, MapKey::from_value(inputs.index())) else {
                    return Err(invalid_index(path, base, inputs.index()).into());
                };
                map.write().insert(key, value);
                Ok(())
            }
            SetKind::ListIndex => {
                let Value::List(list) = base else {
                    return Err(invalid_index(path, base, inputs.index()).into());
                };
                let mut list = list.write();
                let i = checked_index(path, base, inputs.index(), list.len())?;
                list[i] = value;
                Ok(())
            }
        }
    }
}

/// Resolved accessors for every segment of a path, plus the assignment
/// target when the chain was resolved for writing.
#[derive(Debug, Clone)]
pub struct AccessorChain {
    pub(crate) nodes: Vec<AccessorNode>,
    pub(crate) target: Option<SetNode>,
}

impl AccessorChain {
    pub fn len(&self) -> usize {
        self.nodes.len() + usize::from(self.target.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Walks the nodes from the root; `Break` when a null-safe segment met null.
    pub(crate) fn walk(
        &self,
        ctx: &EvalContext<'_>,
        path: &PropertyPath,
    ) -> Result<ControlFlow<Value, Value>, AccessFailure> {
        let mut value = ctx.root.clone();
        for (index, node) in self.nodes.iter().enumerate() {
            if index > 0 && value.is_null() {
                if node.null_safe {
                    return Ok(ControlFlow::Break(Value::Null));
                }
                return Err(null_dereference(path, index).into());
            }
            let inputs = Inputs::of(ctx, &path.segments[index])?;
            value = node.apply(ctx, path, index, &value, inputs)?;
        }
        Ok(ControlFlow::Continue(value))
    }

    pub(crate) fn get(&self, ctx: &EvalContext<'_>, path: &PropertyPath) -> Result<Value, AccessFailure> {
        match self.walk(ctx, path)? {
            ControlFlow::Continue(value) | ControlFlow::Break(value) => Ok(value),
        }
    }

    pub(crate) fn set(&self, ctx: &EvalContext<'_>, path: &PropertyPath, value: Value) -> Result<(), AccessFailure> {
        let Some(target) = &self.target else {
            return Err(EvalError::from(PropertyError::NotWritable {
                segment: path.text.clone(),
                path: path.text.clone(),
                shape: ctx.root.type_name(),
            })
            .into());
        };
        let ControlFlow::Continue(base) = self.walk(ctx, path)? else {
            return Ok(());
        };

        let index = self.nodes.len();
        if index > 0 && base.is_null() {
            if target.null_safe {
                return Ok(());
            }
            return Err(null_dereference(path, index).into());
        }
        let inputs = Inputs::of(ctx, &path.segments[index])?;
        target.apply(ctx, path, index, &base, inputs, value)
    }
}
