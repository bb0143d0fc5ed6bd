use crate::number::NumberKind;
use crate::value::Value;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

pub(crate) mod builtin;

/// A value owned by the embedding application.
///
/// The shape describes which getters, fields and methods expressions may use;
/// host objects that want setters or mutating methods keep their state behind
/// interior mutability since they are shared through `Arc`.
pub trait HostObject: Any + Send + Sync + fmt::Debug {
    fn shape(&self) -> Arc<Shape>;

    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("receiver is not a `{0}`")]
    Receiver(SmolStr),
    #[error("argument {index} must be {expected}")]
    Argument { index: usize, expected: SmolStr },
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("{0}")]
    Failed(String),
}

static NEXT_SHAPE_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShapeId(u32);

impl ShapeId {
    fn next() -> Self {
        ShapeId(NEXT_SHAPE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Runtime identity of a value's type; accessor chains are guarded by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKey {
    Null,
    Bool,
    Number(NumberKind),
    Char,
    String,
    List,
    Map,
    Function,
    Type,
    Host(ShapeId),
}

/// Declared parameter, field and input types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeHint {
    Any,
    Bool,
    Int,
    Long,
    Float,
    Double,
    Decimal,
    Number,
    Char,
    String,
    List,
    Map,
    Function,
    Type,
    Object(SmolStr),
}

impl TypeHint {
    pub fn number_kind(&self) -> Option<NumberKind> {
        match self {
            TypeHint::Int => Some(NumberKind::Int),
            TypeHint::Long => Some(NumberKind::Long),
            TypeHint::Float => Some(NumberKind::Float),
            TypeHint::Double => Some(NumberKind::Double),
            TypeHint::Decimal => Some(NumberKind::Decimal),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.number_kind().is_some() || matches!(self, TypeHint::Number)
    }

    /// Primitive hints cannot hold `null`.
    pub fn is_primitive(&self) -> bool {
        self.number_kind().is_some() || matches!(self, TypeHint::Bool | TypeHint::Char)
    }

    pub fn of_number(kind: NumberKind) -> Self {
        match kind {
            NumberKind::Int => TypeHint::Int,
            NumberKind::Long => TypeHint::Long,
            NumberKind::Float => TypeHint::Float,
            NumberKind::Double => TypeHint::Double,
            NumberKind::Decimal => TypeHint::Decimal,
        }
    }

    /// Accepts both the short names (`int`) and the boxed ones (`Integer`).
    pub fn parse(name: &str) -> Self {
        match name {
            "any" | "Object" | "java.lang.Object" => TypeHint::Any,
            "boolean" | "bool" | "Boolean" => TypeHint::Bool,
            "int" | "Integer" => TypeHint::Int,
            "long" | "Long" => TypeHint::Long,
            "float" | "Float" => TypeHint::Float,
            "double" | "Double" => TypeHint::Double,
            "decimal" | "BigDecimal" | "BigInteger" => TypeHint::Decimal,
            "number" | "Number" => TypeHint::Number,
            "char" | "Character" => TypeHint::Char,
            "string" | "String" => TypeHint::String,
            "list" | "List" => TypeHint::List,
            "map" | "Map" => TypeHint::Map,
            "function" => TypeHint::Function,
            "type" | "Class" => TypeHint::Type,
            other => TypeHint::Object(SmolStr::new(other)),
        }
    }

    pub fn name(&self) -> SmolStr {
        match self {
            TypeHint::Any => "any".into(),
            TypeHint::Bool => "boolean".into(),
            TypeHint::Int => "int".into(),
            TypeHint::Long => "long".into(),
            TypeHint::Float => "float".into(),
            TypeHint::Double => "double".into(),
            TypeHint::Decimal => "decimal".into(),
            TypeHint::Number => "number".into(),
            TypeHint::Char => "char".into(),
            TypeHint::String => "string".into(),
            TypeHint::List => "list".into(),
            TypeHint::Map => "map".into(),
            TypeHint::Function => "function".into(),
            TypeHint::Type => "type".into(),
            TypeHint::Object(name) => name.clone(),
        }
    }
}

impl fmt::Display for TypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub type MethodFn = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, HostError> + Send + Sync>;
pub type GetterFn = Arc<dyn Fn(&Value) -> Result<Value, HostError> + Send + Sync>;
pub type SetterFn = Arc<dyn Fn(&Value, Value) -> Result<(), HostError> + Send + Sync>;

pub struct Method {
    name: SmolStr,
    params: Vec<TypeHint>,
    varargs: bool,
    func: MethodFn,
}

impl Method {
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn params(&self) -> &[TypeHint] {
        &self.params
    }

    /// The last parameter collects any excess arguments into a list.
    pub fn is_varargs(&self) -> bool {
        self.varargs
    }

    pub fn invoke(&self, receiver: &Value, args: &[Value]) -> Result<Value, HostError> {
        (self.func)(receiver, args)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("varargs", &self.varargs)
            .finish()
    }
}

pub struct Field {
    name: SmolStr,
    ty: TypeHint,
    get: GetterFn,
    set: Option<SetterFn>,
}

impl Field {
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn ty(&self) -> &TypeHint {
        &self.ty
    }

    pub fn is_writable(&self) -> bool {
        self.set.is_some()
    }

    pub fn get(&self, receiver: &Value) -> Result<Value, HostError> {
        (self.get)(receiver)
    }

    pub fn set(&self, receiver: &Value, value: Value) -> Result<(), HostError> {
        match &self.set {
            Some(set) => set(receiver, value),
            None => Err(HostError::Failed(format!("field `{}` is read-only", self.name))),
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// Introspection data for a host type.
pub struct Shape {
    id: ShapeId,
    name: SmolStr,
    methods: FxHashMap<SmolStr, Vec<Arc<Method>>>,
    fields: FxHashMap<SmolStr, Arc<Field>>,
    constructors: Vec<Arc<Method>>,
    interfaces: Vec<SmolStr>,
}

impl Shape {
    pub fn id(&self) -> ShapeId {
        self.id
    }

    pub fn key(&self) -> ShapeKey {
        ShapeKey::Host(self.id)
    }

    /// Fully qualified name, e.g. `com.acme.Person`.
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    pub fn package(&self) -> &str {
        self.name.rsplit_once('.').map(|(package, _)| package).unwrap_or("")
    }

    pub fn methods(&self, name: &str) -> &[Arc<Method>] {
        self.methods.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn field(&self, name: &str) -> Option<&Arc<Field>> {
        self.fields.get(name)
    }

    pub fn constructors(&self) -> &[Arc<Method>] {
        &self.constructors
    }

    /// Zero-argument getter for `property`, tried as `getX`, `isX`, then `x`.
    pub fn getter(&self, property: &str) -> Option<&Arc<Method>> {
        let capitalized = capitalize(property);
        [format!("get{capitalized}"), format!("is{capitalized}"), property.to_string()]
            .iter()
            .find_map(|name| {
                self.methods(name)
                    .iter()
                    .find(|m| m.params.is_empty() && !m.varargs)
            })
    }

    /// One-argument `setX` method.
    pub fn setter(&self, property: &str) -> Option<&Arc<Method>> {
        self.methods(&format!("set{}", capitalize(property)))
            .iter()
            .find(|m| m.params.len() == 1 && !m.varargs)
    }

    /// `true` when this shape is, or declares it implements, `type_name`.
    pub fn is_a(&self, type_name: &str) -> bool {
        self.name == type_name
            || self.simple_name() == type_name
            || self.interfaces.iter().any(|i| i == type_name)
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn downcast<'a, T: HostObject>(receiver: &'a Value, shape: &SmolStr) -> Result<&'a T, HostError> {
    match receiver {
        Value::Object(object) => object
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| HostError::Receiver(shape.clone())),
        _ => Err(HostError::Receiver(shape.clone())),
    }
}

/// Builds a [`Shape`] for host type `T`.
///
/// ```
/// use std::sync::Arc;
/// use xpr_lang::{HostObject, Shape, ShapeBuilder, TypeHint, Value};
///
/// #[derive(Debug)]
/// struct Point { x: i32 }
///
/// impl HostObject for Point {
///     fn shape(&self) -> Arc<Shape> {
///         static SHAPE: std::sync::LazyLock<Arc<Shape>> = std::sync::LazyLock::new(|| {
///             ShapeBuilder::<Point>::new("geo.Point")
///                 .getter("x", |p| Value::from(p.x))
///                 .method("scaled", &[TypeHint::Int], |p, args| {
///                     Ok(Value::from(p.x * args[0].as_i64().unwrap_or(1) as i32))
///                 })
///                 .build()
///         });
///         SHAPE.clone()
///     }
///
///     fn as_any(&self) -> &dyn std::any::Any { self }
/// }
/// ```
pub struct ShapeBuilder<T> {
    name: SmolStr,
    methods: FxHashMap<SmolStr, Vec<Arc<Method>>>,
    fields: FxHashMap<SmolStr, Arc<Field>>,
    constructors: Vec<Arc<Method>>,
    interfaces: Vec<SmolStr>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: HostObject> ShapeBuilder<T> {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self::empty(name.into())
    }

    pub fn method<F>(self, name: &str, params: &[TypeHint], f: F) -> Self
    where
        F: Fn(&T, &[Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        let shape = self.name.clone();
        self.raw_method(
            name,
            params,
            false,
            Arc::new(move |receiver, args| f(downcast::<T>(receiver, &shape)?, args)),
        )
    }

    /// A method whose last parameter type applies to all trailing arguments;
    /// they arrive collected into a single list value.
    pub fn varargs_method<F>(self, name: &str, params: &[TypeHint], f: F) -> Self
    where
        F: Fn(&T, &[Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        let shape = self.name.clone();
        self.raw_method(
            name,
            params,
            true,
            Arc::new(move |receiver, args| f(downcast::<T>(receiver, &shape)?, args)),
        )
    }

    /// Registers `get<Property>` as a zero-argument method.
    pub fn getter<F>(self, property: &str, f: F) -> Self
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let name = format!("get{}", capitalize(property));
        self.method(&name, &[], move |this, _| Ok(f(this)))
    }

    /// Registers `is<Property>` as a zero-argument method.
    pub fn flag<F>(self, property: &str, f: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let name = format!("is{}", capitalize(property));
        self.method(&name, &[], move |this, _| Ok(Value::Bool(f(this))))
    }

    /// Registers `set<Property>` as a one-argument method.
    pub fn setter<F>(self, property: &str, ty: TypeHint, f: F) -> Self
    where
        F: Fn(&T, Value) -> Result<(), HostError> + Send + Sync + 'static,
    {
        let name = format!("set{}", capitalize(property));
        self.method(&name, &[ty], move |this, args| {
            f(this, args.first().cloned().unwrap_or_default())?;
            Ok(Value::Null)
        })
    }

    pub fn field<G>(mut self, name: &str, ty: TypeHint, get: G) -> Self
    where
        G: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let shape = self.name.clone();
        let field = Field {
            name: name.into(),
            ty,
            get: Arc::new(move |receiver| Ok(get(downcast::<T>(receiver, &shape)?))),
            set: None,
        };
        self.fields.insert(name.into(), Arc::new(field));
        self
    }

    pub fn field_mut<G, S>(mut self, name: &str, ty: TypeHint, get: G, set: S) -> Self
    where
        G: Fn(&T) -> Value + Send + Sync + 'static,
        S: Fn(&T, Value) -> Result<(), HostError> + Send + Sync + 'static,
    {
        let get_shape = self.name.clone();
        let set_shape = self.name.clone();
        let field = Field {
            name: name.into(),
            ty,
            get: Arc::new(move |receiver| Ok(get(downcast::<T>(receiver, &get_shape)?))),
            set: Some(Arc::new(move |receiver, value| {
                set(downcast::<T>(receiver, &set_shape)?, value)
            })),
        };
        self.fields.insert(name.into(), Arc::new(field));
        self
    }
}

impl<T> ShapeBuilder<T> {
    pub(crate) fn empty(name: SmolStr) -> Self {
        Self {
            name,
            methods: FxHashMap::default(),
            fields: FxHashMap::default(),
            constructors: Vec::new(),
            interfaces: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub(crate) fn raw_method(mut self, name: &str, params: &[TypeHint], varargs: bool, func: MethodFn) -> Self {
        let method = Method {
            name: name.into(),
            params: params.to_vec(),
            varargs,
            func,
        };
        self.methods.entry(name.into()).or_default().push(Arc::new(method));
        self
    }

    /// Constructors receive their arguments already coerced to `params`.
    pub fn constructor<F>(mut self, params: &[TypeHint], f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        let method = Method {
            name: "<init>".into(),
            params: params.to_vec(),
            varargs: false,
            func: Arc::new(move |_, args| f(args)),
        };
        self.constructors.push(Arc::new(method));
        self
    }

    pub fn implements(mut self, type_name: impl Into<SmolStr>) -> Self {
        self.interfaces.push(type_name.into());
        self
    }

    pub fn build(self) -> Arc<Shape> {
        Arc::new(Shape {
            id: ShapeId::next(),
            name: self.name,
            methods: self.methods,
            fields: self.fields,
            constructors: self.constructors,
            interfaces: self.interfaces,
        })
    }
}

/// Types that are always in scope, named the way expressions spell them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinType {
    Object,
    Boolean,
    Integer,
    Long,
    Float,
    Double,
    BigDecimal,
    Number,
    Character,
    String,
    List,
    Map,
}

impl BuiltinType {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Object" => BuiltinType::Object,
            "Boolean" => BuiltinType::Boolean,
            "Integer" => BuiltinType::Integer,
            "Long" => BuiltinType::Long,
            "Float" => BuiltinType::Float,
            "Double" => BuiltinType::Double,
            "BigDecimal" | "BigInteger" => BuiltinType::BigDecimal,
            "Number" => BuiltinType::Number,
            "Character" => BuiltinType::Character,
            "String" => BuiltinType::String,
            "List" | "ArrayList" => BuiltinType::List,
            "Map" | "HashMap" => BuiltinType::Map,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinType::Object => "Object",
            BuiltinType::Boolean => "Boolean",
            BuiltinType::Integer => "Integer",
            BuiltinType::Long => "Long",
            BuiltinType::Float => "Float",
            BuiltinType::Double => "Double",
            BuiltinType::BigDecimal => "BigDecimal",
            BuiltinType::Number => "Number",
            BuiltinType::Character => "Character",
            BuiltinType::String => "String",
            BuiltinType::List => "List",
            BuiltinType::Map => "Map",
        }
    }

    pub fn hint(&self) -> TypeHint {
        match self {
            BuiltinType::Object => TypeHint::Any,
            BuiltinType::Boolean => TypeHint::Bool,
            BuiltinType::Integer => TypeHint::Int,
            BuiltinType::Long => TypeHint::Long,
            BuiltinType::Float => TypeHint::Float,
            BuiltinType::Double => TypeHint::Double,
            BuiltinType::BigDecimal => TypeHint::Decimal,
            BuiltinType::Number => TypeHint::Number,
            BuiltinType::Character => TypeHint::Char,
            BuiltinType::String => TypeHint::String,
            BuiltinType::List => TypeHint::List,
            BuiltinType::Map => TypeHint::Map,
        }
    }
}

/// A type used as a value, produced by type names in expressions.
#[derive(Debug, Clone)]
pub enum TypeRef {
    Builtin(BuiltinType),
    Host(Arc<Shape>),
}

impl TypeRef {
    pub fn name(&self) -> SmolStr {
        match self {
            TypeRef::Builtin(builtin) => builtin.name().into(),
            TypeRef::Host(shape) => shape.name().clone(),
        }
    }

    pub fn hint(&self) -> TypeHint {
        match self {
            TypeRef::Builtin(builtin) => builtin.hint(),
            TypeRef::Host(shape) => TypeHint::Object(shape.name().clone()),
        }
    }

    /// `instanceof` semantics: `null` is never an instance.
    pub fn is_instance(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => false,
            (TypeRef::Builtin(BuiltinType::Object), _) => true,
            (TypeRef::Builtin(BuiltinType::Number), Value::Number(_)) => true,
            (TypeRef::Builtin(builtin), Value::Number(n)) => builtin.hint().number_kind() == Some(n.kind()),
            (TypeRef::Builtin(BuiltinType::Boolean), Value::Bool(_))
            | (TypeRef::Builtin(BuiltinType::Character), Value::Char(_))
            | (TypeRef::Builtin(BuiltinType::String), Value::String(_))
            | (TypeRef::Builtin(BuiltinType::List), Value::List(_))
            | (TypeRef::Builtin(BuiltinType::Map), Value::Map(_)) => true,
            (TypeRef::Host(shape), Value::Object(object)) => {
                let actual = object.shape();
                actual.id() == shape.id() || actual.is_a(shape.name())
            }
            _ => false,
        }
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeRef::Builtin(a), TypeRef::Builtin(b)) => a == b,
            (TypeRef::Host(a), TypeRef::Host(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

/// Host types known to an engine, keyed by qualified name.
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    shapes: FxHashMap<SmolStr, Arc<Shape>>,
}

impl TypeRegistry {
    pub fn register(&mut self, shape: Arc<Shape>) {
        self.shapes.insert(shape.name().clone(), shape);
    }

    pub fn get(&self, qualified: &str) -> Option<&Arc<Shape>> {
        self.shapes.get(qualified)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Expands imports into a simple-name → qualified-name table.
    ///
    /// An import is either a qualified type name or `package.*`; the first
    /// import that matches nothing is returned as the error.
    pub fn resolve_imports(&self, imports: &[String]) -> Result<FxHashMap<SmolStr, SmolStr>, SmolStr> {
        let mut resolved = FxHashMap::default();
        for import in imports {
            if let Some(package) = import.strip_suffix(".*") {
                let mut found = false;
                for shape in self.shapes.values().filter(|s| s.package() == package) {
                    resolved.insert(SmolStr::new(shape.simple_name()), shape.name().clone());
                    found = true;
                }
                if !found {
                    return Err(import.into());
                }
            } else {
                let shape = self.shapes.get(import.as_str()).ok_or_else(|| SmolStr::new(import))?;
                resolved.insert(SmolStr::new(shape.simple_name()), shape.name().clone());
            }
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rstest::rstest;

    #[derive(Debug)]
    struct Counter {
        count: Mutex<i64>,
    }

    impl HostObject for Counter {
        fn shape(&self) -> Arc<Shape> {
            counter_shape()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn counter_shape() -> Arc<Shape> {
        static SHAPE: std::sync::LazyLock<Arc<Shape>> = std::sync::LazyLock::new(|| {
            ShapeBuilder::<Counter>::new("test.Counter")
                .getter("count", |c| Value::from(*c.count.lock()))
                .flag("zero", |c| *c.count.lock() == 0)
                .setter("count", TypeHint::Long, |c, v| {
                    *c.count.lock() = v.as_i64().unwrap_or_default();
                    Ok(())
                })
                .method("add", &[TypeHint::Long], |c, args| {
                    let mut count = c.count.lock();
                    *count += args[0].as_i64().unwrap_or_default();
                    Ok(Value::from(*count))
                })
                .implements("test.Countable")
                .build()
        });
        SHAPE.clone()
    }

    #[rstest]
    #[case("count", Some("getCount"))]
    #[case("zero", Some("isZero"))]
    #[case("add", None)]
    #[case("missing", None)]
    fn test_getter_lookup(#[case] property: &str, #[case] expected: Option<&str>) {
        let shape = counter_shape();
        assert_eq!(shape.getter(property).map(|m| m.name().as_str()), expected);
    }

    #[test]
    fn test_setter_and_invoke() {
        let shape = counter_shape();
        let value = Value::object(Counter { count: Mutex::new(1) });
        shape.setter("count").unwrap().invoke(&value, &[Value::from(5i64)]).unwrap();
        let result = shape.methods("add")[0].invoke(&value, &[Value::from(2i64)]).unwrap();
        assert_eq!(result, Value::from(7i64));
    }

    #[test]
    fn test_receiver_mismatch() {
        let shape = counter_shape();
        let err = shape.methods("add")[0].invoke(&Value::from(1), &[]).unwrap_err();
        assert_eq!(err, HostError::Receiver("test.Counter".into()));
    }

    #[rstest]
    #[case("test.Counter", true)]
    #[case("Counter", true)]
    #[case("test.Countable", true)]
    #[case("test.Other", false)]
    fn test_is_a(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(counter_shape().is_a(name), expected);
    }

    #[rstest]
    #[case(vec!["test.Counter"], Ok(vec![("Counter", "test.Counter")]))]
    #[case(vec!["test.*"], Ok(vec![("Counter", "test.Counter")]))]
    #[case(vec!["test.Missing"], Err("test.Missing"))]
    #[case(vec!["nothing.*"], Err("nothing.*"))]
    fn test_resolve_imports(#[case] imports: Vec<&str>, #[case] expected: Result<Vec<(&str, &str)>, &str>) {
        let mut registry = TypeRegistry::default();
        registry.register(counter_shape());
        let imports = imports.into_iter().map(String::from).collect::<Vec<_>>();
        let expected = expected
            .map(|pairs| {
                pairs
                    .into_iter()
                    .map(|(k, v)| (SmolStr::new(k), SmolStr::new(v)))
                    .collect::<FxHashMap<_, _>>()
            })
            .map_err(SmolStr::new);
        assert_eq!(registry.resolve_imports(&imports), expected);
    }

    #[rstest]
    #[case(TypeRef::Builtin(BuiltinType::Integer), Value::from(1), true)]
    #[case(TypeRef::Builtin(BuiltinType::Integer), Value::from(1i64), false)]
    #[case(TypeRef::Builtin(BuiltinType::Number), Value::from(1.5), true)]
    #[case(TypeRef::Builtin(BuiltinType::String), Value::from("a"), true)]
    #[case(TypeRef::Builtin(BuiltinType::Object), Value::Null, false)]
    fn test_is_instance(#[case] ty: TypeRef, #[case] value: Value, #[case] expected: bool) {
        assert_eq!(ty.is_instance(&value), expected);
    }
}
