use crate::ast::node::Function;
use crate::number::Number;
use crate::shape::builtin::{LIST_SHAPE, MAP_SHAPE, STRING_SHAPE};
use crate::shape::{HostObject, Shape, ShapeKey, TypeRef};
use itertools::Itertools;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

pub(crate) mod convert;

pub type List = Arc<RwLock<Vec<Value>>>;
pub type Map = Arc<RwLock<FxHashMap<MapKey, Value>>>;

/// Dynamic value flowing through expressions.
///
/// Lists and maps are shared containers: cloning a `Value` clones the handle,
/// so writes through `list[0] = x` are visible through every copy.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    Char(char),
    String(SmolStr),
    List(List),
    Map(Map),
    Object(Arc<dyn HostObject>),
    Function(Arc<Function>),
    Type(TypeRef),
}

/// Hashable projection of a value used for map keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Null,
    Bool(bool),
    Integer(i64),
    Char(char),
    String(SmolStr),
}

impl MapKey {
    /// `None` for values that cannot key a map (fractions, containers, objects).
    pub fn from_value(value: &Value) -> Option<MapKey> {
        Some(match value {
            Value::Null => MapKey::Null,
            Value::Bool(b) => MapKey::Bool(*b),
            Value::Number(n) => MapKey::Integer(n.to_i64()?),
            Value::Char(c) => MapKey::Char(*c),
            Value::String(s) => MapKey::String(s.clone()),
            _ => return None,
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Null => Value::Null,
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Integer(i) => Value::Number(i32::try_from(*i).map(Number::Int).unwrap_or(Number::Long(*i))),
            MapKey::Char(c) => Value::Char(*c),
            MapKey::String(s) => Value::String(s.clone()),
        }
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        MapKey::String(s.into())
    }
}

impl From<i64> for MapKey {
    fn from(i: i64) -> Self {
        MapKey::Integer(i)
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl Value {
    pub fn list(items: impl IntoIterator<Item = Value>) -> Value {
        Value::List(Arc::new(RwLock::new(items.into_iter().collect())))
    }

    pub fn map(entries: impl IntoIterator<Item = (MapKey, Value)>) -> Value {
        Value::Map(Arc::new(RwLock::new(entries.into_iter().collect())))
    }

    pub fn object(object: impl HostObject) -> Value {
        Value::Object(Arc::new(object))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The exact integral value of a number.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_number().and_then(|n| n.to_i64())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Borrows the host object as `T`.
    pub fn downcast_ref<T: HostObject>(&self) -> Option<&T> {
        match self {
            Value::Object(object) => object.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn shape_key(&self) -> ShapeKey {
        match self {
            Value::Null => ShapeKey::Null,
            Value::Bool(_) => ShapeKey::Bool,
            Value::Number(n) => ShapeKey::Number(n.kind()),
            Value::Char(_) => ShapeKey::Char,
            Value::String(_) => ShapeKey::String,
            Value::List(_) => ShapeKey::List,
            Value::Map(_) => ShapeKey::Map,
            Value::Object(object) => object.shape().key(),
            Value::Function(_) => ShapeKey::Function,
            Value::Type(_) => ShapeKey::Type,
        }
    }

    /// Methods, getters and fields reachable on this value.
    pub fn shape(&self) -> Option<Arc<Shape>> {
        match self {
            Value::String(_) => Some(Arc::clone(&STRING_SHAPE)),
            Value::List(_) => Some(Arc::clone(&LIST_SHAPE)),
            Value::Map(_) => Some(Arc::clone(&MAP_SHAPE)),
            Value::Object(object) => Some(object.shape()),
            _ => None,
        }
    }

    pub fn type_name(&self) -> SmolStr {
        match self {
            Value::Null => "null".into(),
            Value::Bool(_) => "boolean".into(),
            Value::Number(n) => n.kind().name().into(),
            Value::Char(_) => "char".into(),
            Value::String(_) => "string".into(),
            Value::List(_) => "list".into(),
            Value::Map(_) => "map".into(),
            Value::Object(object) => object.shape().name().clone(),
            Value::Function(_) => "function".into(),
            Value::Type(_) => "type".into(),
        }
    }

    /// `==` semantics: numbers compare by value across kinds, a one-character
    /// string equals the same char, containers compare element-wise and host
    /// objects by identity.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Char(c), Value::String(s)) | (Value::String(s), Value::Char(c)) => {
                let mut chars = s.chars();
                chars.next() == Some(*c) && chars.next().is_none()
            }
            (Value::List(a), Value::List(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.read(), b.read());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.read(), b.read());
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.loose_eq(w)))
            }
            (Value::Object(a), Value::Object(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Type(a), Value::Type(b)) => a == b,
            _ => false,
        }
    }

    /// Ordering for relational operators; `None` when the pair is unordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.compare(b),
            (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
            (Value::Char(a), Value::Char(b)) => Some(a.cmp(b)),
            (Value::Char(a), Value::Number(b)) => Number::Int(*a as i32).compare(b),
            (Value::Number(a), Value::Char(b)) => a.compare(&Number::Int(*b as i32)),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => match n {
                Number::Int(i) => (*i).into(),
                Number::Long(i) => (*i).into(),
                other => serde_json::Number::from_f64(other.to_f64())
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
            },
            Value::List(list) => serde_json::Value::Array(list.read().iter().map(Value::to_json).collect()),
            Value::Map(map) => serde_json::Value::Object(
                map.read()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
            other => serde_json::Value::String(other.to_string()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.loose_eq(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Char(c) => write!(f, "{}", c),
            Value::String(s) => write!(f, "{}", s),
            Value::List(list) => write!(f, "[{}]", list.read().iter().join(", ")),
            Value::Map(map) => write!(
                f,
                "{{{}}}",
                map.read().iter().map(|(k, v)| format!("{}={}", k, v)).join(", ")
            ),
            Value::Object(object) => write!(f, "{:?}", object),
            Value::Function(function) => write!(f, "def {}({})", function.name, function.params.iter().join(", ")),
            Value::Type(ty) => write!(f, "{}", ty.name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Value::Char(c) => f.debug_tuple("Char").field(c).finish(),
            Value::String(s) => f.debug_tuple("String").field(s).finish(),
            Value::List(list) => f.debug_tuple("List").field(&*list.read()).finish(),
            Value::Map(map) => f.debug_tuple("Map").field(&*map.read()).finish(),
            Value::Object(object) => f.debug_tuple("Object").field(object).finish(),
            Value::Function(function) => f.debug_tuple("Function").field(&function.name).finish(),
            Value::Type(ty) => f.debug_tuple("Type").field(&ty.name()).finish(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(Number::Int(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::Long(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Number(Number::Float(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(Number::Double(n))
    }
}

impl From<Decimal> for Value {
    fn from(n: Decimal) -> Self {
        Value::Number(Number::Decimal(n))
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<SmolStr> for Value {
    fn from(s: SmolStr) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

impl From<TypeRef> for Value {
    fn from(ty: TypeRef) -> Self {
        Value::Type(ty)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Number(i32::try_from(i).map(Number::Int).unwrap_or(Number::Long(i))),
                None => Value::Number(Number::Double(n.as_f64().unwrap_or(f64::NAN))),
            },
            serde_json::Value::String(s) => Value::String(s.into()),
            serde_json::Value::Array(items) => Value::list(items.into_iter().map(Value::from)),
            serde_json::Value::Object(entries) => {
                Value::map(entries.into_iter().map(|(k, v)| (MapKey::String(k.into()), Value::from(v))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Value::from(1), Value::from(1.0), true)]
    #[case(Value::from('a'), Value::from("a"), true)]
    #[case(Value::from("ab"), Value::from('a'), false)]
    #[case(Value::Null, Value::from(0), false)]
    #[case(Value::list([Value::from(1), Value::from("x")]), Value::list([Value::from(1i64), Value::from("x")]), true)]
    #[case(Value::map([(MapKey::from("k"), Value::from(1))]), Value::map([(MapKey::from("k"), Value::from(1))]), true)]
    #[case(Value::map([(MapKey::from("k"), Value::from(1))]), Value::map([(MapKey::from("j"), Value::from(1))]), false)]
    fn test_loose_eq(#[case] a: Value, #[case] b: Value, #[case] expected: bool) {
        assert_eq!(a.loose_eq(&b), expected);
    }

    #[rstest]
    #[case(Value::from(1), Some(MapKey::Integer(1)))]
    #[case(Value::from(2.0), Some(MapKey::Integer(2)))]
    #[case(Value::from(2.5), None)]
    #[case(Value::from("k"), Some(MapKey::from("k")))]
    #[case(Value::list([]), None)]
    fn test_map_key_from_value(#[case] value: Value, #[case] expected: Option<MapKey>) {
        assert_eq!(MapKey::from_value(&value), expected);
    }

    #[rstest]
    #[case(Value::Null, "null")]
    #[case(Value::from(14), "14")]
    #[case(Value::from(2.0), "2.0")]
    #[case(Value::list([Value::from(1), Value::from("a")]), "[1, a]")]
    #[case(Value::map([(MapKey::from("k"), Value::from("v"))]), "{k=v}")]
    fn test_display(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(value.to_string(), expected);
    }

    #[test]
    fn test_shared_list_mutation() {
        let list = Value::list([Value::from(1)]);
        let alias = list.clone();
        if let Value::List(items) = &list {
            items.write().push(Value::from(2));
        }
        assert_eq!(alias, Value::list([Value::from(1), Value::from(2)]));
    }

    #[test]
    fn test_from_json() {
        let json = serde_json::json!({"name": "x", "tags": ["a", "b"], "n": 3, "big": 10000000000i64});
        let value = Value::from(json.clone());
        let Value::Map(map) = &value else {
            panic!("expected map");
        };
        assert_eq!(map.read().get(&MapKey::from("n")), Some(&Value::from(3)));
        assert_eq!(map.read().get(&MapKey::from("big")).map(Value::shape_key), Some(ShapeKey::Number(crate::number::NumberKind::Long)));
        assert_eq!(value.to_json(), json);
    }
}
