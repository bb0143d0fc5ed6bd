//! Methods available on strings, lists and maps.

use super::{HostError, Shape, ShapeBuilder, TypeHint};
use crate::value::{MapKey, Value};
use smol_str::SmolStr;
use std::sync::{Arc, LazyLock};

pub(crate) static STRING_SHAPE: LazyLock<Arc<Shape>> = LazyLock::new(string_shape);
pub(crate) static LIST_SHAPE: LazyLock<Arc<Shape>> = LazyLock::new(list_shape);
pub(crate) static MAP_SHAPE: LazyLock<Arc<Shape>> = LazyLock::new(map_shape);

macro_rules! define_method {
    ($builder:expr, $name:literal, [$($param:expr),*], |$receiver:ident, $args:ident| $body:expr) => {
        $builder.raw_method($name, &[$($param),*], false, Arc::new(|$receiver: &Value, $args: &[Value]| -> Result<Value, HostError> { $body }))
    };
}

fn receiver_str<'a>(value: &'a Value) -> Result<&'a str, HostError> {
    match value {
        Value::String(s) => Ok(s.as_str()),
        _ => Err(HostError::Receiver("String".into())),
    }
}

fn arg_str(args: &[Value], index: usize) -> Result<SmolStr, HostError> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Char(c)) => Ok(SmolStr::new(c.to_string())),
        _ => Err(HostError::Argument {
            index,
            expected: "string".into(),
        }),
    }
}

fn arg_index(args: &[Value], index: usize) -> Result<i64, HostError> {
    args.get(index).and_then(Value::as_i64).ok_or(HostError::Argument {
        index,
        expected: "int".into(),
    })
}

fn arg_key(args: &[Value], index: usize) -> Result<MapKey, HostError> {
    args.get(index)
        .and_then(MapKey::from_value)
        .ok_or(HostError::Argument {
            index,
            expected: "map key".into(),
        })
}

fn checked_index(index: i64, len: usize) -> Result<usize, HostError> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or(HostError::IndexOutOfBounds { index, len })
}

fn char_range(s: &str, start: i64, end: i64) -> Result<String, HostError> {
    let len = s.chars().count();
    if start < 0 || end < start || end as usize > len {
        return Err(HostError::IndexOutOfBounds {
            index: if start < 0 { start } else { end },
            len,
        });
    }
    Ok(s.chars().skip(start as usize).take((end - start) as usize).collect())
}

fn string_shape() -> Arc<Shape> {
    let builder = ShapeBuilder::<Value>::empty("String".into());
    let builder = define_method!(builder, "length", [], |s, _a| Ok(Value::from(receiver_str(s)?.chars().count())));
    let builder = define_method!(builder, "isEmpty", [], |s, _a| Ok(Value::Bool(receiver_str(s)?.is_empty())));
    let builder = define_method!(builder, "charAt", [TypeHint::Int], |s, a| {
        let s = receiver_str(s)?;
        let index = arg_index(a, 0)?;
        let len = s.chars().count();
        checked_index(index, len).and_then(|i| {
            s.chars()
                .nth(i)
                .map(Value::Char)
                .ok_or(HostError::IndexOutOfBounds { index, len })
        })
    });
    let builder = define_method!(builder, "substring", [TypeHint::Int], |s, a| {
        let s = receiver_str(s)?;
        char_range(s, arg_index(a, 0)?, s.chars().count() as i64).map(Value::from)
    });
    let builder = define_method!(builder, "substring", [TypeHint::Int, TypeHint::Int], |s, a| {
        char_range(receiver_str(s)?, arg_index(a, 0)?, arg_index(a, 1)?).map(Value::from)
    });
    let builder = define_method!(builder, "indexOf", [TypeHint::String], |s, a| {
        let s = receiver_str(s)?;
        let needle = arg_str(a, 0)?;
        Ok(Value::from(match s.find(needle.as_str()) {
            Some(byte) => s[..byte].chars().count() as i32,
            None => -1,
        }))
    });
    let builder = define_method!(builder, "contains", [TypeHint::String], |s, a| {
        Ok(Value::Bool(receiver_str(s)?.contains(arg_str(a, 0)?.as_str())))
    });
    let builder = define_method!(builder, "startsWith", [TypeHint::String], |s, a| {
        Ok(Value::Bool(receiver_str(s)?.starts_with(arg_str(a, 0)?.as_str())))
    });
    let builder = define_method!(builder, "endsWith", [TypeHint::String], |s, a| {
        Ok(Value::Bool(receiver_str(s)?.ends_with(arg_str(a, 0)?.as_str())))
    });
    let builder = define_method!(builder, "toUpperCase", [], |s, _a| Ok(Value::from(receiver_str(s)?.to_uppercase())));
    let builder = define_method!(builder, "toLowerCase", [], |s, _a| Ok(Value::from(receiver_str(s)?.to_lowercase())));
    let builder = define_method!(builder, "trim", [], |s, _a| Ok(Value::from(receiver_str(s)?.trim())));
    let builder = define_method!(builder, "concat", [TypeHint::String], |s, a| {
        Ok(Value::from(format!("{}{}", receiver_str(s)?, arg_str(a, 0)?)))
    });
    let builder = define_method!(builder, "equals", [TypeHint::Any], |s, a| {
        Ok(Value::Bool(a.first().is_some_and(|other| s.loose_eq(other))))
    });
    let builder = define_method!(builder, "equalsIgnoreCase", [TypeHint::String], |s, a| {
        Ok(Value::Bool(receiver_str(s)?.to_lowercase() == arg_str(a, 0)?.to_lowercase()))
    });
    let builder = define_method!(builder, "replace", [TypeHint::String, TypeHint::String], |s, a| {
        Ok(Value::from(receiver_str(s)?.replace(arg_str(a, 0)?.as_str(), arg_str(a, 1)?.as_str())))
    });
    let builder = define_method!(builder, "split", [TypeHint::String], |s, a| {
        let separator = arg_str(a, 0)?;
        Ok(Value::list(
            receiver_str(s)?.split(separator.as_str()).map(Value::from),
        ))
    });
    builder.build()
}

fn list_of(value: &Value) -> Result<&crate::value::List, HostError> {
    match value {
        Value::List(list) => Ok(list),
        _ => Err(HostError::Receiver("List".into())),
    }
}

fn list_shape() -> Arc<Shape> {
    let builder = ShapeBuilder::<Value>::empty("List".into());
    let builder = define_method!(builder, "size", [], |l, _a| Ok(Value::from(list_of(l)?.read().len())));
    let builder = define_method!(builder, "isEmpty", [], |l, _a| Ok(Value::Bool(list_of(l)?.read().is_empty())));
    let builder = define_method!(builder, "get", [TypeHint::Int], |l, a| {
        let list = list_of(l)?.read();
        let index = checked_index(arg_index(a, 0)?, list.len())?;
        Ok(list[index].clone())
    });
    let builder = define_method!(builder, "contains", [TypeHint::Any], |l, a| {
        let needle = a.first().cloned().unwrap_or_default();
        Ok(Value::Bool(list_of(l)?.read().iter().any(|v| v.loose_eq(&needle))))
    });
    let builder = define_method!(builder, "indexOf", [TypeHint::Any], |l, a| {
        let needle = a.first().cloned().unwrap_or_default();
        let position = list_of(l)?.read().iter().position(|v| v.loose_eq(&needle));
        Ok(Value::from(position.map(|p| p as i64).unwrap_or(-1) as i32))
    });
    let builder = define_method!(builder, "add", [TypeHint::Any], |l, a| {
        list_of(l)?.write().push(a.first().cloned().unwrap_or_default());
        Ok(Value::Bool(true))
    });
    let builder = define_method!(builder, "set", [TypeHint::Int, TypeHint::Any], |l, a| {
        let mut list = list_of(l)?.write();
        let index = checked_index(arg_index(a, 0)?, list.len())?;
        Ok(std::mem::replace(&mut list[index], a.get(1).cloned().unwrap_or_default()))
    });
    let builder = define_method!(builder, "remove", [TypeHint::Int], |l, a| {
        let mut list = list_of(l)?.write();
        let index = checked_index(arg_index(a, 0)?, list.len())?;
        Ok(list.remove(index))
    });
    let builder = define_method!(builder, "clear", [], |l, _a| {
        list_of(l)?.write().clear();
        Ok(Value::Null)
    });
    builder.build()
}

fn map_of(value: &Value) -> Result<&crate::value::Map, HostError> {
    match value {
        Value::Map(map) => Ok(map),
        _ => Err(HostError::Receiver("Map".into())),
    }
}

fn map_shape() -> Arc<Shape> {
    let builder = ShapeBuilder::<Value>::empty("Map".into());
    let builder = define_method!(builder, "size", [], |m, _a| Ok(Value::from(map_of(m)?.read().len())));
    let builder = define_method!(builder, "isEmpty", [], |m, _a| Ok(Value::Bool(map_of(m)?.read().is_empty())));
    let builder = define_method!(builder, "get", [TypeHint::Any], |m, a| {
        let key = arg_key(a, 0)?;
        Ok(map_of(m)?.read().get(&key).cloned().unwrap_or_default())
    });
    let builder = define_method!(builder, "containsKey", [TypeHint::Any], |m, a| {
        let key = arg_key(a, 0)?;
        Ok(Value::Bool(map_of(m)?.read().contains_key(&key)))
    });
    let builder = define_method!(builder, "containsValue", [TypeHint::Any], |m, a| {
        let needle = a.first().cloned().unwrap_or_default();
        Ok(Value::Bool(map_of(m)?.read().values().any(|v| v.loose_eq(&needle))))
    });
    let builder = define_method!(builder, "put", [TypeHint::Any, TypeHint::Any], |m, a| {
        let key = arg_key(a, 0)?;
        let previous = map_of(m)?.write().insert(key, a.get(1).cloned().unwrap_or_default());
        Ok(previous.unwrap_or_default())
    });
    let builder = define_method!(builder, "remove", [TypeHint::Any], |m, a| {
        let key = arg_key(a, 0)?;
        Ok(map_of(m)?.write().remove(&key).unwrap_or_default())
    });
    let builder = define_method!(builder, "keySet", [], |m, _a| {
        Ok(Value::list(map_of(m)?.read().keys().map(MapKey::to_value)))
    });
    let builder = define_method!(builder, "values", [], |m, _a| {
        Ok(Value::list(map_of(m)?.read().values().cloned()))
    });
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn call(shape: &Shape, receiver: &Value, name: &str, args: &[Value]) -> Result<Value, HostError> {
        let method = shape
            .methods(name)
            .iter()
            .find(|m| m.params().len() == args.len())
            .unwrap();
        method.invoke(receiver, args)
    }

    #[rstest]
    #[case("length", vec![], Ok(Value::from(5)))]
    #[case("charAt", vec![Value::from(1)], Ok(Value::Char('e')))]
    #[case("charAt", vec![Value::from(9)], Err(HostError::IndexOutOfBounds { index: 9, len: 5 }))]
    #[case("substring", vec![Value::from(1), Value::from(3)], Ok(Value::from("el")))]
    #[case("substring", vec![Value::from(3)], Ok(Value::from("lo")))]
    #[case("indexOf", vec![Value::from("l")], Ok(Value::from(2)))]
    #[case("toUpperCase", vec![], Ok(Value::from("HELLO")))]
    #[case("equals", vec![Value::from("hello")], Ok(Value::Bool(true)))]
    fn test_string_methods(#[case] name: &str, #[case] args: Vec<Value>, #[case] expected: Result<Value, HostError>) {
        assert_eq!(call(&STRING_SHAPE, &Value::from("hello"), name, &args), expected);
    }

    #[test]
    fn test_list_methods_mutate_shared_list() {
        let list = Value::list([Value::from("x"), Value::from("y")]);
        let alias = list.clone();
        call(&LIST_SHAPE, &list, "add", &[Value::from("z")]).unwrap();
        assert_eq!(call(&LIST_SHAPE, &alias, "size", &[]), Ok(Value::from(3)));
        assert_eq!(call(&LIST_SHAPE, &alias, "get", &[Value::from(2)]), Ok(Value::from("z")));
    }

    #[test]
    fn test_map_methods() {
        let map = Value::map([(MapKey::from("k"), Value::from("v"))]);
        assert_eq!(call(&MAP_SHAPE, &map, "get", &[Value::from("k")]), Ok(Value::from("v")));
        assert_eq!(call(&MAP_SHAPE, &map, "get", &[Value::from("nope")]), Ok(Value::Null));
        call(&MAP_SHAPE, &map, "put", &[Value::from("n"), Value::from(1)]).unwrap();
        assert_eq!(call(&MAP_SHAPE, &map, "containsKey", &[Value::from("n")]), Ok(Value::Bool(true)));
    }
}
