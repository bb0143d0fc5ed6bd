use super::Value;
use crate::number::{Number, NumberKind};
use crate::shape::TypeHint;
use std::cmp::Ordering;

/// How well a value fits a declared type, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Fit {
    Coercion = 1,
    Any = 2,
    Widening = 3,
    Exact = 4,
}

fn parse_number(s: &str) -> Option<Number> {
    let s = s.trim();
    Number::from_literal(s)
        .or_else(|| s.parse::<f64>().ok().map(Number::Double))
        .or_else(|| s.strip_prefix('-').and_then(Number::from_literal).map(Number::neg))
}

fn number_fit(n: &Number, target: NumberKind) -> Fit {
    match n.kind().cmp(&target) {
        Ordering::Equal => Fit::Exact,
        Ordering::Less => Fit::Widening,
        Ordering::Greater => Fit::Coercion,
    }
}

/// Classifies `value` against `hint`; `None` when no conversion exists.
pub(crate) fn fit(value: &Value, hint: &TypeHint) -> Option<Fit> {
    if matches!(hint, TypeHint::Any) {
        return Some(Fit::Any);
    }
    match (value, hint) {
        (Value::Null, hint) if hint.is_primitive() => None,
        (Value::Null, _) => Some(Fit::Coercion),
        (Value::Bool(_), TypeHint::Bool) => Some(Fit::Exact),
        (Value::Number(n), hint) if hint.number_kind().is_some() => hint.number_kind().map(|k| number_fit(n, k)),
        (Value::Number(_), TypeHint::Number) => Some(Fit::Widening),
        (Value::Number(n), TypeHint::Char) if n.is_integral() => Some(Fit::Coercion),
        (Value::Char(_), TypeHint::Char) => Some(Fit::Exact),
        (Value::Char(_), TypeHint::String) => Some(Fit::Widening),
        (Value::Char(_), hint) if hint.is_numeric() => Some(Fit::Coercion),
        (Value::String(_), TypeHint::String) => Some(Fit::Exact),
        (Value::String(s), TypeHint::Char) if s.chars().count() == 1 => Some(Fit::Coercion),
        (Value::String(s), hint) if hint.is_numeric() => parse_number(s).map(|_| Fit::Coercion),
        (Value::String(s), TypeHint::Bool) if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") => {
            Some(Fit::Coercion)
        }
        (Value::List(_), TypeHint::List)
        | (Value::Map(_), TypeHint::Map)
        | (Value::Function(_), TypeHint::Function)
        | (Value::Type(_), TypeHint::Type) => Some(Fit::Exact),
        (Value::Object(object), TypeHint::Object(name)) => {
            let shape = object.shape();
            if shape.name() == name {
                Some(Fit::Exact)
            } else if shape.is_a(name) {
                Some(Fit::Widening)
            } else {
                None
            }
        }
        (_, TypeHint::String) => Some(Fit::Coercion),
        _ => None,
    }
}

/// Converts `value` to `hint`, or `None` when [`fit`] would reject it.
pub(crate) fn coerce(value: &Value, hint: &TypeHint) -> Option<Value> {
    fit(value, hint)?;
    Some(match (value, hint) {
        (_, TypeHint::Any) | (Value::Null, _) => value.clone(),
        (Value::Number(n), hint) if hint.number_kind().is_some() => Value::Number(n.cast(hint.number_kind()?)?),
        (Value::Char(c), hint) if hint.number_kind().is_some() => {
            Value::Number(Number::Int(*c as i32).cast(hint.number_kind()?)?)
        }
        (Value::Char(c), TypeHint::Number) => Value::Number(Number::Int(*c as i32)),
        (Value::String(s), TypeHint::Number) => Value::Number(parse_number(s)?),
        (Value::String(s), hint) if hint.number_kind().is_some() => {
            Value::Number(parse_number(s)?.cast(hint.number_kind()?)?)
        }
        (Value::String(s), TypeHint::Char) => Value::Char(s.chars().next()?),
        (Value::String(s), TypeHint::Bool) => Value::Bool(s.eq_ignore_ascii_case("true")),
        (Value::Number(n), TypeHint::Char) => Value::Char(char::from_u32(u32::try_from(n.to_i64()?).ok()?)?),
        (Value::String(_), TypeHint::String) => value.clone(),
        (_, TypeHint::String) => Value::String(value.to_string().into()),
        _ => value.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Value::from(1), TypeHint::Int, Some(Fit::Exact))]
    #[case(Value::from(1), TypeHint::Long, Some(Fit::Widening))]
    #[case(Value::from(1.5), TypeHint::Int, Some(Fit::Coercion))]
    #[case(Value::from("12"), TypeHint::Int, Some(Fit::Coercion))]
    #[case(Value::from("twelve"), TypeHint::Int, None)]
    #[case(Value::from(1), TypeHint::Any, Some(Fit::Any))]
    #[case(Value::Null, TypeHint::Int, None)]
    #[case(Value::Null, TypeHint::String, Some(Fit::Coercion))]
    #[case(Value::from(true), TypeHint::List, None)]
    fn test_fit(#[case] value: Value, #[case] hint: TypeHint, #[case] expected: Option<Fit>) {
        assert_eq!(fit(&value, &hint), expected);
    }

    #[rstest]
    #[case(Value::from("12"), TypeHint::Long, Some(Value::from(12i64)))]
    #[case(Value::from("-2.5"), TypeHint::Double, Some(Value::from(-2.5)))]
    #[case(Value::from(3.9), TypeHint::Int, Some(Value::from(3)))]
    #[case(Value::from(65), TypeHint::Char, Some(Value::Char('A')))]
    #[case(Value::from(7), TypeHint::String, Some(Value::from("7")))]
    #[case(Value::from("TRUE"), TypeHint::Bool, Some(Value::from(true)))]
    #[case(Value::from("x"), TypeHint::Map, None)]
    fn test_coerce(#[case] value: Value, #[case] hint: TypeHint, #[case] expected: Option<Value>) {
        assert_eq!(coerce(&value, &hint), expected);
    }
}
