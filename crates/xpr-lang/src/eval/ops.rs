use std::sync::LazyLock;

use parking_lot::Mutex;
use regex_lite::Regex;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::error::EvalError;
use crate::{
    ast::{Operator, UnaryOp},
    number::{BitOp, DecimalContext, Number},
    value::{MapKey, Value, convert},
};

const REGEX_CACHE_LIMIT: usize = 256;

static REGEX_CACHE: LazyLock<Mutex<FxHashMap<SmolStr, Regex>>> = LazyLock::new(|| Mutex::new(FxHashMap::default()));

fn mismatch(op: Operator, left: &Value, right: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op: op.symbol().into(),
        left: left.type_name(),
        right: right.type_name(),
    }
}

/// Numbers, with chars taking part as their code point.
fn numeric(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => Some(*n),
        Value::Char(c) => Some(Number::Int(*c as i32)),
        _ => None,
    }
}

/// Condition semantics: booleans as is, `null` as false, anything else fails.
pub(crate) fn truthy(value: &Value) -> Result<bool, EvalError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(EvalError::NonBooleanCondition(other.type_name())),
    }
}

pub(crate) fn binary(op: Operator, left: &Value, right: &Value, decimal: &DecimalContext) -> Result<Value, EvalError> {
    match op {
        Operator::Add => match (left, right) {
            (Value::String(_), _) | (_, Value::String(_)) => Ok(concat(left, right)),
            _ => arithmetic(op, left, right, |a, b| Ok(a.add(b))),
        },
        Operator::Sub => arithmetic(op, left, right, |a, b| Ok(a.sub(b))),
        Operator::Mul => arithmetic(op, left, right, |a, b| Ok(a.mul(b))),
        Operator::Div => arithmetic(op, left, right, |a, b| Ok(a.div(b, decimal)?)),
        Operator::Rem => arithmetic(op, left, right, |a, b| Ok(a.rem(b)?)),
        Operator::Pow => arithmetic(op, left, right, |a, b| Ok(a.pow(b))),
        Operator::StrAppend => Ok(concat(left, right)),
        Operator::Eq => Ok(Value::Bool(left.loose_eq(right))),
        Operator::Ne => Ok(Value::Bool(!left.loose_eq(right))),
        Operator::Lt | Operator::Gt | Operator::Le | Operator::Ge => {
            let ordering = left.compare(right).ok_or_else(|| mismatch(op, left, right))?;
            Ok(Value::Bool(match op {
                Operator::Lt => ordering.is_lt(),
                Operator::Gt => ordering.is_gt(),
                Operator::Le => ordering.is_le(),
                _ => ordering.is_ge(),
            }))
        }
        Operator::BitAnd | Operator::BitOr | Operator::BitXor => match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(match op {
                Operator::BitAnd => a & b,
                Operator::BitOr => a | b,
                _ => a ^ b,
            })),
            _ => bitwise(op, left, right),
        },
        Operator::Shl | Operator::Shr | Operator::UShr => bitwise(op, left, right),
        Operator::Contains => contains(left, right).map(Value::Bool),
        Operator::SoundsLike => match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(Value::Bool(soundex(a) == soundex(b))),
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Bool(false)),
            _ => Err(mismatch(op, left, right)),
        },
        Operator::Similarity => match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(Value::from(strsim::normalized_levenshtein(a, b))),
            _ => Err(mismatch(op, left, right)),
        },
        Operator::Regex => match (left, right) {
            (Value::Null, Value::String(_)) => Ok(Value::Bool(false)),
            (Value::String(text), Value::String(pattern)) => full_match(pattern, text).map(Value::Bool),
            (Value::Char(c), Value::String(pattern)) => full_match(pattern, c.encode_utf8(&mut [0; 4])).map(Value::Bool),
            _ => Err(mismatch(op, left, right)),
        },
        Operator::InstanceOf => match right {
            Value::Type(ty) => Ok(Value::Bool(ty.is_instance(left))),
            _ => Err(mismatch(op, left, right)),
        },
        Operator::ConvertibleTo => match right {
            Value::Type(ty) => Ok(Value::Bool(
                ty.is_instance(left) || convert::fit(left, &ty.hint()).is_some(),
            )),
            _ => Err(mismatch(op, left, right)),
        },
        Operator::And | Operator::Or => {
            let (a, b) = (truthy(left)?, truthy(right)?);
            Ok(Value::Bool(if op == Operator::And { a && b } else { a || b }))
        }
        Operator::Ternary | Operator::TernaryElse | Operator::EndOfStatement => Err(mismatch(op, left, right)),
    }
}

pub(crate) fn unary(op: UnaryOp, operand: &Value) -> Result<Value, EvalError> {
    let mismatch = || EvalError::UnaryTypeMismatch {
        op: op.to_string().into(),
        operand: operand.type_name(),
    };
    match op {
        UnaryOp::Not => match operand {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            Value::Null => Ok(Value::Bool(true)),
            _ => Err(mismatch()),
        },
        UnaryOp::Neg => numeric(operand).map(|n| Value::Number(n.neg())).ok_or_else(mismatch),
        UnaryOp::BitNot => numeric(operand)
            .and_then(Number::bit_not)
            .map(Value::Number)
            .ok_or_else(mismatch),
    }
}

fn arithmetic(
    op: Operator,
    left: &Value,
    right: &Value,
    f: impl FnOnce(Number, Number) -> Result<Number, EvalError>,
) -> Result<Value, EvalError> {
    match (numeric(left), numeric(right)) {
        (Some(a), Some(b)) => f(a, b).map(Value::Number),
        _ => Err(mismatch(op, left, right)),
    }
}

fn bitwise(op: Operator, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let bit_op = match op {
        Operator::BitAnd => BitOp::And,
        Operator::BitOr => BitOp::Or,
        Operator::BitXor => BitOp::Xor,
        Operator::Shl => BitOp::Shl,
        Operator::Shr => BitOp::Shr,
        _ => BitOp::UShr,
    };
    numeric(left)
        .zip(numeric(right))
        .and_then(|(a, b)| a.bitwise(b, bit_op))
        .map(Value::Number)
        .ok_or_else(|| mismatch(op, left, right))
}

fn concat(left: &Value, right: &Value) -> Value {
    Value::String(smol_str::format_smolstr!("{}{}", left, right))
}

fn contains(left: &Value, right: &Value) -> Result<bool, EvalError> {
    match left {
        Value::Null => Ok(false),
        Value::String(s) => match right {
            Value::Null => Ok(false),
            Value::Char(c) => Ok(s.contains(*c)),
            other => Ok(s.contains(other.to_string().as_str())),
        },
        Value::List(items) => Ok(items.read().iter().any(|item| item.loose_eq(right))),
        Value::Map(map) => Ok(MapKey::from_value(right).is_some_and(|key| map.read().contains_key(&key))),
        _ => Err(mismatch(Operator::Contains, left, right)),
    }
}

fn full_match(pattern: &str, text: &str) -> Result<bool, EvalError> {
    let mut cache = REGEX_CACHE.lock();
    if let Some(regex) = cache.get(pattern) {
        return Ok(regex.is_match(text));
    }

    let regex = Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|err| EvalError::InvalidRegex(pattern.into(), err.to_string()))?;
    let matched = regex.is_match(text);
    if cache.len() >= REGEX_CACHE_LIMIT {
        cache.clear();
    }
    cache.insert(pattern.into(), regex);
    Ok(matched)
}

/// American Soundex code: the first letter followed by three digits.
pub(crate) fn soundex(s: &str) -> Option<SmolStr> {
    fn digit(c: char) -> Option<char> {
        Some(match c.to_ascii_lowercase() {
            'b' | 'f' | 'p' | 'v' => '1',
            'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => '2',
            'd' | 't' => '3',
            'l' => '4',
            'm' | 'n' => '5',
            'r' => '6',
            _ => return None,
        })
    }

    let mut letters = s.chars().filter(char::is_ascii_alphabetic);
    let first = letters.next()?;
    let mut code = String::with_capacity(4);
    code.push(first.to_ascii_uppercase());

    let mut last = digit(first);
    for c in letters {
        let d = digit(c);
        if let Some(d) = d
            && last != Some(d)
        {
            code.push(d);
            if code.len() == 4 {
                break;
            }
        }
        // h and w do not separate letters with the same code
        if !matches!(c.to_ascii_lowercase(), 'h' | 'w') {
            last = d;
        }
    }
    while code.len() < 4 {
        code.push('0');
    }
    Some(code.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{BuiltinType, TypeRef};
    use rstest::rstest;

    fn eval(op: Operator, left: Value, right: Value) -> Result<Value, EvalError> {
        binary(op, &left, &right, &DecimalContext::default())
    }

    #[rstest]
    #[case::int_add(Operator::Add, Value::from(2), Value::from(3), Value::from(5))]
    #[case::promote_long(Operator::Add, Value::from(2), Value::from(3i64), Value::from(5i64))]
    #[case::promote_double(Operator::Mul, Value::from(2), Value::from(1.5), Value::from(3.0))]
    #[case::concat(Operator::Add, Value::from("a"), Value::from(1), Value::from("a1"))]
    #[case::concat_null(Operator::Add, Value::Null, Value::from("x"), Value::from("nullx"))]
    #[case::append(Operator::StrAppend, Value::from(1), Value::from(2), Value::from("12"))]
    #[case::int_div(Operator::Div, Value::from(7), Value::from(2), Value::from(3))]
    #[case::rem(Operator::Rem, Value::from(7), Value::from(4), Value::from(3))]
    #[case::pow(Operator::Pow, Value::from(2), Value::from(10), Value::from(1024))]
    #[case::char_math(Operator::Add, Value::Char('a'), Value::from(1), Value::from(98))]
    #[case::eq_cross_kind(Operator::Eq, Value::from(1), Value::from(1.0), Value::from(true))]
    #[case::ne_null(Operator::Ne, Value::Null, Value::from(1), Value::from(true))]
    #[case::lt(Operator::Lt, Value::from(1), Value::from(2i64), Value::from(true))]
    #[case::string_ge(Operator::Ge, Value::from("b"), Value::from("a"), Value::from(true))]
    #[case::bool_and(Operator::BitAnd, Value::from(true), Value::from(false), Value::from(false))]
    #[case::bit_or(Operator::BitOr, Value::from(5), Value::from(2), Value::from(7))]
    #[case::shl(Operator::Shl, Value::from(1), Value::from(4), Value::from(16))]
    #[case::ushr(Operator::UShr, Value::from(-1), Value::from(28), Value::from(15))]
    #[case::string_contains(Operator::Contains, Value::from("hello"), Value::from("ell"), Value::from(true))]
    #[case::list_contains(Operator::Contains, Value::list([Value::from(1), Value::from(2)]), Value::from(2i64), Value::from(true))]
    #[case::map_contains(Operator::Contains, Value::map([(MapKey::from("k"), Value::Null)]), Value::from("k"), Value::from(true))]
    #[case::null_contains(Operator::Contains, Value::Null, Value::from("k"), Value::from(false))]
    #[case::soundslike(Operator::SoundsLike, Value::from("Robert"), Value::from("Rupert"), Value::from(true))]
    #[case::not_soundslike(Operator::SoundsLike, Value::from("Robert"), Value::from("Rubin"), Value::from(false))]
    #[case::similarity(Operator::Similarity, Value::from("abc"), Value::from("abc"), Value::from(1.0))]
    #[case::regex(Operator::Regex, Value::from("abc123"), Value::from("[a-z]+\\d+"), Value::from(true))]
    #[case::regex_is_full_match(Operator::Regex, Value::from("abc123x"), Value::from("[a-z]+\\d+"), Value::from(false))]
    #[case::instanceof(Operator::InstanceOf, Value::from("s"), Value::Type(TypeRef::Builtin(BuiltinType::String)), Value::from(true))]
    #[case::convertible(Operator::ConvertibleTo, Value::from("12"), Value::Type(TypeRef::Builtin(BuiltinType::Integer)), Value::from(true))]
    #[case::not_convertible(Operator::ConvertibleTo, Value::from("x"), Value::Type(TypeRef::Builtin(BuiltinType::Integer)), Value::from(false))]
    fn test_binary(#[case] op: Operator, #[case] left: Value, #[case] right: Value, #[case] expected: Value) {
        assert_eq!(eval(op, left, right), Ok(expected));
    }

    #[rstest]
    #[case::string_times(Operator::Mul, Value::from("a"), Value::from(2))]
    #[case::bool_minus(Operator::Sub, Value::from(true), Value::from(1))]
    #[case::unordered(Operator::Lt, Value::from("a"), Value::from(1))]
    #[case::fraction_shift(Operator::Shl, Value::from(1.5), Value::from(1))]
    #[case::instanceof_non_type(Operator::InstanceOf, Value::from(1), Value::from("Integer"))]
    #[case::number_contains(Operator::Contains, Value::from(5), Value::from(5))]
    fn test_type_mismatch(#[case] op: Operator, #[case] left: Value, #[case] right: Value) {
        let err = eval(op, left.clone(), right.clone()).unwrap_err();
        assert_eq!(
            err,
            EvalError::TypeMismatch {
                op: op.symbol().into(),
                left: left.type_name(),
                right: right.type_name(),
            }
        );
    }

    #[rstest]
    #[case(Value::from(1), Value::from(0))]
    #[case(Value::from(1i64), Value::from(0))]
    fn test_division_by_zero(#[case] left: Value, #[case] right: Value) {
        assert_eq!(eval(Operator::Div, left, right), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_decimal_division_rounds_to_scale() {
        let context = DecimalContext {
            scale: 2,
            ..Default::default()
        };
        let one = Value::Number(Number::from_literal("1B").unwrap());
        let result = binary(Operator::Div, &one, &Value::from(3), &context).unwrap();
        assert_eq!(result.to_string(), "0.33");
    }

    #[test]
    fn test_invalid_regex() {
        assert!(matches!(
            eval(Operator::Regex, Value::from("a"), Value::from("(")),
            Err(EvalError::InvalidRegex(..))
        ));
    }

    #[rstest]
    #[case(UnaryOp::Not, Value::from(true), Ok(Value::from(false)))]
    #[case(UnaryOp::Not, Value::Null, Ok(Value::from(true)))]
    #[case(UnaryOp::Neg, Value::from(2.5), Ok(Value::from(-2.5)))]
    #[case(UnaryOp::BitNot, Value::from(0), Ok(Value::from(-1)))]
    #[case(UnaryOp::Not, Value::from(1), Err(EvalError::UnaryTypeMismatch { op: "!".into(), operand: "int".into() }))]
    fn test_unary(#[case] op: UnaryOp, #[case] operand: Value, #[case] expected: Result<Value, EvalError>) {
        assert_eq!(unary(op, &operand), expected);
    }

    #[rstest]
    #[case(Value::from(true), Ok(true))]
    #[case(Value::Null, Ok(false))]
    #[case(Value::from("true"), Err(EvalError::NonBooleanCondition("string".into())))]
    fn test_truthy(#[case] value: Value, #[case] expected: Result<bool, EvalError>) {
        assert_eq!(truthy(&value), expected);
    }

    #[rstest]
    #[case("Robert", "R163")]
    #[case("Rupert", "R163")]
    #[case("Ashcraft", "A261")]
    #[case("Tymczak", "T522")]
    #[case("Lee", "L000")]
    fn test_soundex(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(soundex(input).as_deref(), Some(expected));
    }
}
