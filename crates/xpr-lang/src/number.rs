use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Numeric tower. Binary operations promote both operands to the wider kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(from = "NumberRepr", into = "NumberRepr")]
pub enum Number {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
}

/// Promotion order, narrowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NumberKind {
    Int,
    Long,
    Float,
    Double,
    Decimal,
}

impl NumberKind {
    pub fn is_integral(self) -> bool {
        matches!(self, NumberKind::Int | NumberKind::Long)
    }

    pub fn name(self) -> &'static str {
        match self {
            NumberKind::Int => "int",
            NumberKind::Long => "long",
            NumberKind::Float => "float",
            NumberKind::Double => "double",
            NumberKind::Decimal => "decimal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("numeric overflow")]
    Overflow,
}

/// Rounding applied to decimal division results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundingMode {
    #[default]
    HalfEven,
    HalfUp,
    HalfDown,
    Up,
    Down,
    Ceiling,
    Floor,
}

impl From<RoundingMode> for RoundingStrategy {
    fn from(mode: RoundingMode) -> Self {
        match mode {
            RoundingMode::HalfEven => RoundingStrategy::MidpointNearestEven,
            RoundingMode::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            RoundingMode::HalfDown => RoundingStrategy::MidpointTowardZero,
            RoundingMode::Up => RoundingStrategy::AwayFromZero,
            RoundingMode::Down => RoundingStrategy::ToZero,
            RoundingMode::Ceiling => RoundingStrategy::ToPositiveInfinity,
            RoundingMode::Floor => RoundingStrategy::ToNegativeInfinity,
        }
    }
}

/// Scale and rounding used when dividing decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecimalContext {
    pub scale: u32,
    pub rounding: RoundingMode,
}

impl Default for DecimalContext {
    fn default() -> Self {
        Self {
            scale: 20,
            rounding: RoundingMode::HalfEven,
        }
    }
}

/// Both operands promoted to a common kind.
enum Pair {
    Int(i32, i32),
    Long(i64, i64),
    Float(f32, f32),
    Double(f64, f64),
    Decimal(Decimal, Decimal),
}

impl Pair {
    fn of(a: Number, b: Number) -> Self {
        match a.kind().max(b.kind()) {
            NumberKind::Int => Pair::Int(a.as_i32(), b.as_i32()),
            NumberKind::Long => Pair::Long(a.as_i64(), b.as_i64()),
            NumberKind::Float => Pair::Float(a.to_f64() as f32, b.to_f64() as f32),
            NumberKind::Double => Pair::Double(a.to_f64(), b.to_f64()),
            NumberKind::Decimal => match (a.to_decimal(), b.to_decimal()) {
                (Some(x), Some(y)) => Pair::Decimal(x, y),
                // NaN and infinities have no decimal form
                _ => Pair::Double(a.to_f64(), b.to_f64()),
            },
        }
    }
}

/// Int results that leave the `i32` range become Long.
fn widen_int(v: i64) -> Number {
    i32::try_from(v).map_or(Number::Long(v), Number::Int)
}

/// Long results that leave the `i64` range become Decimal, or Double past
/// the decimal mantissa.
fn widen_long(v: i128) -> Number {
    match i64::try_from(v) {
        Ok(v) => Number::Long(v),
        Err(_) => Decimal::from_i128(v).map_or(Number::Double(v as f64), Number::Decimal),
    }
}

impl Number {
    pub fn kind(&self) -> NumberKind {
        match self {
            Number::Int(_) => NumberKind::Int,
            Number::Long(_) => NumberKind::Long,
            Number::Float(_) => NumberKind::Float,
            Number::Double(_) => NumberKind::Double,
            Number::Decimal(_) => NumberKind::Decimal,
        }
    }

    pub fn is_integral(&self) -> bool {
        self.kind().is_integral()
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Number::Int(v) => *v == 0,
            Number::Long(v) => *v == 0,
            Number::Float(v) => *v == 0.0,
            Number::Double(v) => *v == 0.0,
            Number::Decimal(v) => v.is_zero(),
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Number::Int(v) => *v as f64,
            Number::Long(v) => *v as f64,
            Number::Float(v) => *v as f64,
            Number::Double(v) => *v,
            Number::Decimal(v) => v.to_f64().unwrap_or(f64::NAN),
        }
    }

    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            Number::Int(v) => Some(Decimal::from(*v)),
            Number::Long(v) => Some(Decimal::from(*v)),
            Number::Float(v) => Decimal::from_f32(*v),
            Number::Double(v) => Decimal::from_f64(*v),
            Number::Decimal(v) => Some(*v),
        }
    }

    /// The exact integral value, if this number has one.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Number::Int(v) => Some(*v as i64),
            Number::Long(v) => Some(*v),
            Number::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            Number::Double(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            Number::Decimal(v) if v.fract().is_zero() => v.to_i64(),
            _ => None,
        }
    }

    fn as_i32(&self) -> i32 {
        match self {
            Number::Int(v) => *v,
            other => other.as_i64() as i32,
        }
    }

    fn as_i64(&self) -> i64 {
        match self {
            Number::Int(v) => *v as i64,
            Number::Long(v) => *v,
            Number::Float(v) => *v as i64,
            Number::Double(v) => *v as i64,
            Number::Decimal(v) => v.trunc().to_i64().unwrap_or(0),
        }
    }

    /// Converts to `kind`, truncating when narrowing. `None` only when a
    /// non-finite float is asked to become a decimal.
    pub fn cast(&self, kind: NumberKind) -> Option<Number> {
        Some(match kind {
            NumberKind::Int => Number::Int(self.as_i32()),
            NumberKind::Long => Number::Long(self.as_i64()),
            NumberKind::Float => Number::Float(self.to_f64() as f32),
            NumberKind::Double => Number::Double(self.to_f64()),
            NumberKind::Decimal => Number::Decimal(self.to_decimal()?),
        })
    }

    pub fn add(self, other: Number) -> Number {
        match Pair::of(self, other) {
            Pair::Int(a, b) => widen_int(a as i64 + b as i64),
            Pair::Long(a, b) => widen_long(a as i128 + b as i128),
            Pair::Float(a, b) => Number::Float(a + b),
            Pair::Double(a, b) => Number::Double(a + b),
            Pair::Decimal(a, b) => a
                .checked_add(b)
                .map(Number::Decimal)
                .unwrap_or_else(|| Number::Double(a.to_f64().unwrap_or(f64::NAN) + b.to_f64().unwrap_or(f64::NAN))),
        }
    }

    pub fn sub(self, other: Number) -> Number {
        match Pair::of(self, other) {
            Pair::Int(a, b) => widen_int(a as i64 - b as i64),
            Pair::Long(a, b) => widen_long(a as i128 - b as i128),
            Pair::Float(a, b) => Number::Float(a - b),
            Pair::Double(a, b) => Number::Double(a - b),
            Pair::Decimal(a, b) => a
                .checked_sub(b)
                .map(Number::Decimal)
                .unwrap_or_else(|| Number::Double(a.to_f64().unwrap_or(f64::NAN) - b.to_f64().unwrap_or(f64::NAN))),
        }
    }

    pub fn mul(self, other: Number) -> Number {
        match Pair::of(self, other) {
            Pair::Int(a, b) => widen_int(a as i64 * b as i64),
            Pair::Long(a, b) => widen_long(a as i128 * b as i128),
            Pair::Float(a, b) => Number::Float(a * b),
            Pair::Double(a, b) => Number::Double(a * b),
            Pair::Decimal(a, b) => a
                .checked_mul(b)
                .map(Number::Decimal)
                .unwrap_or_else(|| Number::Double(a.to_f64().unwrap_or(f64::NAN) * b.to_f64().unwrap_or(f64::NAN))),
        }
    }

    /// Integral kinds divide with truncation; decimals are rounded to the
    /// context scale.
    pub fn div(self, other: Number, context: &DecimalContext) -> Result<Number, ArithmeticError> {
        match Pair::of(self, other) {
            Pair::Int(_, 0) | Pair::Long(_, 0) => Err(ArithmeticError::DivisionByZero),
            Pair::Int(a, b) => Ok(widen_int(a as i64 / b as i64)),
            Pair::Long(a, b) => Ok(widen_long(a as i128 / b as i128)),
            Pair::Float(a, b) => Ok(Number::Float(a / b)),
            Pair::Double(a, b) => Ok(Number::Double(a / b)),
            Pair::Decimal(a, b) => {
                if b.is_zero() {
                    return Err(ArithmeticError::DivisionByZero);
                }
                a.checked_div(b)
                    .map(|q| Number::Decimal(q.round_dp_with_strategy(context.scale, context.rounding.into())))
                    .ok_or(ArithmeticError::Overflow)
            }
        }
    }

    pub fn rem(self, other: Number) -> Result<Number, ArithmeticError> {
        match Pair::of(self, other) {
            Pair::Int(_, 0) | Pair::Long(_, 0) => Err(ArithmeticError::DivisionByZero),
            Pair::Int(a, b) => Ok(Number::Int(a.wrapping_rem(b))),
            Pair::Long(a, b) => Ok(Number::Long(a.wrapping_rem(b))),
            Pair::Float(a, b) => Ok(Number::Float(a % b)),
            Pair::Double(a, b) => Ok(Number::Double(a % b)),
            Pair::Decimal(a, b) => a.checked_rem(b).map(Number::Decimal).ok_or(ArithmeticError::DivisionByZero),
        }
    }

    /// Integral powers stay integral while they fit; everything else is
    /// computed in floating point.
    pub fn pow(self, other: Number) -> Number {
        match Pair::of(self, other) {
            Pair::Int(a, b) if b >= 0 => match (a as i64).checked_pow(b as u32) {
                Some(v) => i32::try_from(v).map(Number::Int).unwrap_or(Number::Long(v)),
                None => Number::Double((a as f64).powf(b as f64)),
            },
            Pair::Long(a, b) if (0..=u32::MAX as i64).contains(&b) => match a.checked_pow(b as u32) {
                Some(v) => Number::Long(v),
                None => Number::Double((a as f64).powf(b as f64)),
            },
            Pair::Int(a, b) => Number::Double((a as f64).powf(b as f64)),
            Pair::Long(a, b) => Number::Double((a as f64).powf(b as f64)),
            Pair::Float(a, b) => Number::Float(a.powf(b)),
            Pair::Double(a, b) => Number::Double(a.powf(b)),
            Pair::Decimal(a, b) => {
                let v = a.to_f64().unwrap_or(f64::NAN).powf(b.to_f64().unwrap_or(f64::NAN));
                Decimal::from_f64(v).map(Number::Decimal).unwrap_or(Number::Double(v))
            }
        }
    }

    pub fn neg(self) -> Number {
        match self {
            Number::Int(v) => widen_int(-(v as i64)),
            Number::Long(v) => widen_long(-(v as i128)),
            Number::Float(v) => Number::Float(-v),
            Number::Double(v) => Number::Double(-v),
            Number::Decimal(v) => Number::Decimal(-v),
        }
    }

    /// Bitwise operations are defined for integral kinds only.
    pub fn bitwise(self, other: Number, op: BitOp) -> Option<Number> {
        if !self.is_integral() || !other.is_integral() {
            return None;
        }
        Some(match Pair::of(self, other) {
            Pair::Int(a, b) => Number::Int(match op {
                BitOp::And => a & b,
                BitOp::Or => a | b,
                BitOp::Xor => a ^ b,
                BitOp::Shl => a.wrapping_shl(b as u32),
                BitOp::Shr => a.wrapping_shr(b as u32),
                BitOp::UShr => (a as u32).wrapping_shr(b as u32) as i32,
            }),
            Pair::Long(a, b) => Number::Long(match op {
                BitOp::And => a & b,
                BitOp::Or => a | b,
                BitOp::Xor => a ^ b,
                BitOp::Shl => a.wrapping_shl(b as u32),
                BitOp::Shr => a.wrapping_shr(b as u32),
                BitOp::UShr => (a as u64).wrapping_shr(b as u32) as i64,
            }),
            _ => return None,
        })
    }

    pub fn bit_not(self) -> Option<Number> {
        match self {
            Number::Int(v) => Some(Number::Int(!v)),
            Number::Long(v) => Some(Number::Long(!v)),
            _ => None,
        }
    }

    pub fn compare(&self, other: &Number) -> Option<Ordering> {
        match Pair::of(*self, *other) {
            Pair::Int(a, b) => Some(a.cmp(&b)),
            Pair::Long(a, b) => Some(a.cmp(&b)),
            Pair::Float(a, b) => a.partial_cmp(&b),
            Pair::Double(a, b) => a.partial_cmp(&b),
            Pair::Decimal(a, b) => Some(a.cmp(&b)),
        }
    }

    /// Parses a numeric literal, classifying it by suffix and digit count.
    ///
    /// Hexadecimal literals become `Int`, or `Long` past eight digits. Suffixes
    /// `L`, `F`, `D`, `B` and `I` force long, float, double and decimal. Plain
    /// fractional literals with at most 15 digits are doubles, integral ones
    /// with at most 9 digits ints and at most 18 longs; anything longer is a
    /// decimal.
    pub fn from_literal(text: &str) -> Option<Number> {
        if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            let (digits, long) = match hex.strip_suffix(['l', 'L']) {
                Some(digits) => (digits, true),
                None => (hex, false),
            };
            let value = u64::from_str_radix(digits, 16).ok()?;
            return Some(if long || digits.len() > 8 {
                Number::Long(value as i64)
            } else {
                Number::Int(value as u32 as i32)
            });
        }

        let (body, suffix) = match text.chars().last() {
            Some(c) if c.is_ascii_alphabetic() && !matches!(c, 'e' | 'E') => (&text[..text.len() - 1], Some(c)),
            _ => (text, None),
        };
        let fractional = body.contains(['.', 'e', 'E']);
        let digits = body.chars().filter(char::is_ascii_digit).count();

        match suffix {
            Some('l' | 'L') if !fractional => body.parse().ok().map(Number::Long),
            Some('f' | 'F') => body.parse().ok().map(Number::Float),
            Some('d' | 'D') => body.parse().ok().map(Number::Double),
            Some('b' | 'B' | 'i' | 'I') => parse_decimal(body).map(Number::Decimal),
            Some(_) => None,
            None if fractional && digits <= 15 => body.parse().ok().map(Number::Double),
            None if fractional => parse_decimal(body).map(Number::Decimal),
            None if digits <= 9 => body.parse().ok().map(Number::Int),
            None if digits <= 18 => body.parse().ok().map(Number::Long),
            None => parse_decimal(body).map(Number::Decimal),
        }
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text).ok().or_else(|| Decimal::from_scientific(text).ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    And,
    Or,
    Xor,
    Shl,
    Shr,
    UShr,
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other)
    }
}

impl Default for Number {
    fn default() -> Self {
        Number::Int(0)
    }
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Number::Int(value)
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number::Long(value)
    }
}

impl From<usize> for Number {
    fn from(value: usize) -> Self {
        i32::try_from(value)
            .map(Number::Int)
            .unwrap_or(Number::Long(value as i64))
    }
}

impl From<f32> for Number {
    fn from(value: f32) -> Self {
        Number::Float(value)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::Double(value)
    }
}

impl From<Decimal> for Number {
    fn from(value: Decimal) -> Self {
        Number::Decimal(value)
    }
}

fn fmt_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
        write!(f, "{:.1}", v)
    } else {
        write!(f, "{}", v)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(v) => write!(f, "{}", v),
            Number::Long(v) => write!(f, "{}", v),
            Number::Float(v) => fmt_float(f, *v as f64),
            Number::Double(v) => fmt_float(f, *v),
            Number::Decimal(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Serialize, Deserialize)]
enum NumberRepr {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Decimal([u8; 16]),
}

impl From<Number> for NumberRepr {
    fn from(number: Number) -> Self {
        match number {
            Number::Int(v) => NumberRepr::Int(v),
            Number::Long(v) => NumberRepr::Long(v),
            Number::Float(v) => NumberRepr::Float(v),
            Number::Double(v) => NumberRepr::Double(v),
            Number::Decimal(v) => NumberRepr::Decimal(v.serialize()),
        }
    }
}

impl From<NumberRepr> for Number {
    fn from(repr: NumberRepr) -> Self {
        match repr {
            NumberRepr::Int(v) => Number::Int(v),
            NumberRepr::Long(v) => Number::Long(v),
            NumberRepr::Float(v) => Number::Float(v),
            NumberRepr::Double(v) => Number::Double(v),
            NumberRepr::Decimal(bytes) => Number::Decimal(Decimal::deserialize(bytes)),
        }
    }
}
