use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::blame::Blame;
use crate::error::{Error, Result};

/// Runtime number. Integer and decimal representations are kept apart so the
/// arithmetic engine can decide promotion rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Number {
    Int(i64),
    Decimal(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Decimal(v) => v,
        }
    }

    pub fn as_int(self) -> Option<i64> {
        match self {
            Number::Int(v) => Some(v),
            Number::Decimal(v) if v.fract() == 0.0 && v.is_finite() => Some(v as i64),
            Number::Decimal(_) => None,
        }
    }

    /// The canonical "computer language" rendering: no grouping, minimal
    /// decimals, `INF`/`NaN` for the non-finite decimals.
    pub fn to_c_format(self) -> String {
        match self {
            Number::Int(v) => v.to_string(),
            Number::Decimal(v) if v.is_nan() => "NaN".to_string(),
            Number::Decimal(v) if v.is_infinite() => {
                if v > 0.0 { "INF" } else { "-INF" }.to_string()
            }
            Number::Decimal(v) => v.to_string(),
        }
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(v) => write!(f, "{}", v),
            Number::Decimal(v) => write!(f, "{}", v),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (a, b) => a.as_f64().total_cmp(&b.as_f64()) == Ordering::Equal,
        }
    }
}

impl Eq for Number {}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.as_int() {
            Some(v) => v.hash(state),
            None => self.as_f64().to_bits().hash(state),
        }
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::Int(v)
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::Decimal(v)
    }
}

/// Arithmetic operator id, fixed at AST construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
        }
    }
}

/// Pluggable numeric operation provider. The engine decides integer versus
/// decimal semantics for the whole evaluation; string-to-number parsing goes
/// through it as well.
pub trait ArithmeticEngine: Send + Sync + std::fmt::Debug {
    fn apply(&self, op: ArithOp, lhs: Number, rhs: Number) -> Result<Number>;
    fn compare(&self, lhs: Number, rhs: Number) -> Ordering;
    fn parse(&self, text: &str) -> Result<Number>;
}

fn division_by_zero(op: ArithOp, lhs: Number, rhs: Number) -> Error {
    Error::Arithmetic(
        Blame::new("Division by zero: ")
            .part(format!("{} {} {}", lhs, op.symbol(), rhs)),
    )
}

fn parse_error(text: &str) -> Error {
    Error::NumberParse {
        text: text.to_string(),
        blame: Blame::new("The string can't be parsed as a number."),
    }
}

/// Integer-preserving engine: operations on two integers stay integer where
/// the result is exact, and only promote to decimal otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntegerEngine;

impl ArithmeticEngine for IntegerEngine {
    fn apply(&self, op: ArithOp, lhs: Number, rhs: Number) -> Result<Number> {
        if let (Number::Int(a), Number::Int(b)) = (lhs, rhs) {
            return match op {
                ArithOp::Add => Ok(int_or_promote(a.checked_add(b), a as f64 + b as f64)),
                ArithOp::Sub => Ok(int_or_promote(a.checked_sub(b), a as f64 - b as f64)),
                ArithOp::Mul => Ok(int_or_promote(a.checked_mul(b), a as f64 * b as f64)),
                ArithOp::Div => {
                    if b == 0 {
                        Err(division_by_zero(op, lhs, rhs))
                    } else if a % b == 0 {
                        Ok(Number::Int(a / b))
                    } else {
                        Ok(Number::Decimal(a as f64 / b as f64))
                    }
                }
                ArithOp::Rem => {
                    if b == 0 {
                        Err(division_by_zero(op, lhs, rhs))
                    } else {
                        Ok(Number::Int(a % b))
                    }
                }
            };
        }
        DecimalEngine.apply(op, lhs, rhs)
    }

    fn compare(&self, lhs: Number, rhs: Number) -> Ordering {
        match (lhs, rhs) {
            (Number::Int(a), Number::Int(b)) => a.cmp(&b),
            (a, b) => a.as_f64().total_cmp(&b.as_f64()),
        }
    }

    fn parse(&self, text: &str) -> Result<Number> {
        let text = text.trim();
        if let Ok(v) = text.parse::<i64>() {
            return Ok(Number::Int(v));
        }
        text.parse::<f64>()
            .map(Number::Decimal)
            .map_err(|_| parse_error(text))
    }
}

fn int_or_promote(exact: Option<i64>, approx: f64) -> Number {
    match exact {
        Some(v) => Number::Int(v),
        None => Number::Decimal(approx),
    }
}

/// All-decimal engine: every operation is carried out in floating point.
#[derive(Debug, Default, Clone, Copy)]
pub struct DecimalEngine;

impl ArithmeticEngine for DecimalEngine {
    fn apply(&self, op: ArithOp, lhs: Number, rhs: Number) -> Result<Number> {
        let (a, b) = (lhs.as_f64(), rhs.as_f64());
        let result = match op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => {
                if b == 0.0 {
                    return Err(division_by_zero(op, lhs, rhs));
                }
                a / b
            }
            ArithOp::Rem => {
                if b == 0.0 {
                    return Err(division_by_zero(op, lhs, rhs));
                }
                a % b
            }
        };
        Ok(Number::Decimal(result))
    }

    fn compare(&self, lhs: Number, rhs: Number) -> Ordering {
        lhs.as_f64().total_cmp(&rhs.as_f64())
    }

    fn parse(&self, text: &str) -> Result<Number> {
        text.trim()
            .parse::<f64>()
            .map(Number::Decimal)
            .map_err(|_| parse_error(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_engine_preserves_integers() {
        let engine = IntegerEngine;
        assert_eq!(
            engine.apply(ArithOp::Add, 2.into(), 3.into()).unwrap(),
            Number::Int(5)
        );
        assert_eq!(
            engine.apply(ArithOp::Div, 6.into(), 3.into()).unwrap(),
            Number::Int(2)
        );
        assert_eq!(
            engine.apply(ArithOp::Div, 5.into(), 2.into()).unwrap(),
            Number::Decimal(2.5)
        );
    }

    #[test]
    fn division_by_zero_is_an_arithmetic_error() {
        let err = IntegerEngine
            .apply(ArithOp::Div, 5.into(), 0.into())
            .unwrap_err();
        assert!(matches!(err, Error::Arithmetic(_)));
        assert!(err.to_string().contains("5 / 0"));
    }

    #[test]
    fn parse_goes_through_the_engine() {
        assert_eq!(IntegerEngine.parse(" 42 ").unwrap(), Number::Int(42));
        assert_eq!(IntegerEngine.parse("2.5").unwrap(), Number::Decimal(2.5));
        assert!(matches!(
            IntegerEngine.parse("twelve").unwrap_err(),
            Error::NumberParse { .. }
        ));
        assert_eq!(DecimalEngine.parse("42").unwrap(), Number::Decimal(42.0));
    }

    #[test]
    fn overflow_promotes_to_decimal() {
        let engine = IntegerEngine;
        let result = engine
            .apply(ArithOp::Mul, i64::MAX.into(), 2.into())
            .unwrap();
        assert!(matches!(result, Number::Decimal(_)));
    }
}
