//! Comparison semantics.
//!
//! Numbers compare through the configured arithmetic engine, strings
//! bytewise, booleans and markup only for equality, date-likes only within
//! the same determinate sub-kind. Everything else has no defined ordering or
//! equality and is a type mismatch naming both sides.

use std::cmp::Ordering;

use quill_core::ast::CmpOp;
use quill_core::blame::Blame;
use quill_core::config::EngineConfig;
use quill_core::error::{Error, Result};
use quill_core::value::DateKind;
use quill_core::Value;

pub fn compare(cfg: &EngineConfig, op: CmpOp, lhs: &Value, rhs: &Value) -> Result<bool> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => {
            Ok(ordering_matches(op, cfg.arithmetic.compare(*a, *b)))
        }
        (Value::String(a), Value::String(b)) => Ok(ordering_matches(op, a.as_ref().cmp(b))),
        (Value::Bool(a), Value::Bool(b)) => match op {
            CmpOp::Eq => Ok(a == b),
            CmpOp::Ne => Ok(a != b),
            _ => Err(Error::TypeMismatch {
                expected: "values with a defined ordering".to_string(),
                actual: "booleans".to_string(),
                blame: Blame::new("Booleans can only be compared with == and !=."),
            }),
        },
        (Value::Date(a), Value::Date(b)) => {
            if a.kind == DateKind::Unknown || b.kind == DateKind::Unknown {
                return Err(unknown_date_comparison());
            }
            if a.kind != b.kind {
                return Err(Error::TypeMismatch {
                    expected: format!("two values of the same date-like kind ({})", a.kind.description()),
                    actual: b.kind.description().to_string(),
                    blame: Blame::new("Date-like values of different kinds can't be compared."),
                });
            }
            Ok(ordering_matches(op, a.stamp.cmp(&b.stamp)))
        }
        (Value::Markup(a), Value::Markup(b)) => match op {
            CmpOp::Eq => Ok(a == b),
            CmpOp::Ne => Ok(a != b),
            _ => Err(Error::TypeMismatch {
                expected: "values with a defined ordering".to_string(),
                actual: "markup outputs".to_string(),
                blame: Blame::new("Markup outputs can only be compared with == and !=."),
            }),
        },
        // No silent cross-kind coercion: a number never compares against a
        // string, even a numeric-looking one.
        (lhs, rhs) => Err(Error::TypeMismatch {
            expected: "two comparable values (numbers, strings, booleans or date-likes)"
                .to_string(),
            actual: format!(
                "{} and {}",
                lhs.type_description(),
                rhs.type_description()
            ),
            blame: Blame::new("These values can't be compared."),
        }),
    }
}

/// Equality as the `==` operator defines it, reused by the switch forms and
/// `seq_contains`.
pub fn values_equal(cfg: &EngineConfig, lhs: &Value, rhs: &Value) -> Result<bool> {
    compare(cfg, CmpOp::Eq, lhs, rhs)
}

/// Lenient equality: pairs with no defined comparison are simply unequal.
/// `seq_contains` scans mixed sequences with this.
pub fn values_equal_lenient(cfg: &EngineConfig, lhs: &Value, rhs: &Value) -> bool {
    values_equal(cfg, lhs, rhs).unwrap_or(false)
}

fn ordering_matches(op: CmpOp, ordering: Ordering) -> bool {
    match op {
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Lte => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Gte => ordering != Ordering::Less,
    }
}

fn unknown_date_comparison() -> Error {
    Error::TypeMismatch {
        expected: "a date, time or date-time".to_string(),
        actual: DateKind::Unknown.description().to_string(),
        blame: Blame::new(
            "The value is date-like, but it isn't known if it's a date, a time, or a date-time, \
             so it can't be compared.",
        )
        .tip("Use the date, time or datetime built-in to tell the engine which one it is."),
    }
}

/// Compare an element count against a literal using a counting limit.
///
/// Counting stops at `n + 1` elements; for every operator the truncated count
/// compares against `n` exactly like the full count would, so the
/// short-circuit is observably identical to exact counting. This is what
/// makes size checks on right-unbounded ranges terminate.
pub fn compare_count(op: CmpOp, target: &Value, n: i64) -> Option<bool> {
    let limit = usize::try_from(n.saturating_add(1)).unwrap_or(0);
    let count = target.count_up_to(limit)? as i64;
    Some(ordering_matches(op, count.cmp(&n)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::value::{RangeLimit, ValueRange};

    #[test]
    fn numbers_compare_through_the_engine() {
        let cfg = EngineConfig::default();
        assert!(compare(&cfg, CmpOp::Lt, &Value::int(2), &Value::decimal(2.5)).unwrap());
        assert!(compare(&cfg, CmpOp::Eq, &Value::int(2), &Value::decimal(2.0)).unwrap());
    }

    #[test]
    fn numbers_never_compare_against_strings() {
        let cfg = EngineConfig::default();
        let err = compare(&cfg, CmpOp::Gte, &Value::string("10"), &Value::int(9)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        let err = compare(&cfg, CmpOp::Eq, &Value::int(9), &Value::string("9")).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn strings_compare_bytewise() {
        let cfg = EngineConfig::default();
        assert!(compare(&cfg, CmpOp::Lt, &Value::string("Z"), &Value::string("a")).unwrap());
        assert!(compare(&cfg, CmpOp::Eq, &Value::string("a"), &Value::string("a")).unwrap());
    }

    #[test]
    fn booleans_only_support_equality() {
        let cfg = EngineConfig::default();
        assert!(compare(&cfg, CmpOp::Eq, &Value::Bool(true), &Value::Bool(true)).unwrap());
        assert!(compare(&cfg, CmpOp::Lt, &Value::Bool(false), &Value::Bool(true)).is_err());
    }

    #[test]
    fn incomparable_kinds_are_a_type_mismatch() {
        let cfg = EngineConfig::default();
        let err = compare(&cfg, CmpOp::Eq, &Value::int(1), &Value::Bool(true)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn counting_comparison_matches_exact_counting() {
        let bounded = Value::seq(vec![Value::int(1), Value::int(2), Value::int(3)]);
        for (op, n, expected) in [
            (CmpOp::Eq, 3, true),
            (CmpOp::Eq, 2, false),
            (CmpOp::Lt, 4, true),
            (CmpOp::Lte, 3, true),
            (CmpOp::Gt, 2, true),
            (CmpOp::Gt, 3, false),
            (CmpOp::Gte, 4, false),
            (CmpOp::Ne, 3, false),
            (CmpOp::Gt, -1, true),
        ] {
            assert_eq!(compare_count(op, &bounded, n), Some(expected), "{:?} {}", op, n);
        }
    }

    #[test]
    fn counting_comparison_terminates_on_unbounded_ranges() {
        let unbounded = Value::Range(ValueRange::new(0, RangeLimit::Unbounded));
        assert_eq!(compare_count(CmpOp::Gt, &unbounded, 1_000_000), Some(true));
        assert_eq!(compare_count(CmpOp::Eq, &unbounded, 5), Some(false));
        assert_eq!(compare_count(CmpOp::Lte, &unbounded, 5), Some(false));
    }
}
