//! Number and date-like formatting, plus the shared formatter cache.
//!
//! Formatter objects are effectively immutable and shared between concurrent
//! evaluations through [`TwoTierCache`]; see that module for the consistency
//! guarantees.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::blame::Blame;
use crate::cache::TwoTierCache;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::value::{DateKind, Number, ValueDate};

/// Default rendering of a number for template output: integers without
/// decimals, decimals minimally.
pub fn format_number(n: Number) -> String {
    n.to_string()
}

/// Format a date-like value with the configured pattern for its sub-kind.
/// The `Unknown` sub-kind cannot be formatted until the template says which
/// kind it means.
pub fn format_date(date: &ValueDate, cfg: &EngineConfig) -> Result<String> {
    let pattern = match date.kind {
        DateKind::Date => &cfg.date_format,
        DateKind::Time => &cfg.time_format,
        DateKind::DateTime => &cfg.datetime_format,
        DateKind::Unknown => return Err(unknown_date_kind()),
    };
    Ok(date_formatter(pattern).format(date))
}

/// Format a date-like value with an explicit pattern (the `string(fmt)`
/// built-in path).
pub fn format_date_with(date: &ValueDate, pattern: &str) -> Result<String> {
    if date.kind == DateKind::Unknown {
        return Err(unknown_date_kind());
    }
    Ok(date_formatter(pattern).format(date))
}

fn unknown_date_kind() -> Error {
    Error::TypeMismatch {
        expected: "date, time or date-time".to_string(),
        actual: DateKind::Unknown.description().to_string(),
        blame: Blame::new(
            "The value is date-like, but it isn't known if it's a date, a time, \
             or a date-time.",
        )
        .tip("Use the date, time or datetime built-in to tell the engine which one it is."),
    }
}

/// Reusable, immutable date formatter; one per pattern, shared via the cache.
#[derive(Debug)]
pub struct DateFormatter {
    pattern: String,
}

impl DateFormatter {
    fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
        }
    }

    pub fn format(&self, date: &ValueDate) -> String {
        date.stamp.format(&self.pattern).to_string()
    }
}

static DATE_FORMATTERS: Lazy<TwoTierCache<String, Arc<DateFormatter>>> =
    Lazy::new(|| TwoTierCache::new(64));

fn date_formatter(pattern: &str) -> Arc<DateFormatter> {
    DATE_FORMATTERS.get_or_insert_with(&pattern.to_string(), || Arc::new(DateFormatter::new(pattern)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> ValueDate {
        let stamp = NaiveDate::from_ymd_opt(2020, 5, 17)
            .unwrap()
            .and_hms_opt(13, 45, 30)
            .unwrap();
        ValueDate::new(DateKind::DateTime, stamp)
    }

    #[test]
    fn formats_by_sub_kind() {
        let cfg = EngineConfig::default();
        let mut date = sample();
        assert_eq!(format_date(&date, &cfg).unwrap(), "2020-05-17 13:45:30");
        date.kind = DateKind::Date;
        assert_eq!(format_date(&date, &cfg).unwrap(), "2020-05-17");
        date.kind = DateKind::Time;
        assert_eq!(format_date(&date, &cfg).unwrap(), "13:45:30");
    }

    #[test]
    fn unknown_sub_kind_is_an_error_with_a_tip() {
        let cfg = EngineConfig::default();
        let mut date = sample();
        date.kind = DateKind::Unknown;
        let err = format_date(&date, &cfg).unwrap_err();
        assert!(err.to_string().contains("isn't known"));
    }

    #[test]
    fn explicit_pattern_formatting() {
        assert_eq!(format_date_with(&sample(), "%d/%m/%Y").unwrap(), "17/05/2020");
    }

    #[test]
    fn formatter_cache_reuses_instances() {
        let a = date_formatter("%Y");
        let b = date_formatter("%Y");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
