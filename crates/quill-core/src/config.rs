//! Engine configuration, threaded explicitly through every evaluation.
//!
//! There is deliberately no ambient/global configuration lookup; whoever
//! drives an evaluation passes one of these in. Legacy compatibility quirks
//! are explicit flags here, selected as branches inside one function at the
//! place they matter, never as parallel implementations.

use std::sync::Arc;

use crate::value::{ArithmeticEngine, IntegerEngine};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pluggable numeric semantics (integer-preserving vs all-decimal).
    pub arithmetic: Arc<dyn ArithmeticEngine>,
    /// Strings booleans coerce to.
    pub boolean_true: String,
    pub boolean_false: String,
    /// chrono format strings for the three determinate date-like sub-kinds.
    pub date_format: String,
    pub time_format: String,
    pub datetime_format: String,
    /// Legacy mode: hash literals keep duplicate keys visible in iteration.
    pub legacy_duplicate_hash_keys: bool,
    /// Legacy mode: assigning a missing value stores the empty string instead
    /// of failing.
    pub legacy_missing_assignment_is_empty: bool,
    /// Overrides the per-format auto-escaping default when set.
    pub auto_escaping: Option<bool>,
    /// Allows inserting markup of a foreign output format without conversion.
    pub output_format_mixing: bool,
    /// Host-definable truncation algorithm used by the `truncate` built-in.
    pub truncate_policy: Arc<dyn TruncatePolicy>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            arithmetic: Arc::new(IntegerEngine),
            boolean_true: "true".to_string(),
            boolean_false: "false".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            time_format: "%H:%M:%S".to_string(),
            datetime_format: "%Y-%m-%d %H:%M:%S".to_string(),
            legacy_duplicate_hash_keys: false,
            legacy_missing_assignment_is_empty: false,
            auto_escaping: None,
            output_format_mixing: false,
            truncate_policy: Arc::new(CharBoundaryTruncate),
        }
    }
}

impl EngineConfig {
    /// The effective auto-escaping decision for one output format.
    pub fn auto_escape_for(&self, format: crate::output::OutputFormat) -> bool {
        self.auto_escaping
            .unwrap_or_else(|| format.auto_escaped_by_default())
    }
}

/// Truncation policy hook. Whether truncation prefers word boundaries or
/// plain character boundaries is host-defined; the engine only promises to
/// call whatever policy is configured.
pub trait TruncatePolicy: Send + Sync + std::fmt::Debug {
    /// Truncate `text` so that at most `max_chars` characters of it remain,
    /// appending `terminator` if anything was removed.
    fn truncate(&self, text: &str, max_chars: usize, terminator: &str) -> String;
}

/// Default policy: cut at a character boundary, no word-boundary guessing.
#[derive(Debug, Default, Clone, Copy)]
pub struct CharBoundaryTruncate;

impl TruncatePolicy for CharBoundaryTruncate {
    fn truncate(&self, text: &str, max_chars: usize, terminator: &str) -> String {
        if text.chars().count() <= max_chars {
            return text.to_string();
        }
        let kept: String = text.chars().take(max_chars).collect();
        format!("{}{}", kept.trim_end(), terminator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;

    #[test]
    fn auto_escape_override_beats_the_format_default() {
        let mut cfg = EngineConfig::default();
        assert!(cfg.auto_escape_for(OutputFormat::Html));
        assert!(!cfg.auto_escape_for(OutputFormat::Plain));
        cfg.auto_escaping = Some(false);
        assert!(!cfg.auto_escape_for(OutputFormat::Html));
    }

    #[test]
    fn default_truncation_cuts_at_character_boundary() {
        let policy = CharBoundaryTruncate;
        assert_eq!(policy.truncate("hello world", 20, "[...]"), "hello world");
        assert_eq!(policy.truncate("hello world", 7, "[...]"), "hello w[...]");
    }
}
