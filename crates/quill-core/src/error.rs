use crate::blame::Blame;
use std::result;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// An expression evaluated to missing where a concrete value was required.
    #[error("Invalid reference: {0}")]
    InvalidReference(Blame),
    /// A value was present but did not have the required capability.
    #[error("Type mismatch: expected {expected}, but found {actual}. {blame}")]
    TypeMismatch {
        expected: String,
        actual: String,
        blame: Blame,
    },
    #[error("Arithmetic error: {0}")]
    Arithmetic(Blame),
    #[error("Malformed number: {text:?}. {blame}")]
    NumberParse { text: String, blame: Blame },
    /// Markup of one output format was inserted where another was expected and
    /// no conversion path existed.
    #[error("Output format conflict: cannot insert {from} markup into {to} output. {blame}")]
    OutputFormatConflict {
        from: &'static str,
        to: &'static str,
        blame: Blame,
    },
    #[error("Call binding error: {0}")]
    CallBinding(Blame),
    #[error("Template not found: {0:?}")]
    TemplateNotFound(String),
    /// Cooperative cancellation was signaled mid-evaluation.
    #[error("Template evaluation was interrupted")]
    Interrupted,
    /// Internal consistency error. Reachable only through evaluator defects,
    /// never through legitimate template content; must never be swallowed.
    #[error("Internal consistency error (this is a bug): {0}")]
    Bug(String),
    #[error("Generic error: {0}")]
    Generic(String),
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    /// The structured description, for error kinds that carry one.
    pub fn blame(&self) -> Option<&Blame> {
        match self {
            Error::InvalidReference(blame) => Some(blame),
            Error::TypeMismatch { blame, .. } => Some(blame),
            Error::Arithmetic(blame) => Some(blame),
            Error::NumberParse { blame, .. } => Some(blame),
            Error::OutputFormatConflict { blame, .. } => Some(blame),
            Error::CallBinding(blame) => Some(blame),
            _ => None,
        }
    }
}

// Convert from eyre::Report to our Error type
impl From<eyre::Report> for Error {
    fn from(err: eyre::Report) -> Self {
        Error::Generic(err.to_string())
    }
}

// Convert from std::io::Error to our Error type
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Generic(e.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Generic(s)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Generic(e.to_string())
    }
}
