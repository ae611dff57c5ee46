//! Structured error descriptions.
//!
//! Evaluation errors carry a description assembled from message parts, an
//! optional blamed expression (canonical form plus source span), and zero or
//! more tips. Hosts can render the whole thing or strip the tips for
//! production output; nothing here is a single flat string until `Display`
//! runs.

use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blame {
    parts: Vec<String>,
    blamed: Option<BlamedNode>,
    tips: Vec<String>,
}

/// Reference to the AST node an error blames, by canonical form and location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlamedNode {
    pub canonical: String,
    pub span: Span,
}

impl Blame {
    pub fn new(message: impl Into<String>) -> Self {
        Blame {
            parts: vec![message.into()],
            blamed: None,
            tips: Vec::new(),
        }
    }

    pub fn part(mut self, part: impl Into<String>) -> Self {
        self.parts.push(part.into());
        self
    }

    pub fn blaming(mut self, canonical: impl Into<String>, span: Span) -> Self {
        self.blamed = Some(BlamedNode {
            canonical: canonical.into(),
            span,
        });
        self
    }

    pub fn tip(mut self, tip: impl Into<String>) -> Self {
        self.tips.push(tip.into());
        self
    }

    pub fn message_parts(&self) -> &[String] {
        &self.parts
    }

    pub fn blamed(&self) -> Option<&BlamedNode> {
        self.blamed.as_ref()
    }

    pub fn tips(&self) -> &[String] {
        &self.tips
    }
}

impl std::fmt::Display for Blame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for part in &self.parts {
            f.write_str(part)?;
        }
        if let Some(blamed) = &self.blamed {
            write!(f, " [blamed: {} at {}]", blamed.canonical, blamed.span)?;
        }
        for tip in &self.tips {
            write!(f, "\nTip: {}", tip)?;
        }
        Ok(())
    }
}

/// Canned tips for the most common template mistakes. The texts are part of
/// the user-facing contract of invalid-reference errors.
pub mod tips {
    pub const DEFAULT_OR_EXISTS: &str = "If the failing expression is known to legally refer to \
        something that is sometimes null or missing, either specify a default value like \
        myOptionalVar!myDefault, or guard it with myOptionalVar?? inside a condition. These only \
        cover the last step of the expression; to cover the whole expression, use parentheses: \
        (myOptionalVar.foo)!myDefault, (myOptionalVar.foo)??";

    pub const NO_DOLLAR: &str = "Variable references must not start with \"$\", unless the \"$\" \
        is really part of the variable name.";

    pub const LAST_STEP_DOT: &str =
        "It's the step after the last dot that caused this error, not those before it.";

    pub const LAST_STEP_BRACKET: &str =
        "It's the final [] step that caused this error, not those before it.";

    pub const SIZE_PROPERTY: &str = "There is no \".size\" or \".length\" property; use the \
        ?size built-in for sequences and hashes, and ?length for strings.";
}
