//! Template evaluation engine.
//!
//! `quill-core` owns the value model, AST and output formats; this crate
//! drives them: an [`Environment`] evaluates expressions and statements
//! against namespaces and invocation contexts, resolves macro/function calls,
//! and renders through the contextual output format.

mod builtins;
mod call;
mod env;
mod expr;
mod loader;
mod ops;
mod scope;
mod stmt;

pub use env::Environment;
pub use loader::{InMemoryLoader, Template, TemplateLoader};
pub use scope::Namespace;
pub use stmt::Flow;
