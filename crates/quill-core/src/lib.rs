#[macro_use]
pub mod macros;

pub mod ast;
pub mod blame;
pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod output;
pub mod span;
pub mod value;

// Re-export commonly used items for convenience
pub use tracing;

pub use error::{Error, Result};
pub use value::{NamespaceId, Value};
