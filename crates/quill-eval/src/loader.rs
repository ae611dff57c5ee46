//! Template loader contract.
//!
//! Loading, caching and storage of template sources are external concerns;
//! the evaluator only asks a loader for a compiled template by its full name.
//! A loader answering `Ok(None)` means "no such template", which include in
//! ignore-missing mode treats as a no-op and everything else reports as a
//! template-not-found error.

use std::sync::Arc;

use dashmap::DashMap;

use quill_core::ast::Stmt;
use quill_core::output::OutputFormat;
use quill_core::Result;

/// A compiled template: statements plus the output format its source was
/// parsed for.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: Arc<str>,
    pub body: Arc<Vec<Stmt>>,
    pub output_format: OutputFormat,
}

impl Template {
    pub fn new(name: impl Into<Arc<str>>, body: Vec<Stmt>, output_format: OutputFormat) -> Self {
        Self {
            name: name.into(),
            body: Arc::new(body),
            output_format,
        }
    }
}

pub trait TemplateLoader: Send + Sync {
    /// Look up a template by its full (already resolved) name.
    fn load(&self, name: &str) -> Result<Option<Arc<Template>>>;
}

/// Loader over an in-memory map, mainly for hosts that compile templates
/// themselves and for tests.
#[derive(Default)]
pub struct InMemoryLoader {
    templates: DashMap<String, Arc<Template>>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, template: Template) {
        self.templates
            .insert(template.name.to_string(), Arc::new(template));
    }
}

impl TemplateLoader for InMemoryLoader {
    fn load(&self, name: &str) -> Result<Option<Arc<Template>>> {
        Ok(self.templates.get(name).map(|t| t.clone()))
    }
}

/// Resolve a possibly-relative template name against the full name of the
/// template doing the including. Absolute names (leading `/`) ignore the
/// current template; `.` and `..` segments are normalized away.
pub fn resolve_relative(current: &str, name: &str) -> String {
    let (base, name) = match name.strip_prefix('/') {
        Some(rest) => ("", rest),
        None => (current.rsplit_once('/').map_or("", |(dir, _)| dir), name),
    };
    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for segment in name.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
