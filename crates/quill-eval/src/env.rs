//! The evaluation environment.
//!
//! One `Environment` drives one template evaluation on one thread. All state
//! is confined here and passed explicitly; there is no thread-local "current
//! environment". Compiled templates and callable definitions stay shared and
//! read-only across concurrent environments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use quill_core::ast::{Ident, Stmt};
use quill_core::config::EngineConfig;
use quill_core::error::{Error, Result};
use quill_core::output::OutputFormat;
use quill_core::value::NamespaceId;
use quill_core::Value;

use crate::loader::{Template, TemplateLoader};
use crate::scope::Namespace;
use crate::stmt::Flow;

/// The global namespace is always the first arena slot.
pub(crate) const GLOBALS: NamespaceId = 0;

pub struct Environment {
    cfg: EngineConfig,
    loader: Arc<dyn TemplateLoader>,
    /// Namespace arena; `Value::Namespace` holds indexes into it.
    namespaces: Vec<Namespace>,
    pub(crate) current_ns: NamespaceId,
    pub(crate) current_template: Arc<str>,
    pub(crate) current_format: OutputFormat,
    /// Output buffer stack; the bottom entry is the real output, entries
    /// above it are block-assignment captures or suppressed function output.
    out: Vec<String>,
    pub(crate) calls: Vec<InvocationContext>,
    /// Template name -> namespace of an already executed import.
    pub(crate) imports: HashMap<String, NamespaceId>,
    interrupt: Arc<AtomicBool>,
}

/// Macro/function call frame. Frames form a chain through the stack; a body
/// invocation additionally links back to the caller's frame so the nested
/// block sees the caller's locals beneath its own loop variables.
pub(crate) struct InvocationContext {
    pub locals: Namespace,
    pub parent_locals: Option<usize>,
    pub nested: Option<NestedBlock>,
}

/// The caller-side block passed to a macro call, together with everything
/// needed to evaluate it back in the caller's context.
#[derive(Clone)]
pub(crate) struct NestedBlock {
    pub stmts: Arc<Vec<Stmt>>,
    pub loop_var_names: Vec<Ident>,
    pub caller_ns: NamespaceId,
    pub caller_template: Arc<str>,
    pub caller_ctx: Option<usize>,
}

impl Environment {
    pub fn new(cfg: EngineConfig, loader: Arc<dyn TemplateLoader>) -> Self {
        Self {
            cfg,
            loader,
            namespaces: vec![Namespace::new()],
            current_ns: GLOBALS,
            current_template: Arc::from(""),
            current_format: OutputFormat::Plain,
            out: Vec::new(),
            calls: Vec::new(),
            imports: HashMap::new(),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Seed the data model: globals are visible from every namespace.
    pub fn set_global(&mut self, name: impl Into<Arc<str>>, value: Value) {
        self.namespaces[GLOBALS].set(name, value);
    }

    /// Flag for cooperative cancellation; setting it from any thread makes
    /// the evaluation abort with the interrupted error at the next loop
    /// re-entry.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    pub(crate) fn check_interrupt(&self) -> Result<()> {
        if self.interrupt.load(Ordering::Relaxed) {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Evaluate the named template to a string.
    pub fn process(&mut self, name: &str) -> Result<String> {
        let template = self
            .loader
            .load(name)?
            .ok_or_else(|| Error::TemplateNotFound(name.to_string()))?;
        self.process_template(&template)
    }

    pub fn process_template(&mut self, template: &Arc<Template>) -> Result<String> {
        tracing::debug!(template = %template.name, "template evaluation starts");
        self.current_ns = self.new_namespace();
        self.current_template = template.name.clone();
        self.current_format = template.output_format;
        self.push_capture();
        let result = self.exec_block(&template.body);
        let output = self.pop_capture();
        match result? {
            Flow::Normal | Flow::Stop => Ok(output),
            Flow::Break | Flow::Continue => Err(Error::Generic(
                "break or continue was used outside of an iterating directive".to_string(),
            )),
            Flow::Return(_) => Err(Error::Generic(
                "return was used outside of a macro or function".to_string(),
            )),
        }
    }

    pub(crate) fn load_template(&self, full_name: &str) -> Result<Option<Arc<Template>>> {
        self.loader.load(full_name)
    }

    pub(crate) fn new_namespace(&mut self) -> NamespaceId {
        self.namespaces.push(Namespace::new());
        self.namespaces.len() - 1
    }

    pub(crate) fn namespace(&self, id: NamespaceId) -> Result<&Namespace> {
        self.namespaces
            .get(id)
            .ok_or_else(|| Error::Bug(format!("dangling namespace id {}", id)))
    }

    pub(crate) fn namespace_mut(&mut self, id: NamespaceId) -> Result<&mut Namespace> {
        self.namespaces
            .get_mut(id)
            .ok_or_else(|| Error::Bug(format!("dangling namespace id {}", id)))
    }

    /// Resolve an identifier: local frames (following the body-invocation
    /// link through to the caller's frame), then the current namespace, then
    /// globals. Absence is the explicit `Missing` value, never an error here.
    pub fn lookup(&self, name: &str) -> Value {
        let mut frame = self.calls.len().checked_sub(1);
        while let Some(idx) = frame {
            let ctx = &self.calls[idx];
            if let Some(value) = ctx.locals.get(name) {
                return value.clone();
            }
            frame = ctx.parent_locals;
        }
        if let Some(value) = self.namespaces[self.current_ns].get(name) {
            return value.clone();
        }
        if self.current_ns != GLOBALS {
            if let Some(value) = self.namespaces[GLOBALS].get(name) {
                return value.clone();
            }
        }
        Value::Missing
    }

    /// The local frame of the innermost call, if any.
    pub(crate) fn locals_mut(&mut self) -> Option<&mut Namespace> {
        self.calls.last_mut().map(|ctx| &mut ctx.locals)
    }

    /// Bind names for the duration of `f`, restoring (or removing) the
    /// shadowed bindings afterwards even when `f` fails. Backs loop
    /// variables and lambda parameters, which are dynamically scoped locals.
    pub(crate) fn with_scoped_bindings<T>(
        &mut self,
        bindings: Vec<(Arc<str>, Value)>,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let mut shadowed: Vec<(Arc<str>, Option<Value>)> = Vec::with_capacity(bindings.len());
        for (name, value) in bindings {
            let scope = self.binding_scope_mut();
            let previous = scope.get(&name).cloned();
            scope.set(name.clone(), value);
            shadowed.push((name, previous));
        }
        let result = f(self);
        for (name, previous) in shadowed.into_iter().rev() {
            let scope = self.binding_scope_mut();
            match previous {
                Some(value) => scope.set(name, value),
                None => {
                    scope.remove(&name);
                }
            }
        }
        result
    }

    fn binding_scope_mut(&mut self) -> &mut Namespace {
        let current = self.current_ns;
        match self.calls.last_mut() {
            Some(ctx) => &mut ctx.locals,
            None => &mut self.namespaces[current],
        }
    }

    // --- output -----------------------------------------------------------

    pub(crate) fn write(&mut self, text: &str) {
        if let Some(buffer) = self.out.last_mut() {
            buffer.push_str(text);
        }
    }

    pub(crate) fn push_capture(&mut self) {
        self.out.push(String::new());
    }

    pub(crate) fn pop_capture(&mut self) -> String {
        self.out.pop().unwrap_or_default()
    }

    /// Insert an evaluated value into the output, applying the contextual
    /// format's escaping and conversion rules.
    pub(crate) fn interpolate(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Markup(mo) => {
                let converted = self
                    .current_format
                    .convert(&mo, self.cfg.output_format_mixing)?;
                let markup = converted.markup_string();
                self.write(&markup);
            }
            other => {
                let text = other.coerce_to_string(&self.cfg)?;
                if self.cfg.auto_escape_for(self.current_format) {
                    let escaped = self.current_format.escape(&text);
                    self.write(&escaped);
                } else {
                    self.write(&text);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::InMemoryLoader;

    fn env() -> Environment {
        Environment::new(EngineConfig::default(), Arc::new(InMemoryLoader::new()))
    }

    #[test]
    fn resolution_order_is_locals_then_namespace_then_globals() {
        let mut env = env();
        env.set_global("x", Value::int(1));
        let ns = env.new_namespace();
        env.current_ns = ns;
        assert_eq!(env.lookup("x"), Value::int(1));
        env.namespaces[ns].set("x", Value::int(2));
        assert_eq!(env.lookup("x"), Value::int(2));
        env.calls.push(InvocationContext {
            locals: Namespace::new(),
            parent_locals: None,
            nested: None,
        });
        env.locals_mut().unwrap().set("x", Value::int(3));
        assert_eq!(env.lookup("x"), Value::int(3));
        env.calls.pop();
        assert_eq!(env.lookup("x"), Value::int(2));
    }

    #[test]
    fn scoped_bindings_restore_shadowed_values_on_error() {
        let mut env = env();
        env.set_global("x", Value::int(1));
        let result: Result<()> = env.with_scoped_bindings(
            vec![(Arc::from("x"), Value::int(99)), (Arc::from("y"), Value::int(2))],
            |env| {
                assert_eq!(env.lookup("x"), Value::int(99));
                assert_eq!(env.lookup("y"), Value::int(2));
                Err(Error::Generic("boom".to_string()))
            },
        );
        assert!(result.is_err());
        assert_eq!(env.lookup("x"), Value::int(1));
        assert_eq!(env.lookup("y"), Value::Missing);
    }

    #[test]
    fn captures_nest() {
        let mut env = env();
        env.push_capture();
        env.write("outer ");
        env.push_capture();
        env.write("inner");
        assert_eq!(env.pop_capture(), "inner");
        env.write("done");
        assert_eq!(env.pop_capture(), "outer done");
    }

    #[test]
    fn interpolation_escapes_under_an_auto_escaping_format() {
        let mut env = env();
        env.current_format = OutputFormat::Html;
        env.push_capture();
        env.interpolate(Value::string("a < b")).unwrap();
        assert_eq!(env.pop_capture(), "a &lt; b");

        env.current_format = OutputFormat::Plain;
        env.push_capture();
        env.interpolate(Value::string("a < b")).unwrap();
        assert_eq!(env.pop_capture(), "a < b");
    }

    #[test]
    fn markup_of_the_current_format_is_inserted_verbatim() {
        let mut env = env();
        env.current_format = OutputFormat::Html;
        env.push_capture();
        let mo = OutputFormat::Html.from_markup("<b>hi</b>");
        env.interpolate(Value::Markup(mo)).unwrap();
        assert_eq!(env.pop_capture(), "<b>hi</b>");
    }
}
