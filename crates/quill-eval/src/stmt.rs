//! Directive (statement) evaluation.
//!
//! Non-local control flow (break, continue, return, stop) is the [`Flow`]
//! signal returned from block execution, never an error. Blocks hand their
//! child-statement slices back to the driving loop in [`exec_block`]
//! (`Environment::exec_block`); statements do not recurse through a visitor.
//! Cooperative interruption is checked only where control loops back to
//! re-enter a repeatable block.

use std::sync::Arc;

use quill_core::ast::{Assign, AssignScope, Expr, Ident, Stmt, StmtKind, SwitchCase};
use quill_core::blame::Blame;
use quill_core::error::{Error, Result};
use quill_core::value::{BoundCallable, DirectiveBody, ValueDirective};
use quill_core::Value;

use crate::call;
use crate::env::{Environment, GLOBALS};
use crate::expr::{invalid_reference, with_blamed};
use crate::loader::resolve_relative;
use crate::ops;

/// Control-flow signal produced by block execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
    /// Abort the whole template normally (the stop directive).
    Stop,
}

/// One driving-loop step: either the statement completed, or it hands a child
/// block back to the loop, or it signals non-local flow.
enum Step<'a> {
    Done,
    Enter(&'a [Stmt]),
    Signal(Flow),
}

impl Environment {
    pub(crate) fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow> {
        let mut stack: Vec<std::slice::Iter<'_, Stmt>> = vec![stmts.iter()];
        while let Some(top) = stack.last_mut() {
            let stmt = match top.next() {
                Some(stmt) => stmt,
                None => {
                    stack.pop();
                    continue;
                }
            };
            match self.exec_stmt(stmt)? {
                Step::Done => {}
                Step::Enter(block) => stack.push(block.iter()),
                Step::Signal(flow) => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt<'a>(&mut self, stmt: &'a Stmt) -> Result<Step<'a>> {
        match &stmt.kind {
            StmtKind::Text(text) => {
                self.write(text);
                Ok(Step::Done)
            }
            StmtKind::Interpolation(expr) => {
                let value = self.eval_required(expr)?;
                self.interpolate(value)?;
                Ok(Step::Done)
            }
            StmtKind::IfChain(arms) => {
                for arm in arms {
                    let taken = match &arm.condition {
                        Some(condition) => self.eval_bool(condition)?,
                        None => true,
                    };
                    if taken {
                        return Ok(Step::Enter(&arm.block));
                    }
                }
                Ok(Step::Done)
            }
            StmtKind::Assign(assign) => {
                self.run_assign(assign)?;
                Ok(Step::Done)
            }
            StmtKind::BlockAssign {
                target,
                scope,
                namespace,
                body,
            } => {
                self.push_capture();
                let result = self.exec_block(body);
                let captured = self.pop_capture();
                let flow = result?;
                self.store(target, *scope, namespace.as_ref(), Value::string(captured))?;
                Ok(signal_or_done(flow))
            }
            StmtKind::Switch {
                subject,
                cases,
                default,
            } => {
                let flow = self.run_switch(subject, cases, default.as_deref())?;
                Ok(signal_or_done(flow))
            }
            StmtKind::List { seq, item, body } => {
                let value = self.eval_required(seq)?;
                let flow = self.run_list(&value, item, body, seq)?;
                Ok(signal_or_done(flow))
            }
            StmtKind::Break => Ok(Step::Signal(Flow::Break)),
            StmtKind::Continue => Ok(Step::Signal(Flow::Continue)),
            StmtKind::Stop => Ok(Step::Signal(Flow::Stop)),
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval_required(expr)?,
                    None => Value::Nothing,
                };
                Ok(Step::Signal(Flow::Return(value)))
            }
            StmtKind::Include {
                name,
                ignore_missing,
            } => {
                let flow = self.run_include(name, *ignore_missing)?;
                Ok(signal_or_done(flow))
            }
            StmtKind::Import { name, alias } => {
                self.run_import(name, alias)?;
                Ok(Step::Done)
            }
            StmtKind::MacroDef(def) => {
                let bound = BoundCallable {
                    def: def.clone(),
                    namespace: self.current_ns,
                    template: self.current_template.clone(),
                };
                let name = def.name.clone();
                let current = self.current_ns;
                self.namespace_mut(current)?.set(name, Value::Callable(bound));
                Ok(Step::Done)
            }
            StmtKind::Call {
                callee,
                positional,
                named,
                loop_vars,
                body,
            } => {
                let callee_value = self.eval_required(callee)?;
                match callee_value {
                    Value::Callable(bound) if !bound.def.is_function => {
                        let flow =
                            call::invoke_macro(self, &bound, positional, named, loop_vars, body)?;
                        Ok(signal_or_done(flow))
                    }
                    Value::Callable(bound) => Err(Error::TypeMismatch {
                        expected: "macro or user-defined directive".to_string(),
                        actual: "function".to_string(),
                        blame: Blame::new(format!(
                            "{:?} is a function; call it inside an interpolation instead.",
                            bound.def.name
                        )),
                    }),
                    Value::Directive(directive) => {
                        self.run_directive(&directive, positional, named, loop_vars, body)?;
                        Ok(Step::Done)
                    }
                    other => Err(with_blamed(
                        Error::TypeMismatch {
                            expected: "macro or user-defined directive".to_string(),
                            actual: other.type_description().to_string(),
                            blame: Blame::new("This value can't be called as a directive."),
                        },
                        callee,
                    )),
                }
            }
            StmtKind::NestedBody(args) => {
                let flow = call::invoke_nested(self, args)?;
                Ok(signal_or_done(flow))
            }
        }
    }

    fn run_assign(&mut self, assign: &Assign) -> Result<()> {
        let value = self.eval_permissive(&assign.value)?;
        let value = if value.is_missing() {
            // Legacy quirk: old templates relied on a missing right-hand side
            // silently assigning the empty string.
            if self.config().legacy_missing_assignment_is_empty {
                Value::string("")
            } else {
                return Err(invalid_reference(&assign.value));
            }
        } else {
            value
        };
        self.store(&assign.target, assign.scope, assign.namespace.as_ref(), value)
    }

    fn store(
        &mut self,
        target: &Ident,
        scope: AssignScope,
        namespace: Option<&Expr>,
        value: Value,
    ) -> Result<()> {
        if let Some(ns_expr) = namespace {
            let ns_value = self.eval_required(ns_expr)?;
            return match ns_value {
                Value::Namespace(id) => {
                    self.namespace_mut(id)?.set(target.name.clone(), value);
                    Ok(())
                }
                other => Err(with_blamed(
                    Error::TypeMismatch {
                        expected: "namespace".to_string(),
                        actual: other.type_description().to_string(),
                        blame: Blame::new("The in-clause of the assignment must be a namespace."),
                    },
                    ns_expr,
                )),
            };
        }
        match scope {
            AssignScope::Local => match self.locals_mut() {
                Some(locals) => {
                    locals.set(target.name.clone(), value);
                    Ok(())
                }
                None => Err(Error::Generic(
                    "local variables can only be assigned inside a macro or function call"
                        .to_string(),
                )),
            },
            AssignScope::Current => {
                let current = self.current_ns;
                self.namespace_mut(current)?.set(target.name.clone(), value);
                Ok(())
            }
            AssignScope::Global => {
                self.namespace_mut(GLOBALS)?.set(target.name.clone(), value);
                Ok(())
            }
        }
    }

    /// Statement-level switch. Once a case matches, every following case
    /// block runs unconditionally until a break; the default runs only when
    /// nothing matched at all.
    fn run_switch(
        &mut self,
        subject: &Expr,
        cases: &[SwitchCase],
        default: Option<&[Stmt]>,
    ) -> Result<Flow> {
        let subject = self.eval_required(subject)?;
        let mut matched = false;
        for case in cases {
            if !matched {
                let candidate = self.eval_required(&case.condition)?;
                if !ops::values_equal(self.config(), &subject, &candidate)? {
                    continue;
                }
                matched = true;
            }
            match self.exec_block(&case.block)? {
                Flow::Normal => {}
                Flow::Break => return Ok(Flow::Normal),
                other => return Ok(other),
            }
        }
        if !matched {
            if let Some(block) = default {
                return match self.exec_block(block)? {
                    Flow::Break => Ok(Flow::Normal),
                    other => Ok(other),
                };
            }
        }
        Ok(Flow::Normal)
    }

    fn run_list(
        &mut self,
        value: &Value,
        item: &Ident,
        body: &[Stmt],
        seq_expr: &Expr,
    ) -> Result<Flow> {
        match value {
            Value::Seq(items) => {
                let items = items.as_ref().clone();
                self.iterate(items.into_iter(), item, body)
            }
            Value::Range(range) => {
                // Unbounded ranges stream lazily; break and interruption are
                // the exits.
                let range = *range;
                self.iterate(range.iter().map(Value::int), item, body)
            }
            Value::Hash(hash) => {
                let keys: Vec<Value> =
                    hash.keys().map(|k| Value::String(k.clone())).collect();
                self.iterate(keys.into_iter(), item, body)
            }
            Value::Nothing => Ok(Flow::Normal),
            other => Err(with_blamed(
                Error::TypeMismatch {
                    expected: "sequence or hash".to_string(),
                    actual: other.type_description().to_string(),
                    blame: Blame::new("The listed value must be a sequence or a hash."),
                },
                seq_expr,
            )),
        }
    }

    fn iterate(
        &mut self,
        values: impl Iterator<Item = Value>,
        item: &Ident,
        body: &[Stmt],
    ) -> Result<Flow> {
        for value in values {
            // Interruption is only checked at loop re-entry, not per node.
            self.check_interrupt()?;
            let flow = self.with_scoped_bindings(vec![(item.name.clone(), value)], |env| {
                env.exec_block(body)
            })?;
            match flow {
                Flow::Normal | Flow::Continue => {}
                Flow::Break => return Ok(Flow::Normal),
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn run_include(&mut self, name: &Expr, ignore_missing: bool) -> Result<Flow> {
        let relative = self.eval_string(name)?;
        let full = resolve_relative(&self.current_template, &relative);
        let template = match self.load_template(&full)? {
            Some(template) => template,
            None if ignore_missing => {
                tracing::debug!(template = %full, "ignoring missing include");
                return Ok(Flow::Normal);
            }
            None => return Err(Error::TemplateNotFound(full)),
        };
        tracing::debug!(template = %full, "include");
        // Includes execute in the including template's namespace; only the
        // template identity and output format switch.
        let saved = (self.current_template.clone(), self.current_format);
        self.current_template = template.name.clone();
        self.current_format = template.output_format;
        let result = self.exec_block(&template.body);
        self.current_template = saved.0;
        self.current_format = saved.1;
        result
    }

    fn run_import(&mut self, name: &Expr, alias: &Ident) -> Result<()> {
        let relative = self.eval_string(name)?;
        let full = resolve_relative(&self.current_template, &relative);
        let ns_id = match self.imports.get(&full) {
            Some(id) => *id,
            None => {
                let template = self
                    .load_template(&full)?
                    .ok_or_else(|| Error::TemplateNotFound(full.clone()))?;
                tracing::debug!(template = %full, "import");
                let ns = self.new_namespace();
                self.imports.insert(full.clone(), ns);
                let saved = (
                    self.current_ns,
                    self.current_template.clone(),
                    self.current_format,
                );
                self.current_ns = ns;
                self.current_template = template.name.clone();
                self.current_format = template.output_format;
                // An import only populates the namespace; its printed output
                // is discarded.
                self.push_capture();
                let result = self.exec_block(&template.body);
                self.pop_capture();
                self.current_ns = saved.0;
                self.current_template = saved.1;
                self.current_format = saved.2;
                match result? {
                    Flow::Normal => {}
                    other => {
                        return Err(Error::Generic(format!(
                            "{:?} signal escaped the top level of imported template {:?}",
                            other, full
                        )))
                    }
                }
                ns
            }
        };
        let current = self.current_ns;
        self.namespace_mut(current)?
            .set(alias.name.clone(), Value::Namespace(ns_id));
        Ok(())
    }

    fn run_directive(
        &mut self,
        directive: &ValueDirective,
        positional: &[Expr],
        named: &[(Ident, Expr)],
        loop_vars: &[Ident],
        body: &[Stmt],
    ) -> Result<()> {
        tracing::trace!(name = %directive.name, "user-defined directive");
        if !positional.is_empty() {
            return Err(Error::CallBinding(Blame::new(format!(
                "User-defined directive {:?} takes named parameters only.",
                directive.name
            ))));
        }
        let mut params: Vec<(Arc<str>, Value)> = Vec::with_capacity(named.len());
        for (name, expr) in named {
            params.push((name.name.clone(), self.eval_required(expr)?));
        }
        if body.is_empty() {
            directive.imp.execute(&params, None)
        } else {
            let mut adapter = BodyAdapter {
                env: self,
                body,
                loop_var_names: loop_vars,
            };
            directive.imp.execute(&params, Some(&mut adapter))
        }
    }
}

fn signal_or_done<'a>(flow: Flow) -> Step<'a> {
    match flow {
        Flow::Normal => Step::Done,
        other => Step::Signal(other),
    }
}

/// Adapts the caller-side block of a directive call to the host-facing body
/// callback. The host may render it zero or more times; each render binds
/// the loop variables it passes.
struct BodyAdapter<'a, 'b> {
    env: &'a mut Environment,
    body: &'b [Stmt],
    loop_var_names: &'b [Ident],
}

impl DirectiveBody for BodyAdapter<'_, '_> {
    fn render(&mut self, loop_vars: &[Value]) -> Result<()> {
        let bindings: Vec<(Arc<str>, Value)> = self
            .loop_var_names
            .iter()
            .zip(loop_vars)
            .map(|(name, value)| (name.name.clone(), value.clone()))
            .collect();
        let body = self.body;
        let flow = self
            .env
            .with_scoped_bindings(bindings, |env| env.exec_block(body))?;
        match flow {
            Flow::Normal => Ok(()),
            other => Err(Error::Generic(format!(
                "{:?} signal escaped a directive body block",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{InMemoryLoader, Template};
    use quill_core::ast::{ExprKind, IfArm, RangeLimitExpr};
    use quill_core::config::EngineConfig;
    use quill_core::output::OutputFormat;
    use quill_core::span::Span;

    fn run(stmts: Vec<Stmt>) -> Result<String> {
        run_with(EngineConfig::default(), stmts, |_| {})
    }

    fn run_with(
        cfg: EngineConfig,
        stmts: Vec<Stmt>,
        setup: impl FnOnce(&mut Environment),
    ) -> Result<String> {
        let loader = Arc::new(InMemoryLoader::new());
        loader.add(Template::new("main.qt", stmts, OutputFormat::Plain));
        let mut env = Environment::new(cfg, loader);
        setup(&mut env);
        env.process("main.qt")
    }

    fn stmt(kind: StmtKind) -> Stmt {
        Stmt::new(kind, Span::synthetic())
    }

    fn assign(name: &str, value: Expr) -> Stmt {
        stmt(StmtKind::Assign(Assign {
            target: Ident::new(name),
            scope: AssignScope::Current,
            namespace: None,
            value,
        }))
    }

    fn print_var(name: &str) -> Stmt {
        Stmt::interpolation(Expr::var(name))
    }

    #[test]
    fn if_chain_takes_the_first_true_arm() {
        let stmts = vec![stmt(StmtKind::IfChain(vec![
            IfArm {
                condition: Some(Expr::lit(Value::Bool(false))),
                block: vec![Stmt::text("a")],
            },
            IfArm {
                condition: Some(Expr::lit(Value::Bool(true))),
                block: vec![Stmt::text("b")],
            },
            IfArm {
                condition: None,
                block: vec![Stmt::text("c")],
            },
        ]))];
        assert_eq!(run(stmts).unwrap(), "b");
    }

    #[test]
    fn missing_condition_variable_stays_guardable() {
        // <#if missingVar??>yes<#else>no</#if>
        let exists = Expr::new(
            ExprKind::Exists(Box::new(Expr::var("missingVar"))),
            Span::synthetic(),
        );
        let stmts = vec![stmt(StmtKind::IfChain(vec![
            IfArm {
                condition: Some(exists),
                block: vec![Stmt::text("yes")],
            },
            IfArm {
                condition: None,
                block: vec![Stmt::text("no")],
            },
        ]))];
        assert_eq!(run(stmts).unwrap(), "no");
    }

    #[test]
    fn division_by_zero_in_an_assignment_names_the_division() {
        let division = Expr::new(
            ExprKind::Arith {
                op: quill_core::value::ArithOp::Div,
                lhs: Box::new(Expr::lit(Value::int(5))),
                rhs: Box::new(Expr::lit(Value::int(0))),
            },
            Span::synthetic(),
        );
        let err = run(vec![assign("x", division)]).unwrap_err();
        assert!(matches!(err, Error::Arithmetic(_)));
        assert!(err.to_string().contains("5 / 0"));
    }

    #[test]
    fn legacy_mode_assigns_empty_string_for_missing() {
        let stmts = vec![assign("x", Expr::var("ghost")), Stmt::text("["), print_var("x"), Stmt::text("]")];
        let err = run(stmts.clone()).unwrap_err();
        assert!(matches!(err, Error::InvalidReference(_)));

        let mut cfg = EngineConfig::default();
        cfg.legacy_missing_assignment_is_empty = true;
        assert_eq!(run_with(cfg, stmts, |_| {}).unwrap(), "[]");
    }

    #[test]
    fn block_assignment_captures_nested_output() {
        let stmts = vec![
            stmt(StmtKind::BlockAssign {
                target: Ident::new("captured"),
                scope: AssignScope::Current,
                namespace: None,
                body: vec![Stmt::text("hello "), Stmt::interpolation(Expr::lit(Value::int(42)))],
            }),
            print_var("captured"),
        ];
        assert_eq!(run(stmts).unwrap(), "hello 42");
    }

    #[test]
    fn statement_switch_falls_through_until_break() {
        let case = |n: i64, text: &str, with_break: bool| {
            let mut block = vec![Stmt::text(text)];
            if with_break {
                block.push(stmt(StmtKind::Break));
            }
            SwitchCase {
                condition: Expr::lit(Value::int(n)),
                block,
            }
        };
        let switch = |subject: i64| {
            vec![stmt(StmtKind::Switch {
                subject: Expr::lit(Value::int(subject)),
                cases: vec![case(1, "one ", false), case(2, "two ", true), case(3, "three ", false)],
                default: Some(vec![Stmt::text("default")]),
            })]
        };
        // matching 1 falls through into 2, whose break stops the fallthrough
        assert_eq!(run(switch(1)).unwrap(), "one two ");
        assert_eq!(run(switch(3)).unwrap(), "three ");
        assert_eq!(run(switch(9)).unwrap(), "default");
    }

    #[test]
    fn list_supports_break_and_continue() {
        let range = Expr::new(
            ExprKind::Range {
                start: Box::new(Expr::lit(Value::int(1))),
                limit: RangeLimitExpr::Unbounded,
            },
            Span::synthetic(),
        );
        // skip 2, stop at 4
        let skip = stmt(StmtKind::IfChain(vec![IfArm {
            condition: Some(Expr::new(
                ExprKind::Compare {
                    op: quill_core::ast::CmpOp::Eq,
                    lhs: Box::new(Expr::var("i")),
                    rhs: Box::new(Expr::lit(Value::int(2))),
                },
                Span::synthetic(),
            )),
            block: vec![stmt(StmtKind::Continue)],
        }]));
        let stop = stmt(StmtKind::IfChain(vec![IfArm {
            condition: Some(Expr::new(
                ExprKind::Compare {
                    op: quill_core::ast::CmpOp::Eq,
                    lhs: Box::new(Expr::var("i")),
                    rhs: Box::new(Expr::lit(Value::int(4))),
                },
                Span::synthetic(),
            )),
            block: vec![stmt(StmtKind::Break)],
        }]));
        let stmts = vec![stmt(StmtKind::List {
            seq: range,
            item: Ident::new("i"),
            body: vec![skip, stop, print_var("i"), Stmt::text(" ")],
        })];
        assert_eq!(run(stmts).unwrap(), "1 3 ");
    }

    #[test]
    fn interruption_aborts_a_long_loop() {
        let range = Expr::new(
            ExprKind::Range {
                start: Box::new(Expr::lit(Value::int(0))),
                limit: RangeLimitExpr::Unbounded,
            },
            Span::synthetic(),
        );
        let stmts = vec![stmt(StmtKind::List {
            seq: range,
            item: Ident::new("i"),
            body: vec![Stmt::text(".")],
        })];
        let loader = Arc::new(InMemoryLoader::new());
        loader.add(Template::new("main.qt", stmts, OutputFormat::Plain));
        let mut env = Environment::new(EngineConfig::default(), loader);
        env.interrupt_handle()
            .store(true, std::sync::atomic::Ordering::Relaxed);
        let err = env.process("main.qt").unwrap_err();
        assert!(matches!(err, Error::Interrupted));
    }

    #[test]
    fn stop_ends_the_template_normally() {
        let stmts = vec![
            Stmt::text("before"),
            stmt(StmtKind::Stop),
            Stmt::text("after"),
        ];
        assert_eq!(run(stmts).unwrap(), "before");
    }

    #[test]
    fn include_inlines_and_ignore_missing_is_silent() {
        let loader = Arc::new(InMemoryLoader::new());
        loader.add(Template::new(
            "lib/header.qt",
            vec![Stmt::text("HEADER")],
            OutputFormat::Plain,
        ));
        loader.add(Template::new(
            "lib/page.qt",
            vec![
                stmt(StmtKind::Include {
                    name: Expr::lit(Value::string("header.qt")),
                    ignore_missing: false,
                }),
                stmt(StmtKind::Include {
                    name: Expr::lit(Value::string("no-such.qt")),
                    ignore_missing: true,
                }),
                Stmt::text(" body"),
            ],
            OutputFormat::Plain,
        ));
        let mut env = Environment::new(EngineConfig::default(), loader);
        assert_eq!(env.process("lib/page.qt").unwrap(), "HEADER body");

        let loader = Arc::new(InMemoryLoader::new());
        loader.add(Template::new(
            "page.qt",
            vec![stmt(StmtKind::Include {
                name: Expr::lit(Value::string("no-such.qt")),
                ignore_missing: false,
            })],
            OutputFormat::Plain,
        ));
        let mut env = Environment::new(EngineConfig::default(), loader);
        assert!(matches!(
            env.process("page.qt").unwrap_err(),
            Error::TemplateNotFound(_)
        ));
    }

    #[test]
    fn import_binds_a_namespace_without_printing() {
        let loader = Arc::new(InMemoryLoader::new());
        loader.add(Template::new(
            "lib.qt",
            vec![
                Stmt::text("this output is discarded"),
                assign("greeting", Expr::lit(Value::string("hello"))),
            ],
            OutputFormat::Plain,
        ));
        loader.add(Template::new(
            "main.qt",
            vec![
                stmt(StmtKind::Import {
                    name: Expr::lit(Value::string("lib.qt")),
                    alias: Ident::new("lib"),
                }),
                Stmt::interpolation(Expr::new(
                    ExprKind::Dot {
                        base: Box::new(Expr::var("lib")),
                        key: Ident::new("greeting"),
                    },
                    Span::synthetic(),
                )),
            ],
            OutputFormat::Plain,
        ));
        let mut env = Environment::new(EngineConfig::default(), loader);
        assert_eq!(env.process("main.qt").unwrap(), "hello");
    }
}
