//! Macro and function call binding.
//!
//! Caller arguments are evaluated in the caller's context and bound to the
//! parameters of the callable definition; parameter defaults are then
//! resolved in the callee's environment by fixpoint iteration, because one
//! default may reference another parameter in either declaration order. The
//! binding errors distinguish a parameter the caller never mentioned from
//! one the caller passed an explicitly missing value for.

use std::sync::Arc;

use quill_core::ast::{CallableDef, Expr, Ident, Stmt};
use quill_core::blame::{tips, Blame};
use quill_core::error::{Error, Result};
use quill_core::value::{BoundCallable, NamespaceId, ValueHash};
use quill_core::Value;

use crate::env::{Environment, InvocationContext, NestedBlock};
use crate::scope::Namespace;
use crate::stmt::Flow;

enum Binding {
    Omitted,
    /// The caller named the parameter, but the argument evaluated to
    /// missing. Defaults still apply; the error message differs.
    SpecifiedMissing,
    Value(Value),
}

struct CallPlan {
    bindings: Vec<Binding>,
    catch_all: Option<Value>,
}

/// Invoke a macro as a directive: `<@m args; loop_vars>body</@m>`.
pub(crate) fn invoke_macro(
    env: &mut Environment,
    bound: &BoundCallable,
    positional: &[Expr],
    named: &[(Ident, Expr)],
    loop_vars: &[Ident],
    body: &[Stmt],
) -> Result<Flow> {
    tracing::trace!(name = %bound.def.name, "macro call");
    let plan = plan(env, &bound.def, positional, named)?;
    let nested = NestedBlock {
        stmts: Arc::new(body.to_vec()),
        loop_var_names: loop_vars.to_vec(),
        caller_ns: env.current_ns,
        caller_template: env.current_template.clone(),
        caller_ctx: env.calls.len().checked_sub(1),
    };
    let saved = enter(env, bound, Some(nested));
    let result = bind_and_run(env, bound, plan);
    leave(env, saved);
    match result? {
        Flow::Normal | Flow::Return(_) => Ok(Flow::Normal),
        Flow::Stop => Ok(Flow::Stop),
        Flow::Break | Flow::Continue => Err(Error::Generic(format!(
            "break or continue escaped the body of macro {:?}",
            bound.def.name
        ))),
    }
}

/// Invoke a function from an expression. Output written by the body is
/// discarded; the value comes from its return statement.
pub(crate) fn invoke_function(
    env: &mut Environment,
    bound: &BoundCallable,
    positional: &[Expr],
    named: &[(Ident, Expr)],
) -> Result<Value> {
    tracing::trace!(name = %bound.def.name, "function call");
    let plan = plan(env, &bound.def, positional, named)?;
    let saved = enter(env, bound, None);
    env.push_capture();
    let result = bind_and_run(env, bound, plan);
    env.pop_capture();
    leave(env, saved);
    match result? {
        Flow::Return(value) => Ok(value),
        Flow::Normal => Err(Error::Generic(format!(
            "function {:?} ended without a return",
            bound.def.name
        ))),
        Flow::Stop => Err(Error::Generic(format!(
            "stop was used inside function {:?}",
            bound.def.name
        ))),
        Flow::Break | Flow::Continue => Err(Error::Generic(format!(
            "break or continue escaped the body of function {:?}",
            bound.def.name
        ))),
    }
}

/// Execute the nested-content block passed to the innermost macro call.
///
/// The block lexically belongs to the call site, so evaluation switches to
/// the caller's namespace and template for its duration; the loop variables
/// live in a dedicated body-local frame that chains to the caller's locals.
/// The switch is restored on every exit path, including errors.
pub(crate) fn invoke_nested(env: &mut Environment, args: &[Expr]) -> Result<Flow> {
    let nested = match env.calls.last().and_then(|ctx| ctx.nested.clone()) {
        Some(nested) => nested,
        // A missing body block makes the nested directive a no-op.
        None => return Ok(Flow::Normal),
    };
    let mut locals = Namespace::new();
    for (name, arg) in nested.loop_var_names.iter().zip(args) {
        let value = env.eval_required(arg)?;
        locals.set(name.name.clone(), value);
    }
    let saved = SavedContext {
        ns: env.current_ns,
        template: env.current_template.clone(),
    };
    env.calls.push(InvocationContext {
        locals,
        parent_locals: nested.caller_ctx,
        nested: None,
    });
    env.current_ns = nested.caller_ns;
    env.current_template = nested.caller_template.clone();
    let result = env.exec_block(&nested.stmts);
    env.calls.pop();
    env.current_ns = saved.ns;
    env.current_template = saved.template;
    result
}

struct SavedContext {
    ns: NamespaceId,
    template: Arc<str>,
}

fn enter(env: &mut Environment, bound: &BoundCallable, nested: Option<NestedBlock>) -> SavedContext {
    let saved = SavedContext {
        ns: env.current_ns,
        template: env.current_template.clone(),
    };
    env.calls.push(InvocationContext {
        locals: Namespace::new(),
        parent_locals: None,
        nested,
    });
    // The callable executes in its definition context, not the caller's.
    env.current_ns = bound.namespace;
    env.current_template = bound.template.clone();
    saved
}

fn leave(env: &mut Environment, saved: SavedContext) {
    env.calls.pop();
    env.current_ns = saved.ns;
    env.current_template = saved.template;
}

/// Evaluate the caller-side arguments and map them onto the parameter list.
fn plan(
    env: &mut Environment,
    def: &CallableDef,
    positional: &[Expr],
    named: &[(Ident, Expr)],
) -> Result<CallPlan> {
    let mut bindings: Vec<Binding> = def.params.iter().map(|_| Binding::Omitted).collect();
    let mut extra_positional: Vec<Value> = Vec::new();
    let mut extra_named: Vec<(Arc<str>, Value)> = Vec::new();

    for (i, arg) in positional.iter().enumerate() {
        let binding = evaluate_argument(env, arg)?;
        if i < bindings.len() {
            bindings[i] = binding;
        } else if def.catch_all.is_some() {
            extra_positional.push(match binding {
                Binding::Value(v) => v,
                _ => Value::Nothing,
            });
        } else {
            return Err(Error::CallBinding(
                Blame::new(format!("When calling {} {:?}, ", kind_word(def), def.name)).part(
                    format!(
                        "{} positional argument(s) were passed, but it only declares {} \
                         parameter(s).",
                        positional.len(),
                        def.params.len()
                    ),
                ),
            ));
        }
    }

    for (name, arg) in named {
        let binding = evaluate_argument(env, arg)?;
        match def.params.iter().position(|p| p.name == *name) {
            Some(idx) => bindings[idx] = binding,
            None if def.catch_all.is_some() => extra_named.push((
                name.name.clone(),
                match binding {
                    Binding::Value(v) => v,
                    _ => Value::Nothing,
                },
            )),
            None => {
                return Err(Error::CallBinding(
                    Blame::new(format!("When calling {} {:?}, ", kind_word(def), def.name))
                        .part(format!("there is no parameter called {:?}.", name.as_str())),
                ))
            }
        }
    }

    let catch_all = match &def.catch_all {
        None => None,
        Some(_) if !extra_positional.is_empty() && !extra_named.is_empty() => {
            return Err(Error::CallBinding(
                Blame::new(format!("When calling {} {:?}, ", kind_word(def), def.name)).part(
                    "extra positional and extra named arguments can't be mixed in the catch-all \
                     parameter.",
                ),
            ))
        }
        Some(_) if !extra_positional.is_empty() => Some(Value::seq(extra_positional)),
        Some(_) => Some(Value::Hash(ValueHash::from_pairs(extra_named))),
    };

    Ok(CallPlan {
        bindings,
        catch_all,
    })
}

fn evaluate_argument(env: &mut Environment, arg: &Expr) -> Result<Binding> {
    let value = env.eval_permissive(arg)?;
    if value.is_missing() {
        Ok(Binding::SpecifiedMissing)
    } else {
        Ok(Binding::Value(value))
    }
}

/// Bind parameters into the callee's local frame, resolve defaults to a
/// fixpoint, then execute the body. Assumes the callee context was entered.
fn bind_and_run(env: &mut Environment, bound: &BoundCallable, plan: CallPlan) -> Result<Flow> {
    let def = &bound.def;
    for (param, binding) in def.params.iter().zip(&plan.bindings) {
        if let Binding::Value(value) = binding {
            if let Some(locals) = env.locals_mut() {
                locals.set(param.name.name.clone(), value.clone());
            }
        }
    }

    // Defaults are evaluated in the callee's environment and may read other
    // parameters; iterate until no default makes progress.
    let mut pending: Vec<usize> = def
        .params
        .iter()
        .enumerate()
        .filter(|(i, p)| {
            p.default.is_some() && !matches!(plan.bindings[*i], Binding::Value(_))
        })
        .map(|(i, _)| i)
        .collect();
    while !pending.is_empty() {
        let mut progress = false;
        let mut still_pending = Vec::new();
        for idx in pending {
            let param = &def.params[idx];
            let default = match &param.default {
                Some(default) => default,
                None => continue,
            };
            let value = env.eval_permissive(default)?;
            if value.is_missing() {
                still_pending.push(idx);
            } else {
                if let Some(locals) = env.locals_mut() {
                    locals.set(param.name.name.clone(), value);
                }
                progress = true;
            }
        }
        if !progress && !still_pending.is_empty() {
            let first = &def.params[still_pending[0]];
            return Err(Error::CallBinding(
                Blame::new(format!("When calling {} {:?}, ", kind_word(def), def.name))
                    .part(format!(
                        "the default value of parameter {:?} could not be resolved; ",
                        first.name.as_str()
                    ))
                    .part("it seems to depend on parameters that are themselves unresolved."),
            ));
        }
        pending = still_pending;
    }

    for (idx, param) in def.params.iter().enumerate() {
        let is_bound = env
            .locals_mut()
            .map(|locals| locals.contains(param.name.as_str()))
            .unwrap_or(false);
        if !is_bound {
            let specified = matches!(plan.bindings[idx], Binding::SpecifiedMissing);
            return Err(missing_required(def, idx, specified));
        }
    }

    if let Some(catch_all) = &def.catch_all {
        let value = plan
            .catch_all
            .unwrap_or_else(|| Value::Hash(ValueHash::default()));
        if let Some(locals) = env.locals_mut() {
            locals.set(catch_all.name.clone(), value);
        }
    }

    env.exec_block(&def.body)
}

fn missing_required(def: &CallableDef, idx: usize, specified: bool) -> Error {
    let param = &def.params[idx];
    let blame = Blame::new(format!("When calling {} {:?}, ", kind_word(def), def.name))
        .part(format!(
            "required parameter {:?} (parameter #{}) ",
            param.name.as_str(),
            idx + 1
        ))
        .part(if specified {
            "was specified, but had a null or missing value."
        } else {
            "was not specified."
        })
        .tip(if specified {
            tips::DEFAULT_OR_EXISTS
        } else {
            "If the omission was deliberate, give the parameter a default value where the macro \
             or function is defined."
        });
    Error::CallBinding(blame)
}

fn kind_word(def: &CallableDef) -> &'static str {
    if def.is_function {
        "function"
    } else {
        "macro"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::InMemoryLoader;
    use quill_core::ast::{ExprKind, MacroParam, StmtKind};
    use quill_core::config::EngineConfig;
    use quill_core::span::Span;
    use quill_core::value::ArithOp;

    fn env() -> Environment {
        Environment::new(EngineConfig::default(), Arc::new(InMemoryLoader::new()))
    }

    fn function(params: Vec<MacroParam>, catch_all: Option<Ident>, returns: Expr) -> BoundCallable {
        BoundCallable {
            def: Arc::new(CallableDef {
                name: Arc::from("f"),
                params,
                catch_all,
                is_function: true,
                body: vec![Stmt::new(StmtKind::Return(Some(returns)), Span::synthetic())],
            }),
            namespace: 0,
            template: Arc::from("test.qt"),
        }
    }

    fn param(name: &str, default: Option<Expr>) -> MacroParam {
        MacroParam {
            name: Ident::new(name),
            default,
        }
    }

    fn add(lhs: Expr, rhs: Expr) -> Expr {
        Expr::new(
            ExprKind::Arith {
                op: ArithOp::Add,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            Span::synthetic(),
        )
    }

    #[test]
    fn defaults_resolve_to_a_fixpoint_in_any_declaration_order() {
        let mut env = env();
        // f(a = b + 1, b = 2), returns a: the default of a depends on b,
        // which is declared later.
        let bound = function(
            vec![
                param("a", Some(add(Expr::var("b"), Expr::lit(Value::int(1))))),
                param("b", Some(Expr::lit(Value::int(2)))),
            ],
            None,
            Expr::var("a"),
        );
        let value = invoke_function(&mut env, &bound, &[], &[]).unwrap();
        assert_eq!(value, Value::int(3));
    }

    #[test]
    fn circular_defaults_fail_instead_of_looping() {
        let mut env = env();
        let bound = function(
            vec![
                param("a", Some(Expr::var("b"))),
                param("b", Some(Expr::var("a"))),
            ],
            None,
            Expr::var("a"),
        );
        let err = invoke_function(&mut env, &bound, &[], &[]).unwrap_err();
        match err {
            Error::CallBinding(blame) => {
                assert!(blame.to_string().contains("could not be resolved"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn omitted_and_specified_missing_are_distinguished() {
        let mut env = env();
        let bound = function(vec![param("x", None)], None, Expr::var("x"));

        let err = invoke_function(&mut env, &bound, &[], &[]).unwrap_err();
        assert!(err.to_string().contains("was not specified"));

        let named = [(Ident::new("x"), Expr::var("noSuchVariable"))];
        let err = invoke_function(&mut env, &bound, &[], &named).unwrap_err();
        assert!(err.to_string().contains("was specified, but"));
    }

    #[test]
    fn explicit_missing_still_takes_the_default() {
        let mut env = env();
        let bound = function(
            vec![param("x", Some(Expr::lit(Value::int(7))))],
            None,
            Expr::var("x"),
        );
        let named = [(Ident::new("x"), Expr::var("noSuchVariable"))];
        assert_eq!(
            invoke_function(&mut env, &bound, &[], &named).unwrap(),
            Value::int(7)
        );
    }

    #[test]
    fn catch_all_collects_extra_named_arguments() {
        let mut env = env();
        // returns rest.b
        let returns = Expr::new(
            ExprKind::Dot {
                base: Box::new(Expr::var("rest")),
                key: Ident::new("b"),
            },
            Span::synthetic(),
        );
        let bound = function(
            vec![param("a", None)],
            Some(Ident::new("rest")),
            returns,
        );
        let named = [
            (Ident::new("a"), Expr::lit(Value::int(1))),
            (Ident::new("b"), Expr::lit(Value::int(2))),
        ];
        assert_eq!(
            invoke_function(&mut env, &bound, &[], &named).unwrap(),
            Value::int(2)
        );
    }

    #[test]
    fn too_many_positional_arguments_is_a_binding_error() {
        let mut env = env();
        let bound = function(vec![param("a", None)], None, Expr::var("a"));
        let args = [Expr::lit(Value::int(1)), Expr::lit(Value::int(2))];
        let err = invoke_function(&mut env, &bound, &args, &[]).unwrap_err();
        assert!(matches!(err, Error::CallBinding(_)));
    }

    #[test]
    fn function_without_return_is_an_error() {
        let mut env = env();
        let bound = BoundCallable {
            def: Arc::new(CallableDef {
                name: Arc::from("f"),
                params: vec![],
                catch_all: None,
                is_function: true,
                body: vec![Stmt::text("output is discarded")],
            }),
            namespace: 0,
            template: Arc::from("test.qt"),
        };
        let err = invoke_function(&mut env, &bound, &[], &[]).unwrap_err();
        assert!(err.to_string().contains("without a return"));
    }
}
