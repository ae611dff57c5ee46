//! `?name` built-in dispatch.
//!
//! One closed enum, one dispatch function. Eager built-ins see their target
//! value; the lazy conditionals (`then`, `switch`, `default`, `has_content`,
//! `if_exists`) instead receive the argument expressions bound at parse time,
//! so branches that don't win are never evaluated, not even for side effects.

use std::ops::RangeInclusive;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use quill_core::ast::{BuiltInKind, Expr, ExprKind};
use quill_core::blame::Blame;
use quill_core::error::{Error, Result};
use quill_core::format;
use quill_core::value::{DateKind, Number, ValueDate, ValueMethod};
use quill_core::Value;

use crate::env::Environment;
use crate::expr::with_blamed;
use crate::ops;

pub(crate) fn apply(
    env: &mut Environment,
    target: &Expr,
    kind: BuiltInKind,
    args: &[Expr],
) -> Result<Value> {
    if kind.is_lazy() {
        return apply_lazy(env, target, kind, args);
    }
    let value = env.eval_required(target)?;
    match kind {
        BuiltInKind::Size => {
            arity(kind, args, 0..=0)?;
            match value.size() {
                Some(n) => Ok(Value::int(n as i64)),
                None if matches!(value, Value::Range(_)) => Err(Error::Generic(
                    "the size of a right-unbounded range is not known".to_string(),
                )),
                None => Err(type_mismatch(
                    "sequence or hash (something with a size)",
                    &value,
                    target,
                )),
            }
        }
        BuiltInKind::Length => {
            arity(kind, args, 0..=0)?;
            let text = string_of(env, &value, target)?;
            Ok(Value::int(text.chars().count() as i64))
        }
        BuiltInKind::UpperCase => {
            arity(kind, args, 0..=0)?;
            Ok(Value::string(string_of(env, &value, target)?.to_uppercase()))
        }
        BuiltInKind::LowerCase => {
            arity(kind, args, 0..=0)?;
            Ok(Value::string(string_of(env, &value, target)?.to_lowercase()))
        }
        BuiltInKind::CapFirst => {
            arity(kind, args, 0..=0)?;
            let text = string_of(env, &value, target)?;
            let mut chars = text.chars();
            Ok(Value::string(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => text,
            }))
        }
        BuiltInKind::Trim => {
            arity(kind, args, 0..=0)?;
            Ok(Value::string(string_of(env, &value, target)?.trim()))
        }
        BuiltInKind::Join => {
            arity(kind, args, 1..=1)?;
            let separator = env.eval_string(&args[0])?;
            let items = materialize_seq(&value, target)?;
            let mut parts = Vec::with_capacity(items.len());
            for item in &items {
                parts.push(string_of(env, item, target)?);
            }
            Ok(Value::string(parts.join(&separator)))
        }
        BuiltInKind::First => {
            arity(kind, args, 0..=0)?;
            if !value.is_sequence() {
                return Err(type_mismatch("sequence", &value, target));
            }
            Ok(value.seq_get(0).unwrap_or(Value::Missing))
        }
        BuiltInKind::Last => {
            arity(kind, args, 0..=0)?;
            if !value.is_sequence() {
                return Err(type_mismatch("sequence", &value, target));
            }
            match value.size() {
                Some(0) => Ok(Value::Missing),
                Some(n) => Ok(value.seq_get(n as i64 - 1).unwrap_or(Value::Missing)),
                None => Err(Error::Generic(
                    "a right-unbounded range has no last element".to_string(),
                )),
            }
        }
        BuiltInKind::Reverse => {
            arity(kind, args, 0..=0)?;
            let mut items = materialize_seq(&value, target)?;
            items.reverse();
            Ok(Value::seq(items))
        }
        BuiltInKind::Sort => {
            arity(kind, args, 0..=0)?;
            sort(env, &value, target)
        }
        BuiltInKind::Map => {
            arity(kind, args, 1..=1)?;
            let items = materialize_seq(&value, target)?;
            let mut mapped = Vec::with_capacity(items.len());
            for item in &items {
                mapped.push(apply_element_callable(env, &args[0], item)?);
            }
            Ok(Value::seq(mapped))
        }
        BuiltInKind::Filter => {
            arity(kind, args, 1..=1)?;
            let items = materialize_seq(&value, target)?;
            let mut kept = Vec::new();
            for item in items {
                match apply_element_callable(env, &args[0], &item)? {
                    Value::Bool(true) => kept.push(item),
                    Value::Bool(false) => {}
                    other => {
                        return Err(with_blamed(
                            Error::TypeMismatch {
                                expected: "boolean".to_string(),
                                actual: other.type_description().to_string(),
                                blame: Blame::new(
                                    "The ?filter condition must give a boolean for each element.",
                                ),
                            },
                            &args[0],
                        ))
                    }
                }
            }
            Ok(Value::seq(kept))
        }
        BuiltInKind::SeqContains => {
            arity(kind, args, 1..=1)?;
            let needle = env.eval_required(&args[0])?;
            let items = materialize_seq(&value, target)?;
            Ok(Value::Bool(items.iter().any(|item| {
                ops::values_equal_lenient(env.config(), item, &needle)
            })))
        }
        BuiltInKind::Keys => {
            arity(kind, args, 0..=0)?;
            match &value {
                Value::Hash(hash) => Ok(Value::seq(
                    hash.keys().map(|k| Value::String(k.clone())).collect(),
                )),
                Value::Namespace(id) => Ok(Value::seq(
                    env.namespace(*id)?
                        .names()
                        .map(|k| Value::String(k.clone()))
                        .collect(),
                )),
                _ => Err(type_mismatch("hash", &value, target)),
            }
        }
        BuiltInKind::Values => {
            arity(kind, args, 0..=0)?;
            match &value {
                Value::Hash(hash) => Ok(Value::seq(hash.values().cloned().collect())),
                Value::Namespace(id) => Ok(Value::seq(
                    env.namespace(*id)?.iter().map(|(_, v)| v.clone()).collect(),
                )),
                _ => Err(type_mismatch("hash", &value, target)),
            }
        }
        BuiltInKind::String => {
            arity(kind, args, 0..=2)?;
            string_builtin(env, &value, target, args)
        }
        BuiltInKind::C => {
            arity(kind, args, 0..=0)?;
            match &value {
                Value::Number(n) => Ok(Value::string(n.to_c_format())),
                Value::Bool(b) => Ok(Value::string(if *b { "true" } else { "false" })),
                Value::String(s) => Ok(Value::String(s.clone())),
                other => Err(type_mismatch("number, boolean or string", other, target)),
            }
        }
        BuiltInKind::Truncate => {
            arity(kind, args, 1..=2)?;
            let max = env.eval_int(&args[0])?;
            let max = usize::try_from(max).map_err(|_| {
                Error::CallBinding(Blame::new("?truncate needs a non-negative length."))
            })?;
            let terminator = match args.get(1) {
                Some(arg) => env.eval_string(arg)?,
                None => "[...]".to_string(),
            };
            let text = string_of(env, &value, target)?;
            let policy = env.config().truncate_policy.clone();
            Ok(Value::string(policy.truncate(&text, max, &terminator)))
        }
        BuiltInKind::NoEsc => {
            arity(kind, args, 0..=0)?;
            let format = env.current_format;
            match &value {
                Value::Markup(mo) => Ok(Value::Markup(
                    format.convert(mo, env.config().output_format_mixing)?,
                )),
                other => {
                    let text = string_of(env, other, target)?;
                    Ok(Value::Markup(format.from_markup(text)))
                }
            }
        }
        BuiltInKind::Esc => {
            arity(kind, args, 0..=0)?;
            let format = env.current_format;
            match &value {
                Value::Markup(mo) => Ok(Value::Markup(
                    format.convert(mo, env.config().output_format_mixing)?,
                )),
                other => {
                    let text = string_of(env, other, target)?;
                    Ok(Value::Markup(format.escape_plain_text(text)))
                }
            }
        }
        BuiltInKind::Date => {
            arity(kind, args, 0..=0)?;
            rekind(env, &value, DateKind::Date, target)
        }
        BuiltInKind::Time => {
            arity(kind, args, 0..=0)?;
            rekind(env, &value, DateKind::Time, target)
        }
        BuiltInKind::Datetime => {
            arity(kind, args, 0..=0)?;
            rekind(env, &value, DateKind::DateTime, target)
        }
        BuiltInKind::Then
        | BuiltInKind::Switch
        | BuiltInKind::Default
        | BuiltInKind::HasContent
        | BuiltInKind::IfExists => Err(Error::Bug(format!(
            "lazy built-in ?{} reached the eager dispatch path",
            kind.name()
        ))),
    }
}

fn apply_lazy(
    env: &mut Environment,
    target: &Expr,
    kind: BuiltInKind,
    args: &[Expr],
) -> Result<Value> {
    match kind {
        BuiltInKind::Then => {
            arity(kind, args, 2..=2)?;
            let condition = env.eval_bool(target)?;
            let winner = if condition { &args[0] } else { &args[1] };
            env.eval_required(winner)
        }
        BuiltInKind::Switch => {
            arity(kind, args, 2..=usize::MAX)?;
            let subject = env.eval_required(target)?;
            let mut pairs = args.chunks_exact(2);
            for pair in &mut pairs {
                let case = env.eval_required(&pair[0])?;
                if ops::values_equal(env.config(), &subject, &case)? {
                    return env.eval_required(&pair[1]);
                }
            }
            match pairs.remainder().first() {
                Some(default) => env.eval_required(default),
                None => Err(Error::Generic(
                    "the value didn't match any of the ?switch cases, and there was no default \
                     case"
                        .to_string(),
                )),
            }
        }
        BuiltInKind::Default => {
            let value = env.eval_guarded(target)?;
            if args.is_empty() {
                // Postfix without arguments wraps the target as a supplier:
                // the returned method applies the first-non-missing rule to
                // the target and whatever fallbacks it is called with later.
                return Ok(Value::Method(ValueMethod::extended(
                    "default",
                    move |fallbacks| {
                        if !value.is_missing() {
                            return Ok(value.clone());
                        }
                        match fallbacks.iter().find(|fb| !fb.is_missing()) {
                            Some(fb) => Ok(fb.clone()),
                            None => Ok(Value::Missing),
                        }
                    },
                )));
            }
            if !value.is_missing() {
                return Ok(value);
            }
            for arg in args {
                let candidate = env.eval_permissive(arg)?;
                if !candidate.is_missing() {
                    return Ok(candidate);
                }
            }
            Ok(Value::Missing)
        }
        BuiltInKind::HasContent => {
            arity(kind, args, 0..=0)?;
            let value = env.eval_guarded(target)?;
            Ok(Value::Bool(!value.is_missing() && !value.is_empty()))
        }
        BuiltInKind::IfExists => {
            arity(kind, args, 0..=0)?;
            let value = env.eval_guarded(target)?;
            Ok(if value.is_missing() {
                Value::Nothing
            } else {
                value
            })
        }
        other => Err(Error::Bug(format!(
            "eager built-in ?{} reached the lazy dispatch path",
            other.name()
        ))),
    }
}

fn string_builtin(
    env: &mut Environment,
    value: &Value,
    target: &Expr,
    args: &[Expr],
) -> Result<Value> {
    match (value, args.len()) {
        (Value::Markup(mo), 0) => Ok(Value::string(mo.markup_string())),
        (_, 0) => Ok(Value::string(string_of(env, value, target)?)),
        (Value::Date(date), 1) => {
            let pattern = env.eval_string(&args[0])?;
            Ok(Value::string(format::format_date_with(date, &pattern)?))
        }
        (Value::Bool(b), 2) => {
            let chosen = if *b { &args[0] } else { &args[1] };
            Ok(Value::string(env.eval_string(chosen)?))
        }
        (Value::Number(_), _) => Err(Error::Generic(
            "custom number format patterns are not supported; use ?c for the computer-language \
             rendering"
                .to_string(),
        )),
        (other, n) => Err(Error::CallBinding(
            Blame::new(format!(
                "?string with {} argument(s) isn't applicable to a {}.",
                n,
                other.type_description()
            ))
            .blaming(target.to_string(), target.span),
        )),
    }
}

fn sort(env: &Environment, value: &Value, target: &Expr) -> Result<Value> {
    let items = materialize_seq(value, target)?;
    if items.iter().all(|v| matches!(v, Value::Number(_))) {
        let mut numbers: Vec<Number> = items
            .iter()
            .map(|v| match v {
                Value::Number(n) => *n,
                _ => Number::Int(0),
            })
            .collect();
        numbers.sort_by(|a, b| env.config().arithmetic.compare(*a, *b));
        return Ok(Value::seq(numbers.into_iter().map(Value::Number).collect()));
    }
    if items.iter().all(|v| matches!(v, Value::String(_))) {
        let mut items = items;
        items.sort_by(|a, b| match (a, b) {
            (Value::String(x), Value::String(y)) => x.cmp(y),
            _ => std::cmp::Ordering::Equal,
        });
        return Ok(Value::seq(items));
    }
    Err(type_mismatch(
        "sequence of all numbers or all strings",
        value,
        target,
    ))
}

fn rekind(env: &Environment, value: &Value, kind: DateKind, target: &Expr) -> Result<Value> {
    match value {
        Value::Date(date) => Ok(Value::Date(ValueDate::new(kind, date.stamp))),
        Value::String(s) => {
            let cfg = env.config();
            let stamp = match kind {
                DateKind::Date => NaiveDate::parse_from_str(s, &cfg.date_format)
                    .map(|d| d.and_time(NaiveTime::MIN)),
                DateKind::Time => {
                    NaiveTime::parse_from_str(s, &cfg.time_format).map(|t| epoch().and_time(t))
                }
                DateKind::DateTime => NaiveDateTime::parse_from_str(s, &cfg.datetime_format),
                DateKind::Unknown => quill_core::bail_bug!("rekind to the unknown date kind"),
            }
            .map_err(|e| {
                Error::Generic(format!(
                    "failed to parse {:?} as a {}: {}",
                    s,
                    kind.description(),
                    e
                ))
            })?;
            Ok(Value::Date(ValueDate::new(kind, stamp)))
        }
        other => Err(type_mismatch("date-like or string", other, target)),
    }
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// One element through the `?map`/`?filter` callable. Lambda parameters are
/// dynamically scoped; the result is an owned value, materialized before the
/// parameter goes back out of scope.
fn apply_element_callable(env: &mut Environment, callable: &Expr, item: &Value) -> Result<Value> {
    if let ExprKind::Lambda { params, body } = &callable.kind {
        let param = match params.as_slice() {
            [param] => param,
            _ => {
                return Err(Error::CallBinding(Blame::new(
                    "The element-mapping lambda must take exactly one parameter.",
                )))
            }
        };
        return env.with_scoped_bindings(vec![(param.name.clone(), item.clone())], |env| {
            env.eval_required(body)
        });
    }
    let callee = env.eval_required(callable)?;
    let arg = [Expr::lit(item.clone())];
    match callee {
        Value::Callable(bound) if bound.def.is_function => {
            crate::call::invoke_function(env, &bound, &arg, &[])
        }
        Value::Method(method) => env.call_method(&method, &arg, &[]),
        other => Err(with_blamed(
            Error::TypeMismatch {
                expected: "lambda, function or method".to_string(),
                actual: other.type_description().to_string(),
                blame: Blame::new("This value can't be applied to the elements."),
            },
            callable,
        )),
    }
}

fn string_of(env: &Environment, value: &Value, target: &Expr) -> Result<String> {
    value
        .coerce_to_string(env.config())
        .map_err(|e| with_blamed(e, target))
}

/// Materialize the sequence capability into an owned vector. Right-unbounded
/// ranges have no finite materialization and are rejected.
fn materialize_seq(value: &Value, target: &Expr) -> Result<Vec<Value>> {
    match value {
        Value::Seq(items) => Ok(items.as_ref().clone()),
        Value::Nothing => Ok(Vec::new()),
        Value::Range(range) => {
            if range.size().is_none() {
                return Err(Error::Generic(
                    "a right-unbounded range can't be materialized".to_string(),
                ));
            }
            Ok(range.iter().map(Value::int).collect())
        }
        other => Err(type_mismatch("sequence", other, target)),
    }
}

fn type_mismatch(expected: &str, actual: &Value, target: &Expr) -> Error {
    Error::TypeMismatch {
        expected: expected.to_string(),
        actual: actual.type_description().to_string(),
        blame: Blame::new("The left side of the built-in has the wrong type.")
            .blaming(target.to_string(), target.span),
    }
}

fn arity(kind: BuiltInKind, args: &[Expr], expected: RangeInclusive<usize>) -> Result<()> {
    if expected.contains(&args.len()) {
        return Ok(());
    }
    Err(Error::CallBinding(
        Blame::new(format!("Wrong number of arguments for ?{}: ", kind.name())).part(format!(
            "expected {} to {}, got {}.",
            expected.start(),
            expected.end(),
            args.len()
        )),
    ))
}
