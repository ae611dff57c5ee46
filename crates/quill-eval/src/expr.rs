//! Expression evaluation.
//!
//! Recursive over the AST with the environment passed explicitly. `eval` may
//! produce the `Missing` value (an unresolved variable or hash key); callers
//! that need a concrete value go through `eval_required`, which turns
//! `Missing` into an invalid-reference error with tailored tips. The
//! existence/default operators cover only the last step of their target: a
//! miss on the final member/index lookup (or a bare variable) surfaces as
//! `Missing` and is absorbed, while a miss deeper in the chain stays an
//! invalid-reference error. A parenthesized target widens coverage to the
//! whole expression by folding any invalid reference back into `Missing`.

use std::sync::Arc;

use quill_core::ast::{BuiltInKind, CmpOp, Expr, ExprKind, Ident, RangeLimitExpr};
use quill_core::blame::{tips, Blame};
use quill_core::error::{Error, Result};
use quill_core::value::{ArithOp, Number, RangeLimit, ValueHash, ValueRange};
use quill_core::Value;

use crate::builtins;
use crate::env::Environment;
use crate::ops;

impl Environment {
    pub fn eval(&mut self, expr: &Expr) -> Result<Value> {
        self.eval_inner(expr).map_err(|e| with_blamed(e, expr))
    }

    /// Like [`eval`](Self::eval), but `Missing` is an invalid-reference
    /// error blaming `expr`.
    pub fn eval_required(&mut self, expr: &Expr) -> Result<Value> {
        let value = self.eval(expr)?;
        if value.is_missing() {
            Err(invalid_reference(expr))
        } else {
            Ok(value)
        }
    }

    /// Whole-expression permissiveness: any invalid-reference error from the
    /// operand collapses into `Missing` instead of propagating.
    pub(crate) fn eval_permissive(&mut self, expr: &Expr) -> Result<Value> {
        match self.eval(expr) {
            Err(Error::InvalidReference(_)) => Ok(Value::Missing),
            other => other,
        }
    }

    /// Evaluation of the target of `??`, `!` and the existence built-ins.
    /// These cover only the last step of the target (a bare variable, or the
    /// final member/index lookup on a present base); a miss earlier in the
    /// chain still errors. Parentheses widen coverage to the whole target.
    pub(crate) fn eval_guarded(&mut self, target: &Expr) -> Result<Value> {
        match &target.kind {
            ExprKind::Paren(inner) => self.eval_permissive(inner),
            _ => self.eval(target),
        }
    }

    pub(crate) fn eval_bool(&mut self, expr: &Expr) -> Result<bool> {
        match self.eval_required(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(with_blamed(
                Error::TypeMismatch {
                    expected: "boolean".to_string(),
                    actual: other.type_description().to_string(),
                    blame: Blame::new("A boolean was expected here."),
                },
                expr,
            )),
        }
    }

    pub(crate) fn eval_number(&mut self, expr: &Expr) -> Result<Number> {
        let value = self.eval_required(expr)?;
        value
            .coerce_to_number(self.config())
            .map_err(|e| with_blamed(e, expr))
    }

    pub(crate) fn eval_int(&mut self, expr: &Expr) -> Result<i64> {
        let n = self.eval_number(expr)?;
        n.as_int().ok_or_else(|| {
            with_blamed(
                Error::TypeMismatch {
                    expected: "integer".to_string(),
                    actual: format!("the non-integer number {}", n),
                    blame: Blame::new("A whole number was expected here."),
                },
                expr,
            )
        })
    }

    pub(crate) fn eval_string(&mut self, expr: &Expr) -> Result<String> {
        let value = self.eval_required(expr)?;
        value
            .coerce_to_string(self.config())
            .map_err(|e| with_blamed(e, expr))
    }

    fn eval_inner(&mut self, expr: &Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::Literal(value) => Ok(value.clone()),
            ExprKind::Var(ident) => Ok(self.lookup(ident.as_str())),
            ExprKind::Paren(inner) => self.eval(inner),
            ExprKind::Dot { base, key } => {
                let base_value = self.eval(base)?;
                if base_value.is_missing() {
                    return Err(invalid_reference(base));
                }
                self.member(&base_value, key.as_str(), base)
            }
            ExprKind::Index { base, key } => {
                let base_value = self.eval(base)?;
                if base_value.is_missing() {
                    return Err(invalid_reference(base));
                }
                let key_value = self.eval_required(key)?;
                match key_value {
                    Value::Number(n) => {
                        let index = n.as_int().ok_or_else(|| Error::TypeMismatch {
                            expected: "integer index".to_string(),
                            actual: format!("the non-integer number {}", n),
                            blame: Blame::new("Sequence indexes must be whole numbers."),
                        })?;
                        self.indexed(&base_value, index, base)
                    }
                    Value::String(name) => self.member(&base_value, &name, base),
                    other => Err(Error::TypeMismatch {
                        expected: "number or string".to_string(),
                        actual: other.type_description().to_string(),
                        blame: Blame::new("The [] key must be a number or a string."),
                    }),
                }
            }
            ExprKind::Arith { op, lhs, rhs } => {
                let a = self.eval_required(lhs)?;
                let b = self.eval_required(rhs)?;
                self.apply_arith(*op, a, b)
            }
            ExprKind::Neg(inner) => {
                let n = self.eval_number(inner)?;
                Ok(Value::Number(negate(n)))
            }
            ExprKind::Compare { op, lhs, rhs } => {
                if let Some(result) = self.try_count_compare(*op, lhs, rhs)? {
                    return Ok(Value::Bool(result));
                }
                let a = self.eval_required(lhs)?;
                let b = self.eval_required(rhs)?;
                Ok(Value::Bool(ops::compare(self.config(), *op, &a, &b)?))
            }
            ExprKind::And { lhs, rhs } => {
                if !self.eval_bool(lhs)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval_bool(rhs)?))
            }
            ExprKind::Or { lhs, rhs } => {
                if self.eval_bool(lhs)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval_bool(rhs)?))
            }
            ExprKind::Not(inner) => Ok(Value::Bool(!self.eval_bool(inner)?)),
            ExprKind::Exists(target) => {
                let value = self.eval_guarded(target)?;
                Ok(Value::Bool(!value.is_missing()))
            }
            ExprKind::Default { target, fallback } => {
                let value = self.eval_guarded(target)?;
                if !value.is_missing() {
                    return Ok(value);
                }
                match fallback {
                    Some(fb) => self.eval(fb),
                    None => Ok(Value::Nothing),
                }
            }
            ExprKind::Range { start, limit } => {
                let start = self.eval_int(start)?;
                let limit = match limit {
                    RangeLimitExpr::Inclusive(end) => RangeLimit::Inclusive(self.eval_int(end)?),
                    RangeLimitExpr::Exclusive(end) => RangeLimit::Exclusive(self.eval_int(end)?),
                    RangeLimitExpr::Length(n) => RangeLimit::Length(self.eval_int(n)?),
                    RangeLimitExpr::Unbounded => RangeLimit::Unbounded,
                };
                Ok(Value::Range(ValueRange::new(start, limit)))
            }
            ExprKind::SeqLit(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_required(item)?);
                }
                Ok(Value::seq(values))
            }
            ExprKind::HashLit(pairs) => {
                let mut entries: Vec<(Arc<str>, Value)> = Vec::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key = self.eval_string(key)?;
                    let value = self.eval_required(value)?;
                    entries.push((Arc::from(key), value));
                }
                let hash = if self.config().legacy_duplicate_hash_keys {
                    ValueHash::from_pairs_keeping_duplicates(entries)
                } else {
                    ValueHash::from_pairs(entries)
                };
                Ok(Value::Hash(hash))
            }
            ExprKind::Lambda { .. } => Err(Error::Generic(
                "a lambda expression can only be used where it is invoked directly".to_string(),
            )),
            ExprKind::Call {
                callee,
                args,
                named,
            } => {
                if let ExprKind::Lambda { params, body } = &callee.kind {
                    return self.call_lambda(params, body, args, named);
                }
                let callee_value = self.eval_required(callee)?;
                match callee_value {
                    Value::Method(method) => self.call_method(&method, args, named),
                    Value::Callable(bound) if bound.def.is_function => {
                        crate::call::invoke_function(self, &bound, args, named)
                    }
                    Value::Callable(bound) => Err(Error::TypeMismatch {
                        expected: "function or method".to_string(),
                        actual: "macro".to_string(),
                        blame: Blame::new(format!(
                            "{:?} is a macro; macros are directives and can't be called inside \
                             an expression.",
                            bound.def.name
                        )),
                    }),
                    other => Err(with_blamed(
                        Error::TypeMismatch {
                            expected: "function or method".to_string(),
                            actual: other.type_description().to_string(),
                            blame: Blame::new("This value isn't callable."),
                        },
                        callee,
                    )),
                }
            }
            ExprKind::BuiltIn {
                target,
                builtin,
                args,
            } => builtins::apply(self, target, *builtin, args),
        }
    }

    fn member(&mut self, base: &Value, key: &str, base_expr: &Expr) -> Result<Value> {
        match base {
            Value::Hash(hash) => Ok(hash.get(key).cloned().unwrap_or(Value::Missing)),
            Value::Namespace(id) => Ok(self
                .namespace(*id)?
                .get(key)
                .cloned()
                .unwrap_or(Value::Missing)),
            Value::Nothing => Ok(Value::Missing),
            Value::Node(node) => Ok(node
                .children
                .iter()
                .find(|child| matches!(child, Value::Node(n) if n.name.as_ref() == key))
                .cloned()
                .unwrap_or(Value::Missing)),
            other => {
                let mut blame = Blame::new(format!("Can't read member {:?} of this value.", key));
                if matches!(key, "size" | "length") {
                    blame = blame.tip(tips::SIZE_PROPERTY);
                }
                Err(with_blamed(
                    Error::TypeMismatch {
                        expected: "hash, namespace or node".to_string(),
                        actual: other.type_description().to_string(),
                        blame,
                    },
                    base_expr,
                ))
            }
        }
    }

    fn indexed(&mut self, base: &Value, index: i64, base_expr: &Expr) -> Result<Value> {
        match base {
            Value::Seq(_) | Value::Range(_) | Value::Nothing => {
                Ok(base.seq_get(index).unwrap_or(Value::Missing))
            }
            Value::String(s) => Ok(usize::try_from(index)
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::string(c.to_string()))
                .unwrap_or(Value::Missing)),
            other => Err(with_blamed(
                Error::TypeMismatch {
                    expected: "sequence or string".to_string(),
                    actual: other.type_description().to_string(),
                    blame: Blame::new("This value can't be indexed with a number."),
                },
                base_expr,
            )),
        }
    }

    fn apply_arith(&mut self, op: ArithOp, a: Value, b: Value) -> Result<Value> {
        let cfg = self.config();
        if op == ArithOp::Add {
            return match (&a, &b) {
                (Value::Number(x), Value::Number(y)) => {
                    Ok(Value::Number(cfg.arithmetic.apply(op, *x, *y)?))
                }
                (Value::Seq(x), Value::Seq(y)) => {
                    let mut items = x.as_ref().clone();
                    items.extend(y.iter().cloned());
                    Ok(Value::seq(items))
                }
                (Value::Hash(x), Value::Hash(y)) => Ok(Value::Hash(ValueHash::from_pairs(
                    x.iter()
                        .chain(y.iter())
                        .map(|(k, v)| (k.clone(), v.clone())),
                ))),
                (Value::Markup(x), _) => {
                    let rhs = self.to_markup_of(x.format(), &b)?;
                    Ok(Value::Markup(x.concat(&rhs)))
                }
                (_, Value::Markup(y)) => {
                    let lhs = self.to_markup_of(y.format(), &a)?;
                    Ok(Value::Markup(lhs.concat(y)))
                }
                _ => {
                    let mut text = a.coerce_to_string(cfg)?;
                    text.push_str(&b.coerce_to_string(cfg)?);
                    Ok(Value::string(text))
                }
            };
        }
        let x = a.coerce_to_number(cfg)?;
        let y = b.coerce_to_number(cfg)?;
        Ok(Value::Number(cfg.arithmetic.apply(op, x, y)?))
    }

    fn to_markup_of(
        &self,
        format: quill_core::output::OutputFormat,
        value: &Value,
    ) -> Result<quill_core::output::MarkupOutput> {
        match value {
            Value::Markup(mo) => format.convert(mo, self.config().output_format_mixing),
            other => {
                let text = other.coerce_to_string(self.config())?;
                Ok(format.escape_plain_text(text))
            }
        }
    }

    /// The counting-limit short-circuit: `x?size` compared against a literal
    /// integer counts at most `n + 1` elements. Mandatory for size checks on
    /// right-unbounded ranges.
    fn try_count_compare(&mut self, op: CmpOp, lhs: &Expr, rhs: &Expr) -> Result<Option<bool>> {
        let (op, target, n) = match (size_target(lhs), literal_int(rhs)) {
            (Some(target), Some(n)) => (op, target, n),
            _ => match (literal_int(lhs), size_target(rhs)) {
                (Some(n), Some(target)) => (flip(op), target, n),
                _ => return Ok(None),
            },
        };
        let value = self.eval_required(target)?;
        Ok(ops::compare_count(op, &value, n))
    }

    fn call_lambda(
        &mut self,
        params: &[Ident],
        body: &Expr,
        args: &[Expr],
        named: &[(Ident, Expr)],
    ) -> Result<Value> {
        if !named.is_empty() {
            return Err(Error::CallBinding(Blame::new(
                "Lambdas take positional arguments only.",
            )));
        }
        if args.len() != params.len() {
            return Err(Error::CallBinding(
                Blame::new("Wrong number of lambda arguments: ").part(format!(
                    "the lambda declares {} parameter(s) but {} argument(s) were passed.",
                    params.len(),
                    args.len()
                )),
            ));
        }
        let mut bindings = Vec::with_capacity(params.len());
        for (param, arg) in params.iter().zip(args) {
            bindings.push((param.name.clone(), self.eval_required(arg)?));
        }
        // Dynamically scoped: the parameters exist only while the body runs,
        // and the body does not capture anything by reference.
        self.with_scoped_bindings(bindings, |env| env.eval(body))
    }

    pub(crate) fn call_method(
        &mut self,
        method: &quill_core::value::ValueMethod,
        args: &[Expr],
        named: &[(Ident, Expr)],
    ) -> Result<Value> {
        use quill_core::value::MethodImpl;
        if !named.is_empty() {
            return Err(Error::CallBinding(Blame::new(format!(
                "Method {:?} takes positional arguments only.",
                method.name
            ))));
        }
        match &method.imp {
            MethodImpl::Extended(f) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_required(arg)?);
                }
                f(&values)
            }
            MethodImpl::Simple(f) => {
                let mut strings = Vec::with_capacity(args.len());
                for arg in args {
                    strings.push(self.eval_string(arg)?);
                }
                f(&strings)
            }
        }
    }
}

fn negate(n: Number) -> Number {
    match n {
        Number::Int(v) => match v.checked_neg() {
            Some(neg) => Number::Int(neg),
            None => Number::Decimal(-(v as f64)),
        },
        Number::Decimal(v) => Number::Decimal(-v),
    }
}

fn size_target(expr: &Expr) -> Option<&Expr> {
    match &expr.kind {
        ExprKind::BuiltIn {
            target,
            builtin: BuiltInKind::Size,
            args,
        } if args.is_empty() => Some(target),
        _ => None,
    }
}

fn literal_int(expr: &Expr) -> Option<i64> {
    match expr.literal_value()? {
        Value::Number(n) => n.as_int(),
        _ => None,
    }
}

/// Mirror an operator across swapped operands.
fn flip(op: CmpOp) -> CmpOp {
    match op {
        CmpOp::Eq => CmpOp::Eq,
        CmpOp::Ne => CmpOp::Ne,
        CmpOp::Lt => CmpOp::Gt,
        CmpOp::Lte => CmpOp::Gte,
        CmpOp::Gt => CmpOp::Lt,
        CmpOp::Gte => CmpOp::Lte,
    }
}

/// Invalid-reference error blaming `expr`, with the recovery tips tailored
/// to the expression's shape.
pub(crate) fn invalid_reference(expr: &Expr) -> Error {
    let mut blame = Blame::new("The following has evaluated to null or missing: ")
        .blaming(expr.to_string(), expr.span)
        .tip(tips::DEFAULT_OR_EXISTS);
    match &expr.kind {
        ExprKind::Var(ident) if ident.as_str().starts_with('$') => {
            blame = blame.tip(tips::NO_DOLLAR);
        }
        ExprKind::Dot { key, .. } => {
            blame = blame.tip(tips::LAST_STEP_DOT);
            if matches!(key.as_str(), "size" | "length") {
                blame = blame.tip(tips::SIZE_PROPERTY);
            }
        }
        ExprKind::Index { .. } => {
            blame = blame.tip(tips::LAST_STEP_BRACKET);
        }
        _ => {}
    }
    Error::InvalidReference(blame)
}

/// Attach `expr` as the blamed node when the error doesn't already blame a
/// more specific one.
pub(crate) fn with_blamed(err: Error, expr: &Expr) -> Error {
    fn attach(blame: Blame, expr: &Expr) -> Blame {
        if blame.blamed().is_some() {
            blame
        } else {
            blame.blaming(expr.to_string(), expr.span)
        }
    }
    match err {
        Error::InvalidReference(b) => Error::InvalidReference(attach(b, expr)),
        Error::TypeMismatch {
            expected,
            actual,
            blame,
        } => Error::TypeMismatch {
            expected,
            actual,
            blame: attach(blame, expr),
        },
        Error::Arithmetic(b) => Error::Arithmetic(attach(b, expr)),
        Error::NumberParse { text, blame } => Error::NumberParse {
            text,
            blame: attach(blame, expr),
        },
        Error::OutputFormatConflict { from, to, blame } => Error::OutputFormatConflict {
            from,
            to,
            blame: attach(blame, expr),
        },
        Error::CallBinding(b) => Error::CallBinding(attach(b, expr)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::InMemoryLoader;
    use quill_core::config::EngineConfig;
    use quill_core::span::Span;

    fn env() -> Environment {
        Environment::new(EngineConfig::default(), Arc::new(InMemoryLoader::new()))
    }

    fn binary(op: ArithOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::new(
            ExprKind::Arith {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            Span::synthetic(),
        )
    }

    #[test]
    fn arithmetic_preserves_integers() {
        let mut env = env();
        let expr = binary(ArithOp::Add, Expr::lit(Value::int(2)), Expr::lit(Value::int(3)));
        assert_eq!(env.eval(&expr).unwrap(), Value::int(5));
    }

    #[test]
    fn plus_concatenates_strings_and_sequences() {
        let mut env = env();
        let expr = binary(
            ArithOp::Add,
            Expr::lit(Value::string("a")),
            Expr::lit(Value::int(1)),
        );
        assert_eq!(env.eval(&expr).unwrap(), Value::string("a1"));

        let expr = binary(
            ArithOp::Add,
            Expr::lit(Value::seq(vec![Value::int(1)])),
            Expr::lit(Value::seq(vec![Value::int(2)])),
        );
        assert_eq!(
            env.eval(&expr).unwrap(),
            Value::seq(vec![Value::int(1), Value::int(2)])
        );
    }

    #[test]
    fn missing_variable_is_required_into_an_invalid_reference() {
        let mut env = env();
        let expr = Expr::var("ghost");
        assert_eq!(env.eval(&expr).unwrap(), Value::Missing);
        let err = env.eval_required(&expr).unwrap_err();
        match err {
            Error::InvalidReference(blame) => {
                assert_eq!(blame.blamed().unwrap().canonical, "ghost");
                assert!(!blame.tips().is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn default_and_exists_cover_only_the_last_step() {
        let mut env = env();
        // ghost.name!"fallback" — ghost itself is missing, which is one step
        // before the guarded one, so the miss still errors.
        let dotted = Expr::new(
            ExprKind::Dot {
                base: Box::new(Expr::var("ghost")),
                key: Ident::new("name"),
            },
            Span::synthetic(),
        );
        let defaulted = |target: Expr| {
            Expr::new(
                ExprKind::Default {
                    target: Box::new(target),
                    fallback: Some(Box::new(Expr::lit(Value::string("fallback")))),
                },
                Span::synthetic(),
            )
        };
        let err = env.eval(&defaulted(dotted.clone())).unwrap_err();
        assert!(matches!(err, Error::InvalidReference(_)));
        let exists = Expr::new(ExprKind::Exists(Box::new(dotted.clone())), Span::synthetic());
        assert!(matches!(
            env.eval(&exists).unwrap_err(),
            Error::InvalidReference(_)
        ));

        // (ghost.name)!"fallback" — parentheses widen coverage to the whole
        // expression.
        assert_eq!(
            env.eval(&defaulted(Expr::paren(dotted.clone()))).unwrap(),
            Value::string("fallback")
        );
        let exists = Expr::new(
            ExprKind::Exists(Box::new(Expr::paren(dotted))),
            Span::synthetic(),
        );
        assert_eq!(env.eval(&exists).unwrap(), Value::Bool(false));

        // user.name!"fallback" with user present but nameless guards the
        // final lookup, which is the last step.
        env.set_global(
            "user",
            Value::Hash(ValueHash::from_pairs(vec![(
                Arc::from("id"),
                Value::int(7),
            )])),
        );
        let last_step = Expr::new(
            ExprKind::Dot {
                base: Box::new(Expr::var("user")),
                key: Ident::new("name"),
            },
            Span::synthetic(),
        );
        assert_eq!(
            env.eval(&defaulted(last_step)).unwrap(),
            Value::string("fallback")
        );
        // A bare variable is its own last step.
        assert_eq!(
            env.eval(&defaulted(Expr::var("ghost"))).unwrap(),
            Value::string("fallback")
        );
    }

    #[test]
    fn default_without_fallback_yields_the_nothing_value() {
        let mut env = env();
        let expr = Expr::new(
            ExprKind::Default {
                target: Box::new(Expr::var("ghost")),
                fallback: None,
            },
            Span::synthetic(),
        );
        let value = env.eval(&expr).unwrap();
        assert_eq!(value, Value::Nothing);
        assert_eq!(value.size(), Some(0));
        assert!(value.is_string());
    }

    #[test]
    fn lambda_parameters_do_not_leak() {
        let mut env = env();
        // (x -> x * 2)(21)
        let call = Expr::new(
            ExprKind::Call {
                callee: Box::new(Expr::new(
                    ExprKind::Lambda {
                        params: vec![Ident::new("x")],
                        body: Box::new(binary(
                            ArithOp::Mul,
                            Expr::var("x"),
                            Expr::lit(Value::int(2)),
                        )),
                    },
                    Span::synthetic(),
                )),
                args: vec![Expr::lit(Value::int(21))],
                named: vec![],
            },
            Span::synthetic(),
        );
        assert_eq!(env.eval(&call).unwrap(), Value::int(42));
        assert_eq!(env.lookup("x"), Value::Missing);
    }

    #[test]
    fn counting_comparison_handles_unbounded_ranges() {
        let mut env = env();
        let range = Expr::new(
            ExprKind::Range {
                start: Box::new(Expr::lit(Value::int(0))),
                limit: RangeLimitExpr::Unbounded,
            },
            Span::synthetic(),
        );
        let size = Expr::new(
            ExprKind::BuiltIn {
                target: Box::new(range),
                builtin: BuiltInKind::Size,
                args: vec![],
            },
            Span::synthetic(),
        );
        let compare = Expr::new(
            ExprKind::Compare {
                op: CmpOp::from_spelling("gt").unwrap(),
                lhs: Box::new(size),
                rhs: Box::new(Expr::lit(Value::int(100))),
            },
            Span::synthetic(),
        );
        assert_eq!(env.eval(&compare).unwrap(), Value::Bool(true));
    }

    #[test]
    fn methods_receive_typed_or_stringified_arguments() {
        use quill_core::value::ValueMethod;
        let mut env = env();
        env.set_global(
            "typed",
            Value::Method(ValueMethod::extended("typed", |args| {
                assert_eq!(args[0], Value::int(7));
                Ok(Value::Bool(true))
            })),
        );
        env.set_global(
            "plain",
            Value::Method(ValueMethod::simple("plain", |args| {
                Ok(Value::string(args.join("-")))
            })),
        );
        let call = |name: &str| {
            Expr::new(
                ExprKind::Call {
                    callee: Box::new(Expr::var(name)),
                    args: vec![Expr::lit(Value::int(7))],
                    named: vec![],
                },
                Span::synthetic(),
            )
        };
        assert_eq!(env.eval(&call("typed")).unwrap(), Value::Bool(true));
        assert_eq!(env.eval(&call("plain")).unwrap(), Value::string("7"));
    }

    #[test]
    fn dot_size_mistake_gets_a_tailored_tip() {
        let mut env = env();
        env.set_global("xs", Value::seq(vec![Value::int(1)]));
        let expr = Expr::new(
            ExprKind::Dot {
                base: Box::new(Expr::var("xs")),
                key: Ident::new("size"),
            },
            Span::synthetic(),
        );
        let err = env.eval(&expr).unwrap_err();
        assert!(err.to_string().contains("?size"));
    }
}
