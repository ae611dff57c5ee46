use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::span::Span;
use crate::value::{ArithOp, Value};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    pub name: Arc<str>,
}

impl Ident {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl Display for Ident {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Fully foldable at parse time; the folded constant is the cached value.
    Literal(Value),
    Var(Ident),
    /// Explicit grouping. Evaluates transparently, but widens the coverage
    /// of a following `??` or `!` from the last step to the whole
    /// parenthesized expression.
    Paren(Box<Expr>),
    Dot {
        base: Box<Expr>,
        key: Ident,
    },
    Index {
        base: Box<Expr>,
        key: Box<Expr>,
    },
    Arith {
        op: ArithOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Neg(Box<Expr>),
    Compare {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    And {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Or {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    /// `target??`
    Exists(Box<Expr>),
    /// `target!fallback`; no fallback means the all-empty zero value.
    Default {
        target: Box<Expr>,
        fallback: Option<Box<Expr>>,
    },
    Range {
        start: Box<Expr>,
        limit: RangeLimitExpr,
    },
    SeqLit(Vec<Expr>),
    HashLit(Vec<(Expr, Expr)>),
    /// Non-closure lambda: parameters are dynamically scoped locals valid
    /// only during the body's evaluation.
    Lambda {
        params: Vec<Ident>,
        body: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        named: Vec<(Ident, Expr)>,
    },
    /// `target?name(args)`. Argument expressions are bound at parse time so
    /// lazy built-ins (`then`, `switch`, …) only touch the winning branch.
    BuiltIn {
        target: Box<Expr>,
        builtin: BuiltInKind,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RangeLimitExpr {
    Inclusive(Box<Expr>),
    Exclusive(Box<Expr>),
    Length(Box<Expr>),
    Unbounded,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn lit(value: Value) -> Self {
        Self::new(ExprKind::Literal(value), Span::synthetic())
    }

    pub fn var(name: &str) -> Self {
        Self::new(ExprKind::Var(Ident::new(name)), Span::synthetic())
    }

    pub fn paren(inner: Expr) -> Self {
        Self::new(ExprKind::Paren(Box::new(inner)), Span::synthetic())
    }

    /// The cached constant for literal (parse-time foldable) nodes.
    pub fn literal_value(&self) -> Option<&Value> {
        match &self.kind {
            ExprKind::Literal(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        self.literal_value().is_some()
    }

    /// Deep-clone this expression with every free occurrence of `name`
    /// replaced by `replacement`. Lambda parameters shadow the name.
    pub fn with_ident_replaced(&self, name: &str, replacement: &Expr) -> Expr {
        let sub = |e: &Expr| Box::new(e.with_ident_replaced(name, replacement));
        let kind = match &self.kind {
            ExprKind::Var(ident) if ident.as_str() == name => {
                return replacement.clone();
            }
            k @ (ExprKind::Literal(_) | ExprKind::Var(_)) => k.clone(),
            ExprKind::Paren(inner) => ExprKind::Paren(sub(inner)),
            ExprKind::Dot { base, key } => ExprKind::Dot {
                base: sub(base),
                key: key.clone(),
            },
            ExprKind::Index { base, key } => ExprKind::Index {
                base: sub(base),
                key: sub(key),
            },
            ExprKind::Arith { op, lhs, rhs } => ExprKind::Arith {
                op: *op,
                lhs: sub(lhs),
                rhs: sub(rhs),
            },
            ExprKind::Neg(inner) => ExprKind::Neg(sub(inner)),
            ExprKind::Compare { op, lhs, rhs } => ExprKind::Compare {
                op: *op,
                lhs: sub(lhs),
                rhs: sub(rhs),
            },
            ExprKind::And { lhs, rhs } => ExprKind::And {
                lhs: sub(lhs),
                rhs: sub(rhs),
            },
            ExprKind::Or { lhs, rhs } => ExprKind::Or {
                lhs: sub(lhs),
                rhs: sub(rhs),
            },
            ExprKind::Not(inner) => ExprKind::Not(sub(inner)),
            ExprKind::Exists(inner) => ExprKind::Exists(sub(inner)),
            ExprKind::Default { target, fallback } => ExprKind::Default {
                target: sub(target),
                fallback: fallback.as_ref().map(|e| sub(e)),
            },
            ExprKind::Range { start, limit } => ExprKind::Range {
                start: sub(start),
                limit: match limit {
                    RangeLimitExpr::Inclusive(e) => RangeLimitExpr::Inclusive(sub(e)),
                    RangeLimitExpr::Exclusive(e) => RangeLimitExpr::Exclusive(sub(e)),
                    RangeLimitExpr::Length(e) => RangeLimitExpr::Length(sub(e)),
                    RangeLimitExpr::Unbounded => RangeLimitExpr::Unbounded,
                },
            },
            ExprKind::SeqLit(items) => ExprKind::SeqLit(
                items
                    .iter()
                    .map(|e| e.with_ident_replaced(name, replacement))
                    .collect(),
            ),
            ExprKind::HashLit(pairs) => ExprKind::HashLit(
                pairs
                    .iter()
                    .map(|(k, v)| {
                        (
                            k.with_ident_replaced(name, replacement),
                            v.with_ident_replaced(name, replacement),
                        )
                    })
                    .collect(),
            ),
            ExprKind::Lambda { params, body } => {
                if params.iter().any(|p| p.as_str() == name) {
                    // shadowed
                    ExprKind::Lambda {
                        params: params.clone(),
                        body: body.clone(),
                    }
                } else {
                    ExprKind::Lambda {
                        params: params.clone(),
                        body: sub(body),
                    }
                }
            }
            ExprKind::Call {
                callee,
                args,
                named,
            } => ExprKind::Call {
                callee: sub(callee),
                args: args
                    .iter()
                    .map(|e| e.with_ident_replaced(name, replacement))
                    .collect(),
                named: named
                    .iter()
                    .map(|(n, e)| (n.clone(), e.with_ident_replaced(name, replacement)))
                    .collect(),
            },
            ExprKind::BuiltIn {
                target,
                builtin,
                args,
            } => ExprKind::BuiltIn {
                target: sub(target),
                builtin: *builtin,
                args: args
                    .iter()
                    .map(|e| e.with_ident_replaced(name, replacement))
                    .collect(),
            },
        };
        Expr::new(kind, self.span)
    }

    /// Indexed parameter introspection: each child with its semantic role.
    pub fn params(&self) -> Vec<(ParamRole, String)> {
        match &self.kind {
            ExprKind::Literal(value) => vec![(ParamRole::Value, value.to_string())],
            ExprKind::Var(ident) => vec![(ParamRole::Name, ident.to_string())],
            ExprKind::Dot { base, key } => vec![
                (ParamRole::LeftHandOperand, base.to_string()),
                (ParamRole::Name, key.to_string()),
            ],
            ExprKind::Index { base, key } => vec![
                (ParamRole::LeftHandOperand, base.to_string()),
                (ParamRole::EnclosedOperand, key.to_string()),
            ],
            ExprKind::Arith { lhs, rhs, .. }
            | ExprKind::Compare { lhs, rhs, .. }
            | ExprKind::And { lhs, rhs }
            | ExprKind::Or { lhs, rhs } => vec![
                (ParamRole::LeftHandOperand, lhs.to_string()),
                (ParamRole::RightHandOperand, rhs.to_string()),
            ],
            ExprKind::Neg(inner)
            | ExprKind::Not(inner)
            | ExprKind::Exists(inner)
            | ExprKind::Paren(inner) => {
                vec![(ParamRole::EnclosedOperand, inner.to_string())]
            }
            ExprKind::Default { target, fallback } => {
                let mut out = vec![(ParamRole::LeftHandOperand, target.to_string())];
                if let Some(fb) = fallback {
                    out.push((ParamRole::RightHandOperand, fb.to_string()));
                }
                out
            }
            ExprKind::Range { start, limit } => {
                let mut out = vec![(ParamRole::LeftHandOperand, start.to_string())];
                match limit {
                    RangeLimitExpr::Inclusive(e)
                    | RangeLimitExpr::Exclusive(e)
                    | RangeLimitExpr::Length(e) => {
                        out.push((ParamRole::RightHandOperand, e.to_string()))
                    }
                    RangeLimitExpr::Unbounded => {}
                }
                out
            }
            ExprKind::SeqLit(items) => items
                .iter()
                .map(|e| (ParamRole::Item, e.to_string()))
                .collect(),
            ExprKind::HashLit(pairs) => pairs
                .iter()
                .flat_map(|(k, v)| {
                    [
                        (ParamRole::Key, k.to_string()),
                        (ParamRole::Value, v.to_string()),
                    ]
                })
                .collect(),
            ExprKind::Lambda { params, body } => params
                .iter()
                .map(|p| (ParamRole::Parameter, p.to_string()))
                .chain([(ParamRole::Content, body.to_string())])
                .collect(),
            ExprKind::Call {
                callee,
                args,
                named,
            } => [(ParamRole::Callee, callee.to_string())]
                .into_iter()
                .chain(args.iter().map(|e| (ParamRole::Argument, e.to_string())))
                .chain(
                    named
                        .iter()
                        .map(|(n, e)| (ParamRole::Argument, format!("{}={}", n, e))),
                )
                .collect(),
            ExprKind::BuiltIn { target, args, .. } => {
                [(ParamRole::LeftHandOperand, target.to_string())]
                    .into_iter()
                    .chain(args.iter().map(|e| (ParamRole::Argument, e.to_string())))
                    .collect()
            }
        }
    }
}

/// Canonical form, used when an error blames an expression.
impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(Value::String(s)) => write!(f, "{:?}", s),
            ExprKind::Literal(value) => write!(f, "{}", value),
            ExprKind::Var(ident) => write!(f, "{}", ident),
            ExprKind::Paren(inner) => write!(f, "({})", inner),
            ExprKind::Dot { base, key } => write!(f, "{}.{}", base, key),
            ExprKind::Index { base, key } => write!(f, "{}[{}]", base, key),
            ExprKind::Arith { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op.symbol(), rhs),
            ExprKind::Neg(inner) => write!(f, "-{}", inner),
            ExprKind::Compare { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op.canonical(), rhs),
            ExprKind::And { lhs, rhs } => write!(f, "{} && {}", lhs, rhs),
            ExprKind::Or { lhs, rhs } => write!(f, "{} || {}", lhs, rhs),
            ExprKind::Not(inner) => write!(f, "!{}", inner),
            ExprKind::Exists(inner) => write!(f, "{}??", inner),
            ExprKind::Default { target, fallback } => match fallback {
                Some(fb) => write!(f, "{}!{}", target, fb),
                None => write!(f, "{}!", target),
            },
            ExprKind::Range { start, limit } => match limit {
                RangeLimitExpr::Inclusive(end) => write!(f, "{}..{}", start, end),
                RangeLimitExpr::Exclusive(end) => write!(f, "{}..<{}", start, end),
                RangeLimitExpr::Length(n) => write!(f, "{}..*{}", start, n),
                RangeLimitExpr::Unbounded => write!(f, "{}..", start),
            },
            ExprKind::SeqLit(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            ExprKind::HashLit(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            ExprKind::Lambda { params, body } => {
                if params.len() == 1 {
                    write!(f, "{} -> {}", params[0], body)
                } else {
                    write!(f, "(")?;
                    for (i, p) in params.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", p)?;
                    }
                    write!(f, ") -> {}", body)
                }
            }
            ExprKind::Call {
                callee,
                args,
                named,
            } => {
                write!(f, "{}(", callee)?;
                let mut first = true;
                for arg in args {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "{}", arg)?;
                }
                for (name, arg) in named {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "{}={}", name, arg)?;
                }
                write!(f, ")")
            }
            ExprKind::BuiltIn {
                target,
                builtin,
                args,
            } => {
                write!(f, "{}?{}", target, builtin.name())?;
                if !args.is_empty() {
                    write!(f, "(")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
        }
    }
}

/// Semantic role tags for parameter introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamRole {
    LeftHandOperand,
    RightHandOperand,
    EnclosedOperand,
    Item,
    Key,
    Value,
    Name,
    Callee,
    Argument,
    Parameter,
    Content,
    Condition,
    Target,
}

/// Canonical comparison operator id. The spelling is normalized once, at AST
/// construction; an unrecognized spelling is an engine bug, not a template
/// error, because the parser only emits the fixed set below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CmpOp {
    /// Exact string-identity normalization over the recognized spellings.
    pub fn from_spelling(spelling: &str) -> Result<CmpOp> {
        Ok(match spelling {
            "==" | "=" => CmpOp::Eq,
            "!=" => CmpOp::Ne,
            "<" | "lt" | "\\lt" | "&lt;" => CmpOp::Lt,
            "<=" | "lte" | "\\lte" | "&lt;=" => CmpOp::Lte,
            ">" | "gt" | "\\gt" | "&gt;" => CmpOp::Gt,
            ">=" | "gte" | "\\gte" | "&gt;=" => CmpOp::Gte,
            other => crate::bail_bug!("unknown comparison operator spelling: {:?}", other),
        })
    }

    pub fn canonical(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
        }
    }
}

/// The closed set of built-in operations reachable with `?name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltInKind {
    Size,
    Length,
    UpperCase,
    LowerCase,
    CapFirst,
    Trim,
    Join,
    First,
    Last,
    Reverse,
    Sort,
    Map,
    Filter,
    SeqContains,
    Keys,
    Values,
    String,
    C,
    Truncate,
    Then,
    Switch,
    Default,
    HasContent,
    IfExists,
    NoEsc,
    Esc,
    Date,
    Time,
    Datetime,
}

impl BuiltInKind {
    pub fn from_name(name: &str) -> Option<BuiltInKind> {
        Some(match name {
            "size" => BuiltInKind::Size,
            "length" => BuiltInKind::Length,
            "upper_case" => BuiltInKind::UpperCase,
            "lower_case" => BuiltInKind::LowerCase,
            "cap_first" => BuiltInKind::CapFirst,
            "trim" => BuiltInKind::Trim,
            "join" => BuiltInKind::Join,
            "first" => BuiltInKind::First,
            "last" => BuiltInKind::Last,
            "reverse" => BuiltInKind::Reverse,
            "sort" => BuiltInKind::Sort,
            "map" => BuiltInKind::Map,
            "filter" => BuiltInKind::Filter,
            "seq_contains" => BuiltInKind::SeqContains,
            "keys" => BuiltInKind::Keys,
            "values" => BuiltInKind::Values,
            "string" => BuiltInKind::String,
            "c" => BuiltInKind::C,
            "truncate" => BuiltInKind::Truncate,
            "then" => BuiltInKind::Then,
            "switch" => BuiltInKind::Switch,
            "default" => BuiltInKind::Default,
            "has_content" => BuiltInKind::HasContent,
            "if_exists" => BuiltInKind::IfExists,
            "no_esc" => BuiltInKind::NoEsc,
            "esc" => BuiltInKind::Esc,
            "date" => BuiltInKind::Date,
            "time" => BuiltInKind::Time,
            "datetime" => BuiltInKind::Datetime,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            BuiltInKind::Size => "size",
            BuiltInKind::Length => "length",
            BuiltInKind::UpperCase => "upper_case",
            BuiltInKind::LowerCase => "lower_case",
            BuiltInKind::CapFirst => "cap_first",
            BuiltInKind::Trim => "trim",
            BuiltInKind::Join => "join",
            BuiltInKind::First => "first",
            BuiltInKind::Last => "last",
            BuiltInKind::Reverse => "reverse",
            BuiltInKind::Sort => "sort",
            BuiltInKind::Map => "map",
            BuiltInKind::Filter => "filter",
            BuiltInKind::SeqContains => "seq_contains",
            BuiltInKind::Keys => "keys",
            BuiltInKind::Values => "values",
            BuiltInKind::String => "string",
            BuiltInKind::C => "c",
            BuiltInKind::Truncate => "truncate",
            BuiltInKind::Then => "then",
            BuiltInKind::Switch => "switch",
            BuiltInKind::Default => "default",
            BuiltInKind::HasContent => "has_content",
            BuiltInKind::IfExists => "if_exists",
            BuiltInKind::NoEsc => "no_esc",
            BuiltInKind::Esc => "esc",
            BuiltInKind::Date => "date",
            BuiltInKind::Time => "time",
            BuiltInKind::Datetime => "datetime",
        }
    }

    /// Lazy built-ins receive their argument expressions unevaluated, bound
    /// at parse time.
    pub fn is_lazy(self) -> bool {
        matches!(
            self,
            BuiltInKind::Then
                | BuiltInKind::Switch
                | BuiltInKind::Default
                | BuiltInKind::HasContent
                | BuiltInKind::IfExists
        )
    }
}
