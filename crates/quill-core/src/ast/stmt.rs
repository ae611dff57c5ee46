use std::sync::Arc;

use super::expr::{Expr, Ident, ParamRole};
use crate::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn text(text: impl Into<Arc<str>>) -> Self {
        Self::new(StmtKind::Text(text.into()), Span::synthetic())
    }

    pub fn interpolation(expr: Expr) -> Self {
        Self::new(StmtKind::Interpolation(expr), Span::synthetic())
    }

    /// Indexed parameter introspection, mirroring the expression side.
    pub fn params(&self) -> Vec<(ParamRole, String)> {
        match &self.kind {
            StmtKind::Text(text) => vec![(ParamRole::Content, text.to_string())],
            StmtKind::Interpolation(expr) => vec![(ParamRole::EnclosedOperand, expr.to_string())],
            StmtKind::IfChain(arms) => arms
                .iter()
                .filter_map(|arm| arm.condition.as_ref())
                .map(|c| (ParamRole::Condition, c.to_string()))
                .collect(),
            StmtKind::Assign(assign) => vec![
                (ParamRole::Target, assign.target.to_string()),
                (ParamRole::Value, assign.value.to_string()),
            ],
            StmtKind::BlockAssign { target, .. } => {
                vec![(ParamRole::Target, target.to_string())]
            }
            StmtKind::Switch { subject, cases, .. } => {
                [(ParamRole::EnclosedOperand, subject.to_string())]
                    .into_iter()
                    .chain(
                        cases
                            .iter()
                            .map(|c| (ParamRole::Condition, c.condition.to_string())),
                    )
                    .collect()
            }
            StmtKind::List { seq, item, .. } => vec![
                (ParamRole::EnclosedOperand, seq.to_string()),
                (ParamRole::Parameter, item.to_string()),
            ],
            StmtKind::Break | StmtKind::Continue | StmtKind::Stop => vec![],
            StmtKind::Return(expr) => expr
                .iter()
                .map(|e| (ParamRole::Value, e.to_string()))
                .collect(),
            StmtKind::Include { name, .. } => vec![(ParamRole::Name, name.to_string())],
            StmtKind::Import { name, alias } => vec![
                (ParamRole::Name, name.to_string()),
                (ParamRole::Target, alias.to_string()),
            ],
            StmtKind::MacroDef(def) => vec![(ParamRole::Name, def.name.to_string())],
            StmtKind::Call {
                callee,
                positional,
                named,
                ..
            } => [(ParamRole::Callee, callee.to_string())]
                .into_iter()
                .chain(
                    positional
                        .iter()
                        .map(|e| (ParamRole::Argument, e.to_string())),
                )
                .chain(
                    named
                        .iter()
                        .map(|(n, e)| (ParamRole::Argument, format!("{}={}", n, e))),
                )
                .collect(),
            StmtKind::NestedBody(args) => args
                .iter()
                .map(|e| (ParamRole::Argument, e.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Literal template output.
    Text(Arc<str>),
    /// `${expr}`
    Interpolation(Expr),
    /// `if`/`elseif`/`else`: first arm whose condition holds wins; a `None`
    /// condition is `else` and always holds.
    IfChain(Vec<IfArm>),
    Assign(Assign),
    /// Capture the block's output into a string variable, routed to the same
    /// scope rules as a plain assignment.
    BlockAssign {
        target: Ident,
        scope: AssignScope,
        namespace: Option<Expr>,
        body: Vec<Stmt>,
    },
    /// Statement-level switch: once a case matches, all following cases run
    /// unconditionally until a break.
    Switch {
        subject: Expr,
        cases: Vec<SwitchCase>,
        default: Option<Vec<Stmt>>,
    },
    List {
        seq: Expr,
        item: Ident,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    /// Abort the whole template normally.
    Stop,
    /// Return from a macro or function, optionally with a value.
    Return(Option<Expr>),
    Include {
        name: Expr,
        ignore_missing: bool,
    },
    Import {
        name: Expr,
        alias: Ident,
    },
    MacroDef(Arc<CallableDef>),
    /// `<@callee args; loop_vars>body</@>`
    Call {
        callee: Expr,
        positional: Vec<Expr>,
        named: Vec<(Ident, Expr)>,
        loop_vars: Vec<Ident>,
        body: Vec<Stmt>,
    },
    /// `<#nested args>` inside a macro body.
    NestedBody(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfArm {
    pub condition: Option<Expr>,
    pub block: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub target: Ident,
    pub scope: AssignScope,
    /// Explicit target namespace; must evaluate to a namespace value.
    pub namespace: Option<Expr>,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignScope {
    /// Local frame of the enclosing macro/function call.
    Local,
    /// The namespace the assignment executes in.
    Current,
    /// The shared global namespace.
    Global,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub condition: Expr,
    pub block: Vec<Stmt>,
}

/// Parse-time immutable description of a macro or function. The same
/// definition can be reached through several namespaces; pairing it with one
/// produces a bound callable (see the value model).
#[derive(Debug, Clone, PartialEq)]
pub struct CallableDef {
    pub name: Arc<str>,
    pub params: Vec<MacroParam>,
    /// Name of the parameter that swallows arguments not matching any
    /// declared parameter.
    pub catch_all: Option<Ident>,
    pub is_function: bool,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroParam {
    pub name: Ident,
    /// Default expression, evaluated in the callee's environment at call
    /// time. Defaults may reference other parameters.
    pub default: Option<Expr>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExprKind;
    use crate::value::Value;

    #[test]
    fn if_chain_params_list_conditions_only() {
        let stmt = Stmt::new(
            StmtKind::IfChain(vec![
                IfArm {
                    condition: Some(Expr::var("a")),
                    block: vec![],
                },
                IfArm {
                    condition: None,
                    block: vec![],
                },
            ]),
            Span::synthetic(),
        );
        assert_eq!(stmt.params(), vec![(ParamRole::Condition, "a".to_string())]);
    }

    #[test]
    fn call_params_name_callee_and_arguments() {
        let stmt = Stmt::new(
            StmtKind::Call {
                callee: Expr::var("greet"),
                positional: vec![Expr::lit(Value::int(1))],
                named: vec![(Ident::new("who"), Expr::var("user"))],
                loop_vars: vec![],
                body: vec![],
            },
            Span::synthetic(),
        );
        let params = stmt.params();
        assert_eq!(params[0], (ParamRole::Callee, "greet".to_string()));
        assert_eq!(params[2], (ParamRole::Argument, "who=user".to_string()));
    }

    #[test]
    fn callable_defs_compare_structurally() {
        let def = CallableDef {
            name: Arc::from("m"),
            params: vec![MacroParam {
                name: Ident::new("x"),
                default: Some(Expr::new(ExprKind::Literal(Value::int(1)), Span::synthetic())),
            }],
            catch_all: None,
            is_function: false,
            body: vec![Stmt::text("hi")],
        };
        assert_eq!(def, def.clone());
    }
}
