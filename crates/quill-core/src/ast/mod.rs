//! The immutable AST the parser hands the evaluator.
//!
//! Node categories are closed enums ([`ExprKind`], [`StmtKind`]) with one
//! dispatch function per operation on the evaluator side, so exhaustiveness is
//! compiler-checked. Node trees are owned by their compiled template and
//! shared read-only across concurrent evaluations.

mod expr;
mod stmt;

pub use expr::{BuiltInKind, CmpOp, Expr, ExprKind, Ident, ParamRole, RangeLimitExpr};
pub use stmt::{
    Assign, AssignScope, CallableDef, IfArm, MacroParam, Stmt, StmtKind, SwitchCase,
};
