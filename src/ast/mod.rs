//! Abstract syntax tree for the source language.

pub mod expr;
pub mod stmt;

pub use expr::{BinaryOp, Expr, ExprKind, TableField, UnaryOp};
pub use stmt::{Block, FunctionBody, FunctionTarget, IfArm, Stmt, StmtKind};
