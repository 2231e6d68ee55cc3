//! Expression AST nodes.

use crate::ast::stmt::FunctionBody;
use crate::span::Span;

/// An expression in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// All expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Number literal: 42, 3.14, 0xff
    NumberLiteral(f64),
    /// String literal: "hello"
    StringLiteral(String),
    /// Boolean literal: true, false
    BoolLiteral(bool),
    /// nil literal
    Nil,
    /// Vararg marker in value position: ...
    Vararg,

    /// Variable reference: foo
    Variable(String),

    /// Binary operation: a + b
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
    },

    /// Unary operation: -x, not x, #t
    Unary {
        operator: UnaryOp,
        operand: Box<Expr>,
    },

    /// Function call: f(a, b)
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
    },

    /// Method call: obj:name(a, b)
    MethodCall {
        object: Box<Expr>,
        method: String,
        arguments: Vec<Expr>,
    },

    /// Member access: obj.field
    Member { object: Box<Expr>, name: String },

    /// Index access: t[k]
    Index { object: Box<Expr>, index: Box<Expr> },

    /// Table constructor: { 1, k = v, [e] = v }
    Table(Vec<TableField>),

    /// Function literal: function(a, b) ... end
    Function(FunctionBody),
}

/// One field of a table constructor.
#[derive(Debug, Clone, PartialEq)]
pub enum TableField {
    /// Positional field, auto-indexed 1..n
    Positional(Expr),
    /// Named field: key = value
    Named(String, Expr),
    /// Computed field: [key] = value
    Computed(Expr, Expr),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    FloorDivide,
    Modulo,
    Power,
    Concat,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Subtract => write!(f, "-"),
            BinaryOp::Multiply => write!(f, "*"),
            BinaryOp::Divide => write!(f, "/"),
            BinaryOp::FloorDivide => write!(f, "//"),
            BinaryOp::Modulo => write!(f, "%"),
            BinaryOp::Power => write!(f, "^"),
            BinaryOp::Concat => write!(f, ".."),
            BinaryOp::Equal => write!(f, "=="),
            BinaryOp::NotEqual => write!(f, "~="),
            BinaryOp::Less => write!(f, "<"),
            BinaryOp::LessEqual => write!(f, "<="),
            BinaryOp::Greater => write!(f, ">"),
            BinaryOp::GreaterEqual => write!(f, ">="),
            BinaryOp::And => write!(f, "and"),
            BinaryOp::Or => write!(f, "or"),
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
    Length,
}

impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOp::Negate => write!(f, "-"),
            UnaryOp::Not => write!(f, "not"),
            UnaryOp::Length => write!(f, "#"),
        }
    }
}
