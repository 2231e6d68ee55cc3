//! Error types for all pipeline stages.

use crate::span::Span;
use thiserror::Error;

/// Lexer errors.
#[derive(Debug, Error)]
pub enum LexerError {
    #[error("Unterminated string at {0}")]
    UnterminatedString(Span),

    #[error("Invalid number '{0}' at {1}")]
    InvalidNumber(String, Span),

    #[error("Unexpected character '{0}' at {1}")]
    UnexpectedChar(char, Span),
}

impl LexerError {
    pub fn unterminated_string(span: Span) -> Self {
        Self::UnterminatedString(span)
    }

    pub fn invalid_number(s: String, span: Span) -> Self {
        Self::InvalidNumber(s, span)
    }

    pub fn unexpected_char(c: char, span: Span) -> Self {
        Self::UnexpectedChar(c, span)
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnterminatedString(span) => *span,
            Self::InvalidNumber(_, span) => *span,
            Self::UnexpectedChar(_, span) => *span,
        }
    }
}

/// Parser errors.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("Unexpected token '{found}', expected {expected} at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("Unexpected end of input at {0}")]
    UnexpectedEof(Span),
}

impl ParserError {
    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn unexpected_eof(span: Span) -> Self {
        Self::UnexpectedEof(span)
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. } => *span,
            Self::UnexpectedEof(span) => *span,
        }
    }
}

/// Bytecode compilation errors.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("'break' outside a loop at {0}")]
    BreakOutsideLoop(Span),

    #[error("Too many constants in one chunk at {0}")]
    TooManyConstants(Span),

    #[error("Unsupported construct: {what} at {span}")]
    UnsupportedConstruct { what: String, span: Span },
}

impl CompileError {
    pub fn unsupported(what: impl Into<String>, span: Span) -> Self {
        Self::UnsupportedConstruct {
            what: what.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::BreakOutsideLoop(span) => *span,
            Self::TooManyConstants(span) => *span,
            Self::UnsupportedConstruct { span, .. } => *span,
        }
    }
}

/// Runtime errors raised by the virtual machine.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Type mismatch: {message}")]
    TypeMismatch { message: String },

    #[error("Attempt to call a {type_name} value")]
    CallOfNonFunction { type_name: &'static str },

    #[error("{what} index {index} out of range")]
    IndexOutOfRange { what: &'static str, index: usize },

    #[error("'for' step is zero")]
    InvalidForRange,

    #[error("Stack overflow")]
    StackOverflow,
}

impl RuntimeError {
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            message: message.into(),
        }
    }

    pub fn not_callable(type_name: &'static str) -> Self {
        Self::CallOfNonFunction { type_name }
    }

    pub fn out_of_range(what: &'static str, index: usize) -> Self {
        Self::IndexOutOfRange { what, index }
    }
}

/// Chunk encoder/decoder errors.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Key 0 is a no-op and is rejected")]
    ZeroKey,

    #[error("Ciphertext truncated at byte {0}")]
    Truncated(usize),

    #[error("Unknown tag byte {0:#04x}")]
    BadTag(u8),

    #[error("Malformed artifact: {0}")]
    BadArtifact(String),
}

/// A unified error type for all stages.
#[derive(Debug, Error)]
pub enum LuacloakError {
    #[error("Lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("Parser error: {0}")]
    Parser(#[from] ParserError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),
}
