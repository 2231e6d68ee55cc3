//! Core parser struct and helper methods.

use crate::ast::Block;
use crate::error::ParserError;
use crate::lexer::{Token, TokenKind};
use crate::span::Span;

pub type ParseResult<T> = Result<T, ParserError>;

/// Recursive-descent parser over the scanner's token stream.
pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    /// Parse a complete script into its top-level block.
    pub fn parse(&mut self) -> ParseResult<Block> {
        let block = self.block()?;
        if !self.is_at_end() {
            return Err(ParserError::unexpected_token(
                "a statement",
                format!("{}", self.peek().kind),
                self.current_span(),
            ));
        }
        Ok(block)
    }

    /// Parse statements until a block-ending keyword or end of input.
    /// The terminator is left for the caller to consume.
    pub(crate) fn block(&mut self) -> ParseResult<Block> {
        let mut statements = Vec::new();

        loop {
            // `;` is an empty statement
            while self.match_token(&TokenKind::Semicolon) {}

            if self.is_block_end() {
                break;
            }
            statements.push(self.statement()?);
        }

        Ok(Block::new(statements))
    }

    pub(crate) fn is_block_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::End
                | TokenKind::Else
                | TokenKind::Elseif
                | TokenKind::Until
                | TokenKind::Eof
        )
    }

    // ===== Token manipulation =====

    pub(crate) fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.tokens[self.current - 1].clone()
    }

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    pub(crate) fn peek_nth(&self, n: usize) -> &Token {
        let index = if self.current + n < self.tokens.len() {
            self.current + n
        } else {
            self.tokens.len() - 1
        };
        &self.tokens[index]
    }

    pub(crate) fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        if self.is_at_end() {
            false
        } else {
            std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
        }
    }

    pub(crate) fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else if self.is_at_end() {
            Err(ParserError::unexpected_eof(self.current_span()))
        } else {
            Err(ParserError::unexpected_token(
                format!("'{}'", kind),
                format!("{}", self.peek().kind),
                self.current_span(),
            ))
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> ParseResult<String> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            TokenKind::Eof => Err(ParserError::unexpected_eof(self.current_span())),
            _ => Err(ParserError::unexpected_token(
                "identifier",
                format!("{}", self.peek().kind),
                self.current_span(),
            )),
        }
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    pub(crate) fn previous_span(&self) -> Span {
        self.previous().span
    }

    pub(crate) fn error_here<T>(&self, expected: &str) -> ParseResult<T> {
        if self.is_at_end() {
            Err(ParserError::unexpected_eof(self.current_span()))
        } else {
            Err(ParserError::unexpected_token(
                expected,
                format!("{}", self.peek().kind),
                self.current_span(),
            ))
        }
    }
}
