//! Expression parsing with explicit precedence climbing.
//!
//! Binding tightness, loosest first: `or`, `and`, comparison, `..`
//! (right-associative), `+ -`, `* / // %`, unary `not - #`, `^`
//! (right-associative), then postfix call/member/index forms.

use crate::ast::*;
use crate::lexer::TokenKind;

use super::core::{ParseResult, Parser};

impl Parser {
    pub(crate) fn expression(&mut self) -> ParseResult<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.and_expr()?;
        while self.match_token(&TokenKind::Or) {
            let right = self.and_expr()?;
            left = binary(left, BinaryOp::Or, right);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.comparison_expr()?;
        while self.match_token(&TokenKind::And) {
            let right = self.comparison_expr()?;
            left = binary(left, BinaryOp::And, right);
        }
        Ok(left)
    }

    fn comparison_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.concat_expr()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqualEqual => BinaryOp::Equal,
                TokenKind::NotEqual => BinaryOp::NotEqual,
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                _ => break,
            };
            self.advance();
            let right = self.concat_expr()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn concat_expr(&mut self) -> ParseResult<Expr> {
        let left = self.additive_expr()?;
        if self.match_token(&TokenKind::Concat) {
            // Right-associative
            let right = self.concat_expr()?;
            return Ok(binary(left, BinaryOp::Concat, right));
        }
        Ok(left)
    }

    fn additive_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.multiplicative_expr()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.multiplicative_expr()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn multiplicative_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.unary_expr()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                TokenKind::DoubleSlash => BinaryOp::FloorDivide,
                TokenKind::Percent => BinaryOp::Modulo,
                _ => break,
            };
            self.advance();
            let right = self.unary_expr()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn unary_expr(&mut self) -> ParseResult<Expr> {
        let op = match self.peek().kind {
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Negate),
            TokenKind::Hash => Some(UnaryOp::Length),
            _ => None,
        };
        if let Some(operator) = op {
            let start_span = self.current_span();
            self.advance();
            let operand = self.unary_expr()?;
            let span = start_span.merge(&operand.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    operator,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.power_expr()
    }

    fn power_expr(&mut self) -> ParseResult<Expr> {
        let left = self.postfix_expr()?;
        if self.match_token(&TokenKind::Caret) {
            // Right-associative; the exponent may carry unary operators
            // (2^-3 parses, and -2^2 is -(2^2)).
            let right = self.unary_expr()?;
            return Ok(binary(left, BinaryOp::Power, right));
        }
        Ok(left)
    }

    /// Postfix chain: calls, method calls, member and index access, plus
    /// the `f"str"` and `f{...}` single-argument call sugar.
    fn postfix_expr(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary_expr()?;

        loop {
            if self.match_token(&TokenKind::LeftParen) {
                let arguments = self.call_arguments()?;
                let span = expr.span.merge(&self.previous_span());
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        arguments,
                    },
                    span,
                );
            } else if self.match_token(&TokenKind::Colon) {
                let method = self.expect_identifier()?;
                let arguments = self.method_arguments()?;
                let span = expr.span.merge(&self.previous_span());
                expr = Expr::new(
                    ExprKind::MethodCall {
                        object: Box::new(expr),
                        method,
                        arguments,
                    },
                    span,
                );
            } else if self.match_token(&TokenKind::Dot) {
                let name = self.expect_identifier()?;
                let span = expr.span.merge(&self.previous_span());
                expr = Expr::new(
                    ExprKind::Member {
                        object: Box::new(expr),
                        name,
                    },
                    span,
                );
            } else if self.match_token(&TokenKind::LeftBracket) {
                let index = self.expression()?;
                self.expect(&TokenKind::RightBracket)?;
                let span = expr.span.merge(&self.previous_span());
                expr = Expr::new(
                    ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else if let TokenKind::StringLiteral(s) = &self.peek().kind {
                // f"str" call sugar
                let arg = Expr::new(ExprKind::StringLiteral(s.clone()), self.current_span());
                self.advance();
                let span = expr.span.merge(&self.previous_span());
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        arguments: vec![arg],
                    },
                    span,
                );
            } else if self.check(&TokenKind::LeftBrace) {
                // f{...} call sugar
                let arg = self.table_constructor()?;
                let span = expr.span.merge(&self.previous_span());
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        arguments: vec![arg],
                    },
                    span,
                );
            } else {
                break;
            }
        }

        Ok(expr)
    }

    /// Arguments after an already-consumed `(`.
    fn call_arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut arguments = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            arguments.push(self.expression()?);
            while self.match_token(&TokenKind::Comma) {
                arguments.push(self.expression()?);
            }
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(arguments)
    }

    /// Method call arguments: parenthesized list or the string/table sugar.
    fn method_arguments(&mut self) -> ParseResult<Vec<Expr>> {
        if self.match_token(&TokenKind::LeftParen) {
            return self.call_arguments();
        }
        if let TokenKind::StringLiteral(s) = &self.peek().kind {
            let arg = Expr::new(ExprKind::StringLiteral(s.clone()), self.current_span());
            self.advance();
            return Ok(vec![arg]);
        }
        if self.check(&TokenKind::LeftBrace) {
            return Ok(vec![self.table_constructor()?]);
        }
        self.error_here("'(' after method name")
    }

    fn primary_expr(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();

        match &self.peek().kind {
            TokenKind::NumberLiteral(n) => {
                let n = *n;
                self.advance();
                Ok(Expr::new(ExprKind::NumberLiteral(n), span))
            }
            TokenKind::StringLiteral(s) => {
                let s = s.clone();
                self.advance();
                Ok(Expr::new(ExprKind::StringLiteral(s), span))
            }
            TokenKind::BoolLiteral(b) => {
                let b = *b;
                self.advance();
                Ok(Expr::new(ExprKind::BoolLiteral(b), span))
            }
            TokenKind::Nil => {
                self.advance();
                Ok(Expr::new(ExprKind::Nil, span))
            }
            TokenKind::Ellipsis => {
                self.advance();
                Ok(Expr::new(ExprKind::Vararg, span))
            }
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(Expr::new(ExprKind::Variable(name), span))
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(&TokenKind::RightParen)?;
                Ok(inner)
            }
            TokenKind::LeftBrace => self.table_constructor(),
            TokenKind::Function => {
                self.advance();
                let body = self.function_body(false)?;
                let span = span.merge(&self.previous_span());
                Ok(Expr::new(ExprKind::Function(body), span))
            }
            _ => self.error_here("an expression"),
        }
    }

    /// `{ e, k = v, [e1] = e2, ... }` with `,` or `;` separators.
    pub(crate) fn table_constructor(&mut self) -> ParseResult<Expr> {
        let start_span = self.current_span();
        self.expect(&TokenKind::LeftBrace)?;

        let mut fields = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            if self.match_token(&TokenKind::LeftBracket) {
                let key = self.expression()?;
                self.expect(&TokenKind::RightBracket)?;
                self.expect(&TokenKind::Equal)?;
                let value = self.expression()?;
                fields.push(TableField::Computed(key, value));
            } else if matches!(self.peek().kind, TokenKind::Identifier(_))
                && self.peek_nth(1).kind == TokenKind::Equal
            {
                let key = self.expect_identifier()?;
                self.expect(&TokenKind::Equal)?;
                let value = self.expression()?;
                fields.push(TableField::Named(key, value));
            } else {
                fields.push(TableField::Positional(self.expression()?));
            }

            if !self.match_token(&TokenKind::Comma) && !self.match_token(&TokenKind::Semicolon) {
                break;
            }
        }
        self.expect(&TokenKind::RightBrace)?;

        let span = start_span.merge(&self.previous_span());
        Ok(Expr::new(ExprKind::Table(fields), span))
    }
}

fn binary(left: Expr, operator: BinaryOp, right: Expr) -> Expr {
    let span = left.span.merge(&right.span);
    Expr::new(
        ExprKind::Binary {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        },
        span,
    )
}
