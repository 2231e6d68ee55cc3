//! Statement parsing: declarations, control flow, assignment.

use crate::ast::*;
use crate::lexer::TokenKind;

use super::core::{ParseResult, Parser};

impl Parser {
    pub(crate) fn statement(&mut self) -> ParseResult<Stmt> {
        if self.check(&TokenKind::Local) {
            self.local_statement()
        } else if self.check(&TokenKind::Function) {
            self.function_statement()
        } else if self.check(&TokenKind::If) {
            self.if_statement()
        } else if self.check(&TokenKind::While) {
            self.while_statement()
        } else if self.check(&TokenKind::For) {
            self.for_statement()
        } else if self.check(&TokenKind::Repeat) {
            self.repeat_statement()
        } else if self.check(&TokenKind::Do) {
            self.do_statement()
        } else if self.check(&TokenKind::Return) {
            self.return_statement()
        } else if self.check(&TokenKind::Break) {
            let span = self.current_span();
            self.advance();
            Ok(Stmt::new(StmtKind::Break, span))
        } else {
            self.expression_or_assignment()
        }
    }

    /// local a, b = e1, e2  |  local function f(...) ... end
    fn local_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Local)?;

        if self.match_token(&TokenKind::Function) {
            let name = self.expect_identifier()?;
            let body = self.function_body(false)?;
            let span = start_span.merge(&self.previous_span());
            return Ok(Stmt::new(StmtKind::LocalFunction { name, body }, span));
        }

        let mut names = vec![self.expect_identifier()?];
        while self.match_token(&TokenKind::Comma) {
            names.push(self.expect_identifier()?);
        }

        let mut values = Vec::new();
        if self.match_token(&TokenKind::Equal) {
            values.push(self.expression()?);
            while self.match_token(&TokenKind::Comma) {
                values.push(self.expression()?);
            }
        }

        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(StmtKind::Local { names, values }, span))
    }

    /// function name(...) / function t.a.b(...) / function t:m(...)
    fn function_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Function)?;

        let base = self.expect_identifier()?;
        let mut path = Vec::new();
        let mut is_method = false;
        while self.match_token(&TokenKind::Dot) {
            path.push(self.expect_identifier()?);
        }
        if self.match_token(&TokenKind::Colon) {
            path.push(self.expect_identifier()?);
            is_method = true;
        }

        let body = self.function_body(is_method)?;
        let span = start_span.merge(&self.previous_span());

        Ok(Stmt::new(
            StmtKind::Function {
                target: FunctionTarget {
                    base,
                    path,
                    is_method,
                },
                body,
            },
            span,
        ))
    }

    /// Shared parameter-list-and-body parsing for every function form.
    /// `is_method` prepends the implicit `self` parameter.
    pub(crate) fn function_body(&mut self, is_method: bool) -> ParseResult<FunctionBody> {
        let start_span = self.current_span();
        self.expect(&TokenKind::LeftParen)?;

        let mut params = Vec::new();
        if is_method {
            params.push("self".to_string());
        }
        let mut is_vararg = false;

        if !self.check(&TokenKind::RightParen) {
            loop {
                if self.match_token(&TokenKind::Ellipsis) {
                    // The variadic marker must close the list
                    is_vararg = true;
                    break;
                }
                params.push(self.expect_identifier()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen)?;

        let body = self.block()?;
        self.expect(&TokenKind::End)?;

        Ok(FunctionBody {
            params,
            is_vararg,
            body,
            span: start_span.merge(&self.previous_span()),
        })
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::If)?;

        let mut arms = Vec::new();

        let condition = self.expression()?;
        self.expect(&TokenKind::Then)?;
        let body = self.block()?;
        arms.push(IfArm { condition, body });

        // Every elseif is its own arm; all arms join at one point after
        // the chain.
        while self.match_token(&TokenKind::Elseif) {
            let condition = self.expression()?;
            self.expect(&TokenKind::Then)?;
            let body = self.block()?;
            arms.push(IfArm { condition, body });
        }

        let else_body = if self.match_token(&TokenKind::Else) {
            Some(self.block()?)
        } else {
            None
        };

        self.expect(&TokenKind::End)?;
        let span = start_span.merge(&self.previous_span());

        Ok(Stmt::new(StmtKind::If { arms, else_body }, span))
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::While)?;

        let condition = self.expression()?;
        self.expect(&TokenKind::Do)?;
        let body = self.block()?;
        self.expect(&TokenKind::End)?;

        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(StmtKind::While { condition, body }, span))
    }

    /// Numeric (`for i = a, b [, c]`) or generic (`for a, b in exprs`).
    fn for_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::For)?;

        let first = self.expect_identifier()?;

        if self.match_token(&TokenKind::Equal) {
            let start = self.expression()?;
            self.expect(&TokenKind::Comma)?;
            let limit = self.expression()?;
            let step = if self.match_token(&TokenKind::Comma) {
                Some(self.expression()?)
            } else {
                None
            };

            self.expect(&TokenKind::Do)?;
            let body = self.block()?;
            self.expect(&TokenKind::End)?;

            let span = start_span.merge(&self.previous_span());
            return Ok(Stmt::new(
                StmtKind::NumericFor {
                    variable: first,
                    start,
                    limit,
                    step,
                    body,
                },
                span,
            ));
        }

        let mut variables = vec![first];
        while self.match_token(&TokenKind::Comma) {
            variables.push(self.expect_identifier()?);
        }
        self.expect(&TokenKind::In)?;

        let mut exprs = vec![self.expression()?];
        while self.match_token(&TokenKind::Comma) {
            exprs.push(self.expression()?);
        }

        self.expect(&TokenKind::Do)?;
        let body = self.block()?;
        self.expect(&TokenKind::End)?;

        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(
            StmtKind::GenericFor {
                variables,
                exprs,
                body,
            },
            span,
        ))
    }

    fn repeat_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Repeat)?;

        let body = self.block()?;
        self.expect(&TokenKind::Until)?;
        let condition = self.expression()?;

        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(StmtKind::Repeat { body, condition }, span))
    }

    fn do_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Do)?;

        let body = self.block()?;
        self.expect(&TokenKind::End)?;

        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(StmtKind::Do(body), span))
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Return)?;

        let mut values = Vec::new();
        if !self.is_block_end() && !self.check(&TokenKind::Semicolon) {
            values.push(self.expression()?);
            while self.match_token(&TokenKind::Comma) {
                values.push(self.expression()?);
            }
        }

        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(StmtKind::Return(values), span))
    }

    /// A statement starting with an expression: either a multi-target
    /// assignment or a bare expression evaluated for effect.
    fn expression_or_assignment(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        let first = self.expression()?;

        if self.check(&TokenKind::Equal) || self.check(&TokenKind::Comma) {
            let mut targets = vec![first];
            while self.match_token(&TokenKind::Comma) {
                targets.push(self.expression()?);
            }
            self.expect(&TokenKind::Equal)?;

            for target in &targets {
                self.check_assignment_target(target)?;
            }

            let mut values = vec![self.expression()?];
            while self.match_token(&TokenKind::Comma) {
                values.push(self.expression()?);
            }

            let span = start_span.merge(&self.previous_span());
            return Ok(Stmt::new(StmtKind::Assign { targets, values }, span));
        }

        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(StmtKind::Expression(first), span))
    }

    fn check_assignment_target(&self, target: &Expr) -> ParseResult<()> {
        match target.kind {
            ExprKind::Variable(_) | ExprKind::Member { .. } | ExprKind::Index { .. } => Ok(()),
            _ => Err(crate::error::ParserError::unexpected_token(
                "assignable expression",
                "expression",
                target.span,
            )),
        }
    }
}
