//! Single-pass bytecode compiler: AST → chunk.

use crate::ast::{
    BinaryOp, Block, Expr, ExprKind, FunctionBody, Stmt, StmtKind, TableField, UnaryOp,
};
use crate::bytecode::chunk::{Chunk, Constant};
use crate::bytecode::instruction::Instr;
use crate::error::CompileError;
use crate::span::Span;

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Compile a parsed block into the chunk for its function body.
///
/// Nested function literals recurse into fresh compiler instances; the
/// enclosing compiler only sees them to emit a CLOSURE instruction, so
/// nothing is shared between instruction streams.
pub fn compile(block: &Block) -> CompileResult<Chunk> {
    let mut compiler = Compiler::new(&[], true);
    compiler.compile_block_scoped(block)?;
    Ok(compiler.finish())
}

/// Compiler context for one function body.
struct Compiler {
    chunk: Chunk,
    /// Scope stack of name→slot bindings, innermost last.
    scopes: Vec<Vec<(String, u16)>>,
    /// Next free local slot. Slots are never reused after a scope
    /// exits, so indices stay stable for the whole chunk.
    next_slot: u16,
    /// Pending break jumps per enclosing loop, innermost last.
    loops: Vec<LoopContext>,
}

/// Backpatch bookkeeping for one loop under compilation.
#[derive(Default)]
struct LoopContext {
    break_jumps: Vec<usize>,
}

impl Compiler {
    fn new(params: &[String], top_level: bool) -> Self {
        let mut compiler = Self {
            chunk: Chunk::new(),
            scopes: vec![Vec::new()],
            next_slot: 0,
            loops: Vec::new(),
        };
        for param in params {
            compiler.declare_local(param.clone());
        }
        compiler.chunk.num_params = params.len() as u8;
        compiler.chunk.is_vararg = top_level;
        compiler
    }

    fn finish(mut self) -> Chunk {
        // Implicit empty return for bodies that fall off the end
        self.emit(Instr::Return(0));
        self.chunk.num_locals = self.next_slot;
        self.chunk
    }

    /// Compile a nested function literal into its own chunk.
    fn compile_function(&mut self, body: &FunctionBody) -> CompileResult<Chunk> {
        let mut nested = Compiler::new(&body.params, false);
        nested.chunk.is_vararg = body.is_vararg;
        nested.compile_block_scoped(&body.body)?;
        Ok(nested.finish())
    }

    // ===== Statements =====

    fn compile_block_scoped(&mut self, block: &Block) -> CompileResult<()> {
        self.begin_scope();
        for stmt in &block.statements {
            self.compile_statement(stmt)?;
        }
        self.end_scope();
        Ok(())
    }

    fn compile_statement(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(Instr::Pop);
            }

            StmtKind::Local { names, values } => {
                // Values are evaluated before any name is bound, so
                // `local x = x` reads the outer binding.
                self.compile_value_list(values, names.len())?;

                let slots: Vec<u16> = names
                    .iter()
                    .map(|name| self.declare_local(name.clone()))
                    .collect();
                for slot in slots.into_iter().rev() {
                    self.emit(Instr::SetLocal(slot));
                }
            }

            StmtKind::Assign { targets, values } => {
                self.compile_assignment(targets, values, stmt.span)?;
            }

            StmtKind::If { arms, else_body } => {
                let mut exit_jumps = Vec::new();

                for (i, arm) in arms.iter().enumerate() {
                    self.compile_expression(&arm.condition)?;
                    let skip = self.emit(Instr::JmpIfFalse(u32::MAX));

                    self.compile_block_scoped(&arm.body)?;

                    let is_last_arm = i + 1 == arms.len() && else_body.is_none();
                    if !is_last_arm {
                        exit_jumps.push(self.emit(Instr::Jmp(u32::MAX)));
                    }
                    let next_arm = self.chunk.current_offset();
                    self.chunk.patch_jump(skip, next_arm);
                }

                if let Some(else_body) = else_body {
                    self.compile_block_scoped(else_body)?;
                }

                let join = self.chunk.current_offset();
                for jump in exit_jumps {
                    self.chunk.patch_jump(jump, join);
                }
            }

            StmtKind::While { condition, body } => {
                let loop_start = self.chunk.current_offset();
                self.compile_expression(condition)?;
                let exit = self.emit(Instr::JmpIfFalse(u32::MAX));

                self.loops.push(LoopContext::default());
                self.compile_block_scoped(body)?;
                self.emit(Instr::Jmp(loop_start as u32));

                let end = self.chunk.current_offset();
                self.chunk.patch_jump(exit, end);
                self.finish_loop(end);
            }

            StmtKind::Repeat { body, condition } => {
                let loop_start = self.chunk.current_offset();
                self.loops.push(LoopContext::default());

                // The until condition can see locals declared in the
                // body, so both share one scope.
                self.begin_scope();
                for stmt in &body.statements {
                    self.compile_statement(stmt)?;
                }
                self.compile_expression(condition)?;
                self.end_scope();

                self.emit(Instr::JmpIfFalse(loop_start as u32));
                let end = self.chunk.current_offset();
                self.finish_loop(end);
            }

            StmtKind::NumericFor {
                variable,
                start,
                limit,
                step,
                body,
            } => {
                self.begin_scope();

                // Control slots: counter, limit, step, then the visible
                // variable. The names cannot collide with identifiers.
                let counter_slot = self.declare_local("(for counter)".to_string());
                self.declare_local("(for limit)".to_string());
                self.declare_local("(for step)".to_string());
                self.declare_local(variable.clone());

                self.compile_expression(start)?;
                self.compile_expression(limit)?;
                match step {
                    Some(step) => self.compile_expression(step)?,
                    None => {
                        let idx = self.constant(Constant::Number(1.0), stmt.span)?;
                        self.emit(Instr::LoadK(idx));
                    }
                }

                let prep = self.emit(Instr::ForPrep {
                    slot: counter_slot,
                    target: u32::MAX,
                });

                let body_start = self.chunk.current_offset();
                self.loops.push(LoopContext::default());
                self.compile_block_scoped(body)?;

                let forloop = self.emit(Instr::ForLoop {
                    slot: counter_slot,
                    target: body_start as u32,
                });
                self.chunk.patch_jump(prep, forloop);

                let end = self.chunk.current_offset();
                self.finish_loop(end);
                self.end_scope();
            }

            StmtKind::GenericFor {
                variables,
                exprs,
                body,
            } => {
                self.compile_generic_for(variables, exprs, body)?;
            }

            StmtKind::Do(body) => {
                self.compile_block_scoped(body)?;
            }

            StmtKind::Return(values) => {
                for value in values {
                    self.compile_expression(value)?;
                }
                self.emit(Instr::Return(values.len() as u8));
            }

            StmtKind::Break => {
                let jump = self.emit(Instr::Jmp(u32::MAX));
                match self.loops.last_mut() {
                    Some(ctx) => ctx.break_jumps.push(jump),
                    None => return Err(CompileError::BreakOutsideLoop(stmt.span)),
                }
            }

            StmtKind::Function { target, body } => {
                let proto = self.compile_function(body)?;
                let proto_idx = self.chunk.add_proto(proto);
                let pool_idx = self.constant(Constant::Proto(proto_idx), stmt.span)?;

                if target.path.is_empty() {
                    // Plain `function name()` stores like an assignment
                    self.emit(Instr::Closure(pool_idx));
                    self.compile_store_variable(&target.base, stmt.span)?;
                } else {
                    // `function t.a.b()` walks the path, then stores
                    // the closure into the final field.
                    self.compile_load_variable(&target.base, stmt.span)?;
                    for field in &target.path[..target.path.len() - 1] {
                        let idx = self.string_constant(field, stmt.span)?;
                        self.emit(Instr::GetField(idx));
                    }
                    self.emit(Instr::Closure(pool_idx));
                    let last = target.path.last().expect("non-empty path");
                    let idx = self.string_constant(last, stmt.span)?;
                    self.emit(Instr::SetField(idx));
                }
            }

            StmtKind::LocalFunction { name, body } => {
                // The name binds before the literal, the shape of
                // `local f; f = function() ... end`. The body compiles
                // in its own context and resolves free names globally.
                let slot = self.declare_local(name.clone());
                let proto = self.compile_function(body)?;
                let proto_idx = self.chunk.add_proto(proto);
                let pool_idx = self.constant(Constant::Proto(proto_idx), stmt.span)?;
                self.emit(Instr::Closure(pool_idx));
                self.emit(Instr::SetLocal(slot));
            }
        }

        Ok(())
    }

    /// Compile `exprs`, leaving exactly `want` values on the stack:
    /// missing values become nil, surplus values are evaluated for
    /// their effects and discarded.
    fn compile_value_list(&mut self, exprs: &[Expr], want: usize) -> CompileResult<()> {
        for expr in exprs.iter().take(want) {
            self.compile_expression(expr)?;
        }
        for _ in exprs.len()..want {
            self.emit(Instr::LoadNil);
        }
        for expr in exprs.iter().skip(want) {
            self.compile_expression(expr)?;
            self.emit(Instr::Pop);
        }
        Ok(())
    }

    fn compile_assignment(
        &mut self,
        targets: &[Expr],
        values: &[Expr],
        span: Span,
    ) -> CompileResult<()> {
        let all_identifiers = targets
            .iter()
            .all(|t| matches!(t.kind, ExprKind::Variable(_)));

        if all_identifiers {
            // Every value is computed before any store, so
            // `a, b = b, a` swaps.
            self.compile_value_list(values, targets.len())?;
            for target in targets.iter().rev() {
                let ExprKind::Variable(name) = &target.kind else {
                    unreachable!("checked above");
                };
                self.compile_store_variable(name, target.span)?;
            }
            return Ok(());
        }

        // Targets with member/index parts assign pairwise in order.
        for (i, target) in targets.iter().enumerate() {
            let value = values.get(i);
            match &target.kind {
                ExprKind::Variable(name) => {
                    self.compile_value_or_nil(value)?;
                    self.compile_store_variable(name, target.span)?;
                }
                ExprKind::Member { object, name } => {
                    self.compile_expression(object)?;
                    self.compile_value_or_nil(value)?;
                    let idx = self.string_constant(name, target.span)?;
                    self.emit(Instr::SetField(idx));
                }
                ExprKind::Index { object, index } => {
                    self.compile_expression(object)?;
                    self.compile_expression(index)?;
                    self.compile_value_or_nil(value)?;
                    self.emit(Instr::SetIndex);
                }
                _ => {
                    return Err(CompileError::unsupported(
                        "assignment target must be a name, field or index",
                        span,
                    ));
                }
            }
        }

        // Surplus values still run for their side effects
        for value in values.iter().skip(targets.len()) {
            self.compile_expression(value)?;
            self.emit(Instr::Pop);
        }
        Ok(())
    }

    fn compile_value_or_nil(&mut self, value: Option<&Expr>) -> CompileResult<()> {
        match value {
            Some(expr) => self.compile_expression(expr),
            None => {
                self.emit(Instr::LoadNil);
                Ok(())
            }
        }
    }

    /// Generic for, lowered onto the ordinary instruction set:
    ///
    /// ```text
    ///   <generator, state, control into hidden slots>
    /// test:
    ///   generator(state, control)   -- one result per loop variable
    ///   <store results into the loop variables>
    ///   if var1 == nil then exit
    ///   control = var1
    ///   <body>
    ///   jmp test
    /// exit:
    /// ```
    fn compile_generic_for(
        &mut self,
        variables: &[String],
        exprs: &[Expr],
        body: &Block,
    ) -> CompileResult<()> {
        self.begin_scope();

        let generator_slot = self.declare_local("(for generator)".to_string());
        let state_slot = self.declare_local("(for state)".to_string());
        let control_slot = self.declare_local("(for control)".to_string());
        let var_slots: Vec<u16> = variables
            .iter()
            .map(|name| self.declare_local(name.clone()))
            .collect();

        // The iterator triple: a single call expression yields all
        // three values; otherwise each expression yields one.
        if exprs.len() == 1
            && matches!(
                exprs[0].kind,
                ExprKind::Call { .. } | ExprKind::MethodCall { .. }
            )
        {
            self.compile_call_multi(&exprs[0], 3)?;
        } else {
            self.compile_value_list(exprs, 3)?;
        }
        self.emit(Instr::SetLocal(control_slot));
        self.emit(Instr::SetLocal(state_slot));
        self.emit(Instr::SetLocal(generator_slot));

        let test = self.chunk.current_offset();
        self.emit(Instr::GetLocal(generator_slot));
        self.emit(Instr::GetLocal(state_slot));
        self.emit(Instr::GetLocal(control_slot));
        self.emit(Instr::Call {
            nargs: 2,
            nret: variables.len() as u8,
        });
        for slot in var_slots.iter().rev() {
            self.emit(Instr::SetLocal(*slot));
        }

        self.emit(Instr::GetLocal(var_slots[0]));
        self.emit(Instr::LoadNil);
        self.emit(Instr::Eq { invert: true });
        let exit = self.emit(Instr::JmpIfFalse(u32::MAX));

        self.emit(Instr::GetLocal(var_slots[0]));
        self.emit(Instr::SetLocal(control_slot));

        self.loops.push(LoopContext::default());
        self.compile_block_scoped(body)?;
        self.emit(Instr::Jmp(test as u32));

        let end = self.chunk.current_offset();
        self.chunk.patch_jump(exit, end);
        self.finish_loop(end);
        self.end_scope();

        Ok(())
    }

    // ===== Expressions =====

    /// Compile an expression; always nets exactly +1 on the stack.
    fn compile_expression(&mut self, expr: &Expr) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::NumberLiteral(n) => {
                let idx = self.constant(Constant::Number(*n), expr.span)?;
                self.emit(Instr::LoadK(idx));
            }
            ExprKind::StringLiteral(s) => {
                let idx = self.constant(Constant::Str(s.clone()), expr.span)?;
                self.emit(Instr::LoadK(idx));
            }
            ExprKind::BoolLiteral(b) => {
                self.emit(Instr::LoadBool(*b));
            }
            ExprKind::Nil => {
                self.emit(Instr::LoadNil);
            }
            ExprKind::Vararg => {
                self.emit(Instr::Vararg);
            }

            ExprKind::Variable(name) => {
                self.compile_load_variable(name, expr.span)?;
            }

            ExprKind::Binary {
                left,
                operator,
                right,
            } => {
                self.compile_binary(left, *operator, right)?;
            }

            ExprKind::Unary { operator, operand } => {
                self.compile_expression(operand)?;
                match operator {
                    UnaryOp::Negate => self.emit(Instr::Unm),
                    UnaryOp::Not => self.emit(Instr::Not),
                    UnaryOp::Length => self.emit(Instr::Len),
                };
            }

            ExprKind::Call { .. } | ExprKind::MethodCall { .. } => {
                self.compile_call_multi(expr, 1)?;
            }

            ExprKind::Member { object, name } => {
                self.compile_expression(object)?;
                let idx = self.string_constant(name, expr.span)?;
                self.emit(Instr::GetField(idx));
            }

            ExprKind::Index { object, index } => {
                self.compile_expression(object)?;
                self.compile_expression(index)?;
                self.emit(Instr::GetIndex);
            }

            ExprKind::Table(fields) => {
                self.compile_table(fields, expr.span)?;
            }

            ExprKind::Function(body) => {
                let proto = self.compile_function(body)?;
                let proto_idx = self.chunk.add_proto(proto);
                let pool_idx = self.constant(Constant::Proto(proto_idx), expr.span)?;
                self.emit(Instr::Closure(pool_idx));
            }
        }

        Ok(())
    }

    /// Compile a call or method call requesting `nret` results.
    fn compile_call_multi(&mut self, expr: &Expr, nret: u8) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::Call { callee, arguments } => {
                self.compile_expression(callee)?;
                for arg in arguments {
                    self.compile_expression(arg)?;
                }
                self.emit(Instr::Call {
                    nargs: arguments.len() as u8,
                    nret,
                });
            }
            ExprKind::MethodCall {
                object,
                method,
                arguments,
            } => {
                self.compile_expression(object)?;
                let idx = self.string_constant(method, expr.span)?;
                self.emit(Instr::SelfField(idx));
                for arg in arguments {
                    self.compile_expression(arg)?;
                }
                self.emit(Instr::Call {
                    nargs: arguments.len() as u8 + 1,
                    nret,
                });
            }
            _ => unreachable!("compile_call_multi on a non-call expression"),
        }
        Ok(())
    }

    fn compile_binary(
        &mut self,
        left: &Expr,
        operator: BinaryOp,
        right: &Expr,
    ) -> CompileResult<()> {
        // and/or short-circuit and keep the deciding operand's value
        match operator {
            BinaryOp::And => {
                self.compile_expression(left)?;
                self.emit(Instr::Dup);
                let skip = self.emit(Instr::JmpIfFalse(u32::MAX));
                self.emit(Instr::Pop);
                self.compile_expression(right)?;
                let end = self.chunk.current_offset();
                self.chunk.patch_jump(skip, end);
                return Ok(());
            }
            BinaryOp::Or => {
                self.compile_expression(left)?;
                self.emit(Instr::Dup);
                let take_right = self.emit(Instr::JmpIfFalse(u32::MAX));
                let done = self.emit(Instr::Jmp(u32::MAX));
                let rhs = self.chunk.current_offset();
                self.chunk.patch_jump(take_right, rhs);
                self.emit(Instr::Pop);
                self.compile_expression(right)?;
                let end = self.chunk.current_offset();
                self.chunk.patch_jump(done, end);
                return Ok(());
            }
            _ => {}
        }

        self.compile_expression(left)?;
        self.compile_expression(right)?;
        match operator {
            BinaryOp::Add => self.emit(Instr::Add),
            BinaryOp::Subtract => self.emit(Instr::Sub),
            BinaryOp::Multiply => self.emit(Instr::Mul),
            BinaryOp::Divide => self.emit(Instr::Div),
            BinaryOp::FloorDivide => self.emit(Instr::IDiv),
            BinaryOp::Modulo => self.emit(Instr::Mod),
            BinaryOp::Power => self.emit(Instr::Pow),
            BinaryOp::Concat => self.emit(Instr::Concat),
            BinaryOp::Equal => self.emit(Instr::Eq { invert: false }),
            BinaryOp::NotEqual => self.emit(Instr::Eq { invert: true }),
            BinaryOp::Less => self.emit(Instr::Lt { invert: false }),
            BinaryOp::GreaterEqual => self.emit(Instr::Lt { invert: true }),
            BinaryOp::LessEqual => self.emit(Instr::Le { invert: false }),
            BinaryOp::Greater => self.emit(Instr::Le { invert: true }),
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        };
        Ok(())
    }

    fn compile_table(&mut self, fields: &[TableField], span: Span) -> CompileResult<()> {
        self.emit(Instr::NewTable);
        let mut array_index = 1.0;

        for field in fields {
            self.emit(Instr::Dup);
            match field {
                TableField::Positional(value) => {
                    let idx = self.constant(Constant::Number(array_index), span)?;
                    array_index += 1.0;
                    self.emit(Instr::LoadK(idx));
                    self.compile_expression(value)?;
                    self.emit(Instr::SetIndex);
                }
                TableField::Named(key, value) => {
                    let idx = self.string_constant(key, span)?;
                    self.compile_expression(value)?;
                    self.emit(Instr::SetField(idx));
                }
                TableField::Computed(key, value) => {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                    self.emit(Instr::SetIndex);
                }
            }
        }
        Ok(())
    }

    // ===== Variables and scope =====

    fn compile_load_variable(&mut self, name: &str, span: Span) -> CompileResult<()> {
        if let Some(slot) = self.resolve_local(name) {
            self.emit(Instr::GetLocal(slot));
        } else {
            let idx = self.string_constant(name, span)?;
            self.emit(Instr::GetGlobal(idx));
        }
        Ok(())
    }

    fn compile_store_variable(&mut self, name: &str, span: Span) -> CompileResult<()> {
        if let Some(slot) = self.resolve_local(name) {
            self.emit(Instr::SetLocal(slot));
        } else {
            let idx = self.string_constant(name, span)?;
            self.emit(Instr::SetGlobal(idx));
        }
        Ok(())
    }

    fn begin_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    fn end_scope(&mut self) {
        // Names become unreachable; their slots stay allocated so
        // every slot index in the chunk remains stable.
        self.scopes.pop();
    }

    fn declare_local(&mut self, name: String) -> u16 {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.scopes
            .last_mut()
            .expect("at least one scope")
            .push((name, slot));
        slot
    }

    fn resolve_local(&self, name: &str) -> Option<u16> {
        for scope in self.scopes.iter().rev() {
            for (bound, slot) in scope.iter().rev() {
                if bound == name {
                    return Some(*slot);
                }
            }
        }
        None
    }

    fn finish_loop(&mut self, end: usize) {
        let ctx = self.loops.pop().expect("loop context");
        for jump in ctx.break_jumps {
            self.chunk.patch_jump(jump, end);
        }
    }

    // ===== Emission helpers =====

    fn emit(&mut self, instr: Instr) -> usize {
        self.chunk.emit(instr)
    }

    fn constant(&mut self, constant: Constant, span: Span) -> CompileResult<u16> {
        self.chunk
            .add_constant(constant)
            .ok_or(CompileError::TooManyConstants(span))
    }

    fn string_constant(&mut self, name: &str, span: Span) -> CompileResult<u16> {
        self.constant(Constant::Str(name.to_string()), span)
    }
}
