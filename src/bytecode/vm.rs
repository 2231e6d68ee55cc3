//! Stack-based virtual machine executing compiled chunks.

use std::rc::Rc;

use crate::bytecode::chunk::{Chunk, Constant};
use crate::bytecode::env::Environment;
use crate::bytecode::instruction::Instr;
use crate::bytecode::value::{Table, TableKey, Value};
use crate::error::RuntimeError;

/// Maximum value-stack size.
const STACK_MAX: usize = 65536;
/// Maximum call depth.
const FRAMES_MAX: usize = 256;

/// Result type for VM operations.
pub type VmResult<T> = Result<T, RuntimeError>;

/// One function activation.
struct Frame {
    /// The chunk being executed.
    chunk: Rc<Chunk>,
    /// Index of the next instruction.
    pc: usize,
    /// Where this frame's locals start on the value stack.
    base: usize,
    /// Result count the caller asked for; unused for the root frame.
    expected_results: u8,
    /// Extra arguments beyond the declared parameters, when the chunk
    /// is vararg.
    varargs: Vec<Value>,
}

/// The virtual machine. Created fresh per execution request; holds no
/// state worth keeping across runs except through the environment the
/// host passes in.
#[derive(Default)]
pub struct Vm {
    stack: Vec<Value>,
    frames: Vec<Frame>,
}

impl Vm {
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(16),
        }
    }

    /// Execute `chunk` with `args` against the host's environment,
    /// yielding the values of its top-level return.
    pub fn run(
        &mut self,
        chunk: Rc<Chunk>,
        args: Vec<Value>,
        env: &mut Environment,
    ) -> VmResult<Vec<Value>> {
        self.stack.clear();
        self.frames.clear();

        for arg in args {
            self.stack.push(arg);
        }
        self.push_frame(chunk, 0, 0)?;

        self.execute(env)
    }

    /// Set up a frame whose arguments already sit on the stack
    /// starting at `base`. Adjusts the argument window to the chunk's
    /// parameter count and reserves the rest of its local slots.
    fn push_frame(&mut self, chunk: Rc<Chunk>, base: usize, expected_results: u8) -> VmResult<()> {
        if self.frames.len() >= FRAMES_MAX {
            return Err(RuntimeError::StackOverflow);
        }

        let supplied = self.stack.len() - base;
        let num_params = chunk.num_params as usize;

        let mut varargs = Vec::new();
        if supplied > num_params {
            let extras = self.stack.split_off(base + num_params);
            if chunk.is_vararg {
                varargs = extras;
            }
        } else {
            for _ in supplied..num_params {
                self.stack.push(Value::Nil);
            }
        }

        let num_locals = chunk.num_locals as usize;
        if base + num_locals >= STACK_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        while self.stack.len() < base + num_locals {
            self.stack.push(Value::Nil);
        }

        self.frames.push(Frame {
            chunk,
            pc: 0,
            base,
            expected_results,
            varargs,
        });
        Ok(())
    }

    /// Main dispatch loop.
    fn execute(&mut self, env: &mut Environment) -> VmResult<Vec<Value>> {
        loop {
            let frame = self.frames.last_mut().expect("active frame");
            let pc = frame.pc;
            let Some(&instr) = frame.chunk.code.get(pc) else {
                return Err(RuntimeError::out_of_range("instruction", pc));
            };
            frame.pc += 1;

            match instr {
                Instr::LoadK(idx) => {
                    let value = self.constant_value(idx)?;
                    self.push(value)?;
                }

                Instr::LoadNil => self.push(Value::Nil)?,
                Instr::LoadBool(b) => self.push(Value::Bool(b))?,

                Instr::GetGlobal(idx) => {
                    let name = self.string_constant(idx)?;
                    let value = env.get(&name);
                    self.push(value)?;
                }

                Instr::SetGlobal(idx) => {
                    let name = self.string_constant(idx)?;
                    let value = self.pop()?;
                    env.set(name, value);
                }

                Instr::GetLocal(slot) => {
                    let value = self.local(slot)?.clone();
                    self.push(value)?;
                }

                Instr::SetLocal(slot) => {
                    let value = self.pop()?;
                    *self.local_mut(slot)? = value;
                }

                Instr::GetField(idx) => {
                    let name = self.string_constant(idx)?;
                    let object = self.pop()?;
                    let value = Self::index_table(&object, &TableKey::Str(Rc::new(name)))?;
                    self.push(value)?;
                }

                Instr::GetIndex => {
                    let key = self.pop()?;
                    let object = self.pop()?;
                    let key = TableKey::from_value(&key)?;
                    let value = Self::index_table(&object, &key)?;
                    self.push(value)?;
                }

                Instr::SetField(idx) => {
                    let name = self.string_constant(idx)?;
                    let value = self.pop()?;
                    let object = self.pop()?;
                    Self::store_table(&object, TableKey::Str(Rc::new(name)), value)?;
                }

                Instr::SetIndex => {
                    let value = self.pop()?;
                    let key = self.pop()?;
                    let object = self.pop()?;
                    let key = TableKey::from_value(&key)?;
                    Self::store_table(&object, key, value)?;
                }

                Instr::NewTable => {
                    self.push(Value::table(Table::new()))?;
                }

                Instr::Add => self.arith("+", |a, b| a + b)?,
                Instr::Sub => self.arith("-", |a, b| a - b)?,
                Instr::Mul => self.arith("*", |a, b| a * b)?,
                Instr::Div => self.arith("/", |a, b| a / b)?,
                Instr::IDiv => self.arith("//", |a, b| (a / b).floor())?,
                Instr::Mod => self.arith("%", |a, b| a - (a / b).floor() * b)?,
                Instr::Pow => self.arith("^", |a, b| a.powf(b))?,

                Instr::Unm => {
                    let value = self.pop()?;
                    match value {
                        Value::Number(n) => self.push(Value::Number(-n))?,
                        other => {
                            return Err(RuntimeError::type_mismatch(format!(
                                "attempt to negate a {} value",
                                other.type_name()
                            )));
                        }
                    }
                }

                Instr::Not => {
                    let value = self.pop()?;
                    self.push(Value::Bool(!value.is_truthy()))?;
                }

                Instr::Len => {
                    let value = self.pop()?;
                    let len = match &value {
                        Value::Str(s) => s.as_bytes().len() as f64,
                        Value::Table(t) => t.borrow().border() as f64,
                        other => {
                            return Err(RuntimeError::type_mismatch(format!(
                                "attempt to get length of a {} value",
                                other.type_name()
                            )));
                        }
                    };
                    self.push(Value::Number(len))?;
                }

                Instr::Concat => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let text = format!("{}{}", Self::concat_text(&a)?, Self::concat_text(&b)?);
                    self.push(Value::string(text))?;
                }

                Instr::Eq { invert } => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool((a == b) != invert))?;
                }

                Instr::Lt { invert } => {
                    let result = self.compare("<", |a, b| a < b, |a, b| a < b)?;
                    self.push(Value::Bool(result != invert))?;
                }

                Instr::Le { invert } => {
                    let result = self.compare("<=", |a, b| a <= b, |a, b| a <= b)?;
                    self.push(Value::Bool(result != invert))?;
                }

                Instr::Jmp(target) => {
                    self.jump(target)?;
                }

                Instr::JmpIfFalse(target) => {
                    let condition = self.pop()?;
                    if !condition.is_truthy() {
                        self.jump(target)?;
                    }
                }

                Instr::Call { nargs, nret } => {
                    self.call_value(nargs as usize, nret)?;
                }

                Instr::SelfField(idx) => {
                    let name = self.string_constant(idx)?;
                    let receiver = self.pop()?;
                    let method = Self::index_table(&receiver, &TableKey::Str(Rc::new(name)))?;
                    self.push(method)?;
                    self.push(receiver)?;
                }

                Instr::Return(nret) => {
                    let mut results = self.pop_many(nret as usize)?;
                    let frame = self.frames.pop().expect("active frame");

                    if self.frames.is_empty() {
                        return Ok(results);
                    }

                    // Drop the frame's slots and the callee value under
                    // them, then materialize the caller's result count.
                    self.stack.truncate(frame.base.saturating_sub(1));
                    adjust_results(&mut results, frame.expected_results as usize);
                    for value in results {
                        self.push(value)?;
                    }
                }

                Instr::ForPrep { slot, target } => {
                    let step = Self::for_number(self.pop()?, "'for' step")?;
                    let limit = Self::for_number(self.pop()?, "'for' limit")?;
                    let start = Self::for_number(self.pop()?, "'for' initial value")?;
                    if step == 0.0 {
                        return Err(RuntimeError::InvalidForRange);
                    }
                    *self.local_mut(slot)? = Value::Number(start - step);
                    *self.local_mut(slot + 1)? = Value::Number(limit);
                    *self.local_mut(slot + 2)? = Value::Number(step);
                    self.jump(target)?;
                }

                Instr::ForLoop { slot, target } => {
                    let (counter, limit, step) = self.for_state(slot)?;
                    let next = counter + step;
                    let continuing = if step > 0.0 { next <= limit } else { next >= limit };
                    if continuing {
                        *self.local_mut(slot)? = Value::Number(next);
                        *self.local_mut(slot + 3)? = Value::Number(next);
                        self.jump(target)?;
                    }
                }

                Instr::Closure(idx) => {
                    let frame = self.frames.last().expect("active frame");
                    let constant = frame
                        .chunk
                        .constants
                        .get(idx as usize)
                        .ok_or_else(|| RuntimeError::out_of_range("constant", idx as usize))?;
                    let &Constant::Proto(proto_idx) = constant else {
                        return Err(RuntimeError::type_mismatch(
                            "CLOSURE operand is not a function constant",
                        ));
                    };
                    let proto = frame
                        .chunk
                        .protos
                        .get(proto_idx as usize)
                        .cloned()
                        .ok_or_else(|| {
                            RuntimeError::out_of_range("nested chunk", proto_idx as usize)
                        })?;
                    self.push(Value::Function(proto))?;
                }

                Instr::Vararg => {
                    let frame = self.frames.last().expect("active frame");
                    let value = frame.varargs.first().cloned().unwrap_or(Value::Nil);
                    self.push(value)?;
                }

                Instr::Pop => {
                    self.pop()?;
                }

                Instr::Dup => {
                    let value = self.peek(0)?.clone();
                    self.push(value)?;
                }
            }
        }
    }

    // ===== Calls =====

    fn call_value(&mut self, nargs: usize, nret: u8) -> VmResult<()> {
        let callee_index = self
            .stack
            .len()
            .checked_sub(nargs + 1)
            .ok_or_else(|| RuntimeError::out_of_range("value stack", 0))?;
        let callee = self.stack[callee_index].clone();

        match callee {
            Value::Function(chunk) => {
                let base = callee_index + 1;
                self.push_frame(chunk, base, nret)?;
            }
            Value::Native(native) => {
                let args = self.stack.split_off(callee_index + 1);
                self.stack.pop(); // the callee itself
                let mut results = native.call(&args)?;
                adjust_results(&mut results, nret as usize);
                for value in results {
                    self.push(value)?;
                }
            }
            other => {
                return Err(RuntimeError::not_callable(other.type_name()));
            }
        }
        Ok(())
    }

    // ===== Table access =====

    fn index_table(object: &Value, key: &TableKey) -> VmResult<Value> {
        match object {
            Value::Table(t) => Ok(t.borrow().get(key)),
            other => Err(RuntimeError::type_mismatch(format!(
                "attempt to index a {} value",
                other.type_name()
            ))),
        }
    }

    fn store_table(object: &Value, key: TableKey, value: Value) -> VmResult<()> {
        match object {
            Value::Table(t) => {
                t.borrow_mut().set(key, value);
                Ok(())
            }
            other => Err(RuntimeError::type_mismatch(format!(
                "attempt to index a {} value",
                other.type_name()
            ))),
        }
    }

    // ===== Numeric helpers =====

    fn arith(&mut self, op: &'static str, f: impl FnOnce(f64, f64) -> f64) -> VmResult<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => {
                self.push(Value::Number(f(*x, *y)))?;
                Ok(())
            }
            _ => Err(RuntimeError::type_mismatch(format!(
                "attempt to perform arithmetic ({}) on a {} and a {}",
                op,
                a.type_name(),
                b.type_name()
            ))),
        }
    }

    fn compare(
        &mut self,
        op: &'static str,
        num: impl FnOnce(f64, f64) -> bool,
        text: impl FnOnce(&str, &str) -> bool,
    ) -> VmResult<bool> {
        let b = self.pop()?;
        let a = self.pop()?;
        match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => Ok(num(*x, *y)),
            (Value::Str(x), Value::Str(y)) => Ok(text(x.as_str(), y.as_str())),
            _ => Err(RuntimeError::type_mismatch(format!(
                "attempt to compare ({}) a {} with a {}",
                op,
                a.type_name(),
                b.type_name()
            ))),
        }
    }

    fn concat_text(value: &Value) -> VmResult<String> {
        match value {
            Value::Str(s) => Ok(s.as_ref().clone()),
            Value::Number(n) => Ok(Value::format_number(*n)),
            other => Err(RuntimeError::type_mismatch(format!(
                "attempt to concatenate a {} value",
                other.type_name()
            ))),
        }
    }

    fn for_number(value: Value, what: &str) -> VmResult<f64> {
        match value {
            Value::Number(n) => Ok(n),
            other => Err(RuntimeError::type_mismatch(format!(
                "{} must be a number, got {}",
                what,
                other.type_name()
            ))),
        }
    }

    fn for_state(&self, slot: u16) -> VmResult<(f64, f64, f64)> {
        let counter = self.for_slot(slot)?;
        let limit = self.for_slot(slot + 1)?;
        let step = self.for_slot(slot + 2)?;
        Ok((counter, limit, step))
    }

    fn for_slot(&self, slot: u16) -> VmResult<f64> {
        match self.local(slot)? {
            Value::Number(n) => Ok(*n),
            other => Err(RuntimeError::type_mismatch(format!(
                "loop control slot holds a {}",
                other.type_name()
            ))),
        }
    }

    // ===== Stack and frame helpers =====

    fn jump(&mut self, target: u32) -> VmResult<()> {
        let frame = self.frames.last_mut().expect("active frame");
        if target as usize > frame.chunk.code.len() {
            return Err(RuntimeError::out_of_range("jump target", target as usize));
        }
        frame.pc = target as usize;
        Ok(())
    }

    fn local(&self, slot: u16) -> VmResult<&Value> {
        let frame = self.frames.last().expect("active frame");
        let index = frame.base + slot as usize;
        if slot as usize >= frame.chunk.num_locals as usize {
            return Err(RuntimeError::out_of_range("local slot", slot as usize));
        }
        self.stack
            .get(index)
            .ok_or_else(|| RuntimeError::out_of_range("local slot", slot as usize))
    }

    fn local_mut(&mut self, slot: u16) -> VmResult<&mut Value> {
        let frame = self.frames.last().expect("active frame");
        let index = frame.base + slot as usize;
        if slot as usize >= frame.chunk.num_locals as usize {
            return Err(RuntimeError::out_of_range("local slot", slot as usize));
        }
        self.stack
            .get_mut(index)
            .ok_or_else(|| RuntimeError::out_of_range("local slot", slot as usize))
    }

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.stack.len() >= STACK_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> VmResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::out_of_range("value stack", 0))
    }

    fn pop_many(&mut self, count: usize) -> VmResult<Vec<Value>> {
        if count > self.stack.len() {
            return Err(RuntimeError::out_of_range("value stack", count));
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    fn peek(&self, distance: usize) -> VmResult<&Value> {
        let index = self
            .stack
            .len()
            .checked_sub(1 + distance)
            .ok_or_else(|| RuntimeError::out_of_range("value stack", distance))?;
        Ok(&self.stack[index])
    }

    fn constant_value(&self, idx: u16) -> VmResult<Value> {
        let frame = self.frames.last().expect("active frame");
        let constant = frame
            .chunk
            .constants
            .get(idx as usize)
            .ok_or_else(|| RuntimeError::out_of_range("constant", idx as usize))?;
        match constant {
            Constant::Number(n) => Ok(Value::Number(*n)),
            Constant::Str(s) => Ok(Value::string(s.clone())),
            Constant::Bool(b) => Ok(Value::Bool(*b)),
            Constant::Proto(_) => Err(RuntimeError::type_mismatch(
                "function constants load through CLOSURE",
            )),
        }
    }

    fn string_constant(&self, idx: u16) -> VmResult<String> {
        let frame = self.frames.last().expect("active frame");
        let constant = frame
            .chunk
            .constants
            .get(idx as usize)
            .ok_or_else(|| RuntimeError::out_of_range("constant", idx as usize))?;
        match constant {
            Constant::Str(s) => Ok(s.clone()),
            _ => Err(RuntimeError::type_mismatch("expected a string constant")),
        }
    }
}

/// Pad with nil or truncate so exactly `want` results remain.
fn adjust_results(results: &mut Vec<Value>, want: usize) {
    while results.len() < want {
        results.push(Value::Nil);
    }
    results.truncate(want);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compiler;

    fn run_source(source: &str) -> VmResult<Vec<Value>> {
        let tokens = crate::lexer::Scanner::new(source)
            .scan_tokens()
            .expect("lexer error");
        let block = crate::parser::Parser::new(tokens)
            .parse()
            .expect("parser error");
        let chunk = compiler::compile(&block).expect("compile error");

        let mut env = Environment::with_stdlib();
        let mut vm = Vm::new();
        vm.run(Rc::new(chunk), Vec::new(), &mut env)
    }

    fn run_one(source: &str) -> Value {
        let mut results = run_source(source).expect("runtime error");
        assert_eq!(results.len(), 1, "expected a single result");
        results.remove(0)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(run_one("return 1 + 2"), Value::Number(3.0));
        assert_eq!(run_one("return 2 ^ 10"), Value::Number(1024.0));
        assert_eq!(run_one("return 7 % 3"), Value::Number(1.0));
        assert_eq!(run_one("return 7 // 2"), Value::Number(3.0));
        assert_eq!(run_one("return -(3 - 5)"), Value::Number(2.0));
    }

    #[test]
    fn test_operator_precedence() {
        assert_eq!(run_one("return 1 + 2 * 3"), Value::Number(7.0));
        assert_eq!(run_one("return (1 + 2) * 3"), Value::Number(9.0));
        assert_eq!(run_one("return 2 ^ 3 ^ 2"), Value::Number(512.0));
    }

    #[test]
    fn test_local_scoping() {
        assert_eq!(run_one("local x = 5 local y = x * 2 return y"), Value::Number(10.0));
    }

    #[test]
    fn test_shadowing_preserves_outer_binding() {
        let source = "
            local x = 1
            do
                local x = 99
            end
            return x
        ";
        assert_eq!(run_one(source), Value::Number(1.0));
    }

    #[test]
    fn test_if_elseif_else_chain() {
        let source = "
            if 1 < 2 then return 'yes'
            elseif 1 > 2 then return 'mid'
            else return 'no' end
        ";
        assert_eq!(run_one(source), Value::string("yes"));

        let flipped = "
            if 1 > 2 then return 'yes'
            elseif 1 < 2 then return 'mid'
            else return 'no' end
        ";
        assert_eq!(run_one(flipped), Value::string("mid"));

        let neither = "
            if 1 > 2 then return 'yes'
            elseif 2 > 3 then return 'mid'
            else return 'no' end
        ";
        assert_eq!(run_one(neither), Value::string("no"));
    }

    #[test]
    fn test_while_loop() {
        let source = "
            local n = 0
            while n < 5 do n = n + 1 end
            return n
        ";
        assert_eq!(run_one(source), Value::Number(5.0));
    }

    #[test]
    fn test_numeric_for_sum() {
        let source = "local s = 0 for i = 1, 5 do s = s + i end return s";
        assert_eq!(run_one(source), Value::Number(15.0));
    }

    #[test]
    fn test_numeric_for_negative_step() {
        let source = "
            local count = 0
            local last = 0
            for i = 5, 1, -1 do
                count = count + 1
                last = i
            end
            return count, last
        ";
        let results = run_source(source).unwrap();
        assert_eq!(results, vec![Value::Number(5.0), Value::Number(1.0)]);
    }

    #[test]
    fn test_numeric_for_zero_iterations() {
        let source = "local n = 0 for i = 5, 1 do n = n + 1 end return n";
        assert_eq!(run_one(source), Value::Number(0.0));
    }

    #[test]
    fn test_numeric_for_zero_step_fails() {
        let err = run_source("for i = 1, 5, 0 do end").unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidForRange));
    }

    #[test]
    fn test_repeat_until() {
        let source = "
            local n = 0
            repeat n = n + 1 until n >= 3
            return n
        ";
        assert_eq!(run_one(source), Value::Number(3.0));
    }

    #[test]
    fn test_break_leaves_innermost_loop() {
        let source = "
            local hits = 0
            for i = 1, 3 do
                while true do break end
                hits = hits + 1
                if i == 2 then break end
            end
            return hits
        ";
        assert_eq!(run_one(source), Value::Number(2.0));
    }

    #[test]
    fn test_function_call_and_return() {
        let source = "
            local function add(a, b)
                return a + b
            end
            return add(2, 3)
        ";
        assert_eq!(run_one(source), Value::Number(5.0));
    }

    #[test]
    fn test_recursion_through_global_name() {
        // Free variables resolve globally, so a recursive function is
        // declared with a global name.
        let source = "
            function fib(n)
                if n < 2 then return n end
                return fib(n - 1) + fib(n - 2)
            end
            return fib(10)
        ";
        assert_eq!(run_one(source), Value::Number(55.0));
    }

    #[test]
    fn test_call_arity_adjustment() {
        let source = "
            local function pair(a, b)
                return a, b
            end
            local x, y = pair(1)
            local z = pair(1, 2, 3)
            return x, y, z
        ";
        let results = run_source(source).unwrap();
        assert_eq!(
            results,
            vec![Value::Number(1.0), Value::Nil, Value::Number(1.0)]
        );
    }

    #[test]
    fn test_multi_value_locals_and_nil_fill() {
        let source = "local a, b, c = 1, 2 return a, b, c";
        let results = run_source(source).unwrap();
        assert_eq!(
            results,
            vec![Value::Number(1.0), Value::Number(2.0), Value::Nil]
        );
    }

    #[test]
    fn test_swap_assignment() {
        let source = "local a, b = 1, 2 a, b = b, a return a, b";
        let results = run_source(source).unwrap();
        assert_eq!(results, vec![Value::Number(2.0), Value::Number(1.0)]);
    }

    #[test]
    fn test_tables() {
        let source = "
            local t = { 10, 20, x = 'hi', [5] = 'five' }
            return t[1], t[2], t.x, t[5], #t
        ";
        let results = run_source(source).unwrap();
        assert_eq!(
            results,
            vec![
                Value::Number(10.0),
                Value::Number(20.0),
                Value::string("hi"),
                Value::string("five"),
                Value::Number(2.0),
            ]
        );
    }

    #[test]
    fn test_table_store_and_delete() {
        let source = "
            local t = {}
            t.a = 1
            t['a'] = 2
            t.b = 3
            t.b = nil
            return t.a, t.b
        ";
        let results = run_source(source).unwrap();
        assert_eq!(results, vec![Value::Number(2.0), Value::Nil]);
    }

    #[test]
    fn test_method_call() {
        let source = "
            local account = { balance = 100 }
            function account:deposit(amount)
                self.balance = self.balance + amount
            end
            account:deposit(50)
            return account.balance
        ";
        assert_eq!(run_one(source), Value::Number(150.0));
    }

    #[test]
    fn test_generic_for_over_pairs() {
        let source = "
            local t = { a = 1, b = 2, c = 3 }
            local sum = 0
            for k, v in pairs(t) do sum = sum + v end
            return sum
        ";
        assert_eq!(run_one(source), Value::Number(6.0));
    }

    #[test]
    fn test_generic_for_over_ipairs() {
        let source = "
            local t = { 5, 6, 7 }
            local keys = 0
            local values = 0
            for i, v in ipairs(t) do
                keys = keys + i
                values = values + v
            end
            return keys, values
        ";
        let results = run_source(source).unwrap();
        assert_eq!(results, vec![Value::Number(6.0), Value::Number(18.0)]);
    }

    #[test]
    fn test_concat_coerces_numbers() {
        assert_eq!(run_one("return 'n=' .. 42"), Value::string("n=42"));
        assert_eq!(run_one("return 1 .. 2 .. 3"), Value::string("123"));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(run_one("return 1 < 2"), Value::Bool(true));
        assert_eq!(run_one("return 2 <= 1"), Value::Bool(false));
        assert_eq!(run_one("return 2 > 1"), Value::Bool(true));
        assert_eq!(run_one("return 1 >= 2"), Value::Bool(false));
        assert_eq!(run_one("return 'a' < 'b'"), Value::Bool(true));
        assert_eq!(run_one("return 1 == 1.0"), Value::Bool(true));
        assert_eq!(run_one("return 1 ~= '1'"), Value::Bool(true));
    }

    #[test]
    fn test_and_or_keep_operand_values() {
        assert_eq!(run_one("return nil and 1"), Value::Nil);
        assert_eq!(run_one("return false or 'fallback'"), Value::string("fallback"));
        assert_eq!(run_one("return 1 and 2"), Value::Number(2.0));
        assert_eq!(run_one("return 1 or 2"), Value::Number(1.0));
    }

    #[test]
    fn test_short_circuit_skips_side_effects() {
        let source = "
            hits = 0
            local function bump() hits = hits + 1 return true end
            local _ = false and bump()
            local _ = true or bump()
            return hits
        ";
        assert_eq!(run_one(source), Value::Number(0.0));
    }

    #[test]
    fn test_truthiness_of_zero_and_empty_string() {
        assert_eq!(run_one("if 0 then return 'truthy' end return 'falsey'"),
            Value::string("truthy"));
        assert_eq!(run_one("if '' then return 'truthy' end return 'falsey'"),
            Value::string("truthy"));
    }

    #[test]
    fn test_globals_shared_with_environment() {
        let tokens = crate::lexer::Scanner::new("counter = (counter or 0) + 1 return counter")
            .scan_tokens()
            .unwrap();
        let block = crate::parser::Parser::new(tokens).parse().unwrap();
        let chunk = Rc::new(compiler::compile(&block).unwrap());

        let mut env = Environment::with_stdlib();
        let mut first = Vm::new();
        first.run(chunk.clone(), Vec::new(), &mut env).unwrap();
        let mut second = Vm::new();
        let results = second.run(chunk, Vec::new(), &mut env).unwrap();
        assert_eq!(results, vec![Value::Number(2.0)]);
    }

    #[test]
    fn test_top_level_args_reach_vararg() {
        let tokens = crate::lexer::Scanner::new("return ...")
            .scan_tokens()
            .unwrap();
        let block = crate::parser::Parser::new(tokens).parse().unwrap();
        let chunk = Rc::new(compiler::compile(&block).unwrap());

        let mut env = Environment::new();
        let mut vm = Vm::new();
        let results = vm
            .run(chunk, vec![Value::string("first")], &mut env)
            .unwrap();
        assert_eq!(results, vec![Value::string("first")]);
    }

    #[test]
    fn test_call_of_non_function() {
        let err = run_source("local x = 5 x()").unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::CallOfNonFunction {
                type_name: "number"
            }
        ));
    }

    #[test]
    fn test_index_of_non_table() {
        let err = run_source("local x = 5 return x.field").unwrap_err();
        assert!(matches!(err, RuntimeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_arithmetic_type_mismatch() {
        let err = run_source("return {} + 1").unwrap_err();
        assert!(matches!(err, RuntimeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_unbounded_recursion_overflows() {
        let err = run_source("function spin() return spin() end return spin()").unwrap_err();
        assert!(matches!(err, RuntimeError::StackOverflow));
    }

    #[test]
    fn test_function_values_and_closure_calls() {
        let source = "
            local make = function()
                return function(x) return x * 2 end
            end
            local double = make()
            return double(21)
        ";
        assert_eq!(run_one(source), Value::Number(42.0));
    }

    #[test]
    fn test_builtin_type_and_tostring() {
        assert_eq!(run_one("return type({})"), Value::string("table"));
        assert_eq!(run_one("return type(print)"), Value::string("function"));
        assert_eq!(run_one("return tostring(12)"), Value::string("12"));
        assert_eq!(run_one("return tonumber('0x10')"), Value::Number(16.0));
    }

    #[test]
    fn test_math_builtins() {
        assert_eq!(run_one("return math.floor(2.9)"), Value::Number(2.0));
        assert_eq!(run_one("return math.max(3, 7)"), Value::Number(7.0));
    }
}
