//! Runtime values for the virtual machine.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::chunk::Chunk;
use crate::error::RuntimeError;

/// Signature of a host-provided native function.
pub type NativeFn = Rc<dyn Fn(&[Value]) -> Result<Vec<Value>, RuntimeError>>;

/// A dynamically-typed runtime value.
#[derive(Clone)]
pub enum Value {
    /// nil
    Nil,
    /// Boolean value
    Bool(bool),
    /// Number value; all numbers are f64
    Number(f64),
    /// String value
    Str(Rc<String>),
    /// Table value
    Table(Rc<RefCell<Table>>),
    /// A function backed by a compiled chunk
    Function(Rc<Chunk>),
    /// A host-provided native function
    Native(NativeFunction),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(Rc::new(s.into()))
    }

    pub fn table(t: Table) -> Self {
        Value::Table(Rc::new(RefCell::new(t)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) | Value::Native(_) => "function",
        }
    }

    /// Only nil and false are falsey.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Render a number the way scripts expect: integral values print
    /// without a fractional part.
    pub fn format_number(n: f64) -> String {
        if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
            format!("{}", n as i64)
        } else {
            format!("{}", n)
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(&a.func, &b.func),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Table(_) => write!(f, "Table(..)"),
            Value::Function(_) => write!(f, "Function(..)"),
            Value::Native(n) => write!(f, "Native({})", n.name),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", Value::format_number(*n)),
            Value::Str(s) => write!(f, "{}", s),
            Value::Table(t) => write!(f, "table: {:p}", Rc::as_ptr(t)),
            Value::Function(c) => write!(f, "function: {:p}", Rc::as_ptr(c)),
            Value::Native(n) => write!(f, "function: builtin {}", n.name),
        }
    }
}

/// A host-provided function with a name for diagnostics and an
/// optional fixed arity.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub arity: Option<usize>,
    pub func: NativeFn,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        arity: Option<usize>,
        func: impl Fn(&[Value]) -> Result<Vec<Value>, RuntimeError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            arity,
            func: Rc::new(func),
        }
    }

    pub fn call(&self, args: &[Value]) -> Result<Vec<Value>, RuntimeError> {
        if let Some(arity) = self.arity {
            if args.len() < arity {
                return Err(RuntimeError::type_mismatch(format!(
                    "{} expects {} argument(s), got {}",
                    self.name,
                    arity,
                    args.len()
                )));
            }
        }
        (self.func)(args)
    }
}

/// Keys a table can hold. Scalar values only; tables and functions are
/// rejected as keys before reaching this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TableKey {
    /// Number key, stored by bit pattern; -0.0 normalizes to 0.0.
    Number(u64),
    Str(Rc<String>),
    Bool(bool),
}

impl TableKey {
    pub fn from_value(value: &Value) -> Result<TableKey, RuntimeError> {
        match value {
            Value::Number(n) => {
                if n.is_nan() {
                    return Err(RuntimeError::type_mismatch("table index is NaN"));
                }
                let n = if *n == 0.0 { 0.0 } else { *n };
                Ok(TableKey::Number(n.to_bits()))
            }
            Value::Str(s) => Ok(TableKey::Str(s.clone())),
            Value::Bool(b) => Ok(TableKey::Bool(*b)),
            Value::Nil => Err(RuntimeError::type_mismatch("table index is nil")),
            other => Err(RuntimeError::type_mismatch(format!(
                "a {} cannot be a table index",
                other.type_name()
            ))),
        }
    }

    pub fn from_number(n: f64) -> TableKey {
        let n = if n == 0.0 { 0.0 } else { n };
        TableKey::Number(n.to_bits())
    }

    pub fn to_value(&self) -> Value {
        match self {
            TableKey::Number(bits) => Value::Number(f64::from_bits(*bits)),
            TableKey::Str(s) => Value::Str(s.clone()),
            TableKey::Bool(b) => Value::Bool(*b),
        }
    }
}

/// A table: ordered key→value map. Iteration follows insertion order,
/// so `pairs` is deterministic. Storing nil removes the entry.
#[derive(Default)]
pub struct Table {
    entries: IndexMap<TableKey, Value, ahash::RandomState>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &TableKey) -> Value {
        self.entries.get(key).cloned().unwrap_or(Value::Nil)
    }

    pub fn set(&mut self, key: TableKey, value: Value) {
        if matches!(value, Value::Nil) {
            self.entries.shift_remove(&key);
        } else {
            self.entries.insert(key, value);
        }
    }

    pub fn len_entries(&self) -> usize {
        self.entries.len()
    }

    /// The `#` border: the count of consecutive integer keys from 1.
    pub fn border(&self) -> usize {
        let mut n = 0usize;
        loop {
            let key = TableKey::from_number((n + 1) as f64);
            if self.entries.contains_key(&key) {
                n += 1;
            } else {
                return n;
            }
        }
    }

    /// The entry following `key` in insertion order, or the first
    /// entry when `key` is nil. Drives the `next` builtin.
    pub fn next_entry(&self, key: Option<&TableKey>) -> Option<(TableKey, Value)> {
        let index = match key {
            None => 0,
            Some(k) => self.entries.get_index_of(k)? + 1,
        };
        self.entries
            .get_index(index)
            .map(|(k, v)| (k.clone(), v.clone()))
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Table({} entries)", self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Number(0.0).is_truthy());
        assert!(Value::string("").is_truthy());
    }

    #[test]
    fn test_integer_and_float_keys_collide() {
        let mut t = Table::new();
        t.set(TableKey::from_number(1.0), Value::Number(10.0));
        assert_eq!(t.get(&TableKey::from_number(1.0)), Value::Number(10.0));
        // 1 and 1.0 are the same f64, same key
        let key = TableKey::from_value(&Value::Number(1.0)).unwrap();
        assert_eq!(t.get(&key), Value::Number(10.0));
    }

    #[test]
    fn test_border_counts_consecutive_from_one() {
        let mut t = Table::new();
        t.set(TableKey::from_number(1.0), Value::Bool(true));
        t.set(TableKey::from_number(2.0), Value::Bool(true));
        t.set(TableKey::from_number(4.0), Value::Bool(true));
        assert_eq!(t.border(), 2);
    }

    #[test]
    fn test_nil_assignment_deletes() {
        let mut t = Table::new();
        t.set(TableKey::from_number(1.0), Value::Bool(true));
        t.set(TableKey::from_number(1.0), Value::Nil);
        assert_eq!(t.border(), 0);
        assert_eq!(t.get(&TableKey::from_number(1.0)), Value::Nil);
    }

    #[test]
    fn test_nil_key_rejected() {
        assert!(TableKey::from_value(&Value::Nil).is_err());
        assert!(TableKey::from_value(&Value::Number(f64::NAN)).is_err());
    }

    #[test]
    fn test_next_entry_walks_insertion_order() {
        let mut t = Table::new();
        t.set(TableKey::Str(Rc::new("a".to_string())), Value::Number(1.0));
        t.set(TableKey::Str(Rc::new("b".to_string())), Value::Number(2.0));

        let (k1, _) = t.next_entry(None).unwrap();
        let (k2, _) = t.next_entry(Some(&k1)).unwrap();
        assert_eq!(k1, TableKey::Str(Rc::new("a".to_string())));
        assert_eq!(k2, TableKey::Str(Rc::new("b".to_string())));
        assert!(t.next_entry(Some(&k2)).is_none());
    }
}
