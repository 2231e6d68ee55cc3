//! The global environment a host hands to the virtual machine.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::value::{NativeFunction, Table, TableKey, Value};
use crate::error::RuntimeError;

/// A mutable name→value mapping of globals.
///
/// The environment is owned by the host and outlives any single VM
/// run; the VM mutates it only through global-store instructions.
/// Reading a name that was never set yields nil.
#[derive(Default)]
pub struct Environment {
    globals: IndexMap<String, Value, ahash::RandomState>,
}

impl Environment {
    /// An empty environment with no builtins.
    pub fn new() -> Self {
        Self::default()
    }

    /// An environment pre-loaded with the baseline builtins scripts
    /// expect from the host runtime.
    pub fn with_stdlib() -> Self {
        let mut env = Self::new();
        env.register_builtins();
        env
    }

    pub fn get(&self, name: &str) -> Value {
        self.globals.get(name).cloned().unwrap_or(Value::Nil)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    pub fn define_native(
        &mut self,
        name: &str,
        arity: Option<usize>,
        func: impl Fn(&[Value]) -> Result<Vec<Value>, RuntimeError> + 'static,
    ) {
        self.set(name, Value::Native(NativeFunction::new(name, arity, func)));
    }

    fn register_builtins(&mut self) {
        self.define_native("print", None, |args| {
            let line = args
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("\t");
            println!("{}", line);
            Ok(Vec::new())
        });

        self.define_native("type", Some(1), |args| {
            Ok(vec![Value::string(args[0].type_name())])
        });

        self.define_native("tostring", Some(1), |args| {
            Ok(vec![Value::string(args[0].to_string())])
        });

        self.define_native("tonumber", Some(1), |args| {
            let result = match &args[0] {
                Value::Number(n) => Value::Number(*n),
                Value::Str(s) => {
                    let text = s.trim();
                    let parsed = if let Some(hex) = text
                        .strip_prefix("0x")
                        .or_else(|| text.strip_prefix("0X"))
                    {
                        i64::from_str_radix(hex, 16).ok().map(|n| n as f64)
                    } else {
                        text.parse::<f64>().ok()
                    };
                    parsed.map(Value::Number).unwrap_or(Value::Nil)
                }
                _ => Value::Nil,
            };
            Ok(vec![result])
        });

        self.define_native("assert", Some(1), |args| {
            if args[0].is_truthy() {
                Ok(args.to_vec())
            } else {
                let message = args
                    .get(1)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "assertion failed!".to_string());
                Err(RuntimeError::type_mismatch(message))
            }
        });

        self.define_native("next", Some(1), |args| {
            let Value::Table(t) = &args[0] else {
                return Err(RuntimeError::type_mismatch(format!(
                    "bad argument to 'next': table expected, got {}",
                    args[0].type_name()
                )));
            };
            let key = match args.get(1) {
                None | Some(Value::Nil) => None,
                Some(v) => Some(TableKey::from_value(v)?),
            };
            match t.borrow().next_entry(key.as_ref()) {
                Some((k, v)) => Ok(vec![k.to_value(), v]),
                None => Ok(vec![Value::Nil]),
            }
        });

        // pairs(t) -> next, t, nil
        let next = self.get("next");
        self.define_native("pairs", Some(1), move |args| {
            let Value::Table(_) = &args[0] else {
                return Err(RuntimeError::type_mismatch(format!(
                    "bad argument to 'pairs': table expected, got {}",
                    args[0].type_name()
                )));
            };
            Ok(vec![next.clone(), args[0].clone(), Value::Nil])
        });

        // ipairs(t) -> iterator, t, 0
        let step = Value::Native(NativeFunction::new("ipairs_iter", Some(2), |args| {
            let Value::Table(t) = &args[0] else {
                return Err(RuntimeError::type_mismatch("ipairs iterator lost its table"));
            };
            let Value::Number(i) = &args[1] else {
                return Err(RuntimeError::type_mismatch("ipairs control must be a number"));
            };
            let next_index = i + 1.0;
            let value = t.borrow().get(&TableKey::from_number(next_index));
            if matches!(value, Value::Nil) {
                Ok(vec![Value::Nil])
            } else {
                Ok(vec![Value::Number(next_index), value])
            }
        }));
        self.define_native("ipairs", Some(1), move |args| {
            let Value::Table(_) = &args[0] else {
                return Err(RuntimeError::type_mismatch(format!(
                    "bad argument to 'ipairs': table expected, got {}",
                    args[0].type_name()
                )));
            };
            Ok(vec![step.clone(), args[0].clone(), Value::Number(0.0)])
        });

        self.set("math", math_table());
    }
}

/// The `math` builtin table.
fn math_table() -> Value {
    let mut math = Table::new();

    let mut put = |name: &str, arity: usize, f: fn(&[Value]) -> Result<Vec<Value>, RuntimeError>| {
        math.set(
            TableKey::Str(Rc::new(name.to_string())),
            Value::Native(NativeFunction::new(format!("math.{}", name), Some(arity), f)),
        );
    };

    put("floor", 1, |args| {
        Ok(vec![Value::Number(number_arg(args, 0, "math.floor")?.floor())])
    });
    put("ceil", 1, |args| {
        Ok(vec![Value::Number(number_arg(args, 0, "math.ceil")?.ceil())])
    });
    put("abs", 1, |args| {
        Ok(vec![Value::Number(number_arg(args, 0, "math.abs")?.abs())])
    });
    put("sqrt", 1, |args| {
        Ok(vec![Value::Number(number_arg(args, 0, "math.sqrt")?.sqrt())])
    });
    put("max", 2, |args| {
        let a = number_arg(args, 0, "math.max")?;
        let b = number_arg(args, 1, "math.max")?;
        Ok(vec![Value::Number(a.max(b))])
    });
    put("min", 2, |args| {
        let a = number_arg(args, 0, "math.min")?;
        let b = number_arg(args, 1, "math.min")?;
        Ok(vec![Value::Number(a.min(b))])
    });

    math.set(
        TableKey::Str(Rc::new("pi".to_string())),
        Value::Number(std::f64::consts::PI),
    );
    math.set(
        TableKey::Str(Rc::new("huge".to_string())),
        Value::Number(f64::INFINITY),
    );

    Value::table(math)
}

fn number_arg(args: &[Value], index: usize, who: &str) -> Result<f64, RuntimeError> {
    match args.get(index) {
        Some(Value::Number(n)) => Ok(*n),
        Some(other) => Err(RuntimeError::type_mismatch(format!(
            "bad argument #{} to '{}': number expected, got {}",
            index + 1,
            who,
            other.type_name()
        ))),
        None => Err(RuntimeError::type_mismatch(format!(
            "bad argument #{} to '{}': number expected, got no value",
            index + 1,
            who
        ))),
    }
}
