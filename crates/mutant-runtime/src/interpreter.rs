//! Fuel-limited stack interpreter for raw instruction streams.

use crate::module::Module;
use mutant_core::{Error, Result, RuntimeConfig, Value};
use mutant_ir::instruction::has_operand;
use mutant_ir::{CompareOp, Function, Opcode};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::trace;

/// Anything that can live on the operand stack
#[derive(Debug, Clone)]
pub enum Object {
    Value(Value),
    Function(Arc<Function>),
}

impl Object {
    pub fn repr(&self) -> String {
        match self {
            Object::Value(v) => v.repr(),
            Object::Function(f) => format!("<function {}>", f.name),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Object::Value(Value::None))
    }

    fn is_truthy(&self) -> bool {
        match self {
            Object::Value(v) => v.is_truthy(),
            Object::Function(_) => true,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Object::Value(v) => v.type_name(),
            Object::Function(_) => "function",
        }
    }

    fn into_value(self) -> Result<Value> {
        match self {
            Object::Value(v) => Ok(v),
            Object::Function(f) => Err(type_error(format!(
                "function {} cannot be stored in a tuple",
                f.name
            ))),
        }
    }
}

impl From<Value> for Object {
    fn from(value: Value) -> Self {
        Object::Value(value)
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn number(value: &Value) -> Option<Num> {
    match value {
        Value::Bool(b) => Some(Num::Int(*b as i64)),
        Value::Int(v) => Some(Num::Int(*v)),
        Value::Float(v) => Some(Num::Float(*v)),
        _ => None,
    }
}

fn as_float(n: Num) -> f64 {
    match n {
        Num::Int(v) => v as f64,
        Num::Float(v) => v,
    }
}

fn type_error(message: String) -> Error {
    Error::Runtime(format!("TypeError: {}", message))
}

fn overflow() -> Error {
    Error::Runtime("OverflowError: integer overflow".to_string())
}

fn zero_division() -> Error {
    Error::Runtime("ZeroDivisionError: division by zero".to_string())
}

/// Executes functions bound in a module
pub struct Interpreter<'m> {
    module: &'m Module,
    config: RuntimeConfig,
    fuel_used: u64,
    depth: usize,
}

impl<'m> Interpreter<'m> {
    pub fn new(module: &'m Module, config: RuntimeConfig) -> Self {
        Self {
            module,
            config,
            fuel_used: 0,
            depth: 0,
        }
    }

    pub fn module(&self) -> &'m Module {
        self.module
    }

    pub fn fuel_used(&self) -> u64 {
        self.fuel_used
    }

    /// Call whatever is currently bound under `name`
    pub fn call_global(&mut self, name: &str, args: Vec<Object>) -> Result<Object> {
        let function = self.lookup(name)?;
        self.call(&function, args)
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<Function>> {
        self.module.get(name).ok_or_else(|| {
            Error::Runtime(format!("NameError: name '{}' is not defined", name))
        })
    }

    pub fn call(&mut self, function: &Arc<Function>, args: Vec<Object>) -> Result<Object> {
        let code = &function.code;
        let argcount = code.argcount as usize;
        let required = argcount.saturating_sub(function.defaults.len());
        if args.len() > argcount || args.len() < required {
            return Err(type_error(format!(
                "{}() takes {} arguments ({} given)",
                function.name,
                argcount,
                args.len()
            )));
        }

        let mut locals: Vec<Option<Object>> = vec![None; code.nlocals as usize];
        let given = args.len();
        for (slot, arg) in locals.iter_mut().zip(args) {
            *slot = Some(arg);
        }
        for i in given..argcount {
            let default = function.defaults[i - required].clone();
            locals[i] = Some(Object::Value(default));
        }

        if self.depth >= self.config.max_call_depth {
            return Err(Error::Runtime(
                "RecursionError: maximum call depth exceeded".to_string(),
            ));
        }
        self.depth += 1;
        let result = self.execute(function, locals);
        self.depth -= 1;
        result
    }

    fn consume_fuel(&mut self) -> Result<()> {
        self.fuel_used += 1;
        if self.fuel_used > self.config.max_fuel {
            return Err(Error::FuelExhausted(self.config.max_fuel));
        }
        Ok(())
    }

    fn execute(&mut self, function: &Arc<Function>, mut locals: Vec<Option<Object>>) -> Result<Object> {
        let code = &function.code;
        let bytes = &code.code;
        let mut stack: Vec<Object> = Vec::with_capacity(code.stack_size as usize);
        let mut pc = 0usize;

        loop {
            if pc >= bytes.len() {
                return Err(Error::Runtime(format!(
                    "SystemError: execution ran past the end of {}",
                    function.name
                )));
            }
            self.consume_fuel()?;

            let opcode = bytes[pc];
            let (arg, next) = if has_operand(opcode) {
                if pc + 2 >= bytes.len() {
                    return Err(Error::Decode(format!(
                        "truncated operand at offset {} in {}",
                        pc, function.name
                    )));
                }
                (
                    usize::from(bytes[pc + 1]) | (usize::from(bytes[pc + 2]) << 8),
                    pc + 3,
                )
            } else {
                (0, pc + 1)
            };
            let op = Opcode::from_byte(opcode).ok_or_else(|| {
                Error::Runtime(format!(
                    "SystemError: unknown opcode {} at offset {} in {}",
                    opcode, pc, function.name
                ))
            })?;
            trace!(function = %function.name, pc, %op, arg, "step");
            pc = next;

            match op {
                Opcode::Nop => {}
                Opcode::PopTop => {
                    pop(&mut stack)?;
                }
                Opcode::RotTwo => {
                    let top = pop(&mut stack)?;
                    let second = pop(&mut stack)?;
                    stack.push(top);
                    stack.push(second);
                }
                Opcode::DupTop => {
                    let top = peek(&stack)?.clone();
                    stack.push(top);
                }
                Opcode::UnaryPositive | Opcode::UnaryNegative => {
                    let value = pop(&mut stack)?;
                    stack.push(unary(op, value)?);
                }
                Opcode::UnaryNot => {
                    let value = pop(&mut stack)?;
                    stack.push(Object::Value(Value::Bool(!value.is_truthy())));
                }
                Opcode::BinaryAdd
                | Opcode::BinarySubtract
                | Opcode::BinaryMultiply
                | Opcode::BinaryModulo
                | Opcode::BinaryFloorDivide
                | Opcode::BinarySubscr => {
                    let rhs = pop(&mut stack)?;
                    let lhs = pop(&mut stack)?;
                    stack.push(binary(op, lhs, rhs, self.config.max_sequence_len)?);
                }
                Opcode::ReturnValue => return pop(&mut stack),
                Opcode::LoadConst => {
                    let value = code.consts.get(arg).ok_or_else(|| {
                        Error::Runtime(format!("SystemError: literal {} out of range", arg))
                    })?;
                    stack.push(Object::Value(value.clone()));
                }
                Opcode::BuildTuple => {
                    if arg > stack.len() {
                        return Err(Error::Runtime("SystemError: stack underflow".to_string()));
                    }
                    let items = stack
                        .split_off(stack.len() - arg)
                        .into_iter()
                        .map(Object::into_value)
                        .collect::<Result<Vec<_>>>()?;
                    stack.push(Object::Value(Value::Tuple(items)));
                }
                Opcode::CompareOp => {
                    let cmp = CompareOp::from_index(arg as u16).ok_or_else(|| {
                        Error::Runtime(format!("SystemError: bad comparison {}", arg))
                    })?;
                    let rhs = pop(&mut stack)?;
                    let lhs = pop(&mut stack)?;
                    let result = compare(cmp, &lhs, &rhs)?;
                    stack.push(Object::Value(Value::Bool(result)));
                }
                Opcode::JumpForward => pc = next + arg,
                Opcode::JumpAbsolute => pc = arg,
                Opcode::JumpIfFalse => {
                    if !peek(&stack)?.is_truthy() {
                        pc = next + arg;
                    }
                }
                Opcode::JumpIfTrue => {
                    if peek(&stack)?.is_truthy() {
                        pc = next + arg;
                    }
                }
                Opcode::PopJumpIfFalse => {
                    if !pop(&mut stack)?.is_truthy() {
                        pc = arg;
                    }
                }
                Opcode::PopJumpIfTrue => {
                    if pop(&mut stack)?.is_truthy() {
                        pc = arg;
                    }
                }
                Opcode::LoadGlobal => {
                    let name = code.names.get(arg).ok_or_else(|| {
                        Error::Runtime(format!("SystemError: name {} out of range", arg))
                    })?;
                    stack.push(Object::Function(self.lookup(name)?));
                }
                Opcode::LoadFast => {
                    let value = locals.get(arg).cloned().flatten().ok_or_else(|| {
                        let name = code.varnames.get(arg).map(String::as_str).unwrap_or("?");
                        Error::Runtime(format!(
                            "UnboundLocalError: local variable '{}' referenced before assignment",
                            name
                        ))
                    })?;
                    stack.push(value);
                }
                Opcode::StoreFast => {
                    let value = pop(&mut stack)?;
                    let slot = locals.get_mut(arg).ok_or_else(|| {
                        Error::Runtime(format!("SystemError: local {} out of range", arg))
                    })?;
                    *slot = Some(value);
                }
                Opcode::CallFunction => {
                    if arg + 1 > stack.len() {
                        return Err(Error::Runtime("SystemError: stack underflow".to_string()));
                    }
                    let args = stack.split_off(stack.len() - arg);
                    let callee = pop(&mut stack)?;
                    let result = match callee {
                        Object::Function(f) => self.call(&f, args)?,
                        other => {
                            return Err(type_error(format!(
                                "'{}' object is not callable",
                                other.type_name()
                            )))
                        }
                    };
                    stack.push(result);
                }
            }
        }
    }
}

fn pop(stack: &mut Vec<Object>) -> Result<Object> {
    stack
        .pop()
        .ok_or_else(|| Error::Runtime("SystemError: stack underflow".to_string()))
}

fn peek(stack: &[Object]) -> Result<&Object> {
    stack
        .last()
        .ok_or_else(|| Error::Runtime("SystemError: stack underflow".to_string()))
}

fn unary(op: Opcode, value: Object) -> Result<Object> {
    let num = match &value {
        Object::Value(v) => number(v),
        Object::Function(_) => None,
    };
    let result = match (op, num) {
        (Opcode::UnaryPositive, Some(Num::Int(v))) => Value::Int(v),
        (Opcode::UnaryPositive, Some(Num::Float(v))) => Value::Float(v),
        (Opcode::UnaryNegative, Some(Num::Int(v))) => Value::Int(v.checked_neg().ok_or_else(overflow)?),
        (Opcode::UnaryNegative, Some(Num::Float(v))) => Value::Float(-v),
        _ => {
            return Err(type_error(format!(
                "bad operand type for unary {}: '{}'",
                if op == Opcode::UnaryPositive { "+" } else { "-" },
                value.type_name()
            )))
        }
    };
    Ok(Object::Value(result))
}

fn floor_div(a: i64, b: i64) -> Result<i64> {
    if b == 0 {
        return Err(zero_division());
    }
    let q = a.checked_div(b).ok_or_else(overflow)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

fn modulo(a: i64, b: i64) -> Result<i64> {
    if b == 0 {
        return Err(zero_division());
    }
    let r = a.checked_rem(b).ok_or_else(overflow)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn index(len: usize, i: i64) -> Result<usize> {
    let resolved = if i < 0 { len as i64 + i } else { i };
    if resolved < 0 || resolved >= len as i64 {
        return Err(Error::Runtime("IndexError: index out of range".to_string()));
    }
    Ok(resolved as usize)
}

/// Length of a sequence built from `len` items repeated `times` times
fn sequence_len(len: usize, times: usize, limit: usize) -> Result<usize> {
    match len.checked_mul(times) {
        Some(total) if total <= limit => Ok(total),
        _ => Err(Error::Runtime(format!(
            "OverflowError: sequence longer than {} items",
            limit
        ))),
    }
}

/// Repeat count for `sequence * n`; negative counts repeat zero times
fn repeat_count(n: i64) -> usize {
    usize::try_from(n).unwrap_or(if n < 0 { 0 } else { usize::MAX })
}

fn binary(op: Opcode, lhs: Object, rhs: Object, limit: usize) -> Result<Object> {
    let (lhs, rhs) = match (lhs, rhs) {
        (Object::Value(l), Object::Value(r)) => (l, r),
        (l, r) => {
            return Err(type_error(format!(
                "unsupported operand types for {}: '{}' and '{}'",
                op,
                l.type_name(),
                r.type_name()
            )))
        }
    };

    let result = match (op, number(&lhs), number(&rhs)) {
        (_, Some(Num::Int(a)), Some(Num::Int(b))) if op != Opcode::BinarySubscr => match op {
            Opcode::BinaryAdd => Value::Int(a.checked_add(b).ok_or_else(overflow)?),
            Opcode::BinarySubtract => Value::Int(a.checked_sub(b).ok_or_else(overflow)?),
            Opcode::BinaryMultiply => Value::Int(a.checked_mul(b).ok_or_else(overflow)?),
            Opcode::BinaryModulo => Value::Int(modulo(a, b)?),
            _ => Value::Int(floor_div(a, b)?),
        },
        (_, Some(a), Some(b)) if op != Opcode::BinarySubscr => {
            let (a, b) = (as_float(a), as_float(b));
            match op {
                Opcode::BinaryAdd => Value::Float(a + b),
                Opcode::BinarySubtract => Value::Float(a - b),
                Opcode::BinaryMultiply => Value::Float(a * b),
                _ if b == 0.0 => return Err(zero_division()),
                Opcode::BinaryModulo => Value::Float(a - b * (a / b).floor()),
                _ => Value::Float((a / b).floor()),
            }
        }
        _ => match (op, &lhs, &rhs) {
            (Opcode::BinaryAdd, Value::Str(a), Value::Str(b)) => {
                sequence_len(a.len().saturating_add(b.len()), 1, limit)?;
                Value::Str(format!("{}{}", a, b))
            }
            (Opcode::BinaryAdd, Value::Tuple(a), Value::Tuple(b)) => {
                sequence_len(a.len().saturating_add(b.len()), 1, limit)?;
                Value::Tuple(a.iter().chain(b).cloned().collect())
            }
            (Opcode::BinaryMultiply, Value::Str(s), Value::Int(n))
            | (Opcode::BinaryMultiply, Value::Int(n), Value::Str(s)) => {
                let times = repeat_count(*n);
                sequence_len(s.len(), times, limit)?;
                Value::Str(s.repeat(times))
            }
            (Opcode::BinarySubscr, Value::Str(s), Value::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                Value::Str(chars[index(chars.len(), *i)?].to_string())
            }
            (Opcode::BinarySubscr, Value::Tuple(items), Value::Int(i)) => {
                items[index(items.len(), *i)?].clone()
            }
            _ => {
                return Err(type_error(format!(
                    "unsupported operand types for {}: '{}' and '{}'",
                    op,
                    lhs.type_name(),
                    rhs.type_name()
                )))
            }
        },
    };
    Ok(Object::Value(result))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (number(a), number(b)) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => x == y,
        (Some(x), Some(y)) => as_float(x) == as_float(y),
        _ => match (a, b) {
            (Value::Tuple(x), Value::Tuple(y)) => {
                x.len() == y.len() && x.iter().zip(y).all(|(p, q)| values_equal(p, q))
            }
            _ => a == b,
        },
    }
}

fn objects_equal(a: &Object, b: &Object) -> bool {
    match (a, b) {
        (Object::Value(x), Object::Value(y)) => values_equal(x, y),
        (Object::Function(x), Object::Function(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (number(a), number(b)) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => Some(x.cmp(&y)),
        (Some(x), Some(y)) => as_float(x).partial_cmp(&as_float(y)),
        _ => match (a, b) {
            (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
            (Value::Tuple(x), Value::Tuple(y)) => {
                for (p, q) in x.iter().zip(y) {
                    if !values_equal(p, q) {
                        return order(p, q);
                    }
                }
                Some(x.len().cmp(&y.len()))
            }
            _ => None,
        },
    }
}

fn identical(a: &Object, b: &Object) -> bool {
    match (a, b) {
        (Object::Value(x), Object::Value(y)) => match (x, y) {
            (Value::Float(p), Value::Float(q)) => p.to_bits() == q.to_bits(),
            _ => x == y,
        },
        (Object::Function(x), Object::Function(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

fn contains(item: &Object, container: &Object) -> Result<bool> {
    match (item, container) {
        (Object::Value(Value::Str(needle)), Object::Value(Value::Str(haystack))) => {
            Ok(haystack.contains(needle.as_str()))
        }
        (Object::Value(_), Object::Value(Value::Str(_))) => Err(type_error(format!(
            "'in <string>' requires string as left operand, not {}",
            item.type_name()
        ))),
        (Object::Value(v), Object::Value(Value::Tuple(items))) => {
            Ok(items.iter().any(|x| values_equal(v, x)))
        }
        (Object::Function(_), Object::Value(Value::Tuple(_))) => Ok(false),
        _ => Err(type_error(format!(
            "argument of type '{}' is not iterable",
            container.type_name()
        ))),
    }
}

fn compare(op: CompareOp, lhs: &Object, rhs: &Object) -> Result<bool> {
    match op {
        CompareOp::Eq => Ok(objects_equal(lhs, rhs)),
        CompareOp::Ne => Ok(!objects_equal(lhs, rhs)),
        CompareOp::Is => Ok(identical(lhs, rhs)),
        CompareOp::IsNot => Ok(!identical(lhs, rhs)),
        CompareOp::In => contains(lhs, rhs),
        CompareOp::NotIn => contains(lhs, rhs).map(|found| !found),
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            let ordering = match (lhs, rhs) {
                (Object::Value(a), Object::Value(b)) => order(a, b),
                _ => None,
            };
            let ordering = ordering.ok_or_else(|| {
                type_error(format!(
                    "unorderable types: {}() {} {}()",
                    lhs.type_name(),
                    op,
                    rhs.type_name()
                ))
            })?;
            Ok(match op {
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
        CompareOp::ExceptionMatch | CompareOp::Bad => Err(Error::Runtime(format!(
            "SystemError: comparison '{}' is not supported",
            op
        ))),
    }
}
