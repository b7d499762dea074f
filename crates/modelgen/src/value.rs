//! The runtime value model and its shared operations.
//!
//! [`Value`] is a hybrid tagged variant: null and numbers are stored
//! inline, host function pointers are immediate, and everything else lives
//! on the arena heap behind a counted [`HeapId`]. `Clone` is intentionally
//! not derived — use [`Value::clone_with_heap`] to create a new counted
//! reference and [`Value::drop_with_heap`] to release one. `raw_copy` is
//! the uncounted building block for transient peeks and must never be
//! dropped through the heap.
//!
//! Operator semantics are dispatched by a match over `(kind, operator)`
//! pairs; per-kind helpers live in [`crate::types`].

use std::fmt;

use strum::IntoStaticStr;

use crate::ast::{BinOp, UnaryOp};
use crate::error::{Error, ErrorKind, RunResult};
use crate::heap::{Heap, HeapData, HeapId};
use crate::instance::Instance;
use crate::types::func::FuncKind;
use crate::types::{list, map, str as str_type};

/// Host-supplied free function: `(instance, argv) -> value`.
pub(crate) type CFn = fn(&mut Instance, &[Value]) -> RunResult<Value>;

/// Host-supplied method: `(instance, receiver, argv) -> value`.
pub(crate) type MethodFn = fn(&mut Instance, &Value, &[Value]) -> RunResult<Value>;

/// A named host function value.
#[derive(Clone, Copy)]
pub struct CFunction {
    pub(crate) name: &'static str,
    pub(crate) func: CFn,
}

impl CFunction {
    pub(crate) fn new(name: &'static str, func: CFn) -> Self {
        Self { name, func }
    }
}

impl fmt::Debug for CFunction {
    // A fn pointer prints as an address; the name is the useful part.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CFunction").field("name", &self.name).finish()
    }
}

/// A host method bound to its receiver value.
///
/// The receiver is an owned counted reference, dropped with the binding.
#[derive(Debug)]
pub struct BoundCFunction {
    pub(crate) name: &'static str,
    pub(crate) method: MethodFn,
    pub(crate) receiver: Value,
}

/// The ten value kinds, by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum Type {
    #[strum(serialize = "null")]
    Null,
    #[strum(serialize = "int")]
    Int,
    #[strum(serialize = "float")]
    Float,
    #[strum(serialize = "string")]
    Str,
    #[strum(serialize = "tuple")]
    Tuple,
    #[strum(serialize = "list")]
    List,
    #[strum(serialize = "map")]
    Map,
    #[strum(serialize = "cfunc")]
    CFunc,
    #[strum(serialize = "bound cfunc")]
    BoundCFunc,
    #[strum(serialize = "func")]
    Func,
    #[strum(serialize = "proc")]
    Proc,
    #[strum(serialize = "module")]
    Module,
}

impl Type {
    pub fn name(self) -> &'static str {
        self.into()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A runtime value. See the module docs for the ownership discipline.
#[derive(Debug)]
pub enum Value {
    Null,
    Int(i32),
    Float(f32),
    CFunc(CFunction),
    Ref(HeapId),
}

impl Value {
    /// Uncounted bit copy. The result must not be dropped through the
    /// heap; promote it with an `inc_ref` first (see `clone_with_heap`).
    pub(crate) fn raw_copy(&self) -> Self {
        match self {
            Self::Null => Self::Null,
            Self::Int(i) => Self::Int(*i),
            Self::Float(f) => Self::Float(*f),
            Self::CFunc(c) => Self::CFunc(*c),
            Self::Ref(id) => Self::Ref(*id),
        }
    }

    /// Creates a new counted reference to the same value.
    pub(crate) fn clone_with_heap(&self, heap: &mut Heap) -> Self {
        if let Self::Ref(id) = self {
            heap.inc_ref(*id);
        }
        self.raw_copy()
    }

    /// Releases this reference.
    pub(crate) fn drop_with_heap(self, heap: &mut Heap) {
        if let Self::Ref(id) = self {
            heap.dec_ref(id);
        }
    }

    pub(crate) fn type_of(&self, heap: &Heap) -> Type {
        match self {
            Self::Null => Type::Null,
            Self::Int(_) => Type::Int,
            Self::Float(_) => Type::Float,
            Self::CFunc(_) => Type::CFunc,
            Self::Ref(id) => match heap.get(*id) {
                HeapData::Str(_) => Type::Str,
                HeapData::Tuple(_) => Type::Tuple,
                HeapData::List(_) => Type::List,
                HeapData::Map(_) => Type::Map,
                HeapData::BoundCFunc(_) => Type::BoundCFunc,
                HeapData::Func(func) => match func.kind {
                    FuncKind::Function => Type::Func,
                    FuncKind::Procedure => Type::Proc,
                },
                HeapData::Module(_) => Type::Module,
            },
        }
    }

    /// The Boolean projection used by conditionals and logical operators.
    pub(crate) fn truthy(&self, heap: &Heap) -> bool {
        match self {
            Self::Null => false,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::CFunc(_) => true,
            Self::Ref(id) => match heap.get(*id) {
                HeapData::Str(text) => !text.is_empty(),
                HeapData::Tuple(items) | HeapData::List(items) => !items.is_empty(),
                HeapData::Map(entries) => !entries.is_empty(),
                HeapData::BoundCFunc(_) | HeapData::Func(_) | HeapData::Module(_) => true,
            },
        }
    }

    pub(crate) fn is_callable(&self, heap: &Heap) -> bool {
        matches!(
            self.type_of(heap),
            Type::CFunc | Type::BoundCFunc | Type::Func | Type::Proc
        )
    }

    pub(crate) fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub(crate) fn as_number(&self) -> Option<f32> {
        match self {
            Self::Int(i) => Some(*i as f32),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// Formats a float the way the language prints it.
pub(crate) fn float_to_string(value: f32) -> String {
    let mut buffer = ryu::Buffer::new();
    buffer.format(value).to_owned()
}

/// Stringifies for `print` and `str`: top-level strings stay raw.
pub(crate) fn to_display_string(heap: &Heap, value: &Value) -> String {
    if let Value::Ref(id) = value {
        if let HeapData::Str(text) = heap.get(*id) {
            return text.clone();
        }
    }
    to_repr_string(heap, value)
}

/// Stringifies for containers and inspection: strings are quoted.
pub(crate) fn to_repr_string(heap: &Heap, value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => float_to_string(*f),
        Value::CFunc(c) => format!("<cfunc {}>", c.name),
        Value::Ref(id) => match heap.get(*id) {
            HeapData::Str(text) => format!("\"{}\"", str_type::escape(text)),
            HeapData::Tuple(items) => seq_repr(heap, items, '(', ')'),
            HeapData::List(items) => seq_repr(heap, items, '[', ']'),
            HeapData::Map(entries) => {
                let mut out = String::from("{");
                for (index, (key, item)) in entries.iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    out.push('"');
                    out.push_str(&str_type::escape(key));
                    out.push_str("\": ");
                    out.push_str(&to_repr_string(heap, item));
                }
                out.push('}');
                out
            }
            HeapData::BoundCFunc(bound) => format!("<bound cfunc {}>", bound.name),
            HeapData::Func(func) => match func.kind {
                FuncKind::Function => "<func>".to_owned(),
                FuncKind::Procedure => "<proc>".to_owned(),
            },
            HeapData::Module(module) => format!("<module {}>", module.name),
        },
    }
}

fn seq_repr(heap: &Heap, items: &[Value], open: char, close: char) -> String {
    let mut out = String::new();
    out.push(open);
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        out.push_str(&to_repr_string(heap, item));
    }
    out.push(close);
    out
}

/// `==` across all kind pairs. Total: unsupported pairs are unequal.
pub(crate) fn value_eq(heap: &Heap, lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f32) == *b,
        (Value::CFunc(a), Value::CFunc(b)) => a.name == b.name,
        (Value::Ref(a), Value::Ref(b)) => {
            if a == b {
                return true;
            }
            match (heap.get(*a), heap.get(*b)) {
                (HeapData::Str(a), HeapData::Str(b)) => a == b,
                (HeapData::Tuple(a), HeapData::Tuple(b))
                | (HeapData::List(a), HeapData::List(b)) => {
                    a.len() == b.len()
                        && a.iter().zip(b.iter()).all(|(x, y)| value_eq(heap, x, y))
                }
                (HeapData::Map(a), HeapData::Map(b)) => {
                    a.len() == b.len()
                        && a.iter().all(|(key, value)| {
                            b.get(key).is_some_and(|other| value_eq(heap, value, other))
                        })
                }
                _ => false,
            }
        }
        _ => false,
    }
}

/// `<` where defined: numbers, strings, same-kind sequences.
pub(crate) fn value_lt(heap: &Heap, lhs: &Value, rhs: &Value) -> Option<bool> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a < b),
        (Value::Float(_) | Value::Int(_), Value::Float(_) | Value::Int(_)) => {
            Some(lhs.as_number()? < rhs.as_number()?)
        }
        (Value::Ref(a), Value::Ref(b)) => match (heap.get(*a), heap.get(*b)) {
            (HeapData::Str(a), HeapData::Str(b)) => Some(a < b),
            (HeapData::Tuple(a), HeapData::Tuple(b)) | (HeapData::List(a), HeapData::List(b)) => {
                seq_lt(heap, a, b, false)
            }
            _ => None,
        },
        _ => None,
    }
}

/// `<=` where defined.
pub(crate) fn value_le(heap: &Heap, lhs: &Value, rhs: &Value) -> Option<bool> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a <= b),
        (Value::Float(_) | Value::Int(_), Value::Float(_) | Value::Int(_)) => {
            Some(lhs.as_number()? <= rhs.as_number()?)
        }
        (Value::Ref(a), Value::Ref(b)) => match (heap.get(*a), heap.get(*b)) {
            (HeapData::Str(a), HeapData::Str(b)) => Some(a <= b),
            (HeapData::Tuple(a), HeapData::Tuple(b)) | (HeapData::List(a), HeapData::List(b)) => {
                seq_lt(heap, a, b, true)
            }
            _ => None,
        },
        _ => None,
    }
}

/// Lexicographic sequence comparison; `or_equal` selects `<=` over `<`.
fn seq_lt(heap: &Heap, a: &[Value], b: &[Value], or_equal: bool) -> Option<bool> {
    for (x, y) in a.iter().zip(b.iter()) {
        if value_eq(heap, x, y) {
            continue;
        }
        return value_lt(heap, x, y);
    }
    Some(if or_equal { a.len() <= b.len() } else { a.len() < b.len() })
}

fn unsupported_binary(heap: &Heap, op: BinOp, lhs: &Value, rhs: &Value) -> Error {
    Error::new(
        ErrorKind::Type,
        format!(
            "Unsupported binary operator {} for left-hand type \"{}\" and right-hand type \"{}\"",
            op.symbol(),
            lhs.type_of(heap),
            rhs.type_of(heap)
        ),
    )
}

fn zero_division() -> Error {
    Error::new(ErrorKind::ZeroDivision, "Division by zero")
}

fn is_zero(value: &Value) -> bool {
    matches!(value, Value::Int(0)) || matches!(value, Value::Float(f) if *f == 0.0)
}

/// Applies a non-short-circuit binary operator.
///
/// The operands stay owned by the caller; the result is a fresh value.
/// `and`/`or`/`??`/`?:` never reach this — the evaluator short-circuits
/// them before both operands exist.
pub(crate) fn binary_op(
    heap: &mut Heap,
    op: BinOp,
    lhs: &Value,
    rhs: &Value,
) -> RunResult<Value> {
    match op {
        BinOp::Add => add(heap, lhs, rhs),
        BinOp::Sub => arithmetic(heap, op, lhs, rhs, i32::wrapping_sub, |a, b| a - b),
        BinOp::Mul => mul(heap, lhs, rhs),
        BinOp::Div => div(heap, lhs, rhs),
        BinOp::IntDiv => int_div(heap, lhs, rhs),
        BinOp::Mod => modulo(heap, lhs, rhs),
        BinOp::Eq => Ok(Value::Int(i32::from(value_eq(heap, lhs, rhs)))),
        BinOp::NotEq => Ok(Value::Int(i32::from(!value_eq(heap, lhs, rhs)))),
        BinOp::Less => compare(heap, op, lhs, rhs),
        BinOp::LessEq => compare(heap, op, lhs, rhs),
        BinOp::Greater => compare(heap, op, lhs, rhs),
        BinOp::GreaterEq => compare(heap, op, lhs, rhs),
        BinOp::And | BinOp::Or | BinOp::Coalesce | BinOp::Conditional => {
            unreachable!("short-circuit operators are evaluated by the interpreter")
        }
    }
}

fn compare(heap: &Heap, op: BinOp, lhs: &Value, rhs: &Value) -> RunResult<Value> {
    let result = match op {
        BinOp::Less => value_lt(heap, lhs, rhs),
        BinOp::LessEq => value_le(heap, lhs, rhs),
        BinOp::Greater => value_lt(heap, rhs, lhs),
        BinOp::GreaterEq => value_le(heap, rhs, lhs),
        _ => unreachable!(),
    };
    result
        .map(|b| Value::Int(i32::from(b)))
        .ok_or_else(|| unsupported_binary(heap, op, lhs, rhs))
}

/// `+` and `-`/numeric cells: ints wrap, mixed operands promote to float.
fn arithmetic(
    heap: &Heap,
    op: BinOp,
    lhs: &Value,
    rhs: &Value,
    int_op: fn(i32, i32) -> i32,
    float_op: fn(f32, f32) -> f32,
) -> RunResult<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(*a, *b))),
        (Value::Float(_) | Value::Int(_), Value::Float(_) | Value::Int(_)) => Ok(Value::Float(
            float_op(lhs.as_number().expect("numeric"), rhs.as_number().expect("numeric")),
        )),
        _ => Err(unsupported_binary(heap, op, lhs, rhs)),
    }
}

fn add(heap: &mut Heap, lhs: &Value, rhs: &Value) -> RunResult<Value> {
    if let (Value::Ref(a), Value::Ref(b)) = (lhs, rhs) {
        match (heap.get(*a), heap.get(*b)) {
            (HeapData::Str(x), HeapData::Str(y)) => {
                let joined = format!("{x}{y}");
                return Ok(heap.alloc_str(joined));
            }
            (HeapData::Tuple(_), HeapData::Tuple(_)) => {
                return Ok(list::concat(heap, *a, *b, true));
            }
            (HeapData::List(_), HeapData::List(_)) => {
                return Ok(list::concat(heap, *a, *b, false));
            }
            (HeapData::Map(_), HeapData::Map(_)) => {
                return Ok(map::merged(heap, *a, *b));
            }
            _ => {}
        }
    }
    arithmetic(heap, BinOp::Add, lhs, rhs, i32::wrapping_add, |a, b| a + b)
}

fn mul(heap: &mut Heap, lhs: &Value, rhs: &Value) -> RunResult<Value> {
    let repeat = match (lhs, rhs) {
        (Value::Ref(id), Value::Int(n)) | (Value::Int(n), Value::Ref(id)) => Some((*id, *n)),
        _ => None,
    };
    if let Some((id, times)) = repeat {
        match heap.get(id) {
            HeapData::Str(text) => {
                let repeated = text.repeat(times.max(0) as usize);
                return Ok(heap.alloc_str(repeated));
            }
            HeapData::Tuple(_) | HeapData::List(_) => {
                return Ok(list::repeat(heap, id, times));
            }
            _ => {}
        }
    }
    arithmetic(heap, BinOp::Mul, lhs, rhs, i32::wrapping_mul, |a, b| a * b)
}

/// `/` always produces a float; division by zero is fatal.
fn div(heap: &Heap, lhs: &Value, rhs: &Value) -> RunResult<Value> {
    match (lhs.as_number(), rhs.as_number()) {
        (Some(a), Some(b)) => {
            if is_zero(rhs) {
                return Err(zero_division());
            }
            Ok(Value::Float(a / b))
        }
        _ => Err(unsupported_binary(heap, BinOp::Div, lhs, rhs)),
    }
}

/// `//`: integers truncate toward zero, floats floor.
fn int_div(heap: &Heap, lhs: &Value, rhs: &Value) -> RunResult<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                return Err(zero_division());
            }
            if *a == i32::MIN && *b == -1 {
                return Err(Error::new(ErrorKind::Overflow, "Integer overflow in //"));
            }
            Ok(Value::Int(a / b))
        }
        (Value::Float(_) | Value::Int(_), Value::Float(_) | Value::Int(_)) => {
            if is_zero(rhs) {
                return Err(zero_division());
            }
            let (a, b) = (lhs.as_number().expect("numeric"), rhs.as_number().expect("numeric"));
            Ok(Value::Float((a / b).floor()))
        }
        _ => Err(unsupported_binary(heap, BinOp::IntDiv, lhs, rhs)),
    }
}

/// `%`: remainder takes the sign of the left operand; on a string left
/// operand it is the formatting operator.
fn modulo(heap: &mut Heap, lhs: &Value, rhs: &Value) -> RunResult<Value> {
    if let Value::Ref(id) = lhs {
        if matches!(heap.get(*id), HeapData::Str(_)) {
            return str_type::format_values(heap, *id, rhs);
        }
    }
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                return Err(zero_division());
            }
            Ok(Value::Int(a.wrapping_rem(*b)))
        }
        (Value::Float(_) | Value::Int(_), Value::Float(_) | Value::Int(_)) => {
            if is_zero(rhs) {
                return Err(zero_division());
            }
            let (a, b) = (lhs.as_number().expect("numeric"), rhs.as_number().expect("numeric"));
            Ok(Value::Float(a % b))
        }
        _ => Err(unsupported_binary(heap, BinOp::Mod, lhs, rhs)),
    }
}

/// Unary `+ - not`.
pub(crate) fn unary_op(heap: &Heap, op: UnaryOp, operand: &Value) -> RunResult<Value> {
    match op {
        UnaryOp::Pos => match operand {
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::Float(f) => Ok(Value::Float(*f)),
            _ => Err(unsupported_unary(heap, op, operand)),
        },
        UnaryOp::Neg => match operand {
            Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
            Value::Float(f) => Ok(Value::Float(-f)),
            _ => Err(unsupported_unary(heap, op, operand)),
        },
        UnaryOp::Not => Ok(Value::Int(i32::from(!operand.truthy(heap)))),
    }
}

fn unsupported_unary(heap: &Heap, op: UnaryOp, operand: &Value) -> Error {
    Error::new(
        ErrorKind::Type,
        format!(
            "Unsupported unary operator {} for type \"{}\"",
            op.symbol(),
            operand.type_of(heap)
        ),
    )
}
