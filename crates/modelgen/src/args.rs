//! Argument validation helpers for host functions and built-in methods.

use crate::error::{Error, ErrorKind, RunResult};
use crate::heap::{Heap, HeapData, HeapId};
use crate::value::{Type, Value};

fn argument_error(message: String) -> Error {
    Error::new(ErrorKind::Argument, message)
}

/// Enforces an inclusive argument-count range.
pub(crate) fn check_count(name: &str, args: &[Value], min: usize, max: usize) -> RunResult<()> {
    let count = args.len();
    if min == max && count != min {
        let plural = if min == 1 { "" } else { "s" };
        return Err(argument_error(format!(
            "{name} expects exactly {min} argument{plural}, received {count}"
        )));
    }
    if count < min {
        return Err(argument_error(format!(
            "{name} expected at least {min} arguments, received {count}"
        )));
    }
    if count > max {
        return Err(argument_error(format!(
            "{name} expected at most {max} arguments, received {count}"
        )));
    }
    Ok(())
}

fn wrong_kind(heap: &Heap, name: &str, index: usize, expected: &str, got: &Value) -> Error {
    argument_error(format!(
        "{name} expected argument {} as \"{expected}\", received \"{}\"",
        index + 1,
        got.type_of(heap)
    ))
}

pub(crate) fn int_arg(heap: &Heap, name: &str, args: &[Value], index: usize) -> RunResult<i32> {
    args[index]
        .as_int()
        .ok_or_else(|| wrong_kind(heap, name, index, Type::Int.name(), &args[index]))
}

pub(crate) fn number_arg(heap: &Heap, name: &str, args: &[Value], index: usize) -> RunResult<f32> {
    args[index]
        .as_number()
        .ok_or_else(|| wrong_kind(heap, name, index, "int or float", &args[index]))
}

pub(crate) fn str_arg<'a>(
    heap: &'a Heap,
    name: &str,
    args: &[Value],
    index: usize,
) -> RunResult<&'a str> {
    match &args[index] {
        Value::Ref(id) => match heap.get(*id) {
            HeapData::Str(text) => Ok(text),
            _ => Err(wrong_kind(heap, name, index, Type::Str.name(), &args[index])),
        },
        other => Err(wrong_kind(heap, name, index, Type::Str.name(), other)),
    }
}

/// A tuple or list argument, by heap id.
pub(crate) fn seq_arg(heap: &Heap, name: &str, args: &[Value], index: usize) -> RunResult<HeapId> {
    if let Value::Ref(id) = &args[index] {
        if matches!(heap.get(*id), HeapData::Tuple(_) | HeapData::List(_)) {
            return Ok(*id);
        }
    }
    Err(wrong_kind(heap, name, index, "tuple or list", &args[index]))
}

/// A callable argument, validated but returned as-is.
pub(crate) fn callable_arg<'a>(
    heap: &Heap,
    name: &str,
    args: &'a [Value],
    index: usize,
) -> RunResult<&'a Value> {
    if args[index].is_callable(heap) {
        Ok(&args[index])
    } else {
        Err(wrong_kind(heap, name, index, "a callable", &args[index]))
    }
}
