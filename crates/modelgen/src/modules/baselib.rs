//! The base library: built-ins consulted last during name resolution.

use crate::args;
use crate::error::{Error, ErrorKind, RunResult};
use crate::heap::{Heap, HeapData, HeapId};
use crate::instance::Instance;
use crate::modules::{new_static, set_cfn, set_int};
use crate::value::{to_display_string, Type, Value};

pub(crate) const VERSION: (i32, i32, i32) = (0, 1, 0);

/// Builds the base module: `true`/`false`, the language `version` tuple,
/// and the built-in functions.
pub(crate) fn create(heap: &mut Heap) -> HeapId {
    let (module, globals) = new_static(heap, "base");

    set_int(heap, globals, "false", 0);
    set_int(heap, globals, "true", 1);

    let version = heap.alloc_tuple(vec![
        Value::Int(VERSION.0),
        Value::Int(VERSION.1),
        Value::Int(VERSION.2),
    ]);
    heap.map_insert(globals, "version", version);

    set_cfn(heap, globals, "print", mg_print);
    set_cfn(heap, globals, "range", mg_range);
    set_cfn(heap, globals, "type", mg_type);
    set_cfn(heap, globals, "len", mg_len);
    set_cfn(heap, globals, "int", mg_int);
    set_cfn(heap, globals, "float", mg_float);
    set_cfn(heap, globals, "str", mg_str);
    set_cfn(heap, globals, "traceback", mg_traceback);
    set_cfn(heap, globals, "globals", mg_globals);
    set_cfn(heap, globals, "locals", mg_locals);

    module
}

fn mg_print(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    let mut line = String::new();
    for (index, value) in argv.iter().enumerate() {
        if index > 0 {
            line.push(' ');
        }
        line.push_str(&to_display_string(&instance.heap, value));
    }
    line.push('\n');
    instance.print.write_str(&line);
    Ok(Value::Null)
}

/// Integers in the half-closed interval `[start, stop)`, as a tuple.
pub(crate) fn range_int(heap: &mut Heap, start: i32, stop: i32, step: i32) -> Value {
    let (start, stop) = (i64::from(start), i64::from(stop));
    let difference = stop - start;
    if difference == 0 {
        return heap.alloc_tuple(Vec::new());
    }

    let step = if step == 0 {
        difference.signum()
    } else {
        i64::from(step)
    };
    if (difference < 0) != (step < 0) {
        return heap.alloc_tuple(Vec::new());
    }

    let length = difference / step + i64::from(difference % step != 0);
    let items: Vec<Value> = (0..length)
        .map(|index| Value::Int((start + step * index) as i32))
        .collect();
    heap.alloc_tuple(items)
}

fn range_float(heap: &mut Heap, start: f32, stop: f32, step: f32) -> Value {
    let difference = stop - start;
    if difference == 0.0 {
        return heap.alloc_tuple(Vec::new());
    }

    let step = if step == 0.0 {
        difference.signum()
    } else {
        step
    };
    let length = (difference / step).ceil() as i64;
    if length <= 0 {
        return heap.alloc_tuple(Vec::new());
    }

    let items: Vec<Value> = (0..length)
        .map(|index| Value::Float(start + step * index as f32))
        .collect();
    heap.alloc_tuple(items)
}

// range(stop), range(start, stop), range(start, stop, step); float
// arguments produce a float range.
fn mg_range(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("range", argv, 1, 3)?;
    let mut is_int = true;
    for (index, value) in argv.iter().enumerate() {
        match value {
            Value::Int(_) => {}
            Value::Float(_) => is_int = false,
            other => {
                return Err(Error::new(
                    ErrorKind::Argument,
                    format!(
                        "range expected argument {} as \"{}\" or \"{}\", received \"{}\"",
                        index + 1,
                        Type::Int,
                        Type::Float,
                        other.type_of(&instance.heap)
                    ),
                ));
            }
        }
    }

    if is_int {
        let mut bounds = [0i32; 3];
        if argv.len() == 1 {
            bounds[1] = argv[0].as_int().expect("checked int");
        } else {
            for (index, value) in argv.iter().enumerate() {
                bounds[index] = value.as_int().expect("checked int");
            }
        }
        if argv.len() > 2 && bounds[2] == 0 {
            return Err(Error::new(ErrorKind::Argument, "step cannot be 0"));
        }
        Ok(range_int(&mut instance.heap, bounds[0], bounds[1], bounds[2]))
    } else {
        let mut bounds = [0f32; 3];
        if argv.len() == 1 {
            bounds[1] = argv[0].as_number().expect("checked number");
        } else {
            for (index, value) in argv.iter().enumerate() {
                bounds[index] = value.as_number().expect("checked number");
            }
        }
        if argv.len() > 2 && bounds[2] == 0.0 {
            return Err(Error::new(ErrorKind::Argument, "step cannot be 0"));
        }
        Ok(range_float(
            &mut instance.heap,
            bounds[0],
            bounds[1],
            bounds[2],
        ))
    }
}

fn mg_type(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("type", argv, 1, 1)?;
    let name = argv[0].type_of(&instance.heap).name();
    Ok(instance.heap.alloc_str(name))
}

pub(crate) fn mg_len(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("len", argv, 1, 1)?;
    let length = match &argv[0] {
        Value::Ref(id) => match instance.heap.get(*id) {
            HeapData::Tuple(items) | HeapData::List(items) => Some(items.len()),
            HeapData::Map(entries) => Some(entries.len()),
            HeapData::Str(text) => Some(crate::types::str::char_count(text)),
            _ => None,
        },
        _ => None,
    };
    match length {
        Some(length) => Ok(Value::Int(length as i32)),
        None => Err(Error::new(
            ErrorKind::Argument,
            format!("\"{}\" has no length", argv[0].type_of(&instance.heap)),
        )),
    }
}

// int(x), int(string, base)
fn mg_int(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("int", argv, 1, 2)?;

    let base = if argv.len() == 2 {
        let base = args::int_arg(&instance.heap, "int", argv, 1)?;
        if !(2..=36).contains(&base) {
            return Err(Error::new(ErrorKind::Argument, "int base must be in 2..36"));
        }
        base as u32
    } else {
        10
    };

    match &argv[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) => Ok(Value::Int(*f as i32)),
        Value::Ref(id) => {
            if let HeapData::Str(text) = instance.heap.get(*id) {
                let text = text.trim();
                i32::from_str_radix(text, base).map(Value::Int).map_err(|_| {
                    Error::new(
                        ErrorKind::Argument,
                        format!("Invalid integer \"{text}\""),
                    )
                })
            } else {
                Err(int_kind_error(instance, &argv[0]))
            }
        }
        _ => Err(int_kind_error(instance, &argv[0])),
    }
}

fn int_kind_error(instance: &Instance, value: &Value) -> Error {
    Error::new(
        ErrorKind::Argument,
        format!(
            "int expected argument as \"{}\" or \"{}\" or \"{}\", received \"{}\"",
            Type::Int,
            Type::Float,
            Type::Str,
            value.type_of(&instance.heap)
        ),
    )
}

fn mg_float(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("float", argv, 1, 1)?;
    match &argv[0] {
        Value::Int(i) => Ok(Value::Float(*i as f32)),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Ref(id) => {
            if let HeapData::Str(text) = instance.heap.get(*id) {
                let text = text.trim();
                text.parse().map(Value::Float).map_err(|_| {
                    Error::new(ErrorKind::Argument, format!("Invalid float \"{text}\""))
                })
            } else {
                Err(float_kind_error(instance, &argv[0]))
            }
        }
        _ => Err(float_kind_error(instance, &argv[0])),
    }
}

fn float_kind_error(instance: &Instance, value: &Value) -> Error {
    Error::new(
        ErrorKind::Argument,
        format!(
            "float expected argument as \"{}\" or \"{}\" or \"{}\", received \"{}\"",
            Type::Int,
            Type::Float,
            Type::Str,
            value.type_of(&instance.heap)
        ),
    )
}

fn mg_str(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("str", argv, 1, 1)?;
    let text = to_display_string(&instance.heap, &argv[0]);
    Ok(instance.heap.alloc_str(text))
}

// Prints the current call stack, outermost frame first.
fn mg_traceback(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("traceback", argv, 0, 0)?;
    let mut out = String::from("Traceback:\n");
    for (depth, frame) in instance.capture_traceback().iter().enumerate() {
        if frame.name.is_none() && frame.loc.is_none() {
            continue;
        }
        out.push_str(&format!("{depth}:"));
        if let Some(name) = &frame.name {
            out.push_str(&format!(" {name}"));
        }
        if let Some(loc) = &frame.loc {
            if frame.name.is_some() {
                out.push_str(" at");
            }
            out.push_str(&format!(" {loc}"));
        }
        out.push('\n');
    }
    instance.print.write_str(&out);
    Ok(Value::Null)
}

// The calling module's globals map, shared.
fn mg_globals(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("globals", argv, 0, 0)?;
    let module = instance.frames.last().expect("active frame").module;
    let globals = instance.heap.module(module).globals;
    instance.heap.inc_ref(globals);
    Ok(Value::Ref(globals))
}

// The caller's locals map, shared.
fn mg_locals(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("locals", argv, 0, 0)?;
    let index = instance
        .frames
        .len()
        .checked_sub(2)
        .expect("locals requires a caller frame");
    let locals = instance.frames[index].locals;
    instance.heap.inc_ref(locals);
    Ok(Value::Ref(locals))
}
