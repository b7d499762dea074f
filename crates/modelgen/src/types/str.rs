//! String operations: formatting, subscripting, methods.
//!
//! Strings are immutable; every operation builds a new value. Indexing and
//! lengths count characters, not bytes, so multi-byte source text behaves
//! sanely.

use crate::args;
use crate::error::{Error, ErrorKind, RunResult};
use crate::heap::{Heap, HeapData, HeapId};
use crate::instance::Instance;
use crate::types::{bind_method, list};
use crate::value::{to_display_string, Value};

/// Escapes control characters and quotes for quoted display.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// The `%` formatting operator: `template % args`.
///
/// Supports `%d`, `%f`, `%s` and `%%`; the argument count must match the
/// number of conversions. A non-tuple right operand acts as a 1-tuple.
pub(crate) fn format_values(heap: &mut Heap, template: HeapId, rhs: &Value) -> RunResult<Value> {
    let template = heap.str_value(template).to_owned();
    let fmt_args: Vec<Value> = match rhs {
        Value::Ref(id) => match heap.get(*id) {
            HeapData::Tuple(items) => items.iter().map(Value::raw_copy).collect(),
            _ => vec![rhs.raw_copy()],
        },
        other => vec![other.raw_copy()],
    };

    let format_error = |message: String| Error::new(ErrorKind::Format, message);
    let mut out = String::with_capacity(template.len());
    let mut next = 0;
    let take = |spec: char, next: &mut usize| -> RunResult<Value> {
        let value = fmt_args
            .get(*next)
            .map(Value::raw_copy)
            .ok_or_else(|| format_error(format!("Missing argument for format specifier %{spec}")))?;
        *next += 1;
        Ok(value)
    };

    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('d') => {
                let value = take('d', &mut next)?;
                match value {
                    Value::Int(i) => out.push_str(&i.to_string()),
                    other => {
                        return Err(format_error(format!(
                            "Format specifier %d expects \"int\", received \"{}\"",
                            other.type_of(heap)
                        )));
                    }
                }
            }
            Some('f') => {
                let value = take('f', &mut next)?;
                match value.as_number() {
                    Some(n) => out.push_str(&format!("{n:.6}")),
                    None => {
                        return Err(format_error(format!(
                            "Format specifier %f expects a number, received \"{}\"",
                            value.type_of(heap)
                        )));
                    }
                }
            }
            Some('s') => {
                let value = take('s', &mut next)?;
                out.push_str(&to_display_string(heap, &value));
            }
            Some(other) => {
                return Err(format_error(format!("Unsupported format specifier %{other}")));
            }
            None => return Err(format_error("Incomplete format specifier".to_owned())),
        }
    }

    if next != fmt_args.len() {
        return Err(format_error(format!(
            "Format expected {next} arguments, received {}",
            fmt_args.len()
        )));
    }
    Ok(heap.alloc_str(out))
}

pub(crate) fn char_count(text: &str) -> usize {
    text.chars().count()
}

/// `s[i]`: one-character string, negative indices count from the end.
pub(crate) fn subscript_get(heap: &mut Heap, id: HeapId, index: i32) -> RunResult<Value> {
    let text = heap.str_value(id);
    let length = char_count(text);
    let Some(absolute) = list::relative_index(length, index) else {
        return Err(Error::new(
            ErrorKind::Index,
            format!("string index out of range (-{length} <= {index} < {length})"),
        ));
    };
    let c = text.chars().nth(absolute).expect("index in range");
    Ok(heap.alloc_str(c.to_string()))
}

/// `s[a:b[:c]]`: a new string of the stepped characters.
pub(crate) fn slice(
    heap: &mut Heap,
    id: HeapId,
    start: i32,
    stop: i32,
    step: i32,
) -> RunResult<Value> {
    let chars: Vec<char> = heap.str_value(id).chars().collect();
    let indices = list::slice_indices(chars.len(), start, stop, step);
    let sliced: String = indices.into_iter().map(|i| chars[i]).collect();
    Ok(heap.alloc_str(sliced))
}

/// `s.name`: `length` plus the built-in bound methods.
pub(crate) fn attribute(heap: &mut Heap, id: HeapId, name: &str) -> Option<Value> {
    if name == "length" {
        return Some(Value::Int(char_count(heap.str_value(id)) as i32));
    }
    let (name, method): (&'static str, crate::value::MethodFn) = match name {
        "upper" => ("upper", m_upper),
        "lower" => ("lower", m_lower),
        "trim" => ("trim", m_trim),
        "split" => ("split", m_split),
        "join" => ("join", m_join),
        "replace" => ("replace", m_replace),
        "contains" => ("contains", m_contains),
        "starts_with" => ("starts_with", m_starts_with),
        "ends_with" => ("ends_with", m_ends_with),
        "index" => ("index", m_index),
        _ => return None,
    };
    Some(bind_method(heap, id, name, method))
}

fn receiver_text(instance: &Instance, receiver: &Value) -> String {
    match receiver {
        Value::Ref(id) => instance.heap.str_value(*id).to_owned(),
        _ => unreachable!("string method on non-string receiver"),
    }
}

fn m_upper(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("upper", argv, 0, 0)?;
    let text = receiver_text(instance, receiver).to_uppercase();
    Ok(instance.heap.alloc_str(text))
}

fn m_lower(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("lower", argv, 0, 0)?;
    let text = receiver_text(instance, receiver).to_lowercase();
    Ok(instance.heap.alloc_str(text))
}

fn m_trim(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("trim", argv, 0, 0)?;
    let text = receiver_text(instance, receiver).trim().to_owned();
    Ok(instance.heap.alloc_str(text))
}

fn m_split(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("split", argv, 0, 1)?;
    let text = receiver_text(instance, receiver);
    let parts: Vec<String> = if argv.is_empty() {
        text.split_whitespace().map(str::to_owned).collect()
    } else {
        let separator = args::str_arg(&instance.heap, "split", argv, 0)?.to_owned();
        text.split(&separator).map(str::to_owned).collect()
    };
    let items: Vec<Value> = parts
        .into_iter()
        .map(|part| instance.heap.alloc_str(part))
        .collect();
    Ok(instance.heap.alloc_list(items))
}

fn m_join(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("join", argv, 1, 1)?;
    let separator = receiver_text(instance, receiver);
    let seq = args::seq_arg(&instance.heap, "join", argv, 0)?;
    let mut out = String::new();
    for (index, item) in instance.heap.seq_items(seq).iter().enumerate() {
        if index > 0 {
            out.push_str(&separator);
        }
        out.push_str(&to_display_string(&instance.heap, item));
    }
    Ok(instance.heap.alloc_str(out))
}

fn m_replace(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("replace", argv, 2, 2)?;
    let text = receiver_text(instance, receiver);
    let from = args::str_arg(&instance.heap, "replace", argv, 0)?.to_owned();
    let to = args::str_arg(&instance.heap, "replace", argv, 1)?.to_owned();
    let replaced = if from.is_empty() {
        text
    } else {
        text.replace(&from, &to)
    };
    Ok(instance.heap.alloc_str(replaced))
}

fn m_contains(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("contains", argv, 1, 1)?;
    let text = receiver_text(instance, receiver);
    let needle = args::str_arg(&instance.heap, "contains", argv, 0)?;
    Ok(Value::Int(i32::from(text.contains(needle))))
}

fn m_starts_with(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("starts_with", argv, 1, 1)?;
    let text = receiver_text(instance, receiver);
    let prefix = args::str_arg(&instance.heap, "starts_with", argv, 0)?;
    Ok(Value::Int(i32::from(text.starts_with(prefix))))
}

fn m_ends_with(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("ends_with", argv, 1, 1)?;
    let text = receiver_text(instance, receiver);
    let suffix = args::str_arg(&instance.heap, "ends_with", argv, 0)?;
    Ok(Value::Int(i32::from(text.ends_with(suffix))))
}

/// Character index of the first occurrence, or null.
fn m_index(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("index", argv, 1, 1)?;
    let text = receiver_text(instance, receiver);
    let needle = args::str_arg(&instance.heap, "index", argv, 0)?;
    match text.find(needle) {
        Some(byte_pos) => Ok(Value::Int(char_count(&text[..byte_pos]) as i32)),
        None => Ok(Value::Null),
    }
}
