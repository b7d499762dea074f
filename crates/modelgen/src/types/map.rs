//! Map operations.
//!
//! Maps are insertion-ordered string-keyed dictionaries; object-like
//! attribute access is the primary idiom, with a small set of built-in
//! methods that shadow same-named keys.

use crate::args;
use crate::error::RunResult;
use crate::heap::{Heap, HeapData, HeapId};
use crate::instance::Instance;
use crate::types::bind_method;
use crate::value::{value_eq, MethodFn, Value};

/// `a + b`: a fresh map holding both, right-hand entries winning.
pub(crate) fn merged(heap: &mut Heap, lhs: HeapId, rhs: HeapId) -> Value {
    let id = heap.alloc_map();
    heap.map_merge(id, lhs);
    heap.map_merge(id, rhs);
    Value::Ref(id)
}

/// `m[key]`: the stored value, or null for a missing key.
pub(crate) fn subscript_get(heap: &mut Heap, id: HeapId, key: &str) -> Value {
    heap.map_get_cloned(id, key).unwrap_or(Value::Null)
}

/// `m.name`: `size` and the built-in methods first, then key lookup.
/// Never fails; a missing key reads as null.
pub(crate) fn attribute(heap: &mut Heap, id: HeapId, name: &str) -> Value {
    if name == "size" {
        return Value::Int(heap.map_len(id) as i32);
    }
    let entry: Option<(&'static str, MethodFn)> = match name {
        "has" => Some(("has", m_has)),
        "pop" => Some(("pop", m_pop)),
        "clear" => Some(("clear", m_clear)),
        "copy" => Some(("copy", m_copy)),
        "contains" => Some(("contains", m_contains)),
        "keys" => Some(("keys", m_keys)),
        "values" => Some(("values", m_values)),
        "pairs" => Some(("pairs", m_pairs)),
        _ => None,
    };
    match entry {
        Some((name, method)) => bind_method(heap, id, name, method),
        None => subscript_get(heap, id, name),
    }
}

fn receiver_id(receiver: &Value) -> HeapId {
    match receiver {
        Value::Ref(id) => *id,
        _ => unreachable!("map method on non-map receiver"),
    }
}

pub(crate) fn m_has(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("has", argv, 1, 1)?;
    let key = args::str_arg(&instance.heap, "has", argv, 0)?;
    let found = instance.heap.map_contains(receiver_id(receiver), key);
    Ok(Value::Int(i32::from(found)))
}

// map.pop(key): the removed value, or null
pub(crate) fn m_pop(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("pop", argv, 1, 1)?;
    let id = receiver_id(receiver);
    let key = args::str_arg(&instance.heap, "pop", argv, 0)?.to_owned();
    match instance.heap.map_get_cloned(id, &key) {
        Some(value) => {
            instance.heap.map_remove(id, &key);
            Ok(value)
        }
        None => Ok(Value::Null),
    }
}

pub(crate) fn m_clear(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("clear", argv, 0, 0)?;
    let id = receiver_id(receiver);
    let entries = match instance.heap.get_mut(id) {
        HeapData::Map(entries) => std::mem::take(entries),
        _ => unreachable!("clear on non-map"),
    };
    for (_, value) in entries {
        value.drop_with_heap(&mut instance.heap);
    }
    Ok(Value::Null)
}

pub(crate) fn m_copy(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("copy", argv, 0, 0)?;
    let id = receiver_id(receiver);
    let copy = instance.heap.alloc_map();
    instance.heap.map_merge(copy, id);
    Ok(Value::Ref(copy))
}

// map.contains(value): whether any stored value equals the argument
pub(crate) fn m_contains(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("contains", argv, 1, 1)?;
    let id = receiver_id(receiver);
    let found = match instance.heap.get(id) {
        HeapData::Map(entries) => entries
            .values()
            .any(|value| value_eq(&instance.heap, &argv[0], value)),
        _ => unreachable!("contains on non-map"),
    };
    Ok(Value::Int(i32::from(found)))
}

pub(crate) fn m_keys(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("keys", argv, 0, 0)?;
    let id = receiver_id(receiver);
    let keys: Vec<String> = match instance.heap.get(id) {
        HeapData::Map(entries) => entries.keys().cloned().collect(),
        _ => unreachable!("keys on non-map"),
    };
    let items: Vec<Value> = keys
        .into_iter()
        .map(|key| instance.heap.alloc_str(key))
        .collect();
    Ok(instance.heap.alloc_list(items))
}

pub(crate) fn m_values(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("values", argv, 0, 0)?;
    let id = receiver_id(receiver);
    let mut items = Vec::with_capacity(instance.heap.map_len(id));
    for index in 0..instance.heap.map_len(id) {
        let (_, value) = instance
            .heap
            .map_entry_cloned(id, index)
            .expect("index in range");
        items.push(value);
    }
    Ok(instance.heap.alloc_list(items))
}

// map.pairs(): list of (key, value) tuples in insertion order
pub(crate) fn m_pairs(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("pairs", argv, 0, 0)?;
    let id = receiver_id(receiver);
    let mut items = Vec::with_capacity(instance.heap.map_len(id));
    for index in 0..instance.heap.map_len(id) {
        let (key, value) = instance
            .heap
            .map_entry_cloned(id, index)
            .expect("index in range");
        let key = instance.heap.alloc_str(key);
        items.push(instance.heap.alloc_tuple(vec![key, value]));
    }
    Ok(instance.heap.alloc_list(items))
}
