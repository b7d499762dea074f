//! Tuple and list operations.
//!
//! The two sequence kinds share storage and most behavior; tuples are
//! immutable, so the mutating methods are offered on lists only.

use crate::args;
use crate::error::{Error, ErrorKind, RunResult};
use crate::heap::{Heap, HeapData, HeapId};
use crate::instance::Instance;
use crate::types::bind_method;
use crate::value::{value_eq, value_lt, MethodFn, Type, Value};

fn is_tuple(heap: &Heap, id: HeapId) -> bool {
    matches!(heap.get(id), HeapData::Tuple(_))
}

fn seq_type(heap: &Heap, id: HeapId) -> Type {
    if is_tuple(heap, id) {
        Type::Tuple
    } else {
        Type::List
    }
}

fn seq_len(heap: &Heap, id: HeapId) -> usize {
    heap.seq_items(id).len()
}

/// Maps a possibly negative index into `0..len`.
pub(crate) fn relative_index(len: usize, index: i32) -> Option<usize> {
    let absolute = if index < 0 {
        len as i64 + i64::from(index)
    } else {
        i64::from(index)
    };
    if (0..len as i64).contains(&absolute) {
        Some(absolute as usize)
    } else {
        None
    }
}

fn out_of_range(heap: &Heap, id: HeapId, index: i32) -> Error {
    let length = seq_len(heap, id);
    let kind = seq_type(heap, id);
    let message = if index >= 0 {
        format!("{kind} index out of range (0 <= {index} < {length})")
    } else {
        format!("{kind} index out of range (-{length} <= {index} < 0)")
    };
    Error::new(ErrorKind::Index, message)
}

/// `xs[i]` on a tuple or list.
pub(crate) fn subscript_get(heap: &mut Heap, id: HeapId, index: i32) -> RunResult<Value> {
    let absolute = relative_index(seq_len(heap, id), index)
        .ok_or_else(|| out_of_range(heap, id, index))?;
    Ok(heap.seq_get_cloned(id, absolute).expect("index in range"))
}

/// `xs[i] = v` on a list; takes ownership of `value`.
pub(crate) fn subscript_set(
    heap: &mut Heap,
    id: HeapId,
    index: i32,
    value: Value,
) -> RunResult<()> {
    let Some(absolute) = relative_index(seq_len(heap, id), index) else {
        value.drop_with_heap(heap);
        return Err(out_of_range(heap, id, index));
    };
    let old = match heap.get_mut(id) {
        HeapData::List(items) => std::mem::replace(&mut items[absolute], value),
        _ => unreachable!("subscript_set on non-list"),
    };
    old.drop_with_heap(heap);
    Ok(())
}

/// `delete xs[i]` on a list.
pub(crate) fn remove_at(heap: &mut Heap, id: HeapId, index: i32) -> RunResult<()> {
    let absolute = relative_index(seq_len(heap, id), index)
        .ok_or_else(|| out_of_range(heap, id, index))?;
    let old = match heap.get_mut(id) {
        HeapData::List(items) => items.remove(absolute),
        _ => unreachable!("remove_at on non-list"),
    };
    old.drop_with_heap(heap);
    Ok(())
}

/// Concatenation of two same-kind sequences.
pub(crate) fn concat(heap: &mut Heap, lhs: HeapId, rhs: HeapId, as_tuple: bool) -> Value {
    let mut items: Vec<Value> = heap
        .seq_items(lhs)
        .iter()
        .chain(heap.seq_items(rhs).iter())
        .map(Value::raw_copy)
        .collect();
    for item in &mut items {
        if let Value::Ref(id) = item {
            heap.inc_ref(*id);
        }
    }
    if as_tuple {
        heap.alloc_tuple(items)
    } else {
        heap.alloc_list(items)
    }
}

/// `xs * n`: the sequence repeated, keeping its kind.
pub(crate) fn repeat(heap: &mut Heap, id: HeapId, times: i32) -> Value {
    let source_len = seq_len(heap, id);
    let total = if times > 0 { source_len * times as usize } else { 0 };
    let mut items = Vec::with_capacity(total);
    for index in 0..total {
        items.push(
            heap.seq_get_cloned(id, index % source_len)
                .expect("index in range"),
        );
    }
    if is_tuple(heap, id) {
        heap.alloc_tuple(items)
    } else {
        heap.alloc_list(items)
    }
}

/// Indices selected by `start:stop:step` over a sequence of `len`.
///
/// Bounds are relative (negative counts from the end) and clamped; step 0
/// defaults to the sign of `stop - start`; a step pointing away from the
/// interval selects nothing.
pub(crate) fn slice_indices(len: usize, start: i32, stop: i32, step: i32) -> Vec<usize> {
    let len = len as i64;
    let relative = |index: i32| {
        if index < 0 {
            len + i64::from(index)
        } else {
            i64::from(index)
        }
    };
    let start = relative(start).clamp(0, len);
    let stop = relative(stop).clamp(0, len);

    let difference = stop - start;
    let step = if step == 0 {
        difference.signum()
    } else {
        i64::from(step)
    };
    if difference == 0 || step == 0 || (difference < 0) != (step < 0) {
        return Vec::new();
    }

    let mut indices = Vec::new();
    let mut index = start;
    if step > 0 {
        while index < stop {
            indices.push(index as usize);
            index += step;
        }
    } else {
        while index > stop {
            indices.push(index as usize);
            index += step;
        }
    }
    indices
}

/// `xs[a:b[:c]]`: a new list of the stepped elements.
pub(crate) fn slice_of(
    heap: &mut Heap,
    id: HeapId,
    start: i32,
    stop: i32,
    step: i32,
) -> Value {
    let indices = slice_indices(seq_len(heap, id), start, stop, step);
    let items: Vec<Value> = indices
        .into_iter()
        .map(|index| heap.seq_get_cloned(id, index).expect("index in range"))
        .collect();
    heap.alloc_list(items)
}

/// `xs.name`: `size` plus the built-in bound methods. Mutators are
/// list-only.
pub(crate) fn attribute(heap: &mut Heap, id: HeapId, name: &str) -> Option<Value> {
    if name == "size" {
        return Some(Value::Int(seq_len(heap, id) as i32));
    }
    let shared: Option<(&'static str, MethodFn)> = match name {
        "copy" => Some(("copy", m_copy)),
        "slice" => Some(("slice", m_slice)),
        "contains" => Some(("contains", m_contains)),
        "count" => Some(("count", m_count)),
        "index" => Some(("index", m_index)),
        "rindex" => Some(("rindex", m_rindex)),
        _ => None,
    };
    let mutating: Option<(&'static str, MethodFn)> = match name {
        "add" => Some(("add", m_add)),
        "extend" => Some(("extend", m_extend)),
        "insert" => Some(("insert", m_insert)),
        "remove" => Some(("remove", m_remove)),
        "pop" => Some(("pop", m_pop)),
        "clear" => Some(("clear", m_clear)),
        "reverse" => Some(("reverse", m_reverse)),
        "sort" => Some(("sort", m_sort)),
        _ => None,
    };

    let (name, method) = match (shared, mutating) {
        (Some(entry), _) => entry,
        (None, Some(entry)) if !is_tuple(heap, id) => entry,
        _ => return None,
    };
    Some(bind_method(heap, id, name, method))
}

fn receiver_id(receiver: &Value) -> HeapId {
    match receiver {
        Value::Ref(id) => *id,
        _ => unreachable!("sequence method on non-sequence receiver"),
    }
}

// list.add(item [, item...])
pub(crate) fn m_add(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("add", argv, 1, usize::MAX)?;
    let id = receiver_id(receiver);
    for item in argv {
        let item = item.clone_with_heap(&mut instance.heap);
        match instance.heap.get_mut(id) {
            HeapData::List(items) => items.push(item),
            _ => unreachable!("add on non-list"),
        }
    }
    Ok(Value::Null)
}

// list.extend(iterable)
pub(crate) fn m_extend(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("extend", argv, 1, 1)?;
    let id = receiver_id(receiver);
    let source = args::seq_arg(&instance.heap, "extend", argv, 0)?;
    for index in 0..seq_len(&instance.heap, source) {
        let item = instance
            .heap
            .seq_get_cloned(source, index)
            .expect("index in range");
        match instance.heap.get_mut(id) {
            HeapData::List(items) => items.push(item),
            _ => unreachable!("extend on non-list"),
        }
    }
    Ok(Value::Null)
}

// list.insert(index, item); the index is clamped into range
pub(crate) fn m_insert(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("insert", argv, 2, 2)?;
    let id = receiver_id(receiver);
    let length = seq_len(&instance.heap, id) as i64;
    let index = i64::from(args::int_arg(&instance.heap, "insert", argv, 0)?);
    let index = if index < 0 { length + index } else { index }.clamp(0, length) as usize;

    let item = argv[1].clone_with_heap(&mut instance.heap);
    match instance.heap.get_mut(id) {
        HeapData::List(items) => items.insert(index, item),
        _ => unreachable!("insert on non-list"),
    }
    Ok(Value::Null)
}

// list.remove(item): whether an equal element was removed
pub(crate) fn m_remove(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("remove", argv, 1, 1)?;
    let id = receiver_id(receiver);
    for index in 0..seq_len(&instance.heap, id) {
        let found = {
            let items = instance.heap.seq_items(id);
            value_eq(&instance.heap, &argv[0], &items[index])
        };
        if found {
            let old = match instance.heap.get_mut(id) {
                HeapData::List(items) => items.remove(index),
                _ => unreachable!("remove on non-list"),
            };
            old.drop_with_heap(&mut instance.heap);
            return Ok(Value::Int(1));
        }
    }
    Ok(Value::Int(0))
}

// list.pop(index = -1)
pub(crate) fn m_pop(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("pop", argv, 0, 1)?;
    let id = receiver_id(receiver);
    let index = if argv.is_empty() {
        -1
    } else {
        args::int_arg(&instance.heap, "pop", argv, 0)?
    };
    let absolute = relative_index(seq_len(&instance.heap, id), index)
        .ok_or_else(|| out_of_range(&instance.heap, id, index))?;
    let item = match instance.heap.get_mut(id) {
        HeapData::List(items) => items.remove(absolute),
        _ => unreachable!("pop on non-list"),
    };
    Ok(item)
}

pub(crate) fn m_clear(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("clear", argv, 0, 0)?;
    let id = receiver_id(receiver);
    let items = match instance.heap.get_mut(id) {
        HeapData::List(items) => std::mem::take(items),
        _ => unreachable!("clear on non-list"),
    };
    for item in items {
        item.drop_with_heap(&mut instance.heap);
    }
    Ok(Value::Null)
}

// Shallow copy; always a list, mirroring the free-function library.
pub(crate) fn m_copy(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("copy", argv, 0, 0)?;
    let id = receiver_id(receiver);
    let items: Vec<Value> = (0..seq_len(&instance.heap, id))
        .map(|index| {
            instance
                .heap
                .seq_get_cloned(id, index)
                .expect("index in range")
        })
        .collect();
    Ok(instance.heap.alloc_list(items))
}

// list.slice(begin = 0, end = size, step = 0)
pub(crate) fn m_slice(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("slice", argv, 0, 3)?;
    let id = receiver_id(receiver);
    let length = seq_len(&instance.heap, id) as i32;
    let start = if argv.is_empty() {
        0
    } else {
        args::int_arg(&instance.heap, "slice", argv, 0)?
    };
    let stop = if argv.len() < 2 {
        length
    } else {
        args::int_arg(&instance.heap, "slice", argv, 1)?
    };
    let step = if argv.len() < 3 {
        0
    } else {
        args::int_arg(&instance.heap, "slice", argv, 2)?
    };
    Ok(slice_of(&mut instance.heap, id, start, stop, step))
}

// In-place reversal; returns the receiver.
pub(crate) fn m_reverse(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("reverse", argv, 0, 0)?;
    let id = receiver_id(receiver);
    match instance.heap.get_mut(id) {
        HeapData::List(items) => items.reverse(),
        _ => unreachable!("reverse on non-list"),
    }
    Ok(receiver.clone_with_heap(&mut instance.heap))
}

// list.sort(comparator = ascending); returns the receiver.
//
// Bubble sort; the comparator decides whether two adjacent elements
// should swap, so comparators only need a single ordering test.
pub(crate) fn m_sort(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("sort", argv, 0, 1)?;
    let id = receiver_id(receiver);
    let comparator = if argv.is_empty() {
        None
    } else {
        Some(args::callable_arg(&instance.heap, "sort", argv, 0)?)
    };

    let length = seq_len(&instance.heap, id);
    for i in (0..length).rev() {
        for j in 1..=i {
            let should_swap = match comparator {
                None => {
                    let items = instance.heap.seq_items(id);
                    let (a, b) = (&items[j - 1], &items[j]);
                    value_lt(&instance.heap, b, a).unwrap_or(false)
                }
                Some(comparator) => {
                    let (a, b) = {
                        let items = instance.heap.seq_items(id);
                        (items[j - 1].raw_copy(), items[j].raw_copy())
                    };
                    let verdict = instance.call_value(comparator, &[a, b], "sort comparator")?;
                    let swap = verdict.truthy(&instance.heap);
                    verdict.drop_with_heap(&mut instance.heap);
                    swap
                }
            };
            if should_swap {
                match instance.heap.get_mut(id) {
                    HeapData::List(items) => items.swap(j - 1, j),
                    _ => unreachable!("sort on non-list"),
                }
            }
        }
    }
    Ok(receiver.clone_with_heap(&mut instance.heap))
}

pub(crate) fn m_contains(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("contains", argv, 1, 1)?;
    let id = receiver_id(receiver);
    let items = instance.heap.seq_items(id);
    let found = items
        .iter()
        .any(|item| value_eq(&instance.heap, &argv[0], item));
    Ok(Value::Int(i32::from(found)))
}

pub(crate) fn m_count(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("count", argv, 1, 1)?;
    let id = receiver_id(receiver);
    let items = instance.heap.seq_items(id);
    let count = items
        .iter()
        .filter(|item| value_eq(&instance.heap, &argv[0], item))
        .count();
    Ok(Value::Int(count as i32))
}

// list.index(item, begin = 0, end = size): first match or null
pub(crate) fn m_index(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("index", argv, 1, 3)?;
    let id = receiver_id(receiver);
    let length = seq_len(&instance.heap, id);
    let begin = if argv.len() > 1 {
        args::int_arg(&instance.heap, "index", argv, 1)?.max(0) as usize
    } else {
        0
    };
    let end = if argv.len() > 2 {
        (args::int_arg(&instance.heap, "index", argv, 2)?.max(0) as usize).min(length)
    } else {
        length
    };

    for index in begin..end {
        let items = instance.heap.seq_items(id);
        if value_eq(&instance.heap, &argv[0], &items[index]) {
            return Ok(Value::Int(index as i32));
        }
    }
    Ok(Value::Null)
}

// list.rindex(item, rbegin = size - 1, rend = 0): last match or null
pub(crate) fn m_rindex(instance: &mut Instance, receiver: &Value, argv: &[Value]) -> RunResult<Value> {
    args::check_count("rindex", argv, 1, 3)?;
    let id = receiver_id(receiver);
    let length = seq_len(&instance.heap, id);
    if length == 0 {
        return Ok(Value::Null);
    }
    let rbegin = if argv.len() > 1 {
        (args::int_arg(&instance.heap, "rindex", argv, 1)?.max(0) as usize).min(length - 1)
    } else {
        length - 1
    };
    let rend = if argv.len() > 2 {
        args::int_arg(&instance.heap, "rindex", argv, 2)?.max(0) as usize
    } else {
        0
    };

    for index in (rend..=rbegin).rev() {
        let items = instance.heap.seq_items(id);
        if value_eq(&instance.heap, &argv[0], &items[index]) {
            return Ok(Value::Int(index as i32));
        }
    }
    Ok(Value::Null)
}
