//! The static `list` module: free-function counterparts of the list
//! methods, taking the list as their first argument.

use crate::args;
use crate::error::{Error, ErrorKind, RunResult};
use crate::heap::{HeapData, HeapId};
use crate::instance::Instance;
use crate::modules::{baselib, new_static, set_cfn};
use crate::types::list;
use crate::value::{Type, Value};

pub(crate) fn create(heap: &mut crate::heap::Heap) -> HeapId {
    let (module, globals) = new_static(heap, "list");

    set_cfn(heap, globals, "add", lst_add); // list.add(list, item [, item...])
    set_cfn(heap, globals, "add_from", lst_add_from); // list.add_from(list, iterable)
    set_cfn(heap, globals, "insert", lst_insert); // list.insert(list, index, item)
    set_cfn(heap, globals, "clear", lst_clear); // list.clear(list)
    set_cfn(heap, globals, "size", baselib::mg_len); // list.size(list): int
    set_cfn(heap, globals, "slice", lst_slice); // list.slice(list, begin = 0, end = size, step = 0): list
    set_cfn(heap, globals, "reverse", lst_reverse); // list.reverse(list): list
    set_cfn(heap, globals, "sort", lst_sort); // list.sort(list [, comparator]): list

    module
}

fn check_list(instance: &Instance, name: &str, argv: &[Value]) -> RunResult<()> {
    if let Value::Ref(id) = &argv[0] {
        if matches!(instance.heap.get(*id), HeapData::List(_)) {
            return Ok(());
        }
    }
    Err(Error::new(
        ErrorKind::Argument,
        format!(
            "{name} expected argument 1 as \"{}\", received \"{}\"",
            Type::List,
            argv[0].type_of(&instance.heap)
        ),
    ))
}

fn lst_add(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("add", argv, 2, usize::MAX)?;
    check_list(instance, "add", argv)?;
    list::m_add(instance, &argv[0].raw_copy(), &argv[1..])
}

fn lst_add_from(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("add_from", argv, 2, 2)?;
    check_list(instance, "add_from", argv)?;
    list::m_extend(instance, &argv[0].raw_copy(), &argv[1..])
}

fn lst_insert(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("insert", argv, 3, 3)?;
    check_list(instance, "insert", argv)?;
    list::m_insert(instance, &argv[0].raw_copy(), &argv[1..])
}

fn lst_clear(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("clear", argv, 1, 1)?;
    check_list(instance, "clear", argv)?;
    list::m_clear(instance, &argv[0].raw_copy(), &argv[1..])
}

fn lst_slice(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("slice", argv, 1, 4)?;
    check_list(instance, "slice", argv)?;
    list::m_slice(instance, &argv[0].raw_copy(), &argv[1..])
}

fn lst_reverse(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("reverse", argv, 1, 1)?;
    check_list(instance, "reverse", argv)?;
    list::m_reverse(instance, &argv[0].raw_copy(), &argv[1..])
}

fn lst_sort(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("sort", argv, 1, 2)?;
    check_list(instance, "sort", argv)?;
    list::m_sort(instance, &argv[0].raw_copy(), &argv[1..])
}
