//! The static `map` module: free-function counterparts of the map
//! methods, taking the map as their first argument.

use crate::args;
use crate::error::{Error, ErrorKind, RunResult};
use crate::heap::{HeapData, HeapId};
use crate::instance::Instance;
use crate::modules::{baselib, new_static, set_cfn};
use crate::types::map;
use crate::value::{Type, Value};

pub(crate) fn create(heap: &mut crate::heap::Heap) -> HeapId {
    let (module, globals) = new_static(heap, "map");

    set_cfn(heap, globals, "has", map_has); // map.has(map, key): bool
    set_cfn(heap, globals, "pop", map_pop); // map.pop(map, key)
    set_cfn(heap, globals, "clear", map_clear); // map.clear(map)
    set_cfn(heap, globals, "size", baselib::mg_len); // map.size(map): int
    set_cfn(heap, globals, "keys", map_keys); // map.keys(map): list<string>
    set_cfn(heap, globals, "values", map_values); // map.values(map): list
    set_cfn(heap, globals, "pairs", map_pairs); // map.pairs(map): list<tuple>

    module
}

fn check_map(instance: &Instance, name: &str, argv: &[Value]) -> RunResult<()> {
    if let Value::Ref(id) = &argv[0] {
        if matches!(instance.heap.get(*id), HeapData::Map(_)) {
            return Ok(());
        }
    }
    Err(Error::new(
        ErrorKind::Argument,
        format!(
            "{name} expected argument 1 as \"{}\", received \"{}\"",
            Type::Map,
            argv[0].type_of(&instance.heap)
        ),
    ))
}

fn map_has(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("has", argv, 2, 2)?;
    check_map(instance, "has", argv)?;
    map::m_has(instance, &argv[0].raw_copy(), &argv[1..])
}

fn map_pop(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("pop", argv, 2, 2)?;
    check_map(instance, "pop", argv)?;
    map::m_pop(instance, &argv[0].raw_copy(), &argv[1..])
}

fn map_clear(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("clear", argv, 1, 1)?;
    check_map(instance, "clear", argv)?;
    map::m_clear(instance, &argv[0].raw_copy(), &argv[1..])
}

fn map_keys(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("keys", argv, 1, 1)?;
    check_map(instance, "keys", argv)?;
    map::m_keys(instance, &argv[0].raw_copy(), &argv[1..])
}

fn map_values(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("values", argv, 1, 1)?;
    check_map(instance, "values", argv)?;
    map::m_values(instance, &argv[0].raw_copy(), &argv[1..])
}

fn map_pairs(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("pairs", argv, 1, 1)?;
    check_map(instance, "pairs", argv)?;
    map::m_pairs(instance, &argv[0].raw_copy(), &argv[1..])
}
