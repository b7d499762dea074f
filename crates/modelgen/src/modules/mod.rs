//! Statically registered library modules.
//!
//! `base` provides the built-ins consulted last during name resolution;
//! `list`, `map` and `math` are importable by name and found before any
//! filesystem lookup. The free functions here mirror the built-in methods
//! on values (`list.add(xs, v)` beside `xs.add(v)`).

pub(crate) mod baselib;
pub(crate) mod listlib;
pub(crate) mod maplib;
pub(crate) mod mathlib;

use crate::heap::{Heap, HeapData, HeapId};
use crate::types::module::{ModuleData, ModuleSource};
use crate::value::{CFn, CFunction, Value};

/// Allocates an empty static module; returns `(module, globals)`.
pub(crate) fn new_static(heap: &mut Heap, name: &str) -> (HeapId, HeapId) {
    let globals = heap.alloc_map();
    let id = heap.allocate(HeapData::Module(ModuleData {
        name: name.to_owned(),
        source: ModuleSource::builtin(name),
        root: None,
        globals,
        is_static: true,
    }));
    (id, globals)
}

pub(crate) fn set_cfn(heap: &mut Heap, globals: HeapId, name: &'static str, func: CFn) {
    heap.map_insert(globals, name, Value::CFunc(CFunction::new(name, func)));
}

pub(crate) fn set_int(heap: &mut Heap, globals: HeapId, name: &str, value: i32) {
    heap.map_insert(globals, name, Value::Int(value));
}

pub(crate) fn set_float(heap: &mut Heap, globals: HeapId, name: &str, value: f32) {
    heap.map_insert(globals, name, Value::Float(value));
}
