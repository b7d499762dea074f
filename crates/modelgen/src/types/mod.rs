//! Per-kind value payloads and operations.
//!
//! Built-in methods (attribute access on values) live beside the payload
//! they operate on; the static `list`/`map`/`math` modules under
//! [`crate::modules`] expose free-function counterparts.

pub(crate) mod func;
pub(crate) mod list;
pub(crate) mod map;
pub(crate) mod module;
pub(crate) mod str;

use crate::heap::{Heap, HeapData, HeapId};
use crate::value::{BoundCFunction, MethodFn, Value};

/// Allocates a built-in method bound to `receiver`.
pub(crate) fn bind_method(
    heap: &mut Heap,
    receiver: HeapId,
    name: &'static str,
    method: MethodFn,
) -> Value {
    heap.inc_ref(receiver);
    Value::Ref(heap.allocate(HeapData::BoundCFunc(BoundCFunction {
        name,
        method,
        receiver: Value::Ref(receiver),
    })))
}
