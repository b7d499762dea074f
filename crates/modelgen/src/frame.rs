//! Call-stack frames.

use strum::IntoStaticStr;

use crate::error::CodeLoc;
use crate::heap::HeapId;
use crate::value::Value;

/// Control-flow state of a frame.
///
/// `return` sets `Return` and unwinds to the call boundary; `break` and
/// `continue` unwind to the innermost enclosing loop. Compound statements
/// check the state after each child and stop early when it leaves
/// `Active`; the construct that handles the state resets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum FrameState {
    Active,
    Return,
    Break,
    Continue,
}

/// One active invocation.
///
/// Frames are stored in the instance's stack vector, base frame first.
/// `module` and `locals` are owning references, released when the frame
/// pops; `value` carries the pending return or break payload. At module
/// level, `locals` aliases the module's globals map.
#[derive(Debug)]
pub(crate) struct Frame {
    pub state: FrameState,
    pub module: HeapId,
    pub locals: HeapId,
    pub value: Option<Value>,
    /// Callee name at the call site, for tracebacks.
    pub caller_name: Option<String>,
    /// Caller's source location, for tracebacks.
    pub caller_loc: Option<CodeLoc>,
}
