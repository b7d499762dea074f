//! Script-defined callables.

use std::rc::Rc;

use crate::ast::Node;
use crate::heap::HeapId;

/// Whether a callable was introduced by `func` or `proc`.
///
/// The two behave identically at call time; the kind is kept for `type`
/// and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FuncKind {
    Function,
    Procedure,
}

/// A function or procedure value.
///
/// Holds the AST subtree it was defined from. The defining-module
/// reference is non-owning: the instance registry keeps modules alive, and
/// an owning edge here would close a reference cycle through the module's
/// globals. `captured` shares the defining frame's locals map and is
/// owning; each call seeds a fresh locals map from it, so mutations of the
/// enclosing frame between capture and call stay observable.
#[derive(Debug)]
pub(crate) struct Func {
    pub kind: FuncKind,
    pub node: Rc<Node>,
    pub module: HeapId,
    pub captured: Option<HeapId>,
}
