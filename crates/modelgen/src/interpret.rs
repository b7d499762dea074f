//! Tree-walking evaluator.
//!
//! A recursive visitor dispatching on node kind, parameterized by the
//! module whose globals are in scope. Control flow travels through the
//! current frame's state: compound statements check it after each child
//! and unwind; the loop or call boundary that handles a state resets it.
//!
//! Ownership discipline: `visit` returns an owned value the caller must
//! drop or hand on. On error paths the process is terminating, so
//! temporaries held by unwinding callers are not individually released;
//! reference-count exactness is asserted on successful runs only.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::ast::{BinOp, Node, NodeKind};
use crate::error::{CodeLoc, Error, ErrorKind, RunResult, StackFrame};
use crate::frame::FrameState;
use crate::heap::{HeapData, HeapId};
use crate::instance::Instance;
use crate::modules::baselib;
use crate::types::func::{Func, FuncKind};
use crate::types::module::ModuleSource;
use crate::types::{list, map, str as str_type};
use crate::value::{binary_op, to_display_string, unary_op, Type, Value};

impl Instance {
    /// Evaluates one node, returning an owned value.
    pub(crate) fn visit(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        match node.kind {
            NodeKind::Module | NodeKind::Block => self.visit_children(module, node, 0),
            NodeKind::Name => self.visit_name(module, node),
            NodeKind::Int | NodeKind::Float | NodeKind::Str => self.visit_literal(module, node),
            NodeKind::Null | NodeKind::Nop => Ok(Value::Null),
            NodeKind::Tuple | NodeKind::List => self.visit_sequence(module, node),
            NodeKind::Map => self.visit_map(module, node),
            NodeKind::Range => self.visit_range(module, node),
            NodeKind::BinOp(BinOp::And | BinOp::Or) => self.visit_logical(module, node),
            NodeKind::BinOp(BinOp::Coalesce) => self.visit_coalesce(module, node),
            NodeKind::BinOp(BinOp::Conditional) => self.visit_elvis(module, node),
            NodeKind::BinOp(op) => self.visit_binary(module, node, op),
            NodeKind::TernaryConditional => self.visit_ternary(module, node),
            NodeKind::UnaryOp(op) => {
                let operand = self.visit(module, node.child(0))?;
                let result = unary_op(&self.heap, op, &operand)
                    .map_err(|err| self.attach(module, node, err));
                operand.drop_with_heap(&mut self.heap);
                result
            }
            NodeKind::Assign => self.visit_assign(module, node),
            NodeKind::AssignAdd
            | NodeKind::AssignSub
            | NodeKind::AssignMul
            | NodeKind::AssignDiv
            | NodeKind::AssignIntDiv
            | NodeKind::AssignMod => self.visit_augmented(module, node),
            NodeKind::Call => self.visit_call(module, node),
            NodeKind::For => self.visit_for(module, node),
            NodeKind::While => self.visit_while(module, node),
            NodeKind::Break => self.visit_break(module, node),
            NodeKind::Continue => {
                self.frames.last_mut().expect("active frame").state = FrameState::Continue;
                Ok(Value::Null)
            }
            NodeKind::If => self.visit_if(module, node),
            NodeKind::Function | NodeKind::Procedure => self.visit_function(module, node),
            NodeKind::Return => self.visit_return(module, node),
            NodeKind::Emit => self.visit_emit(module, node),
            NodeKind::Delete => self.delete_target(module, node.child(0)).map(|()| Value::Null),
            NodeKind::Subscript => self.visit_subscript(module, node),
            NodeKind::Attribute => self.visit_attribute(module, node),
            NodeKind::Import | NodeKind::ImportFrom => self.visit_import(module, node),
            NodeKind::Assert => self.visit_assert(module, node),
            NodeKind::As | NodeKind::Optional | NodeKind::Invalid => Err(self.runtime_error(
                module,
                node,
                ErrorKind::Type,
                format!("Unexpected node \"{}\"", node.kind),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Error plumbing

    fn node_loc(&self, module: HeapId, node: &Node) -> CodeLoc {
        let source = self.heap.module_source(module);
        CodeLoc::new(&source.filename, source.tokens[node.first_token].begin)
    }

    pub(crate) fn capture_traceback(&self) -> Vec<StackFrame> {
        self.frames
            .iter()
            .map(|frame| StackFrame {
                name: frame.caller_name.clone(),
                loc: frame.caller_loc.clone(),
            })
            .collect()
    }

    fn runtime_error(
        &self,
        module: HeapId,
        node: &Node,
        kind: ErrorKind,
        message: String,
    ) -> Error {
        Error::new(kind, message)
            .with_loc(self.node_loc(module, node))
            .with_traceback(self.capture_traceback())
    }

    /// Attaches position and traceback to an error raised by a value
    /// operation that had no node in hand.
    fn attach(&self, module: HeapId, node: &Node, err: Error) -> Error {
        err.or_loc(Some(self.node_loc(module, node)))
            .with_traceback(self.capture_traceback())
    }

    // ------------------------------------------------------------------
    // Frames and names

    fn state(&self) -> FrameState {
        self.frames.last().expect("active frame").state
    }

    fn set_state(&mut self, state: FrameState) {
        self.frames.last_mut().expect("active frame").state = state;
    }

    /// Clone of the current frame's pending value, or null.
    fn frame_value_cloned(&mut self) -> Value {
        let raw = self
            .frames
            .last()
            .expect("active frame")
            .value
            .as_ref()
            .map(Value::raw_copy);
        match raw {
            Some(value) => {
                if let Value::Ref(id) = value {
                    self.heap.inc_ref(id);
                }
                value
            }
            None => Value::Null,
        }
    }

    /// Stores a pending return/break payload, dropping any previous one.
    fn set_frame_value(&mut self, value: Value) {
        let old = self
            .frames
            .last_mut()
            .expect("active frame")
            .value
            .replace(value);
        if let Some(old) = old {
            old.drop_with_heap(&mut self.heap);
        }
    }

    /// Three-tier lookup: frame locals, module globals, base globals.
    pub(crate) fn lookup(&mut self, module: HeapId, name: &str) -> Option<Value> {
        let locals = self.frames.last().expect("active frame").locals;
        if let Some(value) = self.heap.map_get_cloned(locals, name) {
            return Some(value);
        }
        let globals = self.heap.module(module).globals;
        if let Some(value) = self.heap.map_get_cloned(globals, name) {
            return Some(value);
        }
        let base = self.heap.module(self.base).globals;
        self.heap.map_get_cloned(base, name)
    }

    /// Binds a bare name: locals if already local or not yet global,
    /// otherwise updates the existing global.
    pub(crate) fn set_value(&mut self, module: HeapId, name: &str, value: Value) {
        let locals = self.frames.last().expect("active frame").locals;
        let globals = self.heap.module(module).globals;
        if self.heap.map_contains(locals, name) || !self.heap.map_contains(globals, name) {
            self.heap.map_insert(locals, name, value);
        } else {
            self.heap.map_insert(globals, name, value);
        }
    }

    fn set_local(&mut self, name: &str, value: Value) {
        let locals = self.frames.last().expect("active frame").locals;
        self.heap.map_insert(locals, name, value);
    }

    // ------------------------------------------------------------------
    // Statement sequences and literals

    /// Visits children from `from`, stopping when the frame leaves the
    /// active state.
    fn visit_children(&mut self, module: HeapId, node: &Rc<Node>, from: usize) -> RunResult<Value> {
        for child in &node.children[from..] {
            let value = self.visit(module, child)?;
            value.drop_with_heap(&mut self.heap);
            if self.state() != FrameState::Active {
                return Ok(self.frame_value_cloned());
            }
        }
        Ok(Value::Null)
    }

    fn visit_name(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let source = self.heap.module_source(module);
        let name = source.tokens[node.token.expect("name token")].payload.as_str();
        self.lookup(module, name).ok_or_else(|| {
            self.runtime_error(
                module,
                node,
                ErrorKind::Name,
                format!("Undefined name \"{name}\""),
            )
        })
    }

    fn visit_literal(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let source = self.heap.module_source(module);
        let payload = &source.tokens[node.token.expect("literal token")].payload;
        Ok(match payload {
            crate::tokenize::Payload::Int(i) => Value::Int(*i),
            crate::tokenize::Payload::Float(f) => Value::Float(*f),
            crate::tokenize::Payload::Str(s) => {
                let text = s.clone();
                self.heap.alloc_str(text)
            }
            crate::tokenize::Payload::None => unreachable!("literal without payload"),
        })
    }

    fn visit_sequence(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let mut items = Vec::with_capacity(node.children.len());
        for child in &node.children {
            match self.visit(module, child) {
                Ok(value) => items.push(value),
                Err(err) => {
                    for item in items {
                        item.drop_with_heap(&mut self.heap);
                    }
                    return Err(err);
                }
            }
        }
        Ok(if node.kind == NodeKind::Tuple {
            self.heap.alloc_tuple(items)
        } else {
            self.heap.alloc_list(items)
        })
    }

    fn visit_map(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let source = self.heap.module_source(module);
        let id = self.heap.alloc_map();
        for pair in node.children.chunks(2) {
            let key_node = &pair[0];
            let key = source.tokens[key_node.token.expect("map key token")]
                .payload
                .as_str()
                .to_owned();
            let value = match self.visit(module, &pair[1]) {
                Ok(value) => value,
                Err(err) => {
                    self.heap.dec_ref(id);
                    return Err(err);
                }
            };
            self.heap.map_insert(id, &key, value);
        }
        Ok(Value::Ref(id))
    }

    fn visit_range(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let mut parts = [0i32; 3];
        for (index, child) in node.children.iter().enumerate() {
            let value = self.visit(module, child)?;
            let Some(i) = value.as_int() else {
                let kind = value.type_of(&self.heap);
                value.drop_with_heap(&mut self.heap);
                return Err(self.runtime_error(
                    module,
                    child,
                    ErrorKind::Type,
                    format!("Range expects \"int\" bounds, received \"{kind}\""),
                ));
            };
            value.drop_with_heap(&mut self.heap);
            parts[index] = i;
        }
        let step = if node.children.len() == 3 { parts[2] } else { 0 };
        Ok(baselib::range_int(&mut self.heap, parts[0], parts[1], step))
    }

    // ------------------------------------------------------------------
    // Operators

    fn visit_binary(&mut self, module: HeapId, node: &Rc<Node>, op: BinOp) -> RunResult<Value> {
        let lhs = self.visit(module, node.child(0))?;
        let rhs = match self.visit(module, node.child(1)) {
            Ok(value) => value,
            Err(err) => {
                lhs.drop_with_heap(&mut self.heap);
                return Err(err);
            }
        };
        let result = binary_op(&mut self.heap, op, &lhs, &rhs)
            .map_err(|err| self.attach(module, node, err));
        lhs.drop_with_heap(&mut self.heap);
        rhs.drop_with_heap(&mut self.heap);
        result
    }

    /// `and` / `or`: short-circuit, producing a boolean integer.
    fn visit_logical(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let lhs = self.visit(module, node.child(0))?;
        let lhs_truth = lhs.truthy(&self.heap);
        lhs.drop_with_heap(&mut self.heap);

        let is_and = node.kind == NodeKind::BinOp(BinOp::And);
        if is_and && !lhs_truth {
            return Ok(Value::Int(0));
        }
        if !is_and && lhs_truth {
            return Ok(Value::Int(1));
        }
        let rhs = self.visit(module, node.child(1))?;
        let rhs_truth = rhs.truthy(&self.heap);
        rhs.drop_with_heap(&mut self.heap);
        Ok(Value::Int(i32::from(rhs_truth)))
    }

    /// `??`: the right operand is evaluated only when the left is null.
    fn visit_coalesce(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let lhs = self.visit(module, node.child(0))?;
        if matches!(lhs, Value::Null) {
            return self.visit(module, node.child(1));
        }
        Ok(lhs)
    }

    /// `a ?: b`: the condition's value when truthy, else the alternative.
    fn visit_elvis(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let lhs = self.visit(module, node.child(0))?;
        if lhs.truthy(&self.heap) {
            return Ok(lhs);
        }
        lhs.drop_with_heap(&mut self.heap);
        self.visit(module, node.child(1))
    }

    fn visit_ternary(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let condition = self.visit(module, node.child(0))?;
        let truth = condition.truthy(&self.heap);
        condition.drop_with_heap(&mut self.heap);
        self.visit(module, node.child(if truth { 1 } else { 2 }))
    }

    // ------------------------------------------------------------------
    // Assignment

    fn visit_assign(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let value = self.visit(module, node.child(1))?;
        if let Err(err) = self.assign_target(module, node.child(0), &value, false) {
            value.drop_with_heap(&mut self.heap);
            return Err(err);
        }
        Ok(value)
    }

    /// Stores `value` into a name, subscript, attribute or tuple target.
    /// The caller keeps ownership of `value`.
    fn assign_target(
        &mut self,
        module: HeapId,
        target: &Rc<Node>,
        value: &Value,
        local: bool,
    ) -> RunResult<()> {
        match target.kind {
            NodeKind::Name => {
                let source = self.heap.module_source(module);
                let name = source.tokens[target.token.expect("name token")]
                    .payload
                    .as_str()
                    .to_owned();
                let value = value.clone_with_heap(&mut self.heap);
                if local {
                    self.set_local(&name, value);
                } else {
                    self.set_value(module, &name, value);
                }
                Ok(())
            }
            NodeKind::Subscript => {
                let collection = self.visit(module, target.child(0))?;
                let index = match self.visit(module, target.child(1)) {
                    Ok(index) => index,
                    Err(err) => {
                        collection.drop_with_heap(&mut self.heap);
                        return Err(err);
                    }
                };
                let result = self.subscript_set(module, target, &collection, &index, value);
                collection.drop_with_heap(&mut self.heap);
                index.drop_with_heap(&mut self.heap);
                result
            }
            NodeKind::Attribute => {
                let collection = self.visit(module, target.child(0))?;
                let source = self.heap.module_source(module);
                let name = source.tokens[target.child(1).token.expect("name token")]
                    .payload
                    .as_str()
                    .to_owned();
                let result = self.attribute_set(module, target, &collection, &name, value);
                collection.drop_with_heap(&mut self.heap);
                result
            }
            NodeKind::Tuple => {
                let Value::Ref(id) = value else {
                    return Err(self.not_iterable(module, target, value));
                };
                if !matches!(self.heap.get(*id), HeapData::Tuple(_) | HeapData::List(_)) {
                    return Err(self.not_iterable(module, target, value));
                }
                let length = self.heap.seq_items(*id).len();
                if target.children.len() != length {
                    return Err(self.runtime_error(
                        module,
                        target,
                        ErrorKind::Type,
                        format!(
                            "Mismatched lengths for parallel assignment ({} != {length})",
                            target.children.len()
                        ),
                    ));
                }
                for (index, sub_target) in target.children.iter().enumerate() {
                    let element = self
                        .heap
                        .seq_get_cloned(*id, index)
                        .expect("index in range");
                    let result = self.assign_target(module, sub_target, &element, local);
                    element.drop_with_heap(&mut self.heap);
                    result?;
                }
                Ok(())
            }
            _ => Err(self.runtime_error(
                module,
                target,
                ErrorKind::Type,
                format!("Illegal assignment to \"{}\"", target.kind),
            )),
        }
    }

    fn not_iterable(&self, module: HeapId, node: &Node, value: &Value) -> Error {
        self.runtime_error(
            module,
            node,
            ErrorKind::Type,
            format!("\"{}\" is not iterable", value.type_of(&self.heap)),
        )
    }

    fn visit_augmented(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let op = node.kind.augmented_op().expect("augmented assignment");
        let rhs = self.visit(module, node.child(1))?;
        let target = node.child(0);

        let outcome = match target.kind {
            NodeKind::Name => {
                let source = self.heap.module_source(module);
                let name = source.tokens[target.token.expect("name token")]
                    .payload
                    .as_str()
                    .to_owned();
                match self.lookup(module, &name) {
                    None => Err(self.runtime_error(
                        module,
                        target,
                        ErrorKind::Name,
                        format!("Undefined name \"{name}\""),
                    )),
                    Some(current) => {
                        let result = binary_op(&mut self.heap, op, &current, &rhs)
                            .map_err(|err| self.attach(module, node, err));
                        current.drop_with_heap(&mut self.heap);
                        result.map(|value| {
                            let stored = value.clone_with_heap(&mut self.heap);
                            self.set_value(module, &name, stored);
                            value
                        })
                    }
                }
            }
            NodeKind::Subscript => {
                let collection = self.visit(module, target.child(0))?;
                let index = match self.visit(module, target.child(1)) {
                    Ok(index) => index,
                    Err(err) => {
                        collection.drop_with_heap(&mut self.heap);
                        rhs.drop_with_heap(&mut self.heap);
                        return Err(err);
                    }
                };
                let result = self
                    .subscript_get(module, target, &collection, &index)
                    .and_then(|current| {
                        let result = binary_op(&mut self.heap, op, &current, &rhs)
                            .map_err(|err| self.attach(module, node, err));
                        current.drop_with_heap(&mut self.heap);
                        result
                    })
                    .and_then(|value| {
                        self.subscript_set(module, target, &collection, &index, &value)
                            .map(|()| value)
                    });
                collection.drop_with_heap(&mut self.heap);
                index.drop_with_heap(&mut self.heap);
                result
            }
            NodeKind::Attribute => {
                let collection = self.visit(module, target.child(0))?;
                let source = self.heap.module_source(module);
                let name = source.tokens[target.child(1).token.expect("name token")]
                    .payload
                    .as_str()
                    .to_owned();
                let result = self
                    .attribute_get(module, target, &collection, &name)
                    .and_then(|current| {
                        let result = binary_op(&mut self.heap, op, &current, &rhs)
                            .map_err(|err| self.attach(module, node, err));
                        current.drop_with_heap(&mut self.heap);
                        result
                    })
                    .and_then(|value| {
                        self.attribute_set(module, target, &collection, &name, &value)
                            .map(|()| value)
                    });
                collection.drop_with_heap(&mut self.heap);
                result
            }
            _ => Err(self.runtime_error(
                module,
                target,
                ErrorKind::Type,
                format!("Unsupported augmented assignment with \"{}\"", target.kind),
            )),
        };

        rhs.drop_with_heap(&mut self.heap);
        outcome
    }

    // ------------------------------------------------------------------
    // Subscripts and attributes

    fn visit_subscript(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let collection = self.visit(module, node.child(0))?;

        // A range index is a slice, evaluated without materializing.
        if node.child(1).kind == NodeKind::Range {
            let result = self.slice_subscript(module, node, &collection);
            collection.drop_with_heap(&mut self.heap);
            return result;
        }

        let index = match self.visit(module, node.child(1)) {
            Ok(index) => index,
            Err(err) => {
                collection.drop_with_heap(&mut self.heap);
                return Err(err);
            }
        };
        let result = self.subscript_get(module, node, &collection, &index);
        collection.drop_with_heap(&mut self.heap);
        index.drop_with_heap(&mut self.heap);
        result
    }

    fn slice_subscript(
        &mut self,
        module: HeapId,
        node: &Rc<Node>,
        collection: &Value,
    ) -> RunResult<Value> {
        let range = node.child(1);
        let mut parts = [0i32; 3];
        for (index, child) in range.children.iter().enumerate() {
            let value = self.visit(module, child)?;
            let Some(i) = value.as_int() else {
                let kind = value.type_of(&self.heap);
                value.drop_with_heap(&mut self.heap);
                return Err(self.runtime_error(
                    module,
                    child,
                    ErrorKind::Type,
                    format!("Slice expects \"int\" bounds, received \"{kind}\""),
                ));
            };
            value.drop_with_heap(&mut self.heap);
            parts[index] = i;
        }
        let step = if range.children.len() == 3 { parts[2] } else { 0 };

        if let Value::Ref(id) = collection {
            let id = *id;
            match collection.type_of(&self.heap) {
                Type::Tuple | Type::List => {
                    return Ok(list::slice_of(&mut self.heap, id, parts[0], parts[1], step));
                }
                Type::Str => {
                    return str_type::slice(&mut self.heap, id, parts[0], parts[1], step)
                        .map_err(|err| self.attach(module, node, err));
                }
                _ => {}
            }
        }
        Err(self.runtime_error(
            module,
            node,
            ErrorKind::Type,
            format!("\"{}\" is not sliceable", collection.type_of(&self.heap)),
        ))
    }

    fn subscript_get(
        &mut self,
        module: HeapId,
        node: &Node,
        collection: &Value,
        index: &Value,
    ) -> RunResult<Value> {
        if let Value::Ref(id) = collection {
            let id = *id;
            match (collection.type_of(&self.heap), index) {
                (Type::Tuple | Type::List, Value::Int(i)) => {
                    return list::subscript_get(&mut self.heap, id, *i)
                        .map_err(|err| self.attach(module, node, err));
                }
                (Type::Str, Value::Int(i)) => {
                    return str_type::subscript_get(&mut self.heap, id, *i)
                        .map_err(|err| self.attach(module, node, err));
                }
                (Type::Map, _) => {
                    if let Some(key) = self.string_key(index) {
                        return Ok(map::subscript_get(&mut self.heap, id, &key));
                    }
                }
                _ => {}
            }
        }
        Err(self.runtime_error(
            module,
            node,
            ErrorKind::Type,
            format!(
                "\"{}\" is not subscriptable with \"{}\"",
                collection.type_of(&self.heap),
                index.type_of(&self.heap)
            ),
        ))
    }

    /// The string payload of a value used as a map key, if it is one.
    fn string_key(&self, index: &Value) -> Option<String> {
        if let Value::Ref(id) = index {
            if let HeapData::Str(text) = self.heap.get(*id) {
                return Some(text.clone());
            }
        }
        None
    }

    fn subscript_set(
        &mut self,
        module: HeapId,
        node: &Node,
        collection: &Value,
        index: &Value,
        value: &Value,
    ) -> RunResult<()> {
        if let Value::Ref(id) = collection {
            let id = *id;
            match (collection.type_of(&self.heap), index) {
                (Type::List, Value::Int(i)) => {
                    let stored = value.clone_with_heap(&mut self.heap);
                    return list::subscript_set(&mut self.heap, id, *i, stored)
                        .map_err(|err| self.attach(module, node, err));
                }
                (Type::Map, _) => {
                    if let Some(key) = self.string_key(index) {
                        let stored = value.clone_with_heap(&mut self.heap);
                        self.heap.map_insert(id, &key, stored);
                        return Ok(());
                    }
                }
                (Type::Tuple, Value::Int(_)) => {
                    return Err(self.runtime_error(
                        module,
                        node,
                        ErrorKind::Type,
                        "\"tuple\" does not support subscript assignment".to_owned(),
                    ));
                }
                _ => {}
            }
        }
        Err(self.runtime_error(
            module,
            node,
            ErrorKind::Type,
            format!(
                "\"{}\" is not subscriptable with \"{}\"",
                collection.type_of(&self.heap),
                index.type_of(&self.heap)
            ),
        ))
    }

    fn visit_attribute(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let collection = self.visit(module, node.child(0))?;
        let source = self.heap.module_source(module);
        let name = source.tokens[node.child(1).token.expect("name token")]
            .payload
            .as_str()
            .to_owned();
        let result = self.attribute_get(module, node, &collection, &name);
        collection.drop_with_heap(&mut self.heap);
        result
    }

    fn attribute_get(
        &mut self,
        module: HeapId,
        node: &Node,
        collection: &Value,
        name: &str,
    ) -> RunResult<Value> {
        let found = match collection {
            Value::Ref(id) => {
                let id = *id;
                match collection.type_of(&self.heap) {
                    Type::Map => Some(map::attribute(&mut self.heap, id, name)),
                    Type::Tuple | Type::List => list::attribute(&mut self.heap, id, name),
                    Type::Str => str_type::attribute(&mut self.heap, id, name),
                    Type::Module => {
                        let globals = self.heap.module(id).globals;
                        self.heap.map_get_cloned(globals, name)
                    }
                    _ => None,
                }
            }
            _ => None,
        };
        found.ok_or_else(|| {
            self.runtime_error(
                module,
                node,
                ErrorKind::Attribute,
                format!(
                    "\"{}\" has no attribute \"{name}\"",
                    collection.type_of(&self.heap)
                ),
            )
        })
    }

    fn attribute_set(
        &mut self,
        module: HeapId,
        node: &Node,
        collection: &Value,
        name: &str,
        value: &Value,
    ) -> RunResult<()> {
        if let Value::Ref(id) = collection {
            let id = *id;
            match collection.type_of(&self.heap) {
                Type::Map => {
                    let stored = value.clone_with_heap(&mut self.heap);
                    self.heap.map_insert(id, name, stored);
                    return Ok(());
                }
                Type::Module => {
                    let globals = self.heap.module(id).globals;
                    let stored = value.clone_with_heap(&mut self.heap);
                    self.heap.map_insert(globals, name, stored);
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(self.runtime_error(
            module,
            node,
            ErrorKind::Attribute,
            format!(
                "\"{}\" has no attribute \"{name}\"",
                collection.type_of(&self.heap)
            ),
        ))
    }

    fn delete_target(&mut self, module: HeapId, target: &Rc<Node>) -> RunResult<()> {
        match target.kind {
            NodeKind::Name => {
                let source = self.heap.module_source(module);
                let name = source.tokens[target.token.expect("name token")]
                    .payload
                    .as_str()
                    .to_owned();
                let locals = self.frames.last().expect("active frame").locals;
                if self.heap.map_remove(locals, &name) {
                    return Ok(());
                }
                let globals = self.heap.module(module).globals;
                if self.heap.map_remove(globals, &name) {
                    return Ok(());
                }
                Err(self.runtime_error(
                    module,
                    target,
                    ErrorKind::Name,
                    format!("Undefined name \"{name}\""),
                ))
            }
            NodeKind::Tuple => {
                for sub_target in &target.children {
                    self.delete_target(module, sub_target)?;
                }
                Ok(())
            }
            NodeKind::Subscript => {
                let collection = self.visit(module, target.child(0))?;
                let index = match self.visit(module, target.child(1)) {
                    Ok(index) => index,
                    Err(err) => {
                        collection.drop_with_heap(&mut self.heap);
                        return Err(err);
                    }
                };
                let result = self.subscript_delete(module, target, &collection, &index);
                collection.drop_with_heap(&mut self.heap);
                index.drop_with_heap(&mut self.heap);
                result
            }
            NodeKind::Attribute => {
                let collection = self.visit(module, target.child(0))?;
                let source = self.heap.module_source(module);
                let name = source.tokens[target.child(1).token.expect("name token")]
                    .payload
                    .as_str()
                    .to_owned();
                let result = match (&collection, collection.type_of(&self.heap)) {
                    (Value::Ref(id), Type::Map) => {
                        let id = *id;
                        self.heap.map_remove(id, &name);
                        Ok(())
                    }
                    (Value::Ref(id), Type::Module) => {
                        let globals = self.heap.module(*id).globals;
                        self.heap.map_remove(globals, &name);
                        Ok(())
                    }
                    (other, _) => Err(self.runtime_error(
                        module,
                        target,
                        ErrorKind::Attribute,
                        format!(
                            "\"{}\" has no attribute \"{name}\"",
                            other.type_of(&self.heap)
                        ),
                    )),
                };
                collection.drop_with_heap(&mut self.heap);
                result
            }
            _ => Err(self.runtime_error(
                module,
                target,
                ErrorKind::Type,
                format!("Cannot delete \"{}\"", target.kind),
            )),
        }
    }

    fn subscript_delete(
        &mut self,
        module: HeapId,
        node: &Node,
        collection: &Value,
        index: &Value,
    ) -> RunResult<()> {
        if let Value::Ref(id) = collection {
            let id = *id;
            match (collection.type_of(&self.heap), index) {
                (Type::List, Value::Int(i)) => {
                    return list::remove_at(&mut self.heap, id, *i)
                        .map_err(|err| self.attach(module, node, err));
                }
                (Type::Map, _) => {
                    if let Some(key) = self.string_key(index) {
                        self.heap.map_remove(id, &key);
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(self.runtime_error(
            module,
            node,
            ErrorKind::Type,
            format!(
                "\"{}\" is not subscriptable with \"{}\"",
                collection.type_of(&self.heap),
                index.type_of(&self.heap)
            ),
        ))
    }

    // ------------------------------------------------------------------
    // Control flow

    fn visit_for(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let iterable = self.visit(module, node.child(1))?;
        let id = match &iterable {
            Value::Ref(id)
                if matches!(self.heap.get(*id), HeapData::Tuple(_) | HeapData::List(_)) =>
            {
                *id
            }
            _ => {
                let err = self.not_iterable(module, node.child(1), &iterable);
                iterable.drop_with_heap(&mut self.heap);
                return Err(err);
            }
        };

        let mut last: Option<Value> = None;
        let mut index = 0;
        let result = 'outer: loop {
            // The length is re-read so a list mutated mid-loop stays safe.
            if index >= self.heap.seq_items(id).len() {
                break None;
            }
            let element = self.heap.seq_get_cloned(id, index).expect("index in range");
            if let Err(err) = self.assign_target(module, node.child(0), &element, true) {
                element.drop_with_heap(&mut self.heap);
                break Some(Err(err));
            }
            if let Some(previous) = last.replace(element) {
                previous.drop_with_heap(&mut self.heap);
            }

            for body in &node.children[2..] {
                match self.visit(module, body) {
                    Ok(value) => value.drop_with_heap(&mut self.heap),
                    Err(err) => break 'outer Some(Err(err)),
                }
                match self.state() {
                    FrameState::Active => {}
                    FrameState::Return => {
                        break 'outer Some(Ok(self.frame_value_cloned()));
                    }
                    FrameState::Break => {
                        self.set_state(FrameState::Active);
                        let payload = self
                            .frames
                            .last_mut()
                            .expect("active frame")
                            .value
                            .take();
                        break 'outer Some(Ok(payload
                            .or_else(|| last.take())
                            .unwrap_or(Value::Null)));
                    }
                    FrameState::Continue => {
                        self.set_state(FrameState::Active);
                        break;
                    }
                }
            }
            index += 1;
        };

        iterable.drop_with_heap(&mut self.heap);
        let outcome = match result {
            Some(outcome) => outcome,
            None => Ok(last.take().unwrap_or(Value::Null)),
        };
        if let Some(remaining) = last {
            remaining.drop_with_heap(&mut self.heap);
        }
        outcome
    }

    fn visit_while(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        loop {
            let condition = self.visit(module, node.child(0))?;
            let truth = condition.truthy(&self.heap);
            condition.drop_with_heap(&mut self.heap);
            if !truth {
                return Ok(Value::Null);
            }

            for body in &node.children[1..] {
                let value = self.visit(module, body)?;
                value.drop_with_heap(&mut self.heap);
                match self.state() {
                    FrameState::Active => {}
                    FrameState::Return => return Ok(self.frame_value_cloned()),
                    FrameState::Break => {
                        self.set_state(FrameState::Active);
                        let payload = self
                            .frames
                            .last_mut()
                            .expect("active frame")
                            .value
                            .take();
                        return Ok(payload.unwrap_or(Value::Null));
                    }
                    FrameState::Continue => {
                        self.set_state(FrameState::Active);
                        break;
                    }
                }
            }
        }
    }

    fn visit_break(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        if let Some(child) = node.children.first() {
            let value = self.visit(module, child)?;
            self.set_frame_value(value);
        }
        self.set_state(FrameState::Break);
        Ok(self.frame_value_cloned())
    }

    fn visit_return(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        if let Some(child) = node.children.first() {
            let value = self.visit(module, child)?;
            self.set_frame_value(value);
        }
        self.set_state(FrameState::Return);
        Ok(self.frame_value_cloned())
    }

    fn visit_if(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let condition = self.visit(module, node.child(0))?;
        let truth = condition.truthy(&self.heap);
        condition.drop_with_heap(&mut self.heap);

        if node.children.len() > 1 {
            if truth {
                return self.visit(module, node.child(1));
            }
            if node.children.len() > 2 {
                return self.visit(module, node.child(2));
            }
        }
        Ok(Value::Int(i32::from(truth)))
    }

    // ------------------------------------------------------------------
    // Functions and calls

    fn visit_function(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let kind = if node.kind == NodeKind::Function {
            FuncKind::Function
        } else {
            FuncKind::Procedure
        };

        // Defined below module level: capture the defining frame's locals.
        let frame = self.frames.last().expect("active frame");
        let module_globals = self.heap.module(frame.module).globals;
        let captured = if frame.locals == module_globals {
            None
        } else {
            let locals = frame.locals;
            self.heap.inc_ref(locals);
            Some(locals)
        };

        let func = Value::Ref(self.heap.allocate(HeapData::Func(Func {
            kind,
            node: Rc::clone(node),
            module,
            captured,
        })));

        let name_node = node.child(0);
        match name_node.kind {
            NodeKind::Invalid => Ok(func),
            NodeKind::Name => {
                let source = self.heap.module_source(module);
                let name = source.tokens[name_node.token.expect("name token")]
                    .payload
                    .as_str()
                    .to_owned();
                let stored = func.clone_with_heap(&mut self.heap);
                self.set_value(module, &name, stored);
                Ok(func)
            }
            NodeKind::Attribute => {
                if let Err(err) = self.assign_target(module, name_node, &func, false) {
                    func.drop_with_heap(&mut self.heap);
                    return Err(err);
                }
                Ok(func)
            }
            _ => unreachable!("invalid function name node"),
        }
    }

    fn visit_call(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let source = self.heap.module_source(module);
        let callee_node = node.child(0);

        let (callee, name) = if callee_node.kind == NodeKind::Name {
            let name = source.tokens[callee_node.token.expect("name token")]
                .payload
                .as_str()
                .to_owned();
            let value = self.lookup(module, &name).ok_or_else(|| {
                self.runtime_error(
                    module,
                    callee_node,
                    ErrorKind::Name,
                    format!("Undefined name \"{name}\""),
                )
            })?;
            (value, Some(name))
        } else {
            (self.visit(module, callee_node)?, None)
        };

        let mut argv: SmallVec<[Value; 4]> = SmallVec::new();
        for child in &node.children[1..] {
            match self.visit(module, child) {
                Ok(value) => argv.push(value),
                Err(err) => {
                    callee.drop_with_heap(&mut self.heap);
                    for value in argv {
                        value.drop_with_heap(&mut self.heap);
                    }
                    return Err(err);
                }
            }
        }

        let result = self.call_with_site(
            module,
            &callee,
            &argv,
            name.as_deref().unwrap_or("<anonymous>"),
            Some(node),
        );
        callee.drop_with_heap(&mut self.heap);
        for value in argv {
            value.drop_with_heap(&mut self.heap);
        }
        result
    }

    /// Calls a callable from host code, on behalf of the current frame.
    pub(crate) fn call_value(
        &mut self,
        callee: &Value,
        argv: &[Value],
        name: &str,
    ) -> RunResult<Value> {
        let module = self.frames.last().expect("active frame").module;
        self.call_with_site(module, callee, argv, name, None)
    }

    fn call_with_site(
        &mut self,
        module: HeapId,
        callee: &Value,
        argv: &[Value],
        name: &str,
        site: Option<&Rc<Node>>,
    ) -> RunResult<Value> {
        let caller_loc = site.map(|node| self.node_loc(module, node));
        let with_site = |this: &Self, err: Error| match site {
            Some(node) => this.attach(module, node, err),
            None => err.with_traceback(this.capture_traceback()),
        };

        if !callee.is_callable(&self.heap) {
            let err = Error::new(
                ErrorKind::Type,
                format!("\"{}\" is not callable", callee.type_of(&self.heap)),
            );
            return Err(with_site(self, err));
        }

        match (callee, callee.type_of(&self.heap)) {
            (Value::CFunc(cfunction), _) => {
                let locals = self.heap.alloc_map();
                self.push_frame(module, locals, Some(name.to_owned()), caller_loc);
                let result =
                    (cfunction.func)(self, argv).map_err(|err| with_site(self, err));
                let pending = self.pop_frame();
                pending.drop_with_heap(&mut self.heap);
                result
            }
            (Value::Ref(id), Type::BoundCFunc) => {
                let (method, receiver) = match self.heap.get(*id) {
                    HeapData::BoundCFunc(bound) => (bound.method, bound.receiver.raw_copy()),
                    _ => unreachable!("bound cfunc payload"),
                };
                if let Value::Ref(receiver_id) = receiver {
                    self.heap.inc_ref(receiver_id);
                }
                let locals = self.heap.alloc_map();
                self.push_frame(module, locals, Some(name.to_owned()), caller_loc);
                let result = method(self, &receiver, argv).map_err(|err| with_site(self, err));
                receiver.drop_with_heap(&mut self.heap);
                let pending = self.pop_frame();
                pending.drop_with_heap(&mut self.heap);
                result
            }
            (Value::Ref(id), Type::Func | Type::Proc) => {
                self.call_function(*id, argv, name, caller_loc)
            }
            _ => unreachable!("is_callable admitted a non-callable"),
        }
    }

    fn call_function(
        &mut self,
        func_id: HeapId,
        argv: &[Value],
        name: &str,
        caller_loc: Option<CodeLoc>,
    ) -> RunResult<Value> {
        let (func_node, func_module, captured) = {
            let func = self.heap.func(func_id);
            (Rc::clone(&func.node), func.module, func.captured)
        };
        let func_source = self.heap.module_source(func_module);

        // Fresh locals, seeded from the captured map's current contents.
        let locals = self.heap.alloc_map();
        if let Some(captured) = captured {
            self.heap.map_merge(locals, captured);
        }
        self.push_frame(func_module, locals, Some(name.to_owned()), caller_loc);

        let params = func_node.child(1);
        if params.children.len() < argv.len() {
            let err = self.runtime_error(
                func_module,
                params,
                ErrorKind::Argument,
                format!(
                    "{name} expected at most {} arguments, received {}",
                    params.children.len(),
                    argv.len()
                ),
            );
            let pending = self.pop_frame();
            pending.drop_with_heap(&mut self.heap);
            return Err(err);
        }

        for (index, parameter) in params.children.iter().enumerate() {
            let (name_node, default) = match parameter.kind {
                NodeKind::Assign => (parameter.child(0), Some(parameter.child(1))),
                _ => (parameter, None),
            };
            let parameter_name = func_source.tokens[name_node.token.expect("name token")]
                .payload
                .as_str()
                .to_owned();

            let value = if index < argv.len() {
                argv[index].clone_with_heap(&mut self.heap)
            } else if let Some(default) = default {
                match self.visit(func_module, default) {
                    Ok(value) => value,
                    Err(err) => {
                        let pending = self.pop_frame();
                        pending.drop_with_heap(&mut self.heap);
                        return Err(err);
                    }
                }
            } else {
                let err = self.runtime_error(
                    func_module,
                    parameter,
                    ErrorKind::Argument,
                    format!("Expected argument \"{parameter_name}\""),
                );
                let pending = self.pop_frame();
                pending.drop_with_heap(&mut self.heap);
                return Err(err);
            };
            self.heap.map_insert(locals, &parameter_name, value);
        }

        if func_node.children.len() == 3 {
            match self.visit(func_module, func_node.child(2)) {
                Ok(value) => value.drop_with_heap(&mut self.heap),
                Err(err) => {
                    let pending = self.pop_frame();
                    pending.drop_with_heap(&mut self.heap);
                    return Err(err);
                }
            }
        }

        let result = self
            .frames
            .last_mut()
            .expect("active frame")
            .value
            .take()
            .unwrap_or(Value::Null);
        let pending = self.pop_frame();
        pending.drop_with_heap(&mut self.heap);
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Emit, import, assert

    fn visit_emit(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let value = self.visit(module, node.child(0))?;
        let vertex_size = self.layout.size();

        let id = match &value {
            Value::Ref(id) if matches!(self.heap.get(*id), HeapData::Tuple(_)) => *id,
            other => {
                let err = self.runtime_error(
                    module,
                    node,
                    ErrorKind::Emit,
                    format!(
                        "Expected \"{}\", received \"{}\"",
                        Type::Tuple,
                        other.type_of(&self.heap)
                    ),
                );
                value.drop_with_heap(&mut self.heap);
                return Err(err);
            }
        };

        let length = self.heap.seq_items(id).len();
        if length != vertex_size {
            let err = self.runtime_error(
                module,
                node,
                ErrorKind::Emit,
                format!(
                    "Expected tuple with a length of {vertex_size}, received a tuple with a length of {length}"
                ),
            );
            value.drop_with_heap(&mut self.heap);
            return Err(err);
        }

        let mut components = Vec::with_capacity(vertex_size);
        let mut bad_component: Option<Type> = None;
        for item in self.heap.seq_items(id) {
            match item {
                Value::Int(i) => components.push(*i as f32),
                Value::Float(f) => components.push(*f),
                other => {
                    bad_component = Some(other.type_of(&self.heap));
                    break;
                }
            }
        }
        if let Some(kind) = bad_component {
            let err = self.runtime_error(
                module,
                node,
                ErrorKind::Emit,
                format!(
                    "Expected \"{}\" or \"{}\", received \"{kind}\"",
                    Type::Int,
                    Type::Float
                ),
            );
            value.drop_with_heap(&mut self.heap);
            return Err(err);
        }

        self.vertices.extend_from_slice(&components);
        value.drop_with_heap(&mut self.heap);
        Ok(Value::Null)
    }

    fn dotted_name(source: &ModuleSource, node: &Node) -> String {
        match node.kind {
            NodeKind::Name => source.tokens[node.token.expect("name token")]
                .payload
                .as_str()
                .to_owned(),
            NodeKind::Attribute => {
                let base = Self::dotted_name(source, node.child(0));
                let segment = source.tokens[node.child(1).token.expect("name token")]
                    .payload
                    .as_str();
                format!("{base}.{segment}")
            }
            _ => unreachable!("invalid import name node"),
        }
    }

    /// The name a module binds to when imported without an alias: the
    /// last segment of the dotted path.
    fn import_binding(source: &ModuleSource, node: &Node) -> String {
        match node.kind {
            NodeKind::Name => source.tokens[node.token.expect("name token")]
                .payload
                .as_str()
                .to_owned(),
            NodeKind::Attribute => source.tokens[node.child(1).token.expect("name token")]
                .payload
                .as_str()
                .to_owned(),
            _ => unreachable!("invalid import name node"),
        }
    }

    fn visit_import(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let source = self.heap.module_source(module);

        if node.kind == NodeKind::Import {
            for child in &node.children {
                let (name_node, binding) = match child.kind {
                    NodeKind::As => {
                        let alias = source.tokens[child.child(1).token.expect("name token")]
                            .payload
                            .as_str()
                            .to_owned();
                        (child.child(0), alias)
                    }
                    _ => (child, Self::import_binding(&source, child)),
                };
                let import_name = Self::dotted_name(&source, name_node);
                let imported = self
                    .import_module(&import_name)
                    .map_err(|err| self.attach(module, child, err))?;
                self.set_value(module, &binding, imported);
            }
            return Ok(Value::Null);
        }

        // from a import x, y as z | from a import *
        let import_name = Self::dotted_name(&source, node.child(0));
        let imported = self
            .import_module(&import_name)
            .map_err(|err| self.attach(module, node, err))?;
        let imported_id = match &imported {
            Value::Ref(id) => *id,
            _ => unreachable!("import produced a non-module"),
        };
        let imported_globals = self.heap.module(imported_id).globals;

        if node.children.len() == 1 {
            // Star import: copy every global.
            for index in 0..self.heap.map_len(imported_globals) {
                let (key, value) = self
                    .heap
                    .map_entry_cloned(imported_globals, index)
                    .expect("index in range");
                self.set_value(module, &key, value);
            }
        } else {
            for child in &node.children[1..] {
                let (name_node, binding) = match child.kind {
                    NodeKind::As => {
                        let alias = source.tokens[child.child(1).token.expect("name token")]
                            .payload
                            .as_str()
                            .to_owned();
                        (child.child(0), alias)
                    }
                    _ => (child, Self::import_binding(&source, child)),
                };
                let wanted = Self::dotted_name(&source, name_node);
                let Some(value) = self.heap.map_get_cloned(imported_globals, &wanted) else {
                    let err = self.runtime_error(
                        module,
                        child,
                        ErrorKind::Name,
                        format!("Undefined name \"{wanted}\""),
                    );
                    imported.drop_with_heap(&mut self.heap);
                    return Err(err);
                };
                self.set_value(module, &binding, value);
            }
        }

        imported.drop_with_heap(&mut self.heap);
        Ok(Value::Null)
    }

    fn visit_assert(&mut self, module: HeapId, node: &Rc<Node>) -> RunResult<Value> {
        let condition = self.visit(module, node.child(0))?;
        let truth = condition.truthy(&self.heap);
        condition.drop_with_heap(&mut self.heap);
        if truth {
            return Ok(Value::Null);
        }

        let message = if let Some(message_node) = node.children.get(1) {
            let value = self.visit(module, message_node)?;
            let text = to_display_string(&self.heap, &value);
            value.drop_with_heap(&mut self.heap);
            text
        } else {
            "Assertion failed".to_owned()
        };
        Err(self.runtime_error(module, node, ErrorKind::Assertion, message))
    }
}
