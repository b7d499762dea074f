//! Human-readable dumps of tokens, syntax trees and loaded modules.
//!
//! Backs the CLI's `--tokens`, `--ast` and `--inspect` flags; tests use
//! the same output to pin structure.

use crate::ast::{Node, NodeKind};
use crate::heap::HeapData;
use crate::instance::Instance;
use crate::tokenize::{Payload, Token, TokenKind};
use crate::types::str::escape;
use crate::value::to_repr_string;

/// One line per token: `file:line:col: kind "text"`.
pub fn dump_tokens(source: &str, tokens: &[Token], filename: &str) -> String {
    let mut out = String::new();
    for token in tokens {
        let text = match (&token.payload, token.kind) {
            (Payload::Str(decoded), TokenKind::Str) => escape(decoded),
            _ => escape(token.slice(source)),
        };
        out.push_str(&format!(
            "{filename}:{}:{}: {} \"{text}\"\n",
            token.begin.line,
            token.begin.column,
            token.kind.name()
        ));
    }
    out
}

const INDENT: &str = "|- ";
const INDENT_LAST: &str = "`- ";
const CHILD_INDENT: &str = "|  ";
const CHILD_INDENT_LAST: &str = "   ";

/// A tree drawing of the AST, one node per line.
pub fn dump_node(root: &Node, source: &str, tokens: &[Token]) -> String {
    let mut out = String::new();
    dump_node_inner(root, source, tokens, &mut String::new(), true, &mut out);
    out
}

fn dump_node_inner(
    node: &Node,
    source: &str,
    tokens: &[Token],
    prefix: &mut String,
    is_last: bool,
    out: &mut String,
) {
    out.push_str(prefix);
    out.push_str(if is_last { INDENT_LAST } else { INDENT });
    out.push_str(&node.kind.to_string());

    if let Some(index) = node.token {
        let token = &tokens[index];
        if matches!(
            node.kind,
            NodeKind::Name | NodeKind::Int | NodeKind::Float | NodeKind::Str
        ) {
            out.push(' ');
            out.push_str(&escape(token.slice(source)));
        }
    }
    out.push('\n');

    let saved = prefix.len();
    prefix.push_str(if is_last { CHILD_INDENT_LAST } else { CHILD_INDENT });
    for (index, child) in node.children.iter().enumerate() {
        let last = index + 1 == node.children.len();
        dump_node_inner(child, source, tokens, prefix, last, out);
    }
    prefix.truncate(saved);
}

/// Every loaded module and its globals, in registration order.
pub fn dump_instance(instance: &Instance) -> String {
    let mut out = String::new();
    for (name, &id) in &instance.modules {
        let data = instance.heap.module(id);
        let tag = if data.is_static { " (static)" } else { "" };
        out.push_str(&format!("module {name}{tag}\n"));
        if let HeapData::Map(entries) = instance.heap.get(data.globals) {
            for (key, value) in entries {
                out.push_str(&format!(
                    "  {key} = {}\n",
                    to_repr_string(&instance.heap, value)
                ));
            }
        }
    }
    out
}
