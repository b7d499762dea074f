use std::rc::Rc;

use modelgen::{dump_node, parse, tokenize, Node, NodeKind};
use pretty_assertions::assert_eq;

fn parse_source(source: &str) -> (Vec<modelgen::Token>, Rc<Node>) {
    let tokens = tokenize(source, "<test>").unwrap();
    let root = parse(&tokens, "<test>").unwrap();
    (tokens, root)
}

fn check_spans(node: &Node) {
    for child in &node.children {
        assert!(
            node.first_token <= child.first_token && node.last_token >= child.last_token,
            "{} span does not cover child {}",
            node.kind,
            child.kind
        );
        check_spans(child);
    }
}

#[test]
fn every_node_spans_its_children() {
    let source = "\
total = 0
for v in [1, 2, 3]
    total += v * (v - 1)
    if total > 3: break
func scale(p, factor = 2): return (p[0] * factor, p[1] * factor)
emit (0, 0, 0, 0, 0, 1)
";
    let (_, root) = parse_source(source);
    check_spans(&root);
}

#[test]
fn root_spans_whole_token_stream() {
    let (tokens, root) = parse_source("a = 1\n\nb = a + 1\n");
    assert_eq!(root.kind, NodeKind::Module);
    assert_eq!(root.first_token, 0);
    assert_eq!(root.last_token, tokens.len() - 1);
}

#[test]
fn reparsing_the_same_source_yields_the_same_structure() {
    fn shape(node: &Node, out: &mut String) {
        out.push_str(&node.kind.to_string());
        out.push('(');
        for child in &node.children {
            shape(child, out);
            out.push(',');
        }
        out.push(')');
    }

    let source = "f = (x) -> x ? x : 0\nresult = f(3) + f(0)\n";
    let (_, first) = parse_source(source);
    let (_, second) = parse_source(source);
    let mut a = String::new();
    let mut b = String::new();
    shape(&first, &mut a);
    shape(&second, &mut b);
    assert_eq!(a, b);
}

#[test]
fn ast_dump_is_stable() {
    let source = "x = 1 + 2\n";
    let (tokens, root) = parse_source(source);
    let dump = dump_node(&root, source, &tokens);
    assert_eq!(
        dump,
        "`- Module\n   `- Assign\n      |- Name x\n      `- BinOp(Add)\n         |- Integer 1\n         `- Integer 2\n"
    );
}

#[test]
fn emit_statement_takes_a_tuple_expression() {
    let (_, root) = parse_source("emit (0, 0, 0, 0, 0, 1)\n");
    let emit = root.child(0);
    assert_eq!(emit.kind, NodeKind::Emit);
    assert_eq!(emit.children.len(), 1);
    assert_eq!(emit.child(0).kind, NodeKind::Tuple);
    assert_eq!(emit.child(0).children.len(), 6);
}

#[test]
fn while_loop_with_block_body() {
    let (_, root) = parse_source("n = 0\nwhile n < 3\n    n += 1\nprint(n)\n");
    let while_node = root.child(1);
    assert_eq!(while_node.kind, NodeKind::While);
    assert_eq!(while_node.children.len(), 2);
}

#[test]
fn ternary_and_elvis_forms() {
    let (_, root) = parse_source("a = x ? 1 : 2\nb = x ?: 3\nc = x ?? 4\n");
    assert_eq!(root.child(0).child(1).kind, NodeKind::TernaryConditional);
    assert_eq!(
        root.child(1).child(1).kind,
        NodeKind::BinOp(modelgen::BinOp::Conditional)
    );
    assert_eq!(
        root.child(2).child(1).kind,
        NodeKind::BinOp(modelgen::BinOp::Coalesce)
    );
}
