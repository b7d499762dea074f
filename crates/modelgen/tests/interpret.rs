use modelgen::{export_obj, CollectStringPrint, ErrorKind, Instance};
use pretty_assertions::assert_eq;

fn run(source: &str) -> (String, Instance) {
    let mut instance = Instance::with_print(Box::new(CollectStringPrint::new()));
    if let Err(err) = instance.run_source(source, "<test>") {
        panic!("program failed: {err}");
    }
    let output = instance.collected_output();
    (output, instance)
}

fn run_output(source: &str) -> String {
    run(source).0
}

fn run_error(source: &str) -> modelgen::Error {
    let mut instance = Instance::with_print(Box::new(CollectStringPrint::new()));
    instance
        .run_source(source, "<test>")
        .expect_err("program should fail")
}

// ----------------------------------------------------------------------
// End-to-end scenarios

#[test]
fn arithmetic_and_print() {
    assert_eq!(run_output("print(1 + 2 * 3)"), "7\n");
}

#[test]
fn for_loop_sum() {
    let source = "\
s = 0
for i in range(1, 11): s += i
print(s)
";
    assert_eq!(run_output(source), "55\n");
}

#[test]
fn closure_captures_defining_locals() {
    let source = "\
func make_adder(n): return (x) -> x + n
add3 = make_adder(3)
print(add3(4))
";
    assert_eq!(run_output(source), "7\n");
}

#[test]
fn parallel_assignment() {
    let source = "\
a, b = 1, 2
print(a)
print(b)
";
    assert_eq!(run_output(source), "1\n2\n");
}

#[test]
fn map_iteration_preserves_insertion_order() {
    let source = "\
m = {a: 1, b: 2, c: 3}
for k in m.keys(): print(k)
";
    assert_eq!(run_output(source), "a\nb\nc\n");
}

#[test]
fn emit_produces_obj() {
    let source = "\
emit (0, 0, 0, 0, 0, 1)
emit (1, 0, 0, 0, 0, 1)
emit (0, 1, 0, 0, 0, 1)
";
    let (_, instance) = run(source);
    assert_eq!(instance.vertex_count(), 3);

    let mut obj = Vec::new();
    export_obj(&instance, &mut obj).unwrap();
    let obj = String::from_utf8(obj).unwrap();
    let v_lines = obj.lines().filter(|l| l.starts_with("v ")).count();
    let vn_lines = obj.lines().filter(|l| l.starts_with("vn ")).count();
    assert_eq!(v_lines, 3);
    assert_eq!(vn_lines, 3);
    assert!(obj.ends_with("f 1//1 2//2 3//3\n"));
    assert!(obj.contains("v 1.000000 0.000000 0.000000\n"));
}

// ----------------------------------------------------------------------
// Operators

#[test]
fn integer_division_truncates_toward_zero() {
    assert_eq!(run_output("print(7 // 2)"), "3\n");
    assert_eq!(run_output("print(-7 // 2)"), "-3\n");
}

#[test]
fn float_floor_division_floors() {
    assert_eq!(run_output("print(-7.0 // 2.0)"), "-4.0\n");
    assert_eq!(run_output("print(7.0 // 2.0)"), "3.0\n");
}

#[test]
fn modulo_takes_sign_of_left_operand() {
    assert_eq!(run_output("print(7 % 3)"), "1\n");
    assert_eq!(run_output("print(-7 % 3)"), "-1\n");
    assert_eq!(run_output("print(-7.5 % 2.0)"), "-1.5\n");
}

#[test]
fn division_always_produces_float() {
    assert_eq!(run_output("print(1 / 2)"), "0.5\n");
}

#[test]
fn division_by_zero_is_fatal() {
    assert_eq!(run_error("print(1 / 0)").kind(), ErrorKind::ZeroDivision);
    assert_eq!(run_error("print(1 // 0)").kind(), ErrorKind::ZeroDivision);
    assert_eq!(run_error("print(1 % 0)").kind(), ErrorKind::ZeroDivision);
}

#[test]
fn string_operators() {
    assert_eq!(run_output("print(\"ab\" + \"cd\")"), "abcd\n");
    assert_eq!(run_output("print(\"ab\" * 3)"), "ababab\n");
    assert_eq!(run_output("print(\"a\" < \"b\")"), "1\n");
    assert_eq!(run_output("print(\"x=%d y=%s\" % (1, \"two\"))"), "x=1 y=two\n");
}

#[test]
fn format_mismatch_is_fatal() {
    assert_eq!(run_error("print(\"%d\" % (1, 2))").kind(), ErrorKind::Format);
    assert_eq!(run_error("print(\"%q\" % (1,))").kind(), ErrorKind::Format);
}

#[test]
fn sequence_operators() {
    assert_eq!(run_output("print((1, 2) + (3,))"), "(1, 2, 3)\n");
    assert_eq!(run_output("print([1, 2] + [3])"), "[1, 2, 3]\n");
    assert_eq!(run_output("print([0] * 3)"), "[0, 0, 0]\n");
    assert_eq!(run_output("print([1, 2] == [1, 2])"), "1\n");
    assert_eq!(run_output("print([1, 2] < [1, 3])"), "1\n");
}

#[test]
fn map_merge_right_wins() {
    let source = "\
m = {a: 1, b: 2} + {b: 9, c: 3}
print(m.a)
print(m.b)
print(m.c)
";
    assert_eq!(run_output(source), "1\n9\n3\n");
}

#[test]
fn int_float_conversions_round_trip() {
    let source = "\
for i in (-16777216, -65537, -1, 0, 1, 4096, 16777216)
    assert int(float(i)) == i
print(\"ok\")
";
    assert_eq!(run_output(source), "ok\n");
}

#[test]
fn integer_addition_wraps() {
    assert_eq!(run_output("print(2147483647 + 1)"), "-2147483648\n");
}

#[test]
fn unary_operators() {
    assert_eq!(run_output("print(-(3))"), "-3\n");
    assert_eq!(run_output("print(not 0)"), "1\n");
    assert_eq!(run_output("print(not (1, 2))"), "0\n");
}

// ----------------------------------------------------------------------
// Short-circuit laws

#[test]
fn short_circuit_never_evaluates_the_other_side() {
    let source = "\
func boom(): assert false, \"must not run\"
0 and boom()
1 or boom()
5 ?? boom()
print(\"ok\")
";
    assert_eq!(run_output(source), "ok\n");
}

#[test]
fn coalesce_evaluates_alternative_only_for_null() {
    assert_eq!(run_output("print(null ?? 4)"), "4\n");
    assert_eq!(run_output("print(0 ?? 4)"), "0\n");
    assert_eq!(run_output("print(0 ?: 4)"), "4\n");
    assert_eq!(run_output("print(0 ? 1 : 2)"), "2\n");
}

// ----------------------------------------------------------------------
// Subscripts, slices, attributes

#[test]
fn subscripts_and_negative_indices() {
    assert_eq!(run_output("print([1, 2, 3][-1])"), "3\n");
    assert_eq!(run_output("print((7, 8)[0])"), "7\n");
    assert_eq!(run_output("print(\"abc\"[1])"), "b\n");
    assert_eq!(run_output("m = {k: 5}\nprint(m[\"k\"])"), "5\n");
    assert_eq!(run_output("m = {k: 5}\nprint(m[\"missing\"])"), "null\n");
}

#[test]
fn out_of_range_subscript_is_fatal() {
    assert_eq!(run_error("print([1][5])").kind(), ErrorKind::Index);
}

#[test]
fn slices_produce_lists() {
    assert_eq!(run_output("print([1, 2, 3, 4, 5][1:4])"), "[2, 3, 4]\n");
    assert_eq!(run_output("print((1, 2, 3, 4)[0:4:2])"), "[1, 3]\n");
    assert_eq!(run_output("print([1, 2, 3][3:0:-1])"), "[3, 2]\n");
    assert_eq!(run_output("print(\"hello\"[1:3])"), "el\n");
}

#[test]
fn list_methods() {
    let source = "\
xs = [3, 1]
xs.add(2)
xs.sort()
print(xs)
print(xs.size)
print(xs.contains(3))
print(xs.index(1))
print(xs.pop())
print(xs)
";
    assert_eq!(run_output(source), "[1, 2, 3]\n3\n1\n0\n3\n[1, 2]\n");
}

#[test]
fn tuple_rejects_mutation() {
    assert_eq!(run_error("t = (1, 2)\nt[0] = 5").kind(), ErrorKind::Type);
    assert_eq!(run_error("t = (1, 2)\nt.add(3)").kind(), ErrorKind::Attribute);
}

#[test]
fn map_attribute_access_and_assignment() {
    let source = "\
m = {a: 1}
m.b = 2
print(m.a + m.b)
print(m.missing)
delete m.a
print(m.has(\"a\"))
";
    assert_eq!(run_output(source), "3\nnull\n0\n");
}

#[test]
fn string_methods() {
    let source = "\
s = \"Hello World\"
print(s.length)
print(s.upper())
print(s.split(\" \"))
print(\"-\".join((1, 2, 3)))
print(s.contains(\"World\"))
";
    assert_eq!(
        run_output(source),
        "11\nHELLO WORLD\n[\"Hello\", \"World\"]\n1-2-3\n1\n"
    );
}

// ----------------------------------------------------------------------
// Name resolution and control flow

#[test]
fn deleted_local_falls_back_to_global() {
    let source = "\
x = 10
func f(x)
    delete x
    return x
print(f(1))
";
    assert_eq!(run_output(source), "10\n");
}

#[test]
fn undefined_name_after_delete_is_fatal() {
    let source = "\
func f(y)
    delete y
    return y
f(1)
";
    assert_eq!(run_error(source).kind(), ErrorKind::Name);
}

#[test]
fn assignment_updates_existing_global_from_function() {
    let source = "\
counter = 0
proc bump(): counter = counter + 1
bump()
bump()
print(counter)
";
    assert_eq!(run_output(source), "2\n");
}

#[test]
fn break_unwinds_exactly_one_loop() {
    let source = "\
total = 0
for i in range(3)
    for j in range(10)
        if j == 2: break
        total += 1
print(total)
";
    assert_eq!(run_output(source), "6\n");
}

#[test]
fn continue_skips_to_next_iteration() {
    let source = "\
total = 0
for i in range(6)
    if i % 2 == 0: continue
    total += i
print(total)
";
    assert_eq!(run_output(source), "9\n");
}

#[test]
fn break_with_value_becomes_loop_value() {
    let source = "\
v = for i in range(10): if i == 3: break i * 2
print(v)
";
    assert_eq!(run_output(source), "6\n");
}

#[test]
fn return_unwinds_nested_loops_to_the_call() {
    let source = "\
func find(xs, wanted)
    for x in xs
        if x == wanted: return 1
    return 0
print(find((4, 5, 6), 5))
print(find((4, 5, 6), 9))
";
    assert_eq!(run_output(source), "1\n0\n");
}

#[test]
fn while_loop_with_condition() {
    let source = "\
n = 1
while n < 100
    n = n * 2
print(n)
";
    assert_eq!(run_output(source), "128\n");
}

#[test]
fn if_else_chain() {
    let source = "\
func grade(n)
    if n > 2: return \"big\"
    else if n > 0: return \"small\"
    else: return \"none\"
print(grade(5))
print(grade(1))
print(grade(0))
";
    assert_eq!(run_output(source), "big\nsmall\nnone\n");
}

#[test]
fn default_parameters_evaluate_in_callee_frame() {
    let source = "\
func pad(text, fill = \"-\")
    return fill + text + fill
print(pad(\"x\"))
print(pad(\"x\", \"*\"))
";
    assert_eq!(run_output(source), "-x-\n*x*\n");
}

#[test]
fn missing_required_argument_is_fatal() {
    let err = run_error("func f(a, b): return a\nf(1)");
    assert_eq!(err.kind(), ErrorKind::Argument);
}

#[test]
fn too_many_arguments_is_fatal() {
    let err = run_error("func f(a): return a\nf(1, 2)");
    assert_eq!(err.kind(), ErrorKind::Argument);
}

#[test]
fn calling_a_non_callable_is_fatal() {
    let err = run_error("x = 5\nx()");
    assert_eq!(err.kind(), ErrorKind::Type);
}

#[test]
fn mutation_of_captured_scope_is_observable() {
    let source = "\
func counter()
    n = 0
    bump = () -> n + 1
    n = 10
    return bump
f = counter()
print(f())
";
    assert_eq!(run_output(source), "11\n");
}

// ----------------------------------------------------------------------
// Errors, assert, traceback

#[test]
fn assert_failure_carries_message_and_position() {
    let err = run_error("assert 1 == 2, \"mismatch\"");
    assert_eq!(err.kind(), ErrorKind::Assertion);
    assert_eq!(err.message(), "mismatch");
    assert!(err.loc().is_some());
}

#[test]
fn runtime_error_includes_traceback_with_callee_name() {
    let source = "\
func inner(): return missing_name
func outer(): return inner()
outer()
";
    let err = run_error(source);
    assert_eq!(err.kind(), ErrorKind::Name);
    let text = err.to_string();
    assert!(text.contains("Traceback:"), "{text}");
    assert!(text.contains("inner"), "{text}");
    assert!(text.contains("Undefined name \"missing_name\""), "{text}");
}

#[test]
fn emit_arity_is_checked() {
    let err = run_error("emit (1, 2, 3)");
    assert_eq!(err.kind(), ErrorKind::Emit);
}

// ----------------------------------------------------------------------
// Imports and the standard modules

#[test]
fn static_math_module() {
    let source = "\
import math
print(math.max(3, 9))
print(math.abs(-4))
assert math.approximately(math.sqrt(9.0), 3.0)
print(math.clamp(15, 0, 10))
";
    assert_eq!(run_output(source), "9\n4\n10\n");
}

#[test]
fn static_list_module_free_functions() {
    let source = "\
import list
xs = [2, 1]
list.add(xs, 3)
list.sort(xs, (a, b) -> a > b)
print(xs)
print(list.size(xs))
";
    assert_eq!(run_output(source), "[1, 2, 3]\n3\n");
}

#[test]
fn from_import_binds_names() {
    let source = "\
from math import pi as tau_half, max
print(max(1, 2))
assert tau_half > 3.1
print(\"ok\")
";
    assert_eq!(run_output(source), "2\nok\n");
}

#[test]
fn file_imports_are_cached_and_resolved() {
    let dir = std::env::temp_dir().join(format!("modelgen-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("helper.mg"),
        "print(\"loading\")\nfunc triple(x): return x * 3\n",
    )
    .unwrap();

    let mut instance = Instance::with_print(Box::new(CollectStringPrint::new()));
    instance.add_search_path(&dir);
    instance
        .run_source(
            "import helper\nimport helper\nprint(helper.triple(3))",
            "<test>",
        )
        .unwrap();
    // The module body runs once; the second import reuses the cache.
    assert_eq!(instance.collected_output(), "loading\n9\n");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn version_is_a_three_tuple() {
    assert_eq!(run_output("print(version)"), "(0, 1, 0)\n");
}

#[test]
fn base_builtins() {
    assert_eq!(run_output("print(type(1.5))"), "float\n");
    assert_eq!(run_output("print(len((1, 2, 3)))"), "3\n");
    assert_eq!(run_output("print(len(\"abcd\"))"), "4\n");
    assert_eq!(run_output("print(int(\"2f\", 16))"), "47\n");
    assert_eq!(run_output("print(float(2))"), "2.0\n");
    assert_eq!(run_output("print(str(12) + \"!\")"), "12!\n");
    assert_eq!(run_output("print(true and not false)"), "1\n");
}

#[test]
fn range_builtin_matches_loop_semantics() {
    assert_eq!(run_output("print(range(4))"), "(0, 1, 2, 3)\n");
    assert_eq!(run_output("print(range(1, 4))"), "(1, 2, 3)\n");
    assert_eq!(run_output("print(range(6, 0, -2))"), "(6, 4, 2)\n");
    assert_eq!(run_output("print(range(3, 3))"), "()\n");
}
