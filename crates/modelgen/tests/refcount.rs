//! Reference-count exactness: after a program runs to completion and the
//! instance tears down, every value created during evaluation must have
//! been dropped exactly once.

use modelgen::{CollectStringPrint, Instance};
use pretty_assertions::assert_eq;

fn assert_no_leaks(source: &str) {
    let mut instance = Instance::with_print(Box::new(CollectStringPrint::new()));
    if let Err(err) = instance.run_source(source, "<test>") {
        panic!("program failed: {err}");
    }
    let stats = instance.finish();
    assert_eq!(
        stats.live_objects, 0,
        "leaked objects by type: {:?}",
        stats.objects_by_type
    );
}

#[test]
fn empty_instance_tears_down_clean() {
    let instance = Instance::with_print(Box::new(CollectStringPrint::new()));
    assert_eq!(instance.finish().live_objects, 0);
}

#[test]
fn literals_and_containers() {
    assert_no_leaks(
        "\
x = (1, \"two\", 3.0)
y = [x, x, x]
m = {a: x, b: y}
print(m)
",
    );
}

#[test]
fn shadowing_and_delete() {
    assert_no_leaks(
        "\
s = \"shared\"
t = s
delete s
print(t)
",
    );
}

#[test]
fn loops_and_temporaries() {
    assert_no_leaks(
        "\
total = 0
for i in range(100)
    xs = [i, i * 2]
    total += xs[0] + xs[-1]
print(total)
",
    );
}

#[test]
fn calls_defaults_and_returns() {
    assert_no_leaks(
        "\
func wrap(value, label = \"item\")
    return (label, value)
pairs = []
for i in range(10): pairs.add(wrap(i))
print(pairs.size)
",
    );
}

#[test]
fn closures_without_self_capture() {
    // The closure's captured map must be released with the function.
    assert_no_leaks(
        "\
func make_adder(n): return (x) -> x + n
add3 = make_adder(3)
print(add3(4))
delete add3
",
    );
}

#[test]
fn sequence_and_map_operators() {
    assert_no_leaks(
        "\
a = [1, 2] + [3]
b = a * 2
c = {x: 1} + {y: 2}
d = a[0:2]
print(b, c, d)
",
    );
}

#[test]
fn bound_methods_and_mutation() {
    assert_no_leaks(
        "\
xs = [3, 1, 2]
xs.sort()
xs.reverse()
popped = xs.pop()
xs.clear()
print(popped)
",
    );
}

#[test]
fn emit_and_vertices() {
    assert_no_leaks(
        "\
for i in range(3)
    emit (i, 0, 0, 0, 0, 1)
",
    );
}

#[test]
fn imports_and_module_bindings() {
    assert_no_leaks(
        "\
import math
from math import max as biggest
print(biggest(math.pi, 3))
",
    );
}

#[test]
fn break_payloads_are_released() {
    assert_no_leaks(
        "\
found = for i in range(10): if i == 5: break (i, \"stop\")
print(found)
",
    );
}

#[test]
fn string_operations() {
    assert_no_leaks(
        "\
s = \"Hello World\"
parts = s.split(\" \")
joined = \", \".join(parts)
formatted = \"%s / %d\" % (joined, parts.size)
print(formatted.lower())
",
    );
}
