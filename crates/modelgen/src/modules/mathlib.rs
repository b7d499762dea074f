//! The static `math` module.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::args;
use crate::error::{Error, ErrorKind, RunResult};
use crate::heap::{Heap, HeapId};
use crate::instance::Instance;
use crate::modules::{new_static, set_cfn, set_float, set_int};
use crate::value::Value;

const PI: f32 = std::f32::consts::PI;
const DEG2RAD: f32 = PI / 180.0;
const RAD2DEG: f32 = 180.0 / PI;

pub(crate) fn create(heap: &mut Heap) -> HeapId {
    let (module, globals) = new_static(heap, "math");

    set_float(heap, globals, "epsilon", f32::EPSILON);
    set_float(heap, globals, "inf", f32::INFINITY);
    set_float(heap, globals, "nan", f32::NAN);
    set_float(heap, globals, "pi", PI);
    set_float(heap, globals, "tau", std::f32::consts::TAU);
    set_float(heap, globals, "e", std::f32::consts::E);
    set_int(heap, globals, "int_max", i32::MAX);
    set_int(heap, globals, "int_min", i32::MIN);

    set_cfn(heap, globals, "abs", mg_abs);
    set_cfn(heap, globals, "sign", mg_sign);
    set_cfn(heap, globals, "even", mg_even);
    set_cfn(heap, globals, "odd", mg_odd);
    set_cfn(heap, globals, "deg", mg_deg);
    set_cfn(heap, globals, "rad", mg_rad);
    set_cfn(heap, globals, "ceil", mg_ceil);
    set_cfn(heap, globals, "floor", mg_floor);
    set_cfn(heap, globals, "round", mg_round);
    set_cfn(heap, globals, "pow", mg_pow);
    set_cfn(heap, globals, "sqrt", mg_sqrt);
    set_cfn(heap, globals, "cos", mg_cos);
    set_cfn(heap, globals, "sin", mg_sin);
    set_cfn(heap, globals, "tan", mg_tan);
    set_cfn(heap, globals, "acos", mg_acos);
    set_cfn(heap, globals, "asin", mg_asin);
    set_cfn(heap, globals, "atan", mg_atan);
    set_cfn(heap, globals, "atan2", mg_atan2);
    set_cfn(heap, globals, "exp", mg_exp);
    set_cfn(heap, globals, "log", mg_log);
    set_cfn(heap, globals, "log2", mg_log2);
    set_cfn(heap, globals, "max", mg_max);
    set_cfn(heap, globals, "min", mg_min);
    set_cfn(heap, globals, "clamp", mg_clamp); // clamp(value, min, max)
    set_cfn(heap, globals, "sum", mg_sum); // sum(iterable)
    set_cfn(heap, globals, "lerp", mg_lerp); // lerp(a, b, t)
    set_cfn(heap, globals, "approximately", mg_approximately);
    set_cfn(heap, globals, "random", mg_random); // random(): float
    set_cfn(heap, globals, "seed", mg_seed); // seed(seed: int)

    module
}

/// A unary float function over an int or float argument.
fn unary(
    name: &'static str,
    instance: &Instance,
    argv: &[Value],
    op: fn(f32) -> f32,
) -> RunResult<Value> {
    args::check_count(name, argv, 1, 1)?;
    let x = args::number_arg(&instance.heap, name, argv, 0)?;
    Ok(Value::Float(op(x)))
}

fn mg_abs(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("abs", argv, 1, 1)?;
    match argv[0] {
        Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        _ => Err(not_a_number(instance, "abs", &argv[0])),
    }
}

fn mg_sign(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("sign", argv, 1, 1)?;
    match argv[0] {
        Value::Int(i) => Ok(Value::Int(i.signum())),
        Value::Float(f) => Ok(Value::Int(if f > 0.0 {
            1
        } else if f < 0.0 {
            -1
        } else {
            0
        })),
        _ => Err(not_a_number(instance, "sign", &argv[0])),
    }
}

fn not_a_number(instance: &Instance, name: &str, value: &Value) -> Error {
    Error::new(
        ErrorKind::Argument,
        format!(
            "{name} expected argument 1 as \"int\" or \"float\", received \"{}\"",
            value.type_of(&instance.heap)
        ),
    )
}

fn mg_even(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("even", argv, 1, 1)?;
    let i = args::int_arg(&instance.heap, "even", argv, 0)?;
    Ok(Value::Int(i32::from(i % 2 == 0)))
}

fn mg_odd(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("odd", argv, 1, 1)?;
    let i = args::int_arg(&instance.heap, "odd", argv, 0)?;
    Ok(Value::Int(i32::from(i % 2 != 0)))
}

fn mg_deg(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    unary("deg", instance, argv, |x| x * RAD2DEG)
}

fn mg_rad(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    unary("rad", instance, argv, |x| x * DEG2RAD)
}

fn mg_ceil(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    unary("ceil", instance, argv, f32::ceil)
}

fn mg_floor(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    unary("floor", instance, argv, f32::floor)
}

fn mg_round(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    unary("round", instance, argv, f32::round)
}

fn mg_pow(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("pow", argv, 2, 2)?;
    let base = args::number_arg(&instance.heap, "pow", argv, 0)?;
    let exponent = args::number_arg(&instance.heap, "pow", argv, 1)?;
    Ok(Value::Float(base.powf(exponent)))
}

fn mg_sqrt(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    unary("sqrt", instance, argv, f32::sqrt)
}

fn mg_cos(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    unary("cos", instance, argv, f32::cos)
}

fn mg_sin(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    unary("sin", instance, argv, f32::sin)
}

fn mg_tan(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    unary("tan", instance, argv, f32::tan)
}

fn mg_acos(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    unary("acos", instance, argv, f32::acos)
}

fn mg_asin(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    unary("asin", instance, argv, f32::asin)
}

fn mg_atan(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    unary("atan", instance, argv, f32::atan)
}

fn mg_atan2(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("atan2", argv, 2, 2)?;
    let y = args::number_arg(&instance.heap, "atan2", argv, 0)?;
    let x = args::number_arg(&instance.heap, "atan2", argv, 1)?;
    Ok(Value::Float(y.atan2(x)))
}

fn mg_exp(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    unary("exp", instance, argv, f32::exp)
}

fn mg_log(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    unary("log", instance, argv, f32::ln)
}

fn mg_log2(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    unary("log2", instance, argv, f32::log2)
}

/// Reduces numeric arguments, staying integer when every input is one.
fn reduce(
    name: &'static str,
    instance: &Instance,
    argv: &[Value],
    int_op: fn(i32, i32) -> i32,
    float_op: fn(f32, f32) -> f32,
) -> RunResult<Value> {
    args::check_count(name, argv, 1, usize::MAX)?;
    let all_int = argv.iter().all(|value| matches!(value, Value::Int(_)));
    if all_int {
        let mut result = argv[0].as_int().expect("checked int");
        for value in &argv[1..] {
            result = int_op(result, value.as_int().expect("checked int"));
        }
        Ok(Value::Int(result))
    } else {
        let mut result = args::number_arg(&instance.heap, name, argv, 0)?;
        for index in 1..argv.len() {
            result = float_op(result, args::number_arg(&instance.heap, name, argv, index)?);
        }
        Ok(Value::Float(result))
    }
}

fn mg_max(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    reduce("max", instance, argv, i32::max, f32::max)
}

fn mg_min(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    reduce("min", instance, argv, i32::min, f32::min)
}

fn mg_clamp(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("clamp", argv, 3, 3)?;
    let all_int = argv.iter().all(|value| matches!(value, Value::Int(_)));
    if all_int {
        let value = argv[0].as_int().expect("checked int");
        let low = argv[1].as_int().expect("checked int");
        let high = argv[2].as_int().expect("checked int");
        Ok(Value::Int(value.min(high).max(low)))
    } else {
        let value = args::number_arg(&instance.heap, "clamp", argv, 0)?;
        let low = args::number_arg(&instance.heap, "clamp", argv, 1)?;
        let high = args::number_arg(&instance.heap, "clamp", argv, 2)?;
        Ok(Value::Float(value.min(high).max(low)))
    }
}

// sum(iterable): integer while every element is one, float otherwise
fn mg_sum(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("sum", argv, 1, 1)?;
    let id = args::seq_arg(&instance.heap, "sum", argv, 0)?;

    let mut int_total: i32 = 0;
    let mut float_total: f32 = 0.0;
    let mut all_int = true;
    let mut bad = None;
    for item in instance.heap.seq_items(id) {
        match item {
            Value::Int(i) => {
                int_total = int_total.wrapping_add(*i);
                float_total += *i as f32;
            }
            Value::Float(f) => {
                all_int = false;
                float_total += *f;
            }
            other => {
                bad = Some(other.type_of(&instance.heap));
                break;
            }
        }
    }
    if let Some(kind) = bad {
        return Err(Error::new(
            ErrorKind::Argument,
            format!("sum expected \"int\" or \"float\" elements, received \"{kind}\""),
        ));
    }
    Ok(if all_int {
        Value::Int(int_total)
    } else {
        Value::Float(float_total)
    })
}

fn mg_lerp(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("lerp", argv, 3, 3)?;
    let a = args::number_arg(&instance.heap, "lerp", argv, 0)?;
    let b = args::number_arg(&instance.heap, "lerp", argv, 1)?;
    let t = args::number_arg(&instance.heap, "lerp", argv, 2)?;
    Ok(Value::Float(a + (b - a) * t))
}

// approximately(a, b [, epsilon]): epsilon comparison, unlike `==`
fn mg_approximately(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("approximately", argv, 2, 3)?;
    let a = args::number_arg(&instance.heap, "approximately", argv, 0)?;
    let b = args::number_arg(&instance.heap, "approximately", argv, 1)?;
    let epsilon = if argv.len() == 3 {
        args::number_arg(&instance.heap, "approximately", argv, 2)?
    } else {
        1e-5
    };
    Ok(Value::Int(i32::from((a - b).abs() <= epsilon)))
}

fn mg_random(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("random", argv, 0, 0)?;
    Ok(Value::Float(instance.rng.gen::<f32>()))
}

fn mg_seed(instance: &mut Instance, argv: &[Value]) -> RunResult<Value> {
    args::check_count("seed", argv, 1, 1)?;
    let seed = args::int_arg(&instance.heap, "seed", argv, 0)?;
    instance.rng = StdRng::seed_from_u64(seed as u64);
    Ok(Value::Null)
}
