//! Compile-cost and evaluation-throughput benchmarks, with handwritten
//! Rust closures as the baseline.

use std::ptr::addr_of;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use exp_jit::Evaluator;

struct Bound {
    values: Box<[f64; 4]>,
    eval: Evaluator,
}

fn bound_evaluator() -> Bound {
    let values = Box::new([1.1f64, 2.2, 3.3, 4.4]);
    let mut eval = Evaluator::new().unwrap();
    for (slot, name) in ["a", "b", "c", "x"].iter().enumerate() {
        unsafe { eval.bind(addr_of!(values[slot]), name).unwrap() };
    }
    Bound { values, eval }
}

static EXPRESSIONS: &[(&str, &str)] = &[
    ("polynomial", "a*x*x + b*x + c"),
    ("trig", "sin(a)*cos(b) + tan(c)"),
    ("norm", "sqrt(a*a + b*b + c*c)"),
    ("mixed", "exp(a/10) * ln(b+1) + x^2 - min(a, c)"),
];

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_expression");
    for (name, expr) in EXPRESSIONS {
        let mut bound = bound_evaluator();
        group.bench_with_input(BenchmarkId::from_parameter(name), expr, |bench, expr| {
            bench.iter(|| bound.eval.set_expression(black_box(expr)).unwrap());
        });
    }
    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");

    for (name, expr) in EXPRESSIONS {
        let mut bound = bound_evaluator();
        bound.eval.set_expression(expr).unwrap();
        group.bench_function(BenchmarkId::new("compiled", name), |bench| {
            bench.iter(|| {
                bound.values[3] += 1e-9;
                black_box(bound.eval.evaluate())
            });
        });
    }

    // Native baselines for the same formulas.
    let mut values = [1.1f64, 2.2, 3.3, 4.4];
    let natives: &[(&str, fn(&[f64; 4]) -> f64)] = &[
        ("polynomial", |v| v[0] * v[3] * v[3] + v[1] * v[3] + v[2]),
        ("trig", |v| v[0].sin() * v[1].cos() + v[2].tan()),
        ("norm", |v| (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()),
        ("mixed", |v| {
            (v[0] / 10.0).exp() * (v[1] + 1.0).ln() + v[3] * v[3] - v[0].min(v[2])
        }),
    ];
    for (name, native) in natives {
        group.bench_function(BenchmarkId::new("native", name), |bench| {
            bench.iter(|| {
                values[3] += 1e-9;
                black_box(native(black_box(&values)))
            });
        });
    }

    group.finish();
}

fn bench_rebinding_sweep(c: &mut Criterion) {
    // The headline use case: compile once, evaluate many times while the
    // inputs change underneath.
    let mut bound = bound_evaluator();
    bound
        .eval
        .set_expression("0.3 + sin(2.33 + x - ln(0.3*pi + (88/b)/e)) / 98")
        .unwrap();

    c.bench_function("sweep_1000", |bench| {
        bench.iter(|| {
            let mut acc = 0.0;
            for step in 0..1000 {
                bound.values[3] = step as f64 * 0.1;
                acc += bound.eval.evaluate();
            }
            black_box(acc)
        });
    });
}

criterion_group!(benches, bench_compile, bench_evaluate, bench_rebinding_sweep);
criterion_main!(benches);
