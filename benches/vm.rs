//! Benchmarks for the compile and execute halves of the pipeline.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use luacloak::bytecode::{self, Environment, Vm};
use std::rc::Rc;

const FIB: &str = "
function fib(n)
    if n < 2 then return n end
    return fib(n - 1) + fib(n - 2)
end
return fib(18)
";

const LOOP_SUM: &str = "
local total = 0
for i = 1, 10000 do
    total = total + i % 7
end
return total
";

const TABLE_CHURN: &str = "
local t = {}
for i = 1, 1000 do
    t[i] = i * 2
end
local sum = 0
for i = 1, 1000 do
    sum = sum + t[i]
end
return sum
";

fn compile(source: &str) -> bytecode::Chunk {
    luacloak::compile(source).expect("compile error")
}

fn run(chunk: Rc<bytecode::Chunk>) {
    let mut env = Environment::with_stdlib();
    let mut vm = Vm::new();
    vm.run(chunk, Vec::new(), &mut env).expect("runtime error");
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    group.bench_function("fib", |b| b.iter(|| compile(black_box(FIB))));
    group.bench_function("loop_sum", |b| b.iter(|| compile(black_box(LOOP_SUM))));
    group.finish();
}

fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute");
    let fib = Rc::new(compile(FIB));
    let loop_sum = Rc::new(compile(LOOP_SUM));
    let table_churn = Rc::new(compile(TABLE_CHURN));

    group.bench_function("fib", |b| b.iter(|| run(black_box(fib.clone()))));
    group.bench_function("loop_sum", |b| b.iter(|| run(black_box(loop_sum.clone()))));
    group.bench_function("table_churn", |b| {
        b.iter(|| run(black_box(table_churn.clone())))
    });
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let chunk = compile(TABLE_CHURN);
    group.bench_function("encode_decode", |b| {
        b.iter(|| {
            let encrypted = bytecode::encode(black_box(&chunk), Some(171)).unwrap();
            bytecode::decode(&encrypted).unwrap()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_compile, bench_execute, bench_encode);
criterion_main!(benches);
