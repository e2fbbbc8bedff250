//! Compiler benchmarks using criterion.
//!
//! Measures the pipeline with and without optimisation, and the compiled
//! code running under the blocking executor.
//!
//! Run with: cargo bench --bench compile_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tidal_runtime::context::CallBudget;
use tidal_runtime::{ExecutionContext, Executor, TableRef, Value};
use tidalc::ast::build::*;
use tidalc::ast::Chunk;
use tidalc::codegen::{Backend, FrameBackend};
use tidalc::{compile, ChunkLoader, CompileOptions};

/// local function fib(n) if n < 2 then return n end return fib(n-1) + fib(n-2) end
/// return fib(n)
fn fib_chunk(n: i64) -> Chunk {
    chunk(vec![
        local_function(
            "fib",
            &["n"],
            vec![
                if_then(lt(name("n"), int(2)), vec![ret(vec![name("n")])]),
                ret(vec![add(
                    call(name("fib"), vec![sub(name("n"), int(1))]),
                    call(name("fib"), vec![sub(name("n"), int(2))]),
                )]),
            ],
        ),
        ret(vec![call(name("fib"), vec![int(n)])]),
    ])
}

/// A chunk with `count` small functions, each with a loop.
fn wide_chunk(count: usize) -> Chunk {
    let stmts = (0..count)
        .map(|i| {
            local_function(
                &format!("f{}", i),
                &["n"],
                vec![
                    local(&["s"], vec![int(0)]),
                    numeric_for("i", int(1), name("n"), None, vec![set("s", add(name("s"), name("i")))]),
                    ret(vec![name("s")]),
                ],
            )
        })
        .collect();
    chunk(stmts)
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    for count in [1usize, 16, 64] {
        let chunk = wide_chunk(count);
        for optimize in [false, true] {
            let options = CompileOptions::new("bench").optimize(optimize);
            let label = if optimize { "optimized" } else { "plain" };
            group.bench_with_input(BenchmarkId::new(label, count), &chunk, |b, chunk| {
                b.iter(|| {
                    let module = compile(black_box(chunk), &options).unwrap();
                    FrameBackend::new("bench").generate(module).unwrap()
                })
            });
        }
    }
    group.finish();
}

fn bench_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_fib");
    let main = ChunkLoader::default()
        .load(&fib_chunk(20), TableRef::new())
        .unwrap();

    group.bench_function("no_pause", |b| {
        b.iter(|| {
            let results = Executor::call(&mut ExecutionContext::new(), main.clone(), vec![]).unwrap();
            assert_eq!(results, vec![Value::Integer(6765)]);
        })
    });

    for every in [1u64, 64] {
        group.bench_with_input(BenchmarkId::new("pause_every", every), &every, |b, &every| {
            b.iter(|| {
                let mut ctx = ExecutionContext::new().with_policy(CallBudget::new(every));
                Executor::call(&mut ctx, main.clone(), vec![]).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile, bench_run);
criterion_main!(benches);
