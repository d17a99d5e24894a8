//! # Entity Allocator Benchmark
//!
//! - `spawn()` on one thread and under contention
//! - Textual id formatting and parsing
//!
//! Run with: `cargo bench --package metronome_core`

// Benchmarks don't need docs
#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use metronome_core::stage::{self, Stage};
use metronome_core::{
    AccessGuard, EntityAllocator, EntityId, HeadlessWindow, Runtime, RuntimeConfig,
};

/// Allocator in a stage where spawning is legal.
fn allocator() -> (stage::StageDriver, EntityAllocator) {
    let (mut driver, reader) = stage::registry();
    driver.enter(Stage::Variable);
    let allocator = EntityAllocator::new(AccessGuard::new(reader)).unwrap();
    (driver, allocator)
}

fn bench_spawn(c: &mut Criterion) {
    let (_driver, allocator) = allocator();
    c.bench_function("spawn", |b| {
        b.iter(|| black_box(allocator.spawn().unwrap()));
    });
}

fn bench_spawn_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn_contended");

    for threads in [2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let (_driver, allocator) = allocator();
            let allocator = Arc::new(allocator);
            b.iter(|| {
                let workers: Vec<_> = (0..threads)
                    .map(|_| {
                        let allocator = Arc::clone(&allocator);
                        std::thread::spawn(move || {
                            for _ in 0..1_000 {
                                black_box(allocator.spawn().unwrap());
                            }
                        })
                    })
                    .collect();
                for worker in workers {
                    worker.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_text_format(c: &mut Criterion) {
    let id = EntityId::from_parts(0x1A2B, 0x03F1, 0x2C);
    c.bench_function("entity_id_to_string", |b| {
        b.iter(|| black_box(id).to_string());
    });
    c.bench_function("entity_id_parse", |b| {
        b.iter(|| black_box("1A2B-03F1-0000002C").parse::<EntityId>().unwrap());
    });
}

fn bench_frame(c: &mut Criterion) {
    let mut runtime = Runtime::new(RuntimeConfig::default()).unwrap();
    runtime
        .add_system(Stage::FixedStep, "spawn", |world| world.spawn().map(|_| ()))
        .unwrap();
    let mut window = HeadlessWindow::new(None);
    runtime.boot(&mut window).unwrap();

    c.bench_function("advance_frame_60hz", |b| {
        b.iter(|| black_box(runtime.advance(1.0 / 60.0, &mut window).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_spawn,
    bench_spawn_contended,
    bench_text_format,
    bench_frame
);
criterion_main!(benches);
