//! ed2k hashing benchmarks
//!
//! Measures the engine on in-memory data around the 9,728,000 byte block
//! boundary, the cost of feeding it in small reads, and the hasher pool
//! over real files.

use anidb_identify_core::hashing::{CHUNK_SIZE, CHUNKS_PER_BLOCK};
use anidb_identify_core::{Ed2kEngine, Event, EventBus, HasherPool, IoGate, PoolConfig};
use anidb_identify_test_utils::{TestFileBuilder, TestFiles, pattern_bytes};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tokio::runtime::Runtime;

/// Bytes per ed2k block
const BLOCK: usize = CHUNK_SIZE * CHUNKS_PER_BLOCK as usize;

fn benchmark_engine_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("ed2k_engine");
    group.sample_size(20);

    let sizes = [
        1_024,
        1_048_576,
        BLOCK - 1,
        BLOCK,
        BLOCK + 1,
        2 * BLOCK,
        52_428_800,
    ];
    for size in sizes {
        let data = pattern_bytes(size, 7);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(format_size(size)), &data, |b, data| {
            let mut engine = Ed2kEngine::new(IoGate::new(false));
            b.iter(|| {
                engine.reset();
                engine.update(black_box(data));
                black_box(engine.finalize());
            })
        });
    }
    group.finish();
}

/// Same data fed in reads of different sizes
fn benchmark_read_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("ed2k_read_size");
    group.sample_size(20);
    let data = pattern_bytes(2 * BLOCK, 7);
    group.throughput(Throughput::Bytes(data.len() as u64));

    for read in [4_096, 65_536, 1_048_576] {
        group.bench_with_input(BenchmarkId::from_parameter(format_size(read)), &read, |b, &read| {
            let mut engine = Ed2kEngine::new(IoGate::new(false));
            b.iter(|| {
                engine.reset();
                for piece in data.chunks(read) {
                    engine.update(black_box(piece));
                }
                black_box(engine.finalize());
            })
        });
    }
    group.finish();
}

fn benchmark_pool(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let files = TestFiles::new().unwrap();
    let paths: Vec<_> = (0..8)
        .map(|i| {
            files
                .add(&TestFileBuilder::new(format!("episode-{i:02}.mkv")).size(4 * 1_048_576 + i))
                .unwrap()
        })
        .collect();
    let total: u64 = paths
        .iter()
        .map(|path| std::fs::metadata(path).unwrap().len())
        .sum();

    let mut group = c.benchmark_group("hasher_pool");
    group.sample_size(10);
    group.throughput(Throughput::Bytes(total));

    for (threads, serialize_io) in [(1, false), (4, false), (4, true)] {
        let label = if serialize_io {
            format!("{threads}_threads_serialized")
        } else {
            format!("{threads}_threads")
        };
        let config = PoolConfig {
            max_threads: threads,
            serialize_io,
            ..Default::default()
        };
        group.bench_function(label, |b| {
            b.iter(|| {
                rt.block_on(async {
                    let bus = EventBus::new();
                    let mut events = bus.channel();
                    let mut pool = HasherPool::new(&config, bus.clone());
                    pool.start(paths.len()).unwrap();
                    for path in &paths {
                        pool.add_file(path.clone());
                    }
                    pool.finish_input();
                    while let Some(event) = events.recv().await {
                        if matches!(event, Event::PoolFinished) {
                            break;
                        }
                    }
                })
            })
        });
    }
    group.finish();
}

fn format_size(size: usize) -> String {
    if size >= 1_048_576 && size % 1_048_576 == 0 {
        format!("{}MiB", size / 1_048_576)
    } else if size >= 1_024 && size % 1_024 == 0 {
        format!("{}KiB", size / 1_024)
    } else {
        format!("{size}B")
    }
}

criterion_group!(
    benches,
    benchmark_engine_sizes,
    benchmark_read_sizes,
    benchmark_pool
);

criterion_main!(benches);
