use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use geomdb::core::allocator::FreeSpaceAllocator;
use geomdb::core::codec::minor;
use geomdb::core::header::HEADER_SIZE;
use geomdb::core::pattern;
use geomdb::{Database, DatabaseConfig, Record};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn bench_reserve_free_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocator");

    for live in [100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("churn", live), &live, |b, &live| {
            b.iter(|| {
                let mut rng = StdRng::seed_from_u64(42);
                let mut alloc = FreeSpaceAllocator::new(HEADER_SIZE, HEADER_SIZE);
                let mut ranges: Vec<(u64, u64)> = (0..live)
                    .map(|_| {
                        let r = alloc.reserve(None, rng.gen_range(1..64) * 8).unwrap();
                        (r.address, r.length)
                    })
                    .collect();

                // Free half at random, then refill (exercises first fit + coalescing)
                for _ in 0..live / 2 {
                    let (address, length) = ranges.swap_remove(rng.gen_range(0..ranges.len()));
                    alloc.free(address, length).unwrap();
                }
                for _ in 0..live / 2 {
                    let r = alloc.reserve(None, rng.gen_range(1..64) * 8).unwrap();
                    ranges.push((r.address, r.length));
                }
                black_box(alloc.fragmentation_score())
            });
        });
    }
    group.finish();
}

fn bench_database_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("database");

    group.bench_function("put_1000_in_memory", |b| {
        b.iter(|| {
            let mut db = Database::in_memory(DatabaseConfig::default()).unwrap();
            for i in 0..1000 {
                let record =
                    Record::primitive(format!("part{}.s", i), minor::SPHERE, vec![0; 64]).unwrap();
                db.put(&record).unwrap();
            }
            black_box(db.stats())
        });
    });

    group.finish();
}

fn bench_pattern_match(c: &mut Criterion) {
    let mut db = Database::in_memory(DatabaseConfig::default()).unwrap();
    for i in 0..5000 {
        let record = Record::primitive(format!("wheel{}.s", i), minor::TORUS, vec![0; 8]).unwrap();
        db.put(&record).unwrap();
    }

    let mut group = c.benchmark_group("pattern");
    group.bench_function("single_match", |b| {
        b.iter(|| black_box(pattern::matches("wheel*[0-9].s", "wheel4242.s")))
    });
    group.bench_function("match_all_5000", |b| {
        b.iter(|| black_box(db.match_names("wheel?[13579]*.s")))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_reserve_free_churn,
    bench_database_put,
    bench_pattern_match
);
criterion_main!(benches);
