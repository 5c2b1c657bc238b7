//! Fetch benchmarks for ifsfetch.
//!
//! All benchmarks read from an in-memory archive populated with synthetic
//! 0.25 degree cycles, so they measure decoding, conforming, caching and
//! worker scheduling rather than network latency.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench fetch                  # everything
//! cargo bench --bench fetch -- "workers"     # worker-count sweep only
//! cargo bench --bench fetch -- "cache"       # cold vs warm cache
//! ```

use std::hint::black_box;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use ifsfetch::grid::{FIELD_LEN, GridSpec, NLON};
use ifsfetch::{Clock, CycleWriter, Field, FixedClock, Ifs, IfsConfig, MemoryStore, lookup};
use rand::Rng;
use tempfile::TempDir;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Variables fetched per iteration.
const VARIABLES: [&str; 8] = ["u10m", "v10m", "t2m", "msl", "z500", "t850", "u250", "q700"];

/// Worker counts compared by the sweep.
const WORKER_COUNTS: [usize; 5] = [0, 1, 2, 4, 8];

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_756_684_800, 0).unwrap()
}

fn make_values(rng: &mut impl Rng) -> Vec<f32> {
    (0..FIELD_LEN)
        .map(|k| 250.0 + (k % NLON) as f32 * 0.01 + rng.random_range(-1.0..1.0))
        .collect()
}

fn archive() -> MemoryStore {
    let store = MemoryStore::new();
    let mut rng = rand::rng();
    let mut writer = CycleWriter::new(t0()).unwrap().decimal_scale(2);
    for name in VARIABLES {
        writer
            .add(&Field {
                id: lookup(name).unwrap().field,
                time: t0(),
                grid: GridSpec::ARCHIVE,
                values: make_values(&mut rng),
            })
            .unwrap();
    }
    writer.publish(&store).unwrap();
    store
}

fn client(store: MemoryStore, root: &TempDir, cache: bool, max_workers: usize) -> Ifs<MemoryStore> {
    let config = IfsConfig {
        cache,
        max_workers,
        cache_root: Some(root.path().to_path_buf()),
        ..IfsConfig::default()
    };
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(t0() + TimeDelta::days(1)));
    Ifs::new(store, config).unwrap().with_clock(clock)
}

// ================================================================================================
// Benchmarks
// ================================================================================================

/// Uncached fetch of [`VARIABLES`] with an increasing worker count.
///
/// Every iteration decodes all fields from the store, so the sweep shows
/// how well decoding and conforming scale across threads.
fn bench_workers(c: &mut Criterion) {
    let store = archive();
    let mut group = c.benchmark_group("workers");
    group.sample_size(10);

    for workers in WORKER_COUNTS {
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &workers| {
            let root = TempDir::new().unwrap();
            let ifs = client(store.clone(), &root, false, workers);
            b.iter(|| black_box(ifs.fetch(t0(), VARIABLES).unwrap()));
        });
    }
    group.finish();
}

/// Cold (store) versus warm (memory-mapped cache) reads.
fn bench_cache(c: &mut Criterion) {
    let store = archive();
    let mut group = c.benchmark_group("cache");
    group.sample_size(10);

    group.bench_function("cold", |b| {
        let root = TempDir::new().unwrap();
        let ifs = client(store.clone(), &root, true, 4);
        b.iter(|| {
            ifs.clear_cache().unwrap();
            black_box(ifs.fetch(t0(), VARIABLES).unwrap())
        });
    });

    group.bench_function("warm", |b| {
        let root = TempDir::new().unwrap();
        let ifs = client(store.clone(), &root, true, 4);
        ifs.fetch(t0(), VARIABLES).unwrap();
        b.iter(|| black_box(ifs.fetch(t0(), VARIABLES).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, bench_workers, bench_cache);
criterion_main!(benches);
