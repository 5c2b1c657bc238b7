//! Shared fixtures for integration tests and benches.
//!
//! Cycles are published into a local mirror with [`CycleWriter`], so tests
//! never depend on the network or on wall-clock time.

#![allow(dead_code)]

use std::f64::consts::PI;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use ifsfetch::grid::{FIELD_LEN, GridSpec, NLAT, NLON};
use ifsfetch::{
    Clock, CycleWriter, Field, FixedClock, Ifs, IfsConfig, LocalStore, ObjectStore, StoreError,
    lookup,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times; only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// 2025-09-01T00:00Z.
pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_756_684_800, 0).unwrap()
}

/// Clock fixed at `t0 + 2 days`.
pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(t0() + TimeDelta::days(2)))
}

// ------------------------------------------------------------------------------------------------
// Synthetic archive
// ------------------------------------------------------------------------------------------------

/// Deterministic archive-layout values for `param` at `time`: a smooth
/// zonal pattern plus seeded noise.
pub fn synthetic_values(param: &str, level: u32, time: DateTime<Utc>) -> Vec<f32> {
    let seed = param
        .bytes()
        .fold(time.timestamp() as u64 ^ u64::from(level), |acc, b| {
            acc.wrapping_mul(31).wrapping_add(u64::from(b))
        });
    let mut rng = StdRng::seed_from_u64(seed);
    let base = 200.0 + (seed % 100) as f64;

    let mut values = Vec::with_capacity(FIELD_LEN);
    for i in 0..NLAT {
        let lat = (90.0 - 0.25 * i as f64).to_radians();
        for j in 0..NLON {
            let lon = (-180.0 + 0.25 * j as f64) * PI / 180.0;
            let smooth = 20.0 * lat.cos() + 5.0 * (2.0 * lon).sin();
            values.push((base + smooth + rng.random_range(-0.5..0.5)) as f32);
        }
    }
    values
}

/// A filesystem mirror in a temporary directory.
pub struct Archive {
    pub dir: TempDir,
    pub store: LocalStore,
}

impl Archive {
    pub fn new() -> Self {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        Self { dir, store }
    }

    /// Publishes one cycle holding the fields behind `variables`.
    pub fn publish(&self, time: DateTime<Utc>, variables: &[&str]) {
        publish_into(&self.store, time, variables);
    }
}

/// Publishes one cycle holding the fields behind `variables` into `store`.
pub fn publish_into<S: ObjectStore + ?Sized>(store: &S, time: DateTime<Utc>, variables: &[&str]) {
    let mut writer = CycleWriter::new(time).unwrap().decimal_scale(1);
    for name in variables {
        let entry = lookup(name).unwrap();
        let id = entry.field;
        let values = synthetic_values(&id.param, id.level, time);
        writer
            .add(&Field {
                id,
                time,
                grid: GridSpec::ARCHIVE,
                values,
            })
            .unwrap();
    }
    writer.publish(store).unwrap();
}

// ------------------------------------------------------------------------------------------------
// Clients
// ------------------------------------------------------------------------------------------------

/// Client over `store` with its cache rooted at `cache_root`.
pub fn client<S: ObjectStore>(store: S, cache_root: &Path, cache: bool, max_workers: usize) -> Ifs<S> {
    let config = IfsConfig {
        cache,
        max_workers,
        cache_root: Some(cache_root.to_path_buf()),
        ..IfsConfig::default()
    };
    let clock: Arc<dyn Clock> = clock();
    Ifs::new(store, config).unwrap().with_clock(clock)
}

// ------------------------------------------------------------------------------------------------
// Counting store
// ------------------------------------------------------------------------------------------------

/// Wraps a store and counts reads.
#[derive(Debug)]
pub struct CountingStore<S> {
    inner: S,
    gets: AtomicUsize,
    range_gets: AtomicUsize,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            gets: AtomicUsize::new(0),
            range_gets: AtomicUsize::new(0),
        }
    }

    /// Whole-object reads so far.
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Range reads so far.
    pub fn range_gets(&self) -> usize {
        self.range_gets.load(Ordering::SeqCst)
    }
}

impl<S: ObjectStore> ObjectStore for CountingStore<S> {
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }

    fn get_range(&self, key: &str, range: Range<u64>) -> Result<Vec<u8>, StoreError> {
        self.range_gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_range(key, range)
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key)
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.inner.put(key, bytes)
    }
}
