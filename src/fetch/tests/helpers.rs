use chrono::{DateTime, TimeDelta, Utc};
use tracing_subscriber::EnvFilter;

use crate::cache::FieldCache;
use crate::grid::{FIELD_LEN, GridSpec, NLON};
use crate::lexicon::{self, FieldId, LexiconEntry};
use crate::message::Field;
use crate::publish::CycleWriter;
use crate::schedule::Schedule;
use crate::store::MemoryStore;

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times; only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// 2025-09-01T00:00Z, an `oper` cycle.
pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_756_684_800, 0).unwrap()
}

/// A day after `t0`, so every cycle up to `t0 + 12h` is published.
pub fn now() -> DateTime<Utc> {
    t0() + TimeDelta::days(1)
}

/// Archive-layout field whose value encodes `base` plus the column index,
/// so longitude rolling is observable.
pub fn archive_values(base: f32) -> Vec<f32> {
    (0..FIELD_LEN).map(|k| base + (k % NLON) as f32).collect()
}

/// Publishes one cycle holding `fields` into `store`.
pub fn publish(store: &MemoryStore, time: DateTime<Utc>, fields: &[(FieldId, Vec<f32>)]) {
    let mut writer = CycleWriter::new(time).unwrap();
    for (id, values) in fields {
        writer
            .add(&Field {
                id: id.clone(),
                time,
                grid: GridSpec::ARCHIVE,
                values: values.clone(),
            })
            .unwrap();
    }
    writer.publish(store).unwrap();
}

/// Publishes the standard test cycle: `2t`, `msl` and `gh` at 500 hPa.
pub fn publish_standard(store: &MemoryStore, time: DateTime<Utc>) {
    publish(
        store,
        time,
        &[
            (FieldId::surface("2t"), archive_values(250.0)),
            (FieldId::surface("msl"), archive_values(100_000.0)),
            (FieldId::pressure("gh", 500), archive_values(5_000.0)),
        ],
    );
}

/// Resolves canonical names through the lexicon.
pub fn resolve(names: &[&str]) -> Vec<(String, LexiconEntry)> {
    names
        .iter()
        .map(|n| (n.to_string(), lexicon::lookup(n).unwrap()))
        .collect()
}

pub fn schedule() -> Schedule {
    Schedule::default()
}

pub fn cache(dir: &tempfile::TempDir) -> FieldCache {
    init_tracing();
    FieldCache::new(dir.path().join("ifs"))
}
