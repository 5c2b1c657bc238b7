//! Publication schedule of the IFS open-data archive.
//!
//! The archive publishes one analysis cycle every 6 hours. A cycle becomes
//! readable once its publication lag has elapsed, and some sources only keep
//! a rolling window of recent cycles. This module answers two questions
//! without touching any store:
//!
//! - *Could* a timestamp be published at instant `now`? ([`Schedule::check`])
//! - Where do the cycle's objects live? ([`Cycle::data_key`], [`Cycle::index_key`])
//!
//! Wall-clock time is always read through a [`Clock`], so callers and tests
//! can pin "now" with a [`FixedClock`].
//!
//! # Object layout
//!
//! ```text
//! {YYYYMMDD}/{HH}z/ifs/0p25/{stream}/{YYYYMMDDHH}0000-0h-{stream}-fc.fields
//! {YYYYMMDD}/{HH}z/ifs/0p25/{stream}/{YYYYMMDDHH}0000-0h-{stream}-fc.index
//! ```
//!
//! 00z and 12z cycles belong to the `oper` stream, 06z and 18z to `scda`.


use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Timelike, Utc};

/// Spacing between consecutive cycles, in seconds.
pub const CYCLE_INTERVAL_SECS: i64 = 6 * 3600;

/// First 0.25 degree open-data cycle: 2024-02-01T00:00Z.
pub const ARCHIVE_START_UNIX: i64 = 1_706_745_600;

/// Default delay between a cycle's nominal time and its publication.
pub const DEFAULT_PUBLICATION_LAG_HOURS: i64 = 8;

// ------------------------------------------------------------------------------------------------
// Clock
// ------------------------------------------------------------------------------------------------

/// Source of "now" for availability decisions.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the operating system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a settable instant.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a clock that reports `now` until changed.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += delta;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Source / stream
// ------------------------------------------------------------------------------------------------

/// Where cycles are read from. Sources differ in how long they keep data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Source {
    /// Long-term bucket mirror; keeps every cycle since the archive start.
    #[default]
    Aws,
    /// Provider's own server; keeps a rolling window of recent cycles.
    Ecmwf,
}

impl Source {
    /// How far back this source keeps cycles, or `None` if unbounded.
    pub fn retention(&self) -> Option<TimeDelta> {
        match self {
            Source::Aws => None,
            Source::Ecmwf => Some(TimeDelta::days(4)),
        }
    }
}

/// Forecast stream a cycle is published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// 00z and 12z main runs.
    Oper,
    /// 06z and 18z short-cutoff runs.
    Scda,
}

impl Stream {
    /// Path component used in object keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stream::Oper => "oper",
            Stream::Scda => "scda",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ------------------------------------------------------------------------------------------------
// Cycle
// ------------------------------------------------------------------------------------------------

/// A 6-hour-aligned analysis time and the object keys it maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cycle {
    time: DateTime<Utc>,
}

impl Cycle {
    /// Wraps `time` if it falls on a cycle boundary.
    pub fn new(time: DateTime<Utc>) -> Option<Self> {
        is_aligned(time).then_some(Self { time })
    }

    /// Nominal time of the cycle.
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Stream the cycle is published under.
    pub fn stream(&self) -> Stream {
        match self.time.hour() {
            0 | 12 => Stream::Oper,
            _ => Stream::Scda,
        }
    }

    /// Compact `YYYYMMDDHH` form, used in object keys and cache file names.
    pub fn stamp(&self) -> String {
        self.time.format("%Y%m%d%H").to_string()
    }

    fn key(&self, ext: &str) -> String {
        let stream = self.stream();
        format!(
            "{}/{:02}z/ifs/0p25/{stream}/{}0000-0h-{stream}-fc.{ext}",
            self.time.format("%Y%m%d"),
            self.time.hour(),
            self.stamp(),
        )
    }

    /// Key of the object holding every field message of the cycle.
    pub fn data_key(&self) -> String {
        self.key("fields")
    }

    /// Key of the cycle's field index.
    pub fn index_key(&self) -> String {
        self.key("index")
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.time.format("%Y-%m-%dT%H:%MZ"))
    }
}

// ------------------------------------------------------------------------------------------------
// Availability
// ------------------------------------------------------------------------------------------------

/// Why a timestamp cannot be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailability {
    /// Not on a 6-hour boundary.
    Misaligned,
    /// Earlier than the first archived cycle.
    BeforeArchiveStart {
        /// First archived cycle.
        start: DateTime<Utc>,
    },
    /// Publication lag has not elapsed yet.
    NotYetPublished {
        /// Earliest instant the cycle can appear.
        expected: DateTime<Utc>,
    },
    /// Older than the source's retention window.
    OutsideRetention {
        /// Retention window in hours.
        hours: i64,
    },
    /// The schedule allows it, but the store has no index for it.
    NotPublished,
}

impl fmt::Display for Unavailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unavailability::Misaligned => f.write_str("not aligned to a 6-hour cycle"),
            Unavailability::BeforeArchiveStart { start } => {
                write!(f, "before archive start {}", start.format("%Y-%m-%dT%H:%MZ"))
            }
            Unavailability::NotYetPublished { expected } => {
                write!(
                    f,
                    "not yet published (expected after {})",
                    expected.format("%Y-%m-%dT%H:%MZ")
                )
            }
            Unavailability::OutsideRetention { hours } => {
                write!(f, "outside the source retention window of {hours} h")
            }
            Unavailability::NotPublished => f.write_str("cycle index not found in store"),
        }
    }
}

/// Returns `true` if `time` lies exactly on a 6-hour boundary.
pub fn is_aligned(time: DateTime<Utc>) -> bool {
    time.timestamp().rem_euclid(CYCLE_INTERVAL_SECS) == 0 && time.timestamp_subsec_nanos() == 0
}

/// Rules deciding which cycles a source can serve at a given instant.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// First archived cycle.
    pub archive_start: DateTime<Utc>,
    /// Delay between cycle time and publication.
    pub publication_lag: TimeDelta,
    /// Source whose retention applies.
    pub source: Source,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            archive_start: DateTime::from_timestamp(ARCHIVE_START_UNIX, 0).unwrap_or_default(),
            publication_lag: TimeDelta::hours(DEFAULT_PUBLICATION_LAG_HOURS),
            source: Source::default(),
        }
    }
}

impl Schedule {
    /// Checks `time` against alignment, archive start, publication lag and
    /// retention, in that order.
    pub fn check(&self, time: DateTime<Utc>, now: DateTime<Utc>) -> Result<Cycle, Unavailability> {
        let cycle = Cycle::new(time).ok_or(Unavailability::Misaligned)?;

        if time < self.archive_start {
            return Err(Unavailability::BeforeArchiveStart {
                start: self.archive_start,
            });
        }

        // A lag that overflows the calendar never elapses.
        let expected = time
            .checked_add_signed(self.publication_lag)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if expected > now {
            return Err(Unavailability::NotYetPublished { expected });
        }

        if let Some(retention) = self.source.retention() {
            if now - time > retention {
                return Err(Unavailability::OutsideRetention {
                    hours: retention.num_hours(),
                });
            }
        }

        Ok(cycle)
    }

    /// Boolean form of [`Schedule::check`].
    pub fn available(&self, time: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.check(time, now).is_ok()
    }

    /// Most recent cycle boundary at or before `now`, or `None` if it lies
    /// before the earliest representable instant.
    pub fn latest_cycle(now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let secs = now.timestamp();
        DateTime::from_timestamp(secs - secs.rem_euclid(CYCLE_INTERVAL_SECS), 0)
    }

    /// Most recent cycle that the schedule already considers published, or
    /// `None` if the publication lag reaches past the calendar.
    pub fn latest_published(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_sub_signed(self.publication_lag)
            .and_then(Self::latest_cycle)
    }
}
