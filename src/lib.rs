//! # ifsfetch
//!
//! A client for the IFS open-data archive: gridded 0.25 degree analysis
//! fields (step 0) of the ECMWF Integrated Forecasting System, addressed by
//! timestamp and canonical variable name.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::{TimeZone, Utc};
//! use ifsfetch::{Ifs, IfsConfig, LocalStore};
//!
//! let store = LocalStore::open("/data/ifs-mirror").unwrap();
//! let ifs = Ifs::new(store, IfsConfig::default()).unwrap();
//!
//! let time = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap();
//! if ifs.available(time) {
//!     let grid = ifs.fetch(time, ["t2m", "z500"]).unwrap();
//!     assert_eq!(grid.shape(), [1, 2, 721, 1440]);
//! }
//! ```
//!
//! ## Features
//!
//! - **Availability checks** against the 6-hourly publication schedule,
//!   with an injectable [`Clock`].
//! - **Range reads**: each field is one byte-range read located through the
//!   cycle index.
//! - **On-disk cache** of indices and fields with CRC32-checked entries and
//!   atomic writes.
//! - **Worker pool**: fields are fetched concurrently with results identical
//!   to a sequential fetch.
//!
//! The archive transport is abstracted by [`ObjectStore`]. The crate ships a
//! filesystem mirror ([`LocalStore`]) and an in-memory store
//! ([`MemoryStore`]); [`CycleWriter`] publishes cycles into either.

pub mod cache;
pub mod encoding;
pub mod grid;
pub mod index;
pub mod lexicon;
pub mod message;
pub mod publish;
pub mod schedule;
pub mod store;

mod fetch;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use ndarray::Array1;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use cache::{CacheError, FieldCache};
pub use grid::{Grid, GridSpec};
pub use index::{CycleIndex, IndexError};
pub use lexicon::{FieldId, LevelType, VARIABLES, lookup};
pub use message::{Field, MessageError};
pub use publish::{CycleWriter, PublishError};
pub use schedule::{Clock, Cycle, FixedClock, Schedule, Source, SystemClock, Unavailability};
pub use store::{LocalStore, MemoryStore, ObjectStore, StoreError};

use fetch::Fetcher;

/// Environment variable overriding the default cache root.
pub const CACHE_ENV: &str = "IFSFETCH_CACHE";

/// Upper bound on [`IfsConfig::max_workers`].
pub const MAX_WORKERS: usize = 256;

/// Upper bound on [`IfsConfig::publication_lag`], in days.
pub const MAX_PUBLICATION_LAG_DAYS: i64 = 30;

static INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(0);

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Configuration for an [`Ifs`] client.
///
/// All fields have defaults via [`IfsConfig::default()`]. The configuration
/// is validated when passed to [`Ifs::new`].
///
/// # Example
///
/// ```rust
/// use ifsfetch::{IfsConfig, Source};
///
/// let config = IfsConfig {
///     cache: false,
///     max_workers: 0,
///     source: Source::Ecmwf,
///     ..IfsConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct IfsConfig {
    /// Keep fetched fields on disk between calls.
    ///
    /// When disabled, a scratch directory holds entries while fetches run
    /// and is removed once the last running fetch returns.
    ///
    /// Default: `true`.
    pub cache: bool,

    /// Worker threads used to read fields. `0` reads on the calling thread.
    ///
    /// Default: 8. Must be ≤ [`MAX_WORKERS`].
    pub max_workers: usize,

    /// Directory under which the `ifs` cache directory is created.
    ///
    /// Default: `None`, meaning `$IFSFETCH_CACHE`, else
    /// `$HOME/.cache/ifsfetch`.
    pub cache_root: Option<PathBuf>,

    /// Source whose retention window applies.
    ///
    /// Default: [`Source::Aws`].
    pub source: Source,

    /// Delay between a cycle's time and its publication.
    ///
    /// Default: 8 hours. Must not be negative nor exceed
    /// [`MAX_PUBLICATION_LAG_DAYS`].
    pub publication_lag: TimeDelta,

    /// First cycle held by the archive.
    ///
    /// Default: 2024-02-01T00:00Z.
    pub archive_start: DateTime<Utc>,
}

impl Default for IfsConfig {
    fn default() -> Self {
        let schedule = Schedule::default();
        Self {
            cache: true,
            max_workers: 8,
            cache_root: None,
            source: schedule.source,
            publication_lag: schedule.publication_lag,
            archive_start: schedule.archive_start,
        }
    }
}

impl IfsConfig {
    /// Validates all configuration parameters.
    pub fn validate(&self) -> Result<(), IfsError> {
        if self.max_workers > MAX_WORKERS {
            return Err(IfsError::InvalidConfig(format!(
                "max_workers must be <= {MAX_WORKERS}"
            )));
        }
        if self.publication_lag < TimeDelta::zero() {
            return Err(IfsError::InvalidConfig(
                "publication_lag must not be negative".into(),
            ));
        }
        if self.publication_lag > TimeDelta::days(MAX_PUBLICATION_LAG_DAYS) {
            return Err(IfsError::InvalidConfig(format!(
                "publication_lag must be <= {MAX_PUBLICATION_LAG_DAYS} days"
            )));
        }
        if let Some(root) = &self.cache_root {
            if root.as_os_str().is_empty() {
                return Err(IfsError::InvalidConfig(
                    "cache_root must not be empty".into(),
                ));
            }
        }
        Ok(())
    }

    fn schedule(&self) -> Schedule {
        Schedule {
            archive_start: self.archive_start,
            publication_lag: self.publication_lag,
            source: self.source,
        }
    }

    /// Resolves the instance cache directory.
    fn cache_dir(&self) -> PathBuf {
        let root = self
            .cache_root
            .clone()
            .or_else(|| std::env::var_os(CACHE_ENV).map(PathBuf::from))
            .or_else(|| {
                std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache").join("ifsfetch"))
            })
            .unwrap_or_else(|| std::env::temp_dir().join("ifsfetch"));

        let dir = root.join("ifs");
        if self.cache {
            dir
        } else {
            let n = INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed);
            dir.join(format!("tmp_{}_{n}", std::process::id()))
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`Ifs`] operations.
#[derive(Debug, Error)]
pub enum IfsError {
    /// Invalid configuration parameter.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Empty or duplicated request input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The variable name is not in the lexicon.
    #[error("unknown variable {0:?}")]
    UnknownVariable(String),

    /// The requested time cannot be served.
    #[error("time {time} is not available: {reason}")]
    UnavailableTime {
        /// Requested time.
        time: DateTime<Utc>,
        /// Why it is unavailable.
        reason: Unavailability,
    },

    /// The cycle exists but does not contain the variable.
    #[error("variable {variable} ({field}) is missing from cycle {time}")]
    MissingField {
        /// Requested variable.
        variable: String,
        /// Field it resolves to.
        field: String,
        /// Cycle time.
        time: DateTime<Utc>,
    },

    /// The published field is not on the expected lattice.
    #[error("variable {variable} at {time} is not on the 0.25 degree grid: {reason}")]
    GridMismatch {
        /// Requested variable.
        variable: String,
        /// Cycle time.
        time: DateTime<Utc>,
        /// Description of the mismatch.
        reason: String,
    },

    /// The decoded field contains missing values.
    #[error("variable {variable} at {time} contains missing values")]
    MissingValues {
        /// Requested variable.
        variable: String,
        /// Cycle time.
        time: DateTime<Utc>,
    },

    /// Object store error.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Cache I/O error.
    #[error("{0}")]
    Cache(#[from] CacheError),

    /// A fetched message could not be decoded.
    #[error("{0}")]
    Message(#[from] MessageError),

    /// A fetched index could not be decoded.
    #[error("{0}")]
    Index(#[from] IndexError),

    /// Internal invariant violation.
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Input normalization
// ------------------------------------------------------------------------------------------------

/// A single timestamp. Naive timestamps are taken as UTC.
pub trait IntoTime {
    /// Converts to a UTC timestamp.
    fn into_time(self) -> DateTime<Utc>;
}

impl IntoTime for DateTime<Utc> {
    fn into_time(self) -> DateTime<Utc> {
        self
    }
}

impl IntoTime for &DateTime<Utc> {
    fn into_time(self) -> DateTime<Utc> {
        *self
    }
}

impl IntoTime for NaiveDateTime {
    fn into_time(self) -> DateTime<Utc> {
        self.and_utc()
    }
}

impl IntoTime for &NaiveDateTime {
    fn into_time(self) -> DateTime<Utc> {
        self.and_utc()
    }
}

/// One or more timestamps, in request order.
pub trait IntoTimes {
    /// Converts to an ordered list of UTC timestamps.
    fn into_times(self) -> Vec<DateTime<Utc>>;
}

macro_rules! impl_into_times {
    ($($t:ty),*) => {
        $(
            impl IntoTimes for $t {
                fn into_times(self) -> Vec<DateTime<Utc>> {
                    vec![self.into_time()]
                }
            }

            impl IntoTimes for Vec<$t> {
                fn into_times(self) -> Vec<DateTime<Utc>> {
                    self.into_iter().map(IntoTime::into_time).collect()
                }
            }

            impl IntoTimes for &Vec<$t> {
                fn into_times(self) -> Vec<DateTime<Utc>> {
                    self.iter().map(IntoTime::into_time).collect()
                }
            }

            impl IntoTimes for &[$t] {
                fn into_times(self) -> Vec<DateTime<Utc>> {
                    self.iter().map(IntoTime::into_time).collect()
                }
            }

            impl<const N: usize> IntoTimes for [$t; N] {
                fn into_times(self) -> Vec<DateTime<Utc>> {
                    self.into_iter().map(IntoTime::into_time).collect()
                }
            }

            impl IntoTimes for Array1<$t> {
                fn into_times(self) -> Vec<DateTime<Utc>> {
                    self.iter().map(IntoTime::into_time).collect()
                }
            }

            impl IntoTimes for &Array1<$t> {
                fn into_times(self) -> Vec<DateTime<Utc>> {
                    self.iter().map(IntoTime::into_time).collect()
                }
            }
        )*
    };
}

impl_into_times!(DateTime<Utc>, NaiveDateTime);

/// One or more variable names, in request order.
pub trait IntoVariables {
    /// Converts to an ordered list of names.
    fn into_variables(self) -> Vec<String>;
}

impl IntoVariables for &str {
    fn into_variables(self) -> Vec<String> {
        vec![self.to_owned()]
    }
}

impl IntoVariables for String {
    fn into_variables(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoVariables for &String {
    fn into_variables(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl<S: AsRef<str>> IntoVariables for Vec<S> {
    fn into_variables(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_owned()).collect()
    }
}

impl<S: AsRef<str>> IntoVariables for &Vec<S> {
    fn into_variables(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_owned()).collect()
    }
}

impl<S: AsRef<str>> IntoVariables for &[S] {
    fn into_variables(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_owned()).collect()
    }
}

impl<S: AsRef<str>, const N: usize> IntoVariables for [S; N] {
    fn into_variables(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_owned()).collect()
    }
}

/// Rejects empty input and repeated elements.
fn check_request<T: PartialEq + std::fmt::Display>(what: &str, items: &[T]) -> Result<(), IfsError> {
    if items.is_empty() {
        return Err(IfsError::InvalidArgument(format!("{what} must not be empty")));
    }
    for (i, item) in items.iter().enumerate() {
        if items[..i].contains(item) {
            return Err(IfsError::InvalidArgument(format!(
                "duplicate {what} {item}"
            )));
        }
    }
    Ok(())
}

// ------------------------------------------------------------------------------------------------
// Client
// ------------------------------------------------------------------------------------------------

/// IFS archive client.
///
/// # Thread safety
///
/// `Ifs<S>` is `Send + Sync` whenever `S` is, and every method takes
/// `&self`; it can be shared across threads via `Arc<Ifs<S>>`. Several
/// clients may share one cache directory.
///
/// # Cache
///
/// With caching enabled, fetched indices and fields are kept under
/// [`Ifs::cache_dir`] and reused by later calls. With caching disabled, the
/// directory is private to this client and exists only while at least one
/// [`Ifs::fetch`] is running; the last fetch to return removes it.
pub struct Ifs<S> {
    store: S,
    config: IfsConfig,
    schedule: Schedule,
    cache: FieldCache,
    clock: Arc<dyn Clock>,
    /// Fetches currently using the scratch directory (uncached mode only).
    scratch_users: Mutex<usize>,
}

impl<S> std::fmt::Debug for Ifs<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ifs")
            .field("cache_dir", &self.cache.dir())
            .field("cache", &self.config.cache)
            .field("max_workers", &self.config.max_workers)
            .field("source", &self.config.source)
            .finish_non_exhaustive()
    }
}

impl<S: ObjectStore> Ifs<S> {
    /// Creates a client reading from `store`.
    ///
    /// No directory is created until the first fetch.
    ///
    /// # Errors
    ///
    /// Returns [`IfsError::InvalidConfig`] if any configuration parameter
    /// is out of range.
    pub fn new(store: S, config: IfsConfig) -> Result<Self, IfsError> {
        config.validate()?;

        let cache = FieldCache::new(config.cache_dir());
        let schedule = config.schedule();

        info!(
            cache_dir = %cache.dir().display(),
            cache = config.cache,
            max_workers = config.max_workers,
            source = ?config.source,
            "ifs client created"
        );

        Ok(Self {
            store,
            config,
            schedule,
            cache,
            clock: Arc::new(SystemClock),
            scratch_users: Mutex::new(0),
        })
    }

    /// Replaces the clock used for availability decisions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Fetches `variable` at every `time` into a `(time, variable, lat, lon)`
    /// grid.
    ///
    /// Every time is validated before any field is transferred.
    ///
    /// # Errors
    ///
    /// - [`IfsError::InvalidArgument`] for empty or duplicated input.
    /// - [`IfsError::UnknownVariable`] for names outside the lexicon.
    /// - [`IfsError::UnavailableTime`] if [`Ifs::available`] would be
    ///   `false` for any time.
    /// - [`IfsError::MissingField`], [`IfsError::GridMismatch`] or
    ///   [`IfsError::MissingValues`] if the archive data is unusable.
    pub fn fetch(&self, time: impl IntoTimes, variable: impl IntoVariables) -> Result<Grid, IfsError> {
        let times = time.into_times();
        let names = variable.into_variables();
        check_request("time", &times)?;
        check_request("variable", &names)?;

        let variables = names
            .into_iter()
            .map(|name| match lexicon::lookup(&name) {
                Some(entry) => Ok((name, entry)),
                None => Err(IfsError::UnknownVariable(name)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let started = Instant::now();
        let result = if self.config.cache {
            self.fetch_inner(times, variables)
        } else {
            self.enter_scratch()?;
            let result = self.fetch_inner(times, variables);
            let cleanup = self.leave_scratch();
            result.and_then(|grid| cleanup.map(|()| grid))
        };
        let grid = result?;

        let [nt, nv, _, _] = grid.shape();
        info!(
            times = nt,
            variables = nv,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetch complete"
        );
        Ok(grid)
    }

    fn enter_scratch(&self) -> Result<(), IfsError> {
        let mut users = self
            .scratch_users
            .lock()
            .map_err(|_| IfsError::Internal("scratch lock poisoned".into()))?;
        *users += 1;
        Ok(())
    }

    /// Removes the scratch directory when the last running fetch leaves.
    /// The lock is held across the removal.
    fn leave_scratch(&self) -> Result<(), IfsError> {
        let mut users = self
            .scratch_users
            .lock()
            .map_err(|_| IfsError::Internal("scratch lock poisoned".into()))?;
        *users -= 1;
        if *users == 0 {
            self.cache.remove_all()?;
        }
        Ok(())
    }

    fn fetch_inner(
        &self,
        times: Vec<DateTime<Utc>>,
        variables: Vec<(String, lexicon::LexiconEntry)>,
    ) -> Result<Grid, IfsError> {
        let fetcher = Fetcher::new(&self.store, &self.cache);
        let plan = fetcher.plan(&self.schedule, self.clock.now(), times, variables)?;
        fetcher.execute(plan, self.config.max_workers)
    }

    /// Returns `true` if `time` can be fetched now: the schedule allows it
    /// and the store holds its cycle index.
    ///
    /// Store errors are logged and reported as unavailable.
    pub fn available(&self, time: impl IntoTime) -> bool {
        let time = time.into_time();
        let cycle = match self.schedule.check(time, self.clock.now()) {
            Ok(cycle) => cycle,
            Err(reason) => {
                debug!(%time, %reason, "time unavailable");
                return false;
            }
        };

        match self.store.exists(&cycle.index_key()) {
            Ok(found) => found,
            Err(e) => {
                warn!(%cycle, error = %e, "availability check failed");
                false
            }
        }
    }

    /// Schedule used for availability decisions.
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Directory holding this client's cache.
    pub fn cache_dir(&self) -> &Path {
        self.cache.dir()
    }

    /// Returns `true` if fetched data is kept between calls.
    pub fn cache_enabled(&self) -> bool {
        self.config.cache
    }

    /// Removes the cache directory. Removing an absent directory succeeds.
    pub fn clear_cache(&self) -> Result<(), IfsError> {
        self.cache.remove_all()?;
        info!(cache_dir = %self.cache.dir().display(), "cache cleared");
        Ok(())
    }
}

impl<S> Drop for Ifs<S> {
    fn drop(&mut self) {
        if !self.config.cache {
            if let Err(e) = self.cache.remove_all() {
                debug!(error = %e, "scratch cache cleanup failed");
            }
        }
    }
}
