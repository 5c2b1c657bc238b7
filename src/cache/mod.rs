//! On-disk cache of fetched indices and field messages.
//!
//! Each cached object is a single file holding the raw bytes received from
//! the store, wrapped in a checksummed frame:
//!
//! ```text
//! [MAGIC "IFSC"][VERSION u32 LE][LEN_LE][PAYLOAD][CRC32_LE]
//! ```
//!
//! # File names
//!
//! - indices: `{YYYYMMDDHH}-{stream}.index`
//! - fields:  `{YYYYMMDDHH}-{stream}-{param}-{levtype}-{level}.field`
//!
//! # Concurrency
//!
//! Writes go to a uniquely named `.tmp` file that is renamed into place, so
//! several workers (or processes) may fill the same entry concurrently and
//! readers only ever see complete entries. Reads are memory-mapped and the
//! payload is decoded straight from the mapping.
//!
//! # Corruption
//!
//! An entry that fails any check (frame, checksum, or payload decoding) is
//! treated as a miss: it is logged, deleted, and the caller re-fetches.

#[cfg(test)]
mod tests;

use std::{
    fs::{self, File, OpenOptions},
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use memmap2::Mmap;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::encoding::{self, Decode, Encode, EncodingError};
use crate::index::CycleIndex;
use crate::lexicon::FieldId;
use crate::message::{self, Field};
use crate::schedule::Cycle;

const CACHE_MAGIC: [u8; 4] = *b"IFSC";
const CACHE_VERSION: u32 = 1;
const CACHE_PREAMBLE_SIZE: usize = 8;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Errors returned by cache operations.
///
/// Corrupt entries are not errors; they are reported as misses.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Frame encoding error.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),
}

/// A directory of cached archive objects.
#[derive(Debug, Clone)]
pub struct FieldCache {
    dir: PathBuf,
}

impl FieldCache {
    /// Cache rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn index_path(&self, cycle: &Cycle) -> PathBuf {
        self.dir
            .join(format!("{}-{}.index", cycle.stamp(), cycle.stream()))
    }

    fn field_path(&self, cycle: &Cycle, id: &FieldId) -> PathBuf {
        self.dir.join(format!(
            "{}-{}-{}-{}-{}.field",
            cycle.stamp(),
            cycle.stream(),
            id.param,
            id.levtype,
            id.level
        ))
    }

    /// Cached index of `cycle`, if present and intact.
    pub fn get_index(&self, cycle: &Cycle) -> Result<Option<CycleIndex>, CacheError> {
        self.read_entry(&self.index_path(cycle), |payload| {
            CycleIndex::decode(payload).map_err(|e| e.to_string())
        })
    }

    /// Stores the raw index bytes of `cycle`.
    pub fn put_index(&self, cycle: &Cycle, raw: &[u8]) -> Result<(), CacheError> {
        self.write_entry(&self.index_path(cycle), raw)
    }

    /// Cached field `id` of `cycle`, if present and intact.
    pub fn get_field(&self, cycle: &Cycle, id: &FieldId) -> Result<Option<Field>, CacheError> {
        self.read_entry(&self.field_path(cycle, id), |payload| {
            let field = message::decode_message(payload).map_err(|e| e.to_string())?;
            if &field.id != id || field.time != cycle.time() {
                return Err(format!(
                    "entry holds {} at {}, expected {id} at {cycle}",
                    field.id, field.time
                ));
            }
            Ok(field)
        })
    }

    /// Stores the raw message bytes of field `id` of `cycle`.
    pub fn put_field(&self, cycle: &Cycle, id: &FieldId, raw: &[u8]) -> Result<(), CacheError> {
        self.write_entry(&self.field_path(cycle, id), raw)
    }

    /// Deletes the cache directory and everything in it. A missing
    /// directory is not an error.
    pub fn remove_all(&self) -> Result<(), CacheError> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                debug!(dir = %self.dir.display(), "cache removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Io(e)),
        }
    }

    // --------------------------------------------------------------------------------------------
    // Internal helpers
    // --------------------------------------------------------------------------------------------

    /// Maps `path`, checks the frame, and hands the payload to `decode`.
    fn read_entry<T>(
        &self,
        path: &Path,
        decode: impl FnOnce(&[u8]) -> Result<T, String>,
    ) -> Result<Option<T>, CacheError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!(path = %path.display(), "cache miss");
                return Ok(None);
            }
            Err(e) => return Err(CacheError::Io(e)),
        };

        if file.metadata()?.len() < CACHE_PREAMBLE_SIZE as u64 {
            self.discard(path, "entry shorter than preamble");
            return Ok(None);
        }

        // SAFETY: entries are only ever replaced by rename, never modified
        // in place, so the mapped inode stays immutable while mapped.
        let mmap = unsafe { Mmap::map(&file)? };

        let decoded = Self::unframe(&mmap).and_then(decode);
        match decoded {
            Ok(value) => {
                trace!(path = %path.display(), "cache hit");
                Ok(Some(value))
            }
            Err(reason) => {
                drop(mmap);
                self.discard(path, &reason);
                Ok(None)
            }
        }
    }

    fn unframe(bytes: &[u8]) -> Result<&[u8], String> {
        let (magic, _) = <[u8; 4]>::decode_from(bytes).map_err(|e| e.to_string())?;
        if magic != CACHE_MAGIC {
            return Err("bad magic".into());
        }
        let (version, _) = u32::decode_from(&bytes[4..]).map_err(|e| e.to_string())?;
        if version != CACHE_VERSION {
            return Err(format!("unsupported version {version}"));
        }
        let (payload, consumed) =
            encoding::decode_block(&bytes[CACHE_PREAMBLE_SIZE..]).map_err(|e| e.to_string())?;
        if CACHE_PREAMBLE_SIZE + consumed != bytes.len() {
            return Err("trailing bytes after entry".into());
        }
        Ok(payload)
    }

    fn discard(&self, path: &Path, reason: &str) {
        warn!(path = %path.display(), reason, "discarding corrupt cache entry");
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to remove corrupt cache entry");
            }
        }
    }

    fn write_entry(&self, path: &Path, payload: &[u8]) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;

        let mut framed = Vec::with_capacity(CACHE_PREAMBLE_SIZE + payload.len() + 8);
        CACHE_MAGIC.encode_to(&mut framed)?;
        CACHE_VERSION.encode_to(&mut framed)?;
        encoding::encode_block(payload, &mut framed)?;

        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_path = path.with_extension(format!("tmp{}-{n}", std::process::id()));
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&framed)?;
        }
        if let Err(e) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(CacheError::Io(e));
        }

        debug!(path = %path.display(), len = payload.len(), "cache entry written");
        Ok(())
    }
}
