//! Filesystem mirror of the archive.
//!
//! Each key maps to a file under the root directory. Writes go to a
//! `.tmp` sibling that is fsynced and then renamed over the final path,
//! so a crash or a concurrent reader never sees a half-written object.

use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Read, Seek, SeekFrom, Write},
    ops::Range,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use tracing::{debug, trace};

use super::{ObjectStore, StoreError, check_range, validate_key};

/// Disambiguates temporary files of concurrent writers to the same key.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// An [`ObjectStore`] backed by a local directory tree.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "local store opened");
        Ok(Self { root })
    }

    /// Root directory of the mirror.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |p, seg| p.join(seg)))
    }

    fn open_existing(&self, key: &str) -> Result<File, StoreError> {
        let path = self.path_for(key)?;
        File::open(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
            _ => StoreError::Io(e),
        })
    }
}

impl ObjectStore for LocalStore {
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let mut file = self.open_existing(key)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        trace!(key, len = buf.len(), "local get");
        Ok(buf)
    }

    fn get_range(&self, key: &str, range: Range<u64>) -> Result<Vec<u8>, StoreError> {
        let mut file = self.open_existing(key)?;
        let len = file.metadata()?.len();
        check_range(key, &range, len)?;

        file.seek(SeekFrom::Start(range.start))?;
        let mut buf = vec![0u8; (range.end - range.start) as usize];
        file.read_exact(&mut buf)?;
        trace!(key, start = range.start, end = range.end, "local get_range");
        Ok(buf)
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        Ok(path.is_file())
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let final_path = self.path_for(key)?;
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_path = final_path.with_extension(format!("tmp{}-{n}", std::process::id()));
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp_path, &final_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::Io(e));
        }

        debug!(key, len = bytes.len(), "local put");
        Ok(())
    }
}
