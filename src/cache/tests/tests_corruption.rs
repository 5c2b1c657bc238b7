//! Damaged cache entries are reported as misses and removed.
//!
//! ## Layout reference
//! ```text
//! [MAGIC "IFSC" 4B][VERSION 4B][LEN 4B][PAYLOAD][CRC 4B]
//! ```

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use chrono::{DateTime, Utc};
    use tempfile::TempDir;

    use crate::cache::FieldCache;
    use crate::grid::GridSpec;
    use crate::lexicon::FieldId;
    use crate::message::{Field, encode_message};
    use crate::schedule::Cycle;

    fn cycle() -> Cycle {
        Cycle::new(DateTime::<Utc>::from_timestamp(1_756_684_800, 0).unwrap()).unwrap()
    }

    fn field(param: &str) -> Field {
        Field {
            id: FieldId::surface(param),
            time: cycle().time(),
            grid: GridSpec {
                nlat: 1,
                nlon: 4,
                lat_first: 0.0,
                lon_first: 0.0,
                increment: 90.0,
            },
            values: vec![280.0, 281.5, 283.0, 279.25],
        }
    }

    /// Writes one entry and returns the cache and the entry's path.
    fn populated(tmp: &TempDir) -> (FieldCache, PathBuf) {
        let cache = FieldCache::new(tmp.path().join("ifs"));
        let f = field("2t");
        cache
            .put_field(&cycle(), &f.id, &encode_message(&f, 2).unwrap())
            .unwrap();
        let path = cache.dir().join("2025090100-oper-2t-sfc-0.field");
        assert!(path.exists());
        (cache, path)
    }

    fn assert_discarded(cache: &FieldCache, path: &PathBuf) {
        let got = cache.get_field(&cycle(), &FieldId::surface("2t")).unwrap();
        assert!(got.is_none());
        assert!(!path.exists(), "corrupt entry should be deleted");
    }

    #[test]
    fn payload_bit_flip() {
        let tmp = TempDir::new().unwrap();
        let (cache, path) = populated(&tmp);
        let mut bytes = fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0x40;
        fs::write(&path, &bytes).unwrap();
        assert_discarded(&cache, &path);
    }

    #[test]
    fn truncated_entry() {
        let tmp = TempDir::new().unwrap();
        let (cache, path) = populated(&tmp);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert_discarded(&cache, &path);
    }

    #[test]
    fn shorter_than_preamble() {
        let tmp = TempDir::new().unwrap();
        let (cache, path) = populated(&tmp);
        fs::write(&path, b"IFS").unwrap();
        assert_discarded(&cache, &path);
    }

    #[test]
    fn empty_file() {
        let tmp = TempDir::new().unwrap();
        let (cache, path) = populated(&tmp);
        fs::write(&path, b"").unwrap();
        assert_discarded(&cache, &path);
    }

    #[test]
    fn wrong_magic() {
        let tmp = TempDir::new().unwrap();
        let (cache, path) = populated(&tmp);
        let mut bytes = fs::read(&path).unwrap();
        bytes[..4].copy_from_slice(b"JUNK");
        fs::write(&path, &bytes).unwrap();
        assert_discarded(&cache, &path);
    }

    #[test]
    fn trailing_garbage() {
        let tmp = TempDir::new().unwrap();
        let (cache, path) = populated(&tmp);
        let mut bytes = fs::read(&path).unwrap();
        bytes.extend_from_slice(&[0u8; 7]);
        fs::write(&path, &bytes).unwrap();
        assert_discarded(&cache, &path);
    }

    /// An intact frame around a message for a different field is not
    /// served under the wrong name.
    #[test]
    fn mismatched_field() {
        let tmp = TempDir::new().unwrap();
        let (cache, path) = populated(&tmp);
        let other = field("msl");
        cache
            .put_field(&cycle(), &other.id, &encode_message(&other, 0).unwrap())
            .unwrap();
        let other_path = cache.dir().join("2025090100-oper-msl-sfc-0.field");
        fs::copy(&other_path, &path).unwrap();

        assert_discarded(&cache, &path);
        assert!(cache.get_field(&cycle(), &other.id).unwrap().is_some());
    }

    #[test]
    fn rewrite_after_discard() {
        let tmp = TempDir::new().unwrap();
        let (cache, path) = populated(&tmp);
        fs::write(&path, b"garbage garbage garbage").unwrap();
        assert_discarded(&cache, &path);

        let f = field("2t");
        cache
            .put_field(&cycle(), &f.id, &encode_message(&f, 2).unwrap())
            .unwrap();
        let got = cache.get_field(&cycle(), &f.id).unwrap().unwrap();
        assert!((got.values[3] - 279.25).abs() < 0.01);
    }
}
