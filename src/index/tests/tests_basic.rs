#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use crate::encoding::{self, Encode, EncodingError};
    use crate::index::{CycleIndex, IndexEntry, IndexError};
    use crate::lexicon::FieldId;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_756_684_800, 0).unwrap()
    }

    fn entries() -> Vec<IndexEntry> {
        vec![
            IndexEntry {
                id: FieldId::surface("10u"),
                offset: 0,
                length: 100,
            },
            IndexEntry {
                id: FieldId::surface("10v"),
                offset: 100,
                length: 120,
            },
            IndexEntry {
                id: FieldId::pressure("gh", 500),
                offset: 220,
                length: 90,
            },
        ]
    }

    #[test]
    fn encode_decode_preserves_order() {
        let index = CycleIndex::new(t0(), entries()).unwrap();
        let decoded = CycleIndex::decode(&index.encode().unwrap()).unwrap();
        assert_eq!(decoded, index);
        assert_eq!(decoded.time(), t0());
        let params: Vec<_> = decoded.entries().iter().map(|e| e.id.param.as_str()).collect();
        assert_eq!(params, ["10u", "10v", "gh"]);
    }

    #[test]
    fn find_and_range() {
        let index = CycleIndex::new(t0(), entries()).unwrap();
        let gh = index.find(&FieldId::pressure("gh", 500)).unwrap();
        assert_eq!(gh.range(), 220..310);
        assert!(index.find(&FieldId::pressure("gh", 850)).is_none());
        assert!(index.find(&FieldId::pressure("10u", 0)).is_none());
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut list = entries();
        list.push(IndexEntry {
            id: FieldId::surface("10v"),
            offset: 310,
            length: 5,
        });
        let err = CycleIndex::new(t0(), list).unwrap_err();
        assert!(matches!(err, IndexError::DuplicateEntry(ref s) if s == "10v::sfc::0"));
    }

    #[test]
    fn overflowing_range_is_rejected() {
        let mut list = entries();
        list.push(IndexEntry {
            id: FieldId::surface("2t"),
            offset: u64::MAX - 1,
            length: 10,
        });
        let err = CycleIndex::new(t0(), list.clone()).unwrap_err();
        assert!(
            matches!(err, IndexError::RangeOverflow { ref field, offset, length: 10 }
                if field == "2t::sfc::0" && offset == u64::MAX - 1),
            "{err:?}"
        );

        // Same entries framed by hand, as a damaged archive would serve them.
        let mut body = Vec::new();
        t0().timestamp().encode_to(&mut body).unwrap();
        encoding::encode_vec(&list, &mut body).unwrap();
        let mut bytes = b"IFSX".to_vec();
        1u32.encode_to(&mut bytes).unwrap();
        encoding::encode_block(&body, &mut bytes).unwrap();
        assert!(matches!(
            CycleIndex::decode(&bytes),
            Err(IndexError::RangeOverflow { .. })
        ));

        let edge = IndexEntry {
            id: FieldId::surface("2t"),
            offset: u64::MAX - 10,
            length: 10,
        };
        assert_eq!(edge.range(), u64::MAX - 10..u64::MAX);
        assert!(CycleIndex::new(t0(), vec![edge]).is_ok());
    }

    #[test]
    fn empty_index() {
        let index = CycleIndex::new(t0(), Vec::new()).unwrap();
        let decoded = CycleIndex::decode(&index.encode().unwrap()).unwrap();
        assert!(decoded.entries().is_empty());
    }

    #[test]
    fn corruption_is_detected() {
        let bytes = CycleIndex::new(t0(), entries()).unwrap().encode().unwrap();

        let mut flipped = bytes.clone();
        let last = flipped.len() - 6;
        flipped[last] ^= 0x80;
        assert!(matches!(
            CycleIndex::decode(&flipped),
            Err(IndexError::Encoding(EncodingError::ChecksumMismatch { .. }))
        ));

        let mut wrong_magic = bytes.clone();
        wrong_magic[..4].copy_from_slice(b"IFSM");
        assert!(matches!(
            CycleIndex::decode(&wrong_magic),
            Err(IndexError::BadMagic(_))
        ));

        assert!(matches!(
            CycleIndex::decode(&bytes[..bytes.len() / 2]),
            Err(IndexError::Encoding(EncodingError::UnexpectedEof { .. }))
        ));
    }
}
