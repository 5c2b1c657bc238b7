//! Cycle writer: the provider side of the archive.
//!
//! [`CycleWriter`] accumulates fields for a single cycle, encodes them as
//! messages into one data object, builds the matching [`CycleIndex`], and
//! stores both. The data object is written before the index, so a reader
//! that can see the index can always read every field it lists.
//!
//! Used to build local mirrors and to stage deterministic archives in
//! tests.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::index::{CycleIndex, IndexEntry, IndexError};
use crate::message::{self, Field, MessageError};
use crate::schedule::Cycle;
use crate::store::{ObjectStore, StoreError};

/// Errors returned while publishing a cycle.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The cycle time is not on a 6-hour boundary.
    #[error("cycle time {0} is not 6-hour aligned")]
    Misaligned(DateTime<Utc>),

    /// A field's valid time differs from the cycle time.
    #[error("field {field} is valid at {field_time}, cycle is {cycle_time}")]
    TimeMismatch {
        /// Offending field.
        field: String,
        /// Its valid time.
        field_time: DateTime<Utc>,
        /// Cycle being written.
        cycle_time: DateTime<Utc>,
    },

    /// Message encoding failed.
    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    /// Index construction failed (e.g. duplicate fields).
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// Writing to the store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Summary of a published cycle.
#[derive(Debug, Clone)]
pub struct PublishedCycle {
    /// The cycle written.
    pub cycle: Cycle,
    /// Its index, as stored.
    pub index: CycleIndex,
    /// Size of the data object in bytes.
    pub data_len: u64,
}

/// Builds one cycle's data object and index.
#[derive(Debug)]
pub struct CycleWriter {
    cycle: Cycle,
    decimal_scale: i32,
    data: Vec<u8>,
    entries: Vec<IndexEntry>,
}

impl CycleWriter {
    /// Starts a cycle at `time`.
    pub fn new(time: DateTime<Utc>) -> Result<Self, PublishError> {
        let cycle = Cycle::new(time).ok_or(PublishError::Misaligned(time))?;
        Ok(Self {
            cycle,
            decimal_scale: 0,
            data: Vec::new(),
            entries: Vec::new(),
        })
    }

    /// Sets the decimal scale used to pack subsequently added fields.
    pub fn decimal_scale(mut self, decimal_scale: i32) -> Self {
        self.decimal_scale = decimal_scale;
        self
    }

    /// Encodes and appends one field.
    pub fn add(&mut self, field: &Field) -> Result<(), PublishError> {
        if field.time != self.cycle.time() {
            return Err(PublishError::TimeMismatch {
                field: field.id.to_string(),
                field_time: field.time,
                cycle_time: self.cycle.time(),
            });
        }

        let bytes = message::encode_message(field, self.decimal_scale)?;
        self.entries.push(IndexEntry {
            id: field.id.clone(),
            offset: self.data.len() as u64,
            length: bytes.len() as u64,
        });
        self.data.extend_from_slice(&bytes);
        Ok(())
    }

    /// Number of fields added so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no field has been added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the data object, then the index, to `store`.
    pub fn publish<S: ObjectStore + ?Sized>(self, store: &S) -> Result<PublishedCycle, PublishError> {
        let index = CycleIndex::new(self.cycle.time(), self.entries)?;
        let index_bytes = index.encode()?;

        store.put(&self.cycle.data_key(), &self.data)?;
        store.put(&self.cycle.index_key(), &index_bytes)?;

        info!(
            cycle = %self.cycle,
            fields = index.entries().len(),
            bytes = self.data.len(),
            "cycle published"
        );

        Ok(PublishedCycle {
            cycle: self.cycle,
            index,
            data_len: self.data.len() as u64,
        })
    }
}
