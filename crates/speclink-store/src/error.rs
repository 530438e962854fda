//! Store error types.

use thiserror::Error;

use crate::medium::MediumError;

/// Errors from the configuration store.
///
/// Medium failures are propagated verbatim; everything else is structural
/// validation this layer adds on top of the raw medium.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The underlying non-volatile medium failed.
    #[error("nvm medium error: {0}")]
    Medium(#[from] MediumError),

    /// Slot index at or beyond the catalog capacity.
    #[error("slot {index} out of range (capacity {capacity})")]
    IndexOutOfRange {
        /// Requested slot.
        index: u8,
        /// Fixed catalog capacity.
        capacity: u8,
    },

    /// Slot index beyond the current record count.
    #[error("slot {index} beyond record count {count}")]
    IndexBeyondCount {
        /// Requested slot.
        index: u8,
        /// Current record count.
        count: u8,
    },

    /// A record carries the invalid-serial sentinel.
    #[error("record at slot {index} is invalid")]
    InvalidRecord {
        /// Slot of the invalid record.
        index: u8,
    },

    /// Replayed addressing ran past the end of the managed region.
    #[error("catalog address past end of storage")]
    AddressOverflow,

    /// A persisted scan-kind byte is unknown.
    #[error("unknown scan kind {0}")]
    UnknownKind(u8),

    /// A persisted section count exceeds the section table.
    #[error("section count {0} exceeds maximum")]
    SectionCountOutOfRange(u8),

    /// A record footprint was shorter than its declared layout.
    #[error("record truncated: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes the layout requires.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// No cached slot carries the requested configuration id.
    #[error("no slot for config id {0}")]
    UnknownConfigId(u32),
}
