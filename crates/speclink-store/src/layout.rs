//! Persisted layout of the managed non-volatile region.
//!
//! Offsets are fixed at build time; both the catalog walker and the
//! fixed-size auxiliary records index straight into this table. The
//! record catalog occupies the tail of the region and every slot address
//! within it is recomputed from record sizes, never stored.
//!
//! ```text
//! 0x0000  catalog header word (count u16 | active u16)
//! 0x0004  next_config_index   u32
//! 0x0008  next_scan_index     u32
//! 0x000C  serial number       [16]
//! 0x001C  model name          [16]
//! 0x002C  calibration version u32
//! 0x0030  calibration coeffs  [6 x f32]
//! 0x0048  reference version   u32
//! 0x004C  reference snapshot  [128]
//! 0x00CC  scan name tag       [32]
//! 0x00EC  record format word  u32
//! 0x0100  record catalog base
//! 0x1000  end of managed region
//! ```

// ============================================================================
// Region
// ============================================================================

/// Total managed region size in bytes.
pub const STORE_SIZE: usize = 0x1000;

// ============================================================================
// Fixed Offsets
// ============================================================================

/// Catalog header word: record count (low u16) and active index (high u16).
pub const CATALOG_HEADER_OFFSET: usize = 0x0000;
/// Monotonic configuration-index counter.
pub const NEXT_CONFIG_INDEX_OFFSET: usize = 0x0004;
/// Monotonic scan-index counter.
pub const NEXT_SCAN_INDEX_OFFSET: usize = 0x0008;
/// Device serial-number tag.
pub const SERIAL_NUMBER_OFFSET: usize = 0x000C;
/// Device model-name tag.
pub const MODEL_NAME_OFFSET: usize = 0x001C;
/// Calibration version word.
pub const CALIBRATION_VERSION_OFFSET: usize = 0x002C;
/// Calibration coefficients.
pub const CALIBRATION_COEFFS_OFFSET: usize = 0x0030;
/// Reference-scan version word.
pub const REFERENCE_VERSION_OFFSET: usize = 0x0048;
/// Reference-scan snapshot.
pub const REFERENCE_SNAPSHOT_OFFSET: usize = 0x004C;
/// Free-text scan name tag.
pub const SCAN_NAME_OFFSET: usize = 0x00CC;
/// Record data-format version word.
pub const RECORD_FORMAT_OFFSET: usize = 0x00EC;
/// Base of the record catalog.
pub const RECORD_BASE_OFFSET: usize = 0x0100;

// ============================================================================
// Sizes and Versions
// ============================================================================

/// Number of calibration coefficients.
pub const CALIBRATION_COEFF_COUNT: usize = 6;
/// Reference-scan snapshot length in bytes.
pub const REFERENCE_SNAPSHOT_LEN: usize = 128;

/// Current calibration record version.
pub const CALIBRATION_VERSION: u32 = 2;
/// Current reference-scan record version.
pub const REFERENCE_VERSION: u32 = 1;
/// Current configuration-record data-format version.
pub const RECORD_FORMAT_VERSION: u32 = 3;

// ============================================================================
// Catalog
// ============================================================================

/// Fixed maximum number of catalog slots.
pub const CATALOG_CAPACITY: u8 = 8;

/// Returned by id-cache lookups when no slot matches.
pub const NO_SLOT: u8 = 255;

/// Serial-tag byte marking a record as invalid/corrupted.
///
/// Also used (deliberately, matching device behavior) to stamp records
/// saved while the device identity could not be read.
pub const INVALID_SERIAL_SENTINEL: u8 = b'*';

/// Round `n` up to the next 4-byte boundary.
pub const fn round_up_word(n: usize) -> usize {
    (n + 3) & !3
}
