//! Configuration record model and serialization.
//!
//! Two record shapes share a common header. A fixed scan is one constant
//! block; a variable scan carries up to [`MAX_SECTIONS`] section entries
//! and only the used entries are serialized, so the on-medium footprint
//! shrinks with the section count.
//!
//! ## Record layout
//!
//! | Field          | Size (bytes)            | Notes                         |
//! |----------------|-------------------------|-------------------------------|
//! | serial tag     | 16                      | device-bound, space padded    |
//! | kind           | 1 (+3 pad)              | 0 fixed, 1 variable           |
//! | config_index   | 4                       | monotonic, never reused       |
//! | body           | 72 fixed / 8 + n * 24   | variable: header + sections   |

use speclink_common::{SerialTag, SERIAL_TAG_LEN};

use crate::error::StoreError;
use crate::layout::{round_up_word, INVALID_SERIAL_SENTINEL};

// ============================================================================
// Sizes
// ============================================================================

/// Common record header: serial tag, kind byte, padding, config index.
pub const RECORD_HEADER_SIZE: usize = SERIAL_TAG_LEN + 4 + 4;
/// Fixed-variant body size.
pub const FIXED_BODY_SIZE: usize = 72;
/// Total serialized size of a fixed record.
pub const FIXED_RECORD_SIZE: usize = RECORD_HEADER_SIZE + FIXED_BODY_SIZE;
/// Variable-variant sub-header size.
pub const VARIABLE_HEADER_SIZE: usize = 8;
/// Serialized size of one scan section.
pub const SECTION_SIZE: usize = 24;
/// Maximum sections in a variable record.
pub const MAX_SECTIONS: usize = 10;
/// Serialized size of a variable record with every section used.
pub const VARIABLE_BASE_SIZE: usize =
    RECORD_HEADER_SIZE + VARIABLE_HEADER_SIZE + MAX_SECTIONS * SECTION_SIZE;
/// Largest possible record footprint.
pub const MAX_RECORD_SIZE: usize = VARIABLE_BASE_SIZE;

// ============================================================================
// Model
// ============================================================================

/// Which scan shape a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanKind {
    /// One constant acquisition block.
    Fixed = 0,
    /// A sectioned acquisition plan.
    Variable = 1,
}

impl ScanKind {
    /// Decode the persisted kind byte.
    pub fn from_u8(value: u8) -> Result<ScanKind, StoreError> {
        match value {
            0 => Ok(ScanKind::Fixed),
            1 => Ok(ScanKind::Variable),
            other => Err(StoreError::UnknownKind(other)),
        }
    }
}

/// Common persisted record header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordHeader {
    /// Device-bound serial tag, stamped at save time.
    pub serial: SerialTag,
    /// Scan shape of the body.
    pub kind: ScanKind,
    /// Monotonic configuration index, assigned at save time.
    pub config_index: u32,
}

impl RecordHeader {
    /// Whether the serial tag carries the invalid sentinel.
    pub fn is_invalid(&self) -> bool {
        self.serial.as_bytes()[0] == INVALID_SERIAL_SENTINEL
    }
}

/// Body of a fixed scan record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedScanBody {
    /// Scan start wavelength in nanometers.
    pub start_nm: f32,
    /// Scan end wavelength in nanometers.
    pub end_nm: f32,
    /// Wavelength step in nanometers.
    pub step_nm: f32,
    /// Exposure per point in milliseconds.
    pub exposure_ms: u16,
    /// Readings averaged per point.
    pub averages: u16,
    /// Pattern selector for the spatial modulator.
    pub pattern: u8,
    /// Reserved tail kept for layout compatibility.
    pub reserved: [u8; FIXED_BODY_SIZE - 20],
}

impl Default for FixedScanBody {
    fn default() -> Self {
        FixedScanBody {
            start_nm: 900.0,
            end_nm: 1700.0,
            step_nm: 2.0,
            exposure_ms: 10,
            averages: 4,
            pattern: 0,
            reserved: [0; FIXED_BODY_SIZE - 20],
        }
    }
}

/// One section of a variable scan record.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScanSection {
    /// Section start wavelength in nanometers.
    pub start_nm: f32,
    /// Section end wavelength in nanometers.
    pub end_nm: f32,
    /// Section resolution in nanometers.
    pub resolution_nm: f32,
    /// Exposure per point in milliseconds.
    pub exposure_ms: u16,
    /// Readings averaged per point.
    pub averages: u16,
    /// Pattern selector for the spatial modulator.
    pub pattern: u8,
    /// Reserved word kept for layout compatibility.
    pub reserved: u32,
}

/// A variable scan record: sub-header plus used sections.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableScan {
    /// Dwell time between sections in milliseconds.
    pub dwell_ms: u16,
    /// Detector gain code.
    pub gain: u16,
    /// Used sections, at most [`MAX_SECTIONS`].
    pub sections: Vec<ScanSection>,
}

/// One persisted configuration record.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigRecord {
    /// Common header.
    pub header: RecordHeader,
    /// Variant body.
    pub body: RecordBody,
}

/// Variant body of a configuration record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordBody {
    /// Constant-size scan block.
    Fixed(FixedScanBody),
    /// Sectioned scan plan.
    Variable(VariableScan),
}

impl ConfigRecord {
    /// Build a fixed record with a blank header.
    pub fn fixed(body: FixedScanBody) -> Self {
        ConfigRecord {
            header: RecordHeader {
                serial: SerialTag::default(),
                kind: ScanKind::Fixed,
                config_index: 0,
            },
            body: RecordBody::Fixed(body),
        }
    }

    /// Build a variable record with a blank header.
    ///
    /// Returns `None` when `scan` carries more than [`MAX_SECTIONS`]
    /// sections.
    pub fn variable(scan: VariableScan) -> Option<Self> {
        if scan.sections.len() > MAX_SECTIONS {
            return None;
        }
        Some(ConfigRecord {
            header: RecordHeader {
                serial: SerialTag::default(),
                kind: ScanKind::Variable,
                config_index: 0,
            },
            body: RecordBody::Variable(scan),
        })
    }

    /// The record's scan kind.
    pub fn kind(&self) -> ScanKind {
        self.header.kind
    }

    /// Serialized footprint of this record on the medium.
    ///
    /// Fixed records are constant; variable records shed the unused
    /// section slots, rounded up to a 4-byte boundary.
    pub fn serialized_size(&self) -> usize {
        match &self.body {
            RecordBody::Fixed(_) => FIXED_RECORD_SIZE,
            RecordBody::Variable(scan) => {
                let unused = MAX_SECTIONS - scan.sections.len();
                round_up_word(VARIABLE_BASE_SIZE - unused * SECTION_SIZE)
            }
        }
    }
}

/// Serialized footprint for a (kind, section count) pair.
///
/// Used by the address walker, which only reads record headers.
pub fn footprint(kind: ScanKind, section_count: u8) -> Result<usize, StoreError> {
    match kind {
        ScanKind::Fixed => Ok(FIXED_RECORD_SIZE),
        ScanKind::Variable => {
            let count = section_count as usize;
            if count > MAX_SECTIONS {
                return Err(StoreError::SectionCountOutOfRange(section_count));
            }
            Ok(round_up_word(
                VARIABLE_BASE_SIZE - (MAX_SECTIONS - count) * SECTION_SIZE,
            ))
        }
    }
}

fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_f32(bytes: &[u8]) -> f32 {
    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a record to its serialized footprint.
pub fn encode_record(record: &ConfigRecord) -> Vec<u8> {
    let mut buf = Vec::with_capacity(record.serialized_size());

    // Header: serial tag + kind + pad + config index.
    buf.extend_from_slice(record.header.serial.as_bytes());
    buf.push(record.header.kind as u8);
    buf.extend_from_slice(&[0; 3]);
    buf.extend_from_slice(&record.header.config_index.to_le_bytes());

    match &record.body {
        RecordBody::Fixed(body) => {
            buf.extend_from_slice(&body.start_nm.to_le_bytes());
            buf.extend_from_slice(&body.end_nm.to_le_bytes());
            buf.extend_from_slice(&body.step_nm.to_le_bytes());
            buf.extend_from_slice(&body.exposure_ms.to_le_bytes());
            buf.extend_from_slice(&body.averages.to_le_bytes());
            buf.push(body.pattern);
            buf.extend_from_slice(&[0; 3]);
            buf.extend_from_slice(&body.reserved);
        }
        RecordBody::Variable(scan) => {
            buf.push(scan.sections.len() as u8);
            buf.extend_from_slice(&[0; 3]);
            buf.extend_from_slice(&scan.dwell_ms.to_le_bytes());
            buf.extend_from_slice(&scan.gain.to_le_bytes());
            for section in &scan.sections {
                buf.extend_from_slice(&section.start_nm.to_le_bytes());
                buf.extend_from_slice(&section.end_nm.to_le_bytes());
                buf.extend_from_slice(&section.resolution_nm.to_le_bytes());
                buf.extend_from_slice(&section.exposure_ms.to_le_bytes());
                buf.extend_from_slice(&section.averages.to_le_bytes());
                buf.push(section.pattern);
                buf.extend_from_slice(&[0; 3]);
                buf.extend_from_slice(&section.reserved.to_le_bytes());
            }
        }
    }

    // Pad to the rounded footprint.
    buf.resize(record.serialized_size(), 0);
    buf
}

/// Decode a record from a footprint buffer.
///
/// `bytes` must hold at least the record's serialized footprint; trailing
/// bytes are ignored (the store reads maximal footprints first).
pub fn decode_record(bytes: &[u8]) -> Result<ConfigRecord, StoreError> {
    if bytes.len() < RECORD_HEADER_SIZE {
        return Err(StoreError::Truncated {
            needed: RECORD_HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let mut tag = [0u8; SERIAL_TAG_LEN];
    tag.copy_from_slice(&bytes[..SERIAL_TAG_LEN]);
    let serial = SerialTag(tag);
    let kind = ScanKind::from_u8(bytes[SERIAL_TAG_LEN])?;
    let config_index = read_u32(&bytes[SERIAL_TAG_LEN + 4..]);
    let header = RecordHeader {
        serial,
        kind,
        config_index,
    };

    let body = &bytes[RECORD_HEADER_SIZE..];
    match kind {
        ScanKind::Fixed => {
            if body.len() < FIXED_BODY_SIZE {
                return Err(StoreError::Truncated {
                    needed: FIXED_RECORD_SIZE,
                    available: bytes.len(),
                });
            }
            let mut reserved = [0u8; FIXED_BODY_SIZE - 20];
            reserved.copy_from_slice(&body[20..FIXED_BODY_SIZE]);
            Ok(ConfigRecord {
                header,
                body: RecordBody::Fixed(FixedScanBody {
                    start_nm: read_f32(&body[0..]),
                    end_nm: read_f32(&body[4..]),
                    step_nm: read_f32(&body[8..]),
                    exposure_ms: read_u16(&body[12..]),
                    averages: read_u16(&body[14..]),
                    pattern: body[16],
                    reserved,
                }),
            })
        }
        ScanKind::Variable => {
            if body.len() < VARIABLE_HEADER_SIZE {
                return Err(StoreError::Truncated {
                    needed: RECORD_HEADER_SIZE + VARIABLE_HEADER_SIZE,
                    available: bytes.len(),
                });
            }
            let section_count = body[0];
            if section_count as usize > MAX_SECTIONS {
                return Err(StoreError::SectionCountOutOfRange(section_count));
            }
            let needed = VARIABLE_HEADER_SIZE + section_count as usize * SECTION_SIZE;
            if body.len() < needed {
                return Err(StoreError::Truncated {
                    needed: RECORD_HEADER_SIZE + needed,
                    available: bytes.len(),
                });
            }
            let dwell_ms = read_u16(&body[4..]);
            let gain = read_u16(&body[6..]);

            let mut sections = Vec::with_capacity(section_count as usize);
            for i in 0..section_count as usize {
                let s = &body[VARIABLE_HEADER_SIZE + i * SECTION_SIZE..];
                sections.push(ScanSection {
                    start_nm: read_f32(&s[0..]),
                    end_nm: read_f32(&s[4..]),
                    resolution_nm: read_f32(&s[8..]),
                    exposure_ms: read_u16(&s[12..]),
                    averages: read_u16(&s[14..]),
                    pattern: s[16],
                    reserved: read_u32(&s[20..]),
                });
            }

            Ok(ConfigRecord {
                header,
                body: RecordBody::Variable(VariableScan {
                    dwell_ms,
                    gain,
                    sections,
                }),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_variable(section_count: usize) -> ConfigRecord {
        let sections = (0..section_count)
            .map(|i| ScanSection {
                start_nm: 900.0 + i as f32 * 100.0,
                end_nm: 1000.0 + i as f32 * 100.0,
                resolution_nm: 5.0,
                exposure_ms: 8,
                averages: 2,
                pattern: i as u8,
                reserved: 0,
            })
            .collect();
        ConfigRecord::variable(VariableScan {
            dwell_ms: 25,
            gain: 3,
            sections,
        })
        .expect("section count in range")
    }

    #[test]
    fn fixed_record_round_trip() {
        let record = ConfigRecord::fixed(FixedScanBody {
            start_nm: 950.0,
            end_nm: 1650.0,
            step_nm: 1.5,
            exposure_ms: 12,
            averages: 8,
            pattern: 2,
            reserved: [0; FIXED_BODY_SIZE - 20],
        });
        let bytes = encode_record(&record);
        assert_eq!(bytes.len(), FIXED_RECORD_SIZE);

        let decoded = decode_record(&bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn variable_record_round_trip_and_sizes() {
        for count in [0usize, 1, 3, MAX_SECTIONS] {
            let record = sample_variable(count);
            let expected =
                round_up_word(VARIABLE_BASE_SIZE - (MAX_SECTIONS - count) * SECTION_SIZE);
            assert_eq!(record.serialized_size(), expected);

            let bytes = encode_record(&record);
            assert_eq!(bytes.len(), expected);
            assert_eq!(decode_record(&bytes).unwrap(), record);
        }
    }

    #[test]
    fn footprint_matches_serialized_size() {
        let record = sample_variable(4);
        assert_eq!(
            footprint(ScanKind::Variable, 4).unwrap(),
            record.serialized_size()
        );
        assert_eq!(footprint(ScanKind::Fixed, 0).unwrap(), FIXED_RECORD_SIZE);
        assert!(matches!(
            footprint(ScanKind::Variable, MAX_SECTIONS as u8 + 1),
            Err(StoreError::SectionCountOutOfRange(_))
        ));
    }

    #[test]
    fn decode_rejects_bad_kind_and_truncation() {
        let record = sample_variable(2);
        let mut bytes = encode_record(&record);
        bytes[SERIAL_TAG_LEN] = 9;
        assert!(matches!(
            decode_record(&bytes),
            Err(StoreError::UnknownKind(9))
        ));

        let bytes = encode_record(&record);
        assert!(matches!(
            decode_record(&bytes[..RECORD_HEADER_SIZE + 3]),
            Err(StoreError::Truncated { .. })
        ));
    }
}
