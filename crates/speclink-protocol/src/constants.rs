//! Protocol constants
//!
//! These constants define the frame geometry, flag encoding, command codes,
//! and diagnostic codes used by the Speclink command protocol. The same
//! values apply on every transport.

// ============================================================================
// Frame Geometry
// ============================================================================

/// First byte of every frame.
pub const START_MARKER: u8 = 0xA5;
/// Last byte of every frame.
pub const END_MARKER: u8 = 0x5A;

/// Offset of the 16-bit checksum field.
pub const CHECKSUM_OFFSET: usize = 1;
/// Offset of the 16-bit body-length field.
pub const LENGTH_OFFSET: usize = 3;
/// Offset of the flags byte.
pub const FLAGS_OFFSET: usize = 5;
/// Offset of the body (command id + payload).
pub const BODY_OFFSET: usize = 6;

/// Framing bytes around the body: start, checksum, length, flags, end.
pub const FRAME_OVERHEAD: usize = 7;

/// Maximum body size: command id plus payload.
///
/// Sized so the largest serialized configuration record plus its length
/// prefix fits a single frame.
pub const MAX_BODY: usize = 320;
/// Maximum payload size (body minus the command id).
pub const MAX_PAYLOAD: usize = MAX_BODY - 1;
/// Maximum size of a complete frame on the wire.
pub const MAX_FRAME_SIZE: usize = MAX_BODY + FRAME_OVERHEAD;

// ============================================================================
// Flags
// ============================================================================

/// Direction bits within the flags byte.
pub const FLAG_DIRECTION_MASK: u8 = 0b0000_0011;
/// Direction: host wants to change or trigger device state.
pub const DIR_REQUEST: u8 = 0x00;
/// Direction: host wants to read current device state.
pub const DIR_POLL: u8 = 0x01;

/// The host expects a response frame even for side-effect-only commands.
pub const FLAG_REPLY_REQUESTED: u8 = 0b0000_0100;

/// Response-code bits within the flags byte.
pub const FLAG_RESPONSE_MASK: u8 = 0b0011_0000;
/// Shift of the response-code bits.
pub const FLAG_RESPONSE_SHIFT: u8 = 4;

/// Response code: command executed.
pub const RC_OK: u8 = 0;
/// Response code: session owned by another transport.
pub const RC_BUSY: u8 = 1;
/// Response code: framing or command failure.
pub const RC_ERR: u8 = 2;

// ============================================================================
// Command Codes
// ============================================================================

/// Query protocol version, model, and serial number.
pub const CMD_DEVICE_QUERY: u8 = 0x01;
/// Device-status bitmask (poll reads, request sets/clears host-owned bits).
pub const CMD_DEVICE_STATUS: u8 = 0x02;
/// Error bitmask and diagnostic codes (poll reads, request clears a mask).
pub const CMD_ERROR_STATUS: u8 = 0x03;
/// Diagnostic code for a single module ordinal.
pub const CMD_ERROR_CODE: u8 = 0x04;

/// Number of stored configuration records and the active index.
pub const CMD_CONFIG_COUNT: u8 = 0x10;
/// One configuration record by slot index (poll gets, request saves).
pub const CMD_CONFIG_RECORD: u8 = 0x11;
/// Truncate the catalog to the factory record.
pub const CMD_ERASE_ALL: u8 = 0x12;
/// Active configuration slot (poll gets, request sets).
pub const CMD_ACTIVE_CONFIG: u8 = 0x13;
/// Slot lookup by monotonic configuration id.
pub const CMD_CONFIG_ID_LOOKUP: u8 = 0x14;

/// Device serial-number tag.
pub const CMD_SERIAL_NUMBER: u8 = 0x20;
/// Device model-name tag.
pub const CMD_MODEL_NAME: u8 = 0x21;
/// Calibration coefficients with version word.
pub const CMD_CALIBRATION: u8 = 0x22;
/// Reference-scan snapshot with version word.
pub const CMD_REFERENCE_SCAN: u8 = 0x23;
/// Free-text scan name tag.
pub const CMD_SCAN_NAME: u8 = 0x24;

// ============================================================================
// Serial-Link Diagnostic Codes
// ============================================================================

// Codes recorded against the serial-link module by the codec itself.

/// Inbound frame failed checksum validation.
pub const DIAG_BAD_CHECKSUM: i16 = -1;
/// Inbound frame carried an unrecognized direction value.
pub const DIAG_BAD_DIRECTION: i16 = -2;
