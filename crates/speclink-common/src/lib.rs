//! Common types shared across the Speclink workspace.
//!
//! This crate holds the vocabulary every other Speclink crate speaks:
//! transport identities (with their session-priority ordering), the
//! diagnosable module table, fixed-width identity tags, and the device
//! identity provider trait used when stamping configuration records.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Versions
// ============================================================================

/// Protocol version reported by the device-query command.
pub const PROTOCOL_VERSION: u8 = 3;

/// Firmware version string reported by the device-query command.
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Transport Identity
// ============================================================================

/// Identity of a physical transport, ordered by session priority.
///
/// `None` is the idle-session sentinel and sorts below every real
/// transport. Exactly one non-`None` transport may own the command
/// session at a time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum TransportId {
    /// No transport owns the session.
    #[default]
    None = 0,
    /// Wired serial link.
    Serial = 1,
    /// Wireless (BLE) link.
    Wireless = 2,
    /// USB link.
    Usb = 3,
}

impl TransportId {
    /// All real (non-sentinel) transports.
    pub const ALL: [TransportId; 3] =
        [TransportId::Serial, TransportId::Wireless, TransportId::Usb];

    /// Decode from the wire/persisted representation.
    pub fn from_u8(value: u8) -> Option<TransportId> {
        match value {
            0 => Some(TransportId::None),
            1 => Some(TransportId::Serial),
            2 => Some(TransportId::Wireless),
            3 => Some(TransportId::Usb),
            _ => None,
        }
    }

    /// Whether this is the idle sentinel.
    pub fn is_none(&self) -> bool {
        matches!(self, TransportId::None)
    }

    /// Short lowercase name for logs and settings files.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportId::None => "none",
            TransportId::Serial => "serial",
            TransportId::Wireless => "wireless",
            TransportId::Usb => "usb",
        }
    }
}

impl std::fmt::Display for TransportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Diagnosable Modules
// ============================================================================

/// Number of modules that carry a per-bit diagnostic code.
///
/// Error bits at or above this ordinal have no code slot.
pub const DIAG_MODULE_COUNT: usize = 12;

/// A device module with a diagnosable error bit.
///
/// The discriminant is the module's bit ordinal in the error bitmask and
/// its index into the diagnostic code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    /// Optical scan engine.
    Scan = 0,
    /// Analog-to-digital converter.
    Adc = 1,
    /// Removable storage medium.
    StorageMedium = 2,
    /// Non-volatile configuration store.
    NvStore = 3,
    /// Wireless link.
    WirelessLink = 4,
    /// Spectral reference library.
    SpectralLibrary = 5,
    /// Battery and charging.
    Battery = 6,
    /// Working memory.
    Memory = 7,
    /// Miscellaneous hardware.
    Hardware = 8,
    /// Sensor channel A.
    SensorA = 9,
    /// Sensor channel B.
    SensorB = 10,
    /// Wired serial link.
    SerialLink = 11,
}

impl Module {
    /// All diagnosable modules, in bit-ordinal order.
    pub const ALL: [Module; DIAG_MODULE_COUNT] = [
        Module::Scan,
        Module::Adc,
        Module::StorageMedium,
        Module::NvStore,
        Module::WirelessLink,
        Module::SpectralLibrary,
        Module::Battery,
        Module::Memory,
        Module::Hardware,
        Module::SensorA,
        Module::SensorB,
        Module::SerialLink,
    ];

    /// The module's single-bit mask in the error bitmask.
    pub fn mask(&self) -> u32 {
        1 << (*self as u32)
    }

    /// The module's ordinal (index into the diagnostic code table).
    pub fn ordinal(&self) -> usize {
        *self as usize
    }

    /// Look a module up by its bit ordinal.
    pub fn from_ordinal(ordinal: usize) -> Option<Module> {
        Module::ALL.get(ordinal).copied()
    }
}

// ============================================================================
// Fixed-Width Identity Tags
// ============================================================================

/// Length of the device serial-number tag in bytes.
pub const SERIAL_TAG_LEN: usize = 16;

/// Length of the device model-name tag in bytes.
pub const MODEL_NAME_LEN: usize = 16;

/// Length of the free-text scan-name tag in bytes.
pub const SCAN_NAME_LEN: usize = 32;

/// A fixed-width ASCII serial-number tag, space padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SerialTag(pub [u8; SERIAL_TAG_LEN]);

impl SerialTag {
    /// Build a tag from a string, truncating and space-padding to width.
    pub fn from_str_lossy(s: &str) -> Self {
        let mut bytes = [b' '; SERIAL_TAG_LEN];
        for (dst, src) in bytes.iter_mut().zip(s.bytes()) {
            *dst = src;
        }
        SerialTag(bytes)
    }

    /// Build a tag with every position set to `fill`.
    pub fn filled(fill: u8) -> Self {
        SerialTag([fill; SERIAL_TAG_LEN])
    }

    /// Build from a slice. Returns `None` if the slice is the wrong length.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() == SERIAL_TAG_LEN {
            let mut bytes = [0u8; SERIAL_TAG_LEN];
            bytes.copy_from_slice(slice);
            Some(SerialTag(bytes))
        } else {
            None
        }
    }

    /// The raw tag bytes.
    pub fn as_bytes(&self) -> &[u8; SERIAL_TAG_LEN] {
        &self.0
    }

    /// The tag as trimmed text (lossy for non-ASCII bytes).
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).trim_end().to_string()
    }
}

impl Default for SerialTag {
    fn default() -> Self {
        SerialTag([b' '; SERIAL_TAG_LEN])
    }
}

/// A fixed-width ASCII model-name tag, space padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelName(pub [u8; MODEL_NAME_LEN]);

impl ModelName {
    /// Build a tag from a string, truncating and space-padding to width.
    pub fn from_str_lossy(s: &str) -> Self {
        let mut bytes = [b' '; MODEL_NAME_LEN];
        for (dst, src) in bytes.iter_mut().zip(s.bytes()) {
            *dst = src;
        }
        ModelName(bytes)
    }

    /// Build from a slice. Returns `None` if the slice is the wrong length.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() == MODEL_NAME_LEN {
            let mut bytes = [0u8; MODEL_NAME_LEN];
            bytes.copy_from_slice(slice);
            Some(ModelName(bytes))
        } else {
            None
        }
    }

    /// The raw tag bytes.
    pub fn as_bytes(&self) -> &[u8; MODEL_NAME_LEN] {
        &self.0
    }

    /// The tag as trimmed text (lossy for non-ASCII bytes).
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).trim_end().to_string()
    }
}

impl Default for ModelName {
    fn default() -> Self {
        ModelName([b' '; MODEL_NAME_LEN])
    }
}

// ============================================================================
// Device Identity Provider
// ============================================================================

/// Errors from the device identity provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The identity source is not provisioned yet.
    #[error("device identity not provisioned")]
    NotProvisioned,
    /// The identity source could not be read.
    #[error("identity source unavailable: {0}")]
    Unavailable(String),
}

/// Source of the device-bound identity used to stamp configuration records.
pub trait IdentityProvider: Send + Sync {
    /// The device serial number.
    fn serial_number(&self) -> Result<SerialTag, IdentityError>;

    /// The device model name.
    fn model_name(&self) -> Result<ModelName, IdentityError>;
}

/// An identity provider with fixed values, for tests and bring-up.
#[derive(Debug, Clone)]
pub struct FixedIdentity {
    /// Serial number reported for this device.
    pub serial: SerialTag,
    /// Model name reported for this device.
    pub model: ModelName,
}

impl FixedIdentity {
    /// Create a provider from plain strings.
    pub fn new(serial: &str, model: &str) -> Self {
        FixedIdentity {
            serial: SerialTag::from_str_lossy(serial),
            model: ModelName::from_str_lossy(model),
        }
    }
}

impl IdentityProvider for FixedIdentity {
    fn serial_number(&self) -> Result<SerialTag, IdentityError> {
        Ok(self.serial)
    }

    fn model_name(&self) -> Result<ModelName, IdentityError> {
        Ok(self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_priority_ordering() {
        assert!(TransportId::None < TransportId::Serial);
        assert!(TransportId::Serial < TransportId::Wireless);
        assert!(TransportId::Wireless < TransportId::Usb);
    }

    #[test]
    fn transport_round_trip() {
        for t in TransportId::ALL {
            assert_eq!(TransportId::from_u8(t as u8), Some(t));
        }
        assert_eq!(TransportId::from_u8(0), Some(TransportId::None));
        assert_eq!(TransportId::from_u8(9), None);
    }

    #[test]
    fn module_masks_are_disjoint_ordinals() {
        for (i, module) in Module::ALL.iter().enumerate() {
            assert_eq!(module.ordinal(), i);
            assert_eq!(module.mask(), 1 << i);
            assert_eq!(Module::from_ordinal(i), Some(*module));
        }
        assert_eq!(Module::from_ordinal(DIAG_MODULE_COUNT), None);
    }

    #[test]
    fn serial_tag_pads_and_trims() {
        let tag = SerialTag::from_str_lossy("SL-00042");
        assert_eq!(tag.as_bytes().len(), SERIAL_TAG_LEN);
        assert_eq!(tag.to_string_lossy(), "SL-00042");

        let long = SerialTag::from_str_lossy("0123456789ABCDEFGHIJ");
        assert_eq!(long.to_string_lossy(), "0123456789ABCDEF");
    }
}
