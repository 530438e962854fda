//! Device status and error aggregation.
//!
//! The controller keeps two independent 32-bit bitmasks: a device-status
//! word of operational flags (last writer wins per bit) and an error word
//! where each set bit marks a failed module. Bits in the diagnosable range
//! additionally carry a signed diagnostic code in a parallel slot table.
//!
//! Error bits are first-error-wins: once set, a bit cannot be set again
//! (with a new code) until it has been cleared. Clearing a bit also zeroes
//! its code slot. Neither word is ever persisted; both reset at boot.
//!
//! All mutation goes through [`StatusCenter`], a process-wide service with
//! an internal mutex, so transports and handlers can share one instance.

use std::sync::Mutex;

use speclink_common::DIAG_MODULE_COUNT;
use thiserror::Error;

// ============================================================================
// Device Status Bits
// ============================================================================

/// A scan is currently being acquired.
pub const STATUS_SCAN_ACTIVE: u32 = 1 << 0;
/// The lamp is warming up and readings are not yet stable.
pub const STATUS_LAMP_WARMUP: u32 = 1 << 1;
/// The battery is charging.
pub const STATUS_BATTERY_CHARGING: u32 = 1 << 2;
/// Battery charge is below the low-water mark.
pub const STATUS_BATTERY_LOW: u32 = 1 << 3;
/// The storage medium is busy with a transfer.
pub const STATUS_STORAGE_BUSY: u32 = 1 << 4;
/// A wireless host is connected.
pub const STATUS_WIRELESS_CONNECTED: u32 = 1 << 5;
/// A USB host is connected.
pub const STATUS_USB_CONNECTED: u32 = 1 << 6;
/// A serial host is connected.
pub const STATUS_SERIAL_CONNECTED: u32 = 1 << 7;
/// The stored reference scan no longer matches current conditions.
pub const STATUS_REFERENCE_STALE: u32 = 1 << 8;
/// A calibration cycle is pending.
pub const STATUS_CALIBRATION_PENDING: u32 = 1 << 9;
/// The power-on self test is running.
pub const STATUS_SELF_TEST_RUNNING: u32 = 1 << 10;
/// The active configuration has unsaved changes.
pub const STATUS_CONFIG_DIRTY: u32 = 1 << 11;

/// Every defined device-status bit.
pub const STATUS_VALID_MASK: u32 = (1 << 12) - 1;

// ============================================================================
// Error Bits
// ============================================================================

// Bits 0..DIAG_MODULE_COUNT are the diagnosable modules; see
// `speclink_common::Module` for the table. The bits below are defined but
// carry no diagnostic code slot.

/// Enclosure temperature outside operating range.
pub const ERR_OVERTEMP: u32 = 1 << 12;
/// Supply brown-out detected since boot.
pub const ERR_BROWNOUT: u32 = 1 << 13;

/// Every defined error bit, diagnosable or not.
pub const ERROR_VALID_MASK: u32 = (1 << 14) - 1;

/// Returned by [`StatusCenter::error_code`] for an out-of-range ordinal.
pub const CODE_SENTINEL: i16 = i16::MIN;

// ============================================================================
// Errors
// ============================================================================

/// Errors from status and error-bit operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    /// The mask is zero or contains bits outside the defined range.
    #[error("status mask 0x{0:08X} outside the defined range")]
    MaskOutOfRange(u32),

    /// The error bit is already set and may not be overwritten.
    #[error("error bit 0x{0:08X} already set")]
    AlreadySet(u32),

    /// A diagnostic code was supplied for a bit with no code slot.
    #[error("error bit 0x{0:08X} has no diagnostic code slot")]
    NotDiagnosable(u32),
}

// ============================================================================
// Status Center
// ============================================================================

#[derive(Debug)]
struct StatusInner {
    device_status: u32,
    errors: u32,
    codes: [i16; DIAG_MODULE_COUNT],
}

/// Process-wide device status and error aggregator.
///
/// One instance is shared by every transport and command handler. All
/// operations are serialized on an internal mutex.
#[derive(Debug)]
pub struct StatusCenter {
    inner: Mutex<StatusInner>,
}

impl StatusCenter {
    /// Create an aggregator with all bits and codes zeroed.
    pub fn new() -> Self {
        StatusCenter {
            inner: Mutex::new(StatusInner {
                device_status: 0,
                errors: 0,
                codes: [0; DIAG_MODULE_COUNT],
            }),
        }
    }

    // ------------------------------------------------------------------
    // Device status
    // ------------------------------------------------------------------

    /// Set or clear the device-status bits in `mask`.
    pub fn set_device_status(&self, mask: u32, engaged: bool) -> Result<(), StatusError> {
        check_mask(mask, STATUS_VALID_MASK)?;
        let mut inner = self.inner.lock().unwrap();
        if engaged {
            inner.device_status |= mask;
        } else {
            inner.device_status &= !mask;
        }
        Ok(())
    }

    /// Whether any bit in `mask` is currently set.
    pub fn device_status(&self, mask: u32) -> Result<bool, StatusError> {
        check_mask(mask, STATUS_VALID_MASK)?;
        let inner = self.inner.lock().unwrap();
        Ok(inner.device_status & mask != 0)
    }

    /// The whole device-status word.
    pub fn snapshot_device_status(&self) -> u32 {
        self.inner.lock().unwrap().device_status
    }

    // ------------------------------------------------------------------
    // Error status
    // ------------------------------------------------------------------

    /// Set or clear the error bit in `mask` without touching code slots.
    ///
    /// Setting fails with [`StatusError::AlreadySet`] if the bit is already
    /// engaged; the first recorded error wins until it is cleared.
    pub fn set_error(&self, mask: u32, engaged: bool) -> Result<(), StatusError> {
        check_mask(mask, ERROR_VALID_MASK)?;
        let mut inner = self.inner.lock().unwrap();
        inner.set_error_bit(mask, engaged, false)
    }

    /// Set or clear the error bit in `mask` and record its diagnostic code.
    ///
    /// The bit's ordinal among the diagnosable modules is derived from its
    /// position; ordinals at or beyond [`DIAG_MODULE_COUNT`] have no code
    /// slot, and supplying a non-zero code for one fails without mutating
    /// any state.
    pub fn set_error_with_code(&self, mask: u32, engaged: bool, code: i16) -> Result<(), StatusError> {
        check_mask(mask, ERROR_VALID_MASK)?;
        let ordinal = mask.trailing_zeros() as usize;
        if ordinal >= DIAG_MODULE_COUNT && code != 0 {
            return Err(StatusError::NotDiagnosable(mask));
        }
        let mut inner = self.inner.lock().unwrap();
        inner.set_error_bit(mask, engaged, false)?;
        if ordinal < DIAG_MODULE_COUNT {
            inner.codes[ordinal] = if engaged { code } else { 0 };
        }
        Ok(())
    }

    /// Clear every set bit in `mask`, zeroing the code slot of each.
    ///
    /// Uses the internal overwrite-permitted path, so it succeeds whether
    /// or not the bits were set.
    pub fn clear_errors(&self, mask: u32) -> Result<(), StatusError> {
        check_mask(mask, ERROR_VALID_MASK)?;
        let mut inner = self.inner.lock().unwrap();
        for ordinal in 0..32 {
            let bit = 1u32 << ordinal;
            if mask & bit == 0 || inner.errors & bit == 0 {
                continue;
            }
            // Infallible: clearing bypasses the already-set guard.
            let _ = inner.set_error_bit(bit, false, true);
            if ordinal < DIAG_MODULE_COUNT {
                inner.codes[ordinal] = 0;
            }
        }
        Ok(())
    }

    /// The diagnostic code for a module ordinal, or [`CODE_SENTINEL`] for
    /// an out-of-range input.
    pub fn error_code(&self, ordinal: usize) -> i16 {
        if ordinal >= DIAG_MODULE_COUNT {
            return CODE_SENTINEL;
        }
        self.inner.lock().unwrap().codes[ordinal]
    }

    /// Whether any bit in `mask` is currently flagged as an error.
    pub fn has_error(&self, mask: u32) -> bool {
        self.inner.lock().unwrap().errors & mask != 0
    }

    /// The error word and the full diagnostic code table.
    pub fn snapshot_errors(&self) -> (u32, [i16; DIAG_MODULE_COUNT]) {
        let inner = self.inner.lock().unwrap();
        (inner.errors, inner.codes)
    }

    /// Zero the error word and every code slot. Called at boot.
    pub fn reset_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.errors = 0;
        inner.codes = [0; DIAG_MODULE_COUNT];
    }
}

impl Default for StatusCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusInner {
    fn set_error_bit(&mut self, mask: u32, engaged: bool, overwrite: bool) -> Result<(), StatusError> {
        if engaged {
            if !overwrite && self.errors & mask != 0 {
                return Err(StatusError::AlreadySet(mask));
            }
            if self.errors & mask == 0 {
                log::debug!("error bit 0x{:08X} raised", mask);
            }
            self.errors |= mask;
        } else {
            self.errors &= !mask;
        }
        Ok(())
    }
}

fn check_mask(mask: u32, valid: u32) -> Result<(), StatusError> {
    if mask == 0 || mask & !valid != 0 {
        return Err(StatusError::MaskOutOfRange(mask));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use speclink_common::Module;

    #[test]
    fn device_status_set_and_clear() {
        let center = StatusCenter::new();
        center
            .set_device_status(STATUS_SCAN_ACTIVE | STATUS_LAMP_WARMUP, true)
            .unwrap();
        assert!(center.device_status(STATUS_SCAN_ACTIVE).unwrap());
        assert_eq!(
            center.snapshot_device_status(),
            STATUS_SCAN_ACTIVE | STATUS_LAMP_WARMUP
        );

        center.set_device_status(STATUS_SCAN_ACTIVE, false).unwrap();
        assert!(!center.device_status(STATUS_SCAN_ACTIVE).unwrap());
        assert!(center.device_status(STATUS_LAMP_WARMUP).unwrap());
    }

    #[test]
    fn device_status_rejects_undefined_bits() {
        let center = StatusCenter::new();
        assert_eq!(
            center.set_device_status(1 << 20, true),
            Err(StatusError::MaskOutOfRange(1 << 20))
        );
        assert_eq!(
            center.set_device_status(0, true),
            Err(StatusError::MaskOutOfRange(0))
        );
    }

    #[test]
    fn first_error_wins() {
        let center = StatusCenter::new();
        let mask = Module::Adc.mask();

        center.set_error_with_code(mask, true, 17).unwrap();
        assert_eq!(center.error_code(Module::Adc.ordinal()), 17);

        // A second set must fail and leave the code slot unchanged.
        assert_eq!(
            center.set_error_with_code(mask, true, 99),
            Err(StatusError::AlreadySet(mask))
        );
        assert_eq!(center.error_code(Module::Adc.ordinal()), 17);
    }

    #[test]
    fn clear_zeroes_codes_and_spares_other_bits() {
        let center = StatusCenter::new();
        center
            .set_error_with_code(Module::Scan.mask(), true, -3)
            .unwrap();
        center
            .set_error_with_code(Module::Battery.mask(), true, 12)
            .unwrap();

        center
            .clear_errors(Module::Scan.mask() | Module::Adc.mask())
            .unwrap();

        let (errors, codes) = center.snapshot_errors();
        assert_eq!(errors, Module::Battery.mask());
        assert_eq!(codes[Module::Scan.ordinal()], 0);
        assert_eq!(codes[Module::Battery.ordinal()], 12);

        // Cleared bits may be set again.
        center
            .set_error_with_code(Module::Scan.mask(), true, -4)
            .unwrap();
        assert_eq!(center.error_code(Module::Scan.ordinal()), -4);
    }

    #[test]
    fn non_diagnosable_bit_rejects_code() {
        let center = StatusCenter::new();
        assert_eq!(
            center.set_error_with_code(ERR_OVERTEMP, true, 5),
            Err(StatusError::NotDiagnosable(ERR_OVERTEMP))
        );
        // Nothing was mutated.
        assert_eq!(center.snapshot_errors().0, 0);

        // With a zero code the bit itself is still recordable.
        center.set_error_with_code(ERR_OVERTEMP, true, 0).unwrap();
        assert!(center.has_error(ERR_OVERTEMP));
    }

    #[test]
    fn error_code_out_of_range_sentinel() {
        let center = StatusCenter::new();
        assert_eq!(center.error_code(DIAG_MODULE_COUNT), CODE_SENTINEL);
    }

    #[test]
    fn reset_all_zeroes_everything() {
        let center = StatusCenter::new();
        center
            .set_error_with_code(Module::Memory.mask(), true, 2)
            .unwrap();
        center.reset_all();
        let (errors, codes) = center.snapshot_errors();
        assert_eq!(errors, 0);
        assert_eq!(codes, [0; DIAG_MODULE_COUNT]);
    }
}
