//! Built-in command registry.
//!
//! Every handler works exclusively through the marshaling channel plus the
//! shared store and status services; none of them know which transport a
//! command arrived on. Handlers that touch the store serialize on one
//! mutex so a concurrent poll can never observe a half-written save.

use std::sync::Arc;

use parking_lot::Mutex;
use speclink_common::{
    ModelName, Module, SerialTag, MODEL_NAME_LEN, PROTOCOL_VERSION, SCAN_NAME_LEN, SERIAL_TAG_LEN,
};
use speclink_protocol::{
    CommandRegistry, DispatchOutcome, MarshalChannel, OpCode, ProtocolError, CMD_ACTIVE_CONFIG,
    CMD_CALIBRATION, CMD_CONFIG_COUNT, CMD_CONFIG_ID_LOOKUP, CMD_CONFIG_RECORD, CMD_DEVICE_QUERY,
    CMD_DEVICE_STATUS, CMD_ERASE_ALL, CMD_ERROR_CODE, CMD_ERROR_STATUS, CMD_MODEL_NAME,
    CMD_REFERENCE_SCAN, CMD_SCAN_NAME, CMD_SERIAL_NUMBER,
};
use speclink_status::{StatusCenter, StatusError};
use speclink_store::{
    decode_record, encode_record, ConfigStore, NvmMedium, StoreError, CALIBRATION_COEFF_COUNT,
    REFERENCE_SNAPSHOT_LEN,
};

/// Diagnostic code recorded against the nv-store module on medium failures.
pub const DIAG_NVM_IO: i16 = -5;

/// The store type the runner shares between handlers and the CLI.
pub type DeviceStore = ConfigStore<Box<dyn NvmMedium>>;

/// Handler-internal error, folded into a dispatch outcome at the edge.
#[derive(Debug)]
enum HandlerError {
    Protocol(ProtocolError),
    Store(StoreError),
    Status(StatusError),
}

impl From<ProtocolError> for HandlerError {
    fn from(err: ProtocolError) -> Self {
        HandlerError::Protocol(err)
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        HandlerError::Store(err)
    }
}

impl From<StatusError> for HandlerError {
    fn from(err: StatusError) -> Self {
        HandlerError::Status(err)
    }
}

type HandlerResult = Result<(), HandlerError>;

/// Built-in registry serving the device's command set.
pub struct DeviceRegistry {
    store: Arc<Mutex<DeviceStore>>,
    status: Arc<StatusCenter>,
}

impl DeviceRegistry {
    /// Build a registry over the shared store and status services.
    pub fn new(store: Arc<Mutex<DeviceStore>>, status: Arc<StatusCenter>) -> Self {
        DeviceRegistry { store, status }
    }

    // ------------------------------------------------------------------
    // Device identity and status
    // ------------------------------------------------------------------

    fn device_query(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let host_version = chan.pull_u8()?;
        log::debug!("device query from host protocol v{}", host_version);

        let mut store = self.store.lock();
        let serial = store.serial_number()?;
        let model = store.model_name()?;
        chan.push_u8(PROTOCOL_VERSION)?;
        chan.push(serial.as_bytes())?;
        chan.push(model.as_bytes())?;
        Ok(())
    }

    fn read_device_status(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        chan.push_u32(self.status.snapshot_device_status())?;
        Ok(())
    }

    fn write_device_status(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let mask = chan.pull_u32()?;
        let engaged = chan.pull_u8()? != 0;
        self.status.set_device_status(mask, engaged)?;
        Ok(())
    }

    fn read_error_status(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let (errors, codes) = self.status.snapshot_errors();
        chan.push_u32(errors)?;
        for code in codes {
            chan.push_i16(code)?;
        }
        Ok(())
    }

    fn clear_error_status(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let mask = chan.pull_u32()?;
        self.status.clear_errors(mask)?;
        Ok(())
    }

    fn read_error_code(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let ordinal = chan.pull_u8()?;
        chan.push_i16(self.status.error_code(ordinal as usize))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Configuration catalog
    // ------------------------------------------------------------------

    fn read_config_count(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let mut store = self.store.lock();
        let count = store.record_count()?;
        let active = store.active_index()?;
        chan.push_u8(count)?;
        chan.push_u16(active)?;
        Ok(())
    }

    fn read_config_record(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let slot = chan.pull_u8()?;
        let record = self.store.lock().get(slot)?;
        let bytes = encode_record(&record);
        chan.push_u16(bytes.len() as u16)?;
        chan.push(&bytes)?;
        Ok(())
    }

    fn write_config_record(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let slot = chan.pull_u8()?;
        let len = chan.pull_u16()? as usize;
        let bytes = chan.pull_vec(len)?;
        let record = decode_record(&bytes)?;
        let config_index = self.store.lock().save(slot, &record)?;
        chan.push_u32(config_index)?;
        Ok(())
    }

    fn erase_all(&self, _chan: &mut MarshalChannel<'_>) -> HandlerResult {
        self.store.lock().erase_all()?;
        Ok(())
    }

    fn read_active_config(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        chan.push_u16(self.store.lock().active_index()?)?;
        Ok(())
    }

    fn write_active_config(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let active = chan.pull_u16()?;
        self.store.lock().set_active_index(active)?;
        Ok(())
    }

    fn lookup_config_id(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let config_id = chan.pull_u32()?;
        let mut store = self.store.lock();
        store.refresh_id_cache()?;
        chan.push_u8(store.index_of_config_id(config_id))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Identity and calibration records
    // ------------------------------------------------------------------

    fn read_serial_number(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let tag = self.store.lock().serial_number()?;
        chan.push(tag.as_bytes())?;
        Ok(())
    }

    fn write_serial_number(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let mut buf = [0u8; SERIAL_TAG_LEN];
        chan.pull(&mut buf)?;
        self.store.lock().set_serial_number(&SerialTag(buf))?;
        Ok(())
    }

    fn read_model_name(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let name = self.store.lock().model_name()?;
        chan.push(name.as_bytes())?;
        Ok(())
    }

    fn write_model_name(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let mut buf = [0u8; MODEL_NAME_LEN];
        chan.pull(&mut buf)?;
        self.store.lock().set_model_name(&ModelName(buf))?;
        Ok(())
    }

    fn read_calibration(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let (version, coeffs) = self.store.lock().calibration()?;
        chan.push_u32(version)?;
        for coeff in coeffs {
            chan.push_f32(coeff)?;
        }
        Ok(())
    }

    fn write_calibration(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let mut coeffs = [0f32; CALIBRATION_COEFF_COUNT];
        for coeff in coeffs.iter_mut() {
            *coeff = chan.pull_f32()?;
        }
        self.store.lock().set_calibration(&coeffs)?;
        Ok(())
    }

    fn read_reference_scan(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let (version, snapshot) = self.store.lock().reference_scan()?;
        chan.push_u32(version)?;
        chan.push(&snapshot)?;
        Ok(())
    }

    fn write_reference_scan(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let mut snapshot = [0u8; REFERENCE_SNAPSHOT_LEN];
        chan.pull(&mut snapshot)?;
        self.store.lock().set_reference_scan(&snapshot)?;
        Ok(())
    }

    fn read_scan_name(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let name = self.store.lock().scan_name()?;
        let mut buf = [b' '; SCAN_NAME_LEN];
        for (dst, src) in buf.iter_mut().zip(name.bytes()) {
            *dst = src;
        }
        chan.push(&buf)?;
        Ok(())
    }

    fn write_scan_name(&self, chan: &mut MarshalChannel<'_>) -> HandlerResult {
        let mut buf = [0u8; SCAN_NAME_LEN];
        chan.pull(&mut buf)?;
        let name = String::from_utf8_lossy(&buf).trim_end().to_string();
        self.store.lock().set_scan_name(&name)?;
        Ok(())
    }
}

impl CommandRegistry for DeviceRegistry {
    fn dispatch(
        &self,
        op: OpCode,
        command: u8,
        channel: &mut MarshalChannel<'_>,
    ) -> DispatchOutcome {
        let result = match (op, command) {
            (OpCode::Read, CMD_DEVICE_QUERY) => self.device_query(channel),
            (OpCode::Read, CMD_DEVICE_STATUS) => self.read_device_status(channel),
            (OpCode::Write, CMD_DEVICE_STATUS) => self.write_device_status(channel),
            (OpCode::Read, CMD_ERROR_STATUS) => self.read_error_status(channel),
            (OpCode::Write, CMD_ERROR_STATUS) => self.clear_error_status(channel),
            (OpCode::Read, CMD_ERROR_CODE) => self.read_error_code(channel),
            (OpCode::Read, CMD_CONFIG_COUNT) => self.read_config_count(channel),
            (OpCode::Read, CMD_CONFIG_RECORD) => self.read_config_record(channel),
            (OpCode::Write, CMD_CONFIG_RECORD) => self.write_config_record(channel),
            (OpCode::Write, CMD_ERASE_ALL) => self.erase_all(channel),
            (OpCode::Read, CMD_ACTIVE_CONFIG) => self.read_active_config(channel),
            (OpCode::Write, CMD_ACTIVE_CONFIG) => self.write_active_config(channel),
            (OpCode::Read, CMD_CONFIG_ID_LOOKUP) => self.lookup_config_id(channel),
            (OpCode::Read, CMD_SERIAL_NUMBER) => self.read_serial_number(channel),
            (OpCode::Write, CMD_SERIAL_NUMBER) => self.write_serial_number(channel),
            (OpCode::Read, CMD_MODEL_NAME) => self.read_model_name(channel),
            (OpCode::Write, CMD_MODEL_NAME) => self.write_model_name(channel),
            (OpCode::Read, CMD_CALIBRATION) => self.read_calibration(channel),
            (OpCode::Write, CMD_CALIBRATION) => self.write_calibration(channel),
            (OpCode::Read, CMD_REFERENCE_SCAN) => self.read_reference_scan(channel),
            (OpCode::Write, CMD_REFERENCE_SCAN) => self.write_reference_scan(channel),
            (OpCode::Read, CMD_SCAN_NAME) => self.read_scan_name(channel),
            (OpCode::Write, CMD_SCAN_NAME) => self.write_scan_name(channel),
            _ => {
                log::warn!("unsupported command 0x{:02X} ({:?})", command, op);
                return DispatchOutcome::Error;
            }
        };

        match result {
            Ok(()) => DispatchOutcome::Ok,
            Err(HandlerError::Store(err)) => {
                log::warn!("command 0x{:02X} store failure: {}", command, err);
                if let StoreError::Medium(_) = err {
                    let _ = self.status.set_error_with_code(
                        Module::NvStore.mask(),
                        true,
                        DIAG_NVM_IO,
                    );
                }
                DispatchOutcome::Error
            }
            Err(HandlerError::Protocol(err)) => {
                log::warn!("command 0x{:02X} marshal failure: {}", command, err);
                DispatchOutcome::Error
            }
            Err(HandlerError::Status(err)) => {
                log::warn!("command 0x{:02X} status failure: {}", command, err);
                DispatchOutcome::Error
            }
        }
    }
}
