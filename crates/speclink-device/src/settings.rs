//! Runner settings.
//!
//! Loaded from a YAML file; every field has a bring-up default so a bare
//! `speclink run` works against a fresh storage file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use speclink_common::TransportId;

use crate::error::DeviceError;

/// Settings for the device runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Backing file for the non-volatile region.
    pub storage_path: PathBuf,
    /// First TCP port of the transport harness; each enabled transport
    /// gets `base_port + transport id - 1`.
    pub base_port: u16,
    /// Serial number stamped into saved records.
    pub serial_number: String,
    /// Model name reported by the device query.
    pub model_name: String,
    /// Seconds of link silence before an owned session is force-released.
    pub idle_timeout_secs: u64,
    /// Transports to expose.
    pub transports: Vec<TransportId>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        DeviceSettings {
            storage_path: PathBuf::from("speclink-nvm.bin"),
            base_port: 7340,
            serial_number: "SL-0000".to_string(),
            model_name: "SPECLINK-ONE".to_string(),
            idle_timeout_secs: 30,
            transports: vec![
                TransportId::Serial,
                TransportId::Wireless,
                TransportId::Usb,
            ],
        }
    }
}

impl DeviceSettings {
    /// Load settings from a YAML file.
    pub fn load(path: &Path) -> Result<Self, DeviceError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// TCP port assigned to `transport`.
    pub fn port_for(&self, transport: TransportId) -> u16 {
        self.base_port + transport as u16 - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_all_transports() {
        let settings = DeviceSettings::default();
        assert_eq!(settings.transports.len(), 3);
        assert_eq!(settings.port_for(TransportId::Serial), settings.base_port);
        assert_eq!(
            settings.port_for(TransportId::Usb),
            settings.base_port + 2
        );
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let settings: DeviceSettings =
            serde_yaml::from_str("base_port: 9000\ntransports: [serial]\n").unwrap();
        assert_eq!(settings.base_port, 9000);
        assert_eq!(settings.transports, vec![TransportId::Serial]);
        assert_eq!(settings.idle_timeout_secs, 30);
    }
}
