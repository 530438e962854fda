//! Runner error types.

use thiserror::Error;

/// Errors surfaced by the device runner.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Settings file could not be parsed.
    #[error("settings error: {0}")]
    Settings(#[from] serde_yaml::Error),

    /// Filesystem or socket failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration store failure.
    #[error("store error: {0}")]
    Store(#[from] speclink_store::StoreError),

    /// Non-volatile medium failure.
    #[error("medium error: {0}")]
    Medium(#[from] speclink_store::MediumError),

    /// Inspection dump could not be serialized.
    #[error("serialize error: {0}")]
    Json(#[from] serde_json::Error),

    /// Signal handler installation failed.
    #[error("signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),
}
