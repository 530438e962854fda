//! Speclink device runner.
//!
//! Ties the protocol core, configuration store, and status aggregator
//! together into a running controller: the built-in command registry, one
//! sequential worker thread per transport, a TCP harness that exposes each
//! transport to host tooling, and the idle-session monitor.

pub mod error;
pub mod monitor;
pub mod registry;
pub mod server;
pub mod settings;
pub mod transport;

pub use error::DeviceError;
pub use monitor::{ActivityTracker, IdleMonitor};
pub use registry::{DeviceRegistry, DeviceStore};
pub use server::{serve_transports, TransportEndpoint};
pub use settings::DeviceSettings;
pub use transport::{spawn_transport_worker, TransportChannels};
