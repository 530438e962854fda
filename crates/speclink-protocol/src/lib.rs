//! Speclink Command Protocol
//!
//! This crate implements the transport-agnostic half of the controller's
//! command plane: the framed wire codec shared by the serial, wireless,
//! and USB links, the pull/push marshaling channel command handlers use,
//! and the exclusive-session arbiter that lets exactly one transport own
//! command processing at a time.
//!
//! # Protocol Overview
//!
//! Every transport delivers the same frame shape:
//!
//! - **Requests** (host → device): direction bits = request, routed to a
//!   handler's write op.
//! - **Polls** (host → device): direction bits = poll, routed to a
//!   handler's read op.
//! - **Responses** (device → host): the inbound frame echoed back with a
//!   response code and whatever body the handler produced.
//!
//! The codec validates checksum and framing, arbitrates the session, and
//! dispatches into an external [`CommandRegistry`]; handlers never see
//! transport-specific state.
//!
//! # Example
//!
//! ```rust,ignore
//! use speclink_protocol::{CommandPort, encode_frame, DIR_POLL, CMD_DEVICE_STATUS};
//!
//! let frame = encode_frame(DIR_POLL, &[CMD_DEVICE_STATUS]);
//! port.on_frame_received(TransportId::Serial, &frame, &mut io);
//! ```

mod channel;
mod constants;
mod error;
mod frame;
mod port;
mod registry;
mod session;

pub use channel::*;
pub use constants::*;
pub use error::*;
pub use frame::*;
pub use port::*;
pub use registry::*;
pub use session::*;
