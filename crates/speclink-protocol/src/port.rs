//! The command port: per-frame validation, arbitration, and dispatch.
//!
//! One [`CommandPort`] is shared by every transport worker. A worker hands
//! it a raw frame plus its transport id and outbound primitive; the port
//! validates the frame, checks session ownership, runs the registry
//! handler over a marshaling channel, and finalizes the response frame
//! over exactly the bytes the handler produced.

use std::sync::Arc;

use speclink_common::{Module, TransportId};
use speclink_status::StatusCenter;

use crate::channel::{FrameSink, MarshalChannel};
use crate::constants::*;
use crate::frame::{encode_frame, validate_frame};
use crate::registry::{ActivityMonitor, CommandRegistry, DispatchOutcome, OpCode, TransportIo};
use crate::session::{SessionArbiter, SessionDecision};

/// Sink that finalizes and transmits response frames during a dispatch.
struct IoFrameSink<'a> {
    io: &'a mut dyn TransportIo,
}

impl FrameSink for IoFrameSink<'_> {
    fn emit(&mut self, flags: u8, body: &[u8]) {
        let frame = encode_frame(flags, body);
        let wrote = self.io.write(&frame);
        if wrote < frame.len() {
            log::warn!("short transport write: {} of {} bytes", wrote, frame.len());
        }
        // Payload beyond the command id means the host is waiting on data.
        if body.len() > 1 {
            self.io.flush();
        }
    }
}

/// Transport-shared entry point of the command plane.
pub struct CommandPort<R: CommandRegistry> {
    session: Arc<SessionArbiter>,
    status: Arc<StatusCenter>,
    activity: Arc<dyn ActivityMonitor>,
    registry: R,
}

impl<R: CommandRegistry> CommandPort<R> {
    /// Build a port over the shared session, status, and registry.
    pub fn new(
        session: Arc<SessionArbiter>,
        status: Arc<StatusCenter>,
        activity: Arc<dyn ActivityMonitor>,
        registry: R,
    ) -> Self {
        CommandPort {
            session,
            status,
            activity,
            registry,
        }
    }

    /// The session arbiter this port arbitrates against.
    pub fn session(&self) -> &Arc<SessionArbiter> {
        &self.session
    }

    /// The registry this port dispatches into.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Process one raw inbound frame from `transport`.
    ///
    /// Every path produces exactly one response frame on `io` (the forced
    /// mid-dispatch flush of an overflowing handler may add more).
    pub fn on_frame_received(
        &self,
        transport: TransportId,
        raw: &[u8],
        io: &mut dyn TransportIo,
    ) {
        // (1) Integrity first: a frame that fails validation is answered
        // with a synthesized error and counted against the serial link,
        // without consulting the registry.
        let view = match validate_frame(raw) {
            Ok(view) => view,
            Err(err) => {
                log::warn!("{}: rejected frame: {}", transport, err);
                let _ = self.status.set_error_with_code(
                    Module::SerialLink.mask(),
                    true,
                    DIAG_BAD_CHECKSUM,
                );
                self.send_empty(io, 0, RC_ERR);
                return;
            }
        };

        let echo_flags = view.flags & (FLAG_DIRECTION_MASK | FLAG_REPLY_REQUESTED);

        // (2) Direction decides which handler table is addressed.
        let op = match view.direction() {
            DIR_REQUEST => OpCode::Write,
            DIR_POLL => OpCode::Read,
            other => {
                log::warn!("{}: unrecognized direction {:#04x}", transport, other);
                self.send_empty(io, echo_flags, RC_ERR);
                return;
            }
        };
        let Some(command) = view.command_id() else {
            log::warn!("{}: frame without command id", transport);
            self.send_empty(io, echo_flags, RC_ERR);
            return;
        };

        // (3) Session arbitration before any handler runs.
        if self.session.arbitrate(transport) == SessionDecision::Busy {
            log::debug!(
                "{}: busy, session owned by {}",
                transport,
                self.session.current_owner()
            );
            self.send_empty(io, echo_flags, RC_BUSY);
            return;
        }

        // (4) Dispatch over a marshaling channel sharing the frame body.
        let mut body = [0u8; MAX_BODY];
        body[..view.body.len()].copy_from_slice(view.body);
        let declared_len = view.body.len();

        let (outcome, produced) = {
            let mut sink = IoFrameSink { io: &mut *io };
            let mut channel = MarshalChannel::new(&mut body, declared_len, echo_flags, &mut sink);
            let outcome = self.registry.dispatch(op, command, &mut channel);
            (outcome, channel.bytes_written())
        };

        let rc = match outcome {
            DispatchOutcome::Ok => {
                self.activity.notify_activity(transport);
                RC_OK
            }
            DispatchOutcome::Busy => RC_BUSY,
            DispatchOutcome::Error => RC_ERR,
        };

        // (5) Finalize over the bytes the handler actually produced.
        let flags = echo_flags | (rc << FLAG_RESPONSE_SHIFT);
        let frame = encode_frame(flags, &body[..1 + produced]);
        let wrote = io.write(&frame);
        if wrote < frame.len() {
            log::warn!("short transport write: {} of {} bytes", wrote, frame.len());
        }
        if produced > 0 {
            io.flush();
        }
    }

    /// Synthesize a body-less response with the given response code.
    fn send_empty(&self, io: &mut dyn TransportIo, echo_flags: u8, rc: u8) {
        let frame = encode_frame(echo_flags | (rc << FLAG_RESPONSE_SHIFT), &[]);
        io.write(&frame);
    }
}
