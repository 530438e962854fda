//! Per-transport worker threads.
//!
//! Each transport runs as an independent sequential worker: it blocks on
//! its byte channel, deframes the stream, and processes one frame to
//! completion before taking the next. The worker and its bridge (TCP
//! harness or test) each hold one half of a [`TransportChannels`] pair.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, SendError, Sender};
use speclink_common::TransportId;
use speclink_protocol::{CommandPort, CommandRegistry, StreamDeframer, TransportIo};

/// One half of a bidirectional byte-chunk channel pair.
#[derive(Debug, Clone)]
pub struct TransportChannels {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl TransportChannels {
    /// Create a connected pair; data sent on one half arrives on the other.
    pub fn new_pair() -> (TransportChannels, TransportChannels) {
        let (a_tx, a_rx) = unbounded();
        let (b_tx, b_rx) = unbounded();
        (
            TransportChannels { tx: a_tx, rx: b_rx },
            TransportChannels { tx: b_tx, rx: a_rx },
        )
    }

    /// Send a chunk to the peer.
    pub fn send(&self, data: Vec<u8>) -> Result<(), SendError<Vec<u8>>> {
        self.tx.send(data)
    }

    /// Receive the next chunk without blocking.
    pub fn try_recv(&self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }

    /// Receive the next chunk, waiting up to `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Vec<u8>, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Outbound primitive backed by the worker's channel half.
struct ChannelIo<'a> {
    transport: TransportId,
    channels: &'a TransportChannels,
}

impl TransportIo for ChannelIo<'_> {
    fn write(&mut self, bytes: &[u8]) -> usize {
        if self.channels.send(bytes.to_vec()).is_err() {
            log::warn!("{}: peer gone, dropping {} bytes", self.transport, bytes.len());
            return 0;
        }
        bytes.len()
    }

    fn flush(&mut self) {
        // Channel delivery is immediate; nothing to kick.
    }
}

/// Spawn the sequential worker for one transport.
///
/// The worker exits when `shutdown` is set or the peer half of the
/// channel is dropped.
pub fn spawn_transport_worker<R>(
    transport: TransportId,
    port: Arc<CommandPort<R>>,
    channels: TransportChannels,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()>
where
    R: CommandRegistry + 'static,
{
    thread::spawn(move || {
        let mut deframer = StreamDeframer::new();
        tracing::debug!(%transport, "transport worker started");

        while !shutdown.load(Ordering::Relaxed) {
            let chunk = match channels.recv_timeout(Duration::from_millis(100)) {
                Ok(chunk) => chunk,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            deframer.push(&chunk);
            while let Some(raw) = deframer.next_frame() {
                tracing::trace!(%transport, frame = %hex::encode(&raw), "frame in");
                metrics::counter!("speclink_frames_total", "transport" => transport.as_str())
                    .increment(1);
                let mut io = ChannelIo {
                    transport,
                    channels: &channels,
                };
                port.on_frame_received(transport, &raw, &mut io);
            }
        }

        tracing::debug!(%transport, "transport worker stopped");
    })
}
