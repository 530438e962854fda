//! TCP transport harness.
//!
//! Each enabled transport is exposed on its own TCP port so host tooling
//! can speak the framed protocol over a socket during development and
//! production test. One client at a time per transport; bytes are bridged
//! verbatim between the socket and the transport worker's channel pair.
//! When a client disconnects, any session its transport still owns is
//! released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use speclink_common::TransportId;
use speclink_protocol::SessionArbiter;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::transport::TransportChannels;

/// Where one transport is reachable.
#[derive(Debug, Clone)]
pub struct TransportEndpoint {
    /// The transport bridged on this port.
    pub transport: TransportId,
    /// TCP port of the listener.
    pub port: u16,
}

/// Serve every transport bridge until `shutdown` is set.
///
/// `endpoints` pairs each transport with the harness half of its channel
/// pair; the worker half lives in the transport worker thread.
pub async fn serve_transports(
    endpoints: Vec<(TransportEndpoint, TransportChannels)>,
    session: Arc<SessionArbiter>,
    shutdown: Arc<AtomicBool>,
) -> std::io::Result<()> {
    let mut tasks = Vec::new();
    for (endpoint, channels) in endpoints {
        let listener = TcpListener::bind(("127.0.0.1", endpoint.port)).await?;
        tracing::info!(
            transport = %endpoint.transport,
            port = endpoint.port,
            "transport listening"
        );
        tasks.push(tokio::spawn(accept_loop(
            endpoint,
            listener,
            channels,
            Arc::clone(&session),
            Arc::clone(&shutdown),
        )));
    }

    // Park until shutdown, then let the tasks wind down.
    while !shutdown.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    for task in tasks {
        task.abort();
    }
    Ok(())
}

/// Accept clients for one transport, one at a time.
async fn accept_loop(
    endpoint: TransportEndpoint,
    listener: TcpListener,
    channels: TransportChannels,
    session: Arc<SessionArbiter>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::warn!(transport = %endpoint.transport, "accept failed: {}", err);
                continue;
            }
        };
        tracing::info!(transport = %endpoint.transport, %peer, "client connected");
        metrics::counter!(
            "speclink_client_connects_total",
            "transport" => endpoint.transport.as_str()
        )
        .increment(1);

        bridge_client(stream, &channels, &shutdown).await;

        // A vanished client must not pin the session forever.
        if session.release(endpoint.transport) {
            tracing::info!(
                transport = %endpoint.transport,
                "session released on disconnect"
            );
        }
        tracing::info!(transport = %endpoint.transport, "client disconnected");
    }
}

/// Bridge one client's socket to the worker channels until it hangs up.
async fn bridge_client(
    stream: TcpStream,
    channels: &TransportChannels,
    shutdown: &Arc<AtomicBool>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut read_buf = [0u8; 1024];
    let mut poll = tokio::time::interval(Duration::from_millis(10));

    loop {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        tokio::select! {
            read = reader.read(&mut read_buf) => {
                match read {
                    Ok(0) => return,
                    Ok(n) => {
                        if channels.send(read_buf[..n].to_vec()).is_err() {
                            return;
                        }
                    }
                    Err(_) => return,
                }
            }
            _ = poll.tick() => {
                while let Some(data) = channels.try_recv() {
                    if writer.write_all(&data).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}
