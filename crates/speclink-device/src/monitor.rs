//! Link activity tracking and idle-session release.
//!
//! The protocol core reports successful dispatches to an
//! [`ActivityTracker`]; a background monitor thread watches the session
//! owner and force-releases it once the link has been idle longer than the
//! configured window. The exact window belongs to the runner's settings,
//! not the protocol.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use speclink_common::TransportId;
use speclink_protocol::{ActivityMonitor, SessionArbiter};

/// Records the instant of the most recent successful dispatch.
#[derive(Debug)]
pub struct ActivityTracker {
    last_activity: Mutex<Instant>,
}

impl ActivityTracker {
    /// Create a tracker that counts "now" as the last activity.
    pub fn new() -> Self {
        ActivityTracker {
            last_activity: Mutex::new(Instant::now()),
        }
    }

    /// Time since the last successful dispatch.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityMonitor for ActivityTracker {
    fn notify_activity(&self, transport: TransportId) {
        tracing::trace!(%transport, "link activity");
        *self.last_activity.lock() = Instant::now();
    }
}

/// Background thread that releases a session abandoned by its owner.
pub struct IdleMonitor {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl IdleMonitor {
    /// Start monitoring `session` against `tracker` with the given window.
    pub fn start(
        session: Arc<SessionArbiter>,
        tracker: Arc<ActivityTracker>,
        timeout: Duration,
    ) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_flag);
        let check_interval = Duration::from_millis(250);

        let handle = thread::spawn(move || {
            while !thread_stop.load(Ordering::Relaxed) {
                thread::sleep(check_interval);

                if session.current_owner().is_none() {
                    continue;
                }
                if tracker.idle_for() >= timeout {
                    let released = session.force_release();
                    tracing::info!(
                        transport = %released,
                        idle_secs = timeout.as_secs(),
                        "idle session force-released"
                    );
                    metrics::counter!("speclink_session_idle_releases_total").increment(1);
                }
            }
        });

        IdleMonitor {
            stop_flag,
            handle: Some(handle),
        }
    }

    /// Stop the monitor thread and wait for it to finish.
    pub fn stop(mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for IdleMonitor {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        // Don't join in drop; the thread terminates on its own.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_owner_is_force_released() {
        let session = Arc::new(SessionArbiter::new());
        let tracker = Arc::new(ActivityTracker::new());
        session.try_acquire(TransportId::Usb);

        let monitor = IdleMonitor::start(
            Arc::clone(&session),
            Arc::clone(&tracker),
            Duration::from_millis(50),
        );

        // Give the monitor a couple of check intervals to fire.
        let deadline = Instant::now() + Duration::from_secs(3);
        while session.current_owner() != TransportId::None && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(25));
        }
        monitor.stop();

        assert_eq!(session.current_owner(), TransportId::None);
    }

    #[test]
    fn activity_defers_release() {
        let session = Arc::new(SessionArbiter::new());
        let tracker = Arc::new(ActivityTracker::new());
        session.try_acquire(TransportId::Serial);

        let monitor = IdleMonitor::start(
            Arc::clone(&session),
            Arc::clone(&tracker),
            Duration::from_secs(3600),
        );

        tracker.notify_activity(TransportId::Serial);
        thread::sleep(Duration::from_millis(300));
        assert_eq!(session.current_owner(), TransportId::Serial);
        monitor.stop();
    }
}
