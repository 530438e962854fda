//! Exclusive-session arbitration across transports.
//!
//! Exactly one transport may own command processing at a time. Ownership
//! is a single check-and-set guarded by a mutex; losers are rejected
//! immediately with busy and the host retries. There is no queuing and no
//! fairness.

use std::sync::Mutex;

use speclink_common::TransportId;

/// Outcome of a per-frame arbitration check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionDecision {
    /// The caller owns (or just claimed) the session.
    Granted,
    /// Another transport is engaged; reject with busy.
    Busy,
}

/// The session owner slot shared by every transport.
#[derive(Debug)]
pub struct SessionArbiter {
    owner: Mutex<TransportId>,
}

impl SessionArbiter {
    /// Create an arbiter with no owner.
    pub fn new() -> Self {
        SessionArbiter {
            owner: Mutex::new(TransportId::None),
        }
    }

    /// The transport currently owning the session.
    pub fn current_owner(&self) -> TransportId {
        *self.owner.lock().unwrap()
    }

    /// Try to claim the session for `transport`.
    ///
    /// Succeeds when the session is free or already owned by `transport`.
    pub fn try_acquire(&self, transport: TransportId) -> bool {
        if transport.is_none() {
            return false;
        }
        let mut owner = self.owner.lock().unwrap();
        if owner.is_none() || *owner == transport {
            *owner = transport;
            true
        } else {
            false
        }
    }

    /// Release the session if `transport` owns it.
    pub fn release(&self, transport: TransportId) -> bool {
        let mut owner = self.owner.lock().unwrap();
        if *owner == transport && !transport.is_none() {
            *owner = TransportId::None;
            true
        } else {
            false
        }
    }

    /// Unconditionally clear the owner, returning the previous one.
    ///
    /// Hook for the runner's idle-release policy; the protocol itself
    /// never calls this.
    pub fn force_release(&self) -> TransportId {
        let mut owner = self.owner.lock().unwrap();
        std::mem::replace(&mut *owner, TransportId::None)
    }

    /// Per-frame arbitration for `transport`.
    ///
    /// Grants when the caller already owns the session, claims it when no
    /// one does, and otherwise rejects. A live owner rejects the caller
    /// regardless of relative priority; the claim path only succeeds from
    /// the idle sentinel.
    pub fn arbitrate(&self, transport: TransportId) -> SessionDecision {
        let mut owner = self.owner.lock().unwrap();
        if *owner == transport {
            return SessionDecision::Granted;
        }
        if owner.is_none() {
            *owner = transport;
            return SessionDecision::Granted;
        }
        SessionDecision::Busy
    }
}

impl Default for SessionArbiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn acquire_release_cycle() {
        let arbiter = SessionArbiter::new();
        assert_eq!(arbiter.current_owner(), TransportId::None);

        assert!(arbiter.try_acquire(TransportId::Serial));
        assert_eq!(arbiter.current_owner(), TransportId::Serial);

        // Re-acquire by the owner is fine; another transport is rejected.
        assert!(arbiter.try_acquire(TransportId::Serial));
        assert!(!arbiter.try_acquire(TransportId::Usb));

        // Only the owner can release.
        assert!(!arbiter.release(TransportId::Usb));
        assert!(arbiter.release(TransportId::Serial));
        assert!(arbiter.try_acquire(TransportId::Usb));
    }

    #[test]
    fn sentinel_cannot_own() {
        let arbiter = SessionArbiter::new();
        assert!(!arbiter.try_acquire(TransportId::None));
        assert!(!arbiter.release(TransportId::None));
        assert_eq!(arbiter.current_owner(), TransportId::None);
    }

    #[test]
    fn arbitrate_claims_and_rejects() {
        let arbiter = SessionArbiter::new();
        assert_eq!(
            arbiter.arbitrate(TransportId::Wireless),
            SessionDecision::Granted
        );
        // Lower and higher ranked transports are both rejected while the
        // owner lives.
        assert_eq!(arbiter.arbitrate(TransportId::Serial), SessionDecision::Busy);
        assert_eq!(arbiter.arbitrate(TransportId::Usb), SessionDecision::Busy);
        assert_eq!(
            arbiter.arbitrate(TransportId::Wireless),
            SessionDecision::Granted
        );
    }

    #[test]
    fn concurrent_claims_grant_exactly_one() {
        let arbiter = Arc::new(SessionArbiter::new());
        let a = Arc::clone(&arbiter);
        let b = Arc::clone(&arbiter);

        let ta = std::thread::spawn(move || a.try_acquire(TransportId::Serial));
        let tb = std::thread::spawn(move || b.try_acquire(TransportId::Usb));
        let won_a = ta.join().unwrap();
        let won_b = tb.join().unwrap();

        assert!(won_a ^ won_b, "exactly one claim must win");
        let owner = arbiter.current_owner();
        assert!(owner == TransportId::Serial || owner == TransportId::Usb);
    }

    #[test]
    fn force_release_returns_previous_owner() {
        let arbiter = SessionArbiter::new();
        arbiter.try_acquire(TransportId::Usb);
        assert_eq!(arbiter.force_release(), TransportId::Usb);
        assert_eq!(arbiter.current_owner(), TransportId::None);
    }
}
