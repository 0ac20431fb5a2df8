//! Request sequencing for supersession.
//!
//! Every `speak` call takes a fresh [`RequestToken`] from the
//! [`RequestSequencer`]. Asynchronous work carries its token and checks
//! [`RequestSequencer::is_current`] before committing any observable side
//! effect; a newer call (or an explicit cancel) makes older tokens stale.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic generation number identifying one narration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Issues strictly increasing request tokens and tracks the latest one.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: AtomicU64,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a new request; it becomes the latest and supersedes all others.
    pub fn next(&self) -> RequestToken {
        RequestToken(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Advance the generation without issuing a token, so every outstanding
    /// request becomes stale.
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        self.latest.load(Ordering::SeqCst) == token.0
    }
}

/// One accepted narration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    pub token: RequestToken,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_strictly_increase_and_start_above_zero() {
        let seq = RequestSequencer::new();
        let a = seq.next();
        let b = seq.next();
        assert!(a.get() > 0);
        assert!(b > a);
    }

    #[test]
    fn only_latest_is_current() {
        let seq = RequestSequencer::new();
        let a = seq.next();
        assert!(seq.is_current(a));
        let b = seq.next();
        assert!(!seq.is_current(a));
        assert!(seq.is_current(b));
    }

    #[test]
    fn invalidate_makes_every_token_stale() {
        let seq = RequestSequencer::new();
        let a = seq.next();
        seq.invalidate();
        assert!(!seq.is_current(a));
        let b = seq.next();
        assert!(seq.is_current(b));
        assert_eq!(b.get(), a.get() + 2);
    }
}
