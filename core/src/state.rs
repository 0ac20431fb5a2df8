//! Per-request narration state machine.
//!
//! ```text
//! RemoteAttempting -> RemoteSucceeded -> Playing(Remote) -> PlayedToCompletion
//!        |                  |                  |
//!        +-------> RemoteFailed <--------------+
//!                       |
//!                  LocalFallback -> Playing(Local) -> PlayedToCompletion
//! ```
//!
//! `Cancelled` and `Superseded` are reachable from every non-terminal state.
//! `NoOp` ends a request when no narrator capability exists or the local
//! narrator fails mid-utterance.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioSource {
    Remote,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NarrationState {
    RemoteAttempting,
    RemoteSucceeded { cached: bool },
    RemoteFailed { reason: String },
    LocalFallback,
    Playing { source: AudioSource },
    PlayedToCompletion,
    Cancelled,
    /// A newer request arrived before this one committed any playback.
    Superseded,
    /// No narrator capability was available, or the local narrator failed.
    NoOp,
}

impl NarrationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NarrationState::PlayedToCompletion
                | NarrationState::Cancelled
                | NarrationState::Superseded
                | NarrationState::NoOp
        )
    }

    /// Whether a request may start in this state.
    pub fn is_initial(&self) -> bool {
        matches!(
            self,
            NarrationState::RemoteAttempting | NarrationState::LocalFallback
        )
    }

    pub fn can_transition_to(&self, next: &NarrationState) -> bool {
        use NarrationState::*;

        if self.is_terminal() {
            return false;
        }
        if matches!(next, Cancelled | Superseded) {
            return true;
        }
        match (self, next) {
            (RemoteAttempting, RemoteSucceeded { .. }) => true,
            (RemoteAttempting, RemoteFailed { .. }) => true,
            (RemoteSucceeded { .. }, Playing { source: AudioSource::Remote }) => true,
            (RemoteSucceeded { .. }, RemoteFailed { .. }) => true,
            (Playing { source: AudioSource::Remote }, PlayedToCompletion) => true,
            (Playing { source: AudioSource::Remote }, RemoteFailed { .. }) => true,
            (RemoteFailed { .. }, LocalFallback) => true,
            (RemoteFailed { .. }, NoOp) => true,
            (LocalFallback, Playing { source: AudioSource::Local }) => true,
            (LocalFallback, NoOp) => true,
            (Playing { source: AudioSource::Local }, PlayedToCompletion) => true,
            (Playing { source: AudioSource::Local }, NoOp) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NarrationState::RemoteAttempting => "remote_attempting",
            NarrationState::RemoteSucceeded { .. } => "remote_succeeded",
            NarrationState::RemoteFailed { .. } => "remote_failed",
            NarrationState::LocalFallback => "local_fallback",
            NarrationState::Playing { .. } => "playing",
            NarrationState::PlayedToCompletion => "played_to_completion",
            NarrationState::Cancelled => "cancelled",
            NarrationState::Superseded => "superseded",
            NarrationState::NoOp => "no_op",
        }
    }
}

impl fmt::Display for NarrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
