//! Narration observability events.
//!
//! Every state change of a request is published on a broadcast channel as a
//! [`NarrationEvent`]. Publishing never blocks; with no subscribers the event
//! is dropped.

use crate::sequencer::{RequestToken, Utterance};
use crate::state::NarrationState;
use crate::utils::now_ms;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize)]
pub struct NarrationEvent {
    pub token: RequestToken,
    pub text: String,
    pub state: NarrationState,
    pub timestamp_ms: i64,
}

/// Tracks the state of one request and publishes every transition.
pub(crate) struct RequestTracker {
    events: broadcast::Sender<NarrationEvent>,
    token: RequestToken,
    text: String,
    state: NarrationState,
}

impl RequestTracker {
    pub(crate) fn begin(
        events: &broadcast::Sender<NarrationEvent>,
        utterance: &Utterance,
        initial: NarrationState,
    ) -> Self {
        debug_assert!(initial.is_initial(), "request cannot start in {initial}");
        let tracker = Self {
            events: events.clone(),
            token: utterance.token,
            text: utterance.text.clone(),
            state: initial,
        };
        tracker.publish();
        tracker
    }

    pub(crate) fn state(&self) -> &NarrationState {
        &self.state
    }

    pub(crate) fn advance(&mut self, next: NarrationState) {
        if !self.state.can_transition_to(&next) {
            warn!(
                target: "narration",
                token = %self.token,
                from = %self.state,
                to = %next,
                "Unexpected narration state transition"
            );
        }
        self.state = next;
        self.publish();
    }

    fn publish(&self) {
        debug!(target: "narration", token = %self.token, state = %self.state, "Narration state");
        let _ = self.events.send(NarrationEvent {
            token: self.token,
            text: self.text.clone(),
            state: self.state.clone(),
            timestamp_ms: now_ms(),
        });
    }
}
