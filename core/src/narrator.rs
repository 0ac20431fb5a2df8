//! Collaborator seams of the narration service.
//!
//! - [`RemoteSynthesizer`]: turns text into playable audio over the network
//! - [`AudioPlayer`]: plays an [`AudioHandle`] and reports how playback ended
//! - [`LocalNarrator`]: the host platform's built-in speech engine
//!
//! The service owns one instance of each and never touches ambient globals.

use crate::cache::AudioHandle;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteSynthesizer: Send + Sync {
    /// False when the credential is absent or obviously invalid; the service
    /// then skips the network entirely.
    fn is_configured(&self) -> bool;

    async fn synthesize(&self, text: &str) -> Result<AudioHandle>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Begin playback. An error here means playback never started.
    async fn start(&self, audio: &AudioHandle) -> Result<PlaybackHandle>;
}

#[cfg_attr(test, mockall::automock)]
pub trait LocalNarrator: Send + Sync {
    fn voices(&self) -> Vec<Voice>;

    /// Submit an utterance for immediate speech. Returns once submitted; the
    /// handle reports when the narrator finishes or is stopped.
    fn speak(&self, utterance: LocalUtterance) -> Result<PlaybackHandle>;

    /// Cancel active and pending speech. No-op when idle.
    fn cancel(&self);

    /// Notifications fired when the available voice list changes.
    fn voice_changes(&self) -> Option<broadcast::Receiver<()>>;
}

/// A voice offered by the local narrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    pub lang: String,
    #[serde(default)]
    pub default: bool,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
            default: false,
        }
    }
}

/// Utterance submitted to the local narrator.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalUtterance {
    pub text: String,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
    pub voice: Option<Voice>,
}

/// How a remote playback or local narration ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished,
    Stopped,
    Failed(String),
}

/// Returned by [`AudioPlayer::start`] and [`LocalNarrator::speak`]: a stop
/// switch plus the eventual outcome.
#[derive(Debug)]
pub struct PlaybackHandle {
    stop: StopHandle,
    outcome: oneshot::Receiver<PlaybackOutcome>,
}

impl PlaybackHandle {
    /// Create a handle for the service and the matching control for the player.
    pub fn channel() -> (PlaybackHandle, PlaybackControl) {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        (
            PlaybackHandle {
                stop: StopHandle { tx: stop_tx },
                outcome: outcome_rx,
            },
            PlaybackControl {
                stop_rx,
                stopped: false,
                outcome_tx,
            },
        )
    }

    pub fn into_parts(self) -> (StopHandle, oneshot::Receiver<PlaybackOutcome>) {
        (self.stop, self.outcome)
    }
}

/// Stops a playback. Dropping the handle stops it too, so a released
/// playback can never be resumed.
#[derive(Debug)]
pub struct StopHandle {
    tx: oneshot::Sender<()>,
}

impl StopHandle {
    pub fn stop(self) {
        let _ = self.tx.send(());
    }
}

/// Player side of a [`PlaybackHandle`].
#[derive(Debug)]
pub struct PlaybackControl {
    stop_rx: oneshot::Receiver<()>,
    stopped: bool,
    outcome_tx: oneshot::Sender<PlaybackOutcome>,
}

impl PlaybackControl {
    /// Resolves once the service stops or releases the playback.
    pub async fn stopped(&mut self) {
        if !self.stopped {
            let _ = (&mut self.stop_rx).await;
            self.stopped = true;
        }
    }

    pub fn is_stopped(&mut self) -> bool {
        if !self.stopped {
            self.stopped = !matches!(
                self.stop_rx.try_recv(),
                Err(oneshot::error::TryRecvError::Empty)
            );
        }
        self.stopped
    }

    pub fn finish(self, outcome: PlaybackOutcome) {
        let _ = self.outcome_tx.send(outcome);
    }
}
