// Narration Core Library
// Speech narration for the survey kiosk: request sequencing, audio cache,
// remote voice with local narrator fallback

pub mod cache;
pub mod event;
pub mod narrator;
pub mod prompts;
pub mod sequencer;
pub mod service;
pub mod state;
pub mod voice;

pub(crate) mod utils;

// Export core types
pub use cache::{AudioCache, AudioHandle};
pub use event::NarrationEvent;
pub use narrator::{
    AudioPlayer, LocalNarrator, LocalUtterance, PlaybackControl, PlaybackHandle, PlaybackOutcome,
    RemoteSynthesizer, StopHandle, Voice,
};
pub use sequencer::{RequestSequencer, RequestToken, Utterance};
pub use service::{NarrationConfig, NarrationService, NarrationServiceBuilder};
pub use state::{AudioSource, NarrationState};
pub use utils::normalize_text;
pub use voice::{select_voice, VoiceSelector};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NarrationError {
    #[error("Remote provider not configured")]
    NotConfigured,

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Remote provider returned status {status}: {detail}")]
    HttpError { status: u16, detail: String },

    #[error("Playback error: {0}")]
    PlaybackError(String),

    #[error("Local narrator unavailable: {0}")]
    NarratorUnavailable(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
pub type Result<T> = std::result::Result<T, NarrationError>;
