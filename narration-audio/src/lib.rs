// Concrete narration collaborators

pub(crate) mod utils;

pub mod elevenlabs;
pub mod espeak;
pub mod player;

pub use elevenlabs::{is_usable_api_key, ElevenLabsClient, ElevenLabsConfig};
pub use espeak::{parse_voice_list, EspeakConfig, EspeakNarrator};
pub use player::{CommandPlayer, PlayerConfig};
