use std::fs;
use std::path::{Path, PathBuf};

use narration_audio::{ElevenLabsConfig, EspeakConfig, PlayerConfig};
use narration_core::NarrationConfig;

/// High-level configuration for the survey kiosk
#[derive(Clone, Debug)]
pub struct KioskConfig {
    pub narration: NarrationConfig,
    pub elevenlabs: ElevenLabsConfig,
    pub player: PlayerConfig,
    pub espeak: EspeakConfig,
    /// Narrate on startup; the kiosk's audio toggle can change it later
    pub audio_enabled: bool,
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            narration: NarrationConfig::default(),
            elevenlabs: ElevenLabsConfig::default(),
            player: PlayerConfig::default(),
            espeak: EspeakConfig::default(),
            audio_enabled: std::env::var("KIOSK_AUDIO")
                .map(|v| !matches!(v.as_str(), "0" | "off" | "false"))
                .unwrap_or(true),
        }
    }
}

impl KioskConfig {
    /// Load configuration from a TOML file (path via SURVEY_KIOSK_CONFIG or ./survey_kiosk.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let path =
            std::env::var("SURVEY_KIOSK_CONFIG").unwrap_or_else(|_| "survey_kiosk.toml".into());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Self {
        let default = Self::default();
        if !path.exists() {
            tracing::info!(target: "survey_kiosk", path = %path.display(), "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<KioskToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target: "survey_kiosk", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "survey_kiosk", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }
}

// TOML overlay

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct KioskToml {
    pub audio_enabled: Option<bool>,
    pub narration: Option<NarrationToml>,
    pub elevenlabs: Option<ElevenLabsToml>,
    pub player: Option<PlayerToml>,
    pub espeak: Option<EspeakToml>,
}

impl KioskToml {
    fn overlay(self, mut base: KioskConfig) -> KioskConfig {
        if let Some(x) = self.audio_enabled {
            base.audio_enabled = x;
        }
        if let Some(n) = self.narration {
            n.apply(&mut base.narration);
        }
        if let Some(e) = self.elevenlabs {
            e.apply(&mut base.elevenlabs);
        }
        if let Some(p) = self.player {
            p.apply(&mut base.player);
        }
        if let Some(e) = self.espeak {
            e.apply(&mut base.espeak);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct NarrationToml {
    pub lang: Option<String>,
    pub rate: Option<f32>,
    pub pitch: Option<f32>,
    pub cache_max_entries: Option<usize>,
    pub event_capacity: Option<usize>,
}
impl NarrationToml {
    fn apply(self, n: &mut NarrationConfig) {
        if let Some(x) = self.lang {
            n.lang = x;
        }
        if let Some(x) = self.rate {
            n.rate = x.clamp(0.1, 10.0);
        }
        if let Some(x) = self.pitch {
            n.pitch = x.clamp(0.0, 2.0);
        }
        if let Some(x) = self.cache_max_entries {
            n.cache_max_entries = Some(x);
        }
        if let Some(x) = self.event_capacity {
            n.event_capacity = x.max(1);
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct ElevenLabsToml {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub voice_id: Option<String>,
    pub model_id: Option<String>,
    pub stability: Option<f32>,
    pub similarity_boost: Option<f32>,
    pub style: Option<f32>,
    pub use_speaker_boost: Option<bool>,
    pub timeout_ms: Option<u64>,
}
impl ElevenLabsToml {
    fn apply(self, e: &mut ElevenLabsConfig) {
        if let Some(x) = self.api_key {
            e.api_key = Some(x);
        }
        if let Some(x) = self.base_url {
            e.base_url = x;
        }
        if let Some(x) = self.voice_id {
            e.voice_id = x;
        }
        if let Some(x) = self.model_id {
            e.model_id = x;
        }
        if let Some(x) = self.stability {
            e.stability = x;
        }
        if let Some(x) = self.similarity_boost {
            e.similarity_boost = x;
        }
        if let Some(x) = self.style {
            e.style = x;
        }
        if let Some(x) = self.use_speaker_boost {
            e.use_speaker_boost = x;
        }
        if let Some(x) = self.timeout_ms {
            e.timeout_ms = Some(x);
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct PlayerToml {
    pub preferred: Option<String>,
    pub temp_dir: Option<String>,
}
impl PlayerToml {
    fn apply(self, p: &mut PlayerConfig) {
        if let Some(x) = self.preferred {
            p.preferred = Some(x);
        }
        if let Some(x) = self.temp_dir {
            p.temp_dir = PathBuf::from(x);
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct EspeakToml {
    pub bin: Option<String>,
    pub voice_filter: Option<String>,
    pub base_wpm: Option<f32>,
}
impl EspeakToml {
    fn apply(self, e: &mut EspeakConfig) {
        if let Some(x) = self.bin {
            e.bin = Some(PathBuf::from(x));
        }
        if let Some(x) = self.voice_filter {
            e.voice_filter = x;
        }
        if let Some(x) = self.base_wpm {
            e.base_wpm = x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_replaces_only_given_fields() {
        let toml_src = r#"
            audio_enabled = false

            [narration]
            rate = 1.1
            cache_max_entries = 32

            [elevenlabs]
            voice_id = "voz-clinica"
            timeout_ms = 8000

            [espeak]
            bin = "/opt/espeak-ng/bin/espeak-ng"
        "#;
        let parsed: KioskToml = toml::from_str(toml_src).unwrap();
        let cfg = parsed.overlay(KioskConfig::default());

        assert!(!cfg.audio_enabled);
        assert_eq!(cfg.narration.lang, "pt-BR");
        assert!((cfg.narration.rate - 1.1).abs() < f32::EPSILON);
        assert_eq!(cfg.narration.cache_max_entries, Some(32));
        assert_eq!(cfg.elevenlabs.voice_id, "voz-clinica");
        assert_eq!(cfg.elevenlabs.timeout_ms, Some(8000));
        assert_eq!(cfg.elevenlabs.model_id, "eleven_multilingual_v2");
        assert_eq!(
            cfg.espeak.bin,
            Some(PathBuf::from("/opt/espeak-ng/bin/espeak-ng"))
        );
    }

    #[test]
    fn empty_toml_keeps_defaults() {
        let parsed: KioskToml = toml::from_str("").unwrap();
        let cfg = parsed.overlay(KioskConfig::default());
        assert_eq!(cfg.narration.event_capacity, 64);
        assert_eq!(cfg.narration.cache_max_entries, None);
    }

    #[test]
    fn invalid_toml_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!(
            "survey_kiosk_invalid_{}.toml",
            std::process::id()
        ));
        fs::write(&path, "[narration\nrate = ").unwrap();
        let cfg = KioskConfig::load_from(&path);
        let _ = fs::remove_file(&path);
        assert_eq!(cfg.narration.lang, "pt-BR");
        assert!((cfg.narration.rate - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let cfg = KioskConfig::load_from(Path::new("/definitely/not/survey_kiosk.toml"));
        assert_eq!(cfg.narration.lang, "pt-BR");
    }
}
