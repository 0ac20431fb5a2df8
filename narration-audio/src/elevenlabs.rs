/// Remote voice synthesis over the ElevenLabs text-to-speech API
///
/// `POST {base_url}/v1/text-to-speech/{voice_id}` with the `xi-api-key`
/// header; the response body is the encoded audio. Non-2xx responses carry a
/// JSON error body whose message is surfaced in `NarrationError::HttpError`.
use async_trait::async_trait;
use narration_core::{AudioHandle, NarrationError, RemoteSynthesizer, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_CONTENT_TYPE: &str = "audio/mpeg";

/// Configuration for the remote synthesizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevenLabsConfig {
    /// API key sent as `xi-api-key`; unusable keys disable the remote voice
    pub api_key: Option<String>,
    pub base_url: String,
    /// Fixed voice used for every prompt
    pub voice_id: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
    /// Optional request timeout; unset means wait for the provider
    pub timeout_ms: Option<u64>,
    pub user_agent: String,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("ELEVENLABS_API_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
            base_url: std::env::var("ELEVENLABS_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "https://api.elevenlabs.io".to_string()),
            voice_id: std::env::var("ELEVENLABS_VOICE_ID")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "21m00Tcm4TlvDq8ikWAM".to_string()),
            model_id: "eleven_multilingual_v2".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
            timeout_ms: std::env::var("ELEVENLABS_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok()),
            user_agent: "survey-kiosk/0.1".to_string(),
        }
    }
}

/// False for empty keys and obvious placeholders.
pub fn is_usable_api_key(key: &str) -> bool {
    let key = key.trim();
    if key.is_empty() || key.starts_with('<') {
        return false;
    }
    let lowered = key.to_ascii_lowercase();
    !matches!(
        lowered.as_str(),
        "your_api_key" | "your-api-key" | "changeme" | "undefined" | "null" | "none"
    )
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
    message: Option<String>,
}

/// Pull a readable message out of a provider error body.
fn error_detail(body: &[u8]) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
    let detail = match parsed.detail {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Object(map)) => map
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        _ => None,
    };
    detail.or(parsed.message)
}

/// Remote synthesizer client
pub struct ElevenLabsClient {
    config: ElevenLabsConfig,
    http_client: reqwest::Client,
}

impl ElevenLabsClient {
    /// Create a client from environment-driven defaults
    pub fn new() -> Self {
        Self::with_config(ElevenLabsConfig::default())
    }

    pub fn with_config(config: ElevenLabsConfig) -> Self {
        let mut builder = reqwest::Client::builder().user_agent(&config.user_agent);
        if let Some(ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let http_client = builder.build().unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config,
            http_client,
        }
    }

    pub fn config(&self) -> &ElevenLabsConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.voice_id
        )
    }

    fn api_key(&self) -> Option<&str> {
        self.config
            .api_key
            .as_deref()
            .filter(|key| is_usable_api_key(key))
    }
}

impl Default for ElevenLabsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteSynthesizer for ElevenLabsClient {
    fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }

    async fn synthesize(&self, text: &str) -> Result<AudioHandle> {
        let api_key = self.api_key().ok_or(NarrationError::NotConfigured)?;
        debug!(target: "elevenlabs", voice_id = %self.config.voice_id, chars = text.chars().count(), "Requesting synthesis");

        let body = SynthesisRequest {
            text,
            model_id: &self.config.model_id,
            voice_settings: VoiceSettings {
                stability: self.config.stability,
                similarity_boost: self.config.similarity_boost,
                style: self.config.style,
                use_speaker_boost: self.config.use_speaker_boost,
            },
        };

        let response = self
            .http_client
            .post(self.endpoint())
            .header("xi-api-key", api_key)
            .header(reqwest::header::ACCEPT, DEFAULT_CONTENT_TYPE)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "elevenlabs", error = %e, "Synthesis request failed");
                NarrationError::TransportError(format!("Synthesis request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.bytes().await.unwrap_or_default();
            let detail = error_detail(&raw).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            });
            warn!(target: "elevenlabs", status = %status, detail = %detail, "Synthesis API returned error");
            return Err(NarrationError::HttpError {
                status: status.as_u16(),
                detail,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let audio = response.bytes().await.map_err(|e| {
            warn!(target: "elevenlabs", error = %e, "Failed to read synthesized audio");
            NarrationError::TransportError(format!("Failed to read audio body: {}", e))
        })?;
        if audio.is_empty() {
            return Err(NarrationError::TransportError(
                "Synthesis returned an empty body".into(),
            ));
        }

        debug!(target: "elevenlabs", bytes = audio.len(), content_type = %content_type, "Synthesis complete");
        Ok(AudioHandle::new(content_type, audio.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_keys_are_rejected() {
        assert!(!is_usable_api_key(""));
        assert!(!is_usable_api_key("   "));
        assert!(!is_usable_api_key("YOUR_API_KEY"));
        assert!(!is_usable_api_key("<elevenlabs key>"));
        assert!(is_usable_api_key("sk_3f9a0c"));
    }

    #[test]
    fn detail_message_is_extracted() {
        let nested = br#"{"detail":{"status":"quota_exceeded","message":"Quota exceeded"}}"#;
        assert_eq!(error_detail(nested).as_deref(), Some("Quota exceeded"));

        let flat = br#"{"detail":"Unauthorized"}"#;
        assert_eq!(error_detail(flat).as_deref(), Some("Unauthorized"));

        let top = br#"{"message":"Bad voice"}"#;
        assert_eq!(error_detail(top).as_deref(), Some("Bad voice"));

        assert!(error_detail(b"not json").is_none());
    }

    #[test]
    fn endpoint_carries_voice_id() {
        let client = ElevenLabsClient::with_config(ElevenLabsConfig {
            base_url: "http://localhost:9000/".into(),
            voice_id: "voz".into(),
            ..ElevenLabsConfig::default()
        });
        assert_eq!(client.endpoint(), "http://localhost:9000/v1/text-to-speech/voz");
    }

    #[test]
    fn missing_key_is_not_configured() {
        let client = ElevenLabsClient::with_config(ElevenLabsConfig {
            api_key: None,
            ..ElevenLabsConfig::default()
        });
        assert!(!client.is_configured());
    }
}
