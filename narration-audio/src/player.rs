//! Remote audio playback through a CLI player
//!
//! Audio bytes are written to a temp file and handed to the first available
//! player (preferred, then ffplay, mpg123, paplay, aplay). A supervising task
//! reports how playback ended and removes the file.
//!
//! Env overrides:
//! - TTS_PLAYER, TTS_TEMP_DIR

use crate::utils::get_from_path;
use async_trait::async_trait;
use narration_core::{AudioHandle, AudioPlayer, NarrationError, PlaybackHandle, PlaybackOutcome, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::Command;
use tracing::{debug, info, warn};

const PLAYER_FALLBACKS: [&str; 4] = ["ffplay", "mpg123", "paplay", "aplay"];

#[derive(Clone, Debug)]
pub struct PlayerConfig {
    pub preferred: Option<String>,
    pub temp_dir: PathBuf,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            preferred: std::env::var("TTS_PLAYER").ok().filter(|s| !s.is_empty()),
            temp_dir: std::env::var("TTS_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir()),
        }
    }
}

pub struct CommandPlayer {
    cfg: PlayerConfig,
    player: Option<PathBuf>,
    /// Distinguishes temp files when the same cached audio plays again
    plays: AtomicU64,
}

impl CommandPlayer {
    pub fn new(cfg: PlayerConfig) -> Self {
        let player = select_player(cfg.preferred.as_deref());
        match &player {
            Some(p) => info!(target: "player", bin = ?p, "Detected audio player"),
            None => warn!(target: "player", "No audio player found; remote voice will fall back"),
        }
        Self {
            cfg,
            player,
            plays: AtomicU64::new(0),
        }
    }

    /// False when no player binary was found; remote audio cannot be played.
    pub fn is_available(&self) -> bool {
        self.player.is_some()
    }
}

impl Default for CommandPlayer {
    fn default() -> Self {
        Self::new(PlayerConfig::default())
    }
}

fn select_player(pref: Option<&str>) -> Option<PathBuf> {
    pref.and_then(get_from_path)
        .or_else(|| PLAYER_FALLBACKS.iter().find_map(|name| get_from_path(name)))
}

fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" | "audio/opus" => "ogg",
        "audio/pcm" => "pcm",
        _ => "mp3",
    }
}

fn temp_file_name(audio: &AudioHandle, play: u64) -> String {
    format!(
        "narration_{}_{}.{}",
        audio.id(),
        play,
        extension_for(audio.content_type())
    )
}

fn player_args(player_bin: &Path, audio_path: &Path) -> Vec<String> {
    let name = player_bin
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    let path = audio_path.to_string_lossy().to_string();
    match name {
        "ffplay" => vec![
            "-nodisp".into(),
            "-autoexit".into(),
            "-loglevel".into(),
            "quiet".into(),
            path,
        ],
        "mpg123" => vec!["-q".into(), path],
        _ => vec![path],
    }
}

#[async_trait]
impl AudioPlayer for CommandPlayer {
    async fn start(&self, audio: &AudioHandle) -> Result<PlaybackHandle> {
        let bin = self
            .player
            .clone()
            .ok_or_else(|| NarrationError::PlaybackError("No audio player available".into()))?;

        let path = self.cfg.temp_dir.join(temp_file_name(
            audio,
            self.plays.fetch_add(1, Ordering::Relaxed),
        ));
        tokio::fs::write(&path, audio.data()).await?;

        let mut cmd = Command::new(&bin);
        cmd.args(player_args(&bin, &path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        debug!(target: "player", command = ?cmd, "Starting playback");

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(NarrationError::PlaybackError(format!(
                    "Failed to start player: {}",
                    e
                )));
            }
        };

        let (handle, mut control) = PlaybackHandle::channel();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                status = child.wait() => match status {
                    Ok(s) if s.success() => PlaybackOutcome::Finished,
                    Ok(s) => PlaybackOutcome::Failed(format!("player exited with {}", s)),
                    Err(e) => PlaybackOutcome::Failed(e.to_string()),
                },
                _ = control.stopped() => {
                    let _ = child.kill().await;
                    PlaybackOutcome::Stopped
                }
            };
            debug!(target: "player", outcome = ?outcome, "Playback ended");
            let _ = tokio::fs::remove_file(&path).await;
            control.finish(outcome);
        });

        Ok(handle)
    }
}
