//! Local narrator backed by the espeak-ng CLI
//!
//! - Binary from `ESPEAK_BIN`, else `espeak-ng` or `espeak` on `PATH`
//! - Voices listed with `--voices=<lang>` at construction and on
//!   [`EspeakNarrator::refresh_voices`], which also notifies subscribers
//! - One child process at a time; `speak` and `cancel` kill the running one.
//!   A supervising task reports how each utterance ended.

use crate::utils::{get_from_env_or_path, get_from_path};
use narration_core::{
    LocalNarrator, LocalUtterance, NarrationError, PlaybackHandle, PlaybackOutcome, Result, Voice,
};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct EspeakConfig {
    pub bin: Option<PathBuf>,
    /// Voice listing filter passed to `--voices=`
    pub voice_filter: String,
    /// Words per minute at rate 1.0
    pub base_wpm: f32,
}

impl Default for EspeakConfig {
    fn default() -> Self {
        let bin =
            get_from_env_or_path("ESPEAK_BIN", "espeak-ng").or_else(|| get_from_path("espeak"));
        Self {
            bin,
            voice_filter: "pt".to_string(),
            base_wpm: 175.0,
        }
    }
}

pub struct EspeakNarrator {
    bin: PathBuf,
    cfg: EspeakConfig,
    voices: RwLock<Vec<Voice>>,
    /// Kill switch for the utterance currently being spoken
    running: Mutex<Option<oneshot::Sender<()>>>,
    changes: broadcast::Sender<()>,
}

impl EspeakNarrator {
    /// Detect espeak-ng; `None` when no binary is installed.
    pub async fn detect() -> Option<Self> {
        Self::with_config(EspeakConfig::default()).await
    }

    pub async fn with_config(cfg: EspeakConfig) -> Option<Self> {
        let bin = cfg.bin.clone()?;
        info!(target: "espeak", bin = ?bin, "Detected espeak-ng binary");
        let voices = list_voices(&bin, &cfg.voice_filter).await;
        let (changes, _) = broadcast::channel(8);
        Some(Self {
            bin,
            cfg,
            voices: RwLock::new(voices),
            running: Mutex::new(None),
            changes,
        })
    }

    /// Re-read the voice list and notify subscribers.
    pub async fn refresh_voices(&self) {
        let voices = list_voices(&self.bin, &self.cfg.voice_filter).await;
        debug!(target: "espeak", count = voices.len(), "Reloaded voices");
        *self.voices.write() = voices;
        let _ = self.changes.send(());
    }

    fn build_command(&self, utterance: &LocalUtterance) -> Command {
        let mut cmd = Command::new(&self.bin);
        let voice = utterance
            .voice
            .as_ref()
            .map(|v| v.lang.clone())
            .unwrap_or_else(|| utterance.lang.to_ascii_lowercase());
        cmd.args(espeak_args(&voice, utterance, self.cfg.base_wpm))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    fn kill_running(&self) {
        if let Some(kill) = self.running.lock().take() {
            let _ = kill.send(());
        }
    }
}

/// Command-line arguments for one utterance. The text follows `--` so it is
/// never read as an option.
fn espeak_args(voice: &str, utterance: &LocalUtterance, base_wpm: f32) -> Vec<String> {
    let wpm = (base_wpm * utterance.rate).round().clamp(80.0, 450.0) as i32;
    let pitch = (50.0 * utterance.pitch).round().clamp(0.0, 99.0) as i32;
    vec![
        "-v".to_string(),
        voice.to_string(),
        "-s".to_string(),
        wpm.to_string(),
        "-p".to_string(),
        pitch.to_string(),
        "--".to_string(),
        utterance.text.clone(),
    ]
}

async fn list_voices(bin: &Path, filter: &str) -> Vec<Voice> {
    let output = Command::new(bin)
        .arg(format!("--voices={}", filter))
        .stdin(Stdio::null())
        .output()
        .await;
    match output {
        Ok(out) if out.status.success() => parse_voice_list(&String::from_utf8_lossy(&out.stdout)),
        Ok(out) => {
            warn!(target: "espeak", status = %out.status, "Listing voices failed");
            Vec::new()
        }
        Err(e) => {
            warn!(target: "espeak", error = %e, "Listing voices failed");
            Vec::new()
        }
    }
}

/// Parse `espeak-ng --voices` output.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  pt-br           --/M      Portuguese_(Brazil) roa/pt-BR
/// ```
pub fn parse_voice_list(output: &str) -> Vec<Voice> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("Pty"))
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 4 {
                return None;
            }
            Some(Voice::new(cols[3], cols[1]))
        })
        .collect()
}

impl LocalNarrator for EspeakNarrator {
    fn voices(&self) -> Vec<Voice> {
        self.voices.read().clone()
    }

    fn speak(&self, utterance: LocalUtterance) -> Result<PlaybackHandle> {
        self.kill_running();
        let runtime = Handle::try_current().map_err(|_| {
            NarrationError::NarratorUnavailable("espeak-ng needs an async runtime".into())
        })?;

        let mut cmd = self.build_command(&utterance);
        debug!(target: "espeak", command = ?cmd, "Running espeak-ng");
        let mut child = cmd.spawn().map_err(|e| {
            NarrationError::NarratorUnavailable(format!("espeak-ng failed to start: {}", e))
        })?;

        let (kill_tx, kill_rx) = oneshot::channel();
        *self.running.lock() = Some(kill_tx);

        let (handle, mut control) = PlaybackHandle::channel();
        runtime.spawn(async move {
            let outcome = tokio::select! {
                status = child.wait() => match status {
                    Ok(s) if s.success() => PlaybackOutcome::Finished,
                    Ok(s) => PlaybackOutcome::Failed(format!("espeak-ng exited with {}", s)),
                    Err(e) => PlaybackOutcome::Failed(e.to_string()),
                },
                _ = control.stopped() => {
                    let _ = child.kill().await;
                    PlaybackOutcome::Stopped
                }
                _ = kill_rx => {
                    let _ = child.kill().await;
                    PlaybackOutcome::Stopped
                }
            };
            debug!(target: "espeak", outcome = ?outcome, "Narration ended");
            control.finish(outcome);
        });

        Ok(handle)
    }

    fn cancel(&self) {
        self.kill_running();
    }

    fn voice_changes(&self) -> Option<broadcast::Receiver<()>> {
        Some(self.changes.subscribe())
    }
}

impl Drop for EspeakNarrator {
    fn drop(&mut self) {
        self.kill_running();
    }
}
