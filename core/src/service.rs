//! Narration service
//!
//! Converts short prompts into speech, preferring a remote voice and falling
//! back to the local narrator:
//! - `speak` takes a fresh request token, silences whatever is audible and
//!   resolves audio on a background task (cache first, then a synthesis
//!   already in flight for the same text, then the remote synthesizer)
//! - playback is committed only while its token is still the latest, so a
//!   newer `speak` or an explicit `cancel` discards everything older
//! - remote failures (transport, HTTP status, playback) become local
//!   narration; without a local narrator the request is a silent no-op
//!
//! Requires a tokio runtime: both the remote path and the supervision of
//! local narration run as tasks. Every request's progress is published as
//! [`NarrationEvent`]s.

use crate::cache::{AudioCache, AudioHandle};
use crate::event::{NarrationEvent, RequestTracker};
use crate::narrator::{
    AudioPlayer, LocalNarrator, LocalUtterance, PlaybackOutcome, RemoteSynthesizer, StopHandle,
    Voice,
};
use crate::sequencer::{RequestSequencer, RequestToken, Utterance};
use crate::state::{AudioSource, NarrationState};
use crate::utils::normalize_text;
use crate::voice::VoiceSelector;
use crate::Result;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationConfig {
    /// Language tag for local narration and voice selection
    pub lang: String,
    /// Local speech rate (1.0 = normal)
    pub rate: f32,
    /// Local speech pitch (1.0 = normal)
    pub pitch: f32,
    /// Optional cap on cached remote audio entries (unbounded when unset)
    pub cache_max_entries: Option<usize>,
    /// Capacity of the narration event channel
    pub event_capacity: usize,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            lang: "pt-BR".to_string(),
            rate: 0.9,
            pitch: 1.0,
            cache_max_entries: None,
            event_capacity: 64,
        }
    }
}

#[derive(Clone)]
struct RemoteChain {
    synthesizer: Arc<dyn RemoteSynthesizer>,
    player: Arc<dyn AudioPlayer>,
}

/// Outcome of one synthesis, shared by every request for the same text.
type SharedFetch = Option<std::result::Result<AudioHandle, String>>;

/// Removes an in-flight synthesis entry once its leading request is done
/// with it, including when that request's task is dropped.
struct PendingFetch<'a> {
    pending: &'a DashMap<String, watch::Receiver<SharedFetch>>,
    key: &'a str,
}

impl Drop for PendingFetch<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.key);
    }
}

/// The single audible source, if any.
enum ActivePlayback {
    Remote { token: RequestToken, stop: StopHandle },
    Local { token: RequestToken, stop: StopHandle },
}

impl ActivePlayback {
    fn token(&self) -> RequestToken {
        match self {
            ActivePlayback::Remote { token, .. } | ActivePlayback::Local { token, .. } => *token,
        }
    }

    fn release(self) {
        match self {
            ActivePlayback::Remote { stop, .. } | ActivePlayback::Local { stop, .. } => stop.stop(),
        }
    }
}

#[derive(Default)]
pub struct NarrationServiceBuilder {
    config: NarrationConfig,
    remote: Option<RemoteChain>,
    local: Option<Arc<dyn LocalNarrator>>,
}

impl NarrationServiceBuilder {
    pub fn config(mut self, config: NarrationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn remote(
        mut self,
        synthesizer: Arc<dyn RemoteSynthesizer>,
        player: Arc<dyn AudioPlayer>,
    ) -> Self {
        self.remote = Some(RemoteChain {
            synthesizer,
            player,
        });
        self
    }

    pub fn local(mut self, narrator: Arc<dyn LocalNarrator>) -> Self {
        self.local = Some(narrator);
        self
    }

    pub fn build(self) -> NarrationService {
        let (events, _) = broadcast::channel(self.config.event_capacity.max(1));
        NarrationService {
            inner: Arc::new(Inner {
                cache: AudioCache::new(self.config.cache_max_entries),
                pending: DashMap::new(),
                voices: VoiceSelector::new(self.config.lang.clone()),
                config: self.config,
                sequencer: RequestSequencer::new(),
                remote: self.remote,
                local: self.local,
                active: Mutex::new(None),
                enabled: AtomicBool::new(true),
                events,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }
}

/// Cheap to clone; all clones drive the same narration state.
#[derive(Clone)]
pub struct NarrationService {
    inner: Arc<Inner>,
}

struct Inner {
    config: NarrationConfig,
    sequencer: RequestSequencer,
    cache: AudioCache,
    pending: DashMap<String, watch::Receiver<SharedFetch>>,
    voices: VoiceSelector,
    remote: Option<RemoteChain>,
    local: Option<Arc<dyn LocalNarrator>>,
    active: Mutex<Option<ActivePlayback>>,
    enabled: AtomicBool,
    events: broadcast::Sender<NarrationEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl NarrationService {
    pub fn builder() -> NarrationServiceBuilder {
        NarrationServiceBuilder::default()
    }

    /// Resolve the local voice and start watching for voice list changes.
    pub async fn start(&self) -> Result<()> {
        info!("Starting narration service...");

        self.abort_tasks();
        info!(
            target: "narration",
            remote = self.inner.configured_remote().is_some(),
            local = self.inner.local.is_some(),
            "Narration sources"
        );

        if let Some(local) = self.inner.local.clone() {
            match self.inner.voices.refresh(local.as_ref()) {
                Some(v) => {
                    info!(target: "narration", voice = %v.name, lang = %v.lang, "Local voice selected")
                }
                None => {
                    info!(target: "narration", lang = %self.inner.config.lang, "No matching local voice; using platform default")
                }
            }

            if let Some(mut changes) = local.voice_changes() {
                let weak = Arc::downgrade(&self.inner);
                let task = tokio::spawn(async move {
                    loop {
                        match changes.recv().await {
                            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                                let Some(inner) = weak.upgrade() else { break };
                                inner.refresh_voice();
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                });
                self.inner.tasks.lock().push(task);
            }
        }

        info!("Narration service started");
        Ok(())
    }

    /// Silence everything and stop background tasks.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down narration service...");
        self.cancel();
        self.abort_tasks();
        info!("Narration service shut down");
        Ok(())
    }

    /// Narrate `text`, superseding whatever is playing. Never fails.
    pub fn speak(&self, text: impl AsRef<str>) {
        let inner = &self.inner;
        if !inner.enabled.load(Ordering::SeqCst) {
            debug!(target: "narration", "Narration disabled; ignoring speak");
            return;
        }

        let token = inner.sequencer.next();
        inner.release_active();

        let text = normalize_text(text.as_ref());
        if text.is_empty() {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!(target: "narration", "No async runtime; narration skipped");
            return;
        };
        let utterance = Utterance { text, token };

        if let Some(chain) = inner.configured_remote() {
            runtime.spawn(Arc::clone(inner).narrate_remote(chain, utterance));
            return;
        }

        let mut request =
            RequestTracker::begin(&inner.events, &utterance, NarrationState::LocalFallback);
        if let Some(outcome) = inner.speak_local(&mut request, &utterance) {
            let inner = Arc::clone(inner);
            runtime.spawn(async move {
                inner.finish_local(&mut request, token, outcome).await;
            });
        }
    }

    /// Silence any remote or local playback. Idempotent.
    pub fn cancel(&self) {
        self.inner.sequencer.invalidate();
        self.inner.release_active();
    }

    /// Audio toggle; disabling silences current playback.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.inner.enabled.swap(enabled, Ordering::SeqCst);
        if was && !enabled {
            self.cancel();
        }
        info!(target: "narration", enabled, "Narration toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// The platform reported a new voice list.
    pub fn voices_changed(&self) {
        self.inner.refresh_voice();
    }

    pub fn current_voice(&self) -> Option<Voice> {
        self.inner.voices.current()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NarrationEvent> {
        self.inner.events.subscribe()
    }

    /// Whether a playback handle is held (remote audio or local narration).
    pub fn is_speaking(&self) -> bool {
        self.inner.active.lock().is_some()
    }

    pub fn cache(&self) -> &AudioCache {
        &self.inner.cache
    }

    pub fn config(&self) -> &NarrationConfig {
        &self.inner.config
    }

    fn abort_tasks(&self) {
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Inner {
    fn configured_remote(&self) -> Option<RemoteChain> {
        self.remote
            .as_ref()
            .filter(|chain| chain.synthesizer.is_configured())
            .cloned()
    }

    /// Stop the active playback and cancel local speech. Both always run.
    fn release_active(&self) {
        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            previous.release();
        }
        if let Some(local) = &self.local {
            local.cancel();
        }
    }

    fn clear_active(&self, token: RequestToken) {
        let mut active = self.active.lock();
        if active.as_ref().map(ActivePlayback::token) == Some(token) {
            *active = None;
        }
    }

    fn refresh_voice(&self) {
        if let Some(local) = &self.local {
            let name = self.voices.refresh(local.as_ref()).map(|v| v.name);
            debug!(target: "narration", voice = ?name, "Voice list changed");
        }
    }

    async fn narrate_remote(self: Arc<Self>, chain: RemoteChain, utterance: Utterance) {
        let token = utterance.token;
        let mut request =
            RequestTracker::begin(&self.events, &utterance, NarrationState::RemoteAttempting);

        let fetched = self.fetch(&chain, &utterance.text).await;

        if !self.sequencer.is_current(token) {
            debug!(target: "narration", token = %token, "Discarding stale narration result");
            request.advance(NarrationState::Superseded);
            return;
        }

        let (audio, cached) = match fetched {
            Ok(found) => found,
            Err(reason) => {
                self.fall_back(&mut request, &utterance, reason).await;
                return;
            }
        };
        request.advance(NarrationState::RemoteSucceeded { cached });

        self.play_remote(&chain, &mut request, &utterance, &audio).await;
    }

    /// Audio for `text` from the cache, from a synthesis already in flight
    /// for the same text, or from a new synthesis. The flag is true when no
    /// new remote request was made.
    async fn fetch(
        &self,
        chain: &RemoteChain,
        text: &str,
    ) -> std::result::Result<(AudioHandle, bool), String> {
        if let Some(audio) = self.cache.get(text) {
            debug!(target: "narration", "Using cached audio");
            return Ok((audio, true));
        }

        let leader = match self.pending.entry(text.to_string()) {
            Entry::Occupied(entry) => Err(entry.get().clone()),
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                entry.insert(rx);
                Ok(tx)
            }
        };

        let mut shared = match leader {
            Ok(tx) => {
                let _pending = PendingFetch {
                    pending: &self.pending,
                    key: text,
                };
                let result = chain
                    .synthesizer
                    .synthesize(text)
                    .await
                    .map_err(|e| e.to_string());
                // Cached even when the leading request went stale; the audio
                // is still right for this text.
                if let Ok(audio) = &result {
                    self.cache.insert(text, audio.clone());
                }
                let _ = tx.send(Some(result.clone()));
                return result.map(|audio| (audio, false));
            }
            Err(rx) => rx,
        };

        debug!(target: "narration", "Joining synthesis already in flight");
        loop {
            let ready = shared.borrow_and_update().clone();
            if let Some(result) = ready {
                return result.map(|audio| (audio, true));
            }
            if shared.changed().await.is_err() {
                return Err("shared synthesis was abandoned".to_string());
            }
        }
    }

    async fn play_remote(
        &self,
        chain: &RemoteChain,
        request: &mut RequestTracker,
        utterance: &Utterance,
        audio: &AudioHandle,
    ) {
        let token = utterance.token;
        let playback = match chain.player.start(audio).await {
            Ok(playback) => playback,
            Err(err) => {
                self.fall_back(request, utterance, err.to_string()).await;
                return;
            }
        };

        let (stop, outcome) = playback.into_parts();
        {
            let mut active = self.active.lock();
            if !self.sequencer.is_current(token) {
                drop(active);
                stop.stop();
                request.advance(NarrationState::Superseded);
                return;
            }
            *active = Some(ActivePlayback::Remote { token, stop });
        }
        request.advance(NarrationState::Playing {
            source: AudioSource::Remote,
        });

        let outcome = outcome
            .await
            .unwrap_or_else(|_| PlaybackOutcome::Failed("player dropped the playback".into()));
        self.clear_active(token);
        match outcome {
            PlaybackOutcome::Finished => request.advance(NarrationState::PlayedToCompletion),
            PlaybackOutcome::Stopped => request.advance(NarrationState::Cancelled),
            PlaybackOutcome::Failed(reason) => self.fall_back(request, utterance, reason).await,
        }
    }

    /// Remote path failed; narrate locally if this request is still wanted.
    async fn fall_back(&self, request: &mut RequestTracker, utterance: &Utterance, reason: String) {
        if !self.sequencer.is_current(utterance.token) {
            request.advance(NarrationState::Superseded);
            return;
        }
        warn!(
            target: "narration",
            token = %utterance.token,
            reason = %reason,
            "Remote voice failed; falling back to local narrator"
        );
        request.advance(NarrationState::RemoteFailed { reason });
        if let Some(outcome) = self.speak_local(request, utterance) {
            self.finish_local(request, utterance.token, outcome).await;
        }
    }

    /// Start local narration. Returns the outcome to await when it became
    /// the active playback.
    fn speak_local(
        &self,
        request: &mut RequestTracker,
        utterance: &Utterance,
    ) -> Option<oneshot::Receiver<PlaybackOutcome>> {
        if matches!(request.state(), NarrationState::RemoteFailed { .. }) {
            request.advance(NarrationState::LocalFallback);
        }
        let Some(local) = self.local.as_ref() else {
            debug!(target: "narration", "No local narrator; narration skipped");
            request.advance(NarrationState::NoOp);
            return None;
        };

        let spoken = LocalUtterance {
            text: utterance.text.clone(),
            lang: self.config.lang.clone(),
            rate: self.config.rate,
            pitch: self.config.pitch,
            voice: self.voices.best_voice(local.as_ref()),
        };

        let mut active = self.active.lock();
        if !self.sequencer.is_current(utterance.token) {
            drop(active);
            request.advance(NarrationState::Superseded);
            return None;
        }
        if let Some(previous) = active.take() {
            previous.release();
        }
        local.cancel();
        match local.speak(spoken) {
            Ok(handle) => {
                let (stop, outcome) = handle.into_parts();
                *active = Some(ActivePlayback::Local {
                    token: utterance.token,
                    stop,
                });
                drop(active);
                request.advance(NarrationState::Playing {
                    source: AudioSource::Local,
                });
                Some(outcome)
            }
            Err(err) => {
                drop(active);
                debug!(target: "narration", error = %err, "Local narrator unavailable");
                request.advance(NarrationState::NoOp);
                None
            }
        }
    }

    async fn finish_local(
        &self,
        request: &mut RequestTracker,
        token: RequestToken,
        outcome: oneshot::Receiver<PlaybackOutcome>,
    ) {
        let outcome = outcome
            .await
            .unwrap_or_else(|_| PlaybackOutcome::Failed("narrator dropped the utterance".into()));
        self.clear_active(token);
        match outcome {
            PlaybackOutcome::Finished => request.advance(NarrationState::PlayedToCompletion),
            PlaybackOutcome::Stopped => request.advance(NarrationState::Cancelled),
            PlaybackOutcome::Failed(reason) => {
                debug!(target: "narration", token = %token, reason = %reason, "Local narration failed");
                request.advance(NarrationState::NoOp);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrator::PlaybackHandle;
    use crate::narrator::{MockAudioPlayer, MockLocalNarrator, MockRemoteSynthesizer};
    use crate::NarrationError;
    use std::time::Duration;

    async fn wait_for_state(
        rx: &mut broadcast::Receiver<NarrationEvent>,
        want: impl Fn(&NarrationState) -> bool,
    ) -> NarrationEvent {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let ev = rx.recv().await.expect("event channel closed");
                if want(&ev.state) {
                    return ev;
                }
            }
        })
        .await
        .expect("timed out waiting for narration state")
    }

    fn finished() -> Result<PlaybackHandle> {
        let (handle, control) = PlaybackHandle::channel();
        control.finish(PlaybackOutcome::Finished);
        Ok(handle)
    }

    fn quiet_narrator() -> MockLocalNarrator {
        let mut narrator = MockLocalNarrator::new();
        narrator.expect_voices().returning(Vec::new);
        narrator.expect_cancel().returning(|| ());
        narrator.expect_voice_changes().returning(|| None);
        narrator
    }

    fn finishing_player() -> MockAudioPlayer {
        let mut player = MockAudioPlayer::new();
        player.expect_start().returning(|_| finished());
        player
    }

    #[tokio::test]
    async fn missing_credential_goes_straight_to_local() {
        let mut remote = MockRemoteSynthesizer::new();
        remote.expect_is_configured().return_const(false);
        remote.expect_synthesize().times(0);

        let mut player = MockAudioPlayer::new();
        player.expect_start().times(0);

        let mut narrator = quiet_narrator();
        narrator
            .expect_speak()
            .times(1)
            .withf(|u| u.text == "X" && u.lang == "pt-BR" && (u.rate - 0.9).abs() < f32::EPSILON)
            .returning(|_| finished());

        let service = NarrationService::builder()
            .remote(Arc::new(remote), Arc::new(player))
            .local(Arc::new(narrator))
            .build();
        let mut events = service.subscribe();

        service.speak("X");
        assert!(service.is_speaking());
        assert!(service.cache().is_empty());

        wait_for_state(&mut events, |s| *s == NarrationState::PlayedToCompletion).await;
        assert!(!service.is_speaking());
    }

    #[tokio::test]
    async fn local_failure_mid_utterance_ends_as_no_op() {
        let mut narrator = quiet_narrator();
        narrator.expect_speak().returning(|_| {
            let (handle, control) = PlaybackHandle::channel();
            control.finish(PlaybackOutcome::Failed("espeak-ng exited with 1".into()));
            Ok(handle)
        });

        let service = NarrationService::builder()
            .local(Arc::new(narrator))
            .build();
        let mut events = service.subscribe();

        service.speak("Olá");
        wait_for_state(&mut events, |s| *s == NarrationState::NoOp).await;
        assert!(!service.is_speaking());
    }

    #[tokio::test]
    async fn http_error_falls_back_to_local_once() {
        let mut remote = MockRemoteSynthesizer::new();
        remote.expect_is_configured().return_const(true);
        remote.expect_synthesize().times(1).returning(|_| {
            Err(NarrationError::HttpError {
                status: 429,
                detail: "quota exceeded".into(),
            })
        });

        let mut player = MockAudioPlayer::new();
        player.expect_start().times(0);

        let mut narrator = quiet_narrator();
        narrator
            .expect_speak()
            .times(1)
            .withf(|u| u.text == "Nota 5 selecionada.")
            .returning(|_| finished());

        let service = NarrationService::builder()
            .remote(Arc::new(remote), Arc::new(player))
            .local(Arc::new(narrator))
            .build();
        let mut events = service.subscribe();

        service.speak("Nota 5 selecionada.");
        wait_for_state(&mut events, |s| {
            matches!(s, NarrationState::Playing { source: AudioSource::Local })
        })
        .await;
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn repeated_text_hits_the_cache() {
        let mut remote = MockRemoteSynthesizer::new();
        remote.expect_is_configured().return_const(true);
        remote
            .expect_synthesize()
            .times(1)
            .returning(|_| Ok(AudioHandle::new("audio/mpeg", b"ola".to_vec())));

        let service = NarrationService::builder()
            .remote(Arc::new(remote), Arc::new(finishing_player()))
            .local(Arc::new(quiet_narrator()))
            .build();
        let mut events = service.subscribe();

        service.speak("Olá");
        wait_for_state(&mut events, |s| *s == NarrationState::PlayedToCompletion).await;

        service.speak("Olá");
        wait_for_state(&mut events, |s| {
            *s == NarrationState::RemoteSucceeded { cached: true }
        })
        .await;
        wait_for_state(&mut events, |s| *s == NarrationState::PlayedToCompletion).await;
        assert_eq!(service.cache().len(), 1);
    }

    #[tokio::test]
    async fn player_start_failure_falls_back() {
        let mut remote = MockRemoteSynthesizer::new();
        remote.expect_is_configured().return_const(true);
        remote
            .expect_synthesize()
            .returning(|_| Ok(AudioHandle::new("audio/mpeg", b"a".to_vec())));

        let mut player = MockAudioPlayer::new();
        player
            .expect_start()
            .returning(|_| Err(NarrationError::PlaybackError("autoplay blocked".into())));

        let mut narrator = quiet_narrator();
        narrator.expect_speak().times(1).returning(|_| finished());

        let service = NarrationService::builder()
            .remote(Arc::new(remote), Arc::new(player))
            .local(Arc::new(narrator))
            .build();
        let mut events = service.subscribe();

        service.speak("Responsável selecionado");
        let ev = wait_for_state(&mut events, |s| {
            matches!(s, NarrationState::RemoteFailed { .. })
        })
        .await;
        assert!(matches!(ev.state, NarrationState::RemoteFailed { ref reason } if reason.contains("autoplay")));
        wait_for_state(&mut events, |s| {
            matches!(s, NarrationState::Playing { source: AudioSource::Local })
        })
        .await;
    }

    #[tokio::test]
    async fn no_narrator_is_silent_no_op() {
        let service = NarrationService::builder().build();
        let mut events = service.subscribe();

        service.speak("Iniciando pesquisa...");
        let ev = events.recv().await.unwrap();
        assert_eq!(ev.state, NarrationState::LocalFallback);
        let ev = events.recv().await.unwrap();
        assert_eq!(ev.state, NarrationState::NoOp);
        assert!(!service.is_speaking());
    }

    #[tokio::test]
    async fn disabled_service_ignores_speak() {
        let mut narrator = quiet_narrator();
        narrator.expect_speak().times(0);

        let service = NarrationService::builder()
            .local(Arc::new(narrator))
            .build();
        service.set_enabled(false);
        service.speak("Olá");
        assert!(!service.is_enabled());
        assert!(!service.is_speaking());
    }

    #[tokio::test]
    async fn blank_text_only_cancels() {
        let mut narrator = quiet_narrator();
        narrator.expect_speak().times(0);

        let service = NarrationService::builder()
            .local(Arc::new(narrator))
            .build();
        service.speak("   ");
        assert!(!service.is_speaking());
    }

    #[test]
    fn speak_without_runtime_is_skipped() {
        let mut narrator = quiet_narrator();
        narrator.expect_speak().times(0);

        let service = NarrationService::builder()
            .local(Arc::new(narrator))
            .build();
        service.speak("Olá");
        assert!(!service.is_speaking());
    }
}
