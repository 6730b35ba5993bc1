//! Playback controller.
//!
//! State machine over one live playback session:
//!
//! ```text
//! idle --play--> loading --(audio)--------> playing --pause--> paused
//!                        --(no audio/err)-> playing (fallback)
//! paused --play--> playing        playing/paused --stop--> idle
//! any state but loading --story epoch change--> idle
//! ```
//!
//! A generation counter identifies the live session. Every asynchronous
//! result (narration, fallback render, natural completion) carries the
//! generation it was started under and is dropped if the session moved on.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::engine::{
    ActiveEngine, EngineKind, FallbackVoice, PlaybackError, PlaybackResult, next_speed,
};
use super::fallback::{DEFAULT_FALLBACK_BASE_RATE, FallbackRequest, LocalSpeechEngine};
use crate::core::audio::{AudioBuffer, AudioOutput, ClockedPlayer, PlayerStatus};
use crate::core::dialogue::{Profile, StoryLanguage};
use crate::core::story::StoryContext;
use crate::core::tts::{NarrationOutcome, NarrationSynthesizer, NarratorVoice};

/// Shown when neither engine could speak.
pub const PLAYBACK_FAILURE_NOTICE: &str =
    "The starlight voice is resting right now. Let's try listening again in a moment.";

/// Playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
        }
    }
}

/// Voice settings for one narration, taken from the listener profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NarrationVoice {
    pub voice: NarratorVoice,
    pub language: StoryLanguage,
    pub pitch: f32,
}

impl From<&Profile> for NarrationVoice {
    fn from(profile: &Profile) -> Self {
        Self {
            voice: profile.voice,
            language: profile.language,
            pitch: profile.pitch,
        }
    }
}

struct Session {
    state: PlaybackState,
    generation: u64,
    engine: Option<ActiveEngine>,
    loading: Option<CancellationToken>,
    rate: f64,
    notice: Option<String>,
}

struct Inner {
    synthesizer: NarrationSynthesizer,
    fallback: Arc<dyn LocalSpeechEngine>,
    output: Arc<dyn AudioOutput>,
    fallback_base_rate: f64,
    session: Mutex<Session>,
    state_tx: watch::Sender<PlaybackState>,
}

impl Inner {
    fn set_state(&self, session: &mut Session, state: PlaybackState) {
        if session.state != state {
            debug!(from = session.state.as_str(), to = state.as_str(), "Playback state change");
            session.state = state;
            self.state_tx.send_replace(state);
        }
    }

    /// Tear down whatever is live and return to idle.
    fn teardown(&self, session: &mut Session) {
        if let Some(token) = session.loading.take() {
            token.cancel();
        }
        if let Some(engine) = session.engine.take() {
            engine.output().stop();
        }
        session.generation += 1;
        self.set_state(session, PlaybackState::Idle);
    }
}

/// Cloneable handle to the playback state machine.
#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<Inner>,
}

impl PlaybackController {
    pub fn new(
        synthesizer: NarrationSynthesizer,
        fallback: Arc<dyn LocalSpeechEngine>,
        output: Arc<dyn AudioOutput>,
    ) -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::Idle);
        Self {
            inner: Arc::new(Inner {
                synthesizer,
                fallback,
                output,
                fallback_base_rate: DEFAULT_FALLBACK_BASE_RATE,
                session: Mutex::new(Session {
                    state: PlaybackState::Idle,
                    generation: 0,
                    engine: None,
                    loading: None,
                    rate: 1.0,
                    notice: None,
                }),
                state_tx,
            }),
        }
    }

    /// Sets the fallback engine's base rate. Only takes effect before the
    /// controller is cloned.
    /// Default: 0.85
    pub fn with_fallback_base_rate(self, base_rate: f64) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.fallback_base_rate = base_rate;
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(inner) => {
                warn!(
                    base_rate,
                    kept = inner.fallback_base_rate,
                    "Controller already shared, fallback base rate not changed"
                );
                Self { inner }
            }
        }
    }

    pub fn fallback_base_rate(&self) -> f64 {
        self.inner.fallback_base_rate
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.session.lock().state
    }

    /// Receiver for state changes.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.inner.state_tx.subscribe()
    }

    pub fn rate(&self) -> f64 {
        self.inner.session.lock().rate
    }

    pub fn engine_kind(&self) -> Option<EngineKind> {
        self.inner.session.lock().engine.as_ref().map(ActiveEngine::kind)
    }

    /// Assembled buffer of the primary engine, while it is live.
    pub fn current_buffer(&self) -> Option<Arc<AudioBuffer>> {
        self.inner
            .session
            .lock()
            .engine
            .as_ref()
            .and_then(|e| e.buffer().cloned())
    }

    /// Gentle notice left by the last failed request.
    pub fn notice(&self) -> Option<String> {
        self.inner.session.lock().notice.clone()
    }

    /// Play the story.
    ///
    /// From `paused` this resumes at the suspended position. From `idle` it
    /// narrates the current story text and starts the primary engine, or the
    /// fallback engine when narration yields nothing or fails. Returns the
    /// state reached. Narration failures never surface as errors: the result
    /// is `playing` or `idle` with a notice.
    pub async fn play(
        &self,
        story: &StoryContext,
        voice: NarrationVoice,
    ) -> PlaybackResult<PlaybackState> {
        let inner = &self.inner;
        let (generation, token, epoch, text) = {
            let mut session = inner.session.lock();
            match session.state {
                PlaybackState::Paused => {
                    if let Some(engine) = session.engine.as_ref() {
                        engine.output().resume();
                    }
                    inner.set_state(&mut session, PlaybackState::Playing);
                    return Ok(PlaybackState::Playing);
                }
                PlaybackState::Playing => return Ok(PlaybackState::Playing),
                PlaybackState::Loading => {
                    return Err(PlaybackError::Busy("narration is loading".to_string()));
                }
                PlaybackState::Idle => {}
            }

            let snapshot = story.snapshot();
            if snapshot.is_streaming {
                return Err(PlaybackError::Busy("story is still being written".to_string()));
            }
            if snapshot.content.trim().is_empty() {
                return Err(PlaybackError::Empty);
            }

            session.generation += 1;
            session.notice = None;
            let token = CancellationToken::new();
            session.loading = Some(token.clone());
            inner.set_state(&mut session, PlaybackState::Loading);
            (session.generation, token, snapshot.epoch, snapshot.content)
        };

        info!(generation, epoch, "Narration requested");
        let outcome = inner
            .synthesizer
            .narrate(&text, voice.voice, voice.pitch, &token)
            .await;

        if !self.still_current(generation, &token, story, epoch) {
            return Ok(self.state());
        }

        let engine = match outcome {
            Ok(NarrationOutcome::Audio(buffer)) => self.start_primary(buffer),
            Ok(NarrationOutcome::Cancelled) => {
                return Ok(self.discard(generation));
            }
            Ok(NarrationOutcome::NoAudioProduced) => {
                info!("Switching to fallback voice: no audio produced");
                self.start_fallback(&text, voice).await
            }
            Err(e) => {
                warn!("Narration failed, switching to fallback voice: {}", e);
                self.start_fallback(&text, voice).await
            }
        };

        // Checked and committed under one lock so a concurrent stop cannot
        // slip in between.
        let mut session = inner.session.lock();
        let live = !token.is_cancelled() && session.generation == generation;
        if !live || story.epoch() != epoch {
            if let Ok(engine) = engine {
                engine.output().stop();
            }
            if live {
                debug!(generation, "Dropping narration of outdated story text");
                inner.teardown(&mut session);
            } else {
                debug!(generation, "Dropping engine of superseded request");
            }
            return Ok(session.state);
        }

        session.loading = None;
        match engine {
            Ok(engine) => {
                info!(engine = engine.kind().as_str(), "Playback started");
                self.watch_completion(generation, engine.output().subscribe());
                session.engine = Some(engine);
                inner.set_state(&mut session, PlaybackState::Playing);
            }
            Err(e) => {
                warn!("Playback failed: {}", e);
                session.notice = Some(PLAYBACK_FAILURE_NOTICE.to_string());
                inner.set_state(&mut session, PlaybackState::Idle);
            }
        }
        Ok(session.state)
    }

    /// Suspend the live engine. No-op unless playing.
    pub fn pause(&self) -> PlaybackState {
        let mut session = self.inner.session.lock();
        if session.state == PlaybackState::Playing {
            if let Some(engine) = session.engine.as_ref() {
                engine.output().pause();
            }
            self.inner.set_state(&mut session, PlaybackState::Paused);
        }
        session.state
    }

    /// Halt output or cancel a loading request, returning to idle.
    pub fn stop(&self) -> PlaybackState {
        let mut session = self.inner.session.lock();
        if session.state != PlaybackState::Idle {
            info!(from = session.state.as_str(), "Playback stopped");
        }
        self.inner.teardown(&mut session);
        session.state
    }

    /// Change the rate multiplier, applied live to the sounding engine.
    pub fn set_rate(&self, rate: f64) {
        let mut session = self.inner.session.lock();
        session.rate = rate;
        if let Some(engine) = session.engine.as_ref() {
            engine.output().set_rate(rate);
        }
    }

    /// Advance to the next speed preset and return it.
    pub fn cycle_speed(&self) -> f64 {
        let next = next_speed(self.rate());
        self.set_rate(next);
        next
    }

    /// React to a story epoch change: anything but a loading request is torn
    /// down. A loading request notices the change when it completes.
    pub fn on_story_changed(&self) {
        let mut session = self.inner.session.lock();
        match session.state {
            PlaybackState::Loading | PlaybackState::Idle => {}
            PlaybackState::Playing | PlaybackState::Paused => {
                debug!("Story changed, stopping stale playback");
                self.inner.teardown(&mut session);
            }
        }
    }

    /// Follow `story` epochs in the background, calling
    /// [`on_story_changed`](Self::on_story_changed) on every change.
    pub fn watch_story(&self, story: &StoryContext) -> JoinHandle<()> {
        let mut epochs = story.subscribe();
        let controller = self.clone();
        tokio::spawn(async move {
            while epochs.changed().await.is_ok() {
                controller.on_story_changed();
            }
        })
    }

    // -------------------------------------------------------------------------

    fn still_current(
        &self,
        generation: u64,
        token: &CancellationToken,
        story: &StoryContext,
        epoch: u64,
    ) -> bool {
        if token.is_cancelled() {
            debug!(generation, "Dropping result of cancelled request");
            return false;
        }
        if self.inner.session.lock().generation != generation {
            debug!(generation, "Dropping result of superseded request");
            return false;
        }
        if story.epoch() != epoch {
            debug!(generation, "Dropping narration of outdated story text");
            self.discard(generation);
            return false;
        }
        true
    }

    /// Return to idle if `generation` is still live.
    fn discard(&self, generation: u64) -> PlaybackState {
        let mut session = self.inner.session.lock();
        if session.generation == generation {
            self.inner.teardown(&mut session);
        }
        session.state
    }

    fn start_primary(&self, buffer: AudioBuffer) -> PlaybackResult<ActiveEngine> {
        let rate = self.rate();
        let sink = self
            .inner
            .output
            .open(buffer.sample_rate(), buffer.channel_count())
            .map_err(|e| PlaybackError::Output(e.to_string()))?;
        let buffer = Arc::new(buffer);
        let output = ClockedPlayer::start(buffer.clone(), sink, rate);
        Ok(ActiveEngine::Primary { buffer, output })
    }

    async fn start_fallback(
        &self,
        text: &str,
        voice: NarrationVoice,
    ) -> PlaybackResult<ActiveEngine> {
        let request = FallbackRequest {
            text: text.to_string(),
            language: voice.language,
            pitch: voice.pitch,
        };
        let buffer = self.inner.fallback.render(&request).await?;
        let sink = self
            .inner
            .output
            .open(buffer.sample_rate(), buffer.channel_count())
            .map_err(|e| PlaybackError::Output(e.to_string()))?;

        let base_rate = self.inner.fallback_base_rate;
        let player = ClockedPlayer::start(Arc::new(buffer), sink, base_rate * self.rate());
        debug!(engine = self.inner.fallback.name(), "Fallback voice ready");
        Ok(ActiveEngine::Fallback {
            output: FallbackVoice::new(player, base_rate),
        })
    }

    /// Return to idle when the engine of `generation` finishes on its own.
    fn watch_completion(&self, generation: u64, mut status: watch::Receiver<PlayerStatus>) {
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let finished = match status.wait_for(PlayerStatus::is_terminal).await {
                Ok(status) => status.clone(),
                Err(_) => PlayerStatus::Stopped,
            };
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let mut session = inner.session.lock();
            if session.generation != generation || session.engine.is_none() {
                return;
            }
            match finished {
                PlayerStatus::Failed(reason) => {
                    warn!("Audio output failed: {}", reason);
                    session.notice = Some(PLAYBACK_FAILURE_NOTICE.to_string());
                }
                _ => info!("Playback finished"),
            }
            session.engine = None;
            inner.set_state(&mut session, PlaybackState::Idle);
        });
    }
}
