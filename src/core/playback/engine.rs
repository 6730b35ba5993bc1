//! Active speech engine and the capability shared by both engine kinds.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

use crate::core::audio::{AudioBuffer, ClockedPlayer, PlayerStatus};

/// Errors surfaced by the playback layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// A request is already loading, or the story is still being written
    #[error("Playback busy: {0}")]
    Busy(String),

    /// No text to narrate
    #[error("Nothing to narrate")]
    Empty,

    /// The local speech engine could not render
    #[error("Fallback speech failed: {0}")]
    Fallback(String),

    /// The audio output could not be opened
    #[error("Audio output error: {0}")]
    Output(String),
}

/// Result type for playback operations.
pub type PlaybackResult<T> = Result<T, PlaybackError>;

// =============================================================================
// Playback Speed
// =============================================================================

/// Listener-selectable speed presets, in cycle order.
pub const SPEED_PRESETS: [f64; 3] = [0.75, 1.0, 1.25];

/// Next preset after `current`. Values that are not a preset restart the
/// cycle at the first preset.
pub fn next_speed(current: f64) -> f64 {
    match SPEED_PRESETS
        .iter()
        .position(|p| (p - current).abs() < 1e-6)
    {
        Some(i) => SPEED_PRESETS[(i + 1) % SPEED_PRESETS.len()],
        None => SPEED_PRESETS[0],
    }
}

// =============================================================================
// Engines
// =============================================================================

/// Which engine is sounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Assembled narration from the speech provider
    Primary,
    /// Local speech engine
    Fallback,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }
}

/// Controls shared by every engine.
pub trait SpeechOutput: Send + Sync {
    fn pause(&self);
    fn resume(&self);
    fn stop(&self);
    /// Apply the listener's rate multiplier.
    fn set_rate(&self, rate: f64);
    fn status(&self) -> PlayerStatus;
    fn subscribe(&self) -> watch::Receiver<PlayerStatus>;
}

impl SpeechOutput for ClockedPlayer {
    fn pause(&self) {
        ClockedPlayer::pause(self)
    }

    fn resume(&self) {
        ClockedPlayer::resume(self)
    }

    fn stop(&self) {
        ClockedPlayer::stop(self)
    }

    fn set_rate(&self, rate: f64) {
        ClockedPlayer::set_rate(self, rate)
    }

    fn status(&self) -> PlayerStatus {
        ClockedPlayer::status(self)
    }

    fn subscribe(&self) -> watch::Receiver<PlayerStatus> {
        ClockedPlayer::subscribe(self)
    }
}

/// Local speech output. The listener's rate multiplies a fixed slow base
/// rate instead of replacing it.
pub struct FallbackVoice {
    player: ClockedPlayer,
    base_rate: f64,
}

impl FallbackVoice {
    pub fn new(player: ClockedPlayer, base_rate: f64) -> Self {
        Self { player, base_rate }
    }

    pub fn base_rate(&self) -> f64 {
        self.base_rate
    }

    /// Rate the underlying player runs at.
    pub fn effective_rate(&self) -> f64 {
        self.player.rate()
    }
}

impl SpeechOutput for FallbackVoice {
    fn pause(&self) {
        self.player.pause()
    }

    fn resume(&self) {
        self.player.resume()
    }

    fn stop(&self) {
        self.player.stop()
    }

    fn set_rate(&self, rate: f64) {
        self.player.set_rate(self.base_rate * rate)
    }

    fn status(&self) -> PlayerStatus {
        self.player.status()
    }

    fn subscribe(&self) -> watch::Receiver<PlayerStatus> {
        self.player.subscribe()
    }
}

/// The engine of the live playback session.
pub enum ActiveEngine {
    Primary {
        buffer: Arc<AudioBuffer>,
        output: ClockedPlayer,
    },
    Fallback {
        output: FallbackVoice,
    },
}

impl ActiveEngine {
    pub fn kind(&self) -> EngineKind {
        match self {
            Self::Primary { .. } => EngineKind::Primary,
            Self::Fallback { .. } => EngineKind::Fallback,
        }
    }

    /// The buffer being played, for the primary engine.
    pub fn buffer(&self) -> Option<&Arc<AudioBuffer>> {
        match self {
            Self::Primary { buffer, .. } => Some(buffer),
            Self::Fallback { .. } => None,
        }
    }

    pub fn output(&self) -> &dyn SpeechOutput {
        match self {
            Self::Primary { output, .. } => output,
            Self::Fallback { output } => output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::{AudioOutput, AudioSegment, MemoryOutput};

    #[test]
    fn test_speed_cycle() {
        assert_eq!(next_speed(0.75), 1.0);
        assert_eq!(next_speed(1.0), 1.25);
        assert_eq!(next_speed(1.25), 0.75);
        assert_eq!(next_speed(2.0), 0.75);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_rate_composes_with_base() {
        let output = MemoryOutput::new();
        let buffer = Arc::new(AudioSegment::mono(1000, vec![0.0; 5000]));
        let player = ClockedPlayer::start(buffer, output.open(1000, 1).unwrap(), 0.85);
        let voice = FallbackVoice::new(player, 0.85);

        voice.set_rate(1.25);
        assert!((voice.effective_rate() - 1.0625).abs() < 1e-9);
        voice.set_rate(0.75);
        assert!((voice.effective_rate() - 0.6375).abs() < 1e-9);
        voice.stop();
        assert_eq!(voice.status(), PlayerStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_kind_and_shared_controls() {
        let output = MemoryOutput::new();
        let buffer = Arc::new(AudioSegment::mono(1000, vec![0.0; 5000]));
        let player = ClockedPlayer::start(buffer.clone(), output.open(1000, 1).unwrap(), 1.0);
        let engine = ActiveEngine::Primary {
            buffer,
            output: player,
        };
        assert_eq!(engine.kind(), EngineKind::Primary);
        assert!(engine.buffer().is_some());

        engine.output().pause();
        assert_eq!(engine.output().status(), PlayerStatus::Paused);
        engine.output().resume();
        assert_eq!(engine.output().status(), PlayerStatus::Playing);
    }
}
