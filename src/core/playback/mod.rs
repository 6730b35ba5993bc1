//! Playback control: one live session over the primary or fallback engine.

pub mod controller;
pub mod engine;
pub mod fallback;

pub use controller::{NarrationVoice, PLAYBACK_FAILURE_NOTICE, PlaybackController, PlaybackState};
pub use engine::{
    ActiveEngine, EngineKind, FallbackVoice, PlaybackError, PlaybackResult, SPEED_PRESETS,
    SpeechOutput, next_speed,
};
pub use fallback::{
    DEFAULT_ESPEAK_BINARY, DEFAULT_FALLBACK_BASE_RATE, EspeakEngine, FallbackRequest,
    LocalSpeechEngine, parse_wav,
};
