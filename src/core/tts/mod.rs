pub mod base;
pub mod gemini;
pub mod synthesizer;

pub use base::{
    ChunkPosition, NarrationError, NarrationResult, NarratorVoice, PitchBand, SpeechProvider,
    SynthesisRequest,
};
pub use gemini::{GeminiSpeech, GeminiSpeechConfig};
pub use synthesizer::{NarrationOutcome, NarrationSynthesizer, SynthesizerSettings};
