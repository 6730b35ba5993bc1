//! Speech synthesis seam: request types, voices, pitch bands and errors.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::audio::AudioError;
use crate::core::retry::RetryClassify;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by speech providers and the narration synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NarrationError {
    /// Provider asked the caller to slow down (HTTP 429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Non-success response from the provider
    #[error("Provider error: {0}")]
    Provider(String),

    /// Transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Response body could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Decoding or assembly failed
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),
}

impl RetryClassify for NarrationError {
    fn is_rate_limited(&self) -> bool {
        match self {
            NarrationError::RateLimited(_) => true,
            NarrationError::Provider(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("429") || msg.contains("rate limit") || msg.contains("too many requests")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for NarrationError {
    fn from(e: reqwest::Error) -> Self {
        NarrationError::Network(e.to_string())
    }
}

/// Result type for narration operations.
pub type NarrationResult<T> = Result<T, NarrationError>;

// =============================================================================
// Narrator Voices
// =============================================================================

/// Prebuilt narrator voices offered to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NarratorVoice {
    /// Kore voice
    #[default]
    Kore,
    /// Puck voice
    Puck,
    /// Charon voice
    Charon,
    /// Fenrir voice
    Fenrir,
    /// Zephyr voice
    Zephyr,
}

impl NarratorVoice {
    /// Provider voice name.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kore => "Kore",
            Self::Puck => "Puck",
            Self::Charon => "Charon",
            Self::Fenrir => "Fenrir",
            Self::Zephyr => "Zephyr",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "kore" => Self::Kore,
            "puck" => Self::Puck,
            "charon" => Self::Charon,
            "fenrir" => Self::Fenrir,
            "zephyr" => Self::Zephyr,
            _ => Self::default(),
        }
    }

    /// Get all available voices.
    pub fn all() -> &'static [NarratorVoice] {
        &[
            Self::Kore,
            Self::Puck,
            Self::Charon,
            Self::Fenrir,
            Self::Zephyr,
        ]
    }

    /// Suggested voice for a story language. Unknown languages get the default.
    pub fn for_language(language: &str) -> Self {
        match language.trim().to_lowercase().as_str() {
            "french" | "german" => Self::Puck,
            _ => Self::Kore,
        }
    }
}

impl std::fmt::Display for NarratorVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Pitch Bands
// =============================================================================

/// Discrete pitch instruction derived from the listener's pitch preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PitchBand {
    VeryDeep,
    Deeper,
    Natural,
    Higher,
    Light,
}

impl PitchBand {
    /// Map a pitch preference onto its band.
    ///
    /// Bounds: `< 0.8`, `[0.8, 0.95)`, `[0.95, 1.05]`, `(1.05, 1.2]`, `> 1.2`.
    pub fn from_pitch(pitch: f32) -> Self {
        if pitch < 0.8 {
            Self::VeryDeep
        } else if pitch < 0.95 {
            Self::Deeper
        } else if pitch > 1.2 {
            Self::Light
        } else if pitch > 1.05 {
            Self::Higher
        } else {
            Self::Natural
        }
    }

    /// Voice description inserted into the synthesis prompt.
    pub fn descriptor(&self) -> &'static str {
        match self {
            Self::VeryDeep => "very deep, warm, and low",
            Self::Deeper => "slightly deeper and resonant",
            Self::Natural => "natural",
            Self::Higher => "slightly higher and more cheerful",
            Self::Light => "higher-pitched, light, and airy",
        }
    }

    /// Short label for a pitch preference, for display.
    pub fn label(pitch: f32) -> &'static str {
        if pitch < 0.8 {
            "Deep & Warm"
        } else if pitch > 1.2 {
            "Light & Cheerful"
        } else {
            "Natural"
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Where a chunk sits in a multi-chunk narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPosition {
    /// 0-based chunk index
    pub index: usize,
    /// Total chunk count
    pub total: usize,
}

impl ChunkPosition {
    /// Pacing note sent with the chunk. Empty for single-chunk narrations.
    pub fn annotation(&self) -> String {
        if self.total > 1 {
            format!(
                "(Part {} of {}. Maintain consistent storytelling pacing.)",
                self.index + 1,
                self.total
            )
        } else {
            String::new()
        }
    }
}

/// One synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: NarratorVoice,
    pub pitch: PitchBand,
    pub position: ChunkPosition,
}

/// A remote speech service producing raw 16-bit PCM.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Synthesize one chunk.
    ///
    /// Returns `Ok(None)` when the provider answered successfully but
    /// without audio.
    async fn synthesize(&self, request: &SynthesisRequest) -> NarrationResult<Option<Bytes>>;

    /// Sample rate of the returned PCM.
    fn sample_rate(&self) -> u32;

    /// Channel count of the returned PCM.
    fn channels(&self) -> u16 {
        1
    }

    /// Provider name for logs.
    fn name(&self) -> &'static str;
}
