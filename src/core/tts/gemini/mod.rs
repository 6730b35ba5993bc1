//! Gemini speech synthesis.
//!
//! Narration audio comes from the Gemini `generateContent` endpoint with the
//! `AUDIO` response modality. The response carries base64 encoded 16-bit mono
//! PCM at 24 kHz in `candidates[0].content.parts[0].inlineData.data`.
//!
//! # API Reference
//!
//! - Endpoint: `POST {base}/models/{model}:generateContent`
//! - Auth: `x-goog-api-key` header
//! - Voices: Kore, Puck, Charon, Fenrir, Zephyr

pub mod config;
pub mod messages;
pub mod provider;

pub use config::GeminiSpeechConfig;
pub use messages::{Content, GenerateContentRequest, GenerateContentResponse, Part};
pub use provider::GeminiSpeech;

// =============================================================================
// API Constants
// =============================================================================

/// Public Gemini API base URL.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Speech model used for narration.
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";

/// Sample rate of the PCM returned by the speech model.
pub const GEMINI_TTS_SAMPLE_RATE: u32 = 24000;
