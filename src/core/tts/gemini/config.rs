//! Configuration for the Gemini speech provider.

use std::time::Duration;

use zeroize::Zeroize;

use super::{DEFAULT_TTS_MODEL, GEMINI_BASE_URL, GEMINI_TTS_SAMPLE_RATE};

/// Default HTTP timeout for one synthesis call.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Gemini speech provider settings.
#[derive(Clone)]
pub struct GeminiSpeechConfig {
    /// API key sent as `x-goog-api-key`
    pub api_key: String,

    /// API base URL, without trailing slash.
    /// Default: https://generativelanguage.googleapis.com/v1beta
    pub base_url: String,

    /// Speech model name.
    /// Default: gemini-2.5-flash-preview-tts
    pub model: String,

    /// Sample rate of returned PCM.
    /// Default: 24000
    pub sample_rate: u32,

    /// Request timeout.
    /// Default: 60s
    pub timeout: Duration,
}

impl GeminiSpeechConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            model: DEFAULT_TTS_MODEL.to_string(),
            sample_rate: GEMINI_TTS_SAMPLE_RATE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Sets the base URL (used to point at a proxy or a mock server).
    #[inline]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[inline]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[inline]
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full `generateContent` URL for the configured model.
    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.api_key.trim().is_empty() {
            return Err("Gemini API key is required for narration".to_string());
        }
        if self.model.trim().is_empty() {
            return Err("Speech model name must not be empty".to_string());
        }
        if self.sample_rate == 0 {
            return Err("sample_rate must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl std::fmt::Debug for GeminiSpeechConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiSpeechConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("sample_rate", &self.sample_rate)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Drop for GeminiSpeechConfig {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}
