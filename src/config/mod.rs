//! Configuration module for the story narrator
//!
//! Handles configuration from .env files, YAML files and environment
//! variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Example
//! ```rust,no_run
//! use story_narrator::config::NarratorConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = NarratorConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = NarratorConfig::from_file(&PathBuf::from("config.yaml"))?;
//! println!("Writing narrations to {}", config.output_dir.display());
//! # Ok(())
//! # }
//! ```

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

mod yaml;

pub use yaml::YamlConfig;

use crate::core::dialogue::GeminiDialogueConfig;
use crate::core::dialogue::gemini::{DEFAULT_DIALOGUE_MODEL, DEFAULT_TEMPERATURE};
use crate::core::playback::{DEFAULT_ESPEAK_BINARY, DEFAULT_FALLBACK_BASE_RATE, EspeakEngine};
use crate::core::retry::{DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_ATTEMPTS, RetryPolicy};
use crate::core::text::DEFAULT_MAX_CHUNK_CHARS;
use crate::core::tts::GeminiSpeechConfig;
use crate::core::tts::gemini::{DEFAULT_TTS_MODEL, GEMINI_BASE_URL, GEMINI_TTS_SAMPLE_RATE};
use crate::core::tts::gemini::config::DEFAULT_TIMEOUT_SECS;
use crate::core::tts::synthesizer::{DEFAULT_CHUNK_DELAY_MS, SynthesizerSettings};

/// Fastest base rate accepted for the fallback voice.
const MAX_FALLBACK_BASE_RATE: f64 = 4.0;

/// Narrator configuration
///
/// Contains everything needed to run a narration session:
/// - Gemini credentials and endpoint
/// - Dialogue model settings
/// - Speech synthesis and retry settings
/// - Fallback voice settings
/// - Output location
#[derive(Clone)]
pub struct NarratorConfig {
    // Provider settings
    /// Gemini API key, shared by dialogue and narration
    pub gemini_api_key: Option<String>,
    /// Default: `https://generativelanguage.googleapis.com/v1beta`
    pub gemini_base_url: String,
    /// Per-request timeout for provider calls.
    /// Default: 60
    pub request_timeout_secs: u64,

    // Dialogue settings
    /// Default: `gemini-3-flash-preview`
    pub dialogue_model: String,
    /// Default: 0.8
    pub dialogue_temperature: f32,

    // Narration settings
    /// Default: `gemini-2.5-flash-preview-tts`
    pub tts_model: String,
    /// Sample rate of provider audio (Hz).
    /// Default: 24000
    pub sample_rate: u32,
    /// Default: 3000
    pub max_chunk_chars: usize,
    /// Default: 500
    pub chunk_delay_ms: u64,
    /// Default: 3
    pub retry_max_attempts: u32,
    /// Default: 1000
    pub retry_initial_delay_ms: u64,

    // Fallback settings
    /// Default: 0.85
    pub fallback_base_rate: f64,
    /// Default: `espeak-ng`
    pub espeak_binary: String,

    // Output settings
    /// Directory narrations are written to.
    /// Default: `.`
    pub output_dir: PathBuf,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_base_url: GEMINI_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            dialogue_model: DEFAULT_DIALOGUE_MODEL.to_string(),
            dialogue_temperature: DEFAULT_TEMPERATURE,
            tts_model: DEFAULT_TTS_MODEL.to_string(),
            sample_rate: GEMINI_TTS_SAMPLE_RATE,
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            chunk_delay_ms: DEFAULT_CHUNK_DELAY_MS,
            retry_max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            fallback_base_rate: DEFAULT_FALLBACK_BASE_RATE,
            espeak_binary: DEFAULT_ESPEAK_BINARY.to_string(),
            output_dir: PathBuf::from("."),
        }
    }
}

impl fmt::Debug for NarratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NarratorConfig")
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("gemini_base_url", &self.gemini_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("dialogue_model", &self.dialogue_model)
            .field("dialogue_temperature", &self.dialogue_temperature)
            .field("tts_model", &self.tts_model)
            .field("sample_rate", &self.sample_rate)
            .field("max_chunk_chars", &self.max_chunk_chars)
            .field("chunk_delay_ms", &self.chunk_delay_ms)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_initial_delay_ms", &self.retry_initial_delay_ms)
            .field("fallback_base_rate", &self.fallback_base_rate)
            .field("espeak_binary", &self.espeak_binary)
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

/// Zeroize the API key when the configuration is dropped.
impl Drop for NarratorConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.gemini_api_key {
            key.zeroize();
        }
    }
}

/// Read and parse an environment variable. Unset or blank yields `None`.
fn env_parse<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name}: {e}")),
        _ => Ok(None),
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl NarratorConfig {
    /// Load configuration from environment variables over defaults
    ///
    /// The .env file is loaded in main.rs at startup, so its values are
    /// already visible here with real environment variables taking priority.
    ///
    /// # Errors
    /// Returns an error if a variable has an invalid format or validation fails.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Self::env_layer()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, an environment
    /// variable is malformed, or validation of the merged result fails.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = YamlConfig::from_file(path)?;
        let mut config = Self::env_layer()?;
        config.apply_yaml(yaml_config);
        config.validate()?;
        Ok(config)
    }

    fn env_layer() -> Result<Self, String> {
        let mut config = Self::default();

        config.gemini_api_key = env_string("GEMINI_API_KEY").or_else(|| env_string("API_KEY"));
        if let Some(url) = env_string("GEMINI_BASE_URL") {
            config.gemini_base_url = url;
        }
        if let Some(secs) = env_parse("REQUEST_TIMEOUT_SECS")? {
            config.request_timeout_secs = secs;
        }
        if let Some(model) = env_string("DIALOGUE_MODEL") {
            config.dialogue_model = model;
        }
        if let Some(temperature) = env_parse("DIALOGUE_TEMPERATURE")? {
            config.dialogue_temperature = temperature;
        }
        if let Some(model) = env_string("TTS_MODEL") {
            config.tts_model = model;
        }
        if let Some(rate) = env_parse("NARRATION_SAMPLE_RATE")? {
            config.sample_rate = rate;
        }
        if let Some(chars) = env_parse("NARRATION_MAX_CHUNK_CHARS")? {
            config.max_chunk_chars = chars;
        }
        if let Some(delay) = env_parse("NARRATION_CHUNK_DELAY_MS")? {
            config.chunk_delay_ms = delay;
        }
        if let Some(attempts) = env_parse("NARRATION_RETRY_ATTEMPTS")? {
            config.retry_max_attempts = attempts;
        }
        if let Some(delay) = env_parse("NARRATION_RETRY_DELAY_MS")? {
            config.retry_initial_delay_ms = delay;
        }
        if let Some(rate) = env_parse("FALLBACK_BASE_RATE")? {
            config.fallback_base_rate = rate;
        }
        if let Some(binary) = env_string("ESPEAK_BINARY") {
            config.espeak_binary = binary;
        }
        if let Some(dir) = env_string("NARRATION_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) {
        if let Some(providers) = yaml.providers {
            if let Some(key) = providers.gemini_api_key {
                self.gemini_api_key = Some(key);
            }
            if let Some(url) = providers.gemini_base_url {
                self.gemini_base_url = url;
            }
            if let Some(secs) = providers.request_timeout_secs {
                self.request_timeout_secs = secs;
            }
        }
        if let Some(dialogue) = yaml.dialogue {
            if let Some(model) = dialogue.model {
                self.dialogue_model = model;
            }
            if let Some(temperature) = dialogue.temperature {
                self.dialogue_temperature = temperature;
            }
        }
        if let Some(narration) = yaml.narration {
            if let Some(model) = narration.model {
                self.tts_model = model;
            }
            if let Some(rate) = narration.sample_rate {
                self.sample_rate = rate;
            }
            if let Some(chars) = narration.max_chunk_chars {
                self.max_chunk_chars = chars;
            }
            if let Some(delay) = narration.chunk_delay_ms {
                self.chunk_delay_ms = delay;
            }
            if let Some(retry) = narration.retry {
                if let Some(attempts) = retry.max_attempts {
                    self.retry_max_attempts = attempts;
                }
                if let Some(delay) = retry.initial_delay_ms {
                    self.retry_initial_delay_ms = delay;
                }
            }
        }
        if let Some(fallback) = yaml.fallback {
            if let Some(rate) = fallback.base_rate {
                self.fallback_base_rate = rate;
            }
            if let Some(binary) = fallback.espeak_binary {
                self.espeak_binary = binary;
            }
        }
        if let Some(dir) = yaml.output.and_then(|o| o.dir) {
            self.output_dir = PathBuf::from(dir);
        }
    }

    /// Validate the merged configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("Sample rate must be greater than 0".to_string());
        }
        if self.max_chunk_chars == 0 {
            return Err("Maximum chunk size must be greater than 0".to_string());
        }
        if self.retry_max_attempts == 0 {
            return Err("Retry attempts must be at least 1".to_string());
        }
        if !(self.fallback_base_rate > 0.0 && self.fallback_base_rate <= MAX_FALLBACK_BASE_RATE) {
            return Err(format!(
                "Fallback base rate must be in (0, {MAX_FALLBACK_BASE_RATE}], got {}",
                self.fallback_base_rate
            ));
        }
        if !(0.0..=2.0).contains(&self.dialogue_temperature) {
            return Err(format!(
                "Dialogue temperature must be between 0.0 and 2.0, got {}",
                self.dialogue_temperature
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The API key, or an error naming the variables that provide it.
    pub fn require_api_key(&self) -> Result<&str, String> {
        self.gemini_api_key
            .as_deref()
            .ok_or_else(|| "Gemini API key not configured (set GEMINI_API_KEY)".to_string())
    }

    /// Build the speech provider configuration.
    pub fn speech_config(&self) -> Result<GeminiSpeechConfig, String> {
        Ok(GeminiSpeechConfig::new(self.require_api_key()?)
            .with_base_url(self.gemini_base_url.as_str())
            .with_model(self.tts_model.as_str())
            .with_sample_rate(self.sample_rate)
            .with_timeout(self.request_timeout()))
    }

    /// Build the dialogue provider configuration.
    pub fn dialogue_config(&self) -> Result<GeminiDialogueConfig, String> {
        Ok(GeminiDialogueConfig::new(self.require_api_key()?)
            .with_base_url(self.gemini_base_url.as_str())
            .with_model(self.dialogue_model.as_str())
            .with_temperature(self.dialogue_temperature)
            .with_timeout(self.request_timeout()))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_initial_delay_ms),
        )
    }

    pub fn synthesizer_settings(&self) -> SynthesizerSettings {
        SynthesizerSettings {
            max_chunk_chars: self.max_chunk_chars,
            chunk_delay_ms: self.chunk_delay_ms,
            retry: self.retry_policy(),
        }
    }

    pub fn espeak_engine(&self) -> EspeakEngine {
        EspeakEngine::new(self.espeak_binary.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    const VARS: &[&str] = &[
        "GEMINI_API_KEY",
        "API_KEY",
        "GEMINI_BASE_URL",
        "REQUEST_TIMEOUT_SECS",
        "DIALOGUE_MODEL",
        "DIALOGUE_TEMPERATURE",
        "TTS_MODEL",
        "NARRATION_SAMPLE_RATE",
        "NARRATION_MAX_CHUNK_CHARS",
        "NARRATION_CHUNK_DELAY_MS",
        "NARRATION_RETRY_ATTEMPTS",
        "NARRATION_RETRY_DELAY_MS",
        "FALLBACK_BASE_RATE",
        "ESPEAK_BINARY",
        "NARRATION_OUTPUT_DIR",
    ];

    fn cleanup_env_vars() {
        unsafe {
            for var in VARS {
                env::remove_var(var);
            }
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();

        let config = NarratorConfig::from_env().unwrap();
        assert_eq!(config.gemini_api_key, None);
        assert_eq!(config.gemini_base_url, GEMINI_BASE_URL);
        assert_eq!(config.dialogue_model, "gemini-3-flash-preview");
        assert_eq!(config.tts_model, "gemini-2.5-flash-preview-tts");
        assert_eq!(config.sample_rate, 24000);
        assert_eq!(config.max_chunk_chars, 3000);
        assert_eq!(config.chunk_delay_ms, 500);
        assert_eq!(config.retry_max_attempts, 3);
        assert_eq!(config.retry_initial_delay_ms, 1000);
        assert_eq!(config.fallback_base_rate, 0.85);
        assert_eq!(config.espeak_binary, "espeak-ng");
        assert_eq!(config.output_dir, PathBuf::from("."));
    }

    #[test]
    #[serial]
    fn test_from_env_values() {
        cleanup_env_vars();
        unsafe {
            env::set_var("API_KEY", "fallback-key");
            env::set_var("NARRATION_SAMPLE_RATE", "16000");
            env::set_var("NARRATION_RETRY_ATTEMPTS", "5");
            env::set_var("FALLBACK_BASE_RATE", "0.9");
            env::set_var("NARRATION_OUTPUT_DIR", "/tmp/stories");
        }

        let config = NarratorConfig::from_env().unwrap();
        assert_eq!(config.gemini_api_key, Some("fallback-key".to_string()));
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.retry_max_attempts, 5);
        assert_eq!(config.fallback_base_rate, 0.9);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/stories"));

        unsafe {
            env::set_var("GEMINI_API_KEY", "primary-key");
        }
        let config = NarratorConfig::from_env().unwrap();
        assert_eq!(config.gemini_api_key, Some("primary-key".to_string()));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_number() {
        cleanup_env_vars();
        unsafe {
            env::set_var("NARRATION_CHUNK_DELAY_MS", "soon");
        }

        let err = NarratorConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("NARRATION_CHUNK_DELAY_MS"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_validation_failure() {
        cleanup_env_vars();
        unsafe {
            env::set_var("NARRATION_RETRY_ATTEMPTS", "0");
        }

        assert!(NarratorConfig::from_env().is_err());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        let yaml_content = r#"
providers:
  gemini_api_key: "yaml-key"

narration:
  chunk_delay_ms: 100
  retry:
    initial_delay_ms: 250
"#;
        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            env::set_var("GEMINI_API_KEY", "env-key");
            env::set_var("NARRATION_CHUNK_DELAY_MS", "900");
            env::set_var("TTS_MODEL", "env-tts");
        }

        let config = NarratorConfig::from_file(&config_path).unwrap();
        // YAML overrides ENV
        assert_eq!(config.gemini_api_key, Some("yaml-key".to_string()));
        assert_eq!(config.chunk_delay_ms, 100);
        assert_eq!(config.retry_initial_delay_ms, 250);
        // ENV value
        assert_eq!(config.tts_model, "env-tts");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_rejects_invalid_values() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "fallback:\n  base_rate: 0.0\n").unwrap();

        let err = NarratorConfig::from_file(&config_path).unwrap_err();
        assert!(err.to_string().contains("Fallback base rate"));

        cleanup_env_vars();
    }

    #[test]
    fn test_validate() {
        let mut config = NarratorConfig::default();
        assert!(config.validate().is_ok());

        config.sample_rate = 0;
        assert!(config.validate().is_err());

        let mut config = NarratorConfig::default();
        config.max_chunk_chars = 0;
        assert!(config.validate().is_err());

        let mut config = NarratorConfig::default();
        config.fallback_base_rate = 4.5;
        assert!(config.validate().is_err());

        let mut config = NarratorConfig::default();
        config.dialogue_temperature = 3.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_configs_require_key() {
        let config = NarratorConfig::default();
        assert!(config.speech_config().is_err());
        assert!(config.dialogue_config().is_err());

        let mut config = NarratorConfig::default();
        config.gemini_api_key = Some("key".to_string());
        config.tts_model = "custom-tts".to_string();
        let speech = config.speech_config().unwrap();
        assert!(speech.endpoint().ends_with("/models/custom-tts:generateContent"));
        assert!(config.dialogue_config().unwrap().validate().is_ok());
    }

    #[test]
    fn test_synthesizer_settings() {
        let mut config = NarratorConfig::default();
        config.chunk_delay_ms = 50;
        config.retry_max_attempts = 4;
        config.retry_initial_delay_ms = 200;
        let settings = config.synthesizer_settings();
        assert_eq!(settings.chunk_delay_ms, 50);
        assert_eq!(settings.retry.max_attempts, 4);
        assert_eq!(settings.retry.initial_delay_ms, 200);
        assert_eq!(settings.max_chunk_chars, 3000);
    }

    #[test]
    fn test_debug_redacts_key() {
        let mut config = NarratorConfig::default();
        config.gemini_api_key = Some("super-secret".to_string());
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
