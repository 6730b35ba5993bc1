//! Gemini speech provider.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use tracing::{debug, warn};

use super::config::GeminiSpeechConfig;
use super::messages::{Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, error_message};
use crate::core::tts::base::{NarrationError, NarrationResult, SpeechProvider, SynthesisRequest};

/// Build the narration prompt for one chunk.
///
/// `"{annotation} Read this bedtime story part softly and slowly in a {pitch} voice: {text}"`,
/// with the annotation only present for multi-chunk narrations.
pub fn build_prompt(request: &SynthesisRequest) -> String {
    let annotation = request.position.annotation();
    let body = format!(
        "Read this bedtime story part softly and slowly in a {} voice: {}",
        request.pitch.descriptor(),
        request.text
    );
    if annotation.is_empty() {
        body
    } else {
        format!("{annotation} {body}")
    }
}

/// Map a non-success HTTP status to a narration error.
pub(crate) fn error_from_status(status: u16, body: &str) -> NarrationError {
    let message = error_message(body);
    match status {
        429 => NarrationError::RateLimited(format!("Rate limit exceeded: {message}")),
        400 | 404 => NarrationError::InvalidConfiguration(format!("Bad request ({status}): {message}")),
        401 | 403 => NarrationError::Provider(format!("Authentication failed ({status}): {message}")),
        _ => NarrationError::Provider(format!("Speech API error ({status}): {message}")),
    }
}

/// Speech provider backed by the Gemini speech model.
pub struct GeminiSpeech {
    client: reqwest::Client,
    config: GeminiSpeechConfig,
}

impl GeminiSpeech {
    pub fn new(config: GeminiSpeechConfig) -> NarrationResult<Self> {
        config.validate().map_err(NarrationError::InvalidConfiguration)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NarrationError::InvalidConfiguration(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GeminiSpeechConfig {
        &self.config
    }

    fn build_request(&self, request: &SynthesisRequest) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::user(build_prompt(request))],
            system_instruction: None,
            generation_config: Some(GenerationConfig::audio(request.voice.as_str())),
        }
    }
}

#[async_trait]
impl SpeechProvider for GeminiSpeech {
    async fn synthesize(&self, request: &SynthesisRequest) -> NarrationResult<Option<Bytes>> {
        let body = self.build_request(request);
        debug!(
            chunk = request.position.index,
            total = request.position.total,
            voice = request.voice.as_str(),
            chars = request.text.chars().count(),
            "Requesting speech synthesis"
        );

        let response = self
            .client
            .post(self.config.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| NarrationError::Network(format!("Request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| NarrationError::Network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let error = error_from_status(status.as_u16(), &text);
            warn!(status = status.as_u16(), "Speech synthesis failed: {}", error);
            return Err(error);
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|e| NarrationError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let Some(data) = parsed.first_audio() else {
            debug!(chunk = request.position.index, "Provider returned no audio");
            return Ok(None);
        };

        let audio = BASE64
            .decode(data)
            .map_err(|e| NarrationError::InvalidResponse(format!("Invalid base64 audio: {e}")))?;
        debug!(
            chunk = request.position.index,
            audio_bytes = audio.len(),
            "Successfully synthesized audio"
        );
        Ok(Some(Bytes::from(audio)))
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
