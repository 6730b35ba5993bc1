//! Gemini chat provider for story turns.
//!
//! Each session keeps its own turn history and replays it with every request,
//! so follow-up turns carry the story context. Replies are streamed with
//! `streamGenerateContent?alt=sse`; every SSE `data:` event is a partial
//! `GenerateContentResponse` whose text is yielded as one fragment.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroize;

use super::base::{ChatSession, DialogueError, DialogueProvider, DialogueResult, FragmentStream, Profile};
use super::prompts::system_instruction;
use crate::core::tts::gemini::GEMINI_BASE_URL;
use crate::core::tts::gemini::messages::{
    Content, ErrorResponse, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    error_message,
};

/// Chat model used for story turns.
pub const DEFAULT_DIALOGUE_MODEL: &str = "gemini-3-flash-preview";

/// Sampling temperature for story turns.
pub const DEFAULT_TEMPERATURE: f32 = 0.8;

// =============================================================================
// Configuration
// =============================================================================

/// Gemini chat settings.
#[derive(Clone)]
pub struct GeminiDialogueConfig {
    pub api_key: String,

    /// Default: https://generativelanguage.googleapis.com/v1beta
    pub base_url: String,

    /// Default: gemini-3-flash-preview
    pub model: String,

    /// Default: 0.8
    pub temperature: f32,

    /// Connect/read timeout for one turn.
    /// Default: 60s
    pub timeout: Duration,
}

impl GeminiDialogueConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            model: DEFAULT_DIALOGUE_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: Duration::from_secs(60),
        }
    }

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
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Streaming endpoint for the configured model.
    pub fn stream_endpoint(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.api_key.trim().is_empty() {
            return Err("Gemini API key is required for storytelling".to_string());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for GeminiDialogueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiDialogueConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl Drop for GeminiDialogueConfig {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

// =============================================================================
// Provider
// =============================================================================

/// Opens Gemini chat sessions.
pub struct GeminiDialogue {
    client: reqwest::Client,
    config: Arc<GeminiDialogueConfig>,
}

impl GeminiDialogue {
    pub fn new(config: GeminiDialogueConfig) -> DialogueResult<Self> {
        config
            .validate()
            .map_err(DialogueError::InvalidConfiguration)?;
        // No overall timeout: a long story streams for a while.
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .build()
            .map_err(|e| DialogueError::InvalidConfiguration(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }
}

#[async_trait]
impl DialogueProvider for GeminiDialogue {
    async fn create(&self, profile: &Profile) -> DialogueResult<Box<dyn ChatSession>> {
        profile.validate()?;
        let session = GeminiChat {
            id: Uuid::new_v4(),
            client: self.client.clone(),
            config: self.config.clone(),
            instruction: Content::instruction(system_instruction(profile)),
            history: Arc::new(Mutex::new(Vec::new())),
        };
        info!(session = %session.id, language = %profile.language, "Created story chat session");
        Ok(Box::new(session))
    }
}

// =============================================================================
// Session
// =============================================================================

/// One Gemini conversation.
pub struct GeminiChat {
    id: Uuid,
    client: reqwest::Client,
    config: Arc<GeminiDialogueConfig>,
    instruction: Content,
    history: Arc<Mutex<Vec<Content>>>,
}

impl GeminiChat {
    /// Completed turns so far (user and model alternating).
    pub fn history(&self) -> Vec<Content> {
        self.history.lock().clone()
    }
}

fn error_from_status(status: u16, body: &str) -> DialogueError {
    let message = error_message(body);
    match status {
        429 => DialogueError::RateLimited(format!("Rate limit exceeded: {message}")),
        400 | 404 => DialogueError::InvalidConfiguration(format!("Bad request ({status}): {message}")),
        _ => DialogueError::Provider(format!("Chat API error ({status}): {message}")),
    }
}

/// Interpret one SSE line.
///
/// Returns the fragment text for `data:` events, `None` for anything else
/// (comments, blank separators, other fields, events without text).
pub fn parse_sse_line(line: &str) -> DialogueResult<Option<String>> {
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return Ok(None);
    }

    if let Ok(err) = serde_json::from_str::<ErrorResponse>(payload) {
        return Err(DialogueError::Provider(format!(
            "Stream error: {}",
            err.error.message
        )));
    }

    let event: GenerateContentResponse = serde_json::from_str(payload)
        .map_err(|e| DialogueError::InvalidResponse(format!("Malformed stream event: {e}")))?;
    let text = event.text();
    Ok(if text.is_empty() { None } else { Some(text) })
}

#[async_trait]
impl ChatSession for GeminiChat {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn send(&mut self, message: &str) -> DialogueResult<FragmentStream> {
        let user_turn = Content::user(message);
        let mut contents = self.history.lock().clone();
        contents.push(user_turn.clone());

        let request = GenerateContentRequest {
            contents,
            system_instruction: Some(self.instruction.clone()),
            generation_config: Some(GenerationConfig::text(self.config.temperature)),
        };

        debug!(session = %self.id, "Sending story turn");
        let response = self
            .client
            .post(self.config.stream_endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| DialogueError::Network(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = error_from_status(status.as_u16(), &body);
            warn!(session = %self.id, status = status.as_u16(), "Story turn rejected: {}", error);
            return Err(error);
        }

        let history = self.history.clone();
        let session_id = self.id;
        let mut body = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut pending: Vec<u8> = Vec::new();
            let mut reply = String::new();

            loop {
                let line = match pending.iter().position(|b| *b == b'\n') {
                    Some(pos) => {
                        let raw: Vec<u8> = pending.drain(..=pos).collect();
                        String::from_utf8_lossy(&raw).trim_end().to_string()
                    }
                    None => match body.next().await {
                        Some(Ok(chunk)) => {
                            pending.extend_from_slice(&chunk);
                            continue;
                        }
                        Some(Err(e)) => {
                            yield Err(DialogueError::Network(format!("Stream interrupted: {e}")));
                            return;
                        }
                        None if pending.is_empty() => break,
                        None => {
                            let raw = std::mem::take(&mut pending);
                            String::from_utf8_lossy(&raw).trim_end().to_string()
                        }
                    },
                };

                match parse_sse_line(&line) {
                    Ok(Some(text)) => {
                        reply.push_str(&text);
                        yield Ok(text);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            debug!(session = %session_id, chars = reply.chars().count(), "Story turn finished");
            history.lock().extend([user_turn, Content::model(reply)]);
        };

        Ok(Box::pin(stream))
    }
}
