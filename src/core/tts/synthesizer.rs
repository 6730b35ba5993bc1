//! Narration synthesizer: story text in, one assembled buffer out.
//!
//! The text is segmented, each chunk is synthesized in order under the retry
//! policy with a fixed pause between calls, payloads are decoded, and the
//! decoded segments are concatenated. Chunks that come back without audio are
//! skipped; if none produce audio the caller gets
//! [`NarrationOutcome::NoAudioProduced`] and is expected to fall back.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::base::{
    ChunkPosition, NarrationError, NarrationResult, NarratorVoice, PitchBand, SpeechProvider,
    SynthesisRequest,
};
use crate::core::audio::{AudioBuffer, AudioSegment, concatenate, decode};
use crate::core::retry::RetryPolicy;
use crate::core::text::{DEFAULT_MAX_CHUNK_CHARS, TextChunk, segment};

/// Default pause between successive chunk calls (milliseconds).
pub const DEFAULT_CHUNK_DELAY_MS: u64 = 500;

/// Accepted pitch preference range.
pub const MIN_PITCH: f32 = 0.5;
pub const MAX_PITCH: f32 = 1.5;

/// Tuning for one synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynthesizerSettings {
    /// Longest chunk sent in one call, in characters.
    /// Default: 3000
    pub max_chunk_chars: usize,

    /// Pause before every chunk after the first (milliseconds).
    /// Default: 500ms
    pub chunk_delay_ms: u64,

    /// Rate-limit retry policy applied per chunk.
    pub retry: RetryPolicy,
}

impl Default for SynthesizerSettings {
    fn default() -> Self {
        Self {
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            chunk_delay_ms: DEFAULT_CHUNK_DELAY_MS,
            retry: RetryPolicy::default(),
        }
    }
}

impl SynthesizerSettings {
    #[inline]
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }
}

/// Result of narrating a whole text.
#[derive(Debug, Clone, PartialEq)]
pub enum NarrationOutcome {
    /// At least one chunk produced audio
    Audio(AudioBuffer),
    /// Every chunk came back empty, or there was nothing to say
    NoAudioProduced,
    /// The token was cancelled; partial results were discarded
    Cancelled,
}

/// Sequential chunked synthesis over a [`SpeechProvider`].
#[derive(Clone)]
pub struct NarrationSynthesizer {
    provider: Arc<dyn SpeechProvider>,
    settings: SynthesizerSettings,
}

impl NarrationSynthesizer {
    pub fn new(provider: Arc<dyn SpeechProvider>, settings: SynthesizerSettings) -> Self {
        Self { provider, settings }
    }

    pub fn settings(&self) -> &SynthesizerSettings {
        &self.settings
    }

    /// Synthesize and decode one chunk, retrying rate limits.
    ///
    /// `Ok(None)` means the provider returned no usable audio.
    pub async fn synthesize(
        &self,
        chunk: &TextChunk,
        total: usize,
        voice: NarratorVoice,
        pitch: PitchBand,
    ) -> NarrationResult<Option<AudioSegment>> {
        let request = SynthesisRequest {
            text: chunk.text.clone(),
            voice,
            pitch,
            position: ChunkPosition {
                index: chunk.index,
                total,
            },
        };

        let provider = self.provider.clone();
        let payload = self
            .settings
            .retry
            .run(|| {
                let provider = provider.clone();
                let request = request.clone();
                async move { provider.synthesize(&request).await }
            })
            .await?;

        let Some(raw) = payload.filter(|raw| !raw.is_empty()) else {
            return Ok(None);
        };
        let segment = decode(&raw, self.provider.sample_rate(), self.provider.channels())?;
        Ok(if segment.is_empty() { None } else { Some(segment) })
    }

    /// Narrate `text` with the given voice and pitch preference.
    ///
    /// Chunks are synthesized strictly one after another. The token is checked
    /// before each call, during the inter-chunk pause, and after each call.
    pub async fn narrate(
        &self,
        text: &str,
        voice: NarratorVoice,
        pitch: f32,
        cancel: &CancellationToken,
    ) -> NarrationResult<NarrationOutcome> {
        let chunks = segment(text, self.settings.max_chunk_chars);
        let total = chunks.len();
        let band = PitchBand::from_pitch(pitch.clamp(MIN_PITCH, MAX_PITCH));
        info!(
            provider = self.provider.name(),
            chunks = total,
            voice = voice.as_str(),
            "Starting narration"
        );

        let mut segments = Vec::with_capacity(total);
        for chunk in &chunks {
            if chunk.index > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(NarrationOutcome::Cancelled),
                    _ = tokio::time::sleep(self.settings.chunk_delay()) => {}
                }
            }
            if cancel.is_cancelled() {
                return Ok(NarrationOutcome::Cancelled);
            }

            let result = self.synthesize(chunk, total, voice, band).await;
            if cancel.is_cancelled() {
                debug!(chunk = chunk.index, "Discarding chunk result after cancellation");
                return Ok(NarrationOutcome::Cancelled);
            }

            match result? {
                Some(segment) => segments.push(segment),
                None => debug!(chunk = chunk.index, "Chunk produced no audio, skipping"),
            }
        }

        if segments.is_empty() {
            info!("Narration produced no audio");
            return Ok(NarrationOutcome::NoAudioProduced);
        }

        let produced = segments.len();
        let buffer = concatenate(segments).map_err(NarrationError::from)?;
        info!(
            segments = produced,
            frames = buffer.len(),
            seconds = buffer.duration().as_secs_f32(),
            "Narration assembled"
        );
        Ok(NarrationOutcome::Audio(buffer))
    }
}
