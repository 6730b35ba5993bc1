//! Local fallback speech.
//!
//! When the speech provider yields no audio, the whole story text is spoken by
//! a locally installed engine instead. [`EspeakEngine`] runs `espeak-ng`,
//! which renders a WAV file to stdout; the PCM is decoded with the same
//! assembler used for provider audio.

use std::io::Cursor;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::engine::{PlaybackError, PlaybackResult};
use crate::core::audio::{AudioBuffer, decode};
use crate::core::dialogue::StoryLanguage;

/// Default executable name.
pub const DEFAULT_ESPEAK_BINARY: &str = "espeak-ng";

/// Slow base rate for bedtime narration by the local engine.
pub const DEFAULT_FALLBACK_BASE_RATE: f64 = 0.85;

/// What the local engine should say.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackRequest {
    pub text: String,
    /// Used for best-effort voice selection
    pub language: StoryLanguage,
    /// Listener pitch preference, nominally 0.5–1.5
    pub pitch: f32,
}

/// A speech capability available without the network.
#[async_trait]
pub trait LocalSpeechEngine: Send + Sync {
    /// Render the whole text to audio.
    async fn render(&self, request: &FallbackRequest) -> PlaybackResult<AudioBuffer>;

    fn name(&self) -> &'static str;
}

/// `espeak-ng` pitch (0–99, 50 is neutral) for a pitch preference.
pub fn espeak_pitch(pitch: f32) -> u8 {
    if !pitch.is_finite() {
        return 50;
    }
    (pitch * 50.0).round().clamp(0.0, 99.0) as u8
}

/// `espeak-ng` backed engine.
#[derive(Debug, Clone)]
pub struct EspeakEngine {
    binary: String,
}

impl Default for EspeakEngine {
    fn default() -> Self {
        Self::new(DEFAULT_ESPEAK_BINARY)
    }
}

impl EspeakEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

impl EspeakEngine {
    /// Run the engine once. `voice` of `None` leaves the choice to espeak.
    async fn run(&self, voice: Option<&str>, pitch: u8, text: &str) -> PlaybackResult<Vec<u8>> {
        let mut command = Command::new(&self.binary);
        command.arg("--stdout");
        if let Some(voice) = voice {
            command.arg("-v").arg(voice);
        }
        let output = command
            .arg("-p")
            .arg(pitch.to_string())
            .arg("--")
            .arg(text)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PlaybackError::Fallback(format!("Failed to run {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlaybackError::Fallback(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl LocalSpeechEngine for EspeakEngine {
    async fn render(&self, request: &FallbackRequest) -> PlaybackResult<AudioBuffer> {
        let voice = request.language.code();
        let pitch = espeak_pitch(request.pitch);
        debug!(
            binary = %self.binary,
            voice,
            pitch,
            chars = request.text.chars().count(),
            "Rendering fallback speech"
        );

        // Voice selection is best effort: a build without this voice still
        // speaks with its default one.
        let wav = match self.run(Some(voice), pitch, &request.text).await {
            Ok(wav) => wav,
            Err(e) => {
                warn!(voice, "Fallback voice unavailable, using engine default: {}", e);
                self.run(None, pitch, &request.text).await?
            }
        };

        parse_wav(&wav)
    }

    fn name(&self) -> &'static str {
        "espeak-ng"
    }
}

/// Decode a 16-bit PCM WAV stream.
///
/// Streams written to a pipe carry placeholder sizes in the header, so only
/// the header is taken from `hound`; everything after it is treated as sample
/// data and a trailing partial frame is dropped.
pub fn parse_wav(bytes: &[u8]) -> PlaybackResult<AudioBuffer> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| PlaybackError::Fallback(format!("Invalid WAV output: {e}")))?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(PlaybackError::Fallback(format!(
            "Unsupported WAV format: {:?} {} bits",
            spec.sample_format, spec.bits_per_sample
        )));
    }

    let cursor = reader.into_inner();
    let start = (cursor.position() as usize).min(bytes.len());
    let data = &bytes[start..];
    let frame = 2 * spec.channels.max(1) as usize;
    let whole = data.len() - data.len() % frame;

    let buffer = decode(&data[..whole], spec.sample_rate, spec.channels)
        .map_err(|e| PlaybackError::Fallback(e.to_string()))?;
    if buffer.is_empty() {
        return Err(PlaybackError::Fallback("Engine produced no audio".to_string()));
    }
    Ok(buffer)
}
