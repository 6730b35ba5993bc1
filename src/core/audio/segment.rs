//! PCM decoding and lossless concatenation.
//!
//! Speech providers return interleaved 16-bit signed little-endian PCM. Each
//! response is decoded into an [`AudioSegment`] of normalized per-channel
//! samples, and the ordered segments of one narration are joined into a
//! single [`AudioBuffer`] with no gaps, resampling or cross-fade.

use std::time::Duration;

use thiserror::Error;

/// Scale factor for converting PCM 16-bit samples to normalized float [-1.0, 1.0).
const PCM_TO_FLOAT_SCALE: f32 = 1.0 / 32768.0;

/// Errors raised while decoding or assembling audio.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    /// Raw payload length is not a whole number of 16-bit frames
    #[error("PCM payload of {len} bytes is not a whole number of {channels}-channel 16-bit frames")]
    OddByteCount { len: usize, channels: u16 },

    /// Zero channels requested
    #[error("Invalid channel count: {0}")]
    InvalidChannelCount(u16),

    /// Segments disagree on sample rate or channel layout
    #[error(
        "Segment format mismatch: expected {expected_rate}Hz/{expected_channels}ch, got {rate}Hz/{channels}ch"
    )]
    FormatMismatch {
        expected_rate: u32,
        expected_channels: u16,
        rate: u32,
        channels: u16,
    },

    /// Channels of different lengths
    #[error("Channels have different lengths")]
    RaggedChannels,

    /// Nothing to assemble
    #[error("No audio segments to concatenate")]
    Empty,

    /// Output sink failure
    #[error("Audio sink error: {0}")]
    Sink(String),
}

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;

/// Decoded audio: per-channel normalized samples at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

/// The assembled narration. Same layout as a segment; produced by
/// [`concatenate`] and owned by the playback controller afterwards.
pub type AudioBuffer = AudioSegment;

impl AudioSegment {
    /// Build a segment from per-channel samples.
    ///
    /// All channels must have the same length.
    pub fn from_channels(sample_rate: u32, channels: Vec<Vec<f32>>) -> AudioResult<Self> {
        if channels.is_empty() {
            return Err(AudioError::InvalidChannelCount(0));
        }
        let frames = channels[0].len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(AudioError::RaggedChannels);
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    /// Mono segment from samples.
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    /// Sample rate in Hz.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels.
    #[inline]
    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Length in frames (samples per channel).
    #[inline]
    pub fn len(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples of one channel.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Playback duration at 1x.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.len() as f64 / self.sample_rate as f64)
    }

    /// Interleave frames `[start, end)` into `out` (appends).
    pub fn interleave_into(&self, start: usize, end: usize, out: &mut Vec<f32>) {
        let end = end.min(self.len());
        if start >= end {
            return;
        }
        out.reserve((end - start) * self.channels.len());
        for frame in start..end {
            for channel in &self.channels {
                out.push(channel[frame]);
            }
        }
    }
}

/// Decode interleaved 16-bit signed little-endian PCM.
///
/// Each sample is divided by 32768, giving values in [-1.0, 1.0).
pub fn decode(raw: &[u8], sample_rate: u32, channel_count: u16) -> AudioResult<AudioSegment> {
    if channel_count == 0 {
        return Err(AudioError::InvalidChannelCount(0));
    }
    let frame_bytes = 2 * channel_count as usize;
    if raw.len() % frame_bytes != 0 {
        return Err(AudioError::OddByteCount {
            len: raw.len(),
            channels: channel_count,
        });
    }

    let frames = raw.len() / frame_bytes;
    let mut channels: Vec<Vec<f32>> = (0..channel_count)
        .map(|_| Vec::with_capacity(frames))
        .collect();

    for (i, pair) in raw.chunks_exact(2).enumerate() {
        let sample = i16::from_le_bytes([pair[0], pair[1]]);
        channels[i % channel_count as usize].push(sample as f32 * PCM_TO_FLOAT_SCALE);
    }

    Ok(AudioSegment {
        sample_rate,
        channels,
    })
}

/// Join ordered segments into one buffer.
///
/// All segments must share sample rate and channel count. The output length
/// is exactly the sum of the input lengths. A single segment is returned as
/// is.
pub fn concatenate(segments: Vec<AudioSegment>) -> AudioResult<AudioBuffer> {
    let mut iter = segments.into_iter();
    let first = iter.next().ok_or(AudioError::Empty)?;
    let rest: Vec<AudioSegment> = iter.collect();
    if rest.is_empty() {
        return Ok(first);
    }

    let rate = first.sample_rate;
    let channel_count = first.channel_count();
    for seg in &rest {
        if seg.sample_rate != rate || seg.channel_count() != channel_count {
            return Err(AudioError::FormatMismatch {
                expected_rate: rate,
                expected_channels: channel_count,
                rate: seg.sample_rate,
                channels: seg.channel_count(),
            });
        }
    }

    let total = first.len() + rest.iter().map(AudioSegment::len).sum::<usize>();
    let mut channels = first.channels;
    for channel in &mut channels {
        channel.reserve(total - channel.len());
    }
    for seg in rest {
        for (dst, src) in channels.iter_mut().zip(seg.channels) {
            dst.extend_from_slice(&src);
        }
    }

    Ok(AudioSegment {
        sample_rate: rate,
        channels,
    })
}
