//! Audio output sinks.
//!
//! The player pushes interleaved normalized samples to an [`AudioSink`] as
//! playback advances. An [`AudioOutput`] opens one sink per playback session.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::segment::{AudioError, AudioResult};

/// Destination for played samples.
pub trait AudioSink: Send {
    /// Accept interleaved samples in [-1.0, 1.0).
    fn write(&mut self, interleaved: &[f32]) -> AudioResult<()>;

    /// Flush and release the output. Called once, on completion or stop.
    fn finish(&mut self) -> AudioResult<()>;
}

/// Opens a sink for each playback session.
pub trait AudioOutput: Send + Sync {
    fn open(&self, sample_rate: u32, channels: u16) -> AudioResult<Box<dyn AudioSink>>;
}

// =============================================================================
// WAV file output
// =============================================================================

/// Writes every playback session to a numbered 16-bit WAV file.
pub struct WavFileOutput {
    dir: PathBuf,
    prefix: String,
    counter: AtomicU64,
}

impl WavFileOutput {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }

    fn next_path(&self) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.dir.join(format!("{}-{:03}.wav", self.prefix, n))
    }
}

impl AudioOutput for WavFileOutput {
    fn open(&self, sample_rate: u32, channels: u16) -> AudioResult<Box<dyn AudioSink>> {
        let path = self.next_path();
        Ok(Box::new(WavFileSink::create(&path, sample_rate, channels)?))
    }
}

/// A single WAV file being written.
pub struct WavFileSink {
    path: PathBuf,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
}

impl WavFileSink {
    pub fn create(path: &Path, sample_rate: u32, channels: u16) -> AudioResult<Self> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec)
            .map_err(|e| AudioError::Sink(format!("Failed to create {}: {e}", path.display())))?;
        debug!("Opened WAV sink at {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AudioSink for WavFileSink {
    fn write(&mut self, interleaved: &[f32]) -> AudioResult<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(AudioError::Sink("WAV sink already finished".to_string()));
        };
        for &sample in interleaved {
            let value = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            writer
                .write_sample(value)
                .map_err(|e| AudioError::Sink(format!("WAV write failed: {e}")))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> AudioResult<()> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| AudioError::Sink(format!("WAV finalize failed: {e}")))?;
            info!("Narration written to {}", self.path.display());
        }
        Ok(())
    }
}

// =============================================================================
// In-memory and null outputs
// =============================================================================

/// Captures everything played, across sessions. Clones share the capture.
#[derive(Clone, Default)]
pub struct MemoryOutput {
    captured: Arc<Mutex<Vec<f32>>>,
    opened: Arc<AtomicU64>,
    finished: Arc<AtomicU64>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interleaved samples written so far.
    pub fn samples(&self) -> Vec<f32> {
        self.captured.lock().clone()
    }

    pub fn sample_count(&self) -> usize {
        self.captured.lock().len()
    }

    /// Number of sinks opened.
    pub fn sessions_opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of sinks released.
    pub fn sessions_finished(&self) -> u64 {
        self.finished.load(Ordering::SeqCst)
    }
}

impl AudioOutput for MemoryOutput {
    fn open(&self, _sample_rate: u32, _channels: u16) -> AudioResult<Box<dyn AudioSink>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySink {
            captured: self.captured.clone(),
            finished: self.finished.clone(),
            done: false,
        }))
    }
}

struct MemorySink {
    captured: Arc<Mutex<Vec<f32>>>,
    finished: Arc<AtomicU64>,
    done: bool,
}

impl AudioSink for MemorySink {
    fn write(&mut self, interleaved: &[f32]) -> AudioResult<()> {
        self.captured.lock().extend_from_slice(interleaved);
        Ok(())
    }

    fn finish(&mut self) -> AudioResult<()> {
        if !self.done {
            self.done = true;
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Discards all samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOutput;

impl AudioOutput for NullOutput {
    fn open(&self, _sample_rate: u32, _channels: u16) -> AudioResult<Box<dyn AudioSink>> {
        Ok(Box::new(NullOutput))
    }
}

impl AudioSink for NullOutput {
    fn write(&mut self, _interleaved: &[f32]) -> AudioResult<()> {
        Ok(())
    }

    fn finish(&mut self) -> AudioResult<()> {
        Ok(())
    }
}
