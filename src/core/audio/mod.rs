//! Audio assembly and output.

pub mod player;
pub mod segment;
pub mod sink;

pub use player::{ClockedPlayer, PlayerStatus};
pub use segment::{AudioBuffer, AudioError, AudioResult, AudioSegment, concatenate, decode};
pub use sink::{AudioOutput, AudioSink, MemoryOutput, NullOutput, WavFileOutput, WavFileSink};
