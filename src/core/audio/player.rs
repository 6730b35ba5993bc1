//! Clocked playback of an assembled buffer.
//!
//! A [`ClockedPlayer`] feeds an [`AudioSink`] from a background tokio task at
//! `sample_rate × rate` frames per second of wall-clock time. It supports
//! pause/resume at the exact frame position, live rate changes and immediate
//! stop. Status changes are published on a `watch` channel so owners can
//! react to natural completion.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::segment::AudioBuffer;
use super::sink::AudioSink;

/// How often the playback task pushes samples to the sink.
const TICK: Duration = Duration::from_millis(20);

/// Lowest accepted rate multiplier.
pub const MIN_RATE: f64 = 0.1;
/// Highest accepted rate multiplier.
pub const MAX_RATE: f64 = 4.0;

/// Lifecycle of one player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerStatus {
    Playing,
    Paused,
    /// Every frame reached the sink
    Completed,
    /// Halted by [`ClockedPlayer::stop`]
    Stopped,
    /// The sink rejected samples
    Failed(String),
}

impl PlayerStatus {
    /// Whether the player will produce no more output.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlayerStatus::Completed | PlayerStatus::Stopped | PlayerStatus::Failed(_)
        )
    }
}

struct Cursor {
    position: usize,
    rate: f64,
    paused: bool,
}

struct Shared {
    buffer: Arc<AudioBuffer>,
    cursor: Mutex<Cursor>,
    sink: Mutex<Option<Box<dyn AudioSink>>>,
    resume: Notify,
    cancel: CancellationToken,
    status: watch::Sender<PlayerStatus>,
}

impl Shared {
    /// Release the sink exactly once.
    fn release_sink(&self) {
        if let Some(mut sink) = self.sink.lock().take()
            && let Err(e) = sink.finish()
        {
            warn!("Failed to release audio sink: {}", e);
        }
    }

    fn publish(&self, status: PlayerStatus) {
        self.status.send_if_modified(|current| {
            if current.is_terminal() || *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

/// Plays one buffer into one sink. Dropping the player stops it.
pub struct ClockedPlayer {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl ClockedPlayer {
    /// Start playing `buffer` into `sink` at `rate`. Must be called inside a
    /// tokio runtime.
    pub fn start(buffer: Arc<AudioBuffer>, sink: Box<dyn AudioSink>, rate: f64) -> Self {
        let (status, _) = watch::channel(PlayerStatus::Playing);
        let shared = Arc::new(Shared {
            buffer,
            cursor: Mutex::new(Cursor {
                position: 0,
                rate: clamp_rate(rate),
                paused: false,
            }),
            sink: Mutex::new(Some(sink)),
            resume: Notify::new(),
            cancel: CancellationToken::new(),
            status,
        });

        debug!(
            "Starting playback: {} frames at {}Hz, rate {:.2}",
            shared.buffer.len(),
            shared.buffer.sample_rate(),
            rate
        );
        let task = tokio::spawn(run(shared.clone()));
        Self {
            shared,
            task: Some(task),
        }
    }

    /// Suspend output, keeping the read position.
    pub fn pause(&self) {
        if self.status().is_terminal() {
            return;
        }
        self.shared.cursor.lock().paused = true;
        self.shared.publish(PlayerStatus::Paused);
    }

    /// Continue from the suspended position.
    pub fn resume(&self) {
        if self.status().is_terminal() {
            return;
        }
        self.shared.cursor.lock().paused = false;
        self.shared.publish(PlayerStatus::Playing);
        self.shared.resume.notify_one();
    }

    /// Halt output immediately and release the sink.
    pub fn stop(&self) {
        self.shared.publish(PlayerStatus::Stopped);
        self.shared.cancel.cancel();
        self.shared.release_sink();
    }

    /// Change speed without interrupting output.
    pub fn set_rate(&self, rate: f64) {
        self.shared.cursor.lock().rate = clamp_rate(rate);
    }

    pub fn rate(&self) -> f64 {
        self.shared.cursor.lock().rate
    }

    /// Frames delivered to the sink so far.
    pub fn position(&self) -> usize {
        self.shared.cursor.lock().position
    }

    pub fn buffer(&self) -> &Arc<AudioBuffer> {
        &self.shared.buffer
    }

    pub fn status(&self) -> PlayerStatus {
        self.shared.status.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    /// Receiver for status changes.
    pub fn subscribe(&self) -> watch::Receiver<PlayerStatus> {
        self.shared.status.subscribe()
    }

    /// Wait until the player reaches a terminal status and return it.
    pub async fn wait(&self) -> PlayerStatus {
        let mut rx = self.subscribe();
        match rx.wait_for(PlayerStatus::is_terminal).await {
            Ok(status) => status.clone(),
            Err(_) => self.status(),
        }
    }
}

impl Drop for ClockedPlayer {
    fn drop(&mut self) {
        if !self.shared.status.borrow().is_terminal() {
            self.stop();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_finite() {
        rate.clamp(MIN_RATE, MAX_RATE)
    } else {
        1.0
    }
}

async fn run(shared: Arc<Shared>) {
    let buffer = shared.buffer.clone();
    let total = buffer.len();
    let frames_per_sec = buffer.sample_rate() as f64;

    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();
    let mut carry = 0.0f64;
    let mut scratch: Vec<f32> = Vec::new();

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if shared.cursor.lock().paused {
            tokio::select! {
                _ = shared.cancel.cancelled() => return,
                _ = shared.resume.notified() => {}
            }
            // Time spent paused does not count as played.
            last = Instant::now();
            ticker.reset();
            continue;
        }

        let now = Instant::now();
        let elapsed = now.duration_since(last).as_secs_f64();
        last = now;

        let (start, end) = {
            let mut cursor = shared.cursor.lock();
            let exact = elapsed * frames_per_sec * cursor.rate + carry;
            let whole = exact.floor();
            carry = exact - whole;
            let start = cursor.position;
            let end = (start + whole as usize).min(total);
            cursor.position = end;
            (start, end)
        };

        if end > start {
            scratch.clear();
            buffer.interleave_into(start, end, &mut scratch);
            let written = match shared.sink.lock().as_mut() {
                Some(sink) => sink.write(&scratch),
                // Released by stop()
                None => return,
            };
            if let Err(e) = written {
                warn!("Audio sink rejected samples: {}", e);
                shared.release_sink();
                shared.publish(PlayerStatus::Failed(e.to_string()));
                return;
            }
        }

        if end >= total {
            shared.release_sink();
            shared.publish(PlayerStatus::Completed);
            debug!("Playback completed after {} frames", total);
            return;
        }
    }
}
