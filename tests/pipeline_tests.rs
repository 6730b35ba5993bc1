//! Pipeline Tests
//!
//! Drives the full story pipeline with in-process mock providers: dialogue
//! turns feed the shared story, playback narrates it, and story changes or
//! stop requests tear playback down.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use parking_lot::Mutex;
use uuid::Uuid;

use story_narrator::core::audio::{AudioBuffer, MemoryOutput};
use story_narrator::core::dialogue::FragmentStream;
use story_narrator::core::playback::FallbackRequest;
use story_narrator::core::tts::SynthesisRequest;
use story_narrator::{
    AudioSegment, ChatSession, DialogueError, DialogueProvider, DialogueResult, EngineKind,
    LocalSpeechEngine, NarrationError, NarrationResult, NarrationSynthesizer, NarrationVoice,
    NarratorVoice, PlaybackController, PlaybackError, PlaybackResult, PlaybackState, Profile,
    RetryPolicy, SpeechProvider, StoryContext, StoryLanguage, StoryTeller, StoryTheme,
    SynthesizerSettings, TurnOutcome,
};

// =============================================================================
// Mock Providers
// =============================================================================

#[derive(Clone, Copy)]
enum Reply {
    /// `n` samples of 1 kHz mono PCM
    Audio(usize),
    Nothing,
    RateLimited,
    Fail,
}

/// Speech provider replaying a script, one reply per call. The last reply
/// repeats once the script runs out.
struct MockSpeech {
    script: Mutex<Vec<Reply>>,
    latency: Duration,
    calls: AtomicU32,
    texts: Mutex<Vec<String>>,
}

impl MockSpeech {
    fn new(script: Vec<Reply>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            latency,
            calls: AtomicU32::new(0),
            texts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechProvider for MockSpeech {
    async fn synthesize(&self, request: &SynthesisRequest) -> NarrationResult<Option<Bytes>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().push(request.text.clone());
        tokio::time::sleep(self.latency).await;

        let reply = {
            let mut script = self.script.lock();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script.first().copied().unwrap_or(Reply::Nothing)
            }
        };
        match reply {
            Reply::Audio(n) => Ok(Some(Bytes::from(vec![0u8; n * 2]))),
            Reply::Nothing => Ok(None),
            Reply::RateLimited => Err(NarrationError::RateLimited("429".to_string())),
            Reply::Fail => Err(NarrationError::Provider("unavailable".to_string())),
        }
    }

    fn sample_rate(&self) -> u32 {
        1000
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Local engine producing a fixed length of silence.
struct MockLocalVoice {
    samples: usize,
    fail: bool,
    requests: Mutex<Vec<FallbackRequest>>,
}

impl MockLocalVoice {
    fn new(samples: usize) -> Arc<Self> {
        Arc::new(Self {
            samples,
            fail: false,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn broken() -> Arc<Self> {
        Arc::new(Self {
            samples: 0,
            fail: true,
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LocalSpeechEngine for MockLocalVoice {
    async fn render(&self, request: &FallbackRequest) -> PlaybackResult<AudioBuffer> {
        self.requests.lock().push(request.clone());
        if self.fail {
            return Err(PlaybackError::Fallback("no voice".to_string()));
        }
        Ok(AudioSegment::mono(1000, vec![0.0; self.samples]))
    }

    fn name(&self) -> &'static str {
        "mock-local"
    }
}

struct MockChat {
    turns: Vec<Vec<&'static str>>,
}

#[async_trait]
impl ChatSession for MockChat {
    fn id(&self) -> Uuid {
        Uuid::nil()
    }

    async fn send(&mut self, _message: &str) -> DialogueResult<FragmentStream> {
        let turn = if self.turns.is_empty() {
            Vec::new()
        } else {
            self.turns.remove(0)
        };
        Ok(Box::pin(stream::iter(
            turn.into_iter()
                .map(|f| Ok::<String, DialogueError>(f.to_string())),
        )))
    }
}

struct MockDialogue {
    turns: Mutex<Vec<Vec<&'static str>>>,
}

#[async_trait]
impl DialogueProvider for MockDialogue {
    async fn create(&self, _profile: &Profile) -> DialogueResult<Box<dyn ChatSession>> {
        Ok(Box::new(MockChat {
            turns: std::mem::take(&mut *self.turns.lock()),
        }))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn settings() -> SynthesizerSettings {
    SynthesizerSettings {
        max_chunk_chars: 3000,
        chunk_delay_ms: 500,
        retry: RetryPolicy::new(3, Duration::from_millis(1000)),
    }
}

fn controller(
    speech: Arc<MockSpeech>,
    local: Arc<MockLocalVoice>,
    output: &MemoryOutput,
) -> PlaybackController {
    PlaybackController::new(
        NarrationSynthesizer::new(speech, settings()),
        local,
        Arc::new(output.clone()),
    )
}

fn finished_story(text: &str) -> Arc<StoryContext> {
    let story = Arc::new(StoryContext::new());
    let epoch = story.begin_story();
    story.append(epoch, text);
    story.finish_turn(epoch);
    story
}

fn voice() -> NarrationVoice {
    NarrationVoice {
        voice: NarratorVoice::Kore,
        language: StoryLanguage::German,
        pitch: 1.3,
    }
}

fn profile() -> Profile {
    Profile {
        name: "Noor".to_string(),
        age: 4,
        interests: "lanterns".to_string(),
        language: StoryLanguage::English,
        voice: NarratorVoice::Zephyr,
        theme: StoryTheme::Dreams,
        pitch: 0.9,
    }
}

async fn wait_for_state(controller: &PlaybackController, state: PlaybackState) {
    let mut states = controller.subscribe();
    tokio::time::timeout(Duration::from_secs(120), states.wait_for(|s| *s == state))
        .await
        .expect("state not reached")
        .unwrap();
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_story_turn_then_primary_narration() {
    let dialogue = Arc::new(MockDialogue {
        turns: Mutex::new(vec![vec![
            "Noor found a glowing lantern.\n",
            "What next?\n1. Follow the fireflies\n",
            "2. Float up to the moon",
        ]]),
    });
    let story = Arc::new(StoryContext::new());
    let teller = StoryTeller::new(dialogue, story.clone());

    let outcome = teller.start(profile()).await.unwrap();
    assert_eq!(
        outcome,
        TurnOutcome::Finished {
            choices: vec![
                "Follow the fireflies".to_string(),
                "Float up to the moon".to_string()
            ]
        }
    );

    let speech = MockSpeech::new(vec![Reply::Audio(2000)], Duration::from_millis(100));
    let output = MemoryOutput::new();
    let controller = controller(speech.clone(), MockLocalVoice::new(10), &output);

    let state = controller
        .play(&story, NarrationVoice::from(&profile()))
        .await
        .unwrap();
    assert_eq!(state, PlaybackState::Playing);
    assert_eq!(controller.engine_kind(), Some(EngineKind::Primary));
    assert_eq!(speech.texts.lock()[0], story.content());

    wait_for_state(&controller, PlaybackState::Idle).await;
    assert_eq!(output.sample_count(), 2000);
    assert_eq!(output.sessions_finished(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_multi_chunk_narration_is_assembled_in_order() {
    let first = "a".repeat(2500) + ". ";
    let text = first + &"b".repeat(1000);
    let story = finished_story(&text);

    let speech = MockSpeech::new(
        vec![Reply::Audio(300), Reply::RateLimited, Reply::Audio(200)],
        Duration::from_millis(10),
    );
    let output = MemoryOutput::new();
    let controller = controller(speech.clone(), MockLocalVoice::new(10), &output);

    controller.play(&story, voice()).await.unwrap();
    assert_eq!(controller.engine_kind(), Some(EngineKind::Primary));
    assert_eq!(controller.current_buffer().unwrap().len(), 500);
    // two chunks, one retried
    assert_eq!(speech.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_no_audio_switches_to_fallback_voice() {
    let story = finished_story("The lantern hummed a lullaby.");
    let speech = MockSpeech::new(vec![Reply::Nothing], Duration::from_millis(10));
    let local = MockLocalVoice::new(4000);
    let output = MemoryOutput::new();
    let controller = controller(speech, local.clone(), &output);

    let state = controller.play(&story, voice()).await.unwrap();
    assert_eq!(state, PlaybackState::Playing);
    assert_eq!(controller.engine_kind(), Some(EngineKind::Fallback));
    assert!(controller.current_buffer().is_none());

    let requests = local.requests.lock().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].text, "The lantern hummed a lullaby.");
    assert_eq!(requests[0].language, StoryLanguage::German);
    assert_eq!(requests[0].pitch, 1.3);

    wait_for_state(&controller, PlaybackState::Idle).await;
    assert_eq!(output.sample_count(), 4000);
}

#[tokio::test(start_paused = true)]
async fn test_provider_failure_switches_to_fallback_voice() {
    let story = finished_story("The lantern hummed a lullaby.");
    let speech = MockSpeech::new(vec![Reply::Fail], Duration::from_millis(10));
    let output = MemoryOutput::new();
    let controller = controller(speech.clone(), MockLocalVoice::new(100), &output);

    assert_eq!(
        controller.play(&story, voice()).await.unwrap(),
        PlaybackState::Playing
    );
    assert_eq!(controller.engine_kind(), Some(EngineKind::Fallback));
    // non rate-limit failures are not retried
    assert_eq!(speech.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_both_engines_failing_returns_to_idle_with_notice() {
    let story = finished_story("The lantern hummed a lullaby.");
    let speech = MockSpeech::new(vec![Reply::Nothing], Duration::from_millis(10));
    let output = MemoryOutput::new();
    let controller = controller(speech, MockLocalVoice::broken(), &output);

    let state = controller.play(&story, voice()).await.unwrap();
    assert_eq!(state, PlaybackState::Idle);
    assert!(controller.notice().is_some());
    assert_eq!(output.sessions_opened(), 0);

    // a fresh attempt clears the notice until it fails again
    let again = controller.play(&story, voice()).await.unwrap();
    assert_eq!(again, PlaybackState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_pause_then_play_resumes_without_resynthesis() {
    let story = finished_story("Softly, softly.");
    let speech = MockSpeech::new(vec![Reply::Audio(5000)], Duration::from_millis(10));
    let output = MemoryOutput::new();
    let controller = controller(speech.clone(), MockLocalVoice::new(10), &output);

    controller.play(&story, voice()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(controller.pause(), PlaybackState::Paused);

    let heard = output.sample_count();
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(output.sample_count(), heard);

    assert_eq!(
        controller.play(&story, voice()).await.unwrap(),
        PlaybackState::Playing
    );
    wait_for_state(&controller, PlaybackState::Idle).await;
    assert_eq!(speech.calls(), 1);
    assert_eq!(output.sample_count(), 5000);
    assert_eq!(output.sessions_opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_loading_discards_result() {
    let story = finished_story("A long, long story.");
    let speech = MockSpeech::new(vec![Reply::Audio(1000)], Duration::from_secs(5));
    let output = MemoryOutput::new();
    let controller = controller(speech, MockLocalVoice::new(10), &output);

    let task = {
        let controller = controller.clone();
        let story = story.clone();
        tokio::spawn(async move { controller.play(&story, voice()).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(controller.state(), PlaybackState::Loading);
    assert!(matches!(
        controller.play(&story, voice()).await,
        Err(PlaybackError::Busy(_))
    ));

    assert_eq!(controller.stop(), PlaybackState::Idle);
    assert_eq!(task.await.unwrap().unwrap(), PlaybackState::Idle);
    assert_eq!(controller.engine_kind(), None);
    assert_eq!(output.sessions_opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_story_change_while_loading_discards_result() {
    let story = finished_story("The first story.");
    let speech = MockSpeech::new(vec![Reply::Audio(1000)], Duration::from_secs(2));
    let output = MemoryOutput::new();
    let controller = controller(speech, MockLocalVoice::new(10), &output);
    let _watcher = controller.watch_story(&story);

    let task = {
        let controller = controller.clone();
        let story = story.clone();
        tokio::spawn(async move { controller.play(&story, voice()).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    story.reset();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(controller.state(), PlaybackState::Loading);

    assert_eq!(task.await.unwrap().unwrap(), PlaybackState::Idle);
    assert_eq!(controller.engine_kind(), None);
    assert_eq!(output.sessions_opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_new_turn_stops_stale_playback() {
    let dialogue = Arc::new(MockDialogue {
        turns: Mutex::new(vec![
            vec!["The boat drifted.\n1. Sail on\n2. Rest"],
            vec!["They sailed on until morning."],
        ]),
    });
    let story = Arc::new(StoryContext::new());
    let teller = StoryTeller::new(dialogue, story.clone());
    teller.start(profile()).await.unwrap();

    let speech = MockSpeech::new(vec![Reply::Audio(60_000)], Duration::from_millis(10));
    let output = MemoryOutput::new();
    let controller = controller(speech, MockLocalVoice::new(10), &output);
    let _watcher = controller.watch_story(&story);

    controller.play(&story, voice()).await.unwrap();
    assert_eq!(controller.pause(), PlaybackState::Paused);

    teller.choose("Sail on").await.unwrap();
    wait_for_state(&controller, PlaybackState::Idle).await;
    assert_eq!(controller.engine_kind(), None);
    assert_eq!(output.sessions_finished(), 1);
    assert!(story.content().ends_with("They sailed on until morning."));
}

#[tokio::test(start_paused = true)]
async fn test_speed_applies_to_running_fallback_voice() {
    let story = finished_story("Slowly now.");
    let speech = MockSpeech::new(vec![Reply::Nothing], Duration::from_millis(10));
    let output = MemoryOutput::new();
    let controller = controller(speech, MockLocalVoice::new(100_000), &output);

    controller.play(&story, voice()).await.unwrap();
    assert_eq!(controller.engine_kind(), Some(EngineKind::Fallback));

    assert_eq!(controller.cycle_speed(), 1.25);
    assert_eq!(controller.state(), PlaybackState::Playing);
    controller.set_rate(1.0);
    assert_eq!(controller.rate(), 1.0);
    assert_eq!(controller.stop(), PlaybackState::Idle);
}
