pub mod audio;
pub mod dialogue;
pub mod playback;
pub mod retry;
pub mod story;
pub mod text;
pub mod tts;

// Re-export commonly used types for convenience
pub use audio::{AudioBuffer, AudioError, AudioOutput, AudioSegment, AudioSink, ClockedPlayer};

pub use dialogue::{
    ChatSession, DialogueError, DialogueProvider, DialogueResult, GeminiDialogue,
    GeminiDialogueConfig, Profile, StoryLanguage, StoryTheme,
};

pub use playback::{
    EngineKind, EspeakEngine, LocalSpeechEngine, NarrationVoice, PlaybackController,
    PlaybackError, PlaybackResult, PlaybackState,
};

pub use retry::{RetryClassify, RetryPolicy, with_retry};

pub use story::{StoryContext, StorySnapshot, StoryTeller, TurnOutcome};

pub use text::{TextChunk, extract_choices, segment};

pub use tts::{
    GeminiSpeech, GeminiSpeechConfig, NarrationError, NarrationOutcome, NarrationResult,
    NarrationSynthesizer, NarratorVoice, SpeechProvider, SynthesizerSettings,
};
