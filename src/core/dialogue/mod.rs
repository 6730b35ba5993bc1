//! Story dialogue: chat sessions that stream story turns.

pub mod base;
pub mod gemini;
pub mod prompts;

pub use base::{
    ChatSession, DialogueError, DialogueProvider, DialogueResult, FragmentStream, Profile,
    StoryLanguage, StoryTheme,
};
pub use gemini::{GeminiChat, GeminiDialogue, GeminiDialogueConfig};
pub use prompts::GENTLE_FAILURE_MESSAGE;
