//! Dialogue session seam: listener profile, chat session capability and errors.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::tts::NarratorVoice;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while creating or driving a dialogue session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialogueError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Stream or body could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// `choose` without a started story
    #[error("No active story session")]
    NoSession,

    /// A turn is still streaming
    #[error("A story turn is already in progress")]
    TurnInProgress,
}

/// Result type for dialogue operations.
pub type DialogueResult<T> = Result<T, DialogueError>;

// =============================================================================
// Story Languages
// =============================================================================

/// Languages a story can be told in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StoryLanguage {
    #[default]
    English,
    Spanish,
    Hindi,
    French,
    German,
    Portuguese,
    Japanese,
    Chinese,
}

impl StoryLanguage {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Spanish => "Spanish",
            Self::Hindi => "Hindi",
            Self::French => "French",
            Self::German => "German",
            Self::Portuguese => "Portuguese",
            Self::Japanese => "Japanese",
            Self::Chinese => "Chinese",
        }
    }

    /// ISO 639-1 code, used to pick a local fallback voice.
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Spanish => "es",
            Self::Hindi => "hi",
            Self::French => "fr",
            Self::German => "de",
            Self::Portuguese => "pt",
            Self::Japanese => "ja",
            Self::Chinese => "zh",
        }
    }

    /// Parse a language name or code, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "english" | "en" => Self::English,
            "spanish" | "es" | "español" => Self::Spanish,
            "hindi" | "hi" => Self::Hindi,
            "french" | "fr" | "français" => Self::French,
            "german" | "de" | "deutsch" => Self::German,
            "portuguese" | "pt" => Self::Portuguese,
            "japanese" | "ja" => Self::Japanese,
            "chinese" | "zh" => Self::Chinese,
            _ => Self::default(),
        }
    }

    pub fn all() -> &'static [StoryLanguage] {
        &[
            Self::English,
            Self::Spanish,
            Self::Hindi,
            Self::French,
            Self::German,
            Self::Portuguese,
            Self::Japanese,
            Self::Chinese,
        ]
    }
}

impl std::fmt::Display for StoryLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Story Themes
// =============================================================================

/// Thematic tag for a story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StoryTheme {
    Adventure,
    Friendship,
    Nature,
    #[default]
    Magic,
    Dreams,
    Animals,
}

impl StoryTheme {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Adventure => "Adventure",
            Self::Friendship => "Friendship",
            Self::Nature => "Nature",
            Self::Magic => "Magic",
            Self::Dreams => "Dreams",
            Self::Animals => "Animals",
        }
    }

    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "adventure" => Self::Adventure,
            "friendship" => Self::Friendship,
            "nature" => Self::Nature,
            "magic" => Self::Magic,
            "dreams" => Self::Dreams,
            "animals" => Self::Animals,
            _ => Self::default(),
        }
    }

    pub fn all() -> &'static [StoryTheme] {
        &[
            Self::Adventure,
            Self::Friendship,
            Self::Nature,
            Self::Magic,
            Self::Dreams,
            Self::Animals,
        ]
    }
}

impl std::fmt::Display for StoryTheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Profile
// =============================================================================

/// Youngest supported listener age.
pub const MIN_AGE: u8 = 3;
/// Oldest supported listener age.
pub const MAX_AGE: u8 = 10;

/// Listener profile. Built once per story and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Child's display name
    pub name: String,
    /// Age in years (3–10)
    pub age: u8,
    /// Free-text favourite things
    pub interests: String,
    pub language: StoryLanguage,
    pub voice: NarratorVoice,
    pub theme: StoryTheme,
    /// Pitch preference, nominally 0.5–1.5
    pub pitch: f32,
}

impl Profile {
    /// Validates the profile.
    pub fn validate(&self) -> DialogueResult<()> {
        if self.name.trim().is_empty() {
            return Err(DialogueError::InvalidProfile("name must not be empty".to_string()));
        }
        if self.interests.trim().is_empty() {
            return Err(DialogueError::InvalidProfile(
                "interests must not be empty".to_string(),
            ));
        }
        if !(MIN_AGE..=MAX_AGE).contains(&self.age) {
            return Err(DialogueError::InvalidProfile(format!(
                "age must be between {MIN_AGE} and {MAX_AGE}, got {}",
                self.age
            )));
        }
        if !self.pitch.is_finite() {
            return Err(DialogueError::InvalidProfile("pitch must be a number".to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// Sessions
// =============================================================================

/// Ordered, finite stream of text fragments for one turn.
pub type FragmentStream = Pin<Box<dyn Stream<Item = DialogueResult<String>> + Send>>;

/// A live conversation with provider-side context.
///
/// Owned by exactly one story session. Dropping it ends the conversation.
#[async_trait]
pub trait ChatSession: Send {
    /// Identity of this conversation.
    fn id(&self) -> Uuid;

    /// Send a message and stream the reply.
    ///
    /// The turn is recorded in the session context once the returned stream is
    /// exhausted.
    async fn send(&mut self, message: &str) -> DialogueResult<FragmentStream>;
}

/// Opens chat sessions for a profile.
#[async_trait]
pub trait DialogueProvider: Send + Sync {
    async fn create(&self, profile: &Profile) -> DialogueResult<Box<dyn ChatSession>>;
}
