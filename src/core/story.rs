//! Story session context and the driver that fills it.
//!
//! [`StoryContext`] is the explicit replacement for ambient "current story"
//! state: accumulated text, streaming flag, extracted choices and an epoch
//! counter. Every reset, new story and new turn bumps the epoch; writers pass
//! the epoch they started under and stale writes are dropped. Playback
//! watches the epoch to tear down audio for outdated text.
//!
//! [`StoryTeller`] owns the single live chat session and drives turns into
//! the context.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::dialogue::prompts::{
    GENTLE_FAILURE_MESSAGE, TURN_SEPARATOR, continuation_prompt, opening_prompt,
};
use crate::core::dialogue::{ChatSession, DialogueError, DialogueProvider, DialogueResult, Profile};
use crate::core::text::extract_choices;

// =============================================================================
// Context
// =============================================================================

/// Point-in-time copy of the story state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorySnapshot {
    pub content: String,
    pub is_streaming: bool,
    pub choices: Vec<String>,
    pub last_choice: Option<String>,
    /// User-facing notice after a failed turn
    pub notice: Option<String>,
    pub epoch: u64,
}

#[derive(Debug, Default)]
struct StoryState {
    content: String,
    is_streaming: bool,
    choices: Vec<String>,
    last_choice: Option<String>,
    notice: Option<String>,
}

/// Shared story text with epoch-based staleness checks.
pub struct StoryContext {
    state: RwLock<StoryState>,
    epoch: watch::Sender<u64>,
    revision: watch::Sender<u64>,
}

impl Default for StoryContext {
    fn default() -> Self {
        Self::new()
    }
}

impl StoryContext {
    pub fn new() -> Self {
        let (epoch, _) = watch::channel(0);
        let (revision, _) = watch::channel(0);
        Self {
            state: RwLock::new(StoryState::default()),
            epoch,
            revision,
        }
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        *self.epoch.borrow()
    }

    /// Receiver notified on every epoch change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.epoch.subscribe()
    }

    /// Receiver notified whenever the visible story state changes,
    /// including every accepted fragment.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn snapshot(&self) -> StorySnapshot {
        let state = self.state.read();
        StorySnapshot {
            content: state.content.clone(),
            is_streaming: state.is_streaming,
            choices: state.choices.clone(),
            last_choice: state.last_choice.clone(),
            notice: state.notice.clone(),
            epoch: self.epoch(),
        }
    }

    pub fn content(&self) -> String {
        self.state.read().content.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.state.read().is_streaming
    }

    pub fn choices(&self) -> Vec<String> {
        self.state.read().choices.clone()
    }

    /// Clear everything.
    pub fn reset(&self) -> u64 {
        let mut state = self.state.write();
        *state = StoryState::default();
        self.bump()
    }

    /// Clear the story and mark the opening turn as streaming.
    pub fn begin_story(&self) -> u64 {
        let mut state = self.state.write();
        *state = StoryState {
            is_streaming: true,
            ..Default::default()
        };
        self.bump()
    }

    /// Start a continuation turn after `choice`. Returns the new epoch and
    /// the content before the turn, for rollback.
    pub fn begin_turn(&self, choice: &str) -> (u64, String) {
        let mut state = self.state.write();
        let before = state.content.clone();
        if !state.content.is_empty() {
            state.content.push_str(TURN_SEPARATOR);
        }
        state.is_streaming = true;
        state.choices.clear();
        state.last_choice = Some(choice.to_string());
        state.notice = None;
        (self.bump(), before)
    }

    /// Append a fragment written under `epoch`. Returns `false` when the
    /// epoch is stale and the fragment was dropped.
    pub fn append(&self, epoch: u64, fragment: &str) -> bool {
        let mut state = self.state.write();
        if self.epoch() != epoch {
            return false;
        }
        state.content.push_str(fragment);
        self.touch();
        true
    }

    /// End the turn started under `epoch` and extract its choices.
    ///
    /// `None` when the turn was superseded.
    pub fn finish_turn(&self, epoch: u64) -> Option<Vec<String>> {
        let mut state = self.state.write();
        if self.epoch() != epoch {
            return None;
        }
        state.choices = extract_choices(&state.content);
        state.is_streaming = false;
        self.touch();
        Some(state.choices.clone())
    }

    /// End a failed turn. With `restore` the text is rolled back to it,
    /// otherwise it is replaced by the gentle failure message.
    pub fn fail_turn(&self, epoch: u64, restore: Option<String>) -> bool {
        let mut state = self.state.write();
        if self.epoch() != epoch {
            return false;
        }
        match restore {
            Some(previous) => {
                state.content = previous;
                state.notice = Some(GENTLE_FAILURE_MESSAGE.to_string());
            }
            None => {
                state.content = GENTLE_FAILURE_MESSAGE.to_string();
                state.notice = None;
            }
        }
        state.choices.clear();
        state.is_streaming = false;
        self.touch();
        true
    }

    /// Call with the state write lock held.
    fn touch(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    /// Call with the state write lock held. Also counts as a change.
    fn bump(&self) -> u64 {
        self.touch();
        let mut next = 0;
        self.epoch.send_modify(|epoch| {
            *epoch += 1;
            next = *epoch;
        });
        next
    }
}

// =============================================================================
// Driver
// =============================================================================

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Streaming finished; choices offered at the end (possibly none)
    Finished { choices: Vec<String> },
    /// A reset or new story replaced this turn; its output was discarded
    Superseded,
}

/// Drives story turns through one chat session at a time.
pub struct StoryTeller {
    provider: Arc<dyn DialogueProvider>,
    story: Arc<StoryContext>,
    session: Mutex<Option<Box<dyn ChatSession>>>,
    profile: Mutex<Option<Profile>>,
}

impl StoryTeller {
    pub fn new(provider: Arc<dyn DialogueProvider>, story: Arc<StoryContext>) -> Self {
        Self {
            provider,
            story,
            session: Mutex::new(None),
            profile: Mutex::new(None),
        }
    }

    pub fn story(&self) -> &Arc<StoryContext> {
        &self.story
    }

    pub fn profile(&self) -> Option<Profile> {
        self.profile.lock().clone()
    }

    /// Begin a new story for `profile`, replacing any previous one.
    pub async fn start(&self, profile: Profile) -> DialogueResult<TurnOutcome> {
        profile.validate()?;
        self.session.lock().take();
        *self.profile.lock() = Some(profile.clone());
        let epoch = self.story.begin_story();
        info!(epoch, name = %profile.name, theme = %profile.theme, "Starting story");

        let mut chat = match self.provider.create(&profile).await {
            Ok(chat) => chat,
            Err(e) => {
                warn!("Failed to open story session: {}", e);
                self.story.fail_turn(epoch, None);
                return Err(e);
            }
        };

        let result = self
            .stream_turn(chat.as_mut(), &opening_prompt(&profile), epoch)
            .await;
        self.conclude(chat, epoch, result, None)
    }

    /// Continue the story with the listener's `choice`.
    pub async fn choose(&self, choice: &str) -> DialogueResult<TurnOutcome> {
        if self.story.is_streaming() {
            return Err(DialogueError::TurnInProgress);
        }
        let language = match self.profile.lock().as_ref() {
            Some(profile) => profile.language,
            None => return Err(DialogueError::NoSession),
        };
        let Some(mut chat) = self.session.lock().take() else {
            return Err(DialogueError::NoSession);
        };

        let (epoch, before) = self.story.begin_turn(choice);
        debug!(epoch, choice, "Continuing story");
        let result = self
            .stream_turn(
                chat.as_mut(),
                &continuation_prompt(choice, language.as_str()),
                epoch,
            )
            .await;
        self.conclude(chat, epoch, result, Some(before))
    }

    /// Drop the session and clear the story.
    pub fn reset(&self) {
        self.session.lock().take();
        self.profile.lock().take();
        let epoch = self.story.reset();
        info!(epoch, "Story reset");
    }

    /// Stream one reply into the context. `Ok(false)` when superseded.
    async fn stream_turn(
        &self,
        chat: &mut dyn ChatSession,
        message: &str,
        epoch: u64,
    ) -> DialogueResult<bool> {
        let mut fragments = chat.send(message).await?;
        while let Some(fragment) = fragments.next().await {
            if !self.story.append(epoch, &fragment?) {
                debug!(epoch, "Dropping fragments of superseded turn");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn conclude(
        &self,
        chat: Box<dyn ChatSession>,
        epoch: u64,
        result: DialogueResult<bool>,
        restore: Option<String>,
    ) -> DialogueResult<TurnOutcome> {
        match result {
            Ok(true) => match self.story.finish_turn(epoch) {
                Some(choices) => {
                    info!(epoch, choices = choices.len(), "Story turn finished");
                    self.keep_session(chat, epoch);
                    Ok(TurnOutcome::Finished { choices })
                }
                None => Ok(TurnOutcome::Superseded),
            },
            Ok(false) => Ok(TurnOutcome::Superseded),
            Err(e) => {
                warn!(epoch, "Story turn failed: {}", e);
                if self.story.fail_turn(epoch, restore) {
                    self.keep_session(chat, epoch);
                    Err(e)
                } else {
                    Ok(TurnOutcome::Superseded)
                }
            }
        }
    }

    /// Put the session back unless a newer story took over meanwhile.
    fn keep_session(&self, chat: Box<dyn ChatSession>, epoch: u64) {
        let mut slot = self.session.lock();
        if self.story.epoch() == epoch && slot.is_none() {
            *slot = Some(chat);
        }
    }
}
