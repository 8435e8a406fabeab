//! UI-agnostic chat state types
//!
//! This module contains the transcript data model shared by the panel, the
//! relay, and the persisted store. Nothing here depends on a UI framework.

use serde::{Deserialize, Serialize};

/// Greeting shown in a fresh or cleared transcript
pub const DEFAULT_GREETING: &str = "Hello! How can I help you today?";

/// A chat message in the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Error, content: content.into() }
    }
}

/// The role of a chat message sender
///
/// `Error` marks a failed round trip. It is local to the panel and never
/// reaches the backend as-is (see [`crate::relay::sanitize_messages`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    Error,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Error => "error",
        }
    }
}

/// The ordered sequence of messages shown to the user.
///
/// Messages are never edited in place; appending or clearing produces a new
/// sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript(Vec<ChatMessage>);

impl Transcript {
    pub fn greeting() -> Self {
        Self(vec![ChatMessage::assistant(DEFAULT_GREETING)])
    }

    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self(messages)
    }

    /// Returns a new transcript with `message` appended
    pub fn with(&self, message: ChatMessage) -> Self {
        let mut messages = Vec::with_capacity(self.0.len() + 1);
        messages.extend(self.0.iter().cloned());
        messages.push(message);
        Self(messages)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.0.last()
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::greeting()
    }
}
