//! UI-agnostic conversation types
//!
//! These are shared by the session state machine and whatever front end
//! renders the transcript. Nothing in here knows about terminals or HTTP.

use serde::{Deserialize, Serialize};

/// Greeting every fresh session starts with.
pub const GREETING: &str = "👋 Welcome to **Shop EZ AI Agent!** 🛍️ I help you find the best deals from Amazon & Walmart. What would you like to order today?";

/// The only message left in the transcript after an abort.
pub const ABORTED: &str = "🚨 Order aborted. What would you like to order today?";

/// Prefix for failures that are reported inside the transcript.
pub const ERROR_PREFIX: &str = "❌ Error: ";

/// A chat message in the shopping conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Per-session sequence number of an outgoing chat request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of the most recent chat request.
///
/// Only the newest request is tracked: an older request finishing while a
/// newer one is outstanding leaves the state untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    #[default]
    Idle,
    Sending(RequestId),
}

impl RequestState {
    pub fn is_busy(&self) -> bool {
        matches!(self, RequestState::Sending(_))
    }
}
