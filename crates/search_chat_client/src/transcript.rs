//! Conversation transcript and the reconciler that applies stream events to
//! it. The transcript is append-only; a message mutates only while its
//! generation is live and freezes on completion, failure, or supersession.

use serde::{Deserialize, Serialize};

use crate::messages::{DonePayload, SourceItem, SourcesPayload};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One transcript entry. Mutable only through the `apply_*` operations below
/// while `streaming` is true.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub streaming: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            status: None,
            sources: None,
            search_time_ms: None,
            total_time_ms: None,
            error: None,
            streaming: false,
        }
    }

    /// A fresh assistant message awaiting its stream.
    pub fn assistant_streaming(status: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            status: Some(status.into()),
            sources: None,
            search_time_ms: None,
            total_time_ms: None,
            error: None,
            streaming: true,
        }
    }

    /// A finished assistant message, as restored from server history.
    pub fn assistant_history(
        content: impl Into<String>,
        sources: Option<SourcesPayload>,
    ) -> Self {
        let (items, search_time_ms) = match sources {
            Some(payload) => (Some(payload.items), Some(payload.search_time_ms)),
            None => (None, None),
        };
        Self {
            role: Role::Assistant,
            content: content.into(),
            status: None,
            sources: items,
            search_time_ms,
            total_time_ms: None,
            error: None,
            streaming: false,
        }
    }
}

/// Ordered, append-only message list for one conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Transcript {
    /// Assigned by the caller when resuming, or adopted from the backend's
    /// `session` event on the first query of a new conversation.
    pub session_id: Option<String>,
    pub messages: Vec<Message>,
}

impl Transcript {
    pub fn new(session_id: Option<String>) -> Self {
        Self {
            session_id,
            messages: Vec::new(),
        }
    }

    /// Append the user's query. Returns the message index.
    pub fn push_user(&mut self, content: &str) -> usize {
        self.messages.push(Message::user(content));
        self.messages.len() - 1
    }

    /// Append a streaming assistant message and return its index.
    pub fn begin_assistant(&mut self, status: &str) -> usize {
        self.messages.push(Message::assistant_streaming(status));
        self.messages.len() - 1
    }

    fn live_mut(&mut self, index: usize) -> Option<&mut Message> {
        self.messages.get_mut(index).filter(|m| m.streaming)
    }

    /// Set the status label. Status and live content are mutually exclusive
    /// display states; the first token clears it.
    pub fn apply_status(&mut self, index: usize, status: &str) {
        if let Some(message) = self.live_mut(index) {
            message.status = Some(status.to_string());
        }
    }

    /// Attach retrieved sources, replacing any earlier attachment.
    pub fn apply_sources(&mut self, index: usize, payload: SourcesPayload) {
        if let Some(message) = self.live_mut(index) {
            message.sources = Some(payload.items);
            message.search_time_ms = Some(payload.search_time_ms);
        }
    }

    /// Append a token verbatim. Never rewrites or truncates earlier content.
    pub fn apply_token(&mut self, index: usize, token: &str) {
        if let Some(message) = self.live_mut(index) {
            message.content.push_str(token);
            message.status = None;
        }
    }

    /// Terminal: completed normally.
    pub fn apply_done(&mut self, index: usize, payload: DonePayload) {
        if let Some(message) = self.live_mut(index) {
            message.streaming = false;
            message.status = None;
            message.total_time_ms = Some(payload.total_time_ms);
        }
    }

    /// Terminal: failed. Partial content stays visible next to the error.
    pub fn apply_error(&mut self, index: usize, error: &str) {
        if let Some(message) = self.live_mut(index) {
            message.streaming = false;
            message.status = None;
            message.error = Some(error.to_string());
        }
    }

    /// Terminal: cancelled or superseded locally. Content and sources are
    /// left exactly as last observed; no error is recorded.
    pub fn apply_cancelled(&mut self, index: usize) {
        if let Some(message) = self.live_mut(index) {
            message.streaming = false;
            message.status = None;
        }
    }

    /// Whether any message is still streaming.
    pub fn is_streaming(&self) -> bool {
        self.messages.iter().any(|m| m.streaming)
    }
}
