// Application state snapshot
// Everything the UI renders lives in one AppState value owned by the Store

use crate::connection::ConnectionState;
use crate::protocol::{Product, TransactionRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifier of a chat message, unique per store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Who wrote a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The logged-in user
    User,
    /// The backend agent
    Agent,
}

/// What a chat message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text
    Text,
    /// Image (content is a URL or a short label)
    Image,
    /// Voice note (content is a label or transcript)
    Voice,
}

/// One entry of the chat history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Store-assigned id
    pub id: MessageId,
    /// Author
    pub sender: Sender,
    /// Payload kind
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Display text
    pub content: String,
    /// When the message was created locally
    pub timestamp: DateTime<Utc>,
    /// Rendered as an error bubble
    #[serde(default)]
    pub is_error: bool,
    /// Opaque backend data attached to agent replies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ChatMessage {
    /// Build a message stamped with the current time
    pub fn new(id: MessageId, sender: Sender, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id,
            sender,
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            is_error: false,
            data: None,
        }
    }

    /// Text typed by the user
    pub fn user_text(id: MessageId, content: impl Into<String>) -> Self {
        Self::new(id, Sender::User, MessageKind::Text, content)
    }

    /// Text reply from the agent
    pub fn agent_text(id: MessageId, content: impl Into<String>) -> Self {
        Self::new(id, Sender::Agent, MessageKind::Text, content)
    }

    /// Agent-side error bubble
    pub fn agent_error(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::agent_text(id, content)
        }
    }

    /// Attach opaque backend data
    pub fn with_data(mut self, data: Option<Value>) -> Self {
        self.data = data;
        self
    }
}

/// Logged-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    /// User id
    pub id: String,
    /// Conversation session id
    pub session_id: String,
    /// Opaque token sent in the authenticate frame
    #[serde(default)]
    pub token: Option<String>,
}

/// Live text of the reply currently streaming
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPreview {
    /// Id the committed message will carry
    pub message_id: MessageId,
    /// Text accumulated so far
    pub text: String,
}

/// Top-level screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    /// Login form
    #[default]
    Login,
    /// Chat screen
    Chat,
}

/// Main application state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    /// Connection lifecycle state mirrored from the manager
    pub connection_status: ConnectionState,
    /// Reconnect attempts made since the last successful open
    pub reconnect_attempts: u32,
    /// Logged-in user
    pub user: Option<UserSession>,
    /// Chat history, oldest first
    pub messages: Vec<ChatMessage>,
    /// Agent is preparing a reply
    pub is_typing: bool,
    /// Reply currently streaming, if any
    pub streaming: Option<StreamPreview>,
    /// Microphone capture in progress
    pub is_recording: bool,
    /// Audio reply playing
    pub is_playing: bool,
    /// Audio capture is usable on this machine
    pub voice_available: bool,
    /// Image upload in progress
    pub is_uploading: bool,
    /// Upload progress in 0..=100
    pub upload_progress: u8,
    /// Transaction awaiting confirmation
    pub current_transaction: Option<TransactionRequest>,
    /// Product catalog
    pub products: Vec<Product>,
    /// Product picked by the user
    pub selected_product: Option<Product>,
    /// Screen currently shown
    pub current_view: View,
    /// Last fatal error shown to the user
    pub error: Option<String>,
}

impl AppState {
    /// Trim the history to the newest `max_history` entries
    pub(crate) fn enforce_history(&mut self, max_history: usize) {
        if self.messages.len() > max_history {
            let excess = self.messages.len() - max_history;
            self.messages.drain(..excess);
        }
    }
}

/// Partial update applied with [`Store::merge`](super::Store::merge)
///
/// `None` leaves a field untouched. Nullable fields take
/// `Some(None)` to clear them.
#[derive(Debug, Clone, Default, PartialEq)]
#[allow(missing_docs)]
pub struct StatePatch {
    pub connection_status: Option<ConnectionState>,
    pub reconnect_attempts: Option<u32>,
    pub user: Option<Option<UserSession>>,
    pub messages: Option<Vec<ChatMessage>>,
    pub is_typing: Option<bool>,
    pub streaming: Option<Option<StreamPreview>>,
    pub is_recording: Option<bool>,
    pub is_playing: Option<bool>,
    pub voice_available: Option<bool>,
    pub is_uploading: Option<bool>,
    pub upload_progress: Option<u8>,
    pub current_transaction: Option<Option<TransactionRequest>>,
    pub products: Option<Vec<Product>>,
    pub selected_product: Option<Option<Product>>,
    pub current_view: Option<View>,
    pub error: Option<Option<String>>,
}

impl StatePatch {
    /// Write every `Some` field into `state`
    pub fn apply(self, state: &mut AppState) {
        macro_rules! merge_fields {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    state.$field = value;
                })*
            };
        }
        merge_fields!(
            connection_status,
            reconnect_attempts,
            user,
            messages,
            is_typing,
            streaming,
            is_recording,
            is_playing,
            voice_available,
            is_uploading,
            upload_progress,
            current_transaction,
            products,
            selected_product,
            current_view,
            error,
        );
    }
}
