//! Typed event bus
//!
//! Side-channel notifications from the connection manager to the feature
//! managers and the shell. The set of events is closed: adding a new kind
//! means adding a variant here.

use crate::protocol::{Product, TransactionRequest};
use crate::state::MessageId;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;
use tracing::warn;

/// Severity of a toast notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    /// Neutral information
    Info,
    /// Something worked
    Success,
    /// Recoverable problem
    Warning,
    /// Failure the user should know about
    Error,
}

/// Transient notification shown by the shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    /// Severity
    pub level: ToastLevel,
    /// Text shown to the user
    pub message: String,
}

impl Toast {
    /// Create a toast
    pub fn new(level: ToastLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    /// Info toast
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(ToastLevel::Info, message)
    }

    /// Success toast
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ToastLevel::Success, message)
    }

    /// Warning toast
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(ToastLevel::Warning, message)
    }

    /// Error toast
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ToastLevel::Error, message)
    }
}

/// Events broadcast to feature managers and adapters
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Backend acknowledged the authenticate frame
    SessionAck {
        /// User id echoed by the backend
        user_id: Option<String>,
        /// Session id echoed by the backend
        session_id: Option<String>,
    },
    /// An agent reply started streaming
    StreamStart {
        /// Id the final message will carry
        message_id: MessageId,
    },
    /// Partial text for the active stream
    StreamChunk {
        /// Id of the streamed message
        message_id: MessageId,
        /// The newly received fragment
        text: String,
    },
    /// Active stream finished
    StreamEnd {
        /// Id of the streamed message
        message_id: MessageId,
        /// Committed text, None when nothing was committed
        content: Option<String>,
    },
    /// Product list replaced
    CatalogUpdate {
        /// New product list
        products: Vec<Product>,
    },
    /// Backend asks the user to confirm a transaction
    TransactionRequest(TransactionRequest),
    /// Presigned upload target is ready
    UploadReady {
        /// Where to PUT the image
        upload_url: String,
        /// Public URL of the uploaded image
        image_url: String,
    },
    /// Backend reported an error
    ServerError {
        /// Error text from the backend
        message: String,
    },
    /// Audio reply to play back (URL or base64 data)
    VoiceReply {
        /// Audio source
        audio: String,
    },
    /// Toast for the shell to display
    Toast(Toast),
}

/// Broadcast channel carrying [`ClientEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per slow receiver
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event; having no receivers is not an error
    pub fn publish(&self, event: ClientEvent) {
        let _ = self.tx.send(event);
    }

    /// Shortcut for publishing a toast
    pub fn toast(&self, toast: Toast) {
        self.publish(ClientEvent::Toast(toast));
    }

    /// Subscribe to future events
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Future events as a stream; lagged events are skipped with a warning
    pub fn stream(&self) -> impl Stream<Item = ClientEvent> + Send + Unpin + 'static {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped = skipped, "Event subscriber lagged, events dropped");
                None
            }
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
