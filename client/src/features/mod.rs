//! Feature managers
//!
//! Each manager turns user gestures into outbound frames and exposes the
//! slice of state its view renders. Managers never talk to each other; they
//! share the store, the connection handle and the event bus through a
//! [`FeatureContext`].

pub mod catalog;
pub mod chat;
pub mod image;
pub mod transaction;
pub mod voice;

pub use catalog::{format_currency, CatalogManager};
pub use chat::{ChatManager, ChatView};
pub use image::{compress_image, ImageManager, ImageUpload};
pub use transaction::TransactionManager;
pub use voice::{AudioDevice, AudioSource, RecordedAudio, UnavailableAudio, VoiceManager};

use crate::config::{Config, MessageEnvelope};
use crate::connection::ConnectionManager;
use crate::events::EventBus;
use crate::protocol::{ClientMessage, PayloadType, SendMessageData};
use crate::state::{AppState, Store, Subscription};
use std::sync::{Arc, Mutex, PoisonError};

/// Dependencies shared by every feature manager
#[derive(Debug, Clone)]
pub struct FeatureContext {
    /// Application state
    pub store: Store,
    /// Connection handle
    pub connection: ConnectionManager,
    /// Event bus
    pub events: EventBus,
    /// Client configuration
    pub config: Arc<Config>,
}

impl FeatureContext {
    /// User id and session id of the logged-in user
    pub fn identity(&self) -> (Option<String>, Option<String>) {
        match &self.store.get().user {
            Some(user) => (Some(user.id.clone()), Some(user.session_id.clone())),
            None => (None, None),
        }
    }

    /// Envelope shape expected by the backend
    pub fn envelope(&self) -> MessageEnvelope {
        self.config.connection.envelope
    }

    /// `sendMessage` frame carrying `message`
    pub fn wrapped(&self, kind: PayloadType, message: String) -> ClientMessage {
        let (user_id, session_id) = self.identity();
        ClientMessage::SendMessage {
            data: SendMessageData {
                user_id,
                session_id,
                message,
                kind,
            },
        }
    }
}

/// Subscribe to one slice of the state
///
/// `on_change` runs only when the selected value differs from the last one
/// seen, starting from the value at subscription time.
pub fn watch_slice<T, S, F>(store: &Store, select: S, on_change: F) -> Subscription
where
    T: PartialEq + Send + 'static,
    S: Fn(&AppState) -> T + Send + Sync + 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    let last = Mutex::new(select(&*store.get()));
    store.subscribe(move |state| {
        let next = select(state);
        let mut last = last.lock().unwrap_or_else(PoisonError::into_inner);
        if *last != next {
            *last = next;
            on_change(&*last);
        }
    })
}
