// State management module
// Handles the observable application state and session persistence

pub mod app_state;
pub mod persistence;
pub mod store;

pub use app_state::{
    AppState, ChatMessage, MessageId, MessageKind, Sender, StatePatch, StreamPreview, UserSession,
    View,
};
pub use persistence::{PersistenceError, SessionFile, StoredSession};
pub use store::{Store, StoreError, Subscription};
