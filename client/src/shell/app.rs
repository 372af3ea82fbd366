//! Application shell
//!
//! Builds every component once and wires them together: one store, one
//! event bus, one connection manager and the feature managers. UI adapters
//! hold an [`App`] and call into it; nothing is reached through globals.

use super::toast::ToastCenter;
use crate::config::Config;
use crate::connection::{ConnectionManager, Connector};
use crate::error::ClientError;
use crate::events::{ClientEvent, EventBus, Toast};
use crate::features::{
    AudioDevice, CatalogManager, ChatManager, FeatureContext, ImageManager, TransactionManager,
    VoiceManager,
};
use crate::state::{SessionFile, StatePatch, Store, StoredSession, View};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use futures_util::StreamExt;
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The assembled client
#[derive(Debug)]
pub struct App {
    config: Arc<Config>,
    store: Store,
    events: EventBus,
    connection: ConnectionManager,
    session_file: SessionFile,
    toasts: Arc<ToastCenter>,
    /// Text chat
    pub chat: ChatManager,
    /// Voice notes
    pub voice: Arc<VoiceManager>,
    /// Image upload
    pub images: Arc<ImageManager>,
    /// Transaction confirmation
    pub transactions: TransactionManager,
    /// Product catalog
    pub catalog: CatalogManager,
}

impl App {
    /// Build the client; must be called inside a tokio runtime
    pub fn new(
        config: Config,
        connector: Arc<dyn Connector>,
        audio: Arc<dyn AudioDevice>,
        session_file: SessionFile,
    ) -> Self {
        let config = Arc::new(config);
        let store = Store::new(config.chat.max_history);
        let events = EventBus::default();
        let connection =
            ConnectionManager::spawn(&config.connection, connector, store.clone(), events.clone());
        let ctx = FeatureContext {
            store: store.clone(),
            connection: connection.clone(),
            events: events.clone(),
            config: Arc::clone(&config),
        };

        Self {
            toasts: Arc::new(ToastCenter::new(config.ui.toast_duration)),
            chat: ChatManager::new(ctx.clone()),
            voice: VoiceManager::new(ctx.clone(), audio),
            images: Arc::new(ImageManager::new(ctx.clone())),
            transactions: TransactionManager::new(ctx.clone()),
            catalog: CatalogManager::new(ctx),
            config,
            store,
            events,
            connection,
            session_file,
        }
    }

    /// Resume a saved session, or show the login view
    pub async fn init(&self) -> Result<(), ClientError> {
        match self.session_file.load() {
            Ok(Some(session)) => {
                info!(user_id = %session.user_id, "Restoring saved session");
                return self.login(&session.user_id, Some(session.session_id)).await;
            }
            Ok(None) => debug!("No saved session"),
            Err(e) => warn!(error = %e, path = %self.session_file.path().display(), "Ignoring unreadable session file"),
        }
        self.store.merge(StatePatch {
            current_view: Some(View::Login),
            ..StatePatch::default()
        });
        Ok(())
    }

    /// Log in, persist the session and connect
    ///
    /// A new session id is generated when none is given.
    pub async fn login(&self, user_id: &str, session_id: Option<String>) -> Result<(), ClientError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            let err = ClientError::Validation("Please enter a user id".to_string());
            self.events.toast(err.to_toast());
            return Err(err);
        }
        let session_id = session_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(new_session_id);
        let token = demo_token(user_id);

        let stored = StoredSession {
            user_id: user_id.to_string(),
            session_id: session_id.clone(),
        };
        if let Err(e) = self.session_file.save(&stored) {
            warn!(error = %e, "Could not persist session");
        }

        self.store.set_path(
            "user",
            json!({ "id": user_id, "session_id": session_id, "token": token }),
        )?;
        self.store.merge(StatePatch {
            current_view: Some(View::Chat),
            error: Some(None),
            ..StatePatch::default()
        });
        self.voice.check_availability().await;
        self.connection.connect();

        info!(user_id = %user_id, session_id = %session_id, "User logged in");
        self.events.toast(Toast::success(format!("Welcome, {}!", user_id)));
        Ok(())
    }

    /// Disconnect, forget the session and return to the login view
    pub async fn logout(&self) {
        self.connection.disconnect().await;
        if let Err(e) = self.session_file.clear() {
            warn!(error = %e, "Could not remove session file");
        }
        self.store.reset();
        info!("User logged out");
        self.events.toast(Toast::info("Session closed"));
    }

    /// Route bus events to the managers that act on them and to the toast
    /// center
    pub fn spawn_event_router(&self) -> JoinHandle<()> {
        let mut events = self.events.stream();
        let transactions = self.transactions.clone();
        let images = Arc::clone(&self.images);
        let voice = Arc::clone(&self.voice);
        let toasts = Arc::clone(&self.toasts);

        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    ClientEvent::TransactionRequest(request) => transactions.present(request),
                    ClientEvent::UploadReady {
                        upload_url,
                        image_url,
                    } => {
                        let images = Arc::clone(&images);
                        tokio::spawn(async move {
                            if let Err(e) = images.complete_upload(&upload_url, &image_url).await {
                                debug!(error = %e, "Presigned upload did not complete");
                            }
                        });
                    }
                    ClientEvent::VoiceReply { audio } => {
                        let voice = Arc::clone(&voice);
                        tokio::spawn(async move {
                            if let Err(e) = voice.play_reply(&audio).await {
                                debug!(error = %e, "Audio reply not played");
                            }
                        });
                    }
                    ClientEvent::Toast(toast) => toasts.push(toast),
                    _ => {}
                }
            }
        })
    }

    /// Application state
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Event bus
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Connection handle
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Toasts to render
    pub fn toasts(&self) -> &ToastCenter {
        &self.toasts
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn new_session_id() -> String {
    format!("session_{}", Uuid::new_v4().simple())
}

/// Placeholder credential until the backend issues real tokens
fn demo_token(user_id: &str) -> String {
    let claims = json!({
        "user_id": user_id,
        "timestamp": Utc::now().timestamp_millis(),
    });
    STANDARD.encode(claims.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_format() {
        let id = new_session_id();
        assert!(id.starts_with("session_"));
        assert_eq!(id.len(), "session_".len() + 32);
    }

    #[test]
    fn test_demo_token_decodes() {
        let token = demo_token("user-7");
        let decoded = STANDARD.decode(token).unwrap();
        let claims: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(claims["user_id"], "user-7");
        assert!(claims["timestamp"].is_i64());
    }
}
