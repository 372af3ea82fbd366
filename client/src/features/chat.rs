//! Text chat

use super::{watch_slice, FeatureContext};
use crate::config::MessageEnvelope;
use crate::connection::ConnectionState;
use crate::events::Toast;
use crate::protocol::{ClientMessage, PayloadType};
use crate::state::{ChatMessage, StreamPreview, Subscription};
use tracing::debug;

/// What the chat view renders
#[derive(Debug, Clone, PartialEq)]
pub struct ChatView {
    /// History, oldest first
    pub messages: Vec<ChatMessage>,
    /// Agent is preparing a reply
    pub is_typing: bool,
    /// Reply currently streaming
    pub streaming: Option<StreamPreview>,
    /// Connection state for the status badge
    pub connection: ConnectionState,
}

/// Sends typed messages and exposes the chat history
#[derive(Debug, Clone)]
pub struct ChatManager {
    ctx: FeatureContext,
}

impl ChatManager {
    /// Create the manager
    pub fn new(ctx: FeatureContext) -> Self {
        Self { ctx }
    }

    /// Send a text message; blank input is ignored
    ///
    /// Returns `true` when the message was handed to the connection (sent
    /// or queued).
    pub fn send_text(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }

        let id = self.ctx.store.next_message_id();
        self.ctx.store.add_message(ChatMessage::user_text(id, text));

        if self.ctx.connection.state() != ConnectionState::Connected {
            self.ctx.events.toast(Toast::warning(
                "Not connected. Your message will be sent when the connection is back.",
            ));
        }

        let message = match self.ctx.envelope() {
            MessageEnvelope::Wrapped => self.ctx.wrapped(PayloadType::Text, text.to_string()),
            MessageEnvelope::Flat => {
                let (user_id, session_id) = self.ctx.identity();
                ClientMessage::Message {
                    content: text.to_string(),
                    user_id,
                    session_id,
                }
            }
        };
        debug!(message_id = %id, chars = text.chars().count(), "Sending chat message");
        self.ctx.connection.send(message);
        self.ctx.store.update(|state| state.is_typing = true);
        true
    }

    /// Current chat view
    pub fn view(&self) -> ChatView {
        chat_view(&self.ctx.store.get())
    }

    /// Call `on_change` whenever the chat view changes
    pub fn watch<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(&ChatView) + Send + Sync + 'static,
    {
        watch_slice(&self.ctx.store, chat_view, on_change)
    }

    /// Drop the whole history
    pub fn clear_history(&self) {
        self.ctx.store.clear_messages();
    }
}

fn chat_view(state: &crate::state::AppState) -> ChatView {
    ChatView {
        messages: state.messages.clone(),
        is_typing: state.is_typing,
        streaming: state.streaming.clone(),
        connection: state.connection_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::events::{ClientEvent, ToastLevel};
    use crate::features::test_support;
    use crate::state::Sender;

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let chat = ChatManager::new(test_support::context(Config::default()));
        assert!(!chat.send_text("   "));
        assert!(chat.view().messages.is_empty());
        assert_eq!(chat.ctx.connection.queued().await, 0);
    }

    #[tokio::test]
    async fn test_offline_send_appends_queues_and_warns() {
        let ctx = test_support::context(Config::default());
        let mut events = ctx.events.subscribe();
        let chat = ChatManager::new(ctx);

        assert!(chat.send_text("  ¿Cuál es mi saldo?  "));

        let view = chat.view();
        assert_eq!(view.messages.len(), 1);
        assert_eq!(view.messages[0].content, "¿Cuál es mi saldo?");
        assert_eq!(view.messages[0].sender, Sender::User);
        assert!(view.is_typing);
        assert_eq!(chat.ctx.connection.queued().await, 1);
        assert!(matches!(
            events.try_recv(),
            Ok(ClientEvent::Toast(toast)) if toast.level == ToastLevel::Warning
        ));
    }
}
