//! Inbound frame dispatch
//!
//! Classifies each text frame and applies its effect to the store and the
//! event bus. Owned by the connection worker, so frames are handled strictly
//! in arrival order.

use super::reassembly::{StreamAssembler, StreamBuffer, StreamOrigin};
use crate::events::{ClientEvent, EventBus, Toast};
use crate::protocol::constants::{RAW_DONE_MARKER, RAW_ERROR_MARKER};
use crate::protocol::{parse_frame, InboundFrame, ReplyPayload, ServerMessage};
use crate::state::{ChatMessage, MessageKind, Sender, Store, StreamPreview};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const GENERIC_STREAM_ERROR: &str = "The response could not be completed";

/// Applies inbound frames to the client state
#[derive(Debug)]
pub struct FrameDispatcher {
    store: Store,
    events: EventBus,
    assembler: StreamAssembler,
}

impl FrameDispatcher {
    /// Dispatcher finalizing raw streams after `idle_timeout`
    pub fn new(store: Store, events: EventBus, idle_timeout: Duration) -> Self {
        Self {
            store,
            events,
            assembler: StreamAssembler::new(idle_timeout),
        }
    }

    /// Handle one inbound text frame
    pub fn handle_frame(&mut self, text: &str) {
        match parse_frame(text) {
            Ok(InboundFrame::Structured(message)) => {
                debug!(kind = message.kind(), "Inbound frame");
                self.handle_message(message);
            }
            Ok(InboundFrame::Raw(fragment)) => self.handle_raw(&fragment),
            Err(e) => warn!(error = %e, "Dropping inbound frame"),
        }
    }

    /// When the active raw stream goes idle
    pub fn idle_deadline(&self) -> Option<Instant> {
        self.assembler.idle_deadline()
    }

    /// Finalize the active stream after its idle window elapsed
    pub fn on_idle_timeout(&mut self) {
        // Only raw streams carry a deadline
        if self.idle_deadline().is_none() {
            return;
        }
        if let Some(buffer) = self.assembler.finish() {
            debug!(message_id = %buffer.message_id, "Stream idle, finalizing");
            self.commit(Some(buffer), None, None);
        }
    }

    /// Drop any partial stream (connection lost or closed)
    pub fn reset(&mut self) {
        if let Some(message_id) = self.assembler.discard() {
            debug!(message_id = %message_id, "Discarding partial stream");
        }
        self.store.update(|state| {
            state.streaming = None;
            state.is_typing = false;
        });
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Authenticated(ack) => {
                info!(user_id = ?ack.user_id, session_id = ?ack.session_id, "Session authenticated");
                self.events.publish(ClientEvent::SessionAck {
                    user_id: ack.user_id,
                    session_id: ack.session_id,
                });
                self.events.toast(Toast::info("Session authenticated"));
            }
            ServerMessage::Message(reply) | ServerMessage::AgentResponse(reply) => {
                self.discrete_reply(reply);
            }
            ServerMessage::VoiceResponse(voice) => {
                if let Some(audio) = voice.audio.filter(|a| !a.is_empty()) {
                    self.events.publish(ClientEvent::VoiceReply { audio });
                }
                let message = voice.text.filter(|t| !t.trim().is_empty()).map(|text| {
                    ChatMessage::new(
                        self.store.next_message_id(),
                        Sender::Agent,
                        MessageKind::Voice,
                        text,
                    )
                });
                self.store.update(|state| {
                    state.messages.extend(message);
                    state.is_typing = false;
                });
            }
            ServerMessage::ImageProcessed(processed) => {
                let message = processed
                    .analysis
                    .filter(|a| !a.trim().is_empty())
                    .map(|analysis| ChatMessage::agent_text(self.store.next_message_id(), analysis));
                self.store.update(|state| {
                    state.messages.extend(message);
                    state.is_typing = false;
                });
            }
            ServerMessage::PresignedUrl(target) => {
                self.events.publish(ClientEvent::UploadReady {
                    upload_url: target.upload_url,
                    image_url: target.image_url,
                });
            }
            ServerMessage::TransactionConfirmation(request) => {
                self.events.publish(ClientEvent::TransactionRequest(request));
            }
            ServerMessage::ProductCatalog(catalog) => {
                info!(count = catalog.products.len(), "Product catalog received");
                let products = catalog.products;
                let snapshot = products.clone();
                self.store.update(move |state| state.products = snapshot);
                self.events.publish(ClientEvent::CatalogUpdate { products });
            }
            ServerMessage::Error(err) => self.server_error(err.text()),
            ServerMessage::StreamStart => {
                let message_id = self.store.next_message_id();
                if let Some(stale) = self.assembler.start(message_id) {
                    debug!(message_id = %stale.message_id, "Stream restarted, dropping previous buffer");
                }
                self.store.update(|state| {
                    state.streaming = Some(StreamPreview {
                        message_id,
                        text: String::new(),
                    });
                    state.is_typing = true;
                });
                self.events.publish(ClientEvent::StreamStart { message_id });
            }
            ServerMessage::StreamChunk(reply) => match reply.text() {
                Some(fragment) => self.append(&fragment, StreamOrigin::Structured),
                None => debug!("Empty stream chunk"),
            },
            ServerMessage::StreamEnd(reply) => {
                let buffer = self.assembler.finish();
                let text = reply.text();
                self.commit(buffer, text, reply.data);
            }
        }
    }

    fn handle_raw(&mut self, fragment: &str) {
        if let Some(position) = fragment.find(RAW_ERROR_MARKER) {
            let detail = fragment[position + RAW_ERROR_MARKER.len()..].trim();
            let detail = if detail.is_empty() {
                GENERIC_STREAM_ERROR
            } else {
                detail
            };
            self.server_error(detail.to_string());
            return;
        }
        if self.structured_stream_open() {
            warn!(
                chars = fragment.chars().count(),
                "Raw fragment during a structured stream, dropping"
            );
            return;
        }
        if fragment.trim() == RAW_DONE_MARKER {
            let buffer = self.assembler.finish();
            self.commit(buffer, None, None);
            return;
        }
        self.append(fragment, StreamOrigin::Raw);
    }

    fn structured_stream_open(&self) -> bool {
        self.assembler
            .current()
            .is_some_and(|buffer| buffer.origin == StreamOrigin::Structured)
    }

    fn append(&mut self, fragment: &str, origin: StreamOrigin) {
        let store = &self.store;
        let appended = self
            .assembler
            .append(fragment, origin, || store.next_message_id());
        let message_id = appended.message_id;

        self.store.update(|state| {
            state.streaming = Some(StreamPreview {
                message_id,
                text: appended.text,
            });
            state.is_typing = true;
        });
        if appended.started {
            self.events.publish(ClientEvent::StreamStart { message_id });
        }
        self.events.publish(ClientEvent::StreamChunk {
            message_id,
            text: fragment.to_string(),
        });
    }

    /// Commit the final text of a stream: the end frame's text when it has
    /// one, otherwise the accumulated buffer
    fn commit(&mut self, buffer: Option<StreamBuffer>, frame_text: Option<String>, data: Option<Value>) {
        let message_id = buffer
            .as_ref()
            .map(|b| b.message_id)
            .unwrap_or_else(|| self.store.next_message_id());
        let content = frame_text
            .filter(|t| !t.trim().is_empty())
            .or_else(|| buffer.map(|b| b.text))
            .filter(|t| !t.trim().is_empty());

        let message = content
            .clone()
            .map(|text| ChatMessage::agent_text(message_id, text).with_data(data));
        self.store.update(|state| {
            state.messages.extend(message);
            state.streaming = None;
            state.is_typing = false;
        });
        debug!(message_id = %message_id, committed = content.is_some(), "Stream finalized");
        self.events.publish(ClientEvent::StreamEnd {
            message_id,
            content,
        });
    }

    fn discrete_reply(&mut self, reply: ReplyPayload) {
        self.assembler.discard();
        let message = reply.text().map(|text| {
            ChatMessage::agent_text(self.store.next_message_id(), text).with_data(reply.data)
        });
        if message.is_none() {
            warn!("Agent reply without text");
        }
        self.store.update(|state| {
            state.messages.extend(message);
            state.streaming = None;
            state.is_typing = false;
        });
    }

    fn server_error(&mut self, text: String) {
        warn!(error = %text, "Backend reported an error");
        self.assembler.discard();
        let message = ChatMessage::agent_error(self.store.next_message_id(), format!("Error: {}", text));
        self.store.update(|state| {
            state.messages.push(message);
            state.streaming = None;
            state.is_typing = false;
        });
        self.events.publish(ClientEvent::ServerError {
            message: text.clone(),
        });
        self.events.toast(Toast::error(text));
    }
}
