//! Outbound frames (client → backend)

use super::ProtocolError;
use serde::{Deserialize, Serialize};

/// Frames the client sends, tagged by `action`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First frame on every opened socket
    Authenticate {
        /// User id
        user_id: String,
        /// Session id
        session_id: String,
        /// Opaque session token
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    /// Chat text (flat envelope)
    Message {
        /// Message text
        content: String,
        /// Sender, when logged in
        user_id: Option<String>,
        /// Session, when logged in
        session_id: Option<String>,
    },
    /// Chat payload (wrapped envelope)
    #[serde(rename = "sendMessage")]
    SendMessage {
        /// Envelope body
        data: SendMessageData,
    },
    /// Ask for a presigned upload URL
    RequestPresignedUrl {
        /// Original file name
        filename: String,
        /// MIME type of the upload
        content_type: String,
        /// Session, when logged in
        session_id: Option<String>,
    },
    /// Image already uploaded to `image_url`
    ImageMessage {
        /// Public URL of the image
        image_url: String,
        /// Sender
        user_id: Option<String>,
        /// Session
        session_id: Option<String>,
    },
    /// Recorded voice note
    VoiceMessage {
        /// Base64 audio
        audio: String,
        /// Container format, e.g. `webm`
        format: String,
        /// Recording length in milliseconds
        duration: u64,
        /// Sender
        user_id: Option<String>,
        /// Session
        session_id: Option<String>,
    },
    /// User confirmed a pending transaction
    ConfirmTransaction {
        /// Transaction id from the confirmation request
        transaction_id: String,
        /// Sender
        user_id: Option<String>,
        /// Session
        session_id: Option<String>,
    },
    /// User picked a product from the catalog
    ProductSelected {
        /// Product id
        product_id: String,
        /// Sender
        user_id: Option<String>,
        /// Session
        session_id: Option<String>,
    },
}

/// Body of a wrapped `sendMessage` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageData {
    /// Sender
    pub user_id: Option<String>,
    /// Session
    pub session_id: Option<String>,
    /// Text, base64 audio or base64 image
    pub message: String,
    /// What `message` carries
    #[serde(rename = "type")]
    pub kind: PayloadType,
}

/// Payload type carried in a wrapped envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PayloadType {
    /// Plain text
    Text,
    /// Recorded voice note
    Voice,
    /// Generic audio clip
    Audio,
    /// Inline image
    Image,
}

impl ClientMessage {
    /// Wire name of the action
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Authenticate { .. } => "authenticate",
            ClientMessage::Message { .. } => "message",
            ClientMessage::SendMessage { .. } => "sendMessage",
            ClientMessage::RequestPresignedUrl { .. } => "request_presigned_url",
            ClientMessage::ImageMessage { .. } => "image_message",
            ClientMessage::VoiceMessage { .. } => "voice_message",
            ClientMessage::ConfirmTransaction { .. } => "confirm_transaction",
            ClientMessage::ProductSelected { .. } => "product_selected",
        }
    }

    /// Serialize to the text sent on the socket
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
