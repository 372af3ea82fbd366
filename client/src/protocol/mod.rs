//! Wire protocol
//!
//! Typed inbound and outbound frames exchanged with the backend. Inbound
//! text is validated here; anything that is not a known variant never
//! reaches the rest of the client.

pub mod constants;
pub mod inbound;
pub mod outbound;

pub use inbound::{
    parse_frame, CatalogPayload, ErrorPayload, ImageProcessedPayload, InboundFrame,
    PresignedUrlPayload, Product, ReplyPayload, ServerMessage, SessionAckPayload,
    TransactionRequest, VoicePayload,
};
pub use outbound::{ClientMessage, PayloadType, SendMessageData};

use thiserror::Error;

/// Errors raised while decoding or encoding frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON object carries neither `msg_type` nor `action`
    #[error("frame has no kind discriminator")]
    MissingKind,

    /// Discriminator names a kind this client does not know
    #[error("unknown frame kind: {0}")]
    UnknownKind(String),

    /// Known kind with a payload that does not match its shape
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        /// Kind the payload was declared as
        kind: String,
        /// Underlying decode error
        #[source]
        source: serde_json::Error,
    },

    /// Outbound frame could not be serialized
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}
