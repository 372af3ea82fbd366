//! Inbound frames (backend → client)
//!
//! The backend tags frames with either `msg_type` (streaming backend) or
//! `action` (action-based backend). Both are normalized into
//! [`ServerMessage`]. Text that is not a JSON object is a raw stream
//! fragment.

use super::constants::{ACTION_FIELD, KIND_FIELD};
use super::ProtocolError;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result of classifying one inbound text frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Tagged JSON event
    Structured(ServerMessage),
    /// Raw text fragment of a streamed reply
    Raw(String),
}

/// Known structured frames
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Session acknowledged
    Authenticated(SessionAckPayload),
    /// Discrete reply (action-based backend)
    Message(ReplyPayload),
    /// Discrete reply (streaming backend)
    AgentResponse(ReplyPayload),
    /// Audio reply
    VoiceResponse(VoicePayload),
    /// Image analysis result
    ImageProcessed(ImageProcessedPayload),
    /// Presigned upload target
    PresignedUrl(PresignedUrlPayload),
    /// Transaction awaiting user confirmation
    TransactionConfirmation(TransactionRequest),
    /// Product list
    ProductCatalog(CatalogPayload),
    /// Backend-reported failure
    Error(ErrorPayload),
    /// Streamed reply begins
    StreamStart,
    /// Streamed reply fragment
    StreamChunk(ReplyPayload),
    /// Streamed reply ends, optionally with the full text
    StreamEnd(ReplyPayload),
}

impl ServerMessage {
    /// Wire name of the frame kind
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Authenticated(_) => "authenticated",
            ServerMessage::Message(_) => "message",
            ServerMessage::AgentResponse(_) => "agent_response",
            ServerMessage::VoiceResponse(_) => "voice_response",
            ServerMessage::ImageProcessed(_) => "image_processed",
            ServerMessage::PresignedUrl(_) => "presigned_url",
            ServerMessage::TransactionConfirmation(_) => "transaction_confirmation",
            ServerMessage::ProductCatalog(_) => "product_catalog",
            ServerMessage::Error(_) => "error",
            ServerMessage::StreamStart => "stream_start",
            ServerMessage::StreamChunk(_) => "stream_chunk",
            ServerMessage::StreamEnd(_) => "stream_end",
        }
    }

    fn from_parts(kind: &str, body: Value) -> Result<Self, ProtocolError> {
        let message = match kind {
            "authenticated" => ServerMessage::Authenticated(payload(kind, body)?),
            "message" => ServerMessage::Message(payload(kind, body)?),
            "agent_response" => ServerMessage::AgentResponse(payload(kind, body)?),
            "voice_response" => ServerMessage::VoiceResponse(payload(kind, body)?),
            "image_processed" => ServerMessage::ImageProcessed(payload(kind, body)?),
            "presigned_url" => ServerMessage::PresignedUrl(payload(kind, body)?),
            "transaction_confirmation" => {
                ServerMessage::TransactionConfirmation(payload(kind, body)?)
            }
            "product_catalog" => ServerMessage::ProductCatalog(payload(kind, body)?),
            "error" => ServerMessage::Error(payload(kind, body)?),
            "stream_start" => ServerMessage::StreamStart,
            "stream_chunk" => ServerMessage::StreamChunk(payload(kind, body)?),
            "stream_end" => ServerMessage::StreamEnd(payload(kind, body)?),
            other => return Err(ProtocolError::UnknownKind(other.to_string())),
        };
        Ok(message)
    }
}

/// Classify an inbound text frame
///
/// Only JSON objects are structured; everything else (plain text, bare JSON
/// scalars such as `42`) is returned as a raw fragment.
pub fn parse_frame(text: &str) -> Result<InboundFrame, ProtocolError> {
    let mut map = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map,
        _ => return Ok(InboundFrame::Raw(text.to_string())),
    };
    let kind = take_kind(&mut map).ok_or(ProtocolError::MissingKind)?;
    ServerMessage::from_parts(&kind, Value::Object(map)).map(InboundFrame::Structured)
}

fn take_kind(map: &mut Map<String, Value>) -> Option<String> {
    let msg_type = map.remove(KIND_FIELD);
    let action = map.remove(ACTION_FIELD);
    match (msg_type, action) {
        (Some(Value::String(kind)), _) => Some(kind),
        (_, Some(Value::String(kind))) => Some(kind),
        _ => None,
    }
}

fn payload<T: DeserializeOwned>(kind: &str, body: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(body).map_err(|source| ProtocolError::InvalidPayload {
        kind: kind.to_string(),
        source,
    })
}

/// Text-bearing reply body; backends disagree on the field name
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReplyPayload {
    /// Action-based backend
    pub content: Option<String>,
    /// Older action-based backend
    pub text: Option<String>,
    /// Streaming backend
    pub message: Option<String>,
    /// Opaque extra data forwarded to the chat message
    pub data: Option<Value>,
}

impl ReplyPayload {
    /// First non-empty text field, falling back to `data.content`
    pub fn text(&self) -> Option<String> {
        [&self.content, &self.text, &self.message]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .cloned()
            .or_else(|| {
                self.data
                    .as_ref()
                    .and_then(|d| d.get("content"))
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
    }
}

/// Body of `authenticated`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SessionAckPayload {
    /// Echoed user id
    pub user_id: Option<String>,
    /// Echoed session id
    pub session_id: Option<String>,
}

/// Body of `voice_response`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VoicePayload {
    /// Audio URL or base64 data
    pub audio: Option<String>,
    /// Transcript of the reply, when provided
    #[serde(alias = "transcript")]
    pub text: Option<String>,
}

/// Body of `image_processed`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImageProcessedPayload {
    /// Backend's description of the image
    pub analysis: Option<String>,
}

/// Body of `presigned_url`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PresignedUrlPayload {
    /// PUT target
    pub upload_url: String,
    /// Public URL of the stored object
    pub image_url: String,
}

/// Body of `product_catalog`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CatalogPayload {
    /// Full product list
    #[serde(default)]
    pub products: Vec<Product>,
}

/// Body of `error`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorPayload {
    /// Error text
    pub message: Option<String>,
    /// Alternate error text field
    pub error: Option<String>,
}

impl ErrorPayload {
    /// Error text, or a generic one
    pub fn text(&self) -> String {
        self.message
            .as_deref()
            .or(self.error.as_deref())
            .filter(|s| !s.is_empty())
            .unwrap_or("An error occurred")
            .to_string()
    }
}

/// Marketplace product; unknown fields are preserved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Product id
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// Price in the account currency
    #[serde(default, deserialize_with = "opt_amount")]
    pub price: Option<f64>,
    /// Benefits summary
    #[serde(default)]
    pub benefits: Option<String>,
    /// Everything else the backend sent
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Transaction awaiting confirmation; unknown fields are preserved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Transaction id echoed back on confirmation
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Transaction type (transfer, purchase, ...)
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Amount
    #[serde(default, deserialize_with = "opt_amount")]
    pub amount: Option<f64>,
    /// Destination account or merchant
    #[serde(default)]
    pub destination: Option<String>,
    /// Everything else the backend sent
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

fn opt_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid amount: {}", s))),
        other => Err(de::Error::custom(format!("invalid amount: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structured(text: &str) -> ServerMessage {
        match parse_frame(text).unwrap() {
            InboundFrame::Structured(message) => message,
            InboundFrame::Raw(raw) => panic!("expected structured frame, got raw {:?}", raw),
        }
    }

    #[test]
    fn test_msg_type_discriminator() {
        let message = structured(r#"{"msg_type":"stream_chunk","message":"Hola"}"#);
        match message {
            ServerMessage::StreamChunk(reply) => assert_eq!(reply.text().as_deref(), Some("Hola")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_action_discriminator() {
        let message = structured(r#"{"action":"message","content":"Tu saldo es 100"}"#);
        assert_eq!(message.kind(), "message");
        match message {
            ServerMessage::Message(reply) => {
                assert_eq!(reply.text().as_deref(), Some("Tu saldo es 100"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_agent_response_falls_back_to_data_content() {
        let message =
            structured(r#"{"msg_type":"agent_response","data":{"content":"from data"}}"#);
        match message {
            ServerMessage::AgentResponse(reply) => {
                assert_eq!(reply.text().as_deref(), Some("from data"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_plain_text_is_raw() {
        assert_eq!(
            parse_frame("Hola mundo").unwrap(),
            InboundFrame::Raw("Hola mundo".to_string())
        );
    }

    #[test]
    fn test_json_scalar_is_raw() {
        assert_eq!(parse_frame("42").unwrap(), InboundFrame::Raw("42".to_string()));
        assert_eq!(
            parse_frame("\"quoted\"").unwrap(),
            InboundFrame::Raw("\"quoted\"".to_string())
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = parse_frame(r#"{"msg_type":"telemetry"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownKind(kind) if kind == "telemetry"));
    }

    #[test]
    fn test_missing_kind_rejected() {
        let err = parse_frame(r#"{"message":"orphan"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingKind));
    }

    #[test]
    fn test_invalid_payload_rejected() {
        let err = parse_frame(r#"{"action":"presigned_url","upload_url":5}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { .. }));
    }

    #[test]
    fn test_catalog_accepts_numeric_ids_and_string_prices() {
        let message = structured(
            r#"{"action":"product_catalog","products":[
                {"id":7,"name":"Tarjeta Oro","price":"1499.90","category":"cards"}
            ]}"#,
        );
        match message {
            ServerMessage::ProductCatalog(catalog) => {
                let product = &catalog.products[0];
                assert_eq!(product.id, "7");
                assert_eq!(product.price, Some(1499.90));
                assert_eq!(product.extra.get("category"), Some(&Value::from("cards")));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_transaction_confirmation_keeps_extra_fields() {
        let message = structured(
            r#"{"action":"transaction_confirmation","id":"tx-1","type":"transfer",
                "amount":250,"destination":"Maria","currency":"MXN"}"#,
        );
        match message {
            ServerMessage::TransactionConfirmation(tx) => {
                assert_eq!(tx.id, "tx-1");
                assert_eq!(tx.kind.as_deref(), Some("transfer"));
                assert_eq!(tx.amount, Some(250.0));
                assert!(tx.extra.contains_key("currency"));
                assert!(!tx.extra.contains_key("action"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_payload_default_text() {
        let message = structured(r#"{"msg_type":"error"}"#);
        match message {
            ServerMessage::Error(err) => assert_eq!(err.text(), "An error occurred"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
