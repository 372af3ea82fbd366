//! Error types and error handling for the client
//!
//! This module defines the error taxonomy shared by the connection manager,
//! the feature managers and the shell. Every error can be turned into a
//! user-facing toast via [`ClientError::to_toast`].

use crate::connection::TransportError;
use crate::events::{Toast, ToastLevel};
use crate::protocol::ProtocolError;
use crate::state::{PersistenceError, StoreError};
use thiserror::Error;

/// Client-level error types
///
/// Transport and protocol errors are handled inside the connection manager;
/// the remaining variants are the ones that reach the user.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Socket could not be opened or closed unexpectedly
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Inbound frame could not be understood
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Backend reported a failure
    #[error("Server error: {0}")]
    Application(String),

    /// Microphone, camera or another device capability is missing or denied
    #[error("Capability unavailable: {0}")]
    Capability(String),

    /// User input rejected before any network call
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Upload to the presigned URL failed
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Session file could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Store path update rejected
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Catch-all for unexpected errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ClientError {
    /// Map the error to the toast shown to the user
    pub fn to_toast(&self) -> Toast {
        let (level, message) = match self {
            ClientError::Validation(msg) => (ToastLevel::Warning, msg.clone()),
            ClientError::Capability(msg) => (ToastLevel::Error, msg.clone()),
            ClientError::Application(msg) => (ToastLevel::Error, msg.clone()),
            ClientError::Upload(_) => (ToastLevel::Error, "Image upload failed".to_string()),
            ClientError::Transport(_) => (
                ToastLevel::Error,
                "Connection problem, retrying".to_string(),
            ),
            ClientError::Protocol(_)
            | ClientError::Persistence(_)
            | ClientError::Store(_)
            | ClientError::Internal(_) => (ToastLevel::Error, self.to_string()),
        };
        Toast::new(level, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_warning() {
        let toast = ClientError::Validation("Image too large".to_string()).to_toast();
        assert_eq!(toast.level, ToastLevel::Warning);
        assert_eq!(toast.message, "Image too large");
    }

    #[test]
    fn test_upload_hides_details() {
        let toast = ClientError::Upload("status 403".to_string()).to_toast();
        assert_eq!(toast.level, ToastLevel::Error);
        assert!(!toast.message.contains("403"));
    }
}
