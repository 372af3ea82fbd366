//! Protocol constants
//!
//! Markers recognized inside raw (non-JSON) stream fragments.

/// Raw fragment marker signalling a backend failure mid-stream
pub const RAW_ERROR_MARKER: &str = "[ERROR]";

/// Raw fragment that finalizes the current stream immediately
pub const RAW_DONE_MARKER: &str = "[DONE]";

/// Inbound discriminator used by the streaming backend
pub const KIND_FIELD: &str = "msg_type";

/// Inbound discriminator used by the action-based backend
pub const ACTION_FIELD: &str = "action";
