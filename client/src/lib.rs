//! Centli Client Library
//!
//! Client core for the Centli banking assistant: a WebSocket connection
//! manager with reconnection and stream reassembly, an observable state
//! store, and the feature managers the UI adapters drive.
//! The terminal binary is in `src/main.rs`.

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod features;
pub mod protocol;
pub mod shell;
/// Application state management
///
/// Handles the observable store, chat history and session persistence.
pub mod state;

pub use config::Config;
pub use error::ClientError;
pub use shell::App;
