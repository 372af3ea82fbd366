// UI module
// Contains layout, components, and the actions widgets hand back to the app

pub mod components;
pub mod layout;

pub use components::*;
pub use layout::render_app_layout;

use std::path::PathBuf;

/// Something the user asked for during a frame
///
/// Rendering only collects these; the app runs them on the client runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    Login(String),
    Logout,
    Reconnect,
    SendText(String),
    UploadImage(PathBuf),
    ToggleRecording,
    SelectProduct(String),
    ConfirmTransaction,
    CancelTransaction,
    ClearHistory,
}
