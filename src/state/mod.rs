// State management module
// Window-local UI state; application state comes from the client store

pub mod ui_state;

pub use ui_state::UiState;
