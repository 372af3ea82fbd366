// Desktop UI state
// Input drafts and panel visibility; everything else lives in the client store

use std::path::PathBuf;

/// Local widget state that never leaves the window
#[derive(Debug, Clone)]
pub struct UiState {
    /// User id typed on the login screen
    pub login_user: String,
    /// Chat input box
    pub draft: String,
    /// Path typed in the image picker
    pub image_path: String,
    /// Whether the product catalog panel is visible
    pub catalog_visible: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            login_user: String::new(),
            draft: String::new(),
            image_path: String::new(),
            catalog_visible: true,
        }
    }
}

impl UiState {
    /// Create a new UI state with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the chat draft if it has any text, leaving the box empty
    pub fn take_draft(&mut self) -> Option<String> {
        take_trimmed(&mut self.draft)
    }

    /// Take the login user id if it has any text
    pub fn take_login(&mut self) -> Option<String> {
        take_trimmed(&mut self.login_user)
    }

    /// Take the typed image path if it has any text
    pub fn take_image_path(&mut self) -> Option<PathBuf> {
        take_trimmed(&mut self.image_path).map(PathBuf::from)
    }

    /// Forget every draft (after logout)
    pub fn clear(&mut self) {
        let catalog_visible = self.catalog_visible;
        *self = Self {
            catalog_visible,
            ..Self::default()
        };
    }
}

fn take_trimmed(field: &mut String) -> Option<String> {
    let text = std::mem::take(field);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
