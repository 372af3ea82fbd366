//! Toast notifications waiting to be shown

use crate::events::Toast;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct ActiveToast {
    toast: Toast,
    expires_at: Instant,
}

/// Expiring list of toasts rendered by the UI adapters
#[derive(Debug)]
pub struct ToastCenter {
    duration: Duration,
    active: Mutex<Vec<ActiveToast>>,
}

impl ToastCenter {
    /// Toasts stay visible for `duration`
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            active: Mutex::new(Vec::new()),
        }
    }

    /// Show a toast
    pub fn push(&self, toast: Toast) {
        let expires_at = Instant::now() + self.duration;
        self.lock().push(ActiveToast { toast, expires_at });
    }

    /// Toasts still visible, oldest first; expired ones are dropped
    pub fn visible(&self) -> Vec<Toast> {
        let now = Instant::now();
        let mut active = self.lock();
        active.retain(|entry| entry.expires_at > now);
        active.iter().map(|entry| entry.toast.clone()).collect()
    }

    /// Dismiss every toast
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ActiveToast>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
