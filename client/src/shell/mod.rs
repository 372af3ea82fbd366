//! Application shell: login/logout, views and toasts

pub mod app;
pub mod toast;

pub use app::App;
pub use toast::ToastCenter;
