// Centli Desktop - Main Entry Point
// Native egui window over the Centli client core

mod state;
mod ui;

use centli_client::connection::WsConnector;
use centli_client::features::{ImageUpload, UnavailableAudio};
use centli_client::state::{SessionFile, Subscription};
use centli_client::{App, Config};
use eframe::egui;
use state::UiState;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use ui::{render_app_layout, UiAction};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    info!(url = %config.connection.endpoint_url, "Configuration loaded");

    // The client spawns its tasks on this runtime; eframe owns the main thread
    let runtime = Runtime::new()?;
    let session_file = SessionFile::new(config.session_file_path());
    let client = {
        let _guard = runtime.enter();
        Arc::new(App::new(
            config,
            Arc::new(WsConnector),
            Arc::new(UnavailableAudio),
            session_file,
        ))
    };

    // Configure window options
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Centli")
            .with_inner_size([1000.0, 700.0])
            .with_min_inner_size([720.0, 520.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Centli",
        options,
        Box::new(move |cc| Box::new(CentliDesktop::new(cc.egui_ctx.clone(), runtime, client))),
    )
    .map_err(|e| anyhow::anyhow!("window error: {}", e))
}

/// Main application struct
/// Bridges egui frames to the client running on the tokio runtime
struct CentliDesktop {
    runtime: Runtime,
    client: Arc<App>,
    ui_state: UiState,
    repaint: Option<Subscription>,
    router: JoinHandle<()>,
}

impl CentliDesktop {
    /// Wire the client to the window and restore any saved session
    fn new(ctx: egui::Context, runtime: Runtime, client: Arc<App>) -> Self {
        let repaint = client.store().subscribe(move |_| ctx.request_repaint());
        let router = {
            let _guard = runtime.enter();
            client.spawn_event_router()
        };

        let init = Arc::clone(&client);
        runtime.spawn(async move {
            if let Err(e) = init.init().await {
                debug!(error = %e, "Session restore failed");
            }
        });

        Self {
            runtime,
            client,
            ui_state: UiState::new(),
            repaint: Some(repaint),
            router,
        }
    }

    /// Run one user action on the client runtime
    fn dispatch(&mut self, action: UiAction) {
        debug!(action = ?action, "UI action");
        let client = Arc::clone(&self.client);
        match action {
            UiAction::Login(user_id) => {
                self.runtime.spawn(async move {
                    let _ = client.login(&user_id, None).await;
                });
            }
            UiAction::Logout => {
                self.ui_state.clear();
                self.runtime.spawn(async move { client.logout().await });
            }
            UiAction::Reconnect => client.connection().connect(),
            UiAction::SendText(text) => {
                client.chat.send_text(&text);
            }
            UiAction::UploadImage(path) => {
                self.runtime.spawn(async move {
                    let upload = match ImageUpload::from_path(&path).await {
                        Ok(upload) => upload,
                        Err(e) => {
                            client.events().toast(e.to_toast());
                            return;
                        }
                    };
                    let _ = client.images.upload(upload).await;
                });
            }
            UiAction::ToggleRecording => {
                self.runtime.spawn(async move {
                    let result = if client.store().get().is_recording {
                        client.voice.stop_recording().await
                    } else {
                        client.voice.start_recording().await
                    };
                    if let Err(e) = result {
                        debug!(error = %e, "Recording toggle failed");
                    }
                });
            }
            UiAction::SelectProduct(product_id) => {
                if let Err(e) = client.catalog.select(&product_id) {
                    debug!(error = %e, "Selection rejected");
                }
            }
            UiAction::ConfirmTransaction => {
                if let Err(e) = client.transactions.confirm() {
                    debug!(error = %e, "Confirmation rejected");
                }
            }
            UiAction::CancelTransaction => client.transactions.cancel(),
            UiAction::ClearHistory => client.chat.clear_history(),
        }
    }
}

impl eframe::App for CentliDesktop {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let snapshot = self.client.store().get();
        let toasts = self.client.toasts().visible();

        let actions = render_app_layout(ctx, &snapshot, &toasts, &mut self.ui_state);
        for action in actions {
            self.dispatch(action);
        }

        // Toasts expire on their own; keep repainting while any is shown
        if !toasts.is_empty() {
            ctx.request_repaint_after(std::time::Duration::from_millis(250));
        }
    }
}

impl Drop for CentliDesktop {
    fn drop(&mut self) {
        if let Some(repaint) = self.repaint.take() {
            repaint.unsubscribe();
        }
        self.router.abort();
        let client = Arc::clone(&self.client);
        self.runtime
            .block_on(async move { client.connection().disconnect().await });
        info!("Window closed");
    }
}
