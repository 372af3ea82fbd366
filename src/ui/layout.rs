// Main application layout
// Login screen, chat window, catalog panel, transaction dialog and toasts

use crate::state::UiState;
use crate::ui::components::*;
use crate::ui::UiAction;
use centli_client::connection::ConnectionState;
use centli_client::events::Toast;
use centli_client::features::transaction::describe;
use centli_client::state::{AppState, View};
use centli_client::protocol::TransactionRequest;
use eframe::egui;

/// Render the whole window for the current client state
/// Returns the actions the user triggered this frame
pub fn render_app_layout(
    ctx: &egui::Context,
    state: &AppState,
    toasts: &[Toast],
    ui_state: &mut UiState,
) -> Vec<UiAction> {
    let mut actions = Vec::new();

    match state.current_view {
        View::Login => render_login(ctx, state, ui_state, &mut actions),
        View::Chat => {
            render_top_bar(ctx, state, ui_state, &mut actions);
            if ui_state.catalog_visible {
                render_catalog(ctx, state, &mut actions);
            }
            render_composer(ctx, state, ui_state, &mut actions);
            render_transcript(ctx, state);
            if let Some(request) = &state.current_transaction {
                render_transaction_dialog(ctx, request, &mut actions);
            }
        }
    }

    toast_overlay(ctx, toasts);
    actions
}

/// Render the login screen
fn render_login(
    ctx: &egui::Context,
    state: &AppState,
    ui_state: &mut UiState,
    actions: &mut Vec<UiAction>,
) {
    egui::CentralPanel::default().show(ctx, |ui| {
        ui.vertical_centered(|ui| {
            ui.add_space(120.0);
            ui.heading(egui::RichText::new("Centli").size(28.0));
            ui.add_space(8.0);
            ui.label(egui::RichText::new("Your banking assistant").weak());
            ui.add_space(32.0);

            let input = ui.add(
                egui::TextEdit::singleline(&mut ui_state.login_user)
                    .hint_text("User id")
                    .desired_width(240.0),
            );
            let submitted = input.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            ui.add_space(12.0);
            if primary_button(ui, "Log in").clicked() || submitted {
                if let Some(user_id) = ui_state.take_login() {
                    actions.push(UiAction::Login(user_id));
                }
            }

            if let Some(error) = &state.error {
                ui.add_space(16.0);
                ui.colored_label(egui::Color32::from_rgb(220, 0, 0), error);
            }
        });
    });
}

/// Render the top menu bar with connection status
fn render_top_bar(
    ctx: &egui::Context,
    state: &AppState,
    ui_state: &mut UiState,
    actions: &mut Vec<UiAction>,
) {
    egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
        egui::menu::bar(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.button("Clear history").clicked() {
                    actions.push(UiAction::ClearHistory);
                    ui.close_menu();
                }
                if ui.button("Log out").clicked() {
                    actions.push(UiAction::Logout);
                    ui.close_menu();
                }
                ui.separator();
                if ui.button("Quit").clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
            });

            ui.menu_button("View", |ui| {
                let mut dark_mode = ctx.style().visuals.dark_mode;
                if ui.checkbox(&mut dark_mode, "Dark Mode").changed() {
                    ctx.style_mut(|style| {
                        style.visuals.dark_mode = dark_mode;
                    });
                }
                ui.checkbox(&mut ui_state.catalog_visible, "Product catalog");
            });

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.add_space(8.0);
                if state.connection_status == ConnectionState::Error
                    && secondary_button(ui, "Reconnect").clicked()
                {
                    actions.push(UiAction::Reconnect);
                }
                status_badge(ui, state.connection_status, state.reconnect_attempts);
                if let Some(user) = &state.user {
                    ui.add_space(12.0);
                    ui.label(egui::RichText::new(&user.id).strong());
                }
            });
        });
    });
}

/// Render the product catalog on the right
fn render_catalog(ctx: &egui::Context, state: &AppState, actions: &mut Vec<UiAction>) {
    egui::SidePanel::right("catalog_panel")
        .resizable(true)
        .default_width(240.0)
        .min_width(180.0)
        .show(ctx, |ui| {
            ui.add_space(8.0);
            ui.heading("Products");
            ui.add_space(4.0);
            ui.separator();
            ui.add_space(4.0);

            egui::ScrollArea::vertical()
                .id_source("catalog_scroll")
                .auto_shrink([false; 2])
                .show(ui, |ui| {
                    if state.products.is_empty() {
                        ui.vertical_centered(|ui| {
                            ui.add_space(40.0);
                            ui.label(egui::RichText::new("No products yet").italics().weak());
                            ui.add_space(8.0);
                            ui.label(
                                egui::RichText::new("Ask the assistant about cards or accounts")
                                    .weak()
                                    .size(12.0),
                            );
                        });
                        return;
                    }
                    let selected_id = state.selected_product.as_ref().map(|p| p.id.as_str());
                    for product in &state.products {
                        let is_selected = selected_id == Some(product.id.as_str());
                        if product_card(ui, product, is_selected) {
                            actions.push(UiAction::SelectProduct(product.id.clone()));
                        }
                    }
                });
        });
}

/// Render the input area at the bottom
fn render_composer(
    ctx: &egui::Context,
    state: &AppState,
    ui_state: &mut UiState,
    actions: &mut Vec<UiAction>,
) {
    egui::TopBottomPanel::bottom("composer").show(ctx, |ui| {
        ui.add_space(8.0);

        if state.is_uploading {
            ui.add(
                egui::ProgressBar::new(f32::from(state.upload_progress) / 100.0)
                    .text("Uploading image")
                    .desired_height(6.0),
            );
            ui.add_space(4.0);
        }

        ui.horizontal(|ui| {
            let record_label = if state.is_recording { "⏹ Stop" } else { "🎤 Record" };
            let record = ui
                .add_enabled(state.voice_available, egui::Button::new(record_label))
                .on_disabled_hover_text("No microphone available");
            if record.clicked() {
                actions.push(UiAction::ToggleRecording);
            }

            let send_width = 80.0;
            let input = ui.add(
                egui::TextEdit::singleline(&mut ui_state.draft)
                    .hint_text("Write a message")
                    .desired_width(ui.available_width() - send_width),
            );
            let submitted = input.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if primary_button(ui, "Send").clicked() || submitted {
                if let Some(text) = ui_state.take_draft() {
                    actions.push(UiAction::SendText(text));
                }
                input.request_focus();
            }
        });

        ui.add_space(4.0);
        ui.horizontal(|ui| {
            ui.label(egui::RichText::new("Image").weak());
            ui.add(
                egui::TextEdit::singleline(&mut ui_state.image_path)
                    .hint_text("/path/to/receipt.png")
                    .desired_width(ui.available_width() - 100.0),
            );
            let upload = ui.add_enabled(!state.is_uploading, egui::Button::new("Send image"));
            if upload.clicked() {
                if let Some(path) = ui_state.take_image_path() {
                    actions.push(UiAction::UploadImage(path));
                }
            }
        });
        ui.add_space(8.0);
    });
}

/// Render the chat history and the streaming reply
fn render_transcript(ctx: &egui::Context, state: &AppState) {
    egui::CentralPanel::default().show(ctx, |ui| {
        egui::ScrollArea::vertical()
            .id_source("transcript_scroll")
            .auto_shrink([false; 2])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                ui.add_space(8.0);
                if state.messages.is_empty() && state.streaming.is_none() {
                    ui.vertical_centered(|ui| {
                        ui.add_space(80.0);
                        ui.heading(egui::RichText::new("How can I help you today?").size(20.0));
                        ui.add_space(8.0);
                        ui.label(
                            egui::RichText::new("Check balances, transfer money or explore products")
                                .weak(),
                        );
                    });
                }

                for message in &state.messages {
                    message_bubble(ui, message);
                }

                match &state.streaming {
                    Some(preview) => streaming_bubble(ui, &preview.text),
                    None if state.is_typing => {
                        ui.horizontal(|ui| {
                            ui.add_space(8.0);
                            ui.spinner();
                            ui.label(egui::RichText::new("Centli is typing").weak().italics());
                        });
                    }
                    None => {}
                }
                ui.add_space(8.0);
            });
    });
}

/// Render the modal asking to confirm a transaction
fn render_transaction_dialog(
    ctx: &egui::Context,
    request: &TransactionRequest,
    actions: &mut Vec<UiAction>,
) {
    egui::Window::new("Confirm transaction")
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
        .show(ctx, |ui| {
            ui.add_space(8.0);
            ui.label(egui::RichText::new(describe(request)).size(16.0));
            ui.add_space(4.0);
            ui.label(
                egui::RichText::new(format!("Reference: {}", request.id))
                    .monospace()
                    .weak()
                    .size(12.0),
            );
            ui.add_space(16.0);
            ui.horizontal(|ui| {
                ui.spacing_mut().button_padding = egui::vec2(12.0, 8.0);
                if primary_button(ui, "Confirm").clicked() {
                    actions.push(UiAction::ConfirmTransaction);
                }
                ui.add_space(8.0);
                if secondary_button(ui, "Cancel").clicked() {
                    actions.push(UiAction::CancelTransaction);
                }
            });
        });
}
