// Reusable UI components
// Provides common UI elements for the application

use centli_client::connection::ConnectionState;
use centli_client::events::{Toast, ToastLevel};
use centli_client::features::format_currency;
use centli_client::protocol::Product;
use centli_client::state::{ChatMessage, MessageKind, Sender};
use eframe::egui;

const GREEN: egui::Color32 = egui::Color32::from_rgb(0, 180, 0);
const YELLOW: egui::Color32 = egui::Color32::from_rgb(220, 180, 0);
const RED: egui::Color32 = egui::Color32::from_rgb(220, 0, 0);

/// Render a connection badge with colored text (no background bar)
/// Colors: Disconnected (gray), Connecting (yellow), Connected (green), Error (red)
pub fn status_badge(ui: &mut egui::Ui, status: ConnectionState, attempts: u32) {
    let (text, text_color) = match status {
        ConnectionState::Disconnected => ("● Disconnected".to_string(), egui::Color32::GRAY),
        ConnectionState::Connecting if attempts > 0 => {
            (format!("● Reconnecting ({})", attempts), YELLOW)
        }
        ConnectionState::Connecting => ("● Connecting".to_string(), YELLOW),
        ConnectionState::Connected => ("● Connected".to_string(), GREEN),
        ConnectionState::Error => ("● Offline".to_string(), RED),
    };

    ui.colored_label(text_color, text);
}

/// Render a primary action button
pub fn primary_button(ui: &mut egui::Ui, text: &str) -> egui::Response {
    ui.button(egui::RichText::new(text).strong())
}

/// Render a secondary button
pub fn secondary_button(ui: &mut egui::Ui, text: &str) -> egui::Response {
    ui.button(text)
}

/// Render one chat message, aligned by sender
pub fn message_bubble(ui: &mut egui::Ui, message: &ChatMessage) {
    let layout = match message.sender {
        Sender::User => egui::Layout::right_to_left(egui::Align::TOP),
        Sender::Agent => egui::Layout::left_to_right(egui::Align::TOP),
    };
    let fill = if message.is_error {
        egui::Color32::from_rgba_unmultiplied(220, 0, 0, 40)
    } else if message.sender == Sender::User {
        ui.visuals().selection.bg_fill
    } else {
        ui.visuals().faint_bg_color
    };
    let prefix = match message.kind {
        MessageKind::Text => "",
        MessageKind::Image => "🖼 ",
        MessageKind::Voice => "🎤 ",
    };

    ui.with_layout(layout, |ui| {
        ui.add_space(8.0);
        egui::Frame::none()
            .fill(fill)
            .rounding(egui::Rounding::same(6.0))
            .inner_margin(egui::Margin::symmetric(10.0, 6.0))
            .show(ui, |ui| {
                ui.set_max_width(420.0);
                ui.vertical(|ui| {
                    ui.label(format!("{}{}", prefix, message.content));
                    ui.label(
                        egui::RichText::new(message.timestamp.format("%H:%M").to_string())
                            .weak()
                            .small(),
                    );
                });
            });
    });
    ui.add_space(4.0);
}

/// Render the in-progress reply of a stream
pub fn streaming_bubble(ui: &mut egui::Ui, text: &str) {
    ui.horizontal(|ui| {
        ui.add_space(8.0);
        egui::Frame::none()
            .fill(ui.visuals().faint_bg_color)
            .rounding(egui::Rounding::same(6.0))
            .inner_margin(egui::Margin::symmetric(10.0, 6.0))
            .show(ui, |ui| {
                ui.set_max_width(420.0);
                ui.horizontal_wrapped(|ui| {
                    ui.label(text);
                    ui.spinner();
                });
            });
    });
}

/// Render a product card; returns true when "Select" was clicked
pub fn product_card(ui: &mut egui::Ui, product: &Product, selected: bool) -> bool {
    let mut clicked = false;
    let mut frame = egui::Frame::group(ui.style());
    if selected {
        frame.fill = ui.visuals().selection.bg_fill;
    }
    frame.show(ui, |ui| {
        ui.set_width(ui.available_width());
        ui.label(egui::RichText::new(&product.name).strong());
        if let Some(price) = product.price {
            ui.label(format_currency(price));
        }
        if let Some(description) = &product.description {
            ui.label(egui::RichText::new(description).weak().size(12.0));
        }
        if let Some(benefits) = &product.benefits {
            ui.label(egui::RichText::new(benefits).italics().size(12.0));
        }
        ui.add_space(4.0);
        if !selected && secondary_button(ui, "Select").clicked() {
            clicked = true;
        }
    });
    ui.add_space(4.0);
    clicked
}

/// Render the visible toasts stacked in the bottom-right corner
pub fn toast_overlay(ctx: &egui::Context, toasts: &[Toast]) {
    if toasts.is_empty() {
        return;
    }
    egui::Area::new(egui::Id::new("toast_overlay"))
        .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-16.0, -16.0))
        .order(egui::Order::Foreground)
        .show(ctx, |ui| {
            for toast in toasts {
                let color = match toast.level {
                    ToastLevel::Info => egui::Color32::LIGHT_BLUE,
                    ToastLevel::Success => GREEN,
                    ToastLevel::Warning => YELLOW,
                    ToastLevel::Error => RED,
                };
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.set_max_width(320.0);
                    ui.colored_label(color, &toast.message);
                });
                ui.add_space(6.0);
            }
        });
}
