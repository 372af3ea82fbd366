//! Product catalog

use super::{watch_slice, FeatureContext};
use crate::error::ClientError;
use crate::events::Toast;
use crate::protocol::{ClientMessage, Product};
use crate::state::Subscription;
use tracing::info;

/// Exposes the product list and sends selections
#[derive(Debug, Clone)]
pub struct CatalogManager {
    ctx: FeatureContext,
}

impl CatalogManager {
    /// Create the manager
    pub fn new(ctx: FeatureContext) -> Self {
        Self { ctx }
    }

    /// Products received from the backend
    pub fn products(&self) -> Vec<Product> {
        self.ctx.store.get().products.clone()
    }

    /// Product picked by the user
    pub fn selected(&self) -> Option<Product> {
        self.ctx.store.get().selected_product.clone()
    }

    /// Pick a product and tell the agent about it
    pub fn select(&self, product_id: &str) -> Result<(), ClientError> {
        let product = self
            .products()
            .into_iter()
            .find(|p| p.id == product_id)
            .ok_or_else(|| ClientError::Validation(format!("Unknown product: {}", product_id)))
            .map_err(|e| self.fail(e))?;

        info!(product_id = %product.id, "Product selected");
        self.ctx
            .events
            .toast(Toast::info(format!("Selected product: {}", product.name)));
        self.ctx
            .store
            .update(|state| state.selected_product = Some(product));

        let (user_id, session_id) = self.ctx.identity();
        self.ctx.connection.send(ClientMessage::ProductSelected {
            product_id: product_id.to_string(),
            user_id,
            session_id,
        });
        Ok(())
    }

    /// Forget the selection
    pub fn clear_selection(&self) {
        self.ctx
            .store
            .update(|state| state.selected_product = None);
    }

    /// Call `on_change` whenever the product list changes
    pub fn watch<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(&Vec<Product>) + Send + Sync + 'static,
    {
        watch_slice(&self.ctx.store, |state| state.products.clone(), on_change)
    }

    fn fail(&self, error: ClientError) -> ClientError {
        self.ctx.events.toast(error.to_toast());
        error
    }
}

/// Format an amount as `$1,234.50`; negatives as `-$500.00`
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::events::{ClientEvent, ToastLevel};
    use crate::features::test_support;
    use serde_json::json;

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(1234.5), "$1,234.50");
        assert_eq!(format_currency(-500.0), "-$500.00");
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(999.999), "$1,000.00");
        assert_eq!(format_currency(1234567.891), "$1,234,567.89");
    }

    #[tokio::test]
    async fn test_select_known_product() {
        let ctx = test_support::context(Config::default());
        let products: Vec<Product> =
            serde_json::from_value(json!([{"id": "p1", "name": "Tarjeta Oro", "price": 0}]))
                .unwrap();
        ctx.store.update(|state| state.products = products);
        let catalog = CatalogManager::new(ctx.clone());

        catalog.select("p1").unwrap();
        assert_eq!(catalog.selected().map(|p| p.name), Some("Tarjeta Oro".to_string()));
        assert_eq!(ctx.connection.queued().await, 1);

        assert!(catalog.select("missing").is_err());
        assert_eq!(ctx.connection.queued().await, 1);
    }

    #[tokio::test]
    async fn test_select_unknown_product_warns() {
        let ctx = test_support::context(Config::default());
        let catalog = CatalogManager::new(ctx.clone());
        let mut events = ctx.events.subscribe();

        assert!(matches!(
            catalog.select("missing"),
            Err(ClientError::Validation(_))
        ));
        assert!(catalog.selected().is_none());
        assert!(matches!(
            events.try_recv(),
            Ok(ClientEvent::Toast(toast)) if toast.level == ToastLevel::Warning
        ));
        assert_eq!(ctx.connection.queued().await, 0);
    }
}
