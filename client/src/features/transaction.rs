//! Transaction confirmation

use super::catalog::format_currency;
use super::FeatureContext;
use crate::error::ClientError;
use crate::events::Toast;
use crate::protocol::{ClientMessage, TransactionRequest};
use tracing::info;

/// Holds the transaction awaiting the user's decision
#[derive(Debug, Clone)]
pub struct TransactionManager {
    ctx: FeatureContext,
}

impl TransactionManager {
    /// Create the manager
    pub fn new(ctx: FeatureContext) -> Self {
        Self { ctx }
    }

    /// Show a confirmation request; replaces any earlier one
    pub fn present(&self, request: TransactionRequest) {
        info!(transaction_id = %request.id, "Transaction awaiting confirmation");
        self.ctx
            .store
            .update(|state| state.current_transaction = Some(request));
    }

    /// Transaction currently awaiting confirmation
    pub fn current(&self) -> Option<TransactionRequest> {
        self.ctx.store.get().current_transaction.clone()
    }

    /// Confirm the pending transaction
    pub fn confirm(&self) -> Result<(), ClientError> {
        let Some(request) = self.current() else {
            return Err(self.fail(ClientError::Validation(
                "There is no transaction to confirm".to_string(),
            )));
        };
        let (user_id, session_id) = self.ctx.identity();
        self.ctx.connection.send(ClientMessage::ConfirmTransaction {
            transaction_id: request.id.clone(),
            user_id,
            session_id,
        });
        self.ctx
            .store
            .update(|state| state.current_transaction = None);
        info!(transaction_id = %request.id, "Transaction confirmed");
        self.ctx.events.toast(Toast::success("Transaction confirmed"));
        Ok(())
    }

    /// Dismiss the pending transaction without telling the backend
    pub fn cancel(&self) {
        if let Some(request) = self.current() {
            info!(transaction_id = %request.id, "Transaction cancelled");
        }
        self.ctx
            .store
            .update(|state| state.current_transaction = None);
        self.ctx.events.toast(Toast::info("Transaction cancelled"));
    }

    fn fail(&self, error: ClientError) -> ClientError {
        self.ctx.events.toast(error.to_toast());
        error
    }
}

/// One-line description for confirmation dialogs
pub fn describe(request: &TransactionRequest) -> String {
    let kind = request.kind.as_deref().unwrap_or("Transfer");
    let amount = format_currency(request.amount.unwrap_or(0.0));
    match request.destination.as_deref() {
        Some(destination) => format!("{} of {} to {}", kind, amount, destination),
        None => format!("{} of {}", kind, amount),
    }
}
