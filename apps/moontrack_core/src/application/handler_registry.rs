//! Handler Registry (C5): maps a transaction-type string to the
//! `TransactionHandler` that knows how to validate and expand it into
//! balanced entries (spec.md §4.5).
//!
//! Grounded in the teacher's investment/wallet service split, where a
//! service depends only on narrow traits and never on a concrete sibling
//! package; here the registry is the seam, so the ledger core never
//! imports a handler package directly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::domain::entry::Entry;
use crate::error::LedgerError;

/// Caller identity threaded into every handler call (spec.md §5, §9
/// "Authorization in handlers vs centrally"). `None` means
/// system-initiated (sync jobs, admin) and bypasses the ownership check.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationContext {
    pub user_id: Option<Uuid>,
}

impl OperationContext {
    pub fn system() -> Self {
        Self { user_id: None }
    }

    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }
}

/// Minimal seam onto the external wallet-management collaborator
/// (spec.md §1 Non-goals): handlers need only a wallet's owning user id
/// to enforce authorization, never full wallet CRUD.
#[async_trait]
pub trait WalletDirectory: Send + Sync {
    async fn get_owner(&self, wallet_id: Uuid) -> Result<Option<Uuid>, LedgerError>;

    /// Every wallet a user owns, for the Portfolio Aggregator's first
    /// step (spec.md §4.11).
    async fn list_wallets_for_user(&self, user_id: Uuid) -> Result<Vec<Uuid>, LedgerError>;
}

/// The capability set every handler exposes (spec.md §4.5, §4.6).
#[async_trait]
pub trait TransactionHandler: Send + Sync {
    fn transaction_type(&self) -> &'static str;

    /// Structural + authorization validation, no side effects.
    async fn validate_data(&self, ctx: &OperationContext, raw_data: &Json) -> Result<(), LedgerError>;

    /// Expand into balanced, side-correct entries carrying `account_code`
    /// in metadata. Idempotent with respect to external state.
    async fn handle(
        &self,
        ctx: &OperationContext,
        transaction_id: Uuid,
        raw_data: &Json,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<Entry>, LedgerError>;
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TransactionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-shot at composition time; no dynamic deregistration
    /// (spec.md §4.5).
    pub fn register(&mut self, handler: Arc<dyn TransactionHandler>) -> Result<(), LedgerError> {
        let key = handler.transaction_type().to_string();
        if self.handlers.contains_key(&key) {
            return Err(LedgerError::HandlerAlreadyRegistered(key));
        }
        self.handlers.insert(key, handler);
        Ok(())
    }

    pub fn get(&self, transaction_type: &str) -> Result<Arc<dyn TransactionHandler>, LedgerError> {
        self.handlers
            .get(transaction_type)
            .cloned()
            .ok_or_else(|| LedgerError::TypeNotSupported(transaction_type.to_string()))
    }
}
