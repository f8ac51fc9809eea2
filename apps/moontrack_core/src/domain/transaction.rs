//! Transaction entity (spec.md §3 "Transaction").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::domain::entry::Entry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Completed,
    Failed,
}

/// One record per user-initiated accounting event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    /// Must match a registered handler's `type()`.
    pub transaction_type: String,
    /// Free-form origin tag (e.g. `"manual"`, `"sync"`).
    pub source: String,
    /// Paired with `source` for idempotency.
    pub external_id: Option<String>,
    pub status: TransactionStatus,
    pub version: i32,
    /// Business time; may be in the past or present but never the future
    /// beyond the configured clock-skew tolerance.
    pub occurred_at: DateTime<Utc>,
    /// Wall-clock time at commit.
    pub recorded_at: DateTime<Utc>,
    /// Opaque, caller-supplied payload, persisted verbatim for audit.
    pub raw_data: Json,
    pub error_message: Option<String>,
    pub entries: Vec<Entry>,
}

impl Transaction {
    pub fn new_pending(
        transaction_type: impl Into<String>,
        source: impl Into<String>,
        external_id: Option<String>,
        occurred_at: DateTime<Utc>,
        raw_data: Json,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_type: transaction_type.into(),
            source: source.into(),
            external_id,
            status: TransactionStatus::Failed,
            version: 1,
            occurred_at,
            recorded_at: Utc::now(),
            raw_data,
            error_message: None,
            entries: Vec::new(),
        }
    }

    pub fn mark_completed(&mut self, entries: Vec<Entry>) {
        self.status = TransactionStatus::Completed;
        self.entries = entries;
        self.error_message = None;
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = TransactionStatus::Failed;
        self.entries.clear();
        self.error_message = Some(message.into());
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, TransactionStatus::Completed)
    }
}

/// Filters accepted by `Ledger::list_transactions` (spec.md §4.10).
#[derive(Debug, Clone, Default)]
pub struct TransactionFilters {
    pub user_id: Option<Uuid>,
    pub wallet_id: Option<Uuid>,
    pub asset_id: Option<Uuid>,
    pub transaction_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub status: Option<TransactionStatus>,
    pub page: u32,
    pub page_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pending_starts_failed_with_no_entries() {
        let tx = Transaction::new_pending(
            "manual-income",
            "manual",
            None,
            Utc::now(),
            serde_json::json!({}),
        );
        assert_eq!(tx.status, TransactionStatus::Failed);
        assert!(tx.entries.is_empty());
        assert!(!tx.is_completed());
    }

    #[test]
    fn mark_completed_sets_status_and_entries() {
        let mut tx = Transaction::new_pending(
            "manual-income",
            "manual",
            None,
            Utc::now(),
            serde_json::json!({}),
        );
        tx.mark_completed(vec![]);
        assert!(tx.is_completed());
        assert!(tx.error_message.is_none());
    }
}
