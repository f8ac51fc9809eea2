//! Ledger Service (C10): the public write/read API the ledger core
//! exposes to callers, orchestrating the handler registry, validator,
//! and committer for writes, and the repositories directly for reads
//! (spec.md §4.10).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use tracing::warn;
use uuid::Uuid;

use crate::application::account_resolver::AccountRepository;
use crate::application::committer::{Committer, TransactionRepository};
use crate::application::handler_registry::{HandlerRegistry, OperationContext};
use crate::application::validator::BalanceRepository;
use crate::domain::account::wallet_account_code;
use crate::domain::balance::AccountBalance;
use crate::domain::entry::Entry;
use crate::domain::transaction::{Transaction, TransactionFilters};
use crate::error::LedgerError;
use crate::money::Money;

pub struct LedgerService {
    handlers: Arc<HandlerRegistry>,
    committer: Committer,
    transactions: Arc<dyn TransactionRepository>,
    accounts: Arc<dyn AccountRepository>,
    balances: Arc<dyn BalanceRepository>,
    max_page_size: u32,
}

impl LedgerService {
    pub fn new(
        handlers: Arc<HandlerRegistry>,
        transactions: Arc<dyn TransactionRepository>,
        accounts: Arc<dyn AccountRepository>,
        balances: Arc<dyn BalanceRepository>,
        max_page_size: u32,
    ) -> Self {
        let committer = Committer::new(transactions.clone(), accounts.clone(), balances.clone());
        Self {
            handlers,
            committer,
            transactions,
            accounts,
            balances,
            max_page_size,
        }
    }

    /// Runs the full write pipeline described in spec.md §2: look up the
    /// handler, validate and expand `raw_data` into entries, then commit.
    /// On any failure a `status = failed` Transaction is persisted for
    /// the audit trail (spec.md §4.10), and the original error is
    /// returned to the caller so it can react.
    pub async fn record_transaction(
        &self,
        ctx: &OperationContext,
        transaction_type: &str,
        source: &str,
        external_id: Option<String>,
        occurred_at: DateTime<Utc>,
        raw_data: Json,
    ) -> Result<Transaction, LedgerError> {
        let pending = Transaction::new_pending(
            transaction_type,
            source,
            external_id,
            occurred_at,
            raw_data.clone(),
        );

        let result = self.try_record(ctx, transaction_type, occurred_at, &raw_data, pending.clone()).await;

        match result {
            Ok(transaction) => Ok(transaction),
            Err(err) => {
                let mut failed = pending;
                failed.mark_failed(err.to_string());
                if let Err(persist_err) = self.transactions.insert_failed(&failed).await {
                    warn!(
                        transaction_type,
                        error = %persist_err,
                        "failed to persist failed-transaction audit row"
                    );
                }
                Err(err)
            }
        }
    }

    async fn try_record(
        &self,
        ctx: &OperationContext,
        transaction_type: &str,
        occurred_at: DateTime<Utc>,
        raw_data: &Json,
        transaction: Transaction,
    ) -> Result<Transaction, LedgerError> {
        let handler = self.handlers.get(transaction_type)?;
        handler.validate_data(ctx, raw_data).await?;
        let entries: Vec<Entry> = handler
            .handle(ctx, transaction.id, raw_data, occurred_at)
            .await?;
        self.committer.commit(transaction, entries).await
    }

    pub async fn get_transaction(&self, id: Uuid) -> Result<Transaction, LedgerError> {
        self.transactions
            .get_by_id(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {id}")))
    }

    /// Ordered by `occurred_at` descending, capped at `max_page_size`
    /// regardless of what the caller asked for (spec.md §4.10).
    pub async fn list_transactions(
        &self,
        mut filters: TransactionFilters,
    ) -> Result<Vec<Transaction>, LedgerError> {
        if filters.page_size == 0 || filters.page_size > self.max_page_size {
            filters.page_size = self.max_page_size;
        }
        let all = self.transactions.list(&filters).await?;
        let page = filters.page.max(1) as usize;
        let page_size = filters.page_size as usize;
        let start = (page - 1) * page_size;
        Ok(all.into_iter().skip(start).take(page_size).collect())
    }

    pub async fn get_account_balance(
        &self,
        account_id: Uuid,
        asset_id: Uuid,
    ) -> Result<AccountBalance, LedgerError> {
        Ok(self
            .balances
            .get(account_id, asset_id)
            .await?
            .unwrap_or_else(|| AccountBalance::zero(account_id, asset_id)))
    }

    pub async fn get_account_balances(&self, account_id: Uuid) -> Result<Vec<AccountBalance>, LedgerError> {
        self.balances.list_for_account(account_id).await
    }

    /// Convenience wrapper over `wallet.<wid>.<symbol>` accounts; zero if
    /// the account has never been created (spec.md §4.10).
    pub async fn get_balance(&self, wallet_id: Uuid, symbol: &str, asset_id: Uuid) -> Result<Money, LedgerError> {
        let code = wallet_account_code(wallet_id, symbol);
        let Some(account) = self.accounts.get_by_code(&code).await? else {
            return Ok(Money::zero());
        };
        Ok(self
            .balances
            .get(account.id, asset_id)
            .await?
            .map(|b| b.balance)
            .unwrap_or_else(Money::zero))
    }

    /// Read-only comparison of the materialized balance against
    /// `Σ signed_amount` over every entry ever posted to this
    /// `(account, asset)` pair (spec.md §4.10, §4.13).
    pub async fn reconcile_balance(&self, account_id: Uuid, asset_id: Uuid) -> Result<(), LedgerError> {
        let materialized = self
            .balances
            .get(account_id, asset_id)
            .await?
            .map(|b| b.balance)
            .unwrap_or_else(Money::zero);

        let entries = self
            .transactions
            .list_entries_for_account_asset(account_id, asset_id)
            .await?;
        let computed = entries
            .iter()
            .fold(Money::zero(), |acc, e| acc.checked_add(&e.signed_amount()));

        if materialized != computed {
            return Err(LedgerError::Mismatch {
                materialized: materialized.render_integer(),
                computed: computed.render_integer(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::account_resolver::mock::InMemoryAccountRepository;
    use crate::application::committer::mock::InMemoryTransactionRepository;
    use crate::application::handler_registry::TransactionHandler;
    use crate::application::validator::mock::InMemoryBalanceRepository;
    use crate::domain::account::{income_account_code, wallet_account_code};
    use crate::domain::entry::{EntrySide, EntryType};
    use crate::domain::transaction::TransactionStatus;
    use async_trait::async_trait;

    struct FixedIncomeHandler;

    #[async_trait]
    impl TransactionHandler for FixedIncomeHandler {
        fn transaction_type(&self) -> &'static str {
            "manual-income"
        }

        async fn validate_data(&self, _ctx: &OperationContext, raw: &Json) -> Result<(), LedgerError> {
            if raw.get("amount").is_none() {
                return Err(LedgerError::InvalidData("missing amount".to_string()));
            }
            Ok(())
        }

        async fn handle(
            &self,
            _ctx: &OperationContext,
            transaction_id: Uuid,
            raw: &Json,
            occurred_at: DateTime<Utc>,
        ) -> Result<Vec<Entry>, LedgerError> {
            let wallet_id = Uuid::parse_str(raw["wallet_id"].as_str().unwrap()).unwrap();
            let asset_id = Uuid::parse_str(raw["asset_id"].as_str().unwrap()).unwrap();
            let amount = Money::from(100u64);
            Ok(vec![
                Entry::new_unresolved(
                    transaction_id,
                    EntrySide::Debit,
                    EntryType::AssetIncrease,
                    amount.clone(),
                    asset_id,
                    Money::zero(),
                    8,
                    occurred_at,
                    wallet_account_code(wallet_id, "BTC"),
                ),
                Entry::new_unresolved(
                    transaction_id,
                    EntrySide::Credit,
                    EntryType::Income,
                    amount,
                    asset_id,
                    Money::zero(),
                    8,
                    occurred_at,
                    income_account_code("BTC"),
                ),
            ])
        }
    }

    fn service() -> LedgerService {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(FixedIncomeHandler)).unwrap();
        LedgerService::new(
            Arc::new(registry),
            Arc::new(InMemoryTransactionRepository::new()),
            Arc::new(InMemoryAccountRepository::new()),
            Arc::new(InMemoryBalanceRepository::new()),
            200,
        )
    }

    #[tokio::test]
    async fn record_transaction_commits_and_returns_completed() {
        let svc = service();
        let wallet_id = Uuid::new_v4();
        let asset_id = Uuid::new_v4();
        let raw = serde_json::json!({
            "amount": "1",
            "wallet_id": wallet_id.to_string(),
            "asset_id": asset_id.to_string(),
        });
        let tx = svc
            .record_transaction(&OperationContext::system(), "manual-income", "manual", None, Utc::now(), raw)
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.entries.len(), 2);

        let balance = svc.get_balance(wallet_id, "BTC", asset_id).await.unwrap();
        assert_eq!(balance, Money::from(100u64));
    }

    #[tokio::test]
    async fn record_transaction_persists_failed_row_on_validation_error() {
        let svc = service();
        let raw = serde_json::json!({});
        let err = svc
            .record_transaction(&OperationContext::system(), "manual-income", "manual", None, Utc::now(), raw)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::InvalidData("missing amount".to_string()));

        let stored = svc.transactions.list(&TransactionFilters::default()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, TransactionStatus::Failed);
        assert!(stored[0].entries.is_empty());
    }

    #[tokio::test]
    async fn unknown_transaction_type_is_type_not_supported() {
        let svc = service();
        let err = svc
            .record_transaction(
                &OperationContext::system(),
                "does-not-exist",
                "manual",
                None,
                Utc::now(),
                serde_json::json!({}),
            )
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::TypeNotSupported("does-not-exist".to_string()));
    }

    #[tokio::test]
    async fn get_balance_is_zero_for_unreferenced_wallet() {
        let svc = service();
        let balance = svc.get_balance(Uuid::new_v4(), "BTC", Uuid::new_v4()).await.unwrap();
        assert_eq!(balance, Money::zero());
    }

    #[tokio::test]
    async fn reconcile_balance_passes_after_a_clean_commit() {
        let svc = service();
        let wallet_id = Uuid::new_v4();
        let asset_id = Uuid::new_v4();
        let raw = serde_json::json!({
            "amount": "1",
            "wallet_id": wallet_id.to_string(),
            "asset_id": asset_id.to_string(),
        });
        let tx = svc
            .record_transaction(&OperationContext::system(), "manual-income", "manual", None, Utc::now(), raw)
            .await
            .unwrap();

        let wallet_account_id = tx.entries[0].account_id.unwrap();
        svc.reconcile_balance(wallet_account_id, asset_id).await.unwrap();
    }
}
