//! Transaction Committer (C9): the single storage-transaction boundary
//! where entries and balance updates become durable together
//! (spec.md §4.9).
//!
//! The teacher's repositories (`infrastructure/database/repositories.rs`)
//! open one `sqlx::Transaction` per write and commit or roll back as a
//! unit; this generalizes that shape to the ledger's five-step sequence
//! instead of a single-table write.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::application::account_resolver::{AccountRepository, AccountResolver};
use crate::application::validator::{BalanceRepository, TransactionValidator};
use crate::domain::entry::Entry;
use crate::domain::transaction::{Transaction, TransactionFilters};
use crate::error::LedgerError;

/// Persistence seam for transactions, implemented against Postgres and
/// in-memory in tests. `insert` surfaces `LedgerError::Duplicate` on a
/// `(source, external_id)` unique-constraint conflict.
#[async_trait::async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn insert(&self, transaction: &Transaction) -> Result<(), LedgerError>;
    async fn insert_entries(&self, entries: &[Entry]) -> Result<(), LedgerError>;
    async fn find_by_source_and_external_id(
        &self,
        source: &str,
        external_id: &str,
    ) -> Result<Option<Transaction>, LedgerError>;

    /// Persist a failed attempt for audit (spec.md §4.10 "Failed
    /// transactions are persisted with status=failed, zero entries, and
    /// an error message"). Does not participate in the
    /// `(source, external_id)` idempotency check, since a failed attempt
    /// never produced committed state worth deduplicating against.
    async fn insert_failed(&self, transaction: &Transaction) -> Result<(), LedgerError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Transaction>, LedgerError>;

    async fn list(&self, filters: &TransactionFilters) -> Result<Vec<Transaction>, LedgerError>;

    /// All entries ever posted to a `(account, asset)` pair, across every
    /// transaction, for reconciliation (spec.md §4.13).
    async fn list_entries_for_account_asset(
        &self,
        account_id: Uuid,
        asset_id: Uuid,
    ) -> Result<Vec<Entry>, LedgerError>;
}

pub struct Committer {
    transactions: Arc<dyn TransactionRepository>,
    accounts: Arc<dyn AccountRepository>,
    balances: Arc<dyn BalanceRepository>,
}

impl Committer {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        accounts: Arc<dyn AccountRepository>,
        balances: Arc<dyn BalanceRepository>,
    ) -> Self {
        Self {
            transactions,
            accounts,
            balances,
        }
    }

    /// Runs spec.md §4.9 steps 2-5 against entries a handler already
    /// produced. Idempotency (step on insert conflict) and rollback are
    /// the caller's (`LedgerService`) responsibility to interpret, since
    /// a duplicate is not itself a failure — it is a request to return
    /// the prior Transaction (spec.md §9 Open Question 4).
    pub async fn commit(
        &self,
        mut transaction: Transaction,
        mut entries: Vec<Entry>,
    ) -> Result<Transaction, LedgerError> {
        TransactionValidator::validate_structure(&entries)?;

        let resolver = AccountResolver::new(self.accounts.clone());
        let resolved_accounts = resolver.resolve_all(&mut entries).await?;
        let accounts_by_id: HashMap<Uuid, _> = resolved_accounts
            .into_iter()
            .map(|a| (a.id, a))
            .collect();

        let deltas =
            TransactionValidator::validate_balances(&entries, &accounts_by_id, self.balances.as_ref())
                .await?;

        if let Err(e) = self.transactions.insert(&transaction).await {
            if e == LedgerError::Duplicate {
                if let Some(external_id) = &transaction.external_id {
                    if let Some(prior) = self
                        .transactions
                        .find_by_source_and_external_id(&transaction.source, external_id)
                        .await?
                    {
                        return Ok(prior);
                    }
                }
            }
            return Err(e);
        }

        self.transactions.insert_entries(&entries).await?;

        for delta in &deltas {
            let new_balance = delta.new_balance();
            let usd_value = entries
                .iter()
                .filter(|e| e.account_id == Some(delta.account_id) && e.asset_id == delta.asset_id)
                .fold(crate::money::Money::zero(), |acc, e| {
                    acc.checked_add(&e.usd_value)
                });
            self.balances
                .upsert(delta.account_id, delta.asset_id, new_balance, usd_value)
                .await?;
        }

        transaction.mark_completed(entries);
        Ok(transaction)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use dashmap::DashMap;

    /// Keyed by `(account_id, asset_id)` so `list_entries_for_account_asset`
    /// doesn't need to scan every transaction's entries.
    #[derive(Default)]
    pub struct InMemoryTransactionRepository {
        by_id: DashMap<Uuid, Transaction>,
        by_source_external: DashMap<(String, String), Uuid>,
        entries_by_account_asset: DashMap<(Uuid, Uuid), Vec<Entry>>,
    }

    impl InMemoryTransactionRepository {
        pub fn new() -> Self {
            Self::default()
        }

        fn index_entries(&self, entries: &[Entry]) {
            for entry in entries {
                if let Some(account_id) = entry.account_id {
                    self.entries_by_account_asset
                        .entry((account_id, entry.asset_id))
                        .or_default()
                        .push(entry.clone());
                }
            }
        }
    }

    #[async_trait::async_trait]
    impl TransactionRepository for InMemoryTransactionRepository {
        async fn insert(&self, transaction: &Transaction) -> Result<(), LedgerError> {
            if let Some(external_id) = &transaction.external_id {
                let key = (transaction.source.clone(), external_id.clone());
                if self.by_source_external.contains_key(&key) {
                    return Err(LedgerError::Duplicate);
                }
                self.by_source_external.insert(key, transaction.id);
            }
            self.by_id.insert(transaction.id, transaction.clone());
            Ok(())
        }

        async fn insert_entries(&self, entries: &[Entry]) -> Result<(), LedgerError> {
            self.index_entries(entries);
            Ok(())
        }

        async fn find_by_source_and_external_id(
            &self,
            source: &str,
            external_id: &str,
        ) -> Result<Option<Transaction>, LedgerError> {
            Ok(self
                .by_source_external
                .get(&(source.to_string(), external_id.to_string()))
                .and_then(|id| self.by_id.get(&id).map(|t| t.clone())))
        }

        async fn insert_failed(&self, transaction: &Transaction) -> Result<(), LedgerError> {
            self.by_id.insert(transaction.id, transaction.clone());
            Ok(())
        }

        async fn get_by_id(&self, id: Uuid) -> Result<Option<Transaction>, LedgerError> {
            Ok(self.by_id.get(&id).map(|t| t.clone()))
        }

        async fn list(&self, filters: &TransactionFilters) -> Result<Vec<Transaction>, LedgerError> {
            let mut out: Vec<Transaction> = self
                .by_id
                .iter()
                .map(|e| e.value().clone())
                .filter(|t| {
                    filters
                        .transaction_type
                        .as_ref()
                        .map_or(true, |ty| ty == &t.transaction_type)
                        && filters.status.map_or(true, |s| s == t.status)
                        && filters.from.map_or(true, |from| t.occurred_at >= from)
                        && filters.to.map_or(true, |to| t.occurred_at <= to)
                        && filters.wallet_id.map_or(true, |wid| {
                            t.entries.iter().any(|e| {
                                e.metadata
                                    .get(crate::domain::entry::WALLET_ID_KEY)
                                    .and_then(serde_json::Value::as_str)
                                    .and_then(|s| Uuid::parse_str(s).ok())
                                    == Some(wid)
                            })
                        })
                        && filters.asset_id.map_or(true, |aid| {
                            t.entries.iter().any(|e| e.asset_id == aid)
                        })
                })
                .collect();
            out.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
            Ok(out)
        }

        async fn list_entries_for_account_asset(
            &self,
            account_id: Uuid,
            asset_id: Uuid,
        ) -> Result<Vec<Entry>, LedgerError> {
            Ok(self
                .entries_by_account_asset
                .get(&(account_id, asset_id))
                .map(|v| v.clone())
                .unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::InMemoryTransactionRepository;
    use super::*;
    use crate::application::account_resolver::mock::InMemoryAccountRepository;
    use crate::application::validator::mock::InMemoryBalanceRepository;
    use crate::domain::entry::{EntrySide, EntryType};
    use crate::money::Money;
    use chrono::Utc;

    fn income_entries(wallet_id: Uuid, asset_id: Uuid, amount: Money) -> Vec<Entry> {
        vec![
            Entry::new_unresolved(
                Uuid::new_v4(),
                EntrySide::Debit,
                EntryType::AssetIncrease,
                amount.clone(),
                asset_id,
                Money::zero(),
                8,
                Utc::now(),
                crate::domain::account::wallet_account_code(wallet_id, "BTC"),
            ),
            Entry::new_unresolved(
                Uuid::new_v4(),
                EntrySide::Credit,
                EntryType::Income,
                amount,
                asset_id,
                Money::zero(),
                8,
                Utc::now(),
                "income.BTC".to_string(),
            ),
        ]
    }

    #[tokio::test]
    async fn commit_persists_entries_and_updates_balance() {
        let transactions = Arc::new(InMemoryTransactionRepository::default());
        let accounts = Arc::new(InMemoryAccountRepository::new());
        let balances = Arc::new(InMemoryBalanceRepository::new());
        let committer = Committer::new(transactions, accounts, balances.clone());

        let wallet_id = Uuid::new_v4();
        let asset_id = Uuid::new_v4();
        let entries = income_entries(wallet_id, asset_id, Money::from(100u64));
        let tx = Transaction::new_pending("manual-income", "manual", None, Utc::now(), serde_json::json!({}));

        let committed = committer.commit(tx, entries).await.unwrap();
        assert!(committed.is_completed());
        assert_eq!(committed.entries.len(), 2);

        let wallet_account_id = committed.entries[0].account_id.unwrap();
        assert_eq!(balances.get(wallet_account_id, asset_id), Money::from(100u64));
    }

    #[tokio::test]
    async fn duplicate_source_external_id_returns_prior_transaction() {
        let transactions = Arc::new(InMemoryTransactionRepository::default());
        let accounts = Arc::new(InMemoryAccountRepository::new());
        let balances = Arc::new(InMemoryBalanceRepository::new());
        let committer = Committer::new(transactions, accounts, balances);

        let wallet_id = Uuid::new_v4();
        let asset_id = Uuid::new_v4();

        let tx1 = Transaction::new_pending(
            "manual-income",
            "sync",
            Some("evt-1".to_string()),
            Utc::now(),
            serde_json::json!({}),
        );
        let first = committer
            .commit(tx1, income_entries(wallet_id, asset_id, Money::from(10u64)))
            .await
            .unwrap();

        let tx2 = Transaction::new_pending(
            "manual-income",
            "sync",
            Some("evt-1".to_string()),
            Utc::now(),
            serde_json::json!({}),
        );
        let second = committer
            .commit(tx2, income_entries(wallet_id, asset_id, Money::from(10u64)))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
    }
}
