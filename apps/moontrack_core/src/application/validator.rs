//! Transaction Validator (C8): structural, whole-transaction-balance,
//! and per-account-asset non-negativity checks, run after account
//! resolution and inside the same storage transaction the Committer
//! (C9) holds open (spec.md §4.8).

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::account::{Account, AccountType};
use crate::domain::balance::AccountBalance;
use crate::domain::entry::{Entry, EntrySide};
use crate::error::LedgerError;
use crate::money::Money;

/// Row-level locking seam shared with the Committer: `lock_for_update`
/// is called once per distinct `(account_id, asset_id)` in this
/// transaction, in a deterministic order, so the lock acquired here is
/// still held when the Committer performs its upsert in the same
/// storage transaction (spec.md §5 "always acquire locks in a
/// deterministic order").
#[async_trait]
pub trait BalanceRepository: Send + Sync {
    async fn lock_for_update(&self, account_id: Uuid, asset_id: Uuid) -> Result<Money, LedgerError>;
    async fn upsert(
        &self,
        account_id: Uuid,
        asset_id: Uuid,
        new_balance: Money,
        usd_value: Money,
    ) -> Result<(), LedgerError>;

    /// Point read, no lock (spec.md §4.10 `get_account_balance`).
    async fn get(&self, account_id: Uuid, asset_id: Uuid) -> Result<Option<AccountBalance>, LedgerError>;

    /// Every asset an account holds a balance row for.
    async fn list_for_account(&self, account_id: Uuid) -> Result<Vec<AccountBalance>, LedgerError>;
}

/// One `(account, asset)` group's net change, carried from validation
/// into the commit step so the lock held during validation is reused
/// rather than re-acquired.
#[derive(Debug, Clone)]
pub struct BalanceDelta {
    pub account_id: Uuid,
    pub asset_id: Uuid,
    pub current: Money,
    pub delta: Money,
    pub account_type: AccountType,
}

impl BalanceDelta {
    pub fn new_balance(&self) -> Money {
        self.current.checked_add(&self.delta)
    }
}

pub struct TransactionValidator;

impl TransactionValidator {
    pub fn new() -> Self {
        Self
    }

    /// spec.md §4.8 steps 1-2: structural checks plus whole-transaction
    /// debit/credit balance. Does not touch storage.
    pub fn validate_structure(entries: &[Entry]) -> Result<(), LedgerError> {
        if entries.is_empty() {
            return Err(LedgerError::InvalidData("transaction has no entries".to_string()));
        }

        let mut debit_total = Money::zero();
        let mut credit_total = Money::zero();

        for entry in entries {
            if entry.amount.is_negative() {
                return Err(LedgerError::NegativeAmount);
            }
            if entry.usd_rate.is_negative() {
                return Err(LedgerError::NegativeUsdRate);
            }
            if entry.account_code().is_none() {
                return Err(LedgerError::InvalidData(
                    "entry missing account_code in metadata".to_string(),
                ));
            }
            match entry.side {
                EntrySide::Debit => debit_total = debit_total.checked_add(&entry.amount),
                EntrySide::Credit => credit_total = credit_total.checked_add(&entry.amount),
            }
        }

        if debit_total != credit_total {
            return Err(LedgerError::UnbalancedTransaction);
        }
        Ok(())
    }

    /// spec.md §4.8 step 3: group by `(account_id, asset_id)`, lock and
    /// read the current balance for each group, and reject a commit
    /// that would drive a wallet account negative. Income/expense/
    /// clearing/gas accounts are bookkeeping mirrors and may go negative
    /// (spec.md §9 "Clearing and gas accounts as bookkeeping shorts").
    pub async fn validate_balances(
        entries: &[Entry],
        accounts: &HashMap<Uuid, Account>,
        balances: &dyn BalanceRepository,
    ) -> Result<Vec<BalanceDelta>, LedgerError> {
        let mut grouped: HashMap<(Uuid, Uuid), Money> = HashMap::new();
        for entry in entries {
            let account_id = entry
                .account_id
                .ok_or_else(|| LedgerError::InvalidData("entry not yet resolved to an account".to_string()))?;
            let key = (account_id, entry.asset_id);
            let signed = entry.signed_amount();
            grouped
                .entry(key)
                .and_modify(|acc| *acc = acc.checked_add(&signed))
                .or_insert(signed);
        }

        let mut keys: Vec<(Uuid, Uuid)> = grouped.keys().copied().collect();
        keys.sort();

        let mut deltas = Vec::with_capacity(keys.len());
        for key @ (account_id, asset_id) in keys {
            let delta = grouped.remove(&key).expect("key from its own keyset");
            let current = balances.lock_for_update(account_id, asset_id).await?;
            let account = accounts
                .get(&account_id)
                .ok_or_else(|| LedgerError::NotFound(format!("account {account_id}")))?;

            let new_balance = current.checked_add(&delta);
            if account.account_type == AccountType::Wallet && new_balance.is_negative() {
                return Err(LedgerError::WouldNegativeBalance);
            }

            deltas.push(BalanceDelta {
                account_id,
                asset_id,
                current,
                delta,
                account_type: account.account_type,
            });
        }
        Ok(deltas)
    }
}

impl Default for TransactionValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use dashmap::DashMap;

    #[derive(Default)]
    pub struct InMemoryBalanceRepository {
        balances: DashMap<(Uuid, Uuid), AccountBalance>,
    }

    impl InMemoryBalanceRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, account_id: Uuid, asset_id: Uuid, balance: Money) {
            self.balances.insert(
                (account_id, asset_id),
                AccountBalance {
                    account_id,
                    asset_id,
                    balance,
                    usd_value: Money::zero(),
                    last_updated: chrono::Utc::now(),
                },
            );
        }

        pub fn get(&self, account_id: Uuid, asset_id: Uuid) -> Money {
            self.balances
                .get(&(account_id, asset_id))
                .map(|v| v.balance.clone())
                .unwrap_or_else(Money::zero)
        }
    }

    #[async_trait]
    impl BalanceRepository for InMemoryBalanceRepository {
        async fn lock_for_update(&self, account_id: Uuid, asset_id: Uuid) -> Result<Money, LedgerError> {
            Ok(self
                .balances
                .get(&(account_id, asset_id))
                .map(|v| v.balance.clone())
                .unwrap_or_else(Money::zero))
        }

        async fn upsert(
            &self,
            account_id: Uuid,
            asset_id: Uuid,
            new_balance: Money,
            usd_value: Money,
        ) -> Result<(), LedgerError> {
            self.balances.insert(
                (account_id, asset_id),
                AccountBalance {
                    account_id,
                    asset_id,
                    balance: new_balance,
                    usd_value,
                    last_updated: chrono::Utc::now(),
                },
            );
            Ok(())
        }

        async fn get(&self, account_id: Uuid, asset_id: Uuid) -> Result<Option<AccountBalance>, LedgerError> {
            Ok(self.balances.get(&(account_id, asset_id)).map(|v| v.clone()))
        }

        async fn list_for_account(&self, account_id: Uuid) -> Result<Vec<AccountBalance>, LedgerError> {
            Ok(self
                .balances
                .iter()
                .filter(|e| e.key().0 == account_id)
                .map(|e| e.value().clone())
                .collect())
        }
    }
}
