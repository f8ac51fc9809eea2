//! Entry entity: one half of a double-entry posting (spec.md §3 "Entry").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use uuid::Uuid;

use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySide {
    Debit,
    Credit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    AssetIncrease,
    AssetDecrease,
    Income,
    Expense,
    Clearing,
    GasFee,
}

/// Metadata key under which the unresolved `account_code` travels until,
/// and after, account resolution (spec.md §4.7: "the `account_code`
/// remains in metadata for audit").
pub const ACCOUNT_CODE_KEY: &str = "account_code";
/// Metadata key carrying the account type a not-yet-existing account
/// should be created with.
pub const ACCOUNT_TYPE_KEY: &str = "account_type";
/// Metadata key carrying an owning wallet id, when the account is a
/// wallet-type account.
pub const WALLET_ID_KEY: &str = "wallet_id";
/// Metadata key carrying a chain tag, for clearing/gas accounts.
pub const CHAIN_ID_KEY: &str = "chain_id";

/// Insert-only: there is no update path for an `Entry` after it is
/// persisted. Corrections are new adjustment transactions (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: Uuid,
    pub transaction_id: Uuid,
    /// `None` until the Account Resolver (C7) has run.
    pub account_id: Option<Uuid>,
    pub side: EntrySide,
    pub entry_type: EntryType,
    pub amount: Money,
    pub asset_id: Uuid,
    /// Scaled by `10^USD_SCALE_EXPONENT`.
    pub usd_rate: Money,
    /// Scaled by `10^USD_SCALE_EXPONENT`.
    pub usd_value: Money,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub metadata: Json,
}

impl Entry {
    #[allow(clippy::too_many_arguments)]
    pub fn new_unresolved(
        transaction_id: Uuid,
        side: EntrySide,
        entry_type: EntryType,
        amount: Money,
        asset_id: Uuid,
        usd_rate: Money,
        decimals: u32,
        occurred_at: DateTime<Utc>,
        account_code: String,
    ) -> Self {
        let usd_value = Money::usd_value(&amount, &usd_rate, decimals);
        let mut metadata = Map::new();
        metadata.insert(ACCOUNT_CODE_KEY.to_string(), Json::String(account_code));
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            account_id: None,
            side,
            entry_type,
            amount,
            asset_id,
            usd_rate,
            usd_value,
            occurred_at,
            created_at: Utc::now(),
            metadata: Json::Object(metadata),
        }
    }

    pub fn account_code(&self) -> Option<&str> {
        self.metadata.get(ACCOUNT_CODE_KEY).and_then(Json::as_str)
    }

    pub fn set_metadata_str(&mut self, key: &str, value: impl Into<String>) {
        if let Json::Object(map) = &mut self.metadata {
            map.insert(key.to_string(), Json::String(value.into()));
        }
    }

    /// Signed amount for balance arithmetic: positive for a debit,
    /// negative for a credit (spec.md's `AccountBalance` invariant:
    /// `balance = Σ (debit_amount − credit_amount)`).
    pub fn signed_amount(&self) -> Money {
        match self.side {
            EntrySide::Debit => self.amount.clone(),
            EntrySide::Credit => self.amount.neg(),
        }
    }
}
