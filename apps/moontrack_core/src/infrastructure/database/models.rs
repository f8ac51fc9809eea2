//! Postgres row models for the ledger core, and the `to_domain`/
//! `from_domain` conversions between them and the `domain` entities.
//!
//! `Money` carries no `sqlx::Type` impl of its own (it round-trips
//! through `String` for serde, not through a Postgres wire type), so
//! every amount/rate/value column here is `TEXT` and converted through
//! `Money::parse_integer`/`render_integer` at the repository boundary,
//! the same manual mapping the teacher's `media_repository.rs` does for
//! its non-macro rows.

use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::account::{Account, AccountType};
use crate::domain::asset::Asset;
use crate::domain::balance::AccountBalance;
use crate::domain::entry::{Entry, EntrySide, EntryType};
use crate::domain::price::PricePoint;
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::error::LedgerError;
use crate::money::Money;

fn account_type_to_str(t: AccountType) -> &'static str {
    t.as_str()
}

fn account_type_from_str(s: &str) -> Result<AccountType, LedgerError> {
    match s {
        "wallet" => Ok(AccountType::Wallet),
        "income" => Ok(AccountType::Income),
        "expense" => Ok(AccountType::Expense),
        "clearing" => Ok(AccountType::Clearing),
        "gas" => Ok(AccountType::Gas),
        other => Err(LedgerError::Internal(format!("unknown account_type '{other}' in database row"))),
    }
}

fn money_from_column(s: &str) -> Result<Money, LedgerError> {
    Money::parse_integer(s).map_err(LedgerError::from)
}

#[derive(Debug, FromRow)]
pub struct AssetRow {
    pub id: Uuid,
    pub symbol: String,
    pub name: String,
    pub decimals: i32,
    pub chain: Option<String>,
    pub contract_address: Option<String>,
    pub external_key: String,
    pub is_active: bool,
    pub rank: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssetRow {
    pub fn from_domain(a: &Asset) -> Self {
        Self {
            id: a.id,
            symbol: a.symbol.clone(),
            name: a.name.clone(),
            decimals: a.decimals as i32,
            chain: a.chain.clone(),
            contract_address: a.contract_address.clone(),
            external_key: a.external_key.clone(),
            is_active: a.is_active,
            rank: a.rank,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }

    pub fn into_domain(self) -> Asset {
        Asset {
            id: self.id,
            symbol: self.symbol,
            name: self.name,
            decimals: self.decimals as u32,
            chain: self.chain,
            contract_address: self.contract_address,
            external_key: self.external_key,
            is_active: self.is_active,
            rank: self.rank,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct AccountRow {
    pub id: Uuid,
    pub code: String,
    pub account_type: String,
    pub asset_id: Uuid,
    pub wallet_id: Option<Uuid>,
    pub chain: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metadata: Json,
}

impl AccountRow {
    pub fn from_domain(a: &Account) -> Self {
        Self {
            id: a.id,
            code: a.code.clone(),
            account_type: account_type_to_str(a.account_type).to_string(),
            asset_id: a.asset_id,
            wallet_id: a.wallet_id,
            chain: a.chain.clone(),
            created_at: a.created_at,
            metadata: a.metadata.clone(),
        }
    }

    pub fn into_domain(self) -> Result<Account, LedgerError> {
        Ok(Account {
            id: self.id,
            code: self.code,
            account_type: account_type_from_str(&self.account_type)?,
            asset_id: self.asset_id,
            wallet_id: self.wallet_id,
            chain: self.chain,
            created_at: self.created_at,
            metadata: self.metadata,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub transaction_type: String,
    pub source: String,
    pub external_id: Option<String>,
    pub status: String,
    pub version: i32,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub raw_data: Json,
    pub error_message: Option<String>,
}

impl TransactionRow {
    pub fn from_domain(t: &Transaction) -> Self {
        Self {
            id: t.id,
            transaction_type: t.transaction_type.clone(),
            source: t.source.clone(),
            external_id: t.external_id.clone(),
            status: match t.status {
                TransactionStatus::Completed => "completed".to_string(),
                TransactionStatus::Failed => "failed".to_string(),
            },
            version: t.version,
            occurred_at: t.occurred_at,
            recorded_at: t.recorded_at,
            raw_data: t.raw_data.clone(),
            error_message: t.error_message.clone(),
        }
    }

    /// Entries are loaded and attached separately; a freshly-read
    /// `TransactionRow` always starts with an empty entry list.
    pub fn into_domain(self) -> Result<Transaction, LedgerError> {
        let status = match self.status.as_str() {
            "completed" => TransactionStatus::Completed,
            "failed" => TransactionStatus::Failed,
            other => return Err(LedgerError::Internal(format!("unknown transaction status '{other}' in database row"))),
        };
        Ok(Transaction {
            id: self.id,
            transaction_type: self.transaction_type,
            source: self.source,
            external_id: self.external_id,
            status,
            version: self.version,
            occurred_at: self.occurred_at,
            recorded_at: self.recorded_at,
            raw_data: self.raw_data,
            error_message: self.error_message,
            entries: Vec::new(),
        })
    }
}

#[derive(Debug, FromRow)]
pub struct EntryRow {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub account_id: Option<Uuid>,
    pub side: String,
    pub entry_type: String,
    pub amount: String,
    pub asset_id: Uuid,
    pub usd_rate: String,
    pub usd_value: String,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub metadata: Json,
}

impl EntryRow {
    pub fn from_domain(e: &Entry) -> Self {
        Self {
            id: e.id,
            transaction_id: e.transaction_id,
            account_id: e.account_id,
            side: match e.side {
                EntrySide::Debit => "debit".to_string(),
                EntrySide::Credit => "credit".to_string(),
            },
            entry_type: match e.entry_type {
                EntryType::AssetIncrease => "asset_increase".to_string(),
                EntryType::AssetDecrease => "asset_decrease".to_string(),
                EntryType::Income => "income".to_string(),
                EntryType::Expense => "expense".to_string(),
                EntryType::Clearing => "clearing".to_string(),
                EntryType::GasFee => "gas_fee".to_string(),
            },
            amount: e.amount.render_integer(),
            asset_id: e.asset_id,
            usd_rate: e.usd_rate.render_integer(),
            usd_value: e.usd_value.render_integer(),
            occurred_at: e.occurred_at,
            created_at: e.created_at,
            metadata: e.metadata.clone(),
        }
    }

    pub fn into_domain(self) -> Result<Entry, LedgerError> {
        let side = match self.side.as_str() {
            "debit" => EntrySide::Debit,
            "credit" => EntrySide::Credit,
            other => return Err(LedgerError::Internal(format!("unknown entry side '{other}' in database row"))),
        };
        let entry_type = match self.entry_type.as_str() {
            "asset_increase" => EntryType::AssetIncrease,
            "asset_decrease" => EntryType::AssetDecrease,
            "income" => EntryType::Income,
            "expense" => EntryType::Expense,
            "clearing" => EntryType::Clearing,
            "gas_fee" => EntryType::GasFee,
            other => return Err(LedgerError::Internal(format!("unknown entry_type '{other}' in database row"))),
        };
        Ok(Entry {
            id: self.id,
            transaction_id: self.transaction_id,
            account_id: self.account_id,
            side,
            entry_type,
            amount: money_from_column(&self.amount)?,
            asset_id: self.asset_id,
            usd_rate: money_from_column(&self.usd_rate)?,
            usd_value: money_from_column(&self.usd_value)?,
            occurred_at: self.occurred_at,
            created_at: self.created_at,
            metadata: self.metadata,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct BalanceRow {
    pub account_id: Uuid,
    pub asset_id: Uuid,
    pub balance: String,
    pub usd_value: String,
    pub last_updated: DateTime<Utc>,
}

impl BalanceRow {
    pub fn into_domain(self) -> Result<AccountBalance, LedgerError> {
        Ok(AccountBalance {
            account_id: self.account_id,
            asset_id: self.asset_id,
            balance: money_from_column(&self.balance)?,
            usd_value: money_from_column(&self.usd_value)?,
            last_updated: self.last_updated,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct PriceRow {
    pub asset_id: Uuid,
    pub time: DateTime<Utc>,
    pub price_usd: String,
    pub source: String,
    pub volume_24h: Option<String>,
    pub market_cap: Option<String>,
}

impl PriceRow {
    pub fn from_domain(p: &PricePoint) -> Self {
        Self {
            asset_id: p.asset_id,
            time: p.time,
            price_usd: p.price_usd.render_integer(),
            source: p.source.clone(),
            volume_24h: p.volume_24h.as_ref().map(Money::render_integer),
            market_cap: p.market_cap.as_ref().map(Money::render_integer),
        }
    }

    pub fn into_domain(self) -> Result<PricePoint, LedgerError> {
        Ok(PricePoint {
            asset_id: self.asset_id,
            time: self.time,
            price_usd: money_from_column(&self.price_usd)?,
            source: self.source,
            volume_24h: self.volume_24h.as_deref().map(money_from_column).transpose()?,
            market_cap: self.market_cap.as_deref().map(money_from_column).transpose()?,
        })
    }
}
