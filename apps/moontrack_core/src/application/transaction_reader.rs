//! Transaction Reader (C12): a read-side registry parallel to the
//! Handler Registry (C5) (spec.md §4.12). Each registered reader decodes
//! a transaction's persisted `raw_data` into type-agnostic summary and
//! detail views, without touching the write-side handlers.
//!
//! Grounded the same way as `handler_registry`: a narrow per-type trait
//! behind a name-keyed map, so this module never imports a concrete
//! reader and adding a transaction type only means registering one more
//! implementation.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as Json;
use uuid::Uuid;

use crate::application::committer::TransactionRepository;
use crate::application::handler_registry::WalletDirectory;
use crate::domain::transaction::TransactionFilters;
use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    Adjustment,
    Internal,
}

/// List-view fields (spec.md §4.12 "display fields").
#[derive(Debug, Clone)]
pub struct TransactionSummary {
    pub transaction_id: Uuid,
    pub wallet_id: Option<Uuid>,
    pub asset_symbol: Option<String>,
    pub amount: Option<String>,
    pub direction: Direction,
}

/// Detail-view fields: the summary plus whatever the type records about
/// chain, counterparty, and provenance (spec.md §4.12 "notes, tx hash,
/// addresses, chain, contract address as applicable").
#[derive(Debug, Clone, Default)]
pub struct TransactionDetail {
    pub wallet_id: Option<Uuid>,
    pub asset_symbol: Option<String>,
    pub amount: Option<String>,
    pub direction: Option<Direction>,
    pub chain_id: Option<String>,
    pub tx_hash: Option<String>,
    pub notes: Option<String>,
    pub from_wallet_id: Option<Uuid>,
    pub to_wallet_id: Option<Uuid>,
    pub contract_address: Option<String>,
}

fn str_field(raw: &Json, field: &str) -> Option<String> {
    raw.get(field).and_then(Json::as_str).map(str::to_string)
}

fn uuid_field(raw: &Json, field: &str) -> Option<Uuid> {
    str_field(raw, field).and_then(|s| Uuid::parse_str(&s).ok())
}

/// One per registered transaction type (spec.md §4.12).
pub trait TransactionReader: Send + Sync {
    fn transaction_type(&self) -> &'static str;

    fn summarize(&self, raw_data: &Json) -> TransactionSummary;

    fn detail(&self, raw_data: &Json) -> TransactionDetail;

    /// Wallets a caller must own at least one of to view the detail
    /// (spec.md §4.12 "the reader checks the involved wallet against the
    /// calling user id").
    fn involved_wallets(&self, raw_data: &Json) -> Vec<Uuid>;
}

macro_rules! simple_reader {
    ($name:ident, $type_tag:literal, $direction:expr) => {
        pub struct $name;

        impl TransactionReader for $name {
            fn transaction_type(&self) -> &'static str {
                $type_tag
            }

            fn summarize(&self, raw_data: &Json) -> TransactionSummary {
                TransactionSummary {
                    transaction_id: Uuid::nil(),
                    wallet_id: uuid_field(raw_data, "wallet_id"),
                    asset_symbol: str_field(raw_data, "asset_symbol"),
                    amount: str_field(raw_data, "amount"),
                    direction: $direction,
                }
            }

            fn detail(&self, raw_data: &Json) -> TransactionDetail {
                TransactionDetail {
                    wallet_id: uuid_field(raw_data, "wallet_id"),
                    asset_symbol: str_field(raw_data, "asset_symbol"),
                    amount: str_field(raw_data, "amount").or_else(|| str_field(raw_data, "new_balance")),
                    direction: Some($direction),
                    chain_id: str_field(raw_data, "chain_id"),
                    tx_hash: str_field(raw_data, "tx_hash"),
                    notes: str_field(raw_data, "notes"),
                    from_wallet_id: None,
                    to_wallet_id: None,
                    contract_address: str_field(raw_data, "contract_address"),
                }
            }

            fn involved_wallets(&self, raw_data: &Json) -> Vec<Uuid> {
                uuid_field(raw_data, "wallet_id").into_iter().collect()
            }
        }
    };
}

simple_reader!(ManualIncomeReader, "manual-income", Direction::In);
simple_reader!(ManualOutcomeReader, "manual-outcome", Direction::Out);
simple_reader!(AssetAdjustmentReader, "asset-adjustment", Direction::Adjustment);
simple_reader!(TransferInReader, "transfer-in", Direction::In);
simple_reader!(TransferOutReader, "transfer-out", Direction::Out);

/// A swap restructures holdings inside a single wallet rather than
/// moving funds to another party, so it reads as `internal` like a
/// transfer between one's own accounts.
pub struct SwapReader;

impl TransactionReader for SwapReader {
    fn transaction_type(&self) -> &'static str {
        "swap"
    }

    fn summarize(&self, raw_data: &Json) -> TransactionSummary {
        let first_out = raw_data
            .get("transfers_out")
            .and_then(Json::as_array)
            .and_then(|a| a.first());
        TransactionSummary {
            transaction_id: Uuid::nil(),
            wallet_id: uuid_field(raw_data, "wallet_id"),
            asset_symbol: first_out.and_then(|t| str_field(t, "asset_symbol")),
            amount: first_out.and_then(|t| str_field(t, "amount")),
            direction: Direction::Internal,
        }
    }

    fn detail(&self, raw_data: &Json) -> TransactionDetail {
        let summary = self.summarize(raw_data);
        TransactionDetail {
            wallet_id: summary.wallet_id,
            asset_symbol: summary.asset_symbol,
            amount: summary.amount,
            direction: Some(Direction::Internal),
            chain_id: str_field(raw_data, "chain_id"),
            tx_hash: str_field(raw_data, "tx_hash"),
            notes: str_field(raw_data, "notes"),
            from_wallet_id: None,
            to_wallet_id: None,
            contract_address: None,
        }
    }

    fn involved_wallets(&self, raw_data: &Json) -> Vec<Uuid> {
        uuid_field(raw_data, "wallet_id").into_iter().collect()
    }
}

pub struct InternalTransferReader;

impl TransactionReader for InternalTransferReader {
    fn transaction_type(&self) -> &'static str {
        "internal-transfer"
    }

    fn summarize(&self, raw_data: &Json) -> TransactionSummary {
        TransactionSummary {
            transaction_id: Uuid::nil(),
            wallet_id: uuid_field(raw_data, "source_wallet_id"),
            asset_symbol: str_field(raw_data, "asset_symbol"),
            amount: str_field(raw_data, "amount"),
            direction: Direction::Internal,
        }
    }

    fn detail(&self, raw_data: &Json) -> TransactionDetail {
        TransactionDetail {
            wallet_id: uuid_field(raw_data, "source_wallet_id"),
            asset_symbol: str_field(raw_data, "asset_symbol"),
            amount: str_field(raw_data, "amount"),
            direction: Some(Direction::Internal),
            chain_id: str_field(raw_data, "chain_id"),
            tx_hash: str_field(raw_data, "tx_hash"),
            notes: str_field(raw_data, "notes"),
            from_wallet_id: uuid_field(raw_data, "source_wallet_id"),
            to_wallet_id: uuid_field(raw_data, "dest_wallet_id"),
            contract_address: None,
        }
    }

    fn involved_wallets(&self, raw_data: &Json) -> Vec<Uuid> {
        [
            uuid_field(raw_data, "source_wallet_id"),
            uuid_field(raw_data, "dest_wallet_id"),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

#[derive(Default)]
pub struct ReaderRegistry {
    readers: HashMap<String, Arc<dyn TransactionReader>>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, reader: Arc<dyn TransactionReader>) -> Result<(), LedgerError> {
        let key = reader.transaction_type().to_string();
        if self.readers.contains_key(&key) {
            return Err(LedgerError::HandlerAlreadyRegistered(key));
        }
        self.readers.insert(key, reader);
        Ok(())
    }

    /// The built-in readers for every handler this crate ships.
    pub fn with_builtin_readers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ManualIncomeReader)).unwrap();
        registry.register(Arc::new(ManualOutcomeReader)).unwrap();
        registry.register(Arc::new(AssetAdjustmentReader)).unwrap();
        registry.register(Arc::new(TransferInReader)).unwrap();
        registry.register(Arc::new(TransferOutReader)).unwrap();
        registry.register(Arc::new(SwapReader)).unwrap();
        registry.register(Arc::new(InternalTransferReader)).unwrap();
        registry
    }

    pub fn get(&self, transaction_type: &str) -> Option<Arc<dyn TransactionReader>> {
        self.readers.get(transaction_type).cloned()
    }
}

/// Wires the registry to the transaction store and the wallet directory
/// so callers get summaries/details instead of raw rows.
pub struct TransactionReaderService {
    transactions: Arc<dyn TransactionRepository>,
    readers: ReaderRegistry,
    wallets: Arc<dyn WalletDirectory>,
}

impl TransactionReaderService {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        readers: ReaderRegistry,
        wallets: Arc<dyn WalletDirectory>,
    ) -> Self {
        Self {
            transactions,
            readers,
            wallets,
        }
    }

    /// Unknown types are skipped rather than erroring the whole query
    /// (spec.md §4.12).
    pub async fn list_summaries(&self, filters: &TransactionFilters) -> Result<Vec<TransactionSummary>, LedgerError> {
        let transactions = self.transactions.list(filters).await?;
        let mut out = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            let Some(reader) = self.readers.get(&transaction.transaction_type) else {
                continue;
            };
            let mut summary = reader.summarize(&transaction.raw_data);
            summary.transaction_id = transaction.id;
            out.push(summary);
        }
        Ok(out)
    }

    /// Errors with `type_not_supported` for a type with no registered
    /// reader, and `unauthorized` when `caller_id` is set but owns none
    /// of the involved wallets (spec.md §4.12).
    pub async fn get_detail(
        &self,
        caller_id: Option<Uuid>,
        transaction_id: Uuid,
    ) -> Result<TransactionDetail, LedgerError> {
        let transaction = self
            .transactions
            .get_by_id(transaction_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {transaction_id}")))?;

        let reader = self
            .readers
            .get(&transaction.transaction_type)
            .ok_or_else(|| LedgerError::TypeNotSupported(transaction.transaction_type.clone()))?;

        if let Some(caller_id) = caller_id {
            let mut authorized = false;
            for wallet_id in reader.involved_wallets(&transaction.raw_data) {
                if self.wallets.get_owner(wallet_id).await? == Some(caller_id) {
                    authorized = true;
                    break;
                }
            }
            if !authorized {
                return Err(LedgerError::Unauthorized);
            }
        }

        Ok(reader.detail(&transaction.raw_data))
    }
}
