//! Stable error currency for the ledger core.
//!
//! Every public operation in this crate returns `Result<_, LedgerError>`.
//! Handlers and lower-level helpers may define narrower error types, but
//! they convert into `LedgerError` via `#[from]` rather than leaking their
//! own shape across module boundaries.

use uuid::Uuid;

use crate::money::MoneyError;

/// Error kinds stable across transport boundaries (spec.md §7).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid wallet id: {0}")]
    InvalidWalletId(String),

    #[error("invalid asset id: {0}")]
    InvalidAssetId(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("negative amount")]
    NegativeAmount,

    #[error("negative usd rate")]
    NegativeUsdRate,

    #[error("occurred_at is in the future beyond allowed clock skew")]
    FutureDate,

    #[error("wallet {0} not found")]
    WalletNotFound(Uuid),

    #[error("caller is not authorized to act on this wallet")]
    Unauthorized,

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("transaction debits and credits do not balance")]
    UnbalancedTransaction,

    #[error("commit would drive a wallet account balance negative")]
    WouldNegativeBalance,

    #[error("no adjustment needed, balance already at target")]
    NoAdjustmentNeeded,

    #[error("swap requires at least one incoming and one outgoing transfer")]
    NoTransfers,

    #[error("transaction type '{0}' has no registered handler")]
    TypeNotSupported(String),

    #[error("a handler is already registered for transaction type '{0}'")]
    HandlerAlreadyRegistered(String),

    #[error("duplicate transaction for (source, external_id)")]
    Duplicate,

    #[error("price unavailable for asset {0}")]
    PriceUnavailable(Uuid),

    #[error("ambiguous symbol '{symbol}': {candidates} chain variants exist")]
    AmbiguousSymbol { symbol: String, candidates: usize },

    #[error("balance reconciliation mismatch: materialized={materialized} computed={computed}")]
    Mismatch { materialized: String, computed: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("duplicate asset or account")]
    DuplicateEntity,

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Internal(e.to_string())
    }
}
