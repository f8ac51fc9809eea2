//! MoonTrack ledger core: a double-entry bookkeeping engine for a
//! multi-chain crypto portfolio tracker.
//!
//! # Architecture
//!
//! This crate follows the same layered split as the rest of the
//! platform:
//!
//! - **`domain`**: entities and value objects (accounts, entries,
//!   transactions, assets, prices, balances) with no persistence or
//!   transport concerns.
//! - **`application`**: orchestration — the handler registry, the
//!   per-type transaction handlers, the validator and committer that
//!   turn a handler's entries into a posted transaction, the ledger
//!   service's public read/write API, the price service's cascading
//!   lookup, the portfolio aggregator, and the background price
//!   updater and reconciler jobs.
//! - **`infrastructure`**: adapters to Postgres and to the external
//!   price provider. Everything else the core treats as an external
//!   collaborator (HTTP transport, auth, wallet CRUD) lives outside
//!   this crate entirely.
//!
//! `money` and `error` are cross-cutting: every amount in the ledger is
//! a [`money::Money`], and every fallible operation returns
//! [`error::LedgerError`].

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod money;

pub use config::LedgerConfig;
pub use error::LedgerError;
pub use money::Money;

pub use application::handler_registry::{HandlerRegistry, OperationContext, TransactionHandler};
pub use application::ledger_service::LedgerService;
pub use application::portfolio::PortfolioAggregator;
pub use application::price_service::PriceService;
pub use application::price_updater::{PriceUpdater, PriceUpdaterHandle};
pub use application::reconciler::{Mismatch, Reconciler, ReconcilerHandle};
pub use application::transaction_reader::{
    Direction, ReaderRegistry, TransactionDetail, TransactionReader, TransactionReaderService, TransactionSummary,
};
pub use domain::account::Account;
pub use domain::entry::Entry;
pub use domain::transaction::Transaction;
