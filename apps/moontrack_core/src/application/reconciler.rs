//! Reconciler (C13): background sweep that verifies, for every
//! `(account, asset)` pair, that the stored balance equals
//! `Σ signed_amount` over the entries ever posted to it (spec.md
//! §4.13). Read-only — a mismatch is logged and surfaced, never
//! auto-repaired, since silently overwriting a balance would hide
//! whatever bug produced the drift.
//!
//! Mirrors the teacher's `price_updater`-style background worker shape:
//! a struct holding only the collaborators it needs, a shutdown-aware
//! `spawn`, and a fixed interval drawn from config.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;

use crate::application::account_resolver::AccountRepository;
use crate::application::committer::TransactionRepository;
use crate::application::validator::BalanceRepository;
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::money::Money;

/// One mismatch found during a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub account_id: uuid::Uuid,
    pub asset_id: uuid::Uuid,
    pub materialized: String,
    pub computed: String,
}

pub struct ReconcilerHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl ReconcilerHandle {
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

pub struct Reconciler {
    accounts: Arc<dyn AccountRepository>,
    balances: Arc<dyn BalanceRepository>,
    transactions: Arc<dyn TransactionRepository>,
}

impl Reconciler {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        balances: Arc<dyn BalanceRepository>,
        transactions: Arc<dyn TransactionRepository>,
    ) -> Self {
        Self {
            accounts,
            balances,
            transactions,
        }
    }

    /// Walks every account, every asset it holds a balance row for, and
    /// returns the `(account, asset)` pairs where the stored balance
    /// disagrees with the entry ledger. An empty result means the books
    /// balance.
    pub async fn run_once(&self) -> Result<Vec<Mismatch>, LedgerError> {
        let accounts = self.accounts.list_all().await?;
        let mut mismatches = Vec::new();

        for account in accounts {
            let balances = self.balances.list_for_account(account.id).await?;
            for balance in balances {
                let entries = self
                    .transactions
                    .list_entries_for_account_asset(account.id, balance.asset_id)
                    .await?;
                let computed = entries
                    .iter()
                    .fold(Money::zero(), |acc, e| acc.checked_add(&e.signed_amount()));

                if computed != balance.balance {
                    mismatches.push(Mismatch {
                        account_id: account.id,
                        asset_id: balance.asset_id,
                        materialized: balance.balance.render_integer(),
                        computed: computed.render_integer(),
                    });
                }
            }
        }

        if mismatches.is_empty() {
            tracing::info!("reconciliation sweep found no mismatches");
        } else {
            tracing::warn!(count = mismatches.len(), "reconciliation sweep found balance mismatches");
            for m in &mismatches {
                tracing::warn!(
                    account_id = %m.account_id,
                    asset_id = %m.asset_id,
                    materialized = %m.materialized,
                    computed = %m.computed,
                    "balance mismatch"
                );
            }
        }

        Ok(mismatches)
    }

    /// Runs `run_once` on `config.reconciler_interval_secs`, logging
    /// failures and mismatches without taking the process down, until
    /// told to shut down.
    pub fn spawn(self: Arc<Self>, config: LedgerConfig) -> ReconcilerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let interval = Duration::from_secs(config.reconciler_interval_secs);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sleep(interval) => {}
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("reconciler shutting down");
                            break;
                        }
                    }
                }

                if let Err(err) = self.run_once().await {
                    tracing::warn!(error = %err, "reconciliation sweep failed");
                }
            }
        });

        ReconcilerHandle { shutdown_tx }
    }
}
