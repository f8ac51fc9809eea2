//! Transaction Handlers (C6): one module per transaction type, sharing
//! the decode/validate/authorize skeleton spec.md §4.6 describes.
//!
//! Grounded in the teacher's `investment_service.rs`, which validates a
//! typed request, authorizes against the owning user, and only then
//! builds domain records — the same three-step shape, generalized here
//! from one request type to the per-handler dispatch table.

pub mod asset_adjustment;
pub mod manual_income;
pub mod manual_outcome;
pub mod swap;
pub mod transfer;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::application::asset_registry::AssetRegistry;
use crate::application::handler_registry::{OperationContext, WalletDirectory};
use crate::application::price_service::PriceService;
use crate::config::LedgerConfig;
use crate::domain::account::{expense_account_code, income_account_code, wallet_account_code};
use crate::domain::entry::{Entry, EntrySide, EntryType};
use crate::error::LedgerError;
use crate::money::Money;

/// Best-effort, non-locking balance read handlers use for their own
/// insufficient-balance pre-check (spec.md §4.6 step 4). The committer's
/// row-locked check at commit time is the authoritative guard — see
/// `application::committer`.
#[async_trait]
pub trait BalanceReader: Send + Sync {
    async fn get_wallet_balance(&self, wallet_id: Uuid, asset_id: Uuid) -> Result<Money, LedgerError>;
}

/// Shared collaborators every handler needs, bundled so registration
/// sites construct one of these per handler instead of threading five
/// separate `Arc`s.
#[derive(Clone)]
pub struct HandlerDeps {
    pub assets: Arc<AssetRegistry>,
    pub prices: Arc<PriceService>,
    pub wallets: Arc<dyn WalletDirectory>,
    pub balances: Arc<dyn BalanceReader>,
    pub config: LedgerConfig,
}

pub(crate) fn require_str<'a>(raw: &'a Json, field: &str) -> Result<&'a str, LedgerError> {
    raw.get(field)
        .and_then(Json::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LedgerError::InvalidData(format!("missing or empty field '{field}'")))
}

pub(crate) fn optional_str<'a>(raw: &'a Json, field: &str) -> Option<&'a str> {
    raw.get(field).and_then(Json::as_str).filter(|s| !s.is_empty())
}

pub(crate) fn require_uuid(raw: &Json, field: &str) -> Result<Uuid, LedgerError> {
    let s = require_str(raw, field)?;
    Uuid::parse_str(s).map_err(|_| LedgerError::InvalidWalletId(format!("'{s}' is not a UUID")))
}

pub(crate) fn require_amount(raw: &Json, field: &str, decimals: u32) -> Result<Money, LedgerError> {
    let s = require_str(raw, field)?;
    let amount =
        Money::to_base_units(s, decimals).map_err(|_| LedgerError::InvalidAmount(s.to_string()))?;
    if amount.is_negative() {
        return Err(LedgerError::NegativeAmount);
    }
    Ok(amount)
}

pub(crate) fn optional_usd_rate(raw: &Json, field: &str) -> Result<Money, LedgerError> {
    match optional_str(raw, field) {
        Some(s) => {
            let rate = Money::parse_integer(s).map_err(|_| LedgerError::InvalidAmount(s.to_string()))?;
            if rate.is_negative() {
                return Err(LedgerError::NegativeUsdRate);
            }
            Ok(rate)
        }
        None => Ok(Money::zero()),
    }
}

pub(crate) fn decimals_or(raw: &Json, field: &str, default: u32) -> u32 {
    raw.get(field)
        .and_then(Json::as_u64)
        .map(|v| v as u32)
        .unwrap_or(default)
}

pub(crate) fn check_not_future(at: DateTime<Utc>, skew_tolerance_secs: i64) -> Result<(), LedgerError> {
    let now = Utc::now();
    if at > now + chrono::Duration::seconds(skew_tolerance_secs) {
        return Err(LedgerError::FutureDate);
    }
    Ok(())
}

/// Authorization: system-initiated (`ctx.user_id = None`) is always
/// allowed; otherwise the caller must own the wallet (spec.md §4.6 step
/// 3, §9 "Authorization in handlers vs centrally").
pub(crate) async fn authorize_wallet(
    deps: &HandlerDeps,
    ctx: &OperationContext,
    wallet_id: Uuid,
) -> Result<(), LedgerError> {
    let Some(caller) = ctx.user_id else {
        return Ok(());
    };
    let owner = deps
        .wallets
        .get_owner(wallet_id)
        .await?
        .ok_or(LedgerError::WalletNotFound(wallet_id))?;
    if owner != caller {
        return Err(LedgerError::Unauthorized);
    }
    Ok(())
}

/// Resolve a USD rate: explicit `usd_rate` wins, else a live lookup
/// through the Price Service (spec.md §4.6 step 5). A lookup failure is
/// tolerated per spec.md §9 Open Question 2 — zero is an acceptable
/// rate when the price is truly unknown.
pub(crate) async fn resolve_usd_rate(
    deps: &HandlerDeps,
    raw: &Json,
    field: &str,
    asset_id: Uuid,
) -> Result<Money, LedgerError> {
    if let Some(s) = optional_str(raw, field) {
        let rate = Money::parse_integer(s).map_err(|_| LedgerError::InvalidAmount(s.to_string()))?;
        if rate.is_negative() {
            return Err(LedgerError::NegativeUsdRate);
        }
        return Ok(rate);
    }
    match deps.prices.get_current_price(asset_id).await {
        Ok(quote) => Ok(quote.price_usd),
        Err(_) => Ok(Money::zero()),
    }
}

/// The `asset_increase` debit / `income` credit pair shared by manual
/// income, asset-adjustment increases, transfer-in, and internal
/// transfer's destination side (spec.md §4.6).
#[allow(clippy::too_many_arguments)]
pub(crate) fn income_pair(
    transaction_id: Uuid,
    wallet_id: Uuid,
    symbol: &str,
    amount: Money,
    asset_id: Uuid,
    usd_rate: Money,
    decimals: u32,
    occurred_at: DateTime<Utc>,
) -> Vec<Entry> {
    vec![
        Entry::new_unresolved(
            transaction_id,
            EntrySide::Debit,
            EntryType::AssetIncrease,
            amount.clone(),
            asset_id,
            usd_rate.clone(),
            decimals,
            occurred_at,
            wallet_account_code(wallet_id, symbol),
        ),
        Entry::new_unresolved(
            transaction_id,
            EntrySide::Credit,
            EntryType::Income,
            amount,
            asset_id,
            usd_rate,
            decimals,
            occurred_at,
            income_account_code(symbol),
        ),
    ]
}

/// The `asset_decrease` credit / `expense` debit pair shared by manual
/// outcome, asset-adjustment decreases, and transfer-out/internal
/// transfer's source side.
#[allow(clippy::too_many_arguments)]
pub(crate) fn outcome_pair(
    transaction_id: Uuid,
    wallet_id: Uuid,
    symbol: &str,
    amount: Money,
    asset_id: Uuid,
    usd_rate: Money,
    decimals: u32,
    occurred_at: DateTime<Utc>,
) -> Vec<Entry> {
    vec![
        Entry::new_unresolved(
            transaction_id,
            EntrySide::Credit,
            EntryType::AssetDecrease,
            amount.clone(),
            asset_id,
            usd_rate.clone(),
            decimals,
            occurred_at,
            wallet_account_code(wallet_id, symbol),
        ),
        Entry::new_unresolved(
            transaction_id,
            EntrySide::Debit,
            EntryType::Expense,
            amount,
            asset_id,
            usd_rate,
            decimals,
            occurred_at,
            expense_account_code(symbol),
        ),
    ]
}
