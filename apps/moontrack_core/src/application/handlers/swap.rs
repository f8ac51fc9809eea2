//! `swap`: multiple assets leave, multiple enter, with an optional gas
//! fee (spec.md §4.6, §8 scenario 6).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::application::asset_registry::AssetRegistry;
use crate::application::handler_registry::{OperationContext, TransactionHandler};
use crate::application::handlers::{
    authorize_wallet, check_not_future, require_str, require_uuid, HandlerDeps,
};
use crate::domain::account::{clearing_account_code, gas_account_code, wallet_account_code};
use crate::domain::asset::Asset;
use crate::domain::entry::{Entry, EntrySide, EntryType};
use crate::error::LedgerError;
use crate::money::Money;

pub struct SwapHandler {
    deps: HandlerDeps,
}

impl SwapHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }
}

struct ParsedTransfer {
    asset: Asset,
    amount: Money,
    usd_price: Money,
}

/// `get_by_symbol` fails closed with `ambiguous_symbol` when a chain
/// qualifier isn't given and more than one variant exists; a swap leg
/// only names a symbol, so here we take the highest-ranked candidate
/// rather than force every caller to disambiguate a stablecoin.
async fn resolve_transfer_asset(assets: &AssetRegistry, symbol: &str) -> Result<Asset, LedgerError> {
    match assets.get_by_symbol(symbol, None).await {
        Ok(asset) => Ok(asset),
        Err(LedgerError::AmbiguousSymbol { .. }) => {
            let mut candidates = assets.get_all_by_symbol(symbol).await?;
            candidates.sort_by(|a, b| b.rank.cmp(&a.rank));
            candidates
                .into_iter()
                .next()
                .ok_or_else(|| LedgerError::NotFound(format!("asset {symbol}")))
        }
        Err(e) => Err(e),
    }
}

async fn parse_transfer(assets: &AssetRegistry, raw: &Json) -> Result<ParsedTransfer, LedgerError> {
    let symbol = require_str(raw, "asset_symbol")?;
    let asset = resolve_transfer_asset(assets, symbol).await?;
    let decimals = raw
        .get("decimals")
        .and_then(Json::as_u64)
        .map(|v| v as u32)
        .unwrap_or(asset.decimals);
    let amount_str = require_str(raw, "amount")?;
    let amount = Money::to_base_units(amount_str, decimals)
        .map_err(|_| LedgerError::InvalidAmount(amount_str.to_string()))?;
    if amount.is_negative() {
        return Err(LedgerError::NegativeAmount);
    }
    let usd_price = match raw.get("usd_price").and_then(Json::as_str) {
        Some(s) => {
            let v = Money::parse_integer(s).map_err(|_| LedgerError::InvalidAmount(s.to_string()))?;
            if v.is_negative() {
                return Err(LedgerError::NegativeUsdRate);
            }
            v
        }
        None => Money::zero(),
    };
    Ok(ParsedTransfer {
        asset,
        amount,
        usd_price,
    })
}

async fn parse_transfer_list(assets: &AssetRegistry, raw: &Json, field: &str) -> Result<Vec<ParsedTransfer>, LedgerError> {
    let arr = raw
        .get(field)
        .and_then(Json::as_array)
        .ok_or_else(|| LedgerError::InvalidData(format!("missing array field '{field}'")))?;
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        out.push(parse_transfer(assets, item).await?);
    }
    Ok(out)
}

#[async_trait]
impl TransactionHandler for SwapHandler {
    fn transaction_type(&self) -> &'static str {
        "swap"
    }

    async fn validate_data(&self, ctx: &OperationContext, raw_data: &Json) -> Result<(), LedgerError> {
        let wallet_id = require_uuid(raw_data, "wallet_id")?;
        let _chain_id = require_str(raw_data, "chain_id")?;

        let at: DateTime<Utc> = raw_data
            .get("occurred_at")
            .and_then(Json::as_str)
            .ok_or_else(|| LedgerError::InvalidData("missing occurred_at".to_string()))?
            .parse()
            .map_err(|_| LedgerError::InvalidData("occurred_at is not RFC 3339".to_string()))?;
        check_not_future(at, self.deps.config.clock_skew_tolerance_secs)?;

        authorize_wallet(&self.deps, ctx, wallet_id).await?;

        let transfers_in = parse_transfer_list(&self.deps.assets, raw_data, "transfers_in").await?;
        let transfers_out = parse_transfer_list(&self.deps.assets, raw_data, "transfers_out").await?;
        if transfers_in.is_empty() || transfers_out.is_empty() {
            return Err(LedgerError::NoTransfers);
        }

        if let Some(fee_amount) = raw_data.get("fee_amount").and_then(Json::as_str) {
            let fee_decimals = raw_data
                .get("fee_decimals")
                .and_then(Json::as_u64)
                .map(|v| v as u32)
                .unwrap_or(18);
            let fee = Money::to_base_units(fee_amount, fee_decimals)
                .map_err(|_| LedgerError::InvalidAmount(fee_amount.to_string()))?;
            if fee.is_negative() {
                return Err(LedgerError::NegativeAmount);
            }
        }
        Ok(())
    }

    async fn handle(
        &self,
        _ctx: &OperationContext,
        transaction_id: Uuid,
        raw_data: &Json,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<Entry>, LedgerError> {
        let wallet_id = require_uuid(raw_data, "wallet_id")?;
        let chain_id = require_str(raw_data, "chain_id")?.to_string();

        let transfers_out = parse_transfer_list(&self.deps.assets, raw_data, "transfers_out").await?;
        let transfers_in = parse_transfer_list(&self.deps.assets, raw_data, "transfers_in").await?;

        let mut entries = Vec::new();

        for t in &transfers_out {
            entries.push(Entry::new_unresolved(
                transaction_id,
                EntrySide::Credit,
                EntryType::AssetDecrease,
                t.amount.clone(),
                t.asset.id,
                t.usd_price.clone(),
                t.asset.decimals,
                occurred_at,
                wallet_account_code(wallet_id, &t.asset.symbol),
            ));
            entries.push(Entry::new_unresolved(
                transaction_id,
                EntrySide::Debit,
                EntryType::Clearing,
                t.amount.clone(),
                t.asset.id,
                t.usd_price.clone(),
                t.asset.decimals,
                occurred_at,
                clearing_account_code(&chain_id, &t.asset.symbol),
            ));
        }

        for t in &transfers_in {
            entries.push(Entry::new_unresolved(
                transaction_id,
                EntrySide::Debit,
                EntryType::AssetIncrease,
                t.amount.clone(),
                t.asset.id,
                t.usd_price.clone(),
                t.asset.decimals,
                occurred_at,
                wallet_account_code(wallet_id, &t.asset.symbol),
            ));
            entries.push(Entry::new_unresolved(
                transaction_id,
                EntrySide::Credit,
                EntryType::Clearing,
                t.amount.clone(),
                t.asset.id,
                t.usd_price.clone(),
                t.asset.decimals,
                occurred_at,
                clearing_account_code(&chain_id, &t.asset.symbol),
            ));
        }

        if let Some(fee_amount_str) = raw_data.get("fee_amount").and_then(Json::as_str) {
            let fee_symbol = require_str(raw_data, "fee_asset")?;
            let fee_asset = resolve_transfer_asset(&self.deps.assets, fee_symbol).await?;
            let fee_decimals = raw_data
                .get("fee_decimals")
                .and_then(Json::as_u64)
                .map(|v| v as u32)
                .unwrap_or(fee_asset.decimals);
            let fee_amount = Money::to_base_units(fee_amount_str, fee_decimals)
                .map_err(|_| LedgerError::InvalidAmount(fee_amount_str.to_string()))?;
            let fee_usd_price = match raw_data.get("fee_usd_price").and_then(Json::as_str) {
                Some(s) => Money::parse_integer(s).map_err(|_| LedgerError::InvalidAmount(s.to_string()))?,
                None => Money::zero(),
            };

            entries.push(Entry::new_unresolved(
                transaction_id,
                EntrySide::Debit,
                EntryType::GasFee,
                fee_amount.clone(),
                fee_asset.id,
                fee_usd_price.clone(),
                fee_decimals,
                occurred_at,
                gas_account_code(&chain_id, &fee_asset.symbol),
            ));
            entries.push(Entry::new_unresolved(
                transaction_id,
                EntrySide::Credit,
                EntryType::AssetDecrease,
                fee_amount,
                fee_asset.id,
                fee_usd_price,
                fee_decimals,
                occurred_at,
                wallet_account_code(wallet_id, &fee_asset.symbol),
            ));
        }

        Ok(entries)
    }
}
