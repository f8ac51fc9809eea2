//! On-chain transfers: `transfer-in`, `transfer-out`, `internal-transfer`
//! (spec.md §4.6).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::application::handler_registry::{OperationContext, TransactionHandler};
use crate::application::handlers::{
    authorize_wallet, check_not_future, decimals_or, income_pair, outcome_pair, require_amount,
    require_str, require_uuid, resolve_usd_rate, HandlerDeps,
};
use crate::domain::account::gas_account_code;
use crate::domain::entry::{Entry, EntrySide, EntryType};
use crate::error::LedgerError;
use crate::money::Money;

async fn gas_entries(
    deps: &HandlerDeps,
    raw: &Json,
    transaction_id: Uuid,
    wallet_id: Uuid,
    chain_id: &str,
    occurred_at: DateTime<Utc>,
) -> Result<Vec<Entry>, LedgerError> {
    let Some(fee_amount_str) = raw.get("fee_amount").and_then(Json::as_str) else {
        return Ok(vec![]);
    };
    let fee_symbol = require_str(raw, "fee_asset")?;
    let fee_asset = deps.assets.get_by_symbol(fee_symbol, None).await?;
    let fee_decimals = raw
        .get("fee_decimals")
        .and_then(Json::as_u64)
        .map(|v| v as u32)
        .unwrap_or(fee_asset.decimals);
    let fee_amount = Money::to_base_units(fee_amount_str, fee_decimals)
        .map_err(|_| LedgerError::InvalidAmount(fee_amount_str.to_string()))?;
    let fee_usd_rate = resolve_usd_rate(deps, raw, "fee_usd_price", fee_asset.id).await?;

    Ok(vec![
        Entry::new_unresolved(
            transaction_id,
            EntrySide::Debit,
            EntryType::GasFee,
            fee_amount.clone(),
            fee_asset.id,
            fee_usd_rate.clone(),
            fee_decimals,
            occurred_at,
            gas_account_code(chain_id, &fee_asset.symbol),
        ),
        Entry::new_unresolved(
            transaction_id,
            EntrySide::Credit,
            EntryType::AssetDecrease,
            fee_amount,
            fee_asset.id,
            fee_usd_rate,
            fee_decimals,
            occurred_at,
            crate::domain::account::wallet_account_code(wallet_id, &fee_asset.symbol),
        ),
    ])
}

fn parse_occurred_at(raw: &Json) -> Result<DateTime<Utc>, LedgerError> {
    raw.get("occurred_at")
        .and_then(Json::as_str)
        .ok_or_else(|| LedgerError::InvalidData("missing occurred_at".to_string()))?
        .parse()
        .map_err(|_| LedgerError::InvalidData("occurred_at is not RFC 3339".to_string()))
}

pub struct TransferInHandler {
    deps: HandlerDeps,
}

impl TransferInHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl TransactionHandler for TransferInHandler {
    fn transaction_type(&self) -> &'static str {
        "transfer-in"
    }

    async fn validate_data(&self, ctx: &OperationContext, raw_data: &Json) -> Result<(), LedgerError> {
        let wallet_id = require_uuid(raw_data, "wallet_id")?;
        let asset_id = require_uuid(raw_data, "asset_id")?;
        let asset = self.deps.assets.get_by_id(asset_id).await?;
        let decimals = decimals_or(raw_data, "decimals", asset.decimals);
        require_amount(raw_data, "amount", decimals)?;
        require_str(raw_data, "chain_id")?;
        require_str(raw_data, "tx_hash")?;
        let at = parse_occurred_at(raw_data)?;
        check_not_future(at, self.deps.config.clock_skew_tolerance_secs)?;
        authorize_wallet(&self.deps, ctx, wallet_id).await
    }

    async fn handle(
        &self,
        _ctx: &OperationContext,
        transaction_id: Uuid,
        raw_data: &Json,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<Entry>, LedgerError> {
        let wallet_id = require_uuid(raw_data, "wallet_id")?;
        let asset_id = require_uuid(raw_data, "asset_id")?;
        let asset = self.deps.assets.get_by_id(asset_id).await?;
        let decimals = decimals_or(raw_data, "decimals", asset.decimals);
        let amount = require_amount(raw_data, "amount", decimals)?;
        let usd_rate = resolve_usd_rate(&self.deps, raw_data, "usd_rate", asset_id).await?;
        Ok(income_pair(
            transaction_id,
            wallet_id,
            &asset.symbol,
            amount,
            asset_id,
            usd_rate,
            decimals,
            occurred_at,
        ))
    }
}

pub struct TransferOutHandler {
    deps: HandlerDeps,
}

impl TransferOutHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl TransactionHandler for TransferOutHandler {
    fn transaction_type(&self) -> &'static str {
        "transfer-out"
    }

    async fn validate_data(&self, ctx: &OperationContext, raw_data: &Json) -> Result<(), LedgerError> {
        let wallet_id = require_uuid(raw_data, "wallet_id")?;
        let asset_id = require_uuid(raw_data, "asset_id")?;
        let asset = self.deps.assets.get_by_id(asset_id).await?;
        let decimals = decimals_or(raw_data, "decimals", asset.decimals);
        let amount = require_amount(raw_data, "amount", decimals)?;
        require_str(raw_data, "chain_id")?;
        require_str(raw_data, "tx_hash")?;
        let at = parse_occurred_at(raw_data)?;
        check_not_future(at, self.deps.config.clock_skew_tolerance_secs)?;
        authorize_wallet(&self.deps, ctx, wallet_id).await?;

        let available = self.deps.balances.get_wallet_balance(wallet_id, asset_id).await?;
        if available.as_bigint() < amount.as_bigint() {
            return Err(LedgerError::InsufficientBalance);
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
        let asset_id = require_uuid(raw_data, "asset_id")?;
        let asset = self.deps.assets.get_by_id(asset_id).await?;
        let decimals = decimals_or(raw_data, "decimals", asset.decimals);
        let amount = require_amount(raw_data, "amount", decimals)?;
        let usd_rate = resolve_usd_rate(&self.deps, raw_data, "usd_rate", asset_id).await?;
        let chain_id = require_str(raw_data, "chain_id")?.to_string();

        let mut entries = outcome_pair(
            transaction_id,
            wallet_id,
            &asset.symbol,
            amount,
            asset_id,
            usd_rate,
            decimals,
            occurred_at,
        );
        entries.extend(
            gas_entries(&self.deps, raw_data, transaction_id, wallet_id, &chain_id, occurred_at).await?,
        );
        Ok(entries)
    }
}

pub struct InternalTransferHandler {
    deps: HandlerDeps,
}

impl InternalTransferHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl TransactionHandler for InternalTransferHandler {
    fn transaction_type(&self) -> &'static str {
        "internal-transfer"
    }

    async fn validate_data(&self, ctx: &OperationContext, raw_data: &Json) -> Result<(), LedgerError> {
        let source_wallet_id = require_uuid(raw_data, "source_wallet_id")?;
        let _dest_wallet_id = require_uuid(raw_data, "dest_wallet_id")?;
        let asset_id = require_uuid(raw_data, "asset_id")?;
        let asset = self.deps.assets.get_by_id(asset_id).await?;
        let decimals = decimals_or(raw_data, "decimals", asset.decimals);
        let amount = require_amount(raw_data, "amount", decimals)?;
        require_str(raw_data, "chain_id")?;
        require_str(raw_data, "tx_hash")?;
        let at = parse_occurred_at(raw_data)?;
        check_not_future(at, self.deps.config.clock_skew_tolerance_secs)?;

        // Authorization is scoped to the sending wallet, mirroring
        // transfer-out: the caller must own the funds leaving the ledger's
        // books, not necessarily the receiving wallet (e.g. a gift
        // between a user's own wallets still authorizes off the source).
        authorize_wallet(&self.deps, ctx, source_wallet_id).await?;

        let available = self
            .deps
            .balances
            .get_wallet_balance(source_wallet_id, asset_id)
            .await?;
        if available.as_bigint() < amount.as_bigint() {
            return Err(LedgerError::InsufficientBalance);
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
        let source_wallet_id = require_uuid(raw_data, "source_wallet_id")?;
        let dest_wallet_id = require_uuid(raw_data, "dest_wallet_id")?;
        let asset_id = require_uuid(raw_data, "asset_id")?;
        let asset = self.deps.assets.get_by_id(asset_id).await?;
        let decimals = decimals_or(raw_data, "decimals", asset.decimals);
        let amount = require_amount(raw_data, "amount", decimals)?;
        let usd_rate = resolve_usd_rate(&self.deps, raw_data, "usd_rate", asset_id).await?;
        let chain_id = require_str(raw_data, "chain_id")?.to_string();

        let mut entries = outcome_pair(
            transaction_id,
            source_wallet_id,
            &asset.symbol,
            amount.clone(),
            asset_id,
            usd_rate.clone(),
            decimals,
            occurred_at,
        );
        entries.extend(income_pair(
            transaction_id,
            dest_wallet_id,
            &asset.symbol,
            amount,
            asset_id,
            usd_rate,
            decimals,
            occurred_at,
        ));
        entries.extend(
            gas_entries(
                &self.deps,
                raw_data,
                transaction_id,
                source_wallet_id,
                &chain_id,
                occurred_at,
            )
            .await?,
        );
        Ok(entries)
    }
}
