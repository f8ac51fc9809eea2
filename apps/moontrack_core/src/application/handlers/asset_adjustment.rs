//! `asset-adjustment`: set a wallet's balance to a target value
//! (spec.md §4.6).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::application::handler_registry::{OperationContext, TransactionHandler};
use crate::application::handlers::{
    authorize_wallet, check_not_future, decimals_or, income_pair, outcome_pair, optional_str,
    require_uuid, resolve_usd_rate, HandlerDeps,
};
use crate::domain::entry::Entry;
use crate::error::LedgerError;
use crate::money::Money;

pub struct AssetAdjustmentHandler {
    deps: HandlerDeps,
}

impl AssetAdjustmentHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }

    async fn wallet_and_asset(&self, raw: &Json) -> Result<(Uuid, Uuid, u32), LedgerError> {
        let wallet_id = require_uuid(raw, "wallet_id")?;
        let asset_id = require_uuid(raw, "asset_id")?;
        let asset = self.deps.assets.get_by_id(asset_id).await?;
        let decimals = decimals_or(raw, "decimals", asset.decimals);
        Ok((wallet_id, asset_id, decimals))
    }

    /// `delta = target − current` (spec.md §4.6). Zero-delta is the
    /// caller's responsibility to reject with `no_adjustment_needed`.
    async fn compute_delta(&self, raw: &Json, wallet_id: Uuid, asset_id: Uuid, decimals: u32) -> Result<Money, LedgerError> {
        let target_str = raw
            .get("new_balance")
            .and_then(Json::as_str)
            .ok_or_else(|| LedgerError::InvalidData("missing new_balance".to_string()))?;
        let target = Money::to_base_units(target_str, decimals)
            .map_err(|_| LedgerError::InvalidAmount(target_str.to_string()))?;
        if target.is_negative() {
            return Err(LedgerError::NegativeAmount);
        }
        let current = self.deps.balances.get_wallet_balance(wallet_id, asset_id).await?;
        Ok(target.checked_sub(&current))
    }
}

#[async_trait]
impl TransactionHandler for AssetAdjustmentHandler {
    fn transaction_type(&self) -> &'static str {
        "asset-adjustment"
    }

    async fn validate_data(&self, ctx: &OperationContext, raw_data: &Json) -> Result<(), LedgerError> {
        let (wallet_id, asset_id, decimals) = self.wallet_and_asset(raw_data).await?;

        let at: DateTime<Utc> = raw_data
            .get("occurred_at")
            .and_then(Json::as_str)
            .ok_or_else(|| LedgerError::InvalidData("missing occurred_at".to_string()))?
            .parse()
            .map_err(|_| LedgerError::InvalidData("occurred_at is not RFC 3339".to_string()))?;
        check_not_future(at, self.deps.config.clock_skew_tolerance_secs)?;

        authorize_wallet(&self.deps, ctx, wallet_id).await?;

        let delta = self.compute_delta(raw_data, wallet_id, asset_id, decimals).await?;
        if delta.is_zero() {
            return Err(LedgerError::NoAdjustmentNeeded);
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
        let (wallet_id, asset_id, decimals) = self.wallet_and_asset(raw_data).await?;
        let delta = self.compute_delta(raw_data, wallet_id, asset_id, decimals).await?;
        let asset = self.deps.assets.get_by_id(asset_id).await?;
        // `usd_rate` is optional here (spec.md §9 Open Question 2: zero is
        // an acceptable rate, producing `usd_value = 0`), so no external
        // lookup is forced when the caller omits it.
        let usd_rate = match optional_str(raw_data, "usd_rate") {
            Some(_) => resolve_usd_rate(&self.deps, raw_data, "usd_rate", asset_id).await?,
            None => Money::zero(),
        };

        if delta.is_negative() {
            Ok(outcome_pair(
                transaction_id,
                wallet_id,
                &asset.symbol,
                delta.abs(),
                asset_id,
                usd_rate,
                decimals,
                occurred_at,
            ))
        } else {
            Ok(income_pair(
                transaction_id,
                wallet_id,
                &asset.symbol,
                delta,
                asset_id,
                usd_rate,
                decimals,
                occurred_at,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::asset_registry::mock::InMemoryAssetRepository;
    use crate::application::asset_registry::AssetRegistry;
    use crate::application::handlers::mock::{InMemoryBalanceReader, InMemoryWalletDirectory};
    use crate::application::price_service::mock::InMemoryPriceRepository;
    use crate::application::price_service::PriceService;
    use crate::config::LedgerConfig;
    use crate::domain::asset::seed_assets;
    use crate::domain::entry::{EntrySide, EntryType};
    use crate::infrastructure::price_provider::MockPriceProvider;
    use std::sync::Arc;

    fn deps_with_eth_balance(wallet_id: Uuid, balance: &str) -> (HandlerDeps, Uuid) {
        let asset_repo = InMemoryAssetRepository::new();
        let assets = seed_assets();
        let eth_id = assets.iter().find(|a| a.symbol == "ETH").unwrap().id;
        asset_repo.seed(assets);
        let assets_svc = Arc::new(AssetRegistry::new(Arc::new(asset_repo)));
        let provider = Arc::new(MockPriceProvider::new());
        let prices = Arc::new(PriceService::new(
            Arc::new(InMemoryPriceRepository::new()),
            provider,
            assets_svc.clone(),
            LedgerConfig::default(),
        ));
        let balances = Arc::new(InMemoryBalanceReader::new());
        balances.set_balance(wallet_id, eth_id, Money::to_base_units(balance, 18).unwrap());
        let deps = HandlerDeps {
            assets: assets_svc,
            prices,
            wallets: Arc::new(InMemoryWalletDirectory::new()),
            balances,
            config: LedgerConfig::default(),
        };
        (deps, eth_id)
    }

    #[tokio::test]
    async fn adjustment_up_emits_income_pair_matching_spec_scenario_4() {
        let wallet_id = Uuid::new_v4();
        let (deps, eth_id) = deps_with_eth_balance(wallet_id, "3");
        let handler = AssetAdjustmentHandler::new(deps);
        let raw = serde_json::json!({
            "wallet_id": wallet_id.to_string(),
            "asset_id": eth_id.to_string(),
            "new_balance": "5",
            "decimals": 18,
            "occurred_at": Utc::now().to_rfc3339(),
        });
        let ctx = OperationContext::system();
        handler.validate_data(&ctx, &raw).await.unwrap();
        let entries = handler
            .handle(&ctx, Uuid::new_v4(), &raw, Utc::now())
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].side, EntrySide::Debit);
        assert_eq!(entries[0].entry_type, EntryType::AssetIncrease);
        assert_eq!(
            entries[0].amount,
            Money::to_base_units("2", 18).unwrap()
        );
    }

    #[tokio::test]
    async fn adjustment_no_op_rejected_matching_spec_scenario_5() {
        let wallet_id = Uuid::new_v4();
        let (deps, eth_id) = deps_with_eth_balance(wallet_id, "3");
        let handler = AssetAdjustmentHandler::new(deps);
        let raw = serde_json::json!({
            "wallet_id": wallet_id.to_string(),
            "asset_id": eth_id.to_string(),
            "new_balance": "3",
            "decimals": 18,
            "occurred_at": Utc::now().to_rfc3339(),
        });
        let err = handler
            .validate_data(&OperationContext::system(), &raw)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::NoAdjustmentNeeded);
    }

    #[tokio::test]
    async fn adjustment_down_emits_outcome_pair() {
        let wallet_id = Uuid::new_v4();
        let (deps, eth_id) = deps_with_eth_balance(wallet_id, "3");
        let handler = AssetAdjustmentHandler::new(deps);
        let raw = serde_json::json!({
            "wallet_id": wallet_id.to_string(),
            "asset_id": eth_id.to_string(),
            "new_balance": "1",
            "decimals": 18,
            "occurred_at": Utc::now().to_rfc3339(),
        });
        let ctx = OperationContext::system();
        handler.validate_data(&ctx, &raw).await.unwrap();
        let entries = handler
            .handle(&ctx, Uuid::new_v4(), &raw, Utc::now())
            .await
            .unwrap();
        assert_eq!(entries[0].side, EntrySide::Credit);
        assert_eq!(entries[0].entry_type, EntryType::AssetDecrease);
        assert_eq!(entries[0].amount, Money::to_base_units("2", 18).unwrap());
    }
}
