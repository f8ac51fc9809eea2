//! `manual-outcome`: withdrawal to outside the ledger (spec.md §4.6).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::application::handler_registry::{OperationContext, TransactionHandler};
use crate::application::handlers::{
    authorize_wallet, check_not_future, decimals_or, outcome_pair, require_amount, require_uuid,
    resolve_usd_rate, HandlerDeps,
};
use crate::domain::entry::Entry;
use crate::error::LedgerError;

pub struct ManualOutcomeHandler {
    deps: HandlerDeps,
}

impl ManualOutcomeHandler {
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
}

#[async_trait]
impl TransactionHandler for ManualOutcomeHandler {
    fn transaction_type(&self) -> &'static str {
        "manual-outcome"
    }

    async fn validate_data(&self, ctx: &OperationContext, raw_data: &Json) -> Result<(), LedgerError> {
        let (wallet_id, asset_id, decimals) = self.wallet_and_asset(raw_data).await?;
        let amount = require_amount(raw_data, "amount", decimals)?;

        let at: DateTime<Utc> = raw_data
            .get("occurred_at")
            .and_then(Json::as_str)
            .ok_or_else(|| LedgerError::InvalidData("missing occurred_at".to_string()))?
            .parse()
            .map_err(|_| LedgerError::InvalidData("occurred_at is not RFC 3339".to_string()))?;
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
        let (wallet_id, asset_id, decimals) = self.wallet_and_asset(raw_data).await?;
        let amount = require_amount(raw_data, "amount", decimals)?;
        let asset = self.deps.assets.get_by_id(asset_id).await?;
        let usd_rate = resolve_usd_rate(&self.deps, raw_data, "usd_rate", asset_id).await?;
        Ok(outcome_pair(
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
    use crate::infrastructure::price_provider::MockPriceProvider;
    use crate::money::Money;
    use std::sync::Arc;

    fn deps_with_btc_balance(wallet_id: Uuid, balance: &str) -> (HandlerDeps, Uuid) {
        let asset_repo = InMemoryAssetRepository::new();
        let assets = seed_assets();
        let btc_id = assets.iter().find(|a| a.symbol == "BTC").unwrap().id;
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
        balances.set_balance(wallet_id, btc_id, Money::to_base_units(balance, 8).unwrap());
        let deps = HandlerDeps {
            assets: assets_svc,
            prices,
            wallets: Arc::new(InMemoryWalletDirectory::new()),
            balances,
            config: LedgerConfig::default(),
        };
        (deps, btc_id)
    }

    #[tokio::test]
    async fn overdraw_is_prevented() {
        let wallet_id = Uuid::new_v4();
        let (deps, btc_id) = deps_with_btc_balance(wallet_id, "1");
        let handler = ManualOutcomeHandler::new(deps);
        let raw = serde_json::json!({
            "wallet_id": wallet_id.to_string(),
            "asset_id": btc_id.to_string(),
            "amount": "2",
            "decimals": 8,
            "occurred_at": Utc::now().to_rfc3339(),
        });
        let err = handler
            .validate_data(&OperationContext::system(), &raw)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::InsufficientBalance);
    }

    #[tokio::test]
    async fn sufficient_balance_emits_outcome_pair() {
        let wallet_id = Uuid::new_v4();
        let (deps, btc_id) = deps_with_btc_balance(wallet_id, "1");
        let handler = ManualOutcomeHandler::new(deps);
        let raw = serde_json::json!({
            "wallet_id": wallet_id.to_string(),
            "asset_id": btc_id.to_string(),
            "amount": "0.5",
            "decimals": 8,
            "occurred_at": Utc::now().to_rfc3339(),
        });
        let ctx = OperationContext::system();
        handler.validate_data(&ctx, &raw).await.unwrap();
        let entries = handler
            .handle(&ctx, Uuid::new_v4(), &raw, Utc::now())
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].amount, entries[1].amount);
    }
}
