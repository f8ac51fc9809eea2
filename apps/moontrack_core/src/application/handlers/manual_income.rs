//! `manual-income`: add balance from outside the ledger (spec.md §4.6).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::application::handler_registry::{OperationContext, TransactionHandler};
use crate::application::handlers::{
    authorize_wallet, check_not_future, decimals_or, income_pair, optional_str, require_amount,
    require_uuid, resolve_usd_rate, HandlerDeps,
};
use crate::domain::entry::Entry;
use crate::error::LedgerError;

pub struct ManualIncomeHandler {
    deps: HandlerDeps,
}

impl ManualIncomeHandler {
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
impl TransactionHandler for ManualIncomeHandler {
    fn transaction_type(&self) -> &'static str {
        "manual-income"
    }

    async fn validate_data(&self, ctx: &OperationContext, raw_data: &Json) -> Result<(), LedgerError> {
        let (wallet_id, asset_id, decimals) = self.wallet_and_asset(raw_data).await?;
        require_amount(raw_data, "amount", decimals)?;
        let _ = asset_id;
        if let Some(at) = raw_data.get("occurred_at").and_then(Json::as_str) {
            let at: DateTime<Utc> = at
                .parse()
                .map_err(|_| LedgerError::InvalidData("occurred_at is not RFC 3339".to_string()))?;
            check_not_future(at, self.deps.config.clock_skew_tolerance_secs)?;
        } else {
            return Err(LedgerError::InvalidData("missing occurred_at".to_string()));
        }
        authorize_wallet(&self.deps, ctx, wallet_id).await
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
        let _ = optional_str(raw_data, "notes");
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

    fn deps_with_btc() -> (HandlerDeps, Uuid) {
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
        let deps = HandlerDeps {
            assets: assets_svc,
            prices,
            wallets: Arc::new(InMemoryWalletDirectory::new()),
            balances: Arc::new(InMemoryBalanceReader::new()),
            config: LedgerConfig::default(),
        };
        (deps, btc_id)
    }

    #[tokio::test]
    async fn emits_balanced_pair_matching_spec_scenario_1() {
        let (deps, btc_id) = deps_with_btc();
        let handler = ManualIncomeHandler::new(deps);
        let raw = serde_json::json!({
            "wallet_id": Uuid::new_v4().to_string(),
            "asset_id": btc_id.to_string(),
            "amount": "1",
            "decimals": 8,
            "usd_rate": "4500000000000",
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
        assert_eq!(entries[1].side, EntrySide::Credit);
        assert_eq!(entries[0].amount, entries[1].amount);
        assert_eq!(entries[0].usd_value.render_integer(), "4500000000000000");
    }

    #[tokio::test]
    async fn rejects_negative_amount() {
        let (deps, btc_id) = deps_with_btc();
        let handler = ManualIncomeHandler::new(deps);
        let raw = serde_json::json!({
            "wallet_id": Uuid::new_v4().to_string(),
            "asset_id": btc_id.to_string(),
            "amount": "-1",
            "decimals": 8,
            "occurred_at": Utc::now().to_rfc3339(),
        });
        let err = handler
            .validate_data(&OperationContext::system(), &raw)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::NegativeAmount);
    }

    #[tokio::test]
    async fn rejects_future_occurred_at() {
        let (deps, btc_id) = deps_with_btc();
        let handler = ManualIncomeHandler::new(deps);
        let raw = serde_json::json!({
            "wallet_id": Uuid::new_v4().to_string(),
            "asset_id": btc_id.to_string(),
            "amount": "1",
            "decimals": 8,
            "occurred_at": (Utc::now() + chrono::Duration::days(1)).to_rfc3339(),
        });
        let err = handler
            .validate_data(&OperationContext::system(), &raw)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::FutureDate);
    }

    #[tokio::test]
    async fn unauthorized_when_caller_is_not_wallet_owner() {
        let (mut deps, btc_id) = deps_with_btc();
        let wallet_id = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let caller = Uuid::new_v4();
        let wallet_dir = Arc::new(InMemoryWalletDirectory::new());
        wallet_dir.set_owner(wallet_id, owner);
        deps.wallets = wallet_dir;
        let handler = ManualIncomeHandler::new(deps);
        let raw = serde_json::json!({
            "wallet_id": wallet_id.to_string(),
            "asset_id": btc_id.to_string(),
            "amount": "1",
            "decimals": 8,
            "occurred_at": Utc::now().to_rfc3339(),
        });
        let err = handler
            .validate_data(&OperationContext::user(caller), &raw)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::Unauthorized);
    }
}
