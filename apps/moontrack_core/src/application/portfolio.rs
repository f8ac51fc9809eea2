//! Portfolio Aggregator (C11): USD-valued roll-up of a user's wallet
//! holdings across every asset they hold (spec.md §4.11).

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::application::account_resolver::AccountRepository;
use crate::application::asset_registry::AssetRegistry;
use crate::application::handler_registry::WalletDirectory;
use crate::application::price_service::PriceService;
use crate::application::validator::BalanceRepository;
use crate::domain::account::AccountType;
use crate::domain::asset::Asset;
use crate::error::LedgerError;
use crate::money::Money;

#[derive(Debug, Clone)]
pub struct AssetHolding {
    pub asset_id: Uuid,
    pub symbol: String,
    pub amount: Money,
    /// Scaled by `10^USD_SCALE_EXPONENT`. Zero when the price lookup
    /// failed (spec.md §4.11 step 5 "failure -> price=0, asset still
    /// included").
    pub price_usd: Money,
    pub usd_value: Money,
}

#[derive(Debug, Clone)]
pub struct WalletHolding {
    pub wallet_id: Uuid,
    pub amount: Money,
    pub usd_value: Money,
}

#[derive(Debug, Clone)]
pub struct PortfolioSummary {
    pub total_usd_value: Money,
    pub unique_asset_count: usize,
    pub holdings: Vec<AssetHolding>,
    /// Per-wallet breakdown of the same holdings (spec.md §4.11, §2 C11).
    pub wallets: Vec<PortfolioWalletBreakdown>,
}

#[derive(Debug, Clone)]
pub struct PortfolioWalletBreakdown {
    pub wallet_id: Uuid,
    pub holdings: Vec<AssetHolding>,
    pub usd_value: Money,
}

#[derive(Debug, Clone)]
pub struct AssetBreakdown {
    pub asset_id: Uuid,
    pub wallets: Vec<WalletHolding>,
}

pub struct PortfolioAggregator {
    wallets: Arc<dyn WalletDirectory>,
    accounts: Arc<dyn AccountRepository>,
    balances: Arc<dyn BalanceRepository>,
    assets: Arc<AssetRegistry>,
    prices: Arc<PriceService>,
}

impl PortfolioAggregator {
    pub fn new(
        wallets: Arc<dyn WalletDirectory>,
        accounts: Arc<dyn AccountRepository>,
        balances: Arc<dyn BalanceRepository>,
        assets: Arc<AssetRegistry>,
        prices: Arc<PriceService>,
    ) -> Self {
        Self {
            wallets,
            accounts,
            balances,
            assets,
            prices,
        }
    }

    /// spec.md §4.11 steps 1-7.
    pub async fn get_portfolio_summary(&self, user_id: Uuid) -> Result<PortfolioSummary, LedgerError> {
        let per_wallet = self.aggregate_wallet_balances(user_id).await?;

        let mut per_asset_totals: HashMap<Uuid, Money> = HashMap::new();
        for asset_balances in per_wallet.values() {
            for (asset_id, amount) in asset_balances {
                per_asset_totals
                    .entry(*asset_id)
                    .and_modify(|acc| *acc = acc.checked_add(amount))
                    .or_insert_with(|| amount.clone());
            }
        }

        let mut asset_cache: HashMap<Uuid, (Asset, Money)> = HashMap::new();
        let mut holdings = Vec::with_capacity(per_asset_totals.len());
        let mut total_usd_value = Money::zero();

        for (asset_id, amount) in &per_asset_totals {
            if amount.is_zero() {
                continue;
            }
            let (asset, price_usd) = self.asset_and_price(*asset_id, &mut asset_cache).await?;
            let usd_value = Money::usd_value(amount, &price_usd, asset.decimals);
            total_usd_value = total_usd_value.checked_add(&usd_value);

            holdings.push(AssetHolding {
                asset_id: *asset_id,
                symbol: asset.symbol,
                amount: amount.clone(),
                price_usd,
                usd_value,
            });
        }

        let mut wallets = Vec::with_capacity(per_wallet.len());
        for (wallet_id, asset_balances) in per_wallet {
            let mut wallet_holdings = Vec::with_capacity(asset_balances.len());
            let mut wallet_usd_value = Money::zero();
            for (asset_id, amount) in asset_balances {
                if amount.is_zero() {
                    continue;
                }
                let (asset, price_usd) = self.asset_and_price(asset_id, &mut asset_cache).await?;
                let usd_value = Money::usd_value(&amount, &price_usd, asset.decimals);
                wallet_usd_value = wallet_usd_value.checked_add(&usd_value);
                wallet_holdings.push(AssetHolding {
                    asset_id,
                    symbol: asset.symbol,
                    amount,
                    price_usd,
                    usd_value,
                });
            }
            if wallet_holdings.is_empty() {
                continue;
            }
            wallets.push(PortfolioWalletBreakdown {
                wallet_id,
                holdings: wallet_holdings,
                usd_value: wallet_usd_value,
            });
        }

        Ok(PortfolioSummary {
            total_usd_value,
            unique_asset_count: holdings.len(),
            holdings,
            wallets,
        })
    }

    /// Caches the asset lookup and price quote for the lifetime of one
    /// summary call; both the per-asset and per-wallet passes price the
    /// same assets repeatedly otherwise.
    async fn asset_and_price(
        &self,
        asset_id: Uuid,
        cache: &mut HashMap<Uuid, (Asset, Money)>,
    ) -> Result<(Asset, Money), LedgerError> {
        if let Some(cached) = cache.get(&asset_id) {
            return Ok(cached.clone());
        }
        let asset = self.assets.get_by_id(asset_id).await?;
        let price_usd = match self.prices.get_current_price(asset_id).await {
            Ok(quote) => quote.price_usd,
            Err(_) => Money::zero(),
        };
        cache.insert(asset_id, (asset.clone(), price_usd.clone()));
        Ok((asset, price_usd))
    }

    /// Per-wallet holdings of a single asset (spec.md §4.11).
    pub async fn get_asset_breakdown(
        &self,
        user_id: Uuid,
        asset_id: Uuid,
    ) -> Result<AssetBreakdown, LedgerError> {
        let asset = self.assets.get_by_id(asset_id).await?;
        let wallet_ids = self.wallets.list_wallets_for_user(user_id).await?;

        let mut wallets = Vec::new();
        for wallet_id in wallet_ids {
            let code = crate::domain::account::wallet_account_code(wallet_id, &asset.symbol);
            let Some(account) = self.accounts.get_by_code(&code).await? else {
                continue;
            };
            let Some(balance) = self.balances.get(account.id, asset_id).await? else {
                continue;
            };
            if balance.balance.is_zero() {
                continue;
            }
            wallets.push(WalletHolding {
                wallet_id,
                amount: balance.balance,
                usd_value: balance.usd_value,
            });
        }

        Ok(AssetBreakdown { asset_id, wallets })
    }

    /// spec.md §4.11 steps 1-4: walk every wallet the user owns, every
    /// `wallet`-typed account under it, and sum balances per asset,
    /// keeping the per-wallet split so the summary can report both the
    /// collapsed totals and each wallet's own breakdown.
    async fn aggregate_wallet_balances(
        &self,
        user_id: Uuid,
    ) -> Result<HashMap<Uuid, HashMap<Uuid, Money>>, LedgerError> {
        let wallet_ids = self.wallets.list_wallets_for_user(user_id).await?;

        let mut per_wallet: HashMap<Uuid, HashMap<Uuid, Money>> = HashMap::new();
        for wallet_id in wallet_ids {
            let accounts = self.wallet_accounts(wallet_id).await?;
            let per_asset = per_wallet.entry(wallet_id).or_default();
            for account in accounts {
                let account_balances = self.balances.list_for_account(account.id).await?;
                for balance in account_balances {
                    per_asset
                        .entry(balance.asset_id)
                        .and_modify(|acc| *acc = acc.checked_add(&balance.balance))
                        .or_insert(balance.balance);
                }
            }
        }
        Ok(per_wallet)
    }

    /// There is no "accounts by wallet_id" repository lookup (spec.md
    /// Non-goals keep wallet/account listing minimal); every active
    /// asset's canonical wallet account code is checked instead, which
    /// is exactly how the Account Resolver derives the same code on
    /// write (spec.md §4.7).
    async fn wallet_accounts(&self, wallet_id: Uuid) -> Result<Vec<crate::domain::account::Account>, LedgerError> {
        let assets = self.assets.list_active().await?;
        let mut accounts = Vec::new();
        for asset in assets {
            let code = crate::domain::account::wallet_account_code(wallet_id, &asset.symbol);
            if let Some(account) = self.accounts.get_by_code(&code).await? {
                if account.account_type == AccountType::Wallet {
                    accounts.push(account);
                }
            }
        }
        Ok(accounts)
    }
}
