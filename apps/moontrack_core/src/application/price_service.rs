//! Price Service (C3): layered USD price lookup (spec.md §4.3).
//!
//! Grounded in the teacher's `domain/currency/exchange_rate.rs` (a
//! cached, provider-backed rate lookup with a TTL) generalized to the
//! four-tier cascade spec.md describes: fresh in-memory cache, recent
//! persisted store, external provider (with circuit breaker), then a
//! stale-cache fallback before giving up.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::application::asset_registry::AssetRegistry;
use crate::config::LedgerConfig;
use crate::domain::price::{OhlcvBar, PriceInterval, PricePoint, PriceQuote};
use crate::error::LedgerError;
use crate::infrastructure::price_provider::PriceProvider;
use crate::money::Money;

/// Persistence seam for price points (recent store, history, and the
/// durable record an external fetch gets written into).
#[async_trait]
pub trait PriceRepository: Send + Sync {
    async fn get_latest(&self, asset_id: Uuid) -> Result<Option<PricePoint>, LedgerError>;
    async fn get_at_or_before(
        &self,
        asset_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<PricePoint>, LedgerError>;
    async fn get_range(
        &self,
        asset_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, LedgerError>;
    async fn insert(&self, point: PricePoint) -> Result<(), LedgerError>;
}

struct CachedQuote {
    quote: PriceQuote,
    cached_at: DateTime<Utc>,
}

/// Fresh in-memory cache plus the recent-store/provider/stale cascade
/// (spec.md §4.3 steps 1-4).
pub struct PriceService {
    repo: Arc<dyn PriceRepository>,
    provider: Arc<dyn PriceProvider>,
    assets: Arc<AssetRegistry>,
    config: LedgerConfig,
    fresh_cache: DashMap<Uuid, CachedQuote>,
}

impl PriceService {
    pub fn new(
        repo: Arc<dyn PriceRepository>,
        provider: Arc<dyn PriceProvider>,
        assets: Arc<AssetRegistry>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            repo,
            provider,
            assets,
            config,
            fresh_cache: DashMap::new(),
        }
    }

    fn fresh_ttl(&self) -> Duration {
        Duration::from_secs(self.config.price_fresh_ttl_secs)
    }

    fn recent_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.config.price_recent_store_secs as i64)
    }

    fn stale_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.config.price_stale_ttl_secs as i64)
    }

    fn check_fresh_cache(&self, asset_id: Uuid) -> Option<PriceQuote> {
        let entry = self.fresh_cache.get(&asset_id)?;
        let age = Utc::now().signed_duration_since(entry.cached_at);
        if age <= chrono::Duration::from_std(self.fresh_ttl()).unwrap_or_default() {
            Some(entry.quote.clone())
        } else {
            None
        }
    }

    fn store_fresh_cache(&self, asset_id: Uuid, quote: PriceQuote) {
        self.fresh_cache.insert(
            asset_id,
            CachedQuote {
                quote,
                cached_at: Utc::now(),
            },
        );
    }

    /// spec.md §4.3: tier 1 fresh cache, tier 2 recent store, tier 3
    /// external provider (persisted on success, then cached), tier 4
    /// stale cache, else `price_unavailable`.
    pub async fn get_current_price(&self, asset_id: Uuid) -> Result<PriceQuote, LedgerError> {
        if let Some(quote) = self.check_fresh_cache(asset_id) {
            return Ok(quote);
        }

        if let Some(point) = self.repo.get_latest(asset_id).await? {
            let age = Utc::now().signed_duration_since(point.time);
            if age <= self.recent_window() {
                let quote = PriceQuote {
                    price_usd: point.price_usd,
                    is_stale: false,
                    as_of: point.time,
                };
                self.store_fresh_cache(asset_id, quote.clone());
                return Ok(quote);
            }
        }

        let asset = self.assets.get_by_id(asset_id).await?;
        let fetched = self
            .provider
            .get_current_prices(std::slice::from_ref(&asset.external_key))
            .await;

        if let Ok(prices) = fetched {
            if let Some((_, price_usd)) = prices.into_iter().find(|(k, _)| *k == asset.external_key)
            {
                let now = Utc::now();
                let point = PricePoint {
                    asset_id,
                    time: now,
                    price_usd: price_usd.clone(),
                    source: "external".to_string(),
                    volume_24h: None,
                    market_cap: None,
                };
                self.repo.insert(point).await?;
                let quote = PriceQuote {
                    price_usd,
                    is_stale: false,
                    as_of: now,
                };
                self.store_fresh_cache(asset_id, quote.clone());
                return Ok(quote);
            }
        }

        if let Some(point) = self.repo.get_latest(asset_id).await? {
            let age = Utc::now().signed_duration_since(point.time);
            if age <= self.stale_window() {
                return Ok(PriceQuote {
                    price_usd: point.price_usd,
                    is_stale: true,
                    as_of: point.time,
                });
            }
        }

        Err(LedgerError::PriceUnavailable(asset_id))
    }

    /// Batch wrapper: lookups are independent, a failure for one asset
    /// never aborts the others (spec.md §4.3: "callers needing many
    /// prices at once should not pay for N round trips nor let one
    /// missing price blank out the whole batch").
    pub async fn get_prices(&self, asset_ids: &[Uuid]) -> Vec<(Uuid, Result<PriceQuote, LedgerError>)> {
        let mut out = Vec::with_capacity(asset_ids.len());
        for &id in asset_ids {
            out.push((id, self.get_current_price(id).await));
        }
        out
    }

    /// Point-in-time lookup for transaction pricing (spec.md §4.3:
    /// "the latest point at or before the requested time"). Never
    /// consults the external provider — historical data that was never
    /// recorded cannot be backfilled from a spot-price endpoint.
    pub async fn get_price_at(
        &self,
        asset_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Money, LedgerError> {
        self.repo
            .get_at_or_before(asset_id, at)
            .await?
            .map(|p| p.price_usd)
            .ok_or(LedgerError::PriceUnavailable(asset_id))
    }

    /// OHLCV history bucketed by `interval` (spec.md §4.3 "history
    /// endpoint"). `Raw` returns unbucketed points re-expressed as
    /// degenerate bars (open=high=low=close).
    pub async fn get_price_history(
        &self,
        asset_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        interval: PriceInterval,
    ) -> Result<Vec<OhlcvBar>, LedgerError> {
        let points = self.repo.get_range(asset_id, from, to).await?;
        if matches!(interval, PriceInterval::Raw) {
            return Ok(points
                .into_iter()
                .map(|p| OhlcvBar {
                    bucket_start: p.time,
                    open: p.price_usd.clone(),
                    high: p.price_usd.clone(),
                    low: p.price_usd.clone(),
                    close: p.price_usd.clone(),
                    volume: p.volume_24h,
                })
                .collect());
        }

        let bucket_secs: i64 = match interval {
            PriceInterval::OneHour => 3600,
            PriceInterval::OneDay => 86_400,
            PriceInterval::OneWeek => 604_800,
            PriceInterval::Raw => unreachable!(),
        };

        let mut buckets: Vec<(DateTime<Utc>, Vec<PricePoint>)> = Vec::new();
        for point in points {
            let bucket_start_ts = (point.time.timestamp() / bucket_secs) * bucket_secs;
            let bucket_start = DateTime::from_timestamp(bucket_start_ts, 0).unwrap_or(point.time);
            match buckets.last_mut() {
                Some((start, items)) if *start == bucket_start => items.push(point),
                _ => buckets.push((bucket_start, vec![point])),
            }
        }

        Ok(buckets
            .into_iter()
            .map(|(bucket_start, mut items)| {
                items.sort_by_key(|p| p.time);
                let open = items.first().unwrap().price_usd.clone();
                let close = items.last().unwrap().price_usd.clone();
                let high = items
                    .iter()
                    .map(|p| &p.price_usd)
                    .max()
                    .cloned()
                    .unwrap_or_else(|| open.clone());
                let low = items
                    .iter()
                    .map(|p| &p.price_usd)
                    .min()
                    .cloned()
                    .unwrap_or_else(|| open.clone());
                OhlcvBar {
                    bucket_start,
                    open,
                    high,
                    low,
                    close,
                    volume: None,
                }
            })
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use dashmap::DashMap as Map;

    #[derive(Default)]
    pub struct InMemoryPriceRepository {
        points: Map<Uuid, Vec<PricePoint>>,
    }

    impl InMemoryPriceRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl PriceRepository for InMemoryPriceRepository {
        async fn get_latest(&self, asset_id: Uuid) -> Result<Option<PricePoint>, LedgerError> {
            Ok(self
                .points
                .get(&asset_id)
                .and_then(|v| v.iter().max_by_key(|p| p.time).cloned()))
        }

        async fn get_at_or_before(
            &self,
            asset_id: Uuid,
            at: DateTime<Utc>,
        ) -> Result<Option<PricePoint>, LedgerError> {
            Ok(self.points.get(&asset_id).and_then(|v| {
                v.iter()
                    .filter(|p| p.time <= at)
                    .max_by_key(|p| p.time)
                    .cloned()
            }))
        }

        async fn get_range(
            &self,
            asset_id: Uuid,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<PricePoint>, LedgerError> {
            Ok(self
                .points
                .get(&asset_id)
                .map(|v| {
                    v.iter()
                        .filter(|p| p.time >= from && p.time <= to)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn insert(&self, point: PricePoint) -> Result<(), LedgerError> {
            self.points.entry(point.asset_id).or_default().push(point);
            Ok(())
        }
    }
}
