//! External price provider adapter (spec.md §4.3 step 3).
//!
//! Grounded directly in
//! `apps/personal-finance/src/infrastructure/services/treasury_service.rs`:
//! a `reqwest::Client` wrapped in a config struct implementing a narrow
//! trait, with a hand-written `Mock*` sibling for tests, rather than a
//! mocking-framework-generated double.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::domain::price::PricePoint;
use crate::error::LedgerError;
use crate::money::Money;

/// The capability set spec.md §4.3 requires of the external provider:
/// current price for many assets, and historical price at a date.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn get_current_prices(
        &self,
        asset_external_keys: &[String],
    ) -> Result<Vec<(String, Money)>, LedgerError>;

    async fn get_historical_price(
        &self,
        asset_external_key: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Money>, LedgerError>;
}

#[derive(Debug, Clone)]
pub struct HttpPriceProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

/// A simple consecutive-failure-count circuit breaker (spec.md §4.3:
/// "after N consecutive failures within a window, skip step 3 and go
/// straight to step 4 for M seconds"). Owned by the provider wrapper
/// rather than the Price Service, so any outbound adapter can reuse it.
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<CircuitState>,
}

#[derive(Debug, Clone, Copy)]
struct CircuitState {
    consecutive_failures: u32,
    open_until: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            state: Mutex::new(CircuitState {
                consecutive_failures: 0,
                open_until: None,
            }),
        }
    }

    pub fn is_open(&self) -> bool {
        let state = self.state.lock();
        match state.open_until {
            Some(until) => Utc::now() < until,
            None => false,
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = 0;
        state.open_until = None;
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.threshold {
            state.open_until = Some(
                Utc::now()
                    + chrono::Duration::from_std(self.cooldown)
                        .unwrap_or_else(|_| chrono::Duration::seconds(60)),
            );
        }
    }
}

/// HTTP implementation of `PriceProvider`.
pub struct HttpPriceProvider {
    client: reqwest::Client,
    config: HttpPriceProviderConfig,
    breaker: Arc<CircuitBreaker>,
}

impl HttpPriceProvider {
    pub fn new(config: HttpPriceProviderConfig, breaker: Arc<CircuitBreaker>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            config,
            breaker,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl PriceProvider for HttpPriceProvider {
    async fn get_current_prices(
        &self,
        asset_external_keys: &[String],
    ) -> Result<Vec<(String, Money)>, LedgerError> {
        if self.breaker.is_open() {
            return Err(LedgerError::Internal(
                "price provider circuit is open".to_string(),
            ));
        }

        let response = self
            .client
            .get(format!("{}/api/v1/prices/current", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .query(&[("ids", asset_external_keys.join(","))])
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                self.breaker.record_failure();
                return Err(LedgerError::Internal(e.to_string()));
            }
        };

        if !response.status().is_success() {
            self.breaker.record_failure();
            return Err(LedgerError::Internal(format!(
                "price provider error: {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LedgerError::Internal(e.to_string()))?;

        let prices = body
            .as_object()
            .ok_or_else(|| LedgerError::Internal("invalid price provider response".to_string()))?
            .iter()
            .filter_map(|(key, value)| {
                let usd = value.get("usd")?.as_str()?;
                Money::parse_integer(usd).ok().map(|m| (key.clone(), m))
            })
            .collect();

        self.breaker.record_success();
        Ok(prices)
    }

    async fn get_historical_price(
        &self,
        asset_external_key: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Money>, LedgerError> {
        if self.breaker.is_open() {
            return Err(LedgerError::Internal(
                "price provider circuit is open".to_string(),
            ));
        }

        let response = self
            .client
            .get(format!(
                "{}/api/v1/prices/history/{asset_external_key}",
                self.config.base_url
            ))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .query(&[("at", at.to_rfc3339())])
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                self.breaker.record_failure();
                return Err(LedgerError::Internal(e.to_string()));
            }
        };

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            self.breaker.record_success();
            return Ok(None);
        }

        if !response.status().is_success() {
            self.breaker.record_failure();
            return Err(LedgerError::Internal(format!(
                "price provider error: {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LedgerError::Internal(e.to_string()))?;

        self.breaker.record_success();
        let price = body
            .get("usd")
            .and_then(|v| v.as_str())
            .and_then(|s| Money::parse_integer(s).ok());
        Ok(price)
    }
}

/// Build a `PricePoint` from a provider-sourced quote, for callers that
/// persist the result of a successful external fetch.
pub fn price_point_from_external(asset_id: Uuid, price_usd: Money, time: DateTime<Utc>) -> PricePoint {
    PricePoint {
        asset_id,
        time,
        price_usd,
        source: "external".to_string(),
        volume_24h: None,
        market_cap: None,
    }
}

/// Mock provider for development and tests, modeled on the teacher's
/// `MockTreasuryService`.
pub struct MockPriceProvider {
    pub prices: Mutex<std::collections::HashMap<String, Money>>,
    pub fail: Mutex<bool>,
}

impl MockPriceProvider {
    pub fn new() -> Self {
        Self {
            prices: Mutex::new(std::collections::HashMap::new()),
            fail: Mutex::new(false),
        }
    }

    pub fn set_price(&self, external_key: &str, price: Money) {
        self.prices.lock().insert(external_key.to_string(), price);
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock() = fail;
    }
}

impl Default for MockPriceProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceProvider for MockPriceProvider {
    async fn get_current_prices(
        &self,
        asset_external_keys: &[String],
    ) -> Result<Vec<(String, Money)>, LedgerError> {
        if *self.fail.lock() {
            return Err(LedgerError::Internal("mock provider failure".to_string()));
        }
        let prices = self.prices.lock();
        Ok(asset_external_keys
            .iter()
            .filter_map(|key| prices.get(key).map(|p| (key.clone(), p.clone())))
            .collect())
    }

    async fn get_historical_price(
        &self,
        asset_external_key: &str,
        _at: DateTime<Utc>,
    ) -> Result<Option<Money>, LedgerError> {
        if *self.fail.lock() {
            return Err(LedgerError::Internal("mock provider failure".to_string()));
        }
        Ok(self.prices.lock().get(asset_external_key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn breaker_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, StdDuration::from_secs(60));
        assert!(!breaker.is_open());
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
        breaker.record_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn breaker_resets_on_success() {
        let breaker = CircuitBreaker::new(2, StdDuration::from_secs(60));
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert!(!breaker.is_open());
    }

    #[tokio::test]
    async fn mock_provider_returns_seeded_prices() {
        let provider = MockPriceProvider::new();
        provider.set_price("bitcoin", Money::parse_integer("4000000000000").unwrap());
        let result = provider
            .get_current_prices(&["bitcoin".to_string()])
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].0, "bitcoin");
    }

    #[tokio::test]
    async fn mock_provider_can_simulate_failure() {
        let provider = MockPriceProvider::new();
        provider.set_failing(true);
        let result = provider.get_current_prices(&["bitcoin".to_string()]).await;
        assert!(result.is_err());
    }
}
