//! Operational configuration for the ledger core.
//!
//! Loaded the way `apps/learning_platform_server/src/config.rs` loads
//! `AppConfig`: environment variables under a fixed prefix, layered over
//! hard-coded defaults via `set_override`. Values here resolve the tunables
//! spec.md §9 Open Question 1 leaves unspecified.

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Fresh-cache TTL for current prices, in seconds (spec.md §4.3 tier 1).
    pub price_fresh_ttl_secs: u64,
    /// Stale-cache TTL for current prices, in seconds (spec.md §4.3 tier 4).
    pub price_stale_ttl_secs: u64,
    /// Age threshold under which a stored `PricePoint` counts as "recent"
    /// (spec.md §4.3 tier 2).
    pub price_recent_store_secs: u64,
    /// Consecutive external-provider failures before the circuit opens.
    pub price_circuit_breaker_threshold: u32,
    /// How long the circuit stays open once tripped, in seconds.
    pub price_circuit_breaker_cooldown_secs: u64,
    /// Price updater tick interval, in seconds (spec.md §4.4).
    pub price_updater_interval_secs: u64,
    /// Price updater batch size (spec.md §4.4).
    pub price_updater_batch_size: usize,
    /// Allowed clock skew for `occurred_at <= recorded_at` (spec.md §3).
    pub clock_skew_tolerance_secs: i64,
    /// Server-side cap on `list_transactions` page size (spec.md §4.10).
    pub max_page_size: u32,
    /// Reconciler sweep interval, in seconds (spec.md §4.13).
    pub reconciler_interval_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            price_fresh_ttl_secs: 60,
            price_stale_ttl_secs: 86_400,
            price_recent_store_secs: 300,
            price_circuit_breaker_threshold: 5,
            price_circuit_breaker_cooldown_secs: 60,
            price_updater_interval_secs: 300,
            price_updater_batch_size: 50,
            clock_skew_tolerance_secs: 30,
            max_page_size: 200,
            reconciler_interval_secs: 3_600,
        }
    }
}

impl LedgerConfig {
    /// Build configuration from `MOONTRACK_*` environment variables,
    /// falling back to the defaults above for anything unset.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        config::Config::builder()
            .set_default("price_fresh_ttl_secs", defaults.price_fresh_ttl_secs)?
            .set_default("price_stale_ttl_secs", defaults.price_stale_ttl_secs)?
            .set_default("price_recent_store_secs", defaults.price_recent_store_secs)?
            .set_default(
                "price_circuit_breaker_threshold",
                defaults.price_circuit_breaker_threshold,
            )?
            .set_default(
                "price_circuit_breaker_cooldown_secs",
                defaults.price_circuit_breaker_cooldown_secs,
            )?
            .set_default(
                "price_updater_interval_secs",
                defaults.price_updater_interval_secs,
            )?
            .set_default(
                "price_updater_batch_size",
                defaults.price_updater_batch_size as u64,
            )?
            .set_default(
                "clock_skew_tolerance_secs",
                defaults.clock_skew_tolerance_secs,
            )?
            .set_default("max_page_size", defaults.max_page_size)?
            .set_default("reconciler_interval_secs", defaults.reconciler_interval_secs)?
            .add_source(config::Environment::with_prefix("MOONTRACK"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_recommended_values() {
        let cfg = LedgerConfig::default();
        assert_eq!(cfg.price_fresh_ttl_secs, 60);
        assert_eq!(cfg.price_stale_ttl_secs, 86_400);
        assert_eq!(cfg.max_page_size, 200);
    }
}
