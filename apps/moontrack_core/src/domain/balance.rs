//! Materialized per-`(account, asset)` balance (spec.md §3 "AccountBalance").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account_id: Uuid,
    pub asset_id: Uuid,
    pub balance: Money,
    /// Scaled by `10^USD_SCALE_EXPONENT`, computed at last update against
    /// the then-current price; callers needing a live valuation should
    /// recompute through the Portfolio Aggregator (C11) instead of trusting
    /// this snapshot.
    pub usd_value: Money,
    pub last_updated: DateTime<Utc>,
}

impl AccountBalance {
    pub fn zero(account_id: Uuid, asset_id: Uuid) -> Self {
        Self {
            account_id,
            asset_id,
            balance: Money::zero(),
            usd_value: Money::zero(),
            last_updated: Utc::now(),
        }
    }
}
