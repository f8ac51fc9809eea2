//! Price data model (spec.md §3 "PricePoint", §4.3 Price Service).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;

/// `(asset, time)` → `price_usd`, scaled by `10^USD_SCALE_EXPONENT`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub asset_id: Uuid,
    pub time: DateTime<Utc>,
    pub price_usd: Money,
    pub source: String,
    pub volume_24h: Option<Money>,
    pub market_cap: Option<Money>,
}

/// A price accompanied by whether it was served from the stale-cache tier
/// (spec.md §4.3 step 4: "annotating the response as stale").
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub price_usd: Money,
    pub is_stale: bool,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceInterval {
    Raw,
    OneHour,
    OneDay,
    OneWeek,
}

/// A time-bucketed OHLCV sample returned by `get_price_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub bucket_start: DateTime<Utc>,
    pub open: Money,
    pub high: Money,
    pub low: Money,
    pub close: Money,
    pub volume: Option<Money>,
}
