//! Asset entity (C2's model; spec.md §3 "Asset").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One record per canonical `(symbol, chain)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub symbol: String,
    pub name: String,
    /// Base-unit decimal exponent, 0..=36 (typically 6, 8, or 18).
    pub decimals: u32,
    pub chain: Option<String>,
    pub contract_address: Option<String>,
    /// Correlation key with the external price provider. Unique.
    pub external_key: String,
    pub is_active: bool,
    /// Ordering rank used by `search` (higher ranks first).
    pub rank: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        name: impl Into<String>,
        decimals: u32,
        chain: Option<String>,
        contract_address: Option<String>,
        external_key: impl Into<String>,
        rank: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            name: name.into(),
            decimals,
            chain,
            contract_address,
            external_key: external_key.into(),
            is_active: true,
            rank,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A fixed seed list of top assets inserted idempotently at bootstrap
/// (spec.md §4.2 "Seeding"). Multi-chain stablecoin variants are included
/// deliberately so `get_by_symbol` without a `chain` qualifier exercises
/// the `ambiguous_symbol` path in realistic data.
pub fn seed_assets() -> Vec<Asset> {
    let specs: &[(&str, &str, u32, Option<&str>, &str, i32)] = &[
        ("BTC", "Bitcoin", 8, None, "bitcoin", 100),
        ("ETH", "Ethereum", 18, Some("ethereum"), "ethereum", 99),
        ("SOL", "Solana", 9, Some("solana"), "solana", 98),
        ("MATIC", "Polygon", 18, Some("polygon"), "matic-network", 90),
        ("BNB", "BNB", 18, Some("bsc"), "binancecoin", 95),
        ("USDC", "USD Coin", 6, Some("ethereum"), "usd-coin-ethereum", 80),
        ("USDC", "USD Coin", 6, Some("solana"), "usd-coin-solana", 80),
        ("USDC", "USD Coin", 6, Some("polygon"), "usd-coin-polygon", 80),
        ("USDT", "Tether", 6, Some("ethereum"), "tether-ethereum", 79),
        ("USDT", "Tether", 6, Some("tron"), "tether-tron", 79),
        ("DAI", "Dai", 18, Some("ethereum"), "dai", 70),
        ("DOGE", "Dogecoin", 8, None, "dogecoin", 60),
        ("ADA", "Cardano", 6, None, "cardano", 55),
        ("XRP", "XRP", 6, None, "ripple", 54),
        ("AVAX", "Avalanche", 18, Some("avalanche"), "avalanche-2", 50),
    ];
    specs
        .iter()
        .map(|(symbol, name, decimals, chain, key, rank)| {
            Asset::new(
                *symbol,
                *name,
                *decimals,
                chain.map(|s| s.to_string()),
                None,
                *key,
                *rank,
            )
        })
        .collect()
}
