//! Asset Registry (C2).
//!
//! Grounded in the teacher's `domain/currency/registry.rs` (a read-mostly,
//! repository-backed lookup service) generalized from currencies to
//! crypto assets per spec.md §4.2.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::asset::Asset;
use crate::error::LedgerError;

/// Persistence seam for assets. Implemented against Postgres in
/// `infrastructure::database::repositories`, and with an in-memory
/// `HashMap` in tests.
#[async_trait]
pub trait AssetRepository: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Asset>, LedgerError>;
    async fn get_all_by_symbol(&self, symbol: &str) -> Result<Vec<Asset>, LedgerError>;
    async fn get_by_external_key(&self, key: &str) -> Result<Option<Asset>, LedgerError>;
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<Asset>, LedgerError>;
    async fn create(&self, asset: Asset) -> Result<Asset, LedgerError>;
    async fn list_active(&self) -> Result<Vec<Asset>, LedgerError>;
}

pub struct AssetRegistry {
    repo: Arc<dyn AssetRepository>,
}

impl AssetRegistry {
    pub fn new(repo: Arc<dyn AssetRepository>) -> Self {
        Self { repo }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Asset, LedgerError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("asset {id}")))
    }

    /// `get_by_symbol(symbol, chain?)`: unique match when `chain` is given;
    /// when omitted, a single match is returned directly, and more than
    /// one match fails with `ambiguous_symbol` (spec.md §4.2, §8 scenario
    /// 7).
    pub async fn get_by_symbol(
        &self,
        symbol: &str,
        chain: Option<&str>,
    ) -> Result<Asset, LedgerError> {
        let candidates = self.repo.get_all_by_symbol(symbol).await?;
        match chain {
            Some(chain) => candidates
                .into_iter()
                .find(|a| a.chain.as_deref() == Some(chain))
                .ok_or_else(|| LedgerError::NotFound(format!("asset {symbol} on {chain}"))),
            None => match candidates.len() {
                0 => Err(LedgerError::NotFound(format!("asset {symbol}"))),
                1 => Ok(candidates.into_iter().next().unwrap()),
                n => Err(LedgerError::AmbiguousSymbol {
                    symbol: symbol.to_string(),
                    candidates: n,
                }),
            },
        }
    }

    pub async fn get_all_by_symbol(&self, symbol: &str) -> Result<Vec<Asset>, LedgerError> {
        self.repo.get_all_by_symbol(symbol).await
    }

    pub async fn get_by_external_key(&self, key: &str) -> Result<Asset, LedgerError> {
        self.repo
            .get_by_external_key(key)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("asset with external_key {key}")))
    }

    /// Substring/prefix match, registry-first, ranked, capped at 10
    /// (spec.md §4.2). Consulting an external provider is not modeled here
    /// (out of scope for the core); a failure to do so upstream must never
    /// be treated as fatal by the caller — local results are always
    /// returned.
    pub async fn search(&self, query: &str) -> Result<Vec<Asset>, LedgerError> {
        self.repo.search(query, 10).await
    }

    pub async fn create(&self, asset: Asset) -> Result<Asset, LedgerError> {
        if self
            .repo
            .get_by_external_key(&asset.external_key)
            .await?
            .is_some()
        {
            return Err(LedgerError::DuplicateEntity);
        }
        let existing_on_chain = self
            .repo
            .get_all_by_symbol(&asset.symbol)
            .await?
            .into_iter()
            .any(|a| a.chain == asset.chain);
        if existing_on_chain {
            return Err(LedgerError::DuplicateEntity);
        }
        self.repo.create(asset).await
    }

    pub async fn list_active(&self) -> Result<Vec<Asset>, LedgerError> {
        self.repo.list_active().await
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use dashmap::DashMap;

    #[derive(Default)]
    pub struct InMemoryAssetRepository {
        by_id: DashMap<Uuid, Asset>,
    }

    impl InMemoryAssetRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, assets: Vec<Asset>) {
            for asset in assets {
                self.by_id.insert(asset.id, asset);
            }
        }
    }

    #[async_trait]
    impl AssetRepository for InMemoryAssetRepository {
        async fn get_by_id(&self, id: Uuid) -> Result<Option<Asset>, LedgerError> {
            Ok(self.by_id.get(&id).map(|a| a.clone()))
        }

        async fn get_all_by_symbol(&self, symbol: &str) -> Result<Vec<Asset>, LedgerError> {
            Ok(self
                .by_id
                .iter()
                .filter(|e| e.symbol == symbol)
                .map(|e| e.clone())
                .collect())
        }

        async fn get_by_external_key(&self, key: &str) -> Result<Option<Asset>, LedgerError> {
            Ok(self
                .by_id
                .iter()
                .find(|e| e.external_key == key)
                .map(|e| e.clone()))
        }

        async fn search(&self, query: &str, limit: u32) -> Result<Vec<Asset>, LedgerError> {
            let query = query.to_lowercase();
            let mut matches: Vec<Asset> = self
                .by_id
                .iter()
                .filter(|e| {
                    e.symbol.to_lowercase().contains(&query)
                        || e.name.to_lowercase().contains(&query)
                })
                .map(|e| e.clone())
                .collect();
            matches.sort_by(|a, b| b.rank.cmp(&a.rank));
            matches.truncate(limit as usize);
            Ok(matches)
        }

        async fn create(&self, asset: Asset) -> Result<Asset, LedgerError> {
            self.by_id.insert(asset.id, asset.clone());
            Ok(asset)
        }

        async fn list_active(&self) -> Result<Vec<Asset>, LedgerError> {
            Ok(self
                .by_id
                .iter()
                .filter(|e| e.is_active)
                .map(|e| e.clone())
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::InMemoryAssetRepository;
    use super::*;
    use crate::domain::asset::seed_assets;

    fn registry_with_seed() -> AssetRegistry {
        let repo = InMemoryAssetRepository::new();
        repo.seed(seed_assets());
        AssetRegistry::new(Arc::new(repo))
    }

    #[tokio::test]
    async fn get_by_symbol_with_chain_is_unique() {
        let registry = registry_with_seed();
        let asset = registry.get_by_symbol("USDC", Some("solana")).await.unwrap();
        assert_eq!(asset.chain.as_deref(), Some("solana"));
    }

    #[tokio::test]
    async fn get_by_symbol_without_chain_is_ambiguous_for_usdc() {
        let registry = registry_with_seed();
        let err = registry.get_by_symbol("USDC", None).await.unwrap_err();
        match err {
            LedgerError::AmbiguousSymbol { symbol, candidates } => {
                assert_eq!(symbol, "USDC");
                assert_eq!(candidates, 3);
            }
            other => panic!("expected AmbiguousSymbol, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_by_symbol_without_chain_returns_unique_single_chain_asset() {
        let registry = registry_with_seed();
        let asset = registry.get_by_symbol("BTC", None).await.unwrap();
        assert_eq!(asset.symbol, "BTC");
    }

    #[tokio::test]
    async fn create_rejects_duplicate_external_key() {
        let registry = registry_with_seed();
        let dup = crate::domain::asset::Asset::new("BTC2", "Bitcoin Clone", 8, None, None, "bitcoin", 1);
        let err = registry.create(dup).await.unwrap_err();
        assert_eq!(err, LedgerError::DuplicateEntity);
    }

    #[tokio::test]
    async fn search_caps_at_ten_and_ranks_descending() {
        let registry = registry_with_seed();
        let results = registry.search("e").await.unwrap();
        assert!(results.len() <= 10);
        for pair in results.windows(2) {
            assert!(pair[0].rank >= pair[1].rank);
        }
    }
}
