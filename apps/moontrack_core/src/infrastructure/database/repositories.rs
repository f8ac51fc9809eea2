//! Postgres repositories (spec.md §3 data model, §4.7-§4.9, §4.13).
//!
//! Written in the teacher's non-macro `sqlx::query_as::<_, Row>(...)` /
//! `sqlx::query(...)` style (`repositories/media_repository.rs`) rather
//! than the compile-time-checked `query!`/`query_as!` macros the
//! majority of the teacher's other repositories use — those macros need
//! a live database or an offline `.sqlx` cache to type-check at all,
//! neither of which this workspace carries.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction as PgTransaction};
use uuid::Uuid;

use crate::application::account_resolver::AccountRepository;
use crate::application::asset_registry::AssetRepository;
use crate::application::committer::TransactionRepository;
use crate::application::price_service::PriceRepository;
use crate::application::validator::BalanceRepository;
use crate::domain::account::Account;
use crate::domain::asset::Asset;
use crate::domain::balance::AccountBalance;
use crate::domain::entry::Entry;
use crate::domain::price::PricePoint;
use crate::domain::transaction::{Transaction, TransactionFilters, TransactionStatus};
use crate::error::LedgerError;
use crate::money::Money;

use super::models::{AccountRow, AssetRow, BalanceRow, EntryRow, PriceRow, TransactionRow};

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

pub struct PostgresAssetRepository {
    pool: PgPool,
}

impl PostgresAssetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetRepository for PostgresAssetRepository {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Asset>, LedgerError> {
        let row = sqlx::query_as::<_, AssetRow>("SELECT * FROM assets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AssetRow::into_domain))
    }

    async fn get_all_by_symbol(&self, symbol: &str) -> Result<Vec<Asset>, LedgerError> {
        let rows = sqlx::query_as::<_, AssetRow>("SELECT * FROM assets WHERE symbol = $1")
            .bind(symbol)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AssetRow::into_domain).collect())
    }

    async fn get_by_external_key(&self, key: &str) -> Result<Option<Asset>, LedgerError> {
        let row = sqlx::query_as::<_, AssetRow>("SELECT * FROM assets WHERE external_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AssetRow::into_domain))
    }

    async fn search(&self, query: &str, limit: u32) -> Result<Vec<Asset>, LedgerError> {
        let pattern = format!("%{query}%");
        let rows = sqlx::query_as::<_, AssetRow>(
            "SELECT * FROM assets WHERE symbol ILIKE $1 OR name ILIKE $1 ORDER BY rank DESC LIMIT $2",
        )
        .bind(pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AssetRow::into_domain).collect())
    }

    async fn create(&self, asset: Asset) -> Result<Asset, LedgerError> {
        let row = AssetRow::from_domain(&asset);
        let result = sqlx::query(
            r#"
            INSERT INTO assets
                (id, symbol, name, decimals, chain, contract_address, external_key, is_active, rank, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(row.id)
        .bind(&row.symbol)
        .bind(&row.name)
        .bind(row.decimals)
        .bind(&row.chain)
        .bind(&row.contract_address)
        .bind(&row.external_key)
        .bind(row.is_active)
        .bind(row.rank)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(asset),
            Err(e) if is_unique_violation(&e) => Err(LedgerError::DuplicateEntity),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_active(&self) -> Result<Vec<Asset>, LedgerError> {
        let rows = sqlx::query_as::<_, AssetRow>("SELECT * FROM assets WHERE is_active ORDER BY rank DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AssetRow::into_domain).collect())
    }
}

pub struct PostgresAccountRepository {
    pool: PgPool,
}

impl PostgresAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn get_by_code(&self, code: &str) -> Result<Option<Account>, LedgerError> {
        let row = sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AccountRow::into_domain).transpose()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Account>, LedgerError> {
        let row = sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AccountRow::into_domain).transpose()
    }

    /// A unique-`code` conflict here means another request already
    /// created this lazily-materialized account; the caller re-reads
    /// rather than treating it as fatal (spec.md §4.7).
    async fn create(&self, account: Account) -> Result<Account, LedgerError> {
        let row = AccountRow::from_domain(&account);
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (id, code, account_type, asset_id, wallet_id, chain, created_at, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(row.id)
        .bind(&row.code)
        .bind(&row.account_type)
        .bind(row.asset_id)
        .bind(row.wallet_id)
        .bind(&row.chain)
        .bind(row.created_at)
        .bind(&row.metadata)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(account),
            Err(e) if is_unique_violation(&e) => Err(LedgerError::DuplicateEntity),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_all(&self) -> Result<Vec<Account>, LedgerError> {
        let rows = sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AccountRow::into_domain).collect()
    }
}

pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn entries_for(&self, transaction_id: Uuid) -> Result<Vec<Entry>, LedgerError> {
        let rows = sqlx::query_as::<_, EntryRow>(
            "SELECT * FROM entries WHERE transaction_id = $1 ORDER BY created_at",
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(EntryRow::into_domain).collect()
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    /// The `(source, external_id)` uniqueness index only covers
    /// `status = 'completed'` rows (a partial unique index), so a
    /// `failed` audit row never collides with a prior successful commit
    /// or with another failed attempt at the same idempotency key
    /// (spec.md §4.10 "Failed transactions are persisted... does not
    /// participate in the idempotency check").
    async fn insert(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        let row = TransactionRow::from_domain(transaction);
        let result = sqlx::query(
            r#"
            INSERT INTO transactions
                (id, transaction_type, source, external_id, status, version, occurred_at, recorded_at, raw_data, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(row.id)
        .bind(&row.transaction_type)
        .bind(&row.source)
        .bind(&row.external_id)
        .bind(&row.status)
        .bind(row.version)
        .bind(row.occurred_at)
        .bind(row.recorded_at)
        .bind(&row.raw_data)
        .bind(&row.error_message)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(LedgerError::Duplicate),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_entries(&self, entries: &[Entry]) -> Result<(), LedgerError> {
        for entry in entries {
            let row = EntryRow::from_domain(entry);
            sqlx::query(
                r#"
                INSERT INTO entries
                    (id, transaction_id, account_id, side, entry_type, amount, asset_id, usd_rate, usd_value, occurred_at, created_at, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(row.id)
            .bind(row.transaction_id)
            .bind(row.account_id)
            .bind(&row.side)
            .bind(&row.entry_type)
            .bind(&row.amount)
            .bind(row.asset_id)
            .bind(&row.usd_rate)
            .bind(&row.usd_value)
            .bind(row.occurred_at)
            .bind(row.created_at)
            .bind(&row.metadata)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn find_by_source_and_external_id(
        &self,
        source: &str,
        external_id: &str,
    ) -> Result<Option<Transaction>, LedgerError> {
        let row = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM transactions WHERE source = $1 AND external_id = $2 AND status = 'completed'",
        )
        .bind(source)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else { return Ok(None) };
        let id = row.id;
        let mut transaction = row.into_domain()?;
        transaction.entries = self.entries_for(id).await?;
        Ok(Some(transaction))
    }

    async fn insert_failed(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        self.insert(transaction).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Transaction>, LedgerError> {
        let row = sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let mut transaction = row.into_domain()?;
        transaction.entries = self.entries_for(id).await?;
        Ok(Some(transaction))
    }

    /// Builds a dynamic `WHERE` clause from whichever filters are set,
    /// ordered by `occurred_at` descending. Returns every matching row;
    /// `LedgerService::list_transactions` applies the `page`/`page_size`
    /// window in memory, the same contract the in-memory mock fulfills.
    async fn list(&self, filters: &TransactionFilters) -> Result<Vec<Transaction>, LedgerError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT t.* FROM transactions t LEFT JOIN entries e ON e.transaction_id = t.id WHERE 1 = 1",
        );

        if let Some(ty) = &filters.transaction_type {
            qb.push(" AND t.transaction_type = ").push_bind(ty.clone());
        }
        if let Some(status) = filters.status {
            let status_str = match status {
                TransactionStatus::Completed => "completed",
                TransactionStatus::Failed => "failed",
            };
            qb.push(" AND t.status = ").push_bind(status_str);
        }
        if let Some(from) = filters.from {
            qb.push(" AND t.occurred_at >= ").push_bind(from);
        }
        if let Some(to) = filters.to {
            qb.push(" AND t.occurred_at <= ").push_bind(to);
        }
        if let Some(wallet_id) = filters.wallet_id {
            qb.push(" AND e.metadata->>'wallet_id' = ").push_bind(wallet_id.to_string());
        }
        if let Some(asset_id) = filters.asset_id {
            qb.push(" AND e.asset_id = ").push_bind(asset_id);
        }

        qb.push(" GROUP BY t.id ORDER BY t.occurred_at DESC");

        let rows = qb.build_query_as::<TransactionRow>().fetch_all(&self.pool).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            let mut transaction = row.into_domain()?;
            transaction.entries = self.entries_for(id).await?;
            out.push(transaction);
        }
        Ok(out)
    }

    async fn list_entries_for_account_asset(
        &self,
        account_id: Uuid,
        asset_id: Uuid,
    ) -> Result<Vec<Entry>, LedgerError> {
        let rows = sqlx::query_as::<_, EntryRow>(
            "SELECT * FROM entries WHERE account_id = $1 AND asset_id = $2 ORDER BY created_at",
        )
        .bind(account_id)
        .bind(asset_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(EntryRow::into_domain).collect()
    }
}

pub struct PostgresPriceRepository {
    pool: PgPool,
}

impl PostgresPriceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PriceRepository for PostgresPriceRepository {
    async fn get_latest(&self, asset_id: Uuid) -> Result<Option<PricePoint>, LedgerError> {
        let row = sqlx::query_as::<_, PriceRow>(
            "SELECT * FROM prices WHERE asset_id = $1 ORDER BY time DESC LIMIT 1",
        )
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PriceRow::into_domain).transpose()
    }

    async fn get_at_or_before(&self, asset_id: Uuid, at: DateTime<Utc>) -> Result<Option<PricePoint>, LedgerError> {
        let row = sqlx::query_as::<_, PriceRow>(
            "SELECT * FROM prices WHERE asset_id = $1 AND time <= $2 ORDER BY time DESC LIMIT 1",
        )
        .bind(asset_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PriceRow::into_domain).transpose()
    }

    async fn get_range(&self, asset_id: Uuid, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<PricePoint>, LedgerError> {
        let rows = sqlx::query_as::<_, PriceRow>(
            "SELECT * FROM prices WHERE asset_id = $1 AND time >= $2 AND time <= $3 ORDER BY time ASC",
        )
        .bind(asset_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PriceRow::into_domain).collect()
    }

    async fn insert(&self, point: PricePoint) -> Result<(), LedgerError> {
        let row = PriceRow::from_domain(&point);
        sqlx::query(
            r#"
            INSERT INTO prices (asset_id, time, price_usd, source, volume_24h, market_cap)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (asset_id, time) DO UPDATE SET
                price_usd = EXCLUDED.price_usd,
                source = EXCLUDED.source,
                volume_24h = EXCLUDED.volume_24h,
                market_cap = EXCLUDED.market_cap
            "#,
        )
        .bind(row.asset_id)
        .bind(row.time)
        .bind(&row.price_usd)
        .bind(&row.source)
        .bind(&row.volume_24h)
        .bind(&row.market_cap)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Balances are the one repository that needs a lock held across two
/// trait calls (`lock_for_update` then `upsert`), since the Validator
/// (C8) and Committer (C9) are separate collaborators operating on the
/// same storage transaction (spec.md §5 "exclusive lock held from the
/// read-for-update through the upsert, released at commit"). The open
/// `sqlx::Transaction` is parked here, keyed by `(account_id, asset_id)`,
/// between the two calls — there is exactly one in flight per key at a
/// time because the Validator locks keys in a fixed sorted order and the
/// Committer drains them in the same order.
pub struct PostgresBalanceRepository {
    pool: PgPool,
    in_flight: Mutex<HashMap<(Uuid, Uuid), PgTransaction<'static>>>,
}

impl PostgresBalanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            in_flight: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl BalanceRepository for PostgresBalanceRepository {
    async fn lock_for_update(&self, account_id: Uuid, asset_id: Uuid) -> Result<Money, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, BalanceRow>(
            "SELECT * FROM balances WHERE account_id = $1 AND asset_id = $2 FOR UPDATE",
        )
        .bind(account_id)
        .bind(asset_id)
        .fetch_optional(&mut *tx)
        .await?;

        let balance = match row {
            Some(row) => row.into_domain()?.balance,
            None => Money::zero(),
        };

        self.in_flight.lock().insert((account_id, asset_id), tx);
        Ok(balance)
    }

    async fn upsert(
        &self,
        account_id: Uuid,
        asset_id: Uuid,
        new_balance: Money,
        usd_value: Money,
    ) -> Result<(), LedgerError> {
        let tx = self.in_flight.lock().remove(&(account_id, asset_id));
        let mut tx = match tx {
            Some(tx) => tx,
            // No prior `lock_for_update` in this process (e.g. a retry
            // after a crash) — open a fresh transaction rather than fail.
            None => self.pool.begin().await?,
        };

        sqlx::query(
            r#"
            INSERT INTO balances (account_id, asset_id, balance, usd_value, last_updated)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (account_id, asset_id) DO UPDATE SET
                balance = EXCLUDED.balance,
                usd_value = EXCLUDED.usd_value,
                last_updated = now()
            "#,
        )
        .bind(account_id)
        .bind(asset_id)
        .bind(new_balance.render_integer())
        .bind(usd_value.render_integer())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, account_id: Uuid, asset_id: Uuid) -> Result<Option<AccountBalance>, LedgerError> {
        let row = sqlx::query_as::<_, BalanceRow>("SELECT * FROM balances WHERE account_id = $1 AND asset_id = $2")
            .bind(account_id)
            .bind(asset_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(BalanceRow::into_domain).transpose()
    }

    async fn list_for_account(&self, account_id: Uuid) -> Result<Vec<AccountBalance>, LedgerError> {
        let rows = sqlx::query_as::<_, BalanceRow>("SELECT * FROM balances WHERE account_id = $1")
            .bind(account_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(BalanceRow::into_domain).collect()
    }
}

/// Constructs all five repositories over one shared pool, for wiring at
/// composition time (`main`/test harness), the same grouping shape the
/// teacher's service-builder functions use.
pub fn build_repositories(
    pool: PgPool,
) -> (
    Arc<dyn AssetRepository>,
    Arc<dyn AccountRepository>,
    Arc<dyn TransactionRepository>,
    Arc<dyn BalanceRepository>,
    Arc<dyn PriceRepository>,
) {
    (
        Arc::new(PostgresAssetRepository::new(pool.clone())),
        Arc::new(PostgresAccountRepository::new(pool.clone())),
        Arc::new(PostgresTransactionRepository::new(pool.clone())),
        Arc::new(PostgresBalanceRepository::new(pool.clone())),
        Arc::new(PostgresPriceRepository::new(pool)),
    )
}
