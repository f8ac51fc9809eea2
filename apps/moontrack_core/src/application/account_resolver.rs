//! Account Resolver (C7): turns an entry's `account_code` metadata into
//! a concrete, persisted `Account`, creating it lazily on first
//! reference (spec.md §4.7, §9 "Account creation races").

use async_trait::async_trait;
use serde_json::Value as Json;
use uuid::Uuid;

use crate::domain::account::{parse_account_code, Account, AccountType};
use crate::domain::entry::{Entry, CHAIN_ID_KEY, WALLET_ID_KEY};
use crate::error::LedgerError;

/// Persistence seam for accounts, implemented against Postgres in
/// `infrastructure::database::repositories` and in-memory in tests.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn get_by_code(&self, code: &str) -> Result<Option<Account>, LedgerError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Account>, LedgerError>;

    /// Returns `Err(LedgerError::DuplicateEntity)` on a unique-`code`
    /// conflict; callers must treat that as "someone else won, re-read"
    /// rather than a fatal error.
    async fn create(&self, account: Account) -> Result<Account, LedgerError>;

    /// Every account ever created, for the Reconciler's sweep (spec.md
    /// §4.13). Unbounded by design: the reconciler is a background job,
    /// not a paginated API.
    async fn list_all(&self) -> Result<Vec<Account>, LedgerError>;
}

pub struct AccountResolver {
    repo: std::sync::Arc<dyn AccountRepository>,
}

impl AccountResolver {
    pub fn new(repo: std::sync::Arc<dyn AccountRepository>) -> Self {
        Self { repo }
    }

    /// Resolve every entry's `account_id` in place and return the
    /// resolved `Account` for each, in entry order. `account_code`
    /// remains in metadata afterward for audit (spec.md §4.7).
    pub async fn resolve_all(&self, entries: &mut [Entry]) -> Result<Vec<Account>, LedgerError> {
        let mut accounts = Vec::with_capacity(entries.len());
        for entry in entries.iter_mut() {
            let account = self.resolve_one(entry).await?;
            entry.account_id = Some(account.id);
            accounts.push(account);
        }
        Ok(accounts)
    }

    async fn resolve_one(&self, entry: &Entry) -> Result<Account, LedgerError> {
        let code = entry
            .account_code()
            .ok_or_else(|| LedgerError::InvalidData("entry missing account_code in metadata".to_string()))?;

        if let Some(account) = self.repo.get_by_code(code).await? {
            return Ok(account);
        }

        let parsed = parse_account_code(code)?;
        let new_account = Account {
            id: Uuid::new_v4(),
            code: code.to_string(),
            account_type: parsed.account_type,
            asset_id: entry.asset_id,
            wallet_id: wallet_id_from_entry(entry).or(parsed.wallet_id),
            chain: chain_from_entry(entry).or(parsed.chain),
            created_at: chrono::Utc::now(),
            metadata: Json::Null,
        };

        match self.repo.create(new_account).await {
            Ok(account) => Ok(account),
            Err(LedgerError::DuplicateEntity) => self
                .repo
                .get_by_code(code)
                .await?
                .ok_or_else(|| LedgerError::Internal(format!("account '{code}' vanished after race"))),
            Err(e) => Err(e),
        }
    }
}

fn wallet_id_from_entry(entry: &Entry) -> Option<Uuid> {
    entry
        .metadata
        .get(WALLET_ID_KEY)
        .and_then(Json::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn chain_from_entry(entry: &Entry) -> Option<String> {
    entry
        .metadata
        .get(CHAIN_ID_KEY)
        .and_then(Json::as_str)
        .map(|s| s.to_string())
}
