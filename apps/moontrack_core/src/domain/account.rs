//! Account entity and `account_code` grammar (spec.md §3 "Account").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Wallet,
    Income,
    Expense,
    Clearing,
    Gas,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Wallet => "wallet",
            AccountType::Income => "income",
            AccountType::Expense => "expense",
            AccountType::Clearing => "clearing",
            AccountType::Gas => "gas",
        }
    }
}

/// One record per `(account_code, asset)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub code: String,
    pub account_type: AccountType,
    pub asset_id: Uuid,
    pub wallet_id: Option<Uuid>,
    pub chain: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metadata: Json,
}

/// The parsed shape of an `account_code`, derived from its dotted prefix
/// grammar (spec.md §3 "Account" and §4.7 Account Resolver):
///
/// - `wallet.<wallet-id>.<asset-symbol>`
/// - `income.<asset-symbol>`
/// - `expense.<asset-symbol>`
/// - `clearing.<chain>.<asset-symbol>`
/// - `gas.<chain>.<asset-symbol>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAccountCode {
    pub account_type: AccountType,
    pub wallet_id: Option<Uuid>,
    pub chain: Option<String>,
    pub asset_symbol: String,
}

/// Build the canonical code for an owned-asset wallet account.
pub fn wallet_account_code(wallet_id: Uuid, asset_symbol: &str) -> String {
    format!("wallet.{wallet_id}.{asset_symbol}")
}

pub fn income_account_code(asset_symbol: &str) -> String {
    format!("income.{asset_symbol}")
}

pub fn expense_account_code(asset_symbol: &str) -> String {
    format!("expense.{asset_symbol}")
}

pub fn clearing_account_code(chain: &str, asset_symbol: &str) -> String {
    format!("clearing.{chain}.{asset_symbol}")
}

pub fn gas_account_code(chain: &str, asset_symbol: &str) -> String {
    format!("gas.{chain}.{asset_symbol}")
}

/// Parse an `account_code` string into its typed components.
pub fn parse_account_code(code: &str) -> Result<ParsedAccountCode, LedgerError> {
    let mut parts = code.split('.');
    let prefix = parts
        .next()
        .ok_or_else(|| LedgerError::InvalidData(format!("empty account_code '{code}'")))?;

    match prefix {
        "wallet" => {
            let wallet_id_str = parts.next().ok_or_else(|| {
                LedgerError::InvalidData(format!("malformed wallet account_code '{code}'"))
            })?;
            let asset_symbol = parts.next().ok_or_else(|| {
                LedgerError::InvalidData(format!("malformed wallet account_code '{code}'"))
            })?;
            if parts.next().is_some() {
                return Err(LedgerError::InvalidData(format!(
                    "malformed wallet account_code '{code}'"
                )));
            }
            let wallet_id = Uuid::parse_str(wallet_id_str).map_err(|_| {
                LedgerError::InvalidWalletId(format!("'{wallet_id_str}' is not a UUID"))
            })?;
            Ok(ParsedAccountCode {
                account_type: AccountType::Wallet,
                wallet_id: Some(wallet_id),
                chain: None,
                asset_symbol: asset_symbol.to_string(),
            })
        }
        "income" | "expense" => {
            let asset_symbol = parts.next().ok_or_else(|| {
                LedgerError::InvalidData(format!("malformed account_code '{code}'"))
            })?;
            if parts.next().is_some() {
                return Err(LedgerError::InvalidData(format!(
                    "malformed account_code '{code}'"
                )));
            }
            let account_type = if prefix == "income" {
                AccountType::Income
            } else {
                AccountType::Expense
            };
            Ok(ParsedAccountCode {
                account_type,
                wallet_id: None,
                chain: None,
                asset_symbol: asset_symbol.to_string(),
            })
        }
        "clearing" | "gas" => {
            let chain = parts.next().ok_or_else(|| {
                LedgerError::InvalidData(format!("malformed account_code '{code}'"))
            })?;
            let asset_symbol = parts.next().ok_or_else(|| {
                LedgerError::InvalidData(format!("malformed account_code '{code}'"))
            })?;
            if parts.next().is_some() {
                return Err(LedgerError::InvalidData(format!(
                    "malformed account_code '{code}'"
                )));
            }
            let account_type = if prefix == "clearing" {
                AccountType::Clearing
            } else {
                AccountType::Gas
            };
            Ok(ParsedAccountCode {
                account_type,
                wallet_id: None,
                chain: Some(chain.to_string()),
                asset_symbol: asset_symbol.to_string(),
            })
        }
        other => Err(LedgerError::InvalidData(format!(
            "unknown account_code prefix '{other}' in '{code}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wallet_code() {
        let wid = Uuid::new_v4();
        let code = wallet_account_code(wid, "BTC");
        let parsed = parse_account_code(&code).unwrap();
        assert_eq!(parsed.account_type, AccountType::Wallet);
        assert_eq!(parsed.wallet_id, Some(wid));
        assert_eq!(parsed.asset_symbol, "BTC");
    }

    #[test]
    fn parses_income_and_expense_codes() {
        assert_eq!(
            parse_account_code("income.ETH").unwrap().account_type,
            AccountType::Income
        );
        assert_eq!(
            parse_account_code("expense.ETH").unwrap().account_type,
            AccountType::Expense
        );
    }

    #[test]
    fn parses_clearing_and_gas_codes_with_chain() {
        let parsed = parse_account_code("clearing.1.ETH").unwrap();
        assert_eq!(parsed.account_type, AccountType::Clearing);
        assert_eq!(parsed.chain.as_deref(), Some("1"));
        assert_eq!(parsed.asset_symbol, "ETH");

        let parsed = parse_account_code("gas.1.ETH").unwrap();
        assert_eq!(parsed.account_type, AccountType::Gas);
    }

    #[test]
    fn rejects_unknown_prefix() {
        assert!(parse_account_code("savings.BTC").is_err());
    }

    #[test]
    fn rejects_malformed_wallet_code() {
        assert!(parse_account_code("wallet.not-a-uuid.BTC").is_err());
        assert!(parse_account_code("wallet.onlyonepart").is_err());
    }
}
