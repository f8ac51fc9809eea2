pub mod models;
pub mod repositories;

pub use repositories::{
    build_repositories, PostgresAccountRepository, PostgresAssetRepository, PostgresBalanceRepository,
    PostgresPriceRepository, PostgresTransactionRepository,
};
