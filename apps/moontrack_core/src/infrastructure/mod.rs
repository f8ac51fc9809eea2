//! Infrastructure layer: adapters to Postgres and to the external price
//! provider. Everything the core treats as an external collaborator
//! (HTTP transport, auth, wallet CRUD, connection pooling beyond a plain
//! `sqlx::PgPool`) lives outside this crate entirely.

pub mod database;
pub mod price_provider;
