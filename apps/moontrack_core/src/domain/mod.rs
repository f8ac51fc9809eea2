//! Domain layer: the entities and value objects of the ledger core.
//!
//! Mirrors the data model in spec.md §3. Entities here carry no
//! persistence or transport concerns; those live in `infrastructure` and
//! the (external, out-of-scope) HTTP layer respectively.

pub mod account;
pub mod asset;
pub mod balance;
pub mod entry;
pub mod price;
pub mod transaction;
