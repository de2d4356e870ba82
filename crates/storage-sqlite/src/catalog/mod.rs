//! Catalog database: synced read model plus the local check-in ledger.

mod ledger;
mod model;
pub(crate) mod queries;
mod repository;

pub use ledger::SqliteRedemptionStore;
pub use repository::CatalogRepository;
