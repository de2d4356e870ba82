//! SQLite storage for the check-in client.
//!
//! Two files per device: a catalog database per event and one uploads
//! database shared by every event. Reads go through the r2d2 pool; writes go
//! through the single writer in [`db::write_actor`].

pub mod catalog;
pub mod db;
pub mod errors;
pub mod schema;
pub mod uploads;

pub use catalog::{CatalogRepository, SqliteRedemptionStore};
pub use db::{create_pool, get_connection, init, run_migrations, spawn_writer, Database, DbPaths, DbPool, WriteHandle};
pub use errors::StorageError;
pub use uploads::UploadsRepository;
