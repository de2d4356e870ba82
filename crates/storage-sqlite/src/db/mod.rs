//! Database files, connection pool and migrations.

pub mod write_actor;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sql_types::Text;
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{debug, info};

use checkin_core::Result;

use crate::errors::StorageError;

pub use write_actor::{spawn_writer, WriteHandle};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

pub const CATALOG_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/catalog");
pub const UPLOADS_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/uploads");

/// Name under which the uploads database is attached to catalog connections.
pub const UPLOADS_SCHEMA: &str = "uploads";

const BUSY_TIMEOUT_MS: u64 = 5_000;
const POOL_SIZE: u32 = 4;

/// Locations of the two database files for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbPaths {
    /// Catalog database, scoped to one event.
    pub catalog: PathBuf,
    /// Upload queue database, scoped to the device.
    pub uploads: PathBuf,
}

/// Creates the data directory and returns the database paths for `event_slug`.
pub fn init(data_dir: impl AsRef<Path>, event_slug: &str) -> Result<DbPaths> {
    let data_dir = data_dir.as_ref();
    std::fs::create_dir_all(data_dir).map_err(StorageError::from)?;
    let paths = DbPaths {
        catalog: data_dir.join(format!("catalog-{}.db", file_safe(event_slug))),
        uploads: data_dir.join("uploads.db"),
    };
    debug!(
        "[Storage] Catalog at {}, uploads at {}",
        paths.catalog.display(),
        paths.uploads.display()
    );
    Ok(paths)
}

fn file_safe(slug: &str) -> String {
    slug.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Applies pending migrations to both files, in version order.
/// Already-applied migrations are skipped.
pub fn run_migrations(paths: &DbPaths) -> Result<()> {
    migrate_file(&paths.uploads, UPLOADS_MIGRATIONS)?;
    migrate_file(&paths.catalog, CATALOG_MIGRATIONS)?;
    Ok(())
}

fn migrate_file(path: &Path, migrations: EmbeddedMigrations) -> Result<()> {
    let mut conn = SqliteConnection::establish(&path.to_string_lossy()).map_err(StorageError::from)?;
    let applied = conn
        .run_pending_migrations(migrations)
        .map_err(|err| StorageError::Migration(err.to_string()))?;
    if !applied.is_empty() {
        info!(
            "[Storage] Applied {} migration(s) to {}",
            applied.len(),
            path.display()
        );
    }
    Ok(())
}

/// Per-connection setup: busy timeout, foreign keys, and the uploads
/// database attached so one transaction can span both files.
#[derive(Debug)]
struct ConnectionOptions {
    uploads_path: String,
}

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), r2d2::Error> {
        // Rollback journal: WAL does not commit attached databases atomically.
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}; PRAGMA foreign_keys = ON; PRAGMA journal_mode = DELETE;"
        ))
        .map_err(r2d2::Error::QueryError)?;
        diesel::sql_query(format!("ATTACH DATABASE ? AS {UPLOADS_SCHEMA}"))
            .bind::<Text, _>(&self.uploads_path)
            .execute(conn)
            .map_err(r2d2::Error::QueryError)?;
        Ok(())
    }
}

pub fn create_pool(paths: &DbPaths) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(paths.catalog.to_string_lossy());
    let pool = Pool::builder()
        .max_size(POOL_SIZE)
        .connection_timeout(Duration::from_secs(10))
        .connection_customizer(Box::new(ConnectionOptions {
            uploads_path: paths.uploads.to_string_lossy().into_owned(),
        }))
        .build(manager)
        .map_err(StorageError::from)?;
    Ok(Arc::new(pool))
}

pub fn get_connection(pool: &DbPool) -> Result<DbConnection> {
    Ok(pool.get().map_err(StorageError::from)?)
}

/// Everything a repository needs: pool for reads, writer for writes.
#[derive(Clone)]
pub struct Database {
    pub paths: DbPaths,
    pub pool: Arc<DbPool>,
    pub writer: WriteHandle,
}

impl Database {
    /// Resolves paths, migrates both files and starts the writer.
    pub fn open(data_dir: impl AsRef<Path>, event_slug: &str) -> Result<Self> {
        let paths = init(data_dir, event_slug)?;
        run_migrations(&paths)?;
        let pool = create_pool(&paths)?;
        let writer = spawn_writer(pool.as_ref().clone());
        Ok(Self {
            paths,
            pool,
            writer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(diesel::QueryableByName)]
    struct NameRow {
        #[diesel(sql_type = Text)]
        name: String,
    }

    fn table_names(conn: &mut SqliteConnection, schema: &str) -> Vec<String> {
        diesel::sql_query(format!(
            "SELECT name FROM {schema}.sqlite_master WHERE type = 'table' ORDER BY name"
        ))
        .load::<NameRow>(conn)
        .expect("list tables")
        .into_iter()
        .map(|row| row.name)
        .collect()
    }

    #[test]
    fn slug_is_made_file_safe() {
        assert_eq!(file_safe("democon-2026"), "democon-2026");
        assert_eq!(file_safe("../etc/passwd"), "___etc_passwd");
    }

    #[test]
    fn migrations_are_idempotent_and_uploads_are_attached() {
        let dir = tempdir().expect("tempdir");
        let paths = init(dir.path(), "democon").expect("init");
        run_migrations(&paths).expect("first run");
        run_migrations(&paths).expect("second run is a no-op");

        let pool = create_pool(&paths).expect("pool");
        let mut conn = get_connection(&pool).expect("conn");
        let catalog = table_names(&mut conn, "main");
        let uploads = table_names(&mut conn, UPLOADS_SCHEMA);
        assert!(catalog.contains(&"positions".to_string()));
        assert!(catalog.contains(&"sync_cursors".to_string()));
        assert!(!catalog.contains(&"queued_redemptions".to_string()));
        assert!(uploads.contains(&"queued_redemptions".to_string()));
        assert!(uploads.contains(&"sync_engine_state".to_string()));
    }

    #[test]
    fn uploads_file_is_shared_between_events() {
        let dir = tempdir().expect("tempdir");
        let first = init(dir.path(), "democon").expect("init");
        let second = init(dir.path(), "othercon").expect("init");
        assert_ne!(first.catalog, second.catalog);
        assert_eq!(first.uploads, second.uploads);
    }
}
