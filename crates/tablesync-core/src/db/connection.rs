//! Database connection management

use crate::config::StoreLocation;
use crate::error::Result;
use libsql::{Builder, Connection, Database as LibSqlDatabase};

use super::tables::{self, StoreRole};

/// Database wrapper for libSQL connections
///
/// Opening never changes the schema. Call [`Database::prepare`] (or use
/// [`Database::open_prepared`]) to create the replicated table.
pub struct Database {
    // Keeps the libSQL handle alive for as long as the connection is used
    _db: LibSqlDatabase,
    conn: Connection,
    location: StoreLocation,
}

impl Database {
    /// Open the store at `location`, creating a local file if it doesn't exist
    pub async fn open(location: &StoreLocation) -> Result<Self> {
        let db = match location {
            StoreLocation::Local(path) => {
                let path_str = path.to_string_lossy().to_string();
                Builder::new_local(&path_str).build().await?
            }
            StoreLocation::Memory => Builder::new_local(":memory:").build().await?,
            StoreLocation::Remote { url, auth_token } => {
                Builder::new_remote(url.clone(), auth_token.clone())
                    .build()
                    .await?
            }
        };
        let conn = db.connect()?;

        let database = Self {
            _db: db,
            conn,
            location: location.clone(),
        };
        database.configure().await?;
        tracing::debug!("Opened store {location}");
        Ok(database)
    }

    /// Open the store and create the tables `role` needs
    pub async fn open_prepared(location: &StoreLocation, role: StoreRole) -> Result<Self> {
        let database = Self::open(location).await?;
        database.prepare(role).await?;
        Ok(database)
    }

    /// Open a prepared in-memory database (useful for testing)
    pub async fn open_in_memory(role: StoreRole) -> Result<Self> {
        Self::open_prepared(&StoreLocation::Memory, role).await
    }

    /// Configure `SQLite` for optimal performance
    async fn configure(&self) -> Result<()> {
        if matches!(self.location, StoreLocation::Remote { .. }) {
            return Ok(());
        }
        // In-memory databases refuse WAL; that is fine
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA cache_size = 10000;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA busy_timeout = 5000;", ())
            .await
            .ok();
        Ok(())
    }

    /// Create the replicated table and its companions if missing
    pub async fn prepare(&self, role: StoreRole) -> Result<()> {
        tables::prepare(&self.conn, role).await
    }

    /// Where this store lives
    pub const fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
