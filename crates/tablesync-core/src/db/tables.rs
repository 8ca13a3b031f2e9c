//! Table preparation for source and target stores
//!
//! Creates the replicated table when it is missing. Existing tables are left
//! untouched; there is no version history to replay.

use libsql::Connection;

use crate::error::Result;

/// Which side of the replication a store is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRole {
    /// Authoritative store; assigns row version tokens itself
    Source,
    /// Clone store; keeps the tokens copied from the source
    Target,
}

const SOURCE_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS user_profile (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        last_updated_time INTEGER NOT NULL,
        row_version BLOB NOT NULL DEFAULT (randomblob(8))
    )",
    "CREATE INDEX IF NOT EXISTS idx_user_profile_last_updated
        ON user_profile(last_updated_time)",
    // Any update that leaves the token untouched gets a fresh one
    "CREATE TRIGGER IF NOT EXISTS user_profile_row_version AFTER UPDATE ON user_profile
     FOR EACH ROW
     WHEN NEW.row_version = OLD.row_version
     BEGIN
         UPDATE user_profile SET row_version = randomblob(8) WHERE id = NEW.id;
     END",
];

const TARGET_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS user_profile (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        last_updated_time INTEGER NOT NULL,
        row_version BLOB NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_user_profile_last_updated
        ON user_profile(last_updated_time)",
];

/// Create the tables `role` needs, in one transaction
pub async fn prepare(conn: &Connection, role: StoreRole) -> Result<()> {
    let statements = match role {
        StoreRole::Source => SOURCE_STATEMENTS,
        StoreRole::Target => TARGET_STATEMENTS,
    };

    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::debug!("Prepared {role:?} tables");
    Ok(())
}
