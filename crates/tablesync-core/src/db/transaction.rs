//! Explicit transaction scope over a single connection

use libsql::Connection;

use crate::error::Result;

/// An open `BEGIN IMMEDIATE` transaction
///
/// Must end with [`commit`](Self::commit) or [`rollback`](Self::rollback);
/// both consume the handle.
pub struct StoreTransaction<'a> {
    conn: &'a Connection,
    finished: bool,
}

impl<'a> StoreTransaction<'a> {
    pub async fn begin(conn: &'a Connection) -> Result<Self> {
        conn.execute("BEGIN IMMEDIATE", ()).await?;
        Ok(Self {
            conn,
            finished: false,
        })
    }

    pub const fn connection(&self) -> &'a Connection {
        self.conn
    }

    /// Commit, rolling back if the commit itself fails
    pub async fn commit(mut self) -> Result<()> {
        self.finished = true;
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.execute("ROLLBACK", ()).await?;
        Ok(())
    }
}

impl Drop for StoreTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("Transaction handle dropped without commit or rollback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{query, Database, StoreRole};

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rollback_discards_writes() {
        let db = Database::open_in_memory(StoreRole::Target).await.unwrap();
        let conn = db.connection();
        conn.execute("CREATE TABLE scratch (value INTEGER)", ())
            .await
            .unwrap();

        let tx = StoreTransaction::begin(conn).await.unwrap();
        tx.connection()
            .execute("INSERT INTO scratch (value) VALUES (1)", ())
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(query::count_rows(conn, "scratch").await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_commit_keeps_writes() {
        let db = Database::open_in_memory(StoreRole::Target).await.unwrap();
        let conn = db.connection();
        conn.execute("CREATE TABLE scratch (value INTEGER)", ())
            .await
            .unwrap();

        let tx = StoreTransaction::begin(conn).await.unwrap();
        conn.execute("INSERT INTO scratch (value) VALUES (1)", ())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(query::count_rows(conn, "scratch").await.unwrap(), 1);
    }
}
