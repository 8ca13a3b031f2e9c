//! Read-only access to the authoritative table

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use libsql::Connection;

use super::query::{self, positional};
use crate::columns::{ColumnRole, TableLayout, TableRow, VersionPolicy};
use crate::error::Result;
use crate::models::to_stored_time;

/// Queries the sync engine runs against the source table of `T`
///
/// Never writes.
pub struct SourceStore<'a, T> {
    conn: &'a Connection,
    layout: TableLayout,
    _row: PhantomData<T>,
}

impl<'a, T: TableRow> SourceStore<'a, T> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            layout: TableLayout::of::<T>(VersionPolicy::Replicated),
            _row: PhantomData,
        }
    }

    pub async fn count(&self) -> Result<u64> {
        query::count_rows(self.conn, T::TABLE).await
    }

    /// Every row, oldest update first
    pub async fn all(&self) -> Result<Vec<T>> {
        let sql = format!(
            "{} ORDER BY {}, {}",
            self.layout.select_sql(),
            self.layout.column_with_role(ColumnRole::Cursor)?,
            self.layout.column_with_role(ColumnRole::Key)?
        );
        query::fetch_rows(self.conn, &sql, libsql::params::Params::None).await
    }

    /// Rows whose cursor column is strictly after `cursor`, oldest first
    pub async fn updated_after(&self, cursor: DateTime<Utc>) -> Result<Vec<T>> {
        let cursor_column = self.layout.column_with_role(ColumnRole::Cursor)?;
        let sql = format!(
            "{} WHERE {cursor_column} > ?1 ORDER BY {cursor_column}, {}",
            self.layout.select_sql(),
            self.layout.column_with_role(ColumnRole::Key)?
        );
        query::fetch_rows(
            self.conn,
            &sql,
            positional(vec![to_stored_time(cursor).into()]),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, StoreRole, UserProfileRepository};
    use crate::models::UserProfile;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_updated_after_is_strict_and_ordered() {
        let db = Database::open_in_memory(StoreRole::Source).await.unwrap();
        let repo = UserProfileRepository::new(db.connection());

        let base = crate::models::now();
        for (offset, name) in [(2, "third"), (0, "first"), (1, "second")] {
            let mut profile = UserProfile::new(name, "x@example.com", "1");
            profile.last_updated_time = base + Duration::seconds(offset);
            profile.created_at = profile.last_updated_time;
            repo.insert(&profile).await.unwrap();
        }

        let source = SourceStore::<UserProfile>::new(db.connection());
        assert_eq!(source.count().await.unwrap(), 3);

        let names: Vec<String> = source
            .all()
            .await
            .unwrap()
            .into_iter()
            .map(|profile| profile.name)
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);

        let newer = source.updated_after(base).await.unwrap();
        let names: Vec<&str> = newer.iter().map(|profile| profile.name.as_str()).collect();
        assert_eq!(names, vec!["second", "third"]);

        assert!(source
            .updated_after(base + Duration::seconds(2))
            .await
            .unwrap()
            .is_empty());
    }
}
