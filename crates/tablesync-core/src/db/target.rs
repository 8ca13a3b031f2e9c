//! Access to the clone table

use std::collections::HashMap;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use libsql::params::Params;
use libsql::{Connection, Value};

use super::query::{self, positional};
use crate::columns::{ColumnRole, TableLayout, VersionPolicy, VersionedRow};
use crate::error::{Error, Result};
use crate::models::{from_stored_time, RowId, RowVersion};

/// Ids bound per version lookup, well below `SQLite`'s parameter limit
const LOOKUP_CHUNK: usize = 500;

/// Reads and row-by-row writes against the target table of `T`
pub struct TargetStore<'a, T> {
    conn: &'a Connection,
    layout: TableLayout,
    _row: PhantomData<T>,
}

impl<'a, T: VersionedRow> TargetStore<'a, T> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            layout: TableLayout::of::<T>(VersionPolicy::Replicated),
            _row: PhantomData,
        }
    }

    pub const fn connection(&self) -> &'a Connection {
        self.conn
    }

    pub const fn layout(&self) -> &TableLayout {
        &self.layout
    }

    pub async fn count(&self) -> Result<u64> {
        query::count_rows(self.conn, T::TABLE).await
    }

    /// Latest replicated update time, `None` for an empty table
    pub async fn cursor(&self) -> Result<Option<DateTime<Utc>>> {
        let sql = format!(
            "SELECT MAX({}) FROM {}",
            self.layout.column_with_role(ColumnRole::Cursor)?,
            T::TABLE
        );
        query::scalar_i64(self.conn, &sql, Params::None)
            .await?
            .map(from_stored_time)
            .transpose()
    }

    /// Stored version token of every `ids` entry present in the table
    pub async fn versions_of(&self, ids: &[RowId]) -> Result<HashMap<RowId, RowVersion>> {
        let key = self.layout.column_with_role(ColumnRole::Key)?;
        let version = self.layout.column_with_role(ColumnRole::Version)?;

        let mut versions = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT {key}, {version} FROM {} WHERE {key} IN ({placeholders})",
                T::TABLE
            );
            let params = chunk
                .iter()
                .map(|id| Value::Text(id.as_str()))
                .collect::<Vec<_>>();

            let mut rows = self.conn.query(&sql, positional(params)).await?;
            while let Some(row) = rows.next().await? {
                let id: String = row.get(0)?;
                let token: Vec<u8> = row.get(1)?;
                let id = id
                    .parse()
                    .map_err(|_| Error::Database(format!("invalid row id: {id}")))?;
                versions.insert(id, RowVersion::from_slice(&token)?);
            }
        }
        Ok(versions)
    }

    /// Insert `row` as-is, version token included
    pub async fn insert(&self, row: &T) -> Result<()> {
        let sql = self.layout.insert_sql(T::TABLE, 1);
        self.conn
            .execute(&sql, positional(self.layout.row_values(row)))
            .await?;
        Ok(())
    }

    /// Overwrite every column of the stored copy except the key and creation time
    pub async fn update(&self, row: &T) -> Result<()> {
        let sql = self.layout.update_sql()?;
        let affected = self
            .conn
            .execute(&sql, positional(self.layout.update_params(row)))
            .await?;
        if affected == 0 {
            return Err(Error::NotFound(row.id().to_string()));
        }
        Ok(())
    }

    pub async fn get(&self, id: RowId) -> Result<Option<T>> {
        let sql = format!(
            "{} WHERE {} = ?1",
            self.layout.select_sql(),
            self.layout.column_with_role(ColumnRole::Key)?
        );
        let mut rows =
            query::fetch_rows(self.conn, &sql, positional(vec![Value::Text(id.as_str())])).await?;
        Ok(rows.pop())
    }

    /// Every stored row, ordered by key
    pub async fn all(&self) -> Result<Vec<T>> {
        let sql = format!(
            "{} ORDER BY {}",
            self.layout.select_sql(),
            self.layout.column_with_role(ColumnRole::Key)?
        );
        query::fetch_rows(self.conn, &sql, Params::None).await
    }
}
