//! Read helpers shared by the source and target stores

use libsql::params::Params;
use libsql::{Connection, Value};

use crate::columns::TableRow;
use crate::error::{Error, Result};

/// Bind `values` positionally
pub(crate) const fn positional(values: Vec<Value>) -> Params {
    Params::Positional(values)
}

/// Read a single integer produced by an aggregate query
pub(crate) async fn scalar_i64(conn: &Connection, sql: &str, params: Params) -> Result<Option<i64>> {
    let mut rows = conn.query(sql, params).await?;
    let Some(row) = rows.next().await? else {
        return Ok(None);
    };
    Ok(row.get::<Option<i64>>(0)?)
}

/// `SELECT COUNT(*)` over a whole table
pub(crate) async fn count_rows(conn: &Connection, table: &str) -> Result<u64> {
    let count = scalar_i64(conn, &format!("SELECT COUNT(*) FROM {table}"), Params::None)
        .await?
        .unwrap_or(0);
    u64::try_from(count).map_err(|_| Error::Database(format!("negative row count: {count}")))
}

/// Run a select whose columns follow `T::COLUMNS` and decode every row
pub(crate) async fn fetch_rows<T: TableRow>(
    conn: &Connection,
    sql: &str,
    params: Params,
) -> Result<Vec<T>> {
    let mut rows = conn.query(sql, params).await?;
    let mut decoded = Vec::new();
    while let Some(row) = rows.next().await? {
        decoded.push(T::from_row(&row)?);
    }
    Ok(decoded)
}
