//! Column and table metadata for replicated row types
//!
//! Every row type declares its table name and an ordered column list once, as
//! constants. Statement builders and the bulk loader derive everything they
//! need (column lists, mappings, update sets, value projections) from that
//! declaration, so the staging DDL, the load and the merge always agree on
//! column order.

use libsql::{Row, Value};

use crate::error::{Error, Result};
use crate::models::{RowId, RowVersion};

/// What a column means to the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// Primary key, assigned by the producer
    Key,
    /// Replicated payload
    Payload,
    /// Creation timestamp, written once
    CreatedAt,
    /// Last-update timestamp the cursor is computed from
    Cursor,
    /// Opaque row version token
    Version,
}

/// A declared column of a row type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub role: ColumnRole,
}

impl Column {
    pub const fn new(name: &'static str, role: ColumnRole) -> Self {
        Self { name, role }
    }
}

/// A row type stored in a table with a statically declared column order
pub trait TableRow: Sized + Send + Sync {
    /// Table name, identical in source and target stores
    const TABLE: &'static str;

    /// Columns in declaration order
    const COLUMNS: &'static [Column];

    /// Column values in `COLUMNS` order
    fn values(&self) -> Vec<Value>;

    /// Decode a row selected with every column in `COLUMNS` order
    fn from_row(row: &Row) -> Result<Self>;
}

/// A row carrying the identity and version fields replication needs
pub trait VersionedRow: TableRow {
    fn id(&self) -> RowId;
    fn row_version(&self) -> RowVersion;
}

/// How a destination table obtains its version tokens
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersionPolicy {
    /// The destination stores the token copied from the source row
    #[default]
    Replicated,
    /// The destination assigns its own token; the column is never written
    StoreGenerated,
}

/// Same-name source to destination column pairing used by the bulk loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMapping {
    pub source: &'static str,
    pub destination: &'static str,
}

/// Resolved column set of one table for one version policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    table: &'static str,
    columns: Vec<(usize, Column)>,
}

impl TableLayout {
    /// Resolve the layout of `T` for the given destination policy
    pub fn of<T: TableRow>(policy: VersionPolicy) -> Self {
        let columns = T::COLUMNS
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, column)| {
                policy == VersionPolicy::Replicated || column.role != ColumnRole::Version
            })
            .collect();

        Self {
            table: T::TABLE,
            columns,
        }
    }

    /// Resolve the layout for a batch about to be written
    ///
    /// Fails fast on an empty batch instead of producing statements with no
    /// rows to bind.
    pub fn for_batch<T: TableRow>(rows: &[T], policy: VersionPolicy) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::EmptyBatch(T::TABLE));
        }
        Ok(Self::of::<T>(policy))
    }

    /// Number of resolved columns
    pub(crate) fn len(&self) -> usize {
        self.columns.len()
    }

    /// Column names in declaration order
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|(_, column)| column.name).collect()
    }

    /// Comma-separated column names, ready to splice into SQL
    pub fn column_list(&self) -> String {
        self.column_names().join(", ")
    }

    /// Source to destination mappings for the bulk loader
    pub fn mappings(&self) -> Vec<ColumnMapping> {
        self.columns
            .iter()
            .map(|(_, column)| ColumnMapping {
                source: column.name,
                destination: column.name,
            })
            .collect()
    }

    /// Name of the first column with `role`
    pub fn column_with_role(&self, role: ColumnRole) -> Result<&'static str> {
        self.columns
            .iter()
            .find(|(_, column)| column.role == role)
            .map(|(_, column)| column.name)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "table `{}` declares no {role:?} column",
                    self.table
                ))
            })
    }

    /// Columns overwritten when an existing row is updated
    ///
    /// The key and the creation timestamp are never rewritten.
    pub fn update_columns(&self) -> Vec<&'static str> {
        self.columns
            .iter()
            .filter(|(_, column)| !matches!(column.role, ColumnRole::Key | ColumnRole::CreatedAt))
            .map(|(_, column)| column.name)
            .collect()
    }

    /// Values of `row` restricted to the resolved columns
    pub fn row_values<T: TableRow>(&self, row: &T) -> Vec<Value> {
        let mut values = row.values();
        self.columns
            .iter()
            .map(|(index, _)| std::mem::replace(&mut values[*index], Value::Null))
            .collect()
    }

    /// `SELECT <columns> FROM <table>`
    pub fn select_sql(&self) -> String {
        format!("SELECT {} FROM {}", self.column_list(), self.table)
    }

    /// `(?, ?, ...), (?, ?, ...)` for `rows` rows of this layout
    pub fn values_placeholders(&self, rows: usize) -> String {
        let tuple = format!("({})", vec!["?"; self.len()].join(", "));
        vec![tuple; rows].join(", ")
    }

    /// Multi-row `INSERT` of `rows` rows into `table`
    pub fn insert_sql(&self, table: &str, rows: usize) -> String {
        format!(
            "INSERT INTO {table} ({}) VALUES {}",
            self.column_list(),
            self.values_placeholders(rows)
        )
    }

    /// `UPDATE` of the update columns, matched on the key
    ///
    /// Binds [`update_params`](Self::update_params) in order.
    pub fn update_sql(&self) -> Result<String> {
        let key = self.column_with_role(ColumnRole::Key)?;
        let assignments = self
            .update_columns()
            .iter()
            .map(|name| format!("{name} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!(
            "UPDATE {} SET {assignments} WHERE {key} = ?",
            self.table
        ))
    }

    /// Update column values of `row` followed by its key
    pub fn update_params<T: TableRow>(&self, row: &T) -> Vec<Value> {
        let mut values = row.values();
        let mut take = |index: usize| std::mem::replace(&mut values[index], Value::Null);

        let mut key = Value::Null;
        let mut params = Vec::with_capacity(self.len());
        for (index, column) in &self.columns {
            match column.role {
                ColumnRole::Key => key = take(*index),
                ColumnRole::CreatedAt => {}
                _ => params.push(take(*index)),
            }
        }
        params.push(key);
        params
    }

    /// Merge every row of `staging` into the table
    ///
    /// Rows with an unknown key are inserted; rows with a known key get their
    /// update columns overwritten. The creation timestamp of an existing row
    /// is kept.
    pub fn upsert_from_sql(&self, staging: &str) -> Result<String> {
        let key = self.column_with_role(ColumnRole::Key)?;
        let columns = self.column_list();
        let assignments = self
            .update_columns()
            .iter()
            .map(|name| format!("{name} = excluded.{name}"))
            .collect::<Vec<_>>()
            .join(", ");
        // `WHERE true` keeps the upsert clause from parsing as a join constraint
        Ok(format!(
            "INSERT INTO {table} ({columns}) SELECT {columns} FROM {staging} WHERE true \
             ON CONFLICT({key}) DO UPDATE SET {assignments}",
            table = self.table
        ))
    }
}
