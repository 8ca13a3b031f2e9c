//! User profile model

use chrono::{DateTime, Utc};
use libsql::{Row, Value};
use serde::{Deserialize, Serialize};

use super::base::{from_stored_time, now, to_stored_time, RowId, RowVersion};
use crate::columns::{Column, ColumnRole, TableRow, VersionedRow};
use crate::error::{Error, Result};

/// Maximum length of `name`, in characters
pub const NAME_MAX_LEN: usize = 100;
/// Maximum length of `email`, in characters
pub const EMAIL_MAX_LEN: usize = 50;
/// Maximum length of `phone`, in characters
pub const PHONE_MAX_LEN: usize = 50;

/// The replicated entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Producer-assigned identifier, stable across stores
    pub id: RowId,
    pub name: String,
    pub email: String,
    pub phone: String,
    /// Set once at creation
    pub created_at: DateTime<Utc>,
    /// Advanced on every mutation; never moves backwards for a given id
    pub last_updated_time: DateTime<Utc>,
    /// Replaced on every mutation
    pub row_version: RowVersion,
}

impl UserProfile {
    /// Create a profile with a fresh id and both timestamps set to now
    ///
    /// `row_version` stays zeroed until a store assigns one.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>, phone: impl Into<String>) -> Self {
        let now = now();
        Self {
            id: RowId::new(),
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
            created_at: now,
            last_updated_time: now,
            row_version: RowVersion::default(),
        }
    }

    /// Check payload lengths against the column limits
    pub fn validate(&self) -> Result<()> {
        validate_payload(&self.name, &self.email, &self.phone)
    }
}

/// Check a profile payload against the column limits
pub fn validate_payload(name: &str, email: &str, phone: &str) -> Result<()> {
    check_len("name", name, NAME_MAX_LEN)?;
    check_len("email", email, EMAIL_MAX_LEN)?;
    check_len("phone", phone, PHONE_MAX_LEN)
}

fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max {
        return Err(Error::InvalidInput(format!(
            "{field} is {len} characters long, maximum is {max}"
        )));
    }
    Ok(())
}

impl TableRow for UserProfile {
    const TABLE: &'static str = "user_profile";

    const COLUMNS: &'static [Column] = &[
        Column::new("id", ColumnRole::Key),
        Column::new("name", ColumnRole::Payload),
        Column::new("email", ColumnRole::Payload),
        Column::new("phone", ColumnRole::Payload),
        Column::new("created_at", ColumnRole::CreatedAt),
        Column::new("last_updated_time", ColumnRole::Cursor),
        Column::new("row_version", ColumnRole::Version),
    ];

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.id.as_str()),
            Value::Text(self.name.clone()),
            Value::Text(self.email.clone()),
            Value::Text(self.phone.clone()),
            Value::Integer(to_stored_time(self.created_at)),
            Value::Integer(to_stored_time(self.last_updated_time)),
            Value::Blob(self.row_version.as_bytes().to_vec()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        let id: String = row.get(0)?;
        let row_version: Vec<u8> = row.get(6)?;
        Ok(Self {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid row id: {id}")))?,
            name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            created_at: from_stored_time(row.get(4)?)?,
            last_updated_time: from_stored_time(row.get(5)?)?,
            row_version: RowVersion::from_slice(&row_version)?,
        })
    }
}

impl VersionedRow for UserProfile {
    fn id(&self) -> RowId {
        self.id
    }

    fn row_version(&self) -> RowVersion {
        self.row_version
    }
}
