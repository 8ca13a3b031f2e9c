//! User profile repository for the producer side
//!
//! Writes go to the source table. The table assigns version tokens itself, so
//! every insert and update here leaves the row with a fresh token, and every
//! update moves `last_updated_time` strictly forward.

use libsql::{Connection, Value};

use super::query::{self, positional};
use super::transaction::StoreTransaction;
use crate::columns::{TableLayout, TableRow, VersionPolicy};
use crate::error::{Error, Result};
use crate::models::{now, to_stored_time, validate_payload, RowId, UserProfile};
use crate::sync::{BulkLoadOptions, BulkLoader};

/// Producer-side writes and lookups on the `user_profile` table
pub struct UserProfileRepository<'a> {
    conn: &'a Connection,
}

impl<'a> UserProfileRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a profile with a fresh id
    pub async fn create(&self, name: &str, email: &str, phone: &str) -> Result<UserProfile> {
        self.insert(&UserProfile::new(name, email, phone)).await
    }

    /// Insert a fully built profile and return it with its assigned version
    pub async fn insert(&self, profile: &UserProfile) -> Result<UserProfile> {
        profile.validate()?;

        let layout = TableLayout::of::<UserProfile>(VersionPolicy::StoreGenerated);
        self.conn
            .execute(
                &layout.insert_sql(UserProfile::TABLE, 1),
                positional(layout.row_values(profile)),
            )
            .await?;

        self.get(profile.id)
            .await?
            .ok_or_else(|| Error::NotFound(profile.id.to_string()))
    }

    /// Insert many profiles with one bulk load inside one transaction
    ///
    /// Returns the number of rows written. Nothing is written if any profile
    /// fails validation.
    pub async fn create_many(&self, profiles: &[UserProfile]) -> Result<u64> {
        if profiles.is_empty() {
            return Ok(0);
        }
        for profile in profiles {
            profile.validate()?;
        }

        let tx = StoreTransaction::begin(self.conn).await?;
        let loader = BulkLoader::new(tx.connection(), BulkLoadOptions::default());
        match loader
            .load_batch(profiles, UserProfile::TABLE, VersionPolicy::StoreGenerated)
            .await
        {
            Ok(loaded) => {
                tx.commit().await?;
                tracing::info!("Created {loaded} user profiles");
                Ok(loaded)
            }
            Err(e) => {
                tx.rollback().await.ok();
                Err(e)
            }
        }
    }

    /// Replace the payload of an existing profile
    ///
    /// Sets `last_updated_time` to now, or one microsecond past the stored value
    /// when that is already at or after now, so the change always sorts after
    /// the previous one. The table trigger replaces the version token.
    pub async fn update(
        &self,
        id: RowId,
        name: &str,
        email: &str,
        phone: &str,
    ) -> Result<UserProfile> {
        validate_payload(name, email, phone)?;

        let affected = self
            .conn
            .execute(
                "UPDATE user_profile
                 SET name = ?1, email = ?2, phone = ?3,
                     last_updated_time = MAX(last_updated_time + 1, ?4)
                 WHERE id = ?5",
                positional(vec![
                    Value::Text(name.to_string()),
                    Value::Text(email.to_string()),
                    Value::Text(phone.to_string()),
                    Value::Integer(to_stored_time(now())),
                    Value::Text(id.as_str()),
                ]),
            )
            .await?;

        if affected == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub async fn get(&self, id: RowId) -> Result<Option<UserProfile>> {
        let layout = TableLayout::of::<UserProfile>(VersionPolicy::Replicated);
        let sql = format!("{} WHERE id = ?1", layout.select_sql());
        let mut rows =
            query::fetch_rows(self.conn, &sql, positional(vec![Value::Text(id.as_str())])).await?;
        Ok(rows.pop())
    }
}
