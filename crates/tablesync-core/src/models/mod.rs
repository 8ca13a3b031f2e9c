//! Data models for tablesync

mod base;
mod user_profile;

pub use base::{from_stored_time, now, to_stored_time, RowId, RowVersion};
pub use user_profile::{
    validate_payload, UserProfile, EMAIL_MAX_LEN, NAME_MAX_LEN, PHONE_MAX_LEN,
};
