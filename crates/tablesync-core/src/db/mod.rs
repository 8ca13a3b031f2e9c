//! Database layer for tablesync

mod connection;
pub(crate) mod query;
mod repository;
mod source;
mod tables;
mod target;
mod transaction;

pub use connection::Database;
pub use repository::UserProfileRepository;
pub use source::SourceStore;
pub use tables::StoreRole;
pub use target::TargetStore;
pub use transaction::StoreTransaction;
