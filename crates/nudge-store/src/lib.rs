pub mod database;
pub mod error;
pub mod nudges;
pub mod row_helpers;
pub mod schema;
pub mod sessions;
pub mod store;

pub use database::{Database, DatabaseConfig};
pub use error::StoreError;
pub use nudges::{NudgeRepo, NudgeRow, StoreNudgeProvider};
pub use sessions::{SessionFilter, SessionRepo};
pub use store::{SessionStore, SqliteSessionStore, Versioned};
