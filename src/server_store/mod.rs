//! Server database: settings and the job ledger share one SQLite file.

mod schema;
mod sqlite_server_store;

pub use schema::SERVER_VERSIONED_SCHEMAS;
pub use sqlite_server_store::SqliteServerStore;
