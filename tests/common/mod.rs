//! Common test infrastructure
//!
//! A mock feed server standing in for the remote bulk-data API, and a
//! harness wiring real SQLite stores to importers pointed at it.

mod feed_server;
mod harness;

pub use feed_server::{card_json, set_json, FeedServer};
pub use harness::Harness;
