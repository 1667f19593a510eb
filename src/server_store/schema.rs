//! SQLite schema for the server database (settings and jobs).

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Settings
// =============================================================================

const SETTINGS_TABLE_V1: Table = Table {
    name: "settings",
    columns: &[
        sqlite_column!("key", &SqlType::Text, is_primary_key = true),
        sqlite_column!("value", &SqlType::Text, non_null = true),
        sqlite_column!(
            "updated_at",
            &SqlType::Text,
            non_null = true,
            default_value = Some("(datetime('now'))")
        ),
    ],
    indices: &[],
};

// =============================================================================
// Version 2 - Jobs
// =============================================================================

const JOBS_TABLE_V2: Table = Table {
    name: "jobs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("job_type", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("metadata", &SqlType::Text, non_null = true),
        sqlite_column!("error", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("updated_at", &SqlType::Text, non_null = true),
        sqlite_column!("started_at", &SqlType::Text),
        sqlite_column!("completed_at", &SqlType::Text),
    ],
    indices: &[
        ("idx_jobs_type_created", "job_type, created_at DESC"),
        ("idx_jobs_status", "status"),
    ],
};

fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    JOBS_TABLE_V2.create(conn)
}

pub const SERVER_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[SETTINGS_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[SETTINGS_TABLE_V1, JOBS_TABLE_V2],
        migration: Some(migrate_v1_to_v2),
    },
];
