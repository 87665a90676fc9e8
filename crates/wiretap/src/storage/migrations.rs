//! SQLite schema DDL and migrations for the capture database.

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 2;

const CREATE_SCHEMA_VERSION_TABLE: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
";

const MIGRATION_1: &str = "
CREATE TABLE IF NOT EXISTS interactions (
    id TEXT PRIMARY KEY,
    session_id TEXT,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    provider TEXT NOT NULL DEFAULT 'passthrough',
    method TEXT NOT NULL,
    path TEXT NOT NULL,
    model TEXT,
    status_code INTEGER,
    is_streaming INTEGER NOT NULL DEFAULT 0,
    prompt_tokens INTEGER,
    completion_tokens INTEGER,
    total_tokens INTEGER,
    cost_estimate REAL,
    ttfb_ms REAL,
    ttft_ms REAL,
    total_latency_ms REAL,
    chunk_count INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    client_addr TEXT,
    request_json TEXT NOT NULL DEFAULT '{}',
    response_json TEXT NOT NULL DEFAULT '{}',
    metrics_json TEXT
);

CREATE INDEX IF NOT EXISTS idx_interactions_started_at
    ON interactions(started_at DESC);
CREATE INDEX IF NOT EXISTS idx_interactions_session_id
    ON interactions(session_id);
CREATE INDEX IF NOT EXISTS idx_interactions_provider
    ON interactions(provider);
CREATE INDEX IF NOT EXISTS idx_interactions_model
    ON interactions(model);
";

const MIGRATION_2: &str = "
CREATE TABLE IF NOT EXISTS stream_chunks (
    id TEXT PRIMARY KEY,
    interaction_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    received_at TEXT NOT NULL,
    event_type TEXT NOT NULL,
    raw TEXT NOT NULL,
    decoded_json TEXT,
    delta_text TEXT,
    FOREIGN KEY (interaction_id) REFERENCES interactions(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_stream_chunks_interaction_seq
    ON stream_chunks(interaction_id, seq);
";

/// Apply all pending migrations in numbered order, each in its own
/// transaction. Safe to run on every startup.
pub fn apply_migrations(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(CREATE_SCHEMA_VERSION_TABLE)?;

    let current: i64 = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for (version, sql) in [(1, MIGRATION_1), (2, MIGRATION_2)] {
        if current < version {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)?;
            tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
            tx.commit()?;
            tracing::info!("Applied schema migration {version}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_apply_cleanly() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();

        let version: i64 = conn
            .query_row(
                "SELECT MAX(version) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();
        apply_migrations(&mut conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_exist_after_migration() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();

        for table in ["interactions", "stream_chunks"] {
            let found: bool = conn
                .query_row(
                    "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert!(found, "missing table {table}");
        }
    }
}
