//! SQLite store for intercepted interactions.
//!
//! Writes go through a bounded command queue drained by a dedicated writer
//! thread holding its own connection, so all writes are serialized and
//! per-interaction ordering (insert, chunks, completion) follows enqueue
//! order. Reads use a separate connection; with WAL journaling they never
//! block the writer. Store failures are logged and never surfaced to the
//! proxy path.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, WiretapError};
use crate::model::{
    Interaction, InteractionMetrics, Provider, RequestRecord, ResponseRecord, SessionSummary,
    StoreStats, StreamChunk,
};
use crate::storage::migrations::apply_migrations;

const WRITE_QUEUE_DEPTH: usize = 1024;

/// Optional filters for listing interactions.
#[derive(Debug, Clone, Default)]
pub struct InteractionFilter {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub session_id: Option<String>,
}

enum WriteCommand {
    Insert(Box<Interaction>),
    AppendChunk(Box<StreamChunk>),
    Complete(Box<Interaction>),
    DeleteAll(oneshot::Sender<Result<u64>>),
    Flush(oneshot::Sender<()>),
}

/// Handle to the capture database. Cheap to clone; all clones share one
/// writer queue and one reader connection.
#[derive(Clone)]
pub struct InteractionStore {
    writer_tx: mpsc::Sender<WriteCommand>,
    reader: Arc<Mutex<Connection>>,
    store_chunks: bool,
}

impl InteractionStore {
    /// Open (or create) the database, apply migrations, and start the
    /// writer thread.
    pub fn open(path: &Path, store_chunks: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut writer_conn = Connection::open(path)?;
        configure_connection(&writer_conn)?;
        apply_migrations(&mut writer_conn)?;

        let reader_conn = Connection::open(path)?;
        configure_connection(&reader_conn)?;

        let (writer_tx, writer_rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        std::thread::Builder::new()
            .name("wiretap-db-writer".to_string())
            .spawn(move || writer_loop(writer_conn, writer_rx))
            .map_err(|e| WiretapError::Storage(format!("Failed to spawn writer thread: {e}")))?;

        Ok(Self {
            writer_tx,
            reader: Arc::new(Mutex::new(reader_conn)),
            store_chunks,
        })
    }

    // -------------------------------------------------------------------
    // Write path (queued, serialized)
    // -------------------------------------------------------------------

    /// Insert the parent row at request receipt, with `status_code` null.
    pub async fn insert_started(&self, interaction: &Interaction) {
        self.send(WriteCommand::Insert(Box::new(interaction.clone())))
            .await;
    }

    /// Record one stream chunk. A no-op when chunk storage is disabled;
    /// `chunk_count` on the interaction is still maintained by the caller.
    pub async fn append_chunk(&self, chunk: StreamChunk) {
        if !self.store_chunks {
            return;
        }
        self.send(WriteCommand::AppendChunk(Box::new(chunk))).await;
    }

    /// Update the parent row with the finalized interaction. Enqueued after
    /// all of the interaction's chunks, so the completed row always commits
    /// last.
    pub async fn complete(&self, interaction: &Interaction) {
        self.send(WriteCommand::Complete(Box::new(interaction.clone())))
            .await;
    }

    /// Delete every interaction and chunk. Returns the number of
    /// interactions removed once the writer has committed.
    pub async fn delete_all(&self) -> Result<u64> {
        let (tx, rx) = oneshot::channel();
        self.send(WriteCommand::DeleteAll(tx)).await;
        rx.await
            .map_err(|_| WiretapError::Storage("writer thread gone".to_string()))?
    }

    /// Wait until every previously enqueued write has been applied.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(WriteCommand::Flush(tx)).await;
        let _ = rx.await;
    }

    async fn send(&self, cmd: WriteCommand) {
        if self.writer_tx.send(cmd).await.is_err() {
            tracing::error!("Store writer is gone; dropping write");
        }
    }

    // -------------------------------------------------------------------
    // Read path
    // -------------------------------------------------------------------

    /// List interactions (without chunks), newest first.
    pub fn list_interactions(
        &self,
        limit: u32,
        offset: u32,
        filter: &InteractionFilter,
    ) -> Result<Vec<Interaction>> {
        let conn = self.reader.lock().expect("reader lock poisoned");

        let mut sql = String::from("SELECT * FROM interactions");
        let mut conditions: Vec<&str> = Vec::new();
        let mut params_vec: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(provider) = &filter.provider {
            conditions.push("provider = ?");
            params_vec.push(provider.clone().into());
        }
        if let Some(model) = &filter.model {
            conditions.push("model = ?");
            params_vec.push(model.clone().into());
        }
        if let Some(session_id) = &filter.session_id {
            conditions.push("session_id = ?");
            params_vec.push(session_id.clone().into());
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY started_at DESC LIMIT ? OFFSET ?");
        params_vec.push((limit as i64).into());
        params_vec.push((offset as i64).into());

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params_vec.iter()), row_to_interaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Fetch a single interaction with its chunks ordered by seq.
    pub fn get_interaction(&self, id: &str) -> Result<Option<Interaction>> {
        let conn = self.reader.lock().expect("reader lock poisoned");
        let interaction = conn
            .query_row(
                "SELECT * FROM interactions WHERE id = ?1",
                params![id],
                row_to_interaction,
            )
            .optional()?;

        let Some(mut interaction) = interaction else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT * FROM stream_chunks WHERE interaction_id = ?1 ORDER BY seq ASC",
        )?;
        interaction.chunks = stmt
            .query_map(params![id], row_to_chunk)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(interaction))
    }

    /// Group interactions by non-null session id.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let conn = self.reader.lock().expect("reader lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT
                session_id,
                COUNT(*) AS interaction_count,
                MIN(started_at) AS first_interaction,
                MAX(started_at) AS last_interaction,
                GROUP_CONCAT(DISTINCT provider) AS providers,
                GROUP_CONCAT(DISTINCT model) AS models,
                SUM(total_latency_ms) AS total_latency_ms
            FROM interactions
            WHERE session_id IS NOT NULL
            GROUP BY session_id
            ORDER BY first_interaction DESC",
        )?;

        let sessions = stmt
            .query_map([], |row| {
                let providers: Option<String> = row.get("providers")?;
                let models: Option<String> = row.get("models")?;
                Ok(SessionSummary {
                    session_id: row.get("session_id")?,
                    interaction_count: row.get::<_, i64>("interaction_count")? as u64,
                    first_interaction: parse_timestamp(row.get::<_, Option<String>>("first_interaction")?),
                    last_interaction: parse_timestamp(row.get::<_, Option<String>>("last_interaction")?),
                    providers: split_concat(providers),
                    models: split_concat(models),
                    total_latency_ms: row.get("total_latency_ms")?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    /// Aggregate statistics over everything stored.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.reader.lock().expect("reader lock poisoned");

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM interactions", [], |r| r.get(0))?;
        let errors: i64 = conn.query_row(
            "SELECT COUNT(*) FROM interactions WHERE error IS NOT NULL",
            [],
            |r| r.get(0),
        )?;
        let avg_latency: Option<f64> = conn.query_row(
            "SELECT AVG(total_latency_ms) FROM interactions WHERE total_latency_ms IS NOT NULL",
            [],
            |r| r.get(0),
        )?;
        let total_tokens: i64 = conn.query_row(
            "SELECT COALESCE(SUM(total_tokens), 0) FROM interactions",
            [],
            |r| r.get(0),
        )?;

        let mut by_provider = BTreeMap::new();
        let mut stmt =
            conn.prepare("SELECT provider, COUNT(*) FROM interactions GROUP BY provider")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        for row in rows {
            let (provider, count) = row?;
            by_provider.insert(provider, count);
        }

        let mut by_model = BTreeMap::new();
        let mut stmt = conn.prepare(
            "SELECT model, COUNT(*) AS count FROM interactions
             WHERE model IS NOT NULL GROUP BY model ORDER BY count DESC LIMIT 10",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        for row in rows {
            let (model, count) = row?;
            by_model.insert(model, count);
        }

        Ok(StoreStats {
            total_interactions: total as u64,
            by_provider,
            by_model,
            error_count: errors as u64,
            error_rate: if total > 0 {
                errors as f64 / total as f64
            } else {
                0.0
            },
            avg_latency_ms: avg_latency,
            total_tokens: total_tokens as u64,
        })
    }
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

fn writer_loop(conn: Connection, mut rx: mpsc::Receiver<WriteCommand>) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            WriteCommand::Insert(interaction) => {
                if let Err(e) = insert_interaction(&conn, &interaction) {
                    tracing::error!("Failed to insert interaction {}: {e}", interaction.id);
                }
            }
            WriteCommand::AppendChunk(chunk) => {
                if let Err(e) = insert_chunk(&conn, &chunk) {
                    tracing::error!(
                        "Failed to store chunk {} of {}: {e}",
                        chunk.seq,
                        chunk.interaction_id
                    );
                }
            }
            WriteCommand::Complete(interaction) => {
                if let Err(e) = update_interaction(&conn, &interaction) {
                    tracing::error!("Failed to finalize interaction {}: {e}", interaction.id);
                }
            }
            WriteCommand::DeleteAll(reply) => {
                let _ = reply.send(delete_all(&conn));
            }
            WriteCommand::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }
    tracing::debug!("Store writer draining complete");
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn split_concat(value: Option<String>) -> Vec<String> {
    value
        .map(|s| s.split(',').map(str::to_string).collect())
        .unwrap_or_default()
}

const INSERT_SQL: &str = "INSERT INTO interactions (
    id, session_id, started_at, completed_at, provider, method, path,
    model, status_code, is_streaming, prompt_tokens, completion_tokens,
    total_tokens, cost_estimate, ttfb_ms, ttft_ms, total_latency_ms,
    chunk_count, error, client_addr, request_json, response_json, metrics_json
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
          ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)";

const UPDATE_SQL: &str = "UPDATE interactions SET
    session_id = ?2, started_at = ?3, completed_at = ?4, provider = ?5,
    method = ?6, path = ?7, model = ?8, status_code = ?9,
    is_streaming = ?10, prompt_tokens = ?11, completion_tokens = ?12,
    total_tokens = ?13, cost_estimate = ?14, ttfb_ms = ?15,
    ttft_ms = ?16, total_latency_ms = ?17, chunk_count = ?18,
    error = ?19, client_addr = ?20, request_json = ?21,
    response_json = ?22, metrics_json = ?23
WHERE id = ?1";

fn write_row(conn: &Connection, sql: &str, interaction: &Interaction) -> Result<usize> {
    let request_json = serde_json::to_string(&interaction.request)?;
    let response_json = serde_json::to_string(&interaction.response)?;
    let metrics_json = serde_json::to_string(&interaction.metrics)?;
    let usage = interaction.metrics.token_usage.as_ref();

    let count = conn.execute(
        sql,
        params![
            interaction.id,
            interaction.session_id,
            format_timestamp(&interaction.started_at),
            interaction.completed_at.as_ref().map(format_timestamp),
            interaction.provider.as_str(),
            interaction.method,
            interaction.path,
            interaction.request.model,
            interaction.response.status_code,
            interaction.is_streaming as i64,
            usage.and_then(|u| u.prompt_tokens).map(|v| v as i64),
            usage.and_then(|u| u.completion_tokens).map(|v| v as i64),
            usage.and_then(|u| u.total_tokens).map(|v| v as i64),
            interaction.metrics.cost_estimate.as_ref().map(|c| c.total_cost),
            interaction.metrics.ttfb_ms,
            interaction.metrics.ttft_ms,
            interaction.metrics.total_latency_ms,
            interaction.chunk_count as i64,
            interaction.error,
            interaction.client_addr,
            request_json,
            response_json,
            metrics_json,
        ],
    )?;
    Ok(count)
}

fn insert_interaction(conn: &Connection, interaction: &Interaction) -> Result<()> {
    write_row(conn, INSERT_SQL, interaction)?;
    Ok(())
}

fn update_interaction(conn: &Connection, interaction: &Interaction) -> Result<()> {
    let updated = write_row(conn, UPDATE_SQL, interaction)?;
    // Completion can only miss the row if the initial insert failed;
    // recover by inserting the finalized row.
    if updated == 0 {
        insert_interaction(conn, interaction)?;
    }
    Ok(())
}

fn insert_chunk(conn: &Connection, chunk: &StreamChunk) -> Result<()> {
    let decoded_json = chunk
        .decoded
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT INTO stream_chunks (
            id, interaction_id, seq, received_at, event_type, raw,
            decoded_json, delta_text
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            chunk.id,
            chunk.interaction_id,
            chunk.seq,
            format_timestamp(&chunk.received_at),
            chunk.event_type,
            chunk.raw,
            decoded_json,
            chunk.delta_text,
        ],
    )?;
    Ok(())
}

fn delete_all(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM interactions", [], |r| r.get(0))?;
    conn.execute("DELETE FROM stream_chunks", [])?;
    conn.execute("DELETE FROM interactions", [])?;
    Ok(count as u64)
}

fn row_to_interaction(row: &rusqlite::Row) -> rusqlite::Result<Interaction> {
    let request_json: String = row.get("request_json")?;
    let response_json: String = row.get("response_json")?;
    let metrics_json: Option<String> = row.get("metrics_json")?;
    let started_at: String = row.get("started_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    let provider: String = row.get("provider")?;

    Ok(Interaction {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        started_at: parse_timestamp(Some(started_at)).unwrap_or_default(),
        completed_at: parse_timestamp(completed_at),
        provider: Provider::from_str_loose(&provider).unwrap_or(Provider::Passthrough),
        method: row.get("method")?,
        path: row.get("path")?,
        client_addr: row.get("client_addr")?,
        request: serde_json::from_str::<RequestRecord>(&request_json).unwrap_or_default(),
        response: serde_json::from_str::<ResponseRecord>(&response_json).unwrap_or_default(),
        metrics: metrics_json
            .and_then(|m| serde_json::from_str::<InteractionMetrics>(&m).ok())
            .unwrap_or_default(),
        is_streaming: row.get::<_, i64>("is_streaming")? != 0,
        chunk_count: row.get::<_, i64>("chunk_count")? as u32,
        error: row.get("error")?,
        chunks: Vec::new(),
    })
}

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<StreamChunk> {
    let received_at: String = row.get("received_at")?;
    let decoded_json: Option<String> = row.get("decoded_json")?;
    Ok(StreamChunk {
        id: row.get("id")?,
        interaction_id: row.get("interaction_id")?,
        seq: row.get::<_, i64>("seq")? as u32,
        received_at: parse_timestamp(Some(received_at)).unwrap_or_default(),
        raw: row.get("raw")?,
        decoded: decoded_json.and_then(|d| serde_json::from_str(&d).ok()),
        event_type: row.get("event_type")?,
        delta_text: row.get("delta_text")?,
    })
}
