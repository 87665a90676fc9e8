use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Interaction;
use crate::proxy::AppState;
use crate::storage::InteractionFilter;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Response {
    match state.store.stats() {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => storage_error(e),
    }
}

pub async fn sessions(State(state): State<Arc<AppState>>) -> Response {
    match state.store.list_sessions() {
        Ok(sessions) => Json(sessions).into_response(),
        Err(e) => storage_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct InteractionsQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub session_id: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// Compact row for listings; the full record is available per-id.
#[derive(Debug, Serialize)]
pub struct InteractionSummary {
    pub id: String,
    pub session_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub provider: String,
    pub model: Option<String>,
    pub method: String,
    pub path: String,
    pub status_code: Option<u16>,
    pub is_streaming: bool,
    pub chunk_count: u32,
    pub total_latency_ms: Option<f64>,
    pub error: Option<String>,
    pub response_text_preview: Option<String>,
}

impl From<&Interaction> for InteractionSummary {
    fn from(interaction: &Interaction) -> Self {
        let preview = interaction.response.reconstructed_text.as_ref().map(|text| {
            if text.chars().count() > 200 {
                let cut: String = text.chars().take(200).collect();
                format!("{cut}...")
            } else {
                text.clone()
            }
        });
        Self {
            id: interaction.id.clone(),
            session_id: interaction.session_id.clone(),
            started_at: interaction.started_at,
            provider: interaction.provider.to_string(),
            model: interaction.request.model.clone(),
            method: interaction.method.clone(),
            path: interaction.path.clone(),
            status_code: interaction.response.status_code,
            is_streaming: interaction.is_streaming,
            chunk_count: interaction.chunk_count,
            total_latency_ms: interaction.metrics.total_latency_ms,
            error: interaction.error.clone(),
            response_text_preview: preview,
        }
    }
}

pub async fn list_interactions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InteractionsQuery>,
) -> Response {
    let filter = InteractionFilter {
        provider: query.provider,
        model: query.model,
        session_id: query.session_id,
    };
    match state.store.list_interactions(query.limit, query.offset, &filter) {
        Ok(interactions) => {
            let summaries: Vec<InteractionSummary> =
                interactions.iter().map(InteractionSummary::from).collect();
            Json(summaries).into_response()
        }
        Err(e) => storage_error(e),
    }
}

pub async fn get_interaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get_interaction(&id) {
        Ok(Some(interaction)) => Json(interaction).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Not found"})),
        )
            .into_response(),
        Err(e) => storage_error(e),
    }
}

pub async fn clear_interactions(State(state): State<Arc<AppState>>) -> Response {
    match state.store.delete_all().await {
        Ok(deleted) => {
            tracing::info!("Cleared {deleted} interactions");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => storage_error(e),
    }
}

fn storage_error(e: crate::error::WiretapError) -> Response {
    tracing::error!("Admin query failed: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": e.to_string()})),
    )
        .into_response()
}
