//! Core request handler: receive -> classify -> forward -> intercept -> store.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::model::{Interaction, Provider, TokenUsage};
use crate::providers::{
    classify, estimate_total_tokens, registry::upstream_base, AssembledResponse, ProviderParser,
};
use crate::proxy::server::AppState;
use crate::proxy::session::strip_session_prefix;
use crate::proxy::streaming::StreamInterceptor;
use crate::redact::{redact_body, redact_headers};

/// Hop-by-hop headers stripped in both directions, plus headers the proxy
/// owns (host, content-length).
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Stripped from forwarded requests so upstream never sends encodings the
/// interceptor cannot frame.
const STRIP_REQUEST_HEADERS: &[&str] = &["accept-encoding"];

/// Stale after the client owns transfer framing again.
const STRIP_RESPONSE_HEADERS: &[&str] = &["content-encoding", "content-length", "transfer-encoding"];

/// Downstream tee channel depth; bounds how far the relay can run ahead of a
/// slow client before upstream reads pause.
const TEE_CHANNEL_DEPTH: usize = 16;

/// Catch-all proxy handler wired as the router fallback.
pub async fn handle_proxy(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let started = Instant::now();
    let started_at = Utc::now();

    let method = request.method().clone();
    let raw_path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);
    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.to_string());
    let request_headers = request.headers().clone();

    let body_bytes = match axum::body::to_bytes(request.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            // Unreadable request; respond 400 and record nothing
            tracing::debug!("Failed to read client request body: {e}");
            return error_response(StatusCode::BAD_REQUEST, "client_malformed", &e.to_string());
        }
    };

    let header_btree = headers_to_btree(&request_headers);
    let (session_id, forward_path) = strip_session_prefix(&raw_path);

    // The admin prefix is reserved; anything unmatched under it is a 404,
    // never provider traffic
    if forward_path.starts_with("/_interceptor") {
        return error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            "Unknown interceptor endpoint",
        );
    }

    let provider = classify(&forward_path);
    let parser = ProviderParser::for_provider(provider);

    let mut interaction = Interaction::begin(provider, method.as_str(), &forward_path);
    interaction.started_at = started_at;
    interaction.session_id = session_id.map(String::from);
    interaction.client_addr = client_addr;
    interaction.request.headers = redact_headers(&header_btree, state.config.redact);

    if !body_bytes.is_empty() {
        let body_text = String::from_utf8_lossy(&body_bytes).into_owned();
        interaction.request.body_raw = Some(if state.config.redact && state.config.redact_body {
            redact_body(&body_text)
        } else {
            body_text
        });
    }

    if let (Some(parser), Ok(body_json)) = (
        parser,
        serde_json::from_slice::<serde_json::Value>(&body_bytes),
    ) {
        let parsed = parser.parse_request(&body_json);
        interaction.request.model = parsed.model;
        interaction.request.system_prompt = parsed.system_prompt;
        interaction.request.messages = parsed.messages;
        interaction.request.tools = parsed.tools;
        interaction.request.image_metadata = parsed.image_metadata;
        interaction.request.stream_requested = parsed.stream_requested;
    }

    // Parent row lands before any chunk, so chunk appends always have a
    // parent to reference
    state.store.insert_started(&interaction).await;

    let mut upstream_url = format!(
        "{}{}",
        upstream_base(provider, &state.config).trim_end_matches('/'),
        forward_path
    );
    if let Some(q) = &query {
        upstream_url.push('?');
        upstream_url.push_str(q);
    }

    tracing::debug!("Proxying {method} {raw_path} -> {upstream_url} ({provider})");

    let mut upstream_request = state
        .client
        .request(method, &upstream_url)
        .headers(filter_headers(&request_headers, STRIP_REQUEST_HEADERS));
    if !body_bytes.is_empty() {
        upstream_request = upstream_request.body(body_bytes);
    }

    let upstream = match upstream_request.send().await {
        Ok(response) => response,
        Err(e) => {
            let (status, label) = if e.is_timeout() {
                (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout")
            } else {
                (StatusCode::BAD_GATEWAY, "upstream_connect")
            };
            tracing::warn!("Upstream request failed: {e}");
            interaction.error = Some(format!("{label}: {e}"));
            interaction.response.status_code = Some(status.as_u16());
            finalize(&mut interaction, started);
            state.store.complete(&interaction).await;
            return error_response(status, label, &e.to_string());
        }
    };

    interaction.metrics.ttfb_ms = Some(elapsed_ms(started));
    interaction.response.status_code = Some(upstream.status().as_u16());
    interaction.response.headers = headers_to_btree(upstream.headers());

    let content_type = upstream
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let is_streaming = content_type.contains("text/event-stream")
        || content_type.contains("application/x-ndjson")
        || (provider == Provider::Ollama
            && content_type.contains("application/json")
            && interaction.request.stream_requested);

    let response_headers = filter_headers(upstream.headers(), STRIP_RESPONSE_HEADERS);

    if is_streaming {
        interaction.is_streaming = true;
        handle_streaming(state, interaction, parser, upstream, response_headers, started)
    } else {
        handle_buffered(state, interaction, parser, upstream, response_headers, started).await
    }
}

/// Relay and record a non-streamed response.
async fn handle_buffered(
    state: Arc<AppState>,
    mut interaction: Interaction,
    parser: Option<ProviderParser>,
    upstream: reqwest::Response,
    response_headers: HeaderMap,
    started: Instant,
) -> Response {
    let status = upstream.status();

    let body = match upstream.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read upstream body: {e}");
            interaction.error = Some(format!("upstream_protocol: {e}"));
            finalize(&mut interaction, started);
            state.store.complete(&interaction).await;
            return error_response(StatusCode::BAD_GATEWAY, "upstream_protocol", &e.to_string());
        }
    };

    interaction.response.body_raw = Some(String::from_utf8_lossy(&body).into_owned());

    if let Some(parser) = parser {
        if let Ok(body_json) = serde_json::from_slice::<serde_json::Value>(&body) {
            let assembled = parser.parse_response(&body_json);
            apply_assembled(&mut interaction, parser, assembled);
        }
    }

    finalize(&mut interaction, started);
    state.store.complete(&interaction).await;

    build_response(status, &response_headers, Body::from(body))
}

/// Relay a streamed response, teeing bytes to the interceptor.
///
/// The returned response is backed by a bounded channel; a spawned task owns
/// the upstream read loop, the interceptor, and finalization, so downstream
/// writes never wait on parsing or persistence.
fn handle_streaming(
    state: Arc<AppState>,
    interaction: Interaction,
    parser: Option<ProviderParser>,
    upstream: reqwest::Response,
    response_headers: HeaderMap,
    started: Instant,
) -> Response {
    let status = upstream.status();
    let (tx, rx) = mpsc::channel::<Bytes>(TEE_CHANNEL_DEPTH);

    tokio::spawn(drive_stream(state, interaction, parser, upstream, tx, started));

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    build_response(status, &response_headers, body)
}

async fn drive_stream(
    state: Arc<AppState>,
    mut interaction: Interaction,
    parser: Option<ProviderParser>,
    upstream: reqwest::Response,
    tx: mpsc::Sender<Bytes>,
    started: Instant,
) {
    let mut interceptor = StreamInterceptor::new(parser, &interaction.id);
    let mut stream = upstream.bytes_stream();

    while let Some(item) = stream.next().await {
        match item {
            Ok(bytes) => {
                // Forward first; parsing and persistence ride behind
                if tx.send(bytes.clone()).await.is_err() {
                    tracing::debug!("Client disconnected mid-stream");
                    interaction.error = Some("client_disconnect".to_string());
                    break;
                }
                for chunk in interceptor.feed(&bytes) {
                    if interaction.metrics.ttft_ms.is_none() && chunk.delta_text.is_some() {
                        interaction.metrics.ttft_ms = Some(elapsed_ms(started));
                    }
                    state.store.append_chunk(chunk).await;
                }
            }
            Err(e) => {
                tracing::warn!("Upstream stream error: {e}");
                interaction.error = Some(if e.is_timeout() {
                    "upstream_timeout".to_string()
                } else {
                    format!("upstream_protocol: {e}")
                });
                break;
            }
        }
    }
    // Dropping the sender closes the downstream body
    drop(tx);

    for chunk in interceptor.flush_tail() {
        if interaction.metrics.ttft_ms.is_none() && chunk.delta_text.is_some() {
            interaction.metrics.ttft_ms = Some(elapsed_ms(started));
        }
        state.store.append_chunk(chunk).await;
    }

    let (raw, chunks) = interceptor.into_parts();
    interaction.chunk_count = chunks.len() as u32;
    interaction.response.body_raw = Some(raw);

    if let Some(parser) = parser {
        let assembled = parser.reconstruct(&chunks);
        apply_assembled(&mut interaction, parser, assembled);
    }

    finalize(&mut interaction, started);
    state.store.complete(&interaction).await;
}

/// Fold an assembled response into the interaction and settle accounting.
fn apply_assembled(
    interaction: &mut Interaction,
    parser: ProviderParser,
    assembled: AssembledResponse,
) {
    interaction.response.reconstructed_text = assembled.response_text;
    interaction.response.tool_calls = assembled.tool_calls;
    interaction.response.finish_reason = assembled.finish_reason;
    if interaction.request.model.is_none() {
        interaction.request.model = assembled.model;
    }
    if interaction.error.is_none() {
        interaction.error = assembled.error;
    }

    let mut usage = assembled.token_usage;
    if usage.is_none() {
        // Provider reported nothing; fall back to the byte heuristic
        if let Some(text) = &interaction.response.reconstructed_text {
            usage = Some(TokenUsage {
                total_tokens: Some(estimate_total_tokens(text)),
                estimated: true,
                ..Default::default()
            });
        }
    }
    interaction.metrics.cost_estimate =
        parser.estimate_cost(interaction.request.model.as_deref(), usage.as_ref());
    interaction.metrics.token_usage = usage;
}

fn finalize(interaction: &mut Interaction, started: Instant) {
    interaction.completed_at = Some(Utc::now());
    interaction.metrics.total_latency_ms = Some(elapsed_ms(started));
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn headers_to_btree(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn filter_headers(headers: &HeaderMap, extra_strip: &[&str]) -> HeaderMap {
    let mut filtered = HeaderMap::new();
    for (name, value) in headers {
        let name_str = name.as_str();
        if HOP_BY_HOP_HEADERS.contains(&name_str) || extra_strip.contains(&name_str) {
            continue;
        }
        filtered.insert(name.clone(), value.clone());
    }
    filtered
}

fn build_response(status: reqwest::StatusCode, headers: &HeaderMap, body: Body) -> Response {
    let mut builder = Response::builder().status(status.as_u16());
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    builder.body(body).unwrap_or_else(|e| {
        tracing::error!("Failed to build relay response: {e}");
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "relay_failure",
            "failed to build response",
        )
    })
}

/// JSON error body for responses the proxy synthesizes itself.
pub fn error_response(status: StatusCode, error_type: &str, message: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": error_type,
            "message": message,
        }
    });
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::empty())
                .expect("empty response")
        })
}
