//! Data models for intercepted interactions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Upstream provider an intercepted request was classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    Anthropic,
    Ollama,
    /// No provider parser applies; bytes are relayed and logged raw.
    Passthrough,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Ollama => "ollama",
            Provider::Passthrough => "passthrough",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(Provider::OpenAI),
            "anthropic" => Some(Provider::Anthropic),
            "ollama" => Some(Provider::Ollama),
            "passthrough" => Some(Provider::Passthrough),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token usage reported by (or estimated for) a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    /// Anthropic prompt-cache accounting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u64>,
    /// True when counts come from the byte heuristic, not the provider
    #[serde(default)]
    pub estimated: bool,
}

impl TokenUsage {
    /// Total, falling back to prompt + completion when not reported.
    pub fn computed_total(&self) -> u64 {
        self.total_tokens.unwrap_or_else(|| {
            self.prompt_tokens.unwrap_or(0) + self.completion_tokens.unwrap_or(0)
        })
    }
}

/// Estimated cost of an interaction in USD.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Metadata about one image in a request; the raw base64 is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Position among images in the request, 0-based
    pub index: usize,
    pub mime: String,
    /// Approximate decoded size in bytes
    pub size_bytes: u64,
}

/// Request-side record of an interaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Headers with secret values redacted
    pub headers: BTreeMap<String, String>,
    pub body_raw: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub messages: Option<Vec<Value>>,
    pub tools: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_metadata: Vec<ImageRef>,
    #[serde(default)]
    pub stream_requested: bool,
}

/// Response-side record of an interaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub status_code: Option<u16>,
    pub headers: BTreeMap<String, String>,
    /// For streamed responses, the concatenated wire bytes
    pub body_raw: Option<String>,
    /// Assistant message assembled by the provider parser
    pub reconstructed_text: Option<String>,
    pub tool_calls: Option<Vec<Value>>,
    pub finish_reason: Option<String>,
}

/// Latency and accounting metrics for an interaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionMetrics {
    pub token_usage: Option<TokenUsage>,
    pub cost_estimate: Option<CostEstimate>,
    /// Milliseconds to the first upstream byte
    pub ttfb_ms: Option<f64>,
    /// Milliseconds to the first content token; null unless streaming
    pub ttft_ms: Option<f64>,
    pub total_latency_ms: Option<f64>,
}

/// One complete intercepted request/response cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub session_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub provider: Provider,
    pub method: String,
    pub path: String,
    pub client_addr: Option<String>,
    pub request: RequestRecord,
    pub response: ResponseRecord,
    pub metrics: InteractionMetrics,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default)]
    pub chunk_count: u32,
    pub error: Option<String>,
    /// Populated on `get_interaction`; not serialized into the row itself
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<StreamChunk>,
}

impl Interaction {
    /// Start a new interaction record at request receipt.
    pub fn begin(provider: Provider, method: &str, path: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: None,
            started_at: Utc::now(),
            completed_at: None,
            provider,
            method: method.to_string(),
            path: path.to_string(),
            client_addr: None,
            request: RequestRecord::default(),
            response: ResponseRecord::default(),
            metrics: InteractionMetrics::default(),
            is_streaming: false,
            chunk_count: 0,
            error: None,
            chunks: Vec::new(),
        }
    }
}

/// One framed unit received during a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub id: String,
    pub interaction_id: String,
    /// Dense 0-based receive order
    pub seq: u32,
    pub received_at: DateTime<Utc>,
    /// The chunk as transported (one SSE data line or NDJSON line)
    pub raw: String,
    /// Parsed JSON payload; None for malformed frames
    pub decoded: Option<Value>,
    /// Provider-specific tag, e.g. `content_block_delta`, `done`, `malformed`
    pub event_type: String,
    /// Text fragment extracted from this chunk, if any
    pub delta_text: Option<String>,
}

/// Aggregate view of one session, derived by grouping interactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub interaction_count: u64,
    pub first_interaction: Option<DateTime<Utc>>,
    pub last_interaction: Option<DateTime<Utc>>,
    pub providers: Vec<String>,
    pub models: Vec<String>,
    pub total_latency_ms: Option<f64>,
}

/// Aggregate statistics over all stored interactions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_interactions: u64,
    pub by_provider: BTreeMap<String, u64>,
    pub by_model: BTreeMap<String, u64>,
    pub error_count: u64,
    pub error_rate: f64,
    pub avg_latency_ms: Option<f64>,
    pub total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_round_trip() {
        for p in [
            Provider::OpenAI,
            Provider::Anthropic,
            Provider::Ollama,
            Provider::Passthrough,
        ] {
            assert_eq!(Provider::from_str_loose(p.as_str()), Some(p));
        }
        assert_eq!(Provider::from_str_loose("gemini"), None);
    }

    #[test]
    fn test_provider_serde_lowercase() {
        let json = serde_json::to_string(&Provider::Anthropic).unwrap();
        assert_eq!(json, "\"anthropic\"");
        let back: Provider = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(back, Provider::OpenAI);
    }

    #[test]
    fn test_token_usage_computed_total() {
        let usage = TokenUsage {
            prompt_tokens: Some(10),
            completion_tokens: Some(5),
            ..Default::default()
        };
        assert_eq!(usage.computed_total(), 15);

        let reported = TokenUsage {
            total_tokens: Some(42),
            ..Default::default()
        };
        assert_eq!(reported.computed_total(), 42);
    }

    #[test]
    fn test_interaction_begin() {
        let interaction = Interaction::begin(Provider::OpenAI, "POST", "/v1/chat/completions");
        assert_eq!(interaction.provider, Provider::OpenAI);
        assert_eq!(interaction.method, "POST");
        assert!(interaction.completed_at.is_none());
        assert_eq!(interaction.chunk_count, 0);
        assert!(!interaction.id.is_empty());
    }

    #[test]
    fn test_interaction_serde_round_trip() {
        let mut interaction = Interaction::begin(Provider::Anthropic, "POST", "/v1/messages");
        interaction.session_id = Some("agent-a".to_string());
        interaction.response.reconstructed_text = Some("Hello".to_string());

        let json = serde_json::to_string(&interaction).unwrap();
        let back: Interaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, interaction.id);
        assert_eq!(back.session_id.as_deref(), Some("agent-a"));
        assert_eq!(back.response.reconstructed_text.as_deref(), Some("Hello"));
    }
}
