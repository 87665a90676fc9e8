//! Provider-specific request/response/stream decoding.
//!
//! Each provider speaks a different wire format (OpenAI chat completions,
//! Anthropic messages SSE, Ollama NDJSON); the parsers here turn all three
//! into one uniform shape. Dispatch is a closed enum over the three concrete
//! parsers rather than trait objects.

pub mod anthropic;
pub mod ollama;
pub mod openai;
pub mod registry;

use serde_json::Value;

use crate::model::{CostEstimate, ImageRef, Provider, StreamChunk, TokenUsage};

pub use registry::classify;

/// Wire framing used by a provider's streamed responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `data: <json>` lines terminated by blank lines
    Sse,
    /// One JSON object per line
    Ndjson,
}

/// Normalized view of a request body.
#[derive(Debug, Clone, Default)]
pub struct ParsedRequest {
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub messages: Option<Vec<Value>>,
    pub tools: Option<Vec<Value>>,
    pub stream_requested: bool,
    pub image_metadata: Vec<ImageRef>,
}

/// Normalized view of a response, whether streamed or not.
#[derive(Debug, Clone, Default)]
pub struct AssembledResponse {
    pub response_text: Option<String>,
    pub tool_calls: Option<Vec<Value>>,
    pub token_usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
    /// Model name when it appears in the response but not the request
    pub model: Option<String>,
    /// Error surfaced by the stream itself (e.g. Anthropic `error` events)
    pub error: Option<String>,
}

/// Result of decoding one framed stream unit.
#[derive(Debug, Clone, Default)]
pub struct ChunkInfo {
    pub decoded: Option<Value>,
    pub event_type: String,
    pub delta_text: Option<String>,
    pub finish_reason: Option<String>,
}

/// The three concrete parsers behind one dispatch point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderParser {
    OpenAI,
    Anthropic,
    Ollama,
}

impl ProviderParser {
    /// Parser for a classified provider; passthrough traffic has none.
    pub fn for_provider(provider: Provider) -> Option<Self> {
        match provider {
            Provider::OpenAI => Some(ProviderParser::OpenAI),
            Provider::Anthropic => Some(ProviderParser::Anthropic),
            Provider::Ollama => Some(ProviderParser::Ollama),
            Provider::Passthrough => None,
        }
    }

    pub fn framing(&self) -> Framing {
        match self {
            ProviderParser::OpenAI | ProviderParser::Anthropic => Framing::Sse,
            ProviderParser::Ollama => Framing::Ndjson,
        }
    }

    /// Normalize a request body.
    pub fn parse_request(&self, body: &Value) -> ParsedRequest {
        match self {
            ProviderParser::OpenAI => openai::parse_request(body),
            ProviderParser::Anthropic => anthropic::parse_request(body),
            ProviderParser::Ollama => ollama::parse_request(body),
        }
    }

    /// Normalize a non-streamed response body.
    pub fn parse_response(&self, body: &Value) -> AssembledResponse {
        match self {
            ProviderParser::OpenAI => openai::parse_response(body),
            ProviderParser::Anthropic => anthropic::parse_response(body),
            ProviderParser::Ollama => ollama::parse_response(body),
        }
    }

    /// Decode one framed unit of a stream (one SSE data payload or one
    /// NDJSON line). Malformed frames never fail; they come back with
    /// `decoded = None` and `event_type = "malformed"`.
    pub fn parse_stream_data(&self, data: &str) -> ChunkInfo {
        match self {
            ProviderParser::OpenAI => openai::parse_stream_data(data),
            ProviderParser::Anthropic => anthropic::parse_stream_data(data),
            ProviderParser::Ollama => ollama::parse_stream_data(data),
        }
    }

    /// Assemble the full response from recorded stream chunks.
    pub fn reconstruct(&self, chunks: &[StreamChunk]) -> AssembledResponse {
        match self {
            ProviderParser::OpenAI => openai::reconstruct(chunks),
            ProviderParser::Anthropic => anthropic::reconstruct(chunks),
            ProviderParser::Ollama => ollama::reconstruct(chunks),
        }
    }

    pub fn estimate_cost(
        &self,
        model: Option<&str>,
        usage: Option<&TokenUsage>,
    ) -> Option<CostEstimate> {
        match self {
            ProviderParser::OpenAI => openai::estimate_cost(model, usage),
            ProviderParser::Anthropic => anthropic::estimate_cost(model, usage),
            ProviderParser::Ollama => ollama::estimate_cost(model, usage),
        }
    }
}

/// Heuristic token count for providers that report no usage:
/// roughly one token per four bytes of text, at least one for non-empty text.
pub fn estimate_total_tokens(text: &str) -> u64 {
    let bytes = text.len() as u64;
    if bytes == 0 {
        0
    } else {
        bytes.div_ceil(4).max(1)
    }
}

/// Collect image metadata from messages without retaining any base64 data.
/// Handles the OpenAI `image_url` and Anthropic `image` block shapes.
pub fn extract_image_metadata(messages: &[Value]) -> Vec<ImageRef> {
    let mut images = Vec::new();

    for msg in messages {
        let Some(parts) = msg.get("content").and_then(|c| c.as_array()) else {
            continue;
        };
        for part in parts {
            match part.get("type").and_then(|t| t.as_str()) {
                Some("image_url") => {
                    let url = part
                        .get("image_url")
                        .and_then(|u| u.get("url"))
                        .and_then(|u| u.as_str())
                        .unwrap_or("");
                    let (mime, size_bytes) = if let Some(rest) = url.strip_prefix("data:") {
                        let mime = rest.split(';').next().unwrap_or("unknown").to_string();
                        let b64_len = rest.split_once(',').map(|(_, d)| d.len()).unwrap_or(0);
                        (mime, (b64_len as u64 * 3) / 4)
                    } else {
                        ("url".to_string(), 0)
                    };
                    images.push(ImageRef {
                        index: images.len(),
                        mime,
                        size_bytes,
                    });
                }
                Some("image") => {
                    let source = part.get("source");
                    let mime = source
                        .and_then(|s| s.get("media_type"))
                        .and_then(|m| m.as_str())
                        .unwrap_or("unknown")
                        .to_string();
                    let b64_len = source
                        .and_then(|s| s.get("data"))
                        .and_then(|d| d.as_str())
                        .map(|d| d.len())
                        .unwrap_or(0);
                    images.push(ImageRef {
                        index: images.len(),
                        mime,
                        size_bytes: (b64_len as u64 * 3) / 4,
                    });
                }
                _ => {}
            }
        }
    }

    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parser_for_provider() {
        assert_eq!(
            ProviderParser::for_provider(Provider::OpenAI),
            Some(ProviderParser::OpenAI)
        );
        assert_eq!(ProviderParser::for_provider(Provider::Passthrough), None);
    }

    #[test]
    fn test_framing() {
        assert_eq!(ProviderParser::OpenAI.framing(), Framing::Sse);
        assert_eq!(ProviderParser::Anthropic.framing(), Framing::Sse);
        assert_eq!(ProviderParser::Ollama.framing(), Framing::Ndjson);
    }

    #[test]
    fn test_estimate_total_tokens() {
        assert_eq!(estimate_total_tokens(""), 0);
        assert_eq!(estimate_total_tokens("a"), 1);
        assert_eq!(estimate_total_tokens("abcd"), 1);
        assert_eq!(estimate_total_tokens("abcde"), 2);
        assert_eq!(estimate_total_tokens(&"x".repeat(400)), 100);
    }

    #[test]
    fn test_extract_image_metadata_openai_data_url() {
        let messages = vec![json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "what is this?"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAABBBBCCCC"}}
            ]
        })];
        let images = extract_image_metadata(&messages);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].index, 0);
        assert_eq!(images[0].mime, "image/png");
        assert_eq!(images[0].size_bytes, 9);
    }

    #[test]
    fn test_extract_image_metadata_anthropic() {
        let messages = vec![json!({
            "role": "user",
            "content": [
                {"type": "image", "source": {"type": "base64", "media_type": "image/jpeg", "data": "AAAABBBB"}},
                {"type": "text", "text": "describe"}
            ]
        })];
        let images = extract_image_metadata(&messages);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime, "image/jpeg");
        assert_eq!(images[0].size_bytes, 6);
    }

    #[test]
    fn test_extract_image_metadata_none_for_plain_text() {
        let messages = vec![json!({"role": "user", "content": "hello"})];
        assert!(extract_image_metadata(&messages).is_empty());
    }
}
