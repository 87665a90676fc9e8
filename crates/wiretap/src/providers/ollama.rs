//! Ollama parser (/api/generate and /api/chat, NDJSON streaming).

use serde_json::{json, Value};

use crate::model::{CostEstimate, StreamChunk, TokenUsage};
use crate::providers::{AssembledResponse, ChunkInfo, ParsedRequest};

pub fn parse_request(body: &Value) -> ParsedRequest {
    let mut messages: Option<Vec<Value>> = body
        .get("messages")
        .and_then(|m| m.as_array())
        .cloned();

    // /api/chat may carry the system prompt as a message; /api/generate as a field
    let mut system_prompt = body
        .get("system")
        .and_then(|s| s.as_str())
        .map(str::to_string);
    if let Some(msgs) = &messages {
        if let Some(system) = msgs
            .iter()
            .find(|m| m.get("role").and_then(|r| r.as_str()) == Some("system"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
        {
            system_prompt = Some(system.to_string());
        }
    }

    // /api/generate uses a bare prompt; normalize to one user message
    if messages.is_none() {
        if let Some(prompt) = body.get("prompt").and_then(|p| p.as_str()) {
            messages = Some(vec![json!({"role": "user", "content": prompt})]);
        }
    }

    ParsedRequest {
        model: body
            .get("model")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        system_prompt,
        messages,
        tools: body.get("tools").and_then(|t| t.as_array()).cloned(),
        // Ollama streams unless the client opts out
        stream_requested: body
            .get("stream")
            .and_then(|s| s.as_bool())
            .unwrap_or(true),
        image_metadata: Vec::new(),
    }
}

pub fn parse_response(body: &Value) -> AssembledResponse {
    let mut result = AssembledResponse {
        model: body
            .get("model")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        ..Default::default()
    };

    // /api/chat shape
    if let Some(message) = body.get("message") {
        result.response_text = message
            .get("content")
            .and_then(|c| c.as_str())
            .map(str::to_string);
        result.tool_calls = message
            .get("tool_calls")
            .and_then(|t| t.as_array())
            .cloned();
    }

    // /api/generate shape
    if let Some(response) = body.get("response").and_then(|r| r.as_str()) {
        result.response_text = Some(response.to_string());
    }

    result.token_usage = usage_from_value(body);
    if body.get("done").and_then(|d| d.as_bool()) == Some(true) {
        result.finish_reason = Some("done".to_string());
    }

    result
}

fn usage_from_value(parsed: &Value) -> Option<TokenUsage> {
    let prompt_tokens = parsed.get("prompt_eval_count").and_then(|v| v.as_u64());
    let completion_tokens = parsed.get("eval_count").and_then(|v| v.as_u64());
    if prompt_tokens.is_none() && completion_tokens.is_none() {
        return None;
    }
    Some(TokenUsage {
        prompt_tokens,
        completion_tokens,
        ..Default::default()
    })
}

pub fn parse_stream_data(data: &str) -> ChunkInfo {
    let Ok(parsed) = serde_json::from_str::<Value>(data) else {
        return ChunkInfo {
            event_type: "malformed".to_string(),
            ..Default::default()
        };
    };

    let done = parsed.get("done").and_then(|d| d.as_bool()) == Some(true);
    let mut info = ChunkInfo {
        event_type: if done { "done" } else { "chunk" }.to_string(),
        ..Default::default()
    };

    // /api/chat streaming
    info.delta_text = parsed
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    // /api/generate streaming
    if let Some(response) = parsed.get("response").and_then(|r| r.as_str()) {
        info.delta_text = Some(response.to_string());
    }

    if done {
        info.finish_reason = Some("done".to_string());
    }

    info.decoded = Some(parsed);
    info
}

pub fn reconstruct(chunks: &[StreamChunk]) -> AssembledResponse {
    let mut text = String::new();
    let mut result = AssembledResponse::default();

    for chunk in chunks {
        if let Some(delta) = &chunk.delta_text {
            text.push_str(delta);
        }
        let Some(parsed) = &chunk.decoded else {
            continue;
        };

        if result.model.is_none() {
            result.model = parsed
                .get("model")
                .and_then(|m| m.as_str())
                .map(str::to_string);
        }
        if parsed.get("done").and_then(|d| d.as_bool()) == Some(true) {
            result.token_usage = usage_from_value(parsed);
            result.finish_reason = Some("done".to_string());
        }
    }

    result.response_text = if text.is_empty() { None } else { Some(text) };
    result
}

pub fn estimate_cost(model: Option<&str>, _usage: Option<&TokenUsage>) -> Option<CostEstimate> {
    // Local models have no API cost
    let model = model?;
    Some(CostEstimate {
        input_cost: 0.0,
        output_cost: 0.0,
        total_cost: 0.0,
        model: Some(model.to_string()),
        note: Some("Local model (Ollama) - no API cost".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn chunk(seq: u32, data: &str) -> StreamChunk {
        let info = parse_stream_data(data);
        StreamChunk {
            id: format!("c{seq}"),
            interaction_id: "i".to_string(),
            seq,
            received_at: Utc::now(),
            raw: data.to_string(),
            decoded: info.decoded,
            event_type: info.event_type,
            delta_text: info.delta_text,
        }
    }

    #[test]
    fn test_parse_generate_request() {
        let body = json!({"model": "llama3.2", "prompt": "Why is the sky blue?"});
        let parsed = parse_request(&body);
        assert_eq!(parsed.model.as_deref(), Some("llama3.2"));
        let messages = parsed.messages.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "Why is the sky blue?");
        // Ollama defaults to streaming
        assert!(parsed.stream_requested);
    }

    #[test]
    fn test_parse_chat_request_with_system_message() {
        let body = json!({
            "model": "llama3.2",
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "hi"}
            ],
            "stream": false
        });
        let parsed = parse_request(&body);
        assert_eq!(parsed.system_prompt.as_deref(), Some("Be brief."));
        assert!(!parsed.stream_requested);
    }

    #[test]
    fn test_parse_generate_response() {
        let body = json!({
            "model": "llama3.2",
            "response": "The sky is blue because...",
            "done": true,
            "prompt_eval_count": 12,
            "eval_count": 30
        });
        let result = parse_response(&body);
        assert_eq!(
            result.response_text.as_deref(),
            Some("The sky is blue because...")
        );
        let usage = result.token_usage.unwrap();
        assert_eq!(usage.prompt_tokens, Some(12));
        assert_eq!(usage.completion_tokens, Some(30));
        assert_eq!(result.finish_reason.as_deref(), Some("done"));
    }

    #[test]
    fn test_parse_chat_response() {
        let body = json!({
            "model": "llama3.2",
            "message": {"role": "assistant", "content": "Hello there"},
            "done": true
        });
        let result = parse_response(&body);
        assert_eq!(result.response_text.as_deref(), Some("Hello there"));
    }

    #[test]
    fn test_reconstruct_generate_stream() {
        let chunks = vec![
            chunk(0, r#"{"model":"llama3.2","response":"A","done":false}"#),
            chunk(
                1,
                r#"{"model":"llama3.2","response":"B","done":true,"prompt_eval_count":5,"eval_count":2}"#,
            ),
        ];
        let result = reconstruct(&chunks);
        assert_eq!(result.response_text.as_deref(), Some("AB"));
        assert_eq!(result.model.as_deref(), Some("llama3.2"));
        let usage = result.token_usage.unwrap();
        assert_eq!(usage.prompt_tokens, Some(5));
        assert_eq!(usage.completion_tokens, Some(2));
    }

    #[test]
    fn test_reconstruct_chat_stream() {
        let chunks = vec![
            chunk(0, r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#),
            chunk(1, r#"{"message":{"role":"assistant","content":"lo"},"done":false}"#),
            chunk(2, r#"{"message":{"role":"assistant","content":""},"done":true}"#),
        ];
        let result = reconstruct(&chunks);
        assert_eq!(result.response_text.as_deref(), Some("Hello"));
        assert_eq!(result.finish_reason.as_deref(), Some("done"));
    }

    #[test]
    fn test_malformed_line() {
        let info = parse_stream_data("not json at all");
        assert_eq!(info.event_type, "malformed");
        assert!(info.decoded.is_none());
    }

    #[test]
    fn test_cost_is_zero() {
        let cost = estimate_cost(Some("llama3.2"), None).unwrap();
        assert_eq!(cost.total_cost, 0.0);
        assert!(cost.note.unwrap().contains("no API cost"));
    }
}
