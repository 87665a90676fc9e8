//! Anthropic Messages API parser (SSE with named events).

use serde_json::{json, Value};

use crate::model::{CostEstimate, StreamChunk, TokenUsage};
use crate::providers::{extract_image_metadata, AssembledResponse, ChunkInfo, ParsedRequest};

/// Cost per million tokens (input, output) in USD.
const PRICING: &[(&str, f64, f64)] = &[
    ("claude-opus-4", 15.00, 75.00),
    ("claude-sonnet-4", 3.00, 15.00),
    ("claude-3-5-sonnet", 3.00, 15.00),
    ("claude-3-5-haiku", 0.80, 4.00),
    ("claude-3-opus", 15.00, 75.00),
    ("claude-3-sonnet", 3.00, 15.00),
    ("claude-3-haiku", 0.25, 1.25),
];

pub fn parse_request(body: &Value) -> ParsedRequest {
    let messages: Vec<Value> = body
        .get("messages")
        .and_then(|m| m.as_array())
        .cloned()
        .unwrap_or_default();

    // System prompt is a top-level string or a list of text blocks
    let system_prompt = match body.get("system") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Array(blocks)) => {
            let parts: Vec<&str> = blocks
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("\n"))
            }
        }
        _ => None,
    };

    ParsedRequest {
        model: body
            .get("model")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        system_prompt,
        image_metadata: extract_image_metadata(&messages),
        messages: if messages.is_empty() {
            None
        } else {
            Some(messages)
        },
        tools: body.get("tools").and_then(|t| t.as_array()).cloned(),
        stream_requested: body
            .get("stream")
            .and_then(|s| s.as_bool())
            .unwrap_or(false),
    }
}

pub fn parse_response(body: &Value) -> AssembledResponse {
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();

    if let Some(content) = body.get("content").and_then(|c| c.as_array()) {
        for block in content {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                        text_parts.push(text.to_string());
                    }
                }
                Some("tool_use") => tool_calls.push(block.clone()),
                Some("thinking") => {
                    if let Some(thinking) = block.get("thinking").and_then(|t| t.as_str()) {
                        text_parts.push(format!("[thinking]{thinking}[/thinking]"));
                    }
                }
                _ => {}
            }
        }
    }

    AssembledResponse {
        response_text: if text_parts.is_empty() {
            None
        } else {
            Some(text_parts.join("\n"))
        },
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
        token_usage: body.get("usage").map(usage_from_value),
        finish_reason: body
            .get("stop_reason")
            .and_then(|s| s.as_str())
            .map(str::to_string),
        model: body
            .get("model")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        error: None,
    }
}

fn usage_from_value(usage: &Value) -> TokenUsage {
    TokenUsage {
        prompt_tokens: usage.get("input_tokens").and_then(|v| v.as_u64()),
        completion_tokens: usage.get("output_tokens").and_then(|v| v.as_u64()),
        cache_creation_tokens: usage
            .get("cache_creation_input_tokens")
            .and_then(|v| v.as_u64()),
        cache_read_tokens: usage
            .get("cache_read_input_tokens")
            .and_then(|v| v.as_u64()),
        ..Default::default()
    }
}

pub fn parse_stream_data(data: &str) -> ChunkInfo {
    let Ok(parsed) = serde_json::from_str::<Value>(data) else {
        return ChunkInfo {
            event_type: "malformed".to_string(),
            ..Default::default()
        };
    };

    let event_type = parsed
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("unknown")
        .to_string();

    let mut info = ChunkInfo {
        event_type: event_type.clone(),
        ..Default::default()
    };

    match event_type.as_str() {
        "content_block_delta" => {
            let delta = parsed.get("delta");
            match delta.and_then(|d| d.get("type")).and_then(|t| t.as_str()) {
                Some("text_delta") => {
                    info.delta_text = delta
                        .and_then(|d| d.get("text"))
                        .and_then(|t| t.as_str())
                        .map(str::to_string);
                }
                Some("thinking_delta") => {
                    info.delta_text = delta
                        .and_then(|d| d.get("thinking"))
                        .and_then(|t| t.as_str())
                        .map(str::to_string);
                }
                _ => {}
            }
        }
        "message_delta" => {
            info.finish_reason = parsed
                .get("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(|s| s.as_str())
                .map(str::to_string);
        }
        _ => {}
    }

    info.decoded = Some(parsed);
    info
}

pub fn reconstruct(chunks: &[StreamChunk]) -> AssembledResponse {
    let mut text = String::new();
    let mut tool_calls: Vec<Value> = Vec::new();
    let mut current_tool: Option<Value> = None;
    let mut tool_json = String::new();
    let mut result = AssembledResponse::default();
    let mut input_tokens: Option<u64> = None;
    let mut output_tokens: Option<u64> = None;
    let mut cache_creation: Option<u64> = None;
    let mut cache_read: Option<u64> = None;

    for chunk in chunks {
        let Some(parsed) = &chunk.decoded else {
            continue;
        };

        match parsed.get("type").and_then(|t| t.as_str()) {
            Some("message_start") => {
                let message = parsed.get("message");
                result.model = message
                    .and_then(|m| m.get("model"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string);
                if let Some(usage) = message.and_then(|m| m.get("usage")) {
                    input_tokens = usage.get("input_tokens").and_then(|v| v.as_u64());
                    cache_creation = usage
                        .get("cache_creation_input_tokens")
                        .and_then(|v| v.as_u64());
                    cache_read = usage
                        .get("cache_read_input_tokens")
                        .and_then(|v| v.as_u64());
                }
            }
            Some("content_block_start") => {
                let block = parsed.get("content_block");
                if block.and_then(|b| b.get("type")).and_then(|t| t.as_str()) == Some("tool_use") {
                    current_tool = Some(json!({
                        "type": "tool_use",
                        "id": block.and_then(|b| b.get("id")).cloned().unwrap_or(json!("")),
                        "name": block.and_then(|b| b.get("name")).cloned().unwrap_or(json!("")),
                    }));
                    tool_json.clear();
                }
            }
            Some("content_block_delta") => {
                if let Some(delta) = parsed.get("delta") {
                    match delta.get("type").and_then(|t| t.as_str()) {
                        Some("text_delta") => {
                            if let Some(t) = delta.get("text").and_then(|t| t.as_str()) {
                                text.push_str(t);
                            }
                        }
                        Some("input_json_delta") => {
                            if let Some(partial) =
                                delta.get("partial_json").and_then(|p| p.as_str())
                            {
                                tool_json.push_str(partial);
                            }
                        }
                        Some("thinking_delta") => {
                            if let Some(t) = delta.get("thinking").and_then(|t| t.as_str()) {
                                text.push_str(t);
                            }
                        }
                        _ => {}
                    }
                }
            }
            Some("content_block_stop") => {
                if let Some(mut tool) = current_tool.take() {
                    // Accumulated arguments become the tool input; keep the
                    // raw string when they never formed valid JSON
                    tool["input"] = serde_json::from_str(&tool_json)
                        .unwrap_or_else(|_| json!(tool_json.clone()));
                    tool_calls.push(tool);
                }
            }
            Some("message_delta") => {
                if let Some(stop) = parsed
                    .get("delta")
                    .and_then(|d| d.get("stop_reason"))
                    .and_then(|s| s.as_str())
                {
                    result.finish_reason = Some(stop.to_string());
                }
                if let Some(tokens) = parsed
                    .get("usage")
                    .and_then(|u| u.get("output_tokens"))
                    .and_then(|v| v.as_u64())
                {
                    output_tokens = Some(tokens);
                }
            }
            Some("error") => {
                let message = parsed
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("stream error");
                result.error = Some(message.to_string());
                break;
            }
            // ping, message_stop, and anything new are no-ops for assembly
            _ => {}
        }
    }

    if input_tokens.is_some() || output_tokens.is_some() {
        result.token_usage = Some(TokenUsage {
            prompt_tokens: input_tokens,
            completion_tokens: output_tokens,
            cache_creation_tokens: cache_creation,
            cache_read_tokens: cache_read,
            ..Default::default()
        });
    }
    result.response_text = if text.is_empty() { None } else { Some(text) };
    if !tool_calls.is_empty() {
        result.tool_calls = Some(tool_calls);
    }
    result
}

pub fn estimate_cost(model: Option<&str>, usage: Option<&TokenUsage>) -> Option<CostEstimate> {
    let model = model?;
    let usage = usage?;

    let pricing = PRICING.iter().find(|(name, _, _)| model.starts_with(name));

    let Some((_, input_per_m, output_per_m)) = pricing else {
        return Some(CostEstimate {
            model: Some(model.to_string()),
            note: Some("Unknown model, no pricing available".to_string()),
            ..Default::default()
        });
    };

    let input_cost = usage.prompt_tokens.unwrap_or(0) as f64 / 1_000_000.0 * input_per_m;
    let output_cost = usage.completion_tokens.unwrap_or(0) as f64 / 1_000_000.0 * output_per_m;

    Some(CostEstimate {
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
        model: Some(model.to_string()),
        note: None,
    })
}
