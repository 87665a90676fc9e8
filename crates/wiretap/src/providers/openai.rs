//! OpenAI chat/completions parser (also used by compatible providers).

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::model::{CostEstimate, StreamChunk, TokenUsage};
use crate::providers::{extract_image_metadata, AssembledResponse, ChunkInfo, ParsedRequest};

/// Cost per million tokens (input, output) in USD.
const PRICING: &[(&str, f64, f64)] = &[
    ("gpt-4o", 2.50, 10.00),
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4-turbo", 10.00, 30.00),
    ("gpt-4", 30.00, 60.00),
    ("gpt-3.5-turbo", 0.50, 1.50),
    ("o1", 15.00, 60.00),
    ("o1-mini", 3.00, 12.00),
    ("o3-mini", 1.10, 4.40),
];

pub fn parse_request(body: &Value) -> ParsedRequest {
    let messages: Vec<Value> = body
        .get("messages")
        .and_then(|m| m.as_array())
        .cloned()
        .unwrap_or_default();

    // The system prompt rides along as a messages entry
    let system_prompt = messages
        .iter()
        .find(|m| m.get("role").and_then(|r| r.as_str()) == Some("system"))
        .and_then(|m| m.get("content"))
        .and_then(content_as_text);

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
        tools: body
            .get("tools")
            .and_then(|t| t.as_array())
            .cloned(),
        stream_requested: body
            .get("stream")
            .and_then(|s| s.as_bool())
            .unwrap_or(false),
    }
}

fn content_as_text(content: &Value) -> Option<String> {
    if let Some(s) = content.as_str() {
        return Some(s.to_string());
    }
    let parts = content.as_array()?;
    let joined: Vec<&str> = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    Some(joined.join(" "))
}

pub fn parse_response(body: &Value) -> AssembledResponse {
    let mut result = AssembledResponse {
        model: body
            .get("model")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        ..Default::default()
    };

    if let Some(choice) = body.get("choices").and_then(|c| c.as_array()).and_then(|c| c.first()) {
        let message = choice.get("message");
        result.response_text = message
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string);
        result.tool_calls = message
            .and_then(|m| m.get("tool_calls"))
            .and_then(|t| t.as_array())
            .cloned();
        result.finish_reason = choice
            .get("finish_reason")
            .and_then(|f| f.as_str())
            .map(str::to_string);
    }

    result.token_usage = body.get("usage").map(usage_from_value);
    result
}

fn usage_from_value(usage: &Value) -> TokenUsage {
    TokenUsage {
        prompt_tokens: usage.get("prompt_tokens").and_then(|v| v.as_u64()),
        completion_tokens: usage.get("completion_tokens").and_then(|v| v.as_u64()),
        total_tokens: usage.get("total_tokens").and_then(|v| v.as_u64()),
        ..Default::default()
    }
}

pub fn parse_stream_data(data: &str) -> ChunkInfo {
    if data.trim() == "[DONE]" {
        return ChunkInfo {
            decoded: Some(json!({"done": true})),
            event_type: "done".to_string(),
            ..Default::default()
        };
    }

    let Ok(parsed) = serde_json::from_str::<Value>(data) else {
        return ChunkInfo {
            event_type: "malformed".to_string(),
            ..Default::default()
        };
    };

    let mut info = ChunkInfo {
        event_type: "chunk".to_string(),
        ..Default::default()
    };

    if let Some(choice) = parsed
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
    {
        info.delta_text = choice
            .get("delta")
            .and_then(|d| d.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string);
        info.finish_reason = choice
            .get("finish_reason")
            .and_then(|f| f.as_str())
            .map(str::to_string);
    }

    info.decoded = Some(parsed);
    info
}

pub fn reconstruct(chunks: &[StreamChunk]) -> AssembledResponse {
    let mut text = String::new();
    let mut tool_calls: BTreeMap<u64, Value> = BTreeMap::new();
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

        if let Some(choice) = parsed
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
        {
            if let Some(finish) = choice.get("finish_reason").and_then(|f| f.as_str()) {
                result.finish_reason = Some(finish.to_string());
            }
            // Tool calls arrive as per-index deltas with argument fragments
            if let Some(deltas) = choice
                .get("delta")
                .and_then(|d| d.get("tool_calls"))
                .and_then(|t| t.as_array())
            {
                for tc in deltas {
                    let index = tc.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                    let entry = tool_calls.entry(index).or_insert_with(|| {
                        json!({
                            "id": "",
                            "type": "function",
                            "function": {"name": "", "arguments": ""}
                        })
                    });
                    if let Some(id) = tc.get("id").and_then(|i| i.as_str()) {
                        entry["id"] = json!(id);
                    }
                    if let Some(func) = tc.get("function") {
                        if let Some(name) = func.get("name").and_then(|n| n.as_str()) {
                            entry["function"]["name"] = json!(name);
                        }
                        if let Some(args) = func.get("arguments").and_then(|a| a.as_str()) {
                            let existing = entry["function"]["arguments"]
                                .as_str()
                                .unwrap_or("")
                                .to_string();
                            entry["function"]["arguments"] = json!(existing + args);
                        }
                    }
                }
            }
        }

        // Usage arrives in a trailing chunk when the client asked for it
        if let Some(usage) = parsed.get("usage") {
            if !usage.is_null() {
                result.token_usage = Some(usage_from_value(usage));
            }
        }
    }

    result.response_text = if text.is_empty() { None } else { Some(text) };
    if !tool_calls.is_empty() {
        result.tool_calls = Some(tool_calls.into_values().collect());
    }
    result
}

pub fn estimate_cost(model: Option<&str>, usage: Option<&TokenUsage>) -> Option<CostEstimate> {
    let model = model?;
    let usage = usage?;

    // Exact match first, then prefix match
    let pricing = PRICING
        .iter()
        .find(|(name, _, _)| *name == model)
        .or_else(|| PRICING.iter().find(|(name, _, _)| model.starts_with(name)));

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
