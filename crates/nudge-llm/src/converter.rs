//! Wire format of the OpenAI-compatible chat completions endpoint.

use serde_json::{json, Value};

use nudge_core::{ChatTurn, Completion, GatewayError};

/// Request body: the system prompt first, then the conversation turns.
pub fn build_request_body(
    system_prompt: &str,
    turns: &[ChatTurn],
    temperature: f64,
    max_tokens: u32,
) -> Value {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    if !system_prompt.is_empty() {
        messages.push(json!({"role": "system", "content": system_prompt}));
    }
    messages.extend(
        turns
            .iter()
            .map(|t| json!({"role": t.role.to_string(), "content": t.content})),
    );

    json!({
        "temperature": temperature,
        "top_p": 1,
        "stream": false,
        "stop": null,
        "max_tokens": max_tokens,
        "messages": messages,
    })
}

/// Pull `{content, tokensUsed, model}` out of a completion response.
///
/// A missing `usage` block counts as zero tokens; a missing model falls
/// back to `fallback_model`.
pub fn parse_response(body: &Value, fallback_model: &str) -> Result<Completion, GatewayError> {
    let content = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::MalformedResponse("missing choices[0].message.content".into()))?;
    let tokens_used = body
        .pointer("/usage/total_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let model = body
        .get("model")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or(fallback_model);

    Ok(Completion {
        content: content.to_string(),
        tokens_used,
        model: model.to_string(),
    })
}
