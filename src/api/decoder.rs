use crate::error::{LlamaError, Result};
use crate::models::{ChatResponse, ChatStreamResponse, ModelsResponse, StreamEvent};
use serde::de::DeserializeOwned;

/// Decode one streaming frame (the payload of a single `data:` line).
///
/// Unknown fields are ignored. Unknown stop reasons and event types survive
/// as opaque strings; an unknown role or content type is rejected.
pub fn decode_event(frame: &str) -> Result<StreamEvent> {
    decode::<ChatStreamResponse>(frame, "stream event").map(|envelope| envelope.event)
}

/// Decode the single payload of a non-streaming completion.
pub fn decode_response(payload: &str) -> Result<ChatResponse> {
    decode(payload, "chat response")
}

pub fn decode_models(payload: &str) -> Result<ModelsResponse> {
    decode(payload, "models response")
}

fn decode<T: DeserializeOwned>(payload: &str, what: &str) -> Result<T> {
    serde_json::from_str(payload).map_err(|e| {
        LlamaError::MalformedPayload(format!("{}: {} (payload: {})", what, e, preview(payload)))
    })
}

fn preview(payload: &str) -> String {
    const MAX_CHARS: usize = 120;
    let mut chars = payload.chars();
    let head: String = chars.by_ref().take(MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
