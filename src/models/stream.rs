use serde::{Deserialize, Serialize};

use super::response::Metric;
use super::stop_reason::{EventType, StopReason};
use super::tool::ToolCall;

/// One decoded frame of a streaming completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatStreamResponse {
    pub event: StreamEvent,
}

/// A fragment of the completion. Nothing in here is a whole value on its own;
/// the aggregator is what turns a run of these into a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<Delta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Vec<Metric>>,
}

impl StreamEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            delta: None,
            stop_reason: None,
            tool_calls: None,
            metrics: None,
        }
    }

    pub fn with_delta(mut self, delta: Delta) -> Self {
        self.delta = Some(delta);
        self
    }

    pub fn with_stop_reason(mut self, reason: impl Into<StopReason>) -> Self {
        self.stop_reason = Some(reason.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.stop_reason.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(rename = "type")]
    pub delta_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDelta>,
}

impl Delta {
    pub fn text(fragment: impl Into<String>) -> Self {
        Self {
            delta_type: "text".to_string(),
            text: Some(fragment.into()),
            ..Default::default()
        }
    }

    pub fn reasoning(fragment: impl Into<String>) -> Self {
        Self {
            delta_type: "reasoning".to_string(),
            reasoning: Some(fragment.into()),
            ..Default::default()
        }
    }

    pub fn answer(fragment: impl Into<String>) -> Self {
        Self {
            delta_type: "answer".to_string(),
            answer: Some(fragment.into()),
            ..Default::default()
        }
    }

    pub fn tool_call(id: Option<&str>, name: Option<&str>, arguments: Option<&str>) -> Self {
        Self {
            delta_type: "tool_call".to_string(),
            id: id.map(str::to_string),
            function: Some(FunctionDelta {
                name: name.map(str::to_string),
                arguments: arguments.map(str::to_string),
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}
