use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{LlamaError, Result};
use crate::models::{
    ContentSegment, Delta, FunctionDelta, Message, Metric, Role, StopReason, StreamEvent, ToolCall,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    Active,
    Terminated,
}

/// What [`StreamAggregator::apply`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Content was folded into the buffers.
    Applied,
    /// The event carried a stop reason; its content (if any) was applied and
    /// the aggregator is now terminated.
    Terminal,
    /// The aggregator had already terminated, nothing changed.
    Ignored,
}

/// Immutable view of the completion so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub text: String,
    pub reasoning: String,
    pub answer: String,
    /// In order of first appearance of each id.
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: Option<StopReason>,
    pub metrics: Option<Vec<Metric>>,
}

impl Snapshot {
    pub fn is_terminal(&self) -> bool {
        self.stop_reason.is_some()
    }

    pub fn tool_call(&self, id: &str) -> Option<&ToolCall> {
        self.tool_calls.iter().find(|call| call.id == id)
    }

    /// The assistant turn to append to the conversation for a follow-up
    /// request. Reasoning is not echoed back.
    pub fn to_message(&self) -> Message {
        let mut content = String::with_capacity(self.text.len() + self.answer.len());
        content.push_str(&self.text);
        content.push_str(&self.answer);

        Message {
            role: Role::Assistant,
            content: vec![ContentSegment::text(content)],
            tool_call_id: None,
            tool_calls: if self.tool_calls.is_empty() {
                None
            } else {
                Some(self.tool_calls.clone())
            },
            stop_reason: self.stop_reason.clone(),
        }
    }
}

/// Folds the deltas of one streaming response into whole values.
///
/// Text, reasoning and answer fragments each grow their own buffer. Tool-call
/// fragments are keyed by id and concatenated in arrival order. Once a stop
/// reason has been seen the aggregator is terminated and every later event is
/// acknowledged without touching the buffers.
///
/// The buffers live in a shared [`Snapshot`]. Handing one out is a reference
/// count bump; the next mutation copies it only if a caller still holds the
/// previous one.
#[derive(Debug)]
pub struct StreamAggregator {
    state: AggregatorState,
    snapshot: Arc<Snapshot>,
    positions: HashMap<String, usize>,
    // Slot of the most recently introduced id; only moves when a new id shows up.
    current: Option<usize>,
}

impl Default for StreamAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self {
            state: AggregatorState::Active,
            snapshot: Arc::new(Snapshot::default()),
            positions: HashMap::new(),
            current: None,
        }
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == AggregatorState::Terminated
    }

    pub fn apply(&mut self, event: &StreamEvent) -> Result<Disposition> {
        if self.is_terminated() {
            if event.delta.is_some() || event.tool_calls.is_some() {
                warn!(event_type = %event.event_type, "dropping content received after stop reason");
            } else {
                debug!(event_type = %event.event_type, "ignoring event after termination");
            }
            return Ok(Disposition::Ignored);
        }

        if let Some(delta) = &event.delta {
            self.apply_delta(delta)?;
        }

        if let Some(calls) = &event.tool_calls {
            for call in calls {
                self.merge_complete_call(call);
            }
        }

        if let Some(metrics) = &event.metrics {
            self.buffers().metrics = Some(metrics.clone());
        }

        match &event.stop_reason {
            Some(reason) => {
                debug!(stop_reason = %reason, "stream reached terminal event");
                self.buffers().stop_reason = Some(reason.clone());
                self.state = AggregatorState::Terminated;
                Ok(Disposition::Terminal)
            }
            None => Ok(Disposition::Applied),
        }
    }

    /// Mark the response finished because the event source ended without a
    /// stop reason. The buffers stay as they are.
    pub fn finish(&mut self) -> Arc<Snapshot> {
        if !self.is_terminated() {
            debug!("event source ended before a stop reason");
            self.state = AggregatorState::Terminated;
        }
        self.snapshot()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Drop all buffers and return to `Active` for a new response.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn buffers(&mut self) -> &mut Snapshot {
        Arc::make_mut(&mut self.snapshot)
    }

    fn apply_delta(&mut self, delta: &Delta) -> Result<()> {
        let id = delta.id.as_deref().filter(|id| !id.is_empty());

        // Resolve the tool-call slot before touching any buffer so a bad
        // fragment leaves the state as it was.
        let slot = if id.is_some() || delta.function.is_some() {
            Some(self.resolve_slot(id, delta.function.as_ref())?)
        } else {
            None
        };

        let buffers = self.buffers();
        if let Some(text) = &delta.text {
            buffers.text.push_str(text);
        }
        if let Some(reasoning) = &delta.reasoning {
            buffers.reasoning.push_str(reasoning);
        }
        if let Some(answer) = &delta.answer {
            buffers.answer.push_str(answer);
        }

        if let (Some(slot), Some(function)) = (slot, &delta.function) {
            let call = &mut buffers.tool_calls[slot].function;
            if let Some(name) = function.name.as_deref().filter(|name| !name.is_empty()) {
                call.name = name.to_string();
            }
            if let Some(arguments) = &function.arguments {
                call.arguments.push_str(arguments);
            }
        }

        Ok(())
    }

    fn resolve_slot(&mut self, id: Option<&str>, function: Option<&FunctionDelta>) -> Result<usize> {
        if let Some(id) = id {
            return Ok(self.slot_for(id));
        }

        // Without an id the fragment goes to the call the cursor points at,
        // and only while that call is the only one. Two or more open calls
        // make the target ambiguous.
        match self.current {
            Some(slot) if self.snapshot.tool_calls.len() == 1 => Ok(slot),
            _ => Err(LlamaError::MissingCorrelation {
                fragment: describe_fragment(function),
            }),
        }
    }

    fn slot_for(&mut self, id: &str) -> usize {
        if let Some(&slot) = self.positions.get(id) {
            return slot;
        }

        let slot = self.snapshot.tool_calls.len();
        debug!(tool_call_id = id, "new tool call");
        self.buffers().tool_calls.push(ToolCall::new(id, "", ""));
        self.positions.insert(id.to_string(), slot);
        self.current = Some(slot);
        slot
    }

    // A fully formed call on the event itself only fills in what the
    // fragments have not already supplied.
    fn merge_complete_call(&mut self, call: &ToolCall) {
        let slot = self.slot_for(&call.id);
        let existing = &self.snapshot.tool_calls[slot].function;
        if !existing.name.is_empty() && !existing.arguments.is_empty() {
            return;
        }

        let target = &mut self.buffers().tool_calls[slot].function;
        if target.name.is_empty() {
            target.name = call.function.name.clone();
        }
        if target.arguments.is_empty() {
            target.arguments = call.function.arguments.clone();
        }
    }
}

fn describe_fragment(function: Option<&FunctionDelta>) -> String {
    match function {
        Some(FunctionDelta { name, arguments }) => format!(
            "name={:?} arguments={:?}",
            name.as_deref().unwrap_or(""),
            arguments.as_deref().unwrap_or("")
        ),
        None => "empty tool call fragment".to_string(),
    }
}
