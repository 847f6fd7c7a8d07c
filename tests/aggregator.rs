use llama_cli::api::{AggregatorState, Disposition, StreamAggregator};
use llama_cli::models::{Delta, EventType, Role, StopReason, StreamEvent, ToolCall};
use llama_cli::LlamaError;
use std::sync::Arc;

fn progress(delta: Delta) -> StreamEvent {
    StreamEvent::new(EventType::Progress).with_delta(delta)
}

fn stop(reason: &str) -> StreamEvent {
    StreamEvent::new(EventType::Complete).with_stop_reason(reason)
}

fn tool(id: Option<&str>, name: Option<&str>, arguments: Option<&str>) -> StreamEvent {
    progress(Delta::tool_call(id, name, arguments))
}

fn apply_all(aggregator: &mut StreamAggregator, events: &[StreamEvent]) {
    for event in events {
        aggregator.apply(event).unwrap();
    }
}

#[test]
fn test_text_fragments_concatenate() {
    let mut aggregator = StreamAggregator::new();
    apply_all(
        &mut aggregator,
        &[
            progress(Delta::text("Hel")),
            progress(Delta::text("lo")),
            stop("stop"),
        ],
    );

    let snapshot = aggregator.snapshot();
    assert_eq!(snapshot.text, "Hello");
    assert_eq!(snapshot.stop_reason, Some(StopReason::Stop));
    assert!(aggregator.is_terminated());
}

#[test]
fn test_tool_call_arguments_assemble() {
    let mut aggregator = StreamAggregator::new();
    apply_all(
        &mut aggregator,
        &[
            tool(Some("a"), Some("f"), Some("{\"x\":")),
            tool(Some("a"), None, Some("1}")),
            stop("tool_calls"),
        ],
    );

    let snapshot = aggregator.snapshot();
    assert_eq!(snapshot.tool_calls, vec![ToolCall::new("a", "f", "{\"x\":1}")]);
    assert_eq!(snapshot.stop_reason, Some(StopReason::ToolCalls));
}

#[test]
fn test_content_kinds_never_mix() {
    let mut aggregator = StreamAggregator::new();
    apply_all(
        &mut aggregator,
        &[
            progress(Delta::reasoning("think ")),
            progress(Delta::text("a")),
            progress(Delta::answer("4")),
            progress(Delta::reasoning("more")),
            progress(Delta::text("b")),
            progress(Delta::answer("2")),
            stop("stop"),
        ],
    );

    let snapshot = aggregator.snapshot();
    assert_eq!(snapshot.reasoning, "think more");
    assert_eq!(snapshot.text, "ab");
    assert_eq!(snapshot.answer, "42");
}

#[test]
fn test_one_delta_can_carry_several_kinds() {
    let mut aggregator = StreamAggregator::new();
    let delta = Delta {
        delta_type: "text".to_string(),
        text: Some("t".to_string()),
        reasoning: Some("r".to_string()),
        answer: Some("a".to_string()),
        ..Default::default()
    };
    aggregator.apply(&progress(delta)).unwrap();

    let snapshot = aggregator.snapshot();
    assert_eq!((snapshot.text.as_str(), snapshot.reasoning.as_str(), snapshot.answer.as_str()), ("t", "r", "a"));
}

#[test]
fn test_interleaved_tool_calls_keep_their_own_arguments() {
    let mut aggregator = StreamAggregator::new();
    apply_all(
        &mut aggregator,
        &[
            tool(Some("b"), Some("second"), Some("[1,")),
            tool(Some("a"), Some("first"), Some("{\"k\":")),
            tool(Some("b"), None, Some("2]")),
            progress(Delta::text("between")),
            tool(Some("a"), None, Some("\"v\"}")),
            stop("tool_calls"),
        ],
    );

    let snapshot = aggregator.snapshot();
    // first-seen order, not alphabetical
    assert_eq!(
        snapshot.tool_calls,
        vec![
            ToolCall::new("b", "second", "[1,2]"),
            ToolCall::new("a", "first", "{\"k\":\"v\"}"),
        ]
    );
    assert_eq!(snapshot.text, "between");
    assert_eq!(snapshot.tool_call("a").unwrap().function.name, "first");
}

#[test]
fn test_repeated_fragments_are_not_deduplicated() {
    let mut aggregator = StreamAggregator::new();
    apply_all(
        &mut aggregator,
        &[
            tool(Some("a"), Some("f"), Some("ab")),
            tool(Some("a"), None, Some("ab")),
        ],
    );
    assert_eq!(aggregator.snapshot().tool_calls[0].function.arguments, "abab");
}

#[test]
fn test_later_name_fills_in_empty_name() {
    let mut aggregator = StreamAggregator::new();
    apply_all(
        &mut aggregator,
        &[
            tool(Some("a"), Some(""), Some("{")),
            tool(Some("a"), Some("lookup"), Some("}")),
            tool(Some("a"), None, None),
        ],
    );

    let snapshot = aggregator.snapshot();
    let call = &snapshot.tool_calls[0];
    assert_eq!(call.function.name, "lookup");
    assert_eq!(call.function.arguments, "{}");
}

#[test]
fn test_missing_id_falls_back_to_single_open_call() {
    let mut aggregator = StreamAggregator::new();
    apply_all(
        &mut aggregator,
        &[
            tool(Some("a"), Some("f"), Some("{\"x\"")),
            tool(None, None, Some(":1}")),
        ],
    );
    assert_eq!(aggregator.snapshot().tool_calls[0].function.arguments, "{\"x\":1}");
}

#[test]
fn test_missing_id_with_no_open_call_is_missing_correlation() {
    let mut aggregator = StreamAggregator::new();
    let err = aggregator.apply(&tool(None, Some("f"), Some("{}"))).unwrap_err();
    assert!(matches!(err, LlamaError::MissingCorrelation { .. }));
    assert!(aggregator.snapshot().tool_calls.is_empty());
}

#[test]
fn test_missing_id_with_two_open_calls_is_missing_correlation() {
    let mut aggregator = StreamAggregator::new();
    apply_all(
        &mut aggregator,
        &[
            tool(Some("a"), Some("f"), Some("{")),
            tool(Some("b"), Some("g"), Some("{")),
        ],
    );

    let event = StreamEvent::new(EventType::Progress).with_delta(Delta {
        text: Some("dropped".to_string()),
        ..Delta::tool_call(None, None, Some("}"))
    });
    let err = aggregator.apply(&event).unwrap_err();
    assert!(matches!(err, LlamaError::MissingCorrelation { .. }));

    // the failed event left nothing behind
    let snapshot = aggregator.snapshot();
    assert_eq!(snapshot.text, "");
    assert_eq!(snapshot.tool_calls[0].function.arguments, "{");
    assert_eq!(snapshot.tool_calls[1].function.arguments, "{");
}

#[test]
fn test_terminal_event_content_is_applied() {
    let mut aggregator = StreamAggregator::new();
    aggregator.apply(&progress(Delta::text("almost "))).unwrap();

    let last = StreamEvent::new(EventType::Complete)
        .with_delta(Delta::text("done"))
        .with_stop_reason("stop");
    assert_eq!(aggregator.apply(&last).unwrap(), Disposition::Terminal);
    assert_eq!(aggregator.snapshot().text, "almost done");
}

#[test]
fn test_events_after_terminal_are_ignored() {
    let mut aggregator = StreamAggregator::new();
    apply_all(&mut aggregator, &[progress(Delta::text("Hello")), stop("stop")]);
    let final_snapshot = aggregator.snapshot();

    let trailing = [
        progress(Delta::text(" world")),
        tool(Some("late"), Some("f"), Some("{}")),
        tool(None, None, Some("no target")),
        stop("length"),
    ];
    for event in &trailing {
        assert_eq!(aggregator.apply(event).unwrap(), Disposition::Ignored);
    }

    assert_eq!(aggregator.snapshot(), final_snapshot);
    assert_eq!(aggregator.state(), AggregatorState::Terminated);
}

#[test]
fn test_snapshot_is_available_before_termination() {
    let mut aggregator = StreamAggregator::new();
    assert_eq!(
        aggregator.apply(&progress(Delta::text("par"))).unwrap(),
        Disposition::Applied
    );

    let snapshot = aggregator.snapshot();
    assert_eq!(snapshot.text, "par");
    assert!(!snapshot.is_terminal());
    assert_eq!(aggregator.state(), AggregatorState::Active);
}

#[test]
fn test_finish_without_stop_reason_terminates() {
    let mut aggregator = StreamAggregator::new();
    aggregator.apply(&progress(Delta::text("cut"))).unwrap();

    let snapshot = aggregator.finish();
    assert_eq!(snapshot.text, "cut");
    assert_eq!(snapshot.stop_reason, None);
    assert!(aggregator.is_terminated());
    assert_eq!(
        aggregator.apply(&progress(Delta::text("more"))).unwrap(),
        Disposition::Ignored
    );
}

#[test]
fn test_complete_tool_calls_on_event_fill_gaps_only() {
    let mut aggregator = StreamAggregator::new();
    aggregator
        .apply(&tool(Some("a"), Some("f"), Some("{\"x\":1}")))
        .unwrap();

    let mut last = stop("tool_calls");
    last.tool_calls = Some(vec![
        ToolCall::new("a", "f", "{\"x\":999}"),
        ToolCall::new("b", "g", "{}"),
    ]);
    aggregator.apply(&last).unwrap();

    let snapshot = aggregator.snapshot();
    assert_eq!(
        snapshot.tool_calls,
        vec![ToolCall::new("a", "f", "{\"x\":1}"), ToolCall::new("b", "g", "{}")]
    );
}

#[test]
fn test_reset_starts_a_new_response() {
    let mut aggregator = StreamAggregator::new();
    apply_all(&mut aggregator, &[progress(Delta::text("old")), stop("stop")]);

    aggregator.reset();
    assert_eq!(aggregator.state(), AggregatorState::Active);
    aggregator.apply(&progress(Delta::text("new"))).unwrap();
    assert_eq!(aggregator.snapshot().text, "new");
}

#[test]
fn test_snapshot_to_message() {
    let mut aggregator = StreamAggregator::new();
    apply_all(
        &mut aggregator,
        &[
            progress(Delta::reasoning("private")),
            progress(Delta::text("Calling.")),
            tool(Some("a"), Some("f"), Some("{}")),
            stop("tool_calls"),
        ],
    );

    let message = aggregator.snapshot().to_message();
    assert_eq!(message.role, Role::Assistant);
    assert_eq!(message.content[0].as_text(), Some("Calling."));
    assert_eq!(message.tool_calls.unwrap().len(), 1);
    assert_eq!(message.stop_reason, Some(StopReason::ToolCalls));
}

#[test]
fn test_missing_id_follows_call_introduced_by_complete_tool_calls() {
    let mut aggregator = StreamAggregator::new();
    let mut opening = StreamEvent::new(EventType::Progress);
    opening.tool_calls = Some(vec![ToolCall::new("a", "f", "")]);

    apply_all(&mut aggregator, &[opening, tool(None, None, Some("{}"))]);

    assert_eq!(aggregator.snapshot().tool_calls, vec![ToolCall::new("a", "f", "{}")]);
}

#[test]
fn test_held_snapshot_is_not_changed_by_later_events() {
    let mut aggregator = StreamAggregator::new();
    aggregator.apply(&progress(Delta::text("Hel"))).unwrap();
    let held = aggregator.snapshot();

    aggregator.apply(&progress(Delta::text("lo"))).unwrap();

    assert_eq!(held.text, "Hel");
    assert_eq!(aggregator.snapshot().text, "Hello");
}

#[test]
fn test_snapshot_is_shared_until_something_changes() {
    let mut aggregator = StreamAggregator::new();
    apply_all(&mut aggregator, &[progress(Delta::text("Hello")), stop("stop")]);

    let before = aggregator.snapshot();
    assert!(Arc::ptr_eq(&before, &aggregator.snapshot()));

    aggregator.apply(&progress(Delta::text(" late"))).unwrap();
    assert!(Arc::ptr_eq(&before, &aggregator.snapshot()));
}
