use async_trait::async_trait;
use futures::StreamExt;
use llama_cli::api::{ChatStream, Client, Disposition, FrameStream, Transport};
use llama_cli::models::{ChatRequest, Message, StopReason};
use llama_cli::{LlamaError, Result};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

fn text_frame(text: &str) -> String {
    json!({ "event": { "event_type": "progress", "delta": { "type": "text", "text": text } } })
        .to_string()
}

fn stop_frame(reason: &str) -> String {
    json!({ "event": { "event_type": "complete", "stop_reason": reason } }).to_string()
}

fn frames(items: Vec<Result<String>>) -> FrameStream {
    Box::pin(futures::stream::iter(items))
}

/// Sets the flag when dropped, so tests can see the transport being released.
struct ReleaseFlag(Arc<AtomicBool>);

impl Drop for ReleaseFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn never_ending(items: Vec<String>, released: Arc<AtomicBool>) -> FrameStream {
    let flag = ReleaseFlag(released);
    Box::pin(
        futures::stream::iter(items.into_iter().map(Ok::<String, LlamaError>))
            .chain(futures::stream::pending())
            .map(move |frame| {
                let _held = &flag;
                frame
            }),
    )
}

type SentLog = Arc<Mutex<Vec<(String, Value)>>>;

#[derive(Default)]
struct ScriptedTransport {
    frames: Mutex<Option<Vec<String>>>,
    payload: String,
    sent: SentLog,
}

impl ScriptedTransport {
    fn streaming(frames: Vec<String>) -> Self {
        Self {
            frames: Mutex::new(Some(frames)),
            ..Default::default()
        }
    }

    fn single(payload: Value) -> Self {
        Self {
            payload: payload.to_string(),
            ..Default::default()
        }
    }

    fn record(&self, path: &str, body: &str) {
        let body: Value = serde_json::from_str(body).unwrap();
        self.sent.lock().unwrap().push((path.to_string(), body));
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_json(&self, path: &str, body: String) -> Result<String> {
        self.record(path, &body);
        Ok(self.payload.clone())
    }

    async fn post_stream(&self, path: &str, body: String) -> Result<FrameStream> {
        self.record(path, &body);
        let frames = self.frames.lock().unwrap().take().unwrap_or_default();
        Ok(Box::pin(futures::stream::iter(frames.into_iter().map(Ok::<String, LlamaError>))))
    }

    async fn get(&self, path: &str) -> Result<String> {
        self.record(path, "null");
        Ok(self.payload.clone())
    }
}

#[tokio::test]
async fn test_stream_yields_one_update_per_frame() {
    let transport = ScriptedTransport::streaming(vec![
        text_frame("Hel"),
        text_frame("lo"),
        stop_frame("stop"),
    ]);
    let sent = transport.sent.clone();
    let client = Client::with_transport(transport);

    let request = ChatRequest::new("m", vec![Message::user("hi")]);
    let stream = client.chat_completion_stream(request).await.unwrap();
    let updates: Vec<_> = stream.collect().await;

    assert_eq!(updates.len(), 3);
    let updates: Vec<_> = updates.into_iter().map(|u| u.unwrap()).collect();
    assert_eq!(updates[0].snapshot.text, "Hel");
    assert_eq!(updates[1].snapshot.text, "Hello");
    assert_eq!(updates[2].disposition, Disposition::Terminal);
    assert_eq!(updates[2].snapshot.stop_reason, Some(StopReason::Stop));

    let sent = sent.lock().unwrap();
    assert_eq!(sent[0].0, "chat/completions");
    assert_eq!(sent[0].1["stream"], true);
}

#[tokio::test]
async fn test_malformed_frame_fails_fast() {
    let mut stream = ChatStream::new(frames(vec![
        Ok(text_frame("one")),
        Ok(text_frame("two")),
        Ok("{not json".to_string()),
        Ok(text_frame("three")),
        Ok(stop_frame("stop")),
    ]));

    assert_eq!(stream.next().await.unwrap().unwrap().snapshot.text, "one");
    assert_eq!(stream.next().await.unwrap().unwrap().snapshot.text, "onetwo");

    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, LlamaError::MalformedPayload(_)));

    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_missing_correlation_ends_stream() {
    let orphan = json!({
        "event": {
            "event_type": "progress",
            "delta": { "type": "tool_call", "function": { "arguments": "{}" } }
        }
    })
    .to_string();

    let mut stream = ChatStream::new(frames(vec![Ok(orphan), Ok(stop_frame("stop"))]));

    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, LlamaError::MissingCorrelation { .. }));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_transport_failure_is_passed_through() {
    let mut stream = ChatStream::new(frames(vec![
        Ok(text_frame("partial")),
        Err(LlamaError::Timeout),
        Ok(text_frame("never seen")),
    ]));

    assert!(stream.next().await.unwrap().is_ok());
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(err.is_transport_failure());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_stream_ends_at_stop_reason() {
    let stream = ChatStream::new(frames(vec![
        Ok(text_frame("Hello")),
        Ok(stop_frame("stop")),
        Ok(text_frame(" trailing")),
    ]));

    let updates: Vec<_> = stream.map(|u| u.unwrap()).collect().await;
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[1].disposition, Disposition::Terminal);
    assert_eq!(updates[1].snapshot.text, "Hello");
}

#[tokio::test]
async fn test_malformed_frame_after_stop_is_not_an_error() {
    let stream = ChatStream::new(frames(vec![
        Ok(text_frame("Hello")),
        Ok(stop_frame("stop")),
        Ok("garbage".to_string()),
    ]));

    let snapshot = stream.final_snapshot().await.unwrap();
    assert_eq!(snapshot.text, "Hello");
    assert_eq!(snapshot.stop_reason, Some(StopReason::Stop));
}

#[tokio::test]
async fn test_transport_failure_after_stop_is_not_an_error() {
    let stream = ChatStream::new(frames(vec![
        Ok(text_frame("Hello")),
        Ok(stop_frame("stop")),
        Err(LlamaError::Timeout),
    ]));

    let results: Vec<_> = stream.collect().await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.is_ok()));
}

#[tokio::test]
async fn test_open_connection_is_released_at_stop_reason() {
    let released = Arc::new(AtomicBool::new(false));
    let mut stream = ChatStream::new(never_ending(
        vec![text_frame("Hello"), stop_frame("stop")],
        released.clone(),
    ));

    assert!(stream.next().await.unwrap().is_ok());
    assert!(stream.last_snapshot().is_none());

    let terminal = stream.next().await.unwrap().unwrap();
    assert_eq!(terminal.disposition, Disposition::Terminal);
    assert!(released.load(Ordering::SeqCst));
    assert!(stream.next().await.is_none());

    let last = stream.last_snapshot().unwrap();
    assert!(last.is_terminal());
    assert_eq!(last.text, "Hello");
}

#[tokio::test]
async fn test_cancel_releases_transport() {
    let released = Arc::new(AtomicBool::new(false));
    let mut stream = ChatStream::new(never_ending(vec![text_frame("partial")], released.clone()));

    assert_eq!(stream.next().await.unwrap().unwrap().snapshot.text, "partial");

    stream.cancel();
    assert!(stream.is_cancelled());

    let err = stream.next().await.unwrap().unwrap_err();
    assert!(err.is_aborted());
    assert!(released.load(Ordering::SeqCst));
    assert!(stream.next().await.is_none());
    assert_eq!(stream.last_snapshot().unwrap().text, "partial");
}

#[tokio::test]
async fn test_cancel_from_another_task_wakes_pending_poll() {
    let released = Arc::new(AtomicBool::new(false));
    let mut stream = ChatStream::new(never_ending(Vec::new(), released.clone()));
    let token = stream.cancel_token();

    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        token.cancel();
    });

    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, LlamaError::StreamAborted));
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_final_snapshot_collects_tool_call() {
    let stream = ChatStream::new(frames(vec![
        Ok(json!({
            "event": {
                "event_type": "progress",
                "delta": { "type": "tool_call", "id": "a", "function": { "name": "f", "arguments": "{\"x\":" } }
            }
        })
        .to_string()),
        Ok(json!({
            "event": {
                "event_type": "progress",
                "delta": { "type": "tool_call", "id": "a", "function": { "arguments": "1}" } }
            }
        })
        .to_string()),
        Ok(stop_frame("tool_calls")),
    ]));

    let snapshot = stream.final_snapshot().await.unwrap();
    assert_eq!(snapshot.tool_calls.len(), 1);
    assert_eq!(snapshot.tool_calls[0].function.name, "f");
    assert_eq!(snapshot.tool_calls[0].function.arguments, "{\"x\":1}");
}

#[tokio::test]
async fn test_stream_without_stop_reason_ends_normally() {
    let stream = ChatStream::new(frames(vec![Ok(text_frame("cut off"))]));
    let snapshot = stream.final_snapshot().await.unwrap();
    assert_eq!(snapshot.text, "cut off");
    assert!(!snapshot.is_terminal());
}

#[tokio::test]
async fn test_chat_completion_is_decode_only() {
    let transport = ScriptedTransport::single(json!({
        "completion_message": {
            "role": "assistant",
            "content": { "type": "text", "text": "Hi!" },
            "stop_reason": "stop"
        }
    }));
    let sent = transport.sent.clone();
    let client = Client::with_transport(transport);

    let mut request = ChatRequest::new("m", vec![Message::user("hi")]);
    request.stream = Some(true);
    let response = client.chat_completion(request).await.unwrap();

    assert_eq!(response.completion_message.content.text.as_deref(), Some("Hi!"));
    let sent = sent.lock().unwrap();
    assert_eq!(sent[0].1["stream"], false);
}

#[tokio::test]
async fn test_models_listing() {
    let transport = ScriptedTransport::single(json!({
        "object": "list",
        "data": [
            { "id": "Llama-3.3-70B-Instruct", "object": "model", "owned_by": "Meta", "created": 1735689600 }
        ]
    }));
    let sent = transport.sent.clone();
    let client = Client::with_transport(transport);

    let models = client.models().await.unwrap();
    assert_eq!(models.data[0].id, "Llama-3.3-70B-Instruct");
    assert_eq!(
        models.data[0].created_at().unwrap().format("%Y-%m-%d").to_string(),
        "2025-01-01"
    );
    assert_eq!(sent.lock().unwrap()[0].0, "models");
}
