use crate::error::{LlamaError, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use std::collections::VecDeque;
use std::pin::Pin;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// Ordered raw frames of one streaming response. Dropping it releases the
/// underlying connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Moves request bodies to the API and hands back raw payloads.
///
/// Nothing here interprets the payloads; decoding happens in
/// [`crate::api::decoder`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return the single response body.
    async fn post_json(&self, path: &str, body: String) -> Result<String>;

    /// Send a request and return the server-sent frames as they arrive.
    async fn post_stream(&self, path: &str, body: String) -> Result<FrameStream>;

    async fn get(&self, path: &str) -> Result<String>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    idle_timeout: Duration,
}

impl HttpTransport {
    pub fn new(api_key: &str, base_url: &str, stream_timeout_secs: u64) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| LlamaError::ConfigError(format!("Invalid authorization header: {}", e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            idle_timeout: Duration::from_secs(stream_timeout_secs),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(LlamaError::ApiError { status, message })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, path: &str, body: String) -> Result<String> {
        let url = self.url(path);
        debug!(%url, "POST");
        let response = self.client.post(&url).body(body).send().await?;
        let response = Self::check_status(response).await?;
        Ok(response.text().await?)
    }

    async fn post_stream(&self, path: &str, body: String) -> Result<FrameStream> {
        let url = self.url(path);
        debug!(%url, "POST (stream)");
        let response = self
            .client
            .post(&url)
            .header(ACCEPT, "text/event-stream")
            .body(body)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(frame_stream(response.bytes_stream(), self.idle_timeout))
    }

    async fn get(&self, path: &str) -> Result<String> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self.client.get(&url).send().await?;
        let response = Self::check_status(response).await?;
        Ok(response.text().await?)
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

struct FrameState {
    bytes: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
    idle_timeout: Duration,
}

/// Turn a response body into frames, giving up with `Timeout` when no bytes
/// arrive for `idle_timeout`.
pub fn frame_stream<S>(bytes: S, idle_timeout: Duration) -> FrameStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let state = FrameState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
        idle_timeout,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.pending.pop_front() {
                return Some((Ok(frame), state));
            }
            if state.finished {
                return None;
            }

            match timeout(state.idle_timeout, state.bytes.next()).await {
                Ok(Some(Ok(chunk))) => {
                    for item in state.decoder.push(&chunk) {
                        match item {
                            SseItem::Data(frame) => state.pending.push_back(frame),
                            SseItem::Done => {
                                state.finished = true;
                                break;
                            }
                        }
                    }
                }
                Ok(Some(Err(e))) => {
                    state.finished = true;
                    return Some((Err(LlamaError::from(e)), state));
                }
                Ok(None) => {
                    state.finished = true;
                    if let Some(frame) = state.decoder.finish() {
                        state.pending.push_back(frame);
                    }
                }
                Err(_) => {
                    debug!(timeout_secs = state.idle_timeout.as_secs(), "no data before timeout");
                    state.finished = true;
                    return Some((Err(LlamaError::Timeout), state));
                }
            }
        }
    }))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseItem {
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Splits a server-sent-events byte stream into `data:` payloads.
///
/// Lines are only interpreted once their newline has arrived, so a chunk
/// boundary can fall anywhere, including inside a UTF-8 sequence. Bare JSON
/// lines without a `data:` field are passed through as frames too.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseItem> {
        self.buffer.extend_from_slice(chunk);

        let mut items = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            let line = String::from_utf8_lossy(&line);
            if let Some(item) = parse_line(line.trim_end_matches(['\n', '\r'])) {
                items.push(item);
            }
        }
        items
    }

    /// Flush a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = self.buffer.split();
        let line = String::from_utf8_lossy(&rest);
        match parse_line(line.trim_end_matches('\r')) {
            Some(SseItem::Data(frame)) => Some(frame),
            _ => None,
        }
    }
}

fn parse_line(line: &str) -> Option<SseItem> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    if line.starts_with('{') {
        return Some(SseItem::Data(line.to_string()));
    }

    let Some(colon_pos) = line.find(':') else {
        debug!(field = line, "SSE field without value");
        return None;
    };

    let field = line[..colon_pos].trim();
    let value = line[colon_pos + 1..].trim_start();

    match field {
        "data" if value == "[DONE]" => Some(SseItem::Done),
        "data" => Some(SseItem::Data(value.to_string())),
        "event" | "id" | "retry" => {
            debug!(field, value, "SSE field");
            None
        }
        _ => {
            debug!(field, "unknown SSE field");
            None
        }
    }
}
