use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::aggregator::{Disposition, Snapshot, StreamAggregator};
use super::decoder::decode_event;
use super::transport::FrameStream;
use crate::error::{LlamaError, Result};
use crate::models::StreamEvent;

/// One consumed frame: the decoded event, what the aggregator did with it,
/// and the completion as it stands afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamUpdate {
    pub event: StreamEvent,
    pub disposition: Disposition,
    pub snapshot: Arc<Snapshot>,
}

struct ConsumerState {
    frames: Option<FrameStream>,
    aggregator: StreamAggregator,
    token: CancellationToken,
    last: Arc<OnceLock<Arc<Snapshot>>>,
}

impl ConsumerState {
    fn release(&mut self) {
        // Dropping the frame stream closes the connection.
        self.frames = None;
        let _ = self.last.set(self.aggregator.snapshot());
    }
}

/// Lazy, single-pass sequence of [`StreamUpdate`]s for one streaming
/// response.
///
/// Each poll waits for the next frame from the transport. A frame that fails
/// to decode ends the sequence with that error; nothing after it is
/// delivered. The update carrying the stop reason is the last one: the
/// transport is released right after it, so trailing frames, errors or a
/// connection the server leaves open cannot turn a finished response into a
/// failure.
///
/// [`ChatStream::cancel`] (or cancelling the token from
/// [`ChatStream::cancel_token`] on another task) releases the transport and
/// ends the sequence with [`LlamaError::StreamAborted`].
pub struct ChatStream {
    inner: Pin<Box<dyn Stream<Item = Result<StreamUpdate>> + Send>>,
    token: CancellationToken,
    last: Arc<OnceLock<Arc<Snapshot>>>,
}

impl ChatStream {
    pub fn new(frames: FrameStream) -> Self {
        let token = CancellationToken::new();
        let last = Arc::new(OnceLock::new());
        let state = ConsumerState {
            frames: Some(frames),
            aggregator: StreamAggregator::new(),
            token: token.clone(),
            last: Arc::clone(&last),
        };

        let inner = futures::stream::unfold(state, |mut state| async move {
            let frames = state.frames.as_mut()?;

            let next = tokio::select! {
                biased;
                _ = state.token.cancelled() => None,
                frame = frames.next() => Some(frame),
            };

            match next {
                None => {
                    debug!("stream cancelled by caller");
                    state.release();
                    Some((Err(LlamaError::StreamAborted), state))
                }
                Some(None) => {
                    state.aggregator.finish();
                    state.release();
                    None
                }
                Some(Some(Err(e))) => {
                    state.release();
                    Some((Err(e), state))
                }
                Some(Some(Ok(frame))) => {
                    let update = decode_event(&frame).and_then(|event| {
                        let disposition = state.aggregator.apply(&event)?;
                        Ok(StreamUpdate {
                            event,
                            disposition,
                            snapshot: state.aggregator.snapshot(),
                        })
                    });
                    match &update {
                        Ok(update) if update.disposition != Disposition::Terminal => {}
                        Ok(_) => {
                            debug!("stop reason reached, releasing transport");
                            state.release();
                        }
                        Err(_) => state.release(),
                    }
                    Some((update, state))
                }
            }
        });

        Self {
            inner: Box::pin(inner.fuse()),
            token,
            last,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token that cancels this stream from elsewhere.
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The completion as it stood when the transport was released, whether
    /// that was by a stop reason, the end of the body, an error or a cancel.
    /// `None` while the stream is still running.
    pub fn last_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.last.get().cloned()
    }

    /// Drive the stream to its end and return the last snapshot.
    pub async fn final_snapshot(mut self) -> Result<Arc<Snapshot>> {
        while let Some(update) = self.next().await {
            update?;
        }
        Ok(self.last_snapshot().unwrap_or_default())
    }
}

impl Stream for ChatStream {
    type Item = Result<StreamUpdate>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}
