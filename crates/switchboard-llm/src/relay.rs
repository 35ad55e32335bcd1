use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::Value;

use crate::error::AttemptError;
use crate::usage::UsageTap;

/// Upstream byte chunks with errors reduced to strings
pub(crate) type UpstreamChunks = Pin<Box<dyn Stream<Item = Result<Bytes, String>> + Send>>;

/// Classification of a chunk while the relay awaits the first real event
///
/// SSE events are separated by blank lines; only `data: {` segments are
/// interpreted. Keep-alive comments (OpenRouter emits `: OPENROUTER
/// PROCESSING` lines) and anything undecodable count as noise and keep the
/// relay waiting.
enum FirstScan {
    Noise,
    /// First real event is healthy; the stream can be committed
    Commit,
    /// First real event carries a top-level `error` or `detail`
    Error(String),
}

fn classify_first_chunk(chunk: &[u8]) -> FirstScan {
    let Ok(text) = std::str::from_utf8(chunk) else {
        return FirstScan::Noise;
    };

    for segment in segments(text) {
        let Some(data) = data_payload(segment) else {
            continue;
        };

        let Ok(json) = serde_json::from_str::<Value>(data) else {
            // Unparsable data counts as ordinary content, not an error
            tracing::debug!(segment = %segment, "first stream segment is not valid JSON, committing");
            return FirstScan::Commit;
        };

        if json.get("error").is_some() || json.get("detail").is_some() {
            return FirstScan::Error(segment.to_owned());
        }
        return FirstScan::Commit;
    }

    FirstScan::Noise
}

/// What to do with a chunk of an already-committed stream
enum ChunkAction {
    Forward,
    /// Stop relaying; bytes already delivered are not retracted
    Terminate(String),
}

/// Scanner for the committed phase of a stream
///
/// Watches pass-through chunks for usage objects and mid-stream error
/// events without touching the bytes themselves.
struct StreamObserver {
    tap: UsageTap,
}

impl StreamObserver {
    fn scan(&mut self, chunk: &[u8]) -> ChunkAction {
        // Non-UTF-8 chunks are never classified, only forwarded
        let Ok(text) = std::str::from_utf8(chunk) else {
            return ChunkAction::Forward;
        };

        for segment in segments(text) {
            let Some(data) = data_payload(segment) else {
                continue;
            };
            let Ok(json) = serde_json::from_str::<Value>(data) else {
                tracing::debug!(segment = %segment, "passing unparseable stream segment through");
                continue;
            };

            if is_mid_stream_error(&json) {
                return ChunkAction::Terminate(segment.to_owned());
            }

            self.tap.observe_json(&json);
        }

        ChunkAction::Forward
    }

    /// Observation without termination, for the chunk that committed the stream
    fn observe_only(&mut self, chunk: &[u8]) {
        let Ok(text) = std::str::from_utf8(chunk) else {
            return;
        };
        for segment in segments(text) {
            if let Some(data) = data_payload(segment)
                && let Ok(json) = serde_json::from_str::<Value>(data)
            {
                self.tap.observe_json(&json);
            }
        }
    }

    fn finish(&mut self) {
        self.tap.finalize();
    }
}

/// Mid-stream error shape (OpenRouter style): top-level `code` plus a
/// nested `error.message`
fn is_mid_stream_error(json: &Value) -> bool {
    json.get("code").is_some() && json.pointer("/error/message").and_then(Value::as_str).is_some()
}

fn segments(text: &str) -> impl Iterator<Item = &str> {
    text.split("\n\n").map(str::trim).filter(|s| !s.is_empty())
}

fn data_payload(segment: &str) -> Option<&str> {
    segment.strip_prefix("data: ").filter(|data| data.starts_with('{'))
}

/// Committed relay body: the first real event followed by every further
/// upstream byte, unchanged and in order
///
/// The usage tap is flushed when the stream ends, when a mid-stream error
/// truncates it, or when the client disconnects and the body is dropped.
pub struct RelayBody {
    first: Option<Bytes>,
    upstream: UpstreamChunks,
    observer: StreamObserver,
    done: bool,
}

impl RelayBody {
    fn new(first: Bytes, upstream: UpstreamChunks, mut observer: StreamObserver) -> Self {
        observer.observe_only(&first);
        Self {
            first: Some(first),
            upstream,
            observer,
            done: false,
        }
    }
}

impl Stream for RelayBody {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.as_mut().get_mut();

        if this.done {
            return Poll::Ready(None);
        }
        if let Some(first) = this.first.take() {
            return Poll::Ready(Some(Ok(first)));
        }

        loop {
            match ready!(this.upstream.as_mut().poll_next(cx)) {
                None => {
                    this.done = true;
                    this.observer.finish();
                    return Poll::Ready(None);
                }
                Some(Err(e)) => {
                    // Bytes already delivered cannot be retracted; close out
                    tracing::warn!(error = %e, "upstream stream failed mid-relay");
                    this.done = true;
                    this.observer.finish();
                    return Poll::Ready(None);
                }
                Some(Ok(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    match this.observer.scan(&chunk) {
                        ChunkAction::Forward => return Poll::Ready(Some(Ok(chunk))),
                        ChunkAction::Terminate(detail) => {
                            tracing::warn!(detail = %detail, "error detected mid-stream, truncating relay");
                            this.done = true;
                            this.observer.finish();
                            return Poll::Ready(None);
                        }
                    }
                }
            }
        }
    }
}

/// Drive a fresh upstream stream until its first real event is classified
///
/// Pulls chunks until the state machine leaves the awaiting phase: a healthy
/// first event commits the stream and returns the relay body (which replays
/// that chunk first); an error event or upstream close before any real event
/// fails the attempt, with nothing sent downstream — failover is still safe.
pub(crate) async fn commit_stream(mut response: reqwest::Response, mut tap: UsageTap) -> Result<RelayBody, AttemptError> {
    loop {
        let chunk = response
            .chunk()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;

        let Some(chunk) = chunk else {
            return Err(AttemptError::StreamFirstEvent("upstream closed without any event".to_owned()));
        };
        if chunk.is_empty() {
            continue;
        }

        match classify_first_chunk(&chunk) {
            FirstScan::Noise => {}
            FirstScan::Error(detail) => return Err(AttemptError::StreamFirstEvent(detail)),
            FirstScan::Commit => {
                tap.commit();
                let upstream: UpstreamChunks =
                    Box::pin(response.bytes_stream().map(|result| result.map_err(|e| e.to_string())));
                return Ok(RelayBody::new(chunk, upstream, StreamObserver { tap }));
            }
        }
    }
}
