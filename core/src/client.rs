//! Streaming chat-completions client. Opens one SSE request per prediction
//! and forwards cumulative text snapshots over a channel; the consumer
//! replaces its displayed suggestion with each snapshot.

use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::debug;
use tracing::trace;

use crate::config::Config;
use crate::context;
use crate::context::StoryContext;
use crate::default_client::create_client;
use crate::error::QuillErr;
use crate::error::Result;

/// Terminator sentinel sent by chat-completions endpoints as a bare data
/// line after the last frame.
const DONE_SENTINEL: &str = "[DONE]";

/// A stream that stays completely silent for this long is treated as
/// disconnected.
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// System/user prompt pair for one continuation request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
}

impl CompletionRequest {
    pub fn new(story: &StoryContext, prediction_length: u16, draft: &str) -> Self {
        Self {
            system: context::system_prompt(story, prediction_length),
            user: context::user_prompt(draft),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionsPayload<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionEvent {
    /// Cumulative text assembled from every fragment seen so far, not just
    /// the newest one.
    Delta { content: String },
    /// Stream finished; `content` is the final assembled text.
    Completed { content: String },
}

#[derive(Debug)]
pub struct CompletionStream {
    rx_event: mpsc::Receiver<Result<CompletionEvent>>,
}

impl CompletionStream {
    pub async fn next(&mut self) -> Option<Result<CompletionEvent>> {
        self.rx_event.recv().await
    }
}

impl Stream for CompletionStream {
    type Item = Result<CompletionEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx_event.poll_recv(cx)
    }
}

#[derive(Debug, Clone)]
pub struct ModelClient {
    config: Arc<Config>,
    client: reqwest::Client,
}

impl ModelClient {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            client: create_client(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Opens the streaming request. Configuration errors and non-success
    /// statuses are raised here, before any frame is delivered; everything
    /// after that arrives as items on the returned stream.
    ///
    /// Dropping the stream abandons interest: the forwarding task notices
    /// the closed channel and stops. Callers that merely *supersede* a
    /// stream instead gate late frames behind a generation check.
    pub async fn stream_completion(&self, request: &CompletionRequest) -> Result<CompletionStream> {
        let url = self.config.completions_url()?;
        let api_key = self.config.require_api_key()?;

        let payload = ChatCompletionsPayload {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: self.config.temperature,
            stream: true,
        };

        trace!("POST to {url} (model {})", self.config.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&payload)
            .send()
            .await
            .map_err(|source| QuillErr::ConnectionFailed { source })?;

        let status = response.status();
        if !status.is_success() {
            // The body is small and carries the structured error message
            // providers return for 4xx/5xx; surface it to the caller.
            let body = response.text().await.unwrap_or_default();
            return Err(QuillErr::UnexpectedStatus { status, body });
        }

        let (tx_event, rx_event) = mpsc::channel::<Result<CompletionEvent>>(1600);
        let stream = response
            .bytes_stream()
            .map_err(|e| QuillErr::Stream(e.to_string()));
        tokio::spawn(process_sse(stream, tx_event, STREAM_IDLE_TIMEOUT));

        Ok(CompletionStream { rx_event })
    }
}

async fn process_sse<S>(
    stream: S,
    tx_event: mpsc::Sender<Result<CompletionEvent>>,
    idle_timeout: Duration,
) where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    // The eventsource adapter owns the partial-line buffer: frames split
    // across read chunks, including mid-codepoint, reassemble here.
    let mut stream = stream.eventsource();
    let mut full_content = String::new();

    loop {
        let sse = match timeout(idle_timeout, stream.next()).await {
            Ok(Some(Ok(sse))) => sse,
            Ok(Some(Err(e))) => {
                debug!("SSE error: {e:#}");
                let _ = tx_event.send(Err(QuillErr::Stream(e.to_string()))).await;
                return;
            }
            Ok(None) => {
                // Body ended without the sentinel. Whatever accumulated is
                // still a usable suggestion.
                let _ = tx_event
                    .send(Ok(CompletionEvent::Completed {
                        content: full_content,
                    }))
                    .await;
                return;
            }
            Err(_) => {
                let _ = tx_event
                    .send(Err(QuillErr::Stream("idle timeout waiting for SSE".into())))
                    .await;
                return;
            }
        };

        trace!("SSE event: {}", sse.data);

        let data = sse.data.trim();
        if data.is_empty() {
            continue;
        }
        if data == DONE_SENTINEL {
            let _ = tx_event
                .send(Ok(CompletionEvent::Completed {
                    content: full_content,
                }))
                .await;
            return;
        }

        // One garbled frame must not discard an otherwise-good stream.
        let value: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(err) => {
                debug!("failed to parse SSE frame: {err}, data: {data}");
                continue;
            }
        };

        let Some(fragment) = value
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
        else {
            continue;
        };
        if fragment.is_empty() {
            continue;
        }

        full_content.push_str(fragment);
        let snapshot = CompletionEvent::Delta {
            content: full_content.clone(),
        };
        if tx_event.send(Ok(snapshot)).await.is_err() {
            // Receiver dropped: the caller lost interest in this stream.
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio_test::io::Builder as IoBuilder;
    use tokio_util::io::ReaderStream;

    /// Runs the SSE processor on pre-chunked byte slices and returns every
    /// event it forwarded.
    async fn collect_events(chunks: &[&[u8]]) -> Vec<Result<CompletionEvent>> {
        let mut builder = IoBuilder::new();
        for chunk in chunks {
            builder.read(chunk);
        }

        let reader = builder.build();
        let stream = ReaderStream::new(reader).map_err(|e| QuillErr::Stream(e.to_string()));
        let (tx, mut rx) = mpsc::channel::<Result<CompletionEvent>>(16);
        tokio::spawn(process_sse(stream, tx, Duration::from_millis(1000)));

        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        events
    }

    fn frame(fragment: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({
                "choices": [{"delta": {"content": fragment}}]
            })
        )
    }

    #[tokio::test]
    async fn deltas_are_cumulative_and_final_text_matches() {
        let body = format!(
            "{}{}{}data: {DONE_SENTINEL}\n\n",
            frame("Once"),
            frame(" upon"),
            frame(" a time")
        );

        let events = collect_events(&[body.as_bytes()]).await;
        let events: Vec<CompletionEvent> =
            events.into_iter().map(|ev| ev.expect("event")).collect();

        assert_eq!(
            events,
            vec![
                CompletionEvent::Delta {
                    content: "Once".to_string()
                },
                CompletionEvent::Delta {
                    content: "Once upon".to_string()
                },
                CompletionEvent::Delta {
                    content: "Once upon a time".to_string()
                },
                CompletionEvent::Completed {
                    content: "Once upon a time".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn frame_split_mid_codepoint_reassembles() {
        let body = format!("{}data: {DONE_SENTINEL}\n\n", frame("夜色渐深"));
        let bytes = body.as_bytes();
        // Split inside the multi-byte payload, off any line or char
        // boundary.
        let mid = body.find('夜').expect("payload present") + 1;

        let events = collect_events(&[&bytes[..mid], &bytes[mid..]]).await;
        let events: Vec<CompletionEvent> =
            events.into_iter().map(|ev| ev.expect("event")).collect();

        assert_eq!(
            events,
            vec![
                CompletionEvent::Delta {
                    content: "夜色渐深".to_string()
                },
                CompletionEvent::Completed {
                    content: "夜色渐深".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped_not_fatal() {
        let body = format!(
            "{}data: {{not json at all\n\n{}data: {DONE_SENTINEL}\n\n",
            frame("good"),
            frame(" parts")
        );

        let events = collect_events(&[body.as_bytes()]).await;
        let events: Vec<CompletionEvent> =
            events.into_iter().map(|ev| ev.expect("event")).collect();

        assert_eq!(
            events.last(),
            Some(&CompletionEvent::Completed {
                content: "good parts".to_string()
            })
        );
    }

    #[tokio::test]
    async fn frames_without_content_are_ignored() {
        let role_only = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n";
        let body = format!("{role_only}{}data: {DONE_SENTINEL}\n\n", frame("text"));

        let events = collect_events(&[body.as_bytes()]).await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].as_ref().expect("delta"),
            &CompletionEvent::Delta {
                content: "text".to_string()
            }
        );
    }

    #[tokio::test]
    async fn stream_end_without_sentinel_still_completes() {
        let body = frame("unterminated");

        let events = collect_events(&[body.as_bytes()]).await;
        assert_eq!(
            events.last().map(|ev| ev.as_ref().expect("event")),
            Some(&CompletionEvent::Completed {
                content: "unterminated".to_string()
            })
        );
    }

    #[tokio::test]
    async fn empty_fragments_produce_no_snapshot() {
        let body = format!("{}{}data: {DONE_SENTINEL}\n\n", frame(""), frame("real"));

        let events = collect_events(&[body.as_bytes()]).await;
        let events: Vec<CompletionEvent> =
            events.into_iter().map(|ev| ev.expect("event")).collect();

        assert_eq!(
            events,
            vec![
                CompletionEvent::Delta {
                    content: "real".to_string()
                },
                CompletionEvent::Completed {
                    content: "real".to_string()
                },
            ]
        );
    }
}
