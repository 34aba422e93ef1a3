//! Streaming event types and utilities

use crate::error::{Error, Result};
use crate::types::{Message, StopReason, Usage};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Events emitted during message streaming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageEvent {
    /// Initial message structure
    Start { message: Message },
    /// Text content delta
    TextDelta { content_index: usize, delta: String },
    /// Tool call started
    ToolCallStart {
        content_index: usize,
        id: String,
        name: String,
    },
    /// Tool call arguments delta (partial JSON)
    ToolCallDelta { content_index: usize, delta: String },
    /// Message completed successfully
    Done {
        message: Message,
        stop_reason: StopReason,
        usage: Usage,
    },
    /// Error occurred
    Error { message: String },
}

impl MessageEvent {
    /// Check if this is a terminal event (Done or Error)
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageEvent::Done { .. } | MessageEvent::Error { .. })
    }
}

/// A stream of message events
pub type MessageEventStream = Pin<Box<dyn Stream<Item = MessageEvent> + Send>>;

/// Drain a stream into its final assistant message and usage.
///
/// The first terminal event wins. A stream that ends without one is an
/// unexpected response.
pub async fn collect_message(mut stream: MessageEventStream) -> Result<(Message, Usage)> {
    while let Some(event) = stream.next().await {
        match event {
            MessageEvent::Done { message, usage, .. } => return Ok((message, usage)),
            MessageEvent::Error { message } => return Err(Error::Sse(message)),
            MessageEvent::TextDelta { delta, .. } => {
                tracing::trace!("text delta: {} chars", delta.len());
            }
            _ => {}
        }
    }
    Err(Error::UnexpectedResponse(
        "stream ended without a final message".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Content;

    fn boxed(events: Vec<MessageEvent>) -> MessageEventStream {
        Box::pin(futures::stream::iter(events))
    }

    #[tokio::test]
    async fn test_collect_returns_done_message() {
        let done = Message::assistant(vec![Content::text("hello")]);
        let stream = boxed(vec![
            MessageEvent::Start {
                message: Message::assistant(vec![]),
            },
            MessageEvent::TextDelta {
                content_index: 0,
                delta: "hello".into(),
            },
            MessageEvent::Done {
                message: done,
                stop_reason: StopReason::Stop,
                usage: Usage { input: 7, output: 1 },
            },
        ]);

        let (message, usage) = collect_message(stream).await.unwrap();
        assert_eq!(message.text(), "hello");
        assert_eq!(usage.input, 7);
    }

    #[tokio::test]
    async fn test_collect_maps_error_event() {
        let stream = boxed(vec![MessageEvent::Error {
            message: "connection reset".into(),
        }]);
        let err = collect_message(stream).await.unwrap_err();
        assert!(matches!(err, Error::Sse(ref m) if m == "connection reset"));
    }

    #[tokio::test]
    async fn test_collect_without_terminal_event() {
        let stream = boxed(vec![MessageEvent::TextDelta {
            content_index: 0,
            delta: "partial".into(),
        }]);
        let err = collect_message(stream).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }
}
