//! Reply Streaming
//!
//! Turns a provider's chunk stream into a stream of text deltas and gives the
//! consumer a buffer that owns accumulation and cursor display.

use std::pin::Pin;

use futures::{future, Stream, StreamExt, TryStreamExt};

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{CompletionStream, FinishReason, GenerationOptions, LlmProvider};

/// Trailing marker shown while a reply is still arriving
pub const CURSOR: char = '▌';

/// Lazy, finite stream of non-empty text deltas
pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Open one streaming request with a system prompt and a single user message.
///
/// Nothing from earlier turns is sent; every call carries its full context in
/// `system_prompt`.
pub async fn stream_reply(
    provider: &dyn LlmProvider,
    options: &GenerationOptions,
    system_prompt: &str,
    user_message: &str,
) -> Result<ReplyStream> {
    let messages = [Message::system(system_prompt), Message::user(user_message)];
    let chunks = provider.complete_stream(&messages, options).await?;
    Ok(text_deltas(chunks))
}

/// Non-empty deltas of `chunks`, ending at the first chunk marked `done`.
pub fn text_deltas(chunks: CompletionStream) -> ReplyStream {
    let mut finished = false;
    let deltas = chunks
        .take_while(move |item| {
            let keep = !finished;
            if let Ok(chunk) = item {
                finished |= chunk.done;
            }
            future::ready(keep)
        })
        .try_filter_map(|chunk| {
            if chunk.done || chunk.finish_reason.is_some() {
                note_finish(chunk.finish_reason);
            }
            future::ready(Ok((!chunk.delta.is_empty()).then_some(chunk.delta)))
        });

    Box::pin(deltas)
}

fn note_finish(reason: Option<FinishReason>) {
    match reason {
        Some(FinishReason::Length) => tracing::warn!("reply cut off at the token limit"),
        Some(FinishReason::ContentFilter) => tracing::warn!("reply stopped by the content filter"),
        Some(FinishReason::Stop | FinishReason::Other) | None => tracing::debug!("reply finished"),
    }
}

/// Accumulates deltas in arrival order.
#[derive(Clone, Debug, Default)]
pub struct ReplyBuffer {
    text: String,
    finished: bool,
}

impl ReplyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &str) {
        self.text.push_str(delta);
    }

    /// Text received so far
    pub fn text(&self) -> &str {
        &self.text
    }

    /// What to show right now: the text plus a cursor until the stream ends
    pub fn display(&self) -> String {
        if self.finished {
            self.text.clone()
        } else {
            format!("{}{CURSOR}", self.text)
        }
    }

    /// Mark the stream as ended and hand back the full text
    pub fn finish(&mut self) -> String {
        self.finished = true;
        self.text.clone()
    }
}

/// How a streamed turn ended
#[derive(Debug)]
pub enum TurnOutcome {
    /// Stream ran to the end
    Completed(String),

    /// Stream failed or was abandoned; `partial` is what had arrived
    Failed { partial: String, error: AgentError },
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Drain a reply stream, calling `on_update` after every delta.
///
/// Never returns an error: a failure mid-stream becomes [`TurnOutcome::Failed`]
/// so the caller decides what to show and what to keep.
pub async fn collect_reply<F>(mut stream: ReplyStream, mut on_update: F) -> TurnOutcome
where
    F: FnMut(&ReplyBuffer),
{
    let mut buffer = ReplyBuffer::new();

    while let Some(item) = stream.next().await {
        match item {
            Ok(delta) => {
                buffer.push(&delta);
                on_update(&buffer);
            }
            Err(error) => {
                tracing::warn!(received = buffer.text().len(), "reply stream failed: {}", error);
                return TurnOutcome::Failed {
                    partial: buffer.text().to_string(),
                    error,
                };
            }
        }
    }

    let text = buffer.finish();
    on_update(&buffer);
    TurnOutcome::Completed(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StreamChunk;
    use crate::testing::{ScriptStep, ScriptedProvider};
    use futures::stream;

    fn scripted(items: Vec<Result<String>>) -> ReplyStream {
        Box::pin(stream::iter(items))
    }

    #[test]
    fn test_buffer_cursor_until_finished() {
        let mut buffer = ReplyBuffer::new();
        buffer.push("Yields ");
        buffer.push("are low.");
        assert_eq!(buffer.display(), "Yields are low.▌");

        let text = buffer.finish();
        assert_eq!(text, "Yields are low.");
        assert_eq!(buffer.display(), "Yields are low.");
    }

    #[tokio::test]
    async fn test_collect_concatenates_in_order() {
        let stream = scripted(vec![Ok("a".into()), Ok("b".into()), Ok("c".into())]);
        let mut frames = Vec::new();
        let outcome = collect_reply(stream, |b| frames.push(b.display())).await;

        match outcome {
            TurnOutcome::Completed(text) => assert_eq!(text, "abc"),
            TurnOutcome::Failed { error, .. } => panic!("unexpected failure: {error}"),
        }
        assert_eq!(frames, vec!["a▌", "ab▌", "abc▌", "abc"]);
    }

    #[tokio::test]
    async fn test_collect_reports_partial_on_failure() {
        let stream = scripted(vec![
            Ok("Hello ".into()),
            Err(AgentError::Transport("connection reset".into())),
            Ok("never".into()),
        ]);
        let outcome = collect_reply(stream, |_| {}).await;

        match outcome {
            TurnOutcome::Failed { partial, error } => {
                assert_eq!(partial, "Hello ");
                assert!(matches!(error, AgentError::Transport(_)));
            }
            TurnOutcome::Completed(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_deltas_stop_at_final_chunk() {
        let chunks: CompletionStream = Box::pin(stream::iter(vec![
            Ok(StreamChunk::default()),
            Ok(StreamChunk::text("cut ")),
            Ok(StreamChunk {
                delta: "short".into(),
                done: true,
                finish_reason: Some(FinishReason::Length),
            }),
            Ok(StreamChunk::text("after the end")),
        ]));

        let outcome = collect_reply(text_deltas(chunks), |_| {}).await;
        match outcome {
            TurnOutcome::Completed(text) => assert_eq!(text, "cut short"),
            TurnOutcome::Failed { error, .. } => panic!("unexpected failure: {error}"),
        }
    }

    #[tokio::test]
    async fn test_stream_reply_sends_system_and_user_only() {
        let provider = ScriptedProvider::new(vec![ScriptStep::Text("ok".into())]);
        let stream = stream_reply(&provider, &GenerationOptions::default(), "PROMPT", "question")
            .await
            .unwrap();
        let outcome = collect_reply(stream, |_| {}).await;
        assert!(outcome.is_completed());

        let sent = provider.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), 2);
        assert_eq!(sent[0][0].content, "PROMPT");
        assert_eq!(sent[0][1].content, "question");
    }
}
