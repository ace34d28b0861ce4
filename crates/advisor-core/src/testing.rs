//! Scripted provider for tests.
//!
//! Replays the same script on every request and records what was sent.

use std::sync::Mutex;

use async_trait::async_trait;
use futures::{future, stream, StreamExt};

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{
    Completion, CompletionStream, FinishReason, GenerationOptions, LlmProvider, ModelInfo,
    StreamChunk,
};

/// One step of a scripted reply
#[derive(Clone, Debug)]
pub enum ScriptStep {
    /// Emit a text delta
    Text(String),
    /// Emit a chunk with no content (role or keep-alive frame)
    Empty,
    /// Fail the stream with a transport error
    Fail(String),
    /// Stop sending without ever finishing
    Hang,
}

#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Vec<ScriptStep>,
    refuse: Option<String>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            script,
            ..Default::default()
        }
    }

    /// Provider whose every request fails before any chunk arrives
    pub fn refusing(reason: impl Into<String>) -> Self {
        Self {
            refuse: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Message lists received so far, one entry per request
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn record(&self, messages: &[Message]) -> Result<()> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        match &self.refuse {
            Some(reason) => Err(AgentError::Transport(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.refuse.is_none())
    }

    async fn complete(&self, messages: &[Message], options: &GenerationOptions) -> Result<Completion> {
        self.record(messages)?;
        let mut content = String::new();
        for step in &self.script {
            match step {
                ScriptStep::Text(text) => content.push_str(text),
                ScriptStep::Empty => {}
                ScriptStep::Fail(reason) => return Err(AgentError::Transport(reason.clone())),
                ScriptStep::Hang => future::pending::<()>().await,
            }
        }
        Ok(Completion {
            content,
            model: options.model.clone(),
            finish_reason: Some(FinishReason::Stop),
        })
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        self.record(messages)?;

        let mut items: Vec<Result<StreamChunk>> = Vec::new();
        let mut failed = false;
        let mut hang = false;
        for step in &self.script {
            match step {
                ScriptStep::Text(text) => items.push(Ok(StreamChunk::text(text.clone()))),
                ScriptStep::Empty => items.push(Ok(StreamChunk::default())),
                ScriptStep::Fail(reason) => {
                    items.push(Err(AgentError::Transport(reason.clone())));
                    failed = true;
                    break;
                }
                ScriptStep::Hang => {
                    hang = true;
                    break;
                }
            }
        }
        if hang {
            return Ok(Box::pin(stream::iter(items).chain(stream::pending())));
        }
        if !failed {
            items.push(Ok(StreamChunk::finished(Some(FinishReason::Stop))));
        }

        Ok(Box::pin(stream::iter(items)))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            id: "scripted".into(),
            owned_by: None,
        }])
    }
}
