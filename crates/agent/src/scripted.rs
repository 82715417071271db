//! A provider that replays canned streams.
//!
//! Each call to `stream` pops the next reply; an empty script fails the
//! call. Used by tests across the workspace.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use steward_core::cancel::CancelFlag;
use steward_core::error::ProviderError;
use steward_core::provider::{
    DeltaReceiver, Provider, ProviderRequest, StreamChunk, ToolCallFragment, Usage,
};
use tokio::sync::mpsc;

/// One scripted inference call.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Deltas sent in order, then the stream closes.
    Stream(Vec<Result<StreamChunk, ProviderError>>),
    /// The call fails before any delta.
    Fail(ProviderError),
}

impl ScriptedReply {
    pub fn chunks(chunks: Vec<StreamChunk>) -> Self {
        Self::Stream(chunks.into_iter().map(Ok).collect())
    }

    /// A plain answer split into two deltas.
    pub fn text(text: &str) -> Self {
        let (head, tail) = split_half(text);
        Self::chunks(
            [head, tail]
                .into_iter()
                .filter(|s| !s.is_empty())
                .map(StreamChunk::text)
                .collect(),
        )
    }

    /// A single tool call whose argument text arrives in two fragments.
    pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        Self::tool_calls(&[(id, name, arguments)])
    }

    /// Several tool calls, fragments interleaved by index.
    pub fn tool_calls(calls: &[(&str, &str, serde_json::Value)]) -> Self {
        let mut heads = Vec::new();
        let mut tails = Vec::new();
        for (index, (id, name, arguments)) in calls.iter().enumerate() {
            let index = u32::try_from(index).unwrap_or(u32::MAX);
            let raw = arguments.to_string();
            let (head, tail) = split_half(&raw);
            heads.push(StreamChunk::fragment(ToolCallFragment {
                index,
                id: Some((*id).to_string()),
                name: Some((*name).to_string()),
                arguments: Some(head.to_string()),
            }));
            tails.push(StreamChunk::fragment(ToolCallFragment {
                index,
                arguments: Some(tail.to_string()),
                ..Default::default()
            }));
        }
        heads.extend(tails);
        Self::chunks(heads)
    }

    /// Append a usage report as the final delta.
    pub fn with_usage(self, prompt_tokens: u32, completion_tokens: u32) -> Self {
        match self {
            Self::Stream(mut items) => {
                items.push(Ok(StreamChunk {
                    usage: Some(Usage {
                        prompt_tokens,
                        completion_tokens,
                        total_tokens: prompt_tokens + completion_tokens,
                    }),
                    ..Default::default()
                }));
                Self::Stream(items)
            }
            fail => fail,
        }
    }
}

fn split_half(s: &str) -> (&str, &str) {
    let mid = s
        .char_indices()
        .nth(s.chars().count() / 2)
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s.split_at(mid)
}

pub struct ScriptedProvider {
    name: String,
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<ProviderRequest>>,
    cancel_at: Option<(usize, CancelFlag)>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            name: "scripted".into(),
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            cancel_at: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Raise `flag` right before sending delta number `index` of each stream.
    pub fn cancel_at(mut self, index: usize, flag: CancelFlag) -> Self {
        self.cancel_at = Some((index, flag));
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: ProviderRequest) -> Result<DeltaReceiver, ProviderError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        let items = match reply {
            Some(ScriptedReply::Stream(items)) => items,
            Some(ScriptedReply::Fail(e)) => return Err(e),
            None => {
                return Err(ProviderError::ApiError {
                    status_code: 500,
                    message: "script exhausted".into(),
                });
            }
        };

        let (tx, rx) = mpsc::channel(items.len().max(1));
        let cancel_at = self.cancel_at.clone();
        tokio::spawn(async move {
            for (i, item) in items.into_iter().enumerate() {
                if let Some((at, flag)) = &cancel_at
                    && *at == i
                {
                    flag.cancel();
                }
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}
