//! Stream aggregator: folds one provider stream into one assistant message.
//!
//! Content deltas are forwarded to the runtime bus as they arrive, tool-call
//! fragments are merged by index, and reasoning deltas are surfaced as their
//! own event segment without ever reaching the message content.

use std::collections::BTreeMap;

use steward_core::cancel::CancelFlag;
use steward_core::error::ProviderError;
use steward_core::message::{Message, ToolCallRequest};
use steward_core::provider::{Provider, ProviderRequest, ToolCallFragment, Usage};
use steward_telemetry::RuntimeBus;
use tracing::debug;

/// Deterministic token estimate used when the provider reports no usage.
pub fn estimate_tokens(chars: i64) -> u32 {
    if chars <= 0 {
        return 0;
    }
    u32::try_from(chars / 2).unwrap_or(u32::MAX).max(1)
}

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Index-keyed accumulator for streamed tool-call fragments.
#[derive(Debug, Default)]
pub struct FragmentMap {
    calls: BTreeMap<u32, PendingCall>,
}

impl FragmentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment. Id and name are set once; argument text is appended.
    pub fn merge(&mut self, fragment: &ToolCallFragment) {
        let call = self.calls.entry(fragment.index).or_default();
        if call.id.is_none()
            && let Some(id) = fragment.id.as_deref().filter(|s| !s.is_empty())
        {
            call.id = Some(id.to_string());
        }
        if call.name.is_none()
            && let Some(name) = fragment.name.as_deref().filter(|s| !s.is_empty())
        {
            call.name = Some(name.to_string());
        }
        if let Some(args) = &fragment.arguments {
            call.arguments.push_str(args);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Finished calls in ascending index order.
    ///
    /// A call whose id never arrived gets `call_{index}`.
    pub fn finalize(self) -> Vec<ToolCallRequest> {
        self.calls
            .into_iter()
            .map(|(index, call)| ToolCallRequest {
                id: call.id.unwrap_or_else(|| format!("call_{index}")),
                name: call.name.unwrap_or_default(),
                arguments: call.arguments,
            })
            .collect()
    }
}

/// A completed stream.
#[derive(Debug, Clone)]
pub struct Aggregated {
    pub message: Message,
    pub usage: Usage,
    /// True when `usage` was estimated from character counts.
    pub estimated: bool,
}

impl Aggregated {
    pub fn has_tool_calls(&self) -> bool {
        self.message.has_tool_calls()
    }
}

#[derive(Debug, Clone)]
pub enum StreamOutcome {
    Complete(Aggregated),
    /// The cancel flag was seen; nothing streamed so far is kept.
    Cancelled { usage: Usage },
}

fn char_count(s: &str) -> i64 {
    i64::try_from(s.chars().count()).unwrap_or(i64::MAX)
}

/// Run one inference call and aggregate its deltas.
pub async fn aggregate(
    provider: &dyn Provider,
    request: ProviderRequest,
    bus: &RuntimeBus,
    cancel: &CancelFlag,
) -> Result<StreamOutcome, ProviderError> {
    let prompt_chars: i64 = request.messages.iter().map(|m| char_count(&m.content)).sum();
    let mut rx = provider.stream(request).await?;

    let mut content = String::new();
    let mut reasoning_chars: i64 = 0;
    let mut fragments = FragmentMap::new();
    let mut reported: Option<Usage> = None;
    let mut stage_cleared = false;
    let mut streaming = false;
    let mut reasoning_open = false;
    let mut cancelled = false;

    while let Some(item) = rx.recv().await {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(e) => {
                if reasoning_open {
                    bus.reasoning_end();
                }
                return Err(e);
            }
        };

        if chunk.usage.is_some() {
            reported = chunk.usage;
        }

        if let Some(reasoning) = chunk.reasoning.as_deref().filter(|s| !s.is_empty()) {
            if !reasoning_open {
                bus.clear_stage();
                bus.reasoning_start();
                reasoning_open = true;
            }
            bus.reasoning_token(reasoning);
            reasoning_chars += char_count(reasoning);
        }

        if let Some(text) = chunk.content.as_deref().filter(|s| !s.is_empty()) {
            if reasoning_open {
                bus.reasoning_end();
                reasoning_open = false;
            }
            if !streaming {
                bus.clear_stage();
                bus.stream_start();
                streaming = true;
                stage_cleared = true;
            }
            bus.stream_token(text);
            content.push_str(text);
        }

        if !chunk.tool_calls.is_empty() {
            if reasoning_open {
                bus.reasoning_end();
                reasoning_open = false;
            }
            if !stage_cleared {
                bus.clear_stage();
                stage_cleared = true;
            }
            for fragment in &chunk.tool_calls {
                fragments.merge(fragment);
            }
        }
    }

    if reasoning_open {
        bus.reasoning_end();
    }
    if streaming {
        bus.stream_end();
    }

    let (usage, estimated) = match reported {
        Some(u) if u.total_tokens > 0 => (u, false),
        _ => {
            let prompt_tokens = estimate_tokens(prompt_chars);
            let completion_tokens = estimate_tokens(char_count(&content) + reasoning_chars);
            let usage = Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens.saturating_add(completion_tokens),
            };
            (usage, true)
        }
    };

    if cancelled {
        debug!(discarded_chars = content.len(), "Stream cancelled");
        return Ok(StreamOutcome::Cancelled { usage });
    }

    debug!(
        content_chars = content.len(),
        tool_calls = fragments.len(),
        estimated,
        "Stream aggregated"
    );
    let message = if fragments.is_empty() {
        Message::assistant(content)
    } else {
        Message::assistant_with_tools(content, fragments.finalize())
    };
    Ok(StreamOutcome::Complete(Aggregated {
        message,
        usage,
        estimated,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{ScriptedProvider, ScriptedReply};
    use steward_core::provider::StreamChunk;

    fn request(content: &str) -> ProviderRequest {
        ProviderRequest {
            model: "mock-model".into(),
            messages: vec![Message::system("sys"), Message::user(content)],
            temperature: None,
            tools: vec![],
            stream: true,
        }
    }

    fn fragment(index: u32, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> ToolCallFragment {
        ToolCallFragment {
            index,
            id: id.map(String::from),
            name: name.map(String::from),
            arguments: args.map(String::from),
        }
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<std::sync::Arc<steward_core::RuntimeEvent>>) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            names.push(ev.kind.name().to_string());
        }
        names
    }

    #[test]
    fn estimate_rule() {
        assert_eq!(estimate_tokens(-3), 0);
        assert_eq!(estimate_tokens(0), 0);
        assert_eq!(estimate_tokens(1), 1);
        assert_eq!(estimate_tokens(7), 3);
    }

    #[test]
    fn fragments_merge_by_index() {
        let mut map = FragmentMap::new();
        map.merge(&fragment(1, Some("b"), Some("list_dir"), Some("{\"pa")));
        map.merge(&fragment(0, Some("a"), Some("read_file"), Some("{")));
        map.merge(&fragment(1, None, None, Some("th\":\".\"}")));
        map.merge(&fragment(0, Some("ignored"), Some("ignored"), Some("}")));

        let calls = map.finalize();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "a");
        assert_eq!(calls[0].name, "read_file");
        assert_eq!(calls[0].arguments, "{}");
        assert_eq!(calls[1].arguments, "{\"path\":\".\"}");
    }

    #[test]
    fn missing_id_is_synthesized() {
        let mut map = FragmentMap::new();
        map.merge(&fragment(3, None, Some("read_file"), None));
        assert_eq!(map.finalize()[0].id, "call_3");
    }

    #[tokio::test]
    async fn interleaved_fragments_come_out_sorted() {
        let bus = RuntimeBus::builder("mock", "mock-model").build();
        let provider = ScriptedProvider::new(vec![ScriptedReply::chunks(vec![
            StreamChunk::fragment(fragment(2, Some("c2"), Some("delete_file"), Some("{\"file"))),
            StreamChunk::fragment(fragment(0, Some("c0"), Some("read_file"), None)),
            StreamChunk::text("Working"),
            StreamChunk::fragment(fragment(1, Some("c1"), Some("list_dir"), Some("{\"path\""))),
            StreamChunk::fragment(fragment(0, None, None, Some("{\"filename\":"))),
            StreamChunk::fragment(fragment(2, None, None, Some("name\":\"old.txt\"}"))),
            StreamChunk::fragment(fragment(1, None, None, Some(":\".\"}"))),
            StreamChunk::fragment(fragment(0, None, None, Some("\"notes.txt\"}"))),
        ])]);

        let out = aggregate(&provider, request("tidy up"), &bus, &CancelFlag::new())
            .await
            .unwrap();
        let StreamOutcome::Complete(agg) = out else {
            panic!("expected completion");
        };
        assert!(agg.has_tool_calls());
        assert_eq!(agg.message.content, "Working");

        let calls: Vec<(&str, &str, &str)> = agg
            .message
            .tool_calls
            .iter()
            .map(|c| (c.id.as_str(), c.name.as_str(), c.arguments.as_str()))
            .collect();
        assert_eq!(
            calls,
            [
                ("c0", "read_file", r#"{"filename":"notes.txt"}"#),
                ("c1", "list_dir", r#"{"path":"."}"#),
                ("c2", "delete_file", r#"{"filename":"old.txt"}"#),
            ]
        );
    }

    #[tokio::test]
    async fn plain_content_with_reported_usage() {
        let bus = RuntimeBus::builder("mock", "mock-model").build();
        let mut rx = bus.subscribe();
        let provider = ScriptedProvider::new(vec![ScriptedReply::chunks(vec![
            StreamChunk::text("Hel"),
            StreamChunk::text("lo"),
            StreamChunk {
                usage: Some(Usage {
                    prompt_tokens: 11,
                    completion_tokens: 2,
                    total_tokens: 13,
                }),
                ..Default::default()
            },
        ])]);

        let out = aggregate(&provider, request("hi"), &bus, &CancelFlag::new())
            .await
            .unwrap();
        let StreamOutcome::Complete(agg) = out else {
            panic!("expected completion");
        };
        assert_eq!(agg.message.content, "Hello");
        assert!(!agg.has_tool_calls());
        assert!(!agg.estimated);
        assert_eq!(agg.usage.total_tokens, 13);

        let names = drain(&mut rx);
        assert_eq!(
            names,
            [
                "status.clear",
                "assistant.stream.start",
                "assistant.stream.token",
                "assistant.stream.token",
                "assistant.stream.end"
            ]
        );
    }

    #[tokio::test]
    async fn usage_is_estimated_when_missing() {
        let bus = RuntimeBus::builder("mock", "mock-model").build();
        let provider = ScriptedProvider::new(vec![ScriptedReply::chunks(vec![
            StreamChunk {
                reasoning: Some("abcd".into()),
                ..Default::default()
            },
            StreamChunk::text("123456"),
        ])]);

        // "sys" + "hello!" = 9 prompt chars, 6 content + 4 reasoning = 10
        let out = aggregate(&provider, request("hello!"), &bus, &CancelFlag::new())
            .await
            .unwrap();
        let StreamOutcome::Complete(agg) = out else {
            panic!("expected completion");
        };
        assert!(agg.estimated);
        assert_eq!(agg.usage.prompt_tokens, 4);
        assert_eq!(agg.usage.completion_tokens, 5);
        assert_eq!(agg.usage.total_tokens, 9);
        assert_eq!(agg.message.content, "123456");
    }

    #[tokio::test]
    async fn reasoning_segment_closes_on_tool_call() {
        let bus = RuntimeBus::builder("mock", "mock-model").build();
        let mut rx = bus.subscribe();
        let provider = ScriptedProvider::new(vec![ScriptedReply::chunks(vec![
            StreamChunk {
                reasoning: Some("think".into()),
                ..Default::default()
            },
            StreamChunk::fragment(fragment(0, Some("c1"), Some("read_file"), Some("{}"))),
        ])]);

        let out = aggregate(&provider, request("x"), &bus, &CancelFlag::new())
            .await
            .unwrap();
        let StreamOutcome::Complete(agg) = out else {
            panic!("expected completion");
        };
        assert!(agg.has_tool_calls());
        assert_eq!(agg.message.content, "");

        let names = drain(&mut rx);
        assert_eq!(
            names,
            [
                "status.clear",
                "assistant.reasoning.start",
                "assistant.reasoning.token",
                "assistant.reasoning.end"
            ]
        );
    }

    #[tokio::test]
    async fn cancel_discards_partial_content() {
        let bus = RuntimeBus::builder("mock", "mock-model").build();
        let cancel = CancelFlag::new();
        let provider = ScriptedProvider::new(vec![ScriptedReply::chunks(vec![
            StreamChunk::text("partial"),
            StreamChunk::text(" more"),
        ])])
        .cancel_at(1, cancel.clone());

        let out = aggregate(&provider, request("x"), &bus, &cancel).await.unwrap();
        assert!(matches!(out, StreamOutcome::Cancelled { .. }));
    }

    #[tokio::test]
    async fn provider_error_propagates() {
        let bus = RuntimeBus::builder("mock", "mock-model").build();
        let provider = ScriptedProvider::new(vec![ScriptedReply::Fail(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]);
        let err = aggregate(&provider, request("x"), &bus, &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn mid_stream_error_propagates() {
        let bus = RuntimeBus::builder("mock", "mock-model").build();
        let provider = ScriptedProvider::new(vec![ScriptedReply::Stream(vec![
            Ok(StreamChunk::text("a")),
            Err(ProviderError::StreamInterrupted("reset".into())),
        ])]);
        let err = aggregate(&provider, request("x"), &bus, &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::StreamInterrupted(_)));
    }
}
