//! Streaming variant of the LLM turn.

use futures::stream::{self, BoxStream};

use super::{ContentBlock, TurnResponse};

/// One `{type, data}` streaming event, step-granular rather than
/// token-granular — this crate never promises token-level deltas from a
/// synthesized stream, only from a provider with genuine streaming
/// transport.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    TextDelta(String),
    ToolStart { id: String, name: String },
    ToolResult { id: String, content: serde_json::Value },
    Final(TurnResponse),
}

pub type TurnStream = BoxStream<'static, TurnEvent>;

/// Builds a stream from an already-complete [`TurnResponse`] for providers
/// with no native streaming transport: one text delta, one event per
/// tool-use block, then the final event.
pub fn synthesize(resp: TurnResponse) -> TurnStream {
    let mut events = Vec::new();
    let text = resp.text();
    if !text.is_empty() {
        events.push(TurnEvent::TextDelta(text));
    }
    for block in &resp.content {
        if let ContentBlock::ToolUse { id, name, .. } = block {
            events.push(TurnEvent::ToolStart {
                id: id.clone(),
                name: name.clone(),
            });
        }
    }
    events.push(TurnEvent::Final(resp));
    Box::pin(stream::iter(events))
}
