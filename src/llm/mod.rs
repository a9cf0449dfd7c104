//! LLM Client.
//!
//! The provider's wire protocol is treated as a capability that accepts
//! {system prompt, messages, tool catalog} and returns a sequence of typed
//! blocks (text, tool-use, tool-result). This module defines that
//! capability as a trait plus one concrete HTTP-backed implementation, so
//! the agent runtime has a real type to drive its tool loop against.

mod http_provider;
mod stream;

pub use http_provider::HttpLlmProvider;
pub use stream::{TurnEvent, TurnStream};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One typed block within a message. A single assistant turn may
/// carry text and zero or more tool-use blocks; a single user turn carries
/// text and/or tool-result blocks answering a prior tool-use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: serde_json::Value,
        is_error: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: results,
        }
    }
}

/// `{name, description, input_schema}` tool declaration, in the JSON-Schema
/// dialect the provider accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// One LLM turn request: `{system, messages, tools, session_handle}`.
#[derive(Debug, Clone, Serialize)]
pub struct TurnRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    /// Opaque provider-side conversation handle from the session registry;
    /// when present, the provider resumes rather than replaying prior
    /// turns.
    pub session_handle: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TurnResponse {
    pub content: Vec<ContentBlock>,
    pub session_handle: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TurnResponse {
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &serde_json::Value)> {
        self.content.iter().filter_map(|b| match b {
            ContentBlock::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input)),
            _ => None,
        })
    }

    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }
}

/// The language-model capability the agent runtime is driven against.
/// Implementations own retry for transient failures — up to 3 attempts,
/// then the ticket is failed; the runtime itself does not retry, the
/// client does.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn turn(&self, req: TurnRequest) -> Result<TurnResponse, LlmError>;

    /// Streaming variant: yields `{type, data}` events for SSE consumption
    /// instead of one batched response. Default implementation synthesizes
    /// a stream from `turn` for clients that have no native streaming
    /// transport.
    async fn turn_stream(&self, req: TurnRequest) -> Result<TurnStream, LlmError> {
        let resp = self.turn(req).await?;
        Ok(stream::synthesize(resp))
    }
}
