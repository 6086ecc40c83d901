//! Reasoning loop: a model decides, tools act, until the model answers.

pub mod react;
pub mod transcript;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as J;
use thiserror::Error;

use crate::core::error::McpError;
use crate::core::tool::ToolDescriptor;

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: J,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: J) -> Self {
        Self { id: id.into(), name: name.into(), arguments }
    }
}

/// Conversation history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Human {
        content: String,
    },
    AiText {
        content: String,
    },
    AiToolCalls {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        calls: Vec<ToolCall>,
    },
    ToolResult {
        call_id: String,
        name: String,
        content: String,
        /// The call failed; `content` describes the failure for the model.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        Message::Human { content: content.into() }
    }

    pub fn ai_text(content: impl Into<String>) -> Self {
        Message::AiText { content: content.into() }
    }

    pub fn ai_tool_calls(text: Option<String>, calls: Vec<ToolCall>) -> Self {
        Message::AiToolCalls { text, calls }
    }

    pub fn tool_result(call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Message::ToolResult { call_id: call_id.into(), name: name.into(), content: content.into(), is_error: false }
    }

    pub fn tool_error(call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Message::ToolResult { call_id: call_id.into(), name: name.into(), content: content.into(), is_error: true }
    }
}

/// What the model produced for one step.
#[derive(Debug, Clone, PartialEq)]
pub enum Inference {
    Final(String),
    ToolCalls { text: Option<String>, calls: Vec<ToolCall> },
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference transport error: {0}")]
    Transport(String),
    #[error("inference backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("cannot decode inference response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for InferenceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            InferenceError::Decode(e.to_string())
        } else {
            InferenceError::Transport(e.to_string())
        }
    }
}

/// The language model, seen as an opaque decision function over the history.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn infer(&self, history: &[Message], tools: &[ToolDescriptor]) -> Result<Inference, InferenceError>;
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("no final answer after {max_steps} steps")]
    StepLimitExceeded { max_steps: usize },
    #[error("model requested {requested} tool calls in one step (limit {max})")]
    ToolCallLimitExceeded { requested: usize, max: usize },
    #[error("tool `{tool}` failed with arguments {arguments}: {source}")]
    Tool {
        tool: String,
        arguments: J,
        #[source]
        source: McpError,
    },
    #[error(transparent)]
    Inference(#[from] InferenceError),
}
