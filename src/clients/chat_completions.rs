//! OpenAI-compatible `/chat/completions` client used as the inference backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as J;

use crate::agent::{Inference, InferenceBackend, InferenceError, Message, ToolCall};
use crate::core::tool::ToolDescriptor;
use crate::infra::config::LlmConfig;
use crate::infra::http::headers::add_standard_headers;

#[derive(Serialize, Debug, Clone, PartialEq)]
struct ChatMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
}

impl ChatMessage {
    fn plain(role: &'static str, content: &str) -> Self {
        Self { role, content: Some(content.to_owned()), tool_call_id: None, tool_calls: None }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct ChatToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: ChatToolCallFunction,
}

fn function_kind() -> String {
    "function".into()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct ChatToolCallFunction {
    name: String,
    /// JSON-encoded argument object.
    arguments: String,
}

#[derive(Serialize)]
struct ChatToolDefinition<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ChatToolFunction<'a>,
}

#[derive(Serialize)]
struct ChatToolFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: J,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatToolDefinition<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChatToolCall>>,
}

pub struct ChatCompletionsBackend {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    system_prompt: Option<String>,
}

impl ChatCompletionsBackend {
    pub fn new(http: reqwest::Client, cfg: &LlmConfig) -> Self {
        Self {
            http,
            url: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
            system_prompt: cfg.system_prompt.clone(),
        }
    }

    fn to_chat_messages(&self, history: &[Message]) -> Result<Vec<ChatMessage>, InferenceError> {
        let mut out = Vec::with_capacity(history.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            out.push(ChatMessage::plain("system", prompt));
        }
        for m in history {
            out.push(match m {
                Message::Human { content } => ChatMessage::plain("user", content),
                Message::AiText { content } => ChatMessage::plain("assistant", content),
                Message::AiToolCalls { text, calls } => {
                    let tool_calls = calls
                        .iter()
                        .map(|c| {
                            Ok(ChatToolCall {
                                id: c.id.clone(),
                                kind: function_kind(),
                                function: ChatToolCallFunction {
                                    name: c.name.clone(),
                                    arguments: serde_json::to_string(&c.arguments)
                                        .map_err(|e| InferenceError::Decode(e.to_string()))?,
                                },
                            })
                        })
                        .collect::<Result<Vec<_>, InferenceError>>()?;
                    ChatMessage {
                        role: "assistant",
                        content: text.clone(),
                        tool_call_id: None,
                        tool_calls: Some(tool_calls),
                    }
                }
                Message::ToolResult { call_id, content, .. } => ChatMessage {
                    role: "tool",
                    content: Some(content.clone()),
                    tool_call_id: Some(call_id.clone()),
                    tool_calls: None,
                },
            });
        }
        Ok(out)
    }
}

fn tool_definitions(tools: &[ToolDescriptor]) -> Vec<ChatToolDefinition<'_>> {
    tools
        .iter()
        .map(|t| ChatToolDefinition {
            kind: "function",
            function: ChatToolFunction {
                name: t.name.as_ref(),
                description: t.description.as_deref().unwrap_or(""),
                // the raw schema, so keywords the gateway does not check still reach the model
                parameters: J::Object(t.input_schema.as_ref().clone()),
            },
        })
        .collect()
}

fn into_inference(message: ChatResponseMessage) -> Result<Inference, InferenceError> {
    let text = message.content.filter(|t| !t.trim().is_empty());
    let tool_calls = message.tool_calls.unwrap_or_default();
    if tool_calls.is_empty() {
        return Ok(Inference::Final(text.unwrap_or_default()));
    }
    let calls = tool_calls
        .into_iter()
        .map(|c| {
            let raw = if c.function.arguments.trim().is_empty() { "{}" } else { c.function.arguments.as_str() };
            let arguments: J = serde_json::from_str(raw).map_err(|e| {
                InferenceError::Decode(format!("arguments for `{}` are not JSON: {e}", c.function.name))
            })?;
            Ok(ToolCall::new(c.id, c.function.name, arguments))
        })
        .collect::<Result<Vec<_>, InferenceError>>()?;
    Ok(Inference::ToolCalls { text, calls })
}

#[async_trait]
impl InferenceBackend for ChatCompletionsBackend {
    async fn infer(&self, history: &[Message], tools: &[ToolDescriptor]) -> Result<Inference, InferenceError> {
        let body = ChatRequest {
            model: &self.model,
            messages: self.to_chat_messages(history)?,
            stream: false,
            tools: tool_definitions(tools),
        };
        let builder = self.http.post(&self.url).json(&body);
        let builder = match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        };
        let (builder, request_id) = add_standard_headers(builder, None);
        tracing::debug!(model = %self.model, messages = history.len(), request_id = %request_id, "inference request");

        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Status { status: status.as_u16(), body });
        }
        let parsed: ChatResponse = resp.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| InferenceError::Decode("response has no choices".into()))?;
        into_inference(choice.message)
    }
}
