use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;

use crate::agent::{AgentError, Inference, InferenceBackend, Message, ToolCall};
use crate::core::error::McpError;
use crate::core::tool::{ToolBackend, ToolDescriptor};
use crate::infra::config::LimitsConfig;
use crate::infra::logging::log_metric;
use crate::infra::runtime::limits::retry_async_if;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentLimits {
    pub max_steps: usize,
    pub max_tool_calls_per_step: usize,
    /// Extra attempts for a call that failed with a transport error.
    pub tool_retries: u32,
}

impl Default for AgentLimits {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for AgentLimits {
    fn from(l: &LimitsConfig) -> Self {
        Self {
            max_steps: l.max_steps,
            max_tool_calls_per_step: l.max_tool_calls_per_step,
            tool_retries: l.tool_retries,
        }
    }
}

/// Transcript of one finished run.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRun {
    pub messages: Vec<Message>,
    /// Inference rounds used.
    pub steps: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl AgentRun {
    pub fn final_answer(&self) -> Option<&str> {
        match self.messages.last() {
            Some(Message::AiText { content }) => Some(content),
            _ => None,
        }
    }
}

pub struct ReactAgent {
    backend: Arc<dyn InferenceBackend>,
    tools: HashMap<String, Arc<dyn ToolBackend>>,
    descriptors: Vec<ToolDescriptor>,
    limits: AgentLimits,
}

impl ReactAgent {
    pub fn new(backend: Arc<dyn InferenceBackend>, tools: Vec<Arc<dyn ToolBackend>>, limits: AgentLimits) -> Self {
        let descriptors = tools.iter().map(|t| t.descriptor().clone()).collect();
        let tools = tools
            .into_iter()
            .map(|t| (t.descriptor().name.to_string(), t))
            .collect();
        Self { backend, tools, descriptors, limits }
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    pub async fn run(&self, input: &str) -> Result<AgentRun, AgentError> {
        let started_at = Utc::now();
        let mut messages = vec![Message::human(input)];

        for step in 1..=self.limits.max_steps {
            let inference = self.backend.infer(&messages, &self.descriptors).await?;
            let (text, calls) = match inference {
                Inference::ToolCalls { text, calls } if !calls.is_empty() => (text, calls),
                Inference::ToolCalls { text, .. } => {
                    messages.push(Message::ai_text(text.unwrap_or_default()));
                    return Ok(self.finish(messages, step, started_at));
                }
                Inference::Final(answer) => {
                    messages.push(Message::ai_text(answer));
                    return Ok(self.finish(messages, step, started_at));
                }
            };
            if calls.len() > self.limits.max_tool_calls_per_step {
                return Err(AgentError::ToolCallLimitExceeded {
                    requested: calls.len(),
                    max: self.limits.max_tool_calls_per_step,
                });
            }
            tracing::info!(step, calls = calls.len(), "executing tool calls");
            let results = self.execute_all(&calls).await?;
            messages.push(Message::ai_tool_calls(text, calls));
            messages.extend(results);
        }
        Err(AgentError::StepLimitExceeded { max_steps: self.limits.max_steps })
    }

    fn finish(&self, messages: Vec<Message>, steps: usize, started_at: DateTime<Utc>) -> AgentRun {
        let finished_at = Utc::now();
        let elapsed = (finished_at - started_at).num_milliseconds() as f64 / 1000.0;
        log_metric("agent", "agent_run_seconds", elapsed);
        tracing::info!(steps, messages = messages.len(), "agent run finished");
        AgentRun { messages, steps, started_at, finished_at }
    }

    /// Run one step's calls concurrently; results come back in call order.
    async fn execute_all(&self, calls: &[ToolCall]) -> Result<Vec<Message>, AgentError> {
        let mut pending: FuturesUnordered<_> = calls
            .iter()
            .enumerate()
            .map(|(i, call)| async move { (i, self.execute(call).await) })
            .collect();

        let mut done: Vec<Option<Message>> = vec![None; calls.len()];
        while let Some((i, result)) = pending.next().await {
            done[i] = Some(result?);
        }
        Ok(done.into_iter().flatten().collect())
    }

    /// Tool faults (unknown tool, bad arguments, failed execution) go back to
    /// the model as error results. Transport errors that outlast the retries
    /// and cancellations end the run.
    async fn execute(&self, call: &ToolCall) -> Result<Message, AgentError> {
        let outcome = match self.tools.get(&call.name) {
            Some(tool) => {
                retry_async_if(self.limits.tool_retries, McpError::is_transient, |attempt| {
                    if attempt > 0 {
                        tracing::warn!(tool = %call.name, attempt, "retrying tool call");
                    }
                    tool.invoke(call.arguments.clone())
                })
                .await
            }
            None => Err(McpError::NotFound(call.name.clone())),
        };
        match outcome {
            Ok(output) => {
                tracing::debug!(tool = %call.name, id = %call.id, "tool call finished");
                Ok(Message::tool_result(call.id.clone(), call.name.clone(), output.to_text()))
            }
            Err(e) if e.is_tool_fault() => {
                tracing::warn!(tool = %call.name, id = %call.id, error = %e, "tool call failed, reporting to the model");
                let content = format!("Error: {e}. Please fix your mistakes.");
                Ok(Message::tool_error(call.id.clone(), call.name.clone(), content))
            }
            Err(source) => Err(AgentError::Tool {
                tool: call.name.clone(),
                arguments: call.arguments.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::InferenceError;
    use crate::core::tool::{descriptor, InputSchema, ResultMode, ToolOutput};
    use crate::tools::dispatcher::Dispatcher;
    use crate::tools::proxy::local_tools;
    use crate::tools::registry::build_registry;
    use async_trait::async_trait;
    use serde_json::{json, Value as J};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned inferences, one per step.
    struct Scripted(Mutex<Vec<Inference>>);

    impl Scripted {
        fn new(mut steps: Vec<Inference>) -> Arc<Self> {
            steps.reverse();
            Arc::new(Self(Mutex::new(steps)))
        }
    }

    #[async_trait]
    impl InferenceBackend for Scripted {
        async fn infer(&self, _history: &[Message], _tools: &[ToolDescriptor]) -> Result<Inference, InferenceError> {
            Ok(self.0.lock().unwrap().pop().unwrap_or(Inference::Final("done".into())))
        }
    }

    fn calls(specs: &[(&str, &str, J)]) -> Inference {
        Inference::ToolCalls {
            text: None,
            calls: specs.iter().map(|(id, n, a)| ToolCall::new(*id, *n, a.clone())).collect(),
        }
    }

    fn local() -> Vec<Arc<dyn ToolBackend>> {
        local_tools(&Dispatcher::new(build_registry().unwrap()), ResultMode::Text)
    }

    #[tokio::test]
    async fn runs_tools_until_final_answer() {
        let backend = Scripted::new(vec![
            calls(&[("c1", "add", json!({"a":3,"b":5}))]),
            calls(&[("c2", "multiply", json!({"a":8,"b":12}))]),
            Inference::Final("96".into()),
        ]);
        let run = ReactAgent::new(backend, local(), AgentLimits::default()).run("(3+5)x12?").await.unwrap();
        assert_eq!(run.steps, 3);
        assert_eq!(run.final_answer(), Some("96"));
        assert_eq!(run.messages.len(), 6);
        assert_eq!(run.messages[2], Message::tool_result("c1", "add", "8"));
        assert_eq!(run.messages[4], Message::tool_result("c2", "multiply", "96"));
    }

    /// Sleeps longer for earlier calls so completion order is reversed.
    struct Slow {
        descriptor: ToolDescriptor,
    }

    #[async_trait]
    impl ToolBackend for Slow {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }
        async fn invoke(&self, arguments: J) -> Result<ToolOutput, McpError> {
            let ms = arguments["ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(ToolOutput::Text(ms.to_string()))
        }
    }

    fn slow() -> Arc<dyn ToolBackend> {
        let descriptor = descriptor("slow", "sleeps for `ms` milliseconds", &InputSchema::object());
        Arc::new(Slow { descriptor })
    }

    #[tokio::test]
    async fn results_follow_call_order_not_completion_order() {
        let backend = Scripted::new(vec![calls(&[
            ("a", "slow", json!({"ms": 60})),
            ("b", "slow", json!({"ms": 1})),
            ("c", "slow", json!({"ms": 30})),
        ])]);
        let run = ReactAgent::new(backend, vec![slow()], AgentLimits::default()).run("go").await.unwrap();
        let ids: Vec<_> = run
            .messages
            .iter()
            .filter_map(|m| match m {
                Message::ToolResult { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn tool_faults_are_reported_back_to_the_model() {
        let backend = Scripted::new(vec![
            calls(&[("c1", "divide", json!({"a":1,"b":2})), ("c2", "add", json!({"a":1}))]),
            Inference::Final("I cannot divide".into()),
        ]);
        let run = ReactAgent::new(backend, local(), AgentLimits::default()).run("1/2").await.unwrap();
        assert_eq!(run.final_answer(), Some("I cannot divide"));
        assert_eq!(run.steps, 2);
        match &run.messages[2] {
            Message::ToolResult { call_id, name, content, is_error } => {
                assert_eq!((call_id.as_str(), name.as_str()), ("c1", "divide"));
                assert!(*is_error);
                assert!(content.contains("tool not found: divide"), "{content}");
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(matches!(
            &run.messages[3],
            Message::ToolResult { is_error: true, content, .. } if content.contains("`b`")
        ));
    }

    /// Reports the session as closed.
    struct Closed {
        descriptor: ToolDescriptor,
    }

    #[async_trait]
    impl ToolBackend for Closed {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }
        async fn invoke(&self, _arguments: J) -> Result<ToolOutput, McpError> {
            Err(McpError::Cancelled("session closed".into()))
        }
    }

    #[tokio::test]
    async fn cancellation_ends_the_run_with_name_and_arguments() {
        let backend = Scripted::new(vec![calls(&[("c1", "add", json!({"a":1,"b":2}))])]);
        let closed = Arc::new(Closed { descriptor: build_registry().unwrap().describe("add").unwrap() });
        let err = ReactAgent::new(backend, vec![closed as Arc<dyn ToolBackend>], AgentLimits::default())
            .run("1+2")
            .await
            .unwrap_err();
        match err {
            AgentError::Tool { tool, arguments, source } => {
                assert_eq!(tool, "add");
                assert_eq!(arguments, json!({"a":1,"b":2}));
                assert!(matches!(source, McpError::Cancelled(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn step_limit_is_enforced() {
        let looping: Vec<_> = (0..5).map(|i| calls(&[(&*format!("c{i}"), "add", json!({"a":1,"b":1}))])).collect();
        let limits = AgentLimits { max_steps: 3, ..AgentLimits::default() };
        let err = ReactAgent::new(Scripted::new(looping), local(), limits).run("loop").await.unwrap_err();
        assert!(matches!(err, AgentError::StepLimitExceeded { max_steps: 3 }));
    }

    #[tokio::test]
    async fn too_many_calls_in_one_step_fail() {
        let many: Vec<(String, &str, J)> =
            (0..3).map(|i| (format!("c{i}"), "add", json!({"a":1,"b":1}))).collect();
        let specs: Vec<(&str, &str, J)> = many.iter().map(|(id, n, a)| (id.as_str(), *n, a.clone())).collect();
        let limits = AgentLimits { max_tool_calls_per_step: 2, ..AgentLimits::default() };
        let err = ReactAgent::new(Scripted::new(vec![calls(&specs)]), local(), limits).run("x").await.unwrap_err();
        assert!(matches!(err, AgentError::ToolCallLimitExceeded { requested: 3, max: 2 }));
    }

    /// Fails with a transport error a fixed number of times, then succeeds.
    struct Flaky {
        descriptor: ToolDescriptor,
        failures: AtomicU32,
    }

    #[async_trait]
    impl ToolBackend for Flaky {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }
        async fn invoke(&self, _arguments: J) -> Result<ToolOutput, McpError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(McpError::Transport("connection reset".into()));
            }
            Ok(ToolOutput::Text("8".into()))
        }
    }

    fn flaky(failures: u32) -> Arc<Flaky> {
        Arc::new(Flaky { descriptor: build_registry().unwrap().describe("add").unwrap(), failures: AtomicU32::new(failures) })
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let backend = Scripted::new(vec![calls(&[("c1", "add", json!({"a":3,"b":5}))])]);
        let tool = flaky(2);
        let run = ReactAgent::new(backend, vec![tool.clone() as Arc<dyn ToolBackend>], AgentLimits::default()).run("3+5").await.unwrap();
        assert_eq!(run.messages[2], Message::tool_result("c1", "add", "8"));
        assert_eq!(tool.failures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let backend = Scripted::new(vec![calls(&[("c1", "add", json!({"a":3,"b":5}))])]);
        let limits = AgentLimits { tool_retries: 1, ..AgentLimits::default() };
        let err = ReactAgent::new(backend, vec![flaky(5) as Arc<dyn ToolBackend>], limits).run("3+5").await.unwrap_err();
        assert!(matches!(err, AgentError::Tool { source: McpError::Transport(_), .. }));
    }

    #[tokio::test]
    async fn empty_tool_call_list_counts_as_an_answer() {
        let backend = Scripted::new(vec![Inference::ToolCalls { text: Some("nothing to do".into()), calls: vec![] }]);
        let run = ReactAgent::new(backend, local(), AgentLimits::default()).run("hi").await.unwrap();
        assert_eq!(run.final_answer(), Some("nothing to do"));
        assert_eq!(run.steps, 1);
    }
}
