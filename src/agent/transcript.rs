use std::fmt::Write as _;

use crate::agent::react::AgentRun;
use crate::agent::Message;

/// Human-readable rendering of a run, one block per message.
pub fn render_readable(question: &str, run: &AgentRun) -> String {
    let mut out = format!("\nQUESTION: {question}\n\n--- CONVERSATION ---\n");
    for message in &run.messages {
        out.push('\n');
        render_message(&mut out, message);
    }
    out
}

fn render_message(out: &mut String, message: &Message) {
    // Writing into a String cannot fail.
    let _ = match message {
        Message::Human { content } => writeln!(out, "HUMAN: {content}"),
        Message::AiText { content } => writeln!(out, "AI: {content}"),
        Message::AiToolCalls { text, calls } => {
            if let Some(text) = text.as_deref().filter(|t| !t.trim().is_empty()) {
                let _ = writeln!(out, "AI: {text}");
            }
            for call in calls {
                let args = serde_json::to_string_pretty(&call.arguments).unwrap_or_else(|_| call.arguments.to_string());
                let _ = writeln!(out, "TOOL CALL: {}({args})", call.name);
            }
            Ok(())
        }
        Message::ToolResult { name, content, is_error: false, .. } => writeln!(out, "TOOL RESULT ({name}): {content}"),
        Message::ToolResult { name, content, is_error: true, .. } => writeln!(out, "TOOL ERROR ({name}): {content}"),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ToolCall;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn renders_each_message_kind() {
        let now = Utc::now();
        let run = AgentRun {
            messages: vec![
                Message::human("what's 3 + 5?"),
                Message::ai_tool_calls(Some("Let me add.".into()), vec![ToolCall::new("c1", "add", json!({"a":3}))]),
                Message::tool_result("c1", "add", "8"),
                Message::tool_error("c2", "divide", "Error: tool not found: divide"),
                Message::ai_text("It is 8."),
            ],
            steps: 2,
            started_at: now,
            finished_at: now,
        };
        let text = render_readable("what's 3 + 5?", &run);
        assert!(text.contains("QUESTION: what's 3 + 5?"));
        assert!(text.contains("--- CONVERSATION ---"));
        assert!(text.contains("HUMAN: what's 3 + 5?"));
        assert!(text.contains("AI: Let me add."));
        assert!(text.contains("TOOL CALL: add({\n  \"a\": 3\n})"));
        assert!(text.contains("TOOL RESULT (add): 8"));
        assert!(text.contains("TOOL ERROR (divide): Error: tool not found: divide"));
        assert!(text.trim_end().ends_with("AI: It is 8."));
    }
}
