//! Helpers over the `rmcp` tool result model.

use rmcp::model::{CallToolResult, Content, RawContent};

/// Successful result carrying one text item.
pub fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

pub fn is_error(result: &CallToolResult) -> bool {
    result.is_error.unwrap_or(false)
}

/// Text items joined by newlines; non-text items are rendered as their JSON.
pub fn flatten_text(content: &[Content]) -> String {
    content
        .iter()
        .map(|c| match &c.raw {
            RawContent::Text(t) => t.text.clone(),
            _ => serde_json::to_string(c).unwrap_or_default(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
