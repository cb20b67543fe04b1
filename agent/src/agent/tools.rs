//! Tool-result rendering for the history
//!
//! - MCP result payloads become plain text the model can read
//! - Tool errors become a small JSON object with a stable `kind`

use serde_json::{json, Value};

use crate::error::ToolError;
use crate::mcp::ToolOutput;

/// Extract the text of an MCP call result.
///
/// Text items are joined with newlines; other content items are kept as
/// JSON. A payload without a `content` array is rendered whole.
pub fn render_output(output: &ToolOutput) -> String {
    let Some(items) = output.payload.get("content").and_then(Value::as_array) else {
        return output.payload.to_string();
    };

    let mut rendered = String::new();
    for item in items {
        if !rendered.is_empty() {
            rendered.push('\n');
        }
        match item.get("text").and_then(Value::as_str) {
            Some(text) if item.get("type").and_then(Value::as_str) == Some("text") => {
                rendered.push_str(text)
            }
            _ => rendered.push_str(&item.to_string()),
        }
    }
    rendered
}

/// Structured error payload recorded as the tool result
pub fn error_payload(error: &ToolError) -> String {
    json!({
        "error": {
            "kind": error.kind(),
            "message": error.to_string(),
        }
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::memory::text_payload;
    use std::time::Duration;

    #[test]
    fn test_render_text_content() {
        let output = ToolOutput {
            payload: json!({
                "content": [
                    {"type": "text", "text": "users"},
                    {"type": "image", "data": "aGk=", "mimeType": "image/png"},
                    {"type": "text", "text": "orders"}
                ]
            }),
            is_error: false,
        };

        let rendered = render_output(&output);
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines[0], "users");
        assert!(lines[1].contains("image/png"));
        assert_eq!(lines[2], "orders");
    }

    #[test]
    fn test_render_without_content() {
        let output = ToolOutput {
            payload: json!({"rows": 3}),
            is_error: false,
        };
        assert_eq!(render_output(&output), r#"{"rows":3}"#);

        let output = ToolOutput {
            payload: text_payload("ok"),
            is_error: false,
        };
        assert_eq!(render_output(&output), "ok");
    }

    #[test]
    fn test_error_payload_kind() {
        let error = ToolError::Timeout {
            backend: "pg".to_string(),
            tool: "query".to_string(),
            timeout: Duration::from_secs(60),
        };
        let payload: Value = serde_json::from_str(&error_payload(&error)).unwrap();
        assert_eq!(payload["error"]["kind"], "tool_timeout");
        assert!(payload["error"]["message"]
            .as_str()
            .unwrap()
            .contains("timed out"));
    }
}
