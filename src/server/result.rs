//! Tool-result envelope
//!
//! The only legal return shape for a tool handler: an ordered list of
//! content parts plus an `isError` flag. Handlers never raise past the
//! dispatcher; failures are rendered into this envelope.

use crate::error::McpError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One part of a tool result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    /// Plain text
    Text { text: String },

    /// Inline binary payload, base64-encoded
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },

    /// Reference to a server resource
    Resource {
        uri: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

/// Result envelope returned by every tool handler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ContentPart>,

    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolResult {
    /// Successful result with a single text part
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentPart::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Successful result whose text part is pretty-printed JSON
    pub fn json(value: &Value) -> Self {
        let text =
            serde_json::to_string_pretty(value).unwrap_or_else(|_| "<unserializable>".to_string());
        Self::text(text)
    }

    /// Failure with a human-readable diagnostic
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentPart::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Successful result composed of multiple pre-built parts
    pub fn parts(content: Vec<ContentPart>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// Serialize to the wire shape expected in a `tools/call` response
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({
                "content": [{"type": "text", "text": "internal serialization failure"}],
                "isError": true
            })
        })
    }

    /// Append a text part
    pub fn push_text(&mut self, text: impl Into<String>) {
        self.content.push(ContentPart::Text { text: text.into() });
    }
}

impl From<McpError> for ToolResult {
    fn from(err: McpError) -> Self {
        match err {
            McpError::Internal(ref msg) => {
                tracing::error!(error = %msg, "internal error in tool handler");
                ToolResult::error("An internal error occurred; see server logs")
            }
            other => ToolResult::error(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_result_shape() {
        let result = ToolResult::text("hello");
        let value = result.to_value();
        assert_eq!(value["isError"], false);
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["content"][0]["text"], "hello");
    }

    #[test]
    fn test_error_result_shape() {
        let result = ToolResult::error("boom");
        let value = result.to_value();
        assert_eq!(value["isError"], true);
        assert_eq!(value["content"][0]["text"], "boom");
    }

    #[test]
    fn test_resource_part() {
        let result = ToolResult::parts(vec![ContentPart::Resource {
            uri: "hanzo://system-prompt".to_string(),
            mime_type: "text/plain".to_string(),
        }]);
        let value = result.to_value();
        assert_eq!(value["content"][0]["type"], "resource");
        assert_eq!(value["content"][0]["uri"], "hanzo://system-prompt");
        assert_eq!(value["content"][0]["mimeType"], "text/plain");
    }

    #[test]
    fn test_permission_error_renders_path() {
        let result: ToolResult = McpError::not_permitted("/etc/shadow").into();
        let value = result.to_value();
        assert_eq!(value["isError"], true);
        let text = value["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("/etc/shadow"));
    }

    #[test]
    fn test_internal_error_is_generic() {
        let result: ToolResult = McpError::Internal("secret detail".to_string()).into();
        let text = result.to_value()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(!text.contains("secret detail"));
    }
}
