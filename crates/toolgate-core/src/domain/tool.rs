//! Normalized records produced by tool and resource operations.
//!
//! Descriptors and results are produced fresh on every call and are not
//! cached or persisted by the session subsystem; callers decide what to
//! store.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool exposed by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name (function name).
    pub name: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// JSON Schema for input parameters, as declared by the provider.
    #[serde(default)]
    pub input_schema: Value,
}

/// A resource exposed by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Resource URI.
    pub uri: String,

    /// Resource name.
    #[serde(default)]
    pub name: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// MIME type, when the provider declares one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// One content item from a tool invocation or resource read.
///
/// Items the provider returns in shapes other than these are skipped
/// during normalization, not treated as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    /// Textual payload.
    Text {
        /// The text content.
        text: String,
    },
    /// Opaque payload (binary blob, embedded resource, ...).
    Resource {
        /// The raw payload as the provider sent it.
        data: Value,
    },
}

/// Result of a tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationResult {
    /// Name of the invoked tool.
    pub tool_name: String,

    /// Whether the provider reported success.
    pub success: bool,

    /// Ordered content items from the response.
    pub content: Vec<ContentItem>,

    /// Provider-reported error message (if any).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvocationResult {
    /// Create a successful result.
    pub fn success(tool_name: impl Into<String>, content: Vec<ContentItem>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            content,
            error: None,
        }
    }

    /// Create a failed result with a provider error message.
    pub fn error(
        tool_name: impl Into<String>,
        content: Vec<ContentItem>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            content,
            error: Some(message.into()),
        }
    }
}

/// Result of reading a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceReadResult {
    /// URI of the resource that was read.
    pub uri: String,

    /// Whether the read succeeded.
    pub success: bool,

    /// Ordered content items from the response.
    pub content: Vec<ContentItem>,

    /// Explanatory message when the read did not succeed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResourceReadResult {
    /// Create a successful result.
    pub fn success(uri: impl Into<String>, content: Vec<ContentItem>) -> Self {
        Self {
            uri: uri.into(),
            success: true,
            content,
            error: None,
        }
    }

    /// Create a failed result with an explanatory message.
    pub fn error(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            success: false,
            content: Vec::new(),
            error: Some(message.into()),
        }
    }
}
