//! Provider transport configuration.
//!
//! A `ProviderConfig` is supplied by the caller from persisted
//! configuration and is immutable for the duration of one operation.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default per-provider timeout applied to connection, handshake and
/// every subsequent protocol request.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Byte-level channel carrying the tool protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Subprocess pipes - the process registry spawns and owns the process.
    #[default]
    Stdio,
    /// Streaming HTTP connection to an external endpoint.
    Sse,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Sse => write!(f, "sse"),
        }
    }
}

/// Error returned when parsing a transport kind from persisted text.
#[derive(Debug, Clone, Error)]
#[error("Unsupported transport kind: {0}")]
pub struct UnknownTransportError(pub String);

impl FromStr for TransportKind {
    type Err = UnknownTransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdio" => Ok(Self::Stdio),
            "sse" => Ok(Self::Sse),
            other => Err(UnknownTransportError(other.to_string())),
        }
    }
}

/// Connection configuration for one tool provider.
///
/// For stdio providers `command` is required; for SSE providers `url` is
/// required. Everything else is optional per transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Transport kind (stdio or SSE).
    pub transport: TransportKind,

    // --- Stdio provider fields ---
    /// Command to execute (e.g., "npx" or "/usr/local/bin/tool-server").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Ordered arguments to pass to the executable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    /// Environment overrides for the provider process. The child
    /// environment is the current process environment overlaid with
    /// these entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,

    // --- SSE provider fields ---
    /// Streaming endpoint URL (e.g., `http://localhost:3001/sse`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Additional request headers for the streaming connection. An
    /// `Accept: text/event-stream` header is always sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,

    /// Timeout in seconds applied to all operations against this provider.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Stdio,
            command: None,
            args: None,
            env: None,
            url: None,
            headers: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ProviderConfig {
    /// Create a stdio provider configuration.
    #[must_use]
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            transport: TransportKind::Stdio,
            command: Some(command.into()),
            args: Some(args),
            ..Self::default()
        }
    }

    /// Create an SSE provider configuration.
    #[must_use]
    pub fn sse(url: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::Sse,
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Add an environment override (stdio providers).
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Add a request header (SSE providers).
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Set the operation timeout in seconds.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// The operation timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate that the required fields for the configured transport
    /// are present.
    pub fn validate(&self) -> Result<(), String> {
        match self.transport {
            TransportKind::Stdio => {
                let command = self
                    .command
                    .as_ref()
                    .ok_or_else(|| "Stdio provider requires command".to_string())?;
                if command.is_empty() {
                    return Err("Stdio provider command cannot be empty".to_string());
                }
                Ok(())
            }
            TransportKind::Sse => {
                let url = self
                    .url
                    .as_ref()
                    .ok_or_else(|| "SSE provider requires url".to_string())?;
                if url.is_empty() {
                    return Err("SSE provider url cannot be empty".to_string());
                }
                Ok(())
            }
        }
    }
}
