//! Caller-facing error taxonomy.
//!
//! Exactly three kinds cross the subsystem boundary. Raw transport and
//! protocol-library failures are classified into these at the session
//! boundary and never re-classified downstream.

use thiserror::Error;

/// Error taxonomy for tool provider operations.
///
/// Mapping guidance for callers translating these into responses:
/// `Connection` is recoverable by retry or provider reconfiguration
/// ("service unavailable"); `Timeout` by retry with backoff or a larger
/// configured timeout ("gateway timeout"); `Client` is a generic
/// protocol-level or unexpected failure.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport or handshake could not be established.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// An operation exceeded the provider's configured timeout.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A protocol-level or unexpected failure that is neither a
    /// connection nor a timeout issue.
    #[error("Client error: {0}")]
    Client(String),
}

impl ProviderError {
    /// True for errors worth retrying without reconfiguration.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }
}
