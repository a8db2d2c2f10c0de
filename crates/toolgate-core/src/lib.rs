//! Core domain types and caller-facing contracts for toolgate.
//!
//! This crate holds the data model shared between the tool session
//! subsystem and its callers: provider configuration, the normalized
//! records produced by tool/resource operations, and the error taxonomy
//! that crosses the subsystem boundary. It performs no I/O.

pub mod domain;
pub mod ports;

// Re-export commonly used types for convenience
pub use domain::{
    ContentItem, InvocationResult, ProviderConfig, ResourceDescriptor, ResourceReadResult,
    ToolDescriptor, TransportKind, UnknownTransportError,
};
pub use ports::ProviderError;
