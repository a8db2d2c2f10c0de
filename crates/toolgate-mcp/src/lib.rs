//! Tool provider session and process management.
//!
//! This crate keeps long-lived provider subprocesses alive across
//! requests, negotiates MCP protocol sessions over stdio pipes or an
//! SSE/HTTP stream, and exposes a small synchronous operation surface
//! (list tools, call a tool, list resources, read a resource) that
//! translates transport and provider failures into the typed taxonomy
//! in `toolgate-core`.
//!
//! Nothing here persists anything; callers supply provider
//! configuration from wherever they store it and decide what to do with
//! the normalized results.

pub mod bridge;
pub(crate) mod decode;
pub mod ops;
pub(crate) mod protocol;
pub mod registry;
pub mod session;

// Re-export this crate's public types
pub use ops::ProviderOperations;
pub use registry::{ProcessInfo, ProcessRegistry};
pub use session::{Session, SessionFactory};

// Re-export domain types from core for convenience
pub use toolgate_core::{
    ContentItem, InvocationResult, ProviderConfig, ProviderError, ResourceDescriptor,
    ResourceReadResult, ToolDescriptor, TransportKind,
};
