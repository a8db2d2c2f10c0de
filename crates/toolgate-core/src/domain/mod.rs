//! Domain types for tool providers and their operation results.

mod provider;
mod tool;

pub use provider::{ProviderConfig, TransportKind, UnknownTransportError, DEFAULT_TIMEOUT_SECS};
pub use tool::{
    ContentItem, InvocationResult, ResourceDescriptor, ResourceReadResult, ToolDescriptor,
};
