//! Contracts that cross the subsystem boundary.

mod error;

pub use error::ProviderError;
