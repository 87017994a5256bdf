//! Emitter client module
//!
//! This module provides the high-level client: publishing, subscriptions
//! with per-channel handlers and correlated control requests.

/// Asynchronous client implementation
pub mod async_client;
/// Client construction and the dispatch task
pub mod builder;
pub mod config;
/// Client error types
pub mod error;

// Re-export commonly used types for convenience
pub use async_client::EmitterClient;
pub use builder::ClientBuilder;
pub use config::{ClientSettings, EmitterClientConfig};
pub use error::ClientError;

// Connection type is available from the root level
// Use: emitter_client::EmitterConnection
