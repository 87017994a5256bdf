//! Message routing and request correlation module
//!
//! This module provides the dispatcher invoked for every inbound message
//! and the store correlating control responses with the requests that
//! caused them.

/// Inbound message dispatch
pub mod dispatcher;
/// Routing error types
pub mod error;
/// In-flight control requests
pub mod pending_requests;


// Re-export commonly used types for convenience
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::DispatchError;
pub use pending_requests::{PendingRequests, ResponseReceiver};
