//! # Emitter Client
//!
//! An asynchronous client for the Emitter publish/subscribe broker, built
//! on MQTT.
//!
//! ## Features
//!
//! - **Channel handlers**: route inbound messages to handlers registered
//!   per channel pattern (`+` matches one segment)
//! - **Control requests**: key generation, key bans, links, presence and
//!   identity, correlated with their asynchronous responses
//! - **Topic options**: retain, QoS, ttl, history and time-range options
//! - **Pluggable transport**: a rumqttc-backed [`RumqttTransport`] is
//!   included, any [`Transport`] implementation can be used instead
//! - **Graceful shutdown**: proper resource cleanup and connection
//!   termination
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use emitter_client::{ClientBuilder, EmitterClientConfig, TopicOption, handler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (client, connection) = ClientBuilder::new()
//!         .on_error(|err| eprintln!("broker error: {err}"))
//!         .connect(EmitterClientConfig::localhost("demo"))
//!         .await?;
//!
//!     let key = client.generate_key("<master key>", "sensors/", "rwls", 0).await?;
//!
//!     client
//!         .subscribe(&key, "sensors/", Some(handler(|message| {
//!             println!("{}: {:?}", message.topic(), message.payload_str());
//!         })), &[])
//!         .await?;
//!
//!     client
//!         .publish(&key, "sensors/kitchen/", "21.5", &[TopicOption::Ttl(60)])
//!         .await?;
//!
//!     connection.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Pattern Matching
//!
//! By default a handler registered on `a/b/` receives every message
//! published on `a/b/` or below it, and `+` matches any single segment.
//! [`MatchPolicy::Mqtt`] switches to strict MQTT matching where `#` matches
//! all remaining segments.

#![warn(missing_docs)]

// Core modules
pub mod client;
pub mod connection;
pub mod control;
pub mod message;
pub mod routing;
pub mod topic;
pub mod transport;

// === Core Public API ===
// Main client types
pub use client::{
	ClientBuilder, ClientError, ClientSettings, EmitterClient,
	EmitterClientConfig,
};
pub use connection::EmitterConnection;

// Messages and callbacks
pub use message::{
	ConnectHandler, DisconnectHandler, ErrorHandler, Message, MessageHandler,
	PresenceHandler, handler,
};

// Control channel payloads
pub use control::{
	BrokerError, Link, PresenceEvent, PresenceInfo, PresenceKind, Response,
};

// Topic options and matching
pub use topic::{MatchPolicy, TopicOption};

// Transport seam
pub use transport::{
	ConnectionEvent, RumqttTransport, Token, Transport, TransportError,
};

// Essential external types
pub use rumqttc::QoS;

/// Result type alias for operations that may fail with ClientError
pub type Result<T> = std::result::Result<T, ClientError>;

/// Prelude module for convenient imports
///
/// ```rust
/// use emitter_client::prelude::*;
/// ```
pub mod prelude {
	//! Essential types for most applications

	pub use crate::{
		ClientBuilder, ClientError, EmitterClient, EmitterClientConfig,
		EmitterConnection, Message, PresenceEvent, QoS, Result, TopicOption,
		handler,
	};
}

/// Types for custom transports and direct use of the routing core
///
/// ```rust
/// use emitter_client::advanced::*;
/// ```
pub mod advanced {
	//! Advanced types for complex use cases

	pub use crate::routing::{
		Dispatcher, DispatcherBuilder, PendingRequests, ResponseReceiver,
	};
	pub use crate::topic::{TopicMatcher, TopicRouter};
	pub use crate::transport::{
		EventReceiver, EventSender, InboundReceiver, InboundSender,
		TokenHandle, event_channel, inbound_channel,
	};
}

/// Error types used throughout the library
///
/// ```rust
/// use emitter_client::errors::*;
/// ```
pub mod errors {
	//! All error types used in the library

	pub use crate::{BrokerError, ClientError, TransportError};

	pub use crate::routing::DispatchError;
}
