use std::time::Duration;

use rumqttc::OptionError;
use thiserror::Error;

use crate::control::BrokerError;
use crate::transport::TransportError;

/// Errors returned by [`EmitterClient`](crate::EmitterClient) operations
#[derive(Debug, Error)]
pub enum ClientError {
	/// No outcome or response arrived within the allotted time
	#[error("Operation timed out after {timeout_millis} ms")]
	Timeout {
		/// The limit that elapsed
		timeout_millis: u64,
	},

	/// A response arrived with an unexpected shape
	#[error("Unexpected response: expected {expected}, got {actual}")]
	Unmarshal {
		/// Response kind the operation expects
		expected: &'static str,
		/// Response kind that arrived
		actual: &'static str,
	},

	/// The transport failed the operation
	#[error("Transport error: {0}")]
	Transport(#[from] TransportError),

	/// The broker answered the request with an error
	#[error("Broker error (status {}): {}", .0.status, .0.message)]
	Broker(#[from] BrokerError),

	/// The request body could not be encoded
	#[error("Failed to encode request: {0}")]
	Encode(#[from] serde_json::Error),

	/// The pending entry was dropped before a response arrived
	#[error("Response channel closed before a response arrived")]
	ResponseLost,

	/// The transport did not assign a message id to a control request
	#[error("Transport did not assign a message id to the request")]
	NoMessageId,

	/// Connection options could not be parsed
	#[error("Configuration error: {0}")]
	Configuration(#[from] OptionError),
}

impl ClientError {
	/// Creates a timeout error for the given duration.
	pub fn timeout(timeout: Duration) -> Self {
		Self::Timeout {
			timeout_millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
		}
	}

	/// Returns `true` if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout { .. })
	}
}
