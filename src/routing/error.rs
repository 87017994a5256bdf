use arcstr::ArcStr;
use thiserror::Error;

use crate::control::BrokerError;

/// Problems found while dispatching control messages.
///
/// These never stop the dispatch loop: they are handed to the error
/// callback, or logged when none is registered.
#[derive(Debug, Error)]
pub enum DispatchError {
	/// Error reported by the broker that no pending request claimed
	#[error("Broker error (status {}): {}", .0.status, .0.message)]
	Broker(#[from] BrokerError),

	/// Control payload that could not be decoded
	#[error("Malformed control payload on '{topic}': {source}")]
	Malformed {
		/// Topic the payload arrived on
		topic: ArcStr,
		/// Decoding failure
		source: serde_json::Error,
	},
}

impl DispatchError {
	/// Creates a new Malformed error
	pub fn malformed(topic: impl Into<ArcStr>, source: serde_json::Error) -> Self {
		Self::Malformed {
			topic: topic.into(),
			source,
		}
	}

	/// The broker error, if this is one.
	pub fn broker_error(&self) -> Option<&BrokerError> {
		match self {
			| Self::Broker(error) => Some(error),
			| Self::Malformed { .. } => None,
		}
	}
}
