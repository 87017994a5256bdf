//! Inbound messages and the callback types invoked for them.

use std::sync::Arc;

use arcstr::ArcStr;
use bytes::Bytes;

use crate::control::PresenceEvent;
use crate::routing::DispatchError;
use crate::transport::TransportError;

/// A message delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
	topic: ArcStr,
	payload: Bytes,
}

impl Message {
	/// Creates a message from a topic and its raw payload.
	pub fn new(topic: impl Into<ArcStr>, payload: impl Into<Bytes>) -> Self {
		Self {
			topic: topic.into(),
			payload: payload.into(),
		}
	}

	/// Topic the message was published to.
	pub fn topic(&self) -> &ArcStr {
		&self.topic
	}

	/// Raw payload bytes.
	pub fn payload(&self) -> &Bytes {
		&self.payload
	}

	/// Payload as UTF-8, if valid.
	pub fn payload_str(&self) -> Option<&str> {
		std::str::from_utf8(&self.payload).ok()
	}
}

/// Callback invoked for a message on a user channel.
pub type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync>;

/// Callback invoked for every presence event.
pub type PresenceHandler = Arc<dyn Fn(&PresenceEvent) + Send + Sync>;

/// Callback invoked for uncorrelated broker errors and malformed control
/// payloads.
pub type ErrorHandler = Arc<dyn Fn(&DispatchError) + Send + Sync>;

/// Callback invoked each time the broker accepts the connection.
pub type ConnectHandler = Arc<dyn Fn() + Send + Sync>;

/// Callback invoked when an established connection is lost.
pub type DisconnectHandler = Arc<dyn Fn(&TransportError) + Send + Sync>;

/// Wraps a closure into a [`MessageHandler`].
pub fn handler<F>(f: F) -> MessageHandler
where F: Fn(&Message) + Send + Sync + 'static {
	Arc::new(f)
}
