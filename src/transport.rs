//! Transport abstraction module
//!
//! The client core never talks to an MQTT library directly. It drives a
//! [`Transport`], which hands back a [`Token`] per operation and delivers
//! inbound messages and [`ConnectionEvent`]s through unbounded channels.

/// Transport error types
pub mod error;
/// rumqttc-backed transport
pub mod rumqtt;
/// Per-operation completion tokens
pub mod token;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::QoS;
use tokio::sync::mpsc;

pub use error::TransportError;
pub use rumqtt::RumqttTransport;
pub use token::{Token, TokenHandle};

use crate::message::Message;

/// Receiving end for messages delivered by a transport.
pub type InboundReceiver = mpsc::UnboundedReceiver<Message>;

/// Sending end for messages delivered by a transport.
pub type InboundSender = mpsc::UnboundedSender<Message>;

/// Creates the channel a transport uses to deliver inbound messages.
pub fn inbound_channel() -> (InboundSender, InboundReceiver) {
	mpsc::unbounded_channel()
}

/// Change in the state of the broker connection.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
	/// The broker accepted the connection, initially or after a reconnect.
	Connected,
	/// An established connection was lost.
	Disconnected(TransportError),
}

/// Receiving end for connection state changes.
pub type EventReceiver = mpsc::UnboundedReceiver<ConnectionEvent>;

/// Sending end for connection state changes.
pub type EventSender = mpsc::UnboundedSender<ConnectionEvent>;

/// Creates the channel a transport uses to report connection state
/// changes.
pub fn event_channel() -> (EventSender, EventReceiver) {
	mpsc::unbounded_channel()
}

/// Publish/subscribe transport driven by the client.
///
/// Every operation returns as soon as the request has been queued. The
/// returned [`Token`] resolves the outbound message identifier once the
/// transport has assigned it, and completes when the broker acknowledges
/// the operation (or immediately for QoS 0 publishes).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
	/// Starts the connection. The token completes on the broker's
	/// acknowledgement.
	async fn connect(&self) -> Result<Token, TransportError>;

	/// Publishes `payload` on `topic`.
	async fn publish(
		&self,
		topic: &str,
		qos: QoS,
		retain: bool,
		payload: Bytes,
	) -> Result<Token, TransportError>;

	/// Subscribes to `topic`.
	async fn subscribe(
		&self,
		topic: &str,
		qos: QoS,
	) -> Result<Token, TransportError>;

	/// Unsubscribes from `topic`.
	async fn unsubscribe(&self, topic: &str) -> Result<Token, TransportError>;

	/// Disconnects and waits for the transport to wind down.
	async fn disconnect(&self) -> Result<(), TransportError>;

	/// Returns `true` while the broker connection is established.
	fn is_connected(&self) -> bool;
}
