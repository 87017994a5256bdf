use rumqttc::{ClientError as RumqttClientError, ConnectReturnCode};
use thiserror::Error;

/// Errors raised by the transport while connecting, publishing,
/// subscribing or unsubscribing.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
	/// The request could not be handed to the MQTT client
	#[error("Transport request failed: {0}")]
	Request(String),

	/// Network connection failed
	#[error("Network connection failed: {0}")]
	Connection(String),

	/// Broker refused the connection
	#[error("Broker rejected connection: {code:?}")]
	BrokerRejected {
		/// Return code of the ConnAck
		code: ConnectReturnCode,
	},

	/// Broker refused a subscription
	#[error("Broker refused subscription to '{topic}'")]
	SubscriptionRefused {
		/// Topic filter that was refused
		topic: String,
	},

	/// Operation attempted before `connect()` or after the event loop ended
	#[error("Transport is not connected")]
	NotConnected,

	/// The transport dropped the operation without reporting an outcome
	#[error("Transport closed before completing the operation")]
	Closed,
}

impl From<RumqttClientError> for TransportError {
	fn from(err: RumqttClientError) -> Self {
		Self::Request(err.to_string())
	}
}

impl From<rumqttc::ConnectionError> for TransportError {
	fn from(err: rumqttc::ConnectionError) -> Self {
		Self::Connection(err.to_string())
	}
}
