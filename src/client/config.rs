//! Configuration for client initialization

use std::time::Duration;

use rumqttc::{MqttOptions, OptionError};

use crate::control::DEFAULT_SYSTEM_PREFIX;
use crate::topic::MatchPolicy;

/// Default broker port.
pub const DEFAULT_PORT: u16 = 8080;

/// Client-level behavior settings
#[derive(Debug, Clone)]
pub struct ClientSettings {
	/// How long an operation waits for the transport, and a control request
	/// for its response
	pub request_timeout: Duration,
	/// How long `connect` waits for the broker's acknowledgement
	pub connection_timeout_millis: u64,
	/// Capacity of the event loop channel
	pub event_loop_capacity: usize,
	/// Matching semantics for registered channel handlers
	pub match_policy: MatchPolicy,
	/// Namespace reserved for control messages
	pub system_prefix: String,
	/// Drop pending control requests older than this, if set
	pub pending_request_ttl: Option<Duration>,
}

impl Default for ClientSettings {
	fn default() -> Self {
		Self {
			request_timeout: Duration::from_secs(60),
			connection_timeout_millis: 5000,
			event_loop_capacity: 10,
			match_policy: MatchPolicy::default(),
			system_prefix: DEFAULT_SYSTEM_PREFIX.to_owned(),
			pending_request_ttl: None,
		}
	}
}

impl ClientSettings {
	/// Connection timeout as a [`Duration`].
	pub fn connection_timeout(&self) -> Duration {
		Duration::from_millis(self.connection_timeout_millis)
	}
}

/// Configuration for client creation
#[derive(Debug, Clone)]
pub struct EmitterClientConfig {
	/// Underlying MQTT connection options (from rumqttc)
	pub connection: MqttOptions,
	/// Client-level behavior settings
	pub settings: ClientSettings,
}

impl EmitterClientConfig {
	/// Create new config with common defaults
	///
	/// # Example
	/// ```rust
	/// use emitter_client::EmitterClientConfig;
	///
	/// let config = EmitterClientConfig::new("my_client", "api.emitter.io", 8080);
	/// ```
	pub fn new(client_id: &str, host: &str, port: u16) -> Self {
		Self {
			connection: MqttOptions::new(client_id, host, port),
			settings: ClientSettings::default(),
		}
	}

	/// Parse configuration from URL string
	///
	/// Supports URLs with protocols: tcp://, mqtt://, ssl://, mqtts://, ws://, wss://
	///
	/// # Example
	/// ```rust
	/// use emitter_client::EmitterClientConfig;
	///
	/// let config = EmitterClientConfig::from_url("mqtt://localhost:8080?client_id=my_client")?;
	/// # Ok::<(), rumqttc::OptionError>(())
	/// ```
	pub fn from_url(url: &str) -> Result<Self, OptionError> {
		Ok(Self {
			connection: MqttOptions::parse_url(url)?,
			settings: ClientSettings::default(),
		})
	}

	/// Convenience method for localhost development
	pub fn localhost(client_id: &str) -> Self {
		Self::new(client_id, "localhost", DEFAULT_PORT)
	}

	/// Config with a random UUID v4 client id.
	pub fn with_random_client_id(host: &str, port: u16) -> Self {
		let client_id = uuid::Uuid::new_v4().simple().to_string();
		Self::new(&client_id, host, port)
	}
}
