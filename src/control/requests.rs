//! Request bodies published on the control channel.

use serde::Serialize;

/// Asks the broker to generate a channel key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyGenRequest {
	/// Master key used to sign the new key.
	pub key: String,
	/// Channel the key grants access to.
	pub channel: String,
	/// Permissions, e.g. `"rwls"`.
	#[serde(rename = "type")]
	pub permissions: String,
	/// Time-to-live in seconds, zero for no expiry.
	pub ttl: i32,
}

/// Bans or allows a channel key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyBanRequest {
	/// The master key to use.
	pub secret: String,
	/// The target key.
	pub target: String,
	/// Whether the target should be banned.
	pub banned: bool,
}

/// Asks for presence information on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceRequest {
	/// Channel key with presence permission.
	pub key: String,
	/// Channel to observe.
	pub channel: String,
	/// Request a snapshot of the current subjects.
	pub status: bool,
	/// Subscribe to join/leave notifications.
	pub changes: bool,
}

/// Creates a short link to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRequest {
	/// Name of the link, at most two characters.
	pub name: String,
	/// Channel key with link permission.
	pub key: String,
	/// Target channel, including its query options.
	pub channel: String,
	/// Whether the broker should subscribe the connection to the link.
	pub subscribe: bool,
}
