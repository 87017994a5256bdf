//! Responses sent by the broker on the control channel.
//!
//! Every response carries an optional correlation identifier (`req`). Zero
//! means the message is unsolicited rather than a reply.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::presence::PresenceEvent;

fn is_zero(value: &u16) -> bool {
	*value == 0
}

/// Error reported by the broker.
#[derive(Error, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct BrokerError {
	/// Correlation identifier of the failed request.
	#[serde(rename = "req", default, skip_serializing_if = "is_zero")]
	pub request: u16,
	/// HTTP-like status code.
	#[serde(default)]
	pub status: u16,
	/// Human readable description.
	#[serde(default)]
	pub message: String,
}

impl BrokerError {
	/// Correlation identifier of the failed request.
	pub fn request_id(&self) -> u16 {
		self.request
	}
}

/// Response to a key generation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyGenResponse {
	/// Id of the request this answers.
	#[serde(rename = "req", default, skip_serializing_if = "is_zero")]
	pub request: u16,
	/// HTTP-like status code.
	#[serde(default)]
	pub status: u16,
	/// The generated channel key.
	#[serde(default)]
	pub key: String,
	/// The channel the key was generated for.
	#[serde(default)]
	pub channel: String,
	/// Error description, empty on success.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub message: String,
}

/// Response to a key ban request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBanResponse {
	/// Id of the request this answers.
	#[serde(rename = "req", default, skip_serializing_if = "is_zero")]
	pub request: u16,
	/// HTTP-like status code.
	#[serde(default)]
	pub status: u16,
	/// Whether the target key is banned after the request.
	#[serde(default)]
	pub banned: bool,
	/// Error description, empty on success.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub message: String,
}

/// Response to a link creation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
	/// Id of the request this answers.
	#[serde(rename = "req", default, skip_serializing_if = "is_zero")]
	pub request: u16,
	/// Name of the link, at most two characters.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub name: String,
	/// Channel the link points to.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub channel: String,
}

/// Identity of the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeResponse {
	/// Id of the request this answers.
	#[serde(rename = "req", default, skip_serializing_if = "is_zero")]
	pub request: u16,
	/// Private identifier of the connection.
	#[serde(default)]
	pub id: String,
	/// Pre-defined links, by name.
	#[serde(default, skip_serializing_if = "HashMap::is_empty")]
	pub links: HashMap<String, String>,
}

/// A decoded control-channel response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
	/// The broker rejected the request
	Error(BrokerError),
	/// A generated key
	KeyGen(KeyGenResponse),
	/// Ban state of a key
	KeyBan(KeyBanResponse),
	/// A created link
	Link(Link),
	/// Identity of the connection
	Me(MeResponse),
	/// Presence snapshot or notification
	Presence(PresenceEvent),
}

impl Response {
	/// Correlation identifier, zero for unsolicited messages.
	pub fn request_id(&self) -> u16 {
		match self {
			| Response::Error(response) => response.request,
			| Response::KeyGen(response) => response.request,
			| Response::KeyBan(response) => response.request,
			| Response::Link(response) => response.request,
			| Response::Me(response) => response.request,
			| Response::Presence(response) => response.request,
		}
	}

	/// Short name of the variant, for logging.
	pub fn kind(&self) -> &'static str {
		match self {
			| Response::Error(_) => "error",
			| Response::KeyGen(_) => "keygen",
			| Response::KeyBan(_) => "keyban",
			| Response::Link(_) => "link",
			| Response::Me(_) => "me",
			| Response::Presence(_) => "presence",
		}
	}
}
