//! Control channel messages
//!
//! Broker management operations (key generation, bans, links, identity,
//! presence) are published on `<prefix>/<operation>/` and answered
//! asynchronously on the same reserved namespace.

pub mod presence;
pub mod requests;
pub mod responses;

#[cfg(test)]
mod control_tests;

pub use presence::{PresenceEvent, PresenceInfo, PresenceKind};
pub use requests::{KeyBanRequest, KeyGenRequest, LinkRequest, PresenceRequest};
pub use responses::{
	BrokerError, KeyBanResponse, KeyGenResponse, Link, MeResponse, Response,
};

/// Default namespace reserved for control messages.
pub const DEFAULT_SYSTEM_PREFIX: &str = "emitter";

/// Control operation, identified by the first segment after the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
	/// Presence requests and notifications
	Presence,
	/// Broker errors
	Error,
	/// Key generation
	KeyGen,
	/// Key bans
	KeyBan,
	/// Link creation
	Link,
	/// Connection identity
	Me,
}

impl ControlKind {
	/// Parses a control sub-prefix such as `keygen`.
	pub fn from_segment(segment: &str) -> Option<Self> {
		match segment {
			| "presence" => Some(Self::Presence),
			| "error" => Some(Self::Error),
			| "keygen" => Some(Self::KeyGen),
			| "keyban" => Some(Self::KeyBan),
			| "link" => Some(Self::Link),
			| "me" => Some(Self::Me),
			| _ => None,
		}
	}

	/// Operation name used in control topics.
	pub fn as_str(&self) -> &'static str {
		match self {
			| Self::Presence => "presence",
			| Self::Error => "error",
			| Self::KeyGen => "keygen",
			| Self::KeyBan => "keyban",
			| Self::Link => "link",
			| Self::Me => "me",
		}
	}
}

impl std::fmt::Display for ControlKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Decodes a reply to a control request.
///
/// An error envelope with a non-empty message always wins; otherwise the
/// payload is decoded into the response type of `kind`. Presence payloads
/// decode leniently, see [`presence::decode`].
pub fn decode_reply(
	kind: ControlKind,
	payload: &[u8],
) -> Result<Response, serde_json::Error> {
	if let Ok(error) = serde_json::from_slice::<BrokerError>(payload) {
		if !error.message.is_empty() {
			return Ok(Response::Error(error));
		}
	}

	let response = match kind {
		| ControlKind::KeyGen => Response::KeyGen(serde_json::from_slice(payload)?),
		| ControlKind::KeyBan => Response::KeyBan(serde_json::from_slice(payload)?),
		| ControlKind::Link => Response::Link(serde_json::from_slice(payload)?),
		| ControlKind::Me => Response::Me(serde_json::from_slice(payload)?),
		| ControlKind::Presence => Response::Presence(presence::decode(payload)?),
		| ControlKind::Error => Response::Error(serde_json::from_slice(payload)?),
	};
	Ok(response)
}
