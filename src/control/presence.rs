//! Presence events.
//!
//! The `who` field changes shape with the event kind: a single object for
//! `subscribe`/`unsubscribe` notifications, an array for `status`
//! snapshots. Decoding happens in two steps so the envelope can be read
//! before the subject list.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Kind of presence event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceKind {
	/// A subject joined the channel.
	Subscribe,
	/// A subject left the channel.
	Unsubscribe,
	/// Snapshot of every subject present on the channel.
	Status,
	/// Missing or unrecognized event kind.
	#[default]
	#[serde(other)]
	Unknown,
}

/// A subject present on a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceInfo {
	/// Connection identifier.
	#[serde(default)]
	pub id: String,
	/// Optional user name attached to the connection.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub username: Option<String>,
}

/// Presence state or a join/leave notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceEvent {
	/// Id of the request this answers, zero for notifications.
	#[serde(rename = "req", skip_serializing_if = "is_zero")]
	pub request: u16,
	/// Event kind.
	pub event: PresenceKind,
	/// Channel the event concerns.
	pub channel: String,
	/// UTC unix timestamp of the event.
	pub time: i64,
	/// Subjects that joined or left, or everyone present for a snapshot.
	pub who: Vec<PresenceInfo>,
}

fn is_zero(value: &u16) -> bool {
	*value == 0
}

/// Partial envelope with the subject list kept raw.
#[derive(Debug, Deserialize)]
struct PresenceEnvelope {
	#[serde(rename = "req", default)]
	request: u16,
	#[serde(default)]
	event: PresenceKind,
	#[serde(default)]
	channel: String,
	#[serde(default)]
	time: i64,
	#[serde(default)]
	who: Value,
}

impl PresenceEvent {
	/// Correlation identifier, zero for broadcast notifications.
	pub fn request_id(&self) -> u16 {
		self.request
	}
}

/// Decodes the envelope, then the subject list according to the event
/// kind. Only `status` carries an array; every other kind, including a
/// missing one, carries a single subject.
///
/// A subject list of the wrong shape does not fail the decode: the event
/// is kept with no subjects and the mismatch is logged.
pub fn decode(payload: &[u8]) -> Result<PresenceEvent, serde_json::Error> {
	let envelope: PresenceEnvelope = serde_json::from_slice(payload)?;
	let who = match envelope.event {
		| PresenceKind::Status => {
			serde_json::from_value::<Vec<PresenceInfo>>(envelope.who)
		}
		| _ => serde_json::from_value::<PresenceInfo>(envelope.who)
			.map(|subject| vec![subject]),
	};
	let who = who.unwrap_or_else(|err| {
		warn!(
			channel = %envelope.channel,
			event = ?envelope.event,
			error = %err,
			"Presence subjects do not match the event kind"
		);
		Vec::new()
	});

	Ok(PresenceEvent {
		request: envelope.request,
		event: envelope.event,
		channel: envelope.channel,
		time: envelope.time,
		who,
	})
}
