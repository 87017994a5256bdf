//! Options attached to publish and subscribe operations.
//!
//! Reserved options (retain flag, QoS level) never reach the topic string:
//! they are turned into transport-level publish parameters by [`header`].
//! Every other option renders as a `key=value` pair in the topic query.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rumqttc::QoS;

/// An option that can be supplied to publish, subscribe or link requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicOption {
	/// Sets the message `retain` flag (reserved).
	Retain,
	/// Publish at most once, MQTT QoS 0 (reserved).
	AtMostOnce,
	/// Publish at least once, MQTT QoS 1 (reserved).
	AtLeastOnce,
	/// Disables self-receiving messages on a subscribed channel (`me=0`).
	WithoutEcho,
	/// Time-to-live of a published message, in seconds (`ttl=`).
	Ttl(u32),
	/// Number of historical messages to retrieve on subscribe (`last=`).
	Last(u32),
	/// Request messages from a UTC unix timestamp (`from=`).
	From(i64),
	/// Request messages until a UTC unix timestamp (`until=`).
	Until(i64),
}

impl TopicOption {
	/// Builds a [`TopicOption::From`] out of a point in time.
	pub fn from_time(time: SystemTime) -> Self {
		Self::From(unix_seconds(time))
	}

	/// Builds a [`TopicOption::Until`] out of a point in time.
	pub fn until_time(time: SystemTime) -> Self {
		Self::Until(unix_seconds(time))
	}

	/// Returns `true` for options that map to publish header fields.
	pub fn is_reserved(&self) -> bool {
		matches!(self, Self::Retain | Self::AtMostOnce | Self::AtLeastOnce)
	}

	/// Query key of a non-reserved option.
	pub fn key(&self) -> Option<&'static str> {
		match self {
			| Self::WithoutEcho => Some("me"),
			| Self::Ttl(_) => Some("ttl"),
			| Self::Last(_) => Some("last"),
			| Self::From(_) => Some("from"),
			| Self::Until(_) => Some("until"),
			| Self::Retain | Self::AtMostOnce | Self::AtLeastOnce => None,
		}
	}

	/// Position of the option in the rendered query string.
	fn rank(&self) -> usize {
		match self {
			| Self::WithoutEcho => 0,
			| Self::Ttl(_) => 1,
			| Self::Last(_) => 2,
			| Self::From(_) => 3,
			| Self::Until(_) => 4,
			| Self::Retain | Self::AtMostOnce | Self::AtLeastOnce => usize::MAX,
		}
	}
}

impl fmt::Display for TopicOption {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			| Self::Retain => write!(f, "+r"),
			| Self::AtMostOnce => write!(f, "+0"),
			| Self::AtLeastOnce => write!(f, "+1"),
			| Self::WithoutEcho => write!(f, "me=0"),
			| Self::Ttl(seconds) => write!(f, "ttl={seconds}"),
			| Self::Last(messages) => write!(f, "last={messages}"),
			| Self::From(timestamp) => write!(f, "from={timestamp}"),
			| Self::Until(timestamp) => write!(f, "until={timestamp}"),
		}
	}
}

/// Extracts the publish header `(qos, retain)` from a set of options.
///
/// Later QoS options override earlier ones. Defaults to QoS 0 without retain.
pub fn header(options: &[TopicOption]) -> (QoS, bool) {
	options
		.iter()
		.fold((QoS::AtMostOnce, false), |(qos, retain), option| match option {
			| TopicOption::Retain => (qos, true),
			| TopicOption::AtMostOnce => (QoS::AtMostOnce, retain),
			| TopicOption::AtLeastOnce => (QoS::AtLeastOnce, retain),
			| _ => (qos, retain),
		})
}

/// Renders the query suffix (`?me=0&last=100`) for the non-reserved options.
///
/// A repeated key keeps its last occurrence. Keys always render in the
/// order `me`, `ttl`, `last`, `from`, `until`. Returns an empty string when
/// no option survives.
pub fn format_options(options: &[TopicOption]) -> String {
	let mut selected: Vec<TopicOption> = Vec::with_capacity(options.len());
	for option in options.iter().filter(|option| !option.is_reserved()) {
		match selected.iter_mut().find(|kept| kept.key() == option.key()) {
			| Some(kept) => *kept = *option,
			| None => selected.push(*option),
		}
	}
	if selected.is_empty() {
		return String::new();
	}
	selected.sort_by_key(TopicOption::rank);

	let pairs: Vec<String> =
		selected.iter().map(TopicOption::to_string).collect();
	format!("?{}", pairs.join("&"))
}

fn unix_seconds(time: SystemTime) -> i64 {
	match time.duration_since(UNIX_EPOCH) {
		| Ok(elapsed) => elapsed.as_secs() as i64,
		| Err(before_epoch) => -(before_epoch.duration().as_secs() as i64),
	}
}
