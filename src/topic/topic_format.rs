//! Topic string construction.
//!
//! Topics take the form `key/channel-segments.../` with a trailing slash and
//! an optional `?opt=v&...` query built from [`TopicOption`]s.

use super::options::{TopicOption, format_options};
use super::wildcard;

/// Prefix marking a shared subscription.
pub const SHARE_SEGMENT: &str = "$share";

/// Removes a single leading and a single trailing `/`.
pub fn trim(value: &str) -> &str {
	let value = value.strip_prefix('/').unwrap_or(value);
	value.strip_suffix('/').unwrap_or(value)
}

/// Makes a topic name out of a key/channel pair.
///
/// An empty key yields a bare channel topic.
pub fn format_topic(key: &str, channel: &str, options: &[TopicOption]) -> String {
	let key = trim(key);
	let channel = trim(channel);
	let query = format_options(options);
	if key.is_empty() {
		format!("{channel}/{query}")
	} else {
		format!("{key}/{channel}/{query}")
	}
}

/// Makes a shared-subscription topic: `key/$share/<group>/<channel>/<query>`.
pub fn format_share(
	key: &str,
	share_group: &str,
	channel: &str,
	options: &[TopicOption],
) -> String {
	format!(
		"{}/{SHARE_SEGMENT}/{}/{}/{}",
		trim(key),
		trim(share_group),
		trim(channel),
		format_options(options)
	)
}

/// Topic handed to the transport when subscribing.
///
/// Channels always end with `/`, MQTT requires a multi-level wildcard to be
/// the final character, so `#/` is rewritten to `#`.
pub fn format_subscription(
	key: &str,
	channel: &str,
	options: &[TopicOption],
) -> String {
	let multi_level_with_slash = format!("{}/", wildcard::MULTI_LEVEL);
	format_topic(key, channel, options)
		.replace(&multi_level_with_slash, wildcard::MULTI_LEVEL)
}

/// Control topic for a broker operation: `<prefix>/<operation>/`.
pub fn format_control(prefix: &str, operation: &str) -> String {
	format!("{}/{}/", trim(prefix), trim(operation))
}

/// Splits a topic or pattern into path segments, dropping empty ones.
///
/// `"a//b"` and `"a/b/"` both yield `["a", "b"]`; an empty string yields no
/// segments at all.
pub fn segments(topic: &str) -> impl Iterator<Item = &str> {
	topic.split('/').filter(|segment| !segment.is_empty())
}
