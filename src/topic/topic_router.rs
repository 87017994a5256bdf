use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::topic_matcher::{MatchPolicy, TopicMatcher};
use crate::message::MessageHandler;

/// Thread-safe registry of message handlers keyed by channel pattern.
///
/// Lookups take the read lock, registrations and removals take the write
/// lock. Handlers are cloned out of the trie so they always run with the
/// lock released.
pub struct TopicRouter {
	matcher: RwLock<TopicMatcher<MessageHandler>>,
}

impl Default for TopicRouter {
	fn default() -> Self {
		Self::new(MatchPolicy::default())
	}
}

impl std::fmt::Debug for TopicRouter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let matcher = self.read();
		f.debug_struct("TopicRouter")
			.field("policy", &matcher.policy())
			.field("routes", &matcher.route_count())
			.finish()
	}
}

impl TopicRouter {
	/// Creates an empty router using the given matching policy.
	pub fn new(policy: MatchPolicy) -> Self {
		Self {
			matcher: RwLock::new(TopicMatcher::new(policy)),
		}
	}

	/// Matching policy this router was created with.
	pub fn policy(&self) -> MatchPolicy {
		self.read().policy()
	}

	/// Registers `handler` for `pattern`, replacing any handler previously
	/// registered under the exact same pattern.
	pub fn add_handler(&self, pattern: &str, handler: MessageHandler) {
		let replaced = self.write().insert(pattern, handler).is_some();
		debug!(pattern = %pattern, replaced, "Registered message handler");
	}

	/// Removes the handler registered under `pattern`, if any.
	pub fn remove_handler(&self, pattern: &str) -> bool {
		let removed = self.write().remove(pattern).is_some();
		debug!(pattern = %pattern, removed, "Removed message handler");
		removed
	}

	/// Returns every handler whose pattern matches `topic`.
	pub fn lookup(&self, topic: &str) -> Vec<MessageHandler> {
		self.read()
			.find_by_path(topic)
			.into_iter()
			.cloned()
			.collect()
	}

	/// Number of registered handlers.
	pub fn len(&self) -> usize {
		self.read().route_count()
	}

	/// Returns `true` when no handler is registered.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn read(&self) -> RwLockReadGuard<'_, TopicMatcher<MessageHandler>> {
		self.matcher.read().unwrap_or_else(PoisonError::into_inner)
	}

	fn write(&self) -> RwLockWriteGuard<'_, TopicMatcher<MessageHandler>> {
		self.matcher.write().unwrap_or_else(PoisonError::into_inner)
	}
}
