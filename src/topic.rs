//! Topic handling module
//!
//! This module provides channel and topic formatting, publish options and
//! the subscription trie used to route inbound messages to handlers.

pub mod options;
/// Topic string construction
pub mod topic_format;
pub mod topic_matcher;
/// Thread-safe handler registry on top of the trie
pub mod topic_router;


// Re-export commonly used types for convenience
pub use options::{TopicOption, format_options, header};
pub use topic_format::{
	format_control, format_share, format_subscription, format_topic,
};
pub use topic_matcher::{MatchPolicy, TopicMatcher};
pub use topic_router::TopicRouter;

/// Reserved wildcard segments
pub mod wildcard {
	/// Matches exactly one segment.
	pub const SINGLE_LEVEL: &str = "+";
	/// Matches the current segment and every remaining one.
	pub const MULTI_LEVEL: &str = "#";
}
