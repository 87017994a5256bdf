use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::{debug, warn};

use super::error::DispatchError;
use super::pending_requests::PendingRequests;
use crate::control::{self, BrokerError, ControlKind, PresenceEvent, Response};
use crate::message::{ErrorHandler, Message, MessageHandler, PresenceHandler};
use crate::topic::{MatchPolicy, TopicRouter, topic_format};

/// Entry point for every inbound message.
///
/// User-channel messages go to the handlers registered in the
/// [`TopicRouter`] (or the default handler when none match). Control
/// messages are decoded and correlated with pending requests through
/// [`PendingRequests`], or passed to the presence and error callbacks.
pub struct Dispatcher {
	router: TopicRouter,
	pending: PendingRequests,
	/// Orders waiter registration against response processing
	correlation: RwLock<()>,
	control_prefix: String,
	on_message: Option<MessageHandler>,
	on_presence: Option<PresenceHandler>,
	on_error: Option<ErrorHandler>,
}

impl std::fmt::Debug for Dispatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Dispatcher")
			.field("router", &self.router)
			.field("pending", &self.pending.len())
			.field("control_prefix", &self.control_prefix)
			.finish_non_exhaustive()
	}
}

impl Default for Dispatcher {
	fn default() -> Self {
		Self::builder().build()
	}
}

impl Dispatcher {
	/// Starts configuring a dispatcher.
	pub fn builder() -> DispatcherBuilder {
		DispatcherBuilder::default()
	}

	/// Handler registry for user channels.
	pub fn router(&self) -> &TopicRouter {
		&self.router
	}

	/// Requests awaiting a correlated response.
	pub fn pending(&self) -> &PendingRequests {
		&self.pending
	}

	/// Control namespace including its trailing slash, e.g. `emitter/`.
	pub fn control_prefix(&self) -> &str {
		&self.control_prefix
	}

	/// Takes the correlation lock exclusively.
	///
	/// Hold the guard from publishing a control request until its waiter is
	/// registered: control messages are not processed meanwhile.
	pub async fn lock_exclusive(&self) -> RwLockWriteGuard<'_, ()> {
		self.correlation.write().await
	}

	/// Returns `true` for topics in the control namespace.
	pub fn is_control_topic(&self, topic: &str) -> bool {
		topic.starts_with(&self.control_prefix)
	}

	/// Routes one inbound message. Never fails: undecodable control
	/// payloads are reported to the error callback or logged.
	pub async fn dispatch(&self, message: &Message) {
		if !self.is_control_topic(message.topic()) {
			self.dispatch_user(message);
			return;
		}

		let _correlation = self.correlation.read().await;
		match ControlKind::from_segment(self.control_operation(message.topic())) {
			| Some(kind) => self.dispatch_control(kind, message),
			| None => {
				debug!(topic = %message.topic(), "Dropping message on unknown control topic");
			}
		}
	}

	fn control_operation<'a>(&self, topic: &'a str) -> &'a str {
		let rest = topic.strip_prefix(&self.control_prefix).unwrap_or_default();
		topic_format::segments(rest).next().unwrap_or_default()
	}

	fn dispatch_user(&self, message: &Message) {
		let handlers = self.router.lookup(message.topic());
		if handlers.is_empty() {
			match &self.on_message {
				| Some(default_handler) => default_handler(message),
				| None => {
					debug!(topic = %message.topic(), "No handler for message, dropping");
				}
			}
			return;
		}

		for handler in handlers {
			handler(message);
		}
	}

	fn dispatch_control(&self, kind: ControlKind, message: &Message) {
		let response = match control::decode_reply(kind, message.payload()) {
			| Ok(response) => response,
			| Err(err) => {
				self.report(DispatchError::malformed(message.topic().clone(), err));
				return;
			}
		};

		let id = response.request_id();
		match response {
			| Response::Error(error) => self.resolve_error(error),
			| Response::Presence(event) => self.resolve_presence(event),
			| _ if id == 0 => {
				debug!(kind = %kind, "Dropping unsolicited control response");
			}
			| response => {
				if !self.pending.notify(id, response) {
					debug!(kind = %kind, request_id = id, "No waiter for control response");
				}
			}
		}
	}

	/// Hands a correlated snapshot to its waiter, then every event to the
	/// presence callback.
	fn resolve_presence(&self, event: PresenceEvent) {
		let resolved = event.request != 0
			&& self
				.pending
				.notify(event.request, Response::Presence(event.clone()));
		match &self.on_presence {
			| Some(presence_handler) => presence_handler(&event),
			| None if !resolved => {
				debug!(channel = %event.channel, "No presence handler, dropping event");
			}
			| None => {}
		}
	}

	/// Hands a broker error to its waiter, or to the error callback.
	fn resolve_error(&self, error: BrokerError) {
		let id = error.request_id();
		if id != 0 && self.pending.notify(id, Response::Error(error.clone())) {
			return;
		}
		self.report(DispatchError::Broker(error));
	}

	fn report(&self, error: DispatchError) {
		match &self.on_error {
			| Some(error_handler) => error_handler(&error),
			| None => warn!(error = %error, "Unhandled control channel error"),
		}
	}
}

/// Configures a [`Dispatcher`]. Callbacks cannot change after
/// [`build`](DispatcherBuilder::build).
pub struct DispatcherBuilder {
	match_policy: MatchPolicy,
	system_prefix: String,
	on_message: Option<MessageHandler>,
	on_presence: Option<PresenceHandler>,
	on_error: Option<ErrorHandler>,
}

impl Default for DispatcherBuilder {
	fn default() -> Self {
		Self {
			match_policy: MatchPolicy::default(),
			system_prefix: control::DEFAULT_SYSTEM_PREFIX.to_string(),
			on_message: None,
			on_presence: None,
			on_error: None,
		}
	}
}

impl DispatcherBuilder {
	/// Topic matching semantics for user subscriptions.
	pub fn match_policy(mut self, policy: MatchPolicy) -> Self {
		self.match_policy = policy;
		self
	}

	/// Namespace of control messages, `emitter` by default.
	pub fn system_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.system_prefix = prefix.into();
		self
	}

	/// Handler for user messages no registered pattern matches.
	pub fn on_message(mut self, handler: MessageHandler) -> Self {
		self.on_message = Some(handler);
		self
	}

	/// Handler for presence events.
	pub fn on_presence(mut self, handler: PresenceHandler) -> Self {
		self.on_presence = Some(handler);
		self
	}

	/// Handler for uncorrelated broker errors and malformed control
	/// payloads.
	pub fn on_error(mut self, handler: ErrorHandler) -> Self {
		self.on_error = Some(handler);
		self
	}

	/// Builds the dispatcher with an empty router and pending store.
	pub fn build(self) -> Dispatcher {
		Dispatcher {
			router: TopicRouter::new(self.match_policy),
			pending: PendingRequests::new(),
			correlation: RwLock::new(()),
			control_prefix: format!("{}/", topic_format::trim(&self.system_prefix)),
			on_message: self.on_message,
			on_presence: self.on_presence,
			on_error: self.on_error,
		}
	}
}
