use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rumqttc::QoS;
use serde::Serialize;
use tokio::sync::OnceCell;
use tokio::time;
use tracing::{debug, info};

use super::config::ClientSettings;
use super::error::ClientError;
use crate::control::{
	ControlKind, KeyBanRequest, KeyGenRequest, Link, LinkRequest,
	PresenceEvent, PresenceRequest, Response,
};
use crate::message::MessageHandler;
use crate::routing::{Dispatcher, ResponseReceiver};
use crate::topic::{self, TopicOption};
use crate::transport::{Token, Transport};

/// Client for an Emitter broker.
///
/// Cloning is cheap; every clone shares the transport, the handler
/// registry and the pending control requests.
pub struct EmitterClient<T> {
	transport: Arc<T>,
	dispatcher: Arc<Dispatcher>,
	settings: Arc<ClientSettings>,
	guid: Arc<OnceCell<String>>,
}

impl<T> Clone for EmitterClient<T> {
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			dispatcher: self.dispatcher.clone(),
			settings: self.settings.clone(),
			guid: self.guid.clone(),
		}
	}
}

impl<T> std::fmt::Debug for EmitterClient<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EmitterClient")
			.field("dispatcher", &self.dispatcher)
			.field("settings", &self.settings)
			.finish_non_exhaustive()
	}
}

impl<T> EmitterClient<T>
where T: Transport
{
	pub(crate) fn new(
		transport: Arc<T>,
		dispatcher: Arc<Dispatcher>,
		settings: ClientSettings,
	) -> Self {
		Self {
			transport,
			dispatcher,
			settings: Arc::new(settings),
			guid: Arc::new(OnceCell::new()),
		}
	}

	/// Dispatcher routing this client's inbound messages.
	pub fn dispatcher(&self) -> &Dispatcher {
		&self.dispatcher
	}

	/// Settings the client was created with.
	pub fn settings(&self) -> &ClientSettings {
		&self.settings
	}

	/// Underlying transport.
	pub fn transport(&self) -> &T {
		&self.transport
	}

	/// Connects the transport and waits for the broker's acknowledgement.
	pub async fn connect(&self) -> Result<(), ClientError> {
		let token = self.transport.connect().await?;
		token.wait_timeout(self.settings.connection_timeout()).await?;
		info!("Emitter client connected");
		Ok(())
	}

	/// Returns `true` while the broker connection is established.
	pub fn is_connected(&self) -> bool {
		self.transport.is_connected()
	}

	/// Publishes `payload` on `channel`.
	///
	/// Retain and QoS options become publish flags, the others are encoded
	/// in the topic's query string.
	pub async fn publish(
		&self,
		key: &str,
		channel: &str,
		payload: impl Into<Bytes>,
		options: &[TopicOption],
	) -> Result<(), ClientError> {
		let (qos, retain) = topic::header(options);
		let topic = topic::format_topic(key, channel, options);
		self.publish_raw(&topic, qos, retain, payload.into()).await
	}

	/// Publishes a message that expires after `ttl` seconds.
	pub async fn publish_with_ttl(
		&self,
		key: &str,
		channel: &str,
		payload: impl Into<Bytes>,
		ttl: u32,
	) -> Result<(), ClientError> {
		self.publish(key, channel, payload, &[TopicOption::Ttl(ttl)])
			.await
	}

	/// Publishes a message the broker retains for new subscribers.
	pub async fn publish_with_retain(
		&self,
		key: &str,
		channel: &str,
		payload: impl Into<Bytes>,
		options: &[TopicOption],
	) -> Result<(), ClientError> {
		let mut options = options.to_vec();
		options.push(TopicOption::Retain);
		self.publish(key, channel, payload, &options).await
	}

	/// Publishes through a link created with
	/// [`create_link`](Self::create_link), using its name as topic.
	pub async fn publish_with_link(
		&self,
		name: &str,
		payload: impl Into<Bytes>,
		options: &[TopicOption],
	) -> Result<(), ClientError> {
		let (qos, retain) = topic::header(options);
		self.publish_raw(name, qos, retain, payload.into()).await
	}

	/// Subscribes to `channel`, routing its messages to `handler` when given
	/// and to the default handler otherwise.
	pub async fn subscribe(
		&self,
		key: &str,
		channel: &str,
		handler: Option<MessageHandler>,
		options: &[TopicOption],
	) -> Result<(), ClientError> {
		if let Some(handler) = handler {
			self.dispatcher.router().add_handler(channel, handler);
		}
		let topic = topic::format_subscription(key, channel, options);
		let token = self.transport.subscribe(&topic, QoS::AtMostOnce).await?;
		self.complete(token).await
	}

	/// Joins the share group `group` on `channel`. Each message is delivered
	/// to a single member of the group.
	pub async fn subscribe_with_group(
		&self,
		key: &str,
		channel: &str,
		group: &str,
		handler: Option<MessageHandler>,
		options: &[TopicOption],
	) -> Result<(), ClientError> {
		if let Some(handler) = handler {
			self.dispatcher.router().add_handler(channel, handler);
		}
		let topic = topic::format_share(key, group, channel, options);
		let token = self.transport.subscribe(&topic, QoS::AtMostOnce).await?;
		self.complete(token).await
	}

	/// Subscribes and asks the broker to replay the `last` messages stored
	/// on the channel.
	pub async fn subscribe_with_history(
		&self,
		key: &str,
		channel: &str,
		last: u32,
		handler: Option<MessageHandler>,
	) -> Result<(), ClientError> {
		self.subscribe(key, channel, handler, &[TopicOption::Last(last)])
			.await
	}

	/// Removes the handler registered for `channel` and unsubscribes.
	pub async fn unsubscribe(
		&self,
		key: &str,
		channel: &str,
	) -> Result<(), ClientError> {
		self.dispatcher.router().remove_handler(channel);
		let topic = topic::format_subscription(key, channel, &[]);
		let token = self.transport.unsubscribe(&topic).await?;
		self.complete(token).await
	}

	/// Sends a presence request without waiting for a reply.
	///
	/// With `status` the broker answers with a snapshot, with `changes` it
	/// starts sending join/leave notifications. Both arrive through the
	/// presence handler.
	pub async fn presence(
		&self,
		key: &str,
		channel: &str,
		status: bool,
		changes: bool,
	) -> Result<(), ClientError> {
		let body = serde_json::to_vec(&PresenceRequest {
			key: key.to_owned(),
			channel: channel.to_owned(),
			status,
			changes,
		})?;
		let topic = self.control_topic(ControlKind::Presence);
		self.publish_raw(&topic, QoS::AtLeastOnce, false, Bytes::from(body))
			.await
	}

	/// Requests a presence snapshot of `channel` and waits for it.
	pub async fn request_presence(
		&self,
		key: &str,
		channel: &str,
		changes: bool,
	) -> Result<PresenceEvent, ClientError> {
		let response = self
			.request(ControlKind::Presence, &PresenceRequest {
				key: key.to_owned(),
				channel: channel.to_owned(),
				status: true,
				changes,
			})
			.await?;
		match response {
			| Response::Presence(event) => Ok(event),
			| other => Err(unexpected("presence", &other)),
		}
	}

	/// Generates a key for `channel` with the given permissions (e.g.
	/// `"rwls"`). A `ttl` of zero never expires.
	pub async fn generate_key(
		&self,
		key: &str,
		channel: &str,
		permissions: &str,
		ttl: i32,
	) -> Result<String, ClientError> {
		let response = self
			.request(ControlKind::KeyGen, &KeyGenRequest {
				key: key.to_owned(),
				channel: channel.to_owned(),
				permissions: permissions.to_owned(),
				ttl,
			})
			.await?;
		match response {
			| Response::KeyGen(response) => Ok(response.key),
			| other => Err(unexpected("keygen", &other)),
		}
	}

	/// Bans `target`. Returns `true` if the key is now banned.
	pub async fn block_key(
		&self,
		secret: &str,
		target: &str,
	) -> Result<bool, ClientError> {
		self.key_ban(secret, target, true).await
	}

	/// Lifts a ban on `target`. Returns `true` if the key is now allowed.
	pub async fn allow_key(
		&self,
		secret: &str,
		target: &str,
	) -> Result<bool, ClientError> {
		self.key_ban(secret, target, false).await.map(|banned| !banned)
	}

	/// Creates a link `name` pointing to `channel`.
	///
	/// When a handler is given the broker subscribes the connection to the
	/// link and the handler is registered for the link's channel.
	pub async fn create_link(
		&self,
		key: &str,
		channel: &str,
		name: &str,
		handler: Option<MessageHandler>,
		options: &[TopicOption],
	) -> Result<Link, ClientError> {
		let response = self
			.request(ControlKind::Link, &LinkRequest {
				name: name.to_owned(),
				key: key.to_owned(),
				channel: topic::format_topic("", channel, options),
				subscribe: handler.is_some(),
			})
			.await?;
		let link = match response {
			| Response::Link(link) => link,
			| other => return Err(unexpected("link", &other)),
		};
		if let Some(handler) = handler {
			self.dispatcher.router().add_handler(&link.channel, handler);
		}
		Ok(link)
	}

	/// Identifier the broker assigned to this connection. Cached after the
	/// first successful query.
	pub async fn id(&self) -> Result<String, ClientError> {
		let id = self
			.guid
			.get_or_try_init(|| async {
				let response = self
					.request(ControlKind::Me, &serde_json::Value::Null)
					.await?;
				match response {
					| Response::Me(me) => Ok::<_, ClientError>(me.id),
					| other => Err(unexpected("me", &other)),
				}
			})
			.await?;
		Ok(id.clone())
	}

	async fn key_ban(
		&self,
		secret: &str,
		target: &str,
		banned: bool,
	) -> Result<bool, ClientError> {
		let response = self
			.request(ControlKind::KeyBan, &KeyBanRequest {
				secret: secret.to_owned(),
				target: target.to_owned(),
				banned,
			})
			.await?;
		match response {
			| Response::KeyBan(response) => Ok(response.banned),
			| other => Err(unexpected("keyban", &other)),
		}
	}

	/// Publishes a control request and waits for its correlated response.
	async fn request<B>(
		&self,
		kind: ControlKind,
		body: &B,
	) -> Result<Response, ClientError>
	where
		B: Serialize + ?Sized,
	{
		let payload = Bytes::from(serde_json::to_vec(body)?);
		let topic = self.control_topic(kind);
		let timeout = self.settings.request_timeout;
		let pending = self.dispatcher.pending();

		// Inbound control messages wait on this lock, so the response
		// cannot be processed before the waiter exists.
		let (token, receiver, id) = {
			let _exclusive = self.dispatcher.lock_exclusive().await;
			let publish = self
				.transport
				.publish(&topic, QoS::AtLeastOnce, false, payload);
			let mut token = match time::timeout(timeout, publish).await {
				| Ok(token) => token?,
				| Err(_) => return Err(ClientError::timeout(timeout)),
			};
			let id = match time::timeout(timeout, token.message_id()).await {
				| Ok(Some(id)) => id,
				| Ok(None) => return Err(ClientError::NoMessageId),
				| Err(_) => return Err(ClientError::timeout(timeout)),
			};
			pending.track(id);
			let Some(receiver) = pending.register_waiter(id) else {
				pending.release(id);
				return Err(ClientError::NoMessageId);
			};
			(token, receiver, id)
		};
		debug!(kind = %kind, request_id = id, "Control request published");

		let outcome = self.await_response(token, receiver, timeout).await;
		if outcome.is_err() && pending.release(id) {
			debug!(kind = %kind, request_id = id, "Abandoned control request");
		}
		match outcome? {
			| Response::Error(error) => Err(ClientError::Broker(error)),
			| response => Ok(response),
		}
	}

	async fn await_response(
		&self,
		token: Token,
		receiver: ResponseReceiver,
		timeout: Duration,
	) -> Result<Response, ClientError> {
		token.wait_timeout(timeout).await?;
		match time::timeout(timeout, receiver).await {
			| Ok(Ok(response)) => Ok(response),
			| Ok(Err(_)) => Err(ClientError::ResponseLost),
			| Err(_) => Err(ClientError::timeout(timeout)),
		}
	}

	async fn publish_raw(
		&self,
		topic: &str,
		qos: QoS,
		retain: bool,
		payload: Bytes,
	) -> Result<(), ClientError> {
		let token = self.transport.publish(topic, qos, retain, payload).await?;
		self.complete(token).await
	}

	async fn complete(&self, token: Token) -> Result<(), ClientError> {
		token.wait_timeout(self.settings.request_timeout).await
	}

	fn control_topic(&self, kind: ControlKind) -> String {
		topic::format_control(self.dispatcher.control_prefix(), kind.as_str())
	}
}

fn unexpected(expected: &'static str, actual: &Response) -> ClientError {
	ClientError::Unmarshal {
		expected,
		actual: actual.kind(),
	}
}
