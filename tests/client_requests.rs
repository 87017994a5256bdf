//! Integration tests driving the full client against an in-memory
//! transport.
//!
//! The transport assigns sequential message ids, records every operation
//! and can answer a publish by injecting a message into the inbound
//! channel, the way a broker answers control requests.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use emitter_client::advanced::{
	EventSender, InboundSender, event_channel, inbound_channel,
};
use emitter_client::{
	ClientBuilder, ClientError, ClientSettings, ConnectionEvent, EmitterClient,
	EmitterConnection, Message, PresenceEvent, QoS, Token, TopicOption,
	Transport, TransportError, handler,
};
use serde_json::Value;
use tokio::sync::mpsc;

type Responder = Box<dyn Fn(&str, &[u8], u16) -> Option<Message> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
struct Published {
	topic: String,
	qos: QoS,
	retain: bool,
	payload: Bytes,
}

impl Published {
	fn json(&self) -> Value {
		serde_json::from_slice(&self.payload).unwrap()
	}
}

struct MockTransport {
	inbound: InboundSender,
	events: EventSender,
	next_id: AtomicU16,
	published: Mutex<Vec<Published>>,
	subscribed: Mutex<Vec<(String, QoS)>>,
	unsubscribed: Mutex<Vec<String>>,
	responder: Mutex<Option<Responder>>,
	refuse_connect: AtomicBool,
	stall_publish: AtomicBool,
	connected: AtomicBool,
	disconnected: AtomicBool,
}

impl MockTransport {
	fn new(inbound: InboundSender, events: EventSender) -> Self {
		Self {
			inbound,
			events,
			next_id: AtomicU16::new(1),
			published: Mutex::default(),
			subscribed: Mutex::default(),
			unsubscribed: Mutex::default(),
			responder: Mutex::default(),
			refuse_connect: AtomicBool::new(false),
			stall_publish: AtomicBool::new(false),
			connected: AtomicBool::new(false),
			disconnected: AtomicBool::new(false),
		}
	}

	/// Simulates the broker dropping the connection.
	fn lose_connection(&self, reason: &str) {
		if self.connected.swap(false, Ordering::SeqCst) {
			let _ = self.events.send(ConnectionEvent::Disconnected(
				TransportError::Connection(reason.to_owned()),
			));
		}
	}

	fn respond_with<F>(&self, f: F)
	where F: Fn(&str, &[u8], u16) -> Option<Message> + Send + Sync + 'static {
		*self.responder.lock().unwrap() = Some(Box::new(f));
	}

	fn deliver(&self, topic: &str, payload: &str) {
		self.inbound
			.send(Message::new(topic.to_owned(), payload.to_owned()))
			.unwrap();
	}

	fn published(&self) -> Vec<Published> {
		self.published.lock().unwrap().clone()
	}

	fn published_to(&self, topic: &str) -> Vec<Published> {
		self.published()
			.into_iter()
			.filter(|p| p.topic == topic)
			.collect()
	}

	fn subscribed(&self) -> Vec<(String, QoS)> {
		self.subscribed.lock().unwrap().clone()
	}

	fn unsubscribed(&self) -> Vec<String> {
		self.unsubscribed.lock().unwrap().clone()
	}

	fn next_id(&self) -> u16 {
		self.next_id.fetch_add(1, Ordering::SeqCst)
	}
}

#[async_trait]
impl Transport for MockTransport {
	async fn connect(&self) -> Result<Token, TransportError> {
		if self.refuse_connect.load(Ordering::SeqCst) {
			return Ok(Token::completed(
				None,
				Err(TransportError::Connection("refused".to_owned())),
			));
		}
		self.connected.store(true, Ordering::SeqCst);
		let _ = self.events.send(ConnectionEvent::Connected);
		Ok(Token::completed(None, Ok(())))
	}

	async fn publish(
		&self,
		topic: &str,
		qos: QoS,
		retain: bool,
		payload: Bytes,
	) -> Result<Token, TransportError> {
		if self.stall_publish.load(Ordering::SeqCst) {
			std::future::pending::<()>().await;
		}
		let id = match qos {
			| QoS::AtMostOnce => None,
			| _ => Some(self.next_id()),
		};
		self.published.lock().unwrap().push(Published {
			topic: topic.to_owned(),
			qos,
			retain,
			payload: payload.clone(),
		});
		if let Some(responder) = self.responder.lock().unwrap().as_ref() {
			if let Some(reply) = responder(topic, &payload, id.unwrap_or_default())
			{
				self.inbound.send(reply).unwrap();
			}
		}
		Ok(Token::completed(id, Ok(())))
	}

	async fn subscribe(
		&self,
		topic: &str,
		qos: QoS,
	) -> Result<Token, TransportError> {
		self.subscribed.lock().unwrap().push((topic.to_owned(), qos));
		Ok(Token::completed(Some(self.next_id()), Ok(())))
	}

	async fn unsubscribe(&self, topic: &str) -> Result<Token, TransportError> {
		self.unsubscribed.lock().unwrap().push(topic.to_owned());
		Ok(Token::completed(Some(self.next_id()), Ok(())))
	}

	async fn disconnect(&self) -> Result<(), TransportError> {
		self.connected.store(false, Ordering::SeqCst);
		self.disconnected.store(true, Ordering::SeqCst);
		Ok(())
	}

	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::SeqCst)
	}
}

fn start(
	builder: ClientBuilder,
) -> (EmitterClient<MockTransport>, EmitterConnection<MockTransport>) {
	// RUST_LOG=emitter_client=debug shows dispatch decisions
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
	let (tx, rx) = inbound_channel();
	let (events_tx, events_rx) = event_channel();
	builder.start(MockTransport::new(tx, events_tx), rx, events_rx)
}

fn reply(topic: &str, body: String) -> Option<Message> {
	Some(Message::new(topic.to_owned(), body))
}

/// Handler forwarding every message it receives to a channel.
fn forwarding() -> (emitter_client::MessageHandler, mpsc::UnboundedReceiver<Message>)
{
	let (tx, rx) = mpsc::unbounded_channel();
	let message_handler = handler(move |message| {
		let _ = tx.send(message.clone());
	});
	(message_handler, rx)
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
	tokio::time::timeout(Duration::from_secs(1), rx.recv())
		.await
		.expect("nothing received within 1s")
		.expect("channel closed")
}

#[tokio::test]
async fn test_generate_key_round_trip() {
	let (client, connection) = start(ClientBuilder::new());
	client.transport().respond_with(|topic, _, id| match topic {
		| "emitter/keygen/" => reply(
			"emitter/keygen/",
			format!(r#"{{"req":{id},"status":200,"key":"generated","channel":"a/"}}"#),
		),
		| _ => None,
	});

	let key = client.generate_key("master", "a/", "rwls", 0).await.unwrap();

	assert_eq!(key, "generated");
	let requests = client.transport().published_to("emitter/keygen/");
	assert_eq!(requests.len(), 1);
	assert_eq!(requests[0].qos, QoS::AtLeastOnce);
	assert!(!requests[0].retain);
	assert_eq!(
		requests[0].json(),
		serde_json::json!({"key": "master", "channel": "a/", "type": "rwls", "ttl": 0})
	);
	assert!(client.dispatcher().pending().is_empty());
	connection.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_broker_error_is_returned_to_caller() {
	let errors = Arc::new(AtomicUsize::new(0));
	let observed = errors.clone();
	let (client, connection) = start(ClientBuilder::new().on_error(move |_| {
		observed.fetch_add(1, Ordering::SeqCst);
	}));
	client.transport().respond_with(|_, _, id| {
		reply(
			"emitter/error/",
			format!(r#"{{"req":{id},"status":401,"message":"unauthorized"}}"#),
		)
	});

	let result = client.block_key("secret", "target").await;

	match result {
		| Err(ClientError::Broker(error)) => {
			assert_eq!(error.status, 401);
			assert_eq!(error.message, "unauthorized");
		}
		| other => panic!("expected broker error, got {other:?}"),
	}
	assert_eq!(errors.load(Ordering::SeqCst), 0);
	connection.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_error_envelope_on_operation_topic() {
	let (client, connection) = start(ClientBuilder::new());
	client.transport().respond_with(|topic, _, id| {
		reply(
			topic,
			format!(r#"{{"req":{id},"status":400,"message":"invalid channel"}}"#),
		)
	});

	let result = client.create_link("key", "a/", "a1", None, &[]).await;

	assert!(matches!(result, Err(ClientError::Broker(e)) if e.status == 400));
	connection.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_request_times_out() {
	let settings = ClientSettings {
		request_timeout: Duration::from_millis(200),
		..ClientSettings::default()
	};
	let (client, connection) = start(ClientBuilder::new().settings(settings));

	let result = client.generate_key("master", "a/", "r", 0).await;

	assert!(matches!(
		result,
		Err(ClientError::Timeout {
			timeout_millis: 200
		})
	));
	assert!(client.dispatcher().pending().is_empty());
	connection.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_pending_ttl_sweeps_orphaned_requests() {
	let settings = ClientSettings {
		request_timeout: Duration::from_secs(10),
		pending_request_ttl: Some(Duration::from_millis(500)),
		..ClientSettings::default()
	};
	let (client, connection) = start(ClientBuilder::new().settings(settings));

	// Dropping the request future leaves its entry behind
	let abandoned = tokio::time::timeout(
		Duration::from_millis(50),
		client.generate_key("master", "a/", "r", 0),
	)
	.await;
	assert!(abandoned.is_err());
	assert_eq!(client.dispatcher().pending().len(), 1);

	tokio::time::sleep(Duration::from_millis(1200)).await;
	assert!(client.dispatcher().pending().is_empty());
	connection.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_response_of_wrong_kind_is_unmarshal_error() {
	let (client, connection) = start(ClientBuilder::new());
	client.transport().respond_with(|_, _, id| {
		reply("emitter/me/", format!(r#"{{"req":{id},"id":"conn"}}"#))
	});

	let result = client.generate_key("master", "a/", "r", 0).await;

	assert!(matches!(
		result,
		Err(ClientError::Unmarshal {
			expected: "keygen",
			actual: "me"
		})
	));
	connection.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_allow_and_block_key() {
	let (client, connection) = start(ClientBuilder::new());
	client.transport().respond_with(|_, payload, id| {
		let request: Value = serde_json::from_slice(payload).unwrap();
		let banned = request["banned"].as_bool().unwrap();
		reply(
			"emitter/keyban/",
			format!(r#"{{"req":{id},"status":200,"banned":{banned}}}"#),
		)
	});

	assert!(client.block_key("secret", "target").await.unwrap());
	assert!(client.allow_key("secret", "target").await.unwrap());

	let requests = client.transport().published_to("emitter/keyban/");
	assert_eq!(
		requests[0].json(),
		serde_json::json!({"secret": "secret", "target": "target", "banned": true})
	);
	assert_eq!(requests[1].json()["banned"], false);
	connection.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_id_is_cached() {
	let (client, connection) = start(ClientBuilder::new());
	client.transport().respond_with(|topic, _, id| match topic {
		| "emitter/me/" => reply(
			"emitter/me/",
			format!(r#"{{"req":{id},"id":"connection-id","links":{{"a1":"key/a/"}}}}"#),
		),
		| _ => None,
	});

	assert_eq!(client.id().await.unwrap(), "connection-id");
	assert_eq!(client.clone().id().await.unwrap(), "connection-id");

	let requests = client.transport().published_to("emitter/me/");
	assert_eq!(requests.len(), 1);
	assert_eq!(requests[0].payload, Bytes::from_static(b"null"));
	connection.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_subscribe_routes_to_handler_until_unsubscribed() {
	let (default_handler, mut defaults) = forwarding();
	let (client, connection) =
		start(ClientBuilder::new().on_message(move |message| default_handler(message)));
	let (channel_handler, mut received) = forwarding();

	client
		.subscribe("key", "a/b/", Some(channel_handler), &[])
		.await
		.unwrap();
	client.transport().deliver("a/b/c/", "first");
	assert_eq!(next(&mut received).await.payload_str(), Some("first"));

	client.unsubscribe("key", "a/b/").await.unwrap();
	client.transport().deliver("a/b/c/", "second");
	assert_eq!(next(&mut defaults).await.payload_str(), Some("second"));

	assert_eq!(client.transport().subscribed(), vec![(
		"key/a/b/".to_owned(),
		QoS::AtMostOnce
	)]);
	assert_eq!(client.transport().unsubscribed(), vec!["key/a/b/".to_owned()]);
	connection.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_subscription_topics() {
	let (client, connection) = start(ClientBuilder::new());

	client.subscribe("key", "a/#/", None, &[]).await.unwrap();
	client
		.subscribe_with_group("/key/", "g1", "/a/b/", None, &[TopicOption::WithoutEcho])
		.await
		.unwrap();
	client
		.subscribe_with_history("key", "a/", 10, None)
		.await
		.unwrap();

	let topics: Vec<String> = client
		.transport()
		.subscribed()
		.into_iter()
		.map(|(topic, _)| topic)
		.collect();
	assert_eq!(topics, vec![
		"key/a/#".to_owned(),
		"key/$share/g1/a/b/?me=0".to_owned(),
		"key/a/?last=10".to_owned(),
	]);
	assert!(client.dispatcher().router().is_empty());
	connection.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unsubscribe_uses_subscribed_filter() {
	let (client, connection) = start(ClientBuilder::new());

	client.subscribe("key", "a/#/", None, &[]).await.unwrap();
	client.unsubscribe("key", "a/#/").await.unwrap();

	let (subscribed, _) = client.transport().subscribed().remove(0);
	assert_eq!(subscribed, "key/a/#");
	assert_eq!(client.transport().unsubscribed(), vec![subscribed]);
	connection.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_publish_variants() {
	let (client, connection) = start(ClientBuilder::new());

	client.publish("key", "a/", "one", &[]).await.unwrap();
	client
		.publish("key", "a/", "two", &[TopicOption::AtLeastOnce, TopicOption::WithoutEcho])
		.await
		.unwrap();
	client.publish_with_ttl("key", "a/", "three", 30).await.unwrap();
	client
		.publish_with_retain("key", "a/", "four", &[])
		.await
		.unwrap();
	client
		.publish_with_link("a1", "five", &[TopicOption::AtLeastOnce])
		.await
		.unwrap();

	let published: Vec<(String, QoS, bool)> = client
		.transport()
		.published()
		.into_iter()
		.map(|p| (p.topic, p.qos, p.retain))
		.collect();
	assert_eq!(published, vec![
		("key/a/".to_owned(), QoS::AtMostOnce, false),
		("key/a/?me=0".to_owned(), QoS::AtLeastOnce, false),
		("key/a/?ttl=30".to_owned(), QoS::AtMostOnce, false),
		("key/a/".to_owned(), QoS::AtMostOnce, true),
		("a1".to_owned(), QoS::AtLeastOnce, false),
	]);
	connection.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_create_link_registers_handler() {
	let (client, connection) = start(ClientBuilder::new());
	client.transport().respond_with(|topic, _, id| match topic {
		| "emitter/link/" => reply(
			"emitter/link/",
			format!(r#"{{"req":{id},"name":"a1","channel":"x/y/"}}"#),
		),
		| _ => None,
	});
	let (link_handler, mut received) = forwarding();

	let link = client
		.create_link("key", "/x/y/", "a1", Some(link_handler), &[TopicOption::WithoutEcho])
		.await
		.unwrap();

	assert_eq!(link.name, "a1");
	assert_eq!(link.channel, "x/y/");
	let request = client.transport().published_to("emitter/link/")[0].json();
	assert_eq!(
		request,
		serde_json::json!({"name": "a1", "key": "key", "channel": "x/y/?me=0", "subscribe": true})
	);

	client.transport().deliver("x/y/", "via link");
	assert_eq!(next(&mut received).await.payload_str(), Some("via link"));
	connection.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_presence_requests() {
	let events: Arc<Mutex<Vec<PresenceEvent>>> = Arc::default();
	let captured = events.clone();
	let (client, connection) =
		start(ClientBuilder::new().on_presence(move |event| {
			captured.lock().unwrap().push(event.clone());
		}));
	client.transport().respond_with(|topic, _, id| match topic {
		| "emitter/presence/" => reply(
			"emitter/presence/",
			format!(
				r#"{{"req":{id},"event":"status","channel":"a/","time":1589626821,"who":[{{"id":"A"}},{{"id":"B","username":"bee"}}]}}"#
			),
		),
		| _ => None,
	});

	let snapshot = client.request_presence("key", "a/", false).await.unwrap();
	assert_eq!(snapshot.who.len(), 2);
	assert_eq!(snapshot.who[1].username.as_deref(), Some("bee"));

	client.presence("key", "a/", false, true).await.unwrap();
	let requests = client.transport().published_to("emitter/presence/");
	assert_eq!(
		requests[0].json(),
		serde_json::json!({"key": "key", "channel": "a/", "status": true, "changes": false})
	);
	assert_eq!(requests[1].qos, QoS::AtLeastOnce);
	assert_eq!(requests[1].json()["changes"], true);

	connection.shutdown().await.unwrap();
	// Both replies went through the presence callback as well
	assert_eq!(events.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_custom_system_prefix() {
	let settings = ClientSettings {
		system_prefix: "/broker/".to_owned(),
		..ClientSettings::default()
	};
	let (client, connection) = start(ClientBuilder::new().settings(settings));
	client.transport().respond_with(|topic, _, id| {
		reply(topic, format!(r#"{{"req":{id},"status":200,"key":"k"}}"#))
	});

	assert_eq!(client.generate_key("m", "a/", "r", 0).await.unwrap(), "k");
	assert_eq!(client.transport().published()[0].topic, "broker/keygen/");
	connection.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_connect_and_shutdown() {
	let (client, connection) = start(ClientBuilder::new());
	client.connect().await.unwrap();

	connection.shutdown().await.unwrap();
	assert!(client.transport().disconnected.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_connection_callbacks_and_state() {
	let (tx, mut lifecycle) = mpsc::unbounded_channel();
	let lost = tx.clone();
	let (client, connection) = start(
		ClientBuilder::new()
			.on_connect(move || {
				let _ = tx.send("connected".to_owned());
			})
			.on_disconnect(move |error| {
				let _ = lost.send(format!("lost: {error}"));
			}),
	);
	assert!(!client.is_connected());

	client.connect().await.unwrap();
	assert!(client.is_connected());
	assert_eq!(next(&mut lifecycle).await, "connected");

	client.transport().lose_connection("reset by peer");
	assert!(!client.is_connected());
	assert_eq!(
		next(&mut lifecycle).await,
		"lost: Network connection failed: reset by peer"
	);

	client.connect().await.unwrap();
	assert_eq!(next(&mut lifecycle).await, "connected");
	connection.shutdown().await.unwrap();
	assert!(!client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_publish_does_not_hold_request_lock() {
	let settings = ClientSettings {
		request_timeout: Duration::from_millis(200),
		..ClientSettings::default()
	};
	let (client, connection) = start(ClientBuilder::new().settings(settings));
	client.transport().stall_publish.store(true, Ordering::SeqCst);

	let result = client.generate_key("master", "a/", "r", 0).await;
	assert!(result.unwrap_err().is_timeout());

	client.transport().stall_publish.store(false, Ordering::SeqCst);
	client.transport().respond_with(|_, _, id| {
		reply(
			"emitter/keygen/",
			format!(r#"{{"req":{id},"status":200,"key":"k","channel":"a/"}}"#),
		)
	});
	assert_eq!(client.generate_key("master", "a/", "r", 0).await.unwrap(), "k");
	assert!(client.dispatcher().pending().is_empty());
	connection.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_refused_connect_is_transport_error() {
	let (client, connection) = start(ClientBuilder::new());
	client.transport().refuse_connect.store(true, Ordering::SeqCst);

	let result = client.connect().await;

	assert!(matches!(
		result,
		Err(ClientError::Transport(TransportError::Connection(_)))
	));
	connection.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_requests_are_correlated() {
	let (client, connection) = start(ClientBuilder::new());
	client.transport().respond_with(|_, payload, id| {
		let request: Value = serde_json::from_slice(payload).unwrap();
		let channel = request["channel"].as_str().unwrap().to_owned();
		reply(
			"emitter/keygen/",
			format!(r#"{{"req":{id},"status":200,"key":"key-for-{channel}","channel":"{channel}"}}"#),
		)
	});

	let mut tasks = Vec::new();
	for n in 0..20 {
		let client = client.clone();
		tasks.push(tokio::spawn(async move {
			let channel = format!("c{n}/");
			let key = client.generate_key("m", &channel, "r", 0).await.unwrap();
			assert_eq!(key, format!("key-for-{channel}"));
		}));
	}
	for task in tasks {
		task.await.unwrap();
	}
	assert!(client.dispatcher().pending().is_empty());
	connection.shutdown().await.unwrap();
}
