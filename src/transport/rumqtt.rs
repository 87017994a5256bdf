use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{
	AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop,
	MqttOptions, Outgoing, Packet, QoS, SubscribeReasonCode,
};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use super::error::TransportError;
use super::token::{Token, TokenHandle};
use super::{ConnectionEvent, EventSender, InboundSender, Transport};
use crate::message::Message;

const MAX_CONSECUTIVE_ERRORS: u32 = 10;
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Operations queued in send order, waiting for rumqttc to assign a
/// packet id, plus those sent and waiting for the broker's ack.
#[derive(Debug, Default)]
struct Inflight {
	connect: Option<TokenHandle>,
	queued_publishes: VecDeque<TokenHandle>,
	queued_subscribes: VecDeque<(String, TokenHandle)>,
	queued_unsubscribes: VecDeque<TokenHandle>,
	publishes: HashMap<u16, TokenHandle>,
	subscribes: HashMap<u16, (String, TokenHandle)>,
	unsubscribes: HashMap<u16, TokenHandle>,
}

impl Inflight {
	fn on_outgoing_publish(&mut self, pkid: u16) {
		// rumqttc replays unacked publishes after a reconnect
		if pkid != 0 && self.publishes.contains_key(&pkid) {
			debug!(pkid, "Retransmitted publish");
			return;
		}
		let Some(mut handle) = self.queued_publishes.pop_front() else {
			debug!(pkid, "Outgoing publish without a queued token");
			return;
		};
		if pkid == 0 {
			handle.complete(Ok(()));
		} else {
			handle.assign_id(pkid);
			self.publishes.insert(pkid, handle);
		}
	}

	fn on_outgoing_subscribe(&mut self, pkid: u16) {
		if self.subscribes.contains_key(&pkid) {
			debug!(pkid, "Retransmitted subscribe");
			return;
		}
		if let Some((topic, mut handle)) = self.queued_subscribes.pop_front() {
			handle.assign_id(pkid);
			self.subscribes.insert(pkid, (topic, handle));
		}
	}

	fn on_outgoing_unsubscribe(&mut self, pkid: u16) {
		if self.unsubscribes.contains_key(&pkid) {
			debug!(pkid, "Retransmitted unsubscribe");
			return;
		}
		if let Some(mut handle) = self.queued_unsubscribes.pop_front() {
			handle.assign_id(pkid);
			self.unsubscribes.insert(pkid, handle);
		}
	}

	fn on_publish_ack(&mut self, pkid: u16) {
		if let Some(handle) = self.publishes.remove(&pkid) {
			handle.complete(Ok(()));
		}
	}

	fn on_suback(&mut self, pkid: u16, codes: &[SubscribeReasonCode]) {
		let Some((topic, handle)) = self.subscribes.remove(&pkid) else {
			return;
		};
		if codes.iter().any(|c| matches!(c, SubscribeReasonCode::Failure)) {
			warn!(topic = %topic, "Broker refused subscription");
			handle.complete(Err(TransportError::SubscriptionRefused { topic }));
		} else {
			handle.complete(Ok(()));
		}
	}

	fn on_unsuback(&mut self, pkid: u16) {
		if let Some(handle) = self.unsubscribes.remove(&pkid) {
			handle.complete(Ok(()));
		}
	}

	fn complete_connect(&mut self, outcome: Result<(), TransportError>) {
		if let Some(handle) = self.connect.take() {
			handle.complete(outcome);
		}
	}

	/// Fails everything still outstanding once the event loop is gone.
	fn fail_all(&mut self) {
		self.complete_connect(Err(TransportError::Closed));
		let handles = self
			.queued_publishes
			.drain(..)
			.chain(self.queued_subscribes.drain(..).map(|(_, h)| h))
			.chain(self.queued_unsubscribes.drain(..))
			.chain(self.publishes.drain().map(|(_, h)| h))
			.chain(self.subscribes.drain().map(|(_, (_, h))| h))
			.chain(self.unsubscribes.drain().map(|(_, h)| h));
		for handle in handles {
			handle.complete(Err(TransportError::Closed));
		}
	}
}

#[derive(Debug)]
struct Shared {
	inflight: Mutex<Inflight>,
	inbound: InboundSender,
	events: EventSender,
	connected: AtomicBool,
}

impl Shared {
	fn new(inbound: InboundSender, events: EventSender) -> Self {
		Self {
			inflight: Mutex::new(Inflight::default()),
			inbound,
			events,
			connected: AtomicBool::new(false),
		}
	}

	fn inflight(&self) -> MutexGuard<'_, Inflight> {
		self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn on_connected(&self) {
		self.connected.store(true, Ordering::SeqCst);
		self.emit(ConnectionEvent::Connected);
	}

	/// Reports the loss once per established connection.
	fn on_connection_lost(&self, error: TransportError) {
		if self.connected.swap(false, Ordering::SeqCst) {
			self.emit(ConnectionEvent::Disconnected(error));
		}
	}

	fn emit(&self, event: ConnectionEvent) {
		if self.events.send(event).is_err() {
			debug!("Event receiver dropped, discarding connection event");
		}
	}
}

/// [`Transport`] backed by a rumqttc [`AsyncClient`] and its event loop.
///
/// The event loop is spawned by [`connect`](Transport::connect) and runs
/// until a Disconnect packet is sent or received, or until too many
/// consecutive connection errors occur.
pub struct RumqttTransport {
	client: AsyncClient,
	shared: Arc<Shared>,
	event_loop: Mutex<Option<EventLoop>>,
	event_loop_handle: Mutex<Option<JoinHandle<()>>>,
	// Queue order must match the order requests reach the event loop.
	send_order: tokio::sync::Mutex<()>,
}

impl RumqttTransport {
	/// Creates the transport. Inbound publishes are forwarded to `inbound`,
	/// connection state changes to `events`.
	pub fn new(
		options: MqttOptions,
		capacity: usize,
		inbound: InboundSender,
		events: EventSender,
	) -> Self {
		let (client, event_loop) = AsyncClient::new(options, capacity);
		Self {
			client,
			shared: Arc::new(Shared::new(inbound, events)),
			event_loop: Mutex::new(Some(event_loop)),
			event_loop_handle: Mutex::new(None),
			send_order: tokio::sync::Mutex::new(()),
		}
	}

	async fn run(mut event_loop: EventLoop, shared: Arc<Shared>) {
		let mut error_count = 0;

		loop {
			match event_loop.poll().await {
				| Ok(Event::Incoming(Packet::Publish(p))) => {
					error_count = 0;
					debug!(topic = %p.topic, payload_size = p.payload.len(), "Received MQTT message");
					if shared.inbound.send(Message::new(p.topic, p.payload)).is_err()
					{
						debug!("Inbound receiver dropped, discarding message");
					}
				}
				| Ok(Event::Incoming(Packet::ConnAck(ack))) => {
					error_count = 0;
					info!(session_present = ack.session_present, "Connected to MQTT broker");
					let outcome = match ack.code {
						| ConnectReturnCode::Success => {
							shared.on_connected();
							Ok(())
						}
						| code => Err(TransportError::BrokerRejected { code }),
					};
					shared.inflight().complete_connect(outcome);
				}
				| Ok(Event::Incoming(Packet::PubAck(ack))) => {
					shared.inflight().on_publish_ack(ack.pkid);
				}
				| Ok(Event::Incoming(Packet::PubComp(comp))) => {
					shared.inflight().on_publish_ack(comp.pkid);
				}
				| Ok(Event::Incoming(Packet::SubAck(ack))) => {
					shared.inflight().on_suback(ack.pkid, &ack.return_codes);
				}
				| Ok(Event::Incoming(Packet::UnsubAck(ack))) => {
					shared.inflight().on_unsuback(ack.pkid);
				}
				| Ok(Event::Incoming(Packet::Disconnect)) => {
					info!("Received MQTT Disconnect packet from server");
					shared.on_connection_lost(TransportError::Closed);
					break;
				}
				| Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
					shared.inflight().on_outgoing_publish(pkid);
				}
				| Ok(Event::Outgoing(Outgoing::Subscribe(pkid))) => {
					shared.inflight().on_outgoing_subscribe(pkid);
				}
				| Ok(Event::Outgoing(Outgoing::Unsubscribe(pkid))) => {
					shared.inflight().on_outgoing_unsubscribe(pkid);
				}
				| Ok(Event::Outgoing(Outgoing::Disconnect)) => {
					info!("Sent MQTT Disconnect packet to server");
					break;
				}
				| Ok(notification) => {
					error_count = 0;
					debug!(notification = ?notification, "Received MQTT notification");
				}
				| Err(err) => {
					error_count += 1;
					error!(error_count = error_count, error = %err, "MQTT event loop error");

					let outcome = match err {
						| ConnectionError::ConnectionRefused(code) => {
							TransportError::BrokerRejected { code }
						}
						| other => TransportError::from(other),
					};
					shared.on_connection_lost(outcome.clone());
					shared.inflight().complete_connect(Err(outcome));

					if error_count >= MAX_CONSECUTIVE_ERRORS {
						error!(
							error_count = error_count,
							max_errors = MAX_CONSECUTIVE_ERRORS,
							"Too many consecutive errors, terminating event \
							 loop"
						);
						break;
					}

					let delay = INITIAL_RETRY_DELAY
						* 2_u32.pow((error_count - 1).min(10));
					let delay = delay.min(MAX_RETRY_DELAY);

					warn!(delay = ?delay, error_count = error_count, "Retrying MQTT connection");
					time::sleep(delay).await;
				}
			}
		}
		shared.connected.store(false, Ordering::SeqCst);
		shared.inflight().fail_all();
		info!("MQTT event loop terminated");
	}

	fn ensure_running(&self) -> Result<(), TransportError> {
		let handle = self
			.event_loop_handle
			.lock()
			.unwrap_or_else(PoisonError::into_inner);
		match handle.as_ref() {
			| Some(h) if !h.is_finished() => Ok(()),
			| _ => Err(TransportError::NotConnected),
		}
	}
}

#[async_trait]
impl Transport for RumqttTransport {
	async fn connect(&self) -> Result<Token, TransportError> {
		let event_loop = self
			.event_loop
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.take()
			.ok_or(TransportError::NotConnected)?;

		let (handle, token) = Token::pending();
		self.shared.inflight().connect = Some(handle);

		let shared = self.shared.clone();
		let join = tokio::spawn(async move {
			Self::run(event_loop, shared).await;
		});
		*self
			.event_loop_handle
			.lock()
			.unwrap_or_else(PoisonError::into_inner) = Some(join);
		Ok(token)
	}

	async fn publish(
		&self,
		topic: &str,
		qos: QoS,
		retain: bool,
		payload: Bytes,
	) -> Result<Token, TransportError> {
		self.ensure_running()?;
		let _order = self.send_order.lock().await;
		let (handle, token) = Token::pending();
		self.shared.inflight().queued_publishes.push_back(handle);
		if let Err(err) =
			self.client.publish_bytes(topic, qos, retain, payload).await
		{
			self.shared.inflight().queued_publishes.pop_back();
			return Err(err.into());
		}
		Ok(token)
	}

	async fn subscribe(
		&self,
		topic: &str,
		qos: QoS,
	) -> Result<Token, TransportError> {
		self.ensure_running()?;
		let _order = self.send_order.lock().await;
		let (handle, token) = Token::pending();
		self.shared
			.inflight()
			.queued_subscribes
			.push_back((topic.to_owned(), handle));
		if let Err(err) = self.client.subscribe(topic, qos).await {
			self.shared.inflight().queued_subscribes.pop_back();
			return Err(err.into());
		}
		Ok(token)
	}

	async fn unsubscribe(&self, topic: &str) -> Result<Token, TransportError> {
		self.ensure_running()?;
		let _order = self.send_order.lock().await;
		let (handle, token) = Token::pending();
		self.shared.inflight().queued_unsubscribes.push_back(handle);
		if let Err(err) = self.client.unsubscribe(topic).await {
			self.shared.inflight().queued_unsubscribes.pop_back();
			return Err(err.into());
		}
		Ok(token)
	}

	async fn disconnect(&self) -> Result<(), TransportError> {
		let handle = self
			.event_loop_handle
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.take();
		let Some(handle) = handle else {
			return Ok(());
		};
		if !handle.is_finished() {
			if let Err(e) = self.client.disconnect().await {
				warn!(error = %e, "Failed to disconnect MQTT client");
			}
		}
		if let Err(e) = handle.await {
			warn!(error = %e, "Event loop task failed");
		}
		Ok(())
	}

	fn is_connected(&self) -> bool {
		self.shared.connected.load(Ordering::SeqCst)
	}
}

impl std::fmt::Debug for RumqttTransport {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RumqttTransport")
			.field("shared", &self.shared)
			.finish_non_exhaustive()
	}
}
