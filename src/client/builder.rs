use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::async_client::EmitterClient;
use super::config::{ClientSettings, EmitterClientConfig};
use super::error::ClientError;
use crate::connection::EmitterConnection;
use crate::control::PresenceEvent;
use crate::message::{
	ConnectHandler, DisconnectHandler, ErrorHandler, Message, MessageHandler,
	PresenceHandler,
};
use crate::routing::{DispatchError, Dispatcher};
use crate::transport::{
	ConnectionEvent, EventReceiver, InboundReceiver, RumqttTransport,
	Transport, TransportError, event_channel, inbound_channel,
};

/// Configures callbacks and settings, then starts a client.
///
/// Callbacks are fixed once the client is started.
///
/// ```rust,no_run
/// use emitter_client::{ClientBuilder, EmitterClientConfig};
///
/// # async fn run() -> emitter_client::Result<()> {
/// let (client, connection) = ClientBuilder::new()
/// 	.on_message(|message| println!("{}", message.topic()))
/// 	.connect(EmitterClientConfig::localhost("demo"))
/// 	.await?;
///
/// client.subscribe("<channel key>", "sensors/", None, &[]).await?;
/// connection.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ClientBuilder {
	settings: ClientSettings,
	on_message: Option<MessageHandler>,
	on_presence: Option<PresenceHandler>,
	on_error: Option<ErrorHandler>,
	lifecycle: Lifecycle,
}

impl ClientBuilder {
	/// Builder with default settings and no callbacks.
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces the client settings.
	pub fn settings(mut self, settings: ClientSettings) -> Self {
		self.settings = settings;
		self
	}

	/// Handler for messages no registered channel handler matches.
	pub fn on_message<F>(mut self, f: F) -> Self
	where F: Fn(&Message) + Send + Sync + 'static {
		self.on_message = Some(Arc::new(f));
		self
	}

	/// Handler for presence events.
	pub fn on_presence<F>(mut self, f: F) -> Self
	where F: Fn(&PresenceEvent) + Send + Sync + 'static {
		self.on_presence = Some(Arc::new(f));
		self
	}

	/// Handler for uncorrelated broker errors and malformed control
	/// payloads.
	pub fn on_error<F>(mut self, f: F) -> Self
	where F: Fn(&DispatchError) + Send + Sync + 'static {
		self.on_error = Some(Arc::new(f));
		self
	}

	/// Handler called each time the broker accepts the connection,
	/// reconnects included.
	pub fn on_connect<F>(mut self, f: F) -> Self
	where F: Fn() + Send + Sync + 'static {
		self.lifecycle.on_connect = Some(Arc::new(f));
		self
	}

	/// Handler called when an established connection is lost.
	pub fn on_disconnect<F>(mut self, f: F) -> Self
	where F: Fn(&TransportError) + Send + Sync + 'static {
		self.lifecycle.on_disconnect = Some(Arc::new(f));
		self
	}

	/// Starts the dispatch task over an already created transport.
	///
	/// Every message received on `inbound` is dispatched in arrival order,
	/// and every event received on `events` reaches the connect and
	/// disconnect handlers. The transport is not connected; call
	/// [`EmitterClient::connect`].
	pub fn start<T>(
		self,
		transport: T,
		inbound: InboundReceiver,
		events: EventReceiver,
	) -> (EmitterClient<T>, EmitterConnection<T>)
	where
		T: Transport,
	{
		let mut dispatcher = Dispatcher::builder()
			.match_policy(self.settings.match_policy)
			.system_prefix(self.settings.system_prefix.clone());
		if let Some(handler) = self.on_message {
			dispatcher = dispatcher.on_message(handler);
		}
		if let Some(handler) = self.on_presence {
			dispatcher = dispatcher.on_presence(handler);
		}
		if let Some(handler) = self.on_error {
			dispatcher = dispatcher.on_error(handler);
		}
		let dispatcher = Arc::new(dispatcher.build());

		let (shutdown_tx, shutdown_rx) = oneshot::channel();
		let sweep_every = self
			.settings
			.pending_request_ttl
			.filter(|ttl| !ttl.is_zero());
		let handle = spawn_dispatch(
			dispatcher.clone(),
			self.lifecycle,
			inbound,
			events,
			shutdown_rx,
			sweep_every,
		);

		let transport = Arc::new(transport);
		let client =
			EmitterClient::new(transport.clone(), dispatcher, self.settings);
		let connection = EmitterConnection::new(transport, shutdown_tx, handle);
		(client, connection)
	}

	/// Creates a rumqttc transport from `config`, starts the client and
	/// connects it.
	///
	/// The settings in `config` replace those set on the builder.
	pub async fn connect(
		mut self,
		config: EmitterClientConfig,
	) -> Result<
		(
			EmitterClient<RumqttTransport>,
			EmitterConnection<RumqttTransport>,
		),
		ClientError,
	> {
		self.settings = config.settings;
		let (inbound_tx, inbound_rx) = inbound_channel();
		let (events_tx, events_rx) = event_channel();
		let transport = RumqttTransport::new(
			config.connection,
			self.settings.event_loop_capacity,
			inbound_tx,
			events_tx,
		);
		let (client, connection) = self.start(transport, inbound_rx, events_rx);

		if let Err(err) = client.connect().await {
			if let Err(e) = connection.shutdown().await {
				debug!(error = %e, "Shutdown after failed connect");
			}
			return Err(err);
		}
		Ok((client, connection))
	}
}

impl std::fmt::Debug for ClientBuilder {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClientBuilder")
			.field("settings", &self.settings)
			.field("on_message", &self.on_message.is_some())
			.field("on_presence", &self.on_presence.is_some())
			.field("on_error", &self.on_error.is_some())
			.field("on_connect", &self.lifecycle.on_connect.is_some())
			.field("on_disconnect", &self.lifecycle.on_disconnect.is_some())
			.finish()
	}
}

#[derive(Default)]
struct Lifecycle {
	on_connect: Option<ConnectHandler>,
	on_disconnect: Option<DisconnectHandler>,
}

impl Lifecycle {
	fn handle(&self, event: &ConnectionEvent) {
		match event {
			| ConnectionEvent::Connected => {
				if let Some(on_connect) = &self.on_connect {
					on_connect();
				}
			}
			| ConnectionEvent::Disconnected(error) => match &self.on_disconnect {
				| Some(on_disconnect) => on_disconnect(error),
				| None => warn!(error = %error, "Connection lost"),
			},
		}
	}
}

/// Dispatches inbound messages one at a time until the shutdown signal,
/// then drains what was already received. Also delivers connection events
/// and sweeps stale pending requests when a ttl is configured.
fn spawn_dispatch(
	dispatcher: Arc<Dispatcher>,
	lifecycle: Lifecycle,
	mut inbound: InboundReceiver,
	mut events: EventReceiver,
	mut shutdown: oneshot::Receiver<()>,
	sweep_every: Option<Duration>,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut sweep = sweep_every.map(tokio::time::interval);
		loop {
			tokio::select! {
				biased;
				message = inbound.recv() => match message {
					| Some(message) => dispatcher.dispatch(&message).await,
					| None => break,
				},
				Some(event) = events.recv() => lifecycle.handle(&event),
				_ = &mut shutdown => {
					while let Ok(message) = inbound.try_recv() {
						dispatcher.dispatch(&message).await;
					}
					break;
				}
				_ = tick(&mut sweep) => {
					if let Some(max_age) = sweep_every {
						dispatcher.pending().sweep(max_age);
					}
				}
			}
		}
		info!("Dispatch task stopped");
	})
}

async fn tick(interval: &mut Option<tokio::time::Interval>) {
	match interval {
		| Some(interval) => {
			interval.tick().await;
		}
		| None => std::future::pending().await,
	}
}
