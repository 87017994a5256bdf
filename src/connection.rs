//! Connection lifecycle management module
//!
//! Keeps the transport and the dispatch task apart from the client so the
//! client can be cloned freely while shutdown happens exactly once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::client::ClientError;
use crate::transport::Transport;

/// How long [`EmitterConnection::shutdown`] waits for the dispatch task.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Connection handle for lifecycle management
///
/// Keep it alive for the duration of the session and call
/// [`shutdown`](Self::shutdown) when done.
pub struct EmitterConnection<T> {
	transport: Arc<T>,
	shutdown_signal: Option<oneshot::Sender<()>>,
	dispatch_handle: Option<JoinHandle<()>>,
}

impl<T> EmitterConnection<T>
where T: Transport
{
	pub(crate) fn new(
		transport: Arc<T>,
		shutdown_signal: oneshot::Sender<()>,
		dispatch_handle: JoinHandle<()>,
	) -> Self {
		Self {
			transport,
			shutdown_signal: Some(shutdown_signal),
			dispatch_handle: Some(dispatch_handle),
		}
	}

	/// Gracefully shutdown the connection by:
	/// 1. Disconnecting the transport
	/// 2. Letting the dispatch task drain messages already received
	/// 3. Waiting for it to finish, aborting it after
	///    [`SHUTDOWN_GRACE_PERIOD`]
	pub async fn shutdown(mut self) -> Result<(), ClientError> {
		let disconnected = self.transport.disconnect().await;

		if let Some(signal) = self.shutdown_signal.take() {
			let _ = signal.send(());
		}

		if let Some(mut handle) = self.dispatch_handle.take() {
			match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, &mut handle).await {
				| Ok(Err(e)) => warn!(error = %e, "Dispatch task failed"),
				| Ok(Ok(())) => {}
				| Err(_) => {
					warn!(grace_period = ?SHUTDOWN_GRACE_PERIOD, "Dispatch task did not stop, aborting");
					handle.abort();
				}
			}
		}

		disconnected.map_err(ClientError::from)
	}
}

impl<T> Drop for EmitterConnection<T> {
	fn drop(&mut self) {
		if self.dispatch_handle.is_some() {
			error!(
				"EmitterConnection dropped without calling shutdown(). Please \
				 call shutdown() and await its completion before dropping."
			);
		}
	}
}

impl<T> std::fmt::Debug for EmitterConnection<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EmitterConnection")
			.field("running", &self.dispatch_handle.is_some())
			.finish_non_exhaustive()
	}
}
