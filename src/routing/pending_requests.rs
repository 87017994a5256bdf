use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::control::Response;

/// Receiving side of a registered waiter.
pub type ResponseReceiver = oneshot::Receiver<Response>;

#[derive(Debug)]
struct PendingEntry {
	created: Instant,
	waiter: Option<oneshot::Sender<Response>>,
}

/// In-flight control requests keyed by the transport-assigned message id.
///
/// An entry is created when a request is published ([`track`]), gains a
/// single-slot waiter ([`register_waiter`]) and is removed by the first
/// [`notify`] for its id, or by [`release`] when the requester stops
/// waiting. A waiter is never reused.
///
/// [`track`]: PendingRequests::track
/// [`register_waiter`]: PendingRequests::register_waiter
/// [`notify`]: PendingRequests::notify
/// [`release`]: PendingRequests::release
#[derive(Debug, Default)]
pub struct PendingRequests {
	entries: Mutex<HashMap<u16, PendingEntry>>,
}

impl PendingRequests {
	/// Creates an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Records an outbound message id handed out by the transport.
	///
	/// Tracking an id that is still pending replaces the stale entry.
	pub fn track(&self, id: u16) {
		let previous = self.entries().insert(id, PendingEntry {
			created: Instant::now(),
			waiter: None,
		});
		if previous.is_some() {
			warn!(request_id = id, "Message id reused while still pending, dropping stale entry");
		}
	}

	/// Attaches a single-slot waiter to a tracked id.
	///
	/// Returns `None` when nothing was published under `id`. Callers must
	/// hold the dispatcher's correlation lock from publish until this
	/// returns so the response cannot be processed first.
	pub fn register_waiter(&self, id: u16) -> Option<ResponseReceiver> {
		let mut entries = self.entries();
		let entry = entries.get_mut(&id)?;
		let (tx, rx) = oneshot::channel();
		entry.waiter = Some(tx);
		Some(rx)
	}

	/// Delivers `response` to the waiter registered under `id` and removes
	/// the entry.
	///
	/// Returns `false` when no waiter exists, in which case the response is
	/// unsolicited. A second notification for the same id is a no-op.
	pub fn notify(&self, id: u16, response: Response) -> bool {
		let mut entries = self.entries();
		let has_waiter = entries
			.get(&id)
			.is_some_and(|entry| entry.waiter.is_some());
		if !has_waiter {
			return false;
		}

		let waiter = entries.remove(&id).and_then(|entry| entry.waiter);
		drop(entries);
		if let Some(waiter) = waiter {
			if waiter.send(response).is_err() {
				debug!(request_id = id, "Waiter abandoned before response arrived");
			}
		}
		true
	}

	/// Drops the entry for `id`, waiter included, once its requester has
	/// given up. A response arriving later is treated as unsolicited.
	pub fn release(&self, id: u16) -> bool {
		self.entries().remove(&id).is_some()
	}

	/// Drops entries older than `max_age`, returning how many were removed.
	pub fn sweep(&self, max_age: Duration) -> usize {
		let mut entries = self.entries();
		let before = entries.len();
		entries.retain(|_, entry| entry.created.elapsed() < max_age);
		let removed = before - entries.len();
		if removed > 0 {
			debug!(removed, "Swept orphaned pending requests");
		}
		removed
	}

	/// Returns `true` if `id` is tracked.
	pub fn contains(&self, id: u16) -> bool {
		self.entries().contains_key(&id)
	}

	/// Number of tracked ids.
	pub fn len(&self) -> usize {
		self.entries().len()
	}

	/// Returns `true` if nothing is pending.
	pub fn is_empty(&self) -> bool {
		self.entries().is_empty()
	}

	fn entries(&self) -> MutexGuard<'_, HashMap<u16, PendingEntry>> {
		self.entries.lock().unwrap_or_else(PoisonError::into_inner)
	}
}
