use std::time::Duration;

use tokio::sync::oneshot;

use super::error::TransportError;
use crate::client::ClientError;

type Outcome = Result<(), TransportError>;

#[derive(Debug)]
enum MessageId {
	Known(Option<u16>),
	Pending(oneshot::Receiver<u16>),
}

/// Tracks one transport operation.
///
/// Exposes the outbound message identifier assigned by the transport and
/// the final outcome of the operation.
#[derive(Debug)]
pub struct Token {
	message_id: MessageId,
	outcome: oneshot::Receiver<Outcome>,
}

/// Transport-side half of a [`Token`].
#[derive(Debug)]
pub struct TokenHandle {
	message_id: Option<oneshot::Sender<u16>>,
	outcome: Option<oneshot::Sender<Outcome>>,
}

impl Token {
	/// Creates a token whose message id and outcome are filled in later
	/// through the returned handle.
	pub fn pending() -> (TokenHandle, Token) {
		let (id_tx, id_rx) = oneshot::channel();
		let (outcome_tx, outcome_rx) = oneshot::channel();
		let handle = TokenHandle {
			message_id: Some(id_tx),
			outcome: Some(outcome_tx),
		};
		let token = Token {
			message_id: MessageId::Pending(id_rx),
			outcome: outcome_rx,
		};
		(handle, token)
	}

	/// Creates a token for an operation that already finished.
	pub fn completed(message_id: Option<u16>, outcome: Outcome) -> Token {
		let (outcome_tx, outcome_rx) = oneshot::channel();
		let _ = outcome_tx.send(outcome);
		Token {
			message_id: MessageId::Known(message_id),
			outcome: outcome_rx,
		}
	}

	/// Resolves the outbound message identifier.
	///
	/// Returns `None` if the transport never assigns one, e.g. because the
	/// operation failed before being sent.
	pub async fn message_id(&mut self) -> Option<u16> {
		if let MessageId::Pending(rx) = &mut self.message_id {
			let id = rx.await.ok();
			self.message_id = MessageId::Known(id);
		}
		match self.message_id {
			| MessageId::Known(id) => id,
			| MessageId::Pending(_) => None,
		}
	}

	/// Waits for the operation to complete.
	pub async fn wait(self) -> Outcome {
		self.outcome.await.unwrap_or(Err(TransportError::Closed))
	}

	/// Waits at most `timeout` for the operation to complete.
	pub async fn wait_timeout(self, timeout: Duration) -> Result<(), ClientError> {
		match tokio::time::timeout(timeout, self.wait()).await {
			| Ok(outcome) => outcome.map_err(ClientError::from),
			| Err(_) => Err(ClientError::timeout(timeout)),
		}
	}
}

impl TokenHandle {
	/// Publishes the message id to the token holder. Only the first call
	/// has an effect.
	pub fn assign_id(&mut self, id: u16) {
		if let Some(tx) = self.message_id.take() {
			let _ = tx.send(id);
		}
	}

	/// Completes the operation.
	pub fn complete(mut self, outcome: Outcome) {
		if let Some(tx) = self.outcome.take() {
			let _ = tx.send(outcome);
		}
	}
}
