//! Releases sequenced messages strictly in ascending order, whatever order they arrive in.

use crate::wire::WireMessage;
use core::time::Duration;
use tracing::{error, trace, warn};

/// Something the [`ReorderQueue`] can order.
pub trait Sequenced {
	fn sequence(&self) -> u64;
}

impl Sequenced for WireMessage {
	/// Unsequenced messages must not be enqueued. They'd sort last and never be released.
	fn sequence(&self) -> u64 {
		WireMessage::sequence(self).unwrap_or(u64::MAX)
	}
}

/// Buffers out-of-order arrivals.
///
/// `pending` is kept sorted by descending sequence number, so the next message to release is always at its end.
#[derive(Debug)]
pub struct ReorderQueue<M> {
	pending: Vec<M>,
	next_expected: u64,
	stall_timeout: Option<Duration>,
	stalled_since_ms: Option<f64>,
}

impl<M: Sequenced> Default for ReorderQueue<M> {
	fn default() -> Self {
		Self::new(None)
	}
}

impl<M: Sequenced> ReorderQueue<M> {
	/// With `stall_timeout` set to `None`, a permanently missing sequence number stalls the queue forever.
	#[must_use]
	pub fn new(stall_timeout: Option<Duration>) -> Self {
		Self {
			pending: Vec::new(),
			next_expected: 0,
			stall_timeout,
			stalled_since_ms: None,
		}
	}

	#[must_use]
	pub fn next_expected(&self) -> u64 {
		self.next_expected
	}

	/// The number of buffered messages that are still waiting on a gap.
	#[must_use]
	pub fn pending_len(&self) -> usize {
		self.pending.len()
	}

	/// Inserts `message` in order, then hands every message that became contiguous to `apply`.
	///
	/// Messages that were already released or are already buffered are duplicates and get discarded.
	///
	/// Returns the number of released messages.
	pub fn enqueue(&mut self, message: M, apply: impl FnMut(M)) -> usize {
		let sequence = message.sequence();
		if sequence < self.next_expected {
			warn!(sequence, next_expected = self.next_expected, "Discarding replayed message.");
			return 0;
		}

		// Reversed comparison, since `pending` is sorted descendingly.
		match self.pending.binary_search_by(|probe| sequence.cmp(&probe.sequence())) {
			Ok(_) => {
				warn!(sequence, "Discarding duplicate buffered message.");
				return 0;
			}
			Err(index) => self.pending.insert(index, message),
		}

		let released = self.drain(apply);
		if released == 0 {
			trace!(sequence, next_expected = self.next_expected, pending = self.pending.len(), "Buffered out-of-order message.");
		}
		released
	}

	/// Applies the stall policy: once the head has waited on a gap for longer than the stall timeout,
	/// skips forward to the lowest buffered sequence number.
	///
	/// `now_ms` is a monotonic millisecond timestamp. Returns the number of released messages.
	pub fn check_stall(&mut self, now_ms: f64, apply: impl FnMut(M)) -> usize {
		let head = match self.pending.last() {
			Some(head) => head.sequence(),
			None => {
				self.stalled_since_ms = None;
				return 0;
			}
		};
		let stall_timeout = match self.stall_timeout {
			Some(stall_timeout) => stall_timeout,
			None => return 0,
		};

		let since = *self.stalled_since_ms.get_or_insert(now_ms);
		#[allow(clippy::cast_precision_loss)]
		let timeout_ms = stall_timeout.as_millis() as f64;
		if now_ms - since < timeout_ms {
			return 0;
		}

		error!(
			missing_from = self.next_expected,
			missing_to = head - 1,
			"Sequence gap persisted for {}ms. Skipping the missing messages.",
			now_ms - since
		);
		self.next_expected = head;
		self.drain(apply)
	}

	fn drain(&mut self, mut apply: impl FnMut(M)) -> usize {
		let mut released = 0;
		while self.pending.last().map(Sequenced::sequence) == Some(self.next_expected) {
			if let Some(message) = self.pending.pop() {
				apply(message);
				self.next_expected += 1;
				released += 1;
			}
		}
		if released > 0 || self.pending.is_empty() {
			self.stalled_since_ms = None;
		}
		released
	}
}
