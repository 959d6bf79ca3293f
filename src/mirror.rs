//! The popup's session state: reorder queue plus shadow tree, behind one exclusive lock.
//!
//! Message application (the writer) and render snapshots (the reader) share a single [`Mutex`]
//! rather than a reader/writer split, so that a snapshot never observes a partially applied update.
//! Readers only ever wait for a bounded time; see [`Mirror::try_with`].

use crate::{
	reorder::ReorderQueue,
	tree::{ShadowTree, Snapshot},
	wire::WireMessage,
};
use core::{future::Future, time::Duration};
use futures::{
	future::{select, Either},
	lock::Mutex,
	pin_mut,
};
use tracing::{error, trace, trace_span, warn};

#[derive(Debug)]
pub struct MirrorState {
	queue: ReorderQueue<WireMessage>,
	tree: ShadowTree,
	last_applied: Option<u64>,
}

impl MirrorState {
	#[must_use]
	pub fn new(stall_timeout: Option<Duration>) -> Self {
		Self {
			queue: ReorderQueue::new(stall_timeout),
			tree: ShadowTree::new(),
			last_applied: None,
		}
	}

	#[must_use]
	pub fn tree(&self) -> &ShadowTree {
		&self.tree
	}

	#[must_use]
	pub fn snapshot(&self) -> Snapshot {
		self.tree.snapshot()
	}

	/// The highest sequence number applied so far.
	#[must_use]
	pub fn last_applied(&self) -> Option<u64> {
		self.last_applied
	}

	#[must_use]
	pub fn pending_len(&self) -> usize {
		self.queue.pending_len()
	}

	/// Queues a received message and applies everything that became contiguous.
	///
	/// Returns the number of applied messages.
	pub fn process_message(&mut self, message: WireMessage) -> usize {
		if message.sequence().is_none() {
			warn!(?message, "Ignoring unsequenced message on the document channel.");
			return 0;
		}
		let Self { queue, tree, last_applied } = self;
		queue.enqueue(message, |message| apply(tree, last_applied, message))
	}

	/// Runs the reorder queue's stall policy. See [`ReorderQueue::check_stall`].
	pub fn check_stall(&mut self, now_ms: f64) -> usize {
		let Self { queue, tree, last_applied } = self;
		queue.check_stall(now_ms, |message| apply(tree, last_applied, message))
	}
}

fn apply(tree: &mut ShadowTree, last_applied: &mut Option<u64>, message: WireMessage) {
	*last_applied = message.sequence();
	let result = match &message {
		WireMessage::Update { sequence, node } => {
			let span = trace_span!("Applying update", sequence, id = %node.id, kind = ?node.node_kind);
			let _enter = span.enter();
			if cfg!(feature = "dangerous-logging") {
				trace!(name = %node.name, value = ?node.value, "Update content.");
			}
			tree.apply_update(node)
		}
		WireMessage::Remove { sequence, id } => {
			let span = trace_span!("Applying removal", sequence, %id);
			let _enter = span.enter();
			tree.remove_node(id)
		}
		WireMessage::Connect { .. } | WireMessage::Received { .. } => return,
	};
	if let Err(anomaly) = result {
		error!(sequence = ?message.sequence(), %anomaly, "Discarding anomalous message.");
	}
}

/// Shared handle to the session state.
#[derive(Debug)]
pub struct Mirror {
	state: Mutex<MirrorState>,
}

impl Mirror {
	#[must_use]
	pub fn new(stall_timeout: Option<Duration>) -> Self {
		Self {
			state: Mutex::new(MirrorState::new(stall_timeout)),
		}
	}

	/// The writer path. Waits for the lock as long as necessary.
	///
	/// Returns the highest applied sequence number if this call applied anything.
	pub async fn process_message(&self, message: WireMessage) -> Option<u64> {
		let mut state = self.state.lock().await;
		if state.process_message(message) > 0 {
			state.last_applied()
		} else {
			None
		}
	}

	/// The reader path. Runs `f` under the lock unless `timeout` completes first, in which case `None` is returned
	/// and `f` is never called.
	pub async fn try_with<R>(&self, timeout: impl Future<Output = ()>, f: impl FnOnce(&mut MirrorState) -> R) -> Option<R> {
		let lock = self.state.lock();
		pin_mut!(lock, timeout);
		match select(lock, timeout).await {
			Either::Left((mut state, _)) => Some(f(&mut *state)),
			Either::Right(((), _)) => None,
		}
	}

	/// A consistent copy of the shadow tree, or `None` if the lock wasn't acquired before `timeout`.
	pub async fn try_snapshot(&self, timeout: impl Future<Output = ()>) -> Option<Snapshot> {
		self.try_with(timeout, |state| state.snapshot()).await
	}
}
