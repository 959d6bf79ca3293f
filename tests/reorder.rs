use core::time::Duration;
use dom_mirror::reorder::{ReorderQueue, Sequenced};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Numbered(u64);

impl Sequenced for Numbered {
	fn sequence(&self) -> u64 {
		self.0
	}
}

fn feed(queue: &mut ReorderQueue<Numbered>, order: &[u64]) -> Vec<u64> {
	let mut released = Vec::new();
	for &sequence in order {
		queue.enqueue(Numbered(sequence), |message| released.push(message.0));
	}
	released
}

#[test]
fn in_order() {
	let mut queue = ReorderQueue::new(None);
	assert_eq!(feed(&mut queue, &[0, 1, 2]), [0, 1, 2]);
	assert_eq!(queue.next_expected(), 3);
	assert_eq!(queue.pending_len(), 0);
}

#[test]
fn every_arrival_order_releases_ascending() {
	let orders: &[&[u64]] = &[
		&[0, 1, 2, 3],
		&[3, 2, 1, 0],
		&[1, 0, 3, 2],
		&[2, 0, 3, 1],
		&[1, 3, 2, 0],
		&[3, 0, 2, 1],
	];
	for order in orders {
		let mut queue = ReorderQueue::new(None);
		assert_eq!(feed(&mut queue, order), [0, 1, 2, 3], "arrival order {:?}", order);
		assert_eq!(queue.pending_len(), 0);
	}
}

#[test]
fn buffers_until_gap_is_filled() {
	let mut queue = ReorderQueue::new(None);
	assert_eq!(feed(&mut queue, &[1, 2]), Vec::<u64>::new());
	assert_eq!(queue.pending_len(), 2);
	assert_eq!(queue.next_expected(), 0);

	let mut released = Vec::new();
	assert_eq!(queue.enqueue(Numbered(0), |message| released.push(message.0)), 3);
	assert_eq!(released, [0, 1, 2]);
}

#[test]
fn discards_duplicates() {
	let mut queue = ReorderQueue::new(None);
	assert_eq!(feed(&mut queue, &[0, 0, 2, 2, 1, 1, 0]), [0, 1, 2]);
	assert_eq!(queue.pending_len(), 0);
	assert_eq!(queue.next_expected(), 3);
}

#[test]
fn stalls_forever_without_timeout() {
	let mut queue = ReorderQueue::new(None);
	feed(&mut queue, &[2, 3]);
	let mut released = Vec::new();
	assert_eq!(queue.check_stall(0.0, |message| released.push(message.0)), 0);
	assert_eq!(queue.check_stall(1_000_000.0, |message| released.push(message.0)), 0);
	assert!(released.is_empty());
	assert_eq!(queue.pending_len(), 2);
}

#[test]
fn skips_gap_after_stall_timeout() {
	let mut queue = ReorderQueue::new(Some(Duration::from_millis(100)));
	assert_eq!(feed(&mut queue, &[0, 3, 4]), [0]);

	let mut released = Vec::new();
	assert_eq!(queue.check_stall(1_000.0, |message| released.push(message.0)), 0);
	assert_eq!(queue.check_stall(1_099.0, |message| released.push(message.0)), 0);
	assert_eq!(queue.check_stall(1_100.0, |message| released.push(message.0)), 2);
	assert_eq!(released, [3, 4]);
	assert_eq!(queue.next_expected(), 5);

	// Late arrivals from the skipped gap are replays now.
	assert_eq!(feed(&mut queue, &[1, 2, 5]), [5]);
}

#[test]
fn stall_clock_restarts_after_progress() {
	let mut queue = ReorderQueue::new(Some(Duration::from_millis(100)));
	feed(&mut queue, &[1, 3]);
	let mut released = Vec::new();
	assert_eq!(queue.check_stall(0.0, |message| released.push(message.0)), 0);

	// Filling the first gap restarts the wait for the second one.
	released.extend(feed(&mut queue, &[0]));
	assert_eq!(released, [0, 1]);
	assert_eq!(queue.check_stall(150.0, |message| released.push(message.0)), 0);
	assert_eq!(queue.check_stall(250.0, |message| released.push(message.0)), 1);
	assert_eq!(released, [0, 1, 3]);
}

#[test]
fn empty_queue_never_stalls() {
	let mut queue: ReorderQueue<Numbered> = ReorderQueue::new(Some(Duration::from_millis(1)));
	assert_eq!(queue.check_stall(0.0, |_| unreachable!()), 0);
	assert_eq!(queue.check_stall(10.0, |_| unreachable!()), 0);
}

#[test]
fn default_never_skips_gaps() {
	let mut queue = ReorderQueue::default();
	assert_eq!(feed(&mut queue, &[1, 2]), Vec::<u64>::new());
	assert_eq!(queue.check_stall(f64::MAX, |_| panic!("skipped a gap")), 0);
	assert_eq!(feed(&mut queue, &[0]), [0, 1, 2]);
}
