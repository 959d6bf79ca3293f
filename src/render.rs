//! The popup's periodic, lock-bounded presentation of the shadow tree.

use crate::{markup, mirror::Mirror, tree::Snapshot};
use core::{
	cell::{Cell, RefCell},
	convert::TryFrom,
	time::Duration,
};
use gloo_timers::{callback::Interval, future::TimeoutFuture};
use std::rc::Rc;
use tracing::{trace, warn};
use wasm_bindgen_futures::spawn_local;
use web_sys::Element;

/// Nesting beyond this is cut off in the rendered output.
pub const DEPTH_LIMIT: usize = 512;

/// Shows a consistent [`Snapshot`] to the user.
pub trait Presenter {
	fn present(&mut self, snapshot: &Snapshot);
}

/// Writes the rendered markup into an element's text content.
#[derive(Debug)]
pub struct ElementPresenter {
	container: Element,
	shown: Option<String>,
}

impl ElementPresenter {
	#[must_use]
	pub fn new(container: Element) -> Self {
		Self { container, shown: None }
	}
}

impl Presenter for ElementPresenter {
	fn present(&mut self, snapshot: &Snapshot) {
		let text = markup::render(snapshot, DEPTH_LIMIT);
		if self.shown.as_deref() == Some(text.as_str()) {
			return trace!("Rendered markup unchanged.");
		}
		self.container.set_text_content(Some(&text));
		self.shown = Some(text);
	}
}

/// Renders on a fixed interval until dropped.
///
/// Each tick waits at most one interval for the shadow tree lock. A tick that can't acquire it in time
/// is skipped, and ticks don't overlap.
#[derive(Debug)]
pub struct RenderLoop {
	_interval: Interval,
	active: Rc<Cell<bool>>,
}

impl RenderLoop {
	#[must_use]
	pub fn start<P: Presenter + 'static>(mirror: Rc<Mirror>, presenter: P, interval: Duration) -> Self {
		let millis = u32::try_from(interval.as_millis()).unwrap_or(u32::MAX);
		let active = Rc::new(Cell::new(true));
		let busy = Rc::new(Cell::new(false));
		let presenter = Rc::new(RefCell::new(presenter));

		let interval = Interval::new(millis, {
			let active = Rc::clone(&active);
			move || {
				if busy.get() {
					return trace!("Previous render pass still running. Skipping tick.");
				}
				busy.set(true);

				let mirror = Rc::clone(&mirror);
				let presenter = Rc::clone(&presenter);
				let active = Rc::clone(&active);
				let busy = Rc::clone(&busy);
				spawn_local(async move {
					let snapshot = mirror
						.try_with(TimeoutFuture::new(millis), |state| {
							state.check_stall(js_sys::Date::now());
							state.snapshot()
						})
						.await;
					match snapshot {
						Some(snapshot) if active.get() => presenter.borrow_mut().present(&snapshot),
						Some(_) => trace!("Render loop stopped. Discarding snapshot."),
						None => warn!(timeout_ms = millis, "Shadow tree lock not acquired in time. Skipping render."),
					}
					busy.set(false);
				});
			}
		});

		Self { _interval: interval, active }
	}
}

impl Drop for RenderLoop {
	fn drop(&mut self) {
		self.active.set(false);
	}
}
