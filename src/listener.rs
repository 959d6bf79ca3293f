//! The content-script side of a session: observes the page and streams it to the popup.

use crate::{
	chrome::{self, Port},
	config::Config,
	encoder::{MutationEncoder, Observation},
	error::Error,
	wire::WireMessage,
};
use gloo_timers::callback::Timeout;
use js_sys::Array;
use std::{
	cell::RefCell,
	rc::{Rc, Weak},
};
use tracing::{error, info, instrument, trace, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{MutationObserver, MutationObserverInit};

const UNLOAD_EVENT: &str = "beforeunload";

/// A running document listener.
///
/// Accepts exactly one connection. Until then, it deregisters itself after the handshake timeout.
/// Registered callbacks live as long as this handle.
#[derive(Debug)]
pub struct Listener {
	state: Rc<RefCell<ListenerState>>,
}

#[derive(Debug, Default)]
struct ListenerState {
	encoder: MutationEncoder,
	port: Option<Port>,
	observer: Option<MutationObserver>,
	acknowledged: Option<u64>,
	handshake_timeout: Option<Timeout>,
	torn_down: bool,
	on_connect: Option<Closure<dyn FnMut(JsValue)>>,
	on_port_message: Option<Closure<dyn FnMut(JsValue)>>,
	on_disconnect: Option<Closure<dyn FnMut(JsValue)>>,
	on_unload: Option<Closure<dyn FnMut(JsValue)>>,
	on_mutations: Option<Closure<dyn FnMut(Array, MutationObserver)>>,
}

impl Listener {
	/// Waits for the popup to connect and signals readiness to the background broker.
	///
	/// # Errors
	///
	/// Iff `chrome.runtime` is unavailable.
	#[instrument(skip(config))]
	pub fn start(config: &Config) -> Result<Self, Error> {
		let runtime = chrome::runtime()?;
		let state = Rc::new(RefCell::new(ListenerState::default()));

		let on_connect = Closure::wrap(Box::new({
			let state = Rc::downgrade(&state);
			move |port: JsValue| {
				if let Some(state) = state.upgrade() {
					if let Err(error) = connect(&state, port.unchecked_into()) {
						error!(%error, "Failed to start observing.");
						teardown(&state, "setup failed");
					}
				}
			}
		}) as Box<dyn FnMut(JsValue)>);
		runtime.on_connect().add_listener(on_connect.as_ref().unchecked_ref());

		let handshake_timeout = Timeout::new(config.handshake_timeout_ms, {
			let state = Rc::downgrade(&state);
			let timeout_ms = config.handshake_timeout_ms;
			move || {
				if let Some(state) = state.upgrade() {
					let state = state.borrow();
					if state.port.is_none() && !state.torn_down {
						remove_connect_listener(&state);
						error!(error = %Error::HandshakeTimeout { party: "popup", timeout_ms }, "Deregistering.");
					}
				}
			}
		});

		{
			let mut state = state.borrow_mut();
			state.on_connect = Some(on_connect);
			state.handshake_timeout = Some(handshake_timeout);
		}

		chrome::signal_readiness(&runtime);
		info!("Listener waiting for connection.");
		Ok(Self { state })
	}

	#[must_use]
	pub fn is_connected(&self) -> bool {
		self.state.borrow().port.is_some()
	}

	/// The highest sequence number the popup reported as applied.
	#[must_use]
	pub fn acknowledged(&self) -> Option<u64> {
		self.state.borrow().acknowledged
	}

	/// How many document messages were sent so far.
	#[must_use]
	pub fn issued(&self) -> u64 {
		self.state.borrow().encoder.issued()
	}

	/// Stops observing and closes the connection, if any.
	pub fn stop(&self) {
		teardown(&self.state, "stopped");
	}
}

fn remove_connect_listener(state: &ListenerState) {
	if let (Ok(runtime), Some(on_connect)) = (chrome::runtime(), &state.on_connect) {
		runtime.on_connect().remove_listener(on_connect.as_ref().unchecked_ref());
	}
}

fn connect(state: &Rc<RefCell<ListenerState>>, port: Port) -> Result<(), Error> {
	let weak = Rc::downgrade(state);
	let mut guard = state.borrow_mut();
	if guard.port.is_some() || guard.torn_down {
		warn!("Rejecting additional connection.");
		port.disconnect();
		return Ok(());
	}
	guard.handshake_timeout = None;
	remove_connect_listener(&guard);
	info!("Popup connected.");

	let on_port_message = Closure::wrap(Box::new({
		let weak = Weak::clone(&weak);
		move |message: JsValue| {
			if let Some(state) = weak.upgrade() {
				receive(&state, &message);
			}
		}
	}) as Box<dyn FnMut(JsValue)>);
	port.on_message().add_listener(on_port_message.as_ref().unchecked_ref());

	let on_disconnect = Closure::wrap(Box::new({
		let weak = Weak::clone(&weak);
		move |_port: JsValue| {
			if let Some(state) = weak.upgrade() {
				teardown(&state, "popup disconnected");
			}
		}
	}) as Box<dyn FnMut(JsValue)>);
	port.on_disconnect().add_listener(on_disconnect.as_ref().unchecked_ref());
	guard.port = Some(port);
	guard.on_port_message = Some(on_port_message);
	guard.on_disconnect = Some(on_disconnect);

	let on_unload = Closure::wrap(Box::new({
		let weak = Weak::clone(&weak);
		move |_event: JsValue| {
			if let Some(state) = weak.upgrade() {
				teardown(&state, "page unloading");
			}
		}
	}) as Box<dyn FnMut(JsValue)>);
	let window = web_sys::window().ok_or(Error::MissingApi("window"))?;
	window
		.add_event_listener_with_callback(UNLOAD_EVENT, on_unload.as_ref().unchecked_ref())
		.map_err(Error::from_js)?;
	guard.on_unload = Some(on_unload);

	let on_mutations = Closure::wrap(Box::new(move |records: Array, _observer: MutationObserver| {
		if let Some(state) = weak.upgrade() {
			let batch = records.iter().filter_map(|record| Observation::from_record(record.unchecked_ref()));
			let mut state = state.borrow_mut();
			let ListenerState { encoder, port, .. } = &mut *state;
			match port {
				Some(port) => encoder.observe(batch, &mut |message| post(port, &message)),
				None => trace!("Mutations observed after teardown. Ignoring."),
			}
		}
	}) as Box<dyn FnMut(Array, MutationObserver)>);
	let observer = MutationObserver::new(on_mutations.as_ref().unchecked_ref()).map_err(Error::from_js)?;
	guard.on_mutations = Some(on_mutations);
	guard.observer = Some(observer.clone());

	let document = window.document().ok_or(Error::MissingApi("document"))?;
	let options = MutationObserverInit::new();
	options.set_child_list(true);
	options.set_subtree(true);
	options.set_attributes(true);
	options.set_character_data(true);
	observer.observe_with_options(&document, &options).map_err(Error::from_js)?;

	let ListenerState { encoder, port, .. } = &mut *guard;
	if let Some(port) = port {
		encoder.push_initial_document(&document, &mut |message| post(port, &message));
	}
	Ok(())
}

fn post(port: &Port, message: &WireMessage) {
	let value = match message.to_js() {
		Ok(value) => value,
		Err(error) => return error!(%error, sequence = ?message.sequence(), "Failed to encode message."),
	};
	if let Err(error) = port.post_message(&value) {
		error!(error = %Error::from_js(error), sequence = ?message.sequence(), "Failed to post message.");
	}
}

fn receive(state: &Rc<RefCell<ListenerState>>, message: &JsValue) {
	match WireMessage::from_js(message) {
		Ok(WireMessage::Received { sequence }) => {
			let mut state = state.borrow_mut();
			state.acknowledged = state.acknowledged.max(Some(sequence));
			trace!(sequence, "Popup acknowledged.");
		}
		Ok(other) => warn!(message = ?other, "Unexpected message from popup. Ignoring."),
		Err(error) => error!(%error, "Malformed message from popup. Ignoring."),
	}
}

fn teardown(state: &Rc<RefCell<ListenerState>>, reason: &str) {
	let mut state = state.borrow_mut();
	if state.torn_down {
		return;
	}
	state.torn_down = true;
	state.handshake_timeout = None;
	remove_connect_listener(&state);

	if let Some(observer) = state.observer.take() {
		observer.disconnect();
	}
	if let (Some(window), Some(on_unload)) = (web_sys::window(), &state.on_unload) {
		window
			.remove_event_listener_with_callback(UNLOAD_EVENT, on_unload.as_ref().unchecked_ref())
			.ok();
	}
	if let Some(port) = state.port.take() {
		if let Some(on_port_message) = &state.on_port_message {
			port.on_message().remove_listener(on_port_message.as_ref().unchecked_ref());
		}
		if let Some(on_disconnect) = &state.on_disconnect {
			port.on_disconnect().remove_listener(on_disconnect.as_ref().unchecked_ref());
		}
		port.disconnect();
	}

	// Closures stay allocated until the listener itself is dropped, since one of them may be running right now.
	let issued = state.encoder.issued();
	let in_flight = in_flight(issued, state.acknowledged);
	info!(issued, acknowledged = ?state.acknowledged, in_flight, "Listener torn down: {}.", reason);
}

/// Messages sent but not yet acknowledged. Saturates if the popup claims to be further ahead than what was issued.
fn in_flight(issued: u64, acknowledged: Option<u64>) -> u64 {
	issued.saturating_sub(acknowledged.map_or(0, |sequence| sequence.saturating_add(1)))
}

#[cfg(test)]
mod tests {
	use super::in_flight;

	#[test]
	fn counts_unacknowledged_messages() {
		assert_eq!(in_flight(0, None), 0);
		assert_eq!(in_flight(5, None), 5);
		assert_eq!(in_flight(5, Some(2)), 2);
		assert_eq!(in_flight(5, Some(4)), 0);
	}

	#[test]
	fn acknowledgement_ahead_of_issued_counts_as_nothing_in_flight() {
		assert_eq!(in_flight(3, Some(10)), 0);
		assert_eq!(in_flight(0, Some(0)), 0);
		assert_eq!(in_flight(7, Some(u64::MAX)), 0);
	}
}
