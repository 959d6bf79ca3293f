//! The popup side of a session: applies the document stream and renders it.

use crate::{
	chrome::{self, MessageSender, Port},
	config::Config,
	error::Error,
	mirror::Mirror,
	render::{ElementPresenter, RenderLoop},
	wire::WireMessage,
};
use gloo_timers::callback::Timeout;
use std::{cell::RefCell, rc::Rc};
use tracing::{error, info, instrument, trace, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use wasm_bindgen_futures::spawn_local;
use web_sys::Element;

/// A running popup.
#[derive(Debug)]
pub struct Popup {
	state: Rc<RefCell<PopupState>>,
}

#[derive(Debug)]
struct PopupState {
	config: Config,
	container: Element,
	mirror: Rc<Mirror>,
	port: Option<Port>,
	render_loop: Option<RenderLoop>,
	handshake_timeout: Option<Timeout>,
	torn_down: bool,
	on_runtime_message: Option<Closure<dyn FnMut(JsValue, JsValue)>>,
	on_port_message: Option<Closure<dyn FnMut(JsValue)>>,
	on_disconnect: Option<Closure<dyn FnMut(JsValue)>>,
}

impl Popup {
	/// Waits for the broker's `connection` message, then connects to the named tab and renders into `container_id`.
	///
	/// # Errors
	///
	/// Iff there's no element with id `container_id` or `chrome.runtime` is unavailable.
	#[instrument(skip(config))]
	pub fn start(container_id: &str, config: Config) -> Result<Self, Error> {
		let runtime = chrome::runtime()?;
		let container = web_sys::window()
			.and_then(|window| window.document())
			.and_then(|document| document.get_element_by_id(container_id))
			.ok_or_else(|| Error::MissingElement(container_id.to_owned()))?;

		let state = Rc::new(RefCell::new(PopupState {
			mirror: Rc::new(Mirror::new(config.stall_timeout())),
			config,
			container,
			port: None,
			render_loop: None,
			handshake_timeout: None,
			torn_down: false,
			on_runtime_message: None,
			on_port_message: None,
			on_disconnect: None,
		}));

		let on_runtime_message = Closure::wrap(Box::new({
			let state = Rc::downgrade(&state);
			move |message: JsValue, sender: JsValue| {
				if let Some(state) = state.upgrade() {
					handle_runtime_message(&state, &message, &sender.unchecked_into());
				}
			}
		}) as Box<dyn FnMut(JsValue, JsValue)>);
		runtime.on_message().add_listener(on_runtime_message.as_ref().unchecked_ref());

		let timeout_ms = state.borrow().config.handshake_timeout_ms;
		let handshake_timeout = Timeout::new(timeout_ms, {
			let state = Rc::downgrade(&state);
			move || {
				if let Some(state) = state.upgrade() {
					let state = state.borrow();
					if state.port.is_none() && !state.torn_down {
						remove_runtime_listener(&state);
						error!(error = %Error::HandshakeTimeout { party: "broker", timeout_ms }, "Deregistering.");
					}
				}
			}
		});

		{
			let mut state = state.borrow_mut();
			state.on_runtime_message = Some(on_runtime_message);
			state.handshake_timeout = Some(handshake_timeout);
		}

		chrome::signal_readiness(&runtime);
		info!("Popup waiting for connection.");
		Ok(Self { state })
	}

	/// The session state, for inspection.
	#[must_use]
	pub fn mirror(&self) -> Rc<Mirror> {
		Rc::clone(&self.state.borrow().mirror)
	}

	#[must_use]
	pub fn is_connected(&self) -> bool {
		self.state.borrow().port.is_some()
	}

	/// Disconnects and stops rendering.
	pub fn stop(&self) {
		teardown(&self.state, "stopped");
	}
}

fn remove_runtime_listener(state: &PopupState) {
	if let (Ok(runtime), Some(on_runtime_message)) = (chrome::runtime(), &state.on_runtime_message) {
		runtime.on_message().remove_listener(on_runtime_message.as_ref().unchecked_ref());
	}
}

fn handle_runtime_message(state: &Rc<RefCell<PopupState>>, message: &JsValue, sender: &MessageSender) {
	match chrome::runtime() {
		Ok(runtime) if chrome::is_own_sender(&runtime, sender) => (),
		Ok(_) => return warn!(sender = ?sender.id(), "Ignoring message from a foreign sender."),
		Err(error) => return error!(%error, "Runtime vanished."),
	}
	match WireMessage::from_js(message) {
		Ok(WireMessage::Connect { tab_id }) => {
			if let Err(error) = connect(state, tab_id) {
				error!(%error, tab_id, "Failed to connect to the document listener.");
				teardown(state, "connection failed");
			}
		}
		// Readiness signals of other contexts land here too.
		Ok(other) => trace!(message = ?other, "Ignoring runtime message."),
		Err(error) => trace!(%error, "Ignoring runtime message."),
	}
}

#[instrument(skip(state))]
fn connect(state: &Rc<RefCell<PopupState>>, tab_id: i32) -> Result<(), Error> {
	let weak = Rc::downgrade(state);
	let mut guard = state.borrow_mut();
	if guard.port.is_some() || guard.torn_down {
		warn!("Ignoring additional connection message.");
		return Ok(());
	}
	guard.handshake_timeout = None;
	remove_runtime_listener(&guard);

	let port = chrome::tabs()?.connect(tab_id).map_err(Error::from_js)?;
	info!("Connected to document listener.");

	let on_port_message = Closure::wrap(Box::new({
		let mirror = Rc::clone(&guard.mirror);
		let port = port.clone();
		move |message: JsValue| receive(&mirror, &port, &message)
	}) as Box<dyn FnMut(JsValue)>);
	port.on_message().add_listener(on_port_message.as_ref().unchecked_ref());

	let on_disconnect = Closure::wrap(Box::new(move |_port: JsValue| {
		if let Some(state) = weak.upgrade() {
			teardown(&state, "listener disconnected");
		}
	}) as Box<dyn FnMut(JsValue)>);
	port.on_disconnect().add_listener(on_disconnect.as_ref().unchecked_ref());

	let presenter = ElementPresenter::new(guard.container.clone());
	let render_loop = RenderLoop::start(Rc::clone(&guard.mirror), presenter, guard.config.render_interval());

	guard.port = Some(port);
	guard.on_port_message = Some(on_port_message);
	guard.on_disconnect = Some(on_disconnect);
	guard.render_loop = Some(render_loop);
	Ok(())
}

fn receive(mirror: &Rc<Mirror>, port: &Port, message: &JsValue) {
	let message = match WireMessage::from_js(message) {
		Ok(message) => message,
		Err(error) => return error!(%error, "Malformed message from listener. Ignoring."),
	};
	let mirror = Rc::clone(mirror);
	let port = port.clone();
	spawn_local(async move {
		if let Some(sequence) = mirror.process_message(message).await {
			match (WireMessage::Received { sequence }).to_js() {
				Ok(ack) => {
					if let Err(error) = port.post_message(&ack) {
						warn!(error = %Error::from_js(error), sequence, "Failed to acknowledge.");
					}
				}
				Err(error) => error!(%error, "Failed to encode acknowledgement."),
			}
		}
	});
}

fn teardown(state: &Rc<RefCell<PopupState>>, reason: &str) {
	let mut state = state.borrow_mut();
	if state.torn_down {
		return;
	}
	state.torn_down = true;
	state.handshake_timeout = None;
	state.render_loop = None;
	remove_runtime_listener(&state);

	if let Some(port) = state.port.take() {
		if let Some(on_port_message) = &state.on_port_message {
			port.on_message().remove_listener(on_port_message.as_ref().unchecked_ref());
		}
		if let Some(on_disconnect) = &state.on_disconnect {
			port.on_disconnect().remove_listener(on_disconnect.as_ref().unchecked_ref());
		}
		port.disconnect();
	}
	info!("Popup torn down: {}.", reason);
}
