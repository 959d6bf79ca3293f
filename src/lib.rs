#![doc(html_root_url = "https://docs.rs/dom-mirror/0.0.1")]
#![warn(clippy::pedantic)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod broker;
pub mod chrome;
pub mod config;
pub mod eligibility;
pub mod encoder;
pub mod error;
pub mod id;
pub mod listener;
pub mod markup;
pub mod mirror;
pub mod popup;
pub mod registry;
pub mod render;
pub mod reorder;
pub mod tree;
pub mod wire;

use crate::{broker::Broker, config::Config, listener::Listener, popup::Popup};
use std::{cell::RefCell, sync::Once};
use wasm_bindgen::{prelude::wasm_bindgen, JsValue};

/// Whichever role this extension context was started in.
#[derive(Debug)]
enum Context {
	Background(Broker),
	Listener(Listener),
	Popup(Popup),
}

impl Context {
	fn stop(&self) {
		match self {
			Self::Background(_) => (),
			Self::Listener(listener) => listener.stop(),
			Self::Popup(popup) => popup.stop(),
		}
	}
}

thread_local! {
	static CONTEXT: RefCell<Option<Context>> = RefCell::new(None);
}

fn init_logging() {
	static LOG_INITIALIZED: Once = Once::new();
	LOG_INITIALIZED.call_once(tracing_wasm::set_as_global_default);
}

fn install(context: Context) {
	CONTEXT.with(|slot| {
		if let Some(previous) = slot.replace(Some(context)) {
			tracing::warn!("Replacing a running context.");
			previous.stop();
		}
	});
}

/// Entry point of the background service worker.
///
/// # Errors
///
/// Iff `config` is malformed or the toolbar action API is unavailable.
#[wasm_bindgen]
pub fn start_background(config: JsValue) -> Result<(), JsValue> {
	init_logging();
	let broker = Broker::register(Config::from_js(&config)?)?;
	install(Context::Background(broker));
	Ok(())
}

/// Entry point of the injected content script.
///
/// # Errors
///
/// Iff `config` is malformed or `chrome.runtime` is unavailable.
#[wasm_bindgen]
pub fn start_listener(config: JsValue) -> Result<(), JsValue> {
	init_logging();
	let listener = Listener::start(&Config::from_js(&config)?)?;
	install(Context::Listener(listener));
	Ok(())
}

/// Entry point of the popup page. The mirrored source is rendered into the element with id `container_id`.
///
/// # Errors
///
/// Iff `config` is malformed, the container is missing or `chrome.runtime` is unavailable.
#[wasm_bindgen]
pub fn start_popup(container_id: &str, config: JsValue) -> Result<(), JsValue> {
	init_logging();
	let popup = Popup::start(container_id, Config::from_js(&config)?)?;
	install(Context::Popup(popup));
	Ok(())
}
