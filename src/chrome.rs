//! Minimal bindings to the parts of the [***chrome***](https://developer.chrome.com/docs/extensions/reference/api) extension API used here.
//!
//! Namespaces are looked up on the global object at runtime, since which ones exist depends on the extension context.

use crate::error::Error;
use js_sys::{Function, Object, Promise, Reflect};
use tracing::warn;
use wasm_bindgen::{prelude::*, JsCast};
use wasm_bindgen_futures::{spawn_local, JsFuture};

#[wasm_bindgen]
extern "C" {
	/// `chrome.events.Event`
	#[derive(Debug, Clone)]
	pub type Event;

	#[wasm_bindgen(method, js_name = addListener)]
	pub fn add_listener(this: &Event, callback: &Function);

	#[wasm_bindgen(method, js_name = removeListener)]
	pub fn remove_listener(this: &Event, callback: &Function);

	/// `chrome.runtime.Port`
	#[derive(Debug, Clone)]
	pub type Port;

	#[wasm_bindgen(method, catch, js_name = postMessage)]
	pub fn post_message(this: &Port, message: &JsValue) -> Result<(), JsValue>;

	#[wasm_bindgen(method)]
	pub fn disconnect(this: &Port);

	#[wasm_bindgen(method, getter, js_name = onMessage)]
	pub fn on_message(this: &Port) -> Event;

	#[wasm_bindgen(method, getter, js_name = onDisconnect)]
	pub fn on_disconnect(this: &Port) -> Event;

	/// `chrome.runtime.MessageSender`
	#[derive(Debug, Clone)]
	pub type MessageSender;

	#[wasm_bindgen(method, getter)]
	pub fn id(this: &MessageSender) -> Option<String>;

	#[wasm_bindgen(method, getter)]
	pub fn tab(this: &MessageSender) -> Option<Tab>;

	/// `chrome.tabs.Tab`
	#[derive(Debug, Clone)]
	pub type Tab;

	#[wasm_bindgen(method, getter)]
	pub fn id(this: &Tab) -> Option<i32>;

	#[wasm_bindgen(method, getter)]
	pub fn url(this: &Tab) -> Option<String>;

	/// `chrome.windows.Window`
	#[derive(Debug, Clone)]
	pub type Window;

	#[wasm_bindgen(method, getter)]
	pub fn tabs(this: &Window) -> Option<js_sys::Array>;

	/// `chrome.runtime`
	#[derive(Debug, Clone)]
	pub type Runtime;

	#[wasm_bindgen(method, getter)]
	pub fn id(this: &Runtime) -> String;

	#[wasm_bindgen(method, getter, js_name = onMessage)]
	pub fn on_message(this: &Runtime) -> Event;

	#[wasm_bindgen(method, getter, js_name = onConnect)]
	pub fn on_connect(this: &Runtime) -> Event;

	#[wasm_bindgen(method, catch, js_name = sendMessage)]
	pub fn send_message(this: &Runtime, message: &JsValue) -> Result<Promise, JsValue>;

	#[wasm_bindgen(method, js_name = getURL)]
	pub fn get_url(this: &Runtime, path: &str) -> String;

	/// `chrome.tabs`
	#[derive(Debug, Clone)]
	pub type Tabs;

	#[wasm_bindgen(method, catch)]
	pub fn connect(this: &Tabs, tab_id: i32) -> Result<Port, JsValue>;

	#[wasm_bindgen(method, catch, js_name = sendMessage)]
	pub fn send_message(this: &Tabs, tab_id: i32, message: &JsValue) -> Result<Promise, JsValue>;

	/// `chrome.scripting`
	#[derive(Debug, Clone)]
	pub type Scripting;

	#[wasm_bindgen(method, catch, js_name = executeScript)]
	pub fn execute_script(this: &Scripting, injection: &Object) -> Result<Promise, JsValue>;

	/// `chrome.windows`
	#[derive(Debug, Clone)]
	pub type Windows;

	#[wasm_bindgen(method, catch)]
	pub fn create(this: &Windows, create_data: &Object) -> Result<Promise, JsValue>;

	/// `chrome.action`
	#[derive(Debug, Clone)]
	pub type Action;

	#[wasm_bindgen(method, getter, js_name = onClicked)]
	pub fn on_clicked(this: &Action) -> Event;

	/// `chrome.extension`
	#[derive(Debug, Clone)]
	pub type Extension;

	#[wasm_bindgen(method, catch, js_name = isAllowedFileSchemeAccess)]
	pub fn is_allowed_file_scheme_access(this: &Extension) -> Result<Promise, JsValue>;
}

fn namespace<T: JsCast>(name: &'static str) -> Result<T, Error> {
	let chrome = Reflect::get(&js_sys::global(), &JsValue::from_str("chrome")).map_err(Error::from_js)?;
	if chrome.is_undefined() {
		return Err(Error::MissingApi("chrome"));
	}
	let namespace = Reflect::get(&chrome, &JsValue::from_str(name)).map_err(Error::from_js)?;
	if namespace.is_undefined() {
		return Err(Error::MissingApi(name));
	}
	Ok(namespace.unchecked_into())
}

/// # Errors
///
/// Iff `chrome.runtime` is unavailable.
pub fn runtime() -> Result<Runtime, Error> {
	namespace("runtime")
}

/// # Errors
///
/// Iff `chrome.tabs` is unavailable (as in content scripts).
pub fn tabs() -> Result<Tabs, Error> {
	namespace("tabs")
}

/// # Errors
///
/// Iff `chrome.scripting` is unavailable.
pub fn scripting() -> Result<Scripting, Error> {
	namespace("scripting")
}

/// # Errors
///
/// Iff `chrome.windows` is unavailable.
pub fn windows() -> Result<Windows, Error> {
	namespace("windows")
}

/// # Errors
///
/// Iff `chrome.action` is unavailable.
pub fn action() -> Result<Action, Error> {
	namespace("action")
}

/// # Errors
///
/// Iff `chrome.extension` is unavailable.
pub fn extension() -> Result<Extension, Error> {
	namespace("extension")
}

/// Builds a plain object from string keys and values.
///
/// # Errors
///
/// Iff a property can't be set.
pub fn object(entries: &[(&str, JsValue)]) -> Result<Object, Error> {
	let object = Object::new();
	for (key, value) in entries {
		Reflect::set(&object, &JsValue::from_str(key), value).map_err(Error::from_js)?;
	}
	Ok(object)
}

/// Whether a message was sent by another context of this same extension.
#[must_use]
pub fn is_own_sender(runtime: &Runtime, sender: &MessageSender) -> bool {
	sender.id().as_deref() == Some(runtime.id().as_str())
}

/// Tells the background broker that this context is listening, by sending it an empty message.
///
/// Delivery failures are logged only. If no one receives the signal, the broker times out on its own.
pub fn signal_readiness(runtime: &Runtime) {
	match runtime.send_message(&Object::new().into()) {
		Ok(promise) => spawn_local(async move {
			if let Err(error) = JsFuture::from(promise).await {
				warn!(error = %Error::from_js(error), "Readiness signal was not delivered.");
			}
		}),
		Err(error) => warn!(error = %Error::from_js(error), "Failed to signal readiness."),
	}
}
