//! The background side: starts sessions when the toolbar action is clicked and brokers the handshake.

use crate::{
	chrome::{self, Runtime, Tab},
	config::Config,
	eligibility::can_inject,
	error::Error,
	wire::WireMessage,
};
use futures::{
	channel::mpsc::{self, UnboundedReceiver},
	pin_mut, select, FutureExt, StreamExt,
};
use gloo_timers::future::TimeoutFuture;
use hashbrown::HashSet;
use js_sys::Array;
use std::rc::Rc;
use tracing::{error, info, instrument, trace, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use wasm_bindgen_futures::{spawn_local, JsFuture};

/// The registered toolbar action handler. Unregisters on drop.
#[derive(Debug)]
pub struct Broker {
	on_clicked: Closure<dyn FnMut(JsValue)>,
}

impl Broker {
	/// # Errors
	///
	/// Iff `chrome.action` is unavailable.
	#[instrument(skip(config))]
	pub fn register(config: Config) -> Result<Self, Error> {
		let config = Rc::new(config);
		let on_clicked = Closure::wrap(Box::new(move |tab: JsValue| {
			let config = Rc::clone(&config);
			spawn_local(async move {
				if let Err(error) = open_session(tab.unchecked_into(), &config).await {
					error!(%error, "Failed to start session. It must be restarted by the user.");
				}
			});
		}) as Box<dyn FnMut(JsValue)>);
		chrome::action()?.on_clicked().add_listener(on_clicked.as_ref().unchecked_ref());
		info!("Broker registered.");
		Ok(Self { on_clicked })
	}
}

impl Drop for Broker {
	fn drop(&mut self) {
		if let Ok(action) = chrome::action() {
			action.on_clicked().remove_listener(self.on_clicked.as_ref().unchecked_ref());
		}
	}
}

/// Collects the tab ids of own-extension contexts that signal readiness, until dropped.
struct ReadinessListener {
	runtime: Runtime,
	on_message: Closure<dyn FnMut(JsValue, JsValue)>,
}

impl ReadinessListener {
	fn register(runtime: Runtime) -> (Self, UnboundedReceiver<i32>) {
		let (sender, receiver) = mpsc::unbounded();
		let on_message = Closure::wrap(Box::new({
			let runtime = runtime.clone();
			move |_message: JsValue, message_sender: JsValue| {
				let message_sender: chrome::MessageSender = message_sender.unchecked_into();
				if !chrome::is_own_sender(&runtime, &message_sender) {
					return;
				}
				if let Some(tab_id) = message_sender.tab().and_then(|tab| tab.id()) {
					trace!(tab_id, "Readiness signal received.");
					sender.unbounded_send(tab_id).ok();
				}
			}
		}) as Box<dyn FnMut(JsValue, JsValue)>);
		runtime.on_message().add_listener(on_message.as_ref().unchecked_ref());
		(Self { runtime, on_message }, receiver)
	}
}

impl Drop for ReadinessListener {
	fn drop(&mut self) {
		self.runtime.on_message().remove_listener(self.on_message.as_ref().unchecked_ref());
		trace!("Readiness listener unregistered.");
	}
}

/// Injects the listener into `tab`, opens the popup window, and once both are ready tells the popup which tab to connect to.
///
/// # Errors
///
/// Iff an extension API call fails or either party doesn't signal readiness in time.
/// Ineligible tabs are skipped with a warning and aren't an error.
#[instrument(skip(tab, config), fields(tab_id = ?tab.id()))]
pub async fn open_session(tab: Tab, config: &Config) -> Result<(), Error> {
	let (tab_id, url) = match (tab.id(), tab.url()) {
		(Some(tab_id), Some(url)) => (tab_id, url),
		_ => {
			warn!("Tab has no id or URL. Not starting a session.");
			return Ok(());
		}
	};
	let file_scheme_access = JsFuture::from(chrome::extension()?.is_allowed_file_scheme_access().map_err(Error::from_js)?)
		.await
		.map_err(Error::from_js)?
		.as_bool()
		.unwrap_or(false);
	if !can_inject(&url, file_scheme_access) {
		warn!(file_scheme_access, "Page is not eligible for inspection.");
		return Ok(());
	}

	let runtime = chrome::runtime()?;
	let (_readiness, mut ready) = ReadinessListener::register(runtime.clone());

	inject_listener(tab_id, &config.listener_script).await?;
	let popup_id = open_popup_window(&runtime, &config.popup_page).await?;
	info!(popup_id, "Popup window opened.");

	await_readiness(&mut ready, &[("document listener", tab_id), ("popup", popup_id)], config.handshake_timeout_ms).await?;

	let connect = WireMessage::Connect { tab_id }.to_js()?;
	let delivery = chrome::tabs()?.send_message(popup_id, &connect).map_err(Error::from_js)?;
	if let Err(error) = JsFuture::from(delivery).await {
		warn!(error = %Error::from_js(error), "Connection message delivery not confirmed.");
	}
	info!(popup_id, "Session brokered.");
	Ok(())
}

async fn inject_listener(tab_id: i32, script: &str) -> Result<(), Error> {
	let target = chrome::object(&[("tabId", tab_id.into())])?;
	let files = Array::of1(&JsValue::from_str(script));
	let injection = chrome::object(&[("target", target.into()), ("files", files.into()), ("world", "ISOLATED".into())])?;
	let promise = chrome::scripting()?.execute_script(&injection).map_err(Error::from_js)?;
	JsFuture::from(promise).await.map_err(Error::from_js)?;
	trace!(script, "Listener injected.");
	Ok(())
}

async fn open_popup_window(runtime: &Runtime, page: &str) -> Result<i32, Error> {
	let create_data = chrome::object(&[("url", runtime.get_url(page).into()), ("type", "popup".into())])?;
	let promise = chrome::windows()?.create(&create_data).map_err(Error::from_js)?;
	let window: chrome::Window = JsFuture::from(promise).await.map_err(Error::from_js)?.unchecked_into();
	window
		.tabs()
		.map(|tabs| tabs.get(0))
		.filter(|tab| !tab.is_undefined())
		.and_then(|tab| tab.unchecked_into::<Tab>().id())
		.ok_or_else(|| Error::Js("popup window has no tab".to_owned()))
}

/// Waits until every `expected` tab id was reported ready, or until `timeout_ms` have passed in total.
async fn await_readiness(ready: &mut UnboundedReceiver<i32>, expected: &[(&'static str, i32)], timeout_ms: u32) -> Result<(), Error> {
	let mut seen = HashSet::new();
	let timeout = TimeoutFuture::new(timeout_ms).fuse();
	pin_mut!(timeout);
	loop {
		let party = match expected.iter().find(|(_, id)| !seen.contains(id)) {
			Some((party, _)) => *party,
			None => return Ok(()),
		};
		select! {
			tab_id = ready.next() => match tab_id {
				Some(tab_id) => {
					seen.insert(tab_id);
				}
				None => return Err(Error::Js("readiness channel closed".to_owned())),
			},
			() = timeout => return Err(Error::HandshakeTimeout { party, timeout_ms }),
		}
	}
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
	use super::await_readiness;
	use crate::error::Error;
	use futures::channel::mpsc;
	use gloo_timers::future::TimeoutFuture;
	use wasm_bindgen_futures::spawn_local;
	use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};

	wasm_bindgen_test_configure!(run_in_browser);

	const LISTENER_TAB: i32 = 7;
	const POPUP_TAB: i32 = 9;
	const PARTIES: &[(&str, i32)] = &[("document listener", LISTENER_TAB), ("popup", POPUP_TAB)];

	#[wasm_bindgen_test]
	async fn succeeds_once_both_parties_are_ready() {
		let (sender, mut ready) = mpsc::unbounded();
		sender.unbounded_send(POPUP_TAB).unwrap();
		spawn_local(async move {
			TimeoutFuture::new(20).await;
			sender.unbounded_send(LISTENER_TAB).unwrap();
		});
		await_readiness(&mut ready, PARTIES, 1000).await.unwrap();
	}

	#[wasm_bindgen_test]
	async fn names_the_party_that_timed_out() {
		let (sender, mut ready) = mpsc::unbounded();
		sender.unbounded_send(LISTENER_TAB).unwrap();
		sender.unbounded_send(3).unwrap();
		let result = await_readiness(&mut ready, PARTIES, 50).await;
		assert!(
			matches!(result, Err(Error::HandshakeTimeout { party: "popup", timeout_ms: 50 })),
			"{:?}",
			result
		);
		drop(sender);
	}

	#[wasm_bindgen_test]
	async fn repeated_signal_counts_once() {
		let (sender, mut ready) = mpsc::unbounded();
		sender.unbounded_send(LISTENER_TAB).unwrap();
		sender.unbounded_send(LISTENER_TAB).unwrap();
		let result = await_readiness(&mut ready, PARTIES, 50).await;
		assert!(matches!(result, Err(Error::HandshakeTimeout { party: "popup", .. })), "{:?}", result);
		drop(sender);
	}

	#[wasm_bindgen_test]
	async fn one_deadline_covers_both_parties() {
		let (sender, mut ready) = mpsc::unbounded();
		spawn_local(async move {
			TimeoutFuture::new(40).await;
			sender.unbounded_send(LISTENER_TAB).ok();
			TimeoutFuture::new(40).await;
			sender.unbounded_send(POPUP_TAB).ok();
		});
		// Each signal alone arrives in time, but not both together.
		let result = await_readiness(&mut ready, PARTIES, 60).await;
		assert!(matches!(result, Err(Error::HandshakeTimeout { party: "popup", .. })), "{:?}", result);
	}
}
