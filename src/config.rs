use crate::error::Error;
use core::time::Duration;
use serde::Deserialize;
use wasm_bindgen::JsValue;

/// Tunables shared by all three extension contexts.
///
/// Every entry point accepts an optional JavaScript object with (a subset of) these camelCase fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// How long the broker, popup and listener wait for their counterpart's readiness signal.
	pub handshake_timeout_ms: u32,
	/// The render tick, which also bounds how long a render pass waits for the shadow tree lock.
	pub render_interval_ms: u32,
	/// After how long a sequence gap is skipped. `None` waits forever.
	pub stall_timeout_ms: Option<u32>,
	/// The extension page opened as the popup window.
	pub popup_page: String,
	/// The content script injected into the inspected tab.
	pub listener_script: String,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			handshake_timeout_ms: 5_000,
			render_interval_ms: 250,
			stall_timeout_ms: Some(5_000),
			popup_page: "popup/index.html".to_owned(),
			listener_script: "listener.js".to_owned(),
		}
	}
}

impl Config {
	/// Reads the configuration object handed to an entry point. `undefined` and `null` yield the defaults.
	///
	/// # Errors
	///
	/// Iff `value` is present but doesn't match the schema.
	pub fn from_js(value: &JsValue) -> Result<Self, Error> {
		if value.is_undefined() || value.is_null() {
			return Ok(Self::default());
		}
		let text: String = js_sys::JSON::stringify(value).map_err(Error::from_js)?.into();
		Self::from_json(&text)
	}

	/// # Errors
	///
	/// Iff `text` doesn't match the schema.
	pub fn from_json(text: &str) -> Result<Self, Error> {
		Ok(serde_json::from_str(text)?)
	}

	#[must_use]
	pub fn handshake_timeout(&self) -> Duration {
		Duration::from_millis(self.handshake_timeout_ms.into())
	}

	#[must_use]
	pub fn render_interval(&self) -> Duration {
		Duration::from_millis(self.render_interval_ms.into())
	}

	#[must_use]
	pub fn stall_timeout(&self) -> Option<Duration> {
		self.stall_timeout_ms.map(|ms| Duration::from_millis(ms.into()))
	}
}
