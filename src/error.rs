use thiserror::Error;
use wasm_bindgen::JsValue;

/// Transport and setup failures.
///
/// Inconsistent protocol data is not an [`Error`] but an [`Anomaly`](`crate::tree::Anomaly`), which is logged and discarded.
#[derive(Debug, Error)]
pub enum Error {
	#[error("malformed wire message: {0}")]
	Decode(#[from] serde_json::Error),

	#[error("JavaScript exception: {0}")]
	Js(String),

	#[error("extension API `{0}` is unavailable in this context")]
	MissingApi(&'static str),

	#[error("no element with id {0:?}")]
	MissingElement(String),

	#[error("{party} did not signal readiness within {timeout_ms}ms")]
	HandshakeTimeout { party: &'static str, timeout_ms: u32 },
}

impl Error {
	pub(crate) fn from_js(value: JsValue) -> Self {
		Self::Js(value.as_string().unwrap_or_else(|| format!("{:?}", value)))
	}
}

impl From<Error> for JsValue {
	fn from(error: Error) -> Self {
		js_sys::Error::new(&error.to_string()).into()
	}
}
