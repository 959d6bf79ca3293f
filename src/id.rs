use core::fmt::{self, Display, Formatter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wasm_bindgen::JsValue;

/// An opaque identifier for one mirrored DOM node or attribute.
///
/// Ids are minted once per observed object and never reused within an inspection session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
	/// Mints a fresh random (v4 UUID) id.
	#[must_use]
	pub fn generate() -> Self {
		Self(Uuid::new_v4().to_string())
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl From<String> for NodeId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

impl From<&str> for NodeId {
	fn from(id: &str) -> Self {
		Self(id.to_owned())
	}
}

impl From<&NodeId> for JsValue {
	fn from(id: &NodeId) -> Self {
		JsValue::from_str(&id.0)
	}
}

impl Display for NodeId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}
