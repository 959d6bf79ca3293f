//! The message schema spoken between the document listener and the popup.

use crate::{error::Error, id::NodeId};
use serde::{Deserialize, Serialize};
use wasm_bindgen::JsValue;

/// The mirrored kind of a DOM node.
///
/// Unknown tags received over the wire decode as [`NodeKind::Unsupported`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
	Element,
	Attribute,
	Text,
	CdataSection,
	Comment,
	Document,
	DocumentType,
	ProcessingInstruction,
	#[serde(other)]
	Unsupported,
}

impl NodeKind {
	/// Maps a DOM [***nodeType***](https://developer.mozilla.org/en-US/docs/Web/API/Node/nodeType) constant.
	#[must_use]
	pub fn from_node_type(node_type: u16) -> Self {
		match node_type {
			1 => Self::Element,
			2 => Self::Attribute,
			3 => Self::Text,
			4 => Self::CdataSection,
			7 => Self::ProcessingInstruction,
			8 => Self::Comment,
			9 => Self::Document,
			10 => Self::DocumentType,
			// Entity references, entities, document fragments and notations.
			_ => Self::Unsupported,
		}
	}

	/// Whether records of this kind carry an ordered child list.
	#[must_use]
	pub fn is_container(self) -> bool {
		matches!(self, Self::Element | Self::Document)
	}
}

/// The unsequenced body of an `update` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
	pub id: NodeId,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parent_id: Option<NodeId>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub prev_sibling_id: Option<NodeId>,
	pub node_kind: NodeKind,
	pub name: String,
	#[serde(default)]
	pub value: Option<String>,
	#[serde(default, rename = "documentURI", skip_serializing_if = "Option::is_none")]
	pub document_uri: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub public_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub system_id: Option<String>,
}

impl NodeUpdate {
	/// A bare update without position or kind-specific fields.
	#[must_use]
	pub fn new(id: NodeId, node_kind: NodeKind, name: impl Into<String>, value: Option<String>) -> Self {
		Self {
			id,
			parent_id: None,
			prev_sibling_id: None,
			node_kind,
			name: name.into(),
			value,
			document_uri: None,
			public_id: None,
			system_id: None,
		}
	}

	#[must_use]
	pub fn with_parent(mut self, parent_id: NodeId, prev_sibling_id: Option<NodeId>) -> Self {
		self.parent_id = Some(parent_id);
		self.prev_sibling_id = prev_sibling_id;
		self
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WireMessage {
	/// Sent by the background broker to the popup once both sides are ready.
	#[serde(rename = "connection", rename_all = "camelCase")]
	Connect { tab_id: i32 },
	Update {
		sequence: u64,
		#[serde(flatten)]
		node: NodeUpdate,
	},
	Remove { sequence: u64, id: NodeId },
	/// Popup to listener: everything up to and including `sequence` has been applied.
	Received { sequence: u64 },
}

impl WireMessage {
	/// The reorder key of sequenced (`update` and `remove`) messages.
	#[must_use]
	pub fn sequence(&self) -> Option<u64> {
		match *self {
			Self::Update { sequence, .. } | Self::Remove { sequence, .. } => Some(sequence),
			Self::Connect { .. } | Self::Received { .. } => None,
		}
	}

	/// Converts into a plain JavaScript object suitable for `postMessage`.
	///
	/// # Errors
	///
	/// Iff serialization or `JSON.parse` fails.
	pub fn to_js(&self) -> Result<JsValue, Error> {
		let text = serde_json::to_string(self)?;
		js_sys::JSON::parse(&text).map_err(Error::from_js)
	}

	/// Reads a message received from a port or `runtime.onMessage`.
	///
	/// # Errors
	///
	/// Iff `value` isn't a JSON-serializable object of this schema.
	pub fn from_js(value: &JsValue) -> Result<Self, Error> {
		let text: String = js_sys::JSON::stringify(value).map_err(Error::from_js)?.into();
		Ok(serde_json::from_str(&text)?)
	}
}

/// An outbound message that hasn't been assigned its sequence number yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
	Update(NodeUpdate),
	Remove(NodeId),
}

/// Assigns per-connection sequence numbers, starting at 0.
///
/// Stamping happens when a message is handed to the transport, not when its mutation was observed.
#[derive(Debug, Default)]
pub struct Sequencer {
	next: u64,
}

impl Sequencer {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn stamp(&mut self, outbound: Outbound) -> WireMessage {
		let sequence = self.next;
		self.next += 1;
		match outbound {
			Outbound::Update(node) => WireMessage::Update { sequence, node },
			Outbound::Remove(id) => WireMessage::Remove { sequence, id },
		}
	}

	/// How many messages were stamped so far.
	#[must_use]
	pub fn issued(&self) -> u64 {
		self.next
	}
}
