//! Stable ids for observed DOM nodes and attributes.

use crate::id::NodeId;
use js_sys::{Map, Object, WeakMap};
use tracing::trace;
use wasm_bindgen::{JsCast, JsValue, UnwrapThrowExt};
use web_sys::{Element, Node};

/// Remembers the id assigned to each observed DOM object without keeping it alive.
///
/// Both tables are [***WeakMap***](https://developer.mozilla.org/en-US/docs/Web/JavaScript/Reference/Global_Objects/WeakMap)s,
/// so entries disappear together with the DOM objects they are keyed on.
///
/// Attributes are additionally tracked by (lowercase) name on their owning element,
/// since engines may recreate the [***Attr***](https://developer.mozilla.org/en-US/docs/Web/API/Attr) object on every mutation.
#[derive(Debug)]
pub struct IdentityRegistry {
	ids: WeakMap,
	attribute_ids: WeakMap,
}

impl Default for IdentityRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl IdentityRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self {
			ids: WeakMap::new(),
			attribute_ids: WeakMap::new(),
		}
	}

	/// Returns the id of `node`, assigning a fresh one on first sight.
	///
	/// # Panics
	///
	/// Throws into JavaScript if `node` is `None`. Resolving an id for a missing object is a bug,
	/// and proceeding would corrupt identity assignment.
	pub fn get_or_assign(&self, node: Option<&Node>) -> NodeId {
		let node = node.expect_throw("Node anomaly: node is nullish");
		match self.lookup(node) {
			Some(id) => id,
			None => {
				let id = NodeId::generate();
				self.ids.set(key(node), &JsValue::from(&id));
				trace!(%id, node_type = node.node_type(), "Assigned id.");
				id
			}
		}
	}

	/// The id of `node`, if it was observed before.
	#[must_use]
	pub fn lookup(&self, node: &Node) -> Option<NodeId> {
		self.ids.get(key(node)).as_string().map(NodeId::from)
	}

	/// Invalidates the id of `node`. Returns whether it had one.
	///
	/// For elements, the ids of their attributes are invalidated too, so a reinserted element doesn't carry over old attribute ids.
	pub fn forget(&self, node: &Node) -> bool {
		if let Some(element) = node.dyn_ref::<Element>() {
			let attributes = element.attributes();
			for i in 0..attributes.length() {
				if let Some(attr) = attributes.item(i) {
					let attr: &Node = attr.as_ref();
					self.ids.delete(key(attr));
				}
			}
			self.attribute_ids.delete(key(node));
		}
		self.ids.delete(key(node))
	}

	/// Resolves the id of the attribute `name` on `element`.
	///
	/// The name-keyed side table is consulted first, so the id stays stable when the attribute object is replaced.
	/// If the attribute has vanished in the meantime, the last known id for the name is still returned.
	pub fn attribute_id(&self, element: &Element, name: &str) -> NodeId {
		let key_name = JsValue::from_str(&name.to_ascii_lowercase());
		let table = self.side_table(element);
		let known = table.get(&key_name).as_string().map(NodeId::from);

		let id = match (known, element.get_attribute_node(name)) {
			(Some(id), Some(attr)) => {
				let attr: &Node = attr.as_ref();
				self.ids.set(key(attr), &JsValue::from(&id));
				id
			}
			(Some(id), None) => id,
			(None, Some(attr)) => {
				let attr: &Node = attr.as_ref();
				self.get_or_assign(Some(attr))
			}
			(None, None) => NodeId::generate(),
		};
		table.set(&key_name, &JsValue::from(&id));
		id
	}

	fn side_table(&self, element: &Element) -> Map {
		let element: &Node = element.as_ref();
		let element = key(element);
		let existing = self.attribute_ids.get(element);
		if existing.is_undefined() {
			let table = Map::new();
			self.attribute_ids.set(element, &table);
			table
		} else {
			existing.unchecked_into()
		}
	}
}

fn key(node: &Node) -> &Object {
	node.as_ref()
}
