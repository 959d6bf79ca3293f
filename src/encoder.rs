//! Turns DOM observations into sequenced wire messages.

use crate::{
	id::NodeId,
	registry::IdentityRegistry,
	wire::{NodeKind, NodeUpdate, Outbound, Sequencer, WireMessage},
};
use std::collections::VecDeque;
use tracing::{error, info, instrument, trace, trace_span, warn};
use wasm_bindgen::JsCast;
use web_sys::{Document, DocumentType, Element, MutationRecord, Node, NodeList};

/// One mutation, as far as the encoder is concerned.
#[derive(Debug, Clone)]
pub enum Observation {
	ChildList { target: Option<Node>, added: Vec<Node>, removed: Vec<Node> },
	Attributes { target: Element, name: String },
	CharacterData { target: Node },
}

impl Observation {
	/// Classifies a [***MutationRecord***](https://developer.mozilla.org/en-US/docs/Web/API/MutationRecord).
	///
	/// Records that lack the context needed for encoding are logged and yield `None`.
	#[must_use]
	pub fn from_record(record: &MutationRecord) -> Option<Self> {
		match record.type_().as_str() {
			"childList" => Some(Self::ChildList {
				target: record.target(),
				added: nodes(&record.added_nodes()),
				removed: nodes(&record.removed_nodes()),
			}),
			"attributes" => {
				let target = match record.target().and_then(|target| target.dyn_into::<Element>().ok()) {
					Some(target) => target,
					None => {
						error!("Attribute mutation record without target element. Ignoring.");
						return None;
					}
				};
				let name = match record.attribute_name() {
					Some(name) => name,
					None => {
						error!("Attribute mutation record without attribute name. Ignoring.");
						return None;
					}
				};
				Some(Self::Attributes { target, name })
			}
			"characterData" => match record.target() {
				Some(target) => Some(Self::CharacterData { target }),
				None => {
					error!("Character data mutation record without target. Ignoring.");
					None
				}
			},
			other => {
				error!("Unknown mutation record type {:?}. Ignoring.", other);
				None
			}
		}
	}
}

fn nodes(list: &NodeList) -> Vec<Node> {
	(0..list.length()).filter_map(|i| list.item(i)).collect()
}

/// The listener-side half of the protocol.
///
/// Observations are buffered until [`push_initial_document`](`MutationEncoder::push_initial_document`) has run,
/// so the receiver always learns about the document before any of its descendants.
/// Sequence numbers are assigned as each message is handed to `send`.
#[derive(Debug, Default)]
pub struct MutationEncoder {
	registry: IdentityRegistry,
	sequencer: Sequencer,
	initial_document_pushed: bool,
	cache: VecDeque<Observation>,
}

impl MutationEncoder {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn registry(&self) -> &IdentityRegistry {
		&self.registry
	}

	/// How many messages were sent so far.
	#[must_use]
	pub fn issued(&self) -> u64 {
		self.sequencer.issued()
	}

	/// Buffers a batch of observations, then encodes everything buffered if the initial document was pushed already.
	pub fn observe(&mut self, batch: impl IntoIterator<Item = Observation>, send: &mut dyn FnMut(WireMessage)) {
		self.cache.extend(batch);
		self.flush(send);
	}

	/// Walks the whole document in document order, then releases buffered observations.
	#[instrument(skip(self, document, send))]
	pub fn push_initial_document(&mut self, document: &Document, send: &mut dyn FnMut(WireMessage)) {
		let issued = self.issued();
		self.encode_subtree(None, document.as_ref(), send);
		info!("Pushed initial document as {} message(s).", self.issued() - issued);
		self.initial_document_pushed = true;
		self.flush(send);
	}

	fn flush(&mut self, send: &mut dyn FnMut(WireMessage)) {
		if !self.initial_document_pushed {
			return trace!(buffered = self.cache.len(), "Initial document pending. Buffering observations.");
		}
		while let Some(observation) = self.cache.pop_front() {
			match observation {
				Observation::ChildList { target, added, removed } => {
					let span = trace_span!("Encoding child list", added = added.len(), removed = removed.len());
					let _enter = span.enter();
					for node in &removed {
						self.encode_removed(node, send);
					}
					for node in &added {
						self.encode_subtree(target.as_ref(), node, send);
					}
				}
				Observation::Attributes { target, name } => {
					let span = trace_span!("Encoding attribute", name = name.as_str());
					let _enter = span.enter();
					self.encode_attribute(&target, &name, send);
				}
				Observation::CharacterData { target } => {
					let span = trace_span!("Encoding character data");
					let _enter = span.enter();
					self.encode_character_data(&target, send);
				}
			}
		}
	}

	fn emit(&mut self, outbound: Outbound, send: &mut dyn FnMut(WireMessage)) {
		send(self.sequencer.stamp(outbound));
	}

	/// Encodes `root` with `parent` as its parent, then each of its descendants in document order.
	fn encode_subtree(&mut self, parent: Option<&Node>, root: &Node, send: &mut dyn FnMut(WireMessage)) {
		self.encode_added(parent, root, send);
		if !root.has_child_nodes() {
			return;
		}

		let document = match root.dyn_ref::<Document>() {
			Some(document) => document.clone(),
			None => match root.owner_document() {
				Some(document) => document,
				None => return error!("Added node has no owner document. Skipping its descendants."),
			},
		};
		let iterator = match document.create_node_iterator(root) {
			Ok(iterator) => iterator,
			Err(error) => return error!("Failed to create node iterator: {:?}", error),
		};
		loop {
			let node = match iterator.next_node() {
				Ok(Some(node)) => node,
				Ok(None) => break,
				Err(error) => return error!("Node iteration failed: {:?}", error),
			};
			if node.is_same_node(Some(root)) {
				continue;
			}
			let parent = node.parent_node();
			self.encode_added(parent.as_ref(), &node, send);
		}
	}

	fn encode_added(&mut self, parent: Option<&Node>, node: &Node, send: &mut dyn FnMut(WireMessage)) {
		let node_type = node.node_type();
		let update = match NodeKind::from_node_type(node_type) {
			NodeKind::Document => {
				if parent.is_some() {
					warn!("Document reported with a parent. Mirroring it as the root.");
				}
				let id = self.registry.get_or_assign(Some(node));
				let mut update = NodeUpdate::new(id, NodeKind::Document, "#document", None);
				update.document_uri = node.dyn_ref::<Document>().and_then(|document| document.document_uri().ok());
				update
			}
			NodeKind::DocumentType => {
				let (parent_id, prev_sibling_id) = self.position(parent, node);
				let id = self.registry.get_or_assign(Some(node));
				let mut update = NodeUpdate::new(id, NodeKind::DocumentType, node.node_name(), None).with_parent(parent_id, prev_sibling_id);
				if let Some(doctype) = node.dyn_ref::<DocumentType>() {
					update.public_id = Some(doctype.public_id());
					update.system_id = Some(doctype.system_id());
				}
				update
			}
			NodeKind::Element => {
				let (parent_id, prev_sibling_id) = self.position(parent, node);
				let id = self.registry.get_or_assign(Some(node));
				NodeUpdate::new(id, NodeKind::Element, node.node_name(), None).with_parent(parent_id, prev_sibling_id)
			}
			kind @ NodeKind::Text | kind @ NodeKind::CdataSection | kind @ NodeKind::Comment | kind @ NodeKind::ProcessingInstruction => {
				let (parent_id, prev_sibling_id) = self.position(parent, node);
				let id = self.registry.get_or_assign(Some(node));
				NodeUpdate::new(id, kind, node.node_name(), node.node_value()).with_parent(parent_id, prev_sibling_id)
			}
			NodeKind::Attribute | NodeKind::Unsupported => {
				// Children of skipped nodes will surface as anomalies on the receiving end.
				return error!("Unimplemented node type {} added. Skipping.", node_type);
			}
		};
		trace!(id = %update.id, kind = ?update.node_kind, "Encoded added node.");
		self.emit(Outbound::Update(update), send);

		if let Some(element) = node.dyn_ref::<Element>() {
			let attributes = element.attributes();
			for i in 0..attributes.length() {
				if let Some(attribute) = attributes.item(i) {
					self.encode_attribute(element, &attribute.name(), send);
				}
			}
		}
	}

	/// Resolves the parent id and the id of the nearest previous sibling that was mirrored.
	fn position(&self, parent: Option<&Node>, node: &Node) -> (NodeId, Option<NodeId>) {
		let parent_id = self.registry.get_or_assign(parent);
		let mut sibling = node.previous_sibling();
		while let Some(current) = sibling {
			if let Some(id) = self.registry.lookup(&current) {
				return (parent_id, Some(id));
			}
			sibling = current.previous_sibling();
		}
		(parent_id, None)
	}

	fn encode_removed(&mut self, node: &Node, send: &mut dyn FnMut(WireMessage)) {
		let id = match self.registry.lookup(node) {
			Some(id) => id,
			None => return info!(node_type = node.node_type(), "Ignoring anomalous removal of a node that was never mirrored."),
		};
		let forgotten = self.forget_subtree(node);
		trace!(%id, forgotten, "Encoded removal.");
		self.emit(Outbound::Remove(id), send);
	}

	/// Invalidates the ids of `root` and all its descendants, so that they are minted anew if reinserted.
	fn forget_subtree(&self, root: &Node) -> usize {
		let mut forgotten = usize::from(self.registry.forget(root));
		let document = match root.owner_document() {
			Some(document) => document,
			None => return forgotten,
		};
		if let Ok(iterator) = document.create_node_iterator(root) {
			while let Ok(Some(node)) = iterator.next_node() {
				if !node.is_same_node(Some(root)) {
					forgotten += usize::from(self.registry.forget(&node));
				}
			}
		}
		forgotten
	}

	/// Re-reads the attribute's current value from `element`, since the mutation record may be stale by now.
	fn encode_attribute(&mut self, element: &Element, name: &str, send: &mut dyn FnMut(WireMessage)) {
		let element_node: &Node = element.as_ref();
		let parent_id = match self.registry.lookup(element_node) {
			Some(id) => id,
			None => return warn!(name, "Attribute changed on an element that was never mirrored. Skipping."),
		};
		let id = self.registry.attribute_id(element, name);
		let value = element.get_attribute(name);
		if cfg!(feature = "dangerous-logging") {
			trace!(%id, name, ?value, "Encoded attribute.");
		} else {
			trace!(%id, name, removed = value.is_none(), "Encoded attribute.");
		}
		self.emit(Outbound::Update(NodeUpdate::new(id, NodeKind::Attribute, name, value).with_parent(parent_id, None)), send);
	}

	fn encode_character_data(&mut self, node: &Node, send: &mut dyn FnMut(WireMessage)) {
		let kind = NodeKind::from_node_type(node.node_type());
		if !matches!(kind, NodeKind::Text | NodeKind::CdataSection | NodeKind::Comment | NodeKind::ProcessingInstruction) {
			return error!(?kind, "Character data changed on a node that isn't character data. Skipping.");
		}
		let id = match self.registry.lookup(node) {
			Some(id) => id,
			None => return warn!(?kind, "Character data changed on a node that was never mirrored. Skipping."),
		};
		let parent = match node.parent_node() {
			Some(parent) if self.registry.lookup(&parent).is_some() => parent,
			_ => return trace!(%id, "Character data changed on a detached node. Skipping."),
		};
		let (parent_id, prev_sibling_id) = self.position(Some(&parent), node);
		self.emit(Outbound::Update(NodeUpdate::new(id, kind, node.node_name(), node.node_value()).with_parent(parent_id, prev_sibling_id)), send);
	}
}
