//! The popup-side mirror of the inspected document.

use crate::{
	id::NodeId,
	wire::{NodeKind, NodeUpdate},
};
use hashbrown::HashMap;
use thiserror::Error;
use tracing::{instrument, trace, warn};

/// Kind-specific fields of a [`NodeRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Details {
	None,
	Document { document_uri: Option<String> },
	DocumentType { public_id: String, system_id: String },
}

/// One mirrored DOM node or attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
	pub id: NodeId,
	pub kind: NodeKind,
	pub name: String,
	pub value: Option<String>,
	/// Document order. Only populated for [container](`NodeKind::is_container`) kinds.
	pub child_ids: Vec<NodeId>,
	/// Insertion order. Only populated for elements.
	pub attribute_ids: Vec<NodeId>,
	/// A relation, not ownership. `None` only for the root.
	pub parent_id: Option<NodeId>,
	pub details: Details,
}

impl NodeRecord {
	/// A detached record without children or attributes.
	#[must_use]
	pub fn new(id: NodeId, kind: NodeKind, name: impl Into<String>, value: Option<String>) -> Self {
		Self {
			id,
			kind,
			name: name.into(),
			value,
			child_ids: Vec::new(),
			attribute_ids: Vec::new(),
			parent_id: None,
			details: Details::None,
		}
	}

	/// Builds the stored record for an `update` message body.
	#[must_use]
	pub fn from_update(update: &NodeUpdate) -> Self {
		let mut record = Self::new(update.id.clone(), update.node_kind, update.name.clone(), update.value.clone());
		record.details = match update.node_kind {
			NodeKind::Document => Details::Document {
				document_uri: update.document_uri.clone(),
			},
			NodeKind::DocumentType => Details::DocumentType {
				public_id: update.public_id.clone().unwrap_or_default(),
				system_id: update.system_id.clone().unwrap_or_default(),
			},
			_ => Details::None,
		};
		record
	}
}

/// A detected but non-fatal inconsistency in incoming protocol data.
///
/// The operation that reports one leaves the tree unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Anomaly {
	#[error("root node update on {id}, but {existing} is already the root")]
	DuplicateRoot { id: NodeId, existing: NodeId },

	#[error("parent {parent_id} of {id} is not mirrored")]
	MissingParent { id: NodeId, parent_id: NodeId },

	#[error("parent {parent_id} of {id} is a {parent_kind:?}, which can't hold it")]
	InvalidParent { id: NodeId, parent_id: NodeId, parent_kind: NodeKind },

	#[error("{id} can't become a child of its own descendant {parent_id}")]
	Cycle { id: NodeId, parent_id: NodeId },

	#[error("{id} has no parent but isn't a document")]
	MissingParentId { id: NodeId },

	#[error("document {id} has parent {parent_id}; documents are always the root")]
	ParentedDocument { id: NodeId, parent_id: NodeId },

	#[error("unsupported node kind {kind:?} for {id}")]
	UnsupportedKind { id: NodeId, kind: NodeKind },

	#[error("removal of unknown node {id}")]
	UnknownNode { id: NodeId },
}

/// A consistent copy of the shadow tree, handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
	pub root_id: Option<NodeId>,
	pub nodes: HashMap<NodeId, NodeRecord>,
}

impl Snapshot {
	#[must_use]
	pub fn root(&self) -> Option<&NodeRecord> {
		self.root_id.as_ref().and_then(|id| self.nodes.get(id))
	}
}

/// The authoritative id → [`NodeRecord`] map.
///
/// # Invariants
///
/// - At most one record has no `parent_id`, and that is the root.
/// - Every id listed in some record's `child_ids` or `attribute_ids` names a record whose `parent_id` is that owner.
/// - No id appears in any `child_ids` or `attribute_ids` more than once.
#[derive(Debug, Default)]
pub struct ShadowTree {
	root_id: Option<NodeId>,
	nodes: HashMap<NodeId, NodeRecord>,
}

impl ShadowTree {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn root_id(&self) -> Option<&NodeId> {
		self.root_id.as_ref()
	}

	#[must_use]
	pub fn get(&self, id: &NodeId) -> Option<&NodeRecord> {
		self.nodes.get(id)
	}

	#[must_use]
	pub fn contains(&self, id: &NodeId) -> bool {
		self.nodes.contains_key(id)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	#[must_use]
	pub fn snapshot(&self) -> Snapshot {
		Snapshot {
			root_id: self.root_id.clone(),
			nodes: self.nodes.clone(),
		}
	}

	/// Applies the body of an `update` message, dispatching on its kind.
	///
	/// # Errors
	///
	/// Iff the update is anomalous, in which case the tree is unchanged.
	pub fn apply_update(&mut self, update: &NodeUpdate) -> Result<(), Anomaly> {
		let id = update.id.clone();
		match update.node_kind {
			NodeKind::Document => match &update.parent_id {
				None => self.upsert_node(NodeRecord::from_update(update), None, None),
				Some(parent_id) => Err(Anomaly::ParentedDocument {
					id,
					parent_id: parent_id.clone(),
				}),
			},
			NodeKind::Attribute => {
				let parent_id = update.parent_id.clone().ok_or(Anomaly::MissingParentId { id: id.clone() })?;
				if update.value.is_none() {
					// A vanished attribute value means the attribute was removed.
					return if self.contains(&id) { self.remove_node(&id) } else { Ok(()) };
				}
				self.upsert_attribute(NodeRecord::from_update(update), parent_id)
			}
			NodeKind::Element | NodeKind::Text | NodeKind::CdataSection | NodeKind::Comment | NodeKind::DocumentType | NodeKind::ProcessingInstruction => {
				let parent_id = update.parent_id.clone().ok_or(Anomaly::MissingParentId { id })?;
				self.upsert_node(NodeRecord::from_update(update), Some(parent_id), update.prev_sibling_id.as_ref())
			}
			NodeKind::Unsupported => Err(Anomaly::UnsupportedKind { id, kind: update.node_kind }),
		}
	}

	/// Inserts or relinks `record` immediately after `prev_sibling_id` in the parent's children, or at the front.
	///
	/// Any earlier occurrence of the id is unlinked first, so replays are idempotent and relinking moves the node.
	/// An existing record keeps its children and attributes.
	///
	/// # Errors
	///
	/// Iff this would be a second root, or the parent is missing or can't hold children.
	#[instrument(skip(self, record), fields(id = %record.id, kind = ?record.kind))]
	pub fn upsert_node(&mut self, mut record: NodeRecord, parent_id: Option<NodeId>, prev_sibling_id: Option<&NodeId>) -> Result<(), Anomaly> {
		let id = record.id.clone();
		let parent_id = match parent_id {
			None => {
				if prev_sibling_id.is_some() {
					warn!("Unexpected previous sibling on root update.");
				}
				match &self.root_id {
					Some(existing) if existing != &id => return Err(Anomaly::DuplicateRoot { id, existing: existing.clone() }),
					Some(_) => {
						if let Some(existing) = self.nodes.remove(&id) {
							record.child_ids = existing.child_ids;
							record.attribute_ids = existing.attribute_ids;
						}
					}
					None if self.nodes.contains_key(&id) => return Err(Anomaly::MissingParentId { id }),
					None => (),
				}
				record.parent_id = None;
				self.root_id = Some(id.clone());
				self.nodes.insert(id, record);
				return Ok(());
			}
			Some(parent_id) => parent_id,
		};

		match self.nodes.get(&parent_id) {
			None => return Err(Anomaly::MissingParent { id, parent_id }),
			Some(parent) if !parent.kind.is_container() => {
				return Err(Anomaly::InvalidParent {
					id,
					parent_id,
					parent_kind: parent.kind,
				})
			}
			Some(_) => (),
		}
		if self.is_ancestor(&id, &parent_id) {
			return Err(Anomaly::Cycle { id, parent_id });
		}

		if let Some(existing) = self.nodes.remove(&id) {
			if let Some(old_parent_id) = &existing.parent_id {
				if let Some(old_parent) = self.nodes.get_mut(old_parent_id) {
					old_parent.child_ids.retain(|child_id| child_id != &id);
				}
			}
			if self.root_id.as_ref() == Some(&id) {
				self.root_id = None;
			}
			record.child_ids = existing.child_ids;
			record.attribute_ids = existing.attribute_ids;
		}

		let parent = match self.nodes.get_mut(&parent_id) {
			Some(parent) => parent,
			None => return Err(Anomaly::MissingParent { id, parent_id }),
		};
		let index = match prev_sibling_id {
			None => 0,
			Some(prev_sibling_id) => match parent.child_ids.iter().position(|child_id| child_id == prev_sibling_id) {
				Some(position) => position + 1,
				None => {
					warn!(prev_sibling = %prev_sibling_id, "Previous sibling not found. Appending.");
					parent.child_ids.len()
				}
			},
		};
		parent.child_ids.insert(index, id.clone());
		trace!(parent = %parent_id, index, "Linked node.");

		record.parent_id = Some(parent_id);
		self.nodes.insert(id, record);
		Ok(())
	}

	/// Inserts or overwrites an attribute record and lists it on its element.
	///
	/// # Errors
	///
	/// Iff the parent is missing or isn't an element.
	#[instrument(skip(self, record), fields(id = %record.id, name = %record.name))]
	pub fn upsert_attribute(&mut self, mut record: NodeRecord, parent_id: NodeId) -> Result<(), Anomaly> {
		let id = record.id.clone();
		match self.nodes.get(&parent_id) {
			None => return Err(Anomaly::MissingParent { id, parent_id }),
			Some(parent) if parent.kind != NodeKind::Element => {
				return Err(Anomaly::InvalidParent {
					id,
					parent_id,
					parent_kind: parent.kind,
				})
			}
			Some(_) => (),
		}

		if let Some(existing) = self.nodes.get(&id) {
			if let Some(old_parent_id) = existing.parent_id.clone() {
				if old_parent_id != parent_id {
					if let Some(old_parent) = self.nodes.get_mut(&old_parent_id) {
						old_parent.attribute_ids.retain(|attribute_id| attribute_id != &id);
					}
				}
			}
		}

		let parent = match self.nodes.get_mut(&parent_id) {
			Some(parent) => parent,
			None => return Err(Anomaly::MissingParent { id, parent_id }),
		};
		if !parent.attribute_ids.contains(&id) {
			parent.attribute_ids.push(id.clone());
		}
		record.parent_id = Some(parent_id);
		self.nodes.insert(id, record);
		Ok(())
	}

	/// Removes an attribute, or a node together with its entire subtree and all attributes therein.
	///
	/// # Errors
	///
	/// Iff `id` isn't mirrored.
	#[instrument(skip(self))]
	pub fn remove_node(&mut self, id: &NodeId) -> Result<(), Anomaly> {
		let node = self.nodes.remove(id).ok_or_else(|| Anomaly::UnknownNode { id: id.clone() })?;

		if node.kind == NodeKind::Attribute {
			match node.parent_id.as_ref().and_then(|parent_id| self.nodes.get_mut(parent_id)) {
				Some(parent) => parent.attribute_ids.retain(|attribute_id| attribute_id != id),
				None => warn!("Removed attribute had no mirrored owner element."),
			}
			return Ok(());
		}

		match &node.parent_id {
			Some(parent_id) => {
				if let Some(parent) = self.nodes.get_mut(parent_id) {
					parent.child_ids.retain(|child_id| child_id != id);
				}
			}
			None => self.root_id = None,
		}

		self.remove_attributes(&node.attribute_ids);
		let mut work_stack = node.child_ids;
		let mut removed = 1_usize;
		while let Some(current_id) = work_stack.pop() {
			let current = match self.nodes.remove(&current_id) {
				Some(current) => current,
				None => {
					warn!(descendant = %current_id, "Descendant was already removed. Skipping.");
					continue;
				}
			};
			self.remove_attributes(&current.attribute_ids);
			work_stack.extend(current.child_ids);
			removed += 1;
		}
		trace!(removed, "Removed subtree.");
		Ok(())
	}

	fn remove_attributes(&mut self, attribute_ids: &[NodeId]) {
		for attribute_id in attribute_ids {
			if self.nodes.remove(attribute_id).is_none() {
				warn!(attribute = %attribute_id, "Attribute was already removed. Skipping.");
			}
		}
	}

	/// Whether `ancestor_id` is `id` or one of its ancestors.
	fn is_ancestor(&self, ancestor_id: &NodeId, id: &NodeId) -> bool {
		let mut current = Some(id);
		while let Some(current_id) = current {
			if current_id == ancestor_id {
				return true;
			}
			current = self.nodes.get(current_id).and_then(|node| node.parent_id.as_ref());
		}
		false
	}
}
