//! Prints a [`Snapshot`] as indented source text.

use crate::{
	id::NodeId,
	tree::{Details, NodeRecord, Snapshot},
	wire::NodeKind,
};
use core::fmt::Write as _;
use tracing::{error, warn};

const INDENT: &str = "  ";

/// Renders the mirrored document. A snapshot without root renders as the empty string.
#[must_use]
pub fn render(snapshot: &Snapshot, depth_limit: usize) -> String {
	let mut out = String::new();
	if let Some(root_id) = &snapshot.root_id {
		render_node(snapshot, root_id, 0, depth_limit, &mut out);
	}
	out
}

fn render_node(snapshot: &Snapshot, id: &NodeId, depth: usize, depth_limit: usize, out: &mut String) {
	if depth >= depth_limit {
		return error!("Depth limit reached");
	}
	let node = match snapshot.nodes.get(id) {
		Some(node) => node,
		None => return warn!(%id, "Child record missing from snapshot. Skipping."),
	};

	let indent = INDENT.repeat(depth);
	match node.kind {
		NodeKind::Document => {
			match &node.details {
				Details::Document { document_uri: Some(uri) } => writeln!(out, "{}#document ({})", indent, uri),
				_ => writeln!(out, "{}#document", indent),
			}
			.ok();
			for child_id in &node.child_ids {
				render_node(snapshot, child_id, depth, depth_limit, out);
			}
		}
		NodeKind::Element => {
			out.push_str(&indent);
			out.push('<');
			out.push_str(&node.name);
			render_attributes(snapshot, node, out);
			if node.child_ids.is_empty() {
				writeln!(out, "></{}>", node.name).ok();
			} else {
				out.push_str(">\n");
				for child_id in &node.child_ids {
					render_node(snapshot, child_id, depth + 1, depth_limit, out);
				}
				writeln!(out, "{}</{}>", indent, node.name).ok();
			}
		}
		NodeKind::Text => {
			let text = node.value.as_deref().unwrap_or_default().trim();
			if !text.is_empty() {
				writeln!(out, "{}{}", indent, text).ok();
			}
		}
		NodeKind::CdataSection => {
			writeln!(out, "{}<![CDATA[{}]]>", indent, node.value.as_deref().unwrap_or_default()).ok();
		}
		NodeKind::Comment => {
			writeln!(out, "{}<!--{}-->", indent, node.value.as_deref().unwrap_or_default()).ok();
		}
		NodeKind::ProcessingInstruction => {
			writeln!(out, "{}<?{} {}?>", indent, node.name, node.value.as_deref().unwrap_or_default()).ok();
		}
		NodeKind::DocumentType => {
			match &node.details {
				Details::DocumentType { public_id, system_id } if !public_id.is_empty() => {
					writeln!(out, "{}<!DOCTYPE {} PUBLIC \"{}\" \"{}\">", indent, node.name, public_id, system_id)
				}
				Details::DocumentType { system_id, .. } if !system_id.is_empty() => writeln!(out, "{}<!DOCTYPE {} SYSTEM \"{}\">", indent, node.name, system_id),
				_ => writeln!(out, "{}<!DOCTYPE {}>", indent, node.name),
			}
			.ok();
		}
		NodeKind::Attribute | NodeKind::Unsupported => {
			writeln!(out, "{}<!-- unsupported node: {:?} -->", indent, node.kind).ok();
		}
	}
}

fn render_attributes(snapshot: &Snapshot, element: &NodeRecord, out: &mut String) {
	for attribute_id in &element.attribute_ids {
		let attribute = match snapshot.nodes.get(attribute_id) {
			Some(attribute) => attribute,
			None => {
				warn!(%attribute_id, "Attribute record missing from snapshot. Skipping.");
				continue;
			}
		};
		match &attribute.value {
			Some(value) if !value.is_empty() => write!(out, " {}=\"{}\"", attribute.name, escape_attribute(value)),
			_ => write!(out, " {}", attribute.name),
		}
		.ok();
	}
}

fn escape_attribute(value: &str) -> String {
	value.replace('&', "&amp;").replace('"', "&quot;")
}
