use dom_mirror::{
	id::NodeId,
	wire::{NodeKind, NodeUpdate, Outbound, Sequencer, WireMessage},
};
use serde_json::json;

#[test]
fn update_schema() {
	let mut node = NodeUpdate::new(NodeId::from("a"), NodeKind::Text, "#text", Some("hi".to_owned())).with_parent(NodeId::from("p"), Some(NodeId::from("s")));
	node.document_uri = None;
	let message = WireMessage::Update { sequence: 4, node };
	assert_eq!(
		serde_json::to_value(&message).unwrap(),
		json!({
			"type": "update",
			"sequence": 4,
			"id": "a",
			"parentId": "p",
			"prevSiblingId": "s",
			"nodeKind": "text",
			"name": "#text",
			"value": "hi",
		})
	);
}

#[test]
fn document_schema() {
	let mut node = NodeUpdate::new(NodeId::from("d"), NodeKind::Document, "#document", None);
	node.document_uri = Some("https://example.com/".to_owned());
	let value = serde_json::to_value(&WireMessage::Update { sequence: 0, node }).unwrap();
	assert_eq!(value["documentURI"], "https://example.com/");
	assert_eq!(value["nodeKind"], "document");
	assert!(value.get("parentId").is_none());
	assert!(value["value"].is_null());
}

#[test]
fn other_messages() {
	assert_eq!(
		serde_json::to_value(&WireMessage::Remove {
			sequence: 9,
			id: NodeId::from("x")
		})
		.unwrap(),
		json!({ "type": "remove", "sequence": 9, "id": "x" })
	);
	assert_eq!(
		serde_json::to_value(&WireMessage::Connect { tab_id: 12 }).unwrap(),
		json!({ "type": "connection", "tabId": 12 })
	);
	assert_eq!(
		serde_json::to_value(&WireMessage::Received { sequence: 3 }).unwrap(),
		json!({ "type": "received", "sequence": 3 })
	);
}

#[test]
fn decodes_kinds() {
	let message: WireMessage = serde_json::from_value(json!({
		"type": "update",
		"sequence": 1,
		"id": "t",
		"parentId": "d",
		"nodeKind": "documentType",
		"name": "html",
		"publicId": "",
		"systemId": "",
	}))
	.unwrap();
	match message {
		WireMessage::Update { sequence, node } => {
			assert_eq!(sequence, 1);
			assert_eq!(node.node_kind, NodeKind::DocumentType);
			assert_eq!(node.value, None);
			assert_eq!(node.prev_sibling_id, None);
			assert_eq!(node.public_id.as_deref(), Some(""));
		}
		other => panic!("unexpected {:?}", other),
	}

	let kind: NodeKind = serde_json::from_value(json!("entityReference")).unwrap();
	assert_eq!(kind, NodeKind::Unsupported);
	let kind: NodeKind = serde_json::from_value(json!("cdataSection")).unwrap();
	assert_eq!(kind, NodeKind::CdataSection);
}

#[test]
fn rejects_malformed_messages() {
	assert!(serde_json::from_value::<WireMessage>(json!({})).is_err());
	assert!(serde_json::from_value::<WireMessage>(json!({ "type": "remove", "id": "x" })).is_err());
	assert!(serde_json::from_value::<WireMessage>(json!({ "type": "explode", "sequence": 0 })).is_err());
}

#[test]
fn node_types() {
	assert_eq!(NodeKind::from_node_type(1), NodeKind::Element);
	assert_eq!(NodeKind::from_node_type(3), NodeKind::Text);
	assert_eq!(NodeKind::from_node_type(9), NodeKind::Document);
	assert_eq!(NodeKind::from_node_type(11), NodeKind::Unsupported);
	assert!(NodeKind::Element.is_container());
	assert!(NodeKind::Document.is_container());
	assert!(!NodeKind::Text.is_container());
}

#[test]
fn sequencer_stamps_at_send_time() {
	let mut sequencer = Sequencer::new();
	let first = sequencer.stamp(Outbound::Remove(NodeId::from("b")));
	let second = sequencer.stamp(Outbound::Update(NodeUpdate::new(NodeId::from("a"), NodeKind::Comment, "#comment", None)));
	assert_eq!(first.sequence(), Some(0));
	assert_eq!(second.sequence(), Some(1));
	assert_eq!(sequencer.issued(), 2);
	assert_eq!(WireMessage::Connect { tab_id: 1 }.sequence(), None);
}
