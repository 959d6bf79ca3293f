#![cfg(target_arch = "wasm32")]

use dom_mirror::{
	encoder::{MutationEncoder, Observation},
	id::NodeId,
	mirror::MirrorState,
	wire::{NodeKind, WireMessage},
};
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, Document, Element, Node};

wasm_bindgen_test_configure!(run_in_browser);

static mut LOG_INITIALIZED: bool = false;

fn init_log() {
	unsafe {
		if !LOG_INITIALIZED {
			tracing_wasm::set_as_global_default();
			LOG_INITIALIZED = true;
		}
	}
}

/// `<!DOCTYPE html><html><head></head><body></body></html>`, detached from the test page.
fn blank_document() -> Document {
	window().unwrap().document().unwrap().implementation().unwrap().create_html_document().unwrap()
}

fn child_names(state: &MirrorState, id: &NodeId) -> Vec<String> {
	let tree = state.tree();
	tree.get(id).unwrap().child_ids.iter().map(|child_id| tree.get(child_id).unwrap().name.clone()).collect()
}

fn apply_all(state: &mut MirrorState, messages: &mut Vec<WireMessage>) {
	for message in messages.drain(..) {
		state.process_message(message);
	}
}

#[wasm_bindgen_test]
fn initial_walk_is_in_document_order() {
	init_log();

	let document = blank_document();
	let mut encoder = MutationEncoder::new();
	let mut sent = Vec::new();
	encoder.push_initial_document(&document, &mut |message| sent.push(message));

	let kinds: Vec<_> = sent
		.iter()
		.map(|message| match message {
			WireMessage::Update { node, .. } => (node.node_kind, node.name.clone()),
			other => panic!("unexpected {:?}", other),
		})
		.collect();
	assert_eq!(
		kinds,
		[
			(NodeKind::Document, "#document".to_owned()),
			(NodeKind::DocumentType, "html".to_owned()),
			(NodeKind::Element, "HTML".to_owned()),
			(NodeKind::Element, "HEAD".to_owned()),
			(NodeKind::Element, "BODY".to_owned()),
		]
	);
	let sequences: Vec<_> = sent.iter().filter_map(WireMessage::sequence).collect();
	assert_eq!(sequences, [0, 1, 2, 3, 4]);
	assert_eq!(encoder.issued(), 5);

	let mut state = MirrorState::new(None);
	apply_all(&mut state, &mut sent);
	let root_id = state.tree().root_id().unwrap().clone();
	assert_eq!(child_names(&state, &root_id), ["html", "HTML"]);
}

#[wasm_bindgen_test]
fn buffers_mutations_until_initial_walk() {
	init_log();

	let document = blank_document();
	let body: Node = document.body().unwrap().into();
	let div = document.create_element("div").unwrap();
	div.set_attribute("title", "x").unwrap();
	div.append_child(&document.create_text_node("text")).unwrap();
	body.append_child(&div).unwrap();

	let mut encoder = MutationEncoder::new();
	let mut sent = Vec::new();
	encoder.observe(
		vec![Observation::ChildList {
			target: Some(body.clone()),
			added: vec![div.clone().into()],
			removed: Vec::new(),
		}],
		&mut |message| sent.push(message),
	);
	assert!(sent.is_empty());

	encoder.push_initial_document(&document, &mut |message| sent.push(message));
	let sequences: Vec<_> = sent.iter().filter_map(WireMessage::sequence).collect();
	assert_eq!(sequences, (0..sent.len() as u64).collect::<Vec<_>>());

	// The buffered observation repeats what the walk already sent, which is harmless.
	let mut state = MirrorState::new(None);
	apply_all(&mut state, &mut sent);
	let div_id = encoder.registry().lookup(div.as_ref()).unwrap();
	let body_id = encoder.registry().lookup(&body).unwrap();
	assert_eq!(child_names(&state, &body_id), ["DIV"]);
	assert_eq!(child_names(&state, &div_id), ["#text"]);
	assert_eq!(state.tree().get(&div_id).unwrap().attribute_ids.len(), 1);
}

#[wasm_bindgen_test]
fn encodes_mutations() {
	init_log();

	let document = blank_document();
	let body: Element = document.body().unwrap().into();
	let body_node: &Node = body.as_ref();
	let mut encoder = MutationEncoder::new();
	let mut state = MirrorState::new(None);
	let mut sent = Vec::new();
	encoder.push_initial_document(&document, &mut |message| sent.push(message));
	apply_all(&mut state, &mut sent);
	let body_id = encoder.registry().lookup(body_node).unwrap();

	// Insertion after an existing sibling.
	let first = document.create_element("p").unwrap();
	let second = document.create_element("span").unwrap();
	body.append_child(&first).unwrap();
	body.append_child(&second).unwrap();
	encoder.observe(
		vec![Observation::ChildList {
			target: Some(body_node.clone()),
			added: vec![first.clone().into(), second.clone().into()],
			removed: Vec::new(),
		}],
		&mut |message| sent.push(message),
	);
	match &sent[1] {
		WireMessage::Update { node, .. } => assert_eq!(node.prev_sibling_id, encoder.registry().lookup(first.as_ref())),
		other => panic!("unexpected {:?}", other),
	}
	apply_all(&mut state, &mut sent);
	assert_eq!(child_names(&state, &body_id), ["P", "SPAN"]);

	// Attribute set, then removed.
	second.set_attribute("lang", "en").unwrap();
	encoder.observe(
		vec![Observation::Attributes {
			target: second.clone(),
			name: "lang".to_owned(),
		}],
		&mut |message| sent.push(message),
	);
	apply_all(&mut state, &mut sent);
	let second_id = encoder.registry().lookup(second.as_ref()).unwrap();
	assert_eq!(state.tree().get(&second_id).unwrap().attribute_ids.len(), 1);

	second.remove_attribute("lang").unwrap();
	encoder.observe(
		vec![Observation::Attributes {
			target: second.clone(),
			name: "lang".to_owned(),
		}],
		&mut |message| sent.push(message),
	);
	apply_all(&mut state, &mut sent);
	assert!(state.tree().get(&second_id).unwrap().attribute_ids.is_empty());

	// Character data.
	let text: Node = document.create_text_node("before").into();
	second.append_child(&text).unwrap();
	encoder.observe(
		vec![Observation::ChildList {
			target: Some(second.clone().into()),
			added: vec![text.clone()],
			removed: Vec::new(),
		}],
		&mut |message| sent.push(message),
	);
	text.set_node_value(Some("after"));
	encoder.observe(vec![Observation::CharacterData { target: text.clone() }], &mut |message| sent.push(message));
	apply_all(&mut state, &mut sent);
	let text_id = encoder.registry().lookup(&text).unwrap();
	assert_eq!(state.tree().get(&text_id).unwrap().value.as_deref(), Some("after"));

	second.set_attribute("title", "kept").unwrap();
	encoder.observe(
		vec![Observation::Attributes {
			target: second.clone(),
			name: "title".to_owned(),
		}],
		&mut |message| sent.push(message),
	);
	apply_all(&mut state, &mut sent);
	let title_id = state.tree().get(&second_id).unwrap().attribute_ids[0].clone();

	// Subtree removal forgets every id in it.
	body.remove_child(&second).unwrap();
	encoder.observe(
		vec![Observation::ChildList {
			target: Some(body_node.clone()),
			added: Vec::new(),
			removed: vec![second.clone().into()],
		}],
		&mut |message| sent.push(message),
	);
	assert!(matches!(sent.as_slice(), [WireMessage::Remove { id, .. }] if id == &second_id));
	apply_all(&mut state, &mut sent);
	assert_eq!(child_names(&state, &body_id), ["P"]);
	assert!(!state.tree().contains(&text_id));
	assert_eq!(encoder.registry().lookup(second.as_ref()), None);
	assert_eq!(encoder.registry().lookup(&text), None);
	assert!(!state.tree().contains(&title_id));

	// Reinsertion mints fresh ids, attributes included.
	body.append_child(&second).unwrap();
	encoder.observe(
		vec![Observation::ChildList {
			target: Some(body_node.clone()),
			added: vec![second.clone().into()],
			removed: Vec::new(),
		}],
		&mut |message| sent.push(message),
	);
	let reinserted_ids: Vec<_> = sent
		.iter()
		.map(|message| match message {
			WireMessage::Update { node, .. } => node.id.clone(),
			other => panic!("unexpected {:?}", other),
		})
		.collect();
	assert_eq!(reinserted_ids.len(), 3);
	for stale in &[&second_id, &title_id, &text_id] {
		assert!(!reinserted_ids.contains(stale), "{} was reused", stale);
	}
	apply_all(&mut state, &mut sent);
	let reinserted_id = encoder.registry().lookup(second.as_ref()).unwrap();
	let title = &state.tree().get(&reinserted_id).unwrap().attribute_ids;
	assert_eq!(title.len(), 1);
	assert_ne!(title[0], title_id);
	assert_eq!(child_names(&state, &body_id), ["P", "SPAN"]);

	// Removing something that was never mirrored sends nothing.
	let stranger: Node = document.create_element("i").unwrap().into();
	encoder.observe(
		vec![Observation::ChildList {
			target: Some(body_node.clone()),
			added: Vec::new(),
			removed: vec![stranger],
		}],
		&mut |message| sent.push(message),
	);
	assert!(sent.is_empty());
	assert_eq!(state.last_applied(), Some(encoder.issued() - 1));
}
