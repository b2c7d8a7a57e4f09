use claim_dom::{
	claim::ClaimList,
	dom::Dom,
	hydrate::Hydrator,
	memory::{MemoryDom, MemoryNode},
};

mod tracing_;

fn setup() -> (MemoryDom, MemoryNode) {
	tracing_::init();
	let mut dom = MemoryDom::new();
	let body = dom.create_root();
	(dom, body)
}

#[test]
fn shuffled_server_render_is_reordered_once() {
	let (mut dom, body) = setup();
	dom.append_element(body, "footer", &[("id", "f")]);
	let stray = dom.create_comment("stray");
	dom.append_child(body, stray).unwrap();
	dom.append_element(body, "header", &[("id", "h")]);
	dom.append_element(body, "main", &[("id", "m")]);

	let mut hydrator = Hydrator::new(dom);
	let [header, main, footer] = hydrator
		.claim_children(body, |hydrator, nodes| {
			Ok([
				hydrator.claim_element(nodes, "HEADER", &["id"])?,
				hydrator.claim_element(nodes, "MAIN", &["id"])?,
				hydrator.claim_element(nodes, "FOOTER", &["id"])?,
			])
		})
		.unwrap();
	assert!(hydrator.is_hydrating());
	assert_eq!(hydrator.claims().get(header), Some(0));
	assert_eq!(hydrator.claims().get(main), Some(1));
	assert_eq!(hydrator.claims().get(footer), Some(2));

	for node in [header, main, footer] {
		hydrator.insert_hydration(body, node, None).unwrap();
	}
	hydrator.end_hydrating();

	let dom = hydrator.into_dom();
	assert_eq!(dom.inner_html(body), r#"<header id="h"></header><main id="m"></main><footer id="f"></footer>"#);
	assert_eq!(dom.moves(), 1);
	assert_eq!(dom.parent(stray), None);
}

#[test]
fn created_nodes_are_inserted_in_place() {
	let (mut dom, body) = setup();
	dom.append_element(body, "h1", &[]);
	dom.append_element(body, "footer", &[]);

	let mut hydrator = Hydrator::new(dom);
	let (h1, p, footer) = hydrator
		.claim_children(body, |hydrator, nodes| {
			let h1 = hydrator.claim_element(nodes, "H1", &[])?;
			let p = hydrator.claim_element(nodes, "P", &[])?;
			let footer = hydrator.claim_element(nodes, "FOOTER", &[])?;
			Ok((h1, p, footer))
		})
		.unwrap();
	assert_eq!(hydrator.dom().parent(p), None);

	hydrator.append_hydration(body, h1).unwrap();
	hydrator.append_hydration(body, p).unwrap();
	hydrator.append_hydration(body, footer).unwrap();
	hydrator.end_hydrating();

	assert_eq!(hydrator.dom().inner_html(body), "<h1></h1><p></p><footer></footer>");
	assert_eq!(hydrator.dom().moves(), 0);
}

#[test]
fn nested_text_is_split_and_trimmed() {
	let (mut dom, body) = setup();
	let server_h1 = dom.append_element(body, "h1", &[]);
	dom.append_text(server_h1, "Raised 250 of 1000");

	let mut hydrator = Hydrator::new(dom);
	let (h1, text) = hydrator
		.claim_children(body, |hydrator, nodes| {
			let h1 = hydrator.claim_element(nodes, "H1", &[])?;
			let mut h1_nodes = hydrator.children(h1);
			let text = hydrator.claim_text(&mut h1_nodes, "Raised 250")?;
			h1_nodes.detach_remaining(hydrator.dom_mut());
			Ok((h1, text))
		})
		.unwrap();

	hydrator.append_hydration(body, h1).unwrap();
	hydrator.append_hydration(h1, text).unwrap();
	hydrator.end_hydrating();

	assert_eq!(h1, server_h1);
	assert_eq!(hydrator.dom().inner_html(body), "<h1>Raised 250</h1>");
	assert_eq!(hydrator.claims().get(text), Some(0));
}

#[test]
fn unordered_head_nodes_are_stepped_over() {
	let (mut dom, document) = setup();
	let head = dom.append_element(document, "head", &[]);
	let meta = dom.append_element(head, "meta", &[("charset", "utf-8")]);
	let title = dom.append_element(head, "title", &[]);

	let mut hydrator = Hydrator::new(dom);
	hydrator.start_hydrating();
	let mut head_nodes = ClaimList::new(vec![title]);
	let claimed = hydrator.claim_element(&mut head_nodes, "TITLE", &[]).unwrap();
	hydrator.append_hydration(head, claimed).unwrap();
	hydrator.end_hydrating();

	assert_eq!(hydrator.dom().child_nodes(head), [meta, title]);
	assert_eq!(hydrator.dom().moves(), 0);
}

#[test]
fn plain_append_only_moves_misplaced_nodes() {
	let (mut dom, body) = setup();
	let a = dom.append_element(body, "a", &[]);
	let b = dom.append_element(body, "b", &[]);

	let mut hydrator = Hydrator::new(dom);
	hydrator.append_hydration(body, b).unwrap();
	assert_eq!(hydrator.dom().moves(), 0);

	hydrator.append_hydration(body, a).unwrap();
	hydrator.append_hydration(body, a).unwrap();
	assert_eq!(hydrator.dom().child_nodes(body), [b, a]);
	assert_eq!(hydrator.dom().moves(), 1);
}

#[test]
fn anchored_insert_skips_nodes_in_place() {
	let (mut dom, body) = setup();
	let a = dom.append_element(body, "a", &[]);
	let b = dom.append_element(body, "b", &[]);
	let c = dom.append_element(body, "i", &[]);

	let mut hydrator = Hydrator::new(dom);
	hydrator.insert_hydration(body, a, Some(b)).unwrap();
	assert_eq!(hydrator.dom().moves(), 0);

	hydrator.insert_hydration(body, c, Some(a)).unwrap();
	assert_eq!(hydrator.dom().child_nodes(body), [c, a, b]);
	assert_eq!(hydrator.dom().moves(), 1);
}

#[test]
fn attr_sets_and_removes() {
	let (mut dom, body) = setup();
	let progress = dom.append_element(body, "div", &[("style", "width: 10%")]);

	let mut hydrator = Hydrator::new(dom);
	hydrator.attr(progress, "style", Some("width: 25%")).unwrap();
	hydrator.attr(progress, "class", Some("bar")).unwrap();
	assert_eq!(hydrator.dom().get_attribute(progress, "style").as_deref(), Some("width: 25%"));
	assert_eq!(hydrator.dom().get_attribute(progress, "class").as_deref(), Some("bar"));

	hydrator.attr(progress, "style", None).unwrap();
	assert_eq!(hydrator.dom().attribute_names(progress), ["class"]);
}

#[test]
fn detach_is_idempotent() {
	let (mut dom, body) = setup();
	let node = dom.append_text(body, "x");

	let mut hydrator = Hydrator::new(dom);
	hydrator.detach(node).unwrap();
	hydrator.detach(node).unwrap();
	assert!(hydrator.dom().child_nodes(body).is_empty());
}

#[test]
fn each_hydration_reorders_a_container_once() {
	let (mut dom, body) = setup();
	let b = dom.append_element(body, "b", &[]);
	let a = dom.append_element(body, "a", &[]);

	let mut hydrator = Hydrator::new(dom);
	for _ in 0..2 {
		hydrator
			.claim_children(body, |hydrator, nodes| {
				hydrator.claim_element(nodes, "A", &[])?;
				hydrator.claim_element(nodes, "B", &[])
			})
			.unwrap();
		assert!(!hydrator.is_reordered(body));

		hydrator.append_hydration(body, a).unwrap();
		assert!(hydrator.is_reordered(body));
		hydrator.append_hydration(body, b).unwrap();
		assert_eq!(hydrator.dom().child_nodes(body), [a, b]);

		hydrator.end_hydrating();
		assert!(!hydrator.is_reordered(body));

		hydrator.dom_mut().insert_before(body, b, Some(a)).unwrap();
	}
}
