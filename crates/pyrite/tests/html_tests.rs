//! The HTML serializer contract: void elements self-close, text children are
//! verbatim, element children indent, dataset entries become data-* attributes.

mod common;

use common::assert_text;
use pyrite::{ElementNode, page, render};

#[test]
fn fragments_nest_with_indentation() {
    let tree = ElementNode::new("div")
        .attr("class", "card")
        .data("self-id", "ce1")
        .child(ElementNode::new("span").text("hello"))
        .child(ElementNode::new("input").attr("type", "text"));
    assert_text(
        r#"
        <div class="card" data-self-id="ce1">
            <span>
                hello
            </span>
            <input type="text"/>
        </div>
        "#,
        &render(&tree),
    );
}

#[test]
fn void_elements_self_close() {
    let tree = ElementNode::new("meta").attr("charset", "utf-8");
    assert_text(r#"<meta charset="utf-8"/>"#, &render(&tree));
}

#[test]
fn tag_names_are_lowercased() {
    let tree = ElementNode::new("DIV").text("x");
    let html = render(&tree);
    assert!(html.starts_with("<div>"), "got: {html}");
    assert!(html.trim_end().ends_with("</div>"), "got: {html}");
}

#[test]
fn page_scaffold_links_script_and_styles() {
    let html = page(ElementNode::new("div").text("app"), "app.main.js", "index.css", "module");
    assert!(html.contains(r#"<link rel="stylesheet" href="index.css"/>"#), "got: {html}");
    assert!(
        html.contains(r#"<script type="module" src="app.main.js">"#),
        "got: {html}"
    );
    assert!(html.contains("<body>"), "got: {html}");
}
