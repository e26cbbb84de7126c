//! HTML serialization for server-rendered trees.
//!
//! The dev server invokes the SL entry point itself and hands the resulting
//! virtual tree to this serializer. Nodes carry a tag name, an attribute map,
//! a dataset map and children; void elements self-close, text children are
//! emitted verbatim and element children are recursed with indentation.

use indexmap::IndexMap;

use crate::writer::SourceWriter;

/// One node of a pre-rendered element tree.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ElementNode {
    pub tag: String,
    pub attributes: IndexMap<String, String>,
    /// Emitted as `data-*` attributes.
    pub dataset: IndexMap<String, String>,
    pub children: Vec<HtmlChild>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum HtmlChild {
    Element(ElementNode),
    Text(String),
}

impl ElementNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn data(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.dataset.insert(name.into(), value.into());
        self
    }

    pub fn child(mut self, child: ElementNode) -> Self {
        self.children.push(HtmlChild::Element(child));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(HtmlChild::Text(text.into()));
        self
    }
}

/// Serializes a tree to a well-formed fragment.
pub fn render(node: &ElementNode) -> String {
    let mut w = SourceWriter::new();
    write_element(node, &mut w);
    let mut out = w.finish();
    out.push('\n');
    out
}

fn write_element(node: &ElementNode, w: &mut SourceWriter) {
    let mut start = format!("<{}", node.tag.to_lowercase());
    for (name, value) in &node.attributes {
        start.push_str(&format!(" {name}=\"{value}\""));
    }
    for (name, value) in &node.dataset {
        start.push_str(&format!(" data-{name}=\"{value}\""));
    }
    if node.children.is_empty() {
        start.push_str("/>");
        w.fill(&start);
        return;
    }
    start.push('>');
    w.fill(&start);
    w.indent();
    for child in &node.children {
        match child {
            HtmlChild::Element(element) => write_element(element, w),
            HtmlChild::Text(text) => w.fill(text),
        }
    }
    w.dedent();
    w.fill(&format!("</{}>", node.tag.to_lowercase()));
}

/// Builds the standard page scaffold around a pre-rendered body.
pub fn page(body: ElementNode, js_href: &str, css_href: &str, script_type: &str) -> String {
    let document = ElementNode::new("html")
        .child(
            ElementNode::new("head")
                .child(ElementNode::new("meta").attr("charset", "utf-8"))
                .child(ElementNode::new("link").attr("rel", "stylesheet").attr("href", css_href)),
        )
        .child(ElementNode::new("body").child(body))
        .child(
            ElementNode::new("script")
                .attr("type", script_type)
                .attr("src", js_href)
                .text(" "),
        );
    render(&document)
}
