//! Custom-element emission: `_create` constructors, registration epilogues,
//! generated hydration companions, and receiver-preserving method references.

mod common;

use common::analyze_modules;
use pyrite::BundleMode;

/// A minimal typed façade over the DOM, marked `builtin=True` so it is
/// analyzed but never emitted.
const DOM_SHIM: &str = "
@js(builtin=True)
class HTMLElement:
    def __init__(self):
        self.textContent = ''

    def addEventListener(self, event: str, listener: callable):
        pass

    def setAttribute(self, name: str, value: str):
        pass


@js(builtin=True)
class Document:
    def getElementById(self, id: str) -> HTMLElement:
        pass


document = Document()


@js(inline=\"document.createElement({name})\", builtin=True)
def tag(name: str) -> HTMLElement:
    pass


@js(builtin=True)
class CustomElement(HTMLElement):
    def __init__(self):
        super().__init__()

    @js(include=True)
    def get_data(self, name: str) -> str:
        pass
";

const APP: &str = "
from dom import HTMLElement, CustomElement, tag

@js
class ClickCounter(CustomElement):
    def __init__(self):
        super().__init__()
        self.count = 0
        self.display = tag('span')
        self.display.addEventListener('click', self.on_click)

    def on_click(self):
        self.count = self.count + 1

@js
def main():
    c = ClickCounter()
";

fn emitted_app() -> String {
    analyze_modules(&[("dom", DOM_SHIM), ("app", APP)])
        .unwrap()
        .emit("app", BundleMode::EsModules)
        .unwrap()
}

#[test]
fn custom_element_constructor_becomes_create() {
    let js = emitted_app();
    assert!(js.contains("_create() {"), "missing _create:\n{js}");
    assert!(js.contains("return this;"), "missing receiver return:\n{js}");
    assert!(js.contains("super._create();"), "missing super lowering:\n{js}");
    assert!(
        js.contains("var c = new ClickCounter()._create();"),
        "missing construction lowering:\n{js}"
    );
}

#[test]
fn custom_element_registers_its_tag() {
    let js = emitted_app();
    assert!(
        js.contains("customElements.define('click-counter', ClickCounter);"),
        "missing registration epilogue:\n{js}"
    );
}

#[test]
fn hydration_companion_rebinds_elements_and_listeners() {
    let js = emitted_app();
    assert!(js.contains("_hydrate() {"), "missing hydration companion:\n{js}");
    assert!(
        js.contains("const self_id = this.get_data('self-id');"),
        "missing self id lookup:\n{js}"
    );
    assert!(
        js.contains("this.display = document.getElementById(self_id+'-display');"),
        "missing element rebinding:\n{js}"
    );
    // the listener wiring re-runs inside the companion
    assert_eq!(
        js.matches("this.display.addEventListener('click', this.on_click.bind(this));")
            .count(),
        2,
        "listener should be attached in _create and _hydrate:\n{js}"
    );
}

#[test]
fn method_references_bind_their_receiver() {
    let js = emitted_app();
    assert!(
        js.contains("this.on_click.bind(this)"),
        "missing bind on method reference:\n{js}"
    );
}

#[test]
fn shim_classes_are_not_emitted() {
    let js = emitted_app();
    assert!(!js.contains("class HTMLElement"), "shim leaked:\n{js}");
    assert!(!js.contains("class Document"), "shim leaked:\n{js}");
    let dom = analyze_modules(&[("dom", DOM_SHIM), ("app", APP)])
        .unwrap()
        .emit("dom", BundleMode::EsModules)
        .unwrap();
    assert!(!dom.contains("class"), "shim module should be empty:\n{dom}");
}
