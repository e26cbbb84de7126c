//! Reachability pruning: only the entry point's transitive closure is
//! emitted, force-included members always are, and `tw(...)` literals feed
//! the style-class set.

mod common;

use common::{analyze_modules, analyze_src, transpile_src};
use pretty_assertions::assert_eq;
use pyrite::BundleMode;

#[test]
fn unreached_functions_are_not_emitted() {
    let js = transpile_src(
        "
@js
def used():
    return 1

@js
def orphan():
    return 2

@js
def main():
    used()
",
    )
    .unwrap();
    assert!(js.contains("function used"), "reached function missing:\n{js}");
    assert!(!js.contains("orphan"), "unreached function leaked:\n{js}");
}

#[test]
fn force_included_members_are_emitted_without_calls() {
    let js = transpile_src(
        "
@js
class Widget:
    @js(include=True)
    def helper(self):
        return 1

    def unused(self):
        return 2

@js
def main():
    w = Widget()
",
    )
    .unwrap();
    assert!(js.contains("helper()"), "force-included member missing:\n{js}");
    assert!(!js.contains("unused"), "unreached member leaked:\n{js}");
}

#[test]
fn include_survives_overriding_a_force_included_base_member() {
    let js = transpile_src(
        "
@js
class Base:
    @js(include=True)
    def refresh(self):
        return 1

@js
class Child(Base):
    def refresh(self):
        return 2

@js
def main():
    c = Child()
",
    )
    .unwrap();
    assert!(
        js.contains("class Child extends Base"),
        "child class missing:\n{js}"
    );
    // the override inherits the base member's force-include
    let child_part = js.split("class Child").nth(1).unwrap_or_default();
    assert!(child_part.contains("refresh()"), "override not included:\n{js}");
}

#[test]
fn builtins_are_never_emitted() {
    let js = transpile_src(
        "
@js
def main():
    print(len([1, 2]))
",
    )
    .unwrap();
    assert!(!js.contains("class int"), "builtin class leaked:\n{js}");
    assert!(!js.contains("function len"), "builtin function leaked:\n{js}");
}

#[test]
fn tw_literals_feed_the_style_class_set() {
    let analysis = analyze_modules(&[
        (
            "style",
            "
@js
def tw(classes: str) -> dict[str, str]:
    return {'class': classes}
",
        ),
        (
            "app",
            "
from style import tw

@js
def main():
    tw('mt-4 text-lg mt-4')
",
        ),
    ])
    .unwrap();
    let styles: Vec<&str> = analysis.styles.iter().map(String::as_str).collect();
    assert_eq!(styles, vec!["mt-4", "text-lg"]);
}

#[test]
fn imports_emit_only_referenced_objects() {
    let bundle = analyze_modules(&[
        (
            "lib",
            "
@js
def used():
    return 1

@js
def ignored():
    return 2
",
        ),
        (
            "app",
            "
from lib import used, ignored

@js
def main():
    used()
",
        ),
    ])
    .unwrap()
    .into_bundle(BundleMode::EsModules)
    .unwrap();
    let app = &bundle.modules["app"];
    assert!(
        app.contains("import { used } from './lib.js';"),
        "missing import:\n{app}"
    );
    let lib = &bundle.modules["lib"];
    assert!(lib.contains("function used"), "imported function missing:\n{lib}");
    assert!(!lib.contains("ignored"), "unreferenced import leaked:\n{lib}");
}

#[test]
fn module_constants_are_lifted_and_pruned() {
    let js = transpile_src(
        "
greeting = 'hello'
farewell = 'bye'

@js
def main():
    print(greeting)
",
    )
    .unwrap();
    assert!(
        js.contains("export const greeting = 'hello';"),
        "missing lifted constant:\n{js}"
    );
    assert!(!js.contains("farewell"), "unreferenced constant leaked:\n{js}");
}

#[test]
fn assigning_a_new_type_through_a_foreign_receiver_is_an_error() {
    let err = analyze_src(
        "
@js
class Holder:
    def __init__(self):
        self.value = 9

@js
class Other:
    def __init__(self, h: Holder):
        self.h = h
        self.h.value = 'text'

@js
def main():
    o = Other(Holder())
",
    )
    .unwrap_err();
    assert_eq!(err.kind, pyrite::ErrorKind::TypeMismatch);
}

#[test]
fn redefining_a_base_attribute_on_the_current_self_succeeds() {
    let js = transpile_src(
        "
@js
class Base:
    def __init__(self):
        self.slot = 9

@js
class Child(Base):
    def __init__(self):
        super().__init__()
        self.slot = 'name'

@js
def main():
    c = Child()
",
    )
    .unwrap();
    assert!(js.contains("this.slot = 'name';"), "redefinition missing:\n{js}");
}
