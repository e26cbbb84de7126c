//! Narrowing, rewriting hooks, isolated method re-parse, and the closed
//! decorator surface.

mod common;

use common::{analyze_src, analyze_types, assert_text, transpile_src};
use pretty_assertions::assert_eq;
use pyrite::{ErrorKind, parse_isolated_method, parse_source};

#[test]
fn isinstance_narrowing_refines_branch_types() {
    let js = transpile_src(
        "
@js
def describe(value: object):
    if isinstance(value, str):
        print(value.strip())
    else:
        print(value)

@js
def main():
    describe('padded ')
",
    )
    .unwrap();
    assert!(
        js.contains("if ((typeof value === 'string')) {"),
        "missing isinstance rewrite:\n{js}"
    );
    assert!(js.contains("console.log(value.trim())"), "narrowed dispatch missing:\n{js}");
}

#[test]
fn assert_isinstance_narrows_following_statements() {
    let types = analyze_types(
        "
@js
def takes(value: object):
    assert isinstance(value, str)
    return value.strip()

@js
def main():
    takes('x')
",
    )
    .unwrap();
    assert!(
        types.contains("return value.[str]strip!()"),
        "narrowed strip dispatch missing:\n{types}"
    );
}

#[test]
fn augmented_assignment_lowers_to_the_operator_pair() {
    assert_text(
        "
        a: int = 1
        a = a.[int]__add__!(2)
        ",
        &common::analyze_line("a = 1;a += 2").unwrap(),
    );
}

#[test]
fn while_loops_coerce_their_condition() {
    let js = transpile_src(
        "
@js
def main():
    n = 3
    while n:
        n = n - 1
",
    )
    .unwrap();
    assert!(js.contains("while (n) {"), "missing bool coercion:\n{js}");
    assert!(js.contains("n = n - 1;"), "missing loop body:\n{js}");
}

#[test]
fn containment_swaps_operands_onto_the_container() {
    let js = transpile_src(
        "
@js
def main():
    l = ['a', 'b']
    if 'a' in l:
        print('found')
    if 'c' not in l:
        print('missing')
",
    )
    .unwrap();
    assert!(js.contains("if (l.includes('a')) {"), "missing containment swap:\n{js}");
    assert!(js.contains("if (!l.includes('c')) {"), "missing negated containment:\n{js}");
}

#[test]
fn free_function_rewrites() {
    let js = transpile_src(
        "
@js
def main():
    print(bin(5))
    print(hasattr([1], 'length'))
",
    )
    .unwrap();
    assert!(js.contains("('0b'+(5).toString(2))"), "missing bin rewrite:\n{js}");
    assert!(js.contains("'length' in [1]"), "missing hasattr rewrite:\n{js}");
}

#[test]
fn client_hook_replaces_the_translated_body() {
    let js = transpile_src(
        "
@js
def stamp():
    return 'server'

@stamp.client
def stamp_client():
    return 'client'

@js
def main():
    print(stamp())
",
    )
    .unwrap();
    assert!(js.contains("return 'client';"), "client body missing:\n{js}");
    assert!(!js.contains("'server'"), "server body leaked:\n{js}");
}

#[test]
fn source_hook_splices_raw_tl_text() {
    let js = transpile_src(
        "
@js(source=\"return Date.now();\")
def now() -> int:
    pass

@js
def main():
    print(now())
",
    )
    .unwrap();
    assert!(js.contains("return Date.now();"), "raw body missing:\n{js}");
}

#[test]
fn append_directive_emits_an_epilogue() {
    let js = transpile_src(
        "
@js(append=\"Registry.add(Thing);\")
class Thing:
    def __init__(self):
        self.x = 1

@js
def main():
    t = Thing()
",
    )
    .unwrap();
    assert!(js.contains("Registry.add(Thing);"), "epilogue missing:\n{js}");
}

#[test]
fn unknown_decorators_are_unsupported() {
    let err = parse_source("@mystery\ndef f():\n    pass\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unsupported);
    assert!(err.message.contains("mystery"), "got: {}", err.message);
}

#[test]
fn multiple_inheritance_is_unsupported() {
    let err = parse_source("class C(A, B):\n    pass\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unsupported);
}

#[test]
fn methods_reparse_in_isolation_with_line_offsets() {
    let source = "    def area(self) -> int:\n        return self.w * self.h\n";
    let method = parse_isolated_method(source, "Rect", 14).unwrap();
    assert_eq!(method.name, "area");
    // positions map back to the original file
    assert_eq!(method.loc.line, 14);
}

#[test]
fn variadics_become_tuple_and_dict_slots() {
    let types = analyze_types(
        "
@js
def collect(*items: str, **options: int):
    return items

@js
def main():
    collect('a')
",
    )
    .unwrap();
    assert!(
        types.contains("*items: tuple[str]"),
        "vararg typing missing:\n{types}"
    );
    assert!(
        types.contains("**options: dict[str, int]"),
        "kwarg typing missing:\n{types}"
    );
}

#[test]
fn keyword_arguments_emit_a_trailing_object() {
    let js = transpile_src(
        "
@js
def resize(w: int, h=1):
    return w * h

@js
def main():
    print(resize(10, h=2))
",
    )
    .unwrap();
    assert!(js.contains("resize(10, {h: 2})"), "missing keyword bag:\n{js}");
}

#[test]
fn entry_point_must_exist() {
    let err = analyze_src("x = 1\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NameResolution);
    assert!(err.message.contains("entry point"), "got: {}", err.message);
}
