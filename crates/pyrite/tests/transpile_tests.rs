//! Emission end-to-end scenarios: SL in, TL text out.

mod common;

use common::{analyze_src, assert_text, transpile_src};
use pyrite::BundleMode;

#[test]
fn conditionals_emit_else_if_chain() {
    assert_text(
        "
        // app

        export function main() {
            var a = 9;
            if (a == 9) {
                console.log('a is 9');
            } else if (a) {
                console.log('a has value');
            } else {
                console.log('no value');
            }
        }
        ",
        &transpile_src(
            "
@js
def main():
    a = 9
    if a == 9:
        print('a is 9')
    elif a:
        print('a has value')
    else:
        print('no value')
",
        )
        .unwrap(),
    );
}

#[test]
fn for_loop_emits_for_of_over_array_literal() {
    assert_text(
        "
        // app

        export function main() {
            var l = ['a', 'b', 'c'];
            for (var i of l) {
                console.log(i);
            }
        }
        ",
        &transpile_src(
            "
@js
def main():
    l = ['a', 'b', 'c']
    for i in l:
        print(i)
",
        )
        .unwrap(),
    );
}

#[test]
fn class_statics_emit_static_fields_read_through_this() {
    let js = transpile_src(
        "
@js
class Base:
    MULTIPLIER = 2

    def action(self):
        print(self.MULTIPLIER)

@js
def main():
    b = Base()
    b.action()
",
    )
    .unwrap();
    assert!(js.contains("static MULTIPLIER = 2;"), "missing static field:\n{js}");
    assert!(js.contains("console.log(this.MULTIPLIER)"), "missing this access:\n{js}");
    assert!(js.contains("var b = new Base();"), "missing instantiation:\n{js}");
}

#[test]
fn generic_instantiation_references_the_specialization() {
    let js = transpile_src(
        "
@js
class Counter[T]:
    def __init__(self, items: T):
        self.items = items

    def add(self, num: int):
        return len(self.items) + num

@js
def main():
    c = Counter([1, 2])
    print(c.add(3))
",
    )
    .unwrap();
    assert!(
        js.contains("class Counter__list__int {"),
        "missing specialization:\n{js}"
    );
    assert!(
        js.contains("var c = new Counter__list__int([1, 2]);"),
        "missing specialized construction:\n{js}"
    );
    assert!(
        js.contains("return this.items.length + num;"),
        "missing inlined len/add:\n{js}"
    );
    assert!(js.contains("console.log(c.add(3))"), "missing dispatch:\n{js}");
    // the template itself must never be emitted
    assert!(!js.contains("class Counter {"), "template leaked:\n{js}");
}

#[test]
fn specialization_is_shared_between_paths() {
    // `list[int]` reached through an explicit subscript and through value
    // inference must be the same concrete class
    let js = transpile_src(
        "
@js
class Counter[T]:
    def __init__(self, items: T):
        self.items = items

@js
def main():
    inferred = Counter([1, 2])
    explicit = Counter[list[int]]([])
",
    )
    .unwrap();
    assert_eq!(
        js.matches("class Counter__list__int {").count(),
        1,
        "expected exactly one specialization:\n{js}"
    );
}

#[test]
fn constructor_and_self_rename() {
    assert_text(
        "
        // app

        export class Point {

            constructor(x, y) {
                this.x = x;
                this.y = y;
            }
        }

        export function main() {
            var p = new Point(1, 2);
            console.log(p.x);
        }
        ",
        &transpile_src(
            "
@js
class Point:
    def __init__(self, x: int, y: int):
        self.x = x
        self.y = y

@js
def main():
    p = Point(1, 2)
    print(p.x)
",
        )
        .unwrap(),
    );
}

#[test]
fn dict_literals_emit_map_construction() {
    let js = transpile_src(
        "
@js
def main():
    d = {'one': 1, 'two': 2}
    print(len(d))
",
    )
    .unwrap();
    assert!(
        js.contains("var d = new Map([['one', 1], ['two', 2]]);"),
        "missing map literal:\n{js}"
    );
    assert!(js.contains("console.log(d.size)"), "missing len rewrite:\n{js}"
    );
}

#[test]
fn defaulted_parameters_collapse_into_an_options_bag() {
    let js = transpile_src(
        "
@js
def greet(name: str, punct='!'):
    print(name + punct)

@js
def main():
    greet('hi')
",
    )
    .unwrap();
    assert!(
        js.contains("export function greet(name, { punct='!' } = {}) {"),
        "missing options bag:\n{js}"
    );
    assert!(js.contains("console.log(name + punct)"), "missing str concat:\n{js}");
}

#[test]
fn comprehensions_lower_to_map_calls() {
    let js = transpile_src(
        "
@js
def apply(items: list[int]):
    return [i + 1 for i in items]

@js
def main():
    print(apply([1, 2]))
",
    )
    .unwrap();
    assert!(
        js.contains("return items.map(i => i + 1);"),
        "missing comprehension lowering:\n{js}"
    );
}

#[test]
fn lambdas_emit_arrow_functions() {
    let js = transpile_src(
        "
@js
def main():
    f = lambda x: 9
",
    )
    .unwrap();
    assert!(js.contains("var f = (x) => 9;"), "missing arrow function:\n{js}");
}

#[test]
fn raise_emits_throw_of_the_exception_name() {
    let js = transpile_src(
        "
@js
def main():
    raise TypeError
",
    )
    .unwrap();
    assert!(js.contains("throw 'TypeError';"), "missing throw:\n{js}");
}

#[test]
fn subscripts_dispatch_through_getitem() {
    let js = transpile_src(
        "
@js
def main():
    l = [1, 2, 3]
    print(l[0])
    d = {'a': 1}
    print(d['a'])
",
    )
    .unwrap();
    assert!(js.contains("console.log(l[0])"), "missing list subscript:\n{js}");
    assert!(js.contains("console.log(d.get('a'))"), "missing map subscript:\n{js}");
}

#[test]
fn fstrings_emit_concatenation() {
    let js = transpile_src(
        "
@js
def main():
    n = 2
    print(f'count: {n}')
",
    )
    .unwrap();
    assert!(js.contains("console.log('count: '+n)"), "missing concat:\n{js}");
}

#[test]
fn inheritance_emits_extends_and_super() {
    let js = transpile_src(
        "
@js
class Base:
    def __init__(self):
        self.value = 9

    def action(self):
        print(self.value)

@js
class Child(Base):
    def __init__(self):
        super().__init__()
        self.word = 'x'

    def action(self):
        super().action()
        print(self.word)

@js
def main():
    c = Child()
    c.action()
",
    )
    .unwrap();
    assert!(js.contains("export class Child extends Base {"), "missing extends:\n{js}");
    assert!(js.contains("super();"), "missing super call:\n{js}");
    assert!(js.contains("super.action();"), "missing super method call:\n{js}");
    assert!(js.contains("this.word = 'x';"), "missing attribute write:\n{js}");
}

#[test]
fn loader_mode_wraps_exports() {
    let bundle = analyze_src(
        "
@js
def main():
    print('hi')
",
    )
    .unwrap()
    .into_bundle(BundleMode::Loader)
    .unwrap();
    let script = bundle.script.expect("loader mode produces a script");
    assert!(script.contains("const modules = new Map();"), "missing registry:\n{script}");
    assert!(
        script.contains("define('app', function (__export_js__, __import_js__) {"),
        "missing module registration:\n{script}"
    );
    assert!(script.contains("__export_js__.main = main;"), "missing export:\n{script}");
    assert!(script.contains("importModule('app').main();"), "missing invocation:\n{script}");
}
