//! Annotation round-trip scenarios: inference output serialized back to
//! SL-style text.

mod common;

use common::{analyze_line, analyze_types, assert_text};
use pretty_assertions::assert_eq;
use pyrite::ErrorKind;

#[test]
fn basic_assignment() {
    assert_eq!(analyze_line("a = 9").unwrap(), "a: int = 9");
}

#[test]
fn chained_assignment_expands_in_reverse() {
    assert_text(
        "
        c: int = 9
        b: int = c
        a: int = b
        ",
        &analyze_line("a = b = c = 9").unwrap(),
    );
}

#[test]
fn reassignment_declares_once() {
    assert_text(
        "
        a: int = 9
        b: int = 10
        a = b
        ",
        &analyze_line("a = 9;a = b = 10").unwrap(),
    );
}

#[test]
fn explicit_annotations() {
    assert_eq!(analyze_line("b: str = ''").unwrap(), "b: str = ''");
    assert_eq!(analyze_line("c: list[str] = []").unwrap(), "c: list[str] = []");
    assert_eq!(
        analyze_line("c: list[int | list[int]] = []").unwrap(),
        "c: list[int | list[int]] = []"
    );
    assert_eq!(
        analyze_line("d: dict[str, str | int] = {}").unwrap(),
        "d: dict[str, str | int] = {}"
    );
}

#[test]
fn inferred_annotations() {
    assert_eq!(analyze_line("b = ''").unwrap(), "b: str = ''");
    assert_eq!(analyze_line("c = ['']").unwrap(), "c: list[str] = ['']");
    assert_eq!(analyze_line("c = [9, [10]]").unwrap(), "c: list[int | list[int]] = [9, [10]]");
    assert_eq!(
        analyze_line("d = {'foo': 'baz', 'bar': 9}").unwrap(),
        "d: dict[str, str | int] = {'foo': 'baz', 'bar': 9}"
    );
}

#[test]
fn empty_literal_without_annotation_is_underspecified() {
    let err = analyze_line("c = []").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Underspecified);
    assert!(
        err.message.contains("Concrete type could not be determined"),
        "unexpected message: {}",
        err.message
    );
}

#[test]
fn conditionals_insert_bool_coercion() {
    assert_text(
        "
        def main():
            a: int = 9
            if a.[int]__eq__!(9):
                print('a is 9')
            elif a.[int]__bool__!():
                print('a has value')
            else:
                print('no value')
        ",
        &analyze_types(
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
fn for_loop_binds_element_type() {
    assert_text(
        "
        def main():
            l: list[str] = ['a', 'b', 'c']
            for i in l:
                print(i)
        ",
        &analyze_types(
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
fn int_comparators_dispatch_inline() {
    for (op, method) in [
        ("<", "__lt__"),
        ("<=", "__le__"),
        (">", "__gt__"),
        (">=", "__ge__"),
        ("==", "__eq__"),
        ("!=", "__ne__"),
    ] {
        let expected = format!("a: int = 1\nb: int = 2\nc: bool = a.[int]{method}!(b)");
        assert_eq!(analyze_line(&format!("a = 1;b = 2;c = a {op} b")).unwrap(), expected);
    }
}

#[test]
fn int_operators_dispatch_inline() {
    for (op, method) in [
        ("+", "__add__"),
        ("-", "__sub__"),
        ("*", "__mul__"),
        ("/", "__truediv__"),
        ("//", "__floordiv__"),
        ("**", "__mod__"),
    ] {
        let expected = format!("a: int = 1\nb: int = 2\nc: int = a.[int]{method}!(b)");
        assert_eq!(analyze_line(&format!("a = 1;b = 2;c = a {op} b")).unwrap(), expected);
    }
}

#[test]
fn str_operators_pick_reflected_for_swapped_operands() {
    assert_text(
        "
        a: str = 'a'
        b: str = a.[str]__mul__!(3)
        c: str = a.[str]__rmul__!(3)
        ",
        &analyze_line("a = 'a';b = a * 3;c = 3 * a").unwrap(),
    );
    assert_text(
        "
        a: str = 'a'
        b: str = a.[str]__add__!('b')
        ",
        &analyze_line("a = 'a';b = a + 'b'").unwrap(),
    );
}

#[test]
fn comparator_defined_only_on_right_side_swaps_operands() {
    for (op, reflected) in [
        ("<", "__gt__"),
        ("<=", "__ge__"),
        (">", "__lt__"),
        (">=", "__le__"),
        ("==", "__eq__"),
        ("!=", "__ne__"),
    ] {
        let src = format!(
            "
@js
class A:
    pass

@js
class B:
    def {reflected}(self, other: A) -> bool:
        pass

def main():
    a = A()
    b = B()
    c = a {op} b
"
        );
        let expected = format!(
            "
            class A:

            class B:

                def {reflected}(other: A) -> bool:

            def main():
                a: A = A()
                b: B = B()
                c: bool = b.[B]{reflected}(a)
            "
        );
        assert_text(&expected, &analyze_types(&src).unwrap());
    }
}

#[test]
fn operator_defined_on_left_side_wins() {
    let src = "
@js
class B:
    def __radd__(self, other: str):
        return other

@js
class A:
    def __add__(self, other: B):
        return self

def main():
    a = A()
    b = B()
    c = a + b
";
    assert_text(
        "
        class B:

            def __radd__(other: str) -> str:
                return other

        class A:

            def __add__(other: B) -> A:
                return self

        def main():
            a: A = A()
            b: B = B()
            c: A = a.[A]__add__(b)
        ",
        &analyze_types(src).unwrap(),
    );
}

#[test]
fn operator_rejecting_right_operand_falls_back_to_reflected() {
    for (op, method, reflected) in [
        ("+", "__add__", "__radd__"),
        ("-", "__sub__", "__rsub__"),
        ("*", "__mul__", "__rmul__"),
        ("/", "__truediv__", "__rtruediv__"),
        ("//", "__floordiv__", "__rfloordiv__"),
        ("**", "__mod__", "__rmod__"),
    ] {
        // the left method exists but its declared operand type rejects the
        // right side, the equivalent of returning NotImplemented
        let src = format!(
            "
@js
class A:
    def {method}(self, other: str):
        return self

@js
class B:
    def {reflected}(self, other: A):
        return other

def main():
    a = A()
    b = B()
    c = a {op} b
"
        );
        let expected = format!(
            "
            class A:

                def {method}(other: str) -> A:
                    return self

            class B:

                def {reflected}(other: A) -> A:
                    return other

            def main():
                a: A = A()
                b: B = B()
                c: A = b.[B]{reflected}(a)
            "
        );
        assert_text(&expected, &analyze_types(&src).unwrap());
    }
}

#[test]
fn equality_on_object_falls_through_to_right_side() {
    let src = "
@js
class A:
    pass

@js
class B:
    def __eq__(self, other: A) -> bool:
        pass

def main():
    a = A()
    b = B()
    c = a == b
";
    let types = analyze_types(src).unwrap();
    assert!(
        types.contains("c: bool = b.[B]__eq__(a)"),
        "expected reflected equality, got:\n{types}"
    );
}

#[test]
fn return_annotation_mismatch_is_an_error() {
    let err = analyze_types(
        "
@js
def broken() -> str:
    return 9

def main():
    broken()
",
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeMismatch);
}

#[test]
fn dependency_cycles_are_reported() {
    let err = analyze_types(
        "
@js
def first():
    return second()

@js
def second():
    return first()

def main():
    first()
",
    )
    .unwrap_err();
    assert!(err.message.contains("dependency cycle"), "got: {}", err.message);
}
