//! Expression evaluation: literals without a tree, paths and overlays over
//! one, and the error taxonomy at the query boundary

use crate::{eval_standalone, ErrorKind, Value};

use super::{open, to_bytes};

const PAIR_SPEC: &str = "
    let u32 = [4] byte <> integer { @signed: false; @endian: 'little'; };

    let Contents = struct {
        a: u32;
        b: u32;
    };

    file {
        contents_struct: Contents;
    }
";

fn pair_data() -> Vec<u8> {
    to_bytes("01 00 00 00 02 00 00 00")
}

#[test]
fn integer_literals() {
    assert_eq!(eval_standalone("0").unwrap(), Value::Integer(0));
    assert_eq!(eval_standalone("1").unwrap(), Value::Integer(1));
    assert_eq!(eval_standalone("123456789").unwrap(), Value::Integer(123456789));
    assert_eq!(
        eval_standalone("42000000000000").unwrap(),
        Value::Integer(42000000000000)
    );
    assert_eq!(eval_standalone("07").unwrap(), Value::Integer(7));
    assert_eq!(eval_standalone("01234567").unwrap(), Value::Integer(0o1234567));
    assert_eq!(eval_standalone("0xdeadbeef").unwrap(), Value::Integer(0xdeadbeef));
    assert_eq!(
        eval_standalone("0xdeadbeefbadf00d").unwrap(),
        Value::Integer(0xdeadbeefbadf00d)
    );

    for bad in ["0abc", "0xffeeg", "42a", "08"] {
        let err = eval_standalone(bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Spec, "{bad} should not lex");
    }
}

#[test]
fn string_literals() {
    assert_eq!(
        eval_standalone("\"hi\"").unwrap(),
        Value::String("hi".into())
    );
    assert_eq!(
        eval_standalone("'hello'").unwrap(),
        Value::String("hello".into())
    );
    assert_eq!(
        eval_standalone(r"'how\nare\nyou'").unwrap(),
        Value::String("how\nare\nyou".into())
    );
    assert_eq!(
        eval_standalone(r"'\r\t\n'").unwrap(),
        Value::String("\r\t\n".into())
    );
    assert_eq!(
        eval_standalone("'multi'' ' 'part' ' ''string'").unwrap(),
        Value::String("multi part string".into())
    );
    // A bare identifier is not a string; without a tree it resolves nowhere
    assert_eq!(
        eval_standalone("hello").unwrap_err().kind(),
        ErrorKind::Reference
    );
}

#[test]
fn literal_arithmetic() {
    assert_eq!(eval_standalone("2 + 3 * 4").unwrap(), Value::Integer(14));
    assert_eq!(eval_standalone("(2 + 3) * 4").unwrap(), Value::Integer(20));
    assert_eq!(eval_standalone("7 % 3").unwrap(), Value::Integer(1));
    assert_eq!(eval_standalone("1 == 1").unwrap(), Value::Bool(true));
    assert_eq!(eval_standalone("2 < 1").unwrap(), Value::Bool(false));
    assert_eq!(eval_standalone("len('abc')").unwrap(), Value::Integer(3));
    assert_eq!(
        eval_standalone("1 / 0").unwrap_err().kind(),
        ErrorKind::Range
    );
}

#[test]
fn paths_and_overlays() {
    let tree = open(PAIR_SPEC, pair_data());
    assert_eq!(tree.eval("contents_struct.a").unwrap().as_int().unwrap(), 1);
    assert_eq!(tree.eval("contents_struct.b").unwrap().as_int().unwrap(), 2);
    assert_eq!(
        tree.eval("contents_struct.a <> [] byte").unwrap().as_bytes().unwrap(),
        vec![1, 0, 0, 0]
    );
    assert_eq!(
        tree.eval("(contents_struct.a <> [] byte)[..]").unwrap().as_bytes().unwrap(),
        vec![1, 0, 0, 0]
    );
    assert_eq!(
        tree.eval("(contents_struct.a <> [] byte)[1 .. 3]").unwrap().as_bytes().unwrap(),
        vec![0, 0]
    );
}

#[test]
fn round_trip_identity() {
    let tree = open(PAIR_SPEC, pair_data());
    // Slicing a bytes view and re-overlaying the same type recovers the value
    assert_eq!(
        tree.eval("(contents_struct.a <> [] byte) <> u32").unwrap().as_int().unwrap(),
        1
    );
    assert_eq!(
        tree.eval("((contents_struct <> [] byte)[4 .. 8]) <> u32").unwrap().as_int().unwrap(),
        2
    );
}

#[test]
fn sizeof_nodes_and_types() {
    let tree = open(PAIR_SPEC, pair_data());
    assert_eq!(tree.eval("sizeof(contents_struct)").unwrap().as_int().unwrap(), 8);
    assert_eq!(tree.eval("sizeof(contents_struct.a)").unwrap().as_int().unwrap(), 4);
    assert_eq!(tree.eval("sizeof (u32)").unwrap().as_int().unwrap(), 4);
    assert_eq!(tree.eval("sizeof(Contents)").unwrap().as_int().unwrap(), 8);
    assert_eq!(
        tree.eval("sizeof(contents_struct.a) == sizeof (u32)").unwrap().value().unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn error_taxonomy() {
    let tree = open(PAIR_SPEC, pair_data());
    assert_eq!(
        tree.eval("this_field_does_not_exist").unwrap_err().kind(),
        ErrorKind::Reference
    );
    assert_eq!(
        tree.eval("contents_struct[42]").unwrap_err().kind(),
        ErrorKind::Type
    );
    assert_eq!(
        tree.eval("contents_struct.a.b").unwrap_err().kind(),
        ErrorKind::Type
    );
    assert_eq!(
        tree.eval("len(contents_struct.a)").unwrap_err().kind(),
        ErrorKind::Type
    );
    assert_eq!(
        tree.eval("contents_struct +").unwrap_err().kind(),
        ErrorKind::Spec
    );
}

#[test]
fn struct_level_lets_resolve_in_scope() {
    let spec = "
        let u32 = [4] byte <> integer { @signed: false; @endian: 'little'; };

        file {
            payload: [] byte;

            let first = payload[0 .. sizeof (u32)] <> u32;
            let second = payload[sizeof (u32) .. 2 * sizeof (u32)] <> u32;
        }
    ";
    let tree = open(spec, pair_data());
    assert_eq!(tree.eval("first").unwrap().as_int().unwrap(), 1);
    assert_eq!(tree.eval("second").unwrap().as_int().unwrap(), 2);
    assert_eq!(
        tree.eval("first + second").unwrap().as_int().unwrap(),
        3
    );
}

#[test]
fn slices_check_their_bounds() {
    let tree = open(PAIR_SPEC, pair_data());
    let bytes = tree.eval("contents_struct <> [] byte").unwrap();
    let bytes = bytes.node().unwrap();
    assert_eq!(bytes.len().unwrap(), 8);
    assert_eq!(bytes.slice(0, 8).unwrap().len().unwrap(), 8);
    assert_eq!(bytes.slice(8, 8).unwrap().len().unwrap(), 0);
    assert_eq!(bytes.slice(3, 2).unwrap_err().kind(), ErrorKind::Range);
    assert_eq!(bytes.slice(0, 9).unwrap_err().kind(), ErrorKind::Range);
    assert_eq!(bytes.at(7).unwrap().as_int().unwrap(), 0);
    assert_eq!(bytes.at(8).unwrap_err().kind(), ErrorKind::Range);
}

#[test]
fn size_matches_location_outside_filters() {
    let tree = open(PAIR_SPEC, pair_data());
    for expr in ["contents_struct", "contents_struct.a", "contents_struct.b"] {
        let node = tree.eval(expr).unwrap();
        let node = node.node().unwrap();
        let (_, length) = node.location().unwrap();
        assert_eq!(node.size().unwrap(), length, "{expr}");
    }
}
