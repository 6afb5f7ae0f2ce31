//! A keyed record store: length-prefixed keys and values, field enumeration
//! and index totality

use crate::ErrorKind;

use super::{open, to_bytes};

const KEYED_SPEC: &str = "
    let u32 = [4] byte <> integer { @signed: false; @endian: 'big'; };

    let Entry = struct {
        flags:      byte <> integer { @signed: false; };
        key_size:   u32;
        key_value:  [key_size] byte <> string;
        value_size: u32;
        value:      [value_size] byte;
    };

    file {
        values: [] Entry;
    }
";

fn keyed_data() -> Vec<u8> {
    to_bytes(
        r#"
        00  00 00 00 05 "color"         00 00 00 03 "red"
        00  00 00 00 04 "size"          00 00 00 08 "two feet"
        00  00 00 00 0B "description"   00 00 00 1C "A nice dwarf with a long axe"
        "#,
    )
}

#[test]
fn entries_iterate_in_order() {
    let tree = open(KEYED_SPEC, keyed_data());
    let values = tree.root().field("values").unwrap();
    assert_eq!(values.len().unwrap(), 3);

    let expected_keys = ["color", "size", "description"];
    let mut iterations = 0;
    for (entry, expected) in values.iter().unwrap().zip(expected_keys) {
        assert_eq!(entry.field("key_value").unwrap().as_str().unwrap(), expected);
        iterations += 1;
    }
    assert_eq!(iterations, 3);
}

#[test]
fn field_names_enumerate_in_declaration_order() {
    let tree = open(KEYED_SPEC, keyed_data());
    let values = tree.root().field("values").unwrap();
    for entry in values.iter().unwrap() {
        assert_eq!(
            entry.keys().unwrap(),
            ["flags", "key_size", "key_value", "value_size", "value"]
        );
    }
    let first = values.at(0).unwrap();
    assert_eq!(first.field("flags").unwrap().as_int().unwrap(), 0);
    assert_eq!(first.field("key_size").unwrap().as_int().unwrap(), 5);
    assert_eq!(first.field("key_value").unwrap().as_str().unwrap(), "color");
    assert_eq!(first.field("value_size").unwrap().as_int().unwrap(), 3);
    assert_eq!(first.field("value").unwrap().as_bytes().unwrap(), b"red");
}

#[test]
fn index_totality() {
    let tree = open(KEYED_SPEC, keyed_data());
    let values = tree.root().field("values").unwrap();
    let len = values.len().unwrap();
    for i in 0..len {
        assert!(values.at(i).is_ok());
    }
    assert_eq!(values.at(len).unwrap_err().kind(), ErrorKind::Range);
    assert_eq!(values.at(len + 39).unwrap_err().kind(), ErrorKind::Range);
    // Negative indices are consistently range errors
    assert_eq!(tree.eval("values[0 - 1]").unwrap_err().kind(), ErrorKind::Range);
}

#[test]
fn missing_fields_are_range_errors() {
    let tree = open(KEYED_SPEC, keyed_data());
    let entry = tree.eval("values[1]").unwrap();
    let entry = entry.node().unwrap();
    assert_eq!(entry.field("key_value").unwrap().as_str().unwrap(), "size");
    let err = entry.field("foo").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Range);
    assert!(err.to_string().contains("foo"), "{err}");
    // Indexing a struct is a type error, not a range error
    assert_eq!(entry.at(42).unwrap_err().kind(), ErrorKind::Type);
}

#[test]
fn values_decode_through_their_filters() {
    let tree = open(KEYED_SPEC, keyed_data());
    assert_eq!(
        tree.eval("values[1].value").unwrap().as_str().unwrap(),
        "two feet"
    );
    assert!(tree
        .eval("values[1].key_value == 'size'")
        .unwrap()
        .value()
        .unwrap()
        .truthy());
    assert_eq!(
        tree.eval("values[2].key_size").unwrap().as_int().unwrap(),
        11
    );
}
