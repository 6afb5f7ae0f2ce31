//! End-to-end checks through the public facade: compile a spec, open a tree,
//! query it

use std::sync::Arc;

use binspect::{compile, ErrorKind, Tree};

fn hex(text: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut chars = text.chars().filter(|c| !c.is_whitespace());
    while let (Some(hi), Some(lo)) = (chars.next(), chars.next()) {
        bytes.push(u8::from_str_radix(&format!("{hi}{lo}"), 16).unwrap());
    }
    bytes
}

const LOG_SPEC: &str = "
    let FixInt = integer { signed: false; endian: 'little'; };

    file {
        head_blocks: [] LogBlock;
        tail_block: LogTailBlock;
    }

    let LogBlock = struct {
        records: [] Record;
        trailer: [] byte;
        @span: 32768;
    };

    let LogTailBlock = struct {
        records: [] Record;
    };

    let Record = struct {
        checksum: [4] byte <> FixInt;
        length:   [2] byte <> FixInt;
        rtype:    byte <> FixInt;
        data:     [length] byte <> string;
        @minspan: 7;
    };
";

#[test]
fn an_empty_log_has_empty_blocks() {
    let schema = compile(LOG_SPEC).unwrap();
    let tree = Tree::open(Vec::new(), Arc::new(schema)).unwrap();
    assert_eq!(tree.eval("len(head_blocks)").unwrap().as_int().unwrap(), 0);
    assert_eq!(
        tree.eval("len(tail_block.records)").unwrap().as_int().unwrap(),
        0
    );
    assert_eq!(tree.eval("sizeof(head_blocks)").unwrap().as_int().unwrap(), 0);
    assert_eq!(
        tree.eval("tail_block.records[0]").unwrap_err().kind(),
        ErrorKind::Range
    );
}

#[test]
fn a_short_record_log_decodes() {
    // One 12-byte record: checksum, length 5, type 1, "hello"
    let data = hex("0df0adba 0500 01 68656c6c6f");
    let schema = compile(LOG_SPEC).unwrap();
    let tree = Tree::open(data, Arc::new(schema)).unwrap();

    assert_eq!(tree.eval("len(tail_block.records)").unwrap().as_int().unwrap(), 1);
    assert_eq!(
        tree.eval("tail_block.records[0].checksum").unwrap().as_int().unwrap(),
        0xBAADF00D
    );
    assert_eq!(
        tree.eval("tail_block.records[0].data").unwrap().as_str().unwrap(),
        "hello"
    );
    assert_eq!(
        tree.eval("sizeof(tail_block.records[0])").unwrap().as_int().unwrap(),
        12
    );
    assert_eq!(tree.eval("sizeof(tail_block)").unwrap().as_int().unwrap(), 12);
}

#[test]
fn schemas_are_shared_across_trees() {
    let schema = Arc::new(compile(LOG_SPEC).unwrap());
    let first = Tree::open(hex("0df0adba 0000 01"), Arc::clone(&schema)).unwrap();
    let second = Tree::open(Vec::new(), Arc::clone(&schema)).unwrap();
    assert_eq!(
        first.eval("len(tail_block.records)").unwrap().as_int().unwrap(),
        1
    );
    assert_eq!(
        second.eval("len(tail_block.records)").unwrap().as_int().unwrap(),
        0
    );
}

#[test]
fn spec_errors_are_reported_before_any_data_is_read() {
    // Unresolved name
    assert!(compile("file { x: Missing; }").is_err());
    // Attribute type mismatch
    assert!(compile("let A = integer { signed: 3; };").is_err());
    // Syntax error with a caret diagnostic
    let err = compile("let A = struct {\n    oops oops\n};").unwrap_err();
    assert!(err.to_string().contains('^'), "{err}");
}

#[test]
fn nodes_report_kind_size_and_location() {
    let data = hex("0df0adba 0500 01 68656c6c6f");
    let schema = compile(LOG_SPEC).unwrap();
    let tree = Tree::open(data, Arc::new(schema)).unwrap();
    let record = tree.eval("tail_block.records[0]").unwrap();
    let record = record.node().unwrap();
    assert_eq!(record.kind().unwrap(), binspect::NodeKind::Struct);
    assert_eq!(record.size().unwrap(), 12);
    assert_eq!(record.location().unwrap(), (0, 12));
    assert_eq!(
        record.keys().unwrap(),
        ["checksum", "length", "rtype", "data"]
    );
    let labels: Vec<String> = record
        .entries()
        .unwrap()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(labels, ["checksum", "length", "rtype", "data"]);
}
