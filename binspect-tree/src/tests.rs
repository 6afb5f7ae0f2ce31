//! Shared fixtures for the scenario tests
//!
//! Byte fixtures are written in hex-dump notation: whitespace-separated hex
//! byte pairs, with quoted runs inserted verbatim as ASCII
//! (`09 'coolvalue'`).

use std::sync::Arc;

use crate::Tree;

mod exprs;
mod keyed;

pub(crate) fn to_bytes(text: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '\'' | '"' => {
                let quote = c;
                for c in chars.by_ref() {
                    if c == quote {
                        break;
                    }
                    bytes.push(c as u8);
                }
            }
            hi => {
                let lo = chars.next().expect("hex bytes come in pairs");
                let pair = [hi, lo].iter().collect::<String>();
                bytes.push(u8::from_str_radix(&pair, 16).expect("valid hex pair"));
            }
        }
    }
    bytes
}

pub(crate) fn open(spec: &str, data: Vec<u8>) -> Tree<'static> {
    let schema = binspect_schema::compile(spec).expect("spec compiles");
    Tree::open(data, Arc::new(schema)).expect("tree opens")
}

#[test]
fn to_bytes_notation() {
    assert_eq!(to_bytes("1b cc 27 c2"), vec![0x1b, 0xcc, 0x27, 0xc2]);
    assert_eq!(to_bytes("09 'ab' 00"), vec![0x09, b'a', b'b', 0x00]);
    assert_eq!(to_bytes("'\"q\"'"), vec![b'"', b'q', b'"']);
}
