//! Binspect is a declarative binary-format interpreter: describe how bytes
//! are structured in a small spec language, bind the spec to a byte buffer,
//! and navigate the resulting lazy data tree.
//!
//! ```
//! use std::sync::Arc;
//! use binspect::{compile, Tree};
//!
//! let schema = compile(
//!     "
//!     let u16 = [2] byte <> integer { @signed: false; @endian: 'big'; };
//!     file {
//!         count: u16;
//!         names: [count] Name;
//!     }
//!     let Name = struct {
//!         length: byte <> integer { @signed: false; };
//!         text:   [length] byte <> string;
//!     };
//!     ",
//! )?;
//! let tree = Tree::open(b"\x00\x02\x02hi\x03all".to_vec(), Arc::new(schema))?;
//! assert_eq!(tree.eval("names[1].text")?.as_str()?, "all");
//! assert_eq!(tree.eval("sizeof(names)")?.as_int()?, 7);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The heavy lifting lives in the member crates: `binspect-schema` parses and
//! resolves spec text, `binspect-tree` overlays the schema on bytes and
//! evaluates expressions, `binspect-filters` holds the codec registry, and
//! `binspect-source` defines the byte-source abstraction. This crate
//! re-exports the host-facing surface and ships the `binspect` command line
//! tool.
#![warn(missing_docs)]

pub use binspect_filters::{Codec, CodecError, FilterRegistry};
pub use binspect_schema::{compile, compile_with, Schema, SpecError};
pub use binspect_source::{ByteSource, SourceError};
pub use binspect_tree::{
    eval_standalone, Children, Error, ErrorKind, Evaluated, Node, NodeKind, Tree, Value,
};
