//! The filter side of a format spec: named codecs that reinterpret one byte
//! range as another, and the primitive decoders (`integer`, `varint`,
//! `string`) the tree applies directly.
//!
//! A filter chain `A <> B <> C` is read left to right: A's output bytes are
//! B's input, B's output bytes are C's input. Codecs (such as `snappy`)
//! produce an owned decoded buffer; primitive filters produce a scalar value
//! and are interpreted in place, so they live here as plain functions rather
//! than boxed objects.
//!
//! Hosts may register additional codecs:
//! ```
//! use binspect_filters::{Codec, CodecError, FilterRegistry};
//!
//! struct Reverse;
//! impl Codec for Reverse {
//!     fn name(&self) -> &str {
//!         "reverse"
//!     }
//!     fn decode(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
//!         Ok(input.iter().rev().copied().collect())
//!     }
//! }
//!
//! let mut registry = FilterRegistry::builtin();
//! registry.register(Box::new(Reverse));
//! assert!(registry.contains("reverse"));
//! assert!(registry.contains("snappy"));
//! ```
#![warn(missing_docs)]

use std::{collections::HashMap, fmt::Display};

mod primitive;
mod snappy;

pub use primitive::{decode_integer, decode_string, decode_varint, Charset, Endian, VARINT_MAX};
pub use snappy::Snappy;

/// A named transformation from an input byte range to an owned output buffer
pub trait Codec {
    /// The name this codec is referenced by in specs (e.g. `snappy`)
    fn name(&self) -> &str;

    /// Decodes the whole input range into a fresh buffer
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// The set of codecs a schema may reference by name
///
/// The registry is consulted twice: at spec resolution time to reject unknown
/// filter names, and at tree time to run the decode. It is shared immutably
/// once a schema has been compiled against it.
pub struct FilterRegistry {
    codecs: HashMap<String, Box<dyn Codec>>,
}

impl FilterRegistry {
    /// Constructs an empty registry with no codecs at all
    pub fn empty() -> Self {
        FilterRegistry {
            codecs: HashMap::new(),
        }
    }

    /// Constructs a registry holding the built-in codecs
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(Snappy));
        registry
    }

    /// Adds a codec, replacing any previous codec of the same name
    pub fn register(&mut self, codec: Box<dyn Codec>) {
        self.codecs.insert(codec.name().to_owned(), codec);
    }

    /// Returns true if a codec of the given name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.codecs.contains_key(name)
    }

    /// Looks up a codec by name
    pub fn get(&self, name: &str) -> Option<&dyn Codec> {
        self.codecs.get(name).map(|c| c.as_ref())
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.codecs.keys().collect();
        names.sort();
        f.debug_struct("FilterRegistry")
            .field("codecs", &names)
            .finish()
    }
}

/// A codec rejected its input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecError {
    /// Name of the failing codec
    pub codec: String,
    /// What the codec had to say about the input
    pub message: String,
}

impl CodecError {
    /// Constructs a new error for the named codec
    pub fn new(codec: impl Into<String>, message: impl Into<String>) -> Self {
        CodecError {
            codec: codec.into(),
            message: message.into(),
        }
    }
}

impl Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} codec: {}", self.codec, self.message)
    }
}

impl std::error::Error for CodecError {}
