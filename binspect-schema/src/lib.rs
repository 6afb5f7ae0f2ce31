//! This crate turns format spec text into a resolved [`Schema`]: a typed,
//! arena-allocated description of a binary layout (see [`compile`]).
//!
//! The spec language describes how bytes are structured. A spec is a series
//! of top-level `let` bindings naming type expressions, plus a `file { ... }`
//! block giving the layout of the whole input:
//!
//! ```text
//! let FixInt   = integer { @signed: false; @endian: 'little'; };
//! let FixInt32 = [4] byte <> FixInt;
//!
//! let Record = struct {
//!     checksum: FixInt32;
//!     length:   [2] byte <> FixInt;
//!     rtype:    byte <> FixInt;
//!     data:     [length] byte <> string;
//!     @minspan: 7;
//! };
//!
//! file {
//!     records: [] Record;
//! }
//! ```
//!
//! Type expressions compose with the overlay operator `<>`, read left to
//! right: the left side's output bytes are the right side's input. Arrays
//! take an optional count (`[4] byte`, `[length] byte`, greedy `[] Record`),
//! structs hold ordered fields, `let` bindings and `@attribute` assignments,
//! and `if (guard) { ... }` blocks hold fields that only exist when the
//! guard holds.
//!
//! ```
//! let schema = binspect_schema::compile(
//!     "
//!     let u32 = [4] byte <> integer { @signed: false; @endian: 'little'; };
//!     file { a: u32; b: u32; }
//!     ",
//! )?;
//! let root = schema.root().expect("spec has a file block");
//! assert_eq!(schema.static_size(root), Some(8));
//! # Ok::<(), binspect_schema::SpecError>(())
//! ```
//!
//! Name resolution is total: every reference resolves to exactly one schema
//! node or the spec is rejected with a [`SpecError`]. Schema nodes live in an
//! append-only arena and refer to one another by [`SchemaId`], so recursive
//! named references need no owning cycles.
#![warn(missing_docs)]

use std::{collections::HashMap, fmt::Display, sync::Arc};

use binspect_filters::FilterRegistry;
pub use binspect_filters::{Charset, Endian};

mod ast;
mod resolve;
mod text;

pub mod expression;
pub use expression::{BinOp, Expr};
pub use resolve::SemanticError;
pub use text::ParseError;

/// Compiles spec text into a schema using the built-in filter registry
pub fn compile(spec_text: &str) -> Result<Schema, SpecError> {
    compile_with(spec_text, Arc::new(FilterRegistry::builtin()))
}

/// Compiles spec text against the given filter registry
///
/// The registry decides which codec names (`snappy`, ...) the spec may
/// reference; the schema keeps hold of it so data trees can run the codecs.
pub fn compile_with(spec_text: &str, registry: Arc<FilterRegistry>) -> Result<Schema, SpecError> {
    let spec = text::parse_spec(spec_text).map_err(SpecError::from_parse)?;
    resolve::resolve(spec, registry).map_err(SpecError::Semantic)
}

/// Index of a node in a schema's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(u32);

impl SchemaId {
    pub(crate) fn new(index: usize) -> Self {
        SchemaId(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A resolved, typed description of a binary layout
///
/// Nodes are held in an append-only arena: evaluating query text against a
/// tree may intern additional nodes for inline type expressions
/// (`expr <> [] byte`), but existing nodes never change. The schema is
/// read-only from the outside and may back any number of data trees.
pub struct Schema {
    nodes: elsa::FrozenVec<Box<SchemaNode>>,
    index: HashMap<String, SchemaId>,
    root: Option<SchemaId>,
    registry: Arc<FilterRegistry>,
}

impl Schema {
    pub(crate) fn new(
        nodes: Vec<SchemaNode>,
        index: HashMap<String, SchemaId>,
        root: Option<SchemaId>,
        registry: Arc<FilterRegistry>,
    ) -> Self {
        let arena = elsa::FrozenVec::new();
        for node in nodes {
            arena.push(Box::new(node));
        }
        Schema {
            nodes: arena,
            index,
            root,
            registry,
        }
    }

    /// The node describing the `file { ... }` block, if the spec had one
    pub fn root(&self) -> Option<SchemaId> {
        self.root
    }

    /// Looks up a top-level `let` binding by name
    pub fn lookup(&self, name: &str) -> Option<SchemaId> {
        self.index.get(name).copied()
    }

    /// Returns the node for the given id
    ///
    /// Ids are only minted by this schema, so lookup cannot fail.
    pub fn node(&self, id: SchemaId) -> &SchemaNode {
        self.nodes
            .get(id.index())
            .expect("schema ids are never forged")
    }

    /// The filter registry this schema was compiled against
    pub fn registry(&self) -> &FilterRegistry {
        &self.registry
    }

    pub(crate) fn push_node(&self, node: SchemaNode) -> SchemaId {
        let id = SchemaId::new(self.nodes.len());
        self.nodes.push(Box::new(node));
        id
    }

    /// Parses query text into a resolved expression
    ///
    /// Inline type expressions on the right of `<>` are interned into this
    /// schema's arena.
    pub fn parse_expr(&self, expr_text: &str) -> Result<Expr, SpecError> {
        let ast = text::parse_expr_text(expr_text).map_err(SpecError::from_parse)?;
        resolve::lower_query_expr(self, ast).map_err(SpecError::Semantic)
    }

    /// The statically known byte width of a node, when it has one
    ///
    /// A `@span` declaration, a fixed-width scalar, or a fixed-count array of
    /// fixed-width elements all have static sizes; greedy arrays, length
    /// fields and self-delimiting encodings do not.
    pub fn static_size(&self, id: SchemaId) -> Option<u64> {
        match self.node(id) {
            SchemaNode::Byte => Some(1),
            SchemaNode::Array(array) => match array.count {
                ArrayCount::Fixed(n) => self.static_size(array.elem)?.checked_mul(n),
                _ => None,
            },
            SchemaNode::Struct(s) => {
                if let Some(span) = s.span {
                    return Some(span);
                }
                let mut total = 0u64;
                for field in &s.fields {
                    if field.guard.is_some() {
                        return None;
                    }
                    total = total.checked_add(self.static_size(field.ty)?)?;
                }
                Some(total)
            }
            SchemaNode::Filter(_) => None,
            SchemaNode::Chain(elems) => {
                if self.chain_has_varint(elems) {
                    None
                } else {
                    self.static_size(*elems.first()?)
                }
            }
        }
    }

    /// True if a node's extent can be determined by reading forward from its
    /// start, without knowing the container's end
    ///
    /// Greedy arrays and codec chains over greedy sources are the nodes that
    /// are *not* forward-sized; they claim whatever their container leaves
    /// them.
    pub fn forward_sized(&self, id: SchemaId) -> bool {
        self.forward_sized_inner(id, &mut Vec::new())
    }

    // Legal recursion (a counted array of the enclosing struct) revisits a
    // node mid-computation; such a cycle is walkable forward because anything
    // greedy on the path would already have answered false
    fn forward_sized_inner(&self, id: SchemaId, visiting: &mut Vec<SchemaId>) -> bool {
        if visiting.contains(&id) {
            return true;
        }
        visiting.push(id);
        let forward = match self.node(id) {
            SchemaNode::Byte => true,
            SchemaNode::Array(array) => match array.count {
                ArrayCount::Greedy => false,
                _ => self.forward_sized_inner(array.elem, visiting),
            },
            SchemaNode::Struct(s) => {
                s.span.is_some()
                    || s.fields
                        .iter()
                        .all(|f| f.guard.is_none() && self.forward_sized_inner(f.ty, visiting))
            }
            SchemaNode::Filter(kind) => matches!(kind, FilterKind::Varint),
            SchemaNode::Chain(elems) => {
                self.chain_has_varint(elems)
                    || elems
                        .first()
                        .is_some_and(|&first| self.forward_sized_inner(first, visiting))
            }
        };
        visiting.pop();
        forward
    }

    fn chain_has_varint(&self, elems: &[SchemaId]) -> bool {
        elems[1..]
            .iter()
            .any(|&e| matches!(self.node(e), SchemaNode::Filter(FilterKind::Varint)))
    }

    /// The `@minspan` constraint of a node, looking through chains
    pub fn min_span(&self, id: SchemaId) -> Option<u64> {
        match self.node(id) {
            SchemaNode::Struct(s) => s.min_span,
            SchemaNode::Chain(elems) => self.min_span(*elems.first()?),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.index.keys().collect();
        names.sort();
        f.debug_struct("Schema")
            .field("nodes", &self.nodes.len())
            .field("names", &names)
            .field("root", &self.root)
            .finish()
    }
}

/// One resolved construct in a schema
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    /// A single raw byte
    Byte,
    /// A homogeneous sequence
    Array(ArraySchema),
    /// An ordered set of named fields
    Struct(StructSchema),
    /// A value or codec filter; only meaningful inside a chain
    Filter(FilterKind),
    /// `A <> B <> C`: the first element lays out the bytes, each later
    /// element reinterprets the previous output
    Chain(Vec<SchemaId>),
}

/// Element type and count discipline of an array
#[derive(Debug, Clone, PartialEq)]
pub struct ArraySchema {
    /// Schema of each element
    pub elem: SchemaId,
    /// How many elements the array holds
    pub count: ArrayCount,
}

/// How an array's element count is determined
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayCount {
    /// A constant count, `[4] byte`
    Fixed(u64),
    /// A count read from a sibling field, `[length] byte`
    Expr(Expr),
    /// No count: elements are produced until the span is exhausted
    Greedy,
}

/// An ordered list of fields plus non-layout `let` bindings
#[derive(Debug, Clone, PartialEq)]
pub struct StructSchema {
    /// Layout fields, in declaration order
    pub fields: Vec<FieldSchema>,
    /// Non-layout bindings available to expressions in scope
    pub lets: Vec<LetBinding>,
    /// Exact byte span this struct must occupy, from `@span`
    pub span: Option<u64>,
    /// Minimum byte span, from `@minspan`
    pub min_span: Option<u64>,
    named: HashMap<String, usize>,
}

impl StructSchema {
    pub(crate) fn new(
        fields: Vec<FieldSchema>,
        lets: Vec<LetBinding>,
        span: Option<u64>,
        min_span: Option<u64>,
    ) -> Self {
        let named = fields
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.name.as_ref().map(|n| (n.clone(), i)))
            .collect();
        StructSchema {
            fields,
            lets,
            span,
            min_span,
            named,
        }
    }

    /// Index of the named field, if any
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.named.get(name).copied()
    }

    /// The `let` binding of the given name, if any
    pub fn get_let(&self, name: &str) -> Option<&LetBinding> {
        self.lets.iter().find(|l| l.name == name)
    }

    /// Names of the named fields, in declaration order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter_map(|f| f.name.as_deref())
    }
}

/// One field of a struct
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    /// Field name; anonymous fields have none and are only reachable by index
    pub name: Option<String>,
    /// The field's type
    pub ty: SchemaId,
    /// Guard from an enclosing `if (...) { ... }` block
    pub guard: Option<Expr>,
}

/// A `let` binding inside a struct
#[derive(Debug, Clone, PartialEq)]
pub struct LetBinding {
    /// Binding name (without the `?`)
    pub name: String,
    /// True for `let ?name = ...;` computed bindings
    pub computed: bool,
    /// The bound expression, evaluated in the struct's scope
    pub expr: Expr,
}

/// A value or codec filter
#[derive(Debug, Clone, PartialEq)]
pub enum FilterKind {
    /// Fixed-width integer over the whole input range
    Integer {
        /// Two's-complement when true
        signed: bool,
        /// Byte order
        endian: Endian,
    },
    /// Self-delimiting 7-bit varint
    Varint,
    /// String over the whole input range
    String {
        /// Character set of the decoded value
        charset: Charset,
    },
    /// A byte-to-byte codec looked up in the registry by name
    Codec(String),
}

/// Rejection of spec or query text
#[derive(Debug)]
pub enum SpecError {
    /// The text does not lex or parse
    Syntax {
        /// Full rendered diagnostic, with source line and caret
        rendered: String,
        /// 1-based line of the failure
        line: usize,
        /// 0-based column of the failure
        column: usize,
    },
    /// The text parses but cannot be resolved
    Semantic(SemanticError),
}

impl SpecError {
    fn from_parse(err: ParseError<'_>) -> Self {
        SpecError::Syntax {
            rendered: err.to_string(),
            line: err.line_number(),
            column: err.column_number(),
        }
    }

    /// True for syntax errors (as opposed to semantic ones)
    pub fn is_syntax(&self) -> bool {
        matches!(self, SpecError::Syntax { .. })
    }
}

impl Display for SpecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecError::Syntax { rendered, .. } => f.write_str(rendered),
            SpecError::Semantic(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for SpecError {}
