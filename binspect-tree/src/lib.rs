//! The lazy data tree: a resolved schema overlaid on a byte source
//!
//! Opening a tree decodes nothing. Every query — a field access, an array
//! index, a `sizeof` — materializes just the nodes on its path, driven by an
//! internal cursor (the tracker) that positions each child inside its
//! container's byte range. Results are memoized in append-only arenas, so
//! repeated access to the same path yields structurally equal nodes and a
//! failed query leaves no partial state behind.
//!
//! ```
//! use std::sync::Arc;
//!
//! let schema = binspect_schema::compile(
//!     "
//!     let u32 = [4] byte <> integer { @signed: false; @endian: 'little'; };
//!     file { a: u32; b: u32; }
//!     ",
//! )?;
//! let tree = binspect_tree::Tree::open(vec![1, 0, 0, 0, 2, 0, 0, 0], Arc::new(schema))?;
//! assert_eq!(tree.root().field("a")?.as_int()?, 1);
//! assert_eq!(tree.eval("sizeof(b)")?.as_int()?, 4);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! A tree is single-threaded: the lazy caches are internally mutable, so
//! concurrent traversal is only sound after evaluation has been driven to
//! completion. The schema, by contrast, is read-only and may back any number
//! of trees.
#![warn(missing_docs)]

use std::sync::Arc;

use binspect_schema::{Schema, SchemaNode};
use binspect_source::ByteSource;

mod error;
mod eval;
mod node;
mod span;
mod tracker;
mod value;

pub use error::{Error, ErrorKind, Result};
pub use eval::{eval_standalone, Evaluated};
pub use value::Value;

use node::{BufferId, EffKind, Effective, Key, NodeData, NodeId};

/// A data tree: exclusive owner of a byte source, sharing a resolved schema
pub struct Tree<'d> {
    schema: Arc<Schema>,
    source: Box<dyn ByteSource + 'd>,
    buffers: elsa::FrozenVec<Vec<u8>>,
    nodes: elsa::FrozenVec<Box<NodeData>>,
    root: NodeId,
}

impl<'d> Tree<'d> {
    /// Binds the schema's `file` block to a byte source
    pub fn open<S: ByteSource + 'd>(source: S, schema: Arc<Schema>) -> Result<Self> {
        let root_schema = schema.root().ok_or_else(|| {
            Error::type_error(String::new(), "the schema has no file block to open")
        })?;
        let length = source.len();
        let tree = Tree {
            schema,
            source: Box::new(source),
            buffers: elsa::FrozenVec::new(),
            nodes: elsa::FrozenVec::new(),
            root: NodeId(0),
        };
        tree.alloc(NodeData::new(
            root_schema,
            None,
            Key::Root,
            BufferId::SOURCE,
            0,
            length,
        ));
        Ok(tree)
    }

    /// The root node, covering the whole source
    pub fn root<'t>(&'t self) -> Node<'t> {
        Node {
            tree: self,
            id: self.root,
        }
    }

    /// The schema this tree was opened with
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Evaluates query text in the scope of the root node
    pub fn eval<'t>(&'t self, expr_text: &str) -> Result<Evaluated<'t>> {
        eval::eval_str(self, Some(self.root), expr_text)
    }

    pub(crate) fn root_id(&self) -> NodeId {
        self.root
    }

    pub(crate) fn data(&self, id: NodeId) -> &NodeData {
        self.nodes.get(id.index()).expect("node ids are never forged")
    }

    pub(crate) fn alloc(&self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Box::new(data));
        id
    }

    pub(crate) fn alloc_resolved(
        &self,
        data: NodeData,
        kind: EffKind,
        buffer: BufferId,
        start: u64,
        end: u64,
        size: u64,
    ) -> NodeId {
        let id = self.alloc(data);
        let data = self.data(id);
        let _ = data.eff.set(Effective {
            kind,
            buffer,
            start,
            end,
        });
        let _ = data.size.set(size);
        id
    }

    pub(crate) fn push_buffer(&self, decoded: Vec<u8>) -> BufferId {
        let id = BufferId::decoded(self.buffers.len());
        self.buffers.push(decoded);
        id
    }

    /// Bytes of `[start, end)` in the given buffer
    pub(crate) fn view(&self, buffer: BufferId, start: u64, end: u64) -> Result<&[u8]> {
        match buffer.decoded_index() {
            None => self
                .source
                .read(start, end.saturating_sub(start))
                .map_err(|e| Error::data(String::new(), e.to_string())),
            Some(index) => {
                let decoded = self.buffers.get(index).expect("buffer ids are never forged");
                if end > decoded.len() as u64 || start > end {
                    return Err(Error::data(
                        String::new(),
                        format!(
                            "range {start}..{end} exceeds the {} byte decoded buffer",
                            decoded.len()
                        ),
                    ));
                }
                Ok(&decoded[start as usize..end as usize])
            }
        }
    }

    /// Canonical dotted path of a node, for diagnostics
    pub(crate) fn path_of(&self, id: NodeId) -> String {
        let data = self.data(id);
        let Some(parent) = data.parent else {
            return String::new();
        };
        let base = self.path_of(parent);
        match &data.key {
            Key::Root => base,
            Key::Field(index) => match self.field_name(parent, *index) {
                // Anonymous fields are transparent namespaces
                None => base,
                Some(name) if base.is_empty() => name,
                Some(name) => format!("{base}.{name}"),
            },
            Key::Index(i) => format!("{base}[{i}]"),
            Key::Slice(lo, hi) => format!("{base}[{lo}..{hi}]"),
            Key::Overlay => format!("({base} <> _)"),
        }
    }

    fn field_name(&self, parent: NodeId, index: usize) -> Option<String> {
        let Some(eff) = self.data(parent).eff.get() else {
            return None;
        };
        let EffKind::Struct { schema, .. } = &eff.kind else {
            return None;
        };
        let SchemaNode::Struct(s) = self.schema.node(*schema) else {
            return None;
        };
        s.fields[index].name.clone()
    }
}

impl std::fmt::Debug for Tree<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("source_len", &self.source.len())
            .field("nodes", &self.nodes.len())
            .field("decoded_buffers", &self.buffers.len())
            .finish()
    }
}

/// The coarse kind of a node, deciding which operations apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Named fields, accessed with [`Node::field`]
    Struct,
    /// Indexed elements, accessed with [`Node::at`]
    Array,
    /// A raw byte view; indexable and sliceable
    Bytes,
    /// An integer scalar
    Integer,
    /// A boolean scalar
    Boolean,
    /// A string scalar
    String,
}

/// A handle to one materialized node of a [`Tree`]
#[derive(Clone, Copy)]
pub struct Node<'t> {
    pub(crate) tree: &'t Tree<'t>,
    pub(crate) id: NodeId,
}

impl<'t> Node<'t> {
    /// Which kind of node this is
    pub fn kind(&self) -> Result<NodeKind> {
        Ok(match &tracker::effective(self.tree, self.id)?.kind {
            EffKind::Struct { .. } => NodeKind::Struct,
            EffKind::Array { .. } => NodeKind::Array,
            EffKind::Bytes { .. } => NodeKind::Bytes,
            EffKind::Scalar(Value::Integer(_)) => NodeKind::Integer,
            EffKind::Scalar(Value::Bool(_)) => NodeKind::Boolean,
            EffKind::Scalar(_) => NodeKind::String,
        })
    }

    /// A struct field by name
    ///
    /// Anonymous struct-valued fields are searched as embedded namespaces, so
    /// fields of a conditional alternative are visible on the containing
    /// struct.
    pub fn field(&self, name: &str) -> Result<Node<'t>> {
        let eff = tracker::effective(self.tree, self.id)?;
        if !matches!(eff.kind, EffKind::Struct { .. }) {
            return Err(Error::type_error(
                self.path(),
                format!("cannot access field \"{name}\" of this node"),
            ));
        }
        match tracker::struct_field_by_name(self.tree, self.id, name)? {
            Some(id) => Ok(Node {
                tree: self.tree,
                id,
            }),
            None => Err(Error::range(
                self.path(),
                format!("no such field \"{name}\""),
            )),
        }
    }

    /// An array element or single byte by index
    pub fn at(&self, index: u64) -> Result<Node<'t>> {
        let eff = tracker::effective(self.tree, self.id)?;
        let id = match &eff.kind {
            EffKind::Array { .. } => tracker::array_at(self.tree, self.id, index)?,
            EffKind::Bytes { .. } => tracker::byte_at(self.tree, self.id, index)?,
            EffKind::Struct { .. } => {
                return Err(Error::type_error(
                    self.path(),
                    "a struct cannot be indexed, only its fields accessed by name",
                ))
            }
            EffKind::Scalar(v) => {
                return Err(Error::type_error(
                    self.path(),
                    format!("a {} cannot be indexed", v.kind_name()),
                ))
            }
        };
        Ok(Node {
            tree: self.tree,
            id,
        })
    }

    /// A sub-range of a bytes node
    pub fn slice(&self, lo: u64, hi: u64) -> Result<Node<'t>> {
        let id = tracker::slice_node(self.tree, self.id, lo, Some(hi))?;
        Ok(Node {
            tree: self.tree,
            id,
        })
    }

    /// Element count of an array, field count of a struct, byte count of a
    /// bytes view, or character count of a string
    pub fn len(&self) -> Result<u64> {
        span::len_of(self.tree, self.id)
    }

    /// True when [`Node::len`] is zero
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The number of bytes this node occupies in its containing view
    pub fn size(&self) -> Result<u64> {
        span::size_of(self.tree, self.id)
    }

    /// Offset and length, in the original file — or in the innermost decoded
    /// buffer for nodes inside a filtered region
    pub fn location(&self) -> Result<(u64, u64)> {
        let size = self.size()?;
        Ok((self.tree.data(self.id).start, size))
    }

    /// The node's scalar value; structs and arrays have none
    pub fn value(&self) -> Result<Value> {
        eval::node_value(self.tree, self.id)
    }

    /// The value as an integer
    pub fn as_int(&self) -> Result<i128> {
        match self.value()? {
            Value::Integer(v) => Ok(v),
            other => Err(Error::type_error(
                self.path(),
                format!("expected an integer, found a {}", other.kind_name()),
            )),
        }
    }

    /// The value as a string; raw bytes convert byte-for-byte
    pub fn as_str(&self) -> Result<String> {
        match self.value()? {
            Value::String(s) => Ok(s),
            Value::Bytes(b) => Ok(b.iter().map(|&b| b as char).collect()),
            other => Err(Error::type_error(
                self.path(),
                format!("expected a string, found a {}", other.kind_name()),
            )),
        }
    }

    /// The value as raw bytes
    pub fn as_bytes(&self) -> Result<Vec<u8>> {
        match self.value()? {
            Value::Bytes(b) => Ok(b),
            Value::String(s) => Ok(s.chars().map(|c| c as u8).collect()),
            other => Err(Error::type_error(
                self.path(),
                format!("expected bytes, found a {}", other.kind_name()),
            )),
        }
    }

    /// A struct's present fields with their names, in declaration order
    ///
    /// Anonymous fields are labeled `<index>`; fields whose guard evaluated
    /// false are omitted.
    pub fn entries(&self) -> Result<Vec<(String, Node<'t>)>> {
        let eff = tracker::effective(self.tree, self.id)?;
        let EffKind::Struct { schema, state, .. } = &eff.kind else {
            return Err(Error::type_error(self.path(), "only structs have entries"));
        };
        let SchemaNode::Struct(s) = self.tree.schema.node(*schema) else {
            unreachable!();
        };
        tracker::ensure_seq(self.tree, self.id, usize::MAX)?;
        tracker::ensure_tail(self.tree, self.id)?;
        let slots = state.borrow().slots.clone();
        Ok(slots
            .iter()
            .enumerate()
            .filter_map(|(index, &slot)| {
                let id = span::slot_node(slot)?;
                let name = match &s.fields[index].name {
                    Some(name) => name.clone(),
                    None => format!("<{index}>"),
                };
                Some((
                    name,
                    Node {
                        tree: self.tree,
                        id,
                    },
                ))
            })
            .collect())
    }

    /// Names of a struct's named fields, in declaration order
    pub fn keys(&self) -> Result<Vec<String>> {
        let eff = tracker::effective(self.tree, self.id)?;
        let EffKind::Struct { schema, .. } = &eff.kind else {
            return Err(Error::type_error(self.path(), "only structs have keys"));
        };
        let SchemaNode::Struct(s) = self.tree.schema.node(*schema) else {
            unreachable!();
        };
        Ok(s.field_names().map(str::to_owned).collect())
    }

    /// Child nodes in declaration / index order
    ///
    /// Structs yield their present fields, arrays their elements, bytes their
    /// individual bytes.
    pub fn iter(&self) -> Result<Children<'t>> {
        let eff = tracker::effective(self.tree, self.id)?;
        let ids: Vec<NodeId> = match &eff.kind {
            EffKind::Array { state, .. } => {
                tracker::ensure_elems(self.tree, self.id, None)?;
                state.borrow().elems.clone()
            }
            EffKind::Struct { state, .. } => {
                tracker::ensure_seq(self.tree, self.id, usize::MAX)?;
                tracker::ensure_tail(self.tree, self.id)?;
                state
                    .borrow()
                    .slots
                    .iter()
                    .filter_map(|&slot| span::slot_node(slot))
                    .collect()
            }
            EffKind::Bytes { .. } => {
                let len = eff.end - eff.start;
                (0..len)
                    .map(|i| tracker::byte_at(self.tree, self.id, i))
                    .collect::<Result<_>>()?
            }
            EffKind::Scalar(v) => {
                return Err(Error::type_error(
                    self.path(),
                    format!("a {} has no children", v.kind_name()),
                ))
            }
        };
        Ok(Children {
            tree: self.tree,
            ids: ids.into_iter(),
        })
    }

    /// The canonical dotted path from the root to this node
    pub fn path(&self) -> String {
        self.tree.path_of(self.id)
    }

    /// Evaluates query text in the scope of this node
    pub fn eval(&self, expr_text: &str) -> Result<Evaluated<'t>> {
        eval::eval_str(self.tree, Some(self.id), expr_text)
    }
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("path", &self.path())
            .finish_non_exhaustive()
    }
}

/// Iterator over a node's children
pub struct Children<'t> {
    tree: &'t Tree<'t>,
    ids: std::vec::IntoIter<NodeId>,
}

impl<'t> Iterator for Children<'t> {
    type Item = Node<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.next()?;
        Some(Node {
            tree: self.tree,
            id,
        })
    }
}

impl ExactSizeIterator for Children<'_> {
    fn len(&self) -> usize {
        self.ids.len()
    }
}

#[cfg(test)]
mod tests;
