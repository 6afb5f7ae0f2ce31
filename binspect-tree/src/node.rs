//! Internal node representation: placement, effective views and lazy child
//! state

use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;

use binspect_schema::SchemaId;

use crate::value::Value;

/// Index of a node in the tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Which buffer a range lives in: the original source, or a decoded buffer
/// produced by a codec filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BufferId(pub(crate) u32);

impl BufferId {
    /// The original byte source
    pub(crate) const SOURCE: BufferId = BufferId(0);

    pub(crate) fn decoded(index: usize) -> Self {
        BufferId(index as u32 + 1)
    }

    pub(crate) fn decoded_index(self) -> Option<usize> {
        (self.0 > 0).then(|| self.0 as usize - 1)
    }
}

/// How a node is reached from its parent, forming its canonical path
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Key {
    /// The tree root
    Root,
    /// A struct field, by declaration index
    Field(usize),
    /// An array element
    Index(u64),
    /// A byte sub-range taken by slicing
    Slice(u64, u64),
    /// A reinterpretation produced by `<>` at evaluation time
    Overlay,
}

/// One materialized node
///
/// `start..limit` is the byte range the node was *given* in `buffer`; how
/// much of it the node actually occupies is its size, memoized separately.
/// The effective view (after filters) is resolved once, on demand, and only
/// on success, so a failed materialization leaves no partial state behind.
pub(crate) struct NodeData {
    pub schema: SchemaId,
    pub parent: Option<NodeId>,
    pub key: Key,
    pub buffer: BufferId,
    pub start: u64,
    pub limit: u64,
    pub size: OnceCell<u64>,
    pub eff: OnceCell<Effective>,
}

impl NodeData {
    pub(crate) fn new(
        schema: SchemaId,
        parent: Option<NodeId>,
        key: Key,
        buffer: BufferId,
        start: u64,
        limit: u64,
    ) -> Self {
        NodeData {
            schema,
            parent,
            key,
            buffer,
            start,
            limit,
            size: OnceCell::new(),
            eff: OnceCell::new(),
        }
    }
}

/// A node's presentation once its filter chain has been applied
///
/// `buffer`/`start`/`end` is the view content is read from; for codec
/// filtered nodes this is the decoded buffer, not the node's own placement.
pub(crate) struct Effective {
    pub kind: EffKind,
    pub buffer: BufferId,
    pub start: u64,
    pub end: u64,
}

pub(crate) enum EffKind {
    /// A decoded scalar: byte, integer, varint or string
    Scalar(Value),
    /// A raw byte view; children are single bytes
    Bytes {
        children: RefCell<HashMap<u64, NodeId>>,
    },
    /// A struct overlay
    Struct {
        schema: SchemaId,
        head_len: usize,
        tail_len: usize,
        state: RefCell<StructState>,
    },
    /// An array of non-byte elements
    Array {
        elem: SchemaId,
        /// Resolved element count; `None` for greedy arrays until iterated
        count: Option<u64>,
        state: RefCell<ArrayState>,
    },
}

/// Lazy materialization state of a struct's fields
#[derive(Debug)]
pub(crate) struct StructState {
    /// One slot per schema field, in declaration order
    pub slots: Vec<Slot>,
    /// Next field index to be placed sequentially
    pub next_seq: usize,
    /// Offset where the next sequential field starts
    pub pos: u64,
    /// Start of the tail-anchored zone, once resolved
    pub tail_start: Option<u64>,
    /// Re-entrancy guards for circular size dependencies
    pub seq_active: bool,
    pub tail_active: bool,
}

impl StructState {
    pub(crate) fn new(field_count: usize, pos: u64) -> Self {
        StructState {
            slots: vec![Slot::Pending; field_count],
            next_seq: 0,
            pos,
            tail_start: None,
            seq_active: false,
            tail_active: false,
        }
    }
}

/// Outcome of materializing one struct field
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Slot {
    /// Not reached yet
    Pending,
    /// Guard evaluated false; the field does not exist in this instance
    Absent,
    /// Materialized
    Present(NodeId),
}

/// Lazy materialization state of an array's elements
#[derive(Debug)]
pub(crate) struct ArrayState {
    pub elems: Vec<NodeId>,
    /// Offset where the next element starts
    pub pos: u64,
    /// True once iteration has stopped (span exhausted or count reached)
    pub done: bool,
    /// Re-entrancy guard
    pub active: bool,
}

impl ArrayState {
    pub(crate) fn new(pos: u64) -> Self {
        ArrayState {
            elems: Vec::new(),
            pos,
            done: false,
            active: false,
        }
    }
}
