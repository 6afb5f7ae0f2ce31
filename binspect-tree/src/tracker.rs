//! The tracker: the cursor that materializes one child of a container at a
//! time
//!
//! Creating a child is a pure function of (schema, parent range, previous
//! sibling end): look up the child's schema, start where the previous sibling
//! ended, apply the filter chain to derive the effective view, resolve the
//! span, and intern the node. All state lives in per-node `RefCell`s and is
//! only committed after a step fully succeeds, so a failure leaves siblings
//! and earlier children untouched.

use std::cell::RefCell;
use std::collections::HashMap;

use binspect_schema::{ArrayCount, FilterKind, SchemaId, SchemaNode};
use tracing::{span, Level};

use crate::error::{Error, Result};
use crate::eval;
use crate::node::{ArrayState, BufferId, EffKind, Effective, Key, NodeData, NodeId, Slot, StructState};
use crate::span::{anchored_size, size_of, zone_split};
use crate::value::Value;
use crate::Tree;

/// Resolves (and memoizes) a node's effective view: its filter chain applied
/// and its kind decided
pub(crate) fn effective<'t>(tree: &'t Tree<'_>, id: NodeId) -> Result<&'t Effective> {
    if tree.data(id).eff.get().is_none() {
        let data = tree.data(id);
        let span = span!(Level::TRACE, "materialize", path = %tree.path_of(id));
        let _span = span.enter();
        let (eff, size) = apply_schema(tree, id, data.schema, data.buffer, data.start, data.limit)?;
        let data = tree.data(id);
        let _ = data.eff.set(eff);
        if let Some(size) = size {
            let _ = data.size.set(size);
        }
    }
    Ok(tree.data(id).eff.get().expect("just resolved"))
}

/// Overlays `schema` onto the view `[start, limit)` of `buffer`
///
/// Returns the effective presentation plus the node's outer size when the
/// schema alone determines it (scalars, counted byte arrays, spans and
/// varints); container sizes are deferred to the span resolver.
fn apply_schema(
    tree: &Tree<'_>,
    node: NodeId,
    schema_id: SchemaId,
    buffer: BufferId,
    start: u64,
    limit: u64,
) -> Result<(Effective, Option<u64>)> {
    let schema = tree.schema();
    match schema.node(schema_id) {
        SchemaNode::Byte => {
            if start >= limit {
                return Err(data_at(tree, node, "a byte does not fit in the remaining space"));
            }
            let value = tree.view(buffer, start, start + 1)?[0];
            Ok((
                Effective {
                    kind: EffKind::Scalar(Value::Integer(value as i128)),
                    buffer,
                    start,
                    end: start + 1,
                },
                Some(1),
            ))
        }
        SchemaNode::Filter(kind) => apply_filter(tree, node, kind, buffer, start, limit),
        SchemaNode::Struct(s) => {
            let end = match s.span {
                Some(span) => {
                    let end = start.checked_add(span).unwrap_or(u64::MAX);
                    if end > limit {
                        return Err(data_at(
                            tree,
                            node,
                            format!(
                                "declared span of {span} bytes exceeds the {} available",
                                limit - start
                            ),
                        ));
                    }
                    end
                }
                None => limit,
            };
            let (head_len, tail_len) = zone_split(schema, s);
            Ok((
                Effective {
                    kind: EffKind::Struct {
                        schema: schema_id,
                        head_len,
                        tail_len,
                        state: RefCell::new(StructState::new(s.fields.len(), start)),
                    },
                    buffer,
                    start,
                    end,
                },
                s.span,
            ))
        }
        SchemaNode::Array(array) => {
            let count = match &array.count {
                ArrayCount::Greedy => None,
                ArrayCount::Fixed(n) => Some(*n),
                ArrayCount::Expr(expr) => Some(eval_count(tree, node, expr)?),
            };
            if elem_is_byte(tree, array.elem) {
                // Plain byte arrays collapse to a single bytes view
                let end = match count {
                    None => limit,
                    Some(n) => {
                        let end = start.checked_add(n).unwrap_or(u64::MAX);
                        if end > limit {
                            return Err(data_at(
                                tree,
                                node,
                                format!(
                                    "length of {n} bytes points past the end of the container"
                                ),
                            ));
                        }
                        end
                    }
                };
                Ok((
                    Effective {
                        kind: EffKind::Bytes {
                            children: RefCell::new(HashMap::new()),
                        },
                        buffer,
                        start,
                        end,
                    },
                    Some(end - start),
                ))
            } else {
                Ok((
                    Effective {
                        kind: EffKind::Array {
                            elem: array.elem,
                            count,
                            state: RefCell::new(ArrayState::new(start)),
                        },
                        buffer,
                        start,
                        end: limit,
                    },
                    None,
                ))
            }
        }
        SchemaNode::Chain(elems) => {
            let mut elems = elems.iter().copied();
            let first = elems
                .next()
                .expect("the parser never produces an empty chain");
            let (mut eff, mut outer) = apply_schema(tree, node, first, buffer, start, limit)?;
            for elem in elems {
                match schema.node(elem) {
                    SchemaNode::Filter(kind) => {
                        if matches!(eff.kind, EffKind::Struct { .. } | EffKind::Array { .. }) {
                            return Err(data_at(tree, node, "cannot filter a structured view"));
                        }
                        let (next, inner) =
                            apply_filter(tree, node, kind, eff.buffer, eff.start, eff.end)?;
                        // A varint narrows the footprint to what it consumed
                        if matches!(kind, FilterKind::Varint) {
                            outer = inner;
                        }
                        eff = next;
                    }
                    _ => {
                        if !matches!(eff.kind, EffKind::Bytes { .. }) {
                            return Err(data_at(tree, node, "an overlay requires a byte view"));
                        }
                        let (next, _) =
                            apply_schema(tree, node, elem, eff.buffer, eff.start, eff.end)?;
                        eff = next;
                    }
                }
            }
            Ok((eff, outer))
        }
    }
}

fn apply_filter(
    tree: &Tree<'_>,
    node: NodeId,
    kind: &FilterKind,
    buffer: BufferId,
    start: u64,
    limit: u64,
) -> Result<(Effective, Option<u64>)> {
    let width = limit - start;
    match kind {
        FilterKind::Integer { signed, endian } => {
            let bytes = tree.view(buffer, start, limit)?;
            let value = binspect_filters::decode_integer(bytes, *endian, *signed)
                .map_err(|e| data_at(tree, node, e.to_string()))?;
            Ok((
                Effective {
                    kind: EffKind::Scalar(Value::Integer(value)),
                    buffer,
                    start,
                    end: limit,
                },
                Some(width),
            ))
        }
        FilterKind::Varint => {
            let bytes = tree.view(buffer, start, limit)?;
            let (value, consumed) = binspect_filters::decode_varint(bytes)
                .map_err(|e| data_at(tree, node, e.to_string()))?;
            Ok((
                Effective {
                    kind: EffKind::Scalar(Value::Integer(value as i128)),
                    buffer,
                    start,
                    end: start + consumed as u64,
                },
                Some(consumed as u64),
            ))
        }
        FilterKind::String { charset } => {
            let bytes = tree.view(buffer, start, limit)?;
            let value = binspect_filters::decode_string(bytes, *charset)
                .map_err(|e| data_at(tree, node, e.to_string()))?;
            Ok((
                Effective {
                    kind: EffKind::Scalar(Value::String(value)),
                    buffer,
                    start,
                    end: limit,
                },
                Some(width),
            ))
        }
        FilterKind::Codec(name) => {
            let codec = tree
                .schema()
                .registry()
                .get(name)
                .expect("codec names are validated at compile time");
            let input = tree.view(buffer, start, limit)?;
            let decoded = codec
                .decode(input)
                .map_err(|e| data_at(tree, node, e.to_string()))?;
            tracing::debug!(
                "{name} decoded {} bytes into {}",
                input.len(),
                decoded.len()
            );
            let len = decoded.len() as u64;
            let decoded_buffer = tree.push_buffer(decoded);
            Ok((
                Effective {
                    kind: EffKind::Bytes {
                        children: RefCell::new(HashMap::new()),
                    },
                    buffer: decoded_buffer,
                    start: 0,
                    end: len,
                },
                Some(width),
            ))
        }
    }
}

/// Materializes struct fields sequentially up to and including `upto`
/// (bounded by the start of the tail zone)
pub(crate) fn ensure_seq(tree: &Tree<'_>, id: NodeId, upto: usize) -> Result<()> {
    let eff = effective(tree, id)?;
    let EffKind::Struct {
        schema: sid,
        tail_len,
        state,
        ..
    } = &eff.kind
    else {
        unreachable!("ensure_seq is only called on struct nodes");
    };
    let SchemaNode::Struct(s) = tree.schema().node(*sid) else {
        unreachable!();
    };
    let seq_end = s.fields.len() - tail_len;
    {
        let mut st = state.borrow_mut();
        if st.next_seq >= seq_end || st.next_seq > upto {
            return Ok(());
        }
        if st.seq_active {
            return Err(data_at(tree, id, "circular dependency between fields"));
        }
        st.seq_active = true;
    }
    let result = (|| {
        loop {
            let (index, pos) = {
                let st = state.borrow();
                if st.next_seq >= seq_end || st.next_seq > upto {
                    return Ok(());
                }
                (st.next_seq, st.pos)
            };
            let field = &s.fields[index];
            let zone_end = if *tail_len > 0 {
                ensure_tail(tree, id)?
            } else {
                eff.end
            };
            if let Some(guard) = &field.guard {
                if !eval::eval_to_value(tree, Some(id), guard)?.truthy() {
                    let mut st = state.borrow_mut();
                    st.slots[index] = Slot::Absent;
                    st.next_seq += 1;
                    continue;
                }
            }
            let child = tree.alloc(NodeData::new(
                field.ty,
                Some(id),
                Key::Field(index),
                eff.buffer,
                pos,
                zone_end,
            ));
            let size = size_of(tree, child)?;
            let new_pos = pos + size;
            if new_pos > zone_end {
                return Err(data_at(
                    tree,
                    child,
                    "content exceeds the container's declared span",
                ));
            }
            let mut st = state.borrow_mut();
            st.slots[index] = Slot::Present(child);
            st.pos = new_pos;
            st.next_seq += 1;
        }
    })();
    state.borrow_mut().seq_active = false;
    result
}

/// Anchors the struct's tail fields backwards from the container end,
/// returning the offset where the tail zone begins
pub(crate) fn ensure_tail(tree: &Tree<'_>, id: NodeId) -> Result<u64> {
    let eff = effective(tree, id)?;
    let EffKind::Struct {
        schema: sid,
        tail_len,
        state,
        ..
    } = &eff.kind
    else {
        unreachable!("ensure_tail is only called on struct nodes");
    };
    if *tail_len == 0 {
        return Ok(eff.end);
    }
    let SchemaNode::Struct(s) = tree.schema().node(*sid) else {
        unreachable!();
    };
    {
        let mut st = state.borrow_mut();
        if let Some(tail_start) = st.tail_start {
            return Ok(tail_start);
        }
        if st.tail_active {
            return Err(data_at(tree, id, "circular size dependency in tail fields"));
        }
        st.tail_active = true;
    }
    let total = s.fields.len();
    let result = (|| {
        let mut end = eff.end;
        for index in (total - tail_len..total).rev() {
            let size = anchored_size(tree, id, s.fields[index].ty)?;
            let field_start = end
                .checked_sub(size)
                .filter(|&fs| fs >= eff.start)
                .ok_or_else(|| data_at(tree, id, "tail fields exceed the container"))?;
            let child = tree.alloc(NodeData::new(
                s.fields[index].ty,
                Some(id),
                Key::Field(index),
                eff.buffer,
                field_start,
                field_start + size,
            ));
            state.borrow_mut().slots[index] = Slot::Present(child);
            end = field_start;
        }
        Ok(end)
    })();
    let mut st = state.borrow_mut();
    st.tail_active = false;
    if let Ok(tail_start) = &result {
        st.tail_start = Some(*tail_start);
    }
    result
}

/// Materializes one struct field by index, choosing the sequential or the
/// tail-anchored route
pub(crate) fn struct_child(tree: &Tree<'_>, id: NodeId, index: usize) -> Result<Slot> {
    let eff = effective(tree, id)?;
    let EffKind::Struct {
        schema: sid,
        tail_len,
        state,
        ..
    } = &eff.kind
    else {
        unreachable!("struct_child is only called on struct nodes");
    };
    let SchemaNode::Struct(s) = tree.schema().node(*sid) else {
        unreachable!();
    };
    if let slot @ (Slot::Present(_) | Slot::Absent) = state.borrow().slots[index] {
        return Ok(slot);
    }
    if index >= s.fields.len() - tail_len {
        ensure_tail(tree, id)?;
    } else {
        ensure_seq(tree, id, index)?;
    }
    Ok(state.borrow().slots[index])
}

/// Looks up a struct field by name, searching anonymous struct-valued fields
/// as embedded namespaces
pub(crate) fn struct_field_by_name(
    tree: &Tree<'_>,
    id: NodeId,
    name: &str,
) -> Result<Option<NodeId>> {
    let eff = effective(tree, id)?;
    let EffKind::Struct { schema: sid, .. } = &eff.kind else {
        return Ok(None);
    };
    let SchemaNode::Struct(s) = tree.schema().node(*sid) else {
        unreachable!();
    };
    if let Some(index) = s.field_index(name) {
        return Ok(match struct_child(tree, id, index)? {
            Slot::Present(child) => Some(child),
            _ => None,
        });
    }
    for (index, field) in s.fields.iter().enumerate() {
        if field.name.is_some() {
            continue;
        }
        if let Slot::Present(child) = struct_child(tree, id, index)? {
            if matches!(effective(tree, child)?.kind, EffKind::Struct { .. }) {
                if let Some(found) = struct_field_by_name(tree, child, name)? {
                    return Ok(Some(found));
                }
            }
        }
    }
    Ok(None)
}

/// Drives array iteration until `want` elements exist, the count is reached,
/// or a greedy stop condition fires
pub(crate) fn ensure_elems(tree: &Tree<'_>, id: NodeId, want: Option<u64>) -> Result<()> {
    let eff = effective(tree, id)?;
    let EffKind::Array { elem, count, state } = &eff.kind else {
        unreachable!("ensure_elems is only called on array nodes");
    };
    let (elem, count) = (*elem, *count);
    {
        let mut st = state.borrow_mut();
        if st.done {
            return Ok(());
        }
        if st.active {
            return Err(data_at(tree, id, "circular dependency while iterating"));
        }
        st.active = true;
    }
    let schema = tree.schema();
    let result = (|| {
        loop {
            let (index, pos) = {
                let st = state.borrow();
                if st.done {
                    return Ok(());
                }
                (st.elems.len() as u64, st.pos)
            };
            if want.is_some_and(|w| index >= w) {
                return Ok(());
            }
            if count.is_some_and(|c| index >= c) {
                state.borrow_mut().done = true;
                return Ok(());
            }
            if count.is_none() {
                let remaining = eff.end.saturating_sub(pos);
                let stop = remaining == 0
                    || schema.static_size(elem).is_some_and(|s| s > remaining)
                    || schema.min_span(elem).is_some_and(|m| remaining < m);
                if stop {
                    tracing::trace!(
                        "iteration stopped at {index} elements with {remaining} bytes left"
                    );
                    state.borrow_mut().done = true;
                    return Ok(());
                }
            }
            let child = tree.alloc(NodeData::new(
                elem,
                Some(id),
                Key::Index(index),
                eff.buffer,
                pos,
                eff.end,
            ));
            let size = size_of(tree, child)?;
            if size == 0 && count.is_none() {
                return Err(data_at(tree, child, "greedy array element consumed no bytes"));
            }
            let new_pos = pos + size;
            if new_pos > eff.end {
                return Err(data_at(tree, child, "element overruns the container"));
            }
            let mut st = state.borrow_mut();
            st.elems.push(child);
            st.pos = new_pos;
        }
    })();
    state.borrow_mut().active = false;
    result
}

/// One array element by index
pub(crate) fn array_at(tree: &Tree<'_>, id: NodeId, index: u64) -> Result<NodeId> {
    let eff = effective(tree, id)?;
    let EffKind::Array { count, state, .. } = &eff.kind else {
        unreachable!("array_at is only called on array nodes");
    };
    if let Some(count) = count {
        if index >= *count {
            return Err(Error::range(
                tree.path_of(id),
                format!("index {index} out of bounds for length {count}"),
            ));
        }
    }
    ensure_elems(tree, id, Some(index + 1))?;
    let st = state.borrow();
    st.elems.get(index as usize).copied().ok_or_else(|| {
        Error::range(
            tree.path_of(id),
            format!("index {index} out of bounds for length {}", st.elems.len()),
        )
    })
}

/// One byte of a bytes view, as a scalar child node
pub(crate) fn byte_at(tree: &Tree<'_>, id: NodeId, index: u64) -> Result<NodeId> {
    let eff = effective(tree, id)?;
    let EffKind::Bytes { children } = &eff.kind else {
        unreachable!("byte_at is only called on bytes nodes");
    };
    let len = eff.end - eff.start;
    if index >= len {
        return Err(Error::range(
            tree.path_of(id),
            format!("index {index} out of bounds for length {len}"),
        ));
    }
    if let Some(&existing) = children.borrow().get(&index) {
        return Ok(existing);
    }
    let start = eff.start + index;
    let value = tree.view(eff.buffer, start, start + 1)?[0];
    let child = tree.alloc_resolved(
        NodeData::new(
            tree.data(id).schema,
            Some(id),
            Key::Index(index),
            eff.buffer,
            start,
            start + 1,
        ),
        EffKind::Scalar(Value::Integer(value as i128)),
        eff.buffer,
        start,
        start + 1,
        1,
    );
    children.borrow_mut().insert(index, child);
    Ok(child)
}

fn eval_count(tree: &Tree<'_>, node: NodeId, expr: &binspect_schema::Expr) -> Result<u64> {
    let scope = tree.data(node).parent;
    let value = eval::eval_to_value(tree, scope, expr)?;
    match value {
        Value::Integer(n) if n >= 0 => Ok(n as u64),
        Value::Integer(n) => Err(data_at(tree, node, format!("negative element count {n}"))),
        other => Err(data_at(
            tree,
            node,
            format!("element count must be an integer, not a {}", other.kind_name()),
        )),
    }
}

fn elem_is_byte(tree: &Tree<'_>, id: SchemaId) -> bool {
    match tree.schema().node(id) {
        SchemaNode::Byte => true,
        SchemaNode::Chain(elems) => elems.len() == 1 && elem_is_byte(tree, elems[0]),
        _ => false,
    }
}

/// Creates a bytes node over a sub-range of a bytes view
pub(crate) fn slice_node(tree: &Tree<'_>, base: NodeId, lo: u64, hi: Option<u64>) -> Result<NodeId> {
    let eff = effective(tree, base)?;
    if !matches!(eff.kind, EffKind::Bytes { .. }) {
        return Err(Error::type_error(
            tree.path_of(base),
            "only a bytes view can be sliced",
        ));
    }
    let len = eff.end - eff.start;
    let hi = hi.unwrap_or(len);
    if lo > hi || hi > len {
        return Err(Error::range(
            tree.path_of(base),
            format!("slice {lo}..{hi} out of bounds for length {len}"),
        ));
    }
    Ok(tree.alloc_resolved(
        NodeData::new(
            tree.data(base).schema,
            Some(base),
            Key::Slice(lo, hi),
            eff.buffer,
            eff.start + lo,
            eff.start + hi,
        ),
        EffKind::Bytes {
            children: RefCell::new(HashMap::new()),
        },
        eff.buffer,
        eff.start + lo,
        eff.start + hi,
        hi - lo,
    ))
}

/// Reinterprets a node's bytes through another schema node (`<>` at
/// evaluation time)
pub(crate) fn overlay_node(tree: &Tree<'_>, base: NodeId, target: SchemaId) -> Result<NodeId> {
    let size = size_of(tree, base)?;
    let eff = effective(tree, base)?;
    // When a codec moved the effective view into a decoded buffer, the outer
    // size no longer measures that view; the whole view is the content
    let end = if tree.data(base).buffer == eff.buffer {
        eff.start + size
    } else {
        eff.end
    };
    Ok(tree.alloc(NodeData::new(
        target,
        Some(base),
        Key::Overlay,
        eff.buffer,
        eff.start,
        end,
    )))
}

pub(crate) fn data_at(tree: &Tree<'_>, node: NodeId, message: impl Into<String>) -> Error {
    Error::data(tree.path_of(node), message)
}
