//! Span resolution: how many bytes a node occupies
//!
//! Rules, in priority order: a declared `@span` wins; a length field sizes an
//! array from its value; a self-delimiting encoding sizes itself by decoding;
//! otherwise size is the sum of the children, computed by driving the
//! tracker. Fixed-count arrays of fixed-width elements are sized as
//! count × width without iteration. `@minspan` is not a size but a
//! constraint, consulted by greedy iteration in the tracker.

use binspect_schema::{ArrayCount, Schema, SchemaId, SchemaNode, StructSchema};

use crate::error::Result;
use crate::eval;
use crate::node::{EffKind, NodeId, Slot};
use crate::tracker::{self, data_at, effective};
use crate::value::Value;
use crate::Tree;

/// Resolves (and memoizes) the number of bytes a node occupies in its
/// containing view
pub(crate) fn size_of(tree: &Tree<'_>, id: NodeId) -> Result<u64> {
    if let Some(&size) = tree.data(id).size.get() {
        return Ok(size);
    }
    // Resolution itself settles the size of scalars, byte arrays and spans
    let eff = effective(tree, id)?;
    if let Some(&size) = tree.data(id).size.get() {
        return Ok(size);
    }
    let size = match &eff.kind {
        EffKind::Scalar(_) | EffKind::Bytes { .. } => eff.end - eff.start,
        EffKind::Struct {
            schema, tail_len, state, ..
        } => {
            let SchemaNode::Struct(s) = tree.schema().node(*schema) else {
                unreachable!();
            };
            if let Some(span) = s.span {
                span
            } else if *tail_len > 0 {
                // Tail-anchored content reaches the end of the view
                eff.end - eff.start
            } else {
                tracker::ensure_seq(tree, id, usize::MAX)?;
                state.borrow().pos - eff.start
            }
        }
        EffKind::Array { elem, count, state } => {
            match (count, tree.schema().static_size(*elem)) {
                // Known count and fixed-width elements: no iteration needed
                (Some(count), Some(elem_size)) => count
                    .checked_mul(elem_size)
                    .ok_or_else(|| data_at(tree, id, "array size overflows"))?,
                _ => {
                    tracker::ensure_elems(tree, id, None)?;
                    state.borrow().pos - eff.start
                }
            }
        }
    };
    let _ = tree.data(id).size.set(size);
    Ok(size)
}

/// The element or field count of a container, or the character count of a
/// string and byte count of a bytes view
pub(crate) fn len_of(tree: &Tree<'_>, id: NodeId) -> Result<u64> {
    let eff = effective(tree, id)?;
    match &eff.kind {
        EffKind::Bytes { .. } => Ok(eff.end - eff.start),
        EffKind::Scalar(Value::String(s)) => Ok(s.chars().count() as u64),
        EffKind::Scalar(v) => Err(crate::error::Error::type_error(
            tree.path_of(id),
            format!("a {} has no length", v.kind_name()),
        )),
        EffKind::Struct { schema, .. } => {
            let SchemaNode::Struct(s) = tree.schema().node(*schema) else {
                unreachable!();
            };
            Ok(s.fields.len() as u64)
        }
        EffKind::Array { count, state, .. } => match count {
            Some(count) => Ok(*count),
            None => {
                tracker::ensure_elems(tree, id, None)?;
                Ok(state.borrow().elems.len() as u64)
            }
        },
    }
}

/// Splits a struct's fields into the sequentially-placed head, the variable
/// middle, and the tail suffix anchored backwards from the container end
pub(crate) fn zone_split(schema: &Schema, s: &StructSchema) -> (usize, usize) {
    let head_len = s
        .fields
        .iter()
        .take_while(|f| f.guard.is_none() && schema.forward_sized(f.ty))
        .count();
    if head_len == s.fields.len() {
        return (head_len, 0);
    }
    let max_tail = s.fields.len() - head_len - 1;
    let tail_len = s
        .fields
        .iter()
        .rev()
        .take_while(|f| f.guard.is_none() && anchor_eligible(schema, f.ty))
        .count()
        .min(max_tail);
    (head_len, tail_len)
}

// A field can be anchored from the end if its width is static, or if it is a
// counted array of fixed-width elements whose count can be evaluated (the
// count field may itself sit later in the tail)
fn anchor_eligible(schema: &Schema, id: SchemaId) -> bool {
    schema.static_size(id).is_some() || counted_array(schema, id).is_some()
}

fn counted_array(schema: &Schema, id: SchemaId) -> Option<(SchemaId, binspect_schema::Expr)> {
    match schema.node(id) {
        SchemaNode::Array(a) => match &a.count {
            ArrayCount::Expr(expr) if schema.static_size(a.elem).is_some() => {
                Some((a.elem, expr.clone()))
            }
            _ => None,
        },
        SchemaNode::Chain(elems) => counted_array(schema, *elems.first()?),
        _ => None,
    }
}

/// The width of one tail field, resolved without reading it forward
pub(crate) fn anchored_size(tree: &Tree<'_>, container: NodeId, field_ty: SchemaId) -> Result<u64> {
    let schema = tree.schema();
    if let Some(size) = schema.static_size(field_ty) {
        return Ok(size);
    }
    if let Some((elem, count_expr)) = counted_array(schema, field_ty) {
        let count = match eval::eval_to_value(tree, Some(container), &count_expr)? {
            Value::Integer(n) if n >= 0 => n as u64,
            Value::Integer(n) => {
                return Err(data_at(tree, container, format!("negative element count {n}")))
            }
            other => {
                return Err(data_at(
                    tree,
                    container,
                    format!("element count must be an integer, not a {}", other.kind_name()),
                ))
            }
        };
        let elem_size = schema
            .static_size(elem)
            .expect("counted_array only matches fixed-width elements");
        return count
            .checked_mul(elem_size)
            .ok_or_else(|| data_at(tree, container, "array size overflows"));
    }
    Err(data_at(
        tree,
        container,
        "field size cannot be determined from the container end",
    ))
}

/// True when a struct slot holds a materialized node
pub(crate) fn slot_node(slot: Slot) -> Option<NodeId> {
    match slot {
        Slot::Present(id) => Some(id),
        _ => None,
    }
}
