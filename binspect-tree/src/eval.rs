//! Evaluation of spec expressions over live tree nodes
//!
//! Identifiers resolve in lexical scope: the fields and `let` bindings of the
//! innermost struct first, then outward through the ancestors, and finally
//! the schema's top-level names (which evaluate as type references, usable in
//! `sizeof` and on the right of `<>`). A tree-less mode handles pure literal
//! arithmetic; any path reference there is a reference error.

use binspect_schema::{BinOp, Expr, SchemaNode};
use tracing::{span, Level};

use crate::error::{Error, Result};
use crate::node::{EffKind, NodeId};
use crate::span::{len_of, size_of};
use crate::tracker::{self, effective};
use crate::value::Value;
use crate::{Node, Tree};

// Guards runaway recursion through let bindings that reference each other
const MAX_DEPTH: usize = 64;

/// The outcome of evaluating an expression: a live node, or a plain scalar
#[derive(Debug)]
pub enum Evaluated<'t> {
    /// A node of the data tree (paths, slices, overlays)
    Node(Node<'t>),
    /// A computed scalar (literals, arithmetic, `sizeof`, `len`)
    Value(Value),
}

impl<'t> Evaluated<'t> {
    /// The node, when the expression produced one
    pub fn node(&self) -> Option<Node<'t>> {
        match self {
            Evaluated::Node(node) => Some(*node),
            Evaluated::Value(_) => None,
        }
    }

    /// The scalar value, decoding the node if necessary
    pub fn value(&self) -> Result<Value> {
        match self {
            Evaluated::Node(node) => node.value(),
            Evaluated::Value(value) => Ok(value.clone()),
        }
    }

    /// The result as an integer
    pub fn as_int(&self) -> Result<i128> {
        match self.value()? {
            Value::Integer(v) => Ok(v),
            other => Err(Error::type_error(
                self.path(),
                format!("expected an integer, found a {}", other.kind_name()),
            )),
        }
    }

    /// The result as a string
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

    /// The result as raw bytes
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

    fn path(&self) -> String {
        match self {
            Evaluated::Node(node) => node.path(),
            Evaluated::Value(_) => String::new(),
        }
    }
}

/// Internal result: expressions may also name a type
pub(crate) enum Item {
    Node(NodeId),
    Value(Value),
    Type(binspect_schema::SchemaId),
}

/// Parses and evaluates query text against the tree, scoped to `scope`
pub(crate) fn eval_str<'t>(
    tree: &'t Tree<'t>,
    scope: Option<NodeId>,
    text: &str,
) -> Result<Evaluated<'t>> {
    let span = span!(Level::DEBUG, "eval", expr = text);
    let _span = span.enter();
    let expr = tree.schema().parse_expr(text)?;
    match eval_expr(tree, scope, &expr, 0)? {
        Item::Node(id) => Ok(Evaluated::Node(Node { tree, id })),
        Item::Value(value) => Ok(Evaluated::Value(value)),
        Item::Type(_) => Err(Error::type_error(
            String::new(),
            "a type name is not a value",
        )),
    }
}

/// Evaluates pure literal/operator expressions with no data context
pub fn eval_standalone(text: &str) -> Result<Value> {
    let schema = binspect_schema::compile("")?;
    let expr = schema.parse_expr(text)?;
    eval_const(&expr)
}

fn eval_const(expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Int(v) => Ok(Value::Integer(*v)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Len(inner) => match eval_const(inner)? {
            Value::String(s) => Ok(Value::Integer(s.chars().count() as i128)),
            Value::Bytes(b) => Ok(Value::Integer(b.len() as i128)),
            other => Err(Error::type_error(
                String::new(),
                format!("a {} has no length", other.kind_name()),
            )),
        },
        Expr::Binary(op, lhs, rhs) => apply_binary(*op, eval_const(lhs)?, eval_const(rhs)?),
        Expr::Ident(name) | Expr::Binding(name) => Err(Error::reference(name.clone())),
        Expr::File => Err(Error::reference("file")),
        Expr::Member(..)
        | Expr::Index(..)
        | Expr::Slice(..)
        | Expr::Overlay(..)
        | Expr::SizeOf(..) => Err(Error::reference(expr.to_string())),
    }
}

pub(crate) fn eval_to_value(tree: &Tree<'_>, scope: Option<NodeId>, expr: &Expr) -> Result<Value> {
    match eval_expr(tree, scope, expr, 0)? {
        Item::Node(id) => node_value(tree, id),
        Item::Value(value) => Ok(value),
        Item::Type(_) => Err(Error::type_error(
            String::new(),
            "a type name is not a value",
        )),
    }
}

pub(crate) fn eval_expr(
    tree: &Tree<'_>,
    scope: Option<NodeId>,
    expr: &Expr,
    depth: usize,
) -> Result<Item> {
    match expr {
        Expr::Int(v) => Ok(Item::Value(Value::Integer(*v))),
        Expr::Str(s) => Ok(Item::Value(Value::String(s.clone()))),
        Expr::Bool(b) => Ok(Item::Value(Value::Bool(*b))),
        Expr::File => match root_of(tree, scope) {
            Some(root) => Ok(Item::Node(root)),
            None => Err(Error::reference("file")),
        },
        Expr::Ident(name) => resolve_name(tree, scope, name, false, depth),
        Expr::Binding(name) => resolve_name(tree, scope, name, true, depth),
        Expr::Member(base, name) => {
            let base = eval_expr(tree, scope, base, depth)?;
            member_of(tree, base, name, depth)
        }
        Expr::Index(base, index) => {
            let index = match eval_to_value(tree, scope, index)? {
                Value::Integer(i) => i,
                other => {
                    return Err(Error::type_error(
                        String::new(),
                        format!("index must be an integer, not a {}", other.kind_name()),
                    ))
                }
            };
            let Item::Node(id) = eval_expr(tree, scope, base, depth)? else {
                return Err(Error::type_error(String::new(), "only nodes can be indexed"));
            };
            if index < 0 {
                return Err(Error::range(
                    tree.path_of(id),
                    format!("negative index {index}"),
                ));
            }
            let eff = effective(tree, id)?;
            match &eff.kind {
                EffKind::Array { .. } => Ok(Item::Node(tracker::array_at(tree, id, index as u64)?)),
                EffKind::Bytes { .. } => Ok(Item::Node(tracker::byte_at(tree, id, index as u64)?)),
                EffKind::Struct { .. } => Err(Error::type_error(
                    tree.path_of(id),
                    "a struct cannot be indexed, only its fields accessed by name",
                )),
                EffKind::Scalar(v) => Err(Error::type_error(
                    tree.path_of(id),
                    format!("a {} cannot be indexed", v.kind_name()),
                )),
            }
        }
        Expr::Slice(base, lo, hi) => {
            let Item::Node(id) = eval_expr(tree, scope, base, depth)? else {
                return Err(Error::type_error(String::new(), "only nodes can be sliced"));
            };
            let lo = match lo {
                Some(e) => int_operand(tree, scope, e)?,
                None => 0,
            };
            let hi = match hi {
                Some(e) => Some(int_operand(tree, scope, e)?),
                None => None,
            };
            Ok(Item::Node(tracker_slice(tree, id, lo, hi)?))
        }
        Expr::Overlay(base, target) => {
            let Item::Node(id) = eval_expr(tree, scope, base, depth)? else {
                return Err(Error::type_error(
                    String::new(),
                    "only a node's bytes can be reinterpreted with <>",
                ));
            };
            Ok(Item::Node(overlay_node(tree, id, *target)?))
        }
        Expr::SizeOf(inner) => match eval_expr(tree, scope, inner, depth)? {
            Item::Node(id) => Ok(Item::Value(Value::Integer(size_of(tree, id)? as i128))),
            Item::Type(tid) => match tree.schema().static_size(tid) {
                Some(size) => Ok(Item::Value(Value::Integer(size as i128))),
                None => Err(Error::type_error(
                    String::new(),
                    "the size of this type is not fixed",
                )),
            },
            Item::Value(v) => Err(Error::type_error(
                String::new(),
                format!("sizeof needs a node or a type, not a {}", v.kind_name()),
            )),
        },
        Expr::Len(inner) => match eval_expr(tree, scope, inner, depth)? {
            Item::Node(id) => Ok(Item::Value(Value::Integer(len_of(tree, id)? as i128))),
            Item::Value(Value::String(s)) => {
                Ok(Item::Value(Value::Integer(s.chars().count() as i128)))
            }
            Item::Value(Value::Bytes(b)) => Ok(Item::Value(Value::Integer(b.len() as i128))),
            Item::Value(v) => Err(Error::type_error(
                String::new(),
                format!("a {} has no length", v.kind_name()),
            )),
            Item::Type(_) => Err(Error::type_error(String::new(), "a type has no length")),
        },
        Expr::Binary(op, lhs, rhs) => {
            let lhs = operand(tree, scope, lhs, depth)?;
            let rhs = operand(tree, scope, rhs, depth)?;
            Ok(Item::Value(apply_binary(*op, lhs, rhs)?))
        }
    }
}

fn operand(tree: &Tree<'_>, scope: Option<NodeId>, expr: &Expr, depth: usize) -> Result<Value> {
    match eval_expr(tree, scope, expr, depth)? {
        Item::Node(id) => node_value(tree, id),
        Item::Value(value) => Ok(value),
        Item::Type(_) => Err(Error::type_error(
            String::new(),
            "a type name is not a value",
        )),
    }
}

fn int_operand(tree: &Tree<'_>, scope: Option<NodeId>, expr: &Expr) -> Result<u64> {
    match eval_to_value(tree, scope, expr)? {
        Value::Integer(i) if i >= 0 => Ok(i as u64),
        Value::Integer(i) => Err(Error::range(String::new(), format!("negative bound {i}"))),
        other => Err(Error::type_error(
            String::new(),
            format!("bound must be an integer, not a {}", other.kind_name()),
        )),
    }
}

fn apply_binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value> {
    use Value::{Bool, Integer};
    match op {
        BinOp::Eq => return Ok(Bool(lhs.loosely_equals(&rhs))),
        BinOp::Ne => return Ok(Bool(!lhs.loosely_equals(&rhs))),
        _ => {}
    }
    let (Integer(a), Integer(b)) = (&lhs, &rhs) else {
        return Err(Error::type_error(
            String::new(),
            format!(
                "operator {op} needs integers, found {} and {}",
                lhs.kind_name(),
                rhs.kind_name()
            ),
        ));
    };
    let (a, b) = (*a, *b);
    let arithmetic = |r: Option<i128>| {
        r.map(Integer)
            .ok_or_else(|| Error::range(String::new(), "arithmetic overflow".to_string()))
    };
    match op {
        BinOp::Add => arithmetic(a.checked_add(b)),
        BinOp::Sub => arithmetic(a.checked_sub(b)),
        BinOp::Mul => arithmetic(a.checked_mul(b)),
        BinOp::Div if b == 0 => Err(Error::range(String::new(), "division by zero")),
        BinOp::Div => arithmetic(a.checked_div(b)),
        BinOp::Rem if b == 0 => Err(Error::range(String::new(), "division by zero")),
        BinOp::Rem => arithmetic(a.checked_rem(b)),
        BinOp::Lt => Ok(Bool(a < b)),
        BinOp::Le => Ok(Bool(a <= b)),
        BinOp::Gt => Ok(Bool(a > b)),
        BinOp::Ge => Ok(Bool(a >= b)),
        BinOp::Eq | BinOp::Ne => unreachable!("handled above"),
    }
}

/// Walks the scope chain outward looking for a field or let binding
fn resolve_name(
    tree: &Tree<'_>,
    scope: Option<NodeId>,
    name: &str,
    computed: bool,
    depth: usize,
) -> Result<Item> {
    let mut cursor = scope;
    while let Some(id) = cursor {
        if matches!(effective(tree, id)?.kind, EffKind::Struct { .. }) {
            if !computed {
                if let Some(node) = tracker::struct_field_by_name(tree, id, name)? {
                    return Ok(Item::Node(node));
                }
            }
            if let Some(item) = eval_let(tree, id, name, computed, depth)? {
                return Ok(item);
            }
        }
        cursor = tree.data(id).parent;
    }
    if !computed {
        if let Some(tid) = tree.schema().lookup(name) {
            return Ok(Item::Type(tid));
        }
    }
    Err(Error::reference(if computed {
        format!("?{name}")
    } else {
        name.to_owned()
    }))
}

/// Evaluates a struct-level let binding in the scope of its struct
fn eval_let(
    tree: &Tree<'_>,
    id: NodeId,
    name: &str,
    computed: bool,
    depth: usize,
) -> Result<Option<Item>> {
    let EffKind::Struct { schema: sid, .. } = &effective(tree, id)?.kind else {
        return Ok(None);
    };
    let SchemaNode::Struct(s) = tree.schema().node(*sid) else {
        unreachable!();
    };
    let Some(binding) = s.get_let(name).filter(|l| l.computed == computed) else {
        return Ok(None);
    };
    if depth >= MAX_DEPTH {
        return Err(Error::data(
            tree.path_of(id),
            format!("evaluation of \"{name}\" recurses too deeply"),
        ));
    }
    let expr = binding.expr.clone();
    eval_expr(tree, Some(id), &expr, depth + 1).map(Some)
}

fn member_of(tree: &Tree<'_>, base: Item, name: &str, depth: usize) -> Result<Item> {
    let Item::Node(id) = base else {
        return Err(Error::type_error(
            String::new(),
            format!("cannot access field \"{name}\" of a plain value"),
        ));
    };
    let eff = effective(tree, id)?;
    match &eff.kind {
        EffKind::Struct { .. } => {
            if let Some(node) = tracker::struct_field_by_name(tree, id, name)? {
                return Ok(Item::Node(node));
            }
            if let Some(item) = eval_let(tree, id, name, false, depth)? {
                return Ok(item);
            }
            Err(Error::range(
                tree.path_of(id),
                format!("no such field \"{name}\""),
            ))
        }
        EffKind::Array { .. } => Err(Error::type_error(
            tree.path_of(id),
            format!("an array has elements, not a field \"{name}\""),
        )),
        EffKind::Bytes { .. } => Err(Error::type_error(
            tree.path_of(id),
            format!("bytes have no field \"{name}\""),
        )),
        EffKind::Scalar(v) => Err(Error::type_error(
            tree.path_of(id),
            format!("a {} has no field \"{name}\"", v.kind_name()),
        )),
    }
}

pub(crate) fn node_value(tree: &Tree<'_>, id: NodeId) -> Result<Value> {
    let eff = effective(tree, id)?;
    match &eff.kind {
        EffKind::Scalar(value) => Ok(value.clone()),
        EffKind::Bytes { .. } => Ok(Value::Bytes(
            tree.view(eff.buffer, eff.start, eff.end)?.to_vec(),
        )),
        EffKind::Struct { .. } => Err(Error::type_error(
            tree.path_of(id),
            "a struct has no scalar value",
        )),
        EffKind::Array { .. } => Err(Error::type_error(
            tree.path_of(id),
            "an array has no scalar value",
        )),
    }
}

fn root_of(tree: &Tree<'_>, scope: Option<NodeId>) -> Option<NodeId> {
    scope.map(|_| tree.root_id())
}

/// Creates a bytes sub-view node
fn tracker_slice(tree: &Tree<'_>, id: NodeId, lo: u64, hi: Option<u64>) -> Result<NodeId> {
    tracker::slice_node(tree, id, lo, hi)
}

/// Reinterprets a node's bytes through another schema node
fn overlay_node(tree: &Tree<'_>, id: NodeId, target: binspect_schema::SchemaId) -> Result<NodeId> {
    tracker::overlay_node(tree, id, target)
}
