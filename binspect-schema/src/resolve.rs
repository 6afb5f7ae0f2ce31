//! Lowers the parsed AST into the arena-allocated [`Schema`]
//!
//! Resolution is two-pass: first every top-level `let` reserves an arena slot
//! under its name, then each type expression is lowered with identifiers
//! replaced by slot ids. Forward and recursive references therefore need no
//! special casing; a validation pass afterwards rejects layouts that could
//! never terminate.

use std::{collections::HashMap, fmt::Display, sync::Arc};

use binspect_filters::{Charset, Endian, FilterRegistry};

use crate::{
    ast,
    expression::{BinOp, Expr},
    ArrayCount, ArraySchema, FieldSchema, FilterKind, LetBinding, Schema, SchemaId, SchemaNode,
    StructSchema,
};

/// A spec that parses but cannot be given meaning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticError {
    message: String,
}

impl SemanticError {
    fn new(message: impl Into<String>) -> Self {
        SemanticError {
            message: message.into(),
        }
    }

    /// The reason the spec was rejected
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for SemanticError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SemanticError {}

type Result<T> = std::result::Result<T, SemanticError>;

/// Something schema nodes can be interned into while lowering
///
/// The resolver appends to its building vector; query-time lowering appends
/// to a finished schema's frozen arena.
trait Arena {
    fn lookup_name(&self, name: &str) -> Option<SchemaId>;
    fn push(&mut self, node: SchemaNode) -> SchemaId;
    fn registry(&self) -> &FilterRegistry;
}

pub(crate) fn resolve(spec: ast::Spec, registry: Arc<FilterRegistry>) -> Result<Schema> {
    let mut resolver = Resolver {
        nodes: Vec::new(),
        index: HashMap::new(),
        registry: &registry,
    };

    // Pass 1: reserve a slot per top-level let
    let mut file_body = None;
    for item in &spec.items {
        match item {
            ast::TopItem::Let { name, .. } => {
                let id = SchemaId::new(resolver.nodes.len());
                resolver.nodes.push(None);
                if resolver.index.insert(name.clone(), id).is_some() {
                    return Err(SemanticError::new(format!(
                        "\"{name}\" is defined more than once"
                    )));
                }
            }
            ast::TopItem::File(body) => {
                if file_body.replace(body).is_some() {
                    return Err(SemanticError::new("more than one file block"));
                }
            }
        }
    }

    // Pass 2: lower each binding into its reserved slot
    for item in &spec.items {
        if let ast::TopItem::Let { name, ty } = item {
            let node = lower_type_node(&mut resolver, ty)
                .map_err(|e| SemanticError::new(format!("in \"{name}\": {e}")))?;
            let slot = resolver.index[name.as_str()];
            resolver.nodes[slot.index()] = Some(node);
        }
    }
    let root = match file_body {
        Some(body) => {
            let schema = lower_struct(&mut resolver, body)
                .map_err(|e| SemanticError::new(format!("in file block: {e}")))?;
            Some(resolver.push(SchemaNode::Struct(schema)))
        }
        None => None,
    };

    let nodes: Vec<SchemaNode> = resolver
        .nodes
        .into_iter()
        .map(|slot| slot.expect("every reserved slot is filled by pass 2"))
        .collect();
    let index = resolver.index;
    validate(&nodes, &index, root)?;
    Ok(Schema::new(nodes, index, root, registry))
}

/// Lowers query text's AST against a finished schema, interning any inline
/// type expressions
pub(crate) fn lower_query_expr(schema: &Schema, expr: ast::Expr) -> Result<Expr> {
    let mut arena = QueryArena { schema };
    lower_expr(&mut arena, &expr)
}

struct Resolver<'r> {
    nodes: Vec<Option<SchemaNode>>,
    index: HashMap<String, SchemaId>,
    registry: &'r FilterRegistry,
}

impl Arena for Resolver<'_> {
    fn lookup_name(&self, name: &str) -> Option<SchemaId> {
        self.index.get(name).copied()
    }

    fn push(&mut self, node: SchemaNode) -> SchemaId {
        let id = SchemaId::new(self.nodes.len());
        self.nodes.push(Some(node));
        id
    }

    fn registry(&self) -> &FilterRegistry {
        self.registry
    }
}

struct QueryArena<'s> {
    schema: &'s Schema,
}

impl Arena for QueryArena<'_> {
    fn lookup_name(&self, name: &str) -> Option<SchemaId> {
        self.schema.lookup(name)
    }

    fn push(&mut self, node: SchemaNode) -> SchemaId {
        self.schema.push_node(node)
    }

    fn registry(&self) -> &FilterRegistry {
        self.schema.registry()
    }
}

// --- lowering ---------------------------------------------------------------

fn lower_type<A: Arena>(arena: &mut A, ty: &ast::TypeExpr) -> Result<SchemaId> {
    if let ast::TypeExpr::Named { name, attrs } = ty {
        if let Some(existing) = arena.lookup_name(name) {
            if !attrs.is_empty() {
                return Err(SemanticError::new(format!(
                    "attributes are not allowed on a reference to \"{name}\""
                )));
            }
            return Ok(existing);
        }
    }
    let node = lower_type_node(arena, ty)?;
    Ok(arena.push(node))
}

fn lower_type_node<A: Arena>(arena: &mut A, ty: &ast::TypeExpr) -> Result<SchemaNode> {
    Ok(match ty {
        ast::TypeExpr::Byte => SchemaNode::Byte,
        ast::TypeExpr::Array { count, elem } => {
            let elem = lower_type(arena, elem)?;
            let count = match count {
                None => ArrayCount::Greedy,
                Some(expr) => match fold_const(expr) {
                    Some(Const::Int(n)) if n >= 0 => ArrayCount::Fixed(n as u64),
                    Some(_) => {
                        return Err(SemanticError::new("array count must be a non-negative integer"))
                    }
                    None => ArrayCount::Expr(lower_expr(arena, expr)?),
                },
            };
            SchemaNode::Array(ArraySchema { elem, count })
        }
        ast::TypeExpr::Struct(body) => SchemaNode::Struct(lower_struct(arena, body)?),
        ast::TypeExpr::Chain(elems) => {
            let elems = elems
                .iter()
                .map(|e| lower_type(arena, e))
                .collect::<Result<Vec<_>>>()?;
            SchemaNode::Chain(elems)
        }
        ast::TypeExpr::Named { name, attrs } => {
            if let Some(existing) = arena.lookup_name(name) {
                if !attrs.is_empty() {
                    return Err(SemanticError::new(format!(
                        "attributes are not allowed on a reference to \"{name}\""
                    )));
                }
                // A top-level alias: a single-element chain is transparent
                SchemaNode::Chain(vec![existing])
            } else {
                lower_filter(arena, name, attrs)?
            }
        }
    })
}

fn lower_filter<A: Arena>(arena: &A, name: &str, attrs: &[ast::AttrAssign]) -> Result<SchemaNode> {
    match name {
        "integer" => {
            let mut signed = false;
            let mut endian = Endian::default();
            for attr in attrs {
                match (attr.name.as_str(), fold_const(&attr.value)) {
                    ("signed", Some(Const::Bool(b))) => signed = b,
                    ("signed", _) => {
                        return Err(attr_mismatch("signed", "a boolean"));
                    }
                    ("endian", Some(Const::Str(s))) => {
                        endian = match s.as_str() {
                            "little" => Endian::Little,
                            "big" => Endian::Big,
                            _ => return Err(attr_mismatch("endian", "'little' or 'big'")),
                        }
                    }
                    ("endian", _) => return Err(attr_mismatch("endian", "'little' or 'big'")),
                    (other, _) => return Err(unknown_attr("integer", other)),
                }
            }
            Ok(SchemaNode::Filter(FilterKind::Integer { signed, endian }))
        }
        "varint" => match attrs {
            [] => Ok(SchemaNode::Filter(FilterKind::Varint)),
            [first, ..] => Err(unknown_attr("varint", &first.name)),
        },
        "string" => {
            let mut charset = Charset::default();
            for attr in attrs {
                match (attr.name.as_str(), fold_const(&attr.value)) {
                    ("charset", Some(Const::Str(s))) => {
                        charset = match s.as_str() {
                            "raw" => Charset::Raw,
                            "utf-8" | "utf8" => Charset::Utf8,
                            _ => return Err(attr_mismatch("charset", "'raw' or 'utf-8'")),
                        }
                    }
                    ("charset", _) => return Err(attr_mismatch("charset", "'raw' or 'utf-8'")),
                    (other, _) => return Err(unknown_attr("string", other)),
                }
            }
            Ok(SchemaNode::Filter(FilterKind::String { charset }))
        }
        name if arena.registry().contains(name) => {
            if let [first, ..] = attrs {
                return Err(unknown_attr(name, &first.name));
            }
            Ok(SchemaNode::Filter(FilterKind::Codec(name.to_owned())))
        }
        _ => Err(SemanticError::new(format!(
            "reference to undefined name \"{name}\""
        ))),
    }
}

fn attr_mismatch(name: &str, expected: &str) -> SemanticError {
    SemanticError::new(format!("attribute @{name} must be {expected}"))
}

fn unknown_attr(on: &str, name: &str) -> SemanticError {
    SemanticError::new(format!("unknown attribute @{name} on {on}"))
}

fn lower_struct<A: Arena>(arena: &mut A, body: &ast::StructBody) -> Result<StructSchema> {
    let mut fields: Vec<FieldSchema> = Vec::new();
    let mut lets: Vec<LetBinding> = Vec::new();
    let mut span = None;
    let mut min_span = None;
    for item in &body.items {
        match item {
            ast::StructItem::Field { name, ty } => {
                push_field(arena, &mut fields, name.as_deref(), ty, None)?;
            }
            ast::StructItem::Cond { guard, fields: conditional } => {
                let guard = lower_expr(arena, guard)?;
                for (name, ty) in conditional {
                    push_field(arena, &mut fields, name.as_deref(), ty, Some(guard.clone()))?;
                }
            }
            ast::StructItem::Let {
                name,
                computed,
                expr,
            } => {
                if lets.iter().any(|l| l.name == *name) {
                    return Err(SemanticError::new(format!("let {name} occurs twice")));
                }
                lets.push(LetBinding {
                    name: name.clone(),
                    computed: *computed,
                    expr: lower_expr(arena, expr)?,
                });
            }
            ast::StructItem::Attr(attr) => match attr.name.as_str() {
                "span" => set_span_attr(&mut span, attr)?,
                "minspan" => set_span_attr(&mut min_span, attr)?,
                other => return Err(unknown_attr("struct", other)),
            },
        }
    }
    Ok(StructSchema::new(fields, lets, span, min_span))
}

fn push_field<A: Arena>(
    arena: &mut A,
    fields: &mut Vec<FieldSchema>,
    name: Option<&str>,
    ty: &ast::TypeExpr,
    guard: Option<Expr>,
) -> Result<()> {
    if let Some(name) = name {
        if fields.iter().any(|f| f.name.as_deref() == Some(name)) {
            return Err(SemanticError::new(format!("field {name} occurs twice")));
        }
    }
    fields.push(FieldSchema {
        name: name.map(str::to_owned),
        ty: lower_type(arena, ty)?,
        guard,
    });
    Ok(())
}

fn set_span_attr(slot: &mut Option<u64>, attr: &ast::AttrAssign) -> Result<()> {
    if slot.is_some() {
        return Err(SemanticError::new(format!("@{} occurs twice", attr.name)));
    }
    match fold_const(&attr.value) {
        Some(Const::Int(n)) if n >= 0 => {
            *slot = Some(n as u64);
            Ok(())
        }
        _ => Err(attr_mismatch(&attr.name, "a non-negative integer")),
    }
}

fn lower_expr<A: Arena>(arena: &mut A, expr: &ast::Expr) -> Result<Expr> {
    Ok(match expr {
        ast::Expr::Int(v) => Expr::Int(*v),
        ast::Expr::Str(s) => Expr::Str(s.clone()),
        ast::Expr::Bool(b) => Expr::Bool(*b),
        ast::Expr::Ident(name) => Expr::Ident(name.clone()),
        ast::Expr::Binding(name) => Expr::Binding(name.clone()),
        ast::Expr::File => Expr::File,
        ast::Expr::Member(base, name) => {
            Expr::Member(Box::new(lower_expr(arena, base)?), name.clone())
        }
        ast::Expr::Index(base, index) => Expr::Index(
            Box::new(lower_expr(arena, base)?),
            Box::new(lower_expr(arena, index)?),
        ),
        ast::Expr::Slice(base, lo, hi) => Expr::Slice(
            Box::new(lower_expr(arena, base)?),
            lo.as_ref()
                .map(|e| lower_expr(arena, e).map(Box::new))
                .transpose()?,
            hi.as_ref()
                .map(|e| lower_expr(arena, e).map(Box::new))
                .transpose()?,
        ),
        ast::Expr::Overlay(base, ty) => Expr::Overlay(
            Box::new(lower_expr(arena, base)?),
            lower_type(arena, ty)?,
        ),
        ast::Expr::SizeOf(inner) => Expr::SizeOf(Box::new(lower_expr(arena, inner)?)),
        ast::Expr::Len(inner) => Expr::Len(Box::new(lower_expr(arena, inner)?)),
        ast::Expr::Binary(op, lhs, rhs) => Expr::Binary(
            *op,
            Box::new(lower_expr(arena, lhs)?),
            Box::new(lower_expr(arena, rhs)?),
        ),
    })
}

// --- constant folding -------------------------------------------------------

enum Const {
    Int(i128),
    Str(String),
    Bool(bool),
}

fn fold_const(expr: &ast::Expr) -> Option<Const> {
    match expr {
        ast::Expr::Int(v) => Some(Const::Int(*v)),
        ast::Expr::Str(s) => Some(Const::Str(s.clone())),
        ast::Expr::Bool(b) => Some(Const::Bool(*b)),
        ast::Expr::Binary(op, lhs, rhs) => {
            let (Const::Int(a), Const::Int(b)) = (fold_const(lhs)?, fold_const(rhs)?) else {
                return None;
            };
            Some(Const::Int(match op {
                BinOp::Add => a.checked_add(b)?,
                BinOp::Sub => a.checked_sub(b)?,
                BinOp::Mul => a.checked_mul(b)?,
                BinOp::Div => a.checked_div(b)?,
                BinOp::Rem => a.checked_rem(b)?,
                _ => return None,
            }))
        }
        _ => None,
    }
}

// --- validation -------------------------------------------------------------

fn validate(
    nodes: &[SchemaNode],
    index: &HashMap<String, SchemaId>,
    root: Option<SchemaId>,
) -> Result<()> {
    let check = Validator { nodes, index };
    for (i, node) in nodes.iter().enumerate() {
        let id = SchemaId::new(i);
        match node {
            SchemaNode::Struct(s) => {
                for field in &s.fields {
                    check.require_layout(field.ty, "a struct field")?;
                }
                check.check_span_arithmetic(s)?;
            }
            SchemaNode::Array(a) => check.require_layout(a.elem, "an array element")?,
            SchemaNode::Chain(elems) => {
                if let Some(&first) = elems.first() {
                    // Single-element chains are aliases and take the kind of
                    // their target; longer chains need a layout source
                    if elems.len() > 1 {
                        check.require_layout(first, "the source of a filter chain")?;
                    }
                }
            }
            _ => {}
        }
        check.check_cycle(id)?;
    }
    if let Some(root) = root {
        check.require_layout(root, "the file block")?;
    }
    Ok(())
}

struct Validator<'a> {
    nodes: &'a [SchemaNode],
    index: &'a HashMap<String, SchemaId>,
}

impl Validator<'_> {
    fn node(&self, id: SchemaId) -> &SchemaNode {
        &self.nodes[id.index()]
    }

    fn name_of(&self, id: SchemaId) -> Option<&str> {
        self.index
            .iter()
            .find(|(_, &v)| v == id)
            .map(|(k, _)| k.as_str())
    }

    fn is_layout(&self, id: SchemaId) -> bool {
        match self.node(id) {
            SchemaNode::Byte | SchemaNode::Array(_) | SchemaNode::Struct(_) => true,
            SchemaNode::Filter(_) => false,
            SchemaNode::Chain(elems) => elems.first().is_some_and(|&f| self.is_layout(f)),
        }
    }

    fn require_layout(&self, id: SchemaId, position: &str) -> Result<()> {
        if self.is_layout(id) {
            Ok(())
        } else {
            Err(SemanticError::new(format!(
                "a filter cannot be {position}; apply it to a source with <>"
            )))
        }
    }

    // A struct's declared span must fit its fixed content; greedy trailers
    // absorb any remainder
    fn check_span_arithmetic(&self, s: &StructSchema) -> Result<()> {
        let Some(span) = s.span else { return Ok(()) };
        let mut fixed = 0u64;
        for field in &s.fields {
            if field.guard.is_none() {
                if let Some(size) = self.static_size(field.ty) {
                    fixed = fixed.saturating_add(size);
                }
            }
        }
        if fixed > span {
            return Err(SemanticError::new(format!(
                "declared @span of {span} is smaller than the {fixed} bytes of fixed content"
            )));
        }
        Ok(())
    }

    // Mirrors Schema::static_size over the building vector
    fn static_size(&self, id: SchemaId) -> Option<u64> {
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
                let has_varint = elems[1..]
                    .iter()
                    .any(|&e| matches!(self.node(e), SchemaNode::Filter(FilterKind::Varint)));
                if has_varint {
                    None
                } else {
                    self.static_size(*elems.first()?)
                }
            }
        }
    }

    fn check_cycle(&self, id: SchemaId) -> Result<()> {
        let mut stack = Vec::new();
        self.visit(id, &mut stack)
    }

    // Walks edges that are unconditionally materialized: mandatory struct
    // fields, fixed-count array elements, and chain members up to the first
    // codec (a codec's decoded buffer bounds everything behind it)
    fn visit(&self, id: SchemaId, stack: &mut Vec<SchemaId>) -> Result<()> {
        if stack.contains(&id) {
            let name = stack
                .iter()
                .chain([&id])
                .find_map(|&i| self.name_of(i))
                .unwrap_or("<anonymous>");
            return Err(SemanticError::new(format!(
                "\"{name}\" recursively contains itself without a bounding filter or counted array"
            )));
        }
        stack.push(id);
        match self.node(id) {
            SchemaNode::Byte | SchemaNode::Filter(_) => {}
            SchemaNode::Array(array) => {
                if matches!(array.count, ArrayCount::Fixed(n) if n > 0) {
                    self.visit(array.elem, stack)?;
                }
            }
            SchemaNode::Struct(s) => {
                for field in &s.fields {
                    if field.guard.is_none() {
                        self.visit(field.ty, stack)?;
                    }
                }
            }
            SchemaNode::Chain(elems) => {
                for &elem in elems {
                    if matches!(self.node(elem), SchemaNode::Filter(FilterKind::Codec(_))) {
                        break;
                    }
                    self.visit(elem, stack)?;
                }
            }
        }
        stack.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{compile, ArrayCount, FilterKind, SchemaNode, SpecError};

    const LOG_SPEC: &str = "
        let FixInt = integer { signed: false; endian: 'little'; };
        let FixInt8 =  byte     <> FixInt;
        let FixInt16 = [2] byte <> FixInt;
        let FixInt32 = [4] byte <> FixInt;

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
            checksum: FixInt32;
            length:   FixInt16;
            rtype:    FixInt8;
            data:     [length] byte <> string;
            @minspan: 7;
        };
    ";

    #[test]
    fn log_spec_resolves() {
        let schema = compile(LOG_SPEC).unwrap();
        let root = schema.root().expect("file block");
        let SchemaNode::Struct(file) = schema.node(root) else {
            panic!("root should be a struct");
        };
        assert_eq!(file.field_index("head_blocks"), Some(0));
        assert_eq!(file.field_index("tail_block"), Some(1));

        let log_block = schema.lookup("LogBlock").unwrap();
        assert_eq!(schema.static_size(log_block), Some(32768));
        let record = schema.lookup("Record").unwrap();
        assert_eq!(schema.static_size(record), None);
        assert_eq!(schema.min_span(record), Some(7));
        // A record's extent follows from its length field, reading forward
        assert!(schema.forward_sized(record));
        // A greedy run of records does not
        let SchemaNode::Struct(log_block) = schema.node(log_block) else {
            panic!("LogBlock should be a struct");
        };
        assert!(!schema.forward_sized(log_block.fields[0].ty));

        let fix32 = schema.lookup("FixInt32").unwrap();
        assert_eq!(schema.static_size(fix32), Some(4));
        assert!(schema.forward_sized(fix32));
    }

    #[test]
    fn length_field_arrays_resolve_to_expressions() {
        let schema = compile(LOG_SPEC).unwrap();
        let record = schema.lookup("Record").unwrap();
        let SchemaNode::Struct(record) = schema.node(record) else {
            panic!("Record should be a struct");
        };
        let data = &record.fields[record.field_index("data").unwrap()];
        let SchemaNode::Chain(elems) = schema.node(data.ty) else {
            panic!("data should be a chain");
        };
        let SchemaNode::Array(array) = schema.node(elems[0]) else {
            panic!("chain source should be an array");
        };
        assert!(matches!(array.count, ArrayCount::Expr(_)));
    }

    #[test]
    fn varint_chains_are_forward_sized() {
        let schema = compile("let VarInt = [] byte <> varint;").unwrap();
        let varint = schema.lookup("VarInt").unwrap();
        assert!(schema.forward_sized(varint));
        assert_eq!(schema.static_size(varint), None);
    }

    #[test]
    fn unresolved_names_are_semantic_errors() {
        let err = compile("file { x: Missing; }").unwrap_err();
        let SpecError::Semantic(err) = err else {
            panic!("expected a semantic error, got {err}");
        };
        assert!(err.message().contains("Missing"), "{err}");
    }

    #[test]
    fn attribute_type_mismatches_are_rejected() {
        assert!(compile("let A = integer { signed: 3; };").is_err());
        assert!(compile("let A = integer { endian: 'middle'; };").is_err());
        assert!(compile("let A = struct { @span: 'wide'; };").is_err());
        assert!(compile("let A = struct { @speling: 1; };").is_err());
    }

    #[test]
    fn duplicate_definitions_are_rejected() {
        assert!(compile("let A = byte; let A = byte;").is_err());
        assert!(compile("let A = struct { x: byte; x: byte; };").is_err());
        assert!(compile("file {} file {}").is_err());
    }

    #[test]
    fn unbounded_recursion_is_rejected() {
        let err = compile("let A = struct { a: A; };").unwrap_err();
        assert!(err.to_string().contains("recursively"), "{err}");
        assert!(compile("let A = struct { a: [2] A; @span: 8; };").is_err());
    }

    #[test]
    fn bounded_recursion_is_accepted() {
        // Greedy arrays stop when their container runs dry
        compile("let A = struct { header: [4] byte; children: [] A; };").unwrap();
        // A codec's decoded buffer bounds everything behind it
        compile("let A = struct { inner: [] byte <> snappy <> A; };").unwrap();
        // Count fields are data-bounded
        compile(
            "let A = struct {
                n: byte <> integer { signed: false; };
                children: [n] A;
            };",
        )
        .unwrap();
    }

    #[test]
    fn span_arithmetic_is_checked() {
        let err = compile("let A = struct { x: [40] byte; @span: 32; };").unwrap_err();
        assert!(err.to_string().contains("@span"), "{err}");
        // Greedy trailers absorb the remainder and are fine
        compile("let A = struct { x: [4] byte; rest: [] byte; @span: 32; };").unwrap();
    }

    #[test]
    fn filters_cannot_stand_alone_in_layout() {
        assert!(compile("let F = integer {}; file { x: F; }").is_err());
        assert!(compile("file { x: varint; }").is_err());
        // ...but are fine as the target of a chain
        compile("let F = integer {}; file { x: [4] byte <> F; }").unwrap();
    }

    #[test]
    fn aliases_are_transparent() {
        let schema = compile("let A = [4] byte; let B = A;").unwrap();
        let b = schema.lookup("B").unwrap();
        assert_eq!(schema.static_size(b), Some(4));
    }

    #[test]
    fn snappy_requires_registration() {
        use binspect_filters::FilterRegistry;
        use std::sync::Arc;
        let err = crate::compile_with(
            "let C = [] byte <> snappy;",
            Arc::new(FilterRegistry::empty()),
        )
        .unwrap_err();
        assert!(err.to_string().contains("snappy"), "{err}");
        let schema = compile("let C = [] byte <> snappy;").unwrap();
        let c = schema.lookup("C").unwrap();
        let SchemaNode::Chain(elems) = schema.node(c) else {
            panic!("expected chain");
        };
        assert!(matches!(
            schema.node(elems[1]),
            SchemaNode::Filter(FilterKind::Codec(name)) if name == "snappy"
        ));
    }
}
