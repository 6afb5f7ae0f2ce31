//! Resolved expressions, as stored in a [`Schema`](crate::Schema) and
//! evaluated against live data trees

use std::fmt::Display;

use crate::SchemaId;

/// An expression whose embedded type references have been resolved
///
/// Expressions appear in schemas as array counts, conditional guards and
/// `let` bindings, and are also produced on the fly when evaluating query
/// text against a tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// An integer literal
    Int(i128),
    /// A string literal (adjacent literals already concatenated)
    Str(String),
    /// A boolean literal
    Bool(bool),
    /// A name, resolved in lexical scope at evaluation time
    Ident(String),
    /// A computed binding reference, `?name`
    Binding(String),
    /// The `file` keyword: the root node
    File,
    /// `expr.name`
    Member(Box<Expr>, String),
    /// `expr[index]`
    Index(Box<Expr>, Box<Expr>),
    /// `expr[lo .. hi]`, either bound optional
    Slice(Box<Expr>, Option<Box<Expr>>, Option<Box<Expr>>),
    /// `expr <> Type`: reinterpret the bytes of `expr` through a schema node
    Overlay(Box<Expr>, SchemaId),
    /// `sizeof(expr)`; the operand may also name a fixed-width type
    SizeOf(Box<Expr>),
    /// `len(expr)`
    Len(Box<Expr>),
    /// Arithmetic or comparison
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

/// A binary operator usable in spec expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        })
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Int(v) => write!(f, "{v}"),
            Expr::Str(s) => write!(f, "{s:?}"),
            Expr::Bool(b) => write!(f, "{b}"),
            Expr::Ident(name) => f.write_str(name),
            Expr::Binding(name) => write!(f, "?{name}"),
            Expr::File => f.write_str("file"),
            Expr::Member(base, name) => write!(f, "{base}.{name}"),
            Expr::Index(base, index) => write!(f, "{base}[{index}]"),
            Expr::Slice(base, lo, hi) => {
                write!(f, "{base}[")?;
                if let Some(lo) = lo {
                    write!(f, "{lo} ")?;
                }
                write!(f, "..")?;
                if let Some(hi) = hi {
                    write!(f, " {hi}")?;
                }
                write!(f, "]")
            }
            Expr::Overlay(base, _) => write!(f, "{base} <> <type>"),
            Expr::SizeOf(inner) => write!(f, "sizeof({inner})"),
            Expr::Len(inner) => write!(f, "len({inner})"),
            Expr::Binary(op, lhs, rhs) => write!(f, "{lhs} {op} {rhs}"),
        }
    }
}
