//! The textual form of a format spec: grammar over the token layer in
//! [`lex`], producing the unresolved AST in [`crate::ast`]

use nom::{
    branch::alt,
    combinator::{all_consuming, map, opt, value},
    error::{VerboseError, VerboseErrorKind},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::ast::{AttrAssign, Expr, Spec, StructBody, StructItem, TopItem, TypeExpr};
use crate::expression::BinOp;

type Res<T, U> = IResult<T, U, VerboseError<T>>;

mod lex;
use lex::{identifier, integer_literal, keyword, lexeme, string_value, sym};

mod error;
pub use error::ParseError;

/// Parses full spec text (top-level `let`s and a `file` block)
pub(crate) fn parse_spec(text: &str) -> Result<Spec, ParseError<'_>> {
    let (_, items) = all_consuming(terminated(many0(top_item), lex::sp))(text)
        .map_err(|e| into_parse_error(text, e))?;
    Ok(Spec { items })
}

/// Parses a standalone expression, as accepted by tree queries
pub(crate) fn parse_expr_text(text: &str) -> Result<Expr, ParseError<'_>> {
    let (_, parsed) = all_consuming(terminated(expr, lex::sp))(text)
        .map_err(|e| into_parse_error(text, e))?;
    Ok(parsed)
}

fn into_parse_error<'a>(text: &'a str, e: nom::Err<VerboseError<&'a str>>) -> ParseError<'a> {
    let e = match e {
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
        nom::Err::Incomplete(_) => unreachable!("complete parsers never suspend"),
    };
    let mut error = None;
    for (remainder, kind) in e.errors.iter().rev() {
        error = Some(ParseError::new(
            match kind {
                VerboseErrorKind::Context(c) => format!("Invalid token while looking for: {c}"),
                VerboseErrorKind::Nom(p) => format!("Invalid token while looking for: {p:?}"),
                VerboseErrorKind::Char(c) => format!("Expected character: {c:?}"),
            },
            text,
            remainder,
            error.map(Box::new),
        ));
    }
    error.unwrap_or_else(|| ParseError::new("Unparseable input".into(), text, text, None))
}

// --- spec structure ---------------------------------------------------------

fn top_item(s: &str) -> Res<&str, TopItem> {
    alt((
        map(
            tuple((
                keyword("let"),
                identifier,
                sym("="),
                type_expr,
                sym(";"),
            )),
            |(_, name, _, ty, _)| TopItem::Let {
                name: name.to_owned(),
                ty,
            },
        ),
        map(preceded(keyword("file"), struct_body), TopItem::File),
    ))(s)
}

fn type_expr(s: &str) -> Res<&str, TypeExpr> {
    map(separated_list1(sym("<>"), type_atom), |mut elems| {
        if elems.len() == 1 {
            elems.pop().unwrap()
        } else {
            TypeExpr::Chain(elems)
        }
    })(s)
}

fn type_atom(s: &str) -> Res<&str, TypeExpr> {
    alt((
        value(TypeExpr::Byte, keyword("byte")),
        map(
            tuple((sym("["), opt(expr), sym("]"), type_atom)),
            |(_, count, _, elem)| TypeExpr::Array {
                count: count.map(Box::new),
                elem: Box::new(elem),
            },
        ),
        map(preceded(keyword("struct"), struct_body), TypeExpr::Struct),
        map(
            pair(keyword("integer"), opt(attr_block)),
            |(_, attrs)| TypeExpr::Named {
                name: "integer".to_owned(),
                attrs: attrs.unwrap_or_default(),
            },
        ),
        map(pair(identifier, opt(attr_block)), |(name, attrs)| {
            TypeExpr::Named {
                name: name.to_owned(),
                attrs: attrs.unwrap_or_default(),
            }
        }),
    ))(s)
}

fn struct_body(s: &str) -> Res<&str, StructBody> {
    map(
        delimited(sym("{"), many0(struct_item), sym("}")),
        |items| StructBody { items },
    )(s)
}

fn struct_item(s: &str) -> Res<&str, StructItem> {
    alt((
        map(struct_attr, StructItem::Attr),
        map(
            tuple((
                keyword("let"),
                opt(sym("?")),
                identifier,
                sym("="),
                expr,
                sym(";"),
            )),
            |(_, computed, name, _, expr, _)| StructItem::Let {
                name: name.to_owned(),
                computed: computed.is_some(),
                expr,
            },
        ),
        map(
            tuple((
                keyword("if"),
                delimited(sym("("), expr, sym(")")),
                delimited(sym("{"), many0(field), sym("}")),
            )),
            |(_, guard, fields)| StructItem::Cond { guard, fields },
        ),
        map(field, |(name, ty)| StructItem::Field { name, ty }),
    ))(s)
}

// Struct bodies require the @ prefix so attributes and field syntax stay
// distinct
fn struct_attr(s: &str) -> Res<&str, AttrAssign> {
    map(
        tuple((sym("@"), identifier, sym(":"), expr, sym(";"))),
        |(_, name, _, value, _)| AttrAssign {
            name: name.to_owned(),
            value,
        },
    )(s)
}

// Filter attribute blocks accept both `@signed: ...` and `signed: ...`
fn attr_block(s: &str) -> Res<&str, Vec<AttrAssign>> {
    delimited(
        sym("{"),
        many0(map(
            tuple((opt(sym("@")), identifier, sym(":"), expr, sym(";"))),
            |(_, name, _, value, _)| AttrAssign {
                name: name.to_owned(),
                value,
            },
        )),
        sym("}"),
    )(s)
}

fn field(s: &str) -> Res<&str, (Option<String>, TypeExpr)> {
    alt((
        map(
            tuple((identifier, sym(":"), type_expr, sym(";"))),
            |(name, _, ty, _)| (Some(name.to_owned()), ty),
        ),
        map(terminated(type_expr, sym(";")), |ty| (None, ty)),
    ))(s)
}

// --- expressions ------------------------------------------------------------

pub(crate) fn expr(s: &str) -> Res<&str, Expr> {
    let cmp_op = alt((
        value(BinOp::Eq, sym("==")),
        value(BinOp::Ne, sym("!=")),
        value(BinOp::Le, sym("<=")),
        value(BinOp::Ge, sym(">=")),
        value(BinOp::Lt, sym("<")),
        value(BinOp::Gt, sym(">")),
    ));
    map(
        pair(add_expr, opt(pair(cmp_op, add_expr))),
        |(lhs, rest)| match rest {
            None => lhs,
            Some((op, rhs)) => Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
        },
    )(s)
}

fn add_expr(s: &str) -> Res<&str, Expr> {
    let add_op = alt((value(BinOp::Add, sym("+")), value(BinOp::Sub, sym("-"))));
    map(pair(mul_expr, many0(pair(add_op, mul_expr))), fold_binary)(s)
}

fn mul_expr(s: &str) -> Res<&str, Expr> {
    let mul_op = alt((
        value(BinOp::Mul, sym("*")),
        value(BinOp::Div, sym("/")),
        value(BinOp::Rem, sym("%")),
    ));
    map(
        pair(postfix_expr, many0(pair(mul_op, postfix_expr))),
        fold_binary,
    )(s)
}

fn fold_binary((first, rest): (Expr, Vec<(BinOp, Expr)>)) -> Expr {
    rest.into_iter().fold(first, |lhs, (op, rhs)| {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    })
}

enum Postfix {
    Member(String),
    Index(Expr),
    Slice(Option<Expr>, Option<Expr>),
    Overlay(TypeExpr),
}

fn postfix_expr(s: &str) -> Res<&str, Expr> {
    map(pair(primary, many0(postfix_op)), |(base, ops)| {
        ops.into_iter().fold(base, |base, op| match op {
            Postfix::Member(name) => Expr::Member(Box::new(base), name),
            Postfix::Index(index) => Expr::Index(Box::new(base), Box::new(index)),
            Postfix::Slice(lo, hi) => {
                Expr::Slice(Box::new(base), lo.map(Box::new), hi.map(Box::new))
            }
            Postfix::Overlay(ty) => Expr::Overlay(Box::new(base), Box::new(ty)),
        })
    })(s)
}

fn postfix_op(s: &str) -> Res<&str, Postfix> {
    alt((
        map(preceded(sym("."), identifier), |name| {
            Postfix::Member(name.to_owned())
        }),
        map(
            delimited(
                sym("["),
                tuple((opt(expr), sym(".."), opt(expr))),
                sym("]"),
            ),
            |(lo, _, hi)| Postfix::Slice(lo, hi),
        ),
        map(delimited(sym("["), expr, sym("]")), Postfix::Index),
        map(preceded(sym("<>"), type_atom), Postfix::Overlay),
    ))(s)
}

fn primary(s: &str) -> Res<&str, Expr> {
    alt((
        map(integer_literal, Expr::Int),
        map(string_value, Expr::Str),
        value(Expr::Bool(true), keyword("true")),
        value(Expr::Bool(false), keyword("false")),
        map(
            preceded(keyword("sizeof"), delimited(sym("("), expr, sym(")"))),
            |inner| Expr::SizeOf(Box::new(inner)),
        ),
        map(
            preceded(keyword("len"), delimited(sym("("), expr, sym(")"))),
            |inner| Expr::Len(Box::new(inner)),
        ),
        map(preceded(sym("?"), identifier), |name| {
            Expr::Binding(name.to_owned())
        }),
        value(Expr::File, keyword("file")),
        map(identifier, |name| Expr::Ident(name.to_owned())),
        delimited(sym("("), lexeme(expr), sym(")")),
    ))(s)
}

#[cfg(test)]
mod tests;
