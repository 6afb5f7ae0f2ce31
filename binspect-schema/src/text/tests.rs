use super::*;
use crate::ast;

fn parse_ok(text: &str) -> Spec {
    match parse_spec(text) {
        Ok(spec) => spec,
        Err(e) => panic!("spec failed to parse:\n{e}"),
    }
}

fn expr_ok(text: &str) -> Expr {
    match parse_expr_text(text) {
        Ok(expr) => expr,
        Err(e) => panic!("expression failed to parse:\n{e}"),
    }
}

#[test]
fn log_format_spec_parses() {
    let spec = parse_ok(
        "
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
        ",
    );
    assert_eq!(spec.items.len(), 8);
    let file = spec
        .items
        .iter()
        .find_map(|i| match i {
            TopItem::File(body) => Some(body),
            _ => None,
        })
        .expect("file block");
    assert_eq!(file.items.len(), 2);
}

#[test]
fn chains_group_left_to_right() {
    let spec = parse_ok("let C = [] byte <> snappy <> DataBlock;");
    let TopItem::Let { ty, .. } = &spec.items[0] else {
        panic!("expected let");
    };
    let TypeExpr::Chain(elems) = ty else {
        panic!("expected chain, got {ty:?}");
    };
    assert_eq!(elems.len(), 3);
    assert!(matches!(&elems[0], TypeExpr::Array { count: None, .. }));
    assert!(
        matches!(&elems[1], TypeExpr::Named { name, .. } if name == "snappy")
    );
}

#[test]
fn filter_attributes_accept_both_spellings() {
    parse_ok("let A = integer { signed: false; endian: 'little'; };");
    parse_ok("let B = integer { @signed: false; @endian: 'big'; };");
}

#[test]
fn struct_attributes_require_the_sigil() {
    // Without @, `span: 32768;` would be a field named span of type 32768,
    // which is not a type
    assert!(parse_spec("let A = struct { span: 32768; };").is_err());
    parse_ok("let A = struct { @span: 32768; };");
}

#[test]
fn conditional_fields_and_anonymous_fields() {
    let spec = parse_ok(
        "
        let FileBlock = struct {
            if (trailer.blocktype == 0) { // uncompressed
                DataBlock;
            }
            if (trailer.blocktype == 1) {
                CompressedDataBlock;
            }
            trailer: BlockTrailer;
        };
        ",
    );
    let TopItem::Let { ty: TypeExpr::Struct(body), .. } = &spec.items[0] else {
        panic!("expected struct");
    };
    assert_eq!(body.items.len(), 3);
    assert!(matches!(
        &body.items[0],
        ast::StructItem::Cond { fields, .. } if fields.len() == 1 && fields[0].0.is_none()
    ));
}

#[test]
fn computed_bindings_parse() {
    let spec = parse_ok(
        "
        let BlockHandle = struct {
            offset: VarInt;
            size:   VarInt;

            let ?stored_block =
                file.payload[offset .. offset + size + sizeof(BlockTrailer)]
                     <> FileBlock;
        };
        ",
    );
    let TopItem::Let { ty: TypeExpr::Struct(body), .. } = &spec.items[0] else {
        panic!("expected struct");
    };
    let ast::StructItem::Let { name, computed, .. } = &body.items[2] else {
        panic!("expected let item, got {:?}", body.items[2]);
    };
    assert_eq!(name, "stored_block");
    assert!(*computed);
}

#[test]
fn syntax_errors_carry_location() {
    // A broken item is reported from the point parsing could not continue
    let err = parse_spec("let A = byte;\nlet B = struct {\n    oops\n};").unwrap_err();
    assert_eq!(err.line_number(), 2);
    let rendered = err.to_string();
    assert!(rendered.contains('^'), "no caret in:\n{rendered}");

    // Expression errors point at the offending token
    let err = parse_expr_text("a[").unwrap_err();
    assert_eq!(err.line_number(), 1);
    assert_eq!(err.column_number(), 1);
}

#[test]
fn expression_paths_and_postfix() {
    assert_eq!(
        expr_ok("a.b.c"),
        Expr::Member(
            Box::new(Expr::Member(
                Box::new(Expr::Ident("a".into())),
                "b".into()
            )),
            "c".into()
        )
    );
    assert!(matches!(expr_ok("tail_block.records[2]"), Expr::Index(..)));
    assert!(matches!(expr_ok("payload[..]"), Expr::Slice(_, None, None)));
    assert!(matches!(
        expr_ok("payload[4 .. 8]"),
        Expr::Slice(_, Some(_), Some(_))
    ));
    assert!(matches!(
        expr_ok("contents_struct.a <> [] byte"),
        Expr::Overlay(..)
    ));
    assert!(matches!(
        expr_ok("(contents_struct.a <> [] byte)[..]"),
        Expr::Slice(..)
    ));
}

#[test]
fn expression_operators_and_precedence() {
    let Expr::Binary(BinOp::Add, lhs, _) = expr_ok("1 + 2 * 3 + 4") else {
        panic!("expected +");
    };
    assert!(matches!(*lhs, Expr::Binary(BinOp::Add, ..)));
    assert!(matches!(
        expr_ok("trailer.blocktype == 1"),
        Expr::Binary(BinOp::Eq, ..)
    ));
    assert!(matches!(expr_ok("sizeof (u32)"), Expr::SizeOf(_)));
    assert!(matches!(expr_ok("len(values)"), Expr::Len(_)));
    assert!(matches!(expr_ok("?index"), Expr::Binding(_)));
}

#[test]
fn malformed_expressions_are_rejected() {
    assert!(parse_expr_text("0abc").is_err());
    assert!(parse_expr_text("42a").is_err());
    assert!(parse_expr_text("08").is_err());
    assert!(parse_expr_text("a .. b").is_err());
    assert!(parse_expr_text("a[").is_err());
    assert!(parse_expr_text("").is_err());
}
