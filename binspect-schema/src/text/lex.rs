//! Token-level parsers shared by the spec grammar and the expression grammar

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while_m_n},
    character::complete::{alpha1, alphanumeric1, char, multispace1, oct_digit1, one_of},
    combinator::{map, map_opt, not, opt, peek, recognize, value},
    multi::{many0, many1},
    sequence::{delimited, pair, preceded, terminated},
};

use super::Res;

/// Reserved words that can never be identifiers
pub const KEYWORDS: &[&str] = &[
    "let", "file", "struct", "integer", "if", "byte", "sizeof", "len", "true", "false",
];

/// Skips any run of whitespace and `//` line comments
pub fn sp(s: &str) -> Res<&str, &str> {
    recognize(many0(alt((
        multispace1,
        recognize(pair(tag("//"), opt(is_not("\r\n")))),
    ))))(s)
}

/// Wraps a parser to skip leading whitespace and comments
pub fn lexeme<'a, O, P>(inner: P) -> impl FnMut(&'a str) -> Res<&'a str, O>
where
    P: nom::Parser<&'a str, O, nom::error::VerboseError<&'a str>>,
{
    preceded(sp, inner)
}

/// Matches a punctuation token such as `;`, `{` or `<>`
pub fn sym<'a>(token: &'static str) -> impl FnMut(&'a str) -> Res<&'a str, &'a str> {
    lexeme(tag(token))
}

/// Matches a keyword, rejecting identifiers that merely start with it
pub fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> Res<&'a str, &'a str> {
    lexeme(terminated(
        tag(word),
        not(peek(alt((alphanumeric1, tag("_"))))),
    ))
}

fn identifier_chars(s: &str) -> Res<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(s)
}

/// An identifier that is not a reserved word
pub fn identifier(s: &str) -> Res<&str, &str> {
    let (rest, name) = lexeme(identifier_chars)(s)?;
    if KEYWORDS.contains(&name) {
        Err(nom::Err::Error(nom::error::VerboseError {
            errors: vec![(
                s,
                nom::error::VerboseErrorKind::Context("identifier (found keyword)"),
            )],
        }))
    } else {
        Ok((rest, name))
    }
}

/// An integer literal: decimal, octal with a leading `0`, or hex with `0x`
///
/// A literal must end at a non-word boundary, so `42a`, `0abc`, `08` and
/// `0xffeeg` are all rejected outright rather than partially consumed.
pub fn integer_literal(s: &str) -> Res<&str, i128> {
    lexeme(terminated(
        alt((hex_literal, octal_literal, decimal_literal)),
        not(peek(alt((alphanumeric1, tag("_"))))),
    ))(s)
}

fn hex_literal(s: &str) -> Res<&str, i128> {
    map_opt(
        preceded(
            tag("0x"),
            recognize(many1(one_of("0123456789abcdefABCDEF"))),
        ),
        |digits| i128::from_str_radix(digits, 16).ok(),
    )(s)
}

fn octal_literal(s: &str) -> Res<&str, i128> {
    map_opt(
        preceded(peek(char('0')), recognize(oct_digit1)),
        |digits| i128::from_str_radix(digits, 8).ok(),
    )(s)
}

fn decimal_literal(s: &str) -> Res<&str, i128> {
    map_opt(
        recognize(many1(one_of("0123456789"))),
        |digits: &str| digits.parse().ok(),
    )(s)
}

/// A string value: one or more adjacent quoted literals, concatenated
pub fn string_value(s: &str) -> Res<&str, String> {
    map(many1(lexeme(quoted_literal)), |parts| parts.concat())(s)
}

fn quoted_literal(s: &str) -> Res<&str, String> {
    alt((quoted_by('\''), quoted_by('"')))(s)
}

fn quoted_by<'a>(quote: char) -> impl FnMut(&'a str) -> Res<&'a str, String> {
    move |s| {
        delimited(
            char(quote),
            map(
                many0(alt((escape_sequence, map(plain_char(quote), String::from)))),
                |parts| parts.concat(),
            ),
            char(quote),
        )(s)
    }
}

fn plain_char<'a>(quote: char) -> impl FnMut(&'a str) -> Res<&'a str, char> {
    move |s| {
        map_opt(nom::character::complete::anychar, |c| {
            (c != quote && c != '\\' && c != '\n').then_some(c)
        })(s)
    }
}

fn escape_sequence(s: &str) -> Res<&str, String> {
    preceded(
        char('\\'),
        alt((
            value(String::from("\n"), char('n')),
            value(String::from("\r"), char('r')),
            value(String::from("\t"), char('t')),
            value(String::from("\\"), char('\\')),
            value(String::from("'"), char('\'')),
            value(String::from("\""), char('"')),
            hex_escape,
            octal_escape,
        )),
    )(s)
}

// \xHH
fn hex_escape(s: &str) -> Res<&str, String> {
    map_opt(
        preceded(
            char('x'),
            take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
        ),
        |digits| {
            u32::from_str_radix(digits, 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
        },
    )(s)
}

// \NNN (octal, up to three digits; also covers \0)
fn octal_escape(s: &str) -> Res<&str, String> {
    map_opt(
        take_while_m_n(1, 3, |c: char| ('0'..='7').contains(&c)),
        |digits: &str| {
            u32::from_str_radix(digits, 8)
                .ok()
                .filter(|&v| v <= 0xff)
                .and_then(char::from_u32)
                .map(String::from)
        },
    )(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all<'a, O>(
        mut parser: impl FnMut(&'a str) -> Res<&'a str, O>,
        input: &'a str,
    ) -> Result<O, String> {
        match parser(input) {
            Ok(("", out)) => Ok(out),
            Ok((rest, _)) => Err(format!("trailing input: {rest:?}")),
            Err(e) => Err(e.to_string()),
        }
    }

    #[test]
    fn identifiers() {
        assert_eq!(all(identifier, "head_blocks").unwrap(), "head_blocks");
        assert_eq!(all(identifier, "  _x9").unwrap(), "_x9");
        assert!(all(identifier, "struct").is_err());
        assert!(all(identifier, "9lives").is_err());
    }

    #[test]
    fn integer_radixes() {
        assert_eq!(all(integer_literal, "0").unwrap(), 0);
        assert_eq!(all(integer_literal, "123456789").unwrap(), 123456789);
        assert_eq!(all(integer_literal, "42000000000000").unwrap(), 42000000000000);
        assert_eq!(all(integer_literal, "07").unwrap(), 7);
        assert_eq!(all(integer_literal, "01234567").unwrap(), 0o1234567);
        assert_eq!(all(integer_literal, "0xdeadbeef").unwrap(), 0xdeadbeef);
        assert_eq!(
            all(integer_literal, "0xdeadbeefbadf00d").unwrap(),
            0xdeadbeefbadf00d
        );
    }

    #[test]
    fn malformed_integers() {
        assert!(all(integer_literal, "0abc").is_err());
        assert!(all(integer_literal, "0xffeeg").is_err());
        assert!(all(integer_literal, "42a").is_err());
        assert!(all(integer_literal, "08").is_err());
    }

    #[test]
    fn quoted_strings() {
        assert_eq!(all(string_value, r#""hi""#).unwrap(), "hi");
        assert_eq!(all(string_value, "'hello'").unwrap(), "hello");
        assert_eq!(
            all(string_value, r"'how\nare\nyou'").unwrap(),
            "how\nare\nyou"
        );
        assert_eq!(all(string_value, r"'\r\t\n'").unwrap(), "\r\t\n");
        assert_eq!(all(string_value, r#""\r\t\n""#).unwrap(), "\r\t\n");
        assert_eq!(
            all(string_value, r"'\0\x00\377'").unwrap(),
            "\0\0\u{ff}"
        );
    }

    #[test]
    fn adjacent_literals_concatenate() {
        assert_eq!(
            all(string_value, "'multi'' ' 'part' ' ''string'").unwrap(),
            "multi part string"
        );
        assert_eq!(all(string_value, "'a'\n    'b'").unwrap(), "ab");
    }

    #[test]
    fn comments_are_whitespace() {
        assert_eq!(all(identifier, "// note\n  name").unwrap(), "name");
    }
}
