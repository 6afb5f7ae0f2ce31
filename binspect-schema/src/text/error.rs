use std::fmt::Display;

/// A detailed error for an issue encountered while parsing spec or query text
///
/// Borrows the offending text so the diagnostic can point into it; convert to
/// [`crate::SpecError`] for an owned form.
#[derive(Debug, PartialEq)]
pub struct ParseError<'a> {
    message: String,
    text: &'a str,
    span: &'a str,
    cause: Option<Box<ParseError<'a>>>,
}

impl<'a> ParseError<'a> {
    /// Constructs a new error pointing at `span` within `text`
    pub fn new(
        message: String,
        text: &'a str,
        span: &'a str,
        cause: Option<Box<ParseError<'a>>>,
    ) -> ParseError<'a> {
        ParseError {
            message,
            text,
            span,
            cause,
        }
    }

    /// The short message, without the rendered source context
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 1-based line number of the span within the text
    pub fn line_number(&self) -> usize {
        let offset = self.offset();
        self.text[..offset].chars().filter(|&c| c == '\n').count() + 1
    }

    /// 0-based column of the span within its line
    pub fn column_number(&self) -> usize {
        let offset = self.offset();
        offset - self.text[..offset].rfind('\n').map(|p| p + 1).unwrap_or(0)
    }

    fn offset(&self) -> usize {
        (self.span.as_ptr() as usize - self.text.as_ptr() as usize).min(self.text.len())
    }
}

impl Display for ParseError<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lineno = self.line_number();
        let source_line = self.text.lines().nth(lineno - 1).unwrap_or("<EOF>");
        let column = self.column_number().min(source_line.len());
        writeln!(f, "Error: {}", self.message)?;
        writeln!(f, "     |")?;
        writeln!(f, "{lineno:4} | {source_line}")?;
        writeln!(f, "     | {0:1$}^", "", column)?;
        if let Some(cause) = &self.cause {
            write!(f, "{cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError<'_> {}
