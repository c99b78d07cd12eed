mod error;
mod grammar;
mod scan;

pub use error::ParseError;

use crate::Expr;

/// Parse a condition expression into an [`Expr`].
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not a valid expression.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    use winnow::Parser;
    grammar::parse_expression.parse(input).map_err(|e| {
        let detail = e.inner().to_string();
        let message = if detail.is_empty() {
            format!("unexpected input at offset {}", e.offset())
        } else {
            format!("{detail} at offset {}", e.offset())
        };
        ParseError::new(input, message)
    })
}

/// Variable names an expression mentions, in first-appearance order.
///
/// This is a lexical scan, not a parse: string literals, numbers and keywords
/// are skipped and anything identifier-like is reported, so it also works on
/// conditions the reference evaluator cannot interpret.
#[must_use]
pub fn references(input: &str) -> Vec<String> {
    let mut rest = input;
    scan::scan_references(&mut rest)
        .map(|names| names.into_iter().map(str::to_owned).collect())
        .unwrap_or_default()
}
