use thiserror::Error;

/// Errors produced when parsing a condition expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error in '{expression}': {message}")]
pub struct ParseError {
    expression: String,
    message: String,
}

impl ParseError {
    pub(crate) fn new(expression: &str, message: impl Into<String>) -> Self {
        Self {
            expression: expression.to_owned(),
            message: message.into(),
        }
    }

    /// The expression that failed to parse.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ParseError::new("a >", "unexpected end of input");
        assert_eq!(
            err.to_string(),
            "parse error in 'a >': unexpected end of input"
        );
        assert_eq!(err.expression(), "a >");
    }
}
