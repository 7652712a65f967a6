//! Value sanitizers applied before INSERT compilation.
//!
//! `compile_insert` embeds values verbatim, so whatever makes a value safe to
//! place inside a single-quoted literal has to happen here.

/// Rewrites a non-null cell value before it is compiled into SQL.
pub trait ValueSanitizer: Send + Sync {
    fn sanitize(&self, value: &str) -> String;
}

/// Doubles single quotes so values survive inside `'...'` literals.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuoteDoubling;

impl ValueSanitizer for QuoteDoubling {
    fn sanitize(&self, value: &str) -> String {
        value.replace('\'', "''")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_doubling() {
        assert_eq!(QuoteDoubling.sanitize("O'Brien"), "O''Brien");
        assert_eq!(QuoteDoubling.sanitize("plain"), "plain");
    }
}
