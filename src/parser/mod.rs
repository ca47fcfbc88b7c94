//! Python front end.
//!
//! Source text is parsed by `rustpython-parser`. Before the parser runs, the
//! token stream is scanned for nesting that would build a tree too deep for
//! the recursive walks that follow (see [`check_nesting`]).

mod nesting;

pub use nesting::{check_nesting, MAX_DEPTH, MAX_INDENT, MAX_NESTING};

use rustpython_parser::ast;
use rustpython_parser::Parse;
use rustpython_parser::text_size::TextSize;

const SOURCE_PATH: &str = "<submission>";

/// A parse failure with the 1-based line it was detected on.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
}

/// Maps byte offsets to 1-based line numbers.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    pub fn line(&self, offset: usize) -> usize {
        self.starts.partition_point(|&start| start <= offset)
    }

    pub fn line_at(&self, offset: TextSize) -> usize {
        self.line(usize::from(offset))
    }
}

/// Statements of a parsed module and the line table to locate them.
#[derive(Debug)]
pub struct Parsed {
    pub body: ast::Suite,
    pub lines: LineIndex,
}

pub fn parse_module(source: &str) -> Result<Parsed, ParseError> {
    let lines = LineIndex::new(source);
    check_nesting(source, &lines)?;
    let body = ast::Suite::parse(source, SOURCE_PATH).map_err(|err| ParseError {
        message: err.error.to_string(),
        line: lines.line_at(err.offset),
    })?;
    Ok(Parsed { body, lines })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index() {
        let lines = LineIndex::new("a = 1\nb = 2\n\nc");
        assert_eq!(lines.line(0), 1);
        assert_eq!(lines.line(5), 1);
        assert_eq!(lines.line(6), 2);
        assert_eq!(lines.line(12), 3);
        assert_eq!(lines.line(13), 4);
    }

    #[test]
    fn test_parse_statements() {
        let parsed = parse_module("x = 1; y = 2\nprint(x + y)").unwrap();
        assert_eq!(parsed.body.len(), 3);
    }

    #[test]
    fn test_compound_statements_parse() {
        let source = "\
import os
def f(x, y=1, *args, **kw):
    return x
for i in range(3):
    continue
try:
    x
except ValueError as err:
    y
with open('f') as fh:
    data = fh
";
        assert_eq!(parse_module(source).unwrap().body.len(), 5);
    }

    #[test]
    fn test_syntax_errors_carry_line() {
        let err = parse_module("x = 1\ny = = 2").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(parse_module("x = (1").is_err());
        assert!(parse_module("  x = 1").is_err());
    }

    #[test]
    fn test_deep_brackets_fail_before_parsing() {
        let source = format!("x = {}1{}", "[".repeat(10_000), "]".repeat(10_000));
        let err = parse_module(&source).unwrap_err();
        assert_eq!(err.message, "too many nested parentheses");
        assert_eq!(err.line, 1);
    }
}
