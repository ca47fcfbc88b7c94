//! Nesting bounds checked on the token stream.
//!
//! Every later pass over a tree is recursive, so a submission whose
//! brackets, blocks or operator chains would nest past these bounds is
//! refused as a syntax error before a tree is built.

use super::{LineIndex, ParseError};
use rustpython_parser::lexer::lex;
use rustpython_parser::text_size::TextRange;
use rustpython_parser::{Mode, Tok};

/// Deepest bracket nesting accepted, as in CPython's tokenizer.
pub const MAX_NESTING: usize = 200;
/// Deepest block nesting accepted.
pub const MAX_INDENT: usize = 100;
/// Deepest expression tree accepted.
pub const MAX_DEPTH: usize = 300;

/// Depth budget of one bracket level.
///
/// `ops` counts the tokens of the current comma-separated segment that can
/// each add a tree level, `inner` is the deepest bracket closed inside that
/// segment and `widest` the deepest segment already finished.
#[derive(Debug, Default)]
struct Level {
    ops: usize,
    inner: usize,
    widest: usize,
}

impl Level {
    fn segment(&self) -> usize {
        self.ops + self.inner
    }

    fn end_segment(&mut self) {
        self.widest = self.widest.max(self.segment());
        self.ops = 0;
        self.inner = 0;
    }

    fn depth(&self) -> usize {
        self.widest.max(self.segment())
    }
}

#[derive(Debug, Default)]
struct Levels {
    root: Level,
    open: Vec<Level>,
}

impl Levels {
    fn current(&mut self) -> &mut Level {
        match self.open.last_mut() {
            Some(level) => level,
            None => &mut self.root,
        }
    }

    fn close(&mut self) {
        if let Some(closed) = self.open.pop() {
            let parent = self.current();
            parent.inner = parent.inner.max(closed.depth());
        }
    }

    /// Upper bound on the depth of the node under the current token.
    fn depth(&self) -> usize {
        self.root.segment() + self.open.iter().map(Level::segment).sum::<usize>()
    }
}

/// Refuse `source` if it nests deeper than the walks over its tree allow.
pub fn check_nesting(source: &str, lines: &LineIndex) -> Result<(), ParseError> {
    let mut levels = Levels::default();
    let mut indent = 0usize;
    for token in lex(source, Mode::Module) {
        // Lexical errors are reported by the parser.
        let Ok((tok, range)) = token else {
            break;
        };
        let error = |message: &str| ParseError {
            message: message.to_string(),
            line: lines.line_at(range.start()),
        };
        match tok {
            Tok::Lpar | Tok::Lsqb | Tok::Lbrace => {
                if levels.open.len() >= MAX_NESTING {
                    return Err(error("too many nested parentheses"));
                }
                levels.current().ops += 1;
                levels.open.push(Level::default());
            }
            Tok::Rpar | Tok::Rsqb | Tok::Rbrace => levels.close(),
            Tok::Comma | Tok::Semi | Tok::Newline => levels.current().end_segment(),
            Tok::Indent => {
                indent += 1;
                if indent > MAX_INDENT {
                    return Err(error("too many levels of indentation"));
                }
            }
            Tok::Dedent => indent = indent.saturating_sub(1),
            Tok::String { .. } => {
                let (brackets, ops) = fstring_fields(token_text(source, range));
                if levels.open.len() + brackets > MAX_NESTING {
                    return Err(error("too many nested parentheses"));
                }
                levels.current().ops += ops;
            }
            Tok::Name { .. }
            | Tok::Int { .. }
            | Tok::Float { .. }
            | Tok::Complex { .. } => {}
            _ => levels.current().ops += 1,
        }
        if levels.depth() > MAX_DEPTH {
            return Err(error("expression too deeply nested"));
        }
    }
    Ok(())
}

fn token_text(source: &str, range: TextRange) -> &str {
    source
        .get(usize::from(range.start())..usize::from(range.end()))
        .unwrap_or("")
}

/// Bracket depth and a count of operators and words inside the replacement
/// fields of an f-string token. Plain strings give zeros.
///
/// The parser builds a tree for each replacement field, so the fields count
/// towards the same bounds as ordinary code.
fn fstring_fields(text: &str) -> (usize, usize) {
    let prefix = text.split(['\'', '"']).next().unwrap_or("");
    if !prefix.contains(['f', 'F']) {
        return (0, 0);
    }
    let (mut depth, mut deepest, mut ops) = (0usize, 0usize, 0usize);
    let mut in_word = false;
    for c in text[prefix.len()..].chars() {
        let word = c.is_alphanumeric() || c == '_';
        if depth > 0 && ((word && !in_word) || c.is_ascii_punctuation()) {
            ops += 1;
        }
        in_word = word;
        match c {
            '{' | '(' | '[' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            '}' | ')' | ']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    (deepest, ops)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(source: &str) -> Result<(), ParseError> {
        check_nesting(source, &LineIndex::new(source))
    }

    fn message(source: &str) -> String {
        check(source).unwrap_err().message
    }

    #[test]
    fn test_ordinary_code_passes() {
        assert!(check("result_df = df.groupby('region')['sales'].sum().reset_index()").is_ok());
        assert!(check("xs = [-1, -2, -3, -4]\nys = {'a': (1, 2), 'b': [3]}").is_ok());
        let wide = format!("xs = [{}]", vec!["-1"; 5_000].join(", "));
        assert!(check(&wide).is_ok());
    }

    #[test]
    fn test_bracket_limit() {
        let at_limit = format!("x = {}1{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(check(&at_limit).is_ok());
        let nested = format!("x = {}1{}", "[".repeat(10_000), "]".repeat(10_000));
        assert_eq!(message(&nested), "too many nested parentheses");
    }

    #[test]
    fn test_operator_chains() {
        let chain = format!("x = 1{}", " + 1".repeat(5_000));
        assert_eq!(message(&chain), "expression too deeply nested");
        let unary = format!("x = {}1", "-".repeat(5_000));
        assert_eq!(message(&unary), "expression too deeply nested");
        let calls = format!("x = f{}", "()".repeat(5_000));
        assert_eq!(message(&calls), "expression too deeply nested");
        // Statements on separate lines do not add up.
        let lines = "x = a + b + c\n".repeat(1_000);
        assert!(check(&lines).is_ok());
    }

    #[test]
    fn test_indentation_limit() {
        let mut source = String::new();
        for level in 0..=MAX_INDENT {
            source.push_str(&"    ".repeat(level));
            source.push_str("with a:\n");
        }
        source.push_str(&"    ".repeat(MAX_INDENT + 1));
        source.push_str("x = 1\n");
        assert_eq!(message(&source), "too many levels of indentation");
    }

    #[test]
    fn test_fstring_fields_count() {
        assert_eq!(fstring_fields("'{x}'"), (0, 0));
        assert_eq!(fstring_fields("f'{x}'").0, 1);
        let deep = format!("s = f'{{{}1{}}}'", "[".repeat(300), "]".repeat(300));
        assert_eq!(message(&deep), "too many nested parentheses");
    }

    #[test]
    fn test_error_line() {
        let source = format!("a = 1\nb = 2\nx = {}1", "(".repeat(300));
        assert_eq!(check(&source).unwrap_err().line, 3);
    }
}
