//! # Scan Module
//!
//! A small, string- and comment-aware tokenizer for script bodies, built on
//! nom. It does not understand the full grammar of the script language; it
//! only knows enough to find top-level declarations:
//!
//! - **Comments**: `// line` and `/* block */`
//! - **Literals**: interpreted strings, raw (backquoted) strings, runes
//! - **Delimiters**: `{}`, `()`, `[]`, tracked for nesting depth
//! - **Words**: identifiers, keywords and numbers
//!
//! ## Example
//!
//! ```rust
//! use islet::scan::declares_entry;
//!
//! let body = "func main() {\n\tprintln(\"}\")\n}";
//! assert_eq!(declares_entry(body), Ok(true));
//! ```

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{anychar, char, none_of},
    combinator::{map, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded},
};

use crate::error::PrepareError;

/// Name of the entry function the toolchain starts a program from.
pub const ENTRY_NAME: &str = "main";

/// Byte range into the scanned body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Word(&'a str),
    Open(char),
    Close(char),
    Literal,
    Punct(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpannedToken<'a> {
    pub token: Token<'a>,
    pub span: Span,
    /// Nesting depth of `{`, `(` and `[` before this token.
    pub depth: usize,
}

fn word(input: &str) -> IResult<&str, Token<'_>> {
    map(
        take_while1(|c: char| c.is_alphanumeric() || c == '_'),
        Token::Word,
    )(input)
}

fn interpreted_string(input: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('"'),
        many0(alt((
            recognize(preceded(char('\\'), anychar)),
            recognize(none_of("\\\"\n")),
        ))),
        char('"'),
    ))(input)
}

fn raw_string(input: &str) -> IResult<&str, &str> {
    recognize(delimited(char('`'), take_while(|c| c != '`'), char('`')))(input)
}

fn rune(input: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('\''),
        many0(alt((
            recognize(preceded(char('\\'), anychar)),
            recognize(none_of("\\'\n")),
        ))),
        char('\''),
    ))(input)
}

fn literal(input: &str) -> IResult<&str, Token<'_>> {
    value(Token::Literal, alt((interpreted_string, raw_string, rune)))(input)
}

fn delimiter(input: &str) -> IResult<&str, Token<'_>> {
    alt((
        map(alt((char('{'), char('('), char('['))), Token::Open),
        map(alt((char('}'), char(')'), char(']'))), Token::Close),
    ))(input)
}

fn punct(input: &str) -> IResult<&str, Token<'_>> {
    map(anychar, Token::Punct)(input)
}

fn token(input: &str) -> IResult<&str, Token<'_>> {
    alt((word, literal, delimiter, punct))(input)
}

fn whitespace(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_whitespace())(input)
}

fn comment(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(pair(tag("//"), take_while(|c| c != '\n'))),
        recognize(delimited(tag("/*"), take_until("*/"), tag("*/"))),
    ))(input)
}

fn skip(input: &str) -> &str {
    let mut input = input;
    while let Ok((rest, _)) = alt((whitespace, comment))(input) {
        input = rest;
    }
    input
}

/// Tokenizes a script body, tracking delimiter depth.
pub fn lex_spanned(body: &str) -> Result<Vec<SpannedToken<'_>>, PrepareError> {
    let total = body.len();
    let mut remaining = body;
    let mut tokens = Vec::new();
    let mut depth = 0usize;

    loop {
        remaining = skip(remaining);
        if remaining.is_empty() {
            break;
        }
        let start = total - remaining.len();

        if remaining.starts_with("/*") {
            return Err(PrepareError::Unterminated { kind: "block comment", offset: start });
        }
        // A quote that does not lex as a literal never closes.
        let unterminated = match remaining.chars().next() {
            Some('"') => Some("string"),
            Some('`') => Some("raw string"),
            Some('\'') => Some("rune"),
            _ => None,
        };

        let (rest, tok) = match token(remaining) {
            Ok((rest, Token::Punct(_))) if unterminated.is_some() => {
                let kind = unterminated.unwrap_or("literal");
                return Err(PrepareError::Unterminated { kind, offset: start });
            }
            Ok(ok) => ok,
            Err(_) => {
                return Err(PrepareError::Unterminated { kind: "token", offset: start });
            }
        };

        let token_depth = depth;
        match tok {
            Token::Open(_) => depth += 1,
            Token::Close(delim) => {
                if depth == 0 {
                    return Err(PrepareError::UnbalancedClose { delim, offset: start });
                }
                depth -= 1;
            }
            _ => {}
        }

        let end = total - rest.len();
        tokens.push(SpannedToken {
            token: tok,
            span: Span::new(start, end),
            depth: token_depth.min(depth),
        });
        remaining = rest;
    }

    if depth > 0 {
        return Err(PrepareError::Unclosed { open: depth });
    }
    Ok(tokens)
}

/// Spans of every top-level declaration named [`ENTRY_NAME`].
///
/// `func main(` counts, and so does any `var`, `const` or `type` named
/// `main` at the top level.
pub fn entry_declarations(body: &str) -> Result<Vec<Span>, PrepareError> {
    let tokens = lex_spanned(body)?;
    let mut found = Vec::new();

    for (i, window) in tokens.windows(2).enumerate() {
        let (kw, name) = (&window[0], &window[1]);
        if kw.depth != 0 || name.depth != 0 || name.token != Token::Word(ENTRY_NAME) {
            continue;
        }
        match kw.token {
            Token::Word("func") => {
                if let Some(next) = tokens.get(i + 2) {
                    if next.token == Token::Open('(') {
                        found.push(Span::new(kw.span.start, name.span.end));
                    }
                }
            }
            Token::Word("var") | Token::Word("const") | Token::Word("type") => {
                found.push(Span::new(kw.span.start, name.span.end));
            }
            _ => {}
        }
    }

    Ok(found)
}

/// Whether the body already declares its own entry point.
pub fn declares_entry(body: &str) -> Result<bool, PrepareError> {
    Ok(!entry_declarations(body)?.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_entry_function() {
        assert_eq!(declares_entry("func main() {\n\tselect {}\n}"), Ok(true));
    }

    #[test]
    fn test_ignores_nested_and_method_main() {
        let body = "func helper() {\n\tmain := 1\n\t_ = main\n}\nfunc (s *S) main() {}";
        assert_eq!(declares_entry(body), Ok(false));
    }

    #[test]
    fn test_main_inside_strings_and_comments_is_ignored() {
        let body = "// func main() {}\nvar s = \"func main() {\"\nvar r = `func main() {`\n/* func main() */";
        assert_eq!(declares_entry(body), Ok(false));
    }

    #[test]
    fn test_top_level_var_named_main_counts() {
        assert_eq!(declares_entry("var main = 1"), Ok(true));
    }

    #[test]
    fn test_braces_in_literals_do_not_count() {
        let tokens = lex_spanned("x := \"{{\"\ny := '}'").unwrap();
        assert!(tokens.iter().all(|t| t.depth == 0));
    }

    #[test]
    fn test_escaped_quote_inside_string() {
        assert_eq!(declares_entry(r#"var s = "a \" func main() {"
func main() {}"#), Ok(true));
    }

    #[test]
    fn test_unterminated_string_is_an_error() {
        let err = declares_entry("fmt.Println(\"hi)").unwrap_err();
        assert_eq!(err, PrepareError::Unterminated { kind: "string", offset: 12 });
    }

    #[test]
    fn test_unterminated_block_comment() {
        assert!(matches!(
            declares_entry("/* never closed"),
            Err(PrepareError::Unterminated { kind: "block comment", .. })
        ));
    }

    #[test]
    fn test_unbalanced_delimiters() {
        assert_eq!(
            declares_entry("}"),
            Err(PrepareError::UnbalancedClose { delim: '}', offset: 0 })
        );
        assert_eq!(declares_entry("func f() {"), Err(PrepareError::Unclosed { open: 1 }));
    }
}
