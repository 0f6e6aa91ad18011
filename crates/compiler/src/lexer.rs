//! Lexer: byte stream in, token stream + cursor stream out.
//!
//! Tokens and cursors are parallel arrays: `cursors[i]` is the 1-based
//! `(row, col)` where `tokens[i]` starts. Multi-character tokens
//! (identifiers, numbers, literals, directives) accumulate in a buffer
//! that is resolved whenever a delimiter is reached.
//!
//! String literal bodies keep their escape sequences verbatim so the
//! code generator can re-emit them into C unchanged; character literals
//! resolve their escape to the actual byte.

use crate::error::{CompileResult, Cursor, Diagnostic};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    IntLit(u64),
    FloatLit(f64),
    CharLit(u8),
    StrLit(String),
    Directive(String),

    Colon,
    SemiColon,
    Equal,
    LeftAngle,
    RightAngle,
    LeftParen,
    RightParen,
    LeftCurl,
    RightCurl,
    LeftSquare,
    RightSquare,
    Comma,
    Dot,
    Caret,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    BackSlash,
    Bar,
    Ampersand,
    Tilde,
    Exclaim,
    Underscore,
    Question,
}

impl Token {
    /// Short spelling used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("Ident({})", name),
            Token::IntLit(n) => format!("IntLit({})", n),
            Token::FloatLit(n) => format!("FloatLit({})", n),
            Token::CharLit(c) => format!("CharLit({})", *c as char),
            Token::StrLit(s) => format!("StrLit(\"{}\")", s),
            Token::Directive(d) => format!("Directive(#{})", d),
            Token::Colon => "':'".to_string(),
            Token::SemiColon => "';'".to_string(),
            Token::Equal => "'='".to_string(),
            Token::LeftAngle => "'<'".to_string(),
            Token::RightAngle => "'>'".to_string(),
            Token::LeftParen => "'('".to_string(),
            Token::RightParen => "')'".to_string(),
            Token::LeftCurl => "'{'".to_string(),
            Token::RightCurl => "'}'".to_string(),
            Token::LeftSquare => "'['".to_string(),
            Token::RightSquare => "']'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::Caret => "'^'".to_string(),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Percent => "'%'".to_string(),
            Token::BackSlash => "'\\'".to_string(),
            Token::Bar => "'|'".to_string(),
            Token::Ampersand => "'&'".to_string(),
            Token::Tilde => "'~'".to_string(),
            Token::Exclaim => "'!'".to_string(),
            Token::Underscore => "'_'".to_string(),
            Token::Question => "'?'".to_string(),
        }
    }
}

/// The lexer's output: parallel token and cursor streams.
#[derive(Debug, Default)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    pub cursors: Vec<Cursor>,
}

struct Lexer {
    tokens: Vec<Token>,
    cursors: Vec<Cursor>,
    buf: String,
    buf_start: Cursor,
    row: u32,
    col: u32,
    directive_pending: bool,
}

/// Parse an integer literal: decimal by default, `0b`/`0o`/`0x`
/// prefixed for other bases, `_` allowed as a digit separator.
fn parse_int(s: &str) -> Option<u64> {
    let (radix, digits) = match s.as_bytes() {
        [b'0', b'b', rest @ ..] => (2, rest),
        [b'0', b'o', rest @ ..] => (8, rest),
        [b'0', b'x', rest @ ..] => (16, rest),
        _ => (10, s.as_bytes()),
    };
    let cleaned: String = std::str::from_utf8(digits)
        .ok()?
        .chars()
        .filter(|&c| c != '_')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    u64::from_str_radix(&cleaned, radix).ok()
}

fn parse_float(s: &str) -> Option<f64> {
    let cleaned: String = s.chars().filter(|&c| c != '_').collect();
    if !cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    cleaned.parse().ok()
}

/// Resolve a two-character escape sequence to its byte value.
fn escape_byte(esc: char) -> Option<u8> {
    match esc {
        '\\' => Some(b'\\'),
        '\'' => Some(b'\''),
        '"' => Some(b'"'),
        'n' => Some(b'\n'),
        'r' => Some(b'\r'),
        't' => Some(b'\t'),
        'v' => Some(0x0b),
        'f' => Some(0x0c),
        'a' => Some(0x07),
        'b' => Some(0x08),
        'e' => Some(0x1b),
        _ => None,
    }
}

impl Lexer {
    fn new() -> Self {
        Lexer {
            tokens: Vec::new(),
            cursors: Vec::new(),
            buf: String::new(),
            buf_start: Cursor::new(1, 1),
            row: 1,
            col: 1,
            directive_pending: false,
        }
    }

    fn here(&self) -> Cursor {
        Cursor::new(self.row, self.col)
    }

    fn advance(&mut self, ch: char) {
        if ch == '\n' {
            self.row += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
    }

    fn buffer(&mut self, ch: char) {
        if self.buf.is_empty() {
            self.buf_start = self.here();
        }
        self.buf.push(ch);
    }

    fn push_at(&mut self, cursor: Cursor, tok: Token) {
        self.cursors.push(cursor);
        self.tokens.push(tok);
    }

    /// Classify and emit whatever is sitting in the buffer.
    fn resolve_buffer(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let word = std::mem::take(&mut self.buf);
        let tok = if word == "_" {
            Token::Underscore
        } else if let Some(n) = parse_int(&word) {
            Token::IntLit(n)
        } else if let Some(f) = parse_float(&word) {
            Token::FloatLit(f)
        } else if self.directive_pending {
            self.directive_pending = false;
            Token::Directive(word)
        } else {
            Token::Ident(word)
        };
        self.push_at(self.buf_start, tok);
    }

    fn punct(&mut self, ch: char, tok: Token) {
        self.resolve_buffer();
        let cursor = self.here();
        self.push_at(cursor, tok);
        self.advance(ch);
    }

    /// Convert a collected char-literal body to its byte value.
    fn char_value(&self, body: &str, at: Cursor) -> CompileResult<u8> {
        let chars: Vec<char> = body.chars().collect();
        match chars.as_slice() {
            [c] => {
                let v = *c as u32;
                if v > 0xff {
                    return Err(Diagnostic::new(
                        at,
                        format!("character literal '{}' does not fit in a byte", c),
                    ));
                }
                Ok(v as u8)
            }
            ['\\', esc] => escape_byte(*esc).ok_or_else(|| {
                Diagnostic::new(at, format!("unknown escape sequence '\\{}'", esc))
            }),
            [] => Err(Diagnostic::new(at, "empty character literal")),
            _ => Err(Diagnostic::new(
                at,
                format!("malformed character literal '{}'", body),
            )),
        }
    }
}

/// Lex a whole source buffer. Positions are 1-based;
/// `tokens.len() == cursors.len()` on every return.
pub fn lex(source: &str) -> CompileResult<Lexed> {
    let chars: Vec<char> = source.chars().collect();
    let mut lx = Lexer::new();

    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();

        match ch {
            '\r' => {}
            ' ' | '\t' | '\n' => {
                lx.resolve_buffer();
                lx.advance(ch);
            }
            '/' if next == Some('/') => {
                lx.resolve_buffer();
                while i < chars.len() && chars[i] != '\n' {
                    lx.advance(chars[i]);
                    i += 1;
                }
                continue;
            }
            '/' if next == Some('*') => {
                lx.resolve_buffer();
                lx.advance(ch);
                lx.advance('*');
                i += 2;
                // Does not nest; unterminated runs to end of input.
                while i < chars.len() {
                    if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                        lx.advance('*');
                        lx.advance('/');
                        i += 2;
                        break;
                    }
                    lx.advance(chars[i]);
                    i += 1;
                }
                continue;
            }
            '\'' => {
                lx.resolve_buffer();
                let start = lx.here();
                lx.advance(ch);
                i += 1;
                let mut body = String::new();
                while i < chars.len() {
                    let c = chars[i];
                    if c == '\\' {
                        body.push(c);
                        lx.advance(c);
                        i += 1;
                        if i < chars.len() {
                            body.push(chars[i]);
                            lx.advance(chars[i]);
                            i += 1;
                        }
                        continue;
                    }
                    if c == '\'' {
                        lx.advance(c);
                        i += 1;
                        break;
                    }
                    body.push(c);
                    lx.advance(c);
                    i += 1;
                }
                let value = lx.char_value(&body, start)?;
                lx.push_at(start, Token::CharLit(value));
                continue;
            }
            '"' => {
                lx.resolve_buffer();
                let start = lx.here();
                lx.advance(ch);
                i += 1;
                let mut body = String::new();
                while i < chars.len() {
                    let c = chars[i];
                    if c == '\\' {
                        // Keep the escape verbatim for C re-emission.
                        body.push(c);
                        lx.advance(c);
                        i += 1;
                        if i < chars.len() {
                            body.push(chars[i]);
                            lx.advance(chars[i]);
                            i += 1;
                        }
                        continue;
                    }
                    if c == '"' {
                        lx.advance(c);
                        i += 1;
                        break;
                    }
                    body.push(c);
                    lx.advance(c);
                    i += 1;
                }
                lx.push_at(start, Token::StrLit(body));
                continue;
            }
            '#' => {
                lx.resolve_buffer();
                lx.directive_pending = true;
                lx.advance(ch);
            }
            '.' => {
                if next == Some('.') {
                    lx.resolve_buffer();
                    lx.punct('.', Token::Dot);
                    lx.punct('.', Token::Dot);
                    i += 2;
                    continue;
                } else if parse_int(&lx.buf).is_some() {
                    // A dot inside a digit run builds a float literal.
                    lx.buf.push('.');
                    lx.advance(ch);
                } else {
                    lx.punct(ch, Token::Dot);
                }
            }
            ':' => lx.punct(ch, Token::Colon),
            ';' => lx.punct(ch, Token::SemiColon),
            '=' => lx.punct(ch, Token::Equal),
            '<' => lx.punct(ch, Token::LeftAngle),
            '>' => lx.punct(ch, Token::RightAngle),
            '(' => lx.punct(ch, Token::LeftParen),
            ')' => lx.punct(ch, Token::RightParen),
            '{' => lx.punct(ch, Token::LeftCurl),
            '}' => lx.punct(ch, Token::RightCurl),
            '[' => lx.punct(ch, Token::LeftSquare),
            ']' => lx.punct(ch, Token::RightSquare),
            ',' => lx.punct(ch, Token::Comma),
            '^' => lx.punct(ch, Token::Caret),
            '+' => lx.punct(ch, Token::Plus),
            '-' => lx.punct(ch, Token::Minus),
            '*' => lx.punct(ch, Token::Star),
            '/' => lx.punct(ch, Token::Slash),
            '%' => lx.punct(ch, Token::Percent),
            '\\' => lx.punct(ch, Token::BackSlash),
            '|' => lx.punct(ch, Token::Bar),
            '&' => lx.punct(ch, Token::Ampersand),
            '~' => lx.punct(ch, Token::Tilde),
            '!' => lx.punct(ch, Token::Exclaim),
            '?' => lx.punct(ch, Token::Question),
            _ => {
                lx.buffer(ch);
                lx.advance(ch);
            }
        }
        i += 1;
    }

    lx.resolve_buffer();

    debug_assert_eq!(lx.tokens.len(), lx.cursors.len());
    Ok(Lexed {
        tokens: lx.tokens,
        cursors: lx.cursors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Token> {
        lex(src).unwrap().tokens
    }

    #[test]
    fn test_tokens_and_cursors_parallel() {
        let out = lex("a: i32 = 42;\nb := a + 1;").unwrap();
        assert_eq!(out.tokens.len(), out.cursors.len());
        assert!(out.cursors.iter().all(|c| c.row >= 1 && c.col >= 1));
    }

    #[test]
    fn test_cursor_positions() {
        let out = lex("x := 1;\ny := 2;").unwrap();
        assert_eq!(out.tokens[0], Token::Ident("x".to_string()));
        assert_eq!(out.cursors[0], Cursor::new(1, 1));
        let y_at = out
            .tokens
            .iter()
            .position(|t| *t == Token::Ident("y".to_string()))
            .unwrap();
        assert_eq!(out.cursors[y_at], Cursor::new(2, 1));
    }

    #[test]
    fn test_comments_are_skipped() {
        let out = toks("a // trailing\n/* block\ncomment */ b");
        assert_eq!(
            out,
            vec![Token::Ident("a".to_string()), Token::Ident("b".to_string())]
        );
    }

    #[test]
    fn test_unterminated_block_comment_runs_to_end() {
        assert_eq!(toks("a /* never closed"), vec![Token::Ident("a".to_string())]);
    }

    #[test]
    fn test_numeric_bases_and_separators() {
        assert_eq!(toks("255"), vec![Token::IntLit(255)]);
        assert_eq!(toks("0xff"), vec![Token::IntLit(255)]);
        assert_eq!(toks("0b1010"), vec![Token::IntLit(10)]);
        assert_eq!(toks("0o17"), vec![Token::IntLit(15)]);
        assert_eq!(toks("1_000_000"), vec![Token::IntLit(1_000_000)]);
    }

    #[test]
    fn test_float_literal_and_double_dot() {
        assert_eq!(toks("3.25"), vec![Token::FloatLit(3.25)]);
        assert_eq!(
            toks("1..2"),
            vec![Token::IntLit(1), Token::Dot, Token::Dot, Token::IntLit(2)]
        );
    }

    #[test]
    fn test_directive_token() {
        assert_eq!(
            toks("#output \"demo\";"),
            vec![
                Token::Directive("output".to_string()),
                Token::StrLit("demo".to_string()),
                Token::SemiColon,
            ]
        );
    }

    #[test]
    fn test_char_literal_escapes() {
        assert_eq!(toks("'a'"), vec![Token::CharLit(b'a')]);
        assert_eq!(toks("'\\n'"), vec![Token::CharLit(b'\n')]);
        assert_eq!(toks("'\\e'"), vec![Token::CharLit(0x1b)]);
        assert!(lex("'\\q'").is_err());
        assert!(lex("'ab'").is_err());
    }

    #[test]
    fn test_string_keeps_escapes_verbatim() {
        assert_eq!(
            toks("\"line\\n\\\"quoted\\\"\""),
            vec![Token::StrLit("line\\n\\\"quoted\\\"".to_string())]
        );
    }

    #[test]
    fn test_underscore_and_question() {
        assert_eq!(
            toks("x: [_]i32; y: ?i32;"),
            vec![
                Token::Ident("x".to_string()),
                Token::Colon,
                Token::LeftSquare,
                Token::Underscore,
                Token::RightSquare,
                Token::Ident("i32".to_string()),
                Token::SemiColon,
                Token::Ident("y".to_string()),
                Token::Colon,
                Token::Question,
                Token::Ident("i32".to_string()),
                Token::SemiColon,
            ]
        );
    }

    #[test]
    fn test_crlf_ignored() {
        let out = lex("a\r\nb").unwrap();
        assert_eq!(out.tokens.len(), 2);
        assert_eq!(out.cursors[1], Cursor::new(2, 1));
    }
}
