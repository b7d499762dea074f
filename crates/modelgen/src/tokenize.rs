//! Tokenizer over ModelGen source text.
//!
//! Produces a flat token stream terminated by an end-of-file token. Every
//! token carries begin/end positions (byte offset plus 1-based line/column)
//! so later stages can slice the source text and report exact locations.
//! Characters that cannot begin any token become [`TokenKind::Invalid`]
//! tokens; the parser turns those into positioned errors. Lexical failures
//! that leave the scanner without a token boundary (an unterminated string,
//! a bad escape, an out-of-range integer literal) are fatal here.

use std::fmt;
use std::sync::LazyLock;

use ahash::AHashMap;
use strum::IntoStaticStr;

use crate::error::{Error, ErrorKind};

/// A source position: byte offset plus 1-based line and column.
///
/// Columns advance one per byte; a newline increments the line and resets
/// the column. Tabs count as a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

impl Pos {
    const START: Self = Self {
        offset: 0,
        line: 1,
        column: 1,
    };
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Decoded literal payload attached to a token.
///
/// String payloads have their escape sequences processed and exclude the
/// surrounding quotes; name payloads hold the identifier text.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    None,
    Int(i32),
    Float(f32),
    Str(String),
}

impl Payload {
    /// Returns the string payload, or panics for other variants.
    ///
    /// Only valid on `Name` and `Str` tokens, which always carry one.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Str(s) => s,
            _ => panic!("token payload is not a string"),
        }
    }
}

/// The closed set of token kinds.
///
/// The static string form is the name printed for each kind in `--tokens`
/// output and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum TokenKind {
    #[strum(serialize = "invalid")]
    Invalid,
    #[strum(serialize = "end-of-file")]
    Eof,
    #[strum(serialize = "name")]
    Name,
    #[strum(serialize = "null")]
    Null,
    #[strum(serialize = "integer")]
    Int,
    #[strum(serialize = "float")]
    Float,
    #[strum(serialize = "string")]
    Str,
    #[strum(serialize = "comment")]
    Comment,
    #[strum(serialize = "newline")]
    Newline,
    #[strum(serialize = "whitespace")]
    Whitespace,
    #[strum(serialize = "for")]
    For,
    #[strum(serialize = "while")]
    While,
    #[strum(serialize = "break")]
    Break,
    #[strum(serialize = "continue")]
    Continue,
    #[strum(serialize = "if")]
    If,
    #[strum(serialize = "else")]
    Else,
    #[strum(serialize = "proc")]
    Proc,
    #[strum(serialize = "emit")]
    Emit,
    #[strum(serialize = "func")]
    Func,
    #[strum(serialize = "return")]
    Return,
    #[strum(serialize = "delete")]
    Delete,
    #[strum(serialize = "import")]
    Import,
    #[strum(serialize = "from")]
    From,
    #[strum(serialize = "as")]
    As,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "assert")]
    Assert,
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "(")]
    LParen,
    #[strum(serialize = ")")]
    RParen,
    #[strum(serialize = "[")]
    LSquare,
    #[strum(serialize = "]")]
    RSquare,
    #[strum(serialize = "{")]
    LBrace,
    #[strum(serialize = "}")]
    RBrace,
    #[strum(serialize = ".")]
    Dot,
    #[strum(serialize = ",")]
    Comma,
    #[strum(serialize = ":")]
    Colon,
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "//")]
    IntDiv,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    NotEq,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = "<=")]
    LessEq,
    #[strum(serialize = ">=")]
    GreaterEq,
    #[strum(serialize = "?")]
    Question,
    #[strum(serialize = "?:")]
    Elvis,
    #[strum(serialize = "??")]
    Coalesce,
    #[strum(serialize = "->")]
    Arrow,
    #[strum(serialize = "=")]
    Assign,
    #[strum(serialize = "+=")]
    AddAssign,
    #[strum(serialize = "-=")]
    SubAssign,
    #[strum(serialize = "*=")]
    MulAssign,
    #[strum(serialize = "/=")]
    DivAssign,
    #[strum(serialize = "//=")]
    IntDivAssign,
    #[strum(serialize = "%=")]
    ModAssign,
}

impl TokenKind {
    /// Human-readable name, matching the `--tokens` dump.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// True for tokens the parser skips when scanning within a line.
    pub fn is_line_space(self) -> bool {
        matches!(self, Self::Whitespace | Self::Comment)
    }

    /// True for tokens the parser skips when scanning across lines.
    pub fn is_space(self) -> bool {
        matches!(self, Self::Whitespace | Self::Comment | Self::Newline)
    }

    /// True if a token of this kind can begin a subexpression.
    ///
    /// Used when collecting comma-separated tuples without a closing
    /// delimiter, to decide whether anything follows a comma.
    pub fn starts_subexpression(self) -> bool {
        matches!(
            self,
            Self::Name
                | Self::Null
                | Self::Int
                | Self::Float
                | Self::Str
                | Self::LParen
                | Self::LSquare
                | Self::LBrace
                | Self::For
                | Self::While
                | Self::If
                | Self::Proc
                | Self::Emit
                | Self::Func
                | Self::Return
                | Self::Delete
                | Self::Sub
                | Self::Add
                | Self::Not
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One token: kind, half-open `[begin, end)` span, decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub begin: Pos,
    pub end: Pos,
    pub payload: Payload,
}

impl Token {
    /// The raw source text this token covers.
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        &source[self.begin.offset..self.end.offset]
    }
}

static KEYWORDS: LazyLock<AHashMap<&'static str, TokenKind>> = LazyLock::new(|| {
    let mut map = AHashMap::new();
    for kind in [
        TokenKind::Null,
        TokenKind::For,
        TokenKind::While,
        TokenKind::Break,
        TokenKind::Continue,
        TokenKind::If,
        TokenKind::Else,
        TokenKind::Proc,
        TokenKind::Emit,
        TokenKind::Func,
        TokenKind::Return,
        TokenKind::Delete,
        TokenKind::Import,
        TokenKind::From,
        TokenKind::As,
        TokenKind::In,
        TokenKind::Assert,
        TokenKind::Not,
        TokenKind::And,
        TokenKind::Or,
    ] {
        map.insert(kind.name(), kind);
    }
    map
});

/// Single-pass scanner state.
struct Scanner<'a> {
    source: &'a [u8],
    text: &'a str,
    filename: &'a str,
    pos: Pos,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str, filename: &'a str) -> Self {
        Self {
            source: text.as_bytes(),
            text,
            filename,
            pos: Pos::START,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos.offset).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.source.get(self.pos.offset + ahead).copied()
    }

    fn bump(&mut self) {
        if self.peek() == Some(b'\n') {
            self.pos.line += 1;
            self.pos.column = 1;
        } else {
            self.pos.column += 1;
        }
        self.pos.offset += 1;
    }

    fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }

    fn error(&self, at: Pos, message: String) -> Error {
        Error::lexical(self.filename, at, message)
    }

    fn next_token(&mut self) -> Result<Token, Error> {
        let begin = self.pos;

        let Some(c) = self.peek() else {
            return Ok(self.finish(begin, TokenKind::Eof, Payload::None));
        };

        if c.is_ascii_alphabetic() || c == b'_' {
            while self
                .peek()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
            {
                self.bump();
            }
            let text = &self.text[begin.offset..self.pos.offset];
            return Ok(match KEYWORDS.get(text) {
                Some(&kind) => self.finish(begin, kind, Payload::None),
                None => self.finish(begin, TokenKind::Name, Payload::Str(text.to_owned())),
            });
        }

        if c.is_ascii_digit() {
            return self.scan_number(begin);
        }

        match c {
            b'"' | b'\'' => self.scan_string(begin, c),
            b'#' => {
                while self.peek().is_some_and(|c| c != b'\n') {
                    self.bump();
                }
                Ok(self.finish(begin, TokenKind::Comment, Payload::None))
            }
            b'\n' => {
                self.bump();
                Ok(self.finish(begin, TokenKind::Newline, Payload::None))
            }
            b' ' | b'\t' | b'\r' => {
                while self.peek().is_some_and(|c| matches!(c, b' ' | b'\t' | b'\r')) {
                    self.bump();
                }
                Ok(self.finish(begin, TokenKind::Whitespace, Payload::None))
            }
            _ => Ok(self.scan_operator(begin)),
        }
    }

    fn scan_number(&mut self, begin: Pos) -> Result<Token, Error> {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }

        // A dot only extends the literal into a float when a digit follows,
        // so `1.add` stays integer-then-attribute.
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
            let text = &self.text[begin.offset..self.pos.offset];
            let value: f32 = text
                .parse()
                .map_err(|_| self.error(begin, format!("Invalid float literal \"{text}\"")))?;
            return Ok(self.finish(begin, TokenKind::Float, Payload::Float(value)));
        }

        let text = &self.text[begin.offset..self.pos.offset];
        let value: i32 = text
            .parse()
            .map_err(|_| self.error(begin, format!("Integer literal out of range \"{text}\"")))?;
        Ok(self.finish(begin, TokenKind::Int, Payload::Int(value)))
    }

    fn scan_string(&mut self, begin: Pos, quote: u8) -> Result<Token, Error> {
        self.bump();

        let mut decoded = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(self.error(begin, "Unterminated string".to_owned()));
            };

            if c == quote {
                self.bump();
                return Ok(self.finish(begin, TokenKind::Str, Payload::Str(decoded)));
            }

            if c == b'\\' {
                let escape_at = self.pos;
                self.bump();
                let Some(e) = self.peek() else {
                    return Err(self.error(begin, "Unterminated string".to_owned()));
                };
                self.bump();
                match e {
                    b'a' => decoded.push('\x07'),
                    b'b' => decoded.push('\x08'),
                    b't' => decoded.push('\t'),
                    b'n' => decoded.push('\n'),
                    b'v' => decoded.push('\x0B'),
                    b'f' => decoded.push('\x0C'),
                    b'r' => decoded.push('\r'),
                    b'\\' => decoded.push('\\'),
                    b'"' => decoded.push('"'),
                    b'\'' => decoded.push('\''),
                    b'x' => {
                        let hi = self.peek().and_then(hex_digit);
                        self.bump();
                        let lo = self.peek().and_then(hex_digit);
                        self.bump();
                        match (hi, lo) {
                            (Some(hi), Some(lo)) => decoded.push(char::from(hi * 16 + lo)),
                            _ => {
                                return Err(self
                                    .error(escape_at, "Invalid hexadecimal escape".to_owned()));
                            }
                        }
                    }
                    _ => {
                        return Err(self.error(
                            escape_at,
                            format!("Invalid escape character \"{}\"", char::from(e)),
                        ));
                    }
                }
                continue;
            }

            // Raw byte, including newlines and multi-byte UTF-8 sequences.
            decoded.push_str(&self.text[self.pos.offset..self.pos.offset + utf8_len(c)]);
            self.bump_n(utf8_len(c));
        }
    }

    fn scan_operator(&mut self, begin: Pos) -> Token {
        let rest = &self.source[self.pos.offset..];

        // Longest match first: `//=` before `//` before `/`.
        if rest.starts_with(b"//=") {
            self.bump_n(3);
            return self.finish(begin, TokenKind::IntDivAssign, Payload::None);
        }

        let two: &[(&[u8], TokenKind)] = &[
            (b"==", TokenKind::Eq),
            (b"!=", TokenKind::NotEq),
            (b"<=", TokenKind::LessEq),
            (b">=", TokenKind::GreaterEq),
            (b"+=", TokenKind::AddAssign),
            (b"-=", TokenKind::SubAssign),
            (b"*=", TokenKind::MulAssign),
            (b"/=", TokenKind::DivAssign),
            (b"%=", TokenKind::ModAssign),
            (b"->", TokenKind::Arrow),
            (b"?:", TokenKind::Elvis),
            (b"??", TokenKind::Coalesce),
            (b"//", TokenKind::IntDiv),
        ];
        for &(text, kind) in two {
            if rest.starts_with(text) {
                self.bump_n(2);
                return self.finish(begin, kind, Payload::None);
            }
        }

        let kind = match rest[0] {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'[' => TokenKind::LSquare,
            b']' => TokenKind::RSquare,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'.' => TokenKind::Dot,
            b',' => TokenKind::Comma,
            b':' => TokenKind::Colon,
            b'+' => TokenKind::Add,
            b'-' => TokenKind::Sub,
            b'*' => TokenKind::Mul,
            b'/' => TokenKind::Div,
            b'%' => TokenKind::Mod,
            b'<' => TokenKind::Less,
            b'>' => TokenKind::Greater,
            b'=' => TokenKind::Assign,
            b'?' => TokenKind::Question,
            _ => TokenKind::Invalid,
        };
        self.bump_n(utf8_len(rest[0]));
        self.finish(begin, kind, Payload::None)
    }

    fn finish(&self, begin: Pos, kind: TokenKind, payload: Payload) -> Token {
        Token {
            kind,
            begin,
            end: self.pos,
            payload,
        }
    }
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn utf8_len(first: u8) -> usize {
    match first {
        0xF0.. => 4,
        0xE0.. => 3,
        0xC0.. => 2,
        _ => 1,
    }
}

/// Tokenizes `text`, returning the full stream ending with an EOF token.
///
/// Tokens come back in strictly increasing source order. Unterminated
/// strings, bad escapes and out-of-range numeric literals are fatal; an
/// unrecognized character yields an [`TokenKind::Invalid`] token instead.
pub fn tokenize(text: &str, filename: &str) -> Result<Vec<Token>, Error> {
    let mut scanner = Scanner::new(text, filename);
    let mut tokens = Vec::new();
    loop {
        let token = scanner.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source, "<test>")
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .filter(|k| !k.is_space())
            .collect()
    }

    #[test]
    fn keywords_and_names() {
        assert_eq!(
            kinds("for x in xs"),
            vec![
                TokenKind::For,
                TokenKind::Name,
                TokenKind::In,
                TokenKind::Name,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn compound_operators_take_priority() {
        assert_eq!(
            kinds("a //= b // c / d"),
            vec![
                TokenKind::Name,
                TokenKind::IntDivAssign,
                TokenKind::Name,
                TokenKind::IntDiv,
                TokenKind::Name,
                TokenKind::Div,
                TokenKind::Name,
                TokenKind::Eof
            ]
        );
        assert_eq!(
            kinds("a ?? b ?: c ? d"),
            vec![
                TokenKind::Name,
                TokenKind::Coalesce,
                TokenKind::Name,
                TokenKind::Elvis,
                TokenKind::Name,
                TokenKind::Question,
                TokenKind::Name,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn number_payloads() {
        let tokens = tokenize("12 3.5 7.", "<test>").unwrap();
        let significant: Vec<&Token> = tokens.iter().filter(|t| !t.kind.is_space()).collect();
        assert_eq!(significant[0].payload, Payload::Int(12));
        assert_eq!(significant[1].payload, Payload::Float(3.5));
        // A trailing dot is not part of the number.
        assert_eq!(significant[2].kind, TokenKind::Int);
        assert_eq!(significant[3].kind, TokenKind::Dot);
    }

    #[test]
    fn string_escapes_are_decoded() {
        let tokens = tokenize(r#""a\tb\n\x41\"q\"""#, "<test>").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].payload, Payload::Str("a\tb\nA\"q\"".to_owned()));
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let err = tokenize("'oops", "<test>").unwrap_err();
        assert!(err.to_string().contains("Unterminated string"));
    }

    #[test]
    fn integer_overflow_is_fatal() {
        assert!(tokenize("2147483647", "<test>").is_ok());
        assert!(tokenize("2147483648", "<test>").is_err());
    }

    #[test]
    fn positions_track_lines_and_columns() {
        let tokens = tokenize("a\n  b", "<test>").unwrap();
        let b = tokens
            .iter()
            .find(|t| t.payload == Payload::Str("b".to_owned()))
            .unwrap();
        assert_eq!((b.begin.line, b.begin.column), (2, 3));
    }

    #[test]
    fn token_order_is_strictly_increasing() {
        let tokens = tokenize("x = 1 + 2 # done\n", "<test>").unwrap();
        for pair in tokens.windows(2) {
            assert!(pair[0].begin.offset <= pair[0].end.offset);
            assert!(pair[0].end.offset <= pair[1].begin.offset);
        }
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn invalid_characters_become_invalid_tokens() {
        let tokens = tokenize("a $ b", "<test>").unwrap();
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Invalid));
    }
}
