use std::{
    collections::{BTreeMap, VecDeque},
    str::Chars,
};

use itertools::{PeekNth, peek_nth};
use once_cell::sync::Lazy;
use strum::EnumString;
use thiserror::Error;

use crate::{frontend::SourceFile, middle::primitive::IntKind};

#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    position: usize,
    chars: PeekNth<Chars<'source>>,
    peek_buffer: VecDeque<Token>,
}

#[derive(Debug, Clone, Copy)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Words */
    Keyword(Keyword), // def
    Identifier,       // main

    /* Literals */
    BooleanLiteral,                 // true
    IntegerLiteral(IntegerLiteral), // 0x1F_u8

    /* Delimiters */
    OpenParen,  // (
    CloseParen, // )
    OpenBrace,  // {
    CloseBrace, // }
    Semicolon,  // ;
    Comma,      // ,

    /* Other */
    Colon,    // :
    Dot,      // .
    Ellipsis, // ...
    Arrow,    // ->

    /* Unary Ops */
    Bang, // !

    /* Unary + Binary Ops */
    Minus, // -

    /* Binary Ops */
    Plus,                 // +
    Asterisk,             // *
    Divide,               // /
    Modulus,              // %
    LogicalAnd,           // &&
    LogicalOr,            // ||
    DoubleEquals,         // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=

    /* Assignment */
    Equals, // =
}

impl TokenKind {
    pub fn is_comparison_operator(&self) -> bool {
        matches!(
            self,
            Self::NotEquals
                | Self::DoubleEquals
                | Self::LessThan
                | Self::LessThanOrEqualTo
                | Self::GreaterThan
                | Self::GreaterThanOrEqualTo
        )
    }

    pub fn is_term_operator(&self) -> bool {
        matches!(self, Self::Plus | Self::Minus)
    }

    pub fn is_factor_operator(&self) -> bool {
        matches!(self, Self::Asterisk | Self::Divide | Self::Modulus)
    }
}

/// A lexed integer literal. Non-decimal literals are always unsigned and
/// default to `uint` when no suffix is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegerLiteral {
    pub value: u64,
    pub kind: Option<IntKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Keyword {
    Class,
    Def,
    Extern,
    Var,
    Const,
    Return,
    If,
    Elif,
    Else,
    This,
}

/// Table of single char tokens (matched after longer sequences are checked for)
static SINGLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('(', TokenKind::OpenParen),
        (')', TokenKind::CloseParen),
        ('{', TokenKind::OpenBrace),
        ('}', TokenKind::CloseBrace),
        (';', TokenKind::Semicolon),
        (',', TokenKind::Comma),
        (':', TokenKind::Colon),
        ('.', TokenKind::Dot),
        ('!', TokenKind::Bang),
        ('-', TokenKind::Minus),
        ('+', TokenKind::Plus),
        ('*', TokenKind::Asterisk),
        ('/', TokenKind::Divide),
        ('%', TokenKind::Modulus),
        ('=', TokenKind::Equals),
        ('<', TokenKind::LessThan),
        ('>', TokenKind::GreaterThan),
    ])
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn to(self, other: Span) -> Span {
        Span::new(self.start, other.end)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

type LexResult<T> = Result<T, LexError>;

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            chars: peek_nth(source.contents.chars()),
            position: 0,
            peek_buffer: VecDeque::new(),
        }
    }

    pub fn source(&self) -> &'source SourceFile {
        self.source
    }

    /// Byte offset of the next unread character
    pub fn position(&self) -> usize {
        self.position
    }

    fn error(&self, start: usize, message: impl Into<String>) -> LexError {
        LexError {
            message: message.into(),
            span: self.new_span(start),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn peek_is(&mut self, n: usize, expected: char) -> bool {
        self.chars.peek_nth(n).is_some_and(|c| *c == expected)
    }

    fn ignore_line(&mut self) {
        while let Some(c) = self.chars.peek().copied() {
            if c == '\n' {
                break;
            }

            self.bump();
        }
    }

    // Keyword, identifier, or boolean literal
    fn read_word(&mut self) -> Token {
        let start_position = self.position;

        while let Some(c) = self.chars.peek().copied() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }

            self.bump();
        }

        let span = self.new_span(start_position);
        let value = self.source.value_of_span(span);

        let kind = if let Ok(keyword) = value.parse() {
            TokenKind::Keyword(keyword)
        } else {
            match value {
                "true" | "false" => TokenKind::BooleanLiteral,
                _ => TokenKind::Identifier,
            }
        };

        Token { kind, span }
    }

    // 42, 1_000i32, 0xFFu8, 0b1010
    fn read_number(&mut self) -> LexResult<Token> {
        let start_position = self.position;

        let radix = match (self.chars.peek().copied(), self.chars.peek_nth(1).copied()) {
            (Some('0'), Some('x')) => 16,
            (Some('0'), Some('b')) => 2,
            (Some('0'), Some('o')) => 8,
            _ => 10,
        };

        if radix != 10 {
            self.bump();
            self.bump();
        }

        let mut digits = String::new();

        while let Some(c) = self.chars.peek().copied() {
            if c == '_' {
                self.bump();
                continue;
            }

            let is_body = if radix == 16 {
                c.is_ascii_hexdigit()
            } else {
                c.is_ascii_digit()
            };

            if !is_body {
                break;
            }

            digits.push(c);
            self.bump();
        }

        if digits.is_empty() {
            return Err(self.error(start_position, "Expected digits after numeric prefix"));
        }

        if let Some(invalid) = digits.chars().find(|c| !c.is_digit(radix)) {
            return Err(self.error(
                start_position,
                format!("Invalid digit `{invalid}` for a base {radix} number"),
            ));
        }

        if self.peek_is(0, '.') && self.chars.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            return Err(self.error(start_position, "Floating-point literals are not supported"));
        }

        let suffix_start = self.position;
        while let Some(c) = self.chars.peek().copied() {
            if !c.is_ascii_alphanumeric() {
                break;
            }

            self.bump();
        }
        let suffix = &self.source.contents[suffix_start..self.position];

        let kind = if suffix.is_empty() {
            (radix != 10).then_some(IntKind::U64)
        } else {
            let Some(kind) = IntKind::from_suffix(suffix) else {
                return Err(self.error(start_position, format!("Invalid suffix `{suffix}`")));
            };

            if radix != 10 && kind.is_signed() {
                return Err(self.error(
                    start_position,
                    "Number of non-decimal base cannot be signed",
                ));
            }

            Some(kind)
        };

        let value = u64::from_str_radix(&digits, radix)
            .map_err(|_| self.error(start_position, "Number out of range"))?;

        Ok(Token {
            kind: TokenKind::IntegerLiteral(IntegerLiteral { value, kind }),
            span: self.new_span(start_position),
        })
    }

    fn read_sequence(&mut self, length: usize, kind: TokenKind) -> Token {
        let start_position = self.position;

        for _ in 0..length {
            self.bump();
        }

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn new_span(&self, start: usize) -> Span {
        Span {
            start,
            end: self.position,
        }
    }

    pub fn peek(&mut self) -> LexResult<Option<Token>> {
        if let Some(token) = self.peek_buffer.front() {
            return Ok(Some(*token));
        }

        if let Some(token) = self.lex_token()? {
            self.peek_buffer.push_back(token);
        }

        Ok(self.peek_buffer.front().copied())
    }

    pub fn next(&mut self) -> LexResult<Option<Token>> {
        if let Some(token) = self.peek_buffer.pop_front() {
            return Ok(Some(token));
        }

        self.lex_token()
    }

    fn lex_token(&mut self) -> LexResult<Option<Token>> {
        while let Some(c) = self.chars.peek().copied() {
            let token = match c {
                // Ignore whitespace
                c if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                // Ignore comments
                '/' if self.peek_is(1, '/') => {
                    self.ignore_line();
                    continue;
                }

                // Integer literals
                n if n.is_ascii_digit() => self.read_number()?,

                // Identifiers, keywords, and boolean literals
                a if a.is_ascii_alphabetic() || a == '_' => self.read_word(),

                '.' if self.peek_is(1, '.') && self.peek_is(2, '.') => {
                    self.read_sequence(3, TokenKind::Ellipsis)
                }
                '-' if self.peek_is(1, '>') => self.read_sequence(2, TokenKind::Arrow),
                '=' if self.peek_is(1, '=') => self.read_sequence(2, TokenKind::DoubleEquals),
                '!' if self.peek_is(1, '=') => self.read_sequence(2, TokenKind::NotEquals),
                '<' if self.peek_is(1, '=') => {
                    self.read_sequence(2, TokenKind::LessThanOrEqualTo)
                }
                '>' if self.peek_is(1, '=') => {
                    self.read_sequence(2, TokenKind::GreaterThanOrEqualTo)
                }
                '&' if self.peek_is(1, '&') => self.read_sequence(2, TokenKind::LogicalAnd),
                '|' if self.peek_is(1, '|') => self.read_sequence(2, TokenKind::LogicalOr),

                s if SINGLE_TOKENS.contains_key(&s) => {
                    let kind = SINGLE_TOKENS[&s];
                    self.read_sequence(1, kind)
                }
                c => {
                    let start = self.position;
                    self.bump();
                    return Err(self.error(start, format!("Unexpected character in stream: `{c}`")));
                }
            };

            return Ok(Some(token));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(source: &str) -> LexResult<Vec<TokenKind>> {
        let source = SourceFile::memory(source);
        let mut lexer = Lexer::new(&source);
        let mut kinds = Vec::new();

        while let Some(token) = lexer.next()? {
            kinds.push(token.kind);
        }

        Ok(kinds)
    }

    fn lex_integer(source: &str) -> LexResult<IntegerLiteral> {
        match lex_all(source)?.as_slice() {
            [TokenKind::IntegerLiteral(literal)] => Ok(*literal),
            other => panic!("expected a single integer literal, got {other:?}"),
        }
    }

    #[test]
    fn keywords_and_identifiers() {
        let kinds = lex_all("class def extern var const return if elif else this Point true")
            .unwrap();

        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword(Keyword::Class),
                TokenKind::Keyword(Keyword::Def),
                TokenKind::Keyword(Keyword::Extern),
                TokenKind::Keyword(Keyword::Var),
                TokenKind::Keyword(Keyword::Const),
                TokenKind::Keyword(Keyword::Return),
                TokenKind::Keyword(Keyword::If),
                TokenKind::Keyword(Keyword::Elif),
                TokenKind::Keyword(Keyword::Else),
                TokenKind::Keyword(Keyword::This),
                TokenKind::Identifier,
                TokenKind::BooleanLiteral,
            ]
        );
    }

    #[test]
    fn multi_char_operators() {
        let kinds = lex_all("-> == != <= >= && || ... // comment\n.").unwrap();

        assert_eq!(
            kinds,
            vec![
                TokenKind::Arrow,
                TokenKind::DoubleEquals,
                TokenKind::NotEquals,
                TokenKind::LessThanOrEqualTo,
                TokenKind::GreaterThanOrEqualTo,
                TokenKind::LogicalAnd,
                TokenKind::LogicalOr,
                TokenKind::Ellipsis,
                TokenKind::Dot,
            ]
        );
    }

    #[test]
    fn integer_literals_with_prefixes_and_suffixes() {
        assert_eq!(
            lex_integer("1_000").unwrap(),
            IntegerLiteral {
                value: 1000,
                kind: None
            }
        );
        assert_eq!(
            lex_integer("0xFF").unwrap(),
            IntegerLiteral {
                value: 255,
                kind: Some(IntKind::U64)
            }
        );
        assert_eq!(
            lex_integer("0b1010u8").unwrap(),
            IntegerLiteral {
                value: 10,
                kind: Some(IntKind::U8)
            }
        );
        assert_eq!(
            lex_integer("42i32").unwrap(),
            IntegerLiteral {
                value: 42,
                kind: Some(IntKind::I32)
            }
        );
    }

    #[test]
    fn invalid_integer_literals() {
        assert!(lex_all("0o9").is_err());
        assert!(lex_all("12q").is_err());
        assert!(lex_all("0x10i8").is_err());
        assert!(lex_all("1.5").is_err());
        assert!(lex_all("99999999999999999999999").is_err());
    }

    #[test]
    fn unexpected_character_reports_span() {
        let error = lex_all("var a = #;").unwrap_err();

        assert_eq!(error.span, Span::new(8, 9));
    }
}
