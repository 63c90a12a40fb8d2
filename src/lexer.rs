use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Eof,
    Def,
    Extern,
    Ident(String),
    Number(f64),
    /// Any other single character: operators and punctuation.
    Char(char),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Eof => write!(f, "end of input"),
            Token::Def => write!(f, "'def'"),
            Token::Extern => write!(f, "'extern'"),
            Token::Ident(name) => write!(f, "identifier '{}'", name),
            Token::Number(value) => write!(f, "number {}", value),
            Token::Char(c) => write!(f, "'{}'", c),
        }
    }
}

lazy_static! {
    static ref IGNORE_RE: Regex = Regex::new(r"\A(?:[[:space:]]|#[^\n]*)*").unwrap();
    static ref TOKEN_RE: Regex = Regex::new(
        &[
            r"\A(?:(?P<ident>[[:alpha:]][[:alnum:]]*)",
            r"(?P<number>[0-9.]+)",
            r"(?P<char>.))",
        ]
        .join("|")
    )
    .unwrap();
    static ref NUMBER_PREFIX_RE: Regex = Regex::new(r"\A[0-9]*(?:\.[0-9]*)?").unwrap();
}

/// Parses the longest numeric prefix of a maximal run of digits and dots.
///
/// `3.4.5` reads as `3.4`; a run without a usable prefix (a lone `.`) reads
/// as `0`.
fn parse_number(text: &str) -> f64 {
    let prefix = NUMBER_PREFIX_RE.find(text).map_or("", |m| m.as_str());
    prefix.parse().unwrap_or(0.0)
}

/// Pull-based lexer: every call to [`Lexer::next_token`] advances the cursor
/// past exactly one token.
#[derive(Debug, Clone)]
pub struct Lexer<'src> {
    input: &'src str,
    cursor: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(input: &'src str) -> Self {
        Self { input, cursor: 0 }
    }

    pub fn next_token(&mut self) -> Token {
        // whitespace and comments
        if let Some(skipped) = IGNORE_RE.find(&self.input[self.cursor..]) {
            self.cursor += skipped.end();
        }

        let rest = &self.input[self.cursor..];
        let cap = match TOKEN_RE.captures(rest) {
            Some(cap) => cap,
            None => return Token::Eof,
        };
        if let Some(whole) = cap.get(0) {
            self.cursor += whole.end();
        }

        if let Some(ident) = cap.name("ident") {
            match ident.as_str() {
                "def" => Token::Def,
                "extern" => Token::Extern,
                name => Token::Ident(name.to_string()),
            }
        } else if let Some(number) = cap.name("number") {
            Token::Number(parse_number(number.as_str()))
        } else {
            cap.name("char")
                .and_then(|c| c.as_str().chars().next())
                .map_or(Token::Eof, Token::Char)
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        match self.next_token() {
            Token::Eof => None,
            token => Some(token),
        }
    }
}

/// lex the whole input, in order, without the trailing end-of-input token
pub fn lex(input: &str) -> Vec<Token> {
    Lexer::new(input).collect()
}
