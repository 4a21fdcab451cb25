//! C tokenizer shared by every stage of the pipeline.
//!
//! The tokenizer never fails: every byte of the input ends up in exactly one
//! token, so tokens from one scan partition the text without gaps or
//! overlaps. Bytes that cannot start any C token become `Invalid` tokens.

mod scope;

pub use scope::{BraceKind, CodeView, ScopeInfo};

use serde::{Deserialize, Serialize};

use crate::source::Span;

/// Classification of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Identifier,
    Number,
    StringLiteral,
    CharLiteral,
    Comment,
    /// `<stdio.h>` or `"local.h"` after `#include` / `#import`.
    HeaderName,
    Punct,
    Whitespace,
    Invalid,
}

/// A classified span of source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// Token lies on a preprocessor directive line.
    pub directive: bool,
    /// The `#` that opens a directive line.
    pub opens_directive: bool,
    /// False for literals and block comments that hit end of line/input
    /// before their closing delimiter.
    pub terminated: bool,
}

impl Token {
    /// Text of the token; empty if the span does not fit `src`.
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        self.span.slice(src).unwrap_or("")
    }

    /// Tokens that carry program structure: everything but whitespace and comments.
    pub fn is_code(&self) -> bool {
        !matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }

    pub fn is_punct(&self, src: &str, punct: &str) -> bool {
        self.kind == TokenKind::Punct && self.text(src) == punct
    }

    pub fn is_ident(&self, src: &str, word: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text(src) == word
    }
}

const PUNCT_3: &[&str] = &["<<=", ">>=", "..."];
const PUNCT_2: &[&str] = &[
    "->", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "*=", "/=", "%=", "+=",
    "-=", "&=", "^=", "|=", "##",
];
const PUNCT_1: &[u8] = b"[](){}.&*+-~!/%<>^|?:;=,#";

/// Split `src` into a gap-free sequence of tokens.
pub fn tokenize(src: &str) -> Vec<Token> {
    Lexer::new(src).run()
}

/// Number of tokens that are neither whitespace nor invalid bytes.
pub fn usable_token_count(tokens: &[Token]) -> usize {
    tokens.iter().filter(|t| !matches!(t.kind, TokenKind::Whitespace | TokenKind::Invalid)).count()
}

/// For every token, the name of the directive whose line it lies on
/// (`define`, `include`, `if`, ...); `None` outside directive lines.
pub fn directive_names<'a>(src: &'a str, tokens: &[Token]) -> Vec<Option<&'a str>> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut current = None;
    let mut awaiting_name = false;
    for token in tokens {
        if token.opens_directive {
            current = None;
            awaiting_name = true;
        } else if !token.directive {
            current = None;
            awaiting_name = false;
        } else if awaiting_name && token.is_code() {
            awaiting_name = false;
            if token.kind == TokenKind::Identifier {
                current = Some(token.text(src));
            }
        }
        out.push(if token.directive { current } else { None });
    }
    out
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
    at_line_start: bool,
    in_directive: bool,
    /// The next identifier is the directive name (`define`, `include`, ...).
    expect_directive_name: bool,
    /// The next non-blank token after `#include` is a header name.
    expect_header: bool,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
            at_line_start: true,
            in_directive: false,
            expect_directive_name: false,
            expect_header: false,
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn run(mut self) -> Vec<Token> {
        while self.pos < self.bytes.len() {
            let start = self.pos;
            let b = self.bytes[start];
            let directive = self.in_directive;

            if is_blank(b) || self.at_splice(start) {
                self.lex_whitespace(start);
                continue;
            }

            let (kind, terminated) = if b == b'/' && self.peek(1) == Some(b'*') {
                (TokenKind::Comment, self.lex_block_comment())
            } else if b == b'/' && self.peek(1) == Some(b'/') {
                self.lex_line_comment();
                (TokenKind::Comment, true)
            } else if self.expect_header && (b == b'<' || b == b'"') {
                (TokenKind::HeaderName, self.lex_header(b))
            } else if b == b'"' {
                (TokenKind::StringLiteral, self.lex_quoted(b'"'))
            } else if b == b'\'' {
                (TokenKind::CharLiteral, self.lex_quoted(b'\''))
            } else if b.is_ascii_digit()
                || (b == b'.' && self.peek(1).is_some_and(|n| n.is_ascii_digit()))
            {
                self.lex_number();
                (TokenKind::Number, true)
            } else if is_ident_start(b) {
                self.lex_ident_or_prefixed_literal()
            } else if let Some(len) = self.punct_len() {
                self.pos += len;
                (TokenKind::Punct, true)
            } else {
                self.pos += char_len(self.src, start);
                (TokenKind::Invalid, true)
            };

            if kind != TokenKind::Comment {
                self.update_directive_state(start, kind);
            }
            let opens_directive = !directive && self.in_directive;
            self.push(kind, start, directive || self.in_directive, terminated);
            if let Some(last) = self.tokens.last_mut() {
                last.opens_directive = opens_directive;
            }
        }
        self.tokens
    }

    fn push(&mut self, kind: TokenKind, start: usize, directive: bool, terminated: bool) {
        self.tokens.push(Token {
            kind,
            span: Span::new(start, self.pos),
            directive,
            opens_directive: false,
            terminated,
        });
    }

    fn update_directive_state(&mut self, start: usize, kind: TokenKind) {
        if self.at_line_start && !self.in_directive && self.bytes[start] == b'#' {
            self.in_directive = true;
            self.expect_directive_name = true;
            // The `#` itself belongs to the directive line.
            self.at_line_start = false;
            return;
        }
        self.at_line_start = false;
        if self.expect_header {
            self.expect_header = false;
        }
        if self.expect_directive_name {
            self.expect_directive_name = false;
            if kind == TokenKind::Identifier {
                let word = &self.src[start..self.pos];
                if matches!(word, "include" | "import" | "include_next") {
                    self.expect_header = true;
                }
            }
        }
    }

    /// Backslash-newline (line splice) at `at`.
    fn at_splice(&self, at: usize) -> bool {
        if self.bytes.get(at) != Some(&b'\\') {
            return false;
        }
        match self.bytes.get(at + 1) {
            Some(b'\n') => true,
            Some(b'\r') => self.bytes.get(at + 2) == Some(&b'\n'),
            _ => false,
        }
    }

    fn lex_whitespace(&mut self, start: usize) {
        let directive = self.in_directive;
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if self.at_splice(self.pos) {
                self.pos += if self.bytes[self.pos + 1] == b'\r' { 3 } else { 2 };
                continue;
            }
            if !is_blank(b) {
                break;
            }
            self.pos += 1;
            if b == b'\n' {
                self.at_line_start = true;
                if self.in_directive {
                    // The directive ends with this newline; the rest of the run
                    // belongs to ordinary code.
                    self.in_directive = false;
                    self.expect_directive_name = false;
                    self.expect_header = false;
                    break;
                }
            }
        }
        self.push(TokenKind::Whitespace, start, directive, true);
    }

    fn lex_block_comment(&mut self) -> bool {
        self.pos += 2;
        while self.pos < self.bytes.len() {
            if self.bytes[self.pos] == b'*' && self.peek(1) == Some(b'/') {
                self.pos += 2;
                return true;
            }
            self.pos += 1;
        }
        false
    }

    fn lex_line_comment(&mut self) {
        self.pos += 2;
        while self.pos < self.bytes.len() {
            if self.at_splice(self.pos) {
                self.pos += if self.bytes[self.pos + 1] == b'\r' { 3 } else { 2 };
                continue;
            }
            if self.bytes[self.pos] == b'\n' {
                break;
            }
            self.pos += 1;
        }
        // Keep a trailing `\r` out of the comment so CRLF files stay CRLF.
        if self.pos > 0 && self.bytes.get(self.pos - 1) == Some(&b'\r') && self.pos < self.bytes.len()
        {
            self.pos -= 1;
        }
    }

    fn lex_header(&mut self, open: u8) -> bool {
        let close = if open == b'<' { b'>' } else { b'"' };
        self.pos += 1;
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b == b'\n' {
                return false;
            }
            self.pos += 1;
            if b == close {
                return true;
            }
        }
        false
    }

    /// Lex a quoted literal starting at the opening quote. Returns whether the
    /// closing quote was found before end of line.
    fn lex_quoted(&mut self, quote: u8) -> bool {
        self.pos += 1;
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b == b'\\' {
                if self.at_splice(self.pos) {
                    self.pos += if self.bytes[self.pos + 1] == b'\r' { 3 } else { 2 };
                } else {
                    self.pos += 1;
                    if self.pos < self.bytes.len() {
                        self.pos += char_len(self.src, self.pos);
                    }
                }
                continue;
            }
            if b == b'\n' {
                return false;
            }
            self.pos += char_len(self.src, self.pos);
            if b == quote {
                return true;
            }
        }
        false
    }

    fn lex_number(&mut self) {
        self.pos += 1;
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            let prev = self.bytes[self.pos - 1];
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' {
                self.pos += 1;
            } else if (b == b'+' || b == b'-') && matches!(prev, b'e' | b'E' | b'p' | b'P') {
                self.pos += 1;
            } else if b == b'\'' && self.peek(1).is_some_and(|n| n.is_ascii_alphanumeric()) {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn lex_ident_or_prefixed_literal(&mut self) -> (TokenKind, bool) {
        let start = self.pos;
        while self.pos < self.bytes.len() && is_ident_continue(self.bytes[self.pos]) {
            self.pos += char_len(self.src, self.pos);
        }
        let word = &self.src[start..self.pos];
        if matches!(word, "L" | "u" | "U" | "u8") {
            match self.peek(0) {
                Some(b'"') => return (TokenKind::StringLiteral, self.lex_quoted(b'"')),
                Some(b'\'') => return (TokenKind::CharLiteral, self.lex_quoted(b'\'')),
                _ => {}
            }
        }
        (TokenKind::Identifier, true)
    }

    fn punct_len(&self) -> Option<usize> {
        let rest = &self.src[self.pos..];
        if PUNCT_3.iter().any(|p| rest.starts_with(p)) {
            return Some(3);
        }
        if PUNCT_2.iter().any(|p| rest.starts_with(p)) {
            return Some(2);
        }
        PUNCT_1.contains(&self.bytes[self.pos]).then_some(1)
    }
}

fn is_blank(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$' || b >= 0x80
}

fn is_ident_continue(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

/// Byte length of the UTF-8 character starting at `at` (1 for ASCII).
fn char_len(src: &str, at: usize) -> usize {
    src.get(at..).and_then(|s| s.chars().next()).map(char::len_utf8).unwrap_or(1)
}
