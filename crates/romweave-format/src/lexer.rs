//! # Lexer - Tokenizing Table Formats
//!
//! Breaks the body of a table format (the part between `[` and `]`) into
//! tokens using [Logos].
//!
//! [Logos]: https://docs.rs/logos
//!
//! Field names and field widths are lexed separately so the parser can
//! pair them up:
//!
//! ```
//! use romweave_format::lexer::{lex, TokenKind};
//!
//! let kinds: Vec<_> = lex("hp. name\"\"10").iter().map(|t| t.kind).collect();
//! assert_eq!(
//!     kinds,
//!     vec![
//!         TokenKind::Name,
//!         TokenKind::Byte,
//!         TokenKind::Whitespace,
//!         TokenKind::Name,
//!         TokenKind::Text,
//!         TokenKind::Number,
//!     ]
//! );
//! ```
//!
//! The text after the closing `]` is not lexed here: it is either a count
//! or the name of another anchor, and anchor names may contain `.`, which
//! would otherwise lex as a byte field.

use logos::Logos;

/// Token kinds produced by the Logos lexer.
///
/// Unrecognized characters become [`TokenKind::Error`] so every byte of the
/// input still lands in exactly one token.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"")]
pub enum TokenKind {
    #[regex(r"[ \t\r\n]+")]
    Whitespace,

    /// `.` one-byte integer
    #[token(".")]
    Byte,

    /// `:` two-byte integer
    #[token(":")]
    Half,

    /// `::` four-byte integer
    #[token("::")]
    Word,

    /// `<>` pointer
    #[token("<>")]
    Pointer,

    /// `""` fixed-width text, followed by its width
    #[token("\"\"")]
    Text,

    #[regex(r"[0-9]+")]
    Number,

    #[regex(r"[A-Za-z_][A-Za-z0-9_-]*")]
    Name,

    Error,
}

/// A lexed token with its kind, text slice and byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub offset: usize,
}

/// Lex the input into a sequence of tokens.
pub fn lex(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(input);

    while let Some(result) = lexer.next() {
        let kind = result.unwrap_or(TokenKind::Error);
        tokens.push(Token {
            kind,
            text: lexer.slice(),
            offset: lexer.span().start,
        });
    }

    tokens
}
