// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Token definitions for the document and expression lexer.

use std::fmt;

/// A span in the source code, with the line and column of its first character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Start byte offset (inclusive)
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
    /// 1-based line of `start`
    pub line: u32,
    /// 1-based column of `start`
    pub column: u32,
}

impl Span {
    /// Creates a new span.
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Returns the length of this span in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true if this span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns a span covering both `self` and `other`.
    pub fn to(&self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end.max(self.end),
            line: self.line,
            column: self.column,
        }
    }
}

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The span in the source code
    pub span: Span,
    /// Whether a line break separates this token from the previous one
    pub newline_before: bool,
}

impl Token {
    /// Creates a new token.
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self {
            kind,
            span,
            newline_before: false,
        }
    }
}

/// The different kinds of tokens.
///
/// Words like `property`, `signal` or `as` are only meaningful in certain
/// positions of a document and are scanned as identifiers.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    /// Numeric literal (integer or floating point)
    Number(f64),
    /// String literal
    String(String),
    /// Boolean true
    True,
    /// Boolean false
    False,
    /// null
    Null,

    /// Identifier
    Identifier(String),

    // Keywords
    /// import
    Import,
    /// function
    Function,
    /// var
    Var,
    /// return
    Return,
    /// if
    If,
    /// else
    Else,
    /// typeof
    Typeof,

    // Punctuation
    /// {
    LeftBrace,
    /// }
    RightBrace,
    /// (
    LeftParen,
    /// )
    RightParen,
    /// [
    LeftBracket,
    /// ]
    RightBracket,
    /// ;
    Semicolon,
    /// ,
    Comma,
    /// :
    Colon,
    /// .
    Dot,
    /// ?
    Question,

    // Operators
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Star,
    /// /
    Slash,
    /// %
    Percent,
    /// !
    Bang,
    /// <
    Less,
    /// <=
    LessEqual,
    /// >
    Greater,
    /// >=
    GreaterEqual,
    /// =
    Equal,
    /// ==
    EqualEqual,
    /// ===
    EqualEqualEqual,
    /// !=
    BangEqual,
    /// !==
    BangEqualEqual,
    /// &&
    AmpersandAmpersand,
    /// ||
    PipePipe,
    /// +=
    PlusEqual,
    /// -=
    MinusEqual,

    /// End of input
    Eof,
    /// A character the lexer does not understand
    Invalid(char),
    /// A string literal without its closing quote
    UnterminatedString,
}

impl TokenKind {
    /// Returns the keyword token for `word`, if it is one.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "import" => TokenKind::Import,
            "function" => TokenKind::Function,
            "var" | "let" | "const" => TokenKind::Var,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "typeof" => TokenKind::Typeof,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "number {}", n),
            TokenKind::String(s) => write!(f, "string \"{}\"", s),
            TokenKind::Identifier(name) => write!(f, "identifier \"{}\"", name),
            TokenKind::Eof => write!(f, "end of file"),
            TokenKind::Invalid(ch) => write!(f, "invalid character '{}'", ch),
            TokenKind::UnterminatedString => write!(f, "unterminated string"),
            other => {
                let text = match other {
                    TokenKind::True => "true",
                    TokenKind::False => "false",
                    TokenKind::Null => "null",
                    TokenKind::Import => "import",
                    TokenKind::Function => "function",
                    TokenKind::Var => "var",
                    TokenKind::Return => "return",
                    TokenKind::If => "if",
                    TokenKind::Else => "else",
                    TokenKind::Typeof => "typeof",
                    TokenKind::LeftBrace => "{",
                    TokenKind::RightBrace => "}",
                    TokenKind::LeftParen => "(",
                    TokenKind::RightParen => ")",
                    TokenKind::LeftBracket => "[",
                    TokenKind::RightBracket => "]",
                    TokenKind::Semicolon => ";",
                    TokenKind::Comma => ",",
                    TokenKind::Colon => ":",
                    TokenKind::Dot => ".",
                    TokenKind::Question => "?",
                    TokenKind::Plus => "+",
                    TokenKind::Minus => "-",
                    TokenKind::Star => "*",
                    TokenKind::Slash => "/",
                    TokenKind::Percent => "%",
                    TokenKind::Bang => "!",
                    TokenKind::Less => "<",
                    TokenKind::LessEqual => "<=",
                    TokenKind::Greater => ">",
                    TokenKind::GreaterEqual => ">=",
                    TokenKind::Equal => "=",
                    TokenKind::EqualEqual => "==",
                    TokenKind::EqualEqualEqual => "===",
                    TokenKind::BangEqual => "!=",
                    TokenKind::BangEqualEqual => "!==",
                    TokenKind::AmpersandAmpersand => "&&",
                    TokenKind::PipePipe => "||",
                    TokenKind::PlusEqual => "+=",
                    TokenKind::MinusEqual => "-=",
                    _ => "?",
                };
                write!(f, "'{}'", text)
            }
        }
    }
}
