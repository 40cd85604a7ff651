// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The scanner that produces tokens from source text.

use super::{Span, Token, TokenKind};

/// A scanner that tokenizes documents, scripts and expressions.
#[derive(Clone)]
pub struct Scanner<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Scanner<'a> {
    /// Creates a new scanner for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Returns the source text the scanner reads from.
    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Returns the next token from the source.
    pub fn next_token(&mut self) -> Token {
        let newline_before = self.skip_whitespace_and_comments();

        let start = self.current_pos;
        let (line, column) = (self.line, self.column);

        let Some((_pos, ch)) = self.advance() else {
            let mut token = Token::new(TokenKind::Eof, Span::new(start, start, line, column));
            token.newline_before = newline_before;
            return token;
        };

        let kind = match ch {
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '?' => TokenKind::Question,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,

            '.' => {
                if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.scan_number('.')
                } else {
                    TokenKind::Dot
                }
            }
            '+' => self.scan_with_equal(TokenKind::Plus, TokenKind::PlusEqual),
            '-' => self.scan_with_equal(TokenKind::Minus, TokenKind::MinusEqual),
            '<' => self.scan_with_equal(TokenKind::Less, TokenKind::LessEqual),
            '>' => self.scan_with_equal(TokenKind::Greater, TokenKind::GreaterEqual),
            '=' => self.scan_equal(),
            '!' => self.scan_bang(),
            '&' => {
                if self.peek() == Some('&') {
                    self.advance();
                    TokenKind::AmpersandAmpersand
                } else {
                    TokenKind::Invalid('&')
                }
            }
            '|' => {
                if self.peek() == Some('|') {
                    self.advance();
                    TokenKind::PipePipe
                } else {
                    TokenKind::Invalid('|')
                }
            }

            '"' | '\'' => self.scan_string(ch),
            '0'..='9' => self.scan_number(ch),
            _ if is_id_start(ch) => self.scan_identifier(ch),
            _ => TokenKind::Invalid(ch),
        };

        let mut token = Token::new(kind, Span::new(start, self.current_pos, line, column));
        token.newline_before = newline_before;
        token
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        let result = self.chars.next();
        if let Some((pos, ch)) = result {
            self.current_pos = pos + ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        result
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, ch)| *ch)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.chars.clone();
        iter.next();
        iter.next().map(|(_, ch)| ch)
    }

    /// Skips blanks and comments, returning whether a line break was crossed.
    fn skip_whitespace_and_comments(&mut self) -> bool {
        let mut newline = false;
        loop {
            match self.peek() {
                Some('\n') => {
                    newline = true;
                    self.advance();
                }
                Some(' ' | '\t' | '\r') => {
                    self.advance();
                }
                Some('/') => match self.peek_next() {
                    Some('/') => {
                        while let Some(ch) = self.peek() {
                            if ch == '\n' {
                                break;
                            }
                            self.advance();
                        }
                    }
                    Some('*') => {
                        self.advance();
                        self.advance();
                        let mut prev = ' ';
                        while let Some((_, ch)) = self.advance() {
                            if ch == '\n' {
                                newline = true;
                            }
                            if prev == '*' && ch == '/' {
                                break;
                            }
                            prev = ch;
                        }
                    }
                    _ => break,
                },
                _ => break,
            }
        }
        newline
    }

    fn scan_with_equal(&mut self, plain: TokenKind, with_equal: TokenKind) -> TokenKind {
        if self.peek() == Some('=') {
            self.advance();
            with_equal
        } else {
            plain
        }
    }

    fn scan_equal(&mut self) -> TokenKind {
        if self.peek() != Some('=') {
            return TokenKind::Equal;
        }
        self.advance();
        if self.peek() == Some('=') {
            self.advance();
            TokenKind::EqualEqualEqual
        } else {
            TokenKind::EqualEqual
        }
    }

    fn scan_bang(&mut self) -> TokenKind {
        if self.peek() != Some('=') {
            return TokenKind::Bang;
        }
        self.advance();
        if self.peek() == Some('=') {
            self.advance();
            TokenKind::BangEqualEqual
        } else {
            TokenKind::BangEqual
        }
    }

    fn scan_string(&mut self, quote: char) -> TokenKind {
        let mut value = String::new();
        loop {
            let Some((_, ch)) = self.advance() else {
                return TokenKind::UnterminatedString;
            };
            match ch {
                c if c == quote => return TokenKind::String(value),
                '\n' => return TokenKind::UnterminatedString,
                '\\' => {
                    let Some((_, escaped)) = self.advance() else {
                        return TokenKind::UnterminatedString;
                    };
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        'u' => {
                            let mut code = 0u32;
                            for _ in 0..4 {
                                match self.advance().and_then(|(_, c)| c.to_digit(16)) {
                                    Some(digit) => code = code * 16 + digit,
                                    None => return TokenKind::UnterminatedString,
                                }
                            }
                            value.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                        }
                        other => value.push(other),
                    }
                }
                _ => value.push(ch),
            }
        }
    }

    fn scan_number(&mut self, first: char) -> TokenKind {
        let start = self.current_pos - first.len_utf8();

        if first == '0' && matches!(self.peek(), Some('x' | 'X')) {
            self.advance();
            let digits_start = self.current_pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.advance();
            }
            let digits = &self.source[digits_start..self.current_pos];
            return match i64::from_str_radix(digits, 16) {
                Ok(n) => TokenKind::Number(n as f64),
                Err(_) => TokenKind::Invalid('x'),
            };
        }

        let mut seen_dot = first == '.';
        let mut seen_exp = false;
        while let Some(ch) = self.peek() {
            match ch {
                '0'..='9' => {
                    self.advance();
                }
                '.' if !seen_dot && !seen_exp => {
                    // `1.foo` is not a number followed by a member access here
                    if !self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
                        break;
                    }
                    seen_dot = true;
                    self.advance();
                }
                'e' | 'E' if !seen_exp => {
                    seen_exp = true;
                    self.advance();
                    if matches!(self.peek(), Some('+' | '-')) {
                        self.advance();
                    }
                }
                _ => break,
            }
        }

        let text = &self.source[start..self.current_pos];
        match text.parse::<f64>() {
            Ok(n) => TokenKind::Number(n),
            Err(_) => TokenKind::Invalid(first),
        }
    }

    fn scan_identifier(&mut self, first: char) -> TokenKind {
        let start = self.current_pos - first.len_utf8();
        while self.peek().is_some_and(is_id_continue) {
            self.advance();
        }
        let word = &self.source[start..self.current_pos];
        TokenKind::keyword(word).unwrap_or_else(|| TokenKind::Identifier(word.to_string()))
    }
}

fn is_id_start(ch: char) -> bool {
    ch == '_' || ch == '$' || unicode_xid::UnicodeXID::is_xid_start(ch)
}

fn is_id_continue(ch: char) -> bool {
    ch == '$' || unicode_xid::UnicodeXID::is_xid_continue(ch)
}
