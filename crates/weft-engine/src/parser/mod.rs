// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Parsers for documents, scripts and binding expressions.
//!
//! ## Structure
//!
//! - `parser.rs` - Token handling, statements and expressions
//! - `document.rs` - Document and script grammar
//!
//! ## Precedence Table (lowest to highest)
//!
//! | Precedence | Operators | Method |
//! |------------|-----------|--------|
//! | 1 | `=` `+=` `-=` | `parse_assignment` |
//! | 2 | `?:` | `parse_conditional` |
//! | 3 | `\|\|` | `parse_logical_or` |
//! | 4 | `&&` | `parse_logical_and` |
//! | 5 | `==` `!=` `===` `!==` | `parse_equality` |
//! | 6 | `<` `>` `<=` `>=` | `parse_comparison` |
//! | 7 | `+` `-` | `parse_additive` |
//! | 8 | `*` `/` `%` | `parse_multiplicative` |
//! | 9 | `!` `+` `-` `typeof` | `parse_unary` |
//! | 10 | `.` `[]` `()` | `parse_call` |

mod document;
#[allow(clippy::module_inception)]
mod parser;

pub use parser::Parser;

use crate::Error;
use crate::ast::{Document, ExpressionSource, ScriptProgram};

/// Parses a document.
pub fn parse_document(source: &str) -> Result<Document, Error> {
    Parser::new(source).parse_document()
}

/// Parses a script file.
pub fn parse_script(source: &str) -> Result<ScriptProgram, Error> {
    Parser::new(source).parse_script()
}

/// Parses a single expression, e.g. for programmatic bindings.
pub fn parse_expression(source: &str) -> Result<ExpressionSource, Error> {
    Parser::new(source).parse_standalone_expression()
}
