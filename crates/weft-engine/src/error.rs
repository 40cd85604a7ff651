// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the engine

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    /// Reported, never fatal
    Warning,
    /// Aborts the affected document or construction
    Error,
    /// Aborts and invalidates surrounding state
    Critical,
}

/// A located message attached to a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Document the message belongs to
    pub url: Option<String>,
    /// 1-based line, 0 when unknown
    pub line: u32,
    /// 1-based column, 0 when unknown
    pub column: u32,
    /// Human readable description
    pub message: String,
    /// Severity
    pub severity: Severity,
}

impl Diagnostic {
    /// Creates an error-severity diagnostic.
    pub fn error(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            url: None,
            line,
            column,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    /// Creates a warning-severity diagnostic.
    pub fn warning(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(message, line, column)
        }
    }

    /// Sets the document URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the URL only if none was recorded yet.
    pub fn or_url(mut self, url: &str) -> Self {
        if self.url.is_none() {
            self.url = Some(url.to_string());
        }
        self
    }

    /// Sets the severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let url = self.url.as_deref().unwrap_or("<Unknown File>");
        if self.line > 0 {
            write!(f, "{}:{}:{}: {}", url, self.line, self.column, self.message)
        } else {
            write!(f, "{}: {}", url, self.message)
        }
    }
}

/// Sorts diagnostics so the most severe come first, keeping source order otherwise.
pub fn sort_by_severity(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| b.severity.cmp(&a.severity));
}

fn join(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// An exception raised while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EvalError {
    /// Description
    pub message: String,
    /// Line inside the document, 0 when unknown
    pub line: u32,
    /// Column inside the document, 0 when unknown
    pub column: u32,
}

impl EvalError {
    /// Creates an unlocated exception.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: 0,
            column: 0,
        }
    }

    /// Creates a `TypeError` exception.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(format!("TypeError: {}", message.into()))
    }

    /// Creates a `ReferenceError` exception.
    pub fn reference_error(name: &str) -> Self {
        Self::new(format!("ReferenceError: {} is not defined", name))
    }

    /// Fills in a location when none was recorded.
    pub fn at(mut self, line: u32, column: u32) -> Self {
        if self.line == 0 {
            self.line = line;
            self.column = column;
        }
        self
    }
}

/// Errors that can occur in the engine
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Source text could not be parsed
    #[error("{line}:{column}: {message}")]
    Syntax {
        /// Description
        message: String,
        /// Line of the offending token
        line: u32,
        /// Column of the offending token
        column: u32,
    },

    /// A document failed to compile
    #[error("{}", join(.0))]
    Compile(Vec<Diagnostic>),

    /// Object construction failed and was rolled back
    #[error("{}", join(.0))]
    Construction(Vec<Diagnostic>),

    /// Expression evaluation raised an exception
    #[error("{0}")]
    Evaluation(#[from] EvalError),

    /// A property write was rejected
    #[error("{0}")]
    Property(String),

    /// A handle referred to a destroyed object or binding
    #[error("{0} has been destroyed")]
    Destroyed(&'static str),

    /// The engine is not initialized or was shut down
    #[error("Engine is not initialized")]
    NotInitialized,
}

impl Error {
    /// Creates a syntax error.
    pub fn syntax(message: impl Into<String>, line: u32, column: u32) -> Self {
        Error::Syntax {
            message: message.into(),
            line,
            column,
        }
    }

    /// Creates a property error.
    pub fn property(message: impl Into<String>) -> Self {
        Error::Property(message.into())
    }

    /// Converts the error into located diagnostics for `url`.
    pub fn into_diagnostics(self, url: Option<&str>) -> Vec<Diagnostic> {
        let attach = |d: Diagnostic| match url {
            Some(url) => d.or_url(url),
            None => d,
        };
        match self {
            Error::Syntax {
                message,
                line,
                column,
            } => vec![attach(Diagnostic::error(message, line, column))],
            Error::Compile(list) | Error::Construction(list) => {
                list.into_iter().map(attach).collect()
            }
            Error::Evaluation(e) => vec![attach(Diagnostic::error(e.message, e.line, e.column))],
            other => vec![attach(Diagnostic::error(other.to_string(), 0, 0))],
        }
    }
}
