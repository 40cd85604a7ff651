// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Collection and routing of engine warnings.

use crate::error::Diagnostic;
use std::fmt;

/// Callback receiving warnings as they are raised.
pub type WarningHandler = Box<dyn FnMut(&[Diagnostic]) + Send>;

/// Where binding loops and runtime binding errors end up.
pub struct WarningSink {
    collected: Vec<Diagnostic>,
    handler: Option<WarningHandler>,
    to_stderr: bool,
}

impl fmt::Debug for WarningSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarningSink")
            .field("collected", &self.collected.len())
            .field("handler", &self.handler.is_some())
            .field("to_stderr", &self.to_stderr)
            .finish()
    }
}

impl Default for WarningSink {
    fn default() -> Self {
        Self {
            collected: Vec::new(),
            handler: None,
            to_stderr: true,
        }
    }
}

impl WarningSink {
    /// Creates a sink that logs to stderr.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning.
    pub fn warn(&mut self, diagnostic: Diagnostic) {
        if self.to_stderr {
            tracing::warn!(target: "weft::warnings", "{}", diagnostic);
        }
        if let Some(handler) = self.handler.as_mut() {
            handler(std::slice::from_ref(&diagnostic));
        }
        self.collected.push(diagnostic);
    }

    /// Records several warnings at once.
    pub fn warn_all(&mut self, diagnostics: Vec<Diagnostic>) {
        if diagnostics.is_empty() {
            return;
        }
        if self.to_stderr {
            for diagnostic in &diagnostics {
                tracing::warn!(target: "weft::warnings", "{}", diagnostic);
            }
        }
        if let Some(handler) = self.handler.as_mut() {
            handler(&diagnostics);
        }
        self.collected.extend(diagnostics);
    }

    /// Drains the collected warnings.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.collected)
    }

    /// Number of warnings not yet taken.
    pub fn len(&self) -> usize {
        self.collected.len()
    }

    /// Whether no warning is pending.
    pub fn is_empty(&self) -> bool {
        self.collected.is_empty()
    }

    /// Installs a handler.
    pub fn set_handler(&mut self, handler: Option<WarningHandler>) {
        self.handler = handler;
    }

    /// Enables or disables logging through `tracing`.
    pub fn set_output_to_stderr(&mut self, enabled: bool) {
        self.to_stderr = enabled;
    }

    /// Whether warnings are logged.
    pub fn output_to_stderr(&self) -> bool {
        self.to_stderr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_collects_and_forwards() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let mut sink = WarningSink::new();
        sink.set_output_to_stderr(false);
        sink.set_handler(Some(Box::new(move |list: &[Diagnostic]| {
            sink_seen.lock().extend(list.iter().map(|d| d.message.clone()));
        })));

        sink.warn(Diagnostic::warning("first", 1, 1));
        sink.warn_all(vec![Diagnostic::warning("second", 2, 1), Diagnostic::warning("third", 3, 1)]);

        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.take().len(), 3);
        assert!(sink.is_empty());
    }
}
