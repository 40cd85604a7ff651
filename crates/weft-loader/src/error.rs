// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the loader

use std::path::PathBuf;
use thiserror::Error;
use weft_engine::Diagnostic;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Why fetching the bytes of a URL failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The remote refused the connection
    #[error("Connection refused")]
    ConnectionRefused,

    /// The remote closed the connection before replying
    #[error("Remote host closed the connection")]
    RemoteHostClosed,

    /// DNS lookup failed
    #[error("Host not found")]
    HostNotFound,

    /// The request took longer than the configured timeout
    #[error("Timeout")]
    Timeout,

    /// The proxy failed or requires credentials
    #[error("Proxy error")]
    Proxy,

    /// Forbidden, locally or remotely
    #[error("Access denied")]
    AccessDenied,

    /// No such file, or a 404 reply
    #[error("File not found")]
    FileNotFound,

    /// The remote requires credentials
    #[error("Authentication required")]
    AuthenticationRequired,

    /// The redirect chain exceeded the configured cap
    #[error("Too many redirects")]
    TooManyRedirects,

    /// The URL is empty or cannot be fetched
    #[error("Invalid null URL")]
    InvalidUrl,

    /// Anything else
    #[error("Network error")]
    Other,
}

impl TransportError {
    /// Maps a filesystem error.
    pub fn from_io(error: &std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => TransportError::FileNotFound,
            std::io::ErrorKind::PermissionDenied => TransportError::AccessDenied,
            std::io::ErrorKind::TimedOut => TransportError::Timeout,
            _ => TransportError::Other,
        }
    }

    /// Maps an HTTP status that is neither success nor redirect.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => TransportError::AuthenticationRequired,
            403 => TransportError::AccessDenied,
            404 | 410 => TransportError::FileNotFound,
            407 => TransportError::Proxy,
            408 | 504 => TransportError::Timeout,
            _ => TransportError::Other,
        }
    }
}

/// Errors that can occur while configuring or driving the loader
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Fetching bytes failed
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// A document failed to load, resolve or compile
    #[error("{}", join(.0))]
    Load(Vec<Diagnostic>),

    /// The engine rejected a request
    #[error("{0}")]
    Engine(#[from] weft_engine::Error),

    /// The configuration file could not be read
    #[error("Failed to read {path}: {source}")]
    ConfigIo {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`crate::Config`]
    #[error("Invalid configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// An environment override could not be parsed
    #[error("Invalid value for {name}: {value}")]
    Environment {
        /// Variable name
        name: &'static str,
        /// Offending value
        value: String,
    },

    /// The worker thread could not be started
    #[error("Failed to start loader thread: {0}")]
    Spawn(std::io::Error),

    /// The component is not ready to create objects
    #[error("Component is not ready")]
    NotReady,
}

impl LoaderError {
    /// The located diagnostics carried by this error, if any.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            LoaderError::Load(list) => list.clone(),
            LoaderError::Engine(e) => e.clone().into_diagnostics(None),
            other => vec![Diagnostic::error(other.to_string(), 0, 0)],
        }
    }
}

fn join(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
