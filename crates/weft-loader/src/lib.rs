// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # weft-loader
//!
//! Loads Weft documents, scripts and module manifests from disk or the
//! network, resolves imports between them, and compiles each document
//! once its dependencies are available.
//!
//! ## Architecture
//!
//! - [`DataLoader`] fetches bytes on a dedicated worker thread running a
//!   tokio runtime. Results are handed back to the consuming thread, which
//!   delivers them by pumping [`TypeLoader::process_events`] or
//!   [`TypeLoader::wait_for`].
//! - Every resource is a [`Blob`]: a node of the dependency graph that
//!   finishes once its data and all of its dependencies have.
//! - [`TypeLoader`] caches one blob per URL and kind, and drives document
//!   blobs from parsing through import resolution to compilation.
//!
//! ## Quick Start
//!
//! ```no_run
//! use weft_engine::Engine;
//! use weft_loader::{url_from_input, Component, Config, LoadMode, TypeLoader};
//!
//! let mut engine = Engine::new();
//! engine.initialize();
//! let loader = TypeLoader::new(engine.registry().clone(), Config::default())?;
//! let url = url_from_input("Main.weft")?;
//! let component = Component::load(&loader, &url, LoadMode::PreferSynchronous);
//! component.wait(&loader)?;
//! let root = component.create(&mut engine)?;
//! # Ok::<(), weft_loader::LoaderError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blob;
pub mod component;
pub mod config;
pub mod error;
pub mod imports;
pub mod loader;
pub mod manifest;
pub mod network;
pub mod script;
pub mod thread;
pub mod type_data;
pub mod type_loader;

pub use blob::{Blob, BlobHooks, BlobKind, NoHooks, Status};
pub use component::Component;
pub use config::{Config, DATALOADER_MAXIMUM_REDIRECT_RECURSION};
pub use error::{LoaderError, Result, TransportError};
pub use loader::{url_from_input, DataLoader, LoadMode};
pub use manifest::Manifest;
pub use network::{HttpNetwork, NetworkAccess, NetworkReply, ProgressFn};
pub use type_loader::TypeLoader;
