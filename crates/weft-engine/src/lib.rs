// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # weft-engine
//!
//! Compiler, construction VM and binding engine for Weft component
//! documents.
//!
//! ## Overview
//!
//! A Weft document describes a tree of typed objects whose properties are
//! literals or expressions. This crate provides:
//! - Lexer and parsers for documents, expressions and imported scripts
//! - A compiler lowering a resolved document into a [`CompiledUnit`]
//! - A two-phase VM building the object tree from a unit
//! - A binding engine keeping properties equal to their expressions, with
//!   dependency tracking and binding-loop detection
//!
//! Loading documents from disk or the network, and resolving imports
//! between documents, is the job of the `weft-loader` crate.
//!
//! ## Quick Start
//!
//! ```rust
//! use weft_engine::{Engine, Value};
//!
//! let mut engine = Engine::new();
//! engine.initialize();
//! let unit = engine
//!     .compile_source("file:///hello.weft", "import Weft 1.0\nText { text: \"Hello, \" + \"world\" }")
//!     .unwrap();
//! let text = engine.create(&unit).unwrap();
//! assert_eq!(engine.property(text, "text").unwrap(), Value::from("Hello, world"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod binding;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod expr;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod vm;

// Re-exports for convenience
pub use binding::{Binding, BindingId};
pub use compiler::{CompiledUnit, ResolvedDocument};
pub use engine::{Engine, ObjectSnapshot, PropertySnapshot};
pub use error::{Diagnostic, Error, EvalError, Result, Severity};
pub use runtime::{
    ConstructionHooks, ContextId, NativeType, ObjectId, PropertyType, TypeRegistry, Value,
};
pub use vm::Vm;
