// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Document compiler.
//!
//! Turns a parsed [`Document`] whose type names have been resolved into an
//! immutable [`CompiledUnit`] for the VM.

pub mod bytecode;
pub mod codegen;
pub mod imports;

pub use bytecode::{CompiledUnit, Instruction, TypeRef};
pub use codegen::Compiler;
pub use imports::{ImportEntry, ImportSet, ImportSource, ListedType, TypeResolution};

use crate::ast::{Document, ImportKind};
use crate::error::Diagnostic;
use crate::expr::ScriptInstance;
use crate::runtime::TypeRegistry;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A parsed document together with everything its names resolve to.
#[derive(Debug, Clone)]
pub struct ResolvedDocument {
    /// Document URL
    pub url: String,
    /// Parsed document
    pub document: Document,
    /// Every type name used by the document, keyed by its written form (`W.Item`)
    pub types: FxHashMap<String, TypeRef>,
    /// Imported scripts by qualifier
    pub scripts: Vec<(String, Arc<ScriptInstance>)>,
}

/// Compiles a resolved document.
pub fn compile(resolved: &ResolvedDocument) -> Result<CompiledUnit, Vec<Diagnostic>> {
    Compiler::new(resolved).compile()
}

/// Resolves a document that only imports native modules.
///
/// Directory and script imports need the type loader and are reported as
/// errors here.
pub fn resolve_modules(
    url: &str,
    document: Document,
    registry: &TypeRegistry,
) -> Result<ResolvedDocument, Vec<Diagnostic>> {
    let mut errors = Vec::new();
    let mut imports = ImportSet::new();
    for import in &document.imports {
        let error = |message: String| {
            Diagnostic::error(message, import.span.line, import.span.column).with_url(url)
        };
        match &import.kind {
            ImportKind::Module(uri) => match ImportSet::check_module(registry, uri, import.version) {
                Ok(version) => imports.add(ImportEntry {
                    qualifier: import.qualifier.clone(),
                    source: ImportSource::Module {
                        uri: uri.clone(),
                        version,
                    },
                    implicit: false,
                }),
                Err(message) => errors.push(error(message)),
            },
            ImportKind::Directory(path) => {
                errors.push(error(format!("\"{}\": no such directory", path)));
            }
            ImportKind::Script(path) => {
                errors.push(error(format!("Script {} unavailable", path)));
            }
        }
    }

    let mut types = FxHashMap::default();
    for (name, span) in imports::referenced_types(&document) {
        match imports.resolve(&name, registry) {
            Ok(TypeResolution::Native(native)) => {
                types.insert(name.to_string(), TypeRef::Native(native));
            }
            Ok(TypeResolution::Document(location)) => errors.push(
                Diagnostic::error(format!("Type {} unavailable", location), span.line, span.column)
                    .with_url(url),
            ),
            Err(message) => {
                errors.push(Diagnostic::error(message, span.line, span.column).with_url(url))
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(ResolvedDocument {
        url: url.to_string(),
        document,
        types,
        scripts: Vec::new(),
    })
}
