// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Document blobs.
//!
//! A document moves through three steps:
//!
//! 1. `data_received` parses it and requests the manifests and scripts its
//!    imports name, plus a listing of its own directory.
//! 2. The first `all_dependencies_done` builds the import set, resolves
//!    every type name, and requests the documents defining composite types.
//! 3. `done` checks that every dependency succeeded and compiles.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;
use url::Url;
use weft_engine::ast::{Document, ImportKind};
use weft_engine::compiler::{self, ImportSet, ResolvedDocument, TypeRef, TypeResolution};
use weft_engine::parser::parse_document;
use weft_engine::runtime::NativeType;
use weft_engine::{CompiledUnit, Diagnostic};

use crate::blob::{Blob, BlobKind};
use crate::imports::{self, PendingImport};
use crate::loader::LoadMode;
use crate::script;
use crate::type_loader::TypeLoader;

#[derive(Debug)]
enum ResolvedType {
    Native(Arc<NativeType>),
    Document(Arc<Blob>),
}

#[derive(Debug)]
struct TypeEntry {
    name: String,
    resolved: ResolvedType,
    line: u32,
    column: u32,
}

#[derive(Debug)]
struct ScriptEntry {
    qualifier: String,
    blob: Arc<Blob>,
    line: u32,
    column: u32,
}

#[derive(Debug)]
struct TypeState {
    mode: LoadMode,
    document: Option<Document>,
    imports: Vec<PendingImport>,
    types: Vec<TypeEntry>,
    scripts: Vec<ScriptEntry>,
    types_resolved: bool,
    unit: Option<Arc<CompiledUnit>>,
}

/// Document blob payload.
#[derive(Debug)]
pub struct TypeData {
    state: Mutex<TypeState>,
}

impl TypeData {
    /// Creates the payload of a document requested with `mode`; its
    /// dependencies are requested the same way.
    pub fn new(mode: LoadMode) -> Self {
        Self {
            state: Mutex::new(TypeState {
                mode,
                document: None,
                imports: Vec::new(),
                types: Vec::new(),
                scripts: Vec::new(),
                types_resolved: false,
                unit: None,
            }),
        }
    }

    /// The compiled document, once complete.
    pub fn compiled_unit(&self) -> Option<Arc<CompiledUnit>> {
        self.state.lock().unit.clone()
    }
}

/// The unit held by a finished document blob.
pub fn compiled_unit_of(blob: &Blob) -> Option<Arc<CompiledUnit>> {
    match blob.kind() {
        BlobKind::Document(data) if blob.is_complete() => data.compiled_unit(),
        _ => None,
    }
}

pub(crate) fn data_received(loader: &TypeLoader, blob: &Arc<Blob>, data: &TypeData, bytes: &[u8]) {
    let url = blob.final_url();
    let Ok(source) = std::str::from_utf8(bytes) else {
        blob.set_error(Diagnostic::error("Invalid UTF-8 in document", 0, 0), loader);
        return;
    };
    let document = match parse_document(source) {
        Ok(document) => document,
        Err(e) => {
            blob.set_errors(e.into_diagnostics(Some(url.as_str())), loader);
            return;
        }
    };
    let mode = data.state.lock().mode;
    let base = Url::parse(&url).ok();
    let registry = loader.registry();

    let mut pending = Vec::new();
    let mut errors = Vec::new();
    for import in &document.imports {
        let (line, column) = (import.span.line, import.span.column);
        let error = |message: String| Diagnostic::error(message, line, column).with_url(url.as_str());
        match &import.kind {
            ImportKind::Module(uri) => {
                let Some(version) = import.version else {
                    errors.push(error("Library import requires a version".to_string()));
                    continue;
                };
                if registry.is_module_installed(uri) {
                    match ImportSet::check_module(registry, uri, Some(version)) {
                        Ok(version) => pending.push(PendingImport::Module {
                            qualifier: import.qualifier.clone(),
                            uri: uri.clone(),
                            version,
                        }),
                        Err(message) => errors.push(error(message)),
                    }
                } else if let Some(manifest_url) = imports::module_manifest(&loader.config().import_paths, uri) {
                    let manifest = loader.manifest_with_mode(&manifest_url, mode);
                    blob.add_dependency(&manifest, loader);
                    pending.push(PendingImport::Manifest {
                        qualifier: import.qualifier.clone(),
                        uri: uri.clone(),
                        version,
                        blob: manifest,
                        line,
                        column,
                    });
                } else {
                    errors.push(error(format!("module \"{}\" is not installed", uri)));
                }
            }
            ImportKind::Directory(path) => {
                let listing = base
                    .as_ref()
                    .and_then(|b| imports::directory_url(b, path))
                    .and_then(|dir| imports::listing_url(&dir));
                let Some(listing) = listing else {
                    errors.push(error(format!("\"{}\": no such directory", path)));
                    continue;
                };
                let manifest = loader.manifest_with_mode(&listing, mode);
                blob.add_dependency(&manifest, loader);
                pending.push(PendingImport::Directory {
                    qualifier: import.qualifier.clone(),
                    location: path.clone(),
                    blob: manifest,
                    implicit: false,
                    line,
                    column,
                });
            }
            ImportKind::Script(path) => {
                let (Some(qualifier), Some(target)) = (
                    import.qualifier.clone(),
                    base.as_ref().and_then(|b| b.join(path).ok()),
                ) else {
                    errors.push(error(format!("Script {} unavailable", path)));
                    continue;
                };
                let script = loader.script_with_mode(&target, mode);
                blob.add_dependency(&script, loader);
                pending.push(PendingImport::Script {
                    qualifier,
                    blob: script,
                    line,
                    column,
                });
            }
        }
    }

    if let Some(listing) = base
        .as_ref()
        .and_then(imports::own_directory)
        .and_then(|dir| imports::listing_url(&dir))
    {
        let manifest = loader.manifest_with_mode(&listing, mode);
        blob.add_dependency(&manifest, loader);
        pending.push(PendingImport::Directory {
            qualifier: None,
            location: listing.to_string(),
            blob: manifest,
            implicit: true,
            line: 0,
            column: 0,
        });
    }

    if !errors.is_empty() {
        blob.set_errors(errors, loader);
        return;
    }
    let mut state = data.state.lock();
    state.document = Some(document);
    state.imports = pending;
}

pub(crate) fn all_dependencies_done(loader: &TypeLoader, blob: &Arc<Blob>, data: &TypeData) {
    let (names, mode, import_set) = {
        let mut state = data.state.lock();
        if state.types_resolved || blob.is_error() {
            return;
        }
        state.types_resolved = true;
        let Some(document) = state.document.as_ref() else {
            return;
        };
        let names = compiler::imports::referenced_types(document);
        let url = blob.final_url();
        (names, state.mode, imports::build_import_set(&state.imports, &url))
    };
    let (set, exported, mut errors) = import_set;
    let url = blob.final_url();
    let own = blob.url().to_string();
    let registry = loader.registry();

    let mut scripts = Vec::new();
    {
        let state = data.state.lock();
        for import in &state.imports {
            if let PendingImport::Script {
                qualifier,
                blob: script,
                line,
                column,
            } = import
            {
                scripts.push(ScriptEntry {
                    qualifier: qualifier.clone(),
                    blob: script.clone(),
                    line: *line,
                    column: *column,
                });
            }
        }
    }
    let mut new_dependencies = Vec::new();
    for export in exported {
        let Ok(target) = Url::parse(&export.url) else {
            errors.push(
                Diagnostic::error(format!("Script {} unavailable", export.url), export.line, export.column)
                    .with_url(url.as_str()),
            );
            continue;
        };
        let script = loader.script_with_mode(&target, mode);
        new_dependencies.push(script.clone());
        scripts.push(ScriptEntry {
            qualifier: export.qualifier,
            blob: script,
            line: export.line,
            column: export.column,
        });
    }

    let mut types = Vec::new();
    for (name, span) in names {
        let error = |message: String| Diagnostic::error(message, span.line, span.column).with_url(url.as_str());
        let resolved = match set.resolve(&name, registry) {
            Ok(TypeResolution::Native(native)) => ResolvedType::Native(native),
            Ok(TypeResolution::Document(location)) => {
                if location == own || location == url {
                    errors.push(error(format!("{} is instantiated recursively", name)));
                    continue;
                }
                let Ok(target) = Url::parse(&location) else {
                    errors.push(error(format!("Type {} unavailable", name)));
                    continue;
                };
                let document = loader.get(&target, mode);
                new_dependencies.push(document.clone());
                ResolvedType::Document(document)
            }
            Err(message) => {
                errors.push(error(message));
                continue;
            }
        };
        types.push(TypeEntry {
            name: name.to_string(),
            resolved,
            line: span.line,
            column: span.column,
        });
    }

    if !errors.is_empty() {
        blob.set_errors(errors, loader);
        return;
    }
    {
        let mut state = data.state.lock();
        state.types = types;
        state.scripts = scripts;
    }
    for dependency in new_dependencies {
        blob.add_dependency(&dependency, loader);
    }
}

pub(crate) fn done(loader: &TypeLoader, blob: &Arc<Blob>, data: &TypeData) {
    let (document, types, scripts) = {
        let mut state = data.state.lock();
        state.imports.clear();
        (
            state.document.take(),
            std::mem::take(&mut state.types),
            std::mem::take(&mut state.scripts),
        )
    };
    if blob.is_error() {
        return;
    }
    let Some(document) = document else {
        return;
    };
    let url = blob.final_url();
    let located = |message: String, line: u32, column: u32| {
        Diagnostic::error(message, line, column).with_url(url.as_str())
    };

    let mut errors = Vec::new();
    let mut instances = Vec::new();
    for entry in scripts {
        match script::instance_of(&entry.blob) {
            Some(instance) if entry.blob.is_complete() => instances.push((entry.qualifier, instance)),
            _ => {
                errors.push(located(
                    format!("Script {} unavailable", entry.blob.url()),
                    entry.line,
                    entry.column,
                ));
                errors.extend(entry.blob.errors());
            }
        }
    }

    let mut resolved = Vec::new();
    for entry in types {
        match entry.resolved {
            ResolvedType::Native(native) => resolved.push((entry.name, TypeRef::Native(native))),
            ResolvedType::Document(dependency) => match compiled_unit_of(&dependency) {
                Some(unit) => resolved.push((entry.name, TypeRef::Unit(unit))),
                None => {
                    errors.push(located(
                        format!("Type {} unavailable", entry.name),
                        entry.line,
                        entry.column,
                    ));
                    errors.extend(dependency.errors());
                }
            },
        }
    }
    if !errors.is_empty() {
        blob.set_errors(errors, loader);
        return;
    }

    let resolved = ResolvedDocument {
        url: url.clone(),
        document,
        types: resolved.into_iter().collect(),
        scripts: instances,
    };
    match compiler::compile(&resolved) {
        Ok(unit) => {
            debug!(url = %url, instructions = unit.instructions().len(), "document compiled");
            data.state.lock().unit = Some(Arc::new(unit));
        }
        Err(errors) => blob.set_errors(errors, loader),
    }
}
