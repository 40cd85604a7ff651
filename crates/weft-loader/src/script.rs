// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Imported script files.
//!
//! A script blob parses its payload, waits for the scripts named by its
//! `.import` lines, and is instantiated once all of them are available.

use parking_lot::Mutex;
use std::sync::Arc;
use url::Url;
use weft_engine::ast::ScriptProgram;
use weft_engine::expr::ScriptInstance;
use weft_engine::parser::parse_script;
use weft_engine::Diagnostic;

use crate::blob::{Blob, BlobKind};
use crate::type_loader::TypeLoader;

#[derive(Debug, Default)]
struct ScriptState {
    program: Option<ScriptProgram>,
    imports: Vec<ScriptDependency>,
    instance: Option<Arc<ScriptInstance>>,
}

#[derive(Debug)]
struct ScriptDependency {
    qualifier: String,
    blob: Arc<Blob>,
    line: u32,
    column: u32,
}

/// Script blob payload.
#[derive(Debug, Default)]
pub struct ScriptData {
    state: Mutex<ScriptState>,
}

impl ScriptData {
    /// The instantiated script, once complete.
    pub fn instance(&self) -> Option<Arc<ScriptInstance>> {
        self.state.lock().instance.clone()
    }
}

/// The instance held by a finished script blob.
pub(crate) fn instance_of(blob: &Blob) -> Option<Arc<ScriptInstance>> {
    match blob.kind() {
        BlobKind::Script(data) => data.instance(),
        _ => None,
    }
}

pub(crate) fn data_received(loader: &TypeLoader, blob: &Arc<Blob>, data: &ScriptData, bytes: &[u8]) {
    let url = blob.final_url();
    let Ok(source) = std::str::from_utf8(bytes) else {
        blob.set_error(Diagnostic::error("Invalid UTF-8 in script", 0, 0), loader);
        return;
    };
    let program = match parse_script(source) {
        Ok(program) => program,
        Err(e) => {
            blob.set_errors(e.into_diagnostics(Some(url.as_str())), loader);
            return;
        }
    };

    let base = Url::parse(&url).ok();
    let mut dependencies = Vec::new();
    for import in &program.imports {
        let Some(target) = base.as_ref().and_then(|b| b.join(&import.path).ok()) else {
            blob.set_error(
                Diagnostic::error(
                    format!("Script {} unavailable", import.path),
                    import.span.line,
                    import.span.column,
                ),
                loader,
            );
            return;
        };
        let dependency = loader.get_script(&target);
        blob.add_dependency(&dependency, loader);
        dependencies.push(ScriptDependency {
            qualifier: import.qualifier.clone(),
            blob: dependency,
            line: import.span.line,
            column: import.span.column,
        });
    }

    let mut state = data.state.lock();
    state.program = Some(program);
    state.imports = dependencies;
}

pub(crate) fn done(loader: &TypeLoader, blob: &Arc<Blob>, data: &ScriptData) {
    let (program, imports) = {
        let mut state = data.state.lock();
        (state.program.take(), std::mem::take(&mut state.imports))
    };
    if blob.is_error() {
        return;
    }
    let Some(program) = program else {
        return;
    };

    let mut errors = Vec::new();
    let mut instances = Vec::new();
    for import in imports {
        match instance_of(&import.blob) {
            Some(instance) if import.blob.is_complete() => instances.push((import.qualifier, instance)),
            _ => {
                errors.push(Diagnostic::error(
                    format!("Script {} unavailable", import.blob.url()),
                    import.line,
                    import.column,
                ));
                errors.extend(import.blob.errors());
            }
        }
    }
    if !errors.is_empty() {
        blob.set_errors(errors, loader);
        return;
    }

    let url = blob.final_url();
    match ScriptInstance::new(url.clone(), &program, instances) {
        Ok(instance) => data.state.lock().instance = Some(instance),
        Err(e) => blob.set_error(Diagnostic::error(e.message, e.line, e.column).with_url(url), loader),
    }
}
