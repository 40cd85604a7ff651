// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Imported scripts.
//!
//! A script is instantiated once per URL and shared by every document that
//! imports it, so its variables behave like library state.

use super::interpreter::TreeWalker;
use super::{Callable, Namespace, NullScope, Scope};
use crate::ast::{FunctionDeclaration, ScriptItem, ScriptProgram};
use crate::error::EvalError;
use crate::runtime::{ObjectId, Value};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// An evaluated script file.
#[derive(Debug)]
pub struct ScriptInstance {
    url: String,
    functions: Vec<Arc<FunctionDeclaration>>,
    variables: Mutex<FxHashMap<String, Value>>,
    imports: Vec<(String, Arc<ScriptInstance>)>,
}

impl ScriptInstance {
    /// Instantiates `program`, running its variable initializers in order.
    ///
    /// `imports` are the already instantiated `.import` dependencies, keyed
    /// by qualifier.
    pub fn new(
        url: impl Into<String>,
        program: &ScriptProgram,
        imports: Vec<(String, Arc<ScriptInstance>)>,
    ) -> Result<Arc<ScriptInstance>, EvalError> {
        let mut functions = Vec::new();
        let mut variables = FxHashMap::default();
        for item in &program.items {
            match item {
                ScriptItem::Function(declaration) => functions.push(Arc::new(declaration.clone())),
                ScriptItem::Variable { name, .. } => {
                    variables.insert(name.clone(), Value::Undefined);
                }
            }
        }
        let script = Arc::new(ScriptInstance {
            url: url.into(),
            functions,
            variables: Mutex::new(variables),
            imports,
        });

        let mut walker = TreeWalker::new();
        for item in &program.items {
            if let ScriptItem::Variable {
                name,
                init: Some(init),
            } = item
            {
                let mut host = NullScope;
                let mut scope = ScriptScope::new(script.clone(), &mut host);
                let value = walker.evaluate(init, &mut scope)?;
                script.variables.lock().insert(name.clone(), value);
            }
        }
        tracing::debug!(url = %script.url, functions = script.functions.len(), "script instantiated");
        Ok(script)
    }

    /// URL the script was loaded from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Name of function `index`.
    pub fn function_name(&self, index: usize) -> &str {
        self.functions
            .get(index)
            .map(|f| f.name.as_str())
            .unwrap_or("anonymous")
    }

    pub(crate) fn function(&self, index: usize) -> Option<Arc<FunctionDeclaration>> {
        self.functions.get(index).cloned()
    }

    /// Reads a variable, function or nested import by name.
    pub fn get(self: &Arc<Self>, name: &str) -> Option<Value> {
        if let Some(value) = self.variables.lock().get(name) {
            return Some(value.clone());
        }
        if let Some(index) = self.functions.iter().position(|f| f.name == name) {
            return Some(Value::Function(Arc::new(Callable::Script {
                script: self.clone(),
                index,
            })));
        }
        self.imports
            .iter()
            .find(|(qualifier, _)| qualifier == name)
            .map(|(_, script)| Value::Namespace(Namespace::Script(script.clone())))
    }

    /// Writes an existing variable. Returns false for unknown names.
    pub fn set(&self, name: &str, value: Value) -> bool {
        match self.variables.lock().get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// Scope of code running inside a script function.
///
/// Script names shadow everything else; remaining lookups and all object
/// access go to the calling scope.
pub(crate) struct ScriptScope<'a, 'b> {
    script: Arc<ScriptInstance>,
    host: &'a mut (dyn Scope + 'b),
}

impl<'a, 'b> ScriptScope<'a, 'b> {
    pub(crate) fn new(script: Arc<ScriptInstance>, host: &'a mut (dyn Scope + 'b)) -> Self {
        Self { script, host }
    }
}

impl Scope for ScriptScope<'_, '_> {
    fn lookup(&mut self, name: &str) -> Result<Value, EvalError> {
        match self.script.get(name) {
            Some(value) => Ok(value),
            None => self.host.lookup(name),
        }
    }

    fn assign(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        if self.script.set(name, value.clone()) {
            return Ok(());
        }
        self.host.assign(name, value)
    }

    fn get_property(&mut self, object: ObjectId, name: &str) -> Result<Value, EvalError> {
        self.host.get_property(object, name)
    }

    fn set_property(&mut self, object: ObjectId, name: &str, value: Value) -> Result<(), EvalError> {
        self.host.set_property(object, name, value)
    }

    fn emit_signal(&mut self, object: ObjectId, name: &str, args: Vec<Value>) -> Result<(), EvalError> {
        self.host.emit_signal(object, name, args)
    }
}
