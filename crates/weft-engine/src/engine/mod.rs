// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The engine facade.
//!
//! An [`Engine`] owns every object, context and binding created from
//! compiled units. It is single threaded: the loader compiles units on its
//! own threads and hands the immutable results over, but construction,
//! binding evaluation and destruction all happen on the thread that owns the
//! engine.
//!
//! # Example
//!
//! ```
//! use weft_engine::Engine;
//!
//! let mut engine = Engine::new();
//! engine.initialize();
//! let unit = engine
//!     .compile_source("file:///main.weft", "import Weft 1.0\nItem { width: 10; height: width * 2 }")
//!     .unwrap();
//! let root = engine.create(&unit).unwrap();
//! assert_eq!(engine.property(root, "height").unwrap().to_number(), 20.0);
//! ```

pub mod base_types;
mod property;
mod scope;
mod warnings;

pub use warnings::{WarningHandler, WarningSink};

use crate::binding::BindingStore;
use crate::compiler::{self, CompiledUnit};
use crate::error::{Diagnostic, Error, Result};
use crate::expr::{Callable, CompiledFunction, NativeFunction};
use crate::parser::{parse_document, parse_expression};
use crate::runtime::{ContextId, ContextTree, ObjectData, ObjectId, ObjectTree, TypeRegistry, Value};
use crate::vm::Vm;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Work queued until the outermost creation in progress has completed.
pub type Finalizer = Box<dyn FnOnce(&mut Engine) + Send>;

/// The object engine.
pub struct Engine {
    pub(crate) objects: ObjectTree,
    pub(crate) contexts: ContextTree,
    pub(crate) bindings: BindingStore,
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) globals: FxHashMap<String, Value>,
    pub(crate) warnings: WarningSink,
    pub(crate) in_progress: usize,
    pub(crate) delayed_errors: Vec<Diagnostic>,
    pub(crate) finalizers: Vec<Finalizer>,
    pub(crate) captures: Vec<Vec<(ObjectId, u16)>>,
    root_context: Option<ContextId>,
    initialized: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("objects", &self.objects.len())
            .field("contexts", &self.contexts.len())
            .field("bindings", &self.bindings.len())
            .field("in_progress", &self.in_progress)
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// A serializable view of an object subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectSnapshot {
    /// Type name
    #[serde(rename = "type")]
    pub type_name: String,
    /// Document id, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Plain property values in layout order
    pub properties: Vec<PropertySnapshot>,
    /// Grouped sub-objects by property name
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, ObjectSnapshot>,
    /// Structural children
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ObjectSnapshot>,
}

/// One property of an [`ObjectSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertySnapshot {
    /// Property name
    pub name: String,
    /// Current value
    pub value: Value,
}

impl Engine {
    /// Creates an engine with its own type registry.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(TypeRegistry::new()))
    }

    /// Creates an engine sharing `registry`, typically with a loader.
    pub fn with_registry(registry: Arc<TypeRegistry>) -> Self {
        Self {
            objects: ObjectTree::new(),
            contexts: ContextTree::new(),
            bindings: BindingStore::new(),
            registry,
            globals: FxHashMap::default(),
            warnings: WarningSink::new(),
            in_progress: 0,
            delayed_errors: Vec::new(),
            finalizers: Vec::new(),
            captures: Vec::new(),
            root_context: None,
            initialized: false,
        }
    }

    /// Registers the base module and creates the root context.
    ///
    /// Calling this again is a no-op.
    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        if !self.registry.is_module_installed(base_types::MODULE) {
            base_types::register(&self.registry);
        }
        self.root_context = Some(self.contexts.create(None, ""));
        self.initialized = true;
        tracing::debug!(types = self.registry.len(), "engine initialized");
    }

    /// Destroys every object and context. The registry is kept.
    pub fn shutdown(&mut self) {
        if !self.initialized {
            return;
        }
        self.bindings.clear();
        self.objects.clear();
        self.contexts.clear();
        self.finalizers.clear();
        self.delayed_errors.clear();
        self.captures.clear();
        self.in_progress = 0;
        self.root_context = None;
        self.initialized = false;
        tracing::debug!("engine shut down");
    }

    /// Whether [`Engine::initialize`] has run.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The type registry.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The root context every document context descends from.
    pub fn root_context(&self) -> Result<ContextId> {
        self.root_context.ok_or(Error::NotInitialized)
    }

    // ========================================================================
    // Compilation and construction
    // ========================================================================

    /// Compiles a document whose imports are all native modules.
    pub fn compile_source(&self, url: &str, source: &str) -> Result<Arc<CompiledUnit>> {
        let document = parse_document(source).map_err(|e| Error::Compile(e.into_diagnostics(Some(url))))?;
        let resolved = compiler::resolve_modules(url, document, &self.registry).map_err(Error::Compile)?;
        let unit = compiler::compile(&resolved).map_err(Error::Compile)?;
        Ok(Arc::new(unit))
    }

    /// Creates an instance of `unit` in the root context.
    pub fn create(&mut self, unit: &Arc<CompiledUnit>) -> Result<ObjectId> {
        let context = self.root_context()?;
        self.create_in_context(unit, context)
    }

    /// Creates an instance of `unit` in a child of `parent`.
    ///
    /// Construction and completion both run before this returns. On failure
    /// every object created so far is destroyed.
    pub fn create_in_context(&mut self, unit: &Arc<CompiledUnit>, parent: ContextId) -> Result<ObjectId> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }
        if !self.contexts.contains(parent) {
            return Err(Error::Destroyed("context"));
        }
        let mut vm = Vm::new(unit.clone(), parent);
        let root = vm.execute(self).map_err(Error::Construction)?;
        vm.complete(self);
        tracing::debug!(url = %unit.url(), root = %root, objects = self.objects.len(), "created");
        Ok(root)
    }

    /// Creates an instance of the component held by a `Component` object.
    pub fn create_from_component(&mut self, component: ObjectId) -> Result<ObjectId> {
        let definition = self
            .objects
            .data(component)?
            .component
            .clone()
            .ok_or_else(|| Error::property("Object is not a component"))?;
        if !self.contexts.contains(definition.context) {
            return Err(Error::Destroyed("context"));
        }
        self.create_in_context(&definition.unit, definition.context)
    }

    /// Runs the assignments deferred during construction of `object`.
    ///
    /// Returns `Ok(false)` when nothing was deferred.
    pub fn complete_deferred(&mut self, object: ObjectId) -> Result<bool> {
        let ranges = std::mem::take(&mut self.objects.data_mut(object)?.deferred);
        if ranges.is_empty() {
            return Ok(false);
        }
        let mut ranges = ranges.into_iter();
        while let Some(range) = ranges.next() {
            let mut vm = Vm::for_deferred(range, object);
            if let Err(errors) = vm.execute(self) {
                // Ranges not yet run stay queued for a later attempt.
                if let Some(data) = self.objects.get_mut(object) {
                    data.deferred.extend(ranges);
                }
                return Err(Error::Construction(errors));
            }
            vm.complete(self);
        }
        Ok(true)
    }

    /// Queues `finalizer` until the outermost creation completes. Runs it
    /// right away when no creation is in progress.
    pub fn register_finalizer(&mut self, finalizer: impl FnOnce(&mut Engine) + Send + 'static) {
        if self.in_progress == 0 {
            finalizer(self);
        } else {
            self.finalizers.push(Box::new(finalizer));
        }
    }

    /// Number of creations that have not yet completed.
    pub fn in_progress_creations(&self) -> usize {
        self.in_progress
    }

    pub(crate) fn begin_creation(&mut self) {
        self.in_progress += 1;
    }

    /// Ends one creation. Errors delayed while creations were nested are
    /// reported once the outermost one ends.
    pub(crate) fn end_creation(&mut self) {
        self.in_progress = self.in_progress.saturating_sub(1);
        if self.in_progress == 0 && !self.delayed_errors.is_empty() {
            let delayed = std::mem::take(&mut self.delayed_errors);
            self.warnings.warn_all(delayed);
        }
    }

    /// Reports a runtime error, delaying it while a creation is in progress.
    pub(crate) fn report_error(&mut self, diagnostic: Diagnostic) {
        if self.in_progress > 0 {
            self.delayed_errors.push(diagnostic);
        } else {
            self.warnings.warn(diagnostic);
        }
    }

    // ========================================================================
    // Globals
    // ========================================================================

    /// Sets a property visible to every expression of the root context.
    pub fn set_context_property(&mut self, name: &str, value: Value) -> Result<()> {
        let context = self.root_context()?;
        let data = self.contexts.get_mut(context).ok_or(Error::Destroyed("context"))?;
        data.properties.insert(name.to_string(), value);
        Ok(())
    }

    /// Sets a property of a specific context.
    pub fn set_property_in_context(&mut self, context: ContextId, name: &str, value: Value) -> Result<()> {
        let data = self.contexts.get_mut(context).ok_or(Error::Destroyed("context"))?;
        data.properties.insert(name.to_string(), value);
        Ok(())
    }

    /// Makes a host function callable by name from every expression.
    pub fn register_function(
        &mut self,
        name: &str,
        function: impl Fn(&[Value]) -> std::result::Result<Value, crate::error::EvalError> + Send + Sync + 'static,
    ) {
        let function: Arc<NativeFunction> = Arc::new(function);
        let callable = Callable::Native {
            name: name.to_string(),
            function,
        };
        self.globals.insert(name.to_string(), Value::Function(Arc::new(callable)));
    }

    /// Sets a global value, shadowed by anything in a context.
    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    // ========================================================================
    // Object tree
    // ========================================================================

    /// Whether `object` is alive.
    pub fn contains(&self, object: ObjectId) -> bool {
        self.objects.contains(object)
    }

    /// Data of a live object.
    pub fn object(&self, object: ObjectId) -> Result<&ObjectData> {
        self.objects.data(object)
    }

    /// Type name of an object.
    pub fn type_name(&self, object: ObjectId) -> Result<&str> {
        Ok(self.objects.data(object)?.type_name())
    }

    /// Structural parent.
    pub fn parent(&self, object: ObjectId) -> Result<Option<ObjectId>> {
        Ok(self.objects.data(object)?.parent)
    }

    /// Structural children in creation order.
    pub fn children(&self, object: ObjectId) -> Result<Vec<ObjectId>> {
        Ok(self.objects.data(object)?.children.clone())
    }

    /// Resolves `name` from the context `object` was created in.
    pub fn lookup_id(&self, object: ObjectId, name: &str) -> Option<ObjectId> {
        let context = self.objects.get(object)?.context;
        self.contexts
            .resolve_id(context, name)
            .filter(|id| self.objects.contains(*id))
    }

    /// Context an object was created in.
    pub fn context_of(&self, object: ObjectId) -> Result<ContextId> {
        Ok(self.objects.data(object)?.context)
    }

    /// Number of live objects, grouped sub-objects included.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of live contexts, the root context included.
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Number of live bindings.
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Destroys `object` with its children, sub-objects, bindings and the
    /// contexts it owns.
    pub fn destroy(&mut self, object: ObjectId) -> Result<()> {
        if !self.objects.contains(object) {
            return Err(Error::Destroyed("object"));
        }
        self.destroy_object(object);
        Ok(())
    }

    pub(crate) fn destroy_object(&mut self, object: ObjectId) {
        let Some(data) = self.objects.remove(object) else {
            return;
        };
        if let Some(parent) = data.parent.and_then(|p| self.objects.get_mut(p)) {
            parent.children.retain(|c| *c != object);
        }
        for slot in data.bindings.values() {
            for id in slot.ids() {
                self.bindings.remove(id);
            }
        }
        self.bindings.forget_object(object);
        for (descriptor, value) in data.layout.properties().iter().zip(&data.values) {
            if descriptor.grouped.is_some() {
                if let Value::Object(group) = value {
                    self.destroy_object(*group);
                }
            }
        }
        for child in data.children {
            self.destroy_object(child);
        }
        for context in data.owned_contexts {
            self.contexts.remove(context);
        }
    }

    // ========================================================================
    // Warnings
    // ========================================================================

    /// Drains collected warnings.
    pub fn take_warnings(&mut self) -> Vec<Diagnostic> {
        self.warnings.take()
    }

    /// Installs a callback receiving warnings as they are raised.
    pub fn set_warning_handler(&mut self, handler: Option<WarningHandler>) {
        self.warnings.set_handler(handler);
    }

    /// Enables or disables logging of warnings.
    pub fn set_output_warnings_to_stderr(&mut self, enabled: bool) {
        self.warnings.set_output_to_stderr(enabled);
    }

    // ========================================================================
    // Evaluation and inspection
    // ========================================================================

    /// Evaluates an expression with `object` in scope.
    pub fn evaluate(&mut self, object: ObjectId, source: &str) -> Result<Value> {
        let context = self.objects.data(object)?.context;
        let expression = parse_expression(source)?;
        let function = CompiledFunction::expression("<eval>", expression.expression, expression.source);
        Ok(self.run_function(&function, &[], context, Some(object))?)
    }

    /// Captures `object` and its subtree.
    pub fn snapshot(&self, object: ObjectId) -> Result<ObjectSnapshot> {
        let data = self.objects.data(object)?;
        let mut properties = Vec::new();
        let mut groups = BTreeMap::new();
        for (descriptor, value) in data.layout.properties().iter().zip(&data.values) {
            if descriptor.grouped.is_some() {
                if let Value::Object(group) = value {
                    groups.insert(descriptor.name.clone(), self.snapshot(*group)?);
                }
                continue;
            }
            if matches!(value, Value::List(_)) && data.layout.default_property().is_some_and(|d| {
                data.layout.property(d).is_some_and(|p| p.name == descriptor.name)
            }) {
                continue;
            }
            properties.push(PropertySnapshot {
                name: descriptor.name.clone(),
                value: value.clone(),
            });
        }
        let children = data
            .children
            .iter()
            .map(|child| self.snapshot(*child))
            .collect::<Result<Vec<_>>>()?;
        Ok(ObjectSnapshot {
            type_name: data.type_name().to_string(),
            id: data.id_name.clone(),
            properties,
            groups,
            children,
        })
    }
}
