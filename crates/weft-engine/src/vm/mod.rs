// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The construction VM.
//!
//! A [`Vm`] turns a [`CompiledUnit`] into a live object tree in two phases.
//!
//! ## Construction
//!
//! [`Vm::execute`] interprets the instruction stream. Objects are pushed on
//! an object stack as they are created, literal stores write property slots
//! directly, bindings are attached disabled and handlers are registered.
//! Instantiating a document type pushes a new frame running that type's
//! unit in a child context. Any error destroys everything created so far.
//!
//! ## Completion
//!
//! [`Vm::complete`] enables the bindings in the order they were registered,
//! runs `component_complete` hooks innermost first, then the
//! `Component.onCompleted` handlers in reverse registration order, then the
//! engine's finalizers if this was the outermost creation.

#[cfg(test)]
mod tests;

use crate::binding::{Binding, BindingId};
use crate::compiler::{CompiledUnit, Instruction, TypeRef};
use crate::engine::Engine;
use crate::error::Diagnostic;
use crate::expr::CompiledFunction;
use crate::runtime::object::{ComponentDefinition, DeferredRange, Handler, HandlerKind};
use crate::runtime::{ContextId, NativeType, ObjectData, ObjectId, PropertyIndex, PropertyLayout, Value};
use std::sync::Arc;

/// One unit being executed.
struct Frame {
    unit: Arc<CompiledUnit>,
    url: Arc<str>,
    pc: usize,
    end: usize,
    context: ContextId,
    /// First object created by the frame
    root: Option<ObjectId>,
    /// Use-site layout replacing the root's own
    layout: Option<Arc<PropertyLayout>>,
    /// Root properties the use site assigns
    skip: Vec<u16>,
}

impl Frame {
    fn new(unit: Arc<CompiledUnit>, context: ContextId) -> Self {
        let end = unit.instructions().len();
        Self {
            url: Arc::from(unit.url()),
            unit,
            pc: 0,
            end,
            context,
            root: None,
            layout: None,
            skip: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StackEntry {
    object: ObjectId,
    /// Grouped sub-object pushed by `FetchObject`, with its owner and property
    group_of: Option<(ObjectId, u16)>,
}

/// A completion handler waiting for the completion phase.
struct PendingHandler {
    function: Arc<CompiledFunction>,
    context: ContextId,
    scope: ObjectId,
    url: Arc<str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Ready,
    Constructed,
    Finished,
}

/// Executes one compiled unit, or one deferred range, against an engine.
pub struct Vm {
    unit: Arc<CompiledUnit>,
    parent_context: Option<ContextId>,
    frames: Vec<Frame>,
    stack: Vec<StackEntry>,
    root: Option<ObjectId>,
    created: Vec<ObjectId>,
    contexts: Vec<ContextId>,
    bindings: Vec<BindingId>,
    begun: Vec<ObjectId>,
    completion: Vec<PendingHandler>,
    finalizer_base: usize,
    phase: Phase,
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("unit", &self.unit.url())
            .field("frames", &self.frames.len())
            .field("created", &self.created.len())
            .field("bindings", &self.bindings.len())
            .field("phase", &self.phase)
            .finish()
    }
}

impl Vm {
    /// Prepares to instantiate `unit` in a new child of `parent_context`.
    pub fn new(unit: Arc<CompiledUnit>, parent_context: ContextId) -> Self {
        Self {
            unit,
            parent_context: Some(parent_context),
            frames: Vec::new(),
            stack: Vec::new(),
            root: None,
            created: Vec::new(),
            contexts: Vec::new(),
            bindings: Vec::new(),
            begun: Vec::new(),
            completion: Vec::new(),
            finalizer_base: 0,
            phase: Phase::Ready,
        }
    }

    /// Prepares to replay a range deferred during construction of `object`.
    pub fn for_deferred(range: DeferredRange, object: ObjectId) -> Self {
        let mut frame = Frame::new(range.unit.clone(), range.context);
        frame.pc = range.start;
        frame.end = range.end.min(frame.end);
        frame.root = Some(object);
        let mut vm = Self::new(range.unit, range.context);
        vm.parent_context = None;
        vm.frames.push(frame);
        vm.stack.push(StackEntry {
            object,
            group_of: None,
        });
        vm.root = Some(object);
        vm
    }

    /// The root object, once construction has created it.
    pub fn root(&self) -> Option<ObjectId> {
        self.root
    }

    /// Runs the construction phase.
    ///
    /// On error every object and context created by this run is destroyed
    /// and the errors are returned.
    pub fn execute(&mut self, engine: &mut Engine) -> Result<ObjectId, Vec<Diagnostic>> {
        if self.phase != Phase::Ready {
            return Err(vec![Diagnostic::error("Construction already ran", 0, 0).with_url(self.unit.url())]);
        }
        if !engine.is_initialized() {
            return Err(vec![Diagnostic::error("Engine is not initialized", 0, 0).with_url(self.unit.url())]);
        }
        engine.begin_creation();
        self.finalizer_base = engine.finalizers.len();
        tracing::trace!(url = %self.unit.url(), "construction started");

        if let Some(parent) = self.parent_context {
            let unit = self.unit.clone();
            let context = self.open_context(engine, parent, &unit);
            self.frames.push(Frame::new(unit, context));
        }

        let outcome = self.run(engine).and_then(|()| {
            self.root
                .ok_or_else(|| Diagnostic::error("Unit created no object", 0, 0).with_url(self.unit.url()))
        });
        match outcome {
            Ok(root) => {
                self.phase = Phase::Constructed;
                Ok(root)
            }
            Err(diagnostic) => {
                tracing::debug!(url = %self.unit.url(), error = %diagnostic, "construction failed");
                self.rollback(engine);
                self.phase = Phase::Finished;
                engine.end_creation();
                Err(vec![diagnostic])
            }
        }
    }

    /// Runs the completion phase.
    pub fn complete(&mut self, engine: &mut Engine) {
        if self.phase != Phase::Constructed {
            return;
        }
        self.phase = Phase::Finished;
        tracing::trace!(url = %self.unit.url(), bindings = self.bindings.len(), "completion started");

        for id in std::mem::take(&mut self.bindings) {
            let Some(binding) = engine.bindings.get_mut(id) else {
                continue;
            };
            binding.enabled = true;
            engine.update_binding_now(id);
        }

        for object in std::mem::take(&mut self.begun).into_iter().rev() {
            let hooks = engine.objects.get(object).and_then(|data| data.hooks());
            if let Some(hooks) = hooks {
                hooks.component_complete(engine, object);
            }
        }

        for handler in std::mem::take(&mut self.completion).into_iter().rev() {
            if !engine.objects.contains(handler.scope) {
                continue;
            }
            let result = engine.run_function(&handler.function, &[], handler.context, Some(handler.scope));
            if let Err(e) = result {
                let diagnostic = Diagnostic::error(e.message, e.line, e.column).with_url(&*handler.url);
                engine.report_error(diagnostic);
            }
        }

        if engine.in_progress == 1 {
            while !engine.finalizers.is_empty() {
                for finalizer in std::mem::take(&mut engine.finalizers) {
                    finalizer(engine);
                }
            }
        }
        engine.end_creation();
    }

    // ========================================================================
    // Interpreter loop
    // ========================================================================

    fn run(&mut self, engine: &mut Engine) -> Result<(), Diagnostic> {
        while let Some(frame) = self.frames.last_mut() {
            let instruction = match frame.unit.instructions().get(frame.pc) {
                Some(instruction) if frame.pc < frame.end => instruction.clone(),
                _ => {
                    self.frames.pop();
                    continue;
                }
            };
            frame.pc += 1;
            self.step(engine, instruction)?;
        }
        Ok(())
    }

    fn step(&mut self, engine: &mut Engine, instruction: Instruction) -> Result<(), Diagnostic> {
        match instruction {
            Instruction::Init { objects, bindings } => {
                self.created.reserve(objects as usize);
                self.bindings.reserve(bindings as usize);
            }

            Instruction::CreateObject {
                type_index,
                layout,
                line,
                column,
            } => {
                let unit = self.frame()?.unit.clone();
                let native = match unit.types().get(type_index as usize) {
                    Some(TypeRef::Native(native)) if native.is_creatable() => native.clone(),
                    _ => return Err(self.error("Element is not creatable.", line, column)),
                };
                let layout = match self.take_root_layout() {
                    Some(layout) => layout,
                    None => unit
                        .layouts()
                        .get(layout as usize)
                        .cloned()
                        .unwrap_or_else(|| native.layout().clone()),
                };
                self.create_object(engine, layout, Some(native), line, column)?;
            }

            Instruction::CreateComponentObject {
                type_index,
                layout,
                skip,
                line,
                column,
            } => {
                let frame = self.frame()?;
                let unit = frame.unit.clone();
                let parent = frame.context;
                let inherits = frame.root.is_none();
                let Some(TypeRef::Unit(inner)) = unit.types().get(type_index as usize).cloned() else {
                    return Err(self.error("Element is not creatable.", line, column));
                };
                let mut skip = skip
                    .and_then(|s| unit.skip_lists.get(s as usize).cloned())
                    .unwrap_or_default();
                let mut layout = layout.and_then(|l| unit.layouts().get(l as usize).cloned());
                if inherits {
                    // A composite at the root of another composite takes the
                    // outer use site's layout and skip list too.
                    if let Some(outer) = self.take_root_layout() {
                        layout = Some(outer);
                    }
                    skip.extend(self.frame()?.skip.iter().copied());
                }
                let context = self.open_context(engine, parent, &inner);
                let mut frame = Frame::new(inner, context);
                frame.layout = layout;
                frame.skip = skip;
                tracing::trace!(url = %frame.url, "entering component");
                self.frames.push(frame);
            }

            Instruction::CreateComponent { unit, line, column } => {
                let frame = self.frame()?;
                let context = frame.context;
                let Some(body) = frame.unit.components().get(unit as usize).cloned() else {
                    return Err(self.error("Invalid component specification", line, column));
                };
                let native = engine.registry.type_named("Component");
                let layout = native
                    .as_ref()
                    .map(|n| n.layout().clone())
                    .unwrap_or_else(|| Arc::new(PropertyLayout::new("Component")));
                let object = self.create_object(engine, layout, native, line, column)?;
                if let Some(data) = engine.objects.get_mut(object) {
                    data.component = Some(ComponentDefinition { unit: body, context });
                }
            }

            Instruction::BeginObject => {
                let object = self.top()?.object;
                self.begun.push(object);
                let hooks = engine.objects.get(object).and_then(|data| data.hooks());
                if let Some(hooks) = hooks {
                    hooks.class_begin(engine, object);
                }
            }

            Instruction::SetId { name } => {
                let frame = self.frame()?;
                let name = frame.unit.string(name).to_string();
                let context = frame.context;
                let object = self.top()?.object;
                if let Some(data) = engine.contexts.get_mut(context) {
                    data.ids.insert(name.clone(), object);
                }
                if let Some(data) = engine.objects.get_mut(object) {
                    data.id_name = Some(name);
                }
            }

            Instruction::StoreInteger { property, value } => {
                self.store(engine, property, Value::Number(value as f64))?
            }
            Instruction::StoreDouble { property, value } => self.store(engine, property, Value::Number(value))?,
            Instruction::StoreBool { property, value } => self.store(engine, property, Value::Boolean(value))?,
            Instruction::StoreString { property, value } => {
                let value = Value::String(self.frame()?.unit.string(value).to_string());
                self.store(engine, property, value)?
            }
            Instruction::StoreUrl { property, value } => {
                let value = Value::Url(self.frame()?.unit.url_at(value).to_string());
                self.store(engine, property, value)?
            }
            Instruction::StorePoint { property, data } => {
                let value = Value::Point(self.frame()?.unit.point_at(data));
                self.store(engine, property, value)?
            }
            Instruction::StoreSize { property, data } => {
                let value = Value::Size(self.frame()?.unit.size_at(data));
                self.store(engine, property, value)?
            }
            Instruction::StoreNull { property } => self.store(engine, property, Value::Null)?,

            Instruction::StoreBinding { property, function } => {
                let top = *self.top()?;
                let frame = self.frame()?;
                let (owner, core) = top.group_of.unwrap_or((top.object, property.core()));
                if frame.root == Some(owner) && frame.skip.contains(&core) {
                    return Ok(());
                }
                let function = self.function(function)?;
                let mut binding = Binding::new(top.object, property, function, frame.context, frame.url.clone());
                binding.scope = self.scope_object()?;
                let id = engine
                    .attach_binding(binding)
                    .map_err(|e| self.error(e.to_string(), 0, 0))?;
                self.bindings.push(id);
            }

            Instruction::StoreChangeHandler { property, function } => {
                self.add_handler(engine, HandlerKind::PropertyChanged(property), function)?
            }
            Instruction::StoreSignalHandler { signal, function } => {
                let signal = self.frame()?.unit.string(signal).to_string();
                self.add_handler(engine, HandlerKind::Signal(signal), function)?
            }
            Instruction::StoreCompletionHandler { function } => {
                let frame = self.frame()?;
                let handler = PendingHandler {
                    function: self.function(function)?,
                    context: frame.context,
                    scope: self.scope_object()?,
                    url: frame.url.clone(),
                };
                self.completion.push(handler);
            }

            Instruction::StoreObject { property } => {
                let child = self.pop()?.object;
                let parent = self.top()?.object;
                self.adopt_child(engine, parent, child)?;
                let slot = engine
                    .objects
                    .get_mut(parent)
                    .and_then(|data| data.values.get_mut(property as usize));
                if let Some(slot) = slot {
                    *slot = Value::Object(child);
                }
            }

            Instruction::AppendObject { property } => {
                let child = self.pop()?.object;
                let parent = self.top()?.object;
                self.adopt_child(engine, parent, child)?;
                let slot = engine
                    .objects
                    .get_mut(parent)
                    .and_then(|data| data.values.get_mut(property as usize));
                if let Some(slot) = slot {
                    match slot {
                        Value::List(items) => items.push(Value::Object(child)),
                        other => *other = Value::List(vec![Value::Object(child)]),
                    }
                }
            }

            Instruction::FetchObject { property, line, column } => {
                let owner = self.top()?.object;
                let data = engine.objects.get(owner);
                match data.and_then(|d| d.values.get(property as usize)) {
                    Some(Value::Object(group)) if engine.objects.contains(*group) => {
                        let group = *group;
                        self.stack.push(StackEntry {
                            object: group,
                            group_of: Some((owner, property)),
                        });
                    }
                    _ => {
                        let name = data
                            .and_then(|d| d.layout.property(property))
                            .map(|p| p.name.clone())
                            .unwrap_or_default();
                        return Err(self.error(
                            format!("Cannot set properties on {} as it is null", name),
                            line,
                            column,
                        ));
                    }
                }
            }

            Instruction::PopFetchedObject => match self.stack.pop() {
                Some(entry) if entry.group_of.is_some() => {}
                _ => return Err(self.error("Unbalanced object stack", 0, 0)),
            },

            Instruction::Defer { count } => {
                let object = self.top()?.object;
                let Some(frame) = self.frames.last_mut() else {
                    return Err(self.error("Instruction outside of a unit", 0, 0));
                };
                let start = frame.pc;
                let end = (start + count as usize).min(frame.end);
                frame.pc = end;
                let range = DeferredRange {
                    unit: frame.unit.clone(),
                    context: frame.context,
                    start,
                    end,
                };
                if let Some(data) = engine.objects.get_mut(object) {
                    data.deferred.push(range);
                }
            }

            Instruction::CompleteObject => {
                self.top()?;
            }

            Instruction::Done => {
                let Some(frame) = self.frames.pop() else {
                    return Ok(());
                };
                if let (Some(root), Some(parent)) = (frame.root, self.frames.len().checked_sub(1)) {
                    if self.frames[parent].root.is_none() {
                        self.adopt_root(engine, parent, root);
                    }
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn frame(&self) -> Result<&Frame, Diagnostic> {
        self.frames
            .last()
            .ok_or_else(|| Diagnostic::error("Instruction outside of a unit", 0, 0).with_url(self.unit.url()))
    }

    fn top(&self) -> Result<&StackEntry, Diagnostic> {
        self.stack.last().ok_or_else(|| self.error("Object stack is empty", 0, 0))
    }

    fn pop(&mut self) -> Result<StackEntry, Diagnostic> {
        match self.stack.pop() {
            Some(entry) => Ok(entry),
            None => Err(self.error("Object stack is empty", 0, 0)),
        }
    }

    /// The innermost object that is not a grouped sub-object.
    fn scope_object(&self) -> Result<ObjectId, Diagnostic> {
        self.stack
            .iter()
            .rev()
            .find(|entry| entry.group_of.is_none())
            .map(|entry| entry.object)
            .ok_or_else(|| self.error("Object stack is empty", 0, 0))
    }

    fn function(&self, index: u32) -> Result<Arc<CompiledFunction>, Diagnostic> {
        self.frame()?
            .unit
            .functions()
            .get(index as usize)
            .cloned()
            .ok_or_else(|| self.error(format!("Invalid function index {}", index), 0, 0))
    }

    fn error(&self, message: impl Into<String>, line: u32, column: u32) -> Diagnostic {
        let url = self.frames.last().map(|f| f.unit.url()).unwrap_or(self.unit.url());
        Diagnostic::error(message, line, column).with_url(url)
    }

    /// The use-site layout, if the current frame has not created its root yet.
    fn take_root_layout(&mut self) -> Option<Arc<PropertyLayout>> {
        let frame = self.frames.last_mut()?;
        if frame.root.is_some() {
            return None;
        }
        frame.layout.take()
    }

    fn open_context(&mut self, engine: &mut Engine, parent: ContextId, unit: &CompiledUnit) -> ContextId {
        let context = engine.contexts.create(Some(parent), unit.url());
        if let Some(data) = engine.contexts.get_mut(context) {
            data.scripts = unit.scripts().to_vec();
        }
        self.contexts.push(context);
        context
    }

    fn create_object(
        &mut self,
        engine: &mut Engine,
        layout: Arc<PropertyLayout>,
        native: Option<Arc<NativeType>>,
        line: u32,
        column: u32,
    ) -> Result<ObjectId, Diagnostic> {
        let frame = self.frame()?;
        let context = frame.context;
        let url = frame.url.clone();
        let is_root = frame.root.is_none();

        let mut data = ObjectData::new(layout, native, context, url.clone());
        data.line = line;
        data.column = column;
        let object = engine.objects.insert(data);
        self.created.push(object);
        self.create_groups(engine, object, context, &url);
        if is_root {
            self.adopt_root(engine, self.frames.len() - 1, object);
        }
        self.stack.push(StackEntry {
            object,
            group_of: None,
        });
        Ok(object)
    }

    /// Creates the grouped sub-objects of `owner`, recursively.
    fn create_groups(&mut self, engine: &mut Engine, owner: ObjectId, context: ContextId, url: &Arc<str>) {
        let Some(data) = engine.objects.get(owner) else {
            return;
        };
        let groups: Vec<(usize, Arc<NativeType>)> = data
            .layout
            .properties()
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.grouped.clone().map(|g| (i, g)))
            .collect();
        for (index, group) in groups {
            let mut data = ObjectData::new(group.layout().clone(), Some(group.clone()), context, url.clone());
            data.parent = Some(owner);
            let id = engine.objects.insert(data);
            self.created.push(id);
            if let Some(slot) = engine.objects.get_mut(owner).and_then(|d| d.values.get_mut(index)) {
                *slot = Value::Object(id);
            }
            self.create_groups(engine, id, context, url);
        }
    }

    /// Makes `object` the root of frame `index`: it becomes the frame
    /// context's context object and owns that context.
    fn adopt_root(&mut self, engine: &mut Engine, index: usize, object: ObjectId) {
        let Some(frame) = self.frames.get_mut(index) else {
            return;
        };
        frame.root = Some(object);
        let context = frame.context;
        if let Some(data) = engine.contexts.get_mut(context) {
            data.context_object = Some(object);
        }
        if let Some(data) = engine.objects.get_mut(object) {
            data.owned_contexts.push(context);
        }
        if index == 0 && self.root.is_none() {
            self.root = Some(object);
        }
    }

    fn adopt_child(&self, engine: &mut Engine, parent: ObjectId, child: ObjectId) -> Result<(), Diagnostic> {
        engine
            .objects
            .reparent(child, parent)
            .map_err(|e| self.error(e.to_string(), 0, 0))
    }

    fn store(&mut self, engine: &mut Engine, property: PropertyIndex, value: Value) -> Result<(), Diagnostic> {
        let object = self.top()?.object;
        let slot = engine
            .objects
            .get_mut(object)
            .and_then(|data| data.values.get_mut(property.core() as usize));
        let Some(slot) = slot else {
            return Err(self.error(format!("Invalid property index {}", property), 0, 0));
        };
        match property.sub() {
            None => *slot = value,
            Some(sub) => match slot.with_field(sub, value.to_number()) {
                Some(updated) => *slot = updated,
                None => {
                    return Err(self.error(format!("Invalid property index {}", property), 0, 0));
                }
            },
        }
        Ok(())
    }

    fn add_handler(&mut self, engine: &mut Engine, kind: HandlerKind, function: u32) -> Result<(), Diagnostic> {
        let frame = self.frame()?;
        let handler = Handler {
            kind,
            function: self.function(function)?,
            context: frame.context,
            scope: self.scope_object()?,
            url: frame.url.clone(),
            running: false,
        };
        let object = self.top()?.object;
        if let Some(data) = engine.objects.get_mut(object) {
            data.handlers.push(handler);
        }
        Ok(())
    }

    /// Destroys everything this run created.
    fn rollback(&mut self, engine: &mut Engine) {
        for object in self.created.drain(..).rev() {
            engine.destroy_object(object);
        }
        for context in self.contexts.drain(..).rev() {
            engine.contexts.remove(context);
        }
        for id in self.bindings.drain(..) {
            let Some(binding) = engine.bindings.get(id) else {
                continue;
            };
            let (target, property) = (binding.target(), binding.property());
            let attached = engine
                .objects
                .get(target)
                .and_then(|data| data.bindings.get(&property.core()))
                .and_then(|slot| slot.get(property.sub()));
            // Objects that survive the rollback must not keep a slot naming it.
            if attached == Some(id) {
                engine.detach_binding(target, property);
            } else {
                engine.bindings.remove(id);
            }
        }
        engine.finalizers.truncate(self.finalizer_base);
        self.begun.clear();
        self.completion.clear();
        self.frames.clear();
        self.stack.clear();
        if self.parent_context.is_some() {
            self.root = None;
        }
    }
}
