// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Code generation from a resolved document to a [`CompiledUnit`].
//!
//! The compiler walks the object tree once, validating every assignment
//! against the target object's [`PropertyLayout`] and emitting one
//! instruction stream per document. Inline components are compiled into
//! their own units. All errors of a document are collected before failing.

mod fold;

#[cfg(test)]
mod tests;

use super::ResolvedDocument;
use super::bytecode::{CompiledUnit, Instruction, TypeRef};
use crate::ast::*;
use crate::error::Diagnostic;
use crate::expr::{CompiledFunction, FunctionBody};
use crate::lexer::Span;
use crate::runtime::{
    Point, PropertyDescriptor, PropertyIndex, PropertyLayout, PropertyType, SignalDescriptor,
    Size, Value,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

// ============================================================================
// Unit builder
// ============================================================================

/// Pools and instructions of the unit being generated.
#[derive(Default)]
struct UnitBuilder {
    instructions: Vec<Instruction>,
    strings: Vec<String>,
    string_index: FxHashMap<String, u32>,
    data: Vec<u8>,
    urls: Vec<String>,
    types: Vec<TypeRef>,
    type_index: FxHashMap<String, u32>,
    layouts: Vec<Arc<PropertyLayout>>,
    functions: Vec<Arc<CompiledFunction>>,
    skip_lists: Vec<Vec<u16>>,
    components: Vec<Arc<CompiledUnit>>,
    ids: FxHashSet<String>,
    objects: u32,
    bindings: u32,
}

impl UnitBuilder {
    fn emit(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    fn string(&mut self, value: &str) -> u32 {
        if let Some(&index) = self.string_index.get(value) {
            return index;
        }
        let index = self.strings.len() as u32;
        self.strings.push(value.to_string());
        self.string_index.insert(value.to_string(), index);
        index
    }

    fn url(&mut self, value: String) -> u32 {
        if let Some(index) = self.urls.iter().position(|u| *u == value) {
            return index as u32;
        }
        self.urls.push(value);
        (self.urls.len() - 1) as u32
    }

    fn pair(&mut self, a: f64, b: f64) -> u32 {
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(&a.to_le_bytes());
        self.data.extend_from_slice(&b.to_le_bytes());
        offset
    }

    fn type_ref(&mut self, key: &str, ty: &TypeRef) -> u32 {
        if let Some(&index) = self.type_index.get(key) {
            return index;
        }
        let index = self.types.len() as u32;
        self.types.push(ty.clone());
        self.type_index.insert(key.to_string(), index);
        index
    }

    fn layout(&mut self, layout: Arc<PropertyLayout>) -> u32 {
        if let Some(index) = self.layouts.iter().position(|l| Arc::ptr_eq(l, &layout)) {
            return index as u32;
        }
        self.layouts.push(layout);
        (self.layouts.len() - 1) as u32
    }

    fn function(&mut self, function: CompiledFunction) -> u32 {
        self.functions.push(Arc::new(function));
        (self.functions.len() - 1) as u32
    }

    fn finish(
        mut self,
        url: &str,
        scripts: &[(String, Arc<crate::expr::ScriptInstance>)],
        root_layout: Arc<PropertyLayout>,
    ) -> CompiledUnit {
        if let Some(Instruction::Init { objects, bindings }) = self.instructions.first_mut() {
            *objects = self.objects;
            *bindings = self.bindings;
        }
        CompiledUnit {
            url: url.to_string(),
            instructions: self.instructions,
            strings: self.strings,
            data: self.data,
            urls: self.urls,
            types: self.types,
            layouts: self.layouts,
            functions: self.functions,
            scripts: scripts.to_vec(),
            skip_lists: self.skip_lists,
            components: self.components,
            root_layout,
        }
    }
}

/// Assignments queued for the object's deferred range.
enum Pending<'a> {
    Assignment(&'a Assignment),
    Children(u16, Vec<&'a ObjectNode>),
}

// ============================================================================
// Compiler
// ============================================================================

/// Compiles one resolved document.
pub struct Compiler<'a> {
    resolved: &'a ResolvedDocument,
    unit: UnitBuilder,
    errors: Vec<Diagnostic>,
    /// Type name given to the root object's layout
    root_name: Option<String>,
}

impl<'a> Compiler<'a> {
    /// Creates a compiler for `resolved`.
    pub fn new(resolved: &'a ResolvedDocument) -> Self {
        Self {
            resolved,
            unit: UnitBuilder::default(),
            errors: Vec::new(),
            root_name: composite_name(&resolved.url),
        }
    }

    /// Compiles the document, returning every error found.
    pub fn compile(mut self) -> Result<CompiledUnit, Vec<Diagnostic>> {
        let resolved = self.resolved;
        let layout = self.compile_body(&resolved.document.root);
        match layout {
            Some(layout) if self.errors.is_empty() => {
                let unit = std::mem::take(&mut self.unit).finish(&resolved.url, &resolved.scripts, layout);
                tracing::debug!(
                    url = %resolved.url,
                    instructions = unit.instructions.len(),
                    components = unit.components.len(),
                    "compiled document"
                );
                Ok(unit)
            }
            _ => {
                if self.errors.is_empty() {
                    self.errors.push(
                        Diagnostic::error("Unable to compile document", 0, 0).with_url(&resolved.url),
                    );
                }
                Err(self.errors)
            }
        }
    }

    fn error(&mut self, message: impl Into<String>, span: Span) {
        self.errors.push(
            Diagnostic::error(message, span.line, span.column).with_url(&self.resolved.url),
        );
    }

    fn compile_body(&mut self, root: &'a ObjectNode) -> Option<Arc<PropertyLayout>> {
        self.unit.emit(Instruction::Init {
            objects: 0,
            bindings: 0,
        });
        let layout = self.compile_object(root);
        self.unit.emit(Instruction::Done);
        layout
    }

    /// Compiles `body` into a separate unit, used for inline components.
    fn compile_nested(&mut self, body: &'a ObjectNode) -> Option<Arc<CompiledUnit>> {
        let outer = std::mem::take(&mut self.unit);
        let layout = self.compile_body(body);
        let inner = std::mem::replace(&mut self.unit, outer);
        let resolved = self.resolved;
        layout.map(|layout| Arc::new(inner.finish(&resolved.url, &resolved.scripts, layout)))
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Emits the creation of `node` and everything assigned inside it.
    ///
    /// Returns the layout of the created object, or `None` when it could not
    /// be created at all.
    fn compile_object(&mut self, node: &'a ObjectNode) -> Option<Arc<PropertyLayout>> {
        let key = node.type_name.to_string();
        let Some(ty) = self.resolved.types.get(&key).cloned() else {
            self.error(format!("{} is not a type", node.type_name), node.span);
            return None;
        };
        if let TypeRef::Native(native) = &ty {
            if native.name() == "Component" {
                return self.compile_component(node, native.layout().clone());
            }
            if !native.is_creatable() {
                self.error("Element is not creatable.", node.span);
                return None;
            }
        }

        let type_index = self.unit.type_ref(&key, &ty);
        let (layout, extended) = self.object_layout(node, ty.layout());
        self.unit.objects += 1;
        match &ty {
            TypeRef::Native(_) => {
                let layout_index = self.unit.layout(layout.clone());
                self.unit.emit(Instruction::CreateObject {
                    type_index,
                    layout: layout_index,
                    line: node.span.line,
                    column: node.span.column,
                });
                self.unit.emit(Instruction::BeginObject);
            }
            TypeRef::Unit(_) => {
                let layout_index = extended.then(|| self.unit.layout(layout.clone()));
                let skipped = skip_list(node, &layout);
                let skip = (!skipped.is_empty()).then(|| {
                    self.unit.skip_lists.push(skipped);
                    (self.unit.skip_lists.len() - 1) as u32
                });
                self.unit.emit(Instruction::CreateComponentObject {
                    type_index,
                    layout: layout_index,
                    skip,
                    line: node.span.line,
                    column: node.span.column,
                });
            }
        }

        self.compile_id(node);
        self.compile_members(node, &layout);
        self.unit.emit(Instruction::CompleteObject);
        Some(layout)
    }

    /// The layout of `node`: the type's layout, extended with declared
    /// properties and signals. The flag is set when a new layout was made.
    fn object_layout(&mut self, node: &ObjectNode, base: &Arc<PropertyLayout>) -> (Arc<PropertyLayout>, bool) {
        let name = self.root_name.take();
        let declares = node
            .members
            .iter()
            .any(|m| matches!(m, Member::Property(_) | Member::Signal(_)));
        if name.is_none() && !declares {
            return (base.clone(), false);
        }

        let mut layout = match name {
            Some(name) => base.derive(name),
            None => (**base).clone(),
        };
        let mut declared = FxHashSet::default();
        let mut signals = FxHashSet::default();
        let mut has_default = false;
        for member in &node.members {
            match member {
                Member::Property(declaration) => {
                    if declaration.name.starts_with(|c: char| c.is_uppercase()) {
                        self.error(
                            "Property names cannot begin with an upper case letter",
                            declaration.span,
                        );
                        continue;
                    }
                    if !declared.insert(declaration.name.as_str()) {
                        self.error("Duplicate property name", declaration.span);
                        continue;
                    }
                    let Some(ty) = PropertyType::from_name(&declaration.type_name) else {
                        self.error("Invalid property type", declaration.span);
                        continue;
                    };
                    let mut descriptor = PropertyDescriptor::new(declaration.name.clone(), ty);
                    descriptor.readonly = declaration.is_readonly;
                    descriptor.dynamic = true;
                    let index = layout.add_property(descriptor);
                    if declaration.is_default {
                        if has_default {
                            self.error("Duplicate default property", declaration.span);
                        } else {
                            has_default = true;
                            layout.set_default_property(index);
                        }
                    }
                }
                Member::Signal(signal) => {
                    if !signals.insert(signal.name.as_str()) {
                        self.error("Duplicate signal name", signal.span);
                        continue;
                    }
                    layout.add_signal(SignalDescriptor {
                        name: signal.name.clone(),
                        parameters: signal.parameters.clone(),
                    });
                }
                _ => {}
            }
        }
        (Arc::new(layout), true)
    }

    fn compile_id(&mut self, node: &ObjectNode) {
        let Some((name, span)) = node.id() else {
            return;
        };
        let mut chars = name.chars();
        let first = chars.next().unwrap_or(' ');
        if first.is_uppercase() {
            self.error("IDs cannot start with an uppercase letter", span);
            return;
        }
        if !(first.is_alphabetic() || first == '_') {
            self.error("IDs must start with a letter or underscore", span);
            return;
        }
        if !chars.all(|c| c.is_alphanumeric() || c == '_') {
            self.error("IDs must contain only letters, numbers, and underscores", span);
            return;
        }
        if !self.unit.ids.insert(name.to_string()) {
            self.error("id is not unique", span);
            return;
        }
        let name = self.unit.string(name);
        self.unit.emit(Instruction::SetId { name });
    }

    fn compile_members(&mut self, node: &'a ObjectNode, layout: &Arc<PropertyLayout>) {
        let mut assigned: Vec<String> = Vec::new();
        let mut deferred: Vec<Pending<'a>> = Vec::new();
        let mut children: Vec<&'a ObjectNode> = Vec::new();

        for member in &node.members {
            match member {
                Member::Property(declaration) => {
                    let (Some(value), Some(index)) = (&declaration.value, layout.index_of(&declaration.name)) else {
                        continue;
                    };
                    if !self.mark_assigned(&mut assigned, declaration.name.clone(), declaration.span) {
                        continue;
                    }
                    if let Some(descriptor) = layout.property(index) {
                        self.compile_value(descriptor, PropertyIndex::new(index), value, declaration.span);
                    }
                }
                Member::Signal(_) => {}
                Member::Assignment(assignment) => {
                    if assignment.path.len() == 1 && assignment.path[0] == "id" {
                        if node.id().is_none() {
                            self.error("IDs must start with a letter or underscore", assignment.span);
                        }
                        continue;
                    }
                    if !self.mark_assigned(&mut assigned, assignment.name(), assignment.span) {
                        continue;
                    }
                    let is_deferred = layout
                        .index_of(&assignment.path[0])
                        .and_then(|index| layout.property(index))
                        .is_some_and(|d| d.deferred);
                    if is_deferred {
                        deferred.push(Pending::Assignment(assignment));
                    } else {
                        self.compile_assignment(layout, &assignment.path, &assignment.value, assignment.span);
                    }
                }
                Member::Object(child) => children.push(child),
            }
        }

        if !children.is_empty() {
            match layout.default_property() {
                None => {
                    for child in &children {
                        self.error("Cannot assign to non-existent default property", child.span);
                    }
                }
                Some(index) => {
                    let name = layout.property(index).map(|d| d.name.clone()).unwrap_or_default();
                    if self.mark_assigned(&mut assigned, name, children[0].span) {
                        if layout.property(index).is_some_and(|d| d.deferred) {
                            deferred.push(Pending::Children(index, children));
                        } else {
                            self.compile_children(layout, index, &children);
                        }
                    }
                }
            }
        }

        if !deferred.is_empty() {
            let at = self.unit.emit(Instruction::Defer { count: 0 });
            for pending in deferred {
                match pending {
                    Pending::Assignment(assignment) => {
                        self.compile_assignment(layout, &assignment.path, &assignment.value, assignment.span)
                    }
                    Pending::Children(index, children) => self.compile_children(layout, index, &children),
                }
            }
            let count = (self.unit.instructions.len() - at - 1) as u32;
            self.unit.instructions[at] = Instruction::Defer { count };
        }
    }

    /// Records an assigned path; overlapping paths (`offset` and `offset.x`)
    /// count as the same property.
    fn mark_assigned(&mut self, assigned: &mut Vec<String>, path: String, span: Span) -> bool {
        let overlaps = assigned.iter().any(|existing| {
            *existing == path
                || path.strip_prefix(existing.as_str()).is_some_and(|rest| rest.starts_with('.'))
                || existing.strip_prefix(path.as_str()).is_some_and(|rest| rest.starts_with('.'))
        });
        if overlaps {
            self.error("Property value set multiple times", span);
            return false;
        }
        assigned.push(path);
        true
    }

    fn compile_children(&mut self, layout: &PropertyLayout, index: u16, children: &[&'a ObjectNode]) {
        let Some(descriptor) = layout.property(index) else {
            return;
        };
        if !matches!(descriptor.ty, PropertyType::List(_)) && children.len() > 1 {
            self.error("Cannot assign multiple values to a singular property", children[1].span);
            return;
        }
        for child in children {
            self.compile_object_value(descriptor, PropertyIndex::new(index), child);
        }
    }

    // ========================================================================
    // Components
    // ========================================================================

    fn compile_component(&mut self, node: &'a ObjectNode, layout: Arc<PropertyLayout>) -> Option<Arc<PropertyLayout>> {
        let mut body = None;
        let mut valid = true;
        for member in &node.members {
            match member {
                Member::Property(p) => {
                    self.error("Component objects cannot declare new properties.", p.span);
                    valid = false;
                }
                Member::Signal(s) => {
                    self.error("Component objects cannot declare new properties.", s.span);
                    valid = false;
                }
                Member::Assignment(a) if a.path.len() == 1 && a.path[0] == "id" => {}
                Member::Assignment(a) => {
                    self.error(
                        "Component elements may not contain properties other than id",
                        a.span,
                    );
                    valid = false;
                }
                Member::Object(child) => {
                    if body.is_some() {
                        self.error("Invalid component body specification", child.span);
                        valid = false;
                    } else {
                        body = Some(child);
                    }
                }
            }
        }
        let Some(body) = body else {
            self.error("Cannot create empty component specification", node.span);
            return None;
        };
        if !valid {
            return None;
        }
        self.emit_component(body, Some(node), node.span)?;
        Some(layout)
    }

    /// Compiles `body` into an inline component and emits its creation.
    fn emit_component(&mut self, body: &'a ObjectNode, declaration: Option<&ObjectNode>, span: Span) -> Option<()> {
        let unit = self.compile_nested(body)?;
        self.unit.components.push(unit);
        let index = (self.unit.components.len() - 1) as u32;
        self.unit.objects += 1;
        self.unit.emit(Instruction::CreateComponent {
            unit: index,
            line: span.line,
            column: span.column,
        });
        if let Some(declaration) = declaration {
            self.compile_id(declaration);
        }
        self.unit.emit(Instruction::CompleteObject);
        Some(())
    }

    // ========================================================================
    // Assignments
    // ========================================================================

    fn compile_assignment(&mut self, layout: &PropertyLayout, path: &[String], value: &'a PropertyValue, span: Span) {
        let first = &path[0];
        if path.len() > 1 && first.starts_with(|c: char| c.is_uppercase()) {
            self.compile_attached(path, value, span);
            return;
        }

        if path.len() == 1 {
            if let Some(index) = layout.index_of(first) {
                let Some(descriptor) = layout.property(index) else {
                    return;
                };
                if descriptor.readonly {
                    self.error(
                        format!("Invalid property assignment: \"{}\" is a read-only property", first),
                        span,
                    );
                    return;
                }
                self.compile_value(descriptor, PropertyIndex::new(index), value, span);
                return;
            }
            if let Some(target) = handler_target(first) {
                self.compile_handler(layout, first, &target, value, span);
                return;
            }
            self.error(format!("Cannot assign to non-existent property \"{}\"", first), span);
            return;
        }

        let Some(index) = layout.index_of(first) else {
            self.error(format!("Cannot assign to non-existent property \"{}\"", first), span);
            return;
        };
        let Some(descriptor) = layout.property(index) else {
            return;
        };
        if descriptor.ty.is_value_type() {
            if path.len() != 2 {
                self.error("Invalid grouped property access", span);
                return;
            }
            let Some(sub) = descriptor.ty.sub_property(&path[1]) else {
                self.error(format!("Cannot assign to non-existent property \"{}\"", path[1]), span);
                return;
            };
            if descriptor.readonly {
                self.error(
                    format!("Invalid property assignment: \"{}\" is a read-only property", first),
                    span,
                );
                return;
            }
            let field = PropertyDescriptor::new(format!("{}.{}", first, path[1]), PropertyType::Real);
            self.compile_value(&field, PropertyIndex::with_sub(index, sub), value, span);
        } else if let Some(grouped) = &descriptor.grouped {
            self.unit.emit(Instruction::FetchObject {
                property: index,
                line: span.line,
                column: span.column,
            });
            self.compile_assignment(grouped.layout(), &path[1..], value, span);
            self.unit.emit(Instruction::PopFetchedObject);
        } else {
            self.error("Invalid grouped property access", span);
        }
    }

    fn compile_attached(&mut self, path: &[String], value: &'a PropertyValue, span: Span) {
        if path[0] != "Component" {
            self.error("Non-existent attached object", span);
            return;
        }
        if path.len() != 2 || path[1] != "onCompleted" {
            self.error("Invalid attached object assignment", span);
            return;
        }
        if let Some(function) = self.handler_function("Component.onCompleted", Vec::new(), value, span) {
            self.unit.emit(Instruction::StoreCompletionHandler { function });
        }
    }

    fn compile_handler(&mut self, layout: &PropertyLayout, name: &str, target: &str, value: &'a PropertyValue, span: Span) {
        if let Some(signal) = layout.signal(target) {
            let parameters = signal.parameters.clone();
            if let Some(function) = self.handler_function(name, parameters, value, span) {
                let signal = self.unit.string(target);
                self.unit.emit(Instruction::StoreSignalHandler { signal, function });
            }
            return;
        }
        if let Some(property) = target.strip_suffix("Changed").and_then(|p| layout.index_of(p)) {
            if let Some(function) = self.handler_function(name, Vec::new(), value, span) {
                self.unit.emit(Instruction::StoreChangeHandler { property, function });
            }
            return;
        }
        self.error(format!("Cannot assign to non-existent property \"{}\"", name), span);
    }

    fn handler_function(&mut self, name: &str, parameters: Vec<String>, value: &PropertyValue, span: Span) -> Option<u32> {
        let (body, source, at) = match value {
            PropertyValue::Expression(e) => (FunctionBody::Expression(e.expression.clone()), &e.source, e.span),
            PropertyValue::Block(b) => (FunctionBody::Block(b.body.clone()), &b.source, b.span),
            _ => {
                self.error("Incorrectly specified signal assignment", span);
                return None;
            }
        };
        Some(self.unit.function(CompiledFunction {
            name: name.to_string(),
            parameters,
            body,
            source: source.clone(),
            line: at.line,
            column: at.column,
        }))
    }

    // ========================================================================
    // Values
    // ========================================================================

    fn compile_value(&mut self, descriptor: &PropertyDescriptor, index: PropertyIndex, value: &'a PropertyValue, span: Span) {
        match value {
            PropertyValue::Expression(source) => {
                if let Some(constant) = fold::constant(&source.expression) {
                    if let Some(instruction) = self.store_constant(descriptor, index, constant, source.span) {
                        self.unit.emit(instruction);
                    }
                    return;
                }
                let function = CompiledFunction::expression(
                    descriptor.name.clone(),
                    source.expression.clone(),
                    source.source.clone(),
                )
                .at(source.span.line, source.span.column);
                self.emit_binding(index, function);
            }
            PropertyValue::Block(block) => {
                let function = CompiledFunction {
                    name: descriptor.name.clone(),
                    parameters: Vec::new(),
                    body: FunctionBody::Block(block.body.clone()),
                    source: block.source.clone(),
                    line: block.span.line,
                    column: block.span.column,
                };
                self.emit_binding(index, function);
            }
            PropertyValue::Object(object) => {
                if index.is_value_type_sub() {
                    self.error("Cannot assign object to property", span);
                    return;
                }
                self.compile_object_value(descriptor, index, object);
            }
            PropertyValue::List(objects) => {
                if !matches!(descriptor.ty, PropertyType::List(_)) {
                    self.error("Cannot assign multiple values to a singular property", span);
                    return;
                }
                for object in objects {
                    self.compile_object_value(descriptor, index, object);
                }
            }
        }
    }

    fn emit_binding(&mut self, property: PropertyIndex, function: CompiledFunction) {
        let function = self.unit.function(function);
        self.unit.bindings += 1;
        self.unit.emit(Instruction::StoreBinding { property, function });
    }

    /// The store instruction for a folded constant, or `None` after
    /// reporting a type mismatch.
    fn store_constant(&mut self, descriptor: &PropertyDescriptor, property: PropertyIndex, value: Value, span: Span) -> Option<Instruction> {
        let instruction = match (&descriptor.ty, value) {
            (PropertyType::Int, Value::Number(n))
                if n.fract() == 0.0 && n >= i32::MIN as f64 && n <= i32::MAX as f64 =>
            {
                Instruction::StoreInteger {
                    property,
                    value: n as i32,
                }
            }
            (PropertyType::Real | PropertyType::Var, Value::Number(value)) => {
                Instruction::StoreDouble { property, value }
            }
            (PropertyType::Bool | PropertyType::Var, Value::Boolean(value)) => {
                Instruction::StoreBool { property, value }
            }
            (PropertyType::String | PropertyType::Var, Value::String(s)) => Instruction::StoreString {
                property,
                value: self.unit.string(&s),
            },
            (PropertyType::Url, Value::String(s)) => {
                let resolved = resolve_url(&self.resolved.url, &s);
                Instruction::StoreUrl {
                    property,
                    value: self.unit.url(resolved),
                }
            }
            (PropertyType::Point, Value::String(s)) if Point::parse(&s).is_some() => {
                let point = Point::parse(&s).unwrap_or_default();
                Instruction::StorePoint {
                    property,
                    data: self.unit.pair(point.x, point.y),
                }
            }
            (PropertyType::Size, Value::String(s)) if Size::parse(&s).is_some() => {
                let size = Size::parse(&s).unwrap_or_default();
                Instruction::StoreSize {
                    property,
                    data: self.unit.pair(size.width, size.height),
                }
            }
            (PropertyType::Object(_) | PropertyType::Component | PropertyType::Var, Value::Null) => {
                Instruction::StoreNull { property }
            }
            (PropertyType::List(_), _) => {
                self.error("Cannot assign primitives to lists", span);
                return None;
            }
            (ty, _) => {
                self.error(
                    format!("Invalid property assignment: {} expected", ty.expected_name()),
                    span,
                );
                return None;
            }
        };
        Some(instruction)
    }

    fn compile_object_value(&mut self, descriptor: &PropertyDescriptor, index: PropertyIndex, object: &'a ObjectNode) {
        let property = index.core();
        match &descriptor.ty {
            PropertyType::Component => {
                let is_component = matches!(
                    self.resolved.types.get(&object.type_name.to_string()),
                    Some(TypeRef::Native(native)) if native.name() == "Component"
                );
                let created = if is_component {
                    self.compile_object(object).is_some()
                } else {
                    self.emit_component(object, None, object.span).is_some()
                };
                if created {
                    self.unit.emit(Instruction::StoreObject { property });
                }
            }
            PropertyType::Object(expected) | PropertyType::List(expected) => {
                let Some(layout) = self.compile_object(object) else {
                    return;
                };
                if expected != "Object" && !layout.is_a(expected) {
                    self.error(
                        format!("Invalid property assignment: {} expected", expected),
                        object.span,
                    );
                    return;
                }
                if matches!(descriptor.ty, PropertyType::List(_)) {
                    self.unit.emit(Instruction::AppendObject { property });
                } else {
                    self.unit.emit(Instruction::StoreObject { property });
                }
            }
            PropertyType::Var => {
                if self.compile_object(object).is_some() {
                    self.unit.emit(Instruction::StoreObject { property });
                }
            }
            _ => self.error("Cannot assign object to property", object.span),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// `onWidthChanged` -> `widthChanged`, `onClicked` -> `clicked`.
fn handler_target(name: &str) -> Option<String> {
    let rest = name.strip_prefix("on")?;
    let mut chars = rest.chars();
    let first = chars.next()?;
    if !first.is_uppercase() {
        return None;
    }
    Some(first.to_lowercase().chain(chars).collect())
}

/// Core indices of the properties a use site assigns on a composite object.
fn skip_list(node: &ObjectNode, layout: &PropertyLayout) -> Vec<u16> {
    let mut indices: Vec<u16> = node
        .members
        .iter()
        .filter_map(|m| match m {
            Member::Assignment(a) if a.path[0] != "id" => layout.index_of(&a.path[0]),
            _ => None,
        })
        .collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}

/// Type name of a document's root, taken from an upper-case file name.
fn composite_name(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let file = path.rsplit('/').next()?;
    let stem = file.split('.').next()?;
    stem.starts_with(|c: char| c.is_uppercase())
        .then(|| stem.to_string())
}

/// Resolves a url literal against the document it appears in.
fn resolve_url(base: &str, relative: &str) -> String {
    if relative.is_empty() {
        return String::new();
    }
    match url::Url::parse(base).and_then(|base| base.join(relative)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => relative.to_string(),
    }
}
