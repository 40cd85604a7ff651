// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The object tree.

use super::arena::{Arena, define_handle};
use super::context::ContextId;
use super::types::{ConstructionHooks, NativeType, PropertyLayout};
use super::value::Value;
use crate::binding::BindingSlot;
use crate::compiler::CompiledUnit;
use crate::error::{Error, Result};
use crate::expr::CompiledFunction;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

define_handle!(
    /// Handle to an object in the object tree.
    ObjectId,
    "obj"
);

/// A property slot, optionally addressing a field of a value-type property.
///
/// The low 24 bits hold the core index; a non-zero high byte holds the
/// value-type sub-index plus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PropertyIndex(u32);

impl PropertyIndex {
    const CORE_MASK: u32 = 0x00ff_ffff;

    /// Addresses a whole property.
    pub const fn new(core: u16) -> Self {
        PropertyIndex(core as u32)
    }

    /// Addresses field `sub` of value-type property `core`.
    pub const fn with_sub(core: u16, sub: u8) -> Self {
        PropertyIndex(((sub as u32 + 1) << 24) | core as u32)
    }

    /// Index of the property in its layout.
    pub const fn core(self) -> u16 {
        (self.0 & Self::CORE_MASK) as u16
    }

    /// Value-type field, if any.
    pub const fn sub(self) -> Option<u8> {
        match self.0 >> 24 {
            0 => None,
            n => Some((n - 1) as u8),
        }
    }

    /// Whether the high byte is set.
    pub const fn is_value_type_sub(self) -> bool {
        self.0 >> 24 != 0
    }

    /// The encoded form.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PropertyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sub() {
            Some(sub) => write!(f, "{}.{}", self.core(), sub),
            None => write!(f, "{}", self.core()),
        }
    }
}

/// Bitmask of property indices currently under binding control.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingBits {
    words: Vec<u64>,
}

impl BindingBits {
    /// Sets the bit for `index`.
    pub fn set(&mut self, index: u16) {
        let word = index as usize / 64;
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (index % 64);
    }

    /// Clears the bit for `index`.
    pub fn clear(&mut self, index: u16) {
        if let Some(word) = self.words.get_mut(index as usize / 64) {
            *word &= !(1 << (index % 64));
        }
    }

    /// Tests the bit for `index`.
    pub fn test(&self, index: u16) -> bool {
        self.words
            .get(index as usize / 64)
            .is_some_and(|word| word & (1 << (index % 64)) != 0)
    }

    /// Number of set bits.
    pub fn count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }
}

/// What triggers a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerKind {
    /// `on<Property>Changed`
    PropertyChanged(u16),
    /// `on<Signal>`
    Signal(String),
}

/// A change or signal handler attached to an object.
#[derive(Debug, Clone)]
pub struct Handler {
    /// Trigger
    pub kind: HandlerKind,
    /// Body
    pub function: Arc<CompiledFunction>,
    /// Context the body is evaluated in
    pub context: ContextId,
    /// Object whose properties are in scope
    pub scope: ObjectId,
    /// Document the handler was declared in
    pub url: Arc<str>,
    pub(crate) running: bool,
}

/// An instruction range skipped during construction.
#[derive(Debug, Clone)]
pub struct DeferredRange {
    /// Unit holding the instructions
    pub unit: Arc<CompiledUnit>,
    /// Context of the skipped assignments
    pub context: ContextId,
    /// First skipped instruction
    pub start: usize,
    /// One past the last skipped instruction
    pub end: usize,
}

/// The definition held by a `Component` object.
#[derive(Debug, Clone)]
pub struct ComponentDefinition {
    /// Body of the component
    pub unit: Arc<CompiledUnit>,
    /// Context new instances are created in
    pub context: ContextId,
}

/// A constructed object.
pub struct ObjectData {
    pub(crate) layout: Arc<PropertyLayout>,
    pub(crate) native: Option<Arc<NativeType>>,
    pub(crate) values: Vec<Value>,
    pub(crate) context: ContextId,
    pub(crate) parent: Option<ObjectId>,
    pub(crate) children: Vec<ObjectId>,
    pub(crate) binding_bits: BindingBits,
    pub(crate) bindings: BTreeMap<u16, BindingSlot>,
    pub(crate) handlers: Vec<Handler>,
    pub(crate) deferred: Vec<DeferredRange>,
    pub(crate) component: Option<ComponentDefinition>,
    pub(crate) owned_contexts: Vec<ContextId>,
    pub(crate) id_name: Option<String>,
    pub(crate) url: Arc<str>,
    pub(crate) line: u32,
    pub(crate) column: u32,
}

impl fmt::Debug for ObjectData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectData")
            .field("type", &self.layout.type_name())
            .field("id", &self.id_name)
            .field("context", &self.context)
            .field("parent", &self.parent)
            .field("children", &self.children.len())
            .field("bindings", &self.binding_bits.count())
            .finish()
    }
}

impl ObjectData {
    /// Creates an object with every property at its default value.
    pub fn new(
        layout: Arc<PropertyLayout>,
        native: Option<Arc<NativeType>>,
        context: ContextId,
        url: Arc<str>,
    ) -> Self {
        let values = layout.properties().iter().map(|p| p.default.clone()).collect();
        Self {
            layout,
            native,
            values,
            context,
            parent: None,
            children: Vec::new(),
            binding_bits: BindingBits::default(),
            bindings: BTreeMap::new(),
            handlers: Vec::new(),
            deferred: Vec::new(),
            component: None,
            owned_contexts: Vec::new(),
            id_name: None,
            url,
            line: 0,
            column: 0,
        }
    }

    /// The property layout.
    pub fn layout(&self) -> &Arc<PropertyLayout> {
        &self.layout
    }

    /// Type name of the object.
    pub fn type_name(&self) -> &str {
        self.layout.type_name()
    }

    /// Construction hooks of the native type.
    pub fn hooks(&self) -> Option<Arc<dyn ConstructionHooks>> {
        self.native.as_ref().and_then(|n| n.hooks().cloned())
    }

    /// Raw value at `index`.
    pub fn value(&self, index: u16) -> Option<&Value> {
        self.values.get(index as usize)
    }

    /// Context the object was created in.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Structural parent.
    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    /// Structural children in insertion order.
    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }

    /// The `id` given in the document.
    pub fn id_name(&self) -> Option<&str> {
        self.id_name.as_deref()
    }

    /// Whether a binding controls property `index`.
    pub fn has_binding(&self, index: u16) -> bool {
        self.binding_bits.test(index)
    }
}

/// All live objects of an engine.
#[derive(Debug, Default)]
pub struct ObjectTree {
    arena: Arena<ObjectId, ObjectData>,
}

impl ObjectTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object.
    pub fn insert(&mut self, data: ObjectData) -> ObjectId {
        self.arena.allocate(data)
    }

    /// Looks up an object.
    pub fn get(&self, id: ObjectId) -> Option<&ObjectData> {
        self.arena.get(id)
    }

    /// Looks up an object mutably.
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut ObjectData> {
        self.arena.get_mut(id)
    }

    /// Looks up an object, failing for destroyed handles.
    pub fn data(&self, id: ObjectId) -> Result<&ObjectData> {
        self.arena.get(id).ok_or(Error::Destroyed("object"))
    }

    /// Looks up an object mutably, failing for destroyed handles.
    pub fn data_mut(&mut self, id: ObjectId) -> Result<&mut ObjectData> {
        self.arena.get_mut(id).ok_or(Error::Destroyed("object"))
    }

    /// Whether the object is alive.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.arena.contains(id)
    }

    /// Removes a single object without touching its children.
    pub fn remove(&mut self, id: ObjectId) -> Option<ObjectData> {
        self.arena.remove(id)
    }

    /// Makes `child` a structural child of `parent`.
    pub fn reparent(&mut self, child: ObjectId, parent: ObjectId) -> Result<()> {
        let old = self.data(child)?.parent;
        if old == Some(parent) {
            return Ok(());
        }
        if let Some(old) = old.and_then(|old| self.arena.get_mut(old)) {
            old.children.retain(|c| *c != child);
        }
        self.data_mut(parent)?.children.push(child);
        self.data_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Whether no object is alive.
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Handles of every live object.
    pub fn handles(&self) -> Vec<ObjectId> {
        self.arena.handles()
    }

    /// Drops every object.
    pub fn clear(&mut self) {
        self.arena.reset();
    }
}
