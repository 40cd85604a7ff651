// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Property bindings.
//!
//! A binding keeps one property slot equal to the value of an expression.
//! Each object holds at most one binding per property: either a direct
//! binding for the whole property, or, for value-type properties, a proxy
//! holding one binding per sub-field. Bindings are stored in an arena and
//! addressed by generational [`BindingId`] handles, so a stale handle held by
//! a dependency list never reaches a destroyed binding.
//!
//! Evaluation, dependency tracking and loop detection live in `update.rs`.

mod update;

use crate::error::Diagnostic;
use crate::expr::CompiledFunction;
use crate::runtime::arena::{Arena, define_handle};
use crate::runtime::{ContextId, ObjectId, PropertyIndex};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

define_handle!(
    /// Handle to a binding.
    BindingId,
    "binding"
);

/// A binding expression attached to a property.
#[derive(Debug, Clone)]
pub struct Binding {
    pub(crate) target: ObjectId,
    pub(crate) property: PropertyIndex,
    pub(crate) function: Arc<CompiledFunction>,
    pub(crate) context: ContextId,
    pub(crate) scope: ObjectId,
    pub(crate) url: Arc<str>,
    pub(crate) enabled: bool,
    pub(crate) updating: bool,
    pub(crate) error: Option<Diagnostic>,
    pub(crate) dependencies: Vec<(ObjectId, u16)>,
    pub(crate) name: String,
}

impl Binding {
    /// Creates a disabled binding of `function` to `property` of `target`.
    pub fn new(
        target: ObjectId,
        property: PropertyIndex,
        function: Arc<CompiledFunction>,
        context: ContextId,
        url: Arc<str>,
    ) -> Self {
        Self {
            target,
            property,
            name: function.name.clone(),
            function,
            context,
            scope: target,
            url,
            enabled: false,
            updating: false,
            error: None,
            dependencies: Vec::new(),
        }
    }

    /// Object whose property is bound.
    pub fn target(&self) -> ObjectId {
        self.target
    }

    /// Bound property.
    pub fn property(&self) -> PropertyIndex {
        self.property
    }

    /// Property name, `prop.sub` for value-type fields.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expression text.
    pub fn source(&self) -> &str {
        &self.function.source
    }

    /// Whether writes are evaluated.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the binding is being evaluated right now.
    pub fn is_updating(&self) -> bool {
        self.updating
    }

    /// Error from the last evaluation.
    pub fn error(&self) -> Option<&Diagnostic> {
        self.error.as_ref()
    }

    /// Properties read by the last evaluation.
    pub fn dependencies(&self) -> &[(ObjectId, u16)] {
        &self.dependencies
    }

    /// Document location of the expression.
    pub fn location(&self) -> (&str, u32, u32) {
        (&self.url, self.function.line, self.function.column)
    }
}

/// What an object holds for one property index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingSlot {
    /// A binding of the whole property
    Direct(BindingId),
    /// Bindings of individual value-type fields
    Proxy(BTreeMap<u8, BindingId>),
}

impl BindingSlot {
    /// Every binding in the slot.
    pub fn ids(&self) -> Vec<BindingId> {
        match self {
            BindingSlot::Direct(id) => vec![*id],
            BindingSlot::Proxy(fields) => fields.values().copied().collect(),
        }
    }

    /// The binding for a whole property or one field.
    pub fn get(&self, sub: Option<u8>) -> Option<BindingId> {
        match (self, sub) {
            (BindingSlot::Direct(id), None) => Some(*id),
            (BindingSlot::Proxy(fields), Some(sub)) => fields.get(&sub).copied(),
            _ => None,
        }
    }
}

/// All bindings of an engine plus the reverse dependency index.
#[derive(Debug, Default)]
pub struct BindingStore {
    arena: Arena<BindingId, Binding>,
    subscribers: FxHashMap<(ObjectId, u16), Vec<BindingId>>,
}

impl BindingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a binding.
    pub fn allocate(&mut self, binding: Binding) -> BindingId {
        self.arena.allocate(binding)
    }

    /// Looks up a binding.
    pub fn get(&self, id: BindingId) -> Option<&Binding> {
        self.arena.get(id)
    }

    /// Looks up a binding mutably.
    pub fn get_mut(&mut self, id: BindingId) -> Option<&mut Binding> {
        self.arena.get_mut(id)
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: BindingId) -> bool {
        self.arena.contains(id)
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Whether no binding is live.
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Replaces the dependency set of `id`.
    pub fn set_dependencies(&mut self, id: BindingId, mut dependencies: Vec<(ObjectId, u16)>) {
        dependencies.sort_unstable();
        dependencies.dedup();
        self.unsubscribe(id);
        for key in &dependencies {
            self.subscribers.entry(*key).or_default().push(id);
        }
        if let Some(binding) = self.arena.get_mut(id) {
            binding.dependencies = dependencies;
        }
    }

    fn unsubscribe(&mut self, id: BindingId) {
        let Some(binding) = self.arena.get_mut(id) else {
            return;
        };
        for key in std::mem::take(&mut binding.dependencies) {
            if let Some(list) = self.subscribers.get_mut(&key) {
                list.retain(|b| *b != id);
                if list.is_empty() {
                    self.subscribers.remove(&key);
                }
            }
        }
    }

    /// Bindings that read `index` of `object`, in subscription order.
    pub fn subscribers(&self, object: ObjectId, index: u16) -> Vec<BindingId> {
        self.subscribers
            .get(&(object, index))
            .cloned()
            .unwrap_or_default()
    }

    /// Clears the dependencies of `id` and frees it. The caller has already
    /// removed it from its object.
    pub fn remove(&mut self, id: BindingId) -> Option<Binding> {
        self.unsubscribe(id);
        self.arena.remove(id)
    }

    /// Drops subscriptions to properties of a destroyed object.
    pub fn forget_object(&mut self, object: ObjectId) {
        self.subscribers.retain(|(o, _), _| *o != object);
    }

    /// Frees every binding.
    pub fn clear(&mut self) {
        self.arena.reset();
        self.subscribers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;

    fn objects(n: usize) -> Vec<ObjectId> {
        let mut arena: Arena<ObjectId, ()> = Arena::new();
        (0..n).map(|_| arena.allocate(())).collect()
    }

    fn binding(target: ObjectId) -> Binding {
        let expression = parse_expression("a + 1").unwrap();
        let function = CompiledFunction::expression("width", expression.expression, expression.source);
        let mut contexts: Arena<ContextId, ()> = Arena::new();
        Binding::new(
            target,
            PropertyIndex::new(2),
            Arc::new(function),
            contexts.allocate(()),
            Arc::from("file:///a.weft"),
        )
    }

    #[test]
    fn test_dependencies_and_subscribers() {
        let o = objects(3);
        let mut store = BindingStore::new();
        let a = store.allocate(binding(o[0]));
        let b = store.allocate(binding(o[0]));
        store.set_dependencies(a, vec![(o[1], 0), (o[1], 0), (o[1], 3)]);
        store.set_dependencies(b, vec![(o[1], 0)]);
        assert_eq!(store.subscribers(o[1], 0), vec![a, b]);
        assert_eq!(store.get(a).unwrap().dependencies().len(), 2);

        store.set_dependencies(a, vec![(o[2], 1)]);
        assert_eq!(store.subscribers(o[1], 0), vec![b]);
        assert!(store.subscribers(o[1], 3).is_empty());
    }

    #[test]
    fn test_remove_unsubscribes() {
        let o = objects(3);
        let mut store = BindingStore::new();
        let a = store.allocate(binding(o[0]));
        store.set_dependencies(a, vec![(o[1], 0)]);
        assert!(store.remove(a).is_some());
        assert!(!store.contains(a));
        assert!(store.subscribers(o[1], 0).is_empty());
        assert!(store.remove(a).is_none());
    }

    #[test]
    fn test_slot_lookup() {
        let o = objects(3);
        let mut store = BindingStore::new();
        let a = store.allocate(binding(o[0]));
        let b = store.allocate(binding(o[0]));
        let direct = BindingSlot::Direct(a);
        assert_eq!(direct.get(None), Some(a));
        assert_eq!(direct.get(Some(0)), None);
        let proxy = BindingSlot::Proxy(BTreeMap::from([(0, a), (1, b)]));
        assert_eq!(proxy.get(Some(1)), Some(b));
        assert_eq!(proxy.ids(), vec![a, b]);
    }
}
