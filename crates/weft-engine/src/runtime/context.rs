// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Contexts: tree-structured scopes used to resolve free identifiers.
//!
//! Every instantiated document gets its own context holding the ids declared
//! in it, its root object (the context object) and its script imports. The
//! context of a nested component instance is a child of the context the
//! instance was declared in, so lookups fall back outwards.

use super::arena::{Arena, define_handle};
use super::object::ObjectId;
use super::value::Value;
use crate::expr::ScriptInstance;
use rustc_hash::FxHashMap;
use std::sync::Arc;

define_handle!(
    /// Handle to a context.
    ContextId,
    "ctx"
);

/// A named-value scope.
#[derive(Debug)]
pub struct ContextData {
    pub(crate) parent: Option<ContextId>,
    pub(crate) url: Arc<str>,
    pub(crate) ids: FxHashMap<String, ObjectId>,
    pub(crate) context_object: Option<ObjectId>,
    pub(crate) scripts: Vec<(String, Arc<ScriptInstance>)>,
    pub(crate) properties: FxHashMap<String, Value>,
    pub(crate) children: Vec<ContextId>,
}

impl ContextData {
    /// Parent context.
    pub fn parent(&self) -> Option<ContextId> {
        self.parent
    }

    /// Document the context was created for.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Object registered under `id`.
    pub fn id(&self, name: &str) -> Option<ObjectId> {
        self.ids.get(name).copied()
    }

    /// Root object of the document instance.
    pub fn context_object(&self) -> Option<ObjectId> {
        self.context_object
    }

    /// Script imported under `qualifier`.
    pub fn script(&self, qualifier: &str) -> Option<&Arc<ScriptInstance>> {
        self.scripts
            .iter()
            .find(|(q, _)| q == qualifier)
            .map(|(_, script)| script)
    }

    /// Context property set by the host.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// All live contexts of an engine.
#[derive(Debug, Default)]
pub struct ContextTree {
    arena: Arena<ContextId, ContextData>,
}

impl ContextTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context below `parent`.
    pub fn create(&mut self, parent: Option<ContextId>, url: &str) -> ContextId {
        let id = self.arena.allocate(ContextData {
            parent,
            url: Arc::from(url),
            ids: FxHashMap::default(),
            context_object: None,
            scripts: Vec::new(),
            properties: FxHashMap::default(),
            children: Vec::new(),
        });
        if let Some(parent) = parent.and_then(|p| self.arena.get_mut(p)) {
            parent.children.push(id);
        }
        id
    }

    /// Looks up a context.
    pub fn get(&self, id: ContextId) -> Option<&ContextData> {
        self.arena.get(id)
    }

    /// Looks up a context mutably.
    pub fn get_mut(&mut self, id: ContextId) -> Option<&mut ContextData> {
        self.arena.get_mut(id)
    }

    /// Whether the context is alive.
    pub fn contains(&self, id: ContextId) -> bool {
        self.arena.contains(id)
    }

    /// Iterates from `id` outwards to the root context.
    pub fn ancestors(&self, id: ContextId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: Some(id),
        }
    }

    /// Finds `name` among the ids visible from `id`.
    pub fn resolve_id(&self, id: ContextId, name: &str) -> Option<ObjectId> {
        self.ancestors(id).find_map(|(_, data)| data.id(name))
    }

    /// Removes a context and every context below it.
    pub fn remove(&mut self, id: ContextId) {
        let Some(data) = self.arena.remove(id) else {
            return;
        };
        if let Some(parent) = data.parent.and_then(|p| self.arena.get_mut(p)) {
            parent.children.retain(|c| *c != id);
        }
        let mut pending = data.children;
        while let Some(child) = pending.pop() {
            if let Some(child) = self.arena.remove(child) {
                pending.extend(child.children);
            }
        }
    }

    /// Number of live contexts.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Whether no context is alive.
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Drops every context.
    pub fn clear(&mut self) {
        self.arena.reset();
    }
}

/// Iterator returned by [`ContextTree::ancestors`].
pub struct Ancestors<'a> {
    tree: &'a ContextTree,
    next: Option<ContextId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = (ContextId, &'a ContextData);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let data = self.tree.get(id)?;
        self.next = data.parent;
        Some((id, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ancestor_walk() {
        let mut tree = ContextTree::new();
        let root = tree.create(None, "");
        let doc = tree.create(Some(root), "file:///a.weft");
        let inner = tree.create(Some(doc), "file:///B.weft");
        let urls: Vec<_> = tree.ancestors(inner).map(|(_, d)| d.url().to_string()).collect();
        assert_eq!(urls, vec!["file:///B.weft", "file:///a.weft", ""]);
    }

    #[test]
    fn test_remove_drops_subtree() {
        let mut tree = ContextTree::new();
        let root = tree.create(None, "");
        let doc = tree.create(Some(root), "a");
        let inner = tree.create(Some(doc), "b");
        tree.remove(doc);
        assert!(!tree.contains(doc));
        assert!(!tree.contains(inner));
        assert!(tree.get(root).unwrap().children.is_empty());
        assert_eq!(tree.len(), 1);
    }
}
