// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Binding attachment, evaluation and loop detection.

use super::{Binding, BindingId, BindingSlot};
use crate::engine::Engine;
use crate::error::{Diagnostic, Error, Result};
use crate::expr::CompiledFunction;
use crate::parser::parse_expression;
use crate::runtime::{ObjectId, PropertyIndex};
use std::collections::BTreeMap;
use std::sync::Arc;

impl Engine {
    /// Stores `binding` and attaches it to its target, replacing whatever
    /// binding the slot held for the same property or field.
    pub(crate) fn attach_binding(&mut self, binding: Binding) -> Result<BindingId> {
        let target = binding.target;
        let property = binding.property;
        let core = property.core();
        self.objects.data(target)?;
        self.detach_binding(target, property);
        let id = self.bindings.allocate(binding);
        let data = self.objects.data_mut(target)?;
        match (property.sub(), data.bindings.get_mut(&core)) {
            (Some(sub), Some(BindingSlot::Proxy(fields))) => {
                fields.insert(sub, id);
            }
            (Some(sub), _) => {
                data.bindings.insert(core, BindingSlot::Proxy(BTreeMap::from([(sub, id)])));
            }
            (None, _) => {
                data.bindings.insert(core, BindingSlot::Direct(id));
            }
        }
        data.binding_bits.set(core);
        Ok(id)
    }

    /// Removes the binding on `property` of `object`. Writing a whole
    /// value-type property removes the field bindings too.
    ///
    /// Returns whether anything was removed.
    pub(crate) fn detach_binding(&mut self, object: ObjectId, property: PropertyIndex) -> bool {
        let core = property.core();
        let Some(data) = self.objects.get_mut(object) else {
            return false;
        };
        let removed = match (property.sub(), data.bindings.get_mut(&core)) {
            (_, None) => Vec::new(),
            (None, Some(slot)) => {
                let ids = slot.ids();
                data.bindings.remove(&core);
                ids
            }
            (Some(_), Some(BindingSlot::Direct(id))) => {
                let id = *id;
                data.bindings.remove(&core);
                vec![id]
            }
            (Some(sub), Some(BindingSlot::Proxy(fields))) => {
                let removed: Vec<BindingId> = fields.remove(&sub).into_iter().collect();
                if fields.is_empty() {
                    data.bindings.remove(&core);
                }
                removed
            }
        };
        if !data.bindings.contains_key(&core) {
            data.binding_bits.clear(core);
        }
        for id in &removed {
            self.bindings.remove(*id);
        }
        !removed.is_empty()
    }

    /// Evaluates a binding and writes its result.
    ///
    /// A binding that is re-entered while it is being evaluated is a loop:
    /// the inner update is dropped with a warning and the outer evaluation
    /// keeps its value.
    pub(crate) fn update_binding_now(&mut self, id: BindingId) {
        let Some(binding) = self.bindings.get_mut(id) else {
            return;
        };
        if !binding.enabled {
            return;
        }
        if binding.updating {
            let (url, line, column) = binding.location();
            let diagnostic = Diagnostic::warning(
                format!("Binding loop detected for property \"{}\"", binding.name),
                line,
                column,
            )
            .with_url(url);
            tracing::debug!(binding = %id, "binding loop");
            self.warnings.warn(diagnostic);
            return;
        }
        binding.updating = true;
        let function = binding.function.clone();
        let context = binding.context;
        let scope = binding.scope;
        let target = binding.target;
        let property = binding.property;

        self.captures.push(Vec::new());
        let result = self.run_function(&function, &[], context, Some(scope));
        let captured = self.captures.pop().unwrap_or_default();
        // Destroyed while evaluating: its result is dropped.
        if !self.bindings.contains(id) {
            return;
        }
        self.bindings.set_dependencies(id, captured);

        let error = match result {
            Ok(value) => self.store_value(target, property, value).err(),
            Err(e) => Some(e.message),
        };

        let Some(binding) = self.bindings.get_mut(id) else {
            return;
        };
        binding.updating = false;
        match error {
            Some(message) => {
                let (url, line, column) = binding.location();
                let diagnostic = Diagnostic::error(message, line, column).with_url(url);
                binding.error = Some(diagnostic.clone());
                self.report_error(diagnostic);
            }
            None => binding.error = None,
        }
    }

    // ========================================================================
    // Host API
    // ========================================================================

    /// Binds `property` (or `prop.field`) of `object` to `source`,
    /// evaluating it right away.
    pub fn set_binding(&mut self, object: ObjectId, property: &str, source: &str) -> Result<BindingId> {
        let index = self.resolve_property(object, property)?;
        let data = self.objects.data(object)?;
        if data.layout.property(index.core()).is_some_and(|d| d.readonly) {
            return Err(Error::property(format!(
                "Cannot assign to read-only property \"{}\"",
                property
            )));
        }
        let context = data.context;
        let url = data.url.clone();
        let expression = parse_expression(source)?;
        let function = CompiledFunction::expression(property, expression.expression, expression.source);
        let mut binding = Binding::new(object, index, Arc::new(function), context, url);
        binding.enabled = true;
        let id = self.attach_binding(binding)?;
        self.update_binding_now(id);
        Ok(id)
    }

    /// Removes the binding on `property`. The property keeps its value.
    pub fn remove_binding(&mut self, object: ObjectId, property: &str) -> Result<bool> {
        let index = self.resolve_property(object, property)?;
        Ok(self.detach_binding(object, index))
    }

    /// The binding on `property` of `object`, if any.
    pub fn binding(&self, object: ObjectId, property: &str) -> Option<&Binding> {
        let index = self.resolve_property(object, property).ok()?;
        let slot = self.objects.get(object)?.bindings.get(&index.core())?;
        self.bindings.get(slot.get(index.sub())?)
    }

    /// Looks up a binding by handle.
    pub fn binding_by_id(&self, id: BindingId) -> Option<&Binding> {
        self.bindings.get(id)
    }

    /// Enables or disables a binding. Enabling re-evaluates it.
    pub fn set_binding_enabled(&mut self, id: BindingId, enabled: bool) -> Result<()> {
        let binding = self.bindings.get_mut(id).ok_or(Error::Destroyed("binding"))?;
        let was = binding.enabled;
        binding.enabled = enabled;
        if enabled && !was {
            self.update_binding_now(id);
        }
        Ok(())
    }

    /// Re-evaluates a binding.
    pub fn update_binding(&mut self, id: BindingId) -> Result<()> {
        if !self.bindings.contains(id) {
            return Err(Error::Destroyed("binding"));
        }
        self.update_binding_now(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::Engine;
    use crate::error::Severity;
    use crate::runtime::{ObjectId, Value};

    fn setup(source: &str) -> (Engine, ObjectId) {
        let mut engine = Engine::new();
        engine.set_output_warnings_to_stderr(false);
        engine.initialize();
        let unit = engine.compile_source("file:///b.weft", source).unwrap();
        let root = engine.create(&unit).unwrap();
        (engine, root)
    }

    #[test]
    fn test_binding_follows_dependency() {
        let (mut engine, root) = setup("import Weft 1.0\nItem { width: 10; height: width * 2 }");
        engine.write_property(root, "width", Value::Number(7.0)).unwrap();
        assert_eq!(engine.property(root, "height").unwrap(), Value::Number(14.0));
        let binding = engine.binding(root, "height").unwrap();
        assert_eq!(binding.source(), "width * 2");
        assert_eq!(binding.dependencies().len(), 1);
    }

    #[test]
    fn test_dependencies_follow_branches() {
        let (mut engine, root) = setup(
            "import Weft 1.0\nItem { property bool wide: false; x: 1; y: 2; width: wide ? x : y }",
        );
        assert_eq!(engine.property(root, "width").unwrap(), Value::Number(2.0));
        engine.write_property(root, "x", Value::Number(5.0)).unwrap();
        assert_eq!(engine.property(root, "width").unwrap(), Value::Number(2.0));
        engine.write_property(root, "wide", Value::Boolean(true)).unwrap();
        assert_eq!(engine.property(root, "width").unwrap(), Value::Number(5.0));
        engine.write_property(root, "y", Value::Number(9.0)).unwrap();
        assert_eq!(engine.property(root, "width").unwrap(), Value::Number(5.0));
    }

    #[test]
    fn test_binding_loop_is_reported() {
        let (mut engine, root) = setup("import Weft 1.0\nItem { width: height + 1; height: width + 1 }");
        let warnings = engine.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings.iter().all(|w| w.severity == Severity::Warning));
        assert_eq!(engine.property(root, "width").unwrap(), Value::Number(3.0));
        assert_eq!(engine.property(root, "height").unwrap(), Value::Number(2.0));
        assert!(warnings[0].message.starts_with("Binding loop detected for property"));
        assert_eq!(warnings[0].url.as_deref(), Some("file:///b.weft"));
        assert!(engine.contains(root));
    }

    #[test]
    fn test_binding_destroyed_during_evaluation_drops_result() {
        let (engine, root) = setup(
            "import Weft 1.0\nItem { property int flag: 0; onFlagChanged: x = 10; x: { flag = 1; return 3 } }",
        );
        assert!(engine.binding(root, "x").is_none());
        assert_eq!(engine.property(root, "x").unwrap(), Value::Number(10.0));
        assert_eq!(engine.property(root, "flag").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_sub_property_binding() {
        let (mut engine, root) = setup("import Weft 1.0\nItem { width: 3; offset.x: width; offset.y: 8 }");
        assert_eq!(engine.property(root, "offset.x").unwrap(), Value::Number(3.0));
        engine.write_property(root, "width", Value::Number(4.0)).unwrap();
        assert_eq!(engine.property(root, "offset.x").unwrap(), Value::Number(4.0));
        assert_eq!(engine.property(root, "offset.y").unwrap(), Value::Number(8.0));
        assert_eq!(engine.binding(root, "offset.x").unwrap().name(), "offset.x");
        assert!(engine.binding(root, "offset").is_none());
    }

    #[test]
    fn test_whole_write_clears_field_bindings() {
        let (mut engine, root) = setup("import Weft 1.0\nItem { width: 3; offset.x: width }");
        engine.write_property(root, "offset", Value::from("1,1")).unwrap();
        engine.write_property(root, "width", Value::Number(50.0)).unwrap();
        assert_eq!(engine.property(root, "offset.x").unwrap(), Value::Number(1.0));
        assert!(!engine.object(root).unwrap().has_binding(engine.resolve_property(root, "offset").unwrap().core()));
    }

    #[test]
    fn test_set_and_remove_binding() {
        let (mut engine, root) = setup("import Weft 1.0\nItem { width: 2 }");
        let id = engine.set_binding(root, "height", "width + 1").unwrap();
        assert_eq!(engine.property(root, "height").unwrap(), Value::Number(3.0));
        engine.set_binding_enabled(id, false).unwrap();
        engine.write_property(root, "width", Value::Number(10.0)).unwrap();
        assert_eq!(engine.property(root, "height").unwrap(), Value::Number(3.0));
        engine.set_binding_enabled(id, true).unwrap();
        assert_eq!(engine.property(root, "height").unwrap(), Value::Number(11.0));
        assert!(engine.remove_binding(root, "height").unwrap());
        assert!(engine.binding_by_id(id).is_none());
        assert!(engine.update_binding(id).is_err());
    }

    #[test]
    fn test_runtime_error_is_reported_and_recorded() {
        let (mut engine, root) = setup("import Weft 1.0\nItem { property var source: null; width: source.width }");
        let warnings = engine.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].line, 2);
        let binding = engine.binding(root, "width").unwrap();
        assert!(binding.error().is_some());
    }

    #[test]
    fn test_write_type_error_is_reported() {
        let (mut engine, _root) = setup("import Weft 1.0\nItem { objectName: \"wide\"; width: objectName + \"r\" }");
        let warnings = engine.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].message, "Unable to assign string to real");
    }
}
