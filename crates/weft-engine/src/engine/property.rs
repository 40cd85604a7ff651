// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Property reads and writes, change notification and signals.

use super::Engine;
use crate::error::{Diagnostic, Error, EvalError, Result};
use crate::runtime::object::HandlerKind;
use crate::runtime::{ObjectId, PropertyIndex, PropertyType, Value};

impl Engine {
    /// Resolves `name`, or `name.field` for value types, to an index.
    pub fn resolve_property(&self, object: ObjectId, name: &str) -> Result<PropertyIndex> {
        let layout = &self.objects.data(object)?.layout;
        let (head, field) = match name.split_once('.') {
            Some((head, field)) => (head, Some(field)),
            None => (name, None),
        };
        let missing = || Error::property(format!("{} has no property \"{}\"", layout.type_name(), name));
        let index = layout.index_of(head).ok_or_else(missing)?;
        match field {
            None => Ok(PropertyIndex::new(index)),
            Some(field) => {
                let sub = layout
                    .property(index)
                    .and_then(|d| d.ty.sub_property(field))
                    .ok_or_else(missing)?;
                Ok(PropertyIndex::with_sub(index, sub))
            }
        }
    }

    /// Reads a property by name.
    pub fn property(&self, object: ObjectId, name: &str) -> Result<Value> {
        let index = self.resolve_property(object, name)?;
        self.property_at(object, index)
    }

    /// Reads a property by index.
    pub fn property_at(&self, object: ObjectId, index: PropertyIndex) -> Result<Value> {
        let data = self.objects.data(object)?;
        let value = data
            .values
            .get(index.core() as usize)
            .ok_or_else(|| Error::property(format!("Invalid property index {}", index)))?;
        Ok(match index.sub() {
            Some(sub) => value.field(sub),
            None => value.clone(),
        })
    }

    /// Writes a property from host code, removing any binding on it first.
    pub fn write_property(&mut self, object: ObjectId, name: &str, value: Value) -> Result<()> {
        let index = self.resolve_property(object, name)?;
        let descriptor = self
            .objects
            .data(object)?
            .layout
            .property(index.core())
            .cloned()
            .ok_or_else(|| Error::property(format!("Invalid property index {}", index)))?;
        if descriptor.readonly {
            return Err(Error::property(format!(
                "Cannot assign to read-only property \"{}\"",
                descriptor.name
            )));
        }
        self.detach_binding(object, index);
        self.store_value(object, index, value).map_err(Error::Property)?;
        Ok(())
    }

    /// Coerces and stores `value`, notifying dependents when it changed.
    ///
    /// Returns whether the stored value changed.
    pub(crate) fn store_value(
        &mut self,
        object: ObjectId,
        index: PropertyIndex,
        value: Value,
    ) -> std::result::Result<bool, String> {
        let Some(data) = self.objects.get(object) else {
            return Err("Cannot write to a destroyed object".to_string());
        };
        let core = index.core();
        let Some(descriptor) = data.layout.property(core) else {
            return Err(format!("Invalid property index {}", index));
        };
        let current = data.values.get(core as usize).cloned().unwrap_or(Value::Undefined);
        let value = match index.sub() {
            Some(sub) => {
                let field = PropertyType::Real.coerce(value)?;
                current
                    .with_field(sub, field.to_number())
                    .ok_or_else(|| format!("Cannot assign to field of {}", descriptor.ty))?
            }
            None => descriptor.ty.coerce(value)?,
        };
        if let (PropertyType::Object(expected), Value::Object(id)) = (&descriptor.ty, &value) {
            if expected != "Object" {
                let layout = &self.objects.data(*id).map_err(|e| e.to_string())?.layout;
                if !layout.is_a(expected) {
                    return Err(format!("Unable to assign {} to {}", layout.type_name(), expected));
                }
            }
        }
        if value == current {
            return Ok(false);
        }
        if let Some(data) = self.objects.get_mut(object) {
            data.values[core as usize] = value;
        }
        self.notify_changed(object, core);
        Ok(true)
    }

    /// Re-evaluates the bindings that read `core` of `object`, then runs its
    /// change handlers.
    pub(crate) fn notify_changed(&mut self, object: ObjectId, core: u16) {
        for id in self.bindings.subscribers(object, core) {
            self.update_binding_now(id);
        }
        self.run_handlers(object, |kind| *kind == HandlerKind::PropertyChanged(core), &[]);
    }

    /// Emits a signal from host code. Handler errors are reported as warnings.
    pub fn emit_signal(&mut self, object: ObjectId, name: &str, args: Vec<Value>) -> Result<()> {
        let data = self.objects.data(object)?;
        if data.layout.signal(name).is_none() {
            return Err(Error::property(format!(
                "{} has no signal \"{}\"",
                data.type_name(),
                name
            )));
        }
        self.run_handlers(object, |kind| matches!(kind, HandlerKind::Signal(s) if s == name), &args);
        Ok(())
    }

    pub(crate) fn emit_signal_from_script(
        &mut self,
        object: ObjectId,
        name: &str,
        args: Vec<Value>,
    ) -> std::result::Result<(), EvalError> {
        self.emit_signal(object, name, args)
            .map_err(|e| EvalError::type_error(e.to_string()))
    }

    /// Runs the matching handlers of `object` in registration order. A
    /// handler already on the stack is not re-entered.
    fn run_handlers(&mut self, object: ObjectId, matches: impl Fn(&HandlerKind) -> bool, args: &[Value]) {
        let Some(data) = self.objects.get(object) else {
            return;
        };
        let positions: Vec<usize> = data
            .handlers
            .iter()
            .enumerate()
            .filter(|(_, h)| matches(&h.kind))
            .map(|(i, _)| i)
            .collect();
        for position in positions {
            let Some(handler) = self
                .objects
                .get_mut(object)
                .and_then(|data| data.handlers.get_mut(position))
            else {
                return;
            };
            if handler.running {
                continue;
            }
            handler.running = true;
            let handler = handler.clone();
            let result = self.run_function(&handler.function, args, handler.context, Some(handler.scope));
            if let Some(h) = self
                .objects
                .get_mut(object)
                .and_then(|data| data.handlers.get_mut(position))
            {
                h.running = false;
            }
            if let Err(e) = result {
                let diagnostic = Diagnostic::error(e.message, e.line, e.column).with_url(&*handler.url);
                self.report_error(diagnostic);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(source: &str) -> (Engine, ObjectId) {
        let mut engine = Engine::new();
        engine.set_output_warnings_to_stderr(false);
        engine.initialize();
        let unit = engine.compile_source("file:///p.weft", source).unwrap();
        let root = engine.create(&unit).unwrap();
        (engine, root)
    }

    #[test]
    fn test_value_type_fields() {
        let (mut engine, root) = engine_with("import Weft 1.0\nItem { offset: \"3,4\" }");
        assert_eq!(engine.property(root, "offset.y").unwrap(), Value::Number(4.0));
        engine.write_property(root, "offset.x", Value::Number(9.0)).unwrap();
        assert_eq!(engine.property(root, "offset.x").unwrap(), Value::Number(9.0));
        assert_eq!(engine.property(root, "offset.y").unwrap(), Value::Number(4.0));
        assert!(engine.property(root, "offset.z").is_err());
    }

    #[test]
    fn test_write_coerces_and_rejects() {
        let (mut engine, root) = engine_with("import Weft 1.0\nRectangle {}");
        engine.write_property(root, "width", Value::from(true)).unwrap();
        assert_eq!(engine.property(root, "width").unwrap(), Value::Number(1.0));
        let err = engine.write_property(root, "width", Value::from("wide")).unwrap_err();
        assert_eq!(err.to_string(), "Unable to assign string to real");
        let err = engine.write_property(root, "border", Value::Null).unwrap_err();
        assert_eq!(err.to_string(), "Cannot assign to read-only property \"border\"");
    }

    #[test]
    fn test_write_removes_binding() {
        let (mut engine, root) = engine_with("import Weft 1.0\nItem { width: 10; height: width }");
        engine.write_property(root, "height", Value::Number(3.0)).unwrap();
        engine.write_property(root, "width", Value::Number(20.0)).unwrap();
        assert_eq!(engine.property(root, "height").unwrap(), Value::Number(3.0));
    }

    #[test]
    fn test_change_handler_runs_once_per_change() {
        let (mut engine, root) = engine_with(
            "import Weft 1.0\nItem { property int hits: 0; onWidthChanged: hits = hits + 1 }",
        );
        engine.write_property(root, "width", Value::Number(5.0)).unwrap();
        engine.write_property(root, "width", Value::Number(5.0)).unwrap();
        engine.write_property(root, "width", Value::Number(6.0)).unwrap();
        assert_eq!(engine.property(root, "hits").unwrap(), Value::Number(2.0));
    }

    #[test]
    fn test_signal_handler_receives_arguments() {
        let (mut engine, root) = engine_with(
            "import Weft 1.0\nItem { signal moved(dx, dy); property real total: 0; onMoved: total = dx + dy }",
        );
        engine
            .emit_signal(root, "moved", vec![Value::Number(2.0), Value::Number(5.0)])
            .unwrap();
        assert_eq!(engine.property(root, "total").unwrap(), Value::Number(7.0));
        assert!(engine.emit_signal(root, "jumped", Vec::new()).is_err());
    }

    #[test]
    fn test_object_property_type_check() {
        let (mut engine, root) = engine_with(
            "import Weft 1.0\nItem { property Rectangle target; Item { id: plain } Rectangle { id: rect } }",
        );
        let plain = engine.lookup_id(root, "plain").unwrap();
        let rect = engine.lookup_id(root, "rect").unwrap();
        engine.write_property(root, "target", Value::Object(rect)).unwrap();
        let err = engine.write_property(root, "target", Value::Object(plain)).unwrap_err();
        assert_eq!(err.to_string(), "Unable to assign Item to Rectangle");
    }
}
