// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Name resolution for expressions running against the object tree.
//!
//! A free identifier is looked up in this order:
//!
//! 1. ids of the evaluation context and its ancestors
//! 2. properties and signals of the scope object
//! 3. properties of the context objects, innermost first
//! 4. imported script namespaces
//! 5. context properties set by the host
//! 6. engine globals and builtins
//!
//! Every property read made through the scope is recorded in the innermost
//! capture frame, which is how bindings learn their dependencies.

use super::Engine;
use crate::error::EvalError;
use crate::expr::{builtins, Callable, CompiledFunction, ExpressionEvaluator, Namespace, Scope, TreeWalker};
use crate::runtime::{ContextId, ObjectId, Value};
use std::sync::Arc;

pub(crate) struct EngineScope<'e> {
    engine: &'e mut Engine,
    context: ContextId,
    object: Option<ObjectId>,
}

impl Engine {
    /// Runs `function` in `context` with `object` as the scope object.
    pub(crate) fn run_function(
        &mut self,
        function: &CompiledFunction,
        arguments: &[Value],
        context: ContextId,
        object: Option<ObjectId>,
    ) -> Result<Value, EvalError> {
        let mut scope = EngineScope {
            engine: self,
            context,
            object,
        };
        TreeWalker::new().run(function, arguments, &mut scope)
    }

    fn record_read(&mut self, object: ObjectId, index: u16) {
        if let Some(frame) = self.captures.last_mut() {
            frame.push((object, index));
        }
    }

    /// Reads a member of `object` for an expression, or `None` if it has no
    /// member called `name`.
    fn member(&mut self, object: ObjectId, name: &str) -> Option<Value> {
        let data = self.objects.get(object)?;
        if let Some(index) = data.layout.index_of(name) {
            let value = data.values.get(index as usize).cloned().unwrap_or(Value::Undefined);
            self.record_read(object, index);
            return Some(value);
        }
        if data.layout.signal(name).is_some() {
            return Some(Value::Function(Arc::new(Callable::Signal {
                object,
                name: name.to_string(),
            })));
        }
        if name == "parent" {
            return Some(data.parent.map(Value::Object).unwrap_or(Value::Null));
        }
        None
    }

    /// Writes a member of `object` for an expression. The write replaces any
    /// binding on the property.
    fn assign_member(&mut self, object: ObjectId, name: &str, value: Value) -> Result<(), EvalError> {
        let Some(data) = self.objects.get(object) else {
            return Err(EvalError::type_error(format!(
                "Cannot set property '{}' of null",
                name
            )));
        };
        let Some(index) = data.layout.index_of(name) else {
            return Err(EvalError::type_error(format!(
                "Cannot assign to non-existent property \"{}\"",
                name
            )));
        };
        if data.layout.property(index).is_some_and(|d| d.readonly) {
            return Err(EvalError::type_error(format!(
                "Cannot assign to read-only property \"{}\"",
                name
            )));
        }
        let index = crate::runtime::PropertyIndex::new(index);
        self.detach_binding(object, index);
        self.store_value(object, index, value).map_err(EvalError::new)?;
        Ok(())
    }

    fn has_property(&self, object: ObjectId, name: &str) -> bool {
        self.objects
            .get(object)
            .is_some_and(|data| data.layout.index_of(name).is_some())
    }

    fn context_objects(&self, context: ContextId) -> Vec<ObjectId> {
        self.contexts
            .ancestors(context)
            .filter_map(|(_, data)| data.context_object)
            .collect()
    }
}

impl Scope for EngineScope<'_> {
    fn lookup(&mut self, name: &str) -> Result<Value, EvalError> {
        let engine = &mut *self.engine;
        if let Some(id) = engine.contexts.resolve_id(self.context, name) {
            return Ok(Value::Object(id));
        }
        if let Some(object) = self.object {
            if let Some(value) = engine.member(object, name) {
                return Ok(value);
            }
        }
        for object in engine.context_objects(self.context) {
            if Some(object) == self.object {
                continue;
            }
            if let Some(value) = engine.member(object, name) {
                return Ok(value);
            }
        }
        let found = engine.contexts.ancestors(self.context).find_map(|(_, data)| {
            data.script(name)
                .map(|script| Value::Namespace(Namespace::Script(script.clone())))
                .or_else(|| data.property(name).cloned())
        });
        if let Some(value) = found {
            return Ok(value);
        }
        if let Some(value) = engine.globals.get(name) {
            return Ok(value.clone());
        }
        builtins::global(name).ok_or_else(|| EvalError::reference_error(name))
    }

    fn assign(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        let engine = &mut *self.engine;
        if let Some(object) = self.object.filter(|o| engine.has_property(*o, name)) {
            return engine.assign_member(object, name, value);
        }
        let target = engine
            .context_objects(self.context)
            .into_iter()
            .find(|o| engine.has_property(*o, name));
        match target {
            Some(object) => engine.assign_member(object, name, value),
            None => Err(EvalError::new(format!(
                "Invalid write to global property \"{}\"",
                name
            ))),
        }
    }

    fn get_property(&mut self, object: ObjectId, name: &str) -> Result<Value, EvalError> {
        if !self.engine.objects.contains(object) {
            return Err(EvalError::type_error(format!(
                "Cannot read property '{}' of null",
                name
            )));
        }
        Ok(self.engine.member(object, name).unwrap_or(Value::Undefined))
    }

    fn set_property(&mut self, object: ObjectId, name: &str, value: Value) -> Result<(), EvalError> {
        self.engine.assign_member(object, name, value)
    }

    fn emit_signal(&mut self, object: ObjectId, name: &str, args: Vec<Value>) -> Result<(), EvalError> {
        self.engine.emit_signal_from_script(object, name, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(engine: &mut Engine, source: &str) -> ObjectId {
        let unit = engine.compile_source("file:///s.weft", source).unwrap();
        engine.create(&unit).unwrap()
    }

    fn engine() -> Engine {
        let mut engine = Engine::new();
        engine.set_output_warnings_to_stderr(false);
        engine.initialize();
        engine
    }

    #[test]
    fn test_lookup_order() {
        let mut engine = engine();
        engine.set_context_property("width", Value::Number(999.0)).unwrap();
        engine.set_global("greeting", Value::from("hello"));
        let root = create(
            &mut engine,
            "import Weft 1.0\nItem { width: 10; Item { id: child; height: width } }",
        );
        let child = engine.lookup_id(root, "child").unwrap();
        // The child's own width (0) shadows the root's and the context property.
        assert_eq!(engine.property(child, "height").unwrap(), Value::Number(0.0));
        assert_eq!(engine.evaluate(child, "greeting").unwrap(), Value::from("hello"));
        assert_eq!(engine.evaluate(child, "Math.max(1, 2)").unwrap(), Value::Number(2.0));
    }

    #[test]
    fn test_context_object_fallback() {
        let mut engine = engine();
        let root = create(
            &mut engine,
            "import Weft 1.0\nItem { property real unit: 4; Text { id: label; width: unit * 2 } }",
        );
        let label = engine.lookup_id(root, "label").unwrap();
        assert_eq!(engine.property(label, "width").unwrap(), Value::Number(8.0));
    }

    #[test]
    fn test_parent_and_unknown_names() {
        let mut engine = engine();
        let root = create(&mut engine, "import Weft 1.0\nItem { width: 7; Item { id: c } }");
        let c = engine.lookup_id(root, "c").unwrap();
        assert_eq!(engine.evaluate(c, "parent.width").unwrap(), Value::Number(7.0));
        let err = engine.evaluate(c, "nothing").unwrap_err();
        assert_eq!(err.to_string(), "ReferenceError: nothing is not defined");
    }

    #[test]
    fn test_assignment_to_unknown_name_fails() {
        let mut engine = engine();
        let root = create(&mut engine, "import Weft 1.0\nItem {}");
        let err = engine.evaluate(root, "bogus = 3").unwrap_err();
        assert_eq!(err.to_string(), "Invalid write to global property \"bogus\"");
    }

    #[test]
    fn test_reads_are_captured() {
        let mut engine = engine();
        let root = create(&mut engine, "import Weft 1.0\nItem { id: r; width: 3 }");
        engine.captures.push(Vec::new());
        engine.evaluate(root, "r.width + height").unwrap();
        let captured = engine.captures.pop().unwrap();
        let width = engine.resolve_property(root, "width").unwrap().core();
        let height = engine.resolve_property(root, "height").unwrap().core();
        assert_eq!(captured, vec![(root, width), (root, height)]);
    }
}
