// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

use super::*;
use crate::compiler::{self, ResolvedDocument};
use crate::error::Error;
use crate::parser::parse_document;
use crate::runtime::{ConstructionHooks, PropertyType};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

fn engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_output_warnings_to_stderr(false);
    engine.initialize();
    engine
}

/// Registers `record(x)`, which appends `x` to the returned log.
fn recorder(engine: &mut Engine) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    engine.register_function("record", move |args| {
        let value = args.first().cloned().unwrap_or(Value::Undefined);
        sink.lock().push(value.to_string());
        Ok(value)
    });
    log
}

fn create(engine: &mut Engine, source: &str) -> ObjectId {
    let unit = engine.compile_source("file:///vm.weft", source).unwrap();
    engine.create(&unit).unwrap()
}

/// Compiles `source` with `types` standing in for imported documents.
fn compile_with(engine: &Engine, url: &str, source: &str, documents: &[(&str, &Arc<CompiledUnit>)]) -> Arc<CompiledUnit> {
    let document = parse_document(source).unwrap();
    let mut types = FxHashMap::default();
    for (name, _) in compiler::imports::referenced_types(&document) {
        let name = name.to_string();
        let ty = match documents.iter().find(|(n, _)| *n == name) {
            Some((_, unit)) => TypeRef::Unit((*unit).clone()),
            None => TypeRef::Native(engine.registry().type_named(&name).unwrap()),
        };
        types.insert(name, ty);
    }
    let resolved = ResolvedDocument {
        url: url.to_string(),
        document,
        types,
        scripts: Vec::new(),
    };
    Arc::new(compiler::compile(&resolved).unwrap())
}

fn raw_unit(engine: &Engine, instructions: Vec<Instruction>, types: &[&str]) -> Arc<CompiledUnit> {
    let types: Vec<TypeRef> = types
        .iter()
        .map(|name| TypeRef::Native(engine.registry().type_named(name).unwrap()))
        .collect();
    let layouts = types.iter().map(|t| t.layout().clone()).collect();
    let root_layout = types[0].layout().clone();
    Arc::new(CompiledUnit {
        url: "file:///raw.weft".to_string(),
        instructions,
        strings: Vec::new(),
        data: Vec::new(),
        urls: Vec::new(),
        types,
        layouts,
        functions: Vec::new(),
        scripts: Vec::new(),
        skip_lists: Vec::new(),
        components: Vec::new(),
        root_layout,
    })
}

#[test]
fn test_bindings_evaluate_in_registration_order() {
    let mut engine = engine();
    let log = recorder(&mut engine);
    create(
        &mut engine,
        "import Weft 1.0\nItem { x: record(1); y: record(2); Item { width: record(3) } z: record(4) }",
    );
    assert_eq!(*log.lock(), vec!["1", "2", "3", "4"]);
}

#[test]
fn test_completion_handlers_run_in_reverse() {
    let mut engine = engine();
    let log = recorder(&mut engine);
    create(
        &mut engine,
        "import Weft 1.0\nItem {\n  Component.onCompleted: record(\"outer\")\n  Item { Component.onCompleted: record(\"inner\") }\n}",
    );
    assert_eq!(*log.lock(), vec!["inner", "outer"]);
}

struct Tracker {
    events: Arc<Mutex<Vec<String>>>,
}

impl ConstructionHooks for Tracker {
    fn class_begin(&self, engine: &mut Engine, object: ObjectId) {
        let name = engine.property(object, "objectName").unwrap().to_string();
        self.events.lock().push(format!("begin '{}'", name));
        let events = self.events.clone();
        engine.register_finalizer(move |_| events.lock().push("finalized".into()));
    }

    fn component_complete(&self, engine: &mut Engine, object: ObjectId) {
        let name = engine.property(object, "objectName").unwrap().to_string();
        self.events.lock().push(format!("complete {}", name));
    }
}

#[test]
fn test_construction_hooks() {
    let mut engine = engine();
    let events = Arc::new(Mutex::new(Vec::new()));
    let item = engine.registry().type_named("Item").unwrap();
    engine.registry().register(
        NativeType::builder("Tracker")
            .module("Test", 1, 0)
            .extends(&item)
            .property("tag", PropertyType::String)
            .hooks(Arc::new(Tracker { events: events.clone() }))
            .build(),
    );
    let log = recorder(&mut engine);
    create(
        &mut engine,
        "import Weft 1.0\nimport Test 1.0\nTracker {\n  objectName: \"outer\"\n  Component.onCompleted: record(\"handler\")\n  Tracker { objectName: \"inner\" }\n}",
    );
    let events = events.lock().clone();
    assert_eq!(
        events,
        vec![
            "begin ''",
            "begin ''",
            "complete inner",
            "complete outer",
            "finalized",
            "finalized",
        ]
    );
    assert_eq!(*log.lock(), vec!["handler"]);
    assert_eq!(engine.in_progress_creations(), 0);
}

#[test]
fn test_failed_construction_is_rolled_back() {
    let mut engine = engine();
    let contexts = engine.context_count();
    let unit = raw_unit(
        &engine,
        vec![
            Instruction::Init { objects: 2, bindings: 0 },
            Instruction::CreateObject { type_index: 0, layout: 0, line: 1, column: 1 },
            Instruction::BeginObject,
            Instruction::CreateObject { type_index: 1, layout: 1, line: 2, column: 5 },
            Instruction::CompleteObject,
            Instruction::Done,
        ],
        &["Rectangle", "Pen"],
    );
    let err = engine.create(&unit).unwrap_err();
    let Error::Construction(diagnostics) = err else {
        panic!("expected a construction error");
    };
    assert_eq!(diagnostics[0].to_string(), "file:///raw.weft:2:5: Element is not creatable.");
    assert_eq!(engine.object_count(), 0);
    assert_eq!(engine.context_count(), contexts);
    assert_eq!(engine.in_progress_creations(), 0);
}

#[test]
fn test_fetch_of_non_object_fails() {
    let mut engine = engine();
    let item = engine.registry().type_named("Item").unwrap();
    let x = item.layout().index_of("x").unwrap();
    let unit = raw_unit(
        &engine,
        vec![
            Instruction::Init { objects: 1, bindings: 0 },
            Instruction::CreateObject { type_index: 0, layout: 0, line: 1, column: 1 },
            Instruction::FetchObject { property: x, line: 3, column: 2 },
            Instruction::PopFetchedObject,
            Instruction::CompleteObject,
            Instruction::Done,
        ],
        &["Item"],
    );
    let err = engine.create(&unit).unwrap_err();
    assert!(err.to_string().ends_with("Cannot set properties on x as it is null"));
    assert_eq!(engine.object_count(), 0);
}

#[test]
fn test_grouped_objects() {
    let mut engine = engine();
    let root = create(&mut engine, "import Weft 1.0\nRectangle { width: 4; border.width: width / 2; border.color: \"red\" }");
    let Value::Object(border) = engine.property(root, "border").unwrap() else {
        panic!("border should hold an object");
    };
    assert_eq!(engine.parent(border).unwrap(), Some(root));
    assert!(engine.children(root).unwrap().is_empty());
    assert_eq!(engine.property(border, "width").unwrap(), Value::Number(2.0));
    engine.write_property(root, "width", Value::Number(10.0)).unwrap();
    assert_eq!(engine.property(border, "width").unwrap(), Value::Number(5.0));
    assert_eq!(engine.property(border, "color").unwrap(), Value::from("red"));
}

#[test]
fn test_deferred_content() {
    let mut engine = engine();
    let root = create(
        &mut engine,
        "import Weft 1.0\nPopup { id: p; width: 30; title: \"t\"; content: Item { width: p.width } }",
    );
    assert_eq!(engine.property(root, "title").unwrap(), Value::from("t"));
    assert_eq!(engine.property(root, "content").unwrap(), Value::Null);
    let before = engine.object_count();

    assert!(engine.complete_deferred(root).unwrap());
    let Value::Object(content) = engine.property(root, "content").unwrap() else {
        panic!("content should be created");
    };
    assert_eq!(engine.object_count(), before + 1);
    assert_eq!(engine.property(content, "width").unwrap(), Value::Number(30.0));
    assert_eq!(engine.parent(content).unwrap(), Some(root));
    assert!(!engine.complete_deferred(root).unwrap());

    engine.write_property(root, "width", Value::Number(60.0)).unwrap();
    assert_eq!(engine.property(content, "width").unwrap(), Value::Number(60.0));
}

#[test]
fn test_failed_deferred_range_is_rolled_back() {
    let mut engine = engine();
    let root = create(&mut engine, "import Weft 1.0\nItem { width: 7 }");
    let source = engine
        .compile_source("file:///vm.weft", "import Weft 1.0\nItem { height: width + 1 }")
        .unwrap();
    let store_binding = source
        .instructions()
        .iter()
        .find(|i| matches!(i, Instruction::StoreBinding { .. }))
        .cloned()
        .unwrap();
    let width = engine.resolve_property(root, "width").unwrap();
    let x = engine.registry().type_named("Item").unwrap().layout().index_of("x").unwrap();
    let unit = Arc::new(CompiledUnit {
        url: source.url.clone(),
        instructions: vec![
            store_binding,
            Instruction::FetchObject { property: x, line: 2, column: 8 },
            Instruction::StoreDouble { property: width, value: 9.0 },
        ],
        strings: source.strings.clone(),
        data: source.data.clone(),
        urls: source.urls.clone(),
        types: source.types.clone(),
        layouts: source.layouts.clone(),
        functions: source.functions.clone(),
        scripts: source.scripts.clone(),
        skip_lists: source.skip_lists.clone(),
        components: source.components.clone(),
        root_layout: source.root_layout.clone(),
    });
    let context = engine.context_of(root).unwrap();
    let range = |start, end| DeferredRange {
        unit: unit.clone(),
        context,
        start,
        end,
    };
    engine.objects.data_mut(root).unwrap().deferred = vec![range(0, 2), range(2, 3)];
    let bindings = engine.bindings.len();

    assert!(matches!(engine.complete_deferred(root), Err(Error::Construction(_))));
    assert!(engine.binding(root, "height").is_none());
    assert_eq!(engine.bindings.len(), bindings);
    let height = engine.resolve_property(root, "height").unwrap();
    assert!(!engine.object(root).unwrap().has_binding(height.core()));
    assert_eq!(engine.objects.data(root).unwrap().deferred.len(), 1);
    assert_eq!(engine.property(root, "width").unwrap(), Value::Number(7.0));

    assert!(engine.complete_deferred(root).unwrap());
    assert_eq!(engine.property(root, "width").unwrap(), Value::Number(9.0));
    assert_eq!(engine.property(root, "height").unwrap(), Value::Number(0.0));
    assert!(!engine.complete_deferred(root).unwrap());
}

#[test]
fn test_inline_component() {
    let mut engine = engine();
    let root = create(
        &mut engine,
        "import Weft 1.0\nItem { property real base: 21; Component { id: comp; Item { width: base * 2 } } }",
    );
    let comp = engine.lookup_id(root, "comp").unwrap();
    assert_eq!(engine.type_name(comp).unwrap(), "Component");
    let instance = engine.create_from_component(comp).unwrap();
    assert_eq!(engine.property(instance, "width").unwrap(), Value::Number(42.0));
    assert_eq!(engine.parent(instance).unwrap(), None);
    assert!(engine.create_from_component(root).is_err());
}

#[test]
fn test_composite_types() {
    let mut engine = engine();
    let button = compile_with(
        &engine,
        "file:///Button.weft",
        "import Weft 1.0\nItem { id: inner; property int size: 3; width: size * 2; height: inner.width }",
        &[],
    );
    let main = compile_with(
        &engine,
        "file:///main.weft",
        "import Weft 1.0\nItem {\n  Button { id: a; size: 5 }\n  Button { id: b; width: 1 }\n  Button { id: c; property int extra: 7; height: extra }\n}",
        &[("Button", &button)],
    );
    let root = engine.create(&main).unwrap();
    let a = engine.lookup_id(root, "a").unwrap();
    let b = engine.lookup_id(root, "b").unwrap();
    let c = engine.lookup_id(root, "c").unwrap();

    assert_eq!(engine.type_name(a).unwrap(), "Button");
    assert_eq!(engine.property(a, "width").unwrap(), Value::Number(10.0));
    assert_eq!(engine.property(a, "height").unwrap(), Value::Number(10.0));
    // The use site's width replaces the inner binding.
    assert_eq!(engine.property(b, "width").unwrap(), Value::Number(1.0));
    assert_eq!(engine.property(b, "height").unwrap(), Value::Number(1.0));
    assert_eq!(engine.property(c, "height").unwrap(), Value::Number(7.0));
    assert!(engine.binding(b, "width").is_none());

    // Inner ids live in the component's own context.
    assert_eq!(engine.lookup_id(a, "inner"), Some(a));
    assert!(engine.lookup_id(root, "inner").is_none());

    let contexts = engine.context_count();
    engine.destroy(root).unwrap();
    assert_eq!(engine.object_count(), 0);
    assert_eq!(engine.context_count(), contexts - 4);
}

#[test]
fn test_nested_errors_are_delayed_until_completion() {
    let mut engine = engine();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let progress = Arc::new(Mutex::new(Vec::new()));
    let calls = progress.clone();
    engine.set_warning_handler(Some(Box::new(move |list: &[Diagnostic]| {
        sink.lock().extend(list.iter().map(|d| d.to_string()));
    })));
    engine.register_function("fail", move |_| {
        calls.lock().push(());
        Err(crate::error::EvalError::new("boom"))
    });
    create(&mut engine, "import Weft 1.0\nItem {\n  width: fail()\n  height: fail()\n}");
    assert_eq!(progress.lock().len(), 2);
    assert_eq!(
        *seen.lock(),
        vec!["file:///vm.weft:3:10: boom", "file:///vm.weft:4:11: boom"]
    );
}
