// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! End-to-end tests: source text to a live object tree.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use weft_engine::compiler::{self, ResolvedDocument, TypeRef};
use weft_engine::expr::ScriptInstance;
use weft_engine::parser::{parse_document, parse_script};
use weft_engine::{Engine, Error, Value};

fn engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_output_warnings_to_stderr(false);
    engine.initialize();
    engine
}

#[test]
fn test_document_round_trip() {
    let mut engine = engine();
    let unit = engine
        .compile_source(
            "file:///app/main.weft",
            r#"
import Weft 1.0

Rectangle {
    id: root
    property int count: 5
    property string label: "n=" + count
    width: 100
    height: width * 2
    offset.x: 10
    border.width: 2
    Text { id: caption; text: root.label; font.pixelSize: 18 }
}
"#,
        )
        .unwrap();
    let root = engine.create(&unit).unwrap();
    let caption = engine.lookup_id(root, "caption").unwrap();

    assert_eq!(engine.property(root, "height").unwrap(), Value::Number(200.0));
    assert_eq!(engine.property(root, "offset.x").unwrap(), Value::Number(10.0));
    assert_eq!(engine.property(caption, "text").unwrap(), Value::from("n=5"));

    engine.write_property(root, "count", Value::Number(6.0)).unwrap();
    assert_eq!(engine.property(caption, "text").unwrap(), Value::from("n=6"));

    let json = serde_json::to_value(engine.snapshot(root).unwrap()).unwrap();
    assert_eq!(json["type"], "Rectangle");
    assert_eq!(json["id"], "root");
    assert_eq!(json["children"][0]["type"], "Text");
    assert_eq!(json["children"][0]["groups"]["font"]["type"], "Font");
    assert!(engine.take_warnings().is_empty());
}

#[test]
fn test_binding_order_is_observable() {
    let mut engine = engine();
    let sequence = Arc::new(Mutex::new(Vec::new()));
    let sink = sequence.clone();
    engine.register_function("seq", move |args| {
        let mut list = sink.lock();
        list.push(args[0].to_number() as i64);
        Ok(Value::Number(list.len() as f64))
    });
    let unit = engine
        .compile_source(
            "file:///order.weft",
            "import Weft 1.0\nItem {\n  x: seq(1)\n  Item { y: seq(2) }\n  width: seq(3)\n}",
        )
        .unwrap();
    let root = engine.create(&unit).unwrap();
    assert_eq!(*sequence.lock(), vec![1, 2, 3]);
    assert_eq!(engine.property(root, "width").unwrap(), Value::Number(3.0));
}

#[test]
fn test_binding_loop_warning() {
    let mut engine = engine();
    let unit = engine
        .compile_source(
            "file:///loop.weft",
            "import Weft 1.0\nItem {\n  width: height + 1\n  height: width + 1\n}",
        )
        .unwrap();
    let root = engine.create(&unit).unwrap();
    let warnings = engine.take_warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].to_string().starts_with("file:///loop.weft:"));
    assert!(warnings[0].message.starts_with("Binding loop detected for property \"height\""));
    assert_eq!(engine.property(root, "width").unwrap(), Value::Number(3.0));
    assert_eq!(engine.property(root, "height").unwrap(), Value::Number(2.0));
}

#[test]
fn test_compile_errors_are_located() {
    let engine = engine();
    let err = engine
        .compile_source(
            "file:///bad.weft",
            "import Weft 1.0\nItem {\n  width: 1\n  width: 2\n  bogus: 3\n}",
        )
        .unwrap_err();
    let Error::Compile(diagnostics) = err else {
        panic!("expected compile errors");
    };
    assert!(diagnostics.iter().any(|d| d.line == 4 && d.message == "Property value set multiple times"));
    assert!(diagnostics
        .iter()
        .any(|d| d.line == 5 && d.message == "Cannot assign to non-existent property \"bogus\""));
    assert!(diagnostics.iter().all(|d| d.to_string().starts_with("file:///bad.weft:")));
}

#[test]
fn test_missing_module() {
    let engine = engine();
    let err = engine
        .compile_source("file:///m.weft", "import Missing 1.0\nItem {}")
        .unwrap_err();
    assert!(err.to_string().contains("module \"Missing\" is not installed"));
}

#[test]
fn test_script_namespace() {
    let mut engine = engine();
    let program = parse_script("var factor = 3;\nfunction scale(v) { return v * factor; }").unwrap();
    let script = ScriptInstance::new("file:///util.js", &program, Vec::new()).unwrap();
    let document = parse_document("import Weft 1.0\nimport \"util.js\" as Util\nItem { width: Util.scale(4) }").unwrap();
    let mut types = FxHashMap::default();
    types.insert(
        "Item".to_string(),
        TypeRef::Native(engine.registry().type_named("Item").unwrap()),
    );
    let resolved = ResolvedDocument {
        url: "file:///s.weft".into(),
        document,
        types,
        scripts: vec![("Util".into(), script)],
    };
    let unit = Arc::new(compiler::compile(&resolved).unwrap());
    let root = engine.create(&unit).unwrap();
    assert_eq!(engine.property(root, "width").unwrap(), Value::Number(12.0));
}

#[test]
fn test_shutdown_and_reinitialize() {
    let mut engine = engine();
    let unit = engine
        .compile_source("file:///a.weft", "import Weft 1.0\nItem { Item {} Item {} }")
        .unwrap();
    engine.create(&unit).unwrap();
    assert_eq!(engine.object_count(), 3);
    engine.shutdown();
    assert_eq!(engine.object_count(), 0);
    assert!(matches!(engine.create(&unit), Err(Error::NotInitialized)));
    engine.initialize();
    let root = engine.create(&unit).unwrap();
    assert_eq!(engine.children(root).unwrap().len(), 2);
}
