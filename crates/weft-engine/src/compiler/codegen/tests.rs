// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Tests for the document compiler.

use super::*;
use crate::compiler::{compile, resolve_modules};
use crate::engine::base_types;
use crate::parser::parse_document;
use crate::runtime::TypeRegistry;

const URL: &str = "file:///test/main.weft";

fn registry() -> TypeRegistry {
    let registry = TypeRegistry::new();
    base_types::register(&registry);
    registry
}

fn compile_at(url: &str, src: &str) -> Result<CompiledUnit, Vec<Diagnostic>> {
    let document = parse_document(src).map_err(|e| e.into_diagnostics(Some(url)))?;
    let resolved = resolve_modules(url, document, &registry())?;
    compile(&resolved)
}

fn compile_ok(src: &str) -> CompiledUnit {
    compile_at(URL, src).expect("Compilation should succeed")
}

fn compile_err(src: &str) -> Vec<String> {
    compile_at(URL, src)
        .expect_err("Compilation should fail")
        .into_iter()
        .map(|d| d.message)
        .collect()
}

fn index_of(unit: &CompiledUnit, name: &str) -> u16 {
    unit.root_layout().index_of(name).unwrap()
}

#[test]
fn test_compile_minimal_document() {
    let unit = compile_ok("import Weft 1.0\nItem {}");
    assert_eq!(
        unit.instructions(),
        &[
            Instruction::Init {
                objects: 1,
                bindings: 0
            },
            Instruction::CreateObject {
                type_index: 0,
                layout: 0,
                line: 2,
                column: 1
            },
            Instruction::BeginObject,
            Instruction::CompleteObject,
            Instruction::Done,
        ]
    );
    assert_eq!(unit.root_layout().type_name(), "Item");
}

#[test]
fn test_compile_literal_stores() {
    let unit = compile_ok(
        r#"import Weft 1.0
        Item {
            property int count: 5
            width: 100
            visible: false
            objectName: "root"
        }"#,
    );
    let count = index_of(&unit, "count");
    let width = index_of(&unit, "width");
    let visible = index_of(&unit, "visible");
    let name = index_of(&unit, "objectName");
    let code = unit.instructions();
    assert!(code.contains(&Instruction::StoreInteger {
        property: PropertyIndex::new(count),
        value: 5
    }));
    assert!(code.contains(&Instruction::StoreDouble {
        property: PropertyIndex::new(width),
        value: 100.0
    }));
    assert!(code.contains(&Instruction::StoreBool {
        property: PropertyIndex::new(visible),
        value: false
    }));
    assert!(code.contains(&Instruction::StoreString {
        property: PropertyIndex::new(name),
        value: 0
    }));
    assert_eq!(unit.string(0), "root");
}

#[test]
fn test_compile_folds_constants() {
    let unit = compile_ok("import Weft 1.0\nItem { width: 2 * 3 + 4; objectName: \"a\" + \"b\" }");
    let width = index_of(&unit, "width");
    assert!(unit.instructions().contains(&Instruction::StoreDouble {
        property: PropertyIndex::new(width),
        value: 10.0
    }));
    assert_eq!(unit.string(0), "ab");
    assert_eq!(unit.binding_count(), 0);
}

#[test]
fn test_compile_binding() {
    let unit = compile_ok("import Weft 1.0\nItem { width: 10; height: width * 2 }");
    let height = index_of(&unit, "height");
    assert!(unit.instructions().contains(&Instruction::StoreBinding {
        property: PropertyIndex::new(height),
        function: 0
    }));
    assert_eq!(unit.functions()[0].source, "width * 2");
    assert_eq!(unit.functions()[0].name, "height");
    assert!(matches!(
        unit.instructions()[0],
        Instruction::Init {
            objects: 1,
            bindings: 1
        }
    ));
}

#[test]
fn test_compile_value_type_literals() {
    let unit = compile_ok("import Weft 1.0\nItem { offset: \"10,20\"; extent: \"30x40\" }");
    let stores: Vec<_> = unit
        .instructions()
        .iter()
        .filter_map(|i| match i {
            Instruction::StorePoint { data, .. } => Some(("point", *data)),
            Instruction::StoreSize { data, .. } => Some(("size", *data)),
            _ => None,
        })
        .collect();
    assert_eq!(stores, vec![("point", 0), ("size", 16)]);
    assert_eq!(unit.point_at(0), Point { x: 10.0, y: 20.0 });
    assert_eq!(
        unit.size_at(16),
        Size {
            width: 30.0,
            height: 40.0
        }
    );
}

#[test]
fn test_compile_value_type_sub_property() {
    let unit = compile_ok("import Weft 1.0\nItem { offset.x: 10; extent.height: width }");
    let offset = index_of(&unit, "offset");
    let extent = index_of(&unit, "extent");
    assert!(unit.instructions().contains(&Instruction::StoreDouble {
        property: PropertyIndex::with_sub(offset, 0),
        value: 10.0
    }));
    assert!(unit.instructions().contains(&Instruction::StoreBinding {
        property: PropertyIndex::with_sub(extent, 1),
        function: 0
    }));
    assert_eq!(unit.functions()[0].name, "extent.height");
}

#[test]
fn test_compile_grouped_property() {
    let unit = compile_ok("import Weft 1.0\nRectangle { border.width: 2; border.color: \"red\" }");
    let border = index_of(&unit, "border");
    let code = unit.instructions();
    let fetches = code
        .iter()
        .filter(|i| matches!(i, Instruction::FetchObject { property, .. } if *property == border))
        .count();
    assert_eq!(fetches, 2);
    let pops = code
        .iter()
        .filter(|i| matches!(i, Instruction::PopFetchedObject))
        .count();
    assert_eq!(pops, 2);
}

#[test]
fn test_compile_handlers() {
    let unit = compile_ok(
        r#"import Weft 1.0
        Item {
            signal activated(real x)
            onWidthChanged: height = width
            onActivated: log(x)
            Component.onCompleted: { log("done") }
        }"#,
    );
    let width = index_of(&unit, "width");
    let code = unit.instructions();
    assert!(code.contains(&Instruction::StoreChangeHandler {
        property: width,
        function: 0
    }));
    assert!(code.iter().any(|i| matches!(i, Instruction::StoreSignalHandler { .. })));
    assert!(code.contains(&Instruction::StoreCompletionHandler { function: 2 }));
    assert_eq!(unit.functions()[1].parameters, vec!["x".to_string()]);
    assert_eq!(unit.binding_count(), 0);
}

#[test]
fn test_compile_default_property_children() {
    let unit = compile_ok("import Weft 1.0\nItem { Item {} Rectangle {} }");
    let children = index_of(&unit, "children");
    let appends = unit
        .instructions()
        .iter()
        .filter(|i| **i == Instruction::AppendObject { property: children })
        .count();
    assert_eq!(appends, 2);
    assert!(matches!(
        unit.instructions()[0],
        Instruction::Init { objects: 3, .. }
    ));
}

#[test]
fn test_compile_object_list() {
    let unit = compile_ok("import Weft 1.0\nItem { children: [ Item {}, Item {} ] }");
    let count = unit
        .instructions()
        .iter()
        .filter(|i| matches!(i, Instruction::AppendObject { .. }))
        .count();
    assert_eq!(count, 2);
}

#[test]
fn test_compile_ids() {
    let unit = compile_ok("import Weft 1.0\nItem { id: root; Item { id: child } }");
    let ids: Vec<_> = unit
        .instructions()
        .iter()
        .filter_map(|i| match i {
            Instruction::SetId { name } => Some(unit.string(*name).to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(ids, vec!["root", "child"]);
}

#[test]
fn test_id_errors() {
    assert_eq!(
        compile_err("import Weft 1.0\nItem { id: a; Item { id: a } }"),
        vec!["id is not unique"]
    );
    assert_eq!(
        compile_err("import Weft 1.0\nItem { id: Root }"),
        vec!["IDs cannot start with an uppercase letter"]
    );
}

#[test]
fn test_compile_inline_component() {
    let unit = compile_ok(
        "import Weft 1.0\nItem { property Component delegate: Item { width: 3 } }",
    );
    assert_eq!(unit.components().len(), 1);
    let inner = &unit.components()[0];
    assert_eq!(inner.root_layout().type_name(), "Item");
    assert!(inner.instructions().iter().any(|i| matches!(i, Instruction::StoreDouble { value, .. } if *value == 3.0)));
    assert!(unit
        .instructions()
        .iter()
        .any(|i| matches!(i, Instruction::CreateComponent { unit: 0, .. })));
}

#[test]
fn test_compile_explicit_component() {
    let unit = compile_ok("import Weft 1.0\nItem { Component { id: factory; Rectangle {} } }");
    assert_eq!(unit.components().len(), 1);
    let code = unit.instructions();
    let at = code
        .iter()
        .position(|i| matches!(i, Instruction::CreateComponent { .. }))
        .unwrap();
    assert!(matches!(code[at + 1], Instruction::SetId { .. }));
    assert_eq!(code[at + 2], Instruction::CompleteObject);
}

#[test]
fn test_component_errors() {
    assert_eq!(
        compile_err("import Weft 1.0\nItem { Component {} }"),
        vec!["Cannot create empty component specification"]
    );
    assert_eq!(
        compile_err("import Weft 1.0\nItem { Component { property int a; Item {} } }"),
        vec!["Component objects cannot declare new properties."]
    );
}

#[test]
fn test_compile_deferred_property() {
    let unit = compile_ok(
        "import Weft 1.0\nPopup { title: \"t\"; content: Text { text: title } }",
    );
    let code = unit.instructions();
    let at = code
        .iter()
        .position(|i| matches!(i, Instruction::Defer { .. }))
        .unwrap();
    let Instruction::Defer { count } = code[at] else {
        unreachable!()
    };
    // The deferred range ends right before the Popup's CompleteObject.
    assert_eq!(code[at + count as usize + 1], Instruction::CompleteObject);
    assert!(matches!(code[at + 1], Instruction::CreateObject { .. }));
    let title_store = code
        .iter()
        .position(|i| matches!(i, Instruction::StoreString { .. }))
        .unwrap();
    assert!(title_store < at);
}

#[test]
fn test_compile_url_resolution() {
    let unit = compile_ok("import Weft 1.0\nItem { property url source: \"images/a.png\" }");
    assert_eq!(unit.url_at(0), "file:///test/images/a.png");
}

#[test]
fn test_composite_root_layout_name() {
    let unit = compile_at("file:///test/Button.weft", "import Weft 1.0\nRectangle { property string label }")
        .unwrap();
    assert_eq!(unit.root_layout().type_name(), "Button");
    assert!(unit.root_layout().is_a("Rectangle"));
    assert!(unit.root_layout().index_of("label").is_some());
}

#[test]
fn test_property_assignment_errors() {
    assert_eq!(
        compile_err("import Weft 1.0\nItem { colour: 1 }"),
        vec!["Cannot assign to non-existent property \"colour\""]
    );
    assert_eq!(
        compile_err("import Weft 1.0\nItem { width: \"wide\" }"),
        vec!["Invalid property assignment: number expected"]
    );
    assert_eq!(
        compile_err("import Weft 1.0\nItem { property int n: 1.5 }"),
        vec!["Invalid property assignment: int expected"]
    );
    assert_eq!(
        compile_err("import Weft 1.0\nRectangle { border: 5 }"),
        vec!["Invalid property assignment: \"border\" is a read-only property"]
    );
    assert_eq!(
        compile_err("import Weft 1.0\nItem { children: 5 }"),
        vec!["Cannot assign primitives to lists"]
    );
    assert_eq!(
        compile_err("import Weft 1.0\nItem { width: Item {} }"),
        vec!["Cannot assign object to property"]
    );
}

#[test]
fn test_duplicate_assignment_errors() {
    assert_eq!(
        compile_err("import Weft 1.0\nItem { width: 1; width: 2 }"),
        vec!["Property value set multiple times"]
    );
    assert_eq!(
        compile_err("import Weft 1.0\nItem { offset: \"1,2\"; offset.x: 3 }"),
        vec!["Property value set multiple times"]
    );
}

#[test]
fn test_declaration_errors() {
    assert_eq!(
        compile_err("import Weft 1.0\nItem { property int a; property int a }"),
        vec!["Duplicate property name"]
    );
    assert_eq!(
        compile_err("import Weft 1.0\nItem { property int Big }"),
        vec!["Property names cannot begin with an upper case letter"]
    );
    assert_eq!(
        compile_err("import Weft 1.0\nItem { property blob b }"),
        vec!["Invalid property type"]
    );
    assert_eq!(
        compile_err("import Weft 1.0\nItem { default property Item a; default property Item b }"),
        vec!["Duplicate default property"]
    );
}

#[test]
fn test_grouped_and_attached_errors() {
    assert_eq!(
        compile_err("import Weft 1.0\nItem { width.x: 1 }"),
        vec!["Invalid grouped property access"]
    );
    assert_eq!(
        compile_err("import Weft 1.0\nItem { Component.onDestroyed: log(1) }"),
        vec!["Invalid attached object assignment"]
    );
    assert_eq!(
        compile_err("import Weft 1.0\nItem { Keys.onPressed: log(1) }"),
        vec!["Non-existent attached object"]
    );
}

#[test]
fn test_default_property_errors() {
    assert_eq!(
        compile_err("import Weft 1.0\nRectangle { border.width: 1; Pen {} }")
            .first()
            .map(String::as_str),
        Some("Element is not creatable.")
    );
    assert_eq!(
        compile_err("import Weft 1.0\nComponent { Object { Item {} } }"),
        vec!["Cannot assign to non-existent default property"]
    );
}

#[test]
fn test_errors_are_collected() {
    let errors = compile_at(URL, "import Weft 1.0\nItem {\n  nope: 1\n  width: \"x\"\n}").unwrap_err();
    assert_eq!(errors.len(), 2);
    assert_eq!((errors[0].line, errors[0].column), (3, 3));
    assert_eq!(errors[0].url.as_deref(), Some(URL));
}

#[test]
fn test_unresolved_types() {
    assert_eq!(
        compile_at(URL, "import Weft 1.0\nWidget {}")
            .unwrap_err()
            .into_iter()
            .map(|d| d.message)
            .collect::<Vec<_>>(),
        vec!["Widget is not a type"]
    );
    assert_eq!(
        compile_at(URL, "import Weft 2.0\nItem {}").unwrap_err()[0].message,
        "module \"Weft\" version 2.0 is not installed"
    );
}

#[test]
fn test_disassemble_listing() {
    let unit = compile_ok(
        "import Weft 1.0\nRectangle { id: r; width: 100; height: width / 2; border.width: 3 }",
    );
    let listing = unit.disassemble();
    assert!(listing.starts_with("; unit file:///test/main.weft\n"));
    assert!(listing.contains("CreateObject         Rectangle layout=0 (2:1)"));
    assert!(listing.contains("SetId                \"r\""));
    assert!(listing.contains("StoreDouble          width = 100"));
    assert!(listing.contains("StoreBinding         height <- #0 `width / 2`"));
    assert!(listing.contains("FetchObject          border"));
    assert!(listing.contains("StoreDouble          width = 3"));
    assert_eq!(listing, unit.disassemble());
}
