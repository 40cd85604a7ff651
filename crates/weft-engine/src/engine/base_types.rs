// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The `Weft 1.0` base module.

use crate::runtime::{NativeType, PropertyType, TypeRegistry, Value};

/// URI of the base module.
pub const MODULE: &str = "Weft";

/// Registers the base types into `registry`.
pub fn register(registry: &TypeRegistry) {
    let object = registry.register(
        NativeType::builder("Object")
            .module(MODULE, 1, 0)
            .property("objectName", PropertyType::String)
            .build(),
    );

    let item = registry.register(
        NativeType::builder("Item")
            .module(MODULE, 1, 0)
            .extends(&object)
            .property("x", PropertyType::Real)
            .property("y", PropertyType::Real)
            .property("width", PropertyType::Real)
            .property("height", PropertyType::Real)
            .property("z", PropertyType::Real)
            .property_with_default("visible", PropertyType::Bool, Value::Boolean(true))
            .property_with_default("opacity", PropertyType::Real, Value::Number(1.0))
            .property("offset", PropertyType::Point)
            .property("extent", PropertyType::Size)
            .property("children", PropertyType::List("Object".into()))
            .default_property("children")
            .build(),
    );

    let pen = registry.register(
        NativeType::builder("Pen")
            .module(MODULE, 1, 0)
            .extends(&object)
            .property_with_default("width", PropertyType::Real, Value::Number(1.0))
            .property_with_default("color", PropertyType::String, Value::from("black"))
            .uncreatable()
            .build(),
    );

    let font = registry.register(
        NativeType::builder("Font")
            .module(MODULE, 1, 0)
            .extends(&object)
            .property("family", PropertyType::String)
            .property_with_default("pixelSize", PropertyType::Int, Value::Number(12.0))
            .property("bold", PropertyType::Bool)
            .uncreatable()
            .build(),
    );

    registry.register(
        NativeType::builder("Rectangle")
            .module(MODULE, 1, 0)
            .extends(&item)
            .property_with_default("color", PropertyType::String, Value::from("white"))
            .property("radius", PropertyType::Real)
            .grouped_property("border", &pen)
            .build(),
    );

    registry.register(
        NativeType::builder("Text")
            .module(MODULE, 1, 0)
            .extends(&item)
            .property("text", PropertyType::String)
            .grouped_property("font", &font)
            .build(),
    );

    registry.register(
        NativeType::builder("Popup")
            .module(MODULE, 1, 0)
            .extends(&item)
            .property("content", PropertyType::Object("Item".into()))
            .deferred("content")
            .property("title", PropertyType::String)
            .property("modal", PropertyType::Bool)
            .build(),
    );

    registry.register(
        NativeType::builder("Component")
            .module(MODULE, 1, 0)
            .extends(&object)
            .build(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Version;

    #[test]
    fn test_base_module() {
        let registry = TypeRegistry::new();
        register(&registry);
        assert!(registry.is_module_version_installed(MODULE, Version::new(1, 0)));
        let rect = registry.resolve(MODULE, Version::new(1, 0), "Rectangle").unwrap();
        assert!(rect.layout().is_a("Item"));
        assert!(rect.layout().is_a("Object"));
        assert_eq!(rect.layout().default_property(), rect.layout().index_of("children"));
        let border = rect.layout().property(rect.layout().index_of("border").unwrap()).unwrap();
        assert!(border.grouped.is_some());
        assert!(border.readonly);
        assert!(!registry.type_named("Pen").unwrap().is_creatable());
    }

    #[test]
    fn test_popup_content_is_deferred() {
        let registry = TypeRegistry::new();
        register(&registry);
        let popup = registry.type_named("Popup").unwrap();
        let index = popup.layout().index_of("content").unwrap();
        assert!(popup.layout().property(index).unwrap().deferred);
    }
}
