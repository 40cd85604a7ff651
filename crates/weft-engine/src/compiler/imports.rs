// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Type name resolution against a document's imports.
//!
//! An [`ImportSet`] is built from the import statements of one document.
//! Module imports backed by native types are looked up in the
//! [`TypeRegistry`]; directory and manifest imports carry an explicit table
//! of document types filled in by the type loader.

use crate::ast::{Document, Member, ObjectNode, PropertyValue, TypeName, Version};
use crate::lexer::Span;
use crate::runtime::{NativeType, TypeRegistry};
use std::sync::Arc;

/// A document type listed by a directory or manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedType {
    /// Type name
    pub name: String,
    /// Version it was introduced in; `None` for plain directory entries
    pub version: Option<Version>,
    /// Document defining the type
    pub url: String,
    /// Only visible to documents of the same directory
    pub internal: bool,
}

/// Where the types of an import come from.
#[derive(Debug, Clone)]
pub enum ImportSource {
    /// Native types registered under a module URI
    Module {
        /// Module URI
        uri: String,
        /// Requested version
        version: Version,
    },
    /// Document types listed by a directory or manifest
    Listing {
        /// Directory or manifest location, for diagnostics
        location: String,
        /// Requested version, if the import had one
        version: Option<Version>,
        /// Listed types
        types: Vec<ListedType>,
    },
}

/// One import of a document.
#[derive(Debug, Clone)]
pub struct ImportEntry {
    /// `as Qualifier`
    pub qualifier: Option<String>,
    /// Types provided
    pub source: ImportSource,
    /// The document's own directory
    pub implicit: bool,
}

/// Result of resolving a type name.
#[derive(Debug, Clone)]
pub enum TypeResolution {
    /// A native type
    Native(Arc<NativeType>),
    /// A type defined by the document at this URL
    Document(String),
}

impl TypeResolution {
    fn same_as(&self, other: &TypeResolution) -> bool {
        match (self, other) {
            (TypeResolution::Native(a), TypeResolution::Native(b)) => Arc::ptr_eq(a, b),
            (TypeResolution::Document(a), TypeResolution::Document(b)) => a == b,
            _ => false,
        }
    }
}

/// The imports of one document.
#[derive(Debug, Clone, Default)]
pub struct ImportSet {
    entries: Vec<ImportEntry>,
    namespaces: Vec<String>,
}

impl ImportSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an import.
    pub fn add(&mut self, entry: ImportEntry) {
        self.entries.push(entry);
    }

    /// Registers a qualifier that names a script rather than types.
    pub fn add_script_namespace(&mut self, qualifier: impl Into<String>) {
        self.namespaces.push(qualifier.into());
    }

    /// The imports in declaration order.
    pub fn entries(&self) -> &[ImportEntry] {
        &self.entries
    }

    /// Validates a module import against the registry.
    pub fn check_module(registry: &TypeRegistry, uri: &str, version: Option<Version>) -> Result<Version, String> {
        let Some(version) = version else {
            return Err("Library import requires a version".to_string());
        };
        if !registry.is_module_installed(uri) {
            return Err(format!("module \"{}\" is not installed", uri));
        }
        if !registry.is_module_version_installed(uri, version) {
            return Err(format!("module \"{}\" version {} is not installed", uri, version));
        }
        Ok(version)
    }

    /// Resolves `name` to a native type or a document URL.
    pub fn resolve(&self, name: &TypeName, registry: &TypeRegistry) -> Result<TypeResolution, String> {
        if let Some(qualifier) = &name.qualifier {
            let mut found = false;
            for entry in self.entries.iter().filter(|e| e.qualifier.as_ref() == Some(qualifier)) {
                found = true;
                if let Some(resolved) = lookup(entry, &name.name, registry) {
                    return Ok(resolved);
                }
            }
            if !found && self.namespaces.contains(qualifier) {
                return Err(format!("Namespace {} cannot be used as a type", qualifier));
            }
            return Err(format!("{} is not a type", name));
        }

        if self.is_namespace(&name.name) {
            return Err(format!("Namespace {} cannot be used as a type", name.name));
        }

        let mut matches: Vec<(TypeResolution, String)> = Vec::new();
        for entry in self.entries.iter().filter(|e| e.qualifier.is_none() && !e.implicit) {
            if let Some(resolved) = lookup(entry, &name.name, registry) {
                if !matches.iter().any(|(m, _)| m.same_as(&resolved)) {
                    matches.push((resolved, location(entry)));
                }
            }
        }
        match matches.len() {
            0 => {}
            1 => return Ok(matches.remove(0).0),
            _ => {
                return Err(format!(
                    "\"{}\" is ambiguous. Found in {} and in {}",
                    name.name, matches[0].1, matches[1].1
                ));
            }
        }

        self.entries
            .iter()
            .filter(|e| e.implicit)
            .find_map(|entry| lookup(entry, &name.name, registry))
            .ok_or_else(|| format!("{} is not a type", name))
    }

    /// Whether `name` is a qualifier of some import.
    pub fn is_namespace(&self, name: &str) -> bool {
        self.namespaces.iter().any(|n| n == name)
            || self.entries.iter().any(|e| e.qualifier.as_deref() == Some(name))
    }
}

fn lookup(entry: &ImportEntry, name: &str, registry: &TypeRegistry) -> Option<TypeResolution> {
    match &entry.source {
        ImportSource::Module { uri, version } => registry
            .resolve(uri, *version, name)
            .map(TypeResolution::Native),
        ImportSource::Listing { version, types, .. } => types
            .iter()
            .filter(|t| t.name == name)
            .filter(|t| entry.implicit || !t.internal)
            .filter(|t| match (version, t.version) {
                (Some(requested), Some(introduced)) => {
                    introduced.major == requested.major && introduced.minor <= requested.minor
                }
                _ => true,
            })
            .max_by_key(|t| t.version)
            .map(|t| TypeResolution::Document(t.url.clone())),
    }
}

fn location(entry: &ImportEntry) -> String {
    match &entry.source {
        ImportSource::Module { uri, .. } => uri.clone(),
        ImportSource::Listing { location, .. } => location.clone(),
    }
}

/// Every type name used by the document, with the location of its first use.
pub fn referenced_types(document: &Document) -> Vec<(TypeName, Span)> {
    fn visit(node: &ObjectNode, out: &mut Vec<(TypeName, Span)>) {
        if !out.iter().any(|(name, _)| *name == node.type_name) {
            out.push((node.type_name.clone(), node.span));
        }
        for member in &node.members {
            let value = match member {
                Member::Object(child) => {
                    visit(child, out);
                    continue;
                }
                Member::Assignment(assignment) => Some(&assignment.value),
                Member::Property(declaration) => declaration.value.as_ref(),
                Member::Signal(_) => None,
            };
            match value {
                Some(PropertyValue::Object(child)) => visit(child, out),
                Some(PropertyValue::List(children)) => {
                    for child in children {
                        visit(child, out);
                    }
                }
                _ => {}
            }
        }
    }
    let mut out = Vec::new();
    visit(&document.root, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        let registry = TypeRegistry::new();
        registry.register(NativeType::builder("Item").module("Weft", 1, 0).build());
        registry.register(NativeType::builder("Item").module("Other", 1, 0).build());
        registry.register(NativeType::builder("Slider").module("Weft", 1, 2).build());
        registry
    }

    fn module(qualifier: Option<&str>, uri: &str, minor: u8) -> ImportEntry {
        ImportEntry {
            qualifier: qualifier.map(String::from),
            source: ImportSource::Module {
                uri: uri.into(),
                version: Version::new(1, minor),
            },
            implicit: false,
        }
    }

    fn plain(name: &str) -> TypeName {
        TypeName {
            qualifier: None,
            name: name.into(),
        }
    }

    #[test]
    fn test_check_module() {
        let registry = registry();
        assert_eq!(
            ImportSet::check_module(&registry, "Weft", None),
            Err("Library import requires a version".to_string())
        );
        assert_eq!(
            ImportSet::check_module(&registry, "Nope", Some(Version::new(1, 0))),
            Err("module \"Nope\" is not installed".to_string())
        );
        assert_eq!(
            ImportSet::check_module(&registry, "Weft", Some(Version::new(2, 0))),
            Err("module \"Weft\" version 2.0 is not installed".to_string())
        );
        assert!(ImportSet::check_module(&registry, "Weft", Some(Version::new(1, 1))).is_ok());
    }

    #[test]
    fn test_versioned_lookup() {
        let registry = registry();
        let mut set = ImportSet::new();
        set.add(module(None, "Weft", 0));
        assert!(matches!(set.resolve(&plain("Item"), &registry), Ok(TypeResolution::Native(_))));
        assert_eq!(
            set.resolve(&plain("Slider"), &registry).unwrap_err(),
            "Slider is not a type"
        );
    }

    #[test]
    fn test_ambiguous_type() {
        let registry = registry();
        let mut set = ImportSet::new();
        set.add(module(None, "Weft", 0));
        set.add(module(None, "Other", 0));
        assert_eq!(
            set.resolve(&plain("Item"), &registry).unwrap_err(),
            "\"Item\" is ambiguous. Found in Weft and in Other"
        );
    }

    #[test]
    fn test_qualified_and_namespace() {
        let registry = registry();
        let mut set = ImportSet::new();
        set.add(module(Some("W"), "Weft", 0));
        set.add_script_namespace("Util");
        let qualified = TypeName {
            qualifier: Some("W".into()),
            name: "Item".into(),
        };
        assert!(set.resolve(&qualified, &registry).is_ok());
        assert_eq!(
            set.resolve(&plain("Item"), &registry).unwrap_err(),
            "Item is not a type"
        );
        assert_eq!(
            set.resolve(&plain("W"), &registry).unwrap_err(),
            "Namespace W cannot be used as a type"
        );
        let script = TypeName {
            qualifier: Some("Util".into()),
            name: "Thing".into(),
        };
        assert_eq!(
            set.resolve(&script, &registry).unwrap_err(),
            "Namespace Util cannot be used as a type"
        );
    }

    #[test]
    fn test_internal_types_need_implicit_import() {
        let registry = registry();
        let listing = |implicit| ImportEntry {
            qualifier: None,
            source: ImportSource::Listing {
                location: "file:///controls/".into(),
                version: None,
                types: vec![ListedType {
                    name: "Helper".into(),
                    version: None,
                    url: "file:///controls/Helper.weft".into(),
                    internal: true,
                }],
            },
            implicit,
        };
        let mut explicit = ImportSet::new();
        explicit.add(listing(false));
        assert!(explicit.resolve(&plain("Helper"), &registry).is_err());

        let mut own = ImportSet::new();
        own.add(listing(true));
        assert!(matches!(
            own.resolve(&plain("Helper"), &registry),
            Ok(TypeResolution::Document(url)) if url == "file:///controls/Helper.weft"
        ));
    }
}
