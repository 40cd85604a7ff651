// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Native type descriptors, property layouts and the type registry.

use super::object::ObjectId;
use super::value::{Point, Size, Value};
use crate::Engine;
use crate::ast::Version;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// The declared type of a property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyType {
    /// Whole number
    Int,
    /// Floating point number
    Real,
    /// Boolean
    Bool,
    /// String
    String,
    /// URL, resolved against the document when assigned a literal
    Url,
    /// Any value
    Var,
    /// `point` value type
    Point,
    /// `size` value type
    Size,
    /// Reference to an object of the named type (or a subtype)
    Object(String),
    /// List of objects of the named type
    List(String),
    /// A component definition
    Component,
}

impl PropertyType {
    /// Parses a declared type name from a `property` declaration.
    pub fn from_name(name: &str) -> Option<PropertyType> {
        let ty = match name {
            "int" => PropertyType::Int,
            "real" | "double" => PropertyType::Real,
            "bool" => PropertyType::Bool,
            "string" => PropertyType::String,
            "url" => PropertyType::Url,
            "var" | "variant" => PropertyType::Var,
            "point" => PropertyType::Point,
            "size" => PropertyType::Size,
            "Component" => PropertyType::Component,
            _ => {
                if let Some(inner) = name.strip_prefix("list<").and_then(|n| n.strip_suffix('>')) {
                    return Some(PropertyType::List(inner.to_string()));
                }
                if name.starts_with(|c: char| c.is_uppercase()) {
                    return Some(PropertyType::Object(name.to_string()));
                }
                return None;
            }
        };
        Some(ty)
    }

    /// The value a property of this type starts with.
    pub fn default_value(&self) -> Value {
        match self {
            PropertyType::Int | PropertyType::Real => Value::Number(0.0),
            PropertyType::Bool => Value::Boolean(false),
            PropertyType::String => Value::String(String::new()),
            PropertyType::Url => Value::Url(String::new()),
            PropertyType::Var => Value::Undefined,
            PropertyType::Point => Value::Point(Point::default()),
            PropertyType::Size => Value::Size(Size::default()),
            PropertyType::Object(_) | PropertyType::Component => Value::Null,
            PropertyType::List(_) => Value::List(Vec::new()),
        }
    }

    /// Converts `value` for storage in a property of this type.
    ///
    /// Object references are only checked for kind here; the write path
    /// checks them against the target layout.
    pub fn coerce(&self, value: Value) -> Result<Value, String> {
        let failed = |value: &Value, ty: &PropertyType| {
            format!("Unable to assign {} to {}", value.type_name(), ty)
        };
        match (self, value) {
            (PropertyType::Var, value) => Ok(value),
            (PropertyType::Int, Value::Number(n)) if n.is_finite() => Ok(Value::Number(n.trunc())),
            (PropertyType::Real, Value::Number(n)) => Ok(Value::Number(n)),
            (PropertyType::Int | PropertyType::Real, Value::Boolean(b)) => {
                Ok(Value::Number(if b { 1.0 } else { 0.0 }))
            }
            (
                PropertyType::Bool,
                value @ (Value::Boolean(_) | Value::Number(_) | Value::String(_)),
            ) => Ok(Value::Boolean(value.to_boolean())),
            (PropertyType::String, Value::String(s) | Value::Url(s)) => Ok(Value::String(s)),
            (PropertyType::String, value @ (Value::Number(_) | Value::Boolean(_))) => {
                Ok(Value::String(value.to_string()))
            }
            (PropertyType::Url, Value::String(s) | Value::Url(s)) => Ok(Value::Url(s)),
            (PropertyType::Point, Value::Point(p)) => Ok(Value::Point(p)),
            (PropertyType::Point, Value::String(s)) => Point::parse(&s)
                .map(Value::Point)
                .ok_or_else(|| failed(&Value::String(s), self)),
            (PropertyType::Size, Value::Size(size)) => Ok(Value::Size(size)),
            (PropertyType::Size, Value::String(s)) => Size::parse(&s)
                .map(Value::Size)
                .ok_or_else(|| failed(&Value::String(s), self)),
            (
                PropertyType::Object(_) | PropertyType::Component,
                value @ (Value::Object(_) | Value::Null),
            ) => Ok(value),
            (PropertyType::Object(_) | PropertyType::Component, Value::Undefined) => Ok(Value::Null),
            (PropertyType::List(_), Value::List(items)) => {
                match items.iter().find(|v| v.as_object().is_none()) {
                    Some(bad) => Err(failed(bad, self)),
                    None => Ok(Value::List(items)),
                }
            }
            (PropertyType::List(_), Value::Object(id)) => Ok(Value::List(vec![Value::Object(id)])),
            (PropertyType::List(_), Value::Null | Value::Undefined) => Ok(Value::List(Vec::new())),
            (ty, value) => Err(failed(&value, ty)),
        }
    }

    /// Name used for this type in "expected" compile errors.
    pub fn expected_name(&self) -> String {
        match self {
            PropertyType::Int => "int".to_string(),
            PropertyType::Real => "number".to_string(),
            PropertyType::Bool => "boolean".to_string(),
            PropertyType::String => "string".to_string(),
            PropertyType::Url => "url".to_string(),
            PropertyType::Var => "var".to_string(),
            PropertyType::Point => "point".to_string(),
            PropertyType::Size => "size".to_string(),
            PropertyType::Object(name) | PropertyType::List(name) => name.clone(),
            PropertyType::Component => "Component".to_string(),
        }
    }

    /// Whether sub-fields of this type can be addressed (`offset.x`).
    pub fn is_value_type(&self) -> bool {
        matches!(self, PropertyType::Point | PropertyType::Size)
    }

    /// Index of a value-type sub-field.
    pub fn sub_property(&self, name: &str) -> Option<u8> {
        match (self, name) {
            (PropertyType::Point, "x") | (PropertyType::Size, "width") => Some(0),
            (PropertyType::Point, "y") | (PropertyType::Size, "height") => Some(1),
            _ => None,
        }
    }

    /// Name of a value-type sub-field.
    pub fn sub_property_name(&self, index: u8) -> Option<&'static str> {
        match (self, index) {
            (PropertyType::Point, 0) => Some("x"),
            (PropertyType::Point, 1) => Some("y"),
            (PropertyType::Size, 0) => Some("width"),
            (PropertyType::Size, 1) => Some("height"),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyType::Int => write!(f, "int"),
            PropertyType::Real => write!(f, "real"),
            PropertyType::Bool => write!(f, "bool"),
            PropertyType::String => write!(f, "string"),
            PropertyType::Url => write!(f, "url"),
            PropertyType::Var => write!(f, "var"),
            PropertyType::Point => write!(f, "point"),
            PropertyType::Size => write!(f, "size"),
            PropertyType::Object(name) => write!(f, "{}", name),
            PropertyType::List(name) => write!(f, "list<{}>", name),
            PropertyType::Component => write!(f, "Component"),
        }
    }
}

/// One property slot of a layout.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    /// Property name
    pub name: String,
    /// Declared type
    pub ty: PropertyType,
    /// Initial value
    pub default: Value,
    /// Writes from documents and scripts are rejected
    pub readonly: bool,
    /// Assignments are compiled into the object's deferred group
    pub deferred: bool,
    /// Type of a sub-object created together with the owner (`border`)
    pub grouped: Option<Arc<NativeType>>,
    /// Declared by the document rather than the native type
    pub dynamic: bool,
}

impl PropertyDescriptor {
    /// Creates a plain property with the type's default value.
    pub fn new(name: impl Into<String>, ty: PropertyType) -> Self {
        Self {
            name: name.into(),
            default: ty.default_value(),
            ty,
            readonly: false,
            deferred: false,
            grouped: None,
            dynamic: false,
        }
    }
}

/// A declared signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalDescriptor {
    /// Signal name
    pub name: String,
    /// Parameter names
    pub parameters: Vec<String>,
}

/// Maps property names of one object type to stable indices.
///
/// Layouts of native types are shared by every instance; documents that
/// declare dynamic properties get a derived layout stored in their compiled
/// unit.
#[derive(Debug, Clone)]
pub struct PropertyLayout {
    type_name: String,
    lineage: Vec<String>,
    properties: Vec<PropertyDescriptor>,
    by_name: FxHashMap<String, u16>,
    default_property: Option<u16>,
    signals: Vec<SignalDescriptor>,
}

impl PropertyLayout {
    /// Creates an empty layout.
    pub fn new(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            lineage: vec![type_name.clone()],
            type_name,
            properties: Vec::new(),
            by_name: FxHashMap::default(),
            default_property: None,
            signals: Vec::new(),
        }
    }

    /// Creates a layout for `type_name` that inherits every slot of `self`.
    pub fn derive(&self, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        let mut derived = self.clone();
        derived.lineage.insert(0, type_name.clone());
        derived.type_name = type_name;
        derived
    }

    /// Appends a property, or replaces an inherited one with the same name.
    pub fn add_property(&mut self, descriptor: PropertyDescriptor) -> u16 {
        if let Some(&index) = self.by_name.get(&descriptor.name) {
            self.properties[index as usize] = descriptor;
            return index;
        }
        let index = self.properties.len() as u16;
        self.by_name.insert(descriptor.name.clone(), index);
        self.properties.push(descriptor);
        index
    }

    /// Marks the default property.
    pub fn set_default_property(&mut self, index: u16) {
        self.default_property = Some(index);
    }

    /// Adds a signal.
    pub fn add_signal(&mut self, signal: SignalDescriptor) {
        self.signals.push(signal);
    }

    /// Name of the type this layout describes.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Whether this layout is `type_name` or inherits from it.
    pub fn is_a(&self, type_name: &str) -> bool {
        self.lineage.iter().any(|t| t == type_name)
    }

    /// Index of a property by name.
    pub fn index_of(&self, name: &str) -> Option<u16> {
        self.by_name.get(name).copied()
    }

    /// Descriptor for an index.
    pub fn property(&self, index: u16) -> Option<&PropertyDescriptor> {
        self.properties.get(index as usize)
    }

    /// All descriptors in index order.
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    /// Number of property slots.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the layout has no properties.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Index of the default property.
    pub fn default_property(&self) -> Option<u16> {
        self.default_property
    }

    /// Looks up a signal.
    pub fn signal(&self, name: &str) -> Option<&SignalDescriptor> {
        self.signals.iter().find(|s| s.name == name)
    }
}

/// Construction protocol for native types.
///
/// `class_begin` runs as soon as the object is created, before any of its
/// properties are assigned. `component_complete` runs in the completion phase
/// after every binding of the construction has been evaluated once.
pub trait ConstructionHooks: Send + Sync {
    /// Called right after the object is allocated.
    fn class_begin(&self, _engine: &mut Engine, _object: ObjectId) {}

    /// Called once construction of the whole tree has finished.
    fn component_complete(&self, _engine: &mut Engine, _object: ObjectId) {}
}

/// A type provided by the host rather than by a document.
pub struct NativeType {
    name: String,
    module: String,
    version: Version,
    layout: Arc<PropertyLayout>,
    hooks: Option<Arc<dyn ConstructionHooks>>,
    creatable: bool,
}

impl fmt::Debug for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeType")
            .field("name", &self.name)
            .field("module", &self.module)
            .field("version", &self.version)
            .field("properties", &self.layout.len())
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

impl NativeType {
    /// Starts building a type.
    pub fn builder(name: impl Into<String>) -> NativeTypeBuilder {
        let name = name.into();
        NativeTypeBuilder {
            layout: PropertyLayout::new(name.clone()),
            name,
            module: String::new(),
            version: Version::new(1, 0),
            hooks: None,
            creatable: true,
        }
    }

    /// Type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module URI the type is registered in.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Version the type was introduced in.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Property layout shared by all instances.
    pub fn layout(&self) -> &Arc<PropertyLayout> {
        &self.layout
    }

    /// Construction hooks, if the type takes part in the protocol.
    pub fn hooks(&self) -> Option<&Arc<dyn ConstructionHooks>> {
        self.hooks.as_ref()
    }

    /// Whether documents may instantiate the type.
    pub fn is_creatable(&self) -> bool {
        self.creatable
    }
}

/// Builder for [`NativeType`].
pub struct NativeTypeBuilder {
    name: String,
    module: String,
    version: Version,
    layout: PropertyLayout,
    hooks: Option<Arc<dyn ConstructionHooks>>,
    creatable: bool,
}

impl NativeTypeBuilder {
    /// Sets the module and version.
    pub fn module(mut self, uri: impl Into<String>, major: u8, minor: u8) -> Self {
        self.module = uri.into();
        self.version = Version::new(major, minor);
        self
    }

    /// Inherits every property of `base`.
    pub fn extends(mut self, base: &NativeType) -> Self {
        self.layout = base.layout.derive(self.name.clone());
        if self.hooks.is_none() {
            self.hooks = base.hooks.clone();
        }
        self
    }

    /// Adds a property with the type's default value.
    pub fn property(mut self, name: &str, ty: PropertyType) -> Self {
        self.layout.add_property(PropertyDescriptor::new(name, ty));
        self
    }

    /// Adds a property with an explicit default value.
    pub fn property_with_default(mut self, name: &str, ty: PropertyType, default: Value) -> Self {
        let mut descriptor = PropertyDescriptor::new(name, ty);
        descriptor.default = default;
        self.layout.add_property(descriptor);
        self
    }

    /// Adds a read-only property.
    pub fn readonly_property(mut self, name: &str, ty: PropertyType) -> Self {
        let mut descriptor = PropertyDescriptor::new(name, ty);
        descriptor.readonly = true;
        self.layout.add_property(descriptor);
        self
    }

    /// Adds an object property holding an automatically created sub-object.
    pub fn grouped_property(mut self, name: &str, ty: &Arc<NativeType>) -> Self {
        let mut descriptor = PropertyDescriptor::new(name, PropertyType::Object(ty.name.clone()));
        descriptor.grouped = Some(ty.clone());
        descriptor.readonly = true;
        self.layout.add_property(descriptor);
        self
    }

    /// Marks an existing property as deferred.
    pub fn deferred(mut self, name: &str) -> Self {
        if let Some(index) = self.layout.index_of(name) {
            let mut descriptor = self.layout.properties[index as usize].clone();
            descriptor.deferred = true;
            self.layout.properties[index as usize] = descriptor;
        }
        self
    }

    /// Marks an existing property as the default property.
    pub fn default_property(mut self, name: &str) -> Self {
        if let Some(index) = self.layout.index_of(name) {
            self.layout.set_default_property(index);
        }
        self
    }

    /// Declares a signal.
    pub fn signal(mut self, name: &str, parameters: &[&str]) -> Self {
        self.layout.add_signal(SignalDescriptor {
            name: name.to_string(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
        });
        self
    }

    /// Attaches construction hooks.
    pub fn hooks(mut self, hooks: Arc<dyn ConstructionHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Prevents documents from instantiating the type directly.
    pub fn uncreatable(mut self) -> Self {
        self.creatable = false;
        self
    }

    /// Finishes the type.
    pub fn build(self) -> NativeType {
        NativeType {
            name: self.name,
            module: self.module,
            version: self.version,
            layout: Arc::new(self.layout),
            hooks: self.hooks,
            creatable: self.creatable,
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    /// module URI -> registered versions
    modules: FxHashMap<String, Vec<Version>>,
    /// (module, name) -> versions of the type, ascending
    types: FxHashMap<(String, String), Vec<Arc<NativeType>>>,
    /// name -> most recently registered type with that name
    by_name: FxHashMap<String, Arc<NativeType>>,
}

/// All native types known to an engine, grouped by module.
#[derive(Default)]
pub struct TypeRegistry {
    inner: RwLock<RegistryInner>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("TypeRegistry")
            .field("modules", &inner.modules.keys().collect::<Vec<_>>())
            .field("types", &inner.by_name.len())
            .finish()
    }
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type, returning the shared descriptor.
    pub fn register(&self, ty: NativeType) -> Arc<NativeType> {
        let ty = Arc::new(ty);
        let mut inner = self.inner.write();
        let versions = inner.modules.entry(ty.module.clone()).or_default();
        if !versions.contains(&ty.version) {
            versions.push(ty.version);
            versions.sort();
        }
        let entry = inner
            .types
            .entry((ty.module.clone(), ty.name.clone()))
            .or_default();
        entry.push(ty.clone());
        entry.sort_by_key(|t| t.version);
        inner.by_name.insert(ty.name.clone(), ty.clone());
        ty
    }

    /// Whether any type is registered under `uri`.
    pub fn is_module_installed(&self, uri: &str) -> bool {
        self.inner.read().modules.contains_key(uri)
    }

    /// Whether `uri` provides `version` (same major, minor at least one registered).
    pub fn is_module_version_installed(&self, uri: &str, version: Version) -> bool {
        self.inner.read().modules.get(uri).is_some_and(|versions| {
            versions
                .iter()
                .any(|v| v.major == version.major && v.minor <= version.minor)
        })
    }

    /// Resolves `name` inside module `uri` at `version`.
    pub fn resolve(&self, uri: &str, version: Version, name: &str) -> Option<Arc<NativeType>> {
        let inner = self.inner.read();
        inner
            .types
            .get(&(uri.to_string(), name.to_string()))?
            .iter()
            .rev()
            .find(|t| t.version.major == version.major && t.version.minor <= version.minor)
            .cloned()
    }

    /// Finds a type by name regardless of module.
    pub fn type_named(&self, name: &str) -> Option<Arc<NativeType>> {
        self.inner.read().by_name.get(name).cloned()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.inner.read().by_name.len()
    }

    /// Whether no type has been registered.
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_name.is_empty()
    }

    /// Drops every registration.
    pub fn clear(&self) {
        *self.inner.write() = RegistryInner::default();
    }
}
