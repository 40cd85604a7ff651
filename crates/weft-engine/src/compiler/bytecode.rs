// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Compiled unit and instruction definitions.

use crate::expr::{CompiledFunction, ScriptInstance};
use crate::runtime::value::format_number;
use crate::runtime::{NativeType, Point, PropertyIndex, PropertyLayout, Size};
use std::fmt::{self, Write};
use std::sync::Arc;

/// A single VM instruction.
///
/// Every object is created by `CreateObject`, `CreateComponentObject` or
/// `CreateComponent`, which push it onto the object stack, and is closed by
/// `CompleteObject`. `StoreObject`/`AppendObject` then pop it into a property
/// of the object below.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Start of a unit; sizes let the VM reserve space
    Init {
        /// Number of objects the unit creates
        objects: u32,
        /// Number of bindings the unit registers
        bindings: u32,
    },
    /// Create an instance of a native type
    CreateObject {
        /// Index into the type table
        type_index: u32,
        /// Index into the layout table
        layout: u32,
        /// Source line
        line: u32,
        /// Source column
        column: u32,
    },
    /// Create an instance of a document type by running its unit
    CreateComponentObject {
        /// Index into the type table
        type_index: u32,
        /// Layout extending the unit's root layout, when the use site declares properties
        layout: Option<u32>,
        /// Properties the use site assigns, whose inner bindings are skipped
        skip: Option<u32>,
        /// Source line
        line: u32,
        /// Source column
        column: u32,
    },
    /// Create a `Component` object holding an inline component
    CreateComponent {
        /// Index into the component table
        unit: u32,
        /// Source line
        line: u32,
        /// Source column
        column: u32,
    },
    /// Run the `class_begin` hook of the new object
    BeginObject,
    /// Register the current object under an id
    SetId {
        /// String pool index
        name: u32,
    },
    /// Store an integer literal
    StoreInteger {
        /// Target property
        property: PropertyIndex,
        /// Value
        value: i32,
    },
    /// Store a number literal
    StoreDouble {
        /// Target property
        property: PropertyIndex,
        /// Value
        value: f64,
    },
    /// Store a boolean literal
    StoreBool {
        /// Target property
        property: PropertyIndex,
        /// Value
        value: bool,
    },
    /// Store a string literal
    StoreString {
        /// Target property
        property: PropertyIndex,
        /// String pool index
        value: u32,
    },
    /// Store a resolved URL
    StoreUrl {
        /// Target property
        property: PropertyIndex,
        /// URL pool index
        value: u32,
    },
    /// Store a point literal
    StorePoint {
        /// Target property
        property: PropertyIndex,
        /// Data pool offset
        data: u32,
    },
    /// Store a size literal
    StoreSize {
        /// Target property
        property: PropertyIndex,
        /// Data pool offset
        data: u32,
    },
    /// Store null
    StoreNull {
        /// Target property
        property: PropertyIndex,
    },
    /// Register a binding, enabled during completion
    StoreBinding {
        /// Target property
        property: PropertyIndex,
        /// Function table index
        function: u32,
    },
    /// Register an `on<Property>Changed` handler
    StoreChangeHandler {
        /// Watched property
        property: u16,
        /// Function table index
        function: u32,
    },
    /// Register an `on<Signal>` handler
    StoreSignalHandler {
        /// String pool index of the signal name
        signal: u32,
        /// Function table index
        function: u32,
    },
    /// Register a `Component.onCompleted` handler
    StoreCompletionHandler {
        /// Function table index
        function: u32,
    },
    /// Pop the top object into an object property of the new top
    StoreObject {
        /// Target property
        property: u16,
    },
    /// Pop the top object and append it to a list property of the new top
    AppendObject {
        /// Target property
        property: u16,
    },
    /// Push the grouped sub-object held by a property
    FetchObject {
        /// Grouped property
        property: u16,
        /// Source line
        line: u32,
        /// Source column
        column: u32,
    },
    /// Pop a pushed grouped sub-object
    PopFetchedObject,
    /// Skip the next `count` instructions, recording them for later replay
    Defer {
        /// Length of the skipped range
        count: u32,
    },
    /// Close the object scope opened by the matching create instruction
    CompleteObject,
    /// End of the unit
    Done,
}

/// Entry of a unit's type table.
#[derive(Debug, Clone)]
pub enum TypeRef {
    /// A host type
    Native(Arc<NativeType>),
    /// A type defined by another document
    Unit(Arc<CompiledUnit>),
}

impl TypeRef {
    /// Name of the type.
    pub fn name(&self) -> &str {
        match self {
            TypeRef::Native(native) => native.name(),
            TypeRef::Unit(unit) => unit.root_layout().type_name(),
        }
    }

    /// Layout of instances.
    pub fn layout(&self) -> &Arc<PropertyLayout> {
        match self {
            TypeRef::Native(native) => native.layout(),
            TypeRef::Unit(unit) => unit.root_layout(),
        }
    }
}

/// The immutable result of compiling one document.
#[derive(Debug)]
pub struct CompiledUnit {
    pub(crate) url: String,
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) strings: Vec<String>,
    pub(crate) data: Vec<u8>,
    pub(crate) urls: Vec<String>,
    pub(crate) types: Vec<TypeRef>,
    pub(crate) layouts: Vec<Arc<PropertyLayout>>,
    pub(crate) functions: Vec<Arc<CompiledFunction>>,
    pub(crate) scripts: Vec<(String, Arc<ScriptInstance>)>,
    pub(crate) skip_lists: Vec<Vec<u16>>,
    pub(crate) components: Vec<Arc<CompiledUnit>>,
    pub(crate) root_layout: Arc<PropertyLayout>,
}

impl CompiledUnit {
    /// Document the unit was compiled from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The instruction stream.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// String pool entry.
    pub fn string(&self, index: u32) -> &str {
        self.strings.get(index as usize).map(String::as_str).unwrap_or("")
    }

    /// URL pool entry.
    pub fn url_at(&self, index: u32) -> &str {
        self.urls.get(index as usize).map(String::as_str).unwrap_or("")
    }

    fn f64_at(&self, offset: usize) -> f64 {
        self.data
            .get(offset..offset + 8)
            .and_then(|bytes| bytes.try_into().ok())
            .map(f64::from_le_bytes)
            .unwrap_or(0.0)
    }

    /// Point stored at `offset` in the data pool.
    pub fn point_at(&self, offset: u32) -> Point {
        let offset = offset as usize;
        Point {
            x: self.f64_at(offset),
            y: self.f64_at(offset + 8),
        }
    }

    /// Size stored at `offset` in the data pool.
    pub fn size_at(&self, offset: u32) -> Size {
        let offset = offset as usize;
        Size {
            width: self.f64_at(offset),
            height: self.f64_at(offset + 8),
        }
    }

    /// Type table.
    pub fn types(&self) -> &[TypeRef] {
        &self.types
    }

    /// Per-object layouts.
    pub fn layouts(&self) -> &[Arc<PropertyLayout>] {
        &self.layouts
    }

    /// Binding and handler bodies.
    pub fn functions(&self) -> &[Arc<CompiledFunction>] {
        &self.functions
    }

    /// Imported scripts by qualifier.
    pub fn scripts(&self) -> &[(String, Arc<ScriptInstance>)] {
        &self.scripts
    }

    /// Inline components.
    pub fn components(&self) -> &[Arc<CompiledUnit>] {
        &self.components
    }

    /// Layout of the root object.
    pub fn root_layout(&self) -> &Arc<PropertyLayout> {
        &self.root_layout
    }

    /// Number of bindings registered when the unit runs.
    pub fn binding_count(&self) -> usize {
        self.instructions
            .iter()
            .filter(|i| matches!(i, Instruction::StoreBinding { .. }))
            .count()
    }

    /// Renders a textual listing of the unit and its inline components.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        self.write_listing(&mut out, "").ok();
        out
    }

    fn write_listing(&self, out: &mut String, indent: &str) -> fmt::Result {
        writeln!(out, "{}; unit {}", indent, self.url)?;
        writeln!(
            out,
            "{}; {} instructions, {} strings, {} data bytes, {} urls, {} types, {} functions",
            indent,
            self.instructions.len(),
            self.strings.len(),
            self.data.len(),
            self.urls.len(),
            self.types.len(),
            self.functions.len()
        )?;

        // Layouts of the objects on the stack, to name property indices.
        let mut stack: Vec<Arc<PropertyLayout>> = Vec::new();
        for (pc, instruction) in self.instructions.iter().enumerate() {
            let text = self.describe(instruction, &mut stack);
            writeln!(out, "{}{:>4}  {}", indent, pc, text)?;
        }
        for (index, component) in self.components.iter().enumerate() {
            writeln!(out, "{}; component #{}", indent, index)?;
            component.write_listing(out, &format!("{}    ", indent))?;
        }
        Ok(())
    }

    fn describe(&self, instruction: &Instruction, stack: &mut Vec<Arc<PropertyLayout>>) -> String {
        let name = |stack: &[Arc<PropertyLayout>], property: PropertyIndex| {
            let layout = stack.last();
            let descriptor = layout.and_then(|l| l.property(property.core()));
            match (descriptor, property.sub()) {
                (Some(d), Some(sub)) => format!(
                    "{}.{}",
                    d.name,
                    d.ty.sub_property_name(sub).unwrap_or("?")
                ),
                (Some(d), None) => d.name.clone(),
                (None, _) => format!("#{}", property),
            }
        };
        let function = |index: u32| {
            self.functions
                .get(index as usize)
                .map(|f| f.source.replace('\n', " "))
                .unwrap_or_default()
        };
        match instruction {
            Instruction::Init { objects, bindings } => {
                format!("Init                 objects={} bindings={}", objects, bindings)
            }
            Instruction::CreateObject {
                type_index,
                layout,
                line,
                column,
            } => {
                if let Some(layout) = self.layouts.get(*layout as usize) {
                    stack.push(layout.clone());
                }
                let ty = self.types.get(*type_index as usize).map(TypeRef::name).unwrap_or("?");
                format!("CreateObject         {} layout={} ({}:{})", ty, layout, line, column)
            }
            Instruction::CreateComponentObject {
                type_index,
                layout,
                skip,
                line,
                column,
            } => {
                let ty = self.types.get(*type_index as usize);
                let object_layout = layout
                    .and_then(|l| self.layouts.get(l as usize).cloned())
                    .or_else(|| ty.map(|t| t.layout().clone()));
                if let Some(object_layout) = object_layout {
                    stack.push(object_layout);
                }
                let skipped = skip
                    .and_then(|s| self.skip_lists.get(s as usize))
                    .map(|list| format!(" skip={:?}", list))
                    .unwrap_or_default();
                format!(
                    "CreateComponentObject {}{} ({}:{})",
                    ty.map(TypeRef::name).unwrap_or("?"),
                    skipped,
                    line,
                    column
                )
            }
            Instruction::CreateComponent { unit, line, column } => {
                let component = self
                    .types
                    .iter()
                    .find(|t| t.name() == "Component")
                    .map(|t| t.layout().clone())
                    .unwrap_or_else(|| Arc::new(PropertyLayout::new("Component")));
                stack.push(component);
                format!("CreateComponent      #{} ({}:{})", unit, line, column)
            }
            Instruction::BeginObject => "BeginObject".to_string(),
            Instruction::SetId { name } => format!("SetId                {:?}", self.string(*name)),
            Instruction::StoreInteger { property, value } => {
                format!("StoreInteger         {} = {}", name(stack, *property), value)
            }
            Instruction::StoreDouble { property, value } => {
                format!("StoreDouble          {} = {}", name(stack, *property), format_number(*value))
            }
            Instruction::StoreBool { property, value } => {
                format!("StoreBool            {} = {}", name(stack, *property), value)
            }
            Instruction::StoreString { property, value } => format!(
                "StoreString          {} = {:?}",
                name(stack, *property),
                self.string(*value)
            ),
            Instruction::StoreUrl { property, value } => format!(
                "StoreUrl             {} = {}",
                name(stack, *property),
                self.url_at(*value)
            ),
            Instruction::StorePoint { property, data } => {
                let p = self.point_at(*data);
                format!(
                    "StorePoint           {} = {},{}",
                    name(stack, *property),
                    format_number(p.x),
                    format_number(p.y)
                )
            }
            Instruction::StoreSize { property, data } => {
                let s = self.size_at(*data);
                format!(
                    "StoreSize            {} = {}x{}",
                    name(stack, *property),
                    format_number(s.width),
                    format_number(s.height)
                )
            }
            Instruction::StoreNull { property } => {
                format!("StoreNull            {}", name(stack, *property))
            }
            Instruction::StoreBinding { property, function: f } => format!(
                "StoreBinding         {} <- #{} `{}`",
                name(stack, *property),
                f,
                function(*f)
            ),
            Instruction::StoreChangeHandler { property, function: f } => format!(
                "StoreChangeHandler   {} <- #{} `{}`",
                name(stack, PropertyIndex::new(*property)),
                f,
                function(*f)
            ),
            Instruction::StoreSignalHandler { signal, function: f } => format!(
                "StoreSignalHandler   {} <- #{} `{}`",
                self.string(*signal),
                f,
                function(*f)
            ),
            Instruction::StoreCompletionHandler { function: f } => {
                format!("StoreCompletionHandler #{} `{}`", f, function(*f))
            }
            Instruction::StoreObject { property } => {
                stack.pop();
                format!("StoreObject          {}", name(stack, PropertyIndex::new(*property)))
            }
            Instruction::AppendObject { property } => {
                stack.pop();
                format!("AppendObject         {}", name(stack, PropertyIndex::new(*property)))
            }
            Instruction::FetchObject { property, .. } => {
                let text = format!("FetchObject          {}", name(stack, PropertyIndex::new(*property)));
                let grouped = stack
                    .last()
                    .and_then(|l| l.property(*property))
                    .and_then(|d| d.grouped.as_ref())
                    .map(|g| g.layout().clone());
                if let Some(grouped) = grouped {
                    stack.push(grouped);
                }
                text
            }
            Instruction::PopFetchedObject => {
                stack.pop();
                "PopFetchedObject".to_string()
            }
            Instruction::Defer { count } => format!("Defer                {}", count),
            Instruction::CompleteObject => "CompleteObject".to_string(),
            Instruction::Done => "Done".to_string(),
        }
    }
}
