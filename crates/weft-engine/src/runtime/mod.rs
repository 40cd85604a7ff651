// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Runtime data structures: values, types, objects and contexts.

pub mod arena;
pub mod context;
pub mod object;
pub mod types;
pub mod value;

pub use context::{ContextData, ContextId, ContextTree};
pub use object::{ObjectData, ObjectId, ObjectTree, PropertyIndex};
pub use types::{
    ConstructionHooks, NativeType, NativeTypeBuilder, PropertyDescriptor, PropertyLayout,
    PropertyType, SignalDescriptor, TypeRegistry,
};
pub use value::{Point, Size, Value};
