// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Expression evaluation.
//!
//! Bindings, handlers and script functions are evaluated by an
//! [`ExpressionEvaluator`] against a [`Scope`]. The scope is the only way an
//! expression reaches the object tree: identifier lookup, property reads and
//! writes and signal emission all go through it, which is what lets the
//! binding engine record dependencies.

pub mod builtins;
mod interpreter;
mod script;

pub use builtins::Builtin;
pub use interpreter::TreeWalker;
pub use script::ScriptInstance;

use crate::ast::{Expression, Statement};
use crate::error::EvalError;
use crate::runtime::{ObjectId, Value};
use std::fmt;
use std::sync::Arc;

/// Signature of host functions registered with the engine.
pub type NativeFunction = dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync;

/// Something that can be called from an expression.
pub enum Callable {
    /// A builtin such as `Math.max`
    Builtin(Builtin),
    /// A host function
    Native {
        /// Name used in diagnostics
        name: String,
        /// Implementation
        function: Arc<NativeFunction>,
    },
    /// A function declared in an imported script
    Script {
        /// Declaring script
        script: Arc<ScriptInstance>,
        /// Index into the script's function table
        index: usize,
    },
    /// A signal of an object; calling it emits the signal
    Signal {
        /// Emitting object
        object: ObjectId,
        /// Signal name
        name: String,
    },
}

impl Callable {
    /// Name of the callable.
    pub fn name(&self) -> &str {
        match self {
            Callable::Builtin(builtin) => builtin.name(),
            Callable::Native { name, .. } => name,
            Callable::Script { script, index } => script.function_name(*index),
            Callable::Signal { name, .. } => name,
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Builtin(b) => write!(f, "Builtin({:?})", b),
            Callable::Native { name, .. } => write!(f, "Native({})", name),
            Callable::Script { script, index } => {
                write!(f, "Script({}#{})", script.url(), index)
            }
            Callable::Signal { object, name } => write!(f, "Signal({}.{})", object, name),
        }
    }
}

/// A namespace value.
#[derive(Debug, Clone)]
pub enum Namespace {
    /// The `Math` object
    Math,
    /// An imported script
    Script(Arc<ScriptInstance>),
}

impl Namespace {
    /// Name of the namespace.
    pub fn name(&self) -> &str {
        match self {
            Namespace::Math => "Math",
            Namespace::Script(script) => script.url(),
        }
    }
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Namespace::Math, Namespace::Math) => true,
            (Namespace::Script(a), Namespace::Script(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Body of a compiled function.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    /// Single expression; its value is the result
    Expression(Expression),
    /// Statement block; the result is the value of `return`
    Block(Vec<Statement>),
}

/// A binding expression or handler body ready for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    /// Property or handler name, for diagnostics
    pub name: String,
    /// Parameter names (signal handlers)
    pub parameters: Vec<String>,
    /// Body
    pub body: FunctionBody,
    /// Original text
    pub source: String,
    /// Line of the body in its document
    pub line: u32,
    /// Column of the body in its document
    pub column: u32,
}

impl CompiledFunction {
    /// Wraps a single expression.
    pub fn expression(name: impl Into<String>, expression: Expression, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            body: FunctionBody::Expression(expression),
            source: source.into(),
            line: 0,
            column: 0,
        }
    }

    /// Sets the location.
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = line;
        self.column = column;
        self
    }
}

/// Name resolution and object access for evaluated code.
pub trait Scope {
    /// Resolves a free identifier.
    fn lookup(&mut self, name: &str) -> Result<Value, EvalError>;

    /// Assigns to a free identifier.
    fn assign(&mut self, name: &str, value: Value) -> Result<(), EvalError>;

    /// Reads a named member of an object.
    fn get_property(&mut self, object: ObjectId, name: &str) -> Result<Value, EvalError>;

    /// Writes a named member of an object.
    fn set_property(&mut self, object: ObjectId, name: &str, value: Value) -> Result<(), EvalError>;

    /// Emits a signal.
    fn emit_signal(&mut self, object: ObjectId, name: &str, args: Vec<Value>) -> Result<(), EvalError>;
}

/// A scope with no objects and only builtins, used for script initializers.
#[derive(Debug, Default)]
pub struct NullScope;

impl Scope for NullScope {
    fn lookup(&mut self, name: &str) -> Result<Value, EvalError> {
        builtins::global(name).ok_or_else(|| EvalError::reference_error(name))
    }

    fn assign(&mut self, name: &str, _value: Value) -> Result<(), EvalError> {
        Err(EvalError::reference_error(name))
    }

    fn get_property(&mut self, _object: ObjectId, _name: &str) -> Result<Value, EvalError> {
        Ok(Value::Undefined)
    }

    fn set_property(&mut self, object: ObjectId, name: &str, _value: Value) -> Result<(), EvalError> {
        Err(EvalError::type_error(format!(
            "Cannot assign to {} of {}",
            name, object
        )))
    }

    fn emit_signal(&mut self, _object: ObjectId, name: &str, _args: Vec<Value>) -> Result<(), EvalError> {
        Err(EvalError::type_error(format!("{} is not a function", name)))
    }
}

/// Runs compiled functions.
pub trait ExpressionEvaluator {
    /// Runs `function` with `arguments` bound to its parameters.
    fn run(
        &mut self,
        function: &CompiledFunction,
        arguments: &[Value],
        scope: &mut dyn Scope,
    ) -> Result<Value, EvalError>;
}
