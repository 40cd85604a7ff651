// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Property and expression value representation.

use super::object::ObjectId;
use crate::expr::{Callable, Namespace};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// A two-dimensional point value type.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

/// A two-dimensional size value type.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Size {
    /// Horizontal extent
    pub width: f64,
    /// Vertical extent
    pub height: f64,
}

impl Point {
    /// Parses `"x,y"`.
    pub fn parse(text: &str) -> Option<Point> {
        let (x, y) = text.split_once(',')?;
        Some(Point {
            x: x.trim().parse().ok()?,
            y: y.trim().parse().ok()?,
        })
    }
}

impl Size {
    /// Parses `"WxH"`.
    pub fn parse(text: &str) -> Option<Size> {
        let (w, h) = text.split_once('x')?;
        Some(Size {
            width: w.trim().parse().ok()?,
            height: h.trim().parse().ok()?,
        })
    }
}

/// A value held by a property or produced by an expression.
///
/// Values are `Send + Sync` so compiled units holding constants and script
/// namespaces can be shared between the loader and the consumer thread.
#[derive(Debug, Clone)]
pub enum Value {
    /// undefined
    Undefined,
    /// null
    Null,
    /// Boolean value
    Boolean(bool),
    /// Number (IEEE 754 double); `int` properties hold whole numbers
    Number(f64),
    /// String
    String(String),
    /// Resolved URL
    Url(String),
    /// Point value type
    Point(Point),
    /// Size value type
    Size(Size),
    /// Reference to an object in the object tree
    Object(ObjectId),
    /// List of values (object lists, arrays)
    List(Vec<Value>),
    /// Callable function
    Function(Arc<Callable>),
    /// Imported script or builtin namespace
    Namespace(Namespace),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Url(a), Value::Url(b)) => a == b,
            (Value::Point(a), Value::Point(b)) => a == b,
            (Value::Size(a), Value::Size(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Namespace(a), Value::Namespace(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Returns true if this value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Returns true if this value is null or undefined.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Returns the object handle, if this is an object reference.
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the number, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string slice, if this is a string or URL.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Url(s) => Some(s),
            _ => None,
        }
    }

    /// Converts the value to a boolean.
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) | Value::Url(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Converts the value to a number.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    /// Converts the value to its display string.
    pub fn to_display_string(&self) -> String {
        self.to_string()
    }

    /// The name used for this value's type in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "[undefined]",
            Value::Null => "null",
            Value::Boolean(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Url(_) => "url",
            Value::Point(_) => "point",
            Value::Size(_) => "size",
            Value::Object(_) => "object",
            Value::List(_) => "list",
            Value::Function(_) => "function",
            Value::Namespace(_) => "namespace",
        }
    }

    /// The result of `typeof value`.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) | Value::Url(_) => "string",
            Value::Function(_) => "function",
            _ => "object",
        }
    }
}

/// Formats a number the way scripts print it (`5`, not `5.0`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) | Value::Url(s) => write!(f, "{}", s),
            Value::Point(p) => write!(f, "Point({}, {})", format_number(p.x), format_number(p.y)),
            Value::Size(s) => write!(
                f,
                "Size({}, {})",
                format_number(s.width),
                format_number(s.height)
            ),
            Value::Object(id) => write!(f, "[object {}]", id),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
            Value::Function(callable) => write!(f, "function {}() {{ [code] }}", callable.name()),
            Value::Namespace(ns) => write!(f, "[namespace {}]", ns.name()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl Value {
    /// Reads field `sub` of a point or size; `undefined` for anything else.
    pub fn field(&self, sub: u8) -> Value {
        match (self, sub) {
            (Value::Point(p), 0) => Value::Number(p.x),
            (Value::Point(p), 1) => Value::Number(p.y),
            (Value::Size(s), 0) => Value::Number(s.width),
            (Value::Size(s), 1) => Value::Number(s.height),
            _ => Value::Undefined,
        }
    }

    /// Returns a copy with field `sub` replaced, or `None` if this is not a
    /// point or size.
    pub fn with_field(&self, sub: u8, field: f64) -> Option<Value> {
        let mut value = self.clone();
        match (&mut value, sub) {
            (Value::Point(p), 0) => p.x = field,
            (Value::Point(p), 1) => p.y = field,
            (Value::Size(s), 0) => s.width = field,
            (Value::Size(s), 1) => s.height = field,
            _ => return None,
        }
        Some(value)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Undefined | Value::Null => serializer.serialize_unit(),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Value::String(s) | Value::Url(s) => serializer.serialize_str(s),
            Value::Point(p) => p.serialize(serializer),
            Value::Size(s) => s.serialize(serializer),
            Value::Object(id) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("object", &id.to_string())?;
                map.end()
            }
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(Value::Number(5.0).to_string(), "5");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Number(f64::NAN).to_string(), "NaN");
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Value::from("42").to_number(), 42.0);
        assert!(Value::from("x").to_number().is_nan());
        assert!(!Value::from("").to_boolean());
        assert!(Value::Number(3.0).to_boolean());
        assert_eq!(Value::Boolean(true).to_number(), 1.0);
    }

    #[test]
    fn test_value_type_parsing() {
        assert_eq!(Point::parse("10, 20"), Some(Point { x: 10.0, y: 20.0 }));
        assert_eq!(
            Size::parse("30x40"),
            Some(Size {
                width: 30.0,
                height: 40.0
            })
        );
        assert_eq!(Point::parse("10"), None);
    }

    #[test]
    fn test_nan_is_never_equal() {
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
    }
}
