// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Builtin globals: `Math`, conversions, `log` and `qsTr`.

use super::{Callable, Namespace};
use crate::error::EvalError;
use crate::runtime::Value;
use std::sync::Arc;

/// A builtin function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `Math.abs`
    MathAbs,
    /// `Math.ceil`
    MathCeil,
    /// `Math.floor`
    MathFloor,
    /// `Math.max`
    MathMax,
    /// `Math.min`
    MathMin,
    /// `Math.pow`
    MathPow,
    /// `Math.round`
    MathRound,
    /// `Math.sqrt`
    MathSqrt,
    /// `String(x)`
    String,
    /// `Number(x)`
    Number,
    /// `isNaN(x)`
    IsNaN,
    /// `parseInt(s)`
    ParseInt,
    /// `log(...)`
    Log,
    /// `qsTr(s)`
    QsTr,
}

impl Builtin {
    /// Name as written in expressions.
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::MathAbs => "abs",
            Builtin::MathCeil => "ceil",
            Builtin::MathFloor => "floor",
            Builtin::MathMax => "max",
            Builtin::MathMin => "min",
            Builtin::MathPow => "pow",
            Builtin::MathRound => "round",
            Builtin::MathSqrt => "sqrt",
            Builtin::String => "String",
            Builtin::Number => "Number",
            Builtin::IsNaN => "isNaN",
            Builtin::ParseInt => "parseInt",
            Builtin::Log => "log",
            Builtin::QsTr => "qsTr",
        }
    }

    /// Calls the builtin.
    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        let number = |i: usize| args.get(i).map(|v| v.to_number()).unwrap_or(f64::NAN);
        let value = match self {
            Builtin::MathAbs => Value::Number(number(0).abs()),
            Builtin::MathCeil => Value::Number(number(0).ceil()),
            Builtin::MathFloor => Value::Number(number(0).floor()),
            Builtin::MathMax => Value::Number(fold(args, f64::NEG_INFINITY, f64::max)),
            Builtin::MathMin => Value::Number(fold(args, f64::INFINITY, f64::min)),
            Builtin::MathPow => Value::Number(number(0).powf(number(1))),
            Builtin::MathRound => Value::Number((number(0) + 0.5).floor()),
            Builtin::MathSqrt => Value::Number(number(0).sqrt()),
            Builtin::String => Value::String(
                args.first()
                    .map(|v| v.to_display_string())
                    .unwrap_or_default(),
            ),
            Builtin::Number => Value::Number(args.first().map(|v| v.to_number()).unwrap_or(0.0)),
            Builtin::IsNaN => Value::Boolean(number(0).is_nan()),
            Builtin::ParseInt => Value::Number(parse_int(args.first())),
            Builtin::Log => {
                let line: Vec<String> = args.iter().map(|v| v.to_display_string()).collect();
                tracing::info!(target: "weft::log", "{}", line.join(" "));
                Value::Undefined
            }
            Builtin::QsTr => match args.first() {
                Some(Value::String(s)) => Value::String(s.clone()),
                Some(other) => Value::String(other.to_display_string()),
                None => {
                    return Err(EvalError::new("qsTr() requires at least one argument"));
                }
            },
        };
        Ok(value)
    }
}

// Math.max/Math.min propagate NaN instead of skipping it.
fn fold(args: &[Value], init: f64, f: fn(f64, f64) -> f64) -> f64 {
    let mut acc = init;
    for arg in args {
        let n = arg.to_number();
        if n.is_nan() {
            return f64::NAN;
        }
        acc = f(acc, n);
    }
    acc
}

fn parse_int(value: Option<&Value>) -> f64 {
    let text = match value {
        Some(Value::Number(n)) => return n.trunc(),
        Some(v) => v.to_display_string(),
        None => return f64::NAN,
    };
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    match digits[..end].parse::<f64>() {
        Ok(n) if negative => -n,
        Ok(n) => n,
        Err(_) => f64::NAN,
    }
}

fn function(builtin: Builtin) -> Value {
    Value::Function(Arc::new(Callable::Builtin(builtin)))
}

/// Resolves a global name that no scope provided.
pub fn global(name: &str) -> Option<Value> {
    let value = match name {
        "Math" => Value::Namespace(Namespace::Math),
        "String" => function(Builtin::String),
        "Number" => function(Builtin::Number),
        "isNaN" => function(Builtin::IsNaN),
        "parseInt" => function(Builtin::ParseInt),
        "log" => function(Builtin::Log),
        "qsTr" => function(Builtin::QsTr),
        "undefined" => Value::Undefined,
        "NaN" => Value::Number(f64::NAN),
        "Infinity" => Value::Number(f64::INFINITY),
        _ => return None,
    };
    Some(value)
}

/// Resolves a member of the `Math` namespace.
pub fn math_member(name: &str) -> Value {
    match name {
        "PI" => Value::Number(std::f64::consts::PI),
        "E" => Value::Number(std::f64::consts::E),
        "SQRT2" => Value::Number(std::f64::consts::SQRT_2),
        "abs" => function(Builtin::MathAbs),
        "ceil" => function(Builtin::MathCeil),
        "floor" => function(Builtin::MathFloor),
        "max" => function(Builtin::MathMax),
        "min" => function(Builtin::MathMin),
        "pow" => function(Builtin::MathPow),
        "round" => function(Builtin::MathRound),
        "sqrt" => function(Builtin::MathSqrt),
        _ => Value::Undefined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_math_functions() {
        let args = [Value::Number(3.0), Value::Number(9.0), Value::Number(-1.0)];
        assert_eq!(Builtin::MathMax.call(&args), Ok(Value::Number(9.0)));
        assert_eq!(Builtin::MathMin.call(&args), Ok(Value::Number(-1.0)));
        assert_eq!(Builtin::MathRound.call(&[Value::Number(2.5)]), Ok(Value::Number(3.0)));
        assert_eq!(Builtin::MathRound.call(&[Value::Number(-2.5)]), Ok(Value::Number(-2.0)));
        assert_eq!(Builtin::MathMax.call(&[]), Ok(Value::Number(f64::NEG_INFINITY)));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Builtin::String.call(&[Value::Number(4.0)]), Ok(Value::from("4")));
        assert_eq!(Builtin::Number.call(&[Value::from(" 12 ")]), Ok(Value::Number(12.0)));
        assert_eq!(Builtin::ParseInt.call(&[Value::from("42px")]), Ok(Value::Number(42.0)));
        assert_eq!(Builtin::ParseInt.call(&[Value::from("-7")]), Ok(Value::Number(-7.0)));
    }

    #[test]
    fn test_globals() {
        assert!(matches!(global("Math"), Some(Value::Namespace(Namespace::Math))));
        assert!(global("nope").is_none());
        assert_eq!(math_member("PI"), Value::Number(std::f64::consts::PI));
        assert_eq!(math_member("tau"), Value::Undefined);
    }
}
