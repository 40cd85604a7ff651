// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Constant folding of literal-only expressions.

use crate::ast::{Expression, Literal, UnaryOperator};
use crate::expr::{NullScope, TreeWalker};
use crate::runtime::Value;

/// Whether `expression` depends on nothing but literals.
fn is_constant(expression: &Expression) -> bool {
    match expression {
        Expression::Literal(_) => true,
        Expression::Unary(unary) => {
            matches!(
                unary.operator,
                UnaryOperator::Minus | UnaryOperator::Plus | UnaryOperator::LogicalNot
            ) && is_constant(&unary.argument)
        }
        Expression::Binary(binary) => is_constant(&binary.left) && is_constant(&binary.right),
        Expression::Conditional(c) => {
            is_constant(&c.test) && is_constant(&c.consequent) && is_constant(&c.alternate)
        }
        _ => false,
    }
}

/// Evaluates `expression` at compile time, if it is a constant.
pub(crate) fn constant(expression: &Expression) -> Option<Value> {
    match expression {
        Expression::Literal(Literal::Number(n)) => return Some(Value::Number(*n)),
        Expression::Literal(Literal::String(s)) => return Some(Value::String(s.clone())),
        Expression::Literal(Literal::Boolean(b)) => return Some(Value::Boolean(*b)),
        Expression::Literal(Literal::Null) => return Some(Value::Null),
        _ => {}
    }
    if !is_constant(expression) {
        return None;
    }
    TreeWalker::new().evaluate(expression, &mut NullScope).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;

    fn fold(source: &str) -> Option<Value> {
        constant(&parse_expression(source).unwrap().expression)
    }

    #[test]
    fn test_folds_literals() {
        assert_eq!(fold("2 * 3 + 1"), Some(Value::Number(7.0)));
        assert_eq!(fold("-4"), Some(Value::Number(-4.0)));
        assert_eq!(fold("!false"), Some(Value::Boolean(true)));
        assert_eq!(fold("\"a\" + \"b\""), Some(Value::from("ab")));
        assert_eq!(fold("1 < 2 ? \"yes\" : \"no\""), Some(Value::from("yes")));
    }

    #[test]
    fn test_leaves_dynamic_expressions() {
        assert_eq!(fold("width * 2"), None);
        assert_eq!(fold("Math.max(1, 2)"), None);
        assert_eq!(fold("[1, 2]"), None);
    }
}
