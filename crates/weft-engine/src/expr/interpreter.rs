// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Tree-walking evaluator for expressions and statement blocks.

use super::builtins;
use super::script::ScriptScope;
use super::{Callable, CompiledFunction, ExpressionEvaluator, FunctionBody, Namespace, Scope};
use crate::ast::{
    AssignmentOperator, BinaryOperator, Expression, Literal, Statement, UnaryOperator,
};
use crate::error::EvalError;
use crate::runtime::Value;
use rustc_hash::FxHashMap;

/// Maximum nesting of script function calls.
const MAX_CALL_DEPTH: usize = 256;

enum Completion {
    Normal(Value),
    Return(Value),
}

/// Evaluates AST nodes directly.
///
/// Locals (function parameters and `var` declarations) live in one frame per
/// call; everything else is resolved through the [`Scope`].
#[derive(Debug, Default)]
pub struct TreeWalker {
    frames: Vec<FxHashMap<String, Value>>,
}

impl ExpressionEvaluator for TreeWalker {
    fn run(
        &mut self,
        function: &CompiledFunction,
        arguments: &[Value],
        scope: &mut dyn Scope,
    ) -> Result<Value, EvalError> {
        self.push_frame(&function.parameters, arguments)?;
        let result = match &function.body {
            FunctionBody::Expression(expression) => self.evaluate(expression, scope),
            FunctionBody::Block(body) => self.execute(body, scope),
        };
        self.frames.pop();
        result.map_err(|e| e.at(function.line, function.column))
    }
}

impl TreeWalker {
    /// Creates an evaluator with no locals.
    pub fn new() -> Self {
        Self::default()
    }

    fn push_frame(&mut self, parameters: &[String], arguments: &[Value]) -> Result<(), EvalError> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(EvalError::new("RangeError: Maximum call stack size exceeded"));
        }
        let mut frame = FxHashMap::default();
        for (i, name) in parameters.iter().enumerate() {
            frame.insert(
                name.clone(),
                arguments.get(i).cloned().unwrap_or(Value::Undefined),
            );
        }
        self.frames.push(frame);
        Ok(())
    }

    fn local(&self, name: &str) -> Option<&Value> {
        self.frames.last().and_then(|frame| frame.get(name))
    }

    /// Runs a statement block, returning the value of its `return`.
    pub fn execute(&mut self, body: &[Statement], scope: &mut dyn Scope) -> Result<Value, EvalError> {
        if self.frames.is_empty() {
            self.frames.push(FxHashMap::default());
        }
        match self.execute_statements(body, scope)? {
            Completion::Return(value) => Ok(value),
            Completion::Normal(_) => Ok(Value::Undefined),
        }
    }

    fn execute_statements(
        &mut self,
        body: &[Statement],
        scope: &mut dyn Scope,
    ) -> Result<Completion, EvalError> {
        let mut last = Value::Undefined;
        for statement in body {
            match self.execute_statement(statement, scope)? {
                Completion::Normal(value) => last = value,
                ret @ Completion::Return(_) => return Ok(ret),
            }
        }
        Ok(Completion::Normal(last))
    }

    fn execute_statement(
        &mut self,
        statement: &Statement,
        scope: &mut dyn Scope,
    ) -> Result<Completion, EvalError> {
        match statement {
            Statement::Expression(expression) => {
                Ok(Completion::Normal(self.evaluate(expression, scope)?))
            }
            Statement::Variable { name, init } => {
                let value = match init {
                    Some(init) => self.evaluate(init, scope)?,
                    None => Value::Undefined,
                };
                if self.frames.is_empty() {
                    self.frames.push(FxHashMap::default());
                }
                if let Some(frame) = self.frames.last_mut() {
                    frame.insert(name.clone(), value);
                }
                Ok(Completion::Normal(Value::Undefined))
            }
            Statement::Return(value) => {
                let value = match value {
                    Some(value) => self.evaluate(value, scope)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Statement::If {
                test,
                consequent,
                alternate,
            } => {
                if self.evaluate(test, scope)?.to_boolean() {
                    self.execute_statement(consequent, scope)
                } else if let Some(alternate) = alternate {
                    self.execute_statement(alternate, scope)
                } else {
                    Ok(Completion::Normal(Value::Undefined))
                }
            }
            Statement::Block(body) => self.execute_statements(body, scope),
            Statement::Empty => Ok(Completion::Normal(Value::Undefined)),
        }
    }

    /// Evaluates an expression.
    pub fn evaluate(&mut self, expression: &Expression, scope: &mut dyn Scope) -> Result<Value, EvalError> {
        match expression {
            Expression::Literal(literal) => Ok(literal_value(literal)),
            Expression::Identifier(name) => match self.local(name) {
                Some(value) => Ok(value.clone()),
                None => scope.lookup(name),
            },
            Expression::Array(elements) => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.evaluate(element, scope)?);
                }
                Ok(Value::List(items))
            }
            Expression::Member(member) => {
                let object = self.evaluate(&member.object, scope)?;
                member_of(&object, &member.property, scope)
            }
            Expression::Index(index) => {
                let object = self.evaluate(&index.object, scope)?;
                let key = self.evaluate(&index.index, scope)?;
                match (&object, &key) {
                    (Value::List(items), Value::Number(n)) => {
                        Ok(items.get(*n as usize).cloned().unwrap_or(Value::Undefined))
                    }
                    (Value::String(s), Value::Number(n)) => Ok(s
                        .chars()
                        .nth(*n as usize)
                        .map(|c| Value::String(c.to_string()))
                        .unwrap_or(Value::Undefined)),
                    _ => member_of(&object, &key.to_display_string(), scope),
                }
            }
            Expression::Call(call) => {
                let callee = self.evaluate(&call.callee, scope)?;
                let mut arguments = Vec::with_capacity(call.arguments.len());
                for argument in &call.arguments {
                    arguments.push(self.evaluate(argument, scope)?);
                }
                match callee {
                    Value::Function(callable) => self.call(&callable, arguments, scope),
                    _ => Err(EvalError::type_error(format!(
                        "{} is not a function",
                        describe(&call.callee)
                    ))),
                }
            }
            Expression::Unary(unary) => {
                let value = match self.evaluate(&unary.argument, scope) {
                    Ok(value) => value,
                    // typeof of an undeclared name is not an error
                    Err(_)
                        if unary.operator == UnaryOperator::Typeof
                            && matches!(*unary.argument, Expression::Identifier(_)) =>
                    {
                        Value::Undefined
                    }
                    Err(e) => return Err(e),
                };
                Ok(match unary.operator {
                    UnaryOperator::Minus => Value::Number(-value.to_number()),
                    UnaryOperator::Plus => Value::Number(value.to_number()),
                    UnaryOperator::LogicalNot => Value::Boolean(!value.to_boolean()),
                    UnaryOperator::Typeof => Value::String(value.type_of().to_string()),
                })
            }
            Expression::Binary(binary) => {
                let left = self.evaluate(&binary.left, scope)?;
                match binary.operator {
                    BinaryOperator::LogicalAnd if !left.to_boolean() => return Ok(left),
                    BinaryOperator::LogicalOr if left.to_boolean() => return Ok(left),
                    BinaryOperator::LogicalAnd | BinaryOperator::LogicalOr => {
                        return self.evaluate(&binary.right, scope);
                    }
                    _ => {}
                }
                let right = self.evaluate(&binary.right, scope)?;
                Ok(binary_op(binary.operator, &left, &right))
            }
            Expression::Conditional(conditional) => {
                if self.evaluate(&conditional.test, scope)?.to_boolean() {
                    self.evaluate(&conditional.consequent, scope)
                } else {
                    self.evaluate(&conditional.alternate, scope)
                }
            }
            Expression::Assignment(assignment) => {
                let right = self.evaluate(&assignment.right, scope)?;
                let value = match assignment.operator {
                    AssignmentOperator::Assign => right,
                    AssignmentOperator::AddAssign => {
                        let left = self.evaluate(&assignment.left, scope)?;
                        binary_op(BinaryOperator::Add, &left, &right)
                    }
                    AssignmentOperator::SubtractAssign => {
                        let left = self.evaluate(&assignment.left, scope)?;
                        binary_op(BinaryOperator::Subtract, &left, &right)
                    }
                };
                self.assign_to(&assignment.left, value.clone(), scope)?;
                Ok(value)
            }
        }
    }

    fn assign_to(&mut self, target: &Expression, value: Value, scope: &mut dyn Scope) -> Result<(), EvalError> {
        match target {
            Expression::Identifier(name) => {
                if let Some(slot) = self.frames.last_mut().and_then(|f| f.get_mut(name)) {
                    *slot = value;
                    return Ok(());
                }
                scope.assign(name, value)
            }
            Expression::Member(member) => {
                let base = self.evaluate(&member.object, scope)?;
                match base {
                    Value::Object(id) => scope.set_property(id, &member.property, value),
                    Value::Point(mut point) => {
                        match member.property.as_str() {
                            "x" => point.x = value.to_number(),
                            "y" => point.y = value.to_number(),
                            _ => return Ok(()),
                        }
                        self.assign_to(&member.object, Value::Point(point), scope)
                    }
                    Value::Size(mut size) => {
                        match member.property.as_str() {
                            "width" => size.width = value.to_number(),
                            "height" => size.height = value.to_number(),
                            _ => return Ok(()),
                        }
                        self.assign_to(&member.object, Value::Size(size), scope)
                    }
                    Value::Namespace(Namespace::Script(script)) => {
                        if script.set(&member.property, value) {
                            Ok(())
                        } else {
                            Err(EvalError::type_error(format!(
                                "Cannot assign to {} of {}",
                                member.property,
                                script.url()
                            )))
                        }
                    }
                    other => Err(EvalError::type_error(format!(
                        "Cannot set property '{}' of {}",
                        member.property,
                        other.type_name()
                    ))),
                }
            }
            Expression::Index(index) => {
                let base = self.evaluate(&index.object, scope)?;
                let key = self.evaluate(&index.index, scope)?;
                match (base, key) {
                    (Value::List(mut items), Value::Number(n)) if n >= 0.0 => {
                        let n = n as usize;
                        if n >= items.len() {
                            items.resize(n + 1, Value::Undefined);
                        }
                        items[n] = value;
                        self.assign_to(&index.object, Value::List(items), scope)
                    }
                    (Value::Object(id), key) => {
                        scope.set_property(id, &key.to_display_string(), value)
                    }
                    (other, _) => Err(EvalError::type_error(format!(
                        "Cannot set element of {}",
                        other.type_name()
                    ))),
                }
            }
            _ => Err(EvalError::new("Invalid left-hand side in assignment")),
        }
    }

    fn call(&mut self, callable: &Callable, arguments: Vec<Value>, scope: &mut dyn Scope) -> Result<Value, EvalError> {
        match callable {
            Callable::Builtin(builtin) => builtin.call(&arguments),
            Callable::Native { function, .. } => function(&arguments),
            Callable::Script { script, index } => {
                let Some(declaration) = script.function(*index) else {
                    return Err(EvalError::type_error("function is not defined"));
                };
                self.push_frame(&declaration.params, &arguments)?;
                let mut inner = ScriptScope::new(script.clone(), scope);
                let result = self.execute_statements(&declaration.body, &mut inner);
                self.frames.pop();
                match result? {
                    Completion::Return(value) => Ok(value),
                    Completion::Normal(_) => Ok(Value::Undefined),
                }
            }
            Callable::Signal { object, name } => {
                scope.emit_signal(*object, name, arguments)?;
                Ok(Value::Undefined)
            }
        }
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Null => Value::Null,
    }
}

/// Reads `name` from `object`.
fn member_of(object: &Value, name: &str, scope: &mut dyn Scope) -> Result<Value, EvalError> {
    match object {
        Value::Object(id) => scope.get_property(*id, name),
        Value::Point(p) => Ok(match name {
            "x" => Value::Number(p.x),
            "y" => Value::Number(p.y),
            _ => Value::Undefined,
        }),
        Value::Size(s) => Ok(match name {
            "width" => Value::Number(s.width),
            "height" => Value::Number(s.height),
            _ => Value::Undefined,
        }),
        Value::String(s) | Value::Url(s) if name == "length" => {
            Ok(Value::Number(s.chars().count() as f64))
        }
        Value::List(items) if name == "length" => Ok(Value::Number(items.len() as f64)),
        Value::Namespace(Namespace::Math) => Ok(builtins::math_member(name)),
        Value::Namespace(Namespace::Script(script)) => {
            Ok(script.get(name).unwrap_or(Value::Undefined))
        }
        Value::Undefined | Value::Null => Err(EvalError::type_error(format!(
            "Cannot read property '{}' of {}",
            name, object
        ))),
        _ => Ok(Value::Undefined),
    }
}

fn describe(expression: &Expression) -> String {
    match expression {
        Expression::Identifier(name) => name.clone(),
        Expression::Member(member) => format!("{}.{}", describe(&member.object), member.property),
        _ => "expression".to_string(),
    }
}

fn is_stringy(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Url(_))
}

fn loose_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (a, b) if a.is_nullish() && b.is_nullish() => true,
        (a, b) if a.is_nullish() || b.is_nullish() => false,
        (Value::Number(_) | Value::Boolean(_), b) | (b, Value::Number(_) | Value::Boolean(_))
            if is_stringy(b) || matches!(b, Value::Number(_) | Value::Boolean(_)) =>
        {
            left.to_number() == right.to_number()
        }
        _ => strict_equals(left, right),
    }
}

fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::String(a) | Value::Url(a), Value::String(b) | Value::Url(b)) => a == b,
        _ => left == right,
    }
}

/// Applies a non-logical binary operator.
pub(crate) fn binary_op(operator: BinaryOperator, left: &Value, right: &Value) -> Value {
    use BinaryOperator::*;
    match operator {
        Add => {
            if is_stringy(left) || is_stringy(right) || matches!(left, Value::List(_)) {
                Value::String(format!("{}{}", left, right))
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        Subtract => Value::Number(left.to_number() - right.to_number()),
        Multiply => Value::Number(left.to_number() * right.to_number()),
        Divide => Value::Number(left.to_number() / right.to_number()),
        Modulo => Value::Number(left.to_number() % right.to_number()),
        Equal => Value::Boolean(loose_equals(left, right)),
        NotEqual => Value::Boolean(!loose_equals(left, right)),
        StrictEqual => Value::Boolean(strict_equals(left, right)),
        StrictNotEqual => Value::Boolean(!strict_equals(left, right)),
        LessThan | LessThanEqual | GreaterThan | GreaterThanEqual => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            let Some(ordering) = ordering else {
                return Value::Boolean(false);
            };
            Value::Boolean(match operator {
                LessThan => ordering.is_lt(),
                LessThanEqual => ordering.is_le(),
                GreaterThan => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
        LogicalAnd => {
            if left.to_boolean() {
                right.clone()
            } else {
                left.clone()
            }
        }
        LogicalOr => {
            if left.to_boolean() {
                left.clone()
            } else {
                right.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::NullScope;
    use crate::parser::{parse_expression, parse_script};
    use crate::runtime::{ObjectId, Point};

    /// A scope with a few plain variables.
    #[derive(Default)]
    struct MapScope {
        vars: FxHashMap<String, Value>,
    }

    impl Scope for MapScope {
        fn lookup(&mut self, name: &str) -> Result<Value, EvalError> {
            match self.vars.get(name) {
                Some(v) => Ok(v.clone()),
                None => NullScope.lookup(name),
            }
        }

        fn assign(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
            self.vars.insert(name.to_string(), value);
            Ok(())
        }

        fn get_property(&mut self, _: ObjectId, _: &str) -> Result<Value, EvalError> {
            Ok(Value::Undefined)
        }

        fn set_property(&mut self, _: ObjectId, _: &str, _: Value) -> Result<(), EvalError> {
            Ok(())
        }

        fn emit_signal(&mut self, _: ObjectId, _: &str, _: Vec<Value>) -> Result<(), EvalError> {
            Ok(())
        }
    }

    fn eval(source: &str, scope: &mut dyn Scope) -> Result<Value, EvalError> {
        let parsed = parse_expression(source).unwrap();
        TreeWalker::new().evaluate(&parsed.expression, scope)
    }

    #[test]
    fn test_arithmetic_and_strings() {
        let mut scope = NullScope;
        assert_eq!(eval("1 + 2 * 3", &mut scope), Ok(Value::Number(7.0)));
        assert_eq!(eval("'a' + 1", &mut scope), Ok(Value::from("a1")));
        assert_eq!(eval("7 % 4", &mut scope), Ok(Value::Number(3.0)));
        assert_eq!(eval("'abc'.length", &mut scope), Ok(Value::Number(3.0)));
        assert_eq!(eval("Math.max(2, 8) - Math.abs(-3)", &mut scope), Ok(Value::Number(5.0)));
    }

    #[test]
    fn test_equality_rules() {
        let mut scope = NullScope;
        assert_eq!(eval("null == undefined", &mut scope), Ok(Value::Boolean(true)));
        assert_eq!(eval("null === undefined", &mut scope), Ok(Value::Boolean(false)));
        assert_eq!(eval("'5' == 5", &mut scope), Ok(Value::Boolean(true)));
        assert_eq!(eval("'5' === 5", &mut scope), Ok(Value::Boolean(false)));
        assert_eq!(eval("0 == null", &mut scope), Ok(Value::Boolean(false)));
    }

    #[test]
    fn test_logical_operators_short_circuit() {
        let mut scope = NullScope;
        assert_eq!(eval("0 || 'x'", &mut scope), Ok(Value::from("x")));
        assert_eq!(eval("false && missing()", &mut scope), Ok(Value::Boolean(false)));
        assert_eq!(eval("typeof missing", &mut scope), Ok(Value::from("undefined")));
        assert!(eval("missing", &mut scope).is_err());
    }

    #[test]
    fn test_value_type_write_back() {
        let mut scope = MapScope::default();
        scope.vars.insert("pos".into(), Value::Point(Point { x: 1.0, y: 2.0 }));
        assert_eq!(eval("pos.x = 10", &mut scope), Ok(Value::Number(10.0)));
        assert_eq!(
            scope.vars.get("pos"),
            Some(&Value::Point(Point { x: 10.0, y: 2.0 }))
        );
        assert_eq!(eval("pos.y += 3", &mut scope), Ok(Value::Number(5.0)));
    }

    #[test]
    fn test_block_with_locals() {
        let function = CompiledFunction {
            name: "handler".into(),
            parameters: vec!["a".into()],
            body: FunctionBody::Block(
                parse_script("function f(a) { var b = a * 2; if (b > 4) { return b; } return 0; }")
                    .ok()
                    .and_then(|p| match p.items.into_iter().next() {
                        Some(crate::ast::ScriptItem::Function(f)) => Some(f.body),
                        _ => None,
                    })
                    .unwrap(),
            ),
            source: String::new(),
            line: 1,
            column: 1,
        };
        let mut walker = TreeWalker::new();
        let mut scope = NullScope;
        assert_eq!(walker.run(&function, &[Value::Number(3.0)], &mut scope), Ok(Value::Number(6.0)));
        assert_eq!(walker.run(&function, &[Value::Number(1.0)], &mut scope), Ok(Value::Number(0.0)));
    }

    #[test]
    fn test_errors_carry_function_location() {
        let parsed = parse_expression("nothing.here").unwrap();
        let function = CompiledFunction::expression("width", parsed.expression, parsed.source).at(4, 12);
        let err = TreeWalker::new().run(&function, &[], &mut NullScope).unwrap_err();
        assert_eq!(err.message, "ReferenceError: nothing is not defined");
        assert_eq!((err.line, err.column), (4, 12));
    }
}
