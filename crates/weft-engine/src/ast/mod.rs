// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Abstract Syntax Tree definitions.
//!
//! Two families of nodes live here: the document tree (imports, object
//! declarations, property assignments) produced by
//! [`Parser::parse_document`](crate::parser::Parser::parse_document), and
//! the expression/statement tree used by bindings, signal handlers and
//! imported scripts.

use crate::lexer::Span;

// ============================================================================
// Documents
// ============================================================================

/// A parsed component document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Import statements in source order
    pub imports: Vec<ImportNode>,
    /// `pragma` names
    pub pragmas: Vec<String>,
    /// The root object declaration
    pub root: ObjectNode,
}

/// What an import statement refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportKind {
    /// `import Weft.Controls 1.0`
    Module(String),
    /// `import "controls"`
    Directory(String),
    /// `import "util.js" as Util`
    Script(String),
}

/// A `major.minor` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
}

impl Version {
    /// Creates a version.
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Parses `"1.0"`.
    pub fn parse(text: &str) -> Option<Version> {
        let (major, minor) = text.split_once('.')?;
        Some(Version {
            major: major.trim().parse().ok()?,
            minor: minor.trim().parse().ok()?,
        })
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// An import statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportNode {
    /// Module, directory or script
    pub kind: ImportKind,
    /// Requested version, if any
    pub version: Option<Version>,
    /// `as Qualifier`
    pub qualifier: Option<String>,
    /// Source location
    pub span: Span,
}

/// A possibly namespace-qualified type name (`W.Item`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName {
    /// Namespace qualifier
    pub qualifier: Option<String>,
    /// Unqualified name
    pub name: String,
}

impl std::fmt::Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}.{}", q, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// An object declaration: `Item { ... }`.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectNode {
    /// Declared type
    pub type_name: TypeName,
    /// Members in source order
    pub members: Vec<Member>,
    /// Location of the type name
    pub span: Span,
}

impl ObjectNode {
    /// Returns the `id: name` assignment, if present.
    pub fn id(&self) -> Option<(&str, Span)> {
        self.members.iter().find_map(|m| match m {
            Member::Assignment(a) if a.path.len() == 1 && a.path[0] == "id" => match &a.value {
                PropertyValue::Expression(ExpressionSource {
                    expression: Expression::Identifier(name),
                    ..
                }) => Some((name.as_str(), a.span)),
                _ => None,
            },
            _ => None,
        })
    }
}

/// A member of an object declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    /// `property int count: 5`
    Property(PropertyDeclaration),
    /// `signal clicked(real x)`
    Signal(SignalDeclaration),
    /// `name: value` or `a.b: value`
    Assignment(Assignment),
    /// A nested object assigned to the default property
    Object(ObjectNode),
}

/// A dynamic property declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDeclaration {
    /// Property name
    pub name: String,
    /// Declared type (`int`, `string`, an object type name, `list<Item>`)
    pub type_name: String,
    /// `default property`
    pub is_default: bool,
    /// `readonly property`
    pub is_readonly: bool,
    /// Initializer
    pub value: Option<PropertyValue>,
    /// Location of the declaration
    pub span: Span,
}

/// A signal declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDeclaration {
    /// Signal name
    pub name: String,
    /// Parameter names
    pub parameters: Vec<String>,
    /// Location
    pub span: Span,
}

/// A property assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Dotted path, e.g. `["border", "width"]`
    pub path: Vec<String>,
    /// Right-hand side
    pub value: PropertyValue,
    /// Location of the first path segment
    pub span: Span,
}

impl Assignment {
    /// The dotted path joined back together.
    pub fn name(&self) -> String {
        self.path.join(".")
    }
}

/// The right-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// A single expression, possibly a plain literal
    Expression(ExpressionSource),
    /// A statement block `{ ... }`
    Block(BlockSource),
    /// An object declaration
    Object(Box<ObjectNode>),
    /// A list of objects `[ A {}, B {} ]`
    List(Vec<ObjectNode>),
}

/// An expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionSource {
    /// Parsed expression
    pub expression: Expression,
    /// Original text
    pub source: String,
    /// Location
    pub span: Span,
}

/// A statement block together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSource {
    /// Parsed statements
    pub body: Vec<Statement>,
    /// Original text
    pub source: String,
    /// Location
    pub span: Span,
}

// ============================================================================
// Scripts
// ============================================================================

/// A parsed script file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScriptProgram {
    /// `.import "other.js" as Other`
    pub imports: Vec<ScriptImport>,
    /// Top-level declarations
    pub items: Vec<ScriptItem>,
}

/// A `.import` line inside a script.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptImport {
    /// Relative path of the imported script
    pub path: String,
    /// Namespace the import is bound to
    pub qualifier: String,
    /// Location
    pub span: Span,
}

/// A top-level script declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptItem {
    /// `var name = init;`
    Variable {
        /// Variable name
        name: String,
        /// Initializer
        init: Option<Expression>,
    },
    /// `function name(a, b) { ... }`
    Function(FunctionDeclaration),
}

/// A function declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    /// Function name
    pub name: String,
    /// Parameter names
    pub params: Vec<String>,
    /// Body statements
    pub body: Vec<Statement>,
}

// ============================================================================
// Statements and expressions
// ============================================================================

/// A statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// An expression evaluated for its value or side effects
    Expression(Expression),
    /// `var name = init`
    Variable {
        /// Variable name
        name: String,
        /// Initializer
        init: Option<Expression>,
    },
    /// `return value`
    Return(Option<Expression>),
    /// `if (test) consequent else alternate`
    If {
        /// Condition
        test: Expression,
        /// Taken branch
        consequent: Box<Statement>,
        /// Optional else branch
        alternate: Option<Box<Statement>>,
    },
    /// `{ ... }`
    Block(Vec<Statement>),
    /// `;`
    Empty,
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Literal value
    Literal(Literal),
    /// Identifier reference
    Identifier(String),
    /// `[a, b]`
    Array(Vec<Expression>),
    /// `object.property`
    Member(MemberExpression),
    /// `object[index]`
    Index(IndexExpression),
    /// `callee(args)`
    Call(CallExpression),
    /// Prefix operator
    Unary(UnaryExpression),
    /// Binary operator (including logical operators)
    Binary(BinaryExpression),
    /// `test ? consequent : alternate`
    Conditional(ConditionalExpression),
    /// `target = value`, `target += value`
    Assignment(AssignmentExpression),
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Number
    Number(f64),
    /// String
    String(String),
    /// Boolean
    Boolean(bool),
    /// null
    Null,
}

/// Member access.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberExpression {
    /// Object expression
    pub object: Box<Expression>,
    /// Property name
    pub property: String,
}

/// Computed member access.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexExpression {
    /// Object expression
    pub object: Box<Expression>,
    /// Index expression
    pub index: Box<Expression>,
}

/// A call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpression {
    /// Function expression
    pub callee: Box<Expression>,
    /// Arguments
    pub arguments: Vec<Expression>,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// `-`
    Minus,
    /// `+`
    Plus,
    /// `!`
    LogicalNot,
    /// `typeof`
    Typeof,
}

/// A unary expression.
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpression {
    /// Operator
    pub operator: UnaryOperator,
    /// Operand
    pub argument: Box<Expression>,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `===`
    StrictEqual,
    /// `!==`
    StrictNotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEqual,
    /// `&&`
    LogicalAnd,
    /// `||`
    LogicalOr,
}

/// A binary expression.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpression {
    /// Operator
    pub operator: BinaryOperator,
    /// Left operand
    pub left: Box<Expression>,
    /// Right operand
    pub right: Box<Expression>,
}

/// A conditional expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalExpression {
    /// Condition
    pub test: Box<Expression>,
    /// Value when true
    pub consequent: Box<Expression>,
    /// Value when false
    pub alternate: Box<Expression>,
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOperator {
    /// `=`
    Assign,
    /// `+=`
    AddAssign,
    /// `-=`
    SubtractAssign,
}

/// An assignment expression.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentExpression {
    /// Operator
    pub operator: AssignmentOperator,
    /// Target (identifier or member expression)
    pub left: Box<Expression>,
    /// Value
    pub right: Box<Expression>,
}
