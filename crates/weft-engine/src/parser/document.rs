// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Document and script grammar.
//!
//! ```text
//! Document   : (Import | Pragma)* Object
//! Import     : 'import' (Uri Version? | String Version?) ('as' Identifier)?
//! Object     : TypeName '{' Member* '}'
//! Member     : PropertyDeclaration | SignalDeclaration | Assignment | Object
//! Assignment : Identifier ('.' Identifier)* ':' Value
//! Value      : Object | '[' Object (',' Object)* ']' | Block | Expression
//! ```

use super::Parser;
use crate::Error;
use crate::ast::*;
use crate::lexer::TokenKind;

impl<'a> Parser<'a> {
    /// Parses a complete document.
    pub fn parse_document(&mut self) -> Result<Document, Error> {
        let mut imports = Vec::new();
        let mut pragmas = Vec::new();

        loop {
            if self.check(&TokenKind::Import) {
                imports.push(self.parse_import()?);
            } else if self.check_identifier("pragma") {
                self.advance();
                pragmas.push(self.expect_identifier()?);
                self.consume_semicolon();
            } else {
                break;
            }
        }

        if !self.starts_object() {
            return Err(self.error_here("Expected object declaration"));
        }
        let root = self.parse_object()?;

        if !self.is_at_end() {
            return Err(self.error_here(format!(
                "Unexpected token {} after root object",
                self.current.kind
            )));
        }

        Ok(Document {
            imports,
            pragmas,
            root,
        })
    }

    /// Parses a script file.
    pub fn parse_script(&mut self) -> Result<ScriptProgram, Error> {
        let mut program = ScriptProgram::default();

        while !self.is_at_end() {
            match &self.current.kind {
                TokenKind::Dot => {
                    let span = self.current.span;
                    self.advance();
                    if self.check(&TokenKind::Import) {
                        self.advance();
                        let TokenKind::String(path) = self.current.kind.clone() else {
                            return Err(self.error_here("Expected script path after .import"));
                        };
                        self.advance();
                        if !self.check_identifier("as") {
                            return Err(self.error_here("Script import requires a qualifier"));
                        }
                        self.advance();
                        let qualifier = self.expect_identifier()?;
                        self.consume_semicolon();
                        program.imports.push(ScriptImport {
                            path,
                            qualifier,
                            span,
                        });
                    } else if self.check_identifier("pragma") {
                        self.advance();
                        self.expect_identifier()?;
                        self.consume_semicolon();
                    } else {
                        return Err(self.unexpected());
                    }
                }
                TokenKind::Var => {
                    self.advance();
                    let name = self.expect_identifier()?;
                    let init = if self.check(&TokenKind::Equal) {
                        self.advance();
                        Some(self.parse_expression()?)
                    } else {
                        None
                    };
                    self.consume_semicolon();
                    program.items.push(ScriptItem::Variable { name, init });
                }
                TokenKind::Function => {
                    self.advance();
                    let name = self.expect_identifier()?;
                    let params = self.parse_parameter_list()?;
                    let body = self.parse_block_body()?;
                    program.items.push(ScriptItem::Function(FunctionDeclaration {
                        name,
                        params,
                        body,
                    }));
                }
                TokenKind::Semicolon => self.advance(),
                _ => return Err(self.unexpected()),
            }
        }

        Ok(program)
    }

    fn parse_parameter_list(&mut self) -> Result<Vec<String>, Error> {
        self.expect(&TokenKind::LeftParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            // Typed signal parameters: `real x`
            let first = self.expect_identifier()?;
            if let TokenKind::Identifier(_) = &self.current.kind {
                params.push(self.expect_identifier()?);
            } else {
                params.push(first);
            }
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(params)
    }

    fn parse_import(&mut self) -> Result<ImportNode, Error> {
        let span = self.current.span;
        self.advance(); // consume 'import'

        let kind = match self.current.kind.clone() {
            TokenKind::String(path) => {
                self.advance();
                if path.ends_with(".js") {
                    ImportKind::Script(path)
                } else {
                    ImportKind::Directory(path)
                }
            }
            TokenKind::Identifier(first) => {
                self.advance();
                let mut uri = first;
                while self.check(&TokenKind::Dot) {
                    self.advance();
                    uri.push('.');
                    uri.push_str(&self.expect_identifier()?);
                }
                ImportKind::Module(uri)
            }
            _ => return Err(self.error_here("Expected import URI")),
        };

        let version = if let TokenKind::Number(_) = self.current.kind {
            let text = &self.scanner.source()[self.current.span.start..self.current.span.end];
            let version = Version::parse(text)
                .ok_or_else(|| self.error_here(format!("Invalid import version \"{}\"", text)))?;
            self.advance();
            Some(version)
        } else {
            None
        };

        let qualifier = if self.check_identifier("as") {
            self.advance();
            let name = self.expect_identifier()?;
            if !name.starts_with(|c: char| c.is_uppercase()) {
                return Err(Error::syntax(
                    "Invalid import qualifier ID",
                    self.previous.span.line,
                    self.previous.span.column,
                ));
            }
            Some(name)
        } else {
            None
        };

        if matches!(kind, ImportKind::Script(_)) && qualifier.is_none() {
            return Err(Error::syntax(
                "Script import requires a qualifier",
                span.line,
                span.column,
            ));
        }

        self.consume_semicolon();
        Ok(ImportNode {
            kind,
            version,
            qualifier,
            span,
        })
    }

    /// True when the upcoming tokens are `Type {` or `Qualifier.Type {`.
    fn starts_object(&self) -> bool {
        let TokenKind::Identifier(name) = &self.current.kind else {
            return false;
        };
        if !name.starts_with(|c: char| c.is_uppercase()) {
            return false;
        }
        match self.peek_nth(1).kind {
            TokenKind::LeftBrace => true,
            TokenKind::Dot => {
                matches!(self.peek_nth(2).kind, TokenKind::Identifier(ref n) if n.starts_with(|c: char| c.is_uppercase()))
                    && matches!(self.peek_nth(3).kind, TokenKind::LeftBrace)
            }
            _ => false,
        }
    }

    fn parse_object(&mut self) -> Result<ObjectNode, Error> {
        let span = self.current.span;
        let first = self.expect_identifier()?;
        let type_name = if self.check(&TokenKind::Dot) {
            self.advance();
            TypeName {
                qualifier: Some(first),
                name: self.expect_identifier()?,
            }
        } else {
            TypeName {
                qualifier: None,
                name: first,
            }
        };

        self.expect(&TokenKind::LeftBrace)?;
        let mut members = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            if self.is_at_end() {
                return Err(self.error_here("Expected '}' to close object declaration"));
            }
            members.push(self.parse_member()?);
            self.consume_semicolon();
        }
        self.expect(&TokenKind::RightBrace)?;

        Ok(ObjectNode {
            type_name,
            members,
            span,
        })
    }

    fn parse_member(&mut self) -> Result<Member, Error> {
        if self.starts_object() {
            return Ok(Member::Object(self.parse_object()?));
        }

        let TokenKind::Identifier(word) = self.current.kind.clone() else {
            return Err(self.unexpected());
        };
        let next = self.peek_nth(1).kind;
        let next_is_identifier = matches!(next, TokenKind::Identifier(_));

        match word.as_str() {
            "property" | "default" | "readonly" if next_is_identifier => {
                self.parse_property_declaration()
            }
            "signal" if next_is_identifier => {
                let span = self.current.span;
                self.advance();
                let name = self.expect_identifier()?;
                let parameters = if self.check(&TokenKind::LeftParen) {
                    self.parse_parameter_list()?
                } else {
                    Vec::new()
                };
                Ok(Member::Signal(SignalDeclaration {
                    name,
                    parameters,
                    span,
                }))
            }
            _ => self.parse_assignment_member(),
        }
    }

    fn parse_property_declaration(&mut self) -> Result<Member, Error> {
        let span = self.current.span;
        let mut is_default = false;
        let mut is_readonly = false;
        loop {
            if self.check_identifier("default") {
                is_default = true;
            } else if self.check_identifier("readonly") {
                is_readonly = true;
            } else {
                break;
            }
            self.advance();
        }
        if !self.check_identifier("property") {
            return Err(self.error_here("Expected 'property'"));
        }
        self.advance();

        let mut type_name = self.expect_identifier()?;
        if self.check(&TokenKind::Less) {
            // list<Item>
            self.advance();
            let element = self.expect_identifier()?;
            self.expect(&TokenKind::Greater)?;
            type_name = format!("{}<{}>", type_name, element);
        }
        let name = self.expect_identifier()?;

        let value = if self.check(&TokenKind::Colon) {
            self.advance();
            Some(self.parse_property_value()?)
        } else {
            None
        };

        Ok(Member::Property(PropertyDeclaration {
            name,
            type_name,
            is_default,
            is_readonly,
            value,
            span,
        }))
    }

    fn parse_assignment_member(&mut self) -> Result<Member, Error> {
        let span = self.current.span;
        let mut path = vec![self.expect_identifier()?];
        while self.check(&TokenKind::Dot) {
            self.advance();
            path.push(self.expect_identifier()?);
        }
        self.expect(&TokenKind::Colon)?;
        let value = self.parse_property_value()?;
        Ok(Member::Assignment(Assignment { path, value, span }))
    }

    fn parse_property_value(&mut self) -> Result<PropertyValue, Error> {
        if self.starts_object() {
            return Ok(PropertyValue::Object(Box::new(self.parse_object()?)));
        }

        if self.check(&TokenKind::LeftBracket) {
            let object_list = {
                let mut lookahead = Parser {
                    scanner: self.scanner.clone(),
                    current: self.current.clone(),
                    previous: self.previous.clone(),
                };
                lookahead.advance();
                lookahead.starts_object()
            };
            if object_list {
                self.advance();
                let mut objects = Vec::new();
                loop {
                    if !self.starts_object() {
                        return Err(self.error_here("Expected object declaration in list"));
                    }
                    objects.push(self.parse_object()?);
                    if !self.check(&TokenKind::Comma) {
                        break;
                    }
                    self.advance();
                }
                self.expect(&TokenKind::RightBracket)?;
                return Ok(PropertyValue::List(objects));
            }
        }

        if self.check(&TokenKind::LeftBrace) {
            let span = self.current.span;
            let body = self.parse_block_body()?;
            let source = self.text_since(span);
            return Ok(PropertyValue::Block(BlockSource { body, source, span }));
        }

        Ok(PropertyValue::Expression(self.parse_expression_source()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Document {
        Parser::new(src).parse_document().unwrap()
    }

    #[test]
    fn test_parse_imports() {
        let doc = parse(
            r#"
            import Weft 1.0
            import Weft.Controls 2.1 as C
            import "widgets"
            import "util.js" as Util
            Item {}
            "#,
        );
        assert_eq!(doc.imports.len(), 4);
        assert_eq!(doc.imports[0].kind, ImportKind::Module("Weft".into()));
        assert_eq!(doc.imports[0].version, Some(Version::new(1, 0)));
        assert_eq!(doc.imports[1].kind, ImportKind::Module("Weft.Controls".into()));
        assert_eq!(doc.imports[1].qualifier.as_deref(), Some("C"));
        assert_eq!(doc.imports[2].kind, ImportKind::Directory("widgets".into()));
        assert_eq!(doc.imports[3].kind, ImportKind::Script("util.js".into()));
    }

    #[test]
    fn test_parse_version_keeps_minor_digits() {
        let doc = parse("import Weft 1.10\nItem {}");
        assert_eq!(doc.imports[0].version, Some(Version::new(1, 10)));
    }

    #[test]
    fn test_parse_script_import_requires_qualifier() {
        let err = Parser::new("import \"util.js\"\nItem {}").parse_document().unwrap_err();
        assert!(err.to_string().contains("requires a qualifier"));
    }

    #[test]
    fn test_parse_object_members() {
        let doc = parse(
            r#"
            Item {
                id: root
                property int count: 5
                default property list<Item> content
                readonly property string label: "x"
                signal activated(real x, real y)
                width: 100; height: width * 2
                offset.x: 10
                onWidthChanged: count = count + 1
                Rectangle { color: "red" }
                header: Text { text: "hi" }
                children: [ Item {}, Item {} ]
                onActivated: { var t = x; count = t }
            }
            "#,
        );
        let root = &doc.root;
        assert_eq!(root.type_name.name, "Item");
        assert_eq!(root.id().map(|(name, _)| name), Some("root"));

        let props: Vec<_> = root
            .members
            .iter()
            .filter_map(|m| match m {
                Member::Property(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(props.len(), 3);
        assert_eq!(props[1].type_name, "list<Item>");
        assert!(props[1].is_default);
        assert!(props[2].is_readonly);

        let signal = root.members.iter().find_map(|m| match m {
            Member::Signal(s) => Some(s),
            _ => None,
        });
        assert_eq!(signal.unwrap().parameters, vec!["x", "y"]);

        let grouped = root.members.iter().find_map(|m| match m {
            Member::Assignment(a) if a.path.len() == 2 => Some(a),
            _ => None,
        });
        assert_eq!(grouped.unwrap().name(), "offset.x");

        assert!(root.members.iter().any(|m| matches!(m, Member::Object(_))));
        assert!(root.members.iter().any(|m| matches!(
            m,
            Member::Assignment(Assignment {
                value: PropertyValue::List(list),
                ..
            }) if list.len() == 2
        )));
        assert!(root.members.iter().any(|m| matches!(
            m,
            Member::Assignment(Assignment {
                value: PropertyValue::Block(_),
                ..
            })
        )));
    }

    #[test]
    fn test_parse_qualified_and_attached() {
        let doc = parse(
            r#"
            W.Item {
                Component.onCompleted: log("done")
                W.Rectangle {}
            }
            "#,
        );
        assert_eq!(doc.root.type_name.qualifier.as_deref(), Some("W"));
        match &doc.root.members[0] {
            Member::Assignment(a) => assert_eq!(a.path, vec!["Component", "onCompleted"]),
            other => panic!("unexpected member {other:?}"),
        }
        assert!(matches!(doc.root.members[1], Member::Object(_)));
    }

    #[test]
    fn test_parse_missing_brace() {
        let err = Parser::new("Item { width: 1").parse_document().unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn test_parse_script_program() {
        let program = Parser::new(
            r#"
            .pragma library
            .import "math.js" as M
            var factor = 2;
            function scale(v) { return v * factor; }
            "#,
        )
        .parse_script()
        .unwrap();
        assert_eq!(program.imports.len(), 1);
        assert_eq!(program.imports[0].qualifier, "M");
        assert_eq!(program.items.len(), 2);
    }
}
