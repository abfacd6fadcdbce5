use crate::ast::*;
use crate::lexer::{CommentHandler, Keyword, LexError, Lexer, Position, Token};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

mod expressions;
mod statements;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EcmaVersion {
    Es3,
    Es5,
}

/// Parser options. `on_comment` receives every comment as
/// `(is_block, text, start, end, start_loc, end_loc)`; the location pair is
/// populated only when `locations` is set.
pub struct ParseOptions {
    pub ecma_version: EcmaVersion,
    /// Disable automatic semicolon insertion.
    pub strict_semicolons: bool,
    /// Accept trailing commas in array and object literals.
    pub allow_trailing_commas: bool,
    /// Treat reserved words as errors.
    pub forbid_reserved: bool,
    pub locations: bool,
    pub ranges: bool,
    pub on_comment: Option<CommentHandler>,
    /// Existing Program node to extend instead of starting a fresh one.
    pub program: Option<NodeRef>,
    /// Attached to each node's `loc.source`.
    pub source_file: Option<Rc<str>>,
    /// Attached to each node's `source_file`.
    pub direct_source_file: Option<Rc<str>>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            ecma_version: EcmaVersion::Es5,
            strict_semicolons: false,
            allow_trailing_commas: true,
            forbid_reserved: false,
            locations: false,
            ranges: false,
            on_comment: None,
            program: None,
            source_file: None,
            direct_source_file: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SyntaxError: {} ({}:{})",
            self.message, self.line, self.column
        )
    }
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError {
            message: e.message,
            offset: e.location.offset,
            line: e.location.line,
            column: e.location.column,
        }
    }
}

pub(crate) struct Label {
    pub name: String,
    pub is_iteration: bool,
    // True until the labelled statement's kind is known; a loop keyword
    // promotes every pending label to an iteration label.
    pub pending: bool,
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    current_token_start: usize,
    current_token_end: usize,
    current_start_pos: Position,
    current_end_pos: Position,
    prev_token_end: usize,
    prev_end_pos: Position,
    prev_line_terminator: bool,
    strict: bool,
    in_function: u32,
    in_iteration: u32,
    in_switch: u32,
    labels: Vec<Label>,
    pub(crate) no_in: bool,
    // Escape flag for the string literal sitting in `current` and for the
    // one most recently consumed into a Literal node; directives must be
    // escape-free.
    current_string_had_escape: bool,
    last_string_had_escape: bool,
    strip_spans: bool,
    ecma_version: EcmaVersion,
    strict_semicolons: bool,
    allow_trailing_commas: bool,
    forbid_reserved: bool,
    locations: bool,
    ranges: bool,
    program: Option<NodeRef>,
    source_file: Option<Rc<str>>,
    direct_source_file: Option<Rc<str>>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Result<Self, ParseError> {
        Self::with_options(source, ParseOptions::default())
    }

    pub fn with_options(source: &'a str, options: ParseOptions) -> Result<Self, ParseError> {
        let ParseOptions {
            ecma_version,
            strict_semicolons,
            allow_trailing_commas,
            forbid_reserved,
            locations,
            ranges,
            on_comment,
            program,
            source_file,
            direct_source_file,
        } = options;
        let mut lexer = Lexer::new(source);
        lexer.track_locations = locations;
        lexer.on_comment = on_comment;
        let mut parser = Self {
            lexer,
            current: Token::Eof,
            current_token_start: 0,
            current_token_end: 0,
            current_start_pos: Position { line: 1, column: 0 },
            current_end_pos: Position { line: 1, column: 0 },
            prev_token_end: 0,
            prev_end_pos: Position { line: 1, column: 0 },
            prev_line_terminator: false,
            strict: false,
            in_function: 0,
            in_iteration: 0,
            in_switch: 0,
            labels: Vec::new(),
            no_in: false,
            current_string_had_escape: false,
            last_string_had_escape: false,
            strip_spans: false,
            ecma_version,
            strict_semicolons,
            allow_trailing_commas,
            forbid_reserved,
            locations,
            ranges,
            program,
            source_file,
            direct_source_file,
        };
        parser.advance()?;
        parser.prev_token_end = 0;
        Ok(parser)
    }

    /// Parser for construction-time polyfill programs: spans are zeroed so
    /// the resulting frames are invisible to external stepping observers.
    pub(crate) fn polyfill(source: &'a str) -> Result<Self, ParseError> {
        let mut parser = Self::new(source)?;
        parser.strip_spans = true;
        Ok(parser)
    }

    pub(crate) fn advance(&mut self) -> Result<Token, ParseError> {
        self.prev_token_end = self.current_token_end;
        self.prev_end_pos = self.current_end_pos;
        let old = std::mem::replace(&mut self.current, Token::Eof);
        self.prev_line_terminator = false;
        loop {
            let tok = self.lexer.next_token()?;
            if tok == Token::LineTerminator {
                self.prev_line_terminator = true;
                continue;
            }
            if let Token::StringLiteral(_) = tok {
                self.current_string_had_escape = self.lexer.last_string_had_escape;
            }
            self.current_token_start = self.lexer.token_start();
            self.current_token_end = self.lexer.offset();
            self.current_start_pos = self.lexer.token_start_position();
            self.current_end_pos = self.lexer.position();
            self.current = tok;
            break;
        }
        Ok(old)
    }

    pub(crate) fn eat(&mut self, expected: &Token) -> Result<(), ParseError> {
        if &self.current == expected {
            self.advance()?;
            Ok(())
        } else {
            Err(self.error(format!("Expected {expected:?}, got {:?}", self.current)))
        }
    }

    pub(crate) fn eat_if(&mut self, expected: &Token) -> Result<bool, ParseError> {
        if &self.current == expected {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// A semicolon is deemed present when the next token is `}`, EOF, or a
    /// line terminator precedes a token that would otherwise be illegal.
    pub(crate) fn eat_semicolon(&mut self) -> Result<(), ParseError> {
        if self.current == Token::Semicolon {
            self.advance()?;
            return Ok(());
        }
        if self.strict_semicolons {
            return Err(self.error("Expected semicolon"));
        }
        if self.prev_line_terminator
            || self.current == Token::RightBrace
            || self.current == Token::Eof
        {
            return Ok(());
        }
        Err(self.error("Expected semicolon"))
    }

    pub(crate) fn can_insert_semicolon(&self) -> bool {
        !self.strict_semicolons
            && (self.prev_line_terminator
                || self.current == Token::RightBrace
                || self.current == Token::Eof)
    }

    pub(crate) fn error(&self, msg: impl Into<String>) -> ParseError {
        ParseError {
            message: msg.into(),
            offset: self.current_token_start,
            line: self.current_start_pos.line,
            column: self.current_start_pos.column,
        }
    }

    pub(crate) fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
        self.lexer.strict = strict;
    }

    pub(crate) fn is_strict(&self) -> bool {
        self.strict
    }

    // Node construction ----------------------------------------------------

    pub(crate) fn node_start(&self) -> (usize, Position) {
        (self.current_token_start, self.current_start_pos)
    }

    pub(crate) fn finish_node(&self, kind: NodeKind, start: (usize, Position)) -> NodeRef {
        if self.strip_spans {
            return Rc::new(Node {
                start: 0,
                end: 0,
                loc: None,
                range: None,
                source_file: None,
                kind,
            });
        }
        let (start_offset, start_pos) = start;
        let end = self.prev_token_end;
        Rc::new(Node {
            start: start_offset,
            end,
            loc: if self.locations {
                Some(SourceSpan {
                    start: start_pos,
                    end: self.prev_end_pos,
                    source: self.source_file.clone(),
                })
            } else {
                None
            },
            range: if self.ranges {
                Some((start_offset, end))
            } else {
                None
            },
            source_file: self.direct_source_file.clone(),
            kind,
        })
    }

    // Identifier and reserved-word handling --------------------------------

    fn is_reserved_word(&self, name: &str) -> bool {
        match self.ecma_version {
            EcmaVersion::Es3 => matches!(
                name,
                "abstract" | "boolean" | "byte" | "char" | "class" | "const" | "double"
                    | "enum" | "export" | "extends" | "final" | "float" | "goto"
                    | "implements" | "import" | "int" | "interface" | "long" | "native"
                    | "package" | "private" | "protected" | "public" | "short" | "static"
                    | "super" | "synchronized" | "throws" | "transient" | "volatile"
            ),
            EcmaVersion::Es5 => matches!(
                name,
                "class" | "const" | "enum" | "export" | "extends" | "import" | "super"
            ),
        }
    }

    fn is_strict_reserved_word(name: &str) -> bool {
        matches!(
            name,
            "implements"
                | "interface"
                | "let"
                | "package"
                | "private"
                | "protected"
                | "public"
                | "static"
                | "yield"
        )
    }

    pub(crate) fn check_identifier(&self, name: &str) -> Result<(), ParseError> {
        if self.strict && Self::is_strict_reserved_word(name) {
            return Err(self.error(format!("The keyword '{name}' is reserved in strict mode")));
        }
        if self.forbid_reserved && self.is_reserved_word(name) {
            return Err(self.error(format!("The keyword '{name}' is reserved")));
        }
        Ok(())
    }

    /// An identifier that introduces or assigns a binding; strict mode
    /// forbids `eval` and `arguments` here.
    pub(crate) fn check_binding_identifier(&self, name: &str) -> Result<(), ParseError> {
        self.check_identifier(name)?;
        if self.strict && (name == "eval" || name == "arguments") {
            return Err(self.error(format!("Binding '{name}' in strict mode")));
        }
        Ok(())
    }

    /// Parse the current token as an identifier reference node.
    pub(crate) fn parse_identifier(&mut self) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        let name = match &self.current {
            Token::Identifier(name) | Token::IdentifierWithEscape(name) => name.clone(),
            tok => return Err(self.error(format!("Expected identifier, got {tok:?}"))),
        };
        self.check_identifier(&name)?;
        self.advance()?;
        Ok(self.finish_node(NodeKind::Identifier { name }, start))
    }

    /// An IdentifierName (member names, property keys): keywords allowed.
    pub(crate) fn parse_identifier_name(&mut self) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        let name = match &self.current {
            Token::Identifier(name) | Token::IdentifierWithEscape(name) => name.clone(),
            Token::Keyword(kw) => kw.to_string(),
            Token::BooleanLiteral(b) => b.to_string(),
            Token::NullLiteral => "null".to_string(),
            tok => return Err(self.error(format!("Expected property name, got {tok:?}"))),
        };
        self.advance()?;
        Ok(self.finish_node(NodeKind::Identifier { name }, start))
    }

    pub(crate) fn current_is_identifier(&self) -> bool {
        matches!(
            self.current,
            Token::Identifier(_) | Token::IdentifierWithEscape(_)
        )
    }

    /// Called when a string-literal token is consumed into a Literal node.
    pub(crate) fn note_string_literal(&mut self) {
        self.last_string_had_escape = self.current_string_had_escape;
    }

    // Program --------------------------------------------------------------

    pub fn parse_program(&mut self) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        let mut body = Vec::new();
        let mut in_prologue = true;
        while self.current != Token::Eof {
            let stmt = self.parse_statement()?;
            if in_prologue {
                match self.directive_value(&stmt) {
                    Some(directive) => {
                        if directive == "use strict" {
                            self.set_strict(true);
                        }
                    }
                    None => in_prologue = false,
                }
            }
            body.push(stmt);
        }
        if let Some(program) = self.program.take() {
            if let NodeKind::Program { body: existing } = &program.kind {
                existing.borrow_mut().extend(body);
            }
            return Ok(program);
        }
        Ok(self.finish_node(
            NodeKind::Program {
                body: RefCell::new(body),
            },
            start,
        ))
    }

    /// A directive-prologue candidate: an expression statement holding a
    /// single escape-free string literal.
    pub(crate) fn directive_value(&self, stmt: &NodeRef) -> Option<String> {
        if let NodeKind::ExpressionStatement { expression } = &stmt.kind {
            if let NodeKind::Literal {
                value: LiteralValue::String(s),
            } = &expression.kind
            {
                if !self.last_string_had_escape {
                    return Some(s.to_rust_string());
                }
            }
        }
        None
    }

    // Label bookkeeping ----------------------------------------------------

    pub(crate) fn push_label(&mut self, name: String) -> Result<(), ParseError> {
        if self.labels.iter().any(|l| l.name == name) {
            return Err(self.error(format!("Label '{name}' is already declared")));
        }
        self.labels.push(Label {
            name,
            is_iteration: false,
            pending: true,
        });
        Ok(())
    }

    pub(crate) fn pop_label(&mut self) {
        self.labels.pop();
    }

    /// Called when an iteration statement begins: the labels written
    /// immediately above it target this loop.
    pub(crate) fn promote_pending_labels(&mut self) {
        for label in self.labels.iter_mut().rev() {
            if !label.pending {
                break;
            }
            label.pending = false;
            label.is_iteration = true;
        }
    }

    pub(crate) fn settle_pending_labels(&mut self) {
        for label in self.labels.iter_mut().rev() {
            if !label.pending {
                break;
            }
            label.pending = false;
        }
    }

    pub(crate) fn find_label(&self, name: &str) -> Option<&Label> {
        self.labels.iter().find(|l| l.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> NodeRef {
        Parser::new(src).unwrap().parse_program().unwrap()
    }

    fn parse_err(src: &str) -> ParseError {
        match Parser::new(src) {
            Ok(mut p) => p.parse_program().unwrap_err(),
            Err(e) => e,
        }
    }

    fn body_of(program: &NodeRef) -> Vec<NodeRef> {
        match &program.kind {
            NodeKind::Program { body } => body.borrow().clone(),
            _ => panic!("not a program"),
        }
    }

    #[test]
    fn parse_empty() {
        assert!(body_of(&parse("")).is_empty());
    }

    #[test]
    fn parse_var_declaration() {
        let body = body_of(&parse("var x = 42;"));
        assert_eq!(body.len(), 1);
        assert!(matches!(
            body[0].kind,
            NodeKind::VariableDeclaration { .. }
        ));
    }

    #[test]
    fn parse_if_statement() {
        let body = body_of(&parse("if (true) { x; } else { y; }"));
        assert!(matches!(body[0].kind, NodeKind::IfStatement { .. }));
    }

    #[test]
    fn parse_function_declaration() {
        let body = body_of(&parse("function foo(a, b) { return a + b; }"));
        assert!(matches!(
            body[0].kind,
            NodeKind::FunctionDeclaration { .. }
        ));
    }

    #[test]
    fn parse_for_loop() {
        let body = body_of(&parse("for (var i = 0; i < 10; i++) { x; }"));
        assert!(matches!(body[0].kind, NodeKind::ForStatement { .. }));
    }

    #[test]
    fn parse_for_in() {
        let body = body_of(&parse("for (var k in o) { k; }"));
        assert!(matches!(body[0].kind, NodeKind::ForInStatement { .. }));
    }

    #[test]
    fn parse_try_catch_finally() {
        let body = body_of(&parse("try { x; } catch (e) { y; } finally { z; }"));
        match &body[0].kind {
            NodeKind::TryStatement {
                handler, finalizer, ..
            } => {
                assert!(handler.is_some());
                assert!(finalizer.is_some());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn node_spans_reparse_equivalent() {
        let src = "var a = 1; a + 2;";
        let program = parse(src);
        let body = body_of(&program);
        // Re-parsing the slice of the second statement yields the same shape.
        let slice = &src[body[1].start..body[1].end];
        let reparsed = parse(slice);
        let inner = body_of(&reparsed);
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].type_name(), body[1].type_name());
    }

    #[test]
    fn asi_inserts_semicolons() {
        let body = body_of(&parse("a = 1\nb = 2"));
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn strict_semicolons_rejects_asi() {
        let options = ParseOptions {
            strict_semicolons: true,
            ..Default::default()
        };
        let mut parser = Parser::with_options("a = 1\nb = 2", options).unwrap();
        assert!(parser.parse_program().is_err());
    }

    #[test]
    fn use_strict_directive_rejects_octal() {
        assert!(parse_err("\"use strict\"; var x = 010;")
            .message
            .contains("strict"));
    }

    #[test]
    fn strict_mode_inherits_into_functions() {
        // Binding `eval` inside a function nested in strict code is an error.
        let err = parse_err("\"use strict\"; function f() { var eval; }");
        assert!(err.message.contains("eval"));
    }

    #[test]
    fn return_outside_function() {
        assert!(parse_err("return 1;").message.contains("return"));
    }

    #[test]
    fn break_outside_loop() {
        assert!(!parse("while (1) { break; }").is_polyfill());
        parse_err("break;");
    }

    #[test]
    fn continue_label_must_mark_iteration() {
        parse("outer: while (1) { continue outer; }");
        let err = parse_err("outer: { continue outer; }");
        assert!(err.message.contains("outer"));
    }

    #[test]
    fn duplicate_label_rejected() {
        parse_err("a: a: while(1) {}");
    }

    #[test]
    fn with_rejected_in_strict() {
        parse_err("\"use strict\"; with (o) { x; }");
        parse("with (o) { x; }");
    }

    #[test]
    fn locations_and_ranges_options() {
        let options = ParseOptions {
            locations: true,
            ranges: true,
            ..Default::default()
        };
        let mut parser = Parser::with_options("var x;\nvar y;", options).unwrap();
        let program = parser.parse_program().unwrap();
        let body = body_of(&program);
        let second = &body[1];
        assert_eq!(second.range, Some((second.start, second.end)));
        let loc = second.loc.as_ref().unwrap();
        assert_eq!(loc.start.line, 2);
        assert_eq!(loc.start.column, 0);
    }

    #[test]
    fn extends_existing_program() {
        let first = parse("var a = 1;");
        let options = ParseOptions {
            program: Some(first.clone()),
            ..Default::default()
        };
        let mut parser = Parser::with_options("var b = 2;", options).unwrap();
        let same = parser.parse_program().unwrap();
        assert!(Rc::ptr_eq(&first, &same));
        assert_eq!(body_of(&first).len(), 2);
    }

    #[test]
    fn forbid_reserved_words() {
        let options = ParseOptions {
            forbid_reserved: true,
            ..Default::default()
        };
        let mut parser = Parser::with_options("var x = class_;", options).unwrap();
        assert!(parser.parse_program().is_ok());
        let options = ParseOptions {
            forbid_reserved: true,
            ..Default::default()
        };
        let mut parser = Parser::with_options("enum;", options).unwrap();
        assert!(parser.parse_program().is_err());
    }
}
