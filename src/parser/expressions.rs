use super::{ParseError, Parser};
use crate::ast::*;
use crate::lexer::{Keyword, Position, Token};
use std::collections::HashMap;

// Binary operator precedence, lowest first. `&&`/`||` are modelled as
// LogicalExpression nodes; everything else is BinaryExpression.
fn binary_precedence(token: &Token, no_in: bool) -> Option<(u8, Result<BinaryOp, LogicalOp>)> {
    let entry = match token {
        Token::LogicalOr => (1, Err(LogicalOp::Or)),
        Token::LogicalAnd => (2, Err(LogicalOp::And)),
        Token::Pipe => (3, Ok(BinaryOp::BitOr)),
        Token::Caret => (4, Ok(BinaryOp::BitXor)),
        Token::Ampersand => (5, Ok(BinaryOp::BitAnd)),
        Token::Equal => (6, Ok(BinaryOp::Eq)),
        Token::NotEqual => (6, Ok(BinaryOp::NotEq)),
        Token::StrictEqual => (6, Ok(BinaryOp::StrictEq)),
        Token::StrictNotEqual => (6, Ok(BinaryOp::StrictNotEq)),
        Token::LessThan => (7, Ok(BinaryOp::Lt)),
        Token::LessThanEqual => (7, Ok(BinaryOp::LtEq)),
        Token::GreaterThan => (7, Ok(BinaryOp::Gt)),
        Token::GreaterThanEqual => (7, Ok(BinaryOp::GtEq)),
        Token::Keyword(Keyword::Instanceof) => (7, Ok(BinaryOp::Instanceof)),
        Token::Keyword(Keyword::In) => {
            if no_in {
                return None;
            }
            (7, Ok(BinaryOp::In))
        }
        Token::LeftShift => (8, Ok(BinaryOp::Shl)),
        Token::RightShift => (8, Ok(BinaryOp::Shr)),
        Token::UnsignedRightShift => (8, Ok(BinaryOp::UShr)),
        Token::Plus => (9, Ok(BinaryOp::Add)),
        Token::Minus => (9, Ok(BinaryOp::Sub)),
        Token::Star => (10, Ok(BinaryOp::Mul)),
        Token::Slash => (10, Ok(BinaryOp::Div)),
        Token::Percent => (10, Ok(BinaryOp::Mod)),
        _ => return None,
    };
    Some(entry)
}

fn assignment_op(token: &Token) -> Option<AssignOp> {
    match token {
        Token::Assign => Some(AssignOp::Assign),
        Token::PlusAssign => Some(AssignOp::AddAssign),
        Token::MinusAssign => Some(AssignOp::SubAssign),
        Token::StarAssign => Some(AssignOp::MulAssign),
        Token::SlashAssign => Some(AssignOp::DivAssign),
        Token::PercentAssign => Some(AssignOp::ModAssign),
        Token::LeftShiftAssign => Some(AssignOp::ShlAssign),
        Token::RightShiftAssign => Some(AssignOp::ShrAssign),
        Token::UnsignedRightShiftAssign => Some(AssignOp::UShrAssign),
        Token::AmpersandAssign => Some(AssignOp::BitAndAssign),
        Token::PipeAssign => Some(AssignOp::BitOrAssign),
        Token::CaretAssign => Some(AssignOp::BitXorAssign),
        _ => None,
    }
}

impl<'a> Parser<'a> {
    /// Run `f` with the `in` operator re-enabled (inside parentheses,
    /// brackets, and argument lists the for-initialiser restriction ends).
    pub(crate) fn with_in<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let saved = std::mem::replace(&mut self.no_in, false);
        let result = f(self);
        self.no_in = saved;
        result
    }

    /// Comma expression, the lowest precedence level.
    pub(crate) fn parse_expression(&mut self) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        let first = self.parse_assignment()?;
        if self.current != Token::Comma {
            return Ok(first);
        }
        let mut expressions = vec![first];
        while self.eat_if(&Token::Comma)? {
            expressions.push(self.parse_assignment()?);
        }
        Ok(self.finish_node(NodeKind::SequenceExpression { expressions }, start))
    }

    pub(crate) fn parse_assignment(&mut self) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        let left = self.parse_conditional()?;
        if let Some(operator) = assignment_op(&self.current) {
            self.check_assignment_target(&left)?;
            self.advance()?;
            let right = self.parse_assignment()?;
            return Ok(self.finish_node(
                NodeKind::AssignmentExpression {
                    operator,
                    left,
                    right,
                },
                start,
            ));
        }
        Ok(left)
    }

    pub(crate) fn check_assignment_target(&self, node: &NodeRef) -> Result<(), ParseError> {
        match &node.kind {
            NodeKind::Identifier { name } => {
                if self.is_strict() && (name == "eval" || name == "arguments") {
                    return Err(
                        self.error(format!("Assignment to '{name}' in strict mode"))
                    );
                }
                Ok(())
            }
            NodeKind::MemberExpression { .. } => Ok(()),
            _ => Err(self.error("Invalid assignment target")),
        }
    }

    fn parse_conditional(&mut self) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        let test = self.parse_binary(1)?;
        if !self.eat_if(&Token::Question)? {
            return Ok(test);
        }
        let consequent = self.with_in(Self::parse_assignment)?;
        self.eat(&Token::Colon)?;
        let alternate = self.parse_assignment()?;
        Ok(self.finish_node(
            NodeKind::ConditionalExpression {
                test,
                consequent,
                alternate,
            },
            start,
        ))
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        let mut left = self.parse_unary()?;
        loop {
            let Some((precedence, op)) = binary_precedence(&self.current, self.no_in) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            self.advance()?;
            let right = self.parse_binary(precedence + 1)?;
            left = match op {
                Ok(operator) => self.finish_node(
                    NodeKind::BinaryExpression {
                        operator,
                        left,
                        right,
                    },
                    start,
                ),
                Err(operator) => self.finish_node(
                    NodeKind::LogicalExpression {
                        operator,
                        left,
                        right,
                    },
                    start,
                ),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        let prefix_op = match &self.current {
            Token::Keyword(Keyword::Delete) => Some(UnaryOp::Delete),
            Token::Keyword(Keyword::Void) => Some(UnaryOp::Void),
            Token::Keyword(Keyword::Typeof) => Some(UnaryOp::Typeof),
            Token::Plus => Some(UnaryOp::Plus),
            Token::Minus => Some(UnaryOp::Minus),
            Token::Bang => Some(UnaryOp::Not),
            Token::Tilde => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(operator) = prefix_op {
            self.advance()?;
            let argument = self.parse_unary()?;
            if operator == UnaryOp::Delete
                && self.is_strict()
                && argument.identifier_name().is_some()
            {
                return Err(
                    self.error("Delete of an unqualified identifier in strict mode")
                );
            }
            return Ok(self.finish_node(
                NodeKind::UnaryExpression { operator, argument },
                start,
            ));
        }

        if matches!(self.current, Token::Increment | Token::Decrement) {
            let operator = if self.current == Token::Increment {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            self.advance()?;
            let argument = self.parse_unary()?;
            self.check_assignment_target(&argument)?;
            return Ok(self.finish_node(
                NodeKind::UpdateExpression {
                    operator,
                    argument,
                    prefix: true,
                },
                start,
            ));
        }

        let mut expr = self.parse_expr_subscripts()?;
        // A postfix operator must be on the same line as its operand.
        while !self.prev_line_terminator
            && matches!(self.current, Token::Increment | Token::Decrement)
        {
            self.check_assignment_target(&expr)?;
            let operator = if self.current == Token::Increment {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            self.advance()?;
            expr = self.finish_node(
                NodeKind::UpdateExpression {
                    operator,
                    argument: expr,
                    prefix: false,
                },
                start,
            );
        }
        Ok(expr)
    }

    fn parse_expr_subscripts(&mut self) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        let base = if self.current == Token::Keyword(Keyword::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        self.parse_subscripts(base, start, false)
    }

    fn parse_subscripts(
        &mut self,
        mut base: NodeRef,
        start: (usize, Position),
        no_call: bool,
    ) -> Result<NodeRef, ParseError> {
        loop {
            match &self.current {
                Token::Dot => {
                    self.advance()?;
                    let property = self.parse_identifier_name()?;
                    base = self.finish_node(
                        NodeKind::MemberExpression {
                            object: base,
                            property,
                            computed: false,
                        },
                        start,
                    );
                }
                Token::LeftBracket => {
                    self.advance()?;
                    let property = self.with_in(Self::parse_expression)?;
                    self.eat(&Token::RightBracket)?;
                    base = self.finish_node(
                        NodeKind::MemberExpression {
                            object: base,
                            property,
                            computed: true,
                        },
                        start,
                    );
                }
                Token::LeftParen if !no_call => {
                    let arguments = self.parse_arguments()?;
                    base = self.finish_node(
                        NodeKind::CallExpression {
                            callee: base,
                            arguments,
                        },
                        start,
                    );
                }
                _ => break,
            }
        }
        Ok(base)
    }

    fn parse_new(&mut self) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        self.advance()?; // new
        let callee_start = self.node_start();
        let callee_base = if self.current == Token::Keyword(Keyword::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        let callee = self.parse_subscripts(callee_base, callee_start, true)?;
        let arguments = if self.current == Token::LeftParen {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(self.finish_node(NodeKind::NewExpression { callee, arguments }, start))
    }

    fn parse_arguments(&mut self) -> Result<Vec<NodeRef>, ParseError> {
        self.eat(&Token::LeftParen)?;
        let mut arguments = Vec::new();
        if self.current != Token::RightParen {
            loop {
                arguments.push(self.with_in(Self::parse_assignment)?);
                if !self.eat_if(&Token::Comma)? {
                    break;
                }
            }
        }
        self.eat(&Token::RightParen)?;
        Ok(arguments)
    }

    fn parse_primary(&mut self) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        match self.current.clone() {
            Token::Keyword(Keyword::This) => {
                self.advance()?;
                Ok(self.finish_node(NodeKind::ThisExpression, start))
            }
            Token::Keyword(Keyword::Function) => self.parse_function(false),
            Token::Keyword(Keyword::New) => self.parse_new(),
            Token::Identifier(_) | Token::IdentifierWithEscape(_) => self.parse_identifier(),
            Token::NumericLiteral(n) | Token::LegacyOctalLiteral(n) => {
                self.advance()?;
                Ok(self.finish_node(
                    NodeKind::Literal {
                        value: LiteralValue::Number(n),
                    },
                    start,
                ))
            }
            Token::StringLiteral(s) => {
                self.note_string_literal();
                self.advance()?;
                Ok(self.finish_node(
                    NodeKind::Literal {
                        value: LiteralValue::String(s),
                    },
                    start,
                ))
            }
            Token::BooleanLiteral(b) => {
                self.advance()?;
                Ok(self.finish_node(
                    NodeKind::Literal {
                        value: LiteralValue::Boolean(b),
                    },
                    start,
                ))
            }
            Token::NullLiteral => {
                self.advance()?;
                Ok(self.finish_node(
                    NodeKind::Literal {
                        value: LiteralValue::Null,
                    },
                    start,
                ))
            }
            Token::RegExpLiteral { pattern, flags } => {
                self.advance()?;
                Ok(self.finish_node(
                    NodeKind::Literal {
                        value: LiteralValue::RegExp { pattern, flags },
                    },
                    start,
                ))
            }
            Token::LeftParen => {
                self.advance()?;
                let expr = self.with_in(Self::parse_expression)?;
                self.eat(&Token::RightParen)?;
                Ok(expr)
            }
            Token::LeftBracket => self.parse_array_literal(),
            Token::LeftBrace => self.parse_object_literal(),
            tok => Err(self.error(format!("Unexpected token {tok:?}"))),
        }
    }

    fn parse_array_literal(&mut self) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        self.advance()?; // [
        let mut elements = Vec::new();
        let mut first = true;
        while self.current != Token::RightBracket {
            if !first {
                self.eat(&Token::Comma)?;
                if self.current == Token::RightBracket {
                    if !self.allow_trailing_commas {
                        return Err(self.error("Trailing comma not allowed"));
                    }
                    break;
                }
            }
            first = false;
            if self.current == Token::Comma {
                // Elision: the comma is consumed by the next iteration.
                elements.push(None);
                continue;
            }
            elements.push(Some(self.with_in(Self::parse_assignment)?));
        }
        self.advance()?; // ]
        Ok(self.finish_node(NodeKind::ArrayExpression { elements }, start))
    }

    fn parse_object_literal(&mut self) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        self.advance()?; // {
        let mut properties = Vec::new();
        // 0b01 = data, 0b10 = getter, 0b100 = setter
        let mut seen: HashMap<String, u8> = HashMap::new();
        let mut first = true;
        while self.current != Token::RightBrace {
            if !first {
                self.eat(&Token::Comma)?;
                if self.current == Token::RightBrace {
                    if !self.allow_trailing_commas {
                        return Err(self.error("Trailing comma not allowed"));
                    }
                    break;
                }
            }
            first = false;
            let prop = self.parse_object_property()?;
            if let NodeKind::Property { key, kind, .. } = &prop.kind {
                let key_name = Self::property_key_name(key);
                let bit = match kind {
                    PropertyKind::Init => 1u8,
                    PropertyKind::Get => 2,
                    PropertyKind::Set => 4,
                };
                let entry = seen.entry(key_name.clone()).or_insert(0);
                let conflict = match kind {
                    // Duplicate data properties are an error in strict mode
                    // only; mixing data and accessors is always one.
                    PropertyKind::Init => (*entry & 1 != 0 && self.is_strict()) || *entry & 6 != 0,
                    PropertyKind::Get => *entry & 3 != 0,
                    PropertyKind::Set => *entry & 5 != 0,
                };
                if conflict {
                    return Err(
                        self.error(format!("Redefinition of property '{key_name}'"))
                    );
                }
                *entry |= bit;
            }
            properties.push(prop);
        }
        self.advance()?; // }
        Ok(self.finish_node(NodeKind::ObjectExpression { properties }, start))
    }

    fn property_key_name(key: &NodeRef) -> String {
        match &key.kind {
            NodeKind::Identifier { name } => name.clone(),
            NodeKind::Literal {
                value: LiteralValue::String(s),
            } => s.to_rust_string(),
            NodeKind::Literal {
                value: LiteralValue::Number(n),
            } => crate::interpreter::helpers::number_to_string(*n),
            _ => String::new(),
        }
    }

    fn parse_object_property(&mut self) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        // `get`/`set` followed by a property name is an accessor definition.
        if let Token::Identifier(word) = &self.current {
            let word = word.clone();
            if word == "get" || word == "set" {
                let kind = if word == "get" {
                    PropertyKind::Get
                } else {
                    PropertyKind::Set
                };
                let accessor_start = self.node_start();
                self.advance()?;
                if self.current != Token::Colon
                    && self.current != Token::Comma
                    && self.current != Token::RightBrace
                    && self.current != Token::LeftParen
                {
                    let key = self.parse_property_key()?;
                    let value = self.parse_accessor_function(kind, accessor_start)?;
                    return Ok(self.finish_node(NodeKind::Property { key, value, kind }, start));
                }
                // Plain property actually named `get`/`set`.
                let key = self.finish_node(
                    NodeKind::Identifier { name: word.clone() },
                    accessor_start,
                );
                self.eat(&Token::Colon)?;
                let value = self.with_in(Self::parse_assignment)?;
                return Ok(self.finish_node(
                    NodeKind::Property {
                        key,
                        value,
                        kind: PropertyKind::Init,
                    },
                    start,
                ));
            }
        }
        let key = self.parse_property_key()?;
        self.eat(&Token::Colon)?;
        let value = self.with_in(Self::parse_assignment)?;
        return Ok(self.finish_node(
            NodeKind::Property {
                key,
                value,
                kind: PropertyKind::Init,
            },
            start,
        ));
    }

    fn parse_property_key(&mut self) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        match self.current.clone() {
            Token::StringLiteral(s) => {
                self.note_string_literal();
                self.advance()?;
                Ok(self.finish_node(
                    NodeKind::Literal {
                        value: LiteralValue::String(s),
                    },
                    start,
                ))
            }
            Token::NumericLiteral(n) | Token::LegacyOctalLiteral(n) => {
                self.advance()?;
                Ok(self.finish_node(
                    NodeKind::Literal {
                        value: LiteralValue::Number(n),
                    },
                    start,
                ))
            }
            _ => self.parse_identifier_name(),
        }
    }

    fn parse_accessor_function(
        &mut self,
        kind: PropertyKind,
        start: (usize, Position),
    ) -> Result<NodeRef, ParseError> {
        self.eat(&Token::LeftParen)?;
        let mut params = Vec::new();
        if self.current != Token::RightParen {
            loop {
                params.push(self.parse_identifier()?);
                if !self.eat_if(&Token::Comma)? {
                    break;
                }
            }
        }
        self.eat(&Token::RightParen)?;
        match kind {
            PropertyKind::Get if !params.is_empty() => {
                return Err(self.error("Getter must not have any formal parameters"));
            }
            PropertyKind::Set if params.len() != 1 => {
                return Err(self.error("Setter must have exactly one formal parameter"));
            }
            _ => {}
        }

        let outer_strict = self.is_strict();
        let outer_labels = std::mem::take(&mut self.labels);
        let outer_iteration = std::mem::replace(&mut self.in_iteration, 0);
        let outer_switch = std::mem::replace(&mut self.in_switch, 0);
        self.in_function += 1;
        let body = self.parse_accessor_body();
        self.in_function -= 1;
        self.in_switch = outer_switch;
        self.in_iteration = outer_iteration;
        self.labels = outer_labels;
        self.set_strict(outer_strict);
        let body = body?;

        Ok(self.finish_node(
            NodeKind::FunctionExpression {
                id: None,
                params,
                body,
            },
            start,
        ))
    }

    fn parse_accessor_body(&mut self) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        self.eat(&Token::LeftBrace)?;
        let mut body = Vec::new();
        let mut in_prologue = true;
        while self.current != Token::RightBrace {
            if self.current == Token::Eof {
                return Err(self.error("Unterminated function body"));
            }
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
        self.advance()?;
        Ok(self.finish_node(NodeKind::BlockStatement { body }, start))
    }
}

#[cfg(test)]
mod tests {
    use super::super::Parser;
    use crate::ast::*;

    fn parse_expr(src: &str) -> NodeRef {
        let program = Parser::new(src).unwrap().parse_program().unwrap();
        let body = match &program.kind {
            NodeKind::Program { body } => body.borrow().clone(),
            _ => unreachable!(),
        };
        match &body[0].kind {
            NodeKind::ExpressionStatement { expression } => expression.clone(),
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn precedence_mul_over_add() {
        let expr = parse_expr("1 + 2 * 3;");
        match &expr.kind {
            NodeKind::BinaryExpression { operator, right, .. } => {
                assert_eq!(*operator, BinaryOp::Add);
                assert!(matches!(
                    right.kind,
                    NodeKind::BinaryExpression {
                        operator: BinaryOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn logical_nodes_are_distinct() {
        let expr = parse_expr("a && b || c;");
        assert!(matches!(
            expr.kind,
            NodeKind::LogicalExpression {
                operator: LogicalOp::Or,
                ..
            }
        ));
    }

    #[test]
    fn assignment_is_right_associative() {
        let expr = parse_expr("a = b = 1;");
        match &expr.kind {
            NodeKind::AssignmentExpression { right, .. } => {
                assert!(matches!(
                    right.kind,
                    NodeKind::AssignmentExpression { .. }
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn member_call_chain() {
        let expr = parse_expr("a.b[c](d);");
        match &expr.kind {
            NodeKind::CallExpression { callee, arguments } => {
                assert_eq!(arguments.len(), 1);
                assert!(matches!(
                    callee.kind,
                    NodeKind::MemberExpression { computed: true, .. }
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn new_without_arguments() {
        let expr = parse_expr("new Foo;");
        match &expr.kind {
            NodeKind::NewExpression { arguments, .. } => assert!(arguments.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn new_member_callee_binds_tighter_than_call() {
        // `new a.b()` constructs `a.b`, it does not call `b`.
        let expr = parse_expr("new a.b();");
        match &expr.kind {
            NodeKind::NewExpression { callee, .. } => {
                assert!(matches!(callee.kind, NodeKind::MemberExpression { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn array_holes() {
        let expr = parse_expr("[1, , 3];");
        match &expr.kind {
            NodeKind::ArrayExpression { elements } => {
                assert_eq!(elements.len(), 3);
                assert!(elements[1].is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn object_accessors() {
        let expr = parse_expr("({ get x() { return 1; }, set x(v) {} });");
        match &expr.kind {
            NodeKind::ObjectExpression { properties } => {
                assert_eq!(properties.len(), 2);
                assert!(matches!(
                    properties[0].kind,
                    NodeKind::Property {
                        kind: PropertyKind::Get,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn property_named_get() {
        let expr = parse_expr("({ get: 1 });");
        assert!(matches!(expr.kind, NodeKind::ObjectExpression { .. }));
    }

    #[test]
    fn duplicate_accessor_rejected() {
        let result = Parser::new("({ get x() {}, get x() {} });")
            .unwrap()
            .parse_program();
        assert!(result.is_err());
    }

    #[test]
    fn getter_with_params_rejected() {
        let result = Parser::new("({ get x(a) {} });").unwrap().parse_program();
        assert!(result.is_err());
    }

    #[test]
    fn postfix_update_not_across_newline() {
        let program = Parser::new("a\n++b;").unwrap().parse_program().unwrap();
        let body = match &program.kind {
            NodeKind::Program { body } => body.borrow().clone(),
            _ => unreachable!(),
        };
        // ASI applies: `a;` then prefix `++b;`.
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn regex_literal_parses() {
        let expr = parse_expr("/ab+c/gi;");
        assert!(matches!(
            expr.kind,
            NodeKind::Literal {
                value: LiteralValue::RegExp { .. }
            }
        ));
    }

    #[test]
    fn in_operator_inside_parens_of_for_init() {
        assert!(Parser::new("for (var x = ('a' in o); x; ) break;")
            .unwrap()
            .parse_program()
            .is_ok());
    }

    #[test]
    fn delete_unqualified_in_strict() {
        let result = Parser::new("\"use strict\"; var x; delete x;")
            .unwrap()
            .parse_program();
        assert!(result.is_err());
    }

    #[test]
    fn sequence_expression() {
        let expr = parse_expr("1, 2, 3;");
        match &expr.kind {
            NodeKind::SequenceExpression { expressions } => assert_eq!(expressions.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }
}
