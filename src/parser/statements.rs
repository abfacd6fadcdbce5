use super::{ParseError, Parser};
use crate::ast::*;
use crate::lexer::{Keyword, Token};
use std::collections::HashSet;

impl<'a> Parser<'a> {
    pub(crate) fn parse_statement(&mut self) -> Result<NodeRef, ParseError> {
        match &self.current {
            Token::LeftBrace => {
                self.settle_pending_labels();
                self.parse_block()
            }
            Token::Semicolon => {
                let start = self.node_start();
                self.settle_pending_labels();
                self.advance()?;
                Ok(self.finish_node(NodeKind::EmptyStatement, start))
            }
            Token::Keyword(kw) => match kw {
                Keyword::Var => {
                    self.settle_pending_labels();
                    let decl = self.parse_var_declaration()?;
                    self.eat_semicolon()?;
                    Ok(decl)
                }
                Keyword::If => self.parse_if(),
                Keyword::For => self.parse_for(),
                Keyword::While => self.parse_while(),
                Keyword::Do => self.parse_do_while(),
                Keyword::Switch => self.parse_switch(),
                Keyword::Try => self.parse_try(),
                Keyword::Throw => self.parse_throw(),
                Keyword::Return => self.parse_return(),
                Keyword::Break => self.parse_break_continue(true),
                Keyword::Continue => self.parse_break_continue(false),
                Keyword::With => self.parse_with(),
                Keyword::Debugger => {
                    self.settle_pending_labels();
                    let start = self.node_start();
                    self.advance()?;
                    self.eat_semicolon()?;
                    Ok(self.finish_node(NodeKind::DebuggerStatement, start))
                }
                Keyword::Function => {
                    self.settle_pending_labels();
                    self.parse_function(true)
                }
                _ => self.parse_labeled_or_expression(),
            },
            _ => self.parse_labeled_or_expression(),
        }
    }

    pub(crate) fn parse_block(&mut self) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        self.eat(&Token::LeftBrace)?;
        let mut body = Vec::new();
        while self.current != Token::RightBrace {
            if self.current == Token::Eof {
                return Err(self.error("Unterminated block"));
            }
            body.push(self.parse_statement()?);
        }
        self.advance()?;
        Ok(self.finish_node(NodeKind::BlockStatement { body }, start))
    }

    fn parse_var_declaration(&mut self) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        self.advance()?; // var
        let mut declarations = Vec::new();
        loop {
            let decl_start = self.node_start();
            let id = self.parse_identifier()?;
            if let Some(name) = id.identifier_name() {
                self.check_binding_identifier(name)?;
            }
            let init = if self.eat_if(&Token::Assign)? {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            declarations.push(
                self.finish_node(NodeKind::VariableDeclarator { id, init }, decl_start),
            );
            if !self.eat_if(&Token::Comma)? {
                break;
            }
        }
        Ok(self.finish_node(NodeKind::VariableDeclaration { declarations }, start))
    }

    fn parse_if(&mut self) -> Result<NodeRef, ParseError> {
        self.settle_pending_labels();
        let start = self.node_start();
        self.advance()?; // if
        self.eat(&Token::LeftParen)?;
        let test = self.with_in(Self::parse_expression)?;
        self.eat(&Token::RightParen)?;
        let consequent = self.parse_statement()?;
        let alternate = if self.eat_if(&Token::Keyword(Keyword::Else))? {
            Some(self.parse_statement()?)
        } else {
            None
        };
        Ok(self.finish_node(
            NodeKind::IfStatement {
                test,
                consequent,
                alternate,
            },
            start,
        ))
    }

    fn parse_while(&mut self) -> Result<NodeRef, ParseError> {
        self.promote_pending_labels();
        let start = self.node_start();
        self.advance()?; // while
        self.eat(&Token::LeftParen)?;
        let test = self.with_in(Self::parse_expression)?;
        self.eat(&Token::RightParen)?;
        self.in_iteration += 1;
        let body = self.parse_statement();
        self.in_iteration -= 1;
        Ok(self.finish_node(
            NodeKind::WhileStatement { test, body: body? },
            start,
        ))
    }

    fn parse_do_while(&mut self) -> Result<NodeRef, ParseError> {
        self.promote_pending_labels();
        let start = self.node_start();
        self.advance()?; // do
        self.in_iteration += 1;
        let body = self.parse_statement();
        self.in_iteration -= 1;
        let body = body?;
        self.eat(&Token::Keyword(Keyword::While))?;
        self.eat(&Token::LeftParen)?;
        let test = self.with_in(Self::parse_expression)?;
        self.eat(&Token::RightParen)?;
        // The semicolon after `do … while (…)` is always optional.
        self.eat_if(&Token::Semicolon)?;
        Ok(self.finish_node(NodeKind::DoWhileStatement { body, test }, start))
    }

    fn parse_for(&mut self) -> Result<NodeRef, ParseError> {
        self.promote_pending_labels();
        let start = self.node_start();
        self.advance()?; // for
        self.eat(&Token::LeftParen)?;

        if self.current == Token::Semicolon {
            self.advance()?;
            return self.parse_for_tail(start, None);
        }

        // Parse the initialiser with `in` forbidden, then decide between the
        // classic and the for-in production.
        if self.current == Token::Keyword(Keyword::Var) {
            let was_no_in = std::mem::replace(&mut self.no_in, true);
            let decl = self.parse_var_declaration();
            self.no_in = was_no_in;
            let decl = decl?;
            if self.current == Token::Keyword(Keyword::In) {
                if let NodeKind::VariableDeclaration { declarations } = &decl.kind {
                    if declarations.len() != 1 {
                        return Err(
                            self.error("Only one variable declaration allowed in for-in loop")
                        );
                    }
                }
                return self.parse_for_in_tail(start, decl);
            }
            self.eat(&Token::Semicolon)?;
            return self.parse_for_tail(start, Some(decl));
        }

        let was_no_in = std::mem::replace(&mut self.no_in, true);
        let init = self.parse_expression();
        self.no_in = was_no_in;
        let init = init?;
        if self.current == Token::Keyword(Keyword::In) {
            self.check_assignment_target(&init)?;
            return self.parse_for_in_tail(start, init);
        }
        self.eat(&Token::Semicolon)?;
        self.parse_for_tail(start, Some(init))
    }

    fn parse_for_tail(
        &mut self,
        start: (usize, crate::lexer::Position),
        init: Option<NodeRef>,
    ) -> Result<NodeRef, ParseError> {
        let test = if self.current == Token::Semicolon {
            None
        } else {
            Some(self.with_in(Self::parse_expression)?)
        };
        self.eat(&Token::Semicolon)?;
        let update = if self.current == Token::RightParen {
            None
        } else {
            Some(self.with_in(Self::parse_expression)?)
        };
        self.eat(&Token::RightParen)?;
        self.in_iteration += 1;
        let body = self.parse_statement();
        self.in_iteration -= 1;
        Ok(self.finish_node(
            NodeKind::ForStatement {
                init,
                test,
                update,
                body: body?,
            },
            start,
        ))
    }

    fn parse_for_in_tail(
        &mut self,
        start: (usize, crate::lexer::Position),
        left: NodeRef,
    ) -> Result<NodeRef, ParseError> {
        self.advance()?; // in
        let right = self.with_in(Self::parse_expression)?;
        self.eat(&Token::RightParen)?;
        self.in_iteration += 1;
        let body = self.parse_statement();
        self.in_iteration -= 1;
        Ok(self.finish_node(
            NodeKind::ForInStatement {
                left,
                right,
                body: body?,
            },
            start,
        ))
    }

    fn parse_switch(&mut self) -> Result<NodeRef, ParseError> {
        self.settle_pending_labels();
        let start = self.node_start();
        self.advance()?; // switch
        self.eat(&Token::LeftParen)?;
        let discriminant = self.with_in(Self::parse_expression)?;
        self.eat(&Token::RightParen)?;
        self.eat(&Token::LeftBrace)?;
        let mut cases = Vec::new();
        let mut seen_default = false;
        self.in_switch += 1;
        let result = (|| {
            while self.current != Token::RightBrace {
                let case_start = self.node_start();
                let test = if self.eat_if(&Token::Keyword(Keyword::Case))? {
                    Some(self.with_in(Self::parse_expression)?)
                } else if self.eat_if(&Token::Keyword(Keyword::Default))? {
                    if seen_default {
                        return Err(self.error("Multiple default clauses in switch statement"));
                    }
                    seen_default = true;
                    None
                } else {
                    return Err(self.error("Expected 'case' or 'default'"));
                };
                self.eat(&Token::Colon)?;
                let mut consequent = Vec::new();
                while !matches!(
                    self.current,
                    Token::RightBrace
                        | Token::Keyword(Keyword::Case)
                        | Token::Keyword(Keyword::Default)
                ) {
                    consequent.push(self.parse_statement()?);
                }
                cases.push(
                    self.finish_node(NodeKind::SwitchCase { test, consequent }, case_start),
                );
            }
            Ok(())
        })();
        self.in_switch -= 1;
        result?;
        self.advance()?; // }
        Ok(self.finish_node(NodeKind::SwitchStatement { discriminant, cases }, start))
    }

    fn parse_try(&mut self) -> Result<NodeRef, ParseError> {
        self.settle_pending_labels();
        let start = self.node_start();
        self.advance()?; // try
        let block = self.parse_block()?;
        let handler = if self.current == Token::Keyword(Keyword::Catch) {
            let clause_start = self.node_start();
            self.advance()?;
            self.eat(&Token::LeftParen)?;
            let param = self.parse_identifier()?;
            if let Some(name) = param.identifier_name() {
                self.check_binding_identifier(name)?;
            }
            self.eat(&Token::RightParen)?;
            let body = self.parse_block()?;
            Some(self.finish_node(NodeKind::CatchClause { param, body }, clause_start))
        } else {
            None
        };
        let finalizer = if self.eat_if(&Token::Keyword(Keyword::Finally))? {
            Some(self.parse_block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error("Missing catch or finally after try"));
        }
        Ok(self.finish_node(
            NodeKind::TryStatement {
                block,
                handler,
                finalizer,
            },
            start,
        ))
    }

    fn parse_throw(&mut self) -> Result<NodeRef, ParseError> {
        self.settle_pending_labels();
        let start = self.node_start();
        self.advance()?; // throw
        if self.prev_line_terminator {
            return Err(self.error("Illegal newline after throw"));
        }
        let argument = self.with_in(Self::parse_expression)?;
        self.eat_semicolon()?;
        Ok(self.finish_node(NodeKind::ThrowStatement { argument }, start))
    }

    fn parse_return(&mut self) -> Result<NodeRef, ParseError> {
        self.settle_pending_labels();
        if self.in_function == 0 {
            return Err(self.error("'return' outside of function"));
        }
        let start = self.node_start();
        self.advance()?; // return
        let argument = if self.current == Token::Semicolon || self.can_insert_semicolon() {
            None
        } else {
            Some(self.with_in(Self::parse_expression)?)
        };
        self.eat_semicolon()?;
        Ok(self.finish_node(NodeKind::ReturnStatement { argument }, start))
    }

    fn parse_break_continue(&mut self, is_break: bool) -> Result<NodeRef, ParseError> {
        self.settle_pending_labels();
        let start = self.node_start();
        self.advance()?;
        let label = if !self.prev_line_terminator && self.current_is_identifier() {
            Some(self.parse_identifier()?)
        } else {
            None
        };
        match &label {
            Some(label_node) => {
                let name = label_node.identifier_name().unwrap_or_default().to_string();
                match self.find_label(&name) {
                    None => {
                        return Err(self.error(format!("Undefined label '{name}'")));
                    }
                    Some(found) => {
                        if !is_break && !found.is_iteration {
                            return Err(self.error(format!(
                                "Label '{name}' does not mark an enclosing iteration statement"
                            )));
                        }
                    }
                }
            }
            None => {
                if is_break {
                    if self.in_iteration == 0 && self.in_switch == 0 {
                        return Err(self.error("'break' outside of loop or switch"));
                    }
                } else if self.in_iteration == 0 {
                    return Err(self.error("'continue' outside of loop"));
                }
            }
        }
        self.eat_semicolon()?;
        let kind = if is_break {
            NodeKind::BreakStatement { label }
        } else {
            NodeKind::ContinueStatement { label }
        };
        Ok(self.finish_node(kind, start))
    }

    fn parse_with(&mut self) -> Result<NodeRef, ParseError> {
        self.settle_pending_labels();
        if self.is_strict() {
            return Err(self.error("'with' in strict mode"));
        }
        let start = self.node_start();
        self.advance()?; // with
        self.eat(&Token::LeftParen)?;
        let object = self.with_in(Self::parse_expression)?;
        self.eat(&Token::RightParen)?;
        let body = self.parse_statement()?;
        Ok(self.finish_node(NodeKind::WithStatement { object, body }, start))
    }

    fn parse_labeled_or_expression(&mut self) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        let expression = self.with_in(Self::parse_expression)?;
        if expression.identifier_name().is_some() && self.current == Token::Colon {
            let name = expression.identifier_name().unwrap().to_string();
            self.advance()?;
            self.push_label(name)?;
            let body = self.parse_statement();
            self.pop_label();
            return Ok(self.finish_node(
                NodeKind::LabeledStatement {
                    label: expression,
                    body: body?,
                },
                start,
            ));
        }
        self.settle_pending_labels();
        self.eat_semicolon()?;
        Ok(self.finish_node(NodeKind::ExpressionStatement { expression }, start))
    }

    /// Shared by function declarations and function expressions.
    pub(crate) fn parse_function(&mut self, is_declaration: bool) -> Result<NodeRef, ParseError> {
        let start = self.node_start();
        self.advance()?; // function
        let id = if self.current_is_identifier() {
            let id = self.parse_identifier()?;
            if let Some(name) = id.identifier_name() {
                self.check_binding_identifier(name)?;
            }
            Some(id)
        } else if is_declaration {
            return Err(self.error("Function declaration requires a name"));
        } else {
            None
        };

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

        // Function bodies get fresh label/loop/switch contexts; strict mode
        // inherits and may additionally be switched on by a directive.
        let outer_strict = self.is_strict();
        let outer_labels = std::mem::take(&mut self.labels);
        let outer_iteration = std::mem::replace(&mut self.in_iteration, 0);
        let outer_switch = std::mem::replace(&mut self.in_switch, 0);
        self.in_function += 1;

        let body = self.parse_function_body(&params, id.as_ref());

        self.in_function -= 1;
        self.in_switch = outer_switch;
        self.in_iteration = outer_iteration;
        self.labels = outer_labels;
        self.set_strict(outer_strict);
        let body = body?;

        let kind = if is_declaration {
            NodeKind::FunctionDeclaration {
                id: id.expect("declaration always has a name"),
                params,
                body,
            }
        } else {
            NodeKind::FunctionExpression { id, params, body }
        };
        Ok(self.finish_node(kind, start))
    }

    fn parse_function_body(
        &mut self,
        params: &[NodeRef],
        id: Option<&NodeRef>,
    ) -> Result<NodeRef, ParseError> {
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
                            self.check_strict_function(params, id)?;
                        }
                    }
                    None => in_prologue = false,
                }
            }
            body.push(stmt);
        }
        self.advance()?;
        if self.is_strict() {
            self.check_strict_function(params, id)?;
        }
        Ok(self.finish_node(NodeKind::BlockStatement { body }, start))
    }

    // Name and parameters were parsed before a "use strict" directive could
    // take effect, so re-validate them once strictness is known.
    fn check_strict_function(
        &self,
        params: &[NodeRef],
        id: Option<&NodeRef>,
    ) -> Result<(), ParseError> {
        if let Some(id) = id {
            if let Some(name) = id.identifier_name() {
                self.check_binding_identifier(name)?;
            }
        }
        let mut seen = HashSet::new();
        for param in params {
            if let Some(name) = param.identifier_name() {
                self.check_binding_identifier(name)?;
                if !seen.insert(name.to_string()) {
                    return Err(self.error(format!(
                        "Duplicate parameter name '{name}' not allowed in strict mode"
                    )));
                }
            }
        }
        Ok(())
    }
}
