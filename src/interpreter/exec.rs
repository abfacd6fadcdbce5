//! Step handlers for statement nodes. Each handler advances the top frame by
//! one sub-state: push a child frame, mutate scratch state, or pop.

use super::helpers::to_boolean;
use super::types::{CompletionType, Reference, State, StepResult};
use super::{ErrorKind, Interpreter};
use crate::ast::{NodeKind, NodeRef};
use crate::types::Value;

impl Interpreter {
    pub(crate) fn step_program(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::Program { body } = &node.kind else {
            return Ok(());
        };
        let index = self.top_mut().index;
        let next = body.borrow().get(index).cloned();
        match next {
            Some(stmt) => {
                let st = self.top_mut();
                st.index += 1;
                let scope = st.scope.clone();
                let this = st.this_value.clone();
                self.push_state(State::new(stmt, scope, this));
            }
            None => {
                // The Program frame is never popped; `append_code` may
                // revive it.
                self.top_mut().done = true;
            }
        }
        Ok(())
    }

    pub(crate) fn step_eval_program(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::EvalProgram { body } = &node.kind else {
            return Ok(());
        };
        let index = self.top_mut().index;
        match body.get(index).cloned() {
            Some(stmt) => {
                let st = self.top_mut();
                st.index += 1;
                let scope = st.scope.clone();
                let this = st.this_value.clone();
                self.push_state(State::new(stmt, scope, this));
            }
            None => {
                // Hand the eval result up, restoring the interpreter-level
                // completion value that was saved at frame creation.
                let result = self.value().clone();
                let saved = self.top_mut().left_value.clone();
                self.set_completion_value(saved);
                self.pop_with_value(result);
            }
        }
        Ok(())
    }

    pub(crate) fn step_block(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::BlockStatement { body } = &node.kind else {
            return Ok(());
        };
        let index = self.top_mut().index;
        match body.get(index).cloned() {
            Some(stmt) => {
                let st = self.top_mut();
                st.index += 1;
                let scope = st.scope.clone();
                let this = st.this_value.clone();
                self.push_state(State::new(stmt, scope, this));
            }
            None => self.pop_state(),
        }
        Ok(())
    }

    pub(crate) fn step_expression_statement(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::ExpressionStatement { expression } = &node.kind else {
            return Ok(());
        };
        let st = self.top_mut();
        if !st.done {
            st.done = true;
            let scope = st.scope.clone();
            let this = st.this_value.clone();
            self.push_state(State::new(expression.clone(), scope, this));
            return Ok(());
        }
        // Record the value for eval-style embedding.
        let value = st.value.clone();
        self.set_completion_value(value);
        self.pop_state();
        Ok(())
    }

    /// Shared by `if` statements and ternary expressions.
    pub(crate) fn step_conditional(&mut self, node: &NodeRef) -> StepResult {
        let (test, consequent, alternate, is_expression) = match &node.kind {
            NodeKind::IfStatement {
                test,
                consequent,
                alternate,
            } => (test, consequent, alternate.as_ref(), false),
            NodeKind::ConditionalExpression {
                test,
                consequent,
                alternate,
            } => (test, consequent, Some(alternate), true),
            _ => return Ok(()),
        };
        let st = self.top_mut();
        match st.mode {
            0 => {
                st.mode = 1;
                let scope = st.scope.clone();
                let this = st.this_value.clone();
                self.push_state(State::new(test.clone(), scope, this));
            }
            1 => {
                st.mode = 2;
                let branch = if to_boolean(&st.value) {
                    Some(consequent.clone())
                } else {
                    alternate.cloned()
                };
                match branch {
                    Some(branch) => {
                        let scope = st.scope.clone();
                        let this = st.this_value.clone();
                        self.push_state(State::new(branch, scope, this));
                    }
                    None => self.pop_state(),
                }
            }
            _ => {
                if is_expression {
                    let value = st.value.clone();
                    self.pop_with_value(value);
                } else {
                    self.pop_state();
                }
            }
        }
        Ok(())
    }

    /// `while` and `do…while`; the latter starts in the body.
    pub(crate) fn step_while(&mut self, node: &NodeRef) -> StepResult {
        let (test, body, body_first) = match &node.kind {
            NodeKind::WhileStatement { test, body } => (test, body, false),
            NodeKind::DoWhileStatement { body, test } => (test, body, true),
            _ => return Ok(()),
        };
        let st = self.top_mut();
        st.is_loop = true;
        let scope = st.scope.clone();
        let this = st.this_value.clone();
        match st.mode {
            0 => {
                if body_first {
                    st.mode = 1;
                    self.push_state(State::new(body.clone(), scope, this));
                } else {
                    st.mode = 2;
                    self.push_state(State::new(test.clone(), scope, this));
                }
            }
            1 => {
                // Body finished; evaluate the test.
                st.mode = 2;
                self.push_state(State::new(test.clone(), scope, this));
            }
            _ => {
                if to_boolean(&st.value) {
                    st.mode = 1;
                    self.push_state(State::new(body.clone(), scope, this));
                } else {
                    self.pop_state();
                }
            }
        }
        Ok(())
    }

    // Modes: 0 init, 1 test, 2 test-result/body, 3 update.
    pub(crate) fn step_for(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::ForStatement {
            init,
            test,
            update,
            body,
        } = &node.kind
        else {
            return Ok(());
        };
        let st = self.top_mut();
        st.is_loop = true;
        let scope = st.scope.clone();
        let this = st.this_value.clone();
        match st.mode {
            0 => {
                st.mode = 1;
                if let Some(init) = init {
                    self.push_state(State::new(init.clone(), scope, this));
                }
            }
            1 => {
                st.mode = 2;
                match test {
                    Some(test) => self.push_state(State::new(test.clone(), scope, this)),
                    None => st.value = Value::Boolean(true),
                }
            }
            2 => {
                if to_boolean(&st.value) {
                    st.mode = 3;
                    self.push_state(State::new(body.clone(), scope, this));
                } else {
                    self.pop_state();
                }
            }
            _ => {
                st.mode = 1;
                if let Some(update) = update {
                    self.push_state(State::new(update.clone(), scope, this));
                }
            }
        }
        Ok(())
    }

    /// Enumerate own enumerable keys of the object, then of each prototype,
    /// skipping names already seen. Keys are snapshotted per chain level.
    pub(crate) fn step_for_in(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::ForInStatement { left, right, body } = &node.kind else {
            return Ok(());
        };
        {
            let st = self.top_mut();
            st.is_loop = true;
            if !st.done_object {
                st.done_object = true;
                let scope = st.scope.clone();
                let this = st.this_value.clone();
                self.push_state(State::new(right.clone(), scope, this));
                return Ok(());
            }
            if st.mode == 0 {
                st.mode = 1;
                let subject = st.value.clone();
                if subject.is_nullish() {
                    self.pop_state();
                    return Ok(());
                }
                self.top_mut().iter_object = Some(subject);
            }
        }

        // Find the next property name, walking up the chain as levels
        // exhaust.
        if self.top_mut().name.is_none() {
            loop {
                let Some(current) = self.top_mut().iter_object.clone() else {
                    self.pop_state();
                    return Ok(());
                };
                if self.top_mut().props.is_none() {
                    let keys = self.own_keys_for_enum(&current);
                    let st = self.top_mut();
                    st.props = Some(keys.into_iter().rev().collect());
                }
                let next = self.top_mut().props.as_mut().and_then(|p| p.pop());
                match next {
                    None => {
                        let proto = self.proto_of_value(&current);
                        let st = self.top_mut();
                        st.props = None;
                        match proto {
                            Some(proto) => st.iter_object = Some(proto),
                            None => {
                                self.pop_state();
                                return Ok(());
                            }
                        }
                    }
                    Some(key) => {
                        if !self.top_mut().visited.insert(key.clone()) {
                            continue;
                        }
                        // Deleted keys are skipped; shadowing includes
                        // non-enumerable own properties.
                        if self.is_enumerable_on(&current, &key) {
                            self.top_mut().name = Some(key);
                            break;
                        }
                    }
                }
            }
        }

        // Assign the name to the loop variable, trampolining a setter if
        // the target has one.
        if !self.top_mut().done_variable {
            self.top_mut().done_variable = true;
            if let NodeKind::VariableDeclaration { declarations } = &left.kind {
                let name = declarations
                    .first()
                    .and_then(|d| match &d.kind {
                        NodeKind::VariableDeclarator { id, .. } => {
                            id.identifier_name().map(|s| s.to_string())
                        }
                        _ => None,
                    })
                    .unwrap_or_default();
                self.top_mut().variable = Some(Reference::Scope(name));
            } else {
                let st = self.top_mut();
                let scope = st.scope.clone();
                let this = st.this_value.clone();
                self.push_state(State::new(left.clone(), scope, this).with_components());
                return Ok(());
            }
        }
        if self.top_mut().variable.is_none() {
            let r = self.top_mut().ref_value.take();
            self.top_mut().variable = r;
        }
        if !self.top_mut().done_setter {
            self.top_mut().done_setter = true;
            let key = self.top_mut().name.clone().unwrap_or_default();
            let Some(target) = self.top_mut().variable.clone() else {
                return Err(self.throw_error(ErrorKind::Type, "Invalid for-in target"));
            };
            let setter = self.set_reference_value(&target, Value::string(&key))?;
            if let Some(setter) = setter {
                let base = self.reference_base(&target);
                self.push_trampoline(setter, base, vec![Value::string(&key)]);
                return Ok(());
            }
        }

        // Run the body, then start the next iteration.
        let st = self.top_mut();
        st.name = None;
        st.done_variable = false;
        st.done_setter = false;
        st.variable = if matches!(left.kind, NodeKind::VariableDeclaration { .. }) {
            st.variable.take()
        } else {
            None
        };
        let scope = st.scope.clone();
        let this = st.this_value.clone();
        self.push_state(State::new(body.clone(), scope, this));
        Ok(())
    }

    // Modes: 0 discriminant, 1 scanning cases, 2 executing consequents.
    pub(crate) fn step_switch(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::SwitchStatement {
            discriminant,
            cases,
        } = &node.kind
        else {
            return Ok(());
        };
        let st = self.top_mut();
        st.is_switch = true;
        let scope = st.scope.clone();
        let this = st.this_value.clone();
        match st.mode {
            0 => {
                st.mode = 1;
                self.push_state(State::new(discriminant.clone(), scope, this));
            }
            1 => {
                if !st.matched {
                    if !st.done {
                        // First entry after the discriminant.
                        st.done = true;
                        st.switch_value = st.value.clone();
                    } else {
                        // A case test just finished.
                        let test_value = st.value.clone();
                        if test_value.strict_eq(&st.switch_value) {
                            st.matched = true;
                            st.n = 0;
                            st.mode = 2;
                            return Ok(());
                        }
                        st.index += 1;
                    }
                }
                loop {
                    let st = self.top_mut();
                    let Some(case) = cases.get(st.index) else {
                        // No case matched: jump to the deferred default.
                        match st.default_case.take() {
                            Some(default_index) => {
                                st.matched = true;
                                st.index = default_index;
                                st.n = 0;
                                st.mode = 2;
                            }
                            None => self.pop_state(),
                        }
                        return Ok(());
                    };
                    let NodeKind::SwitchCase { test, .. } = &case.kind else {
                        return Ok(());
                    };
                    match test {
                        None => {
                            st.default_case = Some(st.index);
                            st.index += 1;
                            continue;
                        }
                        Some(test) => {
                            let scope = st.scope.clone();
                            let this = st.this_value.clone();
                            self.push_state(State::new(test.clone(), scope, this));
                            return Ok(());
                        }
                    }
                }
            }
            _ => {
                // Execute consequents with fall-through.
                loop {
                    let st = self.top_mut();
                    let Some(case) = cases.get(st.index) else {
                        self.pop_state();
                        return Ok(());
                    };
                    let NodeKind::SwitchCase { consequent, .. } = &case.kind else {
                        return Ok(());
                    };
                    match consequent.get(st.n).cloned() {
                        Some(stmt) => {
                            st.n += 1;
                            let scope = st.scope.clone();
                            let this = st.this_value.clone();
                            self.push_state(State::new(stmt, scope, this));
                            return Ok(());
                        }
                        None => {
                            st.index += 1;
                            st.n = 0;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn step_break_continue(&mut self, node: &NodeRef) -> StepResult {
        let (typ, label) = match &node.kind {
            NodeKind::BreakStatement { label } => (CompletionType::Break, label),
            NodeKind::ContinueStatement { label } => (CompletionType::Continue, label),
            _ => return Ok(()),
        };
        let label = label
            .as_ref()
            .and_then(|l| l.identifier_name())
            .map(|s| s.to_string());
        self.unwind(typ, Value::Undefined, label);
        Ok(())
    }

    pub(crate) fn step_return(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::ReturnStatement { argument } = &node.kind else {
            return Ok(());
        };
        let st = self.top_mut();
        if let Some(argument) = argument {
            if !st.done {
                st.done = true;
                let scope = st.scope.clone();
                let this = st.this_value.clone();
                self.push_state(State::new(argument.clone(), scope, this));
                return Ok(());
            }
        }
        let value = st.value.clone();
        self.unwind(CompletionType::Return, value, None);
        Ok(())
    }

    pub(crate) fn step_throw(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::ThrowStatement { argument } = &node.kind else {
            return Ok(());
        };
        let st = self.top_mut();
        if !st.done {
            st.done = true;
            let scope = st.scope.clone();
            let this = st.this_value.clone();
            self.push_state(State::new(argument.clone(), scope, this));
            return Ok(());
        }
        let value = st.value.clone();
        Err(self.throw_value(value))
    }

    pub(crate) fn step_try(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::TryStatement {
            block,
            handler,
            finalizer,
        } = &node.kind
        else {
            return Ok(());
        };
        let st = self.top_mut();
        let scope = st.scope.clone();
        let this = st.this_value.clone();
        if !st.done_left {
            st.done_left = true;
            self.push_state(State::new(block.clone(), scope, this));
            return Ok(());
        }
        let throws = st
            .cv
            .as_ref()
            .is_some_and(|cv| cv.typ == CompletionType::Throw);
        if throws && !st.done_right && handler.is_some() {
            st.done_right = true;
            let cv = st.cv.take();
            let handler = handler.clone().unwrap_or_else(|| block.clone());
            let mut catch_state = State::new(handler, scope, this);
            if let Some(cv) = cv {
                catch_state.value = cv.value;
            }
            self.push_state(catch_state);
            return Ok(());
        }
        if !st.done_exec {
            st.done_exec = true;
            if let Some(finalizer) = finalizer {
                self.push_state(State::new(finalizer.clone(), scope, this));
                return Ok(());
            }
        }
        match st.cv.take() {
            Some(cv) => {
                // The completion resumes its journey past this frame.
                self.pop_state();
                if cv.typ == CompletionType::Throw {
                    let _ = self.throw_value(cv.value);
                } else {
                    self.unwind(cv.typ, cv.value, cv.label);
                }
            }
            None => self.pop_state(),
        }
        Ok(())
    }

    pub(crate) fn step_catch_clause(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::CatchClause { param, body } = &node.kind else {
            return Ok(());
        };
        let st = self.top_mut();
        if !st.done {
            st.done = true;
            let exception = st.value.clone();
            let scope = st.scope.clone();
            let this = st.this_value.clone();
            let catch_scope = self.create_special_scope(scope, None);
            if let Some(name) = param.identifier_name() {
                let obj = self.object(catch_scope.object);
                let mut od = obj.borrow_mut();
                od.insert_ordered(name, exception);
                od.not_configurable.insert(name.to_string());
            }
            self.push_state(State::new(body.clone(), catch_scope, this));
            return Ok(());
        }
        self.pop_state();
        Ok(())
    }

    pub(crate) fn step_with(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::WithStatement { object, body } = &node.kind else {
            return Ok(());
        };
        let st = self.top_mut();
        let scope = st.scope.clone();
        let this = st.this_value.clone();
        if !st.done_object {
            st.done_object = true;
            self.push_state(State::new(object.clone(), scope, this));
            return Ok(());
        }
        if !st.done {
            st.done = true;
            let subject = st.value.clone();
            if subject.is_nullish() {
                return Err(self.throw_error(
                    ErrorKind::Type,
                    "Cannot convert undefined or null to object",
                ));
            }
            let subject = match subject {
                Value::Object(_) => subject,
                primitive => self.box_primitive(&primitive),
            };
            let Value::Object(handle) = subject else {
                return Ok(());
            };
            let with_scope = self.create_special_scope(scope, Some(handle));
            self.push_state(State::new(body.clone(), with_scope, this));
            return Ok(());
        }
        self.pop_state();
        Ok(())
    }

    /// Replaces itself with its body frame, accumulating label names for
    /// `break`/`continue` targeting.
    pub(crate) fn step_labeled(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::LabeledStatement { label, body } = &node.kind else {
            return Ok(());
        };
        let st = self.top_mut();
        let mut labels = std::mem::take(&mut st.labels);
        if let Some(name) = label.identifier_name() {
            labels.push(name.to_string());
        }
        let scope = st.scope.clone();
        let this = st.this_value.clone();
        self.pop_state();
        let mut body_state = State::new(body.clone(), scope, this);
        body_state.labels = labels;
        self.push_state(body_state);
        Ok(())
    }

    pub(crate) fn step_variable_declaration(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::VariableDeclaration { declarations } = &node.kind else {
            return Ok(());
        };
        loop {
            let st = self.top_mut();
            let Some(decl) = declarations.get(st.n) else {
                self.pop_state();
                return Ok(());
            };
            let NodeKind::VariableDeclarator { id, init } = &decl.kind else {
                self.pop_state();
                return Ok(());
            };
            match init {
                Some(init) => {
                    if !st.done {
                        st.done = true;
                        let scope = st.scope.clone();
                        let this = st.this_value.clone();
                        self.push_state(State::new(init.clone(), scope, this));
                        return Ok(());
                    }
                    let value = st.value.clone();
                    st.done = false;
                    st.n += 1;
                    if let Some(name) = id.identifier_name() {
                        let name = name.to_string();
                        // A setter here can only come from a `with` binding
                        // table; its invocation is intentionally skipped.
                        self.set_value_to_scope(&name, value)?;
                    }
                    return Ok(());
                }
                None => {
                    // Binding was hoisted; nothing to evaluate.
                    st.n += 1;
                }
            }
        }
    }
}
