//! Step handlers for expression nodes, including the call machinery and the
//! getter/setter trampolines.

use super::helpers::{self, to_boolean, PrimitiveHint};
use super::types::{FunctionKind, Reference, ScopeRef, State, StepResult};
use super::{ErrorKind, Interpreter, PropGet};
use crate::ast::{BinaryOp, LiteralValue, LogicalOp, NodeKind, NodeRef, UnaryOp, UpdateOp};
use crate::types::{ObjectHandle, Value};
use std::rc::Rc;

impl Interpreter {
    pub(crate) fn step_literal(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::Literal { value } = &node.kind else {
            return Ok(());
        };
        let value = match value {
            LiteralValue::Null => Value::Null,
            LiteralValue::Boolean(b) => Value::Boolean(*b),
            LiteralValue::Number(n) => Value::Number(*n),
            LiteralValue::String(s) => Value::String(s.clone()),
            LiteralValue::RegExp { pattern, flags } => {
                let pattern = pattern.clone();
                let flags = flags.clone();
                self.create_regexp(&pattern, &flags)?
            }
        };
        self.pop_with_value(value);
        Ok(())
    }

    pub(crate) fn step_identifier(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::Identifier { name } = &node.kind else {
            return Ok(());
        };
        let st = self.top_mut();
        if st.components {
            let r = Reference::Scope(name.clone());
            self.pop_with_reference(r);
            return Ok(());
        }
        if st.done_getter {
            let value = st.value.clone();
            self.pop_with_value(value);
            return Ok(());
        }
        let name = name.clone();
        match self.get_value_from_scope(&name)? {
            (PropGet::Plain(value), _) => self.pop_with_value(value),
            (PropGet::Getter(getter), base) => {
                // A `with` binding table with an accessor property.
                self.top_mut().done_getter = true;
                self.push_trampoline(getter, base, Vec::new());
            }
        }
        Ok(())
    }

    pub(crate) fn step_function_expression(&mut self, node: &NodeRef) -> StepResult {
        let scope = self.top_mut().scope.clone();
        let func = self.create_guest_function(node.clone(), scope);
        self.pop_with_value(func);
        Ok(())
    }

    pub(crate) fn step_sequence(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::SequenceExpression { expressions } = &node.kind else {
            return Ok(());
        };
        let st = self.top_mut();
        match expressions.get(st.n).cloned() {
            Some(expr) => {
                st.n += 1;
                let scope = st.scope.clone();
                let this = st.this_value.clone();
                self.push_state(State::new(expr, scope, this));
            }
            None => {
                let value = st.value.clone();
                self.pop_with_value(value);
            }
        }
        Ok(())
    }

    pub(crate) fn step_array_expression(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::ArrayExpression { elements } = &node.kind else {
            return Ok(());
        };
        {
            let st = self.top_mut();
            if st.done {
                st.done = false;
                let value = st.value.clone();
                st.elements.push(Some(value));
                st.n += 1;
            }
        }
        loop {
            let st = self.top_mut();
            if st.n >= elements.len() {
                break;
            }
            match &elements[st.n] {
                None => {
                    st.elements.push(None);
                    st.n += 1;
                }
                Some(expr) => {
                    st.done = true;
                    let scope = st.scope.clone();
                    let this = st.this_value.clone();
                    self.push_state(State::new(expr.clone(), scope, this));
                    return Ok(());
                }
            }
        }
        let collected = std::mem::take(&mut self.top_mut().elements);
        let handle = self.create_array();
        let array = Value::Object(handle);
        for (index, element) in collected.into_iter().enumerate() {
            if let Some(value) = element {
                self.set_property_runtime(&array, &index.to_string(), value, false)?;
            }
        }
        // Holes still count toward length.
        self.set_property_runtime(
            &array,
            "length",
            Value::Number(elements.len() as f64),
            false,
        )?;
        self.pop_with_value(array);
        Ok(())
    }

    pub(crate) fn step_object_expression(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::ObjectExpression { properties } = &node.kind else {
            return Ok(());
        };
        {
            let st = self.top_mut();
            if st.done {
                st.done = false;
                let value = st.value.clone();
                st.elements.push(Some(value));
                st.n += 1;
            }
        }
        let next = {
            let st = self.top_mut();
            properties.get(st.n).cloned()
        };
        if let Some(prop) = next {
            if let NodeKind::Property { value, .. } = &prop.kind {
                let st = self.top_mut();
                st.done = true;
                let scope = st.scope.clone();
                let this = st.this_value.clone();
                self.push_state(State::new(value.clone(), scope, this));
                return Ok(());
            }
        }

        let values = std::mem::take(&mut self.top_mut().elements);
        let handle = self.create_object();
        for (prop, value) in properties.iter().zip(values.into_iter()) {
            let NodeKind::Property { key, kind, .. } = &prop.kind else {
                continue;
            };
            let Some(value) = value else { continue };
            let name = property_key_name(self, key);
            match kind {
                crate::ast::PropertyKind::Init => {
                    let obj = self.object(handle);
                    obj.borrow_mut().insert_ordered(&name, value);
                }
                crate::ast::PropertyKind::Get => {
                    self.define_own(
                        handle,
                        &name,
                        super::Descriptor {
                            get: Some(value),
                            enumerable: Some(true),
                            configurable: Some(true),
                            ..Default::default()
                        },
                    );
                }
                crate::ast::PropertyKind::Set => {
                    self.define_own(
                        handle,
                        &name,
                        super::Descriptor {
                            set: Some(value),
                            enumerable: Some(true),
                            configurable: Some(true),
                            ..Default::default()
                        },
                    );
                }
            }
        }
        self.pop_with_value(Value::Object(handle));
        Ok(())
    }

    pub(crate) fn step_binary(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::BinaryExpression {
            operator,
            left,
            right,
        } = &node.kind
        else {
            return Ok(());
        };
        let st = self.top_mut();
        let scope = st.scope.clone();
        let this = st.this_value.clone();
        if !st.done_left {
            st.done_left = true;
            self.push_state(State::new(left.clone(), scope, this));
            return Ok(());
        }
        if !st.done_right {
            st.done_right = true;
            st.left_value = st.value.clone();
            self.push_state(State::new(right.clone(), scope, this));
            return Ok(());
        }
        let a = st.left_value.clone();
        let b = st.value.clone();
        let result = self.binary_op(*operator, &a, &b)?;
        self.pop_with_value(result);
        Ok(())
    }

    pub(crate) fn step_logical(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::LogicalExpression {
            operator,
            left,
            right,
        } = &node.kind
        else {
            return Ok(());
        };
        let st = self.top_mut();
        let scope = st.scope.clone();
        let this = st.this_value.clone();
        if !st.done_left {
            st.done_left = true;
            self.push_state(State::new(left.clone(), scope, this));
            return Ok(());
        }
        if !st.done_right {
            let take_right = match operator {
                LogicalOp::And => to_boolean(&st.value),
                LogicalOp::Or => !to_boolean(&st.value),
            };
            if !take_right {
                let value = st.value.clone();
                self.pop_with_value(value);
                return Ok(());
            }
            st.done_right = true;
            self.push_state(State::new(right.clone(), scope, this));
            return Ok(());
        }
        let value = st.value.clone();
        self.pop_with_value(value);
        Ok(())
    }

    pub(crate) fn step_unary(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::UnaryExpression { operator, argument } = &node.kind else {
            return Ok(());
        };
        let st = self.top_mut();
        if !st.done {
            st.done = true;
            let scope = st.scope.clone();
            let this = st.this_value.clone();
            let mut child = State::new(argument.clone(), scope, this);
            // `delete` and `typeof` operate on the reference, not the value.
            child.components = matches!(operator, UnaryOp::Delete | UnaryOp::Typeof);
            self.push_state(child);
            return Ok(());
        }
        let result = match operator {
            UnaryOp::Minus => {
                let value = st.value.clone();
                Value::Number(-self.to_number_value(&value))
            }
            UnaryOp::Plus => {
                let value = st.value.clone();
                Value::Number(self.to_number_value(&value))
            }
            UnaryOp::Not => Value::Boolean(!to_boolean(&st.value)),
            UnaryOp::BitNot => {
                let value = st.value.clone();
                Value::Number(f64::from(!helpers::to_int32(self.to_number_value(&value))))
            }
            UnaryOp::Void => Value::Undefined,
            UnaryOp::Typeof => {
                if st.done_getter {
                    let value = st.value.clone();
                    Value::string(self.type_of(&value))
                } else {
                    match st.ref_value.take() {
                        None => {
                            let value = st.value.clone();
                            Value::string(self.type_of(&value))
                        }
                        Some(Reference::Scope(name)) => {
                            // Undeclared identifiers read as "undefined".
                            if !self.scope_resolves(&name) {
                                Value::string("undefined")
                            } else {
                                match self.get_value_from_scope(&name)? {
                                    (PropGet::Plain(v), _) => Value::string(self.type_of(&v)),
                                    (PropGet::Getter(getter), base) => {
                                        self.top_mut().done_getter = true;
                                        self.push_trampoline(getter, base, Vec::new());
                                        return Ok(());
                                    }
                                }
                            }
                        }
                        Some(Reference::Member(base, name)) => {
                            match self.get_property_raw(&base, &name)? {
                                PropGet::Plain(v) => Value::string(self.type_of(&v)),
                                PropGet::Getter(getter) => {
                                    self.top_mut().done_getter = true;
                                    self.push_trampoline(getter, base, Vec::new());
                                    return Ok(());
                                }
                            }
                        }
                    }
                }
            }
            UnaryOp::Delete => {
                let strict = st.scope.strict;
                match st.ref_value.take() {
                    None => Value::Boolean(true),
                    Some(Reference::Scope(name)) => {
                        // Declared bindings are non-configurable; implicit
                        // globals delete like normal properties.
                        let target = self.scope_object_holding(&name);
                        match target {
                            Some(object) => {
                                Value::Boolean(self.delete_property(&object, &name, strict)?)
                            }
                            None => Value::Boolean(true),
                        }
                    }
                    Some(Reference::Member(base, name)) => {
                        Value::Boolean(self.delete_property(&base, &name, strict)?)
                    }
                }
            }
        };
        self.pop_with_value(result);
        Ok(())
    }

    pub(crate) fn step_update(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::UpdateExpression {
            operator, argument, prefix,
        } = &node.kind
        else {
            return Ok(());
        };
        {
            let st = self.top_mut();
            if !st.done {
                st.done = true;
                let scope = st.scope.clone();
                let this = st.this_value.clone();
                self.push_state(State::new(argument.clone(), scope, this).with_components());
                return Ok(());
            }
            if st.variable.is_none() {
                st.variable = st.ref_value.take();
            }
        }
        if !self.top_mut().done_left {
            if self.top_mut().done_getter {
                let st = self.top_mut();
                st.left_value = st.value.clone();
                st.done_left = true;
            } else {
                let Some(target) = self.top_mut().variable.clone() else {
                    return Err(self.throw_error(ErrorKind::Type, "Invalid update target"));
                };
                match self.get_reference_value(&target)? {
                    PropGet::Plain(value) => {
                        let st = self.top_mut();
                        st.left_value = value;
                        st.done_left = true;
                    }
                    PropGet::Getter(getter) => {
                        let base = self.reference_base(&target);
                        self.top_mut().done_getter = true;
                        self.push_trampoline(getter, base, Vec::new());
                        return Ok(());
                    }
                }
            }
        }
        if self.top_mut().done_setter {
            let result = self.top_mut().switch_value.clone();
            self.pop_with_value(result);
            return Ok(());
        }
        let old_value = self.top_mut().left_value.clone();
        let old = self.to_number_value(&old_value);
        let new = match operator {
            UpdateOp::Increment => old + 1.0,
            UpdateOp::Decrement => old - 1.0,
        };
        let result = Value::Number(if *prefix { new } else { old });
        let Some(target) = self.top_mut().variable.clone() else {
            return Err(self.throw_error(ErrorKind::Type, "Invalid update target"));
        };
        self.top_mut().switch_value = result.clone();
        match self.set_reference_value(&target, Value::Number(new))? {
            Some(setter) => {
                let base = self.reference_base(&target);
                self.top_mut().done_setter = true;
                self.push_trampoline(setter, base, vec![Value::Number(new)]);
                Ok(())
            }
            None => {
                self.pop_with_value(result);
                Ok(())
            }
        }
    }

    pub(crate) fn step_assignment(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::AssignmentExpression {
            operator,
            left,
            right,
        } = &node.kind
        else {
            return Ok(());
        };
        {
            let st = self.top_mut();
            if !st.done_left {
                st.done_left = true;
                let scope = st.scope.clone();
                let this = st.this_value.clone();
                self.push_state(State::new(left.clone(), scope, this).with_components());
                return Ok(());
            }
            if st.variable.is_none() {
                st.variable = st.ref_value.take();
            }
        }
        let compound = operator.binary_op();
        // Compound assignments read the target before evaluating the right
        // side; plain `=` skips straight there.
        if self.top_mut().mode == 0 {
            match compound {
                None => self.top_mut().mode = 1,
                Some(_) => {
                    if self.top_mut().done_getter {
                        let st = self.top_mut();
                        st.left_value = st.value.clone();
                        st.mode = 1;
                    } else {
                        let Some(target) = self.top_mut().variable.clone() else {
                            return Err(
                                self.throw_error(ErrorKind::Type, "Invalid assignment target")
                            );
                        };
                        match self.get_reference_value(&target)? {
                            PropGet::Plain(value) => {
                                let st = self.top_mut();
                                st.left_value = value;
                                st.mode = 1;
                            }
                            PropGet::Getter(getter) => {
                                let base = self.reference_base(&target);
                                self.top_mut().done_getter = true;
                                self.push_trampoline(getter, base, Vec::new());
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
        {
            let st = self.top_mut();
            if !st.done_right {
                st.done_right = true;
                let scope = st.scope.clone();
                let this = st.this_value.clone();
                self.push_state(State::new(right.clone(), scope, this));
                return Ok(());
            }
        }
        if self.top_mut().done_setter {
            // The setter's return value is discarded; the expression yields
            // the assigned value.
            let result = self.top_mut().switch_value.clone();
            self.pop_with_value(result);
            return Ok(());
        }
        let rhs = self.top_mut().value.clone();
        let result = match compound {
            Some(op) => {
                let lhs = self.top_mut().left_value.clone();
                self.binary_op(op, &lhs, &rhs)?
            }
            None => rhs,
        };
        let Some(target) = self.top_mut().variable.clone() else {
            return Err(self.throw_error(ErrorKind::Type, "Invalid assignment target"));
        };
        self.top_mut().switch_value = result.clone();
        match self.set_reference_value(&target, result.clone())? {
            Some(setter) => {
                let base = self.reference_base(&target);
                self.top_mut().done_setter = true;
                self.push_trampoline(setter, base, vec![result]);
                Ok(())
            }
            None => {
                self.pop_with_value(result);
                Ok(())
            }
        }
    }

    pub(crate) fn step_member(&mut self, node: &NodeRef) -> StepResult {
        let NodeKind::MemberExpression {
            object,
            property,
            computed,
        } = &node.kind
        else {
            return Ok(());
        };
        {
            let st = self.top_mut();
            let scope = st.scope.clone();
            let this = st.this_value.clone();
            if !st.done_object {
                st.done_object = true;
                self.push_state(State::new(object.clone(), scope, this));
                return Ok(());
            }
            if *computed && !st.done_right {
                st.done_right = true;
                st.left_value = st.value.clone();
                self.push_state(State::new(property.clone(), scope, this));
                return Ok(());
            }
        }
        if self.top_mut().done_getter {
            let value = self.top_mut().value.clone();
            self.pop_with_value(value);
            return Ok(());
        }
        let name = match self.top_mut().name.clone() {
            Some(name) => name,
            None => {
                let name = if *computed {
                    let key = self.top_mut().value.clone();
                    self.to_property_key(&key)
                } else {
                    property.identifier_name().unwrap_or_default().to_string()
                };
                self.top_mut().name = Some(name.clone());
                name
            }
        };
        let base = if *computed {
            self.top_mut().left_value.clone()
        } else {
            self.top_mut().value.clone()
        };
        if self.top_mut().components {
            self.pop_with_reference(Reference::Member(base, name));
            return Ok(());
        }
        match self.get_property_raw(&base, &name)? {
            PropGet::Plain(value) => self.pop_with_value(value),
            PropGet::Getter(getter) => {
                self.top_mut().done_getter = true;
                self.push_trampoline(getter, base, Vec::new());
            }
        }
        Ok(())
    }

    /// CallExpression and NewExpression: resolve the callee (possibly via a
    /// getter trampoline), evaluate arguments left to right, then dispatch
    /// on the function kind.
    pub(crate) fn step_call(&mut self, node: &NodeRef) -> StepResult {
        let (callee, arg_nodes, is_new) = match &node.kind {
            NodeKind::CallExpression { callee, arguments } => (callee, arguments, false),
            NodeKind::NewExpression { callee, arguments } => (callee, arguments, true),
            _ => return Ok(()),
        };
        {
            let st = self.top_mut();
            if st.done_callee == 0 {
                st.done_callee = 1;
                st.is_constructor = is_new;
                let scope = st.scope.clone();
                let this = st.this_value.clone();
                self.push_state(State::new(callee.clone(), scope, this).with_components());
                return Ok(());
            }
        }
        if self.top_mut().done_callee == 1 {
            self.top_mut().done_callee = 2;
            let reference = self.top_mut().ref_value.take();
            match reference {
                Some(r) => {
                    let this = match &r {
                        Reference::Member(base, _) => base.clone(),
                        Reference::Scope(_) => Value::Undefined,
                    };
                    self.top_mut().func_this = this;
                    match self.get_reference_value(&r)? {
                        PropGet::Plain(func) => {
                            self.top_mut().func = Some(func);
                        }
                        PropGet::Getter(getter) => {
                            let base = self.reference_base(&r);
                            self.push_trampoline(getter, base, Vec::new());
                            return Ok(());
                        }
                    }
                }
                None => {
                    let value = self.top_mut().value.clone();
                    let st = self.top_mut();
                    st.func = Some(value);
                    st.func_this = Value::Undefined;
                }
            }
            return Ok(());
        }
        if self.top_mut().func.is_none() {
            // The callee getter trampoline just returned.
            let value = self.top_mut().value.clone();
            self.top_mut().func = Some(value);
            return Ok(());
        }
        if !self.top_mut().done_args {
            {
                let st = self.top_mut();
                if st.done {
                    st.done = false;
                    let value = st.value.clone();
                    st.arguments.push(value);
                }
            }
            let st = self.top_mut();
            if st.n < arg_nodes.len() {
                st.done = true;
                let next = arg_nodes[st.n].clone();
                st.n += 1;
                let scope = st.scope.clone();
                let this = st.this_value.clone();
                self.push_state(State::new(next, scope, this));
                return Ok(());
            }
            st.done_args = true;
        }
        if !self.top_mut().done_exec {
            self.top_mut().done_exec = true;
            return self.execute_call(callee, is_new);
        }
        // Execution complete: a construct call that returned a non-object
        // yields the fresh `this`.
        let st = self.top_mut();
        let mut result = st.value.clone();
        if st.is_constructor && !result.is_object() {
            result = st.func_this.clone();
        }
        self.pop_with_value(result);
        Ok(())
    }

    fn execute_call(&mut self, callee: &NodeRef, is_new: bool) -> StepResult {
        let func_value = self.top_mut().func.clone().unwrap_or(Value::Undefined);
        let func_handle = match &func_value {
            Value::Object(handle) => *handle,
            _ => {
                let rendered = self.to_string_value(&func_value);
                return Err(
                    self.throw_error(ErrorKind::Type, format!("{rendered} is not a function"))
                );
            }
        };
        if !self.object(func_handle).borrow().is_function() {
            return Err(self.throw_error(ErrorKind::Type, "Value is not a function"));
        }

        // Unwrap bound-function chains, folding in bound arguments.
        let mut target = func_handle;
        let mut this_value = self.top_mut().func_this.clone();
        let mut arguments = self.top_mut().arguments.clone();
        loop {
            let next = {
                let obj = self.object(target);
                let od = obj.borrow();
                match &od.func {
                    Some(data) => match &data.kind {
                        FunctionKind::Bound { target: inner } => {
                            let mut combined = data.bound_args.clone();
                            combined.extend(arguments.iter().cloned());
                            arguments = combined;
                            if !is_new {
                                if let Some(bound_this) = &data.bound_this {
                                    this_value = bound_this.clone();
                                }
                            }
                            Some(*inner)
                        }
                        _ => None,
                    },
                    None => None,
                }
            };
            match next {
                Some(inner) => target = inner,
                None => break,
            }
        }

        let (kind_tag, is_eval, illegal_constructor) = {
            let obj = self.object(target);
            let od = obj.borrow();
            match &od.func {
                Some(data) => (
                    match &data.kind {
                        FunctionKind::Guest { .. } => 0u8,
                        FunctionKind::Native { .. } => 1,
                        FunctionKind::Async { .. } => 2,
                        FunctionKind::Bound { .. } => 3,
                    },
                    data.is_eval,
                    data.illegal_constructor,
                ),
                None => (3, false, false),
            }
        };

        if is_new {
            if illegal_constructor {
                let rendered = self.to_string_value(&Value::Object(target));
                return Err(
                    self.throw_error(ErrorKind::Type, format!("{rendered} is not a constructor"))
                );
            }
            let proto = match self.get_property(&Value::Object(target), "prototype")? {
                Value::Object(h) => h,
                _ => self.object_proto,
            };
            let fresh = self.create_object_proto(Some(proto));
            this_value = Value::Object(fresh);
            self.top_mut().func_this = this_value.clone();
        }

        if is_eval {
            let code = arguments.first().cloned().unwrap_or(Value::Undefined);
            return self.execute_eval(callee, code);
        }

        match kind_tag {
            0 => self.execute_guest_call(target, this_value, arguments),
            1 => {
                let func = {
                    let obj = self.object(target);
                    let od = obj.borrow();
                    match &od.func {
                        Some(data) => match &data.kind {
                            FunctionKind::Native { func } => Some(func.clone()),
                            _ => None,
                        },
                        None => None,
                    }
                };
                let Some(func) = func else {
                    return Err(self.throw_error(ErrorKind::Type, "Value is not a function"));
                };
                let result = func(self, &this_value, &arguments)?;
                // call/apply rewrite the frame and clear done_exec; leave
                // their result alone.
                if self.top_mut().done_exec {
                    self.top_mut().value = result;
                }
                Ok(())
            }
            2 => {
                let func = {
                    let obj = self.object(target);
                    let od = obj.borrow();
                    match &od.func {
                        Some(data) => match &data.kind {
                            FunctionKind::Async { func } => Some(func.clone()),
                            _ => None,
                        },
                        None => None,
                    }
                };
                let Some(func) = func else {
                    return Err(self.throw_error(ErrorKind::Type, "Value is not a function"));
                };
                let slot = Rc::new(std::cell::RefCell::new(None));
                self.set_pending_async(slot.clone());
                self.set_paused(true);
                let resolver = super::AsyncResolver::new(slot);
                func(self, &this_value, &arguments, resolver);
                Ok(())
            }
            _ => Err(self.throw_error(ErrorKind::Type, "Value is not a function")),
        }
    }

    fn execute_guest_call(
        &mut self,
        target: ObjectHandle,
        this_value: Value,
        arguments: Vec<Value>,
    ) -> StepResult {
        let guest = {
            let obj = self.object(target);
            let od = obj.borrow();
            match &od.func {
                Some(data) => match &data.kind {
                    FunctionKind::Guest { node, scope } => Some((node.clone(), scope.clone())),
                    _ => None,
                },
                None => None,
            }
        };
        let Some((node, closure)) = guest else {
            return Err(self.throw_error(ErrorKind::Type, "Value is not a function"));
        };
        let parts = match &node.kind {
            NodeKind::FunctionDeclaration { id, params, body } => {
                Some((Some(id.clone()), params.clone(), body.clone()))
            }
            NodeKind::FunctionExpression { id, params, body } => {
                Some((id.clone(), params.clone(), body.clone()))
            }
            _ => None,
        };
        let Some((id, params, body)) = parts else {
            return Err(self.throw_error(ErrorKind::Type, "Value is not a function"));
        };

        let scope = self.create_scope(&body, Some(closure));
        // `this` boxing: sloppy mode substitutes the global object for
        // null/undefined and boxes primitives; strict mode passes it as-is.
        let bound_this = if scope.strict {
            this_value
        } else {
            match this_value {
                Value::Undefined | Value::Null => self.global_object.clone(),
                Value::Object(_) => this_value,
                primitive => self.box_primitive(&primitive),
            }
        };

        {
            // Parameters and `arguments` are non-configurable bindings.
            let scope_obj = self.object(scope.object);
            let mut od = scope_obj.borrow_mut();
            for (index, param) in params.iter().enumerate() {
                if let Some(name) = param.identifier_name() {
                    let value = arguments.get(index).cloned().unwrap_or(Value::Undefined);
                    od.insert_ordered(name, value);
                    od.not_configurable.insert(name.to_string());
                }
            }
        }
        let args_object = self.create_arguments_object(&arguments, target);
        {
            let scope_obj = self.object(scope.object);
            let mut od = scope_obj.borrow_mut();
            if !od.has_own("arguments") {
                od.insert_ordered("arguments", args_object);
                od.not_configurable.insert("arguments".to_string());
            }
            // A named function expression can refer to itself.
            if let Some(id) = &id {
                if let Some(name) = id.identifier_name() {
                    if !od.has_own(name) {
                        od.insert_ordered(name, Value::Object(target));
                        od.not_configurable.insert(name.to_string());
                        od.not_writable.insert(name.to_string());
                    }
                }
            }
        }

        self.top_mut().value = Value::Undefined;
        self.push_state(State::new(body, scope, bound_this));
        Ok(())
    }

    fn create_arguments_object(&mut self, arguments: &[Value], callee: ObjectHandle) -> Value {
        let handle = self.create_object();
        {
            let obj = self.object(handle);
            let mut od = obj.borrow_mut();
            od.class = "Arguments";
            for (index, value) in arguments.iter().enumerate() {
                od.insert_ordered(&index.to_string(), value.clone());
            }
        }
        self.define_own(
            handle,
            "length",
            super::Descriptor::builtin(Value::Number(arguments.len() as f64)),
        );
        self.define_own(
            handle,
            "callee",
            super::Descriptor::builtin(Value::Object(callee)),
        );
        Value::Object(handle)
    }

    /// Direct `eval` runs in the caller's scope (or a fresh child scope in
    /// strict mode); indirect `eval` runs in the global scope. Parse errors
    /// surface as guest SyntaxErrors.
    fn execute_eval(&mut self, callee: &NodeRef, code: Value) -> StepResult {
        let Value::String(source) = code else {
            // Non-string arguments are returned unchanged.
            self.top_mut().value = code;
            return Ok(());
        };
        let source = source.to_rust_string();
        let program = {
            let mut parser = match crate::parser::Parser::with_options(
                &source,
                self.parse_config.to_options(),
            ) {
                Ok(p) => p,
                Err(e) => {
                    return Err(self.throw_error(ErrorKind::Syntax, e.message));
                }
            };
            match parser.parse_program() {
                Ok(p) => p,
                Err(e) => {
                    return Err(self.throw_error(ErrorKind::Syntax, e.message));
                }
            }
        };
        let body = match &program.kind {
            NodeKind::Program { body } => body.borrow().clone(),
            _ => Vec::new(),
        };
        let eval_node = Rc::new(crate::ast::Node {
            start: callee.start,
            end: callee.end,
            loc: None,
            range: None,
            source_file: None,
            kind: NodeKind::EvalProgram { body },
        });

        let direct = matches!(&callee.kind, NodeKind::Identifier { name } if name == "eval");
        let base_scope: ScopeRef = if direct {
            self.top_mut().scope.clone()
        } else {
            self.global_scope.clone()
        };
        let eval_strict = base_scope.strict || body_has_directive(&eval_node);
        let scope = if eval_strict {
            // Strict eval gets its own variable environment.
            self.create_scope(&eval_node, Some(base_scope))
        } else {
            self.populate_scope(&eval_node, &base_scope);
            base_scope
        };

        let this = self.top_mut().this_value.clone();
        let saved = self.value().clone();
        self.set_completion_value(Value::Undefined);
        let mut state = State::new(eval_node, scope, this);
        state.left_value = saved;
        self.push_state(state);
        Ok(())
    }

    // Operators -------------------------------------------------------------

    pub(crate) fn binary_op(
        &mut self,
        op: BinaryOp,
        a: &Value,
        b: &Value,
    ) -> Result<Value, super::StepError> {
        use helpers::{to_int32, to_uint32};
        Ok(match op {
            BinaryOp::Add => {
                let pa = self.to_primitive(a, PrimitiveHint::Default);
                let pb = self.to_primitive(b, PrimitiveHint::Default);
                if matches!(pa, Value::String(_)) || matches!(pb, Value::String(_)) {
                    let sa = self.to_string_value(&pa);
                    let sb = self.to_string_value(&pb);
                    Value::string(&format!("{sa}{sb}"))
                } else {
                    Value::Number(
                        helpers::to_number_value_pure(&pa) + helpers::to_number_value_pure(&pb),
                    )
                }
            }
            BinaryOp::Sub => Value::Number(self.to_number_value(a) - self.to_number_value(b)),
            BinaryOp::Mul => Value::Number(self.to_number_value(a) * self.to_number_value(b)),
            BinaryOp::Div => Value::Number(self.to_number_value(a) / self.to_number_value(b)),
            BinaryOp::Mod => Value::Number(self.to_number_value(a) % self.to_number_value(b)),
            BinaryOp::Eq => Value::Boolean(self.abstract_equals(a, b)),
            BinaryOp::NotEq => Value::Boolean(!self.abstract_equals(a, b)),
            BinaryOp::StrictEq => Value::Boolean(a.strict_eq(b)),
            BinaryOp::StrictNotEq => Value::Boolean(!a.strict_eq(b)),
            BinaryOp::Lt => Value::Boolean(self.less_than(a, b).unwrap_or(false)),
            BinaryOp::Gt => Value::Boolean(self.less_than(b, a).unwrap_or(false)),
            BinaryOp::LtEq => Value::Boolean(!self.less_than(b, a).unwrap_or(true)),
            BinaryOp::GtEq => Value::Boolean(!self.less_than(a, b).unwrap_or(true)),
            BinaryOp::Shl => {
                let shift = to_uint32(self.to_number_value(b)) & 31;
                Value::Number(f64::from(to_int32(self.to_number_value(a)) << shift))
            }
            BinaryOp::Shr => {
                let shift = to_uint32(self.to_number_value(b)) & 31;
                Value::Number(f64::from(to_int32(self.to_number_value(a)) >> shift))
            }
            BinaryOp::UShr => {
                let shift = to_uint32(self.to_number_value(b)) & 31;
                Value::Number(f64::from(to_uint32(self.to_number_value(a)) >> shift))
            }
            BinaryOp::BitAnd => Value::Number(f64::from(
                to_int32(self.to_number_value(a)) & to_int32(self.to_number_value(b)),
            )),
            BinaryOp::BitOr => Value::Number(f64::from(
                to_int32(self.to_number_value(a)) | to_int32(self.to_number_value(b)),
            )),
            BinaryOp::BitXor => Value::Number(f64::from(
                to_int32(self.to_number_value(a)) ^ to_int32(self.to_number_value(b)),
            )),
            BinaryOp::In => {
                if !b.is_object() {
                    return Err(self.throw_error(
                        ErrorKind::Type,
                        "'in' expects an object",
                    ));
                }
                let name = self.to_property_key(a);
                Value::Boolean(self.has_property_value(b, &name))
            }
            BinaryOp::Instanceof => Value::Boolean(self.instance_of(a, b)?),
        })
    }

    pub(crate) fn instance_of(
        &mut self,
        value: &Value,
        ctor: &Value,
    ) -> Result<bool, super::StepError> {
        if !self.is_callable(ctor) {
            return Err(self.throw_error(
                ErrorKind::Type,
                "Right-hand side of 'instanceof' is not callable",
            ));
        }
        let proto = self.get_property(ctor, "prototype")?;
        let Value::Object(proto) = proto else {
            return Err(self.throw_error(
                ErrorKind::Type,
                "Function has non-object prototype in instanceof check",
            ));
        };
        let Value::Object(mut cursor) = value.clone() else {
            return Ok(false);
        };
        let mut hops = 0usize;
        loop {
            let parent = self.object(cursor).borrow().proto;
            match parent {
                None => return Ok(false),
                Some(parent) => {
                    if parent == proto {
                        return Ok(true);
                    }
                    cursor = parent;
                }
            }
            hops += 1;
            if hops > self.objects.len() {
                return Ok(false);
            }
        }
    }

    // For-in support ---------------------------------------------------------

    /// Own keys of the current enumeration subject; strings contribute their
    /// indices.
    pub(crate) fn own_keys_for_enum(&self, value: &Value) -> Vec<String> {
        match value {
            Value::String(s) => (0..s.len()).map(|i| i.to_string()).collect(),
            Value::Object(handle) => self.object(*handle).borrow().own_keys(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn proto_of_value(&self, value: &Value) -> Option<Value> {
        match value {
            Value::String(_) => Some(Value::Object(self.string_proto)),
            Value::Number(_) => Some(Value::Object(self.number_proto)),
            Value::Boolean(_) => Some(Value::Object(self.boolean_proto)),
            Value::Object(handle) => {
                self.object(*handle).borrow().proto.map(Value::Object)
            }
            _ => None,
        }
    }

    /// Still present and enumerable on the snapshot's level.
    pub(crate) fn is_enumerable_on(&self, value: &Value, key: &str) -> bool {
        match value {
            Value::String(s) => helpers::legal_array_index(key)
                .is_some_and(|i| (i as usize) < s.len()),
            Value::Object(handle) => {
                let obj = self.object(*handle);
                let od = obj.borrow();
                od.has_own(key) && !od.not_enumerable.contains(key)
            }
            _ => false,
        }
    }

    /// The `this` for a trampolined scope accessor: the binding-table object
    /// holding the name.
    pub(crate) fn reference_base(&self, r: &Reference) -> Value {
        match r {
            Reference::Member(base, _) => base.clone(),
            Reference::Scope(name) => self
                .scope_object_holding(name)
                .unwrap_or_else(|| self.global_object.clone()),
        }
    }

    pub(crate) fn scope_object_holding(&self, name: &str) -> Option<Value> {
        let mut scope = Some(self.current_scope());
        while let Some(s) = scope {
            let object = Value::Object(s.object);
            if self.has_property_value(&object, name) {
                return Some(object);
            }
            scope = s.parent.clone();
        }
        None
    }
}

fn property_key_name(interp: &mut Interpreter, key: &NodeRef) -> String {
    match &key.kind {
        NodeKind::Identifier { name } => name.clone(),
        NodeKind::Literal {
            value: LiteralValue::String(s),
        } => s.to_rust_string(),
        NodeKind::Literal {
            value: LiteralValue::Number(n),
        } => helpers::number_to_string(*n),
        _ => {
            let _ = interp;
            String::new()
        }
    }
}

fn body_has_directive(node: &NodeRef) -> bool {
    let NodeKind::EvalProgram { body } = &node.kind else {
        return false;
    };
    match body.first() {
        Some(first) => match &first.kind {
            NodeKind::ExpressionStatement { expression } => matches!(
                &expression.kind,
                NodeKind::Literal {
                    value: LiteralValue::String(s)
                } if s.to_rust_string() == "use strict"
            ),
            _ => false,
        },
        None => false,
    }
}
