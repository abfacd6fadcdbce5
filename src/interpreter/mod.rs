//! The step engine: explicit-stack evaluation over the AST, the object and
//! scope model, builtins, and the host↔guest bridge.

use crate::ast::{LiteralValue, Node, NodeKind, NodeRef};
use crate::parser::{EcmaVersion, ParseError, ParseOptions, Parser};
use crate::types::{ObjectHandle, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

mod bridge;
mod builtins;
mod eval;
mod exec;
mod gc;
pub mod helpers;
pub(crate) mod types;

pub use bridge::{AsyncResolver, NativeValue};
pub use types::{Descriptor, StepError};

use types::{
    Completion, CompletionType, FunctionData, FunctionKind, InternalData, ObjectData, Reference,
    Scope, ScopeRef, State, StepResult,
};

/// Host-visible errors. Guest `throw`s that escape the program surface as
/// the matching error-class variant; the remaining variants are host misuse.
#[derive(Debug, Error)]
pub enum InterpreterError {
    #[error("EvalError: {0}")]
    Eval(String),
    #[error("RangeError: {0}")]
    Range(String),
    #[error("ReferenceError: {0}")]
    Reference(String),
    #[error("SyntaxError: {0}")]
    Syntax(String),
    #[error("TypeError: {0}")]
    Type(String),
    #[error("URIError: {0}")]
    Uri(String),
    #[error("Error: {0}")]
    Error(String),
    /// A non-Error guest value was thrown and not caught.
    #[error("Uncaught {0}")]
    Thrown(String),
    #[error("append_code requires the root frame to be the original Program")]
    AppendOutsideProgram,
    #[error("circular prototype chain")]
    CircularPrototype,
}

impl From<ParseError> for InterpreterError {
    fn from(e: ParseError) -> Self {
        InterpreterError::Syntax(format!("{} ({}:{})", e.message, e.line, e.column))
    }
}

/// Guest error classes, used when raising errors from native code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    Eval,
    Range,
    Reference,
    Syntax,
    Type,
    Uri,
}

impl ErrorKind {
    pub(crate) fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::Eval => "EvalError",
            ErrorKind::Range => "RangeError",
            ErrorKind::Reference => "ReferenceError",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Type => "TypeError",
            ErrorKind::Uri => "URIError",
        }
    }
}

/// Result of a prototype-chain property read: either a plain value or a
/// getter function that the evaluator must invoke through a trampoline.
pub(crate) enum PropGet {
    Plain(Value),
    Getter(Value),
}

/// Parser settings the interpreter re-applies for `eval` and `append_code`.
#[derive(Clone, Copy, Debug)]
pub struct ParseConfig {
    pub ecma_version: EcmaVersion,
    pub strict_semicolons: bool,
    pub allow_trailing_commas: bool,
    pub forbid_reserved: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            ecma_version: EcmaVersion::Es5,
            strict_semicolons: false,
            allow_trailing_commas: true,
            forbid_reserved: false,
        }
    }
}

impl ParseConfig {
    fn to_options(self) -> ParseOptions {
        ParseOptions {
            ecma_version: self.ecma_version,
            strict_semicolons: self.strict_semicolons,
            allow_trailing_commas: self.allow_trailing_commas,
            forbid_reserved: self.forbid_reserved,
            ..Default::default()
        }
    }
}

pub struct Interpreter {
    // Object arena: slot table with a free list; see gc.rs.
    pub(crate) objects: Vec<Option<Rc<RefCell<ObjectData>>>>,
    pub(crate) free_list: Vec<usize>,
    pub(crate) gc_alloc_count: usize,
    next_function_id: u64,

    pub(crate) state_stack: Vec<State>,
    program: NodeRef,
    pub(crate) global_scope: ScopeRef,
    pub(crate) global_object: Value,
    paused: bool,
    pending_async: Option<Rc<RefCell<Option<Value>>>>,
    value: Value,
    pub(crate) pending_host_error: Option<InterpreterError>,
    pub(crate) parse_config: ParseConfig,

    // Bootstrap roots.
    pub(crate) object_proto: ObjectHandle,
    pub(crate) function_proto: ObjectHandle,
    pub(crate) array_proto: ObjectHandle,
    pub(crate) string_proto: ObjectHandle,
    pub(crate) boolean_proto: ObjectHandle,
    pub(crate) number_proto: ObjectHandle,
    pub(crate) date_proto: ObjectHandle,
    pub(crate) regexp_proto: ObjectHandle,
    pub(crate) error_protos: HashMap<&'static str, ObjectHandle>,

    // Synthetic node for getter/setter trampoline frames.
    pub(crate) trampoline_call: NodeRef,
    // Re-entrancy guard for the class-level cyclic toString of arrays and
    // errors.
    pub(crate) to_string_visits: Vec<ObjectHandle>,
}

impl Interpreter {
    /// Build an interpreter over `source` with default options.
    pub fn new(source: &str) -> Result<Self, InterpreterError> {
        Self::with_init(source, |_, _| {})
    }

    /// Build an interpreter and run `init` after the builtins are installed
    /// but before any guest code; `init` receives the global object and may
    /// register additional native bindings.
    pub fn with_init(
        source: &str,
        init: impl FnOnce(&mut Interpreter, &Value),
    ) -> Result<Self, InterpreterError> {
        Self::build(SourceOrAst::Source(source), ParseConfig::default(), init)
    }

    pub fn with_parse_config(
        source: &str,
        config: ParseConfig,
        init: impl FnOnce(&mut Interpreter, &Value),
    ) -> Result<Self, InterpreterError> {
        Self::build(SourceOrAst::Source(source), config, init)
    }

    /// Build an interpreter over an already-parsed Program node.
    pub fn from_program(
        program: NodeRef,
        init: impl FnOnce(&mut Interpreter, &Value),
    ) -> Result<Self, InterpreterError> {
        Self::build(SourceOrAst::Ast(program), ParseConfig::default(), init)
    }

    fn build(
        source: SourceOrAst<'_>,
        config: ParseConfig,
        init: impl FnOnce(&mut Interpreter, &Value),
    ) -> Result<Self, InterpreterError> {
        let placeholder = ObjectHandle { id: 0 };
        let placeholder_node = Rc::new(Node {
            start: 0,
            end: 0,
            loc: None,
            range: None,
            source_file: None,
            kind: NodeKind::EmptyStatement,
        });
        let mut interp = Self {
            objects: Vec::new(),
            free_list: Vec::new(),
            gc_alloc_count: 0,
            next_function_id: 1,
            state_stack: Vec::new(),
            program: placeholder_node.clone(),
            global_scope: Rc::new(Scope {
                object: placeholder,
                parent: None,
                strict: false,
            }),
            global_object: Value::Undefined,
            paused: false,
            pending_async: None,
            value: Value::Undefined,
            pending_host_error: None,
            parse_config: config,
            object_proto: placeholder,
            function_proto: placeholder,
            array_proto: placeholder,
            string_proto: placeholder,
            boolean_proto: placeholder,
            number_proto: placeholder,
            date_proto: placeholder,
            regexp_proto: placeholder,
            error_protos: HashMap::new(),
            trampoline_call: placeholder_node,
            to_string_visits: Vec::new(),
        };

        // Trampoline frames need a CallExpression node; callee and argument
        // sub-states are pre-marked done so it is never consulted.
        let dummy_callee = Rc::new(Node {
            start: 0,
            end: 0,
            loc: None,
            range: None,
            source_file: None,
            kind: NodeKind::Identifier {
                name: String::new(),
            },
        });
        interp.trampoline_call = Rc::new(Node {
            start: 0,
            end: 0,
            loc: None,
            range: None,
            source_file: None,
            kind: NodeKind::CallExpression {
                callee: dummy_callee,
                arguments: Vec::new(),
            },
        });

        interp.bootstrap();
        interp.run_polyfills()?;
        let global = interp.global_object.clone();
        init(&mut interp, &global);

        let program = match source {
            SourceOrAst::Source(src) => {
                let mut parser = Parser::with_options(src, config.to_options())?;
                parser.parse_program()?
            }
            SourceOrAst::Ast(program) => program,
        };
        interp.program = program.clone();
        // A top-level "use strict" directive promotes the global scope.
        if body_has_strict_directive(&program) {
            interp.global_scope = Rc::new(Scope {
                object: interp.global_scope.object,
                parent: None,
                strict: true,
            });
        }
        let scope = interp.global_scope.clone();
        interp.populate_scope(&program, &scope);
        let this = interp.global_object.clone();
        interp.state_stack.push(State::new(program, scope, this));
        Ok(interp)
    }

    fn run_polyfills(&mut self) -> Result<(), InterpreterError> {
        let source = builtins::polyfills::SOURCE;
        let mut parser =
            Parser::polyfill(source).map_err(|e| InterpreterError::Error(e.message))?;
        let program = parser
            .parse_program()
            .map_err(|e| InterpreterError::Error(e.message))?;
        let scope = self.global_scope.clone();
        self.populate_scope(&program, &scope);
        let this = self.global_object.clone();
        self.state_stack.push(State::new(program, scope, this));
        while self.step()? {}
        // The polyfill AST is discarded with its Program frame.
        self.state_stack.clear();
        self.value = Value::Undefined;
        Ok(())
    }

    // Public execution surface ---------------------------------------------

    /// Perform one micro-step of execution. Returns `true` while more work
    /// remains (or the interpreter is paused), `false` once the program is
    /// done. Frames that originate from construction-time polyfills are
    /// stepped through without yielding.
    pub fn step(&mut self) -> Result<bool, InterpreterError> {
        self.poll_async();
        loop {
            if self.paused {
                return Ok(true);
            }
            let node = match self.state_stack.last() {
                None => return Ok(false),
                Some(state) => {
                    if state.done && matches!(state.node.kind, NodeKind::Program { .. }) {
                        return Ok(false);
                    }
                    state.node.clone()
                }
            };
            self.maybe_gc();
            // The sentinel only means a guest error was already unwound; a
            // pending host error (unhandled throw, engine fault) surfaces
            // regardless of which path set it.
            let _ = self.step_node(&node);
            if let Some(err) = self.pending_host_error.take() {
                return Err(err);
            }
            match self.state_stack.last() {
                Some(top) if top.node.is_polyfill() => continue,
                Some(_) => return Ok(true),
                None => return Ok(false),
            }
        }
    }

    /// Run until the program completes or execution pauses. Returns `true`
    /// if a suspension occurred, `false` on completion.
    pub fn run(&mut self) -> Result<bool, InterpreterError> {
        self.poll_async();
        while !self.paused && self.step()? {}
        Ok(self.paused)
    }

    /// The value of the last expression statement, for eval-style embedding.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The global object, for registering host bindings.
    pub fn global(&self) -> Value {
        self.global_object.clone()
    }

    pub(crate) fn set_completion_value(&mut self, value: Value) {
        self.value = value;
    }

    /// Suspend execution; cleared when an async native's resolver fires.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub(crate) fn set_pending_async(&mut self, slot: Rc<RefCell<Option<Value>>>) {
        self.pending_async = Some(slot);
    }

    fn poll_async(&mut self) {
        if !self.paused {
            return;
        }
        let Some(slot) = self.pending_async.clone() else {
            return;
        };
        let resolved = slot.borrow_mut().take();
        if let Some(value) = resolved {
            self.pending_async = None;
            if let Some(top) = self.state_stack.last_mut() {
                top.value = value;
            }
            self.paused = false;
        }
    }

    /// Add top-level statements to the existing Program. The stack root must
    /// still be the Program frame.
    pub fn append_code(&mut self, source: &str) -> Result<(), InterpreterError> {
        let root_is_program = self
            .state_stack
            .first()
            .is_some_and(|s| Rc::ptr_eq(&s.node, &self.program));
        if !root_is_program {
            return Err(InterpreterError::AppendOutsideProgram);
        }
        let mut options = self.parse_config.to_options();
        options.program = Some(self.program.clone());
        let mut parser = Parser::with_options(source, options)?;
        let program = parser.parse_program()?;
        let scope = self.global_scope.clone();
        self.populate_scope(&program, &scope);
        if let Some(root) = self.state_stack.first_mut() {
            root.done = false;
        }
        Ok(())
    }

    // Arena ----------------------------------------------------------------

    pub(crate) fn object(&self, handle: ObjectHandle) -> Rc<RefCell<ObjectData>> {
        self.objects
            .get(handle.id as usize)
            .and_then(|slot| slot.clone())
            // A stale handle (held by the host across a collection) reads as
            // an empty object rather than corrupting unrelated state.
            .unwrap_or_else(|| Rc::new(RefCell::new(ObjectData::new(None))))
    }

    pub fn get_object_data(&self, handle: ObjectHandle) -> Option<Rc<RefCell<ObjectData>>> {
        self.objects.get(handle.id as usize).and_then(|s| s.clone())
    }

    /// Slot-table size; used to cap prototype-chain walks.
    pub(crate) fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Create a plain object with the given prototype.
    pub(crate) fn create_object_proto(&mut self, proto: Option<ObjectHandle>) -> ObjectHandle {
        let data = ObjectData::new(proto);
        self.allocate_object(data)
    }

    pub(crate) fn create_object(&mut self) -> ObjectHandle {
        self.create_object_proto(Some(self.object_proto))
    }

    pub(crate) fn create_array(&mut self) -> ObjectHandle {
        let handle = self.create_object_proto(Some(self.array_proto));
        {
            let obj = self.object(handle);
            let mut od = obj.borrow_mut();
            od.class = "Array";
            od.insert_ordered("length", Value::Number(0.0));
            od.not_enumerable.insert("length".to_string());
            od.not_configurable.insert("length".to_string());
        }
        handle
    }

    pub(crate) fn next_function_id(&mut self) -> u64 {
        let id = self.next_function_id;
        self.next_function_id += 1;
        id
    }

    /// Create a guest function closing over `scope`.
    pub(crate) fn create_guest_function(&mut self, node: NodeRef, scope: ScopeRef) -> Value {
        let params_len = match &node.kind {
            NodeKind::FunctionDeclaration { params, .. }
            | NodeKind::FunctionExpression { params, .. } => params.len(),
            _ => 0,
        };
        let id = self.next_function_id();
        let handle = self.create_object_proto(Some(self.function_proto));
        {
            let obj = self.object(handle);
            let mut od = obj.borrow_mut();
            od.class = "Function";
            od.func = Some(FunctionData {
                id,
                kind: FunctionKind::Guest { node, scope },
                bound_this: None,
                bound_args: Vec::new(),
                illegal_constructor: false,
                is_eval: false,
            });
        }
        let func_value = Value::Object(handle);
        self.define_own(handle, "length", Descriptor::frozen(Value::Number(params_len as f64)));
        // Guest functions get a fresh `prototype` object with a
        // `constructor` back-link.
        let proto = self.create_object();
        self.define_own(
            proto,
            "constructor",
            Descriptor::builtin(func_value.clone()),
        );
        self.define_own(
            handle,
            "prototype",
            Descriptor {
                value: Some(Value::Object(proto)),
                writable: Some(true),
                enumerable: Some(false),
                configurable: Some(false),
                ..Default::default()
            },
        );
        func_value
    }

    /// Unchecked define for engine-created properties.
    pub(crate) fn define_own(&mut self, handle: ObjectHandle, name: &str, desc: Descriptor) {
        let obj = self.object(handle);
        let mut od = obj.borrow_mut();
        if let Some(get) = &desc.get {
            if let Value::Object(h) = get {
                od.getters.insert(name.to_string(), *h);
            }
            if !od.has_own(name) {
                od.insert_ordered(name, Value::Undefined);
            }
        }
        if let Some(set) = &desc.set {
            if let Value::Object(h) = set {
                od.setters.insert(name.to_string(), *h);
            }
            if !od.has_own(name) {
                od.insert_ordered(name, Value::Undefined);
            }
        }
        if let Some(value) = desc.value {
            od.insert_ordered(name, value);
        }
        if desc.configurable == Some(false) {
            od.not_configurable.insert(name.to_string());
        } else if desc.configurable == Some(true) {
            od.not_configurable.remove(name);
        }
        if desc.enumerable == Some(false) {
            od.not_enumerable.insert(name.to_string());
        } else if desc.enumerable == Some(true) {
            od.not_enumerable.remove(name);
        }
        if desc.writable == Some(false) {
            od.not_writable.insert(name.to_string());
        } else if desc.writable == Some(true) {
            od.not_writable.remove(name);
        }
    }

    // Scope model ----------------------------------------------------------

    /// Create a function-entry (or program) scope and hoist declarations.
    pub(crate) fn create_scope(&mut self, node: &NodeRef, parent: Option<ScopeRef>) -> ScopeRef {
        let mut strict = parent.as_ref().is_some_and(|p| p.strict);
        if !strict {
            strict = body_has_strict_directive(node);
        }
        let object = self.create_object_proto(None);
        let scope = Rc::new(Scope {
            object,
            parent,
            strict,
        });
        self.populate_scope(node, &scope);
        scope
    }

    /// Special scopes for `catch` (binds the exception identifier in a fresh
    /// table) and `with` (uses the subject object as the binding table).
    /// They inherit strictness and perform no hoisting.
    pub(crate) fn create_special_scope(
        &mut self,
        parent: ScopeRef,
        object: Option<ObjectHandle>,
    ) -> ScopeRef {
        let strict = parent.strict;
        let object = object.unwrap_or_else(|| self.create_object_proto(None));
        Rc::new(Scope {
            object,
            parent: Some(parent),
            strict,
        })
    }

    /// Single hoisting pass: `var` declarators bind `undefined`, function
    /// declarations bind a closure immediately. Nested functions are not
    /// entered.
    pub(crate) fn populate_scope(&mut self, node: &NodeRef, scope: &ScopeRef) {
        match &node.kind {
            NodeKind::VariableDeclaration { declarations } => {
                // Declared bindings are not deletable.
                for decl in declarations {
                    if let NodeKind::VariableDeclarator { id, .. } = &decl.kind {
                        if let Some(name) = id.identifier_name() {
                            let obj = self.object(scope.object);
                            let mut od = obj.borrow_mut();
                            if !od.has_own(name) {
                                od.insert_ordered(name, Value::Undefined);
                            }
                            od.not_configurable.insert(name.to_string());
                        }
                    }
                }
            }
            NodeKind::FunctionDeclaration { id, .. } => {
                let func = self.create_guest_function(node.clone(), scope.clone());
                if let Some(name) = id.identifier_name() {
                    let obj = self.object(scope.object);
                    let mut od = obj.borrow_mut();
                    od.insert_ordered(name, func);
                    od.not_configurable.insert(name.to_string());
                }
            }
            NodeKind::FunctionExpression { .. } | NodeKind::ExpressionStatement { .. } => {}
            NodeKind::Program { body } => {
                let body = body.borrow().clone();
                for stmt in &body {
                    self.populate_scope(stmt, scope);
                }
            }
            NodeKind::EvalProgram { body } | NodeKind::BlockStatement { body } => {
                for stmt in body {
                    self.populate_scope(stmt, scope);
                }
            }
            NodeKind::IfStatement {
                consequent,
                alternate,
                ..
            } => {
                self.populate_scope(consequent, scope);
                if let Some(alt) = alternate {
                    self.populate_scope(alt, scope);
                }
            }
            NodeKind::ForStatement { init, body, .. } => {
                if let Some(init) = init {
                    self.populate_scope(init, scope);
                }
                self.populate_scope(body, scope);
            }
            NodeKind::ForInStatement { left, body, .. } => {
                self.populate_scope(left, scope);
                self.populate_scope(body, scope);
            }
            NodeKind::WhileStatement { body, .. }
            | NodeKind::DoWhileStatement { body, .. }
            | NodeKind::WithStatement { body, .. }
            | NodeKind::LabeledStatement { body, .. } => {
                self.populate_scope(body, scope);
            }
            NodeKind::TryStatement {
                block,
                handler,
                finalizer,
            } => {
                self.populate_scope(block, scope);
                if let Some(handler) = handler {
                    if let NodeKind::CatchClause { body, .. } = &handler.kind {
                        self.populate_scope(body, scope);
                    }
                }
                if let Some(finalizer) = finalizer {
                    self.populate_scope(finalizer, scope);
                }
            }
            NodeKind::SwitchStatement { cases, .. } => {
                for case in cases {
                    if let NodeKind::SwitchCase { consequent, .. } = &case.kind {
                        for stmt in consequent {
                            self.populate_scope(stmt, scope);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Walk the scope chain for `name`, returning the read result plus the
    /// binding-table object that held it (the `this` for accessor
    /// trampolines). With-scopes see inherited properties of their subject
    /// object; the global binding table is also prototype-aware.
    pub(crate) fn get_value_from_scope(
        &mut self,
        name: &str,
    ) -> Result<(PropGet, Value), StepError> {
        let mut scope = Some(self.current_scope());
        while let Some(s) = scope {
            let object = Value::Object(s.object);
            if self.has_property_value(&object, name) {
                let got = self.get_property_raw(&object, name)?;
                return Ok((got, object));
            }
            scope = s.parent.clone();
        }
        Err(self.throw_error(ErrorKind::Reference, format!("{name} is not defined")))
    }

    /// True when `name` resolves somewhere in the current scope chain;
    /// `typeof` uses this to avoid throwing on undeclared identifiers.
    pub(crate) fn scope_resolves(&self, name: &str) -> bool {
        let mut scope = Some(self.current_scope());
        while let Some(s) = scope {
            if self.has_property_value(&Value::Object(s.object), name) {
                return true;
            }
            scope = s.parent.clone();
        }
        false
    }

    /// Write to the nearest scope containing `name`. Unresolved names fall
    /// through to the global object, or throw in strict mode.
    pub(crate) fn set_value_to_scope(
        &mut self,
        name: &str,
        value: Value,
    ) -> Result<Option<Value>, StepError> {
        let strict = self.current_scope().strict;
        let mut scope = Some(self.current_scope());
        while let Some(s) = scope {
            let object = Value::Object(s.object);
            if self.has_property_value(&object, name) {
                return self.set_property_runtime(&object, name, value, strict);
            }
            scope = s.parent.clone();
        }
        if strict {
            return Err(
                self.throw_error(ErrorKind::Reference, format!("{name} is not defined"))
            );
        }
        let global = self.global_object.clone();
        self.set_property_runtime(&global, name, value, false)
    }

    pub(crate) fn current_scope(&self) -> ScopeRef {
        self.state_stack
            .last()
            .map(|s| s.scope.clone())
            .unwrap_or_else(|| self.global_scope.clone())
    }

    // Property model (§ES5 8.12, simplified) --------------------------------

    /// Chain-walking [[Get]]. Accessor hits surface the getter for the
    /// evaluator's trampoline.
    pub(crate) fn get_property_raw(
        &mut self,
        target: &Value,
        name: &str,
    ) -> Result<PropGet, StepError> {
        match target {
            Value::Undefined | Value::Null => Err(self.throw_error(
                ErrorKind::Type,
                format!("Cannot read properties of {target} (reading '{name}')"),
            )),
            Value::String(s) => {
                if name == "length" {
                    return Ok(PropGet::Plain(Value::Number(s.len() as f64)));
                }
                if let Some(index) = helpers::legal_array_index(name) {
                    return Ok(PropGet::Plain(
                        s.char_at(index as usize)
                            .map(Value::String)
                            .unwrap_or(Value::Undefined),
                    ));
                }
                let proto = self.string_proto;
                Ok(self.lookup_chain(Some(proto), name))
            }
            Value::Boolean(_) => {
                let proto = self.boolean_proto;
                Ok(self.lookup_chain(Some(proto), name))
            }
            Value::Number(_) => {
                let proto = self.number_proto;
                Ok(self.lookup_chain(Some(proto), name))
            }
            Value::Object(handle) => {
                // Boxed strings keep the magic length/index behaviour.
                let boxed = {
                    let obj = self.object(*handle);
                    let od = obj.borrow();
                    match &od.data {
                        Some(InternalData::Boxed(Value::String(s))) => Some(s.clone()),
                        _ => None,
                    }
                };
                if let Some(s) = boxed {
                    if name == "length" {
                        return Ok(PropGet::Plain(Value::Number(s.len() as f64)));
                    }
                    if let Some(index) = helpers::legal_array_index(name) {
                        if (index as usize) < s.len() {
                            return Ok(PropGet::Plain(
                                s.char_at(index as usize)
                                    .map(Value::String)
                                    .unwrap_or(Value::Undefined),
                            ));
                        }
                    }
                }
                Ok(self.lookup_chain(Some(*handle), name))
            }
        }
    }

    fn lookup_chain(&self, start: Option<ObjectHandle>, name: &str) -> PropGet {
        let mut cursor = start;
        let mut hops = 0usize;
        while let Some(handle) = cursor {
            let obj = self.object(handle);
            let od = obj.borrow();
            if od.is_accessor(name) {
                return match od.getters.get(name) {
                    Some(&getter) => PropGet::Getter(Value::Object(getter)),
                    None => PropGet::Plain(Value::Undefined),
                };
            }
            if let Some(value) = od.own_value(name) {
                return PropGet::Plain(value);
            }
            cursor = od.proto;
            // Chains are kept acyclic on assignment; cap the walk anyway.
            hops += 1;
            if hops > self.objects.len() {
                break;
            }
        }
        PropGet::Plain(Value::Undefined)
    }

    /// Plain property read for native code; an accessor hit cannot be
    /// trampolined from inside a step and raises a guest TypeError.
    pub fn get_property(&mut self, target: &Value, name: &str) -> Result<Value, StepError> {
        match self.get_property_raw(target, name)? {
            PropGet::Plain(value) => Ok(value),
            PropGet::Getter(_) => Err(self.throw_error(
                ErrorKind::Type,
                format!("Property '{name}' has a getter and cannot be read natively"),
            )),
        }
    }

    /// Chain-walking [[HasProperty]].
    pub fn has_property_value(&self, target: &Value, name: &str) -> bool {
        match target {
            Value::Undefined | Value::Null => false,
            Value::String(s) => {
                if name == "length" {
                    return true;
                }
                if let Some(index) = helpers::legal_array_index(name) {
                    return (index as usize) < s.len();
                }
                self.has_in_chain(Some(self.string_proto), name)
            }
            Value::Boolean(_) => self.has_in_chain(Some(self.boolean_proto), name),
            Value::Number(_) => self.has_in_chain(Some(self.number_proto), name),
            Value::Object(handle) => self.has_in_chain(Some(*handle), name),
        }
    }

    fn has_in_chain(&self, start: Option<ObjectHandle>, name: &str) -> bool {
        let mut cursor = start;
        let mut hops = 0usize;
        while let Some(handle) = cursor {
            let obj = self.object(handle);
            let od = obj.borrow();
            if od.has_own(name) {
                return true;
            }
            cursor = od.proto;
            hops += 1;
            if hops > self.objects.len() {
                break;
            }
        }
        false
    }

    /// Runtime [[Put]]. Returns a setter function for the evaluator to
    /// trampoline; every other caller discards it.
    pub(crate) fn set_property_runtime(
        &mut self,
        target: &Value,
        name: &str,
        value: Value,
        strict: bool,
    ) -> Result<Option<Value>, StepError> {
        let handle = match target {
            Value::Undefined | Value::Null => {
                return Err(self.throw_error(
                    ErrorKind::Type,
                    format!("Cannot set properties of {target} (setting '{name}')"),
                ));
            }
            Value::Boolean(_) | Value::Number(_) | Value::String(_) => {
                // Writes through a transient box are lost.
                if strict {
                    return Err(self.throw_error(
                        ErrorKind::Type,
                        format!("Cannot create property '{name}' on primitive"),
                    ));
                }
                return Ok(None);
            }
            Value::Object(handle) => *handle,
        };

        // Array length writes truncate; index writes may grow length.
        let is_array = self.object(handle).borrow().is_array();
        if is_array && name == "length" {
            let new_len = helpers::to_number_value_pure(&value);
            let len_u32 = new_len as u32;
            if f64::from(len_u32) != new_len {
                return Err(
                    self.throw_error(ErrorKind::Range, "Invalid array length".to_string())
                );
            }
            self.truncate_array(handle, len_u32);
            let obj = self.object(handle);
            obj.borrow_mut()
                .properties
                .insert("length".to_string(), Value::Number(f64::from(len_u32)));
            return Ok(None);
        }

        // Find an accessor or a non-writable data property along the chain.
        let mut cursor = Some(handle);
        let mut hops = 0usize;
        while let Some(h) = cursor {
            let (setter, accessor, own, read_only, proto) = {
                let obj = self.object(h);
                let od = obj.borrow();
                (
                    od.setters.get(name).copied(),
                    od.is_accessor(name),
                    od.has_own(name),
                    od.not_writable.contains(name),
                    od.proto,
                )
            };
            if accessor {
                if let Some(setter) = setter {
                    return Ok(Some(Value::Object(setter)));
                }
                if strict {
                    return Err(self.throw_error(
                        ErrorKind::Type,
                        format!("Cannot set property '{name}' which has only a getter"),
                    ));
                }
                return Ok(None);
            }
            if own {
                if read_only {
                    if strict {
                        return Err(self.throw_error(
                            ErrorKind::Type,
                            format!("Cannot assign to read only property '{name}'"),
                        ));
                    }
                    return Ok(None);
                }
                // Writable data property (own or inherited): write/shadow on
                // the receiver below.
                break;
            }
            cursor = proto;
            hops += 1;
            if hops > self.objects.len() {
                break;
            }
        }

        let exists = self.object(handle).borrow().has_own(name);
        if !exists && self.object(handle).borrow().prevent_extensions {
            if strict {
                return Err(self.throw_error(
                    ErrorKind::Type,
                    format!("Cannot add property '{name}', object is not extensible"),
                ));
            }
            return Ok(None);
        }

        {
            let obj = self.object(handle);
            obj.borrow_mut().insert_ordered(name, value);
        }
        if is_array {
            if let Some(index) = helpers::legal_array_index(name) {
                let obj = self.object(handle);
                let mut od = obj.borrow_mut();
                let len = match od.own_value("length") {
                    Some(Value::Number(n)) => n,
                    _ => 0.0,
                };
                let needed = (index as f64) + 1.0;
                if needed > len {
                    od.properties
                        .insert("length".to_string(), Value::Number(needed));
                }
            }
        }
        Ok(None)
    }

    fn truncate_array(&mut self, handle: ObjectHandle, new_len: u32) {
        let doomed: Vec<String> = {
            let obj = self.object(handle);
            let od = obj.borrow();
            od.property_order
                .iter()
                .filter(|k| {
                    helpers::legal_array_index(k).is_some_and(|i| i >= new_len)
                })
                .cloned()
                .collect()
        };
        let obj = self.object(handle);
        let mut od = obj.borrow_mut();
        for key in doomed {
            od.remove_property(&key);
        }
    }

    /// Host-facing property write: non-strict, setters are not invoked.
    pub fn set_property(&mut self, target: &Value, name: &str, value: Value) {
        let _ = self.set_property_runtime(target, name, value, false);
    }

    /// Host-facing property definition with an explicit descriptor.
    pub fn set_property_with(
        &mut self,
        target: &Value,
        name: &str,
        desc: Descriptor,
    ) -> Result<(), StepError> {
        if let Value::Object(handle) = target {
            let handle = *handle;
            self.define_property_checked(handle, name, desc)
                .map_err(|msg| self.throw_error(ErrorKind::Type, msg))?;
        }
        Ok(())
    }

    /// ES5 [[DefineOwnProperty]] (8.12.9) including the accessor/data
    /// coexistence rules. Errors are returned as messages; callers decide
    /// between guest TypeError and silent rejection.
    pub(crate) fn define_property_checked(
        &mut self,
        handle: ObjectHandle,
        name: &str,
        desc: Descriptor,
    ) -> Result<(), String> {
        if desc.is_data() && desc.is_accessor() {
            return Err(
                "Invalid property descriptor. Cannot both specify accessors and a value or \
                 writable attribute"
                    .to_string(),
            );
        }
        for accessor in [&desc.get, &desc.set] {
            if let Some(v) = accessor {
                let callable = match v {
                    Value::Undefined => true,
                    Value::Object(h) => self.object(*h).borrow().is_function(),
                    _ => false,
                };
                if !callable {
                    return Err("Getter/setter must be callable or undefined".to_string());
                }
            }
        }

        let current = {
            let obj = self.object(handle);
            let od = obj.borrow();
            od.own_descriptor(name)
        };
        match current {
            None => {
                if self.object(handle).borrow().prevent_extensions {
                    return Err(format!(
                        "Cannot define property '{name}', object is not extensible"
                    ));
                }
                // New properties default every absent attribute to false.
                let defaults = Descriptor {
                    value: desc.value.clone().or(if desc.is_accessor() {
                        None
                    } else {
                        Some(Value::Undefined)
                    }),
                    writable: if desc.is_accessor() {
                        None
                    } else {
                        Some(desc.writable.unwrap_or(false))
                    },
                    enumerable: Some(desc.enumerable.unwrap_or(false)),
                    configurable: Some(desc.configurable.unwrap_or(false)),
                    get: desc.get.clone(),
                    set: desc.set.clone(),
                };
                self.apply_descriptor(handle, name, defaults);
                Ok(())
            }
            Some(current) => {
                let not_configurable = current.configurable == Some(false);
                if not_configurable {
                    if desc.configurable == Some(true) {
                        return Err(format!("Cannot redefine property: {name}"));
                    }
                    if desc.enumerable.is_some() && desc.enumerable != current.enumerable {
                        return Err(format!("Cannot redefine property: {name}"));
                    }
                    let flips_shape = (current.is_accessor() && desc.is_data())
                        || (!current.is_accessor() && desc.is_accessor());
                    if flips_shape {
                        return Err(format!("Cannot redefine property: {name}"));
                    }
                    if !current.is_accessor() && current.writable == Some(false) {
                        if desc.writable == Some(true) {
                            return Err(format!("Cannot redefine property: {name}"));
                        }
                        if let (Some(new), Some(old)) = (&desc.value, &current.value) {
                            if !helpers::same_value(new, old) {
                                return Err(format!("Cannot redefine property: {name}"));
                            }
                        }
                    }
                    if current.is_accessor() {
                        for (new, old) in [(&desc.get, &current.get), (&desc.set, &current.set)] {
                            if let Some(new) = new {
                                let old = old.clone().unwrap_or(Value::Undefined);
                                if !helpers::same_value(new, &old) {
                                    return Err(format!("Cannot redefine property: {name}"));
                                }
                            }
                        }
                    }
                }
                // Merge: unspecified fields keep the current attribute.
                let becomes_accessor = if desc.is_accessor() {
                    true
                } else if desc.is_data() {
                    false
                } else {
                    current.is_accessor()
                };
                let merged = if becomes_accessor {
                    Descriptor {
                        value: None,
                        writable: None,
                        get: desc.get.clone().or(current.get),
                        set: desc.set.clone().or(current.set),
                        enumerable: desc.enumerable.or(current.enumerable),
                        configurable: desc.configurable.or(current.configurable),
                    }
                } else {
                    Descriptor {
                        value: desc
                            .value
                            .clone()
                            .or(current.value)
                            .or(Some(Value::Undefined)),
                        writable: desc
                            .writable
                            .or(current.writable)
                            .or(Some(false)),
                        get: None,
                        set: None,
                        enumerable: desc.enumerable.or(current.enumerable),
                        configurable: desc.configurable.or(current.configurable),
                    }
                };
                self.apply_descriptor(handle, name, merged);
                Ok(())
            }
        }
    }

    fn apply_descriptor(&mut self, handle: ObjectHandle, name: &str, desc: Descriptor) {
        let obj = self.object(handle);
        let mut od = obj.borrow_mut();
        if desc.is_accessor() {
            od.not_writable.remove(name);
            match &desc.get {
                Some(Value::Object(h)) => {
                    od.getters.insert(name.to_string(), *h);
                }
                Some(Value::Undefined) => {
                    od.getters.remove(name);
                }
                _ => {}
            }
            match &desc.set {
                Some(Value::Object(h)) => {
                    od.setters.insert(name.to_string(), *h);
                }
                Some(Value::Undefined) => {
                    od.setters.remove(name);
                }
                _ => {}
            }
            if !od.has_own(name) {
                od.insert_ordered(name, Value::Undefined);
            } else {
                od.properties.insert(name.to_string(), Value::Undefined);
            }
        } else {
            od.getters.remove(name);
            od.setters.remove(name);
            if let Some(value) = desc.value {
                od.insert_ordered(name, value);
            }
            if desc.writable == Some(false) {
                od.not_writable.insert(name.to_string());
            } else if desc.writable == Some(true) {
                od.not_writable.remove(name);
            }
        }
        if desc.enumerable == Some(false) {
            od.not_enumerable.insert(name.to_string());
        } else if desc.enumerable == Some(true) {
            od.not_enumerable.remove(name);
        }
        if desc.configurable == Some(false) {
            od.not_configurable.insert(name.to_string());
        } else if desc.configurable == Some(true) {
            od.not_configurable.remove(name);
        }
    }

    /// `delete`: false (or TypeError in strict mode) on non-configurable
    /// properties.
    pub(crate) fn delete_property(
        &mut self,
        target: &Value,
        name: &str,
        strict: bool,
    ) -> Result<bool, StepError> {
        let Value::Object(handle) = target else {
            return Ok(true);
        };
        let obj = self.object(*handle);
        let exists = obj.borrow().has_own(name);
        if !exists {
            return Ok(true);
        }
        if obj.borrow().not_configurable.contains(name) {
            if strict {
                return Err(self.throw_error(
                    ErrorKind::Type,
                    format!("Cannot delete property '{name}'"),
                ));
            }
            return Ok(false);
        }
        obj.borrow_mut().remove_property(name);
        Ok(true)
    }

    /// Assigning a prototype must never create a cycle.
    pub(crate) fn set_prototype(
        &mut self,
        handle: ObjectHandle,
        proto: Option<ObjectHandle>,
    ) -> Result<(), InterpreterError> {
        let mut cursor = proto;
        while let Some(h) = cursor {
            if h == handle {
                return Err(InterpreterError::CircularPrototype);
            }
            cursor = self.object(h).borrow().proto;
        }
        self.object(handle).borrow_mut().proto = proto;
        Ok(())
    }

    // References -----------------------------------------------------------

    pub(crate) fn get_reference_value(&mut self, r: &Reference) -> Result<PropGet, StepError> {
        match r {
            Reference::Scope(name) => self.get_value_from_scope(name).map(|(got, _)| got),
            Reference::Member(base, name) => self.get_property_raw(&base.clone(), name),
        }
    }

    pub(crate) fn set_reference_value(
        &mut self,
        r: &Reference,
        value: Value,
    ) -> Result<Option<Value>, StepError> {
        match r {
            Reference::Scope(name) => self.set_value_to_scope(name, value),
            Reference::Member(base, name) => {
                let strict = self.current_scope().strict;
                self.set_property_runtime(&base.clone(), name, value, strict)
            }
        }
    }

    // Errors and unwinding --------------------------------------------------

    pub(crate) fn create_error(&mut self, kind: ErrorKind, message: impl Into<String>) -> Value {
        let proto = self
            .error_protos
            .get(kind.name())
            .copied()
            .unwrap_or(self.object_proto);
        let handle = self.create_object_proto(Some(proto));
        {
            let obj = self.object(handle);
            obj.borrow_mut().class = "Error";
        }
        let message = message.into();
        if !message.is_empty() {
            self.define_own(
                handle,
                "message",
                Descriptor::builtin(Value::string(&message)),
            );
        }
        Value::Object(handle)
    }

    /// Create a guest error and unwind with it. The returned sentinel is
    /// propagated with `?` and swallowed by the step loop.
    pub fn throw_error(&mut self, kind: ErrorKind, message: impl Into<String>) -> StepError {
        let error = self.create_error(kind, message);
        self.throw_value(error)
    }

    /// Throw an arbitrary guest value.
    pub fn throw_value(&mut self, value: Value) -> StepError {
        self.unwind(CompletionType::Throw, value, None);
        StepError(())
    }

    /// Pop frames until the completion record finds its target: any `try`
    /// for every kind, a call for `return`, a matching loop or switch for
    /// `break`/`continue`. An unhandled throw converts into a host error.
    pub(crate) fn unwind(&mut self, typ: CompletionType, value: Value, label: Option<String>) {
        enum Action {
            StashInTry,
            ReturnToCall,
            BadCrossing,
            OffProgram,
            PopTargetLoop,
            ResumeLoop,
            Pop,
        }
        loop {
            let action = match self.state_stack.last() {
                None => Action::OffProgram,
                Some(state) => match &state.node.kind {
                    NodeKind::TryStatement { .. } => Action::StashInTry,
                    NodeKind::CallExpression { .. } | NodeKind::NewExpression { .. }
                        if typ == CompletionType::Return =>
                    {
                        Action::ReturnToCall
                    }
                    NodeKind::CallExpression { .. } | NodeKind::NewExpression { .. }
                        if typ != CompletionType::Throw =>
                    {
                        Action::BadCrossing
                    }
                    NodeKind::Program { .. } => Action::OffProgram,
                    _ => match typ {
                        CompletionType::Break => {
                            let hit = match &label {
                                Some(l) => state.labels.iter().any(|s| s == l),
                                None => state.is_loop || state.is_switch,
                            };
                            if hit {
                                Action::PopTargetLoop
                            } else {
                                Action::Pop
                            }
                        }
                        CompletionType::Continue => {
                            let hit = match &label {
                                Some(l) => state.labels.iter().any(|s| s == l) && state.is_loop,
                                None => state.is_loop,
                            };
                            if hit {
                                Action::ResumeLoop
                            } else {
                                Action::Pop
                            }
                        }
                        _ => Action::Pop,
                    },
                },
            };
            match action {
                Action::StashInTry => {
                    if let Some(state) = self.state_stack.last_mut() {
                        state.cv = Some(Completion { typ, value, label });
                    }
                    return;
                }
                Action::ReturnToCall => {
                    if let Some(state) = self.state_stack.last_mut() {
                        state.value = value;
                    }
                    return;
                }
                Action::BadCrossing => {
                    // Break/continue cannot cross a call; the parser rejects
                    // the syntax, so this is an engine fault.
                    self.pending_host_error = Some(InterpreterError::Error(
                        "Unsyntactic break/continue across a call".to_string(),
                    ));
                    return;
                }
                Action::OffProgram => {
                    if let Some(state) = self.state_stack.last_mut() {
                        state.done = true;
                    }
                    if typ == CompletionType::Throw {
                        let host = self.guest_error_to_host(&value);
                        self.pending_host_error = Some(host);
                    }
                    return;
                }
                Action::PopTargetLoop => {
                    self.state_stack.pop();
                    return;
                }
                Action::ResumeLoop => return,
                Action::Pop => {
                    self.state_stack.pop();
                }
            }
        }
    }

    fn guest_error_to_host(&mut self, value: &Value) -> InterpreterError {
        if let Value::Object(handle) = value {
            let is_error = self.object(*handle).borrow().class == "Error";
            if is_error {
                let name = self
                    .get_property(value, "name")
                    .ok()
                    .map(|v| self.to_string_value(&v))
                    .unwrap_or_else(|| "Error".to_string());
                let message = self
                    .get_property(value, "message")
                    .ok()
                    .map(|v| match v {
                        Value::Undefined => String::new(),
                        other => self.to_string_value(&other),
                    })
                    .unwrap_or_default();
                return match name.as_str() {
                    "EvalError" => InterpreterError::Eval(message),
                    "RangeError" => InterpreterError::Range(message),
                    "ReferenceError" => InterpreterError::Reference(message),
                    "SyntaxError" => InterpreterError::Syntax(message),
                    "TypeError" => InterpreterError::Type(message),
                    "URIError" => InterpreterError::Uri(message),
                    "Error" => InterpreterError::Error(message),
                    other => InterpreterError::Error(if message.is_empty() {
                        other.to_string()
                    } else {
                        format!("{other}: {message}")
                    }),
                };
            }
        }
        InterpreterError::Thrown(self.to_string_value(value))
    }

    // Frame plumbing --------------------------------------------------------

    pub(crate) fn top_mut(&mut self) -> &mut State {
        self.state_stack
            .last_mut()
            .expect("step handlers run with a non-empty stack")
    }

    pub(crate) fn push_state(&mut self, state: State) {
        self.state_stack.push(state);
    }

    /// Pop the current frame without producing a value (statements).
    pub(crate) fn pop_state(&mut self) {
        self.state_stack.pop();
    }

    /// Pop the current frame and write its result into the parent's value
    /// slot (expressions).
    pub(crate) fn pop_with_value(&mut self, value: Value) {
        self.state_stack.pop();
        if let Some(parent) = self.state_stack.last_mut() {
            parent.value = value;
        }
    }

    /// Pop the current frame and hand a reference to the parent.
    pub(crate) fn pop_with_reference(&mut self, r: Reference) {
        self.state_stack.pop();
        if let Some(parent) = self.state_stack.last_mut() {
            parent.ref_value = Some(r);
        }
    }

    /// Push a synthetic CallExpression frame that invokes `func` with
    /// `this_value` and `arguments`, pre-advanced past callee and argument
    /// evaluation. Used for getter/setter trampolines.
    pub(crate) fn push_trampoline(&mut self, func: Value, this_value: Value, arguments: Vec<Value>) {
        let scope = self.current_scope();
        let mut state = State::new(self.trampoline_call.clone(), scope, Value::Undefined);
        state.done_callee = 2;
        state.done_args = true;
        state.func = Some(func);
        state.func_this = this_value;
        state.arguments = arguments;
        self.push_state(state);
    }

    fn step_node(&mut self, node: &NodeRef) -> StepResult {
        match &node.kind {
            NodeKind::Program { .. } => self.step_program(node),
            NodeKind::EvalProgram { .. } => self.step_eval_program(node),
            NodeKind::BlockStatement { .. } => self.step_block(node),
            NodeKind::ExpressionStatement { .. } => self.step_expression_statement(node),
            NodeKind::EmptyStatement | NodeKind::DebuggerStatement => {
                self.pop_state();
                Ok(())
            }
            NodeKind::IfStatement { .. } | NodeKind::ConditionalExpression { .. } => {
                self.step_conditional(node)
            }
            NodeKind::SwitchStatement { .. } => self.step_switch(node),
            NodeKind::SwitchCase { .. } => {
                // Handled by the switch frame.
                self.pop_state();
                Ok(())
            }
            NodeKind::ForStatement { .. } => self.step_for(node),
            NodeKind::ForInStatement { .. } => self.step_for_in(node),
            NodeKind::WhileStatement { .. } | NodeKind::DoWhileStatement { .. } => {
                self.step_while(node)
            }
            NodeKind::BreakStatement { .. } | NodeKind::ContinueStatement { .. } => {
                self.step_break_continue(node)
            }
            NodeKind::ReturnStatement { .. } => self.step_return(node),
            NodeKind::ThrowStatement { .. } => self.step_throw(node),
            NodeKind::TryStatement { .. } => self.step_try(node),
            NodeKind::CatchClause { .. } => self.step_catch_clause(node),
            NodeKind::WithStatement { .. } => self.step_with(node),
            NodeKind::LabeledStatement { .. } => self.step_labeled(node),
            NodeKind::VariableDeclaration { .. } => self.step_variable_declaration(node),
            NodeKind::VariableDeclarator { .. } => {
                self.pop_state();
                Ok(())
            }
            NodeKind::FunctionDeclaration { .. } => {
                // Hoisted during scope creation.
                self.pop_state();
                Ok(())
            }
            NodeKind::FunctionExpression { .. } => self.step_function_expression(node),
            NodeKind::ArrayExpression { .. } => self.step_array_expression(node),
            NodeKind::ObjectExpression { .. } => self.step_object_expression(node),
            NodeKind::Property { .. } => {
                self.pop_state();
                Ok(())
            }
            NodeKind::SequenceExpression { .. } => self.step_sequence(node),
            NodeKind::AssignmentExpression { .. } => self.step_assignment(node),
            NodeKind::BinaryExpression { .. } => self.step_binary(node),
            NodeKind::LogicalExpression { .. } => self.step_logical(node),
            NodeKind::UnaryExpression { .. } => self.step_unary(node),
            NodeKind::UpdateExpression { .. } => self.step_update(node),
            NodeKind::MemberExpression { .. } => self.step_member(node),
            NodeKind::CallExpression { .. } | NodeKind::NewExpression { .. } => {
                self.step_call(node)
            }
            NodeKind::ThisExpression => {
                let this = self.top_mut().this_value.clone();
                self.pop_with_value(this);
                Ok(())
            }
            NodeKind::Identifier { .. } => self.step_identifier(node),
            NodeKind::Literal { .. } => self.step_literal(node),
        }
    }
}

enum SourceOrAst<'a> {
    Source(&'a str),
    Ast(NodeRef),
}

/// Whether a function body (or program) opens with a `"use strict"`
/// directive.
fn body_has_strict_directive(node: &NodeRef) -> bool {
    let first = match &node.kind {
        NodeKind::Program { body } => body.borrow().first().cloned(),
        NodeKind::BlockStatement { body } | NodeKind::EvalProgram { body } => {
            body.first().cloned()
        }
        _ => None,
    };
    let Some(first) = first else {
        return false;
    };
    if let NodeKind::ExpressionStatement { expression } = &first.kind {
        if let NodeKind::Literal {
            value: LiteralValue::String(s),
        } = &expression.kind
        {
            return s.to_rust_string() == "use strict";
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn run_src(src: &str) -> Value {
        let mut interp = Interpreter::new(src).expect("parse");
        let paused = interp.run().expect("run");
        assert!(!paused, "program should complete");
        interp.value().clone()
    }

    fn run_number(src: &str) -> f64 {
        match run_src(src) {
            Value::Number(n) => n,
            other => panic!("expected number, got {other:?}"),
        }
    }

    fn run_string(src: &str) -> String {
        match run_src(src) {
            Value::String(s) => s.to_rust_string(),
            other => panic!("expected string, got {other:?}"),
        }
    }

    fn run_bool(src: &str) -> bool {
        match run_src(src) {
            Value::Boolean(b) => b,
            other => panic!("expected boolean, got {other:?}"),
        }
    }

    fn run_err(src: &str) -> InterpreterError {
        match Interpreter::new(src) {
            Err(e) => e,
            Ok(mut interp) => match interp.run() {
                Err(e) => e,
                Ok(_) => panic!("expected an error from {src:?}"),
            },
        }
    }

    // End-to-end scenarios ---------------------------------------------------

    #[test]
    fn arithmetic_with_variables() {
        assert_eq!(run_number("var a = 1; a + 2;"), 3.0);
    }

    #[test]
    fn function_call() {
        assert_eq!(run_number("function f(x){return x*x;} f(7);"), 49.0);
    }

    #[test]
    fn getter_invocation_is_observable() {
        let calls = Rc::new(RefCell::new(0u32));
        let seen = calls.clone();
        let mut interp = Interpreter::with_init(
            "var o = {get x(){ tick(); return 42; }}; o.x;",
            move |interp, global| {
                let counter = seen.clone();
                let tick = interp.create_native_function(0, false, move |_i, _t, _a| {
                    *counter.borrow_mut() += 1;
                    Ok(Value::Undefined)
                });
                interp.set_property(global, "tick", tick);
            },
        )
        .unwrap();
        interp.run().unwrap();
        assert!(matches!(interp.value(), Value::Number(n) if *n == 42.0));
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn loop_push_join() {
        assert_eq!(
            run_string("var r = []; for (var i=0;i<3;i++) r.push(i); r.join(',');"),
            "0,1,2"
        );
    }

    #[test]
    fn try_catch_error_fields() {
        assert_eq!(
            run_string(
                "try { throw new RangeError(\"x\"); } catch(e) { e.name + ':' + e.message; }"
            ),
            "RangeError:x"
        );
    }

    #[test]
    fn strict_mode_undeclared_assignment() {
        let src = "(function(){ \"use strict\"; try { undeclared = 1; return 'no'; } \
                   catch(e){ return e.name; } })();";
        assert_eq!(run_string(src), "ReferenceError");
    }

    #[test]
    fn async_function_pauses_and_resumes() {
        let resolver: Rc<RefCell<Option<AsyncResolver>>> = Rc::new(RefCell::new(None));
        let slot = resolver.clone();
        let mut interp = Interpreter::with_init(
            "var t = sleep(10); t + 1;",
            move |interp, global| {
                let stash = slot.clone();
                let sleep = interp.create_async_function(1, move |_i, _t, _a, done| {
                    *stash.borrow_mut() = Some(done);
                });
                interp.set_property(global, "sleep", sleep);
            },
        )
        .unwrap();
        let paused = interp.run().unwrap();
        assert!(paused);
        assert!(interp.is_paused());

        let done = resolver.borrow_mut().take().expect("sleep was invoked");
        done.resolve(Value::Number(0.0));
        let paused = interp.run().unwrap();
        assert!(!paused);
        assert!(matches!(interp.value(), Value::Number(n) if *n == 1.0));
    }

    // Boundary behaviors -----------------------------------------------------

    #[test]
    fn empty_program_completes_immediately() {
        let mut interp = Interpreter::new("").unwrap();
        assert!(!interp.step().unwrap());
        assert!(interp.value().is_undefined());
    }

    #[test]
    fn unterminated_comment_is_syntax_error() {
        match run_err("  /* never closed") {
            InterpreterError::Syntax(msg) => assert!(msg.contains("comment")),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn octal_literal_modes() {
        assert_eq!(run_number("010;"), 8.0);
        assert!(matches!(
            run_err("\"use strict\"; 010;"),
            InterpreterError::Syntax(_)
        ));
    }

    #[test]
    fn infinite_loop_never_terminates_under_step() {
        let mut interp = Interpreter::new("for (;;) {}").unwrap();
        for _ in 0..1000 {
            assert!(interp.step().unwrap());
        }
    }

    #[test]
    fn guest_break_ends_bare_loop() {
        assert_eq!(run_number("var n = 0; for (;;) { n++; if (n > 4) break; } n;"), 5.0);
    }

    #[test]
    fn delete_nonconfigurable_property() {
        let src = "var o = {}; Object.defineProperty(o, 'p', {value: 1}); \
                   delete o.p === false && o.p === 1;";
        assert!(run_bool(src));
        let strict = "(function(){ 'use strict'; var o = {}; \
                      Object.defineProperty(o, 'p', {value: 1}); \
                      try { delete o.p; return 'no'; } catch (e) { return e.name; } })();";
        assert_eq!(run_string(strict), "TypeError");
    }

    #[test]
    fn delete_local_variable_is_noop() {
        assert!(!run_bool("var x = 1; delete x;"));
        assert_eq!(run_number("var x = 1; delete x; x;"), 1.0);
    }

    // Laws -------------------------------------------------------------------

    #[test]
    fn step_and_run_agree() {
        let src = "var total = 0; for (var i = 0; i < 10; i++) { total += i; } total;";
        let mut stepped = Interpreter::new(src).unwrap();
        while stepped.step().unwrap() {}
        let via_run = run_src(src);
        assert!(stepped.value().strict_eq(&via_run));
    }

    #[test]
    fn append_code_matches_concatenation() {
        let mut split = Interpreter::new("var a = 1;").unwrap();
        split.run().unwrap();
        split.append_code("a + 2;").unwrap();
        split.run().unwrap();
        let together = run_src("var a = 1; a + 2;");
        assert!(split.value().strict_eq(&together));
    }

    #[test]
    fn append_code_requires_program_root() {
        let mut interp = Interpreter::new("1;").unwrap();
        interp.state_stack.clear();
        assert!(matches!(
            interp.append_code("2;"),
            Err(InterpreterError::AppendOutsideProgram)
        ));
    }

    #[test]
    fn for_in_visits_enumerable_own_once() {
        let src = "var o = {a: 1, b: 2}; \
                   Object.defineProperty(o, 'hidden', {value: 3, enumerable: false}); \
                   var seen = []; for (var k in o) seen.push(k); seen.join(',');";
        assert_eq!(run_string(src), "a,b");
    }

    #[test]
    fn for_in_walks_prototypes_without_repeats() {
        let src = "function Base() {} Base.prototype.p = 1; \
                   var o = new Base(); o.p = 2; o.q = 3; \
                   var seen = []; for (var k in o) seen.push(k); seen.sort(); seen.join(',');";
        assert_eq!(run_string(src), "p,q");
    }

    #[test]
    fn prototype_cycles_are_rejected() {
        let src = "var a = {}; var b = Object.create(a); \
                   var result; \
                   try { Object.setPrototypeOf(a, b); result = 'cycle allowed'; } \
                   catch (e) { result = e.name; } \
                   result + ':' + (Object.getPrototypeOf(a) === null);";
        assert_eq!(run_string(src), "TypeError:true");
    }

    #[test]
    fn setter_order_and_result_value() {
        let src = "var log = []; \
                   var o = { set x(v) { log.push('set:' + v); } }; \
                   var r = (o.x = 5); \
                   log.join(',') + '|' + r;";
        assert_eq!(run_string(src), "set:5|5");
    }

    #[test]
    fn assignment_evaluates_target_then_value_then_setter() {
        let src = "var log = []; \
                   function base() { log.push('base'); return o; } \
                   var o = { set x(v) { log.push('setter'); } }; \
                   base().x = (log.push('value'), 9); \
                   log.join(',');";
        assert_eq!(run_string(src), "base,value,setter");
    }

    // Control flow -----------------------------------------------------------

    #[test]
    fn switch_fall_through_and_default() {
        let src = "function pick(n) { var out = []; \
                   switch (n) { \
                     case 1: out.push('one'); \
                     case 2: out.push('two'); break; \
                     default: out.push('other'); \
                   } return out.join('+'); } \
                   pick(1) + '|' + pick(2) + '|' + pick(9);";
        assert_eq!(run_string(src), "one+two|two|other");
    }

    #[test]
    fn labeled_continue_targets_outer_loop() {
        let src = "var hits = 0; \
                   outer: for (var i = 0; i < 3; i++) { \
                     for (var j = 0; j < 3; j++) { \
                       if (j > i) continue outer; \
                       hits++; \
                     } \
                   } hits;";
        assert_eq!(run_number(src), 6.0);
    }

    #[test]
    fn finally_runs_on_every_path() {
        let src = "var log = []; \
                   function f(mode) { \
                     try { \
                       if (mode === 'throw') throw new Error('boom'); \
                       if (mode === 'return') return 'ret'; \
                       log.push('body'); \
                     } catch (e) { log.push('catch'); } \
                     finally { log.push('finally'); } \
                     return 'end'; \
                   } \
                   f('ok'); f('throw'); f('return'); log.join(',');";
        assert_eq!(
            run_string(src),
            "body,finally,catch,finally,finally"
        );
    }

    #[test]
    fn finally_rethrows_pending_completion() {
        let src = "function f() { \
                     try { throw new TypeError('inner'); } \
                     finally { } \
                   } \
                   try { f(); 'no'; } catch (e) { e.name; }";
        assert_eq!(run_string(src), "TypeError");
    }

    #[test]
    fn with_statement_scoping() {
        let src = "var x = 'outer'; var o = {x: 'inner'}; \
                   var seen; with (o) { seen = x; } seen;";
        assert_eq!(run_string(src), "inner");
    }

    #[test]
    fn do_while_runs_body_first() {
        assert_eq!(run_number("var n = 0; do { n++; } while (false); n;"), 1.0);
    }

    #[test]
    fn typeof_undeclared_is_undefined() {
        assert_eq!(run_string("typeof nothing_here;"), "undefined");
        assert_eq!(run_string("typeof function(){};"), "function");
    }

    #[test]
    fn closures_capture_environments() {
        let src = "function counter() { var n = 0; return function() { return ++n; }; } \
                   var c = counter(); c(); c(); c();";
        assert_eq!(run_number(src), 3.0);
    }

    #[test]
    fn constructor_returns_this_unless_object() {
        let src = "function A() { this.v = 1; return 42; } (new A()).v;";
        assert_eq!(run_number(src), 1.0);
        let src = "function B() { this.v = 1; return {v: 2}; } (new B()).v;";
        assert_eq!(run_number(src), 2.0);
    }

    #[test]
    fn instanceof_and_prototype_chain() {
        let src = "function A() {} function B() {} \
                   B.prototype = new A(); \
                   var b = new B(); \
                   (b instanceof B) + ':' + (b instanceof A) + ':' + ({} instanceof A);";
        assert_eq!(run_string(src), "true:true:false");
    }

    // eval -------------------------------------------------------------------

    #[test]
    fn direct_eval_sees_local_scope() {
        assert_eq!(
            run_number("function f() { var local = 5; return eval('local + 1'); } f();"),
            6.0
        );
    }

    #[test]
    fn eval_result_becomes_value() {
        assert_eq!(run_number("eval('1 + 1'); 5;"), 5.0);
        assert_eq!(run_number("eval('2 + 3');"), 5.0);
    }

    #[test]
    fn eval_parse_error_is_guest_syntax_error() {
        assert_eq!(
            run_string("try { eval('var ='); 'no'; } catch (e) { e.name; }"),
            "SyntaxError"
        );
    }

    // Builtins through the step engine ---------------------------------------

    #[test]
    fn polyfilled_array_methods() {
        assert_eq!(
            run_string("[1, 2, 3, 4].filter(function(n) { return n % 2 === 0; }).join('+');"),
            "2+4"
        );
        assert_eq!(
            run_number("[1, 2, 3].map(function(n) { return n * 2; })[1];"),
            4.0
        );
        assert_eq!(
            run_number("[1, 2, 3, 4].reduce(function(a, b) { return a + b; });"),
            10.0
        );
        assert_eq!(
            run_number("[1, 2, 3, 4].reduce(function(a, b) { return a + b; }, 100);"),
            110.0
        );
        assert!(run_bool("[2, 4, 6].every(function(n) { return n % 2 === 0; });"));
    }

    #[test]
    fn sort_with_comparator() {
        assert_eq!(
            run_string("[3, 1, 10, 2].sort(function(a, b) { return a - b; }).join(',');"),
            "1,2,3,10"
        );
        // Default comparison is lexicographic.
        assert_eq!(run_string("[3, 1, 10, 2].sort().join(',');"), "1,10,2,3");
    }

    #[test]
    fn bind_call_apply() {
        assert_eq!(
            run_number(
                "function add(a, b) { return this.base + a + b; } \
                 var bound = add.bind({base: 10}, 1); bound(2);"
            ),
            13.0
        );
        assert_eq!(
            run_number("function f() { return this.v; } f.call({v: 7});"),
            7.0
        );
        assert_eq!(
            run_number("function f(a, b) { return a * b; } f.apply(null, [6, 7]);"),
            42.0
        );
    }

    #[test]
    fn string_methods() {
        assert_eq!(run_string("'Hello World'.toUpperCase();"), "HELLO WORLD");
        assert_eq!(run_number("'abcabc'.indexOf('c', 3);"), 5.0);
        assert_eq!(run_string("'a,b,,c'.split(',').join('|');"), "a|b||c");
        assert_eq!(run_string("'  pad  '.trim();"), "pad");
        assert_eq!(run_string("'abcdef'.slice(1, -2);"), "bcd");
        assert_eq!(run_number("'x'.charCodeAt(0);"), 120.0);
    }

    #[test]
    fn string_replace_with_function_uses_polyfill() {
        assert_eq!(
            run_string(
                "'a1b2'.replace(/\\d/g, function(d) { return '<' + d + '>'; });"
            ),
            "a<1>b<2>"
        );
    }

    #[test]
    fn regexp_exec_and_last_index() {
        let src = "var re = /a(b+)/g; var s = 'abbab'; \
                   var first = re.exec(s); \
                   var second = re.exec(s); \
                   first[1] + ':' + first.index + '|' + second[1] + ':' + second.index;";
        assert_eq!(run_string(src), "bb:0|b:3");
        assert!(run_bool("/^ab+c$/.test('abbbc');"));
    }

    #[test]
    fn json_round_trip() {
        assert_eq!(
            run_string("JSON.stringify(JSON.parse('{\"a\":[1,2],\"b\":\"x\"}'));"),
            "{\"a\":[1,2],\"b\":\"x\"}"
        );
        assert_eq!(
            run_string("JSON.stringify({a: 1, f: function(){}, u: undefined});"),
            "{\"a\":1}"
        );
        assert_eq!(
            run_string(
                "try { var o = {}; o.me = o; JSON.stringify(o); 'no'; } \
                 catch (e) { e.name; }"
            ),
            "TypeError"
        );
    }

    #[test]
    fn math_and_number_formatting() {
        assert_eq!(run_number("Math.max(1, -2, 30, 4);"), 30.0);
        assert_eq!(run_number("Math.floor(1.7) + Math.pow(2, 10);"), 1025.0);
        assert_eq!(run_string("(255).toString(16);"), "ff");
        assert_eq!(run_string("(1.005).toFixed(1);"), "1.0");
        assert_eq!(run_string("(0.1 + 0.2) + '';"), "0.30000000000000004");
    }

    #[test]
    fn date_component_getters() {
        assert_eq!(
            run_number("new Date('2021-03-04T05:06:07.008Z').getUTCFullYear();"),
            2021.0
        );
        assert_eq!(run_number("Date.UTC(1970, 0, 2);"), 86_400_000.0);
    }

    #[test]
    fn abstract_and_strict_equality() {
        assert!(run_bool("null == undefined;"));
        assert!(!run_bool("null === undefined;"));
        assert!(run_bool("'5' == 5;"));
        assert!(run_bool("NaN !== NaN;"));
        assert!(run_bool("[5] + 1 === '51';"));
    }

    #[test]
    fn bitwise_semantics() {
        assert_eq!(run_number("-1 >>> 0;"), 4294967295.0);
        assert_eq!(run_number("5 & 3;"), 1.0);
        assert_eq!(run_number("1 << 31;"), -2147483648.0);
    }

    #[test]
    fn array_length_invariants() {
        assert_eq!(run_number("var a = []; a[4] = 1; a.length;"), 5.0);
        assert_eq!(
            run_string("var a = [1,2,3,4]; a.length = 2; a.join(',');"),
            "1,2"
        );
    }

    #[test]
    fn unhandled_throw_becomes_host_error() {
        match run_err("throw new TypeError('boom');") {
            InterpreterError::Type(msg) => assert_eq!(msg, "boom"),
            other => panic!("unexpected {other}"),
        }
        match run_err("throw 'plain';") {
            InterpreterError::Thrown(msg) => assert_eq!(msg, "plain"),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn pause_suspends_run() {
        let mut interp = Interpreter::new("1 + 1;").unwrap();
        interp.pause();
        assert!(interp.run().unwrap());
        assert!(interp.value().is_undefined());
    }

    #[test]
    fn arguments_object() {
        assert_eq!(
            run_number("function f() { return arguments.length + arguments[0]; } f(10, 20);"),
            12.0
        );
    }

    #[test]
    fn object_keys_in_insertion_order() {
        assert_eq!(
            run_string("Object.keys({b: 1, a: 2, c: 3}).join(',');"),
            "b,a,c"
        );
    }

    #[test]
    fn freeze_blocks_writes() {
        let src = "var o = Object.freeze({v: 1}); o.v = 2; o.v;";
        assert_eq!(run_number(src), 1.0);
    }

    #[test]
    fn host_error_messages_render_like_guest_errors() {
        let err = run_err("undeclared_variable;");
        assert_eq!(
            err.to_string(),
            "ReferenceError: undeclared_variable is not defined"
        );
    }

    #[test]
    fn cyclic_array_to_string_is_guarded() {
        assert_eq!(
            run_string("var a = [1, 2]; a.push(a); a.join('|');"),
            "1|2|1,2,..."
        );
    }

    #[test]
    fn value_bridge_visible_side_effects_in_order() {
        let log: Rc<RefCell<Vec<f64>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let mut interp = Interpreter::with_init(
            "note(1); note(2); note(3);",
            move |interp, global| {
                let sink = sink.clone();
                let note = interp.create_native_function(1, false, move |interp, _t, args| {
                    let n = interp.to_number_value(&args[0].clone());
                    sink.borrow_mut().push(n);
                    Ok(Value::Undefined)
                });
                interp.set_property(global, "note", note);
            },
        )
        .unwrap();
        interp.run().unwrap();
        assert_eq!(*log.borrow(), vec![1.0, 2.0, 3.0]);
    }
}
