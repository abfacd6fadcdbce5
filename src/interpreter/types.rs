use crate::ast::NodeRef;
use crate::types::{ObjectHandle, Value};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Sentinel for a step whose guest error has already been unwound onto the
/// guest stack; it carries no payload and must not escape the step loop.
#[derive(Debug)]
pub struct StepError(pub(crate) ());

pub(crate) type StepResult = Result<(), StepError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CompletionType {
    Break,
    Continue,
    Return,
    Throw,
}

/// Completion record for abrupt transfers.
#[derive(Clone, Debug)]
pub(crate) struct Completion {
    pub typ: CompletionType,
    pub value: Value,
    pub label: Option<String>,
}

/// A reference: an expression evaluated as an assignment target or as the
/// operand of `delete`/`typeof`.
#[derive(Clone, Debug)]
pub(crate) enum Reference {
    Scope(String),
    Member(Value, String),
}

/// A scope links a binding-table object to its parent. `with` scopes use the
/// subject object itself as the binding table; all other scopes use a fresh
/// prototype-less object.
#[derive(Debug)]
pub struct Scope {
    pub object: ObjectHandle,
    pub parent: Option<ScopeRef>,
    pub strict: bool,
}

pub type ScopeRef = Rc<Scope>;

/// Host- and guest-facing property descriptor. Unset fields keep their
/// defaults (configurable, enumerable, writable) or, on redefinition, the
/// current attribute.
#[derive(Clone, Debug, Default)]
pub struct Descriptor {
    pub value: Option<Value>,
    pub writable: Option<bool>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
    pub get: Option<Value>,
    pub set: Option<Value>,
}

impl Descriptor {
    pub fn value(value: Value) -> Self {
        Descriptor {
            value: Some(value),
            ..Default::default()
        }
    }

    /// The descriptor used for built-in methods: writable and configurable
    /// but not enumerable.
    pub fn builtin(value: Value) -> Self {
        Descriptor {
            value: Some(value),
            writable: Some(true),
            enumerable: Some(false),
            configurable: Some(true),
            ..Default::default()
        }
    }

    /// Frozen value slots such as `Infinity` or `Math.PI`.
    pub fn frozen(value: Value) -> Self {
        Descriptor {
            value: Some(value),
            writable: Some(false),
            enumerable: Some(false),
            configurable: Some(false),
            ..Default::default()
        }
    }

    pub fn is_accessor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    pub fn is_data(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }
}

pub(crate) type NativeFn =
    Rc<dyn Fn(&mut super::Interpreter, &Value, &[Value]) -> Result<Value, StepError>>;

pub(crate) type AsyncFn =
    Rc<dyn Fn(&mut super::Interpreter, &Value, &[Value], super::AsyncResolver)>;

pub(crate) enum FunctionKind {
    Guest { node: NodeRef, scope: ScopeRef },
    Native { func: NativeFn },
    Async { func: AsyncFn },
    Bound { target: ObjectHandle },
}

impl std::fmt::Debug for FunctionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionKind::Guest { .. } => write!(f, "FunctionKind::Guest"),
            FunctionKind::Native { .. } => write!(f, "FunctionKind::Native"),
            FunctionKind::Async { .. } => write!(f, "FunctionKind::Async"),
            FunctionKind::Bound { target } => write!(f, "FunctionKind::Bound({target:?})"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct FunctionData {
    /// Monotonic identity for diagnostics and serialization.
    pub id: u64,
    pub kind: FunctionKind,
    pub bound_this: Option<Value>,
    pub bound_args: Vec<Value>,
    pub illegal_constructor: bool,
    pub is_eval: bool,
}

/// Internal `data` slot: backing store for boxed primitives, Date, RegExp.
#[derive(Debug)]
pub(crate) enum InternalData {
    Boxed(Value),
    Date(f64),
    RegExp(RegExpData),
}

#[derive(Debug)]
pub(crate) struct RegExpData {
    pub source: String,
    pub flags: String,
    pub global: bool,
    pub ignore_case: bool,
    pub multiline: bool,
    pub sticky: bool,
    pub regex: Option<fancy_regex::Regex>,
}

/// One object record in the arena.
#[derive(Debug)]
pub struct ObjectData {
    pub(crate) proto: Option<ObjectHandle>,
    pub(crate) class: &'static str,
    pub(crate) properties: HashMap<String, Value>,
    // Insertion order is observable through `for…in` and `Object.keys`.
    pub(crate) property_order: Vec<String>,
    pub(crate) getters: HashMap<String, ObjectHandle>,
    pub(crate) setters: HashMap<String, ObjectHandle>,
    pub(crate) not_configurable: HashSet<String>,
    pub(crate) not_enumerable: HashSet<String>,
    pub(crate) not_writable: HashSet<String>,
    pub(crate) prevent_extensions: bool,
    pub(crate) data: Option<InternalData>,
    pub(crate) func: Option<FunctionData>,
}

impl ObjectData {
    pub(crate) fn new(proto: Option<ObjectHandle>) -> Self {
        Self {
            proto,
            class: "Object",
            properties: HashMap::new(),
            property_order: Vec::new(),
            getters: HashMap::new(),
            setters: HashMap::new(),
            not_configurable: HashSet::new(),
            not_enumerable: HashSet::new(),
            not_writable: HashSet::new(),
            prevent_extensions: false,
            data: None,
            func: None,
        }
    }

    pub(crate) fn is_function(&self) -> bool {
        self.func.is_some()
    }

    pub(crate) fn is_array(&self) -> bool {
        self.class == "Array"
    }

    pub(crate) fn has_own(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub(crate) fn own_value(&self, name: &str) -> Option<Value> {
        self.properties.get(name).cloned()
    }

    /// Raw ordered insert that bypasses attribute checks; used by object
    /// construction and the property model once checks have passed.
    pub(crate) fn insert_ordered(&mut self, name: &str, value: Value) {
        if !self.properties.contains_key(name) {
            self.property_order.push(name.to_string());
        }
        self.properties.insert(name.to_string(), value);
    }

    pub(crate) fn remove_property(&mut self, name: &str) {
        self.properties.remove(name);
        self.property_order.retain(|k| k != name);
        self.getters.remove(name);
        self.setters.remove(name);
        self.not_configurable.remove(name);
        self.not_enumerable.remove(name);
        self.not_writable.remove(name);
    }

    pub(crate) fn own_keys(&self) -> Vec<String> {
        self.property_order.clone()
    }

    pub(crate) fn enumerable_own_keys(&self) -> Vec<String> {
        self.property_order
            .iter()
            .filter(|k| !self.not_enumerable.contains(*k))
            .cloned()
            .collect()
    }

    pub(crate) fn is_accessor(&self, name: &str) -> bool {
        self.getters.contains_key(name) || self.setters.contains_key(name)
    }

    pub(crate) fn own_descriptor(&self, name: &str) -> Option<Descriptor> {
        if !self.has_own(name) {
            return None;
        }
        let configurable = Some(!self.not_configurable.contains(name));
        let enumerable = Some(!self.not_enumerable.contains(name));
        if self.is_accessor(name) {
            Some(Descriptor {
                value: None,
                writable: None,
                enumerable,
                configurable,
                get: Some(
                    self.getters
                        .get(name)
                        .map(|&h| Value::Object(h))
                        .unwrap_or(Value::Undefined),
                ),
                set: Some(
                    self.setters
                        .get(name)
                        .map(|&h| Value::Object(h))
                        .unwrap_or(Value::Undefined),
                ),
            })
        } else {
            Some(Descriptor {
                value: self.own_value(name),
                writable: Some(!self.not_writable.contains(name)),
                enumerable,
                configurable,
                get: None,
                set: None,
            })
        }
    }
}

/// One record of the explicit evaluator stack: the progress of a single
/// node's evaluation. Handlers step the record through its sub-states and
/// either push a child frame, mutate scratch state, or pop.
#[derive(Debug)]
pub(crate) struct State {
    pub node: NodeRef,
    pub scope: ScopeRef,
    pub this_value: Value,

    // Sub-state booleans; each handler advances through them in order.
    pub done: bool,
    pub done_left: bool,
    pub done_right: bool,
    pub done_callee: u8,
    pub done_args: bool,
    pub done_getter: bool,
    pub done_setter: bool,
    pub done_object: bool,
    pub done_variable: bool,
    pub done_exec: bool,
    pub mode: u8,

    // Scratch.
    pub n: usize,
    pub index: usize,
    pub value: Value,
    pub left_value: Value,
    /// Incoming reference slot, written by a child frame evaluated with
    /// `components`.
    pub ref_value: Option<Reference>,
    /// A reference saved across trampolines (assignment target, for-in
    /// variable).
    pub variable: Option<Reference>,
    /// A property name saved across trampolines (member access, for-in key).
    pub name: Option<String>,
    pub func: Option<Value>,
    pub func_this: Value,
    pub arguments: Vec<Value>,
    pub elements: Vec<Option<Value>>,
    /// For-in: own-key snapshot of the chain level under enumeration;
    /// `None` until that level is primed.
    pub props: Option<Vec<String>>,
    pub visited: HashSet<String>,
    pub iter_object: Option<Value>,
    pub switch_value: Value,
    pub matched: bool,
    pub default_case: Option<usize>,

    pub labels: Vec<String>,
    pub is_loop: bool,
    pub is_switch: bool,
    pub is_constructor: bool,
    /// Set by the parent when this frame must produce a reference rather
    /// than a value.
    pub components: bool,
    /// Completion record stashed by `unwind` for a `try` frame.
    pub cv: Option<Completion>,
}

impl State {
    pub(crate) fn new(node: NodeRef, scope: ScopeRef, this_value: Value) -> Self {
        Self {
            node,
            scope,
            this_value,
            done: false,
            done_left: false,
            done_right: false,
            done_callee: 0,
            done_args: false,
            done_getter: false,
            done_setter: false,
            done_object: false,
            done_variable: false,
            done_exec: false,
            mode: 0,
            n: 0,
            index: 0,
            value: Value::Undefined,
            left_value: Value::Undefined,
            ref_value: None,
            variable: None,
            name: None,
            func: None,
            func_this: Value::Undefined,
            arguments: Vec::new(),
            elements: Vec::new(),
            props: None,
            visited: HashSet::new(),
            iter_object: None,
            switch_value: Value::Undefined,
            matched: false,
            default_case: None,
            labels: Vec::new(),
            is_loop: false,
            is_switch: false,
            is_constructor: false,
            components: false,
            cv: None,
        }
    }

    pub(crate) fn with_components(mut self) -> Self {
        self.components = true;
        self
    }
}
