//! Host↔guest value bridging: lifting native values into the guest object
//! graph, lowering guest values back out (cycle-safe), and wrapping native
//! and asynchronous native functions.

use super::types::{FunctionData, FunctionKind, InternalData, StepError};
use super::{Descriptor, Interpreter};
use crate::types::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Completion handle passed to asynchronous native functions. Resolving
/// stores the result; the interpreter observes it at the next `step()` or
/// `run()`, writes it into the suspended call frame, and clears `paused`.
#[derive(Clone)]
pub struct AsyncResolver {
    slot: Rc<RefCell<Option<Value>>>,
}

impl AsyncResolver {
    pub(crate) fn new(slot: Rc<RefCell<Option<Value>>>) -> Self {
        Self { slot }
    }

    pub fn resolve(self, value: Value) {
        *self.slot.borrow_mut() = Some(value);
    }
}

/// A host-side value shape the bridge understands. Arrays and objects are
/// reference-counted so cyclic graphs can be expressed and preserved.
#[derive(Clone)]
pub enum NativeValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Rc<RefCell<Vec<NativeValue>>>),
    Object(Rc<RefCell<Vec<(String, NativeValue)>>>),
    RegExp { source: String, flags: String },
    Date(f64),
    Function(Rc<dyn Fn(&[NativeValue]) -> NativeValue>),
}

impl std::fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeValue::Undefined => write!(f, "Undefined"),
            NativeValue::Null => write!(f, "Null"),
            NativeValue::Bool(b) => write!(f, "Bool({b})"),
            NativeValue::Number(n) => write!(f, "Number({n})"),
            NativeValue::String(s) => write!(f, "String({s:?})"),
            NativeValue::Array(_) => write!(f, "Array(..)"),
            NativeValue::Object(_) => write!(f, "Object(..)"),
            NativeValue::RegExp { source, flags } => write!(f, "RegExp(/{source}/{flags})"),
            NativeValue::Date(ms) => write!(f, "Date({ms})"),
            NativeValue::Function(_) => write!(f, "Function(..)"),
        }
    }
}

impl NativeValue {
    pub fn array(elements: Vec<NativeValue>) -> Self {
        NativeValue::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn object(entries: Vec<(String, NativeValue)>) -> Self {
        NativeValue::Object(Rc::new(RefCell::new(entries)))
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => NativeValue::Null,
            serde_json::Value::Bool(b) => NativeValue::Bool(*b),
            serde_json::Value::Number(n) => {
                NativeValue::Number(n.as_f64().unwrap_or(f64::NAN))
            }
            serde_json::Value::String(s) => NativeValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                NativeValue::array(items.iter().map(NativeValue::from_json).collect())
            }
            serde_json::Value::Object(map) => NativeValue::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), NativeValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl Interpreter {
    /// Lift a native value into the guest heap. Shared (including cyclic)
    /// arrays and objects lift to shared guest objects.
    pub fn native_to_guest(&mut self, value: &NativeValue) -> Value {
        let mut seen: HashMap<usize, Value> = HashMap::new();
        self.native_to_guest_inner(value, &mut seen)
    }

    fn native_to_guest_inner(
        &mut self,
        value: &NativeValue,
        seen: &mut HashMap<usize, Value>,
    ) -> Value {
        match value {
            NativeValue::Undefined => Value::Undefined,
            NativeValue::Null => Value::Null,
            NativeValue::Bool(b) => Value::Boolean(*b),
            NativeValue::Number(n) => Value::Number(*n),
            NativeValue::String(s) => Value::string(s),
            NativeValue::RegExp { source, flags } => self
                .create_regexp(source, flags)
                .unwrap_or(Value::Undefined),
            NativeValue::Date(ms) => self.create_date(*ms),
            NativeValue::Array(items) => {
                let key = Rc::as_ptr(items) as usize;
                if let Some(existing) = seen.get(&key) {
                    return existing.clone();
                }
                let handle = self.create_array();
                let array = Value::Object(handle);
                seen.insert(key, array.clone());
                let elements = items.borrow().clone();
                for (index, element) in elements.iter().enumerate() {
                    let lifted = self.native_to_guest_inner(element, seen);
                    let _ =
                        self.set_property_runtime(&array, &index.to_string(), lifted, false);
                }
                array
            }
            NativeValue::Object(entries) => {
                let key = Rc::as_ptr(entries) as usize;
                if let Some(existing) = seen.get(&key) {
                    return existing.clone();
                }
                let handle = self.create_object();
                let object = Value::Object(handle);
                seen.insert(key, object.clone());
                let entries = entries.borrow().clone();
                for (name, entry) in entries.iter() {
                    let lifted = self.native_to_guest_inner(entry, seen);
                    let _ = self.set_property_runtime(&object, name, lifted, false);
                }
                object
            }
            NativeValue::Function(f) => {
                let f = f.clone();
                self.create_native_function(0, false, move |interp, _this, args| {
                    let lowered: Vec<NativeValue> =
                        args.iter().map(|a| interp.guest_to_native(a)).collect();
                    let result = f(&lowered);
                    Ok(interp.native_to_guest(&result))
                })
            }
        }
    }

    /// Lower a guest value. Already-seen objects map to their existing
    /// native counterpart, so cyclic guest graphs lower to cyclic natives
    /// with the same topology.
    pub fn guest_to_native(&mut self, value: &Value) -> NativeValue {
        let mut cycle: HashMap<u64, NativeValue> = HashMap::new();
        self.guest_to_native_inner(value, &mut cycle)
    }

    fn guest_to_native_inner(
        &mut self,
        value: &Value,
        cycle: &mut HashMap<u64, NativeValue>,
    ) -> NativeValue {
        let handle = match value {
            Value::Undefined => return NativeValue::Undefined,
            Value::Null => return NativeValue::Null,
            Value::Boolean(b) => return NativeValue::Bool(*b),
            Value::Number(n) => return NativeValue::Number(*n),
            Value::String(s) => return NativeValue::String(s.to_rust_string()),
            Value::Object(handle) => *handle,
        };
        if let Some(existing) = cycle.get(&handle.id) {
            return existing.clone();
        }
        let (class, data_kind) = {
            let obj = self.object(handle);
            let od = obj.borrow();
            let data = match &od.data {
                Some(InternalData::RegExp(re)) => {
                    Some(NativeValue::RegExp {
                        source: re.source.clone(),
                        flags: re.flags.clone(),
                    })
                }
                Some(InternalData::Date(ms)) => Some(NativeValue::Date(*ms)),
                Some(InternalData::Boxed(v)) => Some(match v {
                    Value::Boolean(b) => NativeValue::Bool(*b),
                    Value::Number(n) => NativeValue::Number(*n),
                    Value::String(s) => NativeValue::String(s.to_rust_string()),
                    _ => NativeValue::Undefined,
                }),
                None => None,
            };
            (od.class, data)
        };
        if let Some(lowered) = data_kind {
            return lowered;
        }
        if class == "Function" {
            // Guest functions have no native counterpart.
            return NativeValue::Undefined;
        }
        if class == "Array" {
            let items = Rc::new(RefCell::new(Vec::new()));
            cycle.insert(handle.id, NativeValue::Array(items.clone()));
            let length = match self.plain_chain_value(handle, "length") {
                Some(Value::Number(n)) => super::helpers::to_uint32(n),
                _ => 0,
            };
            for index in 0..length {
                let element = self
                    .plain_chain_value(handle, &index.to_string())
                    .unwrap_or(Value::Undefined);
                let lowered = self.guest_to_native_inner(&element, cycle);
                items.borrow_mut().push(lowered);
            }
            return NativeValue::Array(items);
        }
        let entries = Rc::new(RefCell::new(Vec::new()));
        cycle.insert(handle.id, NativeValue::Object(entries.clone()));
        let keys = {
            let obj = self.object(handle);
            let od = obj.borrow();
            od.enumerable_own_keys()
        };
        for key in keys {
            let element = self
                .plain_chain_value(handle, &key)
                .unwrap_or(Value::Undefined);
            let lowered = self.guest_to_native_inner(&element, cycle);
            entries.borrow_mut().push((key, lowered));
        }
        NativeValue::Object(entries)
    }

    /// Wrap a host function as a guest-callable native function. `arity`
    /// becomes the function's `length`; non-constructors throw under `new`.
    pub fn create_native_function<F>(&mut self, arity: u32, is_constructor: bool, f: F) -> Value
    where
        F: Fn(&mut Interpreter, &Value, &[Value]) -> Result<Value, StepError> + 'static,
    {
        let id = self.next_function_id();
        let handle = self.create_object_proto(Some(self.function_proto));
        {
            let obj = self.object(handle);
            let mut od = obj.borrow_mut();
            od.class = "Function";
            od.func = Some(FunctionData {
                id,
                kind: FunctionKind::Native { func: Rc::new(f) },
                bound_this: None,
                bound_args: Vec::new(),
                illegal_constructor: !is_constructor,
                is_eval: false,
            });
        }
        let func_value = Value::Object(handle);
        self.define_own(
            handle,
            "length",
            Descriptor::frozen(Value::Number(f64::from(arity))),
        );
        if is_constructor {
            let proto = self.create_object();
            self.define_own(proto, "constructor", Descriptor::builtin(func_value.clone()));
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
        }
        func_value
    }

    /// Wrap a host function whose completion arrives later through an
    /// [`AsyncResolver`]. Invoking it pauses the interpreter until the
    /// resolver fires and the host re-enters `run()`/`step()`.
    pub fn create_async_function<F>(&mut self, arity: u32, f: F) -> Value
    where
        F: Fn(&mut Interpreter, &Value, &[Value], AsyncResolver) + 'static,
    {
        let id = self.next_function_id();
        let handle = self.create_object_proto(Some(self.function_proto));
        {
            let obj = self.object(handle);
            let mut od = obj.borrow_mut();
            od.class = "Function";
            od.func = Some(FunctionData {
                id,
                kind: FunctionKind::Async { func: Rc::new(f) },
                bound_this: None,
                bound_args: Vec::new(),
                illegal_constructor: true,
                is_eval: false,
            });
        }
        self.define_own(
            handle,
            "length",
            Descriptor::frozen(Value::Number(f64::from(arity))),
        );
        Value::Object(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interp() -> Interpreter {
        Interpreter::new("").expect("empty program builds")
    }

    #[test]
    fn json_shaped_round_trip() {
        let mut interp = interp();
        let native = NativeValue::object(vec![
            ("a".to_string(), NativeValue::Number(1.0)),
            (
                "b".to_string(),
                NativeValue::array(vec![
                    NativeValue::String("x".to_string()),
                    NativeValue::Bool(true),
                    NativeValue::Null,
                ]),
            ),
        ]);
        let guest = interp.native_to_guest(&native);
        let back = interp.guest_to_native(&guest);
        match back {
            NativeValue::Object(entries) => {
                let entries = entries.borrow();
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].0, "a");
                assert!(matches!(entries[0].1, NativeValue::Number(n) if n == 1.0));
                match &entries[1].1 {
                    NativeValue::Array(items) => {
                        let items = items.borrow();
                        assert_eq!(items.len(), 3);
                        assert!(matches!(&items[0], NativeValue::String(s) if s == "x"));
                        assert!(matches!(items[2], NativeValue::Null));
                    }
                    other => panic!("unexpected {other:?}"),
                }
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cycles_preserve_topology() {
        let mut interp = interp();
        // Build a cyclic guest object: o.self === o.
        let guest = interp.native_to_guest(&NativeValue::object(vec![]));
        interp.set_property(&guest, "self", guest.clone());
        let lowered = interp.guest_to_native(&guest);
        match &lowered {
            NativeValue::Object(entries) => {
                let inner = entries.borrow();
                assert_eq!(inner[0].0, "self");
                match &inner[0].1 {
                    NativeValue::Object(inner_rc) => {
                        assert!(Rc::ptr_eq(entries, inner_rc));
                    }
                    other => panic!("unexpected {other:?}"),
                }
            }
            other => panic!("unexpected {other:?}"),
        }
        // And lifting the cyclic native reproduces a cyclic guest.
        let relifted = interp.guest_to_native(&guest);
        let lifted = interp.native_to_guest(&relifted);
        let via_self = interp.get_property(&lifted, "self").unwrap();
        assert!(lifted.strict_eq(&via_self));
    }

    #[test]
    fn native_function_wrapper_round_trips_values() {
        let mut interp = interp();
        let doubler = NativeValue::Function(Rc::new(|args: &[NativeValue]| {
            match args.first() {
                Some(NativeValue::Number(n)) => NativeValue::Number(n * 2.0),
                _ => NativeValue::Undefined,
            }
        }));
        let func = interp.native_to_guest(&doubler);
        let global = interp.global();
        interp.set_property(&global, "double", func);
        interp.append_code("var result = double(21);").unwrap();
        interp.run().unwrap();
        let result = interp.get_property(&global, "result").unwrap();
        assert!(matches!(result, Value::Number(n) if n == 42.0));
    }

    #[test]
    fn json_from_serde() {
        let parsed: serde_json::Value =
            serde_json::from_str(r#"{"k": [1, "two", false]}"#).unwrap();
        let native = NativeValue::from_json(&parsed);
        match native {
            NativeValue::Object(entries) => {
                assert_eq!(entries.borrow()[0].0, "k");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
