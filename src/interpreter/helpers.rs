//! Abstract operations: coercions, equality, and number formatting.

use super::types::InternalData;
use super::Interpreter;
use crate::types::{JsString, ObjectHandle, Value};

// §9.2 ToBoolean
pub fn to_boolean(val: &Value) -> bool {
    match val {
        Value::Undefined | Value::Null => false,
        Value::Boolean(b) => *b,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::String(s) => !s.is_empty(),
        Value::Object(_) => true,
    }
}

// §9.3 ToNumber over primitives; objects coerce through the interpreter's
// ToPrimitive and should not reach this function.
pub(crate) fn to_number_value_pure(val: &Value) -> f64 {
    match val {
        Value::Undefined => f64::NAN,
        Value::Null => 0.0,
        Value::Boolean(b) => *b as u8 as f64,
        Value::Number(n) => *n,
        Value::String(s) => string_to_number(s),
        Value::Object(_) => f64::NAN,
    }
}

// §9.3.1 ToNumber applied to the String type
pub(crate) fn string_to_number(s: &JsString) -> f64 {
    let text = s.to_rust_string();
    let trimmed = text.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '\u{FEFF}' | '\u{2028}' | '\u{2029}')
    });
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

// §9.4 ToInteger
pub(crate) fn to_integer(n: f64) -> f64 {
    if n.is_nan() {
        0.0
    } else if n == 0.0 || n.is_infinite() {
        n
    } else {
        n.trunc()
    }
}

// §9.5 / §9.6 signed and unsigned 32-bit coercion
pub fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let m = n.trunc().rem_euclid(4294967296.0);
    m as u32
}

// §9.8.1 ToString applied to the Number type
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n < 0.0 {
        return format!("-{}", number_to_string(-n));
    }
    if n.is_infinite() {
        return "Infinity".to_string();
    }
    if n >= 1e21 || n < 1e-6 {
        // Shortest exponential form, with the sign JS prints on positive
        // exponents.
        let s = format!("{n:e}");
        match s.split_once('e') {
            Some((mantissa, exp)) => {
                if let Some(stripped) = exp.strip_prefix('-') {
                    format!("{mantissa}e-{stripped}")
                } else {
                    format!("{mantissa}e+{exp}")
                }
            }
            None => s,
        }
    } else {
        format!("{n}")
    }
}

// §9.12 SameValue: NaN equals itself, +0 and -0 differ.
pub(crate) fn same_value(a: &Value, b: &Value) -> bool {
    if let (Value::Number(x), Value::Number(y)) = (a, b) {
        if x.is_nan() && y.is_nan() {
            return true;
        }
        if *x == 0.0 && *y == 0.0 {
            return x.is_sign_negative() == y.is_sign_negative();
        }
    }
    a.strict_eq(b)
}

/// A property name that is a canonical array index below 2³²−1.
pub(crate) fn legal_array_index(name: &str) -> Option<u32> {
    let index: u32 = name.parse().ok()?;
    if index == u32::MAX {
        return None;
    }
    if index.to_string() == name {
        Some(index)
    } else {
        None
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum PrimitiveHint {
    Default,
    Number,
    String,
}

impl Interpreter {
    /// `typeof`, with function objects distinguished.
    pub fn type_of(&self, val: &Value) -> &'static str {
        match val {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(handle) => {
                if self.object(*handle).borrow().is_function() {
                    "function"
                } else {
                    "object"
                }
            }
        }
    }

    pub fn is_callable(&self, val: &Value) -> bool {
        matches!(val, Value::Object(h) if self.object(*h).borrow().is_function())
    }

    /// §8.12.8-flavoured ToPrimitive without re-entering guest code: the
    /// class-based internal valueOf/toString are used instead of guest
    /// overrides.
    pub(crate) fn to_primitive(&mut self, val: &Value, hint: PrimitiveHint) -> Value {
        let Value::Object(handle) = val else {
            return val.clone();
        };
        let data = {
            let obj = self.object(*handle);
            let od = obj.borrow();
            match &od.data {
                Some(InternalData::Boxed(v)) => Some(v.clone()),
                Some(InternalData::Date(ms)) => {
                    if hint == PrimitiveHint::Number {
                        Some(Value::Number(*ms))
                    } else {
                        None
                    }
                }
                _ => None,
            }
        };
        if let Some(primitive) = data {
            return primitive;
        }
        Value::string(&self.to_string_value(val))
    }

    pub(crate) fn to_number_value(&mut self, val: &Value) -> f64 {
        match val {
            Value::Object(_) => {
                let prim = self.to_primitive(val, PrimitiveHint::Number);
                to_number_value_pure(&prim)
            }
            other => to_number_value_pure(other),
        }
    }

    /// §9.8 ToString, with the class-level cyclic guard for arrays and
    /// errors: a reentrant visit renders `"..."` or `"[object Error]"`.
    pub fn to_string_value(&mut self, val: &Value) -> String {
        let Value::Object(handle) = val else {
            return val.to_string();
        };
        let handle = *handle;
        let class = self.object(handle).borrow().class;
        match class {
            "Array" => {
                if self.to_string_visits.contains(&handle) {
                    return "...".to_string();
                }
                self.to_string_visits.push(handle);
                let text = self.array_join(handle, ",");
                self.to_string_visits.pop();
                text
            }
            "Error" => {
                if self.to_string_visits.contains(&handle) {
                    return "[object Error]".to_string();
                }
                self.to_string_visits.push(handle);
                let name = self
                    .plain_chain_value(handle, "name")
                    .map(|v| self.to_string_value(&v))
                    .unwrap_or_else(|| "Error".to_string());
                let message = self
                    .plain_chain_value(handle, "message")
                    .map(|v| match v {
                        Value::Undefined => String::new(),
                        other => self.to_string_value(&other),
                    })
                    .unwrap_or_default();
                self.to_string_visits.pop();
                if message.is_empty() {
                    name
                } else {
                    format!("{name}: {message}")
                }
            }
            "Function" => self.function_to_string(handle),
            "Date" => {
                let ms = match &self.object(handle).borrow().data {
                    Some(InternalData::Date(ms)) => *ms,
                    _ => f64::NAN,
                };
                super::builtins::date::date_to_string(ms)
            }
            "RegExp" => {
                let obj = self.object(handle);
                let od = obj.borrow();
                match &od.data {
                    Some(InternalData::RegExp(re)) => format!("/{}/{}", re.source, re.flags),
                    _ => "/(?:)/".to_string(),
                }
            }
            _ => {
                let boxed = {
                    let obj = self.object(handle);
                    let od = obj.borrow();
                    match &od.data {
                        Some(InternalData::Boxed(v)) => Some(v.clone()),
                        _ => None,
                    }
                };
                match boxed {
                    Some(primitive) => primitive.to_string(),
                    None => format!("[object {class}]"),
                }
            }
        }
    }

    /// Chain read that ignores accessors; used where guest getters must not
    /// run (internal toString, error reporting).
    pub(crate) fn plain_chain_value(&self, handle: ObjectHandle, name: &str) -> Option<Value> {
        let mut cursor = Some(handle);
        let mut hops = 0usize;
        while let Some(h) = cursor {
            let obj = self.object(h);
            let od = obj.borrow();
            if od.is_accessor(name) {
                return None;
            }
            if let Some(v) = od.own_value(name) {
                return Some(v);
            }
            cursor = od.proto;
            hops += 1;
            if hops > self.objects.len() {
                break;
            }
        }
        None
    }

    pub(crate) fn array_join(&mut self, handle: ObjectHandle, separator: &str) -> String {
        let len = match self.plain_chain_value(handle, "length") {
            Some(Value::Number(n)) => to_uint32(n),
            _ => 0,
        };
        let mut parts = Vec::with_capacity(len as usize);
        for i in 0..len {
            let element = self
                .plain_chain_value(handle, &i.to_string())
                .unwrap_or(Value::Undefined);
            parts.push(match element {
                Value::Undefined | Value::Null => String::new(),
                other => self.to_string_value(&other),
            });
        }
        parts.join(separator)
    }

    fn function_to_string(&mut self, handle: ObjectHandle) -> String {
        use super::types::FunctionKind;
        use crate::ast::NodeKind;
        let obj = self.object(handle);
        let od = obj.borrow();
        let Some(func) = &od.func else {
            return "function () {}".to_string();
        };
        match &func.kind {
            FunctionKind::Guest { node, .. } => {
                let join = |params: &[crate::ast::NodeRef]| {
                    params
                        .iter()
                        .filter_map(|p| p.identifier_name())
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                let (name, params) = match &node.kind {
                    NodeKind::FunctionDeclaration { id, params, .. } => (
                        id.identifier_name().unwrap_or("").to_string(),
                        join(params),
                    ),
                    NodeKind::FunctionExpression { id, params, .. } => (
                        id.as_ref()
                            .and_then(|n| n.identifier_name())
                            .unwrap_or("")
                            .to_string(),
                        join(params),
                    ),
                    _ => (String::new(), String::new()),
                };
                if name.is_empty() {
                    format!("function ({params}) {{ ... }}")
                } else {
                    format!("function {name}({params}) {{ ... }}")
                }
            }
            _ => "function () { [native code] }".to_string(),
        }
    }

    /// Property keys are strings; numbers use the canonical number form.
    pub(crate) fn to_property_key(&mut self, val: &Value) -> String {
        match val {
            Value::String(s) => s.to_rust_string(),
            Value::Number(n) => number_to_string(*n),
            Value::Object(_) => self.to_string_value(val),
            other => other.to_string(),
        }
    }

    /// Box a primitive into its wrapper object (`this` coercion in sloppy
    /// mode, `Object(primitive)`).
    pub(crate) fn box_primitive(&mut self, val: &Value) -> Value {
        let (proto, class) = match val {
            Value::Boolean(_) => (self.boolean_proto, "Boolean"),
            Value::Number(_) => (self.number_proto, "Number"),
            Value::String(_) => (self.string_proto, "String"),
            _ => return val.clone(),
        };
        let handle = self.create_object_proto(Some(proto));
        {
            let obj = self.object(handle);
            let mut od = obj.borrow_mut();
            od.class = class;
            od.data = Some(InternalData::Boxed(val.clone()));
        }
        Value::Object(handle)
    }

    // §11.9.3 abstract equality
    pub(crate) fn abstract_equals(&mut self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Boolean(_), Value::Boolean(_))
            | (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Object(_), Value::Object(_)) => a.strict_eq(b),
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
                to_number_value_pure(a) == to_number_value_pure(b)
            }
            (Value::Boolean(x), other) => {
                let lifted = Value::Number(*x as u8 as f64);
                self.abstract_equals(&lifted, other)
            }
            (other, Value::Boolean(y)) => {
                let lifted = Value::Number(*y as u8 as f64);
                self.abstract_equals(other, &lifted)
            }
            (Value::Object(_), Value::Number(_) | Value::String(_)) => {
                let prim = self.to_primitive(a, PrimitiveHint::Default);
                self.abstract_equals(&prim, b)
            }
            (Value::Number(_) | Value::String(_), Value::Object(_)) => {
                let prim = self.to_primitive(b, PrimitiveHint::Default);
                self.abstract_equals(a, &prim)
            }
            _ => false,
        }
    }

    // §11.8.5 abstract relational comparison; `None` means an operand was
    // NaN and every relation is false.
    pub(crate) fn less_than(&mut self, a: &Value, b: &Value) -> Option<bool> {
        let pa = self.to_primitive(a, PrimitiveHint::Number);
        let pb = self.to_primitive(b, PrimitiveHint::Number);
        if let (Value::String(x), Value::String(y)) = (&pa, &pb) {
            return Some(x.code_units < y.code_units);
        }
        let x = to_number_value_pure(&pa);
        let y = to_number_value_pure(&pb);
        if x.is_nan() || y.is_nan() {
            return None;
        }
        Some(x < y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_formatting() {
        assert_eq!(number_to_string(1.0), "1");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::INFINITY), "Infinity");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1e-7), "1e-7");
        assert_eq!(number_to_string(0.000001), "0.000001");
        assert_eq!(number_to_string(1e20), "100000000000000000000");
    }

    #[test]
    fn uint32_wrapping() {
        assert_eq!(to_uint32(-1.0), 4294967295);
        assert_eq!(to_int32(4294967295.0), -1);
        assert_eq!(to_uint32(f64::NAN), 0);
        assert_eq!(to_uint32(4294967296.0), 0);
        assert_eq!(to_int32(2147483648.0), -2147483648);
    }

    #[test]
    fn string_to_number_forms() {
        assert_eq!(string_to_number(&JsString::from_str("  42 ")), 42.0);
        assert_eq!(string_to_number(&JsString::from_str("0x10")), 16.0);
        assert_eq!(string_to_number(&JsString::from_str("")), 0.0);
        assert!(string_to_number(&JsString::from_str("12x")).is_nan());
        assert_eq!(
            string_to_number(&JsString::from_str("-Infinity")),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn array_index_names() {
        assert_eq!(legal_array_index("0"), Some(0));
        assert_eq!(legal_array_index("42"), Some(42));
        assert_eq!(legal_array_index("01"), None);
        assert_eq!(legal_array_index("-1"), None);
        assert_eq!(legal_array_index("1.5"), None);
        assert_eq!(legal_array_index("4294967295"), None);
    }

    #[test]
    fn same_value_zero_and_nan() {
        assert!(same_value(
            &Value::Number(f64::NAN),
            &Value::Number(f64::NAN)
        ));
        assert!(!same_value(&Value::Number(0.0), &Value::Number(-0.0)));
        assert!(same_value(&Value::string("a"), &Value::string("a")));
    }
}
