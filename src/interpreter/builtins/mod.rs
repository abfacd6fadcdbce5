//! Built-in constructors and prototypes, wired in a fixed bootstrap order so
//! that `Object.prototype` and `Function.prototype` exist before any other
//! prototype is linked.

pub(crate) mod array;
pub(crate) mod date;
pub(crate) mod function;
pub(crate) mod json;
pub(crate) mod number;
pub(crate) mod object;
pub(crate) mod polyfills;
pub(crate) mod regexp;
pub(crate) mod string;

use super::helpers::{self, to_boolean};
use super::types::{FunctionData, FunctionKind, Scope, StepError};
use super::{Descriptor, ErrorKind, Interpreter};
use crate::types::{JsString, ObjectHandle, Value};
use std::rc::Rc;

pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

impl Interpreter {
    pub(crate) fn bootstrap(&mut self) {
        // Raw Object.prototype, then Function.prototype chained to it.
        let object_proto = self.create_object_proto(None);
        self.object_proto = object_proto;
        let function_proto = self.create_object_proto(Some(object_proto));
        self.function_proto = function_proto;
        {
            // Function.prototype is itself callable and returns undefined.
            let id = self.next_function_id();
            let obj = self.object(function_proto);
            let mut od = obj.borrow_mut();
            od.class = "Function";
            od.func = Some(FunctionData {
                id,
                kind: FunctionKind::Native {
                    func: Rc::new(|_, _, _| Ok(Value::Undefined)),
                },
                bound_this: None,
                bound_args: Vec::new(),
                illegal_constructor: true,
                is_eval: false,
            });
        }

        let global = self.create_object_proto(Some(object_proto));
        self.object(global).borrow_mut().class = "global";
        self.global_object = Value::Object(global);
        self.global_scope = Rc::new(Scope {
            object: global,
            parent: None,
            strict: false,
        });

        function::init(self);
        object::init(self);
        array::init(self);
        string::init(self);
        number::init(self);
        date::init(self);
        regexp::init(self);
        self.init_error();
        self.init_math();
        json::init(self);
        self.init_global_functions();
    }

    /// Install a built-in method: writable and configurable, never
    /// enumerable, fixed `length`.
    pub(crate) fn set_method<F>(
        &mut self,
        target: ObjectHandle,
        name: &str,
        arity: u32,
        f: F,
    ) where
        F: Fn(&mut Interpreter, &Value, &[Value]) -> Result<Value, StepError> + 'static,
    {
        let func = self.create_native_function(arity, false, f);
        self.define_own(target, name, Descriptor::builtin(func));
    }

    pub(crate) fn register_global(&mut self, name: &str, value: Value) {
        let Value::Object(global) = self.global_object.clone() else {
            return;
        };
        self.define_own(global, name, Descriptor::builtin(value));
    }

    /// Whether the innermost call frame is a construct invocation; natives
    /// use this to distinguish `new Ctor()` from `Ctor()`.
    pub fn called_with_new(&self) -> bool {
        self.state_stack.last().is_some_and(|s| s.is_constructor)
    }

    pub(crate) fn this_object(&mut self, this: &Value) -> Result<ObjectHandle, StepError> {
        match this {
            Value::Object(handle) => Ok(*handle),
            other => {
                let rendered = self.to_string_value(&other.clone());
                Err(self.throw_error(
                    ErrorKind::Type,
                    format!("Method called on incompatible receiver {rendered}"),
                ))
            }
        }
    }

    /// Wire `ctor.prototype = proto` (non-writable) and
    /// `proto.constructor = ctor`.
    pub(crate) fn link_constructor(&mut self, ctor: &Value, proto: ObjectHandle) {
        let Value::Object(ctor_handle) = ctor else {
            return;
        };
        self.define_own(
            *ctor_handle,
            "prototype",
            Descriptor::frozen(Value::Object(proto)),
        );
        self.define_own(proto, "constructor", Descriptor::builtin(ctor.clone()));
    }

    // Error family -----------------------------------------------------------

    fn init_error(&mut self) {
        let error_proto = self.create_object_proto(Some(self.object_proto));
        self.object(error_proto).borrow_mut().class = "Error";
        self.error_protos.insert("Error", error_proto);
        let error_ctor = self.make_error_constructor(error_proto);
        self.link_constructor(&error_ctor, error_proto);
        self.register_global("Error", error_ctor);
        self.define_own(error_proto, "name", Descriptor::builtin(Value::string("Error")));
        self.define_own(
            error_proto,
            "message",
            Descriptor::builtin(Value::string("")),
        );
        self.set_method(error_proto, "toString", 0, |interp, this, _args| {
            Ok(Value::string(&interp.to_string_value(this)))
        });

        // One factory stamps out the subclasses, chained to Error.
        for name in [
            "EvalError",
            "RangeError",
            "ReferenceError",
            "SyntaxError",
            "TypeError",
            "URIError",
        ] {
            let proto = self.create_object_proto(Some(error_proto));
            self.object(proto).borrow_mut().class = "Error";
            self.define_own(proto, "name", Descriptor::builtin(Value::string(name)));
            self.error_protos.insert(name, proto);
            let ctor = self.make_error_constructor(proto);
            self.link_constructor(&ctor, proto);
            self.register_global(name, ctor);
        }
    }

    fn make_error_constructor(&mut self, proto: ObjectHandle) -> Value {
        self.create_native_function(1, true, move |interp, this, args| {
            let handle = match this {
                Value::Object(h) if interp.called_with_new() => *h,
                _ => interp.create_object_proto(Some(proto)),
            };
            interp.object(handle).borrow_mut().class = "Error";
            let message = arg(args, 0);
            if !message.is_undefined() {
                let text = interp.to_string_value(&message);
                interp.define_own(handle, "message", Descriptor::builtin(Value::string(&text)));
            }
            Ok(Value::Object(handle))
        })
    }

    // Math -------------------------------------------------------------------

    fn init_math(&mut self) {
        let math = self.create_object();
        self.object(math).borrow_mut().class = "Math";

        let constants: &[(&str, f64)] = &[
            ("E", std::f64::consts::E),
            ("LN2", std::f64::consts::LN_2),
            ("LN10", std::f64::consts::LN_10),
            ("LOG2E", std::f64::consts::LOG2_E),
            ("LOG10E", std::f64::consts::LOG10_E),
            ("PI", std::f64::consts::PI),
            ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
            ("SQRT2", std::f64::consts::SQRT_2),
        ];
        for (name, value) in constants {
            self.define_own(math, name, Descriptor::frozen(Value::Number(*value)));
        }

        let unary: &[(&str, fn(f64) -> f64)] = &[
            ("abs", f64::abs),
            ("acos", f64::acos),
            ("asin", f64::asin),
            ("atan", f64::atan),
            ("ceil", f64::ceil),
            ("cos", f64::cos),
            ("exp", f64::exp),
            ("floor", f64::floor),
            ("log", f64::ln),
            ("sin", f64::sin),
            ("sqrt", f64::sqrt),
            ("tan", f64::tan),
            ("round", |x: f64| {
                // JS rounds half toward +∞, unlike f64::round.
                if x.is_finite() {
                    (x + 0.5).floor()
                } else {
                    x
                }
            }),
        ];
        for (name, op) in unary {
            let op = *op;
            self.set_method(math, name, 1, move |interp, _this, args| {
                let x = interp.to_number_value(&arg(args, 0));
                Ok(Value::Number(op(x)))
            });
        }

        self.set_method(math, "max", 2, |interp, _this, args| {
            let mut best = f64::NEG_INFINITY;
            for a in args {
                let n = interp.to_number_value(a);
                if n.is_nan() {
                    return Ok(Value::Number(f64::NAN));
                }
                if n > best {
                    best = n;
                }
            }
            Ok(Value::Number(best))
        });
        self.set_method(math, "min", 2, |interp, _this, args| {
            let mut best = f64::INFINITY;
            for a in args {
                let n = interp.to_number_value(a);
                if n.is_nan() {
                    return Ok(Value::Number(f64::NAN));
                }
                if n < best {
                    best = n;
                }
            }
            Ok(Value::Number(best))
        });
        self.set_method(math, "pow", 2, |interp, _this, args| {
            let base = interp.to_number_value(&arg(args, 0));
            let exponent = interp.to_number_value(&arg(args, 1));
            Ok(Value::Number(base.powf(exponent)))
        });
        self.set_method(math, "atan2", 2, |interp, _this, args| {
            let y = interp.to_number_value(&arg(args, 0));
            let x = interp.to_number_value(&arg(args, 1));
            Ok(Value::Number(y.atan2(x)))
        });
        self.set_method(math, "random", 0, |_interp, _this, _args| {
            Ok(Value::Number(rand::random::<f64>()))
        });

        self.register_global("Math", Value::Object(math));
    }

    // Global functions and values --------------------------------------------

    fn init_global_functions(&mut self) {
        let Value::Object(global) = self.global_object.clone() else {
            return;
        };
        self.define_own(global, "NaN", Descriptor::frozen(Value::Number(f64::NAN)));
        self.define_own(
            global,
            "Infinity",
            Descriptor::frozen(Value::Number(f64::INFINITY)),
        );
        self.define_own(global, "undefined", Descriptor::frozen(Value::Undefined));
        self.define_own(global, "this", Descriptor::frozen(Value::Object(global)));

        // `eval` is recognised by the call machinery; it cannot run as an
        // ordinary native because it needs the caller's scope.
        let eval_fn = self.create_native_function(1, false, |_interp, _this, args| {
            Ok(arg(args, 0))
        });
        if let Value::Object(handle) = &eval_fn {
            let obj = self.object(*handle);
            let mut obj_mut = obj.borrow_mut();
            if let Some(func) = obj_mut.func.as_mut() {
                func.is_eval = true;
            }
        }
        self.register_global("eval", eval_fn);

        self.register_global_fn("parseInt", 2, |interp, _this, args| {
            let text = interp.to_string_value(&arg(args, 0));
            let radix = interp.to_number_value(&arg(args, 1));
            Ok(Value::Number(parse_int(&text, radix as i32)))
        });
        self.register_global_fn("parseFloat", 1, |interp, _this, args| {
            let text = interp.to_string_value(&arg(args, 0));
            Ok(Value::Number(parse_float(&text)))
        });
        self.register_global_fn("isNaN", 1, |interp, _this, args| {
            Ok(Value::Boolean(interp.to_number_value(&arg(args, 0)).is_nan()))
        });
        self.register_global_fn("isFinite", 1, |interp, _this, args| {
            Ok(Value::Boolean(
                interp.to_number_value(&arg(args, 0)).is_finite(),
            ))
        });

        self.register_global_fn("encodeURI", 1, |interp, _this, args| {
            let text = interp.to_string_value(&arg(args, 0));
            Ok(Value::string(&encode_uri(&text, URI_RESERVED_AND_UNESCAPED)))
        });
        self.register_global_fn("encodeURIComponent", 1, |interp, _this, args| {
            let text = interp.to_string_value(&arg(args, 0));
            Ok(Value::string(&encode_uri(&text, URI_UNESCAPED)))
        });
        self.register_global_fn("decodeURI", 1, |interp, _this, args| {
            let text = interp.to_string_value(&arg(args, 0));
            match decode_uri(&text, ";/?:@&=+$,#") {
                Ok(decoded) => Ok(Value::string(&decoded)),
                Err(msg) => Err(interp.throw_error(ErrorKind::Uri, msg)),
            }
        });
        self.register_global_fn("decodeURIComponent", 1, |interp, _this, args| {
            let text = interp.to_string_value(&arg(args, 0));
            match decode_uri(&text, "") {
                Ok(decoded) => Ok(Value::string(&decoded)),
                Err(msg) => Err(interp.throw_error(ErrorKind::Uri, msg)),
            }
        });
    }

    fn register_global_fn<F>(&mut self, name: &str, arity: u32, f: F)
    where
        F: Fn(&mut Interpreter, &Value, &[Value]) -> Result<Value, StepError> + 'static,
    {
        let func = self.create_native_function(arity, false, f);
        self.register_global(name, func);
    }

    /// ToBoolean exposed for builtins operating on raw arguments.
    pub(crate) fn truthy(&self, value: &Value) -> bool {
        to_boolean(value)
    }
}

// §15.1.2.2 parseInt
fn parse_int(text: &str, mut radix: i32) -> f64 {
    let mut chars = text.trim().chars().peekable();
    let mut sign = 1.0;
    match chars.peek() {
        Some('+') => {
            chars.next();
        }
        Some('-') => {
            sign = -1.0;
            chars.next();
        }
        _ => {}
    }
    let mut stripped: String = chars.collect();
    if radix == 16 || radix == 0 {
        if let Some(rest) = stripped
            .strip_prefix("0x")
            .or_else(|| stripped.strip_prefix("0X"))
        {
            stripped = rest.to_string();
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let mut value = 0.0f64;
    let mut any = false;
    for ch in stripped.chars() {
        match ch.to_digit(36) {
            Some(d) if (d as i32) < radix => {
                value = value * radix as f64 + d as f64;
                any = true;
            }
            _ => break,
        }
    }
    if !any {
        return f64::NAN;
    }
    sign * value
}

// §15.1.2.3 parseFloat: the longest numeric prefix.
fn parse_float(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0usize;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    if trimmed[end..].starts_with("Infinity") {
        return if bytes.first() == Some(&b'-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }
    while end < bytes.len() {
        let b = bytes[end];
        if b.is_ascii_digit() {
            seen_digit = true;
            end += 1;
        } else if b == b'.' && !seen_dot && !seen_exp {
            seen_dot = true;
            end += 1;
        } else if (b == b'e' || b == b'E') && seen_digit && !seen_exp {
            let mut probe = end + 1;
            if probe < bytes.len() && (bytes[probe] == b'+' || bytes[probe] == b'-') {
                probe += 1;
            }
            if probe < bytes.len() && bytes[probe].is_ascii_digit() {
                seen_exp = true;
                end = probe + 1;
            } else {
                break;
            }
        } else {
            break;
        }
    }
    if !seen_digit {
        return f64::NAN;
    }
    trimmed[..end].parse().unwrap_or(f64::NAN)
}

const URI_UNESCAPED: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_.!~*'()";
const URI_RESERVED_AND_UNESCAPED: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_.!~*'();/?:@&=+$,#";

fn encode_uri(text: &str, unescaped: &str) -> String {
    let mut out = String::new();
    for ch in text.chars() {
        if unescaped.contains(ch) {
            out.push(ch);
        } else {
            let mut buf = [0u8; 4];
            for byte in ch.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    out
}

fn decode_uri(text: &str, preserved: &str) -> Result<String, String> {
    let bytes = text.as_bytes();
    let mut out_bytes: Vec<u8> = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len() {
                return Err("URI malformed".to_string());
            }
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| "URI malformed".to_string())?;
            // Reserved characters survive decodeURI untouched.
            if hex.is_ascii() && preserved.contains(hex as char) {
                out_bytes.extend_from_slice(&bytes[i..i + 3]);
            } else {
                out_bytes.push(hex);
            }
            i += 3;
        } else {
            out_bytes.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out_bytes).map_err(|_| "URI malformed".to_string())
}

/// Length of an array-like `this` for the native Array methods.
pub(crate) fn array_length(interp: &mut Interpreter, handle: ObjectHandle) -> u32 {
    match interp.plain_chain_value(handle, "length") {
        Some(Value::Number(n)) => helpers::to_uint32(n),
        Some(other) => helpers::to_uint32(helpers::to_number_value_pure(&other)),
        None => 0,
    }
}

pub(crate) fn js_string_arg(interp: &mut Interpreter, args: &[Value], index: usize) -> JsString {
    let value = arg(args, index);
    JsString::from_str(&interp.to_string_value(&value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_forms() {
        assert_eq!(parse_int("42", 0), 42.0);
        assert_eq!(parse_int("  -17  ", 0), -17.0);
        assert_eq!(parse_int("0xFF", 0), 255.0);
        assert_eq!(parse_int("FF", 16), 255.0);
        assert_eq!(parse_int("12abc", 0), 12.0);
        assert!(parse_int("abc", 0).is_nan());
        assert_eq!(parse_int("101", 2), 5.0);
    }

    #[test]
    fn parse_float_forms() {
        assert_eq!(parse_float("3.14 is pi"), 3.14);
        assert_eq!(parse_float("  2.5e2x"), 250.0);
        assert_eq!(parse_float("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_float("px12").is_nan());
        assert_eq!(parse_float("7."), 7.0);
    }

    #[test]
    fn uri_round_trip() {
        let encoded = encode_uri("a b/ü", URI_UNESCAPED);
        assert_eq!(encoded, "a%20b%2F%C3%BC");
        assert_eq!(decode_uri(&encoded, "").unwrap(), "a b/ü");
        assert!(decode_uri("%zz", "").is_err());
        assert!(decode_uri("%C3", "").is_err());
    }

    #[test]
    fn decode_uri_preserves_reserved() {
        // decodeURI leaves encoded reserved characters alone.
        assert_eq!(decode_uri("a%2Fb", ";/?:@&=+$,#").unwrap(), "a%2Fb");
        assert_eq!(decode_uri("a%2Fb", "").unwrap(), "a/b");
    }
}
