use super::super::{ErrorKind, Interpreter, NativeValue};
use super::arg;
use crate::interpreter::helpers;
use crate::interpreter::types::{InternalData, StepError};
use crate::types::{ObjectHandle, Value};

pub(crate) fn init(interp: &mut Interpreter) {
    let json = interp.create_object();
    interp.object(json).borrow_mut().class = "JSON";

    interp.set_method(json, "parse", 2, |interp, _this, args| {
        let text = interp.to_string_value(&arg(args, 0));
        let parsed: serde_json::Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                return Err(interp.throw_error(ErrorKind::Syntax, format!("Unexpected token in JSON: {e}")));
            }
        };
        let native = NativeValue::from_json(&parsed);
        Ok(interp.native_to_guest(&native))
    });

    interp.set_method(json, "stringify", 3, |interp, _this, args| {
        let value = arg(args, 0);
        let replacer = arg(args, 1);
        if interp.is_callable(&replacer) {
            // Function replacers would re-enter guest code mid-step.
            return Err(interp.throw_error(
                ErrorKind::Type,
                "Function replacers are not supported",
            ));
        }
        let filter = replacer_keys(interp, &replacer);
        let gap = stringify_gap(interp, &arg(args, 2));
        let mut seen = Vec::new();
        let rendered =
            stringify_value(interp, &value, &filter, &gap, "", &mut seen)?;
        Ok(match rendered {
            Some(text) => Value::string(&text),
            None => Value::Undefined,
        })
    });

    interp.register_global("JSON", Value::Object(json));
}

fn replacer_keys(interp: &mut Interpreter, replacer: &Value) -> Option<Vec<String>> {
    let Value::Object(handle) = replacer else {
        return None;
    };
    if !interp.object(*handle).borrow().is_array() {
        return None;
    }
    let length = match interp.plain_chain_value(*handle, "length") {
        Some(Value::Number(n)) => helpers::to_uint32(n),
        _ => 0,
    };
    let mut keys = Vec::new();
    for index in 0..length {
        if let Some(entry) = interp.plain_chain_value(*handle, &index.to_string()) {
            match entry {
                Value::String(s) => keys.push(s.to_rust_string()),
                Value::Number(n) => keys.push(helpers::number_to_string(n)),
                _ => {}
            }
        }
    }
    Some(keys)
}

fn stringify_gap(interp: &mut Interpreter, space: &Value) -> String {
    match space {
        Value::Number(n) => {
            let count = helpers::to_integer(*n).clamp(0.0, 10.0) as usize;
            " ".repeat(count)
        }
        Value::String(s) => {
            let text = s.to_rust_string();
            text.chars().take(10).collect()
        }
        Value::Object(handle) => {
            let boxed = match &interp.object(*handle).borrow().data {
                Some(InternalData::Boxed(v)) => Some(v.clone()),
                _ => None,
            };
            match boxed {
                Some(inner) => stringify_gap(interp, &inner),
                None => String::new(),
            }
        }
        _ => String::new(),
    }
}

/// §15.12.3 Str: `None` means the value is dropped (undefined, functions).
fn stringify_value(
    interp: &mut Interpreter,
    value: &Value,
    filter: &Option<Vec<String>>,
    gap: &str,
    indent: &str,
    seen: &mut Vec<ObjectHandle>,
) -> Result<Option<String>, StepError> {
    match value {
        Value::Undefined => Ok(None),
        Value::Null => Ok(Some("null".to_string())),
        Value::Boolean(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(if n.is_finite() {
            helpers::number_to_string(*n)
        } else {
            "null".to_string()
        })),
        Value::String(s) => Ok(Some(quote_json(&s.to_rust_string()))),
        Value::Object(handle) => {
            let handle = *handle;
            // Internal-data objects serialize through their backing value.
            let special = {
                let obj = interp.object(handle);
                let od = obj.borrow();
                match &od.data {
                    Some(InternalData::Boxed(inner)) => Some(inner.clone()),
                    Some(InternalData::Date(_)) => None,
                    _ => None,
                }
            };
            if let Some(inner) = special {
                return stringify_value(interp, &inner, filter, gap, indent, seen);
            }
            let is_date = matches!(
                interp.object(handle).borrow().data,
                Some(InternalData::Date(_))
            );
            if is_date {
                // Dates render as their ISO string, like toJSON would.
                let iso = interp.to_json_date(handle);
                return Ok(Some(match iso {
                    Some(iso) => quote_json(&iso),
                    None => "null".to_string(),
                }));
            }
            if interp.is_callable(value) {
                return Ok(None);
            }
            if seen.contains(&handle) {
                return Err(interp.throw_error(
                    ErrorKind::Type,
                    "Converting circular structure to JSON",
                ));
            }
            seen.push(handle);
            let inner_indent = format!("{indent}{gap}");
            let is_array = interp.object(handle).borrow().is_array();
            let result = if is_array {
                let length = match interp.plain_chain_value(handle, "length") {
                    Some(Value::Number(n)) => helpers::to_uint32(n),
                    _ => 0,
                };
                let mut parts = Vec::new();
                for index in 0..length {
                    let element = interp
                        .plain_chain_value(handle, &index.to_string())
                        .unwrap_or(Value::Undefined);
                    let rendered = stringify_value(
                        interp,
                        &element,
                        filter,
                        gap,
                        &inner_indent,
                        seen,
                    )?;
                    parts.push(rendered.unwrap_or_else(|| "null".to_string()));
                }
                Ok(Some(wrap_brackets("[", "]", &parts, gap, indent, &inner_indent)))
            } else {
                let keys = {
                    let obj = interp.object(handle);
                    let od = obj.borrow();
                    od.enumerable_own_keys()
                };
                let mut parts = Vec::new();
                for key in keys {
                    if let Some(filter) = filter {
                        if !filter.contains(&key) {
                            continue;
                        }
                    }
                    let element = interp
                        .plain_chain_value(handle, &key)
                        .unwrap_or(Value::Undefined);
                    if let Some(rendered) = stringify_value(
                        interp,
                        &element,
                        filter,
                        gap,
                        &inner_indent,
                        seen,
                    )? {
                        let separator = if gap.is_empty() { ":" } else { ": " };
                        parts.push(format!("{}{separator}{rendered}", quote_json(&key)));
                    }
                }
                Ok(Some(wrap_brackets("{", "}", &parts, gap, indent, &inner_indent)))
            };
            seen.pop();
            result
        }
    }
}

fn wrap_brackets(
    open: &str,
    close: &str,
    parts: &[String],
    gap: &str,
    indent: &str,
    inner_indent: &str,
) -> String {
    if parts.is_empty() {
        return format!("{open}{close}");
    }
    if gap.is_empty() {
        return format!("{open}{}{close}", parts.join(","));
    }
    format!(
        "{open}\n{inner_indent}{}\n{indent}{close}",
        parts.join(&format!(",\n{inner_indent}"))
    )
}

fn quote_json(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

impl Interpreter {
    fn to_json_date(&self, handle: ObjectHandle) -> Option<String> {
        let ms = match &self.object(handle).borrow().data {
            Some(InternalData::Date(ms)) => *ms,
            _ => return None,
        };
        super::date::date_to_iso_string(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting() {
        assert_eq!(quote_json("a\"b"), "\"a\\\"b\"");
        assert_eq!(quote_json("line\nbreak"), "\"line\\nbreak\"");
        assert_eq!(quote_json("\u{0001}"), "\"\\u0001\"");
    }
}
