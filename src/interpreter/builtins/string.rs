use super::super::{ErrorKind, Interpreter};
use super::{arg, js_string_arg};
use crate::interpreter::helpers;
use crate::interpreter::types::{InternalData, StepError};
use crate::types::{JsString, Value};

pub(crate) fn init(interp: &mut Interpreter) {
    let string_proto = interp.create_object_proto(Some(interp.object_proto));
    {
        let obj = interp.object(string_proto);
        let mut od = obj.borrow_mut();
        od.class = "String";
        od.data = Some(InternalData::Boxed(Value::string("")));
    }
    interp.string_proto = string_proto;

    let ctor = interp.create_native_function(1, true, |interp, this, args| {
        let text = if args.is_empty() {
            Value::string("")
        } else {
            Value::string(&interp.to_string_value(&arg(args, 0)))
        };
        if interp.called_with_new() {
            if let Value::Object(handle) = this {
                let obj = interp.object(*handle);
                let mut od = obj.borrow_mut();
                od.class = "String";
                od.data = Some(InternalData::Boxed(text.clone()));
                return Ok(Value::Object(*handle));
            }
        }
        Ok(text)
    });
    interp.link_constructor(&ctor, string_proto);
    interp.register_global("String", ctor.clone());
    if let Value::Object(ctor_handle) = ctor {
        interp.set_method(ctor_handle, "fromCharCode", 1, |interp, _this, args| {
            let units: Vec<u16> = args
                .iter()
                .map(|a| interp.to_number_value(a) as i64 as u16)
                .collect();
            Ok(Value::String(JsString { code_units: units }))
        });
    }

    interp.set_method(string_proto, "toString", 0, |interp, this, _args| {
        this_string(interp, this).map(Value::String)
    });
    interp.set_method(string_proto, "valueOf", 0, |interp, this, _args| {
        this_string(interp, this).map(Value::String)
    });

    interp.set_method(string_proto, "charAt", 1, |interp, this, args| {
        let s = this_string(interp, this)?;
        let index = helpers::to_integer(interp.to_number_value(&arg(args, 0)));
        if index < 0.0 {
            return Ok(Value::string(""));
        }
        Ok(s.char_at(index as usize)
            .map(Value::String)
            .unwrap_or_else(|| Value::string("")))
    });

    interp.set_method(string_proto, "charCodeAt", 1, |interp, this, args| {
        let s = this_string(interp, this)?;
        let index = helpers::to_integer(interp.to_number_value(&arg(args, 0)));
        if index < 0.0 || index >= s.len() as f64 {
            return Ok(Value::Number(f64::NAN));
        }
        Ok(Value::Number(f64::from(s.code_units[index as usize])))
    });

    interp.set_method(string_proto, "indexOf", 1, |interp, this, args| {
        let s = this_string(interp, this)?;
        let search = js_string_arg(interp, args, 0);
        let from = helpers::to_integer(interp.to_number_value(&arg(args, 1))).max(0.0) as usize;
        Ok(Value::Number(
            s.index_of(&search, from).map(|i| i as f64).unwrap_or(-1.0),
        ))
    });

    interp.set_method(string_proto, "lastIndexOf", 1, |interp, this, args| {
        let s = this_string(interp, this)?;
        let search = js_string_arg(interp, args, 0);
        let from = match arg(args, 1) {
            Value::Undefined => s.len(),
            other => {
                let n = interp.to_number_value(&other);
                if n.is_nan() {
                    s.len()
                } else {
                    helpers::to_integer(n).max(0.0) as usize
                }
            }
        };
        Ok(Value::Number(
            s.last_index_of(&search, from)
                .map(|i| i as f64)
                .unwrap_or(-1.0),
        ))
    });

    interp.set_method(string_proto, "slice", 2, |interp, this, args| {
        let s = this_string(interp, this)?;
        let length = s.len() as f64;
        let start = relative_position(interp, arg(args, 0), length);
        let end = match arg(args, 1) {
            Value::Undefined => length as usize,
            other => relative_position(interp, other, length),
        };
        Ok(Value::String(s.slice_units(start, end.max(start))))
    });

    interp.set_method(string_proto, "substring", 2, |interp, this, args| {
        let s = this_string(interp, this)?;
        let length = s.len() as f64;
        let clamp = |interp: &mut Interpreter, v: Value| -> usize {
            let n = helpers::to_integer(interp.to_number_value(&v));
            n.clamp(0.0, length) as usize
        };
        let a = clamp(interp, arg(args, 0));
        let b = match arg(args, 1) {
            Value::Undefined => length as usize,
            other => clamp(interp, other),
        };
        Ok(Value::String(s.slice_units(a.min(b), a.max(b))))
    });

    interp.set_method(string_proto, "substr", 2, |interp, this, args| {
        let s = this_string(interp, this)?;
        let length = s.len() as f64;
        let start = {
            let n = helpers::to_integer(interp.to_number_value(&arg(args, 0)));
            if n < 0.0 {
                (length + n).max(0.0) as usize
            } else {
                n.min(length) as usize
            }
        };
        let count = match arg(args, 1) {
            Value::Undefined => s.len() - start,
            other => helpers::to_integer(interp.to_number_value(&other)).max(0.0) as usize,
        };
        Ok(Value::String(s.slice_units(start, start + count)))
    });

    interp.set_method(string_proto, "concat", 1, |interp, this, args| {
        let mut s = this_string(interp, this)?;
        for value in args {
            let part = JsString::from_str(&interp.to_string_value(value));
            s = s.concat(&part);
        }
        Ok(Value::String(s))
    });

    interp.set_method(string_proto, "toLowerCase", 0, |interp, this, _args| {
        let s = this_string(interp, this)?;
        Ok(Value::string(&s.to_rust_string().to_lowercase()))
    });
    interp.set_method(string_proto, "toLocaleLowerCase", 0, |interp, this, _args| {
        let s = this_string(interp, this)?;
        Ok(Value::string(&s.to_rust_string().to_lowercase()))
    });
    interp.set_method(string_proto, "toUpperCase", 0, |interp, this, _args| {
        let s = this_string(interp, this)?;
        Ok(Value::string(&s.to_rust_string().to_uppercase()))
    });
    interp.set_method(string_proto, "toLocaleUpperCase", 0, |interp, this, _args| {
        let s = this_string(interp, this)?;
        Ok(Value::string(&s.to_rust_string().to_uppercase()))
    });

    interp.set_method(string_proto, "trim", 0, |interp, this, _args| {
        let s = this_string(interp, this)?;
        let text = s.to_rust_string();
        let trimmed = text.trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, '\u{FEFF}' | '\u{2028}' | '\u{2029}')
        });
        Ok(Value::string(trimmed))
    });

    // Ordering is host-delegated; the comparison is plain code-unit order.
    interp.set_method(string_proto, "localeCompare", 1, |interp, this, args| {
        let s = this_string(interp, this)?;
        let other = js_string_arg(interp, args, 0);
        Ok(Value::Number(match s.code_units.cmp(&other.code_units) {
            std::cmp::Ordering::Less => -1.0,
            std::cmp::Ordering::Equal => 0.0,
            std::cmp::Ordering::Greater => 1.0,
        }))
    });

    interp.set_method(string_proto, "split", 2, |interp, this, args| {
        let s = this_string(interp, this)?;
        let limit = match arg(args, 1) {
            Value::Undefined => u32::MAX,
            other => helpers::to_uint32(interp.to_number_value(&other)),
        };
        let result_handle = interp.create_array();
        let result = Value::Object(result_handle);
        let pieces: Vec<JsString> = match arg(args, 0) {
            Value::Undefined => vec![s.clone()],
            Value::Object(h) if is_regexp(interp, h) => {
                let text = s.to_rust_string();
                match compiled_regex(interp, h) {
                    Some(re) => {
                        let mut out = Vec::new();
                        let mut last = 0usize;
                        let mut cursor = 0usize;
                        while cursor < text.len() {
                            match re.find_from_pos(&text, cursor).ok().flatten() {
                                Some(m) if m.start() < text.len() => {
                                    // A match that consumes nothing since the
                                    // last split point makes no progress.
                                    if m.end() == last {
                                        cursor = next_char_boundary(&text, cursor);
                                        continue;
                                    }
                                    out.push(JsString::from_str(&text[last..m.start()]));
                                    last = m.end();
                                    cursor = if m.start() == m.end() {
                                        next_char_boundary(&text, m.end())
                                    } else {
                                        m.end()
                                    };
                                }
                                _ => break,
                            }
                        }
                        out.push(JsString::from_str(&text[last..]));
                        out
                    }
                    None => vec![s.clone()],
                }
            }
            separator => {
                let sep = JsString::from_str(&interp.to_string_value(&separator));
                if sep.is_empty() {
                    (0..s.len())
                        .map(|i| s.slice_units(i, i + 1))
                        .collect()
                } else {
                    let mut out = Vec::new();
                    let mut from = 0usize;
                    while let Some(found) = s.index_of(&sep, from) {
                        out.push(s.slice_units(from, found));
                        from = found + sep.len();
                    }
                    out.push(s.slice_units(from, s.len()));
                    out
                }
            }
        };
        let mut count = 0u32;
        for piece in pieces {
            if count >= limit {
                break;
            }
            interp.set_property_runtime(
                &result,
                &count.to_string(),
                Value::String(piece),
                false,
            )?;
            count += 1;
        }
        interp.set_property_runtime(&result, "length", Value::Number(f64::from(count)), false)?;
        Ok(result)
    });

    interp.set_method(string_proto, "search", 1, |interp, this, args| {
        let s = this_string(interp, this)?;
        let text = s.to_rust_string();
        let regexp = coerce_to_regexp(interp, arg(args, 0))?;
        let found = compiled_regex(interp, regexp)
            .and_then(|re| re.find(&text).ok().flatten())
            .map(|m| byte_to_utf16_index(&text, m.start()) as f64)
            .unwrap_or(-1.0);
        Ok(Value::Number(found))
    });

    interp.set_method(string_proto, "match", 1, |interp, this, args| {
        let s = this_string(interp, this)?;
        let text = s.to_rust_string();
        let regexp = coerce_to_regexp(interp, arg(args, 0))?;
        let global = {
            let obj = interp.object(regexp);
            let od = obj.borrow();
            match &od.data {
                Some(InternalData::RegExp(re)) => re.global,
                _ => false,
            }
        };
        if !global {
            return super::regexp::exec_regexp(interp, regexp, &text);
        }
        let Some(re) = compiled_regex(interp, regexp) else {
            return Ok(Value::Null);
        };
        let mut matches: Vec<String> = Vec::new();
        let mut pos = 0usize;
        while pos <= text.len() {
            match re.find_from_pos(&text, pos).ok().flatten() {
                Some(m) => {
                    matches.push(text[m.start()..m.end()].to_string());
                    pos = if m.start() == m.end() {
                        next_char_boundary(&text, m.end())
                    } else {
                        m.end()
                    };
                }
                None => break,
            }
        }
        interp.set_property(&Value::Object(regexp), "lastIndex", Value::Number(0.0));
        if matches.is_empty() {
            return Ok(Value::Null);
        }
        Ok(super::object::create_string_array(interp, matches))
    });

    // A function replacement is routed through a construction-time polyfill;
    // the native handles string replacements (with `$`-substitutions).
    interp.set_method(string_proto, "replace", 2, |interp, this, args| {
        let s = this_string(interp, this)?;
        let text = s.to_rust_string();
        let replacement_value = arg(args, 1);
        if interp.is_callable(&replacement_value) {
            return Err(interp.throw_error(
                ErrorKind::Type,
                "Function replacement requires the replace polyfill",
            ));
        }
        let replacement = interp.to_string_value(&replacement_value);
        match arg(args, 0) {
            Value::Object(h) if is_regexp(interp, h) => {
                let global = {
                    let obj = interp.object(h);
                    let od = obj.borrow();
                    match &od.data {
                        Some(InternalData::RegExp(re)) => re.global,
                        _ => false,
                    }
                };
                let Some(re) = compiled_regex(interp, h) else {
                    return Ok(Value::string(&text));
                };
                let mut out = String::new();
                let mut last = 0usize;
                let mut pos = 0usize;
                loop {
                    match re.captures_from_pos(&text, pos).ok().flatten() {
                        Some(caps) => {
                            let m = match caps.get(0) {
                                Some(m) => m,
                                None => break,
                            };
                            out.push_str(&text[last..m.start()]);
                            expand_replacement(
                                &mut out,
                                &replacement,
                                &text,
                                &caps,
                            );
                            last = m.end();
                            pos = if m.start() == m.end() {
                                next_char_boundary(&text, m.end())
                            } else {
                                m.end()
                            };
                            if !global || pos > text.len() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                out.push_str(&text[last..]);
                Ok(Value::string(&out))
            }
            pattern => {
                let needle = interp.to_string_value(&pattern);
                match text.find(&needle) {
                    None => Ok(Value::string(&text)),
                    Some(at) => {
                        let mut out = String::new();
                        out.push_str(&text[..at]);
                        // Only $$ and $& apply without capture groups.
                        let mut chars = replacement.chars().peekable();
                        while let Some(c) = chars.next() {
                            if c == '$' {
                                match chars.peek() {
                                    Some('$') => {
                                        chars.next();
                                        out.push('$');
                                    }
                                    Some('&') => {
                                        chars.next();
                                        out.push_str(&needle);
                                    }
                                    _ => out.push('$'),
                                }
                            } else {
                                out.push(c);
                            }
                        }
                        out.push_str(&text[at + needle.len()..]);
                        Ok(Value::string(&out))
                    }
                }
            }
        }
    });
}

fn this_string(interp: &mut Interpreter, this: &Value) -> Result<JsString, StepError> {
    match this {
        Value::String(s) => Ok(s.clone()),
        Value::Object(handle) => {
            let boxed = match &interp.object(*handle).borrow().data {
                Some(InternalData::Boxed(Value::String(s))) => Some(s.clone()),
                _ => None,
            };
            match boxed {
                Some(s) => Ok(s),
                None => Ok(JsString::from_str(&interp.to_string_value(this))),
            }
        }
        Value::Undefined | Value::Null => Err(interp.throw_error(
            ErrorKind::Type,
            "String.prototype method called on null or undefined",
        )),
        other => Ok(JsString::from_str(&interp.to_string_value(&other.clone()))),
    }
}

fn relative_position(interp: &mut Interpreter, value: Value, length: f64) -> usize {
    let n = helpers::to_integer(interp.to_number_value(&value));
    if n < 0.0 {
        (length + n).max(0.0) as usize
    } else {
        n.min(length) as usize
    }
}

fn is_regexp(interp: &Interpreter, handle: crate::types::ObjectHandle) -> bool {
    matches!(
        interp.object(handle).borrow().data,
        Some(InternalData::RegExp(_))
    )
}

fn compiled_regex(
    interp: &Interpreter,
    handle: crate::types::ObjectHandle,
) -> Option<fancy_regex::Regex> {
    match &interp.object(handle).borrow().data {
        Some(InternalData::RegExp(re)) => re.regex.clone(),
        _ => None,
    }
}

fn coerce_to_regexp(
    interp: &mut Interpreter,
    value: Value,
) -> Result<crate::types::ObjectHandle, StepError> {
    match value {
        Value::Object(h) if is_regexp(interp, h) => Ok(h),
        Value::Undefined => match interp.create_regexp("", "")? {
            Value::Object(h) => Ok(h),
            _ => Err(interp.throw_error(ErrorKind::Type, "Invalid regular expression")),
        },
        other => {
            let source = interp.to_string_value(&other);
            let escaped = super::regexp::escape_literal(&source);
            match interp.create_regexp(&escaped, "")? {
                Value::Object(h) => Ok(h),
                _ => Err(interp.throw_error(ErrorKind::Type, "Invalid regular expression")),
            }
        }
    }
}

fn expand_replacement(
    out: &mut String,
    replacement: &str,
    text: &str,
    caps: &fancy_regex::Captures<'_>,
) {
    let whole = caps.get(0);
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('&') => {
                chars.next();
                if let Some(m) = whole {
                    out.push_str(m.as_str());
                }
            }
            Some('`') => {
                chars.next();
                if let Some(m) = whole {
                    out.push_str(&text[..m.start()]);
                }
            }
            Some('\'') => {
                chars.next();
                if let Some(m) = whole {
                    out.push_str(&text[m.end()..]);
                }
            }
            Some(d1) if d1.is_ascii_digit() => {
                chars.next();
                let mut index = d1.to_digit(10).unwrap_or(0) as usize;
                // Two-digit group references win when the group exists.
                if let Some(d2) = chars.peek().copied().filter(|c| c.is_ascii_digit()) {
                    let two = index * 10 + d2.to_digit(10).unwrap_or(0) as usize;
                    if two > 0 && two < caps.len() {
                        chars.next();
                        index = two;
                    }
                }
                if index > 0 && index < caps.len() {
                    if let Some(group) = caps.get(index) {
                        out.push_str(group.as_str());
                    }
                } else {
                    out.push('$');
                    out.push(d1);
                }
            }
            _ => out.push('$'),
        }
    }
}

pub(crate) fn byte_to_utf16_index(text: &str, byte_offset: usize) -> usize {
    text[..byte_offset]
        .chars()
        .map(|c| c.len_utf16())
        .sum()
}

pub(crate) fn next_char_boundary(text: &str, at: usize) -> usize {
    if at >= text.len() {
        return at + 1;
    }
    let mut next = at + 1;
    while next < text.len() && !text.is_char_boundary(next) {
        next += 1;
    }
    next
}
