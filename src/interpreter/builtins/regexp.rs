use super::super::{Descriptor, ErrorKind, Interpreter};
use super::arg;
use super::string::byte_to_utf16_index;
use crate::interpreter::helpers;
use crate::interpreter::types::{InternalData, RegExpData, StepError};
use crate::types::{ObjectHandle, Value};

pub(crate) fn init(interp: &mut Interpreter) {
    let regexp_proto = interp.create_object_proto(Some(interp.object_proto));
    interp.object(regexp_proto).borrow_mut().class = "RegExp";
    interp.regexp_proto = regexp_proto;

    let ctor = interp.create_native_function(2, true, |interp, _this, args| {
        let pattern = arg(args, 0);
        let flags = arg(args, 1);
        match &pattern {
            Value::Object(h) if is_regexp(interp, *h) => {
                if !flags.is_undefined() {
                    return Err(interp.throw_error(
                        ErrorKind::Type,
                        "Cannot supply flags when constructing one RegExp from another",
                    ));
                }
                if !interp.called_with_new() {
                    return Ok(pattern);
                }
                let (source, flags) = {
                    let obj = interp.object(*h);
                    let od = obj.borrow();
                    match &od.data {
                        Some(InternalData::RegExp(re)) => (re.source.clone(), re.flags.clone()),
                        _ => (String::new(), String::new()),
                    }
                };
                interp.create_regexp(&source, &flags)
            }
            _ => {
                let source = match &pattern {
                    Value::Undefined => String::new(),
                    other => interp.to_string_value(other),
                };
                let flags = match &flags {
                    Value::Undefined => String::new(),
                    other => interp.to_string_value(other),
                };
                interp.create_regexp(&source, &flags)
            }
        }
    });
    interp.link_constructor(&ctor, regexp_proto);
    interp.register_global("RegExp", ctor);

    interp.set_method(regexp_proto, "toString", 0, |interp, this, _args| {
        Ok(Value::string(&interp.to_string_value(this)))
    });

    interp.set_method(regexp_proto, "test", 1, |interp, this, args| {
        let handle = interp.this_object(this)?;
        let text = interp.to_string_value(&arg(args, 0));
        let result = exec_regexp(interp, handle, &text)?;
        Ok(Value::Boolean(!matches!(result, Value::Null)))
    });

    interp.set_method(regexp_proto, "exec", 1, |interp, this, args| {
        let handle = interp.this_object(this)?;
        let text = interp.to_string_value(&arg(args, 0));
        exec_regexp(interp, handle, &text)
    });
}

fn is_regexp(interp: &Interpreter, handle: ObjectHandle) -> bool {
    matches!(
        interp.object(handle).borrow().data,
        Some(InternalData::RegExp(_))
    )
}

impl Interpreter {
    /// Build a guest RegExp object backed by a compiled `fancy_regex`.
    /// Invalid patterns or flags raise a guest SyntaxError.
    pub(crate) fn create_regexp(
        &mut self,
        source: &str,
        flags: &str,
    ) -> Result<Value, StepError> {
        let handle = self.create_object_proto(Some(self.regexp_proto));
        self.object(handle).borrow_mut().class = "RegExp";
        self.populate_regexp(handle, source, flags)?;
        Ok(Value::Object(handle))
    }

    pub(crate) fn populate_regexp(
        &mut self,
        handle: ObjectHandle,
        source: &str,
        flags: &str,
    ) -> Result<(), StepError> {
        let mut global = false;
        let mut ignore_case = false;
        let mut multiline = false;
        let mut sticky = false;
        let mut dot_all = false;
        for flag in flags.chars() {
            let slot = match flag {
                'g' => &mut global,
                'i' => &mut ignore_case,
                'm' => &mut multiline,
                's' => &mut dot_all,
                'y' => &mut sticky,
                other => {
                    return Err(self.throw_error(
                        ErrorKind::Syntax,
                        format!("Invalid regular expression flag '{other}'"),
                    ));
                }
            };
            if *slot {
                return Err(self.throw_error(
                    ErrorKind::Syntax,
                    format!("Duplicate regular expression flag '{flag}'"),
                ));
            }
            *slot = true;
        }

        let translated = translate_pattern(source, ignore_case, multiline, dot_all);
        let regex = match fancy_regex::Regex::new(&translated) {
            Ok(re) => Some(re),
            Err(e) => {
                return Err(self.throw_error(
                    ErrorKind::Syntax,
                    format!("Invalid regular expression: /{source}/: {e}"),
                ));
            }
        };

        {
            let obj = self.object(handle);
            obj.borrow_mut().data = Some(InternalData::RegExp(RegExpData {
                source: source.to_string(),
                flags: flags.to_string(),
                global,
                ignore_case,
                multiline,
                sticky,
                regex,
            }));
        }
        self.define_own(handle, "source", Descriptor::frozen(Value::string(source)));
        self.define_own(handle, "global", Descriptor::frozen(Value::Boolean(global)));
        self.define_own(
            handle,
            "ignoreCase",
            Descriptor::frozen(Value::Boolean(ignore_case)),
        );
        self.define_own(
            handle,
            "multiline",
            Descriptor::frozen(Value::Boolean(multiline)),
        );
        self.define_own(
            handle,
            "lastIndex",
            Descriptor {
                value: Some(Value::Number(0.0)),
                writable: Some(true),
                enumerable: Some(false),
                configurable: Some(false),
                ..Default::default()
            },
        );
        Ok(())
    }
}

/// §15.10.6.2 RegExp.prototype.exec: honour lastIndex for global and sticky
/// expressions; the result array carries `index` and `input`.
pub(crate) fn exec_regexp(
    interp: &mut Interpreter,
    handle: ObjectHandle,
    text: &str,
) -> Result<Value, StepError> {
    let (regex, global, sticky) = {
        let obj = interp.object(handle);
        let od = obj.borrow();
        match &od.data {
            Some(InternalData::RegExp(re)) => {
                (re.regex.clone(), re.global, re.sticky)
            }
            _ => {
                return Err(interp.throw_error(
                    ErrorKind::Type,
                    "RegExp method called on incompatible receiver",
                ));
            }
        }
    };
    let Some(regex) = regex else {
        return Ok(Value::Null);
    };

    let regexp_value = Value::Object(handle);
    let last_index = if global || sticky {
        let raw = interp
            .plain_chain_value(handle, "lastIndex")
            .unwrap_or(Value::Number(0.0));
        helpers::to_integer(helpers::to_number_value_pure(&raw)).max(0.0) as usize
    } else {
        0
    };
    let byte_start = utf16_index_to_byte(text, last_index);
    let miss = byte_start > text.len();

    let captures = if miss {
        None
    } else {
        regex.captures_from_pos(text, byte_start).ok().flatten()
    };
    let captures = match captures {
        Some(caps) => {
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            if sticky && start != byte_start {
                None
            } else {
                Some(caps)
            }
        }
        None => None,
    };

    let Some(captures) = captures else {
        if global || sticky {
            interp.set_property(&regexp_value, "lastIndex", Value::Number(0.0));
        }
        return Ok(Value::Null);
    };

    let whole = captures.get(0);
    let (match_start, match_end) = whole
        .map(|m| (m.start(), m.end()))
        .unwrap_or((byte_start, byte_start));
    if global || sticky {
        interp.set_property(
            &regexp_value,
            "lastIndex",
            Value::Number(byte_to_utf16_index(text, match_end) as f64),
        );
    }

    let result_handle = interp.create_array();
    let result = Value::Object(result_handle);
    for index in 0..captures.len() {
        let value = captures
            .get(index)
            .map(|m| Value::string(m.as_str()))
            .unwrap_or(Value::Undefined);
        interp.set_property_runtime(&result, &index.to_string(), value, false)?;
    }
    interp.set_property_runtime(
        &result,
        "length",
        Value::Number(captures.len() as f64),
        false,
    )?;
    interp.set_property(
        &result,
        "index",
        Value::Number(byte_to_utf16_index(text, match_start) as f64),
    );
    interp.set_property(&result, "input", Value::string(text));
    Ok(result)
}

fn utf16_index_to_byte(text: &str, utf16_index: usize) -> usize {
    if utf16_index == 0 {
        return 0;
    }
    let mut units = 0usize;
    for (byte_offset, ch) in text.char_indices() {
        if units >= utf16_index {
            return byte_offset;
        }
        units += ch.len_utf16();
    }
    if units >= utf16_index {
        text.len()
    } else {
        text.len() + 1
    }
}

/// Inline-flag prefix; the ES5 pattern grammar itself is close enough to the
/// backing engine's to pass through.
fn translate_pattern(source: &str, ignore_case: bool, multiline: bool, dot_all: bool) -> String {
    let mut prefix = String::new();
    if ignore_case || multiline || dot_all {
        prefix.push_str("(?");
        if ignore_case {
            prefix.push('i');
        }
        if multiline {
            prefix.push('m');
        }
        if dot_all {
            prefix.push('s');
        }
        prefix.push(')');
    }
    if source.is_empty() {
        return format!("{prefix}(?:)");
    }
    format!("{prefix}{source}")
}

/// Escape a literal string for use as a pattern (String.prototype.search
/// and match with non-RegExp arguments).
pub(crate) fn escape_literal(text: &str) -> String {
    let mut out = String::new();
    for ch in text.chars() {
        if matches!(
            ch,
            '^' | '$' | '\\' | '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|'
                | '/'
        ) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
