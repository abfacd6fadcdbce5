use super::super::{ErrorKind, Interpreter};
use super::{arg, array_length};
use crate::interpreter::helpers;
use crate::types::Value;

pub(crate) fn init(interp: &mut Interpreter) {
    let array_proto = interp.create_object_proto(Some(interp.object_proto));
    {
        let obj = interp.object(array_proto);
        let mut od = obj.borrow_mut();
        od.class = "Array";
        od.insert_ordered("length", Value::Number(0.0));
        od.not_enumerable.insert("length".to_string());
        od.not_configurable.insert("length".to_string());
    }
    interp.array_proto = array_proto;

    // `Array(n)` presizes; `Array(a, b, …)` builds from the arguments.
    let ctor = interp.create_native_function(1, true, |interp, _this, args| {
        let handle = interp.create_array();
        let array = Value::Object(handle);
        if args.len() == 1 {
            if let Value::Number(n) = &args[0] {
                let length = helpers::to_uint32(*n);
                if f64::from(length) != *n {
                    return Err(
                        interp.throw_error(ErrorKind::Range, "Invalid array length")
                    );
                }
                interp.set_property(&array, "length", Value::Number(f64::from(length)));
                return Ok(array);
            }
        }
        for (index, value) in args.iter().enumerate() {
            let _ = interp.set_property_runtime(
                &array,
                &index.to_string(),
                value.clone(),
                false,
            );
        }
        Ok(array)
    });
    interp.link_constructor(&ctor, array_proto);
    interp.register_global("Array", ctor.clone());
    if let Value::Object(ctor_handle) = ctor {
        interp.set_method(ctor_handle, "isArray", 1, |interp, _this, args| {
            Ok(Value::Boolean(match arg(args, 0) {
                Value::Object(h) => interp.object(h).borrow().is_array(),
                _ => false,
            }))
        });
    }

    interp.set_method(array_proto, "toString", 0, |interp, this, _args| {
        Ok(Value::string(&interp.to_string_value(this)))
    });

    interp.set_method(array_proto, "join", 1, |interp, this, args| {
        let handle = interp.this_object(this)?;
        let separator = match arg(args, 0) {
            Value::Undefined => ",".to_string(),
            other => interp.to_string_value(&other),
        };
        Ok(Value::string(&interp.array_join(handle, &separator)))
    });

    interp.set_method(array_proto, "push", 1, |interp, this, args| {
        let handle = interp.this_object(this)?;
        let mut length = array_length(interp, handle);
        for value in args {
            interp.set_property_runtime(this, &length.to_string(), value.clone(), false)?;
            length += 1;
        }
        let length = Value::Number(f64::from(length));
        interp.set_property_runtime(this, "length", length.clone(), false)?;
        Ok(length)
    });

    interp.set_method(array_proto, "pop", 0, |interp, this, _args| {
        let handle = interp.this_object(this)?;
        let length = array_length(interp, handle);
        if length == 0 {
            interp.set_property_runtime(this, "length", Value::Number(0.0), false)?;
            return Ok(Value::Undefined);
        }
        let key = (length - 1).to_string();
        let value = interp
            .plain_chain_value(handle, &key)
            .unwrap_or(Value::Undefined);
        interp.delete_property(this, &key, false)?;
        interp.set_property_runtime(
            this,
            "length",
            Value::Number(f64::from(length - 1)),
            false,
        )?;
        Ok(value)
    });

    interp.set_method(array_proto, "shift", 0, |interp, this, _args| {
        let handle = interp.this_object(this)?;
        let length = array_length(interp, handle);
        if length == 0 {
            interp.set_property_runtime(this, "length", Value::Number(0.0), false)?;
            return Ok(Value::Undefined);
        }
        let first = interp
            .plain_chain_value(handle, "0")
            .unwrap_or(Value::Undefined);
        for index in 1..length {
            let value = interp.plain_chain_value(handle, &index.to_string());
            let key = (index - 1).to_string();
            match value {
                Some(value) => {
                    interp.set_property_runtime(this, &key, value, false)?;
                }
                None => {
                    interp.delete_property(this, &key, false)?;
                }
            }
        }
        interp.delete_property(this, &(length - 1).to_string(), false)?;
        interp.set_property_runtime(
            this,
            "length",
            Value::Number(f64::from(length - 1)),
            false,
        )?;
        Ok(first)
    });

    interp.set_method(array_proto, "unshift", 1, |interp, this, args| {
        let handle = interp.this_object(this)?;
        let length = array_length(interp, handle);
        let shift = args.len() as u32;
        for index in (0..length).rev() {
            let value = interp.plain_chain_value(handle, &index.to_string());
            let key = (index + shift).to_string();
            match value {
                Some(value) => {
                    interp.set_property_runtime(this, &key, value, false)?;
                }
                None => {
                    interp.delete_property(this, &key, false)?;
                }
            }
        }
        for (index, value) in args.iter().enumerate() {
            interp.set_property_runtime(this, &index.to_string(), value.clone(), false)?;
        }
        let new_length = Value::Number(f64::from(length + shift));
        interp.set_property_runtime(this, "length", new_length.clone(), false)?;
        Ok(new_length)
    });

    interp.set_method(array_proto, "slice", 2, |interp, this, args| {
        let handle = interp.this_object(this)?;
        let length = array_length(interp, handle);
        let (start, end) = slice_bounds(interp, args, length);
        let result_handle = interp.create_array();
        let result = Value::Object(result_handle);
        let mut out = 0u32;
        for index in start..end {
            if let Some(value) = interp.plain_chain_value(handle, &index.to_string()) {
                interp.set_property_runtime(&result, &out.to_string(), value, false)?;
            }
            out += 1;
        }
        interp.set_property_runtime(&result, "length", Value::Number(f64::from(out)), false)?;
        Ok(result)
    });

    interp.set_method(array_proto, "splice", 2, |interp, this, args| {
        let handle = interp.this_object(this)?;
        let length = array_length(interp, handle);
        let start = relative_index(interp, arg(args, 0), length);
        let delete_count = match arg(args, 1) {
            Value::Undefined if args.len() < 2 => length - start,
            other => {
                let n = interp.to_number_value(&other);
                (n.max(0.0) as u32).min(length - start)
            }
        };
        let inserted: Vec<Value> = args.iter().skip(2).cloned().collect();

        let removed_handle = interp.create_array();
        let removed = Value::Object(removed_handle);
        for offset in 0..delete_count {
            if let Some(value) =
                interp.plain_chain_value(handle, &(start + offset).to_string())
            {
                interp.set_property_runtime(&removed, &offset.to_string(), value, false)?;
            }
        }
        interp.set_property_runtime(
            &removed,
            "length",
            Value::Number(f64::from(delete_count)),
            false,
        )?;

        // Shift the tail, then write the insertions.
        let tail: Vec<Option<Value>> = ((start + delete_count)..length)
            .map(|i| interp.plain_chain_value(handle, &i.to_string()))
            .collect();
        let new_length = length - delete_count + inserted.len() as u32;
        for index in new_length..length {
            interp.delete_property(this, &index.to_string(), false)?;
        }
        for (offset, value) in tail.into_iter().enumerate() {
            let key = (start + inserted.len() as u32 + offset as u32).to_string();
            match value {
                Some(value) => {
                    interp.set_property_runtime(this, &key, value, false)?;
                }
                None => {
                    interp.delete_property(this, &key, false)?;
                }
            }
        }
        for (offset, value) in inserted.into_iter().enumerate() {
            interp.set_property_runtime(
                this,
                &(start + offset as u32).to_string(),
                value,
                false,
            )?;
        }
        interp.set_property_runtime(
            this,
            "length",
            Value::Number(f64::from(new_length)),
            false,
        )?;
        Ok(removed)
    });

    interp.set_method(array_proto, "concat", 1, |interp, this, args| {
        let result_handle = interp.create_array();
        let result = Value::Object(result_handle);
        let mut out = 0u32;
        let mut append = |interp: &mut Interpreter, value: &Value, out: &mut u32| {
            let spread = match value {
                Value::Object(h) if interp.object(*h).borrow().is_array() => Some(*h),
                _ => None,
            };
            match spread {
                Some(h) => {
                    let length = array_length(interp, h);
                    for index in 0..length {
                        if let Some(element) =
                            interp.plain_chain_value(h, &index.to_string())
                        {
                            interp.set_property_runtime(
                                &result,
                                &out.to_string(),
                                element,
                                false,
                            )?;
                        }
                        *out += 1;
                    }
                }
                None => {
                    interp.set_property_runtime(
                        &result,
                        &out.to_string(),
                        value.clone(),
                        false,
                    )?;
                    *out += 1;
                }
            }
            Ok::<(), crate::interpreter::StepError>(())
        };
        append(interp, this, &mut out)?;
        for value in args {
            append(interp, value, &mut out)?;
        }
        interp.set_property_runtime(&result, "length", Value::Number(f64::from(out)), false)?;
        Ok(result)
    });

    interp.set_method(array_proto, "reverse", 0, |interp, this, _args| {
        let handle = interp.this_object(this)?;
        let length = array_length(interp, handle);
        for low in 0..length / 2 {
            let high = length - low - 1;
            let a = interp.plain_chain_value(handle, &low.to_string());
            let b = interp.plain_chain_value(handle, &high.to_string());
            match b {
                Some(b) => {
                    interp.set_property_runtime(this, &low.to_string(), b, false)?;
                }
                None => {
                    interp.delete_property(this, &low.to_string(), false)?;
                }
            }
            match a {
                Some(a) => {
                    interp.set_property_runtime(this, &high.to_string(), a, false)?;
                }
                None => {
                    interp.delete_property(this, &high.to_string(), false)?;
                }
            }
        }
        Ok(this.clone())
    });

    interp.set_method(array_proto, "indexOf", 1, |interp, this, args| {
        let handle = interp.this_object(this)?;
        let length = array_length(interp, handle);
        let needle = arg(args, 0);
        let from = match arg(args, 1) {
            Value::Undefined => 0i64,
            other => interp.to_number_value(&other) as i64,
        };
        let start = if from < 0 {
            (length as i64 + from).max(0) as u32
        } else {
            from.min(length as i64) as u32
        };
        for index in start..length {
            if let Some(value) = interp.plain_chain_value(handle, &index.to_string()) {
                if value.strict_eq(&needle) {
                    return Ok(Value::Number(f64::from(index)));
                }
            }
        }
        Ok(Value::Number(-1.0))
    });

    interp.set_method(array_proto, "lastIndexOf", 1, |interp, this, args| {
        let handle = interp.this_object(this)?;
        let length = array_length(interp, handle);
        if length == 0 {
            return Ok(Value::Number(-1.0));
        }
        let needle = arg(args, 0);
        let from = if args.len() > 1 {
            interp.to_number_value(&arg(args, 1)) as i64
        } else {
            length as i64 - 1
        };
        let start = if from < 0 {
            length as i64 + from
        } else {
            from.min(length as i64 - 1)
        };
        if start < 0 {
            return Ok(Value::Number(-1.0));
        }
        for index in (0..=start as u32).rev() {
            if let Some(value) = interp.plain_chain_value(handle, &index.to_string()) {
                if value.strict_eq(&needle) {
                    return Ok(Value::Number(f64::from(index)));
                }
            }
        }
        Ok(Value::Number(-1.0))
    });
}

fn relative_index(interp: &mut Interpreter, value: Value, length: u32) -> u32 {
    let n = helpers::to_integer(interp.to_number_value(&value));
    if n < 0.0 {
        (length as f64 + n).max(0.0) as u32
    } else {
        n.min(length as f64) as u32
    }
}

fn slice_bounds(interp: &mut Interpreter, args: &[Value], length: u32) -> (u32, u32) {
    let start = relative_index(interp, arg(args, 0), length);
    let end = match arg(args, 1) {
        Value::Undefined => length,
        other => relative_index(interp, other, length),
    };
    (start, end.max(start))
}
