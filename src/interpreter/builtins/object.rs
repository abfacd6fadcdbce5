use super::super::{Descriptor, ErrorKind, Interpreter};
use super::arg;
use crate::interpreter::types::{InternalData, StepError};
use crate::types::{ObjectHandle, Value};

pub(crate) fn init(interp: &mut Interpreter) {
    let object_proto = interp.object_proto;

    let ctor = interp.create_native_function(1, true, |interp, this, args| {
        let value = arg(args, 0);
        match value {
            Value::Undefined | Value::Null => {
                if interp.called_with_new() {
                    if let Value::Object(h) = this {
                        return Ok(Value::Object(*h));
                    }
                }
                Ok(Value::Object(interp.create_object()))
            }
            Value::Object(_) => Ok(value),
            primitive => Ok(interp.box_primitive(&primitive)),
        }
    });
    interp.link_constructor(&ctor, object_proto);
    interp.register_global("Object", ctor.clone());
    let Value::Object(ctor_handle) = ctor else {
        return;
    };

    // Statics ----------------------------------------------------------------

    interp.set_method(ctor_handle, "getPrototypeOf", 1, |interp, _this, args| {
        let handle = expect_object(interp, &arg(args, 0))?;
        Ok(interp
            .get_object_data(handle)
            .and_then(|od| od.borrow().proto)
            .map(Value::Object)
            .unwrap_or(Value::Null))
    });

    interp.set_method(ctor_handle, "setPrototypeOf", 2, |interp, _this, args| {
        let handle = expect_object(interp, &arg(args, 0))?;
        let proto = match arg(args, 1) {
            Value::Null => None,
            Value::Object(h) => Some(h),
            _ => {
                return Err(interp.throw_error(
                    ErrorKind::Type,
                    "Object prototype may only be an Object or null",
                ));
            }
        };
        if interp.set_prototype(handle, proto).is_err() {
            return Err(
                interp.throw_error(ErrorKind::Type, "Cyclic prototype chain rejected")
            );
        }
        Ok(arg(args, 0))
    });

    // The second argument is handled by a construction-time polyfill.
    interp.set_method(ctor_handle, "create", 2, |interp, _this, args| {
        let proto = match arg(args, 0) {
            Value::Null => None,
            Value::Object(h) => Some(h),
            _ => {
                return Err(interp.throw_error(
                    ErrorKind::Type,
                    "Object prototype may only be an Object or null",
                ));
            }
        };
        Ok(Value::Object(interp.create_object_proto(proto)))
    });

    interp.set_method(ctor_handle, "defineProperty", 3, |interp, _this, args| {
        let handle = expect_object(interp, &arg(args, 0))?;
        let name_value = arg(args, 1);
        let name = interp.to_property_key(&name_value);
        let desc = descriptor_from_guest(interp, &arg(args, 2))?;
        match interp.define_property_checked(handle, &name, desc) {
            Ok(()) => Ok(arg(args, 0)),
            Err(msg) => Err(interp.throw_error(ErrorKind::Type, msg)),
        }
    });

    interp.set_method(
        ctor_handle,
        "getOwnPropertyDescriptor",
        2,
        |interp, _this, args| {
            let handle = expect_object(interp, &arg(args, 0))?;
            let name_value = arg(args, 1);
            let name = interp.to_property_key(&name_value);
            let desc = interp
                .get_object_data(handle)
                .and_then(|od| od.borrow().own_descriptor(&name));
            match desc {
                None => Ok(Value::Undefined),
                Some(desc) => Ok(descriptor_to_guest(interp, &desc)),
            }
        },
    );

    interp.set_method(
        ctor_handle,
        "getOwnPropertyNames",
        1,
        |interp, _this, args| {
            let handle = expect_object(interp, &arg(args, 0))?;
            let keys = interp.object(handle).borrow().own_keys();
            Ok(create_string_array(interp, keys))
        },
    );

    interp.set_method(ctor_handle, "keys", 1, |interp, _this, args| {
        let handle = expect_object(interp, &arg(args, 0))?;
        let keys = interp.object(handle).borrow().enumerable_own_keys();
        Ok(create_string_array(interp, keys))
    });

    interp.set_method(ctor_handle, "preventExtensions", 1, |interp, _this, args| {
        if let Value::Object(handle) = arg(args, 0) {
            interp.object(handle).borrow_mut().prevent_extensions = true;
        }
        Ok(arg(args, 0))
    });

    interp.set_method(ctor_handle, "isExtensible", 1, |interp, _this, args| {
        match arg(args, 0) {
            Value::Object(handle) => Ok(Value::Boolean(
                !interp.object(handle).borrow().prevent_extensions,
            )),
            _ => Ok(Value::Boolean(false)),
        }
    });

    interp.set_method(ctor_handle, "seal", 1, |interp, _this, args| {
        if let Value::Object(handle) = arg(args, 0) {
            let obj = interp.object(handle);
            let mut od = obj.borrow_mut();
            od.prevent_extensions = true;
            let keys = od.own_keys();
            for key in keys {
                od.not_configurable.insert(key);
            }
        }
        Ok(arg(args, 0))
    });

    interp.set_method(ctor_handle, "isSealed", 1, |interp, _this, args| {
        match arg(args, 0) {
            Value::Object(handle) => {
                let obj = interp.object(handle);
                let od = obj.borrow();
                let sealed = od.prevent_extensions
                    && od
                        .own_keys()
                        .iter()
                        .all(|k| od.not_configurable.contains(k));
                Ok(Value::Boolean(sealed))
            }
            _ => Ok(Value::Boolean(true)),
        }
    });

    interp.set_method(ctor_handle, "freeze", 1, |interp, _this, args| {
        if let Value::Object(handle) = arg(args, 0) {
            let obj = interp.object(handle);
            let mut od = obj.borrow_mut();
            od.prevent_extensions = true;
            let keys = od.own_keys();
            for key in keys {
                od.not_configurable.insert(key.clone());
                if !od.is_accessor(&key) {
                    od.not_writable.insert(key);
                }
            }
        }
        Ok(arg(args, 0))
    });

    interp.set_method(ctor_handle, "isFrozen", 1, |interp, _this, args| {
        match arg(args, 0) {
            Value::Object(handle) => {
                let obj = interp.object(handle);
                let od = obj.borrow();
                let frozen = od.prevent_extensions
                    && od.own_keys().iter().all(|k| {
                        od.not_configurable.contains(k)
                            && (od.is_accessor(k) || od.not_writable.contains(k))
                    });
                Ok(Value::Boolean(frozen))
            }
            _ => Ok(Value::Boolean(true)),
        }
    });

    // Object.prototype -------------------------------------------------------

    interp.set_method(object_proto, "toString", 0, |interp, this, _args| {
        let tag = match this {
            Value::Undefined => "Undefined".to_string(),
            Value::Null => "Null".to_string(),
            Value::Boolean(_) => "Boolean".to_string(),
            Value::Number(_) => "Number".to_string(),
            Value::String(_) => "String".to_string(),
            Value::Object(handle) => interp.object(*handle).borrow().class.to_string(),
        };
        Ok(Value::string(&format!("[object {tag}]")))
    });

    interp.set_method(object_proto, "toLocaleString", 0, |interp, this, _args| {
        Ok(Value::string(&interp.to_string_value(this)))
    });

    interp.set_method(object_proto, "valueOf", 0, |interp, this, _args| {
        if let Value::Object(handle) = this {
            let boxed = match &interp.object(*handle).borrow().data {
                Some(InternalData::Boxed(primitive)) => Some(primitive.clone()),
                _ => None,
            };
            if let Some(primitive) = boxed {
                return Ok(primitive);
            }
        }
        Ok(this.clone())
    });

    interp.set_method(object_proto, "hasOwnProperty", 1, |interp, this, args| {
        let name_value = arg(args, 0);
        let name = interp.to_property_key(&name_value);
        match this {
            Value::Object(handle) => {
                Ok(Value::Boolean(interp.object(*handle).borrow().has_own(&name)))
            }
            Value::String(s) => {
                let hit = name == "length"
                    || crate::interpreter::helpers::legal_array_index(&name)
                        .is_some_and(|i| (i as usize) < s.len());
                Ok(Value::Boolean(hit))
            }
            _ => Ok(Value::Boolean(false)),
        }
    });

    interp.set_method(
        object_proto,
        "propertyIsEnumerable",
        1,
        |interp, this, args| {
            let name_value = arg(args, 0);
            let name = interp.to_property_key(&name_value);
            match this {
                Value::Object(handle) => {
                    let obj = interp.object(*handle);
                    let od = obj.borrow();
                    Ok(Value::Boolean(
                        od.has_own(&name) && !od.not_enumerable.contains(&name),
                    ))
                }
                _ => Ok(Value::Boolean(false)),
            }
        },
    );

    // The chain walk is capped so a corrupted chain terminates instead of
    // hanging.
    interp.set_method(object_proto, "isPrototypeOf", 1, |interp, this, args| {
        let Value::Object(target) = this else {
            return Ok(Value::Boolean(false));
        };
        let Value::Object(mut cursor) = arg(args, 0) else {
            return Ok(Value::Boolean(false));
        };
        let cap = interp.object_count();
        let mut hops = 0usize;
        loop {
            let parent = interp.object(cursor).borrow().proto;
            match parent {
                None => return Ok(Value::Boolean(false)),
                Some(parent) => {
                    if parent == *target {
                        return Ok(Value::Boolean(true));
                    }
                    cursor = parent;
                }
            }
            hops += 1;
            if hops > cap {
                return Ok(Value::Boolean(false));
            }
        }
    });
}

pub(crate) fn expect_object(
    interp: &mut Interpreter,
    value: &Value,
) -> Result<ObjectHandle, StepError> {
    match value {
        Value::Object(handle) => Ok(*handle),
        other => {
            let rendered = interp.to_string_value(&other.clone());
            Err(interp.throw_error(
                ErrorKind::Type,
                format!("{rendered} is not an object"),
            ))
        }
    }
}

pub(crate) fn create_string_array(interp: &mut Interpreter, keys: Vec<String>) -> Value {
    let handle = interp.create_array();
    let array = Value::Object(handle);
    for (index, key) in keys.into_iter().enumerate() {
        let _ = interp.set_property_runtime(
            &array,
            &index.to_string(),
            Value::string(&key),
            false,
        );
    }
    array
}

/// Convert a guest descriptor object into the engine descriptor, enforcing
/// the accessor/data exclusivity rule.
pub(crate) fn descriptor_from_guest(
    interp: &mut Interpreter,
    value: &Value,
) -> Result<Descriptor, StepError> {
    let Value::Object(_) = value else {
        return Err(
            interp.throw_error(ErrorKind::Type, "Property description must be an object")
        );
    };
    let mut desc = Descriptor::default();
    if interp.has_property_value(value, "value") {
        desc.value = Some(interp.get_property(value, "value")?);
    }
    if interp.has_property_value(value, "writable") {
        let flag = interp.get_property(value, "writable")?;
        desc.writable = Some(interp.truthy(&flag));
    }
    if interp.has_property_value(value, "enumerable") {
        let flag = interp.get_property(value, "enumerable")?;
        desc.enumerable = Some(interp.truthy(&flag));
    }
    if interp.has_property_value(value, "configurable") {
        let flag = interp.get_property(value, "configurable")?;
        desc.configurable = Some(interp.truthy(&flag));
    }
    if interp.has_property_value(value, "get") {
        let getter = interp.get_property(value, "get")?;
        if !getter.is_undefined() && !interp.is_callable(&getter) {
            return Err(interp.throw_error(ErrorKind::Type, "Getter must be a function"));
        }
        desc.get = Some(getter);
    }
    if interp.has_property_value(value, "set") {
        let setter = interp.get_property(value, "set")?;
        if !setter.is_undefined() && !interp.is_callable(&setter) {
            return Err(interp.throw_error(ErrorKind::Type, "Setter must be a function"));
        }
        desc.set = Some(setter);
    }
    if desc.is_data() && desc.is_accessor() {
        return Err(interp.throw_error(
            ErrorKind::Type,
            "Invalid property descriptor. Cannot both specify accessors and a value or \
             writable attribute",
        ));
    }
    Ok(desc)
}

pub(crate) fn descriptor_to_guest(interp: &mut Interpreter, desc: &Descriptor) -> Value {
    let handle = interp.create_object();
    let result = Value::Object(handle);
    if desc.is_accessor() {
        interp.set_property(
            &result,
            "get",
            desc.get.clone().unwrap_or(Value::Undefined),
        );
        interp.set_property(
            &result,
            "set",
            desc.set.clone().unwrap_or(Value::Undefined),
        );
    } else {
        interp.set_property(
            &result,
            "value",
            desc.value.clone().unwrap_or(Value::Undefined),
        );
        interp.set_property(
            &result,
            "writable",
            Value::Boolean(desc.writable.unwrap_or(false)),
        );
    }
    interp.set_property(
        &result,
        "enumerable",
        Value::Boolean(desc.enumerable.unwrap_or(false)),
    );
    interp.set_property(
        &result,
        "configurable",
        Value::Boolean(desc.configurable.unwrap_or(false)),
    );
    result
}
