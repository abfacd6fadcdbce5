use super::super::{Descriptor, ErrorKind, Interpreter};
use super::arg;
use crate::interpreter::helpers;
use crate::interpreter::types::{InternalData, StepError};
use crate::types::Value;

pub(crate) fn init(interp: &mut Interpreter) {
    init_boolean(interp);
    init_number(interp);
}

fn init_boolean(interp: &mut Interpreter) {
    let boolean_proto = interp.create_object_proto(Some(interp.object_proto));
    {
        let obj = interp.object(boolean_proto);
        let mut od = obj.borrow_mut();
        od.class = "Boolean";
        od.data = Some(InternalData::Boxed(Value::Boolean(false)));
    }
    interp.boolean_proto = boolean_proto;

    let ctor = interp.create_native_function(1, true, |interp, this, args| {
        let flag = Value::Boolean(interp.truthy(&arg(args, 0)));
        if interp.called_with_new() {
            if let Value::Object(handle) = this {
                let obj = interp.object(*handle);
                let mut od = obj.borrow_mut();
                od.class = "Boolean";
                od.data = Some(InternalData::Boxed(flag.clone()));
                return Ok(Value::Object(*handle));
            }
        }
        Ok(flag)
    });
    interp.link_constructor(&ctor, boolean_proto);
    interp.register_global("Boolean", ctor);

    interp.set_method(boolean_proto, "toString", 0, |interp, this, _args| {
        let b = this_boolean(interp, this)?;
        Ok(Value::string(if b { "true" } else { "false" }))
    });
    interp.set_method(boolean_proto, "valueOf", 0, |interp, this, _args| {
        this_boolean(interp, this).map(Value::Boolean)
    });
}

fn init_number(interp: &mut Interpreter) {
    let number_proto = interp.create_object_proto(Some(interp.object_proto));
    {
        let obj = interp.object(number_proto);
        let mut od = obj.borrow_mut();
        od.class = "Number";
        od.data = Some(InternalData::Boxed(Value::Number(0.0)));
    }
    interp.number_proto = number_proto;

    let ctor = interp.create_native_function(1, true, |interp, this, args| {
        let n = if args.is_empty() {
            Value::Number(0.0)
        } else {
            Value::Number(interp.to_number_value(&arg(args, 0)))
        };
        if interp.called_with_new() {
            if let Value::Object(handle) = this {
                let obj = interp.object(*handle);
                let mut od = obj.borrow_mut();
                od.class = "Number";
                od.data = Some(InternalData::Boxed(n.clone()));
                return Ok(Value::Object(*handle));
            }
        }
        Ok(n)
    });
    interp.link_constructor(&ctor, number_proto);
    interp.register_global("Number", ctor.clone());

    if let Value::Object(ctor_handle) = ctor {
        let statics: &[(&str, f64)] = &[
            ("MAX_VALUE", f64::MAX),
            ("MIN_VALUE", 5e-324),
            ("NaN", f64::NAN),
            ("NEGATIVE_INFINITY", f64::NEG_INFINITY),
            ("POSITIVE_INFINITY", f64::INFINITY),
        ];
        for (name, value) in statics {
            interp.define_own(ctor_handle, name, Descriptor::frozen(Value::Number(*value)));
        }
    }

    interp.set_method(number_proto, "toString", 1, |interp, this, args| {
        let n = this_number(interp, this)?;
        match arg(args, 0) {
            Value::Undefined => Ok(Value::string(&helpers::number_to_string(n))),
            radix_value => {
                let radix = interp.to_number_value(&radix_value) as i32;
                if !(2..=36).contains(&radix) {
                    return Err(interp.throw_error(
                        ErrorKind::Range,
                        "toString() radix must be between 2 and 36",
                    ));
                }
                if radix == 10 {
                    return Ok(Value::string(&helpers::number_to_string(n)));
                }
                Ok(Value::string(&format_radix(n, radix as u32)))
            }
        }
    });

    interp.set_method(number_proto, "toLocaleString", 0, |interp, this, _args| {
        let n = this_number(interp, this)?;
        Ok(Value::string(&helpers::number_to_string(n)))
    });

    interp.set_method(number_proto, "valueOf", 0, |interp, this, _args| {
        this_number(interp, this).map(Value::Number)
    });

    interp.set_method(number_proto, "toFixed", 1, |interp, this, args| {
        let n = this_number(interp, this)?;
        let digits = helpers::to_integer(interp.to_number_value(&arg(args, 0)));
        if !(0.0..=20.0).contains(&digits) {
            return Err(interp.throw_error(
                ErrorKind::Range,
                "toFixed() digits argument must be between 0 and 20",
            ));
        }
        if n.is_nan() {
            return Ok(Value::string("NaN"));
        }
        if n.abs() >= 1e21 {
            return Ok(Value::string(&helpers::number_to_string(n)));
        }
        Ok(Value::string(&format!("{n:.prec$}", prec = digits as usize)))
    });

    interp.set_method(number_proto, "toExponential", 1, |interp, this, args| {
        let n = this_number(interp, this)?;
        if n.is_nan() || n.is_infinite() {
            return Ok(Value::string(&helpers::number_to_string(n)));
        }
        let rendered = match arg(args, 0) {
            Value::Undefined => format!("{n:e}"),
            digits_value => {
                let digits = helpers::to_integer(interp.to_number_value(&digits_value));
                if !(0.0..=20.0).contains(&digits) {
                    return Err(interp.throw_error(
                        ErrorKind::Range,
                        "toExponential() argument must be between 0 and 20",
                    ));
                }
                format!("{n:.prec$e}", prec = digits as usize)
            }
        };
        Ok(Value::string(&exponent_with_sign(&rendered)))
    });

    interp.set_method(number_proto, "toPrecision", 1, |interp, this, args| {
        let n = this_number(interp, this)?;
        let precision_value = arg(args, 0);
        if precision_value.is_undefined() {
            return Ok(Value::string(&helpers::number_to_string(n)));
        }
        let precision = helpers::to_integer(interp.to_number_value(&precision_value));
        if !(1.0..=21.0).contains(&precision) {
            return Err(interp.throw_error(
                ErrorKind::Range,
                "toPrecision() argument must be between 1 and 21",
            ));
        }
        if n.is_nan() || n.is_infinite() {
            return Ok(Value::string(&helpers::number_to_string(n)));
        }
        let precision = precision as usize;
        if n == 0.0 {
            return Ok(Value::string(&format!("{:.*}", precision - 1, 0.0)));
        }
        let exponent = n.abs().log10().floor() as i32;
        if exponent < -6 || exponent >= precision as i32 {
            let rendered = format!("{n:.prec$e}", prec = precision - 1);
            return Ok(Value::string(&exponent_with_sign(&rendered)));
        }
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        Ok(Value::string(&format!("{n:.prec$}", prec = decimals)))
    });
}

fn this_boolean(interp: &mut Interpreter, this: &Value) -> Result<bool, StepError> {
    match this {
        Value::Boolean(b) => Ok(*b),
        Value::Object(handle) => {
            let boxed = match &interp.object(*handle).borrow().data {
                Some(InternalData::Boxed(Value::Boolean(b))) => Some(*b),
                _ => None,
            };
            match boxed {
                Some(b) => Ok(b),
                None => Err(interp.throw_error(
                    ErrorKind::Type,
                    "Boolean.prototype method called on incompatible receiver",
                )),
            }
        }
        _ => Err(interp.throw_error(
            ErrorKind::Type,
            "Boolean.prototype method called on incompatible receiver",
        )),
    }
}

fn this_number(interp: &mut Interpreter, this: &Value) -> Result<f64, StepError> {
    match this {
        Value::Number(n) => Ok(*n),
        Value::Object(handle) => {
            let boxed = match &interp.object(*handle).borrow().data {
                Some(InternalData::Boxed(Value::Number(n))) => Some(*n),
                _ => None,
            };
            match boxed {
                Some(n) => Ok(n),
                None => Err(interp.throw_error(
                    ErrorKind::Type,
                    "Number.prototype method called on incompatible receiver",
                )),
            }
        }
        _ => Err(interp.throw_error(
            ErrorKind::Type,
            "Number.prototype method called on incompatible receiver",
        )),
    }
}

// Digits for radix 2–36; the fractional part is emitted to a fixed depth.
fn format_radix(n: f64, radix: u32) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let negative = n < 0.0;
    let mut int_part = n.abs().trunc();
    let mut frac_part = n.abs().fract();

    let mut digits = Vec::new();
    if int_part == 0.0 {
        digits.push('0');
    }
    while int_part >= 1.0 {
        let digit = (int_part % radix as f64) as u32;
        digits.push(char::from_digit(digit, radix).unwrap_or('0'));
        int_part = (int_part / radix as f64).trunc();
    }
    if negative {
        digits.push('-');
    }
    let mut out: String = digits.iter().rev().collect();

    if frac_part > 0.0 {
        out.push('.');
        for _ in 0..20 {
            frac_part *= radix as f64;
            let digit = frac_part.trunc() as u32;
            out.push(char::from_digit(digit, radix).unwrap_or('0'));
            frac_part -= frac_part.trunc();
            if frac_part == 0.0 {
                break;
            }
        }
    }
    out
}

// Rust renders `1.5e2`; JS wants `1.5e+2`.
fn exponent_with_sign(rendered: &str) -> String {
    match rendered.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
        _ => rendered.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radix_formatting() {
        assert_eq!(format_radix(255.0, 16), "ff");
        assert_eq!(format_radix(-8.0, 2), "-1000");
        assert_eq!(format_radix(0.5, 2), "0.1");
        assert_eq!(format_radix(0.0, 8), "0");
    }

    #[test]
    fn exponent_sign() {
        assert_eq!(exponent_with_sign("1.5e2"), "1.5e+2");
        assert_eq!(exponent_with_sign("1.5e-7"), "1.5e-7");
    }
}
