use super::super::{Descriptor, ErrorKind, Interpreter};
use super::arg;
use crate::ast::NodeKind;
use crate::interpreter::helpers;
use crate::interpreter::types::{FunctionData, FunctionKind};
use crate::types::Value;

pub(crate) fn init(interp: &mut Interpreter) {
    let function_proto = interp.function_proto;

    // `new Function(p1, …, pn, body)` compiles in the global scope.
    let ctor = interp.create_native_function(1, true, |interp, _this, args| {
        let mut params = Vec::new();
        for value in args.iter().take(args.len().saturating_sub(1)) {
            params.push(interp.to_string_value(value));
        }
        let body = match args.last() {
            Some(value) => interp.to_string_value(value),
            None => String::new(),
        };
        let source = format!("(function({}) {{\n{}\n}})", params.join(","), body);
        let parsed = crate::parser::Parser::with_options(
            &source,
            interp.parse_config.to_options(),
        )
        .and_then(|mut p| p.parse_program());
        let program = match parsed {
            Ok(program) => program,
            Err(e) => return Err(interp.throw_error(ErrorKind::Syntax, e.message)),
        };
        let func_node = match &program.kind {
            NodeKind::Program { body } => body.borrow().first().and_then(|stmt| {
                match &stmt.kind {
                    NodeKind::ExpressionStatement { expression } => Some(expression.clone()),
                    _ => None,
                }
            }),
            _ => None,
        };
        let Some(func_node) = func_node else {
            return Err(interp.throw_error(ErrorKind::Syntax, "Invalid function body"));
        };
        let scope = interp.global_scope.clone();
        Ok(interp.create_guest_function(func_node, scope))
    });
    interp.link_constructor(&ctor, function_proto);
    interp.register_global("Function", ctor);

    interp.set_method(function_proto, "toString", 0, |interp, this, _args| {
        if !interp.is_callable(this) {
            return Err(interp.throw_error(
                ErrorKind::Type,
                "Function.prototype.toString requires a function receiver",
            ));
        }
        Ok(Value::string(&interp.to_string_value(this)))
    });

    // call and apply retarget the live CallExpression frame: the step
    // engine then re-executes it against the real callee.
    interp.set_method(function_proto, "call", 1, |interp, this, args| {
        require_function(interp, this)?;
        let this_arg = arg(args, 0);
        let rest = args.iter().skip(1).cloned().collect();
        rewrite_call_frame(interp, this.clone(), this_arg, rest);
        Ok(Value::Undefined)
    });

    interp.set_method(function_proto, "apply", 2, |interp, this, args| {
        require_function(interp, this)?;
        let this_arg = arg(args, 0);
        let list = match arg(args, 1) {
            Value::Undefined | Value::Null => Vec::new(),
            Value::Object(handle) => {
                let length = match interp.plain_chain_value(handle, "length") {
                    Some(Value::Number(n)) => helpers::to_uint32(n),
                    _ => {
                        return Err(interp.throw_error(
                            ErrorKind::Type,
                            "CreateListFromArrayLike called on non-array-like",
                        ));
                    }
                };
                (0..length)
                    .map(|i| {
                        interp
                            .plain_chain_value(handle, &i.to_string())
                            .unwrap_or(Value::Undefined)
                    })
                    .collect()
            }
            _ => {
                return Err(interp.throw_error(
                    ErrorKind::Type,
                    "CreateListFromArrayLike called on non-object",
                ));
            }
        };
        rewrite_call_frame(interp, this.clone(), this_arg, list);
        Ok(Value::Undefined)
    });

    interp.set_method(function_proto, "bind", 1, |interp, this, args| {
        let Value::Object(target) = this else {
            return Err(interp.throw_error(
                ErrorKind::Type,
                "Bind must be called on a function",
            ));
        };
        let target = *target;
        if !interp.object(target).borrow().is_function() {
            return Err(interp.throw_error(
                ErrorKind::Type,
                "Bind must be called on a function",
            ));
        }
        let bound_this = arg(args, 0);
        let bound_args: Vec<Value> = args.iter().skip(1).cloned().collect();

        let target_length = match interp.plain_chain_value(target, "length") {
            Some(Value::Number(n)) => n,
            _ => 0.0,
        };
        let remaining = (target_length - bound_args.len() as f64).max(0.0);

        let id = interp.next_function_id();
        let function_proto = interp.function_proto;
        let handle = interp.create_object_proto(Some(function_proto));
        {
            let obj = interp.object(handle);
            let mut od = obj.borrow_mut();
            od.class = "Function";
            od.func = Some(FunctionData {
                id,
                kind: FunctionKind::Bound { target },
                bound_this: Some(bound_this),
                bound_args,
                illegal_constructor: false,
                is_eval: false,
            });
        }
        interp.define_own(handle, "length", Descriptor::frozen(Value::Number(remaining)));
        Ok(Value::Object(handle))
    });
}

fn require_function(
    interp: &mut Interpreter,
    value: &Value,
) -> Result<(), crate::interpreter::StepError> {
    if interp.is_callable(value) {
        Ok(())
    } else {
        let rendered = interp.to_string_value(&value.clone());
        Err(interp.throw_error(ErrorKind::Type, format!("{rendered} is not a function")))
    }
}

fn rewrite_call_frame(
    interp: &mut Interpreter,
    func: Value,
    this_value: Value,
    arguments: Vec<Value>,
) {
    let st = interp.top_mut();
    st.func = Some(func);
    st.func_this = this_value;
    st.arguments = arguments;
    st.done_exec = false;
}
