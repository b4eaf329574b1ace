//! Rules for contexts that require a type: index keys, call arguments, callbacks and typed
//! properties. Each rule returns one mismatch per offending member type.

use crate::ast::{Expression, ExpressionKind, Literal};
use crate::core::type_compat::TypeCompatibility;
use crate::core::type_environment::TypeEnvironment;
use crate::diagnostics::{CallbackSlot, MismatchContext, MismatchKind, TypeMismatch};
use crate::helpers::type_utilities::is_int_like;
use crate::stdlib::FunctionSignature;
use crate::types::template::SlotBindings;
use crate::types::{CallableType, Type};
use crate::utils::type_formatter::format_expression;

/// A resolved call: the target's signature plus what each argument evaluated to.
pub struct CallSite<'s> {
    /// Name used in messages (`g`, `Foo::bar`)
    pub function: &'s str,
    pub signature: &'s FunctionSignature,
    pub args: &'s [Expression],
    pub arg_types: &'s [Type],
    /// Signature of each argument that could be resolved to a callable
    pub callables: &'s [Option<CallableType>],
}

impl<'s> CallSite<'s> {
    pub fn callable_returns(&self) -> Vec<Option<Type>> {
        self.callables
            .iter()
            .map(|c| c.as_ref().map(|c| (*c.returns).clone()))
            .collect()
    }
}

pub fn check_call(site: &CallSite<'_>, env: &TypeEnvironment) -> Vec<TypeMismatch> {
    let callable_returns = site.callable_returns();
    let bindings = SlotBindings::new(site.arg_types, &callable_returns);
    let mut mismatches = Vec::new();

    for (index, (arg, arg_type)) in site.args.iter().zip(site.arg_types).enumerate() {
        let Some(param) = site.signature.param_for(index) else {
            continue;
        };
        let required = param.template.instantiate(&bindings);

        if param.template.is_callable() {
            if let Some(provided) = site.callables.get(index).and_then(Option::as_ref) {
                if let Type::Callable(required) = &required {
                    mismatches.extend(check_callback(site.function, arg, required, provided, env));
                }
                continue;
            }
            // A string or mixed value may still name a callable at runtime
            if arg_type
                .members()
                .iter()
                .any(|m| matches!(m, Type::String | Type::Mixed))
            {
                continue;
            }
        }

        mismatches.extend(check_argument(
            site.function,
            &param.name,
            arg,
            arg_type,
            &required,
            env,
        ));
    }
    mismatches
}

/// Argument rule: a possibly-null argument is reported once as nullable, every other offending
/// member on its own. `mixed` on either side is not checked.
pub fn check_argument(
    function: &str,
    param: &str,
    arg: &Expression,
    arg_type: &Type,
    required: &Type,
    env: &TypeEnvironment,
) -> Vec<TypeMismatch> {
    if arg_type.is_mixed() || required.is_mixed() {
        return Vec::new();
    }
    let expression = format_expression(arg);
    let context = MismatchContext::Argument {
        function: function.to_string(),
        param: param.to_string(),
        passed: arg_type.clone(),
    };
    let mut mismatches = Vec::new();

    if arg_type.contains_null() && !TypeCompatibility::is_subtype(&Type::Null, required, env) {
        mismatches.push(TypeMismatch {
            kind: MismatchKind::NullableArgument,
            span: arg.span,
            expression: expression.clone(),
            required: required.clone(),
            actual: vec![Type::Null],
            context: context.clone(),
        });
    }
    for member in arg_type.members() {
        if matches!(member, Type::Null) || TypeCompatibility::is_subtype(member, required, env) {
            continue;
        }
        mismatches.push(TypeMismatch {
            kind: MismatchKind::ArgumentType,
            span: arg.span,
            expression: expression.clone(),
            required: required.clone(),
            actual: vec![member.clone()],
            context: context.clone(),
        });
    }
    mismatches
}

/// The callback must accept every parameter the consumer passes and return what it expects.
/// Slots the consumer leaves `mixed` are not compared.
pub fn check_callback(
    function: &str,
    arg: &Expression,
    required: &CallableType,
    provided: &CallableType,
    env: &TypeEnvironment,
) -> Vec<TypeMismatch> {
    let expression = format_expression(arg);
    let mismatch = |slot: CallbackSlot, required: &Type, actual: &Type| TypeMismatch {
        kind: MismatchKind::CallbackSignature,
        span: arg.span,
        expression: expression.clone(),
        required: required.clone(),
        actual: vec![actual.clone()],
        context: MismatchContext::Callback {
            function: function.to_string(),
            slot,
        },
    };
    let mut mismatches = Vec::new();

    if let (Some(required_params), Some(accepted_params)) = (&required.params, &provided.params) {
        for (index, (passed, accepted)) in required_params.iter().zip(accepted_params).enumerate() {
            if passed.is_mixed() {
                continue;
            }
            if !TypeCompatibility::is_subtype(passed, accepted, env) {
                mismatches.push(mismatch(CallbackSlot::Param(index), passed, accepted));
            }
        }
    }
    if !required.returns.is_mixed()
        && !TypeCompatibility::is_subtype(&provided.returns, &required.returns, env)
    {
        mismatches.push(mismatch(CallbackSlot::Return, &required.returns, &provided.returns));
    }
    mismatches
}

/// Index-key rule.
///
/// A string receiver takes `int` keys, or a string literal the runtime reads as an integer;
/// anything else that can be indexed takes `int|string`. Receivers that are neither arrays,
/// strings nor `mixed` are not checked here.
pub fn check_index_key(
    receiver: &Type,
    key: &Type,
    key_expr: &Expression,
    site: &Expression,
) -> Vec<TypeMismatch> {
    let receiver_members = receiver.members();
    let indexable = receiver_members
        .iter()
        .any(|m| matches!(m, Type::Array(_) | Type::String | Type::Mixed));
    if !indexable {
        return Vec::new();
    }
    let string_receiver = receiver_members.contains(&Type::String)
        && !receiver_members
            .iter()
            .any(|m| matches!(m, Type::Array(_) | Type::Mixed));

    let numeric_literal = matches!(
        &key_expr.kind,
        ExpressionKind::Literal(Literal::String(s)) if is_int_like(s)
    );
    let required = if string_receiver {
        Type::Int
    } else {
        Type::union([Type::Int, Type::String])
    };

    key.members()
        .iter()
        .filter(|member| match member {
            Type::Int | Type::Never => false,
            Type::String => string_receiver && !numeric_literal,
            _ => true,
        })
        .map(|member| TypeMismatch {
            kind: MismatchKind::IndexKey,
            span: key_expr.span,
            expression: format_expression(site),
            required: required.clone(),
            actual: vec![member.clone()],
            context: MismatchContext::Index { string_receiver },
        })
        .collect()
}

/// Assigning to a typed property: the value must fit every declaration the receiver may hit.
pub fn check_property_assignment(
    env: &TypeEnvironment,
    object: &Type,
    target: &Expression,
    name: &str,
    value: &Type,
) -> Vec<TypeMismatch> {
    let mut mismatches: Vec<TypeMismatch> = Vec::new();
    for member in object.members() {
        let Type::Instance(class) = member else {
            continue;
        };
        let Some(property) = env.property(class, name) else {
            continue;
        };
        if property.ty.is_mixed() || TypeCompatibility::is_subtype(value, &property.ty, env) {
            continue;
        }
        let owner = env
            .classes()
            .find(|info| info.properties.get(name) == Some(property))
            .map(|info| info.id.to_string());
        let mismatch = TypeMismatch {
            kind: MismatchKind::AssignmentType,
            span: target.span,
            expression: format_expression(target),
            required: property.ty.clone(),
            actual: vec![value.clone()],
            context: MismatchContext::Assignment {
                property: name.to_string(),
                class: owner,
                declared_at: Some(property.span),
            },
        };
        if !mismatches.contains(&mismatch) {
            mismatches.push(mismatch);
        }
    }
    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::*;
    use crate::ast::Program;
    use crate::stdlib::builtins;

    fn env() -> TypeEnvironment {
        TypeEnvironment::from_program(&Program {
            classes: vec![
                class("Foo")
                    .property("x", Some(Type::nullable(Type::instance("Bar"))))
                    .property("n", Some(Type::Int))
                    .build(),
                class("Bar").build(),
            ],
            ..Default::default()
        })
    }

    fn kinds(mismatches: &[TypeMismatch]) -> Vec<MismatchKind> {
        mismatches.iter().map(|m| m.kind).collect()
    }

    #[test]
    fn test_string_receiver_keys() {
        let receiver = Type::String;
        let site = index(var("str"), var("k"));
        let key = var("k");
        assert!(check_index_key(&receiver, &Type::Int, &key, &site).is_empty());
        for bad in [
            Type::Bool,
            Type::array(Type::Int),
            Type::instance("Foo"),
            Type::String,
            Type::Mixed,
        ] {
            let found = check_index_key(&receiver, &bad, &key, &site);
            assert_eq!(found.len(), 1, "{} should be rejected", bad);
            assert_eq!(found[0].actual, vec![bad.clone()]);
            assert_eq!(found[0].required, Type::Int);
        }
    }

    #[test]
    fn test_numeric_string_literal_key() {
        let numeric = string("1");
        let site = index(var("str"), numeric.clone());
        assert!(check_index_key(&Type::String, &Type::String, &numeric, &site).is_empty());
        let padded = string("01");
        assert_eq!(
            check_index_key(&Type::String, &Type::String, &padded, &site).len(),
            1
        );
    }

    #[test]
    fn test_each_offending_member_reported() {
        let key = Type::union([Type::Int, Type::Bool, Type::Null]);
        let site = index(var("xs"), var("k"));
        let found = check_index_key(&Type::array(Type::Int), &key, &var("k"), &site);
        let actual: Vec<Type> = found.iter().flat_map(|m| m.actual.clone()).collect();
        assert_eq!(actual, vec![Type::Bool, Type::Null]);
        assert!(check_index_key(&Type::instance("Foo"), &Type::Bool, &var("k"), &site).is_empty());
    }

    #[test]
    fn test_nullable_argument() {
        let env = env();
        let arg = prop(var("b"), "x");
        let found = check_argument(
            "g",
            "bar",
            &arg,
            &Type::nullable(Type::instance("Bar")),
            &Type::instance("Bar"),
            &env,
        );
        assert_eq!(kinds(&found), vec![MismatchKind::NullableArgument]);
        assert_eq!(found[0].expression, "$b->x");
    }

    #[test]
    fn test_argument_type_per_member() {
        let env = env();
        let found = check_argument(
            "f",
            "n",
            &var("v"),
            &Type::union([Type::Int, Type::False, Type::Null]),
            &Type::Int,
            &env,
        );
        assert_eq!(
            kinds(&found),
            vec![MismatchKind::NullableArgument, MismatchKind::ArgumentType]
        );
        assert_eq!(found[1].actual, vec![Type::False]);
        assert!(check_argument("f", "n", &var("v"), &Type::Mixed, &Type::Int, &env).is_empty());
    }

    #[test]
    fn test_callback_checks() {
        let env = env();
        let required = CallableType::new(vec![Type::Int, Type::Int], Type::Int);
        let good = CallableType::new(vec![Type::Int, Type::Mixed], Type::Int);
        assert!(check_callback("usort", &var("cb"), &required, &good, &env).is_empty());

        let bad = CallableType::new(vec![Type::String, Type::Int], Type::String);
        let found = check_callback("usort", &var("cb"), &required, &bad, &env);
        assert_eq!(found.len(), 2);
        assert_eq!(
            found[0].context,
            MismatchContext::Callback {
                function: "usort".to_string(),
                slot: CallbackSlot::Param(0)
            }
        );
        assert_eq!(found[1].actual, vec![Type::String]);
    }

    #[test]
    fn test_check_call_binds_slots() {
        let env = env();
        let table = builtins().unwrap();
        let usort = table.get("usort").unwrap();
        let args = vec![var("xs"), var("cb")];
        let arg_types = vec![
            Type::array(Type::Int),
            Type::callable(vec![Type::String, Type::String], Type::Int),
        ];
        let callables = vec![
            None,
            Some(CallableType::new(vec![Type::String, Type::String], Type::Int)),
        ];
        let site = CallSite {
            function: "usort",
            signature: usort,
            args: &args,
            arg_types: &arg_types,
            callables: &callables,
        };
        let found = check_call(&site, &env);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|m| m.kind == MismatchKind::CallbackSignature));
        assert!(found.iter().all(|m| m.required == Type::Int));
    }

    #[test]
    fn test_unresolved_string_callback_skipped() {
        let env = env();
        let table = builtins().unwrap();
        let map = table.get("array_map").unwrap();
        let args = vec![var("name"), var("xs")];
        let arg_types = vec![Type::String, Type::array(Type::Int)];
        let callables = vec![None, None];
        let site = CallSite {
            function: "array_map",
            signature: map,
            args: &args,
            arg_types: &arg_types,
            callables: &callables,
        };
        assert!(check_call(&site, &env).is_empty());

        let arg_types = vec![Type::Int, Type::array(Type::Int)];
        let site = CallSite {
            arg_types: &arg_types,
            ..site
        };
        assert_eq!(kinds(&check_call(&site, &env)), vec![MismatchKind::ArgumentType]);
    }

    #[test]
    fn test_property_assignment() {
        let env = env();
        let target = prop(var("a"), "n");
        let found =
            check_property_assignment(&env, &Type::instance("Foo"), &target, "n", &Type::nullable(Type::Int));
        assert_eq!(kinds(&found), vec![MismatchKind::AssignmentType]);
        assert!(matches!(
            &found[0].context,
            MismatchContext::Assignment { class: Some(c), .. } if c == "Foo"
        ));
        assert!(
            check_property_assignment(&env, &Type::instance("Foo"), &target, "n", &Type::Int).is_empty()
        );
        let x = prop(var("a"), "x");
        assert!(check_property_assignment(&env, &Type::instance("Foo"), &x, "x", &Type::Null).is_empty());
    }
}
