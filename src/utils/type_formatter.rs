//! User-friendly type and expression formatting for error messages
//!
//! Types render the way PHP declarations spell them (`?Foo`, `int[]`, `int|false`,
//! `callable(int): string`) so messages read like the source the user wrote.
use crate::ast::{Expression, ExpressionKind, Literal, UnaryOp};
use crate::types::{CallableType, Type};

/// Format a type for display in error messages
///
/// - `Union([Instance(Foo), Null])` → `"?Foo"`
/// - `Array(Union([Int, String]))` → `"(int|string)[]"`
/// - `Callable([Int], Int)` → `"callable(int): int"`
pub fn format_type(ty: &Type) -> String {
    match ty {
        Type::Int => "int".to_string(),
        Type::Float => "float".to_string(),
        Type::String => "string".to_string(),
        Type::Bool => "bool".to_string(),
        Type::False => "false".to_string(),
        Type::Null => "null".to_string(),
        Type::Mixed => "mixed".to_string(),
        Type::Never => "never".to_string(),
        Type::Instance(class) => class.to_string(),
        Type::Array(element) => format!("{}[]", format_nested(element)),
        Type::Callable(callable) => format_callable(callable),
        Type::Union(members) => {
            if let [single, Type::Null] = members.as_slice() {
                return format!("?{}", format_nested(single));
            }
            members
                .iter()
                .map(format_nested)
                .collect::<Vec<_>>()
                .join("|")
        }
    }
}

/// Unions and callables get parentheses when they appear inside another type
fn format_nested(ty: &Type) -> String {
    match ty {
        Type::Union(_) | Type::Callable(CallableType { params: Some(_), .. }) => {
            format!("({})", format_type(ty))
        }
        _ => format_type(ty),
    }
}

fn format_callable(callable: &CallableType) -> String {
    match &callable.params {
        None => "callable".to_string(),
        Some(params) => {
            let params: Vec<String> = params.iter().map(format_type).collect();
            format!(
                "callable({}): {}",
                params.join(", "),
                format_nested(&callable.returns)
            )
        }
    }
}

/// Render an expression the way it reads in source, for the `expression` part of a diagnostic
pub fn format_expression(expr: &Expression) -> String {
    match &expr.kind {
        ExpressionKind::Literal(literal) => match literal {
            Literal::Null => "null".to_string(),
            Literal::Bool(b) => b.to_string(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => format!("{:?}", f),
            Literal::String(s) => format!("\"{}\"", s),
        },
        ExpressionKind::Variable(name) => format!("${}", name),
        ExpressionKind::Property(object, name) => {
            format!("{}->{}", format_expression(object), name)
        }
        ExpressionKind::Index(base, key) => match key {
            Some(key) => format!("{}[{}]", format_expression(base), format_expression(key)),
            None => format!("{}[]", format_expression(base)),
        },
        ExpressionKind::Call(name, args) => format!("{}({})", name, format_args(args)),
        ExpressionKind::MethodCall(receiver, name, args) => format!(
            "{}->{}({})",
            format_expression(receiver),
            name,
            format_args(args)
        ),
        ExpressionKind::New(class, args) => format!("new {}({})", class, format_args(args)),
        ExpressionKind::Array(items) => {
            let items: Vec<String> = items
                .iter()
                .map(|item| match &item.key {
                    Some(key) => format!(
                        "{} => {}",
                        format_expression(key),
                        format_expression(&item.value)
                    ),
                    None => format_expression(&item.value),
                })
                .collect();
            format!("[{}]", items.join(", "))
        }
        ExpressionKind::Closure(closure) => {
            let params: Vec<String> = closure.params.iter().map(|p| format!("${}", p.name)).collect();
            format!("function({}) {{...}}", params.join(", "))
        }
        ExpressionKind::Binary(op, left, right) => format!(
            "{} {} {}",
            format_expression(left),
            op.as_str(),
            format_expression(right)
        ),
        ExpressionKind::Unary(op, operand) => {
            let operand = format_expression(operand);
            match op {
                UnaryOp::Not => format!("!{}", operand),
                UnaryOp::Neg => format!("-{}", operand),
                UnaryOp::Plus => format!("+{}", operand),
                UnaryOp::PreIncrement => format!("++{}", operand),
                UnaryOp::PreDecrement => format!("--{}", operand),
                UnaryOp::PostIncrement => format!("{}++", operand),
                UnaryOp::PostDecrement => format!("{}--", operand),
            }
        }
        ExpressionKind::Assign(target, value) => {
            format!("{} = {}", format_expression(target), format_expression(value))
        }
        ExpressionKind::Ternary(condition, then, otherwise) => match then {
            Some(then) => format!(
                "{} ? {} : {}",
                format_expression(condition),
                format_expression(then),
                format_expression(otherwise)
            ),
            None => format!(
                "{} ?: {}",
                format_expression(condition),
                format_expression(otherwise)
            ),
        },
        ExpressionKind::Instanceof(operand, class) => {
            format!("{} instanceof {}", format_expression(operand), class)
        }
    }
}

fn format_args(args: &[Expression]) -> String {
    args.iter()
        .map(format_expression)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::*;

    #[test]
    fn test_format_primitives() {
        assert_eq!(format_type(&Type::Int), "int");
        assert_eq!(format_type(&Type::False), "false");
        assert_eq!(format_type(&Type::Mixed), "mixed");
    }

    #[test]
    fn test_format_nullable() {
        assert_eq!(format_type(&Type::nullable(Type::instance("Foo"))), "?Foo");
        assert_eq!(
            format_type(&Type::union([Type::Int, Type::String, Type::Null])),
            "int|string|null"
        );
    }

    #[test]
    fn test_format_arrays() {
        assert_eq!(format_type(&Type::array(Type::Int)), "int[]");
        assert_eq!(
            format_type(&Type::array(Type::union([Type::Int, Type::String]))),
            "(int|string)[]"
        );
        assert_eq!(format_type(&Type::nullable(Type::array(Type::Int))), "?int[]");
    }

    #[test]
    fn test_format_union_with_false() {
        assert_eq!(format_type(&Type::union([Type::False, Type::Int])), "int|false");
    }

    #[test]
    fn test_format_callable() {
        let c = Type::callable(vec![Type::Int, Type::String], Type::union([Type::Int, Type::String]));
        assert_eq!(format_type(&c), "callable(int, string): (int|string)");
        assert_eq!(
            format_type(&Type::Callable(CallableType::any())),
            "callable"
        );
    }

    #[test]
    fn test_format_expressions() {
        assert_eq!(format_expression(&prop(var("b"), "x")), "$b->x");
        assert_eq!(
            format_expression(&index(var("str"), string("1"))),
            "$str[\"1\"]"
        );
        assert_eq!(
            format_expression(&method(this(), "get", vec![int(1), null()])),
            "$this->get(1, null)"
        );
        assert_eq!(
            format_expression(&not_identical(prop(var("a"), "x"), null())),
            "$a->x !== null"
        );
        assert_eq!(format_expression(&append(var("xs"))), "$xs[]");
    }
}
