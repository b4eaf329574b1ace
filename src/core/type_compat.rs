use super::type_environment::TypeEnvironment;
use crate::types::{CallableType, ClassId, Type};

/// A fact assumed to hold along one control-flow edge
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Assumption {
    NotNull,
    IsNull,
    Truthy,
    Falsy,
    InstanceOf(ClassId),
    NotInstanceOf(ClassId),
}

impl Assumption {
    pub fn negate(&self) -> Assumption {
        match self {
            Assumption::NotNull => Assumption::IsNull,
            Assumption::IsNull => Assumption::NotNull,
            Assumption::Truthy => Assumption::Falsy,
            Assumption::Falsy => Assumption::Truthy,
            Assumption::InstanceOf(c) => Assumption::NotInstanceOf(c.clone()),
            Assumption::NotInstanceOf(c) => Assumption::InstanceOf(c.clone()),
        }
    }
}

/// Subtyping, joins and narrowing over the type lattice
pub struct TypeCompatibility;

impl TypeCompatibility {
    /// Check if every value of `source` is a value of `target`
    pub fn is_subtype(source: &Type, target: &Type, env: &TypeEnvironment) -> bool {
        if source == target {
            return true;
        }
        match (source, target) {
            (Type::Never, _) => true,
            (_, Type::Mixed) => true,
            (Type::Mixed, _) => false,
            (Type::Union(members), _) => members.iter().all(|m| Self::is_subtype(m, target, env)),
            (_, Type::Union(members)) => members.iter().any(|m| Self::is_subtype(source, m, env)),
            (Type::False, Type::Bool) => true,
            (Type::Array(s), Type::Array(t)) => Self::is_subtype(s, t, env),
            (Type::Instance(s), Type::Instance(t)) => env.is_subclass(s, t),
            (Type::Callable(s), Type::Callable(t)) => Self::is_callable_subtype(s, t, env),
            _ => false,
        }
    }

    /// Parameters are contravariant, the return type covariant. Unknown parameter lists
    /// on either side are not compared; extra parameters on `source` are ignored.
    fn is_callable_subtype(source: &CallableType, target: &CallableType, env: &TypeEnvironment) -> bool {
        if let (Some(source_params), Some(target_params)) = (&source.params, &target.params) {
            let params_ok = target_params
                .iter()
                .zip(source_params.iter())
                .all(|(required, accepted)| Self::is_subtype(required, accepted, env));
            if !params_ok {
                return false;
            }
        }
        Self::is_subtype(&source.returns, &target.returns, env)
    }

    /// Least upper bound, used where control flow merges
    pub fn join(a: &Type, b: &Type) -> Type {
        a.join(b)
    }

    /// Greatest lower bound of `declared` and the assumed fact; `Never` marks an impossible edge.
    pub fn narrow(declared: &Type, assumption: &Assumption, env: &TypeEnvironment) -> Type {
        match assumption {
            Assumption::NotNull => declared.without_null(),
            Assumption::IsNull => {
                if declared.is_mixed() || declared.contains_null() {
                    Type::Null
                } else {
                    Type::Never
                }
            }
            Assumption::Truthy => declared.filter(|m| !matches!(m, Type::Null | Type::False)),
            Assumption::Falsy => declared.filter(|m| m.can_be_falsy()),
            Assumption::InstanceOf(class) => Self::narrow_to_instance(declared, class, env),
            Assumption::NotInstanceOf(class) => declared.filter(|m| match m {
                Type::Instance(c) => !env.is_subclass(c, class),
                _ => true,
            }),
        }
    }

    fn narrow_to_instance(declared: &Type, class: &ClassId, env: &TypeEnvironment) -> Type {
        if declared.is_mixed() {
            return Type::Instance(class.clone());
        }
        Type::union(declared.members().iter().filter_map(|member| match member {
            Type::Instance(c) if env.is_subclass(c, class) => Some(member.clone()),
            Type::Instance(c)
                if env.is_subclass(class, c) || env.is_interface(class) || env.is_interface(c) =>
            {
                Some(Type::Instance(class.clone()))
            }
            _ => None,
        }))
    }
}
