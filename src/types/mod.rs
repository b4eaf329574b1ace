//! The type lattice: a closed set of value kinds plus `Mixed` (top) and `Never` (bottom).
//!
//! `Type::union` is the only way unions are built, so every `Union` held anywhere is
//! flattened, deduplicated, sorted and has at least two members.

pub mod hint;
pub mod template;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Array nesting deeper than this is widened to `mixed[]` when facts are joined.
pub const MAX_ARRAY_DEPTH: usize = 4;

/// Nominal identity of a declared class or interface
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub String);

impl ClassId {
    pub fn new(name: impl Into<String>) -> Self {
        ClassId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shape of a callable value.
///
/// `params == None` is the bare `callable` hint: arity and parameter types are unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallableType {
    pub params: Option<Vec<Type>>,
    pub returns: Box<Type>,
}

impl CallableType {
    pub fn new(params: Vec<Type>, returns: Type) -> Self {
        Self {
            params: Some(params),
            returns: Box::new(returns),
        }
    }

    pub fn any() -> Self {
        Self {
            params: None,
            returns: Box::new(Type::Mixed),
        }
    }
}

// Variant order is the rendering order of union members.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of", rename_all = "camelCase")]
pub enum Type {
    Int,
    Float,
    String,
    Bool,
    /// The `false` pseudo-type; a subtype of `Bool`
    False,
    Array(Box<Type>),
    Instance(ClassId),
    Callable(CallableType),
    Null,
    Union(Vec<Type>),
    Mixed,
    Never,
}

impl Type {
    pub fn array(element: Type) -> Type {
        Type::Array(Box::new(element))
    }

    pub fn instance(class: impl Into<String>) -> Type {
        Type::Instance(ClassId::new(class))
    }

    pub fn callable(params: Vec<Type>, returns: Type) -> Type {
        Type::Callable(CallableType::new(params, returns))
    }

    pub fn nullable(inner: Type) -> Type {
        Type::union([inner, Type::Null])
    }

    /// Builds the canonical union of `members`.
    pub fn union(members: impl IntoIterator<Item = Type>) -> Type {
        let mut flat = Vec::new();
        for member in members {
            match member {
                Type::Union(inner) => flat.extend(inner),
                Type::Never => {}
                Type::Mixed => return Type::Mixed,
                other => flat.push(other),
            }
        }

        // All array members merge into one array of the joined element types.
        let mut elements = Vec::new();
        flat.retain(|t| match t {
            Type::Array(element) => {
                elements.push((**element).clone());
                false
            }
            _ => true,
        });
        if !elements.is_empty() {
            flat.push(Type::Array(Box::new(Type::union(elements))));
        }

        if flat.contains(&Type::Bool) {
            flat.retain(|t| *t != Type::False);
        }

        flat.sort();
        flat.dedup();
        match flat.len() {
            0 => Type::Never,
            1 => flat.pop().unwrap_or(Type::Never),
            _ => Type::Union(flat),
        }
    }

    /// Least upper bound
    pub fn join(&self, other: &Type) -> Type {
        if self == other {
            return self.clone();
        }
        Type::union([self.clone(), other.clone()])
    }

    /// The union members, or `self` alone for a non-union type
    pub fn members(&self) -> &[Type] {
        match self {
            Type::Union(members) => members,
            other => std::slice::from_ref(other),
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Type::Never)
    }

    pub fn is_mixed(&self) -> bool {
        matches!(self, Type::Mixed)
    }

    pub fn contains_null(&self) -> bool {
        self.members().iter().any(|m| matches!(m, Type::Null))
    }

    /// True if `null` is among several members (`?T`, `T|null`)
    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Union(_)) && self.contains_null()
    }

    pub fn without_null(&self) -> Type {
        self.filter(|m| !matches!(m, Type::Null))
    }

    /// Keeps only the members that satisfy `keep`; `Mixed` is returned unchanged.
    pub fn filter(&self, keep: impl Fn(&Type) -> bool) -> Type {
        if self.is_mixed() {
            return Type::Mixed;
        }
        Type::union(self.members().iter().filter(|m| keep(m)).cloned())
    }

    /// Type of one element when the value is iterated or indexed.
    pub fn element_type(&self) -> Type {
        match self {
            Type::Array(element) => (**element).clone(),
            Type::Mixed => Type::Mixed,
            Type::Never => Type::Never,
            Type::String => Type::String,
            Type::Null => Type::Null,
            Type::Union(members) => Type::union(members.iter().map(Type::element_type)),
            _ => Type::Mixed,
        }
    }

    pub fn array_depth(&self) -> usize {
        match self {
            Type::Array(element) => 1 + element.array_depth(),
            Type::Union(members) => members.iter().map(Type::array_depth).max().unwrap_or(0),
            _ => 0,
        }
    }

    /// Replaces arrays nested deeper than `max_depth` with `mixed[]`.
    pub fn widen(&self, max_depth: usize) -> Type {
        match self {
            Type::Array(_) if max_depth == 0 => Type::array(Type::Mixed),
            Type::Array(element) => Type::array(element.widen(max_depth - 1)),
            Type::Union(members) => Type::union(members.iter().map(|m| m.widen(max_depth))),
            other => other.clone(),
        }
    }

    /// Whether a value of this type can be falsy at runtime
    pub fn can_be_falsy(&self) -> bool {
        self.members().iter().any(|m| {
            !matches!(
                m,
                Type::Instance(_) | Type::Callable(_) | Type::Never
            )
        })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::utils::type_formatter::format_type(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_flattens_and_sorts() {
        let inner = Type::union([Type::String, Type::Int]);
        let t = Type::union([Type::Null, inner, Type::Int]);
        assert_eq!(t, Type::Union(vec![Type::Int, Type::String, Type::Null]));
    }

    #[test]
    fn test_union_singleton_and_empty() {
        assert_eq!(Type::union([Type::Int, Type::Int]), Type::Int);
        assert_eq!(Type::union(Vec::new()), Type::Never);
        assert_eq!(Type::union([Type::Never, Type::Float]), Type::Float);
    }

    #[test]
    fn test_union_mixed_absorbs() {
        assert_eq!(Type::union([Type::Int, Type::Mixed, Type::Null]), Type::Mixed);
    }

    #[test]
    fn test_false_collapses_into_bool() {
        assert_eq!(Type::union([Type::False, Type::Bool]), Type::Bool);
        assert_eq!(
            Type::union([Type::Int, Type::False]),
            Type::Union(vec![Type::Int, Type::False])
        );
    }

    #[test]
    fn test_arrays_merge_elementwise() {
        let t = Type::union([Type::array(Type::Int), Type::array(Type::String)]);
        assert_eq!(t, Type::array(Type::union([Type::Int, Type::String])));
    }

    #[test]
    fn test_without_null() {
        let t = Type::nullable(Type::instance("Foo"));
        assert!(t.is_nullable());
        assert_eq!(t.without_null(), Type::instance("Foo"));
        assert_eq!(Type::Null.without_null(), Type::Never);
    }

    #[test]
    fn test_widen_caps_depth() {
        let deep = Type::array(Type::array(Type::array(Type::Int)));
        assert_eq!(deep.widen(1), Type::array(Type::array(Type::Mixed)));
        assert_eq!(deep.array_depth(), 3);
    }

    #[test]
    fn test_element_type_of_union() {
        let t = Type::union([Type::array(Type::Int), Type::Null]);
        assert_eq!(t.element_type(), Type::nullable(Type::Int));
    }
}
