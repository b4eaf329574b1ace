use super::{CallableType, Type};

/// A parameter or return type as written in a signature table.
///
/// Besides concrete types, a template may refer to what the call site actually passed:
/// `arg<N>` is the resolved type of argument N, `elem<N>` its element type and `ret<N>` the
/// return type of the callable passed as argument N.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTemplate {
    Concrete(Type),
    Arg(usize),
    Elem(usize),
    Ret(usize),
    Array(Box<TypeTemplate>),
    Union(Vec<TypeTemplate>),
    Callable {
        params: Option<Vec<TypeTemplate>>,
        returns: Box<TypeTemplate>,
    },
}

/// What a call site supplies for the generic slots of its target's templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotBindings<'b> {
    pub arguments: &'b [Type],
    pub callable_returns: &'b [Option<Type>],
}

impl<'b> SlotBindings<'b> {
    pub fn new(arguments: &'b [Type], callable_returns: &'b [Option<Type>]) -> Self {
        Self {
            arguments,
            callable_returns,
        }
    }

    fn argument(&self, index: usize) -> Type {
        self.arguments.get(index).cloned().unwrap_or(Type::Mixed)
    }

    fn callable_return(&self, index: usize) -> Type {
        self.callable_returns
            .get(index)
            .cloned()
            .flatten()
            .unwrap_or(Type::Mixed)
    }
}

impl TypeTemplate {
    pub fn array(element: TypeTemplate) -> Self {
        match element {
            TypeTemplate::Concrete(t) => TypeTemplate::Concrete(Type::array(t)),
            other => TypeTemplate::Array(Box::new(other)),
        }
    }

    pub fn union(members: Vec<TypeTemplate>) -> Self {
        if members.iter().all(TypeTemplate::is_concrete) {
            return TypeTemplate::Concrete(Type::union(
                members.into_iter().filter_map(TypeTemplate::into_concrete),
            ));
        }
        TypeTemplate::Union(members)
    }

    pub fn nullable(inner: TypeTemplate) -> Self {
        TypeTemplate::union(vec![inner, TypeTemplate::Concrete(Type::Null)])
    }

    pub fn callable(params: Option<Vec<TypeTemplate>>, returns: TypeTemplate) -> Self {
        let params_concrete = params
            .as_ref()
            .map_or(true, |ps| ps.iter().all(TypeTemplate::is_concrete));
        if params_concrete && returns.is_concrete() {
            let params =
                params.map(|ps| ps.into_iter().filter_map(TypeTemplate::into_concrete).collect());
            let returns = returns.into_concrete().unwrap_or(Type::Mixed);
            return TypeTemplate::Concrete(Type::Callable(CallableType {
                params,
                returns: Box::new(returns),
            }));
        }
        TypeTemplate::Callable {
            params,
            returns: Box::new(returns),
        }
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, TypeTemplate::Concrete(_))
    }

    pub fn into_concrete(self) -> Option<Type> {
        match self {
            TypeTemplate::Concrete(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_concrete(&self) -> Option<&Type> {
        match self {
            TypeTemplate::Concrete(t) => Some(t),
            _ => None,
        }
    }

    /// Largest argument index any slot refers to
    pub fn max_slot(&self) -> Option<usize> {
        match self {
            TypeTemplate::Concrete(_) => None,
            TypeTemplate::Arg(i) | TypeTemplate::Elem(i) | TypeTemplate::Ret(i) => Some(*i),
            TypeTemplate::Array(inner) => inner.max_slot(),
            TypeTemplate::Union(members) => members.iter().filter_map(|m| m.max_slot()).max(),
            TypeTemplate::Callable { params, returns } => params
                .iter()
                .flatten()
                .filter_map(|p| p.max_slot())
                .chain(returns.max_slot())
                .max(),
        }
    }

    /// Whether this template describes a callable (the consuming call site checks it as a callback)
    pub fn is_callable(&self) -> bool {
        match self {
            TypeTemplate::Callable { .. } => true,
            TypeTemplate::Concrete(Type::Callable(_)) => true,
            _ => false,
        }
    }

    pub fn instantiate(&self, bindings: &SlotBindings<'_>) -> Type {
        match self {
            TypeTemplate::Concrete(t) => t.clone(),
            TypeTemplate::Arg(i) => bindings.argument(*i),
            TypeTemplate::Elem(i) => bindings.argument(*i).element_type(),
            TypeTemplate::Ret(i) => bindings.callable_return(*i),
            TypeTemplate::Array(inner) => Type::array(inner.instantiate(bindings)),
            TypeTemplate::Union(members) => {
                Type::union(members.iter().map(|m| m.instantiate(bindings)))
            }
            TypeTemplate::Callable { params, returns } => Type::Callable(CallableType {
                params: params
                    .as_ref()
                    .map(|ps| ps.iter().map(|p| p.instantiate(bindings)).collect()),
                returns: Box::new(returns.instantiate(bindings)),
            }),
        }
    }
}

impl From<Type> for TypeTemplate {
    fn from(t: Type) -> Self {
        TypeTemplate::Concrete(t)
    }
}
