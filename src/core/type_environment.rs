use crate::ast::{ClassDecl, FunctionDecl, Program};
use crate::span::Span;
use crate::stdlib::{FunctionSignature, SignatureOrigin};
use crate::types::{ClassId, Type};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

/// A declared property: its type (`mixed` when untyped) and where it was declared
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyInfo {
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassInfo {
    pub id: ClassId,
    pub parent: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub is_interface: bool,
    pub properties: IndexMap<String, PropertyInfo>,
    pub methods: IndexMap<String, FunctionSignature>,
}

impl ClassInfo {
    fn supertypes(&self) -> impl Iterator<Item = &ClassId> {
        self.parent.iter().chain(self.interfaces.iter())
    }
}

/// Declared classes and functions of one program.
///
/// Built once before checking and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct TypeEnvironment {
    classes: IndexMap<String, ClassInfo>,
    /// User functions keyed by lowercased name
    functions: IndexMap<String, FunctionSignature>,
}

impl TypeEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_program(program: &Program) -> Self {
        let mut env = Self::new();
        for (index, class) in program.classes.iter().enumerate() {
            env.register_class(class, index);
        }
        for (index, function) in program.functions.iter().enumerate() {
            env.register_function(function, SignatureOrigin::Function(index));
        }
        env
    }

    pub fn register_class(&mut self, decl: &ClassDecl, index: usize) {
        let properties = decl
            .properties
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    PropertyInfo {
                        ty: p.type_hint.clone().unwrap_or(Type::Mixed),
                        span: p.span,
                    },
                )
            })
            .collect();
        let methods = decl
            .methods
            .iter()
            .enumerate()
            .map(|(method, m)| {
                (
                    m.name.to_ascii_lowercase(),
                    FunctionSignature::from_decl(
                        m,
                        SignatureOrigin::Method {
                            class: index,
                            method,
                        },
                    ),
                )
            })
            .collect();
        self.classes.insert(
            decl.name.clone(),
            ClassInfo {
                id: ClassId::new(decl.name.clone()),
                parent: decl.parent.clone().map(ClassId::new),
                interfaces: decl.interfaces.iter().cloned().map(ClassId::new).collect(),
                is_interface: decl.is_interface,
                properties,
                methods,
            },
        );
    }

    pub fn register_function(&mut self, decl: &FunctionDecl, origin: SignatureOrigin) {
        self.functions.insert(
            decl.name.to_ascii_lowercase(),
            FunctionSignature::from_decl(decl, origin),
        );
    }

    pub fn lookup_class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    pub fn lookup_function(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.get(&name.to_ascii_lowercase())
    }

    pub fn is_interface(&self, class: &ClassId) -> bool {
        self.lookup_class(class.as_str())
            .map_or(false, |c| c.is_interface)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassInfo> {
        self.classes.values()
    }

    /// Whether `class` is `ancestor` or reaches it through parents and interfaces.
    pub fn is_subclass(&self, class: &ClassId, ancestor: &ClassId) -> bool {
        if class == ancestor {
            return true;
        }
        let mut visited: FxHashSet<&str> = FxHashSet::default();
        let mut queue = VecDeque::new();
        queue.push_back(class.as_str());
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            let Some(info) = self.classes.get(current) else {
                continue;
            };
            for supertype in info.supertypes() {
                if supertype == ancestor {
                    return true;
                }
                queue.push_back(supertype.as_str());
            }
        }
        false
    }

    /// Declaration order walk: the class itself, then its ancestors breadth-first.
    fn ancestry<'e>(&'e self, class: &ClassId) -> Vec<&'e ClassInfo> {
        let mut result = Vec::new();
        let mut visited: FxHashSet<&'e str> = FxHashSet::default();
        let mut queue: VecDeque<&'e str> = VecDeque::new();
        if let Some((name, _)) = self.classes.get_key_value(class.as_str()) {
            queue.push_back(name.as_str());
        }
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(info) = self.classes.get(current) {
                result.push(info);
                queue.extend(info.supertypes().map(ClassId::as_str));
            }
        }
        result
    }

    pub fn property(&self, class: &ClassId, name: &str) -> Option<&PropertyInfo> {
        self.ancestry(class)
            .into_iter()
            .find_map(|info| info.properties.get(name))
    }

    pub fn method(&self, class: &ClassId, name: &str) -> Option<&FunctionSignature> {
        let key = name.to_ascii_lowercase();
        self.ancestry(class)
            .into_iter()
            .find_map(|info| info.methods.get(&key))
    }

    /// Type of reading `name` from a value of type `object`.
    ///
    /// Unknown classes and undeclared properties read as `mixed`; reading through `null` or a
    /// scalar yields `null`.
    pub fn property_type(&self, object: &Type, name: &str) -> Type {
        match object {
            Type::Mixed => Type::Mixed,
            Type::Never => Type::Never,
            Type::Instance(class) => self
                .property(class, name)
                .map_or(Type::Mixed, |p| p.ty.clone()),
            Type::Union(members) => {
                Type::union(members.iter().map(|m| self.property_type(m, name)))
            }
            _ => Type::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::*;

    fn hierarchy() -> TypeEnvironment {
        let program = Program {
            classes: vec![
                class("Shape").interface().build(),
                class("Base")
                    .implements("Shape")
                    .property("x", Some(Type::nullable(Type::instance("Bar"))))
                    .method(function("area").returns(Type::Float).build())
                    .build(),
                class("Derived").extends("Base").property("y", None).build(),
                class("Bar").build(),
            ],
            functions: vec![function("Helper").param("a", Some(Type::Int)).build()],
            statements: vec![],
        };
        TypeEnvironment::from_program(&program)
    }

    #[test]
    fn test_is_subclass_walks_parents_and_interfaces() {
        let env = hierarchy();
        let derived = ClassId::new("Derived");
        assert!(env.is_subclass(&derived, &ClassId::new("Base")));
        assert!(env.is_subclass(&derived, &ClassId::new("Shape")));
        assert!(!env.is_subclass(&ClassId::new("Base"), &derived));
        assert!(!env.is_subclass(&ClassId::new("Bar"), &ClassId::new("Shape")));
        assert!(env.is_interface(&ClassId::new("Shape")));
    }

    #[test]
    fn test_inherited_members() {
        let env = hierarchy();
        let derived = ClassId::new("Derived");
        assert_eq!(
            env.property(&derived, "x").map(|p| p.ty.clone()),
            Some(Type::nullable(Type::instance("Bar")))
        );
        assert!(env.method(&derived, "AREA").is_some());
        assert!(env.property(&derived, "missing").is_none());
    }

    #[test]
    fn test_member_lookup_outlives_class_name() {
        let env = hierarchy();
        let property = env.property(&ClassId::new("Derived"), "x");
        let method = env.method(&ClassId::new("Derived"), "area");
        assert_eq!(
            property.map(|p| &p.ty),
            Some(&Type::nullable(Type::instance("Bar")))
        );
        assert!(method.is_some());
    }

    #[test]
    fn test_property_type_through_union() {
        let env = hierarchy();
        let receiver = Type::nullable(Type::instance("Derived"));
        assert_eq!(
            env.property_type(&receiver, "x"),
            Type::nullable(Type::instance("Bar"))
        );
        assert_eq!(env.property_type(&Type::instance("Derived"), "y"), Type::Mixed);
    }

    #[test]
    fn test_cyclic_hierarchy_terminates() {
        let program = Program {
            classes: vec![class("A").extends("B").build(), class("B").extends("A").build()],
            ..Default::default()
        };
        let env = TypeEnvironment::from_program(&program);
        assert!(!env.is_subclass(&ClassId::new("A"), &ClassId::new("C")));
        assert!(env.property(&ClassId::new("A"), "p").is_none());
    }

    #[test]
    fn test_functions_case_insensitive() {
        let env = hierarchy();
        assert!(env.lookup_function("helper").is_some());
        assert!(env.lookup_function("HELPER").is_some());
    }
}
