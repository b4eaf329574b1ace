// Built-in function signatures embedded at compile time

use crate::ast::FunctionDecl;
use crate::errors::SignatureError;
use crate::types::hint::parse_template;
use crate::types::template::TypeTemplate;
use crate::types::{CallableType, Type};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use rustc_hash::FxHashSet;
use serde::Deserialize;

/// Signature table of the runtime library
pub const BUILTINS: &str = include_str!("builtins.json");

static BUILTIN_TABLE: Lazy<Result<SignatureTable, SignatureError>> =
    Lazy::new(|| SignatureTable::from_json(BUILTINS));

/// The process-wide built-in table, parsed on first use.
pub fn builtins() -> Result<&'static SignatureTable, SignatureError> {
    BUILTIN_TABLE.as_ref().map_err(Clone::clone)
}

/// Where a signature came from; declared callables keep a route back to their body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureOrigin {
    Builtin,
    Function(usize),
    Method { class: usize, method: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub template: TypeTemplate,
    pub by_ref: bool,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<ParamSpec>,
    /// `None` when the declaration has no return hint and the type must be inferred
    pub returns: Option<TypeTemplate>,
    pub pure: bool,
    /// The last parameter repeats
    pub variadic: bool,
    pub origin: SignatureOrigin,
}

impl FunctionSignature {
    pub fn from_decl(decl: &FunctionDecl, origin: SignatureOrigin) -> Self {
        Self {
            name: decl.name.clone(),
            params: decl
                .params
                .iter()
                .map(|p| ParamSpec {
                    name: p.name.clone(),
                    template: TypeTemplate::Concrete(p.declared_type()),
                    by_ref: p.by_ref,
                    optional: false,
                })
                .collect(),
            returns: decl.return_type.clone().map(TypeTemplate::Concrete),
            pure: decl.is_pure,
            variadic: false,
            origin,
        }
    }

    /// Parameter receiving argument `index`
    pub fn param_for(&self, index: usize) -> Option<&ParamSpec> {
        match self.params.get(index) {
            Some(param) => Some(param),
            None if self.variadic => self.params.last(),
            None => None,
        }
    }

    /// The signature seen as a value, with `returns` standing in for a missing return hint.
    ///
    /// Slots cannot be bound without a call site, so they read as `mixed`.
    pub fn as_callable(&self, returns: Type) -> CallableType {
        let unbound = Default::default();
        CallableType::new(
            self.params
                .iter()
                .map(|p| p.template.instantiate(&unbound))
                .collect(),
            match &self.returns {
                Some(template) => template.instantiate(&unbound),
                None => returns,
            },
        )
    }
}

#[derive(Debug, Deserialize)]
struct RawTable {
    functions: Vec<RawSignature>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSignature {
    name: String,
    #[serde(default)]
    params: Vec<RawParam>,
    returns: Option<String>,
    #[serde(default)]
    pure: bool,
    #[serde(default)]
    variadic: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParam {
    name: String,
    #[serde(rename = "type")]
    hint: String,
    #[serde(default)]
    by_ref: bool,
    #[serde(default)]
    optional: bool,
}

/// Immutable mapping from callable name to its signature.
///
/// Names are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct SignatureTable {
    functions: IndexMap<String, FunctionSignature>,
}

impl SignatureTable {
    pub fn from_json(source: &str) -> Result<Self, SignatureError> {
        let raw: RawTable =
            serde_json::from_str(source).map_err(|e| SignatureError::Malformed(e.to_string()))?;
        let mut table = SignatureTable::default();
        for entry in raw.functions {
            let signature = convert(entry)?;
            table.insert(signature)?;
        }
        Ok(table)
    }

    pub fn insert(&mut self, signature: FunctionSignature) -> Result<(), SignatureError> {
        let key = signature.name.to_ascii_lowercase();
        if self.functions.contains_key(&key) {
            return Err(SignatureError::Duplicate(signature.name));
        }
        self.functions.insert(key, signature);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.get(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionSignature> {
        self.functions.values()
    }
}

fn convert(raw: RawSignature) -> Result<FunctionSignature, SignatureError> {
    let mut params = Vec::with_capacity(raw.params.len());
    for p in raw.params {
        params.push(ParamSpec {
            name: p.name,
            template: parse_template(&p.hint)?,
            by_ref: p.by_ref,
            optional: p.optional,
        });
    }
    let returns = match raw.returns {
        Some(hint) => parse_template(&hint)?,
        None => TypeTemplate::Concrete(Type::Null),
    };

    let count = params.len();
    let highest = params
        .iter()
        .filter_map(|p| p.template.max_slot())
        .chain(returns.max_slot())
        .max();
    if let Some(index) = highest.filter(|&i| i >= count) {
        return Err(SignatureError::SlotOutOfRange {
            function: raw.name,
            index,
            count,
        });
    }

    Ok(FunctionSignature {
        name: raw.name,
        params,
        returns: Some(returns),
        pure: raw.pure,
        variadic: raw.variadic,
        origin: SignatureOrigin::Builtin,
    })
}

/// Names of callables known not to mutate state visible to the caller.
///
/// Any call whose target is not listed here is opaque: it may change any object reachable
/// from a tracked chain.
#[derive(Debug, Clone, Default)]
pub struct PurityPolicy {
    pure: FxHashSet<String>,
}

impl PurityPolicy {
    pub fn new<'a>(
        table: &SignatureTable,
        declared: impl IntoIterator<Item = &'a FunctionDecl>,
        extra: &[String],
    ) -> Self {
        let mut pure: FxHashSet<String> = table
            .iter()
            .filter(|s| s.pure)
            .map(|s| s.name.to_ascii_lowercase())
            .collect();
        for decl in declared {
            let key = decl.name.to_ascii_lowercase();
            // A user declaration shadows the built-in of the same name
            if decl.is_pure {
                pure.insert(key);
            } else {
                pure.remove(&key);
            }
        }
        pure.extend(extra.iter().map(|name| name.to_ascii_lowercase()));
        Self { pure }
    }

    pub fn is_pure(&self, name: &str) -> bool {
        self.pure.contains(&name.to_ascii_lowercase())
    }
}
