//! Parser for PHP-style type hints and signature-table templates.
//!
//! ```text
//! union    := term ('|' term)*
//! term     := '?' term | postfix
//! postfix  := primary ('[' ']')*
//! primary  := '(' union ')' | callable | slot '<' N '>' | name
//! callable := 'callable' [ '(' [union (',' union)*] ')' [ ':' term ] ]
//! ```

use super::template::TypeTemplate;
use super::Type;
use crate::errors::SignatureError;

/// Parses a hint that may not contain generic slots.
pub fn parse_type_hint(hint: &str) -> Result<Type, SignatureError> {
    parse_template(hint)?
        .into_concrete()
        .ok_or_else(|| SignatureError::UnexpectedSlot(hint.to_string()))
}

/// Parses a hint that may contain `arg<N>`, `elem<N>` and `ret<N>` slots.
pub fn parse_template(hint: &str) -> Result<TypeTemplate, SignatureError> {
    let tokens = tokenize(hint)?;
    let mut parser = HintParser {
        hint,
        tokens,
        pos: 0,
    };
    let result = parser.parse_union()?;
    if let Some(token) = parser.peek() {
        return Err(parser.error(format!("unexpected '{}'", token)));
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    Number(usize),
    Punct(char),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Name(name) => f.write_str(name),
            Token::Number(n) => write!(f, "{}", n),
            Token::Punct(c) => write!(f, "{}", c),
        }
    }
}

fn tokenize(hint: &str) -> Result<Vec<Token>, SignatureError> {
    let mut tokens = Vec::new();
    let mut chars = hint.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() {
            let mut value = 0usize;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                value = value
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(d as usize))
                    .ok_or_else(|| SignatureError::InvalidHint {
                        hint: hint.to_string(),
                        message: "slot index out of range".to_string(),
                    })?;
                chars.next();
            }
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' || c == '\\' {
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_alphanumeric() || c == '_' || c == '\\' {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Name(name.trim_start_matches('\\').to_string()));
        } else if "?|[](),:<>".contains(c) {
            tokens.push(Token::Punct(c));
            chars.next();
        } else {
            return Err(SignatureError::InvalidHint {
                hint: hint.to_string(),
                message: format!("unexpected character '{}'", c),
            });
        }
    }
    Ok(tokens)
}

struct HintParser<'h> {
    hint: &'h str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'h> HintParser<'h> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(&Token::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), SignatureError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", c)))
        }
    }

    fn error(&self, message: String) -> SignatureError {
        SignatureError::InvalidHint {
            hint: self.hint.to_string(),
            message,
        }
    }

    fn parse_union(&mut self) -> Result<TypeTemplate, SignatureError> {
        let mut members = vec![self.parse_term()?];
        while self.eat('|') {
            members.push(self.parse_term()?);
        }
        if members.len() == 1 {
            return Ok(members.remove(0));
        }
        Ok(TypeTemplate::union(members))
    }

    fn parse_term(&mut self) -> Result<TypeTemplate, SignatureError> {
        if self.eat('?') {
            let inner = self.parse_term()?;
            return Ok(TypeTemplate::nullable(inner));
        }
        let mut result = self.parse_primary()?;
        while self.eat('[') {
            self.expect(']')?;
            result = TypeTemplate::array(result);
        }
        Ok(result)
    }

    fn parse_primary(&mut self) -> Result<TypeTemplate, SignatureError> {
        if self.eat('(') {
            let inner = self.parse_union()?;
            self.expect(')')?;
            return Ok(inner);
        }
        let name = match self.next() {
            Some(Token::Name(name)) => name,
            Some(other) => return Err(self.error(format!("unexpected '{}'", other))),
            None => return Err(self.error("unexpected end of hint".to_string())),
        };
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "callable" => self.parse_callable(),
            "arg" | "elem" | "ret" => {
                self.expect('<')?;
                let index = match self.next() {
                    Some(Token::Number(n)) => n,
                    _ => return Err(self.error(format!("expected an index in {}<N>", lower))),
                };
                self.expect('>')?;
                Ok(match lower.as_str() {
                    "arg" => TypeTemplate::Arg(index),
                    "elem" => TypeTemplate::Elem(index),
                    _ => TypeTemplate::Ret(index),
                })
            }
            _ => Ok(TypeTemplate::Concrete(named_type(&name, &lower))),
        }
    }

    fn parse_callable(&mut self) -> Result<TypeTemplate, SignatureError> {
        if !self.eat('(') {
            return Ok(TypeTemplate::Concrete(Type::Callable(super::CallableType::any())));
        }
        let mut params = Vec::new();
        if !self.eat(')') {
            loop {
                params.push(self.parse_union()?);
                if self.eat(')') {
                    break;
                }
                self.expect(',')?;
            }
        }
        let returns = if self.eat(':') {
            self.parse_term()?
        } else {
            TypeTemplate::Concrete(Type::Mixed)
        };
        Ok(TypeTemplate::callable(Some(params), returns))
    }
}

fn named_type(name: &str, lower: &str) -> Type {
    match lower {
        "int" | "integer" => Type::Int,
        "float" | "double" => Type::Float,
        "string" => Type::String,
        "bool" | "boolean" | "true" => Type::Bool,
        "false" => Type::False,
        "null" | "void" => Type::Null,
        "mixed" | "object" => Type::Mixed,
        "never" => Type::Never,
        "array" => Type::array(Type::Mixed),
        _ => Type::instance(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives() {
        assert_eq!(parse_type_hint("int").unwrap(), Type::Int);
        assert_eq!(parse_type_hint("boolean").unwrap(), Type::Bool);
        assert_eq!(parse_type_hint("array").unwrap(), Type::array(Type::Mixed));
        assert_eq!(parse_type_hint("void").unwrap(), Type::Null);
    }

    #[test]
    fn test_nullable_class() {
        assert_eq!(
            parse_type_hint("?\\App\\Bar").unwrap(),
            Type::nullable(Type::instance("App\\Bar"))
        );
    }

    #[test]
    fn test_union_with_false() {
        assert_eq!(
            parse_type_hint("int|false").unwrap(),
            Type::Union(vec![Type::Int, Type::False])
        );
    }

    #[test]
    fn test_nested_arrays() {
        assert_eq!(
            parse_type_hint("(int|string)[][]").unwrap(),
            Type::array(Type::array(Type::union([Type::Int, Type::String])))
        );
    }

    #[test]
    fn test_callable_hint() {
        assert_eq!(
            parse_type_hint("callable(int, string): bool").unwrap(),
            Type::callable(vec![Type::Int, Type::String], Type::Bool)
        );
        assert!(matches!(
            parse_type_hint("callable").unwrap(),
            Type::Callable(c) if c.params.is_none()
        ));
    }

    #[test]
    fn test_template_slots() {
        let t = parse_template("callable(elem<1>): mixed").unwrap();
        assert_eq!(
            t,
            TypeTemplate::Callable {
                params: Some(vec![TypeTemplate::Elem(1)]),
                returns: Box::new(TypeTemplate::Concrete(Type::Mixed)),
            }
        );
        assert_eq!(
            parse_template("ret<0>[]").unwrap(),
            TypeTemplate::Array(Box::new(TypeTemplate::Ret(0)))
        );
    }

    #[test]
    fn test_oversized_slot_index_is_an_error() {
        assert!(matches!(
            parse_template("elem<99999999999999999999999>"),
            Err(SignatureError::InvalidHint { .. })
        ));
    }

    #[test]
    fn test_slots_rejected_in_plain_hints() {
        assert!(matches!(
            parse_type_hint("arg<0>"),
            Err(SignatureError::UnexpectedSlot(_))
        ));
    }

    #[test]
    fn test_malformed_hints() {
        assert!(parse_type_hint("int|").is_err());
        assert!(parse_type_hint("int[").is_err());
        assert!(parse_type_hint("in t").is_err());
        assert!(parse_type_hint("int$").is_err());
    }
}
