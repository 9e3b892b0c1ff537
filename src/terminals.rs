//! Leaf productions for primitive JSON values.
//!
//! Shared terminals (generic boolean/number/string, whitespace, the in-string
//! character) carry a reserved rule name, so every use site in a grammar
//! points at one rule. Fully concrete literals render inline: their bodies
//! belong to a single call site and are not worth a rule of their own.
pub mod string;
pub mod whitespace;

use serde_json::{Number, Value};

use crate::error::{GrammarError, Result};
use crate::gbnf::quote_literal;
use crate::schema::StringFormat;
use crate::scope::ScopeState;

pub use string::StringBounds;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Terminal {
    Null,
    BooleanLiteral(bool),
    Boolean,
    NumberLiteral(Number),
    Number { fractional: bool },
    StringLiteral(String),
    String(StringBounds),
    FormatString(StringFormat),
    VerbatimText(String),
    Whitespace(ScopeState),
    InStringChar,
}

/// Anything that can turn a terminal into a reference: either its inline text
/// or the name of the rule it was registered under.
pub trait ResolveTerminal {
    fn resolve_terminal(&mut self, terminal: &Terminal) -> String;
}

pub mod reserved {
    pub const NULL: &str = "null-rule";
    pub const BOOLEAN: &str = "boolean-rule";
    pub const FRACTIONAL_NUMBER: &str = "fractional-number-rule";
    pub const INTEGER_NUMBER: &str = "integer-number-rule";
    pub const STRING: &str = "string-rule";
    pub const STRING_CHAR: &str = "string-char-rule";
    pub const WHITESPACE_NO_NEW_LINES: &str = "whitespace-no-new-lines-rule";
    pub const ANY_JSON_NO_NEW_LINES: &str = "any-json-no-new-lines-rule";

    pub fn whitespace(nesting_depth: u32, pad_spaces: u32) -> String {
        format!("whitespace-{nesting_depth}-{pad_spaces}-rule")
    }

    pub fn any_json(nesting_depth: u32, pad_spaces: u32) -> String {
        format!("any-json-{nesting_depth}-{pad_spaces}-rule")
    }

    /// True for every name this module can hand out. Generated names never
    /// end in `-rule`.
    pub fn is_reserved(name: &str) -> bool {
        name.ends_with("-rule")
    }
}

const NUMBER_INTEGER_PART: &str = r#"("-"? ([0-9] | [1-9] [0-9]*))"#;
const NUMBER_FRACTION_PART: &str = r#"("." [0-9]+)? ([eE] [-+]? [0-9]+)?"#;

impl Terminal {
    /// Terminal for one literal value, dispatching on its JSON kind.
    pub fn for_literal(literal: &Value) -> Result<Self> {
        match literal {
            Value::Null => Ok(Terminal::Null),
            Value::Bool(b) => Ok(Terminal::BooleanLiteral(*b)),
            Value::Number(n) => Ok(Terminal::NumberLiteral(n.clone())),
            Value::String(s) => Ok(Terminal::StringLiteral(s.clone())),
            Value::Array(_) => Err(unrecognized("array", literal)),
            Value::Object(_) => Err(unrecognized("object", literal)),
        }
    }

    /// Rule name shared by every occurrence of this terminal, or `None` when
    /// the terminal renders inline.
    pub fn reserved_rule_name(&self) -> Option<String> {
        match self {
            Terminal::BooleanLiteral(_)
            | Terminal::NumberLiteral(_)
            | Terminal::StringLiteral(_)
            | Terminal::VerbatimText(_) => None,
            Terminal::Null => Some(reserved::NULL.to_string()),
            Terminal::Boolean => Some(reserved::BOOLEAN.to_string()),
            Terminal::Number { fractional: true } => Some(reserved::FRACTIONAL_NUMBER.to_string()),
            Terminal::Number { fractional: false } => Some(reserved::INTEGER_NUMBER.to_string()),
            Terminal::String(bounds) => Some(bounds.rule_name()),
            Terminal::FormatString(format) => Some(string::format_rule_name(*format)),
            Terminal::Whitespace(scope) => Some(whitespace::rule_name(scope)),
            Terminal::InStringChar => Some(reserved::STRING_CHAR.to_string()),
        }
    }

    pub fn is_inline(&self) -> bool {
        self.reserved_rule_name().is_none()
    }

    /// Grammar body of this terminal. Terminals built on other terminals
    /// (strings on the in-string character) reference them through `resolver`.
    pub fn grammar(&self, resolver: &mut impl ResolveTerminal) -> String {
        match self {
            Terminal::Null => quote_literal("null"),
            Terminal::BooleanLiteral(b) => quote_literal(if *b { "true" } else { "false" }),
            Terminal::Boolean => format!("{} | {}", quote_literal("true"), quote_literal("false")),
            Terminal::NumberLiteral(n) => quote_literal(&n.to_string()),
            Terminal::Number { fractional: false } => NUMBER_INTEGER_PART.to_string(),
            Terminal::Number { fractional: true } => {
                format!("{NUMBER_INTEGER_PART} {NUMBER_FRACTION_PART}")
            }
            Terminal::StringLiteral(s) => string::literal(s),
            Terminal::String(bounds) => {
                let char_rule = resolver.resolve_terminal(&Terminal::InStringChar);
                string::grammar(bounds, &char_rule)
            }
            Terminal::FormatString(format) => string::format_grammar(*format),
            Terminal::VerbatimText(text) => quote_literal(text),
            Terminal::Whitespace(scope) => whitespace::grammar(scope),
            Terminal::InStringChar => string::in_string_char(),
        }
    }
}

fn unrecognized(kind: &'static str, literal: &Value) -> GrammarError {
    GrammarError::UnrecognizedLiteralType { kind, literal: literal.to_string() }
}
