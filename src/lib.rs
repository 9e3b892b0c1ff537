//! Compile a JSON Schema into a GBNF grammar that constrains a language model
//! to emit exactly the JSON documents the schema describes.
//!
//! ```no_run
//! use json_gbnf::{GrammarOptions, JsonSchemaGrammar};
//!
//! let grammar = JsonSchemaGrammar::from_json_str(
//!     r#"{"type": "object", "properties": {"name": {"type": "string"}}}"#,
//!     GrammarOptions::default(),
//! )?;
//! println!("{}", grammar.grammar());
//! let value = grammar.parse(r#"{"name": "Ada"}"#)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
pub mod defs;
pub mod error;
pub mod gbnf;
pub mod generator;
pub mod ir;
pub mod lower;
pub mod path_de;
pub mod schema;
pub mod scope;
pub mod terminals;
pub mod validate;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use error::{GrammarError, Result};
pub use generator::GrammarGenerator;
pub use schema::{JsonSchema, SchemaMap};
pub use scope::{ScopeSettings, ScopeState};
pub use validate::ValidationError;

/// Knobs for one compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GrammarOptions {
    /// Let whitespace between tokens contain newlines and indentation.
    pub allow_new_lines: bool,
    /// Spaces per nesting level when indenting with spaces.
    pub scope_pad_spaces: u32,
    /// Newlines the root may be followed by.
    pub trailing_new_lines: usize,
}

impl Default for GrammarOptions {
    fn default() -> Self {
        Self { allow_new_lines: true, scope_pad_spaces: 4, trailing_new_lines: 4 }
    }
}

impl GrammarOptions {
    pub fn scope(&self) -> ScopeState {
        ScopeState::new(ScopeSettings {
            allow_new_lines: self.allow_new_lines,
            scope_pad_spaces: self.scope_pad_spaces,
        })
    }
}

/// GBNF text for `schema`, root rule first.
pub fn grammar_for_schema(schema: &JsonSchema, options: &GrammarOptions) -> Result<String> {
    grammar_for_schema_with_defs(schema, None, options)
}

/// Like [`grammar_for_schema`], with `defs` visible to every `$ref` in the
/// schema below its own `$defs`.
pub fn grammar_for_schema_with_defs(
    schema: &JsonSchema,
    defs: Option<&SchemaMap>,
    options: &GrammarOptions,
) -> Result<String> {
    let lowered = lower::lower_schema(schema, defs, options.scope())?;
    let mut generator = GrammarGenerator::new(&lowered.arena);
    generator.emit(lowered.root)?;
    tracing::debug!(rules = generator.rule_count(), "compiled schema");
    Ok(generator.into_string(options.trailing_new_lines))
}

/// A schema together with its compiled grammar. Output generated under the
/// grammar can be turned back into a checked JSON value with [`parse`].
///
/// [`parse`]: JsonSchemaGrammar::parse
#[derive(Debug, Clone)]
pub struct JsonSchemaGrammar {
    schema: JsonSchema,
    defs: Option<SchemaMap>,
    options: GrammarOptions,
    grammar: String,
}

impl JsonSchemaGrammar {
    pub fn new(schema: JsonSchema, options: GrammarOptions) -> Result<Self> {
        Self::with_defs(schema, None, options)
    }

    pub fn with_defs(schema: JsonSchema, defs: Option<SchemaMap>, options: GrammarOptions) -> Result<Self> {
        let grammar = grammar_for_schema_with_defs(&schema, defs.as_ref(), &options)?;
        Ok(Self { schema, defs, options, grammar })
    }

    pub fn from_json_str(src: &str, options: GrammarOptions) -> Result<Self> {
        Self::new(JsonSchema::from_json_str(src)?, options)
    }

    pub fn grammar(&self) -> &str {
        &self.grammar
    }

    pub fn schema(&self) -> &JsonSchema {
        &self.schema
    }

    pub fn options(&self) -> &GrammarOptions {
        &self.options
    }

    /// Parse model output and check it against the schema.
    pub fn parse(&self, text: &str) -> std::result::Result<Value, ValidationError> {
        let value: Value = serde_json::from_str(text).map_err(|err| ValidationError {
            path: validate::ROOT_PATH.to_string(),
            message: format!("invalid JSON: {err}"),
        })?;
        validate::validate_with_defs(&value, &self.schema, self.defs.as_ref())?;
        Ok(value)
    }
}
