//! Errors raised while turning a schema into a grammar.
//!
//! Every variant aborts the whole compilation: the generator never hands back
//! a partial grammar, since a grammar with holes would under-constrain decoding.

#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    /// A literal (`enum` member or `const`) that is not null/boolean/number/string.
    #[error("unrecognized literal type: {kind} ({literal})")]
    UnrecognizedLiteralType { kind: &'static str, literal: String },

    /// A `$ref` whose target is not visible from the reference site.
    #[error("unresolved reference: {reference}")]
    UnresolvedReference { reference: String },

    #[error("unsupported schema construct: {0}")]
    UnsupportedSchemaConstruct(String),

    /// The schema document does not have the shape of a JSON schema.
    #[error("invalid schema at JSON path {path}: {message}")]
    InvalidSchema { path: String, message: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl GrammarError {
    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedSchemaConstruct(message.into())
    }
}

pub type Result<T, E = GrammarError> = std::result::Result<T, E>;
