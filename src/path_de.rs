use serde::de::DeserializeOwned;

use crate::error::GrammarError;

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, GrammarError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(into_invalid_schema)
}

pub fn from_value_with_path<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, GrammarError> {
    serde_path_to_error::deserialize::<_, T>(value).map_err(into_invalid_schema)
}

fn into_invalid_schema<E: std::fmt::Display>(err: serde_path_to_error::Error<E>) -> GrammarError {
    let path = err.path().to_string();
    GrammarError::InvalidSchema { path, message: err.into_inner().to_string() }
}
