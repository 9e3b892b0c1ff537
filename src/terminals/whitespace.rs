use crate::gbnf::{alternation, repeated_literal, sequence};
use crate::scope::ScopeState;

use super::reserved;

/// Whitespace between JSON tokens.
///
/// With newlines allowed this is either a newline followed by the indentation
/// of the scope's depth (spaces or tabs), or at most one space. Without
/// newlines only the optional space remains.
pub fn grammar(scope: &ScopeState) -> String {
    if !scope.allow_new_lines() {
        return "[ ]?".to_string();
    }
    let depth = scope.nesting_depth;
    let indent = if depth == 0 {
        String::new()
    } else {
        alternation(&[
            repeated_literal(" ", depth * scope.pad_spaces()),
            repeated_literal("\t", depth),
        ])
    };
    format!("{} | [ ]?", sequence(&[r"[\n]", indent.as_str()]))
}

pub fn rule_name(scope: &ScopeState) -> String {
    if !scope.allow_new_lines() {
        return reserved::WHITESPACE_NO_NEW_LINES.to_string();
    }
    reserved::whitespace(scope.nesting_depth, scope.pad_spaces())
}
