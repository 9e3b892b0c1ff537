use serde_json::Value;

use crate::gbnf::{quote_literal, repetition, sequence};
use crate::schema::StringFormat;

/// Length bounds of a generic string, in characters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StringBounds {
    pub min_length: u32,
    pub max_length: Option<u32>,
}

impl StringBounds {
    pub const UNBOUNDED: Self = Self { min_length: 0, max_length: None };

    pub fn is_unbounded(&self) -> bool {
        *self == Self::UNBOUNDED
    }

    pub fn rule_name(&self) -> String {
        match (self.min_length, self.max_length) {
            (0, None) => super::reserved::STRING.to_string(),
            (min, None) => format!("string-{min}-plus-rule"),
            (min, Some(max)) => format!("string-{min}-{max}-rule"),
        }
    }
}

/// Any character allowed between the quotes of a JSON string: everything but
/// the quote, the backslash, DEL and C0 controls, or one of the escapes.
pub fn in_string_char() -> String {
    [
        r#"[^"\\\x7F\x00-\x1F]"#,
        r#""\\" ["\\/bfnrt]"#,
        r#""\\u" [0-9a-fA-F]{4}"#,
    ]
    .join(" | ")
}

pub fn grammar(bounds: &StringBounds, char_rule: &str) -> String {
    let quote = quote_literal("\"");
    if bounds.is_unbounded() {
        let chars = format!("{char_rule}*");
        return sequence(&[quote.as_str(), chars.as_str(), quote.as_str()]);
    }
    if bounds.max_length == Some(0) {
        return quote_literal("\"\"");
    }
    let chars = repetition(char_rule, None, bounds.min_length, bounds.max_length);
    sequence(&[quote.as_str(), chars.as_str(), quote.as_str()])
}

/// The exact JSON encoding of `value`, as a grammar literal.
pub fn literal(value: &str) -> String {
    quote_literal(&Value::from(value).to_string())
}

pub fn format_rule_name(format: StringFormat) -> String {
    format!("format-string-{}-rule", format.as_str())
}

pub fn format_grammar(format: StringFormat) -> String {
    let quote = quote_literal("\"");
    let inner = match format {
        StringFormat::Date => date_grammar(),
        StringFormat::Time => time_grammar(),
        StringFormat::DateTime => sequence(&[date_grammar(), quote_literal("T"), time_grammar()]),
    };
    sequence(&[quote.clone(), inner, quote])
}

fn or(values: &[&str]) -> String {
    format!("( {} )", values.join(" | "))
}

fn date_grammar() -> String {
    sequence(&[
        "[0-9]{4}",
        r#""-""#,
        or(&[r#""0" [1-9]"#, r#""1" [012]"#]).as_str(),
        r#""-""#,
        or(&[r#""0" [1-9]"#, "[12] [0-9]", r#""3" [01]"#]).as_str(),
    ])
}

fn time_grammar() -> String {
    let hours = or(&["[01] [0-9]", r#""2" [0-3]"#]);
    let offset = sequence(&[or(&[r#""+""#, r#""-""#]), hours.clone(), r#"":""#.into(), "[0-5] [0-9]".into()]);
    sequence(&[
        hours.as_str(),
        r#"":""#,
        "[0-5] [0-9]",
        r#"":""#,
        "[0-5] [0-9]",
        r#"( "." [0-9]{3} )?"#,
        or(&[r#""Z""#, offset.as_str()]).as_str(),
    ])
}
