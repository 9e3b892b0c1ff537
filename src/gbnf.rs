//! Text-level GBNF combinators shared by terminals and composite nodes.

/// A production that matches only the empty string.
pub const NO_VALUE: &str = r#""""#;

/// Quote `text` as a GBNF string literal.
///
/// Backslashes are escaped first so that the escapes introduced for quotes and
/// control characters are not escaped a second time.
pub fn quote_literal(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\t', "\\t")
        .replace('\r', "\\r")
        .replace('\n', "\\n");
    format!("\"{escaped}\"")
}

/// Join parts with single spaces. Parts that match only the empty string are
/// dropped.
pub fn sequence<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(AsRef::as_ref)
        .filter(|p| !p.is_empty() && *p != NO_VALUE)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Alternatives that contribute to an alternation, first occurrence kept.
pub fn distinct_alternatives<S: AsRef<str>>(alternatives: &[S]) -> Vec<&str> {
    let mut alts: Vec<&str> = Vec::with_capacity(alternatives.len());
    for alt in alternatives.iter().map(AsRef::as_ref) {
        if !alt.is_empty() && alt != NO_VALUE && !alts.contains(&alt) {
            alts.push(alt);
        }
    }
    alts
}

/// `( a | b | ... )` over the distinct alternatives. A single surviving
/// alternative is returned as-is.
pub fn alternation<S: AsRef<str>>(alternatives: &[S]) -> String {
    let alts = distinct_alternatives(alternatives);
    match alts.len() {
        0 => NO_VALUE.to_string(),
        1 => alts[0].to_string(),
        _ => format!("( {} )", alts.join(" | ")),
    }
}

/// Literal `text` repeated `count` times, in whichever spelling is shorter.
pub fn repeated_literal(text: &str, count: u32) -> String {
    let spelled = quote_literal(&text.repeat(count as usize));
    if count <= 1 {
        return spelled;
    }
    let counted = format!("{}{{{count}}}", quote_literal(text));
    if counted.len() < spelled.len() { counted } else { spelled }
}

/// `value` repeated between `min` and `max` times (unbounded when `max` is
/// `None`), with `separator` between consecutive occurrences.
pub fn repetition(value: &str, separator: Option<&str>, min: u32, max: Option<u32>) -> String {
    let max = max.map(|m| m.max(min));
    if max == Some(0) {
        return NO_VALUE.to_string();
    }

    let group = |suffix: &str| format!("( {value} ){suffix}");
    let tail = |sep: &str, suffix: &str| sequence(&[value, format!("( {sep} {value} ){suffix}").as_str()]);

    match (min, max, separator) {
        (0, Some(1), _) => group("?"),
        (1, Some(1), _) => value.to_string(),
        (n, Some(m), None) if n == m => group(&format!("{{{n}}}")),
        (2, Some(2), Some(sep)) => sequence(&[value, sep, value]),
        (n, Some(m), Some(sep)) if n == m => tail(sep, &format!("{{{}}}", n - 1)),
        (0, None, None) => group("*"),
        (0, None, Some(sep)) => format!("( {} )?", tail(sep, "*")),
        (1, None, None) => group("+"),
        (1, None, Some(sep)) => tail(sep, "*"),
        (n, None, None) => group(&format!("{{{n},}}")),
        (n, None, Some(sep)) => tail(sep, &format!("{{{},}}", n - 1)),
        (n, Some(m), None) => group(&format!("{{{n},{m}}}")),
        (0, Some(2), Some(sep)) => format!("( {} )?", tail(sep, "?")),
        (0, Some(m), Some(sep)) => format!("( {} )?", tail(sep, &format!("{{0,{}}}", m - 1))),
        (1, Some(2), Some(sep)) => tail(sep, "?"),
        (1, Some(m), Some(sep)) => tail(sep, &format!("{{0,{}}}", m - 1)),
        (n, Some(m), Some(sep)) => tail(sep, &format!("{{{},{}}}", n - 1, m - 1)),
    }
}
