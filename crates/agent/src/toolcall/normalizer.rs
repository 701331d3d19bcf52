//! Repair of malformed tool-call argument strings.
//!
//! Models regularly emit arguments that are not the JSON object the tool
//! schema asks for: double-escaped JSON, stray `null` tokens, or bare
//! comma-separated values. [`normalize`] turns these into JSON the tool can
//! deserialize. Well-formed objects and arrays pass through untouched.

use serde_json::Value;
use tracing::{debug, warn};

/// Normalize a raw argument string into a JSON object or array string.
///
/// 1. Empty input becomes `{}`.
/// 2. `null` tokens glued to the front or back of the payload are removed.
/// 3. A quote-wrapped payload is unescaped one level.
/// 4. Otherwise escaped quotes are unescaped if that yields `{...}`/`[...]`.
/// 5. Objects and arrays are returned as they are; anything else is read as
///    a comma-delimited argument list and wrapped into a JSON array.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "{}".to_string();
    }
    if is_structured_json(trimmed) {
        return raw.to_string();
    }
    debug!(raw, "Tool arguments are not a JSON object, repairing");

    let text = strip_null_suffix(&strip_null_prefix(trimmed));
    let text = unescape_double_escaped(&text);

    if text.starts_with('{') || text.starts_with('[') {
        return text;
    }
    let array = comma_delimited_to_array(&text);
    warn!(raw, repaired = %array, "Converted tool arguments to a positional array");
    array
}

fn is_structured_json(text: &str) -> bool {
    matches!(
        serde_json::from_str::<Value>(text),
        Ok(Value::Object(_)) | Ok(Value::Array(_))
    )
}

fn looks_structured(text: &str) -> bool {
    (text.starts_with('{') && text.ends_with('}')) || (text.starts_with('[') && text.ends_with(']'))
}

fn is_quote_wrapped(text: &str) -> bool {
    text.len() > 2 && text.starts_with('"') && text.ends_with('"')
}

fn strip_null_prefix(text: &str) -> String {
    let mut rest = text;
    while let Some(stripped) = rest.strip_prefix("null") {
        rest = stripped.trim_start();
    }
    if rest.len() != text.len() && (rest.starts_with('{') || rest.starts_with('[') || is_quote_wrapped(rest)) {
        return rest.to_string();
    }
    text.to_string()
}

fn strip_null_suffix(text: &str) -> String {
    let mut rest = text;
    while let Some(stripped) = rest.strip_suffix("null") {
        rest = stripped.trim_end();
    }
    if rest.len() != text.len() && (looks_structured(rest) || is_quote_wrapped(rest)) {
        return rest.to_string();
    }
    text.to_string()
}

fn unescape_double_escaped(text: &str) -> String {
    if is_quote_wrapped(text) {
        let inner = text[1..text.len() - 1].replace("\\\"", "\"").replace("\\\\", "\\");
        if looks_structured(&inner) {
            return inner;
        }
    }
    if text.contains("\\\"") && !text.starts_with('"') {
        let unescaped = text.replace("\\\"", "\"");
        if looks_structured(&unescaped) {
            return unescaped;
        }
    }
    text.to_string()
}

/// Split on top-level commas and emit one JSON value per token.
///
/// Tokens that already parse as JSON scalars (`1`, `true`, `"a"`) are kept;
/// single-quoted and bare tokens become JSON strings.
fn comma_delimited_to_array(text: &str) -> String {
    let values: Vec<Value> = split_top_level(text).iter().map(|t| token_to_value(t)).collect();
    Value::Array(values).to_string()
}

fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in text.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                current.push(c);
                escaped = true;
            }
            '"' | '\'' => {
                match quote {
                    None => quote = Some(c),
                    Some(q) if q == c => quote = None,
                    Some(_) => {}
                }
                current.push(c);
            }
            ',' if quote.is_none() => {
                push_token(&mut parts, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_token(&mut parts, &current);
    parts
}

fn push_token(parts: &mut Vec<String>, token: &str) {
    let token = token.trim();
    if !token.is_empty() {
        parts.push(token.to_string());
    }
}

fn token_to_value(token: &str) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(token) {
        return value;
    }
    if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
        let inner = &token[1..token.len() - 1];
        return Value::String(inner.replace("\\'", "'"));
    }
    Value::String(token.to_string())
}
