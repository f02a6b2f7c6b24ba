//! `{key}` placeholder rendering
//!
//! A single left-to-right pass: each `{...}` span is looked up once and
//! substituted values are never re-scanned, so a value containing `{other}`
//! stays literal.

use serde_json::{Map, Value};

/// Renders `template` against `variables`
///
/// Strings render raw; other values render as compact JSON. Unbound keys and
/// an unclosed `{` are kept as literal text.
pub fn render(template: &str, variables: &Map<String, Value>) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut cursor = template;

    while let Some(start) = cursor.find('{') {
        rendered.push_str(&cursor[..start]);
        let after_open = &cursor[start + 1..];

        let Some(close) = after_open.find('}') else {
            rendered.push_str(&cursor[start..]);
            return rendered;
        };

        let key = &after_open[..close];
        // A nested `{` means this brace is literal; resume at the inner one
        if let Some(inner) = key.rfind('{') {
            rendered.push('{');
            rendered.push_str(&key[..inner]);
            cursor = &after_open[inner..];
            continue;
        }

        match variables.get(key) {
            Some(value) => rendered.push_str(&value_to_text(value)),
            None => {
                rendered.push('{');
                rendered.push_str(key);
                rendered.push('}');
            }
        }
        cursor = &after_open[close + 1..];
    }

    rendered.push_str(cursor);
    rendered
}

/// String form of a variable value
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_substitutes_bound_keys() {
        let v = vars(json!({"topic": "rust", "n": 3, "ok": true}));
        assert_eq!(render("Ask: {topic}", &v), "Ask: rust");
        assert_eq!(render("{n} items, ok={ok}", &v), "3 items, ok=true");
        assert_eq!(render("{topic}{topic}", &v), "rustrust");
    }

    #[test]
    fn test_unbound_keys_stay_literal() {
        let v = vars(json!({"topic": "rust"}));
        assert_eq!(render("{missing} and {topic}", &v), "{missing} and rust");
        assert_eq!(render("{}", &v), "{}");
    }

    #[test]
    fn test_no_placeholders_is_identity() {
        let v = vars(json!({"a": "x"}));
        for text in ["", "plain text", "json: {\"a\": 1}", "trailing {", "}{"] {
            assert_eq!(render(text, &v), text);
        }
    }

    #[test]
    fn test_single_pass_does_not_resubstitute() {
        let v = vars(json!({"a": "{b}", "b": "boom"}));
        assert_eq!(render("{a}", &v), "{b}");
    }

    #[test]
    fn test_nested_open_brace() {
        let v = vars(json!({"topic": "rust"}));
        assert_eq!(render("{{topic}", &v), "{rust");
        assert_eq!(render("{x {topic}", &v), "{x rust");
    }

    #[test]
    fn test_structured_values_render_as_json() {
        let v = vars(json!({"list": [1, 2], "map": {"k": "v"}}));
        assert_eq!(render("{list}", &v), "[1,2]");
        assert_eq!(render("{map}", &v), r#"{"k":"v"}"#);
    }
}
