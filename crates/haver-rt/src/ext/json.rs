//! JSON encoding and decoding.
//!
//! Parsing goes through `serde_json` and converts the result into runtime
//! values: objects become dicts, arrays become lists, integers that fit
//! in an `i64` become ints and every other number becomes a float.
//!
//! Serialization is done here rather than through `serde_json`'s writer
//! because the layout is fixed: compact output separates items with
//! `", "` and keys with `": "`, and pretty output indents by two spaces.
//! Values with no JSON form (creels, functions, bytes, objects) are
//! written as their display string in quotes. NaN and infinities become
//! `null`.

use serde_json::Value as JsonValue;

use crate::collections::{dict, list};
use crate::value::{make_string, Value};

// ── Decoding ────────────────────────────────────────────────────────

/// Rewrite unknown escapes inside string literals (`\q`) to the bare
/// character so strict parsing accepts them.
fn relax_escapes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in input.chars() {
        if !in_string {
            in_string = ch == '"';
            out.push(ch);
            continue;
        }
        if escaped {
            if matches!(ch, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') {
                out.push('\\');
            }
            out.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => {
                in_string = false;
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    // A dangling backslash stays so the parser reports it.
    if escaped {
        out.push('\\');
    }
    out
}

fn from_json(value: &JsonValue) -> Result<Value, String> {
    Ok(match value {
        JsonValue::Null => Value::Nil,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if n.as_u64().is_some() {
                return Err("Integer out of range".to_string());
            } else {
                match n.as_f64() {
                    Some(f) => Value::Float(f),
                    None => return Err("Invalid number".to_string()),
                }
            }
        }
        JsonValue::String(s) => make_string(s),
        JsonValue::Array(items) => {
            let items = items.iter().map(from_json).collect::<Result<Vec<_>, _>>()?;
            list::from_values(items)
        }
        JsonValue::Object(map) => {
            let mut d = dict::empty();
            for (key, item) in map {
                d = dict::set(&d, &make_string(key), &from_json(item)?);
            }
            d
        }
    })
}

/// Parse `text` into a runtime value. Errors read `Invalid JSON: ...`.
pub fn parse(text: &str) -> Result<Value, String> {
    let parsed: JsonValue = serde_json::from_str(&relax_escapes(text))
        .map_err(|e| format!("Invalid JSON: {e}"))?;
    from_json(&parsed).map_err(|e| format!("Invalid JSON: {e}"))
}

// ── Encoding ────────────────────────────────────────────────────────

fn quote(s: &str) -> String {
    JsonValue::from(s).to_string()
}

fn write_value(out: &mut String, value: &Value, pretty: bool, indent: usize) {
    match value {
        Value::Nil => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Float(f) => match serde_json::Number::from_f64(*f) {
            Some(n) => out.push_str(&n.to_string()),
            None => out.push_str("null"),
        },
        Value::Str(s) => out.push_str(&quote(s)),
        Value::List(_) => {
            let items = list::items(value);
            write_seq(out, '[', ']', items.len(), pretty, indent, |out, i| {
                write_value(out, &items[i], pretty, indent + 1);
            });
        }
        Value::Dict(_) => {
            let entries = dict::entries(value);
            write_seq(out, '{', '}', entries.len(), pretty, indent, |out, i| {
                let (key, item) = &entries[i];
                let key = match key {
                    Value::Str(s) => quote(s),
                    other => quote(&other.to_string()),
                };
                out.push_str(&key);
                out.push_str(": ");
                write_value(out, item, pretty, indent + 1);
            });
        }
        other => out.push_str(&quote(&other.to_string())),
    }
}

fn write_seq(
    out: &mut String,
    open: char,
    close: char,
    len: usize,
    pretty: bool,
    indent: usize,
    mut item: impl FnMut(&mut String, usize),
) {
    out.push(open);
    if len == 0 {
        out.push(close);
        return;
    }
    for i in 0..len {
        if pretty {
            out.push_str(if i == 0 { "\n" } else { ",\n" });
            out.push_str(&"  ".repeat(indent + 1));
        } else if i > 0 {
            out.push_str(", ");
        }
        item(out, i);
    }
    if pretty {
        out.push('\n');
        out.push_str(&"  ".repeat(indent));
    }
    out.push(close);
}

/// Serialize `value`, compact or pretty.
pub fn stringify(value: &Value, pretty: bool) -> String {
    let mut out = String::new();
    write_value(&mut out, value, pretty, 0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext;
    use crate::hurl::protect;

    #[test]
    fn test_parse_object_and_array() {
        let v = parse(r#"{"name": "Nessie", "sightings": [1, 2.5, null, true]}"#).unwrap();
        assert_eq!(dict::get(&v, &make_string("name")).as_str(), Some("Nessie"));
        let s = dict::get(&v, &make_string("sightings"));
        assert_eq!(list::get(&s, 0), Value::Int(1));
        assert_eq!(list::get(&s, 1), Value::Float(2.5));
        assert!(list::get(&s, 2).is_nil());
        assert_eq!(list::get(&s, 3), Value::Bool(true));
    }

    #[test]
    fn test_unknown_escape_is_kept_literally() {
        let v = parse(r#""a\qb\n""#).unwrap();
        assert_eq!(v.as_str(), Some("aqb\n"));
    }

    #[test]
    fn test_integer_out_of_range() {
        assert_eq!(
            parse("18446744073709551615").unwrap_err(),
            "Invalid JSON: Integer out of range"
        );
        assert_eq!(parse("9223372036854775807").unwrap(), Value::Int(i64::MAX));
    }

    #[test]
    fn test_invalid_json_hurls() {
        let err = protect(|| ext::json_parse(&make_string("{oops"))).unwrap_err();
        assert!(err.as_str().unwrap().starts_with("Invalid JSON: "));
    }

    #[test]
    fn test_compact_layout() {
        let d = dict::set(&dict::empty(), &make_string("a"), &Value::Int(1));
        let d = dict::set(
            &d,
            &make_string("b"),
            &Value::from(vec![Value::Bool(false), Value::Nil]),
        );
        assert_eq!(stringify(&d, false), r#"{"a": 1, "b": [false, null]}"#);
        assert_eq!(stringify(&Value::Float(f64::NAN), false), "null");
        assert_eq!(stringify(&Value::Float(0.5), false), "0.5");
        assert_eq!(stringify(&make_string("say \"aye\"\n"), false), r#""say \"aye\"\n""#);
    }

    #[test]
    fn test_pretty_layout() {
        let d = dict::set(
            &dict::empty(),
            &make_string("list"),
            &Value::from(vec![Value::Int(1), Value::Int(2)]),
        );
        let d = dict::set(&d, &make_string("empty"), &Value::from(Vec::new()));
        let expected = "{\n  \"list\": [\n    1,\n    2\n  ],\n  \"empty\": []\n}";
        assert_eq!(stringify(&d, true), expected);
    }

    #[test]
    fn test_values_without_json_form_are_quoted() {
        let b = crate::collections::bytes::from_slice(b"abc");
        assert_eq!(stringify(&b, false), r#""bytes[3]""#);
        let c = crate::collections::set::make_creel(&Value::from(vec![make_string("x")]));
        assert_eq!(stringify(&c, false), r#""creel{\"x\"}""#);
    }

    #[test]
    fn test_object_keys_keep_document_order() {
        let text = r#"{"zebra": 1, "apple": 2, "mango": {"z": 0, "a": 1}}"#;
        let v = parse(text).unwrap();
        let keys: Vec<String> = list::items(&dict::keys(&v))
            .iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(keys, ["zebra", "apple", "mango"]);
        assert_eq!(stringify(&v, false), text);
    }

    #[test]
    fn test_round_trip_through_wrappers() {
        let text = make_string(r#"[1, "two", {"three": 3}]"#);
        let v = ext::json_parse(&text);
        assert_eq!(ext::json_stringify(&v).as_str(), text.as_str());
    }
}
