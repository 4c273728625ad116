//! Regular expressions through the `regex` crate.
//!
//! Offsets in match dicts are byte offsets into the UTF-8 text.

use ::regex::{Match, Regex};

use crate::collections::{dict, list};
use crate::value::{make_string, Value};

fn compile(pattern: &str) -> Result<Regex, String> {
    Regex::new(pattern).map_err(|e| format!("Invalid regex '{pattern}': {e}"))
}

fn match_dict(m: Match<'_>) -> Value {
    let d = dict::set(&dict::empty(), &make_string("match"), &make_string(m.as_str()));
    let d = dict::set(&d, &make_string("start"), &Value::Int(m.start() as i64));
    dict::set(&d, &make_string("end"), &Value::Int(m.end() as i64))
}

/// Compile `pattern` and apply `f` to the text.
pub(crate) fn with_strings(
    op: &str,
    text: &Value,
    pattern: &Value,
    f: fn(&str, &Regex) -> Value,
) -> Result<Value, String> {
    let (Some(text), Some(pattern)) = (text.as_str(), pattern.as_str()) else {
        return Err(format!("{op} expects strings"));
    };
    let re = compile(pattern)?;
    Ok(f(text, &re))
}

pub(crate) fn test(text: &str, re: &Regex) -> Value {
    Value::Bool(re.is_match(text))
}

pub(crate) fn first_match(text: &str, re: &Regex) -> Value {
    re.find(text).map_or(Value::Nil, match_dict)
}

pub(crate) fn all_matches(text: &str, re: &Regex) -> Value {
    list::from_values(re.find_iter(text).map(match_dict).collect())
}

pub(crate) fn split(text: &str, re: &Regex) -> Value {
    list::from_values(re.split(text).map(make_string).collect())
}

/// Replace up to `limit` matches; 0 replaces all of them. `$1`-style
/// group references in the replacement are expanded.
pub(crate) fn replace(
    op: &str,
    text: &Value,
    pattern: &Value,
    replacement: &Value,
    limit: usize,
) -> Result<Value, String> {
    let (Some(text), Some(pattern), Some(replacement)) =
        (text.as_str(), pattern.as_str(), replacement.as_str())
    else {
        return Err(format!("{op} expects strings"));
    };
    let re = compile(pattern)?;
    Ok(make_string(&re.replacen(text, limit, replacement)))
}
