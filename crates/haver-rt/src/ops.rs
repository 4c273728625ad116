//! Arithmetic, comparison and conversion on [`Value`]s.
//!
//! Integer arithmetic wraps on overflow. Any float operand promotes the
//! whole operation to float. Type mismatches, division by zero and
//! modulo by zero are fatal; failed string-to-number conversions hurl.

use crate::error::{raise, NumberKind, RuntimeError};
use crate::panic::{fatal, type_error};
use crate::value::{make_string, Value};

#[derive(Clone, Copy)]
enum Numeric {
    Int(i64, i64),
    Float(f64, f64),
}

/// Classify a pair of operands for arithmetic, promoting to float when
/// either side is a float. `None` when either side is not a number.
fn numeric_pair(a: &Value, b: &Value) -> Option<Numeric> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(Numeric::Int(*x, *y)),
        (Value::Int(x), Value::Float(y)) => Some(Numeric::Float(*x as f64, *y)),
        (Value::Float(x), Value::Int(y)) => Some(Numeric::Float(*x, *y as f64)),
        (Value::Float(x), Value::Float(y)) => Some(Numeric::Float(*x, *y)),
        _ => None,
    }
}

pub fn add(a: &Value, b: &Value) -> Value {
    if let (Value::Str(x), Value::Str(y)) = (a, b) {
        let mut joined = String::with_capacity(x.len() + y.len());
        joined.push_str(x);
        joined.push_str(y);
        return make_string(&joined);
    }
    match numeric_pair(a, b) {
        Some(Numeric::Int(x, y)) => Value::Int(x.wrapping_add(y)),
        Some(Numeric::Float(x, y)) => Value::Float(x + y),
        None => type_error("add", a, Some(b)),
    }
}

pub fn sub(a: &Value, b: &Value) -> Value {
    match numeric_pair(a, b) {
        Some(Numeric::Int(x, y)) => Value::Int(x.wrapping_sub(y)),
        Some(Numeric::Float(x, y)) => Value::Float(x - y),
        None => type_error("subtract", a, Some(b)),
    }
}

pub fn mul(a: &Value, b: &Value) -> Value {
    if let (Value::Str(s), Value::Int(n)) = (a, b) {
        let count = usize::try_from(*n).unwrap_or(0);
        return make_string(&s.repeat(count));
    }
    match numeric_pair(a, b) {
        Some(Numeric::Int(x, y)) => Value::Int(x.wrapping_mul(y)),
        Some(Numeric::Float(x, y)) => Value::Float(x * y),
        None => type_error("multiply", a, Some(b)),
    }
}

pub fn div(a: &Value, b: &Value) -> Value {
    match numeric_pair(a, b) {
        Some(Numeric::Int(_, 0)) => fatal(&RuntimeError::DivisionByZero),
        Some(Numeric::Int(x, y)) => Value::Int(x.wrapping_div(y)),
        Some(Numeric::Float(_, y)) if y == 0.0 => fatal(&RuntimeError::DivisionByZero),
        Some(Numeric::Float(x, y)) => Value::Float(x / y),
        None => type_error("divide", a, Some(b)),
    }
}

/// Remainder with the sign of the dividend. Float remainder follows
/// `fmod` and is not checked for a zero divisor.
pub fn modulo(a: &Value, b: &Value) -> Value {
    match numeric_pair(a, b) {
        Some(Numeric::Int(_, 0)) => fatal(&RuntimeError::ModuloByZero),
        Some(Numeric::Int(x, y)) => Value::Int(x.wrapping_rem(y)),
        Some(Numeric::Float(x, y)) => Value::Float(x % y),
        None => type_error("modulo", a, Some(b)),
    }
}

pub fn neg(a: &Value) -> Value {
    match a {
        Value::Int(n) => Value::Int(n.wrapping_neg()),
        Value::Float(f) => Value::Float(-f),
        other => type_error("negate", other, None),
    }
}

// ── Comparison ──────────────────────────────────────────────────────

/// Language equality as a plain `bool`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if let Some(pair) = numeric_pair(a, b) {
        return match pair {
            Numeric::Int(x, y) => x == y,
            Numeric::Float(x, y) => x == y,
        };
    }
    match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Range(x), Value::Range(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            if std::sync::Arc::ptr_eq(x, y) {
                return true;
            }
            let left = x.lock().clone();
            let right = y.lock().clone();
            left.len() == right.len()
                && left.iter().zip(right.iter()).all(|(l, r)| values_equal(l, r))
        }
        (Value::Bytes(x), Value::Bytes(y)) => {
            if std::sync::Arc::ptr_eq(x, y) {
                return true;
            }
            let left = x.lock().clone();
            let right = y.lock();
            left == *right
        }
        _ => crate::value::same_object(a, b),
    }
}

pub fn eq(a: &Value, b: &Value) -> Value {
    Value::Bool(values_equal(a, b))
}

pub fn ne(a: &Value, b: &Value) -> Value {
    Value::Bool(!values_equal(a, b))
}

fn less_than(a: &Value, b: &Value) -> bool {
    if let (Value::Str(x), Value::Str(y)) = (a, b) {
        return x.as_bytes() < y.as_bytes();
    }
    match numeric_pair(a, b) {
        Some(Numeric::Int(x, y)) => x < y,
        Some(Numeric::Float(x, y)) => x < y,
        None => type_error("compare", a, Some(b)),
    }
}

pub fn lt(a: &Value, b: &Value) -> Value {
    Value::Bool(less_than(a, b))
}

pub fn le(a: &Value, b: &Value) -> Value {
    Value::Bool(less_than(a, b) || values_equal(a, b))
}

pub fn gt(a: &Value, b: &Value) -> Value {
    Value::Bool(!(less_than(a, b) || values_equal(a, b)))
}

pub fn ge(a: &Value, b: &Value) -> Value {
    Value::Bool(!less_than(a, b))
}

// ── Conversion ──────────────────────────────────────────────────────

pub fn to_string(v: &Value) -> Value {
    match v {
        Value::Str(_) => v.clone(),
        other => make_string(&other.to_string()),
    }
}

pub fn to_int(v: &Value) -> Value {
    match v {
        Value::Int(_) => v.clone(),
        Value::Float(f) => Value::Int(*f as i64),
        Value::Bool(b) => Value::Int(i64::from(*b)),
        Value::Str(s) => match parse_int(s) {
            Some(n) => Value::Int(n),
            None => raise(RuntimeError::Conversion {
                text: s.to_string(),
                target: NumberKind::Integer,
            }),
        },
        other => raise(RuntimeError::Unconvertible {
            type_name: other.type_name(),
            target: NumberKind::Integer,
        }),
    }
}

pub fn to_float(v: &Value) -> Value {
    match v {
        Value::Float(_) => v.clone(),
        Value::Int(n) => Value::Float(*n as f64),
        Value::Str(s) => match parse_float(s) {
            Some(f) => Value::Float(f),
            None => raise(RuntimeError::Conversion {
                text: s.to_string(),
                target: NumberKind::Float,
            }),
        },
        other => raise(RuntimeError::Unconvertible {
            type_name: other.type_name(),
            target: NumberKind::Float,
        }),
    }
}

/// Whole-string decimal integer. Leading whitespace, trailing garbage
/// and out-of-range values are all rejected.
fn parse_int(s: &str) -> Option<i64> {
    if s.starts_with(char::is_whitespace) {
        return None;
    }
    s.parse::<i64>().ok()
}

/// Whole-string float. An overflow to infinity only counts when the text
/// actually spells an infinity.
fn parse_float(s: &str) -> Option<f64> {
    if s.starts_with(char::is_whitespace) {
        return None;
    }
    let f = s.parse::<f64>().ok()?;
    if f.is_infinite() {
        let lower = s.trim_start_matches(['+', '-']).to_ascii_lowercase();
        if lower != "inf" && lower != "infinity" {
            return None;
        }
    }
    Some(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hurl::protect;
    use crate::value::make_list;

    fn s(text: &str) -> Value {
        make_string(text)
    }

    #[test]
    fn integer_arithmetic() {
        assert_eq!(add(&Value::Int(2), &Value::Int(3)), Value::Int(5));
        assert_eq!(sub(&Value::Int(2), &Value::Int(3)), Value::Int(-1));
        assert_eq!(mul(&Value::Int(4), &Value::Int(3)), Value::Int(12));
        assert_eq!(div(&Value::Int(7), &Value::Int(2)), Value::Int(3));
        assert_eq!(div(&Value::Int(-7), &Value::Int(2)), Value::Int(-3));
        assert_eq!(modulo(&Value::Int(-7), &Value::Int(3)), Value::Int(-1));
        assert_eq!(neg(&Value::Int(9)), Value::Int(-9));
    }

    #[test]
    fn integer_overflow_wraps() {
        assert_eq!(add(&Value::Int(i64::MAX), &Value::Int(1)), Value::Int(i64::MIN));
        assert_eq!(div(&Value::Int(i64::MIN), &Value::Int(-1)), Value::Int(i64::MIN));
        assert_eq!(modulo(&Value::Int(i64::MIN), &Value::Int(-1)), Value::Int(0));
    }

    #[test]
    fn float_promotion() {
        match add(&Value::Int(1), &Value::Float(0.5)) {
            Value::Float(f) => assert_eq!(f, 1.5),
            other => panic!("expected float, got {other:?}"),
        }
        match div(&Value::Float(1.0), &Value::Int(4)) {
            Value::Float(f) => assert_eq!(f, 0.25),
            other => panic!("expected float, got {other:?}"),
        }
        match modulo(&Value::Float(7.5), &Value::Int(2)) {
            Value::Float(f) => assert_eq!(f, 1.5),
            other => panic!("expected float, got {other:?}"),
        }
        match modulo(&Value::Float(1.0), &Value::Float(0.0)) {
            Value::Float(f) => assert!(f.is_nan()),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn string_concat_and_repeat() {
        assert_eq!(add(&s("och"), &s(" aye")).as_str(), Some("och aye"));
        assert_eq!(mul(&s("ab"), &Value::Int(3)).as_str(), Some("ababab"));
        assert_eq!(mul(&s("ab"), &Value::Int(0)).as_str(), Some(""));
        assert_eq!(mul(&s("ab"), &Value::Int(-2)).as_str(), Some(""));
    }

    #[test]
    fn equality_rules() {
        assert!(values_equal(&Value::Int(1), &Value::Float(1.0)));
        assert!(!values_equal(&Value::Int(1), &s("1")));
        assert!(!values_equal(&Value::Nil, &Value::Bool(false)));
        assert!(values_equal(&s("a"), &s("a")));

        let a = Value::from(vec![Value::Int(1), s("x")]);
        let b = Value::from(vec![Value::Float(1.0), s("x")]);
        let c = Value::from(vec![Value::Int(1)]);
        assert!(values_equal(&a, &b));
        assert!(!values_equal(&a, &c));

        let d1 = crate::collections::dict::empty();
        let d2 = crate::collections::dict::empty();
        assert!(values_equal(&d1, &d1.clone()));
        assert!(!values_equal(&d1, &d2));

        let b1 = crate::collections::bytes::from_string(&s("hi"));
        let b2 = crate::collections::bytes::from_string(&s("hi"));
        assert!(values_equal(&b1, &b2));
        assert_eq!(ne(&b1, &b2), Value::Bool(false));
    }

    #[test]
    fn self_containing_list_equals_itself() {
        let l = make_list(0);
        crate::collections::list::push(&l, &l);
        assert!(values_equal(&l, &l));
    }

    #[test]
    fn ordering_rules() {
        assert_eq!(lt(&Value::Int(1), &Value::Float(1.5)), Value::Bool(true));
        assert_eq!(le(&Value::Int(2), &Value::Int(2)), Value::Bool(true));
        assert_eq!(gt(&Value::Int(2), &Value::Int(2)), Value::Bool(false));
        assert_eq!(ge(&Value::Int(2), &Value::Int(2)), Value::Bool(true));
        assert_eq!(lt(&s("apple"), &s("banana")), Value::Bool(true));
        assert_eq!(gt(&s("b"), &s("a")), Value::Bool(true));
    }

    #[test]
    fn to_int_conversions() {
        assert_eq!(to_int(&s("42")), Value::Int(42));
        assert_eq!(to_int(&s("-7")), Value::Int(-7));
        assert_eq!(to_int(&Value::Float(3.9)), Value::Int(3));
        assert_eq!(to_int(&Value::Float(-3.9)), Value::Int(-3));
        assert_eq!(to_int(&Value::Bool(true)), Value::Int(1));
    }

    #[test]
    fn to_int_rejects_partial_input() {
        for bad in [" 12", "12abc", "", "1.5"] {
            let err = protect(|| to_int(&s(bad))).expect_err(bad);
            assert_eq!(
                err.as_str().map(str::to_owned),
                Some(format!("Cannae turn '{bad}' intae an integer"))
            );
        }
        let err = protect(|| to_int(&make_list(0))).unwrap_err();
        assert_eq!(err.as_str(), Some("Cannae turn list intae an integer"));
    }

    #[test]
    fn to_float_conversions() {
        assert_eq!(to_float(&s("2.5")), Value::Float(2.5));
        assert_eq!(to_float(&s("1e3")), Value::Float(1000.0));
        assert_eq!(to_float(&Value::Int(2)), Value::Float(2.0));
        match to_float(&s("inf")) {
            Value::Float(f) => assert!(f.is_infinite()),
            other => panic!("expected float, got {other:?}"),
        }
        let err = protect(|| to_float(&s("1e999"))).unwrap_err();
        assert_eq!(err.as_str(), Some("Cannae turn '1e999' intae a float"));
        let err = protect(|| to_float(&s("2.5x"))).unwrap_err();
        assert_eq!(err.as_str(), Some("Cannae turn '2.5x' intae a float"));
        let err = protect(|| to_float(&Value::Bool(true))).unwrap_err();
        assert_eq!(err.as_str(), Some("Cannae turn bool intae a float"));
    }

    #[test]
    fn to_string_of_values() {
        assert_eq!(to_string(&Value::Int(5)).as_str(), Some("5"));
        assert_eq!(to_string(&Value::Float(0.5)).as_str(), Some("0.5"));
        assert_eq!(to_string(&s("same")).as_str(), Some("same"));
    }
}
