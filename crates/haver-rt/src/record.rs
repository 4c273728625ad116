//! Result records: `{ok: aye, value}` or `{ok: nae, error, code}`.
//!
//! Socket, DNS and TLS entry points report ordinary failures this way
//! instead of hurling.

use std::io;

use crate::collections::dict;
use crate::value::{make_string, Value};

pub fn ok(value: Value) -> Value {
    let d = dict::set(&dict::empty(), &make_string("ok"), &Value::Bool(true));
    dict::set(&d, &make_string("value"), &value)
}

pub fn err(message: &str, code: i64) -> Value {
    let d = dict::set(&dict::empty(), &make_string("ok"), &Value::Bool(false));
    let d = dict::set(&d, &make_string("error"), &make_string(message));
    dict::set(&d, &make_string("code"), &Value::Int(code))
}

/// Record for a failed OS call: `"<op> failed: <reason>"` with the errno
/// as code (-1 when the error did not come from the OS).
pub fn os_err(op: &str, error: &io::Error) -> Value {
    let code = error.raw_os_error().map_or(-1, i64::from);
    let reason = match error.raw_os_error() {
        Some(errno) => strerror(errno),
        None => error.to_string(),
    };
    err(&format!("{op} failed: {reason}"), code)
}

/// The C library's description of `errno`, without Rust's
/// "(os error N)" suffix.
fn strerror(errno: i32) -> String {
    let text = unsafe { libc::strerror(errno) };
    if text.is_null() {
        return "unknown error".to_string();
    }
    unsafe { std::ffi::CStr::from_ptr(text) }
        .to_string_lossy()
        .into_owned()
}

pub fn from_io(op: &str, result: io::Result<Value>) -> Value {
    match result {
        Ok(value) => ok(value),
        Err(e) => os_err(op, &e),
    }
}

pub fn is_ok(record: &Value) -> bool {
    matches!(
        dict::get_default(record, &make_string("ok"), &Value::Nil),
        Value::Bool(true)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_record() {
        let r = ok(Value::Int(3));
        assert!(is_ok(&r));
        assert_eq!(dict::get(&r, &make_string("value")), Value::Int(3));
        assert!(!dict::contains(&r, &make_string("error")));
    }

    #[test]
    fn test_err_record() {
        let r = err("nae luck", -1);
        assert!(!is_ok(&r));
        assert_eq!(dict::get(&r, &make_string("error")).as_str(), Some("nae luck"));
        assert_eq!(dict::get(&r, &make_string("code")), Value::Int(-1));
    }

    #[test]
    fn test_os_err_uses_errno() {
        let e = io::Error::from_raw_os_error(libc::ECONNREFUSED);
        let r = os_err("socket_connect", &e);
        assert_eq!(
            dict::get(&r, &make_string("code")),
            Value::Int(i64::from(libc::ECONNREFUSED))
        );
        let msg = dict::get(&r, &make_string("error"));
        let msg = msg.as_str().unwrap();
        assert!(msg.starts_with("socket_connect failed: "));
        assert!(!msg.contains("os error"));
    }
}
