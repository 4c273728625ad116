//! Extension service: JSON, regex, DNS records, TLS, DTLS and SRTP.
//!
//! These operations sit behind the [`ExtensionService`] trait so an
//! embedder can swap in a richer provider with
//! [`crate::runtime::install_extensions`]. The built-in
//! [`NativeExtensions`] covers JSON, regex and TLS; the remaining
//! operations report that they are not available.
//!
//! The public functions in this module are what generated code calls.
//! They check argument types, then translate the service's
//! [`ExtResult`] into the language's error idiom: JSON and regex failures
//! hurl, while DNS, TLS, DTLS and SRTP failures come back as result
//! records.

pub mod json;
pub mod regex;
pub mod tls;

use crate::hurl::hurl;
use crate::panic::type_error;
use crate::record;
use crate::runtime::extensions;
use crate::value::{make_string, Value};

/// Outcome of one extension operation. `error` is a string value when
/// `ok` is false.
#[derive(Debug, Clone)]
pub struct ExtResult {
    pub ok: bool,
    pub value: Value,
    pub error: Value,
}

impl ExtResult {
    pub fn ok(value: Value) -> Self {
        ExtResult {
            ok: true,
            value,
            error: Value::Nil,
        }
    }

    pub fn err(message: &str) -> Self {
        ExtResult {
            ok: false,
            value: Value::Nil,
            error: make_string(message),
        }
    }

    pub fn unavailable(op: &str) -> Self {
        Self::err(&format!("{op} is not available"))
    }
}

impl From<Result<Value, String>> for ExtResult {
    fn from(result: Result<Value, String>) -> Self {
        match result {
            Ok(value) => ExtResult::ok(value),
            Err(message) => ExtResult::err(&message),
        }
    }
}

/// A provider of extension operations.
///
/// Every method has a default that reports the operation as unavailable,
/// so a provider only overrides what it supports. Implementations are
/// shared across threads.
pub trait ExtensionService: Send + Sync {
    fn name(&self) -> &'static str;

    fn json_parse(&self, _text: &Value) -> ExtResult {
        ExtResult::unavailable("json_parse")
    }
    fn json_stringify(&self, _value: &Value) -> ExtResult {
        ExtResult::unavailable("json_stringify")
    }
    fn json_pretty(&self, _value: &Value) -> ExtResult {
        ExtResult::unavailable("json_pretty")
    }

    fn regex_test(&self, _text: &Value, _pattern: &Value) -> ExtResult {
        ExtResult::unavailable("regex_test")
    }
    fn regex_match(&self, _text: &Value, _pattern: &Value) -> ExtResult {
        ExtResult::unavailable("regex_match")
    }
    fn regex_match_all(&self, _text: &Value, _pattern: &Value) -> ExtResult {
        ExtResult::unavailable("regex_match_all")
    }
    fn regex_replace(&self, _text: &Value, _pattern: &Value, _replacement: &Value) -> ExtResult {
        ExtResult::unavailable("regex_replace")
    }
    fn regex_replace_first(
        &self,
        _text: &Value,
        _pattern: &Value,
        _replacement: &Value,
    ) -> ExtResult {
        ExtResult::unavailable("regex_replace_first")
    }
    fn regex_split(&self, _text: &Value, _pattern: &Value) -> ExtResult {
        ExtResult::unavailable("regex_split")
    }

    fn dns_srv(&self, _service: &Value, _domain: &Value) -> ExtResult {
        ExtResult::unavailable("dns_srv")
    }
    fn dns_naptr(&self, _domain: &Value) -> ExtResult {
        ExtResult::unavailable("dns_naptr")
    }

    fn tls_client_new(&self, _config: &Value) -> ExtResult {
        ExtResult::unavailable("tls_client_new")
    }
    /// Handshake over `fd`. The service owns `fd` once this returns ok.
    fn tls_connect(&self, _tls: &Value, _fd: i32) -> ExtResult {
        ExtResult::unavailable("tls_connect")
    }
    fn tls_send(&self, _tls: &Value, _buf: &Value) -> ExtResult {
        ExtResult::unavailable("tls_send")
    }
    fn tls_recv(&self, _tls: &Value, _max_len: i64) -> ExtResult {
        ExtResult::unavailable("tls_recv")
    }
    fn tls_close(&self, _tls: &Value) -> ExtResult {
        ExtResult::unavailable("tls_close")
    }

    fn dtls_server_new(&self, _config: &Value) -> ExtResult {
        ExtResult::unavailable("dtls_server_new")
    }
    /// Same ownership rule as [`ExtensionService::tls_connect`].
    fn dtls_handshake(&self, _dtls: &Value, _fd: i32) -> ExtResult {
        ExtResult::unavailable("dtls_handshake")
    }

    fn srtp_create(&self, _config: &Value) -> ExtResult {
        ExtResult::unavailable("srtp_create")
    }
    fn srtp_protect(&self, _ctx: &Value, _packet: &Value) -> ExtResult {
        ExtResult::unavailable("srtp_protect")
    }
    fn srtp_unprotect(&self, _ctx: &Value, _packet: &Value) -> ExtResult {
        ExtResult::unavailable("srtp_unprotect")
    }
}

/// The built-in provider.
pub struct NativeExtensions {
    tls: tls::Sessions,
}

impl Default for NativeExtensions {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeExtensions {
    pub fn new() -> Self {
        NativeExtensions {
            tls: tls::Sessions::new(),
        }
    }
}

impl ExtensionService for NativeExtensions {
    fn name(&self) -> &'static str {
        "native"
    }

    fn json_parse(&self, text: &Value) -> ExtResult {
        match text.as_str() {
            Some(text) => json::parse(text).into(),
            None => ExtResult::err("json_parse expects a string"),
        }
    }

    fn json_stringify(&self, value: &Value) -> ExtResult {
        ExtResult::ok(make_string(&json::stringify(value, false)))
    }

    fn json_pretty(&self, value: &Value) -> ExtResult {
        ExtResult::ok(make_string(&json::stringify(value, true)))
    }

    fn regex_test(&self, text: &Value, pattern: &Value) -> ExtResult {
        regex::with_strings("regex_test", text, pattern, regex::test).into()
    }

    fn regex_match(&self, text: &Value, pattern: &Value) -> ExtResult {
        regex::with_strings("regex_match", text, pattern, regex::first_match).into()
    }

    fn regex_match_all(&self, text: &Value, pattern: &Value) -> ExtResult {
        regex::with_strings("regex_match_all", text, pattern, regex::all_matches).into()
    }

    fn regex_replace(&self, text: &Value, pattern: &Value, replacement: &Value) -> ExtResult {
        regex::replace("regex_replace", text, pattern, replacement, 0).into()
    }

    fn regex_replace_first(
        &self,
        text: &Value,
        pattern: &Value,
        replacement: &Value,
    ) -> ExtResult {
        regex::replace("regex_replace_first", text, pattern, replacement, 1).into()
    }

    fn regex_split(&self, text: &Value, pattern: &Value) -> ExtResult {
        regex::with_strings("regex_split", text, pattern, regex::split).into()
    }

    fn tls_client_new(&self, config: &Value) -> ExtResult {
        self.tls.create(config).into()
    }

    fn tls_connect(&self, tls: &Value, fd: i32) -> ExtResult {
        self.tls.connect(tls, fd).into()
    }

    fn tls_send(&self, tls: &Value, buf: &Value) -> ExtResult {
        self.tls.send(tls, buf).into()
    }

    fn tls_recv(&self, tls: &Value, max_len: i64) -> ExtResult {
        self.tls.recv(tls, max_len).into()
    }

    fn tls_close(&self, tls: &Value) -> ExtResult {
        self.tls.close(tls).into()
    }
}

// ── Wrappers ──────────────────────────────────────────────────────────

fn value_or_hurl(result: ExtResult) -> Value {
    if result.ok {
        result.value
    } else {
        hurl(result.error)
    }
}

fn into_record(op: &str, result: ExtResult) -> Value {
    if result.ok {
        return record::ok(result.value);
    }
    match result.error.as_str().filter(|msg| !msg.is_empty()) {
        Some(msg) => record::err(msg, -1),
        None => record::err(&format!("{op} failed"), -1),
    }
}

fn require_string(op: &'static str, v: &Value, other: Option<&Value>) {
    if !matches!(v, Value::Str(_)) {
        type_error(op, v, other);
    }
}

fn require_int(op: &'static str, v: &Value) {
    if !matches!(v, Value::Int(_)) {
        type_error(op, v, None);
    }
}

fn require_bytes(op: &'static str, v: &Value) {
    if !matches!(v, Value::Bytes(_)) {
        type_error(op, v, None);
    }
}

fn number_arg(op: &'static str, v: &Value) -> i64 {
    match v {
        Value::Int(n) => *n,
        Value::Float(f) => *f as i64,
        other => type_error(op, other, None),
    }
}

/// A socket argument as a descriptor, or the failure record for one that
/// cannot be a descriptor.
fn socket_fd(op: &'static str, sock: &Value) -> Result<i32, Value> {
    match i32::try_from(number_arg(op, sock)) {
        Ok(fd) if fd >= 0 => Ok(fd),
        _ => Err(record::err("Invalid socket", -1)),
    }
}

fn text_and_pattern(op: &'static str, text: &Value, pattern: &Value) {
    if !matches!(text, Value::Str(_)) || !matches!(pattern, Value::Str(_)) {
        type_error(op, text, Some(pattern));
    }
}

fn replace_args(op: &'static str, text: &Value, pattern: &Value, replacement: &Value) {
    if matches!(
        (text, pattern, replacement),
        (Value::Str(_), Value::Str(_), Value::Str(_))
    ) {
        return;
    }
    let second = if matches!(pattern, Value::Str(_)) {
        replacement
    } else {
        pattern
    };
    type_error(op, text, Some(second));
}

/// Duplicate `sock` and hand the copy to `handshake`; the program keeps
/// its own descriptor. The copy is closed if the handshake fails.
fn with_dup_fd(op: &str, fd: i32, handshake: impl FnOnce(i32) -> ExtResult) -> Value {
    let dup = unsafe { libc::dup(fd) };
    if dup < 0 {
        return record::os_err(&format!("{op} dup"), &std::io::Error::last_os_error());
    }
    let result = handshake(dup);
    if !result.ok {
        unsafe {
            libc::close(dup);
        }
    }
    into_record(op, result)
}

// ── JSON ──────────────────────────────────────────────────────────────

pub fn json_parse(text: &Value) -> Value {
    require_string("json_parse", text, None);
    value_or_hurl(extensions().json_parse(text))
}

pub fn json_stringify(value: &Value) -> Value {
    value_or_hurl(extensions().json_stringify(value))
}

pub fn json_pretty(value: &Value) -> Value {
    value_or_hurl(extensions().json_pretty(value))
}

// ── Regex ─────────────────────────────────────────────────────────────

pub fn regex_test(text: &Value, pattern: &Value) -> Value {
    text_and_pattern("regex_test", text, pattern);
    value_or_hurl(extensions().regex_test(text, pattern))
}

/// `{match, start, end}` for the first match, or nil.
pub fn regex_match(text: &Value, pattern: &Value) -> Value {
    text_and_pattern("regex_match", text, pattern);
    value_or_hurl(extensions().regex_match(text, pattern))
}

pub fn regex_match_all(text: &Value, pattern: &Value) -> Value {
    text_and_pattern("regex_match_all", text, pattern);
    value_or_hurl(extensions().regex_match_all(text, pattern))
}

pub fn regex_replace(text: &Value, pattern: &Value, replacement: &Value) -> Value {
    replace_args("regex_replace", text, pattern, replacement);
    value_or_hurl(extensions().regex_replace(text, pattern, replacement))
}

pub fn regex_replace_first(text: &Value, pattern: &Value, replacement: &Value) -> Value {
    replace_args("regex_replace_first", text, pattern, replacement);
    value_or_hurl(extensions().regex_replace_first(text, pattern, replacement))
}

pub fn regex_split(text: &Value, pattern: &Value) -> Value {
    text_and_pattern("regex_split", text, pattern);
    value_or_hurl(extensions().regex_split(text, pattern))
}

// ── DNS records ───────────────────────────────────────────────────────

pub fn dns_srv(service: &Value, domain: &Value) -> Value {
    if !matches!(service, Value::Str(_)) || !matches!(domain, Value::Str(_)) {
        type_error("dns_srv", service, Some(domain));
    }
    into_record("dns_srv", extensions().dns_srv(service, domain))
}

pub fn dns_naptr(domain: &Value) -> Value {
    require_string("dns_naptr", domain, None);
    into_record("dns_naptr", extensions().dns_naptr(domain))
}

// ── TLS ───────────────────────────────────────────────────────────────

/// Create a TLS session from a config dict (or nil for client defaults).
/// The value is the session handle.
pub fn tls_client_new(config: &Value) -> Value {
    into_record("tls_client_new", extensions().tls_client_new(config))
}

/// Run the handshake for session `tls` over a duplicate of `sock`.
pub fn tls_connect(tls: &Value, sock: &Value) -> Value {
    require_int("tls_connect", tls);
    let sock = match socket_fd("tls_connect", sock) {
        Ok(fd) => fd,
        Err(failure) => return failure,
    };
    with_dup_fd("tls_connect", sock, |fd| extensions().tls_connect(tls, fd))
}

pub fn tls_send(tls: &Value, buf: &Value) -> Value {
    require_int("tls_send", tls);
    require_bytes("tls_send", buf);
    into_record("tls_send", extensions().tls_send(tls, buf))
}

pub fn tls_recv(tls: &Value, max_len: &Value) -> Value {
    require_int("tls_recv", tls);
    let max_len = number_arg("tls_recv", max_len).max(0);
    into_record("tls_recv", extensions().tls_recv(tls, max_len))
}

pub fn tls_close(tls: &Value) -> Value {
    require_int("tls_close", tls);
    into_record("tls_close", extensions().tls_close(tls))
}

// ── DTLS and SRTP ─────────────────────────────────────────────────────

pub fn dtls_server_new(config: &Value) -> Value {
    into_record("dtls_server_new", extensions().dtls_server_new(config))
}

pub fn dtls_handshake(dtls: &Value, sock: &Value) -> Value {
    require_int("dtls_handshake", dtls);
    let sock = match socket_fd("dtls_handshake", sock) {
        Ok(fd) => fd,
        Err(failure) => return failure,
    };
    with_dup_fd("dtls_handshake", sock, |fd| {
        extensions().dtls_handshake(dtls, fd)
    })
}

pub fn srtp_create(config: &Value) -> Value {
    into_record("srtp_create", extensions().srtp_create(config))
}

pub fn srtp_protect(ctx: &Value, packet: &Value) -> Value {
    require_int("srtp_protect", ctx);
    require_bytes("srtp_protect", packet);
    into_record("srtp_protect", extensions().srtp_protect(ctx, packet))
}

pub fn srtp_unprotect(ctx: &Value, packet: &Value) -> Value {
    require_int("srtp_unprotect", ctx);
    require_bytes("srtp_unprotect", packet);
    into_record("srtp_unprotect", extensions().srtp_unprotect(ctx, packet))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::{bytes, dict};

    fn field(d: &Value, key: &str) -> Value {
        dict::get(d, &make_string(key))
    }

    #[test]
    fn test_unavailable_ops_are_records() {
        let r = srtp_create(&Value::Nil);
        assert!(!record::is_ok(&r));
        assert_eq!(field(&r, "error").as_str(), Some("srtp_create is not available"));
        assert_eq!(field(&r, "code"), Value::Int(-1));

        let r = dns_naptr(&make_string("example.org"));
        assert_eq!(field(&r, "error").as_str(), Some("dns_naptr is not available"));
    }

    #[test]
    fn test_empty_error_becomes_op_failed() {
        let result = ExtResult {
            ok: false,
            value: Value::Nil,
            error: make_string(""),
        };
        let r = into_record("dtls_handshake", result);
        assert_eq!(field(&r, "error").as_str(), Some("dtls_handshake failed"));
    }

    #[test]
    fn test_dup_failure_reports_errno() {
        let r = with_dup_fd("tls_connect", -1, |_| ExtResult::ok(Value::Nil));
        assert!(!record::is_ok(&r));
        assert_eq!(field(&r, "code"), Value::Int(i64::from(libc::EBADF)));
        let msg = field(&r, "error");
        assert!(msg.as_str().unwrap().starts_with("tls_connect dup failed: "));
    }

    #[test]
    fn test_socket_outside_descriptor_range_is_a_record() {
        for sock in [Value::Int(1 << 32), Value::Int(-3), Value::Float(1e12)] {
            let r = tls_connect(&Value::Int(1), &sock);
            assert!(!record::is_ok(&r));
            assert_eq!(field(&r, "error").as_str(), Some("Invalid socket"));
            assert_eq!(field(&r, "code"), Value::Int(-1));
        }
        let r = dtls_handshake(&Value::Int(1), &Value::Int(i64::from(i32::MAX) + 1));
        assert_eq!(field(&r, "error").as_str(), Some("Invalid socket"));
    }

    #[test]
    fn test_unknown_tls_handle_is_a_record() {
        let r = tls_send(&Value::Int(999_999), &bytes::from_slice(b"x"));
        assert!(!record::is_ok(&r));
        assert_eq!(field(&r, "error").as_str(), Some("Unknown TLS handle"));
    }

    struct Echo;

    impl ExtensionService for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn dns_naptr(&self, domain: &Value) -> ExtResult {
            ExtResult::ok(domain.clone())
        }
    }

    #[test]
    fn test_default_methods_report_unavailable() {
        let echo = Echo;
        assert_eq!(echo.dns_naptr(&make_string("a")).value.as_str(), Some("a"));
        let r = echo.json_parse(&make_string("1"));
        assert!(!r.ok);
        assert_eq!(r.error.as_str(), Some("json_parse is not available"));
    }
}
