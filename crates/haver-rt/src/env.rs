//! Program boundary: startup hooks, command-line arguments, environment
//! variables and the monotonic clock.

use std::ffi::{c_char, c_int, CStr};

use crate::reactor::timer;
use crate::runtime;
use crate::value::{make_string, Value};

/// Initialize the runtime from `HAVER_LOG` / `HAVER_LOG_LEVEL`. Generated
/// `main` calls this before anything else.
#[no_mangle]
pub extern "C" fn haver_rt_init() {
    runtime::init();
}

/// Record the program's `argv`. Null entries become empty strings.
///
/// # Safety
///
/// `argv` must be null or point to `argc` readable pointers, each null or
/// a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn haver_rt_set_args(argc: c_int, argv: *const *const c_char) {
    let args = if argv.is_null() || argc <= 0 {
        Vec::new()
    } else {
        (0..argc as usize)
            .map(|i| {
                let arg = *argv.add(i);
                if arg.is_null() {
                    String::new()
                } else {
                    CStr::from_ptr(arg).to_string_lossy().into_owned()
                }
            })
            .collect()
    };
    log::trace!("program arguments: {args:?}");
    runtime::set_args(args);
}

/// The program arguments as a list of strings.
pub fn args() -> Value {
    runtime::args()
}

/// Value of an environment variable, or nil when it is unset or not
/// valid UTF-8.
pub fn env_get(key: &Value) -> Value {
    let Value::Str(key) = key else {
        crate::panic::type_error("env_get", key, None);
    };
    match std::env::var(&**key) {
        Ok(value) => make_string(&value),
        Err(_) => Value::Nil,
    }
}

/// Milliseconds on a monotonic clock with an arbitrary origin.
pub fn mono_ms() -> Value {
    Value::Int(timer::now_ms())
}

pub fn mono_ns() -> Value {
    Value::Int(timer::now_ns())
}
