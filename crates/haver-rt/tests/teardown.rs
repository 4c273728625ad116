//! Teardown invalidates every outstanding handle.
//!
//! Kept in its own binary: teardown clears process-wide state.

use haver_rt::hurl::protect;
use haver_rt::reactor::{event_loop_new, event_loop_poll};
use haver_rt::sync::chan::{chan_new, chan_send};
use haver_rt::sync::mutex::{mutex_lock, mutex_new, mutex_unlock};
use haver_rt::{teardown, Value};

#[test]
fn test_handles_are_invalid_after_teardown() {
    let m = mutex_new();
    let chan = chan_new(&Value::Int(1));
    let ev = event_loop_new();

    mutex_lock(&m);
    mutex_unlock(&m);
    assert_eq!(chan_send(&chan, &Value::Int(1)), Value::Bool(true));

    teardown();

    let err = protect(|| mutex_lock(&m)).unwrap_err();
    assert_eq!(err.as_str(), Some("Invalid mutex handle"));
    let err = protect(|| chan_send(&chan, &Value::Int(2))).unwrap_err();
    assert_eq!(err.as_str(), Some("Invalid channel handle"));
    let err = protect(|| event_loop_poll(&ev, &Value::Int(0))).unwrap_err();
    assert_eq!(err.as_str(), Some("Unknown event loop handle"));

    // The runtime keeps working for new handles.
    let fresh = mutex_new();
    mutex_lock(&fresh);
    mutex_unlock(&fresh);
}
