//! Freed, joined and finished resources give their table slots back.
//!
//! One test in its own binary, so no other test touches the tables while
//! their lengths are checked.

use std::time::{Duration, Instant};

use haver_rt::runtime::handles;
use haver_rt::sync::atomic::{atomic_free, atomic_new};
use haver_rt::sync::chan::{chan_free, chan_new, chan_send};
use haver_rt::sync::condvar::{condvar_free, condvar_new};
use haver_rt::sync::mutex::{mutex_free, mutex_new};
use haver_rt::sync::thread::{thread_detach, thread_join, thread_spawn};
use haver_rt::{make_function, Value};

fn nothing(_: &[Value]) -> Value {
    Value::Nil
}

#[test]
fn test_tables_shrink_back() {
    let mutexes: Vec<Value> = (0..1000).map(|_| mutex_new()).collect();
    assert_eq!(handles().mutexes.lock().len(), 1000);
    for m in &mutexes {
        assert_eq!(mutex_free(m), Value::Bool(true));
    }
    assert_eq!(handles().mutexes.lock().len(), 0);

    // Freed slots are reused rather than appended.
    let again: Vec<Value> = (0..1000).map(|_| mutex_new()).collect();
    assert_eq!(handles().mutexes.lock().len(), 1000);
    assert!(again.iter().all(|m| !mutexes.contains(m)));
    again.iter().for_each(|m| {
        mutex_free(m);
    });

    let cv = condvar_new();
    let cell = atomic_new(&Value::Int(0));
    let chan = chan_new(&Value::Int(0));
    chan_send(&chan, &Value::from("left behind"));
    condvar_free(&cv);
    atomic_free(&cell);
    chan_free(&chan);
    assert!(handles().condvars.lock().is_empty());
    assert!(handles().atomics.lock().is_empty());
    assert!(handles().channels.lock().is_empty());

    let f = make_function("nothing", nothing);
    for _ in 0..100 {
        let t = thread_spawn(&f, &Value::Nil);
        thread_join(&t);
    }
    assert_eq!(handles().threads.lock().len(), 0);

    for _ in 0..20 {
        thread_detach(&thread_spawn(&f, &Value::Nil));
    }
    let deadline = Instant::now() + Duration::from_secs(5);
    while !handles().threads.lock().is_empty() {
        assert!(Instant::now() < deadline, "detached threads kept their handles");
        std::thread::sleep(Duration::from_millis(5));
    }
}
