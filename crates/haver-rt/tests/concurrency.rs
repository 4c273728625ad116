//! Threads, channels and locks working together through handles.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use haver_rt::collections::list;
use haver_rt::hurl::protect;
use haver_rt::sync::atomic::{atomic_add, atomic_load, atomic_new};
use haver_rt::sync::chan::{chan_close, chan_new, chan_recv, chan_send, chan_try_recv};
use haver_rt::sync::mutex::{mutex_lock, mutex_new, mutex_unlock};
use haver_rt::sync::thread::{thread_join, thread_spawn};
use haver_rt::{make_function, Value};

fn producer(args: &[Value]) -> Value {
    let chan = &args[0];
    for i in 0..5 {
        chan_send(chan, &Value::Int(i));
    }
    chan_close(chan);
    Value::Nil
}

#[test]
fn test_capacity_one_channel_keeps_order() {
    let chan = chan_new(&Value::Int(1));
    let t = thread_spawn(
        &make_function("producer", producer),
        &Value::from(vec![chan.clone()]),
    );

    let mut got = Vec::new();
    loop {
        let v = chan_recv(&chan);
        if v.is_nil() {
            break;
        }
        got.push(v.as_int().unwrap());
    }
    thread_join(&t);
    assert_eq!(got, [0, 1, 2, 3, 4]);
}

#[test]
fn test_unbounded_channel_never_blocks_sender() {
    let chan = chan_new(&Value::Int(0));
    for i in 0..1000 {
        assert_eq!(chan_send(&chan, &Value::Int(i)), Value::Bool(true));
    }
    for i in 0..1000 {
        assert_eq!(chan_try_recv(&chan), Value::Int(i));
    }
    assert!(chan_try_recv(&chan).is_nil());
}

#[test]
fn test_send_after_close_is_refused() {
    let chan = chan_new(&Value::Int(2));
    chan_send(&chan, &Value::from("last"));
    chan_close(&chan);
    assert_eq!(chan_send(&chan, &Value::from("late")), Value::Bool(false));
    assert_eq!(chan_recv(&chan).as_str(), Some("last"));
    assert!(chan_recv(&chan).is_nil());
}

fn bump(args: &[Value]) -> Value {
    let (m, counter) = (&args[0], &args[1]);
    for _ in 0..100 {
        mutex_lock(m);
        atomic_add(counter, &Value::Int(1));
        mutex_unlock(m);
    }
    Value::Nil
}

#[test]
fn test_threads_share_mutex_and_atomic() {
    let m = mutex_new();
    let counter = atomic_new(&Value::Int(0));
    let f = make_function("bump", bump);
    let threads: Vec<Value> = (0..4)
        .map(|_| thread_spawn(&f, &Value::from(vec![m.clone(), counter.clone()])))
        .collect();
    for t in &threads {
        thread_join(t);
    }
    assert_eq!(atomic_load(&counter), Value::Int(400));
}

#[test]
fn test_wrong_kind_handle_hurls() {
    let m = mutex_new();
    let err = protect(|| atomic_load(&m)).unwrap_err();
    assert_eq!(err.as_str(), Some("Invalid atomic handle"));
}

#[test]
fn test_list_shared_across_threads() {
    // Lists have reference semantics, so pushes from a spawned thread are
    // visible to the spawner.
    fn fill(args: &[Value]) -> Value {
        for i in 0..10 {
            list::push(&args[0], &Value::Int(i));
        }
        Value::Nil
    }
    let shared = Value::from(Vec::new());
    let t = thread_spawn(
        &make_function("fill", fill),
        &Value::from(vec![shared.clone()]),
    );
    thread_join(&t);
    assert_eq!(list::len(&shared), 10);

    let seen = Arc::new(AtomicI64::new(0));
    let seen2 = Arc::clone(&seen);
    std::thread::spawn(move || seen2.store(list::len(&shared), Ordering::SeqCst))
        .join()
        .unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 10);
}
