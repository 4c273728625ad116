//! Event loops driving real sockets and timers.

use haver_rt::collections::{bytes, dict, list};
use haver_rt::reactor::{
    event_loop_free, event_loop_new, event_loop_poll, timer_after, timer_cancel, timer_every,
    unwatch, watch_read,
};
use haver_rt::{net, record, make_string, Value};

fn kinds(events: &Value) -> Vec<String> {
    list::items(events)
        .iter()
        .map(|e| dict::get(e, &make_string("kind")).to_string())
        .collect()
}

#[test]
fn test_timers_fire_in_deadline_order() {
    let ev = event_loop_new();
    let late = timer_after(&ev, &Value::Int(40), &make_string("late"));
    let soon = timer_after(&ev, &Value::Int(5), &make_string("soon"));
    let dropped = timer_after(&ev, &Value::Int(10), &make_string("dropped"));
    assert_eq!(timer_cancel(&ev, &dropped), Value::Bool(true));

    let mut fired = Vec::new();
    while fired.len() < 2 {
        for e in list::items(&event_loop_poll(&ev, &Value::Int(1000))) {
            fired.push(dict::get(&e, &make_string("id")));
        }
    }
    assert_eq!(fired, [soon, late]);
    assert_eq!(event_loop_free(&ev), Value::Bool(true));
}

#[test]
fn test_repeating_timer_until_cancelled() {
    let ev = event_loop_new();
    let tick = timer_every(&ev, &Value::Int(5), &make_string("tick"));
    let mut ticks = 0;
    while ticks < 3 {
        ticks += list::len(&event_loop_poll(&ev, &Value::Nil));
    }
    timer_cancel(&ev, &tick);
    assert_eq!(list::len(&event_loop_poll(&ev, &Value::Int(20))), 0);
}

#[test]
fn test_udp_socket_becomes_readable() {
    let ok_value = |r: Value| {
        assert!(record::is_ok(&r), "{r}");
        dict::get(&r, &make_string("value"))
    };
    let loopback = make_string("127.0.0.1");

    let receiver = ok_value(net::socket_udp());
    ok_value(net::socket_bind(&receiver, &loopback, &Value::Int(0)));
    let probe = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let ev = event_loop_new();
    watch_read(&ev, &receiver, &make_string("on_datagram"));
    assert!(list::items(&event_loop_poll(&ev, &Value::Int(0))).is_empty());

    let port = local_port(&receiver);
    probe.send_to(b"hello", ("127.0.0.1", port)).unwrap();

    let events = event_loop_poll(&ev, &Value::Int(1000));
    assert_eq!(kinds(&events), ["read"]);
    let e = list::get(&events, 0);
    assert_eq!(dict::get(&e, &make_string("sock")), receiver);
    assert_eq!(
        dict::get(&e, &make_string("callback")).as_str(),
        Some("on_datagram")
    );

    let got = ok_value(net::udp_recv_from(&receiver, &Value::Int(64)));
    let buf = dict::get(&got, &make_string("buf"));
    assert_eq!(bytes::to_string(&buf).as_str(), Some("hello"));

    assert_eq!(unwatch(&ev, &receiver), Value::Bool(true));
    net::socket_close(&receiver);
}

fn local_port(sock: &Value) -> u16 {
    let fd = sock.as_int().unwrap() as i32;
    let mut sa: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    let rc = unsafe { libc::getsockname(fd, &mut sa as *mut _ as *mut libc::sockaddr, &mut len) };
    assert_eq!(rc, 0);
    u16::from_be(sa.sin_port)
}
