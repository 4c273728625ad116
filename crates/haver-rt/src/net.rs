//! IPv4 sockets and DNS lookup.
//!
//! Programs work with raw socket descriptors (plain integers) so that
//! the reactor can watch them. Every entry point returns a result record
//! (see [`crate::record`]): OS failures become
//! `{ok: nae, error: "<op> failed: <reason>", code: errno}` and never
//! raise. Malformed arguments still follow the usual rules: a wrong type
//! is a type error, and a port outside 0..=65535 hurls.

use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};

use crate::collections::{bytes, dict};
use crate::error::{raise, RuntimeError};
use crate::panic::type_error;
use crate::record;
use crate::value::{int_arg, make_string, truthy, Value};

// ── Internal helpers ──────────────────────────────────────────────────

/// Why an operation failed, which decides the shape of the record.
enum Failure {
    /// A failed system call: reported as `<op> failed: <strerror>`.
    Os(io::Error),
    /// Name resolution: reported with the resolver's own message.
    Resolve(io::Error),
    /// Invalid input: reported as-is with code -1.
    Invalid(&'static str),
}

impl From<io::Error> for Failure {
    fn from(e: io::Error) -> Self {
        Failure::Os(e)
    }
}

fn finish(op: &str, result: Result<Value, Failure>) -> Value {
    match result {
        Ok(value) => record::ok(value),
        Err(Failure::Os(e)) => record::os_err(op, &e),
        Err(Failure::Resolve(e)) => {
            record::err(&e.to_string(), e.raw_os_error().map_or(-1, i64::from))
        }
        Err(Failure::Invalid(msg)) => record::err(msg, -1),
    }
}

fn cvt(rc: libc::c_int) -> io::Result<libc::c_int> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

fn cvt_size(rc: libc::ssize_t) -> io::Result<usize> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

fn sock_fd(sock: &Value) -> Result<libc::c_int, Failure> {
    let fd = match sock {
        Value::Int(n) => *n,
        other => type_error("socket", other, None),
    };
    if fd < 0 || fd > i64::from(libc::c_int::MAX) {
        return Err(Failure::Invalid("Invalid socket"));
    }
    Ok(fd as libc::c_int)
}

/// Leading decimal integer of `s`, like `strtoll(s, NULL, 10)`.
fn leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    let magnitude = digits[..end].parse::<i64>().unwrap_or(if end == 0 { 0 } else { i64::MAX });
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

fn port_value(port: &Value) -> u16 {
    let raw = match port {
        Value::Int(n) => *n,
        Value::Float(f) => *f as i64,
        Value::Str(s) => leading_int(s),
        other => type_error("port", other, None),
    };
    match u16::try_from(raw) {
        Ok(port) => port,
        Err(_) => raise(RuntimeError::message("Port must be between 0 and 65535")),
    }
}

fn host_value(host: &Value, allow_nil: bool) -> Option<&str> {
    match host {
        Value::Str(s) => Some(s),
        Value::Nil if allow_nil => None,
        other => type_error("host", other, None),
    }
}

/// Resolve to the first IPv4 address. No host means the wildcard address.
fn resolve_v4(host: Option<&str>, port: u16) -> Result<SocketAddrV4, Failure> {
    let Some(host) = host else {
        return Ok(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    };
    let addrs = (host, port).to_socket_addrs().map_err(Failure::Resolve)?;
    addrs
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(v4),
            SocketAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| {
            Failure::Resolve(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no IPv4 address for {host}"),
            ))
        })
}

fn to_sockaddr(addr: SocketAddrV4) -> libc::sockaddr_in {
    let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
    sa.sin_family = libc::AF_INET as libc::sa_family_t;
    sa.sin_port = addr.port().to_be();
    sa.sin_addr = libc::in_addr {
        s_addr: u32::from_ne_bytes(addr.ip().octets()),
    };
    sa
}

fn from_sockaddr(sa: &libc::sockaddr_in) -> SocketAddrV4 {
    let ip = Ipv4Addr::from(sa.sin_addr.s_addr.to_ne_bytes());
    SocketAddrV4::new(ip, u16::from_be(sa.sin_port))
}

fn addr_dict(addr: SocketAddrV4) -> Value {
    let d = dict::set(
        &dict::empty(),
        &make_string("host"),
        &make_string(&addr.ip().to_string()),
    );
    dict::set(&d, &make_string("port"), &Value::Int(i64::from(addr.port())))
}

const SOCKADDR_IN_LEN: libc::socklen_t = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

fn set_int_option(
    fd: libc::c_int,
    level: libc::c_int,
    name: libc::c_int,
    value: libc::c_int,
) -> io::Result<()> {
    let rc = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &value as *const libc::c_int as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    cvt(rc).map(drop)
}

fn open_socket(kind: libc::c_int) -> Result<Value, Failure> {
    let fd = cvt(unsafe { libc::socket(libc::AF_INET, kind, 0) })?;
    log::trace!("opened socket fd {fd}");
    Ok(Value::Int(i64::from(fd)))
}

/// Read at most `max_len` bytes with `recv_into`, which returns the byte
/// count. The buffer is trimmed to what arrived.
fn receive(
    max_len: &Value,
    op: &'static str,
    recv_into: impl FnOnce(&mut [u8]) -> io::Result<usize>,
) -> Result<Vec<u8>, Failure> {
    let max_len = match max_len {
        Value::Int(_) | Value::Float(_) => int_arg(op, max_len).max(0) as usize,
        other => type_error(op, other, None),
    };
    let mut buf = vec![0u8; max_len];
    if max_len == 0 {
        return Ok(buf);
    }
    let n = recv_into(&mut buf)?;
    buf.truncate(n);
    Ok(buf)
}

fn bytes_arg(op: &'static str, buf: &Value) -> Vec<u8> {
    match bytes::to_vec(buf) {
        Some(data) => data,
        None => type_error(op, buf, None),
    }
}

// ── Sockets ───────────────────────────────────────────────────────────

pub fn socket_udp() -> Value {
    finish("socket_udp", open_socket(libc::SOCK_DGRAM))
}

pub fn socket_tcp() -> Value {
    finish("socket_tcp", open_socket(libc::SOCK_STREAM))
}

/// Bind to `host` (nil for every interface) and `port`.
pub fn socket_bind(sock: &Value, host: &Value, port: &Value) -> Value {
    let result = (|| {
        let fd = sock_fd(sock)?;
        let port = port_value(port);
        let addr = resolve_v4(host_value(host, true), port)?;
        let sa = to_sockaddr(addr);
        cvt(unsafe {
            libc::bind(
                fd,
                &sa as *const libc::sockaddr_in as *const libc::sockaddr,
                SOCKADDR_IN_LEN,
            )
        })?;
        Ok(Value::Nil)
    })();
    finish("socket_bind", result)
}

pub fn socket_connect(sock: &Value, host: &Value, port: &Value) -> Value {
    let result = (|| {
        let fd = sock_fd(sock)?;
        let port = port_value(port);
        let addr = resolve_v4(host_value(host, false), port)?;
        let sa = to_sockaddr(addr);
        cvt(unsafe {
            libc::connect(
                fd,
                &sa as *const libc::sockaddr_in as *const libc::sockaddr,
                SOCKADDR_IN_LEN,
            )
        })?;
        Ok(Value::Nil)
    })();
    finish("socket_connect", result)
}

/// Start listening. A negative backlog is treated as 0.
pub fn socket_listen(sock: &Value, backlog: &Value) -> Value {
    let result = (|| {
        let fd = sock_fd(sock)?;
        let backlog = int_arg("socket_listen", backlog).clamp(0, i64::from(libc::c_int::MAX));
        cvt(unsafe { libc::listen(fd, backlog as libc::c_int) })?;
        Ok(Value::Nil)
    })();
    finish("socket_listen", result)
}

/// Accept a connection: `{sock, addr: {host, port}}`.
pub fn socket_accept(sock: &Value) -> Value {
    let result = (|| {
        let fd = sock_fd(sock)?;
        let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = SOCKADDR_IN_LEN;
        let client = cvt(unsafe {
            libc::accept(
                fd,
                &mut sa as *mut libc::sockaddr_in as *mut libc::sockaddr,
                &mut len,
            )
        })?;
        let info = dict::set(
            &dict::empty(),
            &make_string("sock"),
            &Value::Int(i64::from(client)),
        );
        Ok(dict::set(&info, &make_string("addr"), &addr_dict(from_sockaddr(&sa))))
    })();
    finish("socket_accept", result)
}

pub fn socket_set_nonblocking(sock: &Value, on: &Value) -> Value {
    let result = (|| {
        let fd = sock_fd(sock)?;
        let flags = cvt(unsafe { libc::fcntl(fd, libc::F_GETFL, 0) })?;
        let flags = if truthy(on) {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };
        cvt(unsafe { libc::fcntl(fd, libc::F_SETFL, flags) })?;
        Ok(Value::Nil)
    })();
    finish("socket_set_nonblocking", result)
}

fn set_flag(op: &'static str, sock: &Value, level: libc::c_int, name: libc::c_int, on: &Value) -> Value {
    let result = (|| {
        let fd = sock_fd(sock)?;
        set_int_option(fd, level, name, libc::c_int::from(truthy(on)))?;
        Ok(Value::Nil)
    })();
    finish(op, result)
}

pub fn socket_set_reuseaddr(sock: &Value, on: &Value) -> Value {
    set_flag("socket_set_reuseaddr", sock, libc::SOL_SOCKET, libc::SO_REUSEADDR, on)
}

pub fn socket_set_reuseport(sock: &Value, on: &Value) -> Value {
    set_flag("socket_set_reuseport", sock, libc::SOL_SOCKET, libc::SO_REUSEPORT, on)
}

pub fn socket_set_nodelay(sock: &Value, on: &Value) -> Value {
    set_flag("socket_set_nodelay", sock, libc::IPPROTO_TCP, libc::TCP_NODELAY, on)
}

pub fn socket_set_ttl(sock: &Value, ttl: &Value) -> Value {
    let result = (|| {
        let fd = sock_fd(sock)?;
        let ttl = int_arg("socket_set_ttl", ttl);
        if !(0..=255).contains(&ttl) {
            raise(RuntimeError::message("socket_set_ttl expects 0..255"));
        }
        set_int_option(fd, libc::IPPROTO_IP, libc::IP_TTL, ttl as libc::c_int)?;
        Ok(Value::Nil)
    })();
    finish("socket_set_ttl", result)
}

fn set_buffer_size(op: &'static str, sock: &Value, name: libc::c_int, size: &Value) -> Value {
    let result = (|| {
        let fd = sock_fd(sock)?;
        let size = int_arg(op, size);
        let Ok(size) = libc::c_int::try_from(size) else {
            raise(RuntimeError::message(format!("{op} expects a non-negative size")));
        };
        if size < 0 {
            raise(RuntimeError::message(format!("{op} expects a non-negative size")));
        }
        set_int_option(fd, libc::SOL_SOCKET, name, size)?;
        Ok(Value::Nil)
    })();
    finish(op, result)
}

pub fn socket_set_rcvbuf(sock: &Value, size: &Value) -> Value {
    set_buffer_size("socket_set_rcvbuf", sock, libc::SO_RCVBUF, size)
}

pub fn socket_set_sndbuf(sock: &Value, size: &Value) -> Value {
    set_buffer_size("socket_set_sndbuf", sock, libc::SO_SNDBUF, size)
}

pub fn socket_close(sock: &Value) -> Value {
    let result = (|| {
        let fd = sock_fd(sock)?;
        cvt(unsafe { libc::close(fd) })?;
        Ok(Value::Nil)
    })();
    finish("socket_close", result)
}

// ── Datagram and stream I/O ───────────────────────────────────────────

/// Send `buf` to `host:port`. The value is the number of bytes sent.
pub fn udp_send_to(sock: &Value, buf: &Value, host: &Value, port: &Value) -> Value {
    let result = (|| {
        let fd = sock_fd(sock)?;
        let data = bytes_arg("udp_send_to", buf);
        let port = port_value(port);
        let addr = resolve_v4(host_value(host, false), port)?;
        let sa = to_sockaddr(addr);
        let sent = cvt_size(unsafe {
            libc::sendto(
                fd,
                data.as_ptr() as *const libc::c_void,
                data.len(),
                0,
                &sa as *const libc::sockaddr_in as *const libc::sockaddr,
                SOCKADDR_IN_LEN,
            )
        })?;
        Ok(Value::Int(sent as i64))
    })();
    finish("udp_send_to", result)
}

/// Receive one datagram of at most `max_len` bytes: `{buf, addr}`.
/// `addr` is nil when `max_len` is 0 and nothing was read.
pub fn udp_recv_from(sock: &Value, max_len: &Value) -> Value {
    let result = (|| {
        let fd = sock_fd(sock)?;
        let mut from: Option<SocketAddrV4> = None;
        let data = receive(max_len, "udp_recv_from", |buf| {
            let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
            let mut len = SOCKADDR_IN_LEN;
            let n = cvt_size(unsafe {
                libc::recvfrom(
                    fd,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    0,
                    &mut sa as *mut libc::sockaddr_in as *mut libc::sockaddr,
                    &mut len,
                )
            })?;
            from = Some(from_sockaddr(&sa));
            Ok(n)
        })?;
        let info = dict::set(&dict::empty(), &make_string("buf"), &bytes::from_slice(&data));
        let addr = from.map_or(Value::Nil, addr_dict);
        Ok(dict::set(&info, &make_string("addr"), &addr))
    })();
    finish("udp_recv_from", result)
}

pub fn tcp_send(sock: &Value, buf: &Value) -> Value {
    let result = (|| {
        let fd = sock_fd(sock)?;
        let data = bytes_arg("tcp_send", buf);
        let sent = cvt_size(unsafe {
            libc::send(fd, data.as_ptr() as *const libc::c_void, data.len(), 0)
        })?;
        Ok(Value::Int(sent as i64))
    })();
    finish("tcp_send", result)
}

/// Receive at most `max_len` bytes. An empty buffer means the peer
/// closed the connection.
pub fn tcp_recv(sock: &Value, max_len: &Value) -> Value {
    let result = (|| {
        let fd = sock_fd(sock)?;
        let data = receive(max_len, "tcp_recv", |buf| {
            cvt_size(unsafe {
                libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
            })
        })?;
        Ok(bytes::from_slice(&data))
    })();
    finish("tcp_recv", result)
}

// ── DNS ───────────────────────────────────────────────────────────────

/// Every address `host` resolves to, IPv4 and IPv6, as strings.
pub fn dns_lookup(host: &Value) -> Value {
    let Value::Str(name) = host else {
        type_error("dns_lookup", host, None);
    };
    let result = (|| {
        if name.is_empty() {
            return Err(Failure::Invalid("dns_lookup expects a non-empty hostname"));
        }
        let addrs = (&**name, 0u16).to_socket_addrs().map_err(Failure::Resolve)?;
        let ips = addrs.map(|addr| make_string(&addr.ip().to_string())).collect();
        Ok(crate::collections::list::from_values(ips))
    })();
    finish("dns_lookup", result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hurl::protect;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream, UdpSocket};

    fn value_of(record: &Value) -> Value {
        assert!(record::is_ok(record), "expected ok record, got {record}");
        dict::get(record, &make_string("value"))
    }

    fn field(d: &Value, key: &str) -> Value {
        dict::get(d, &make_string(key))
    }

    fn loopback() -> Value {
        make_string("127.0.0.1")
    }

    #[test]
    fn test_leading_int() {
        assert_eq!(leading_int("8080"), 8080);
        assert_eq!(leading_int("80abc"), 80);
        assert_eq!(leading_int("abc"), 0);
        assert_eq!(leading_int("-5"), -5);
    }

    #[test]
    fn test_port_checks() {
        assert_eq!(port_value(&make_string("443")), 443);
        assert_eq!(port_value(&Value::Float(80.9)), 80);
        let err = protect(|| port_value(&Value::Int(70000))).unwrap_err();
        assert_eq!(err.as_str(), Some("Port must be between 0 and 65535"));
    }

    #[test]
    fn test_connect_refused_is_a_record() {
        let port = {
            let probe = TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let sock = value_of(&socket_tcp());
        let r = socket_connect(&sock, &loopback(), &Value::Int(i64::from(port)));
        assert!(!record::is_ok(&r));
        assert_eq!(field(&r, "code"), Value::Int(i64::from(libc::ECONNREFUSED)));
        let msg = field(&r, "error");
        assert!(msg.as_str().unwrap().starts_with("socket_connect failed: "));
        socket_close(&sock);
    }

    #[test]
    fn test_invalid_socket_record() {
        let r = socket_close(&Value::Int(-1));
        assert_eq!(field(&r, "error").as_str(), Some("Invalid socket"));
        assert_eq!(field(&r, "code"), Value::Int(-1));
    }

    #[test]
    fn test_tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let sock = value_of(&socket_tcp());
        assert!(record::is_ok(&socket_set_nodelay(&sock, &Value::Bool(true))));
        let r = socket_connect(&sock, &loopback(), &Value::Int(i64::from(port)));
        assert!(record::is_ok(&r));

        let (mut peer, _) = listener.accept().unwrap();
        let sent = tcp_send(&sock, &bytes::from_slice(b"haver"));
        assert_eq!(value_of(&sent), Value::Int(5));
        let mut got = [0u8; 5];
        peer.read_exact(&mut got).unwrap();
        assert_eq!(&got, b"haver");

        peer.write_all(b"aye").unwrap();
        let received = value_of(&tcp_recv(&sock, &Value::Int(16)));
        assert_eq!(bytes::to_vec(&received).unwrap(), b"aye");

        drop(peer);
        let eof = value_of(&tcp_recv(&sock, &Value::Int(16)));
        assert_eq!(bytes::len(&eof), 0);
        assert!(record::is_ok(&socket_close(&sock)));
    }

    #[test]
    fn test_listen_and_accept() {
        let server = value_of(&socket_tcp());
        assert!(record::is_ok(&socket_set_reuseaddr(&server, &Value::Bool(true))));
        assert!(record::is_ok(&socket_bind(&server, &loopback(), &Value::Int(0))));
        assert!(record::is_ok(&socket_listen(&server, &Value::Int(-3))));

        // Find the ephemeral port the kernel picked.
        let fd = sock_fd(&server).ok().unwrap();
        let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = SOCKADDR_IN_LEN;
        unsafe {
            libc::getsockname(fd, &mut sa as *mut _ as *mut libc::sockaddr, &mut len);
        }
        let port = from_sockaddr(&sa).port();

        let _client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        let accepted = value_of(&socket_accept(&server));
        let addr = field(&accepted, "addr");
        assert_eq!(field(&addr, "host").as_str(), Some("127.0.0.1"));
        assert!(matches!(field(&accepted, "sock"), Value::Int(fd) if fd >= 0));

        socket_close(&field(&accepted, "sock"));
        socket_close(&server);
    }

    #[test]
    fn test_udp_send_and_receive() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer_port = peer.local_addr().unwrap().port();

        let sock = value_of(&socket_udp());
        assert!(record::is_ok(&socket_bind(&sock, &loopback(), &Value::Int(0))));
        let sent = udp_send_to(
            &sock,
            &bytes::from_slice(b"ping"),
            &loopback(),
            &make_string(&peer_port.to_string()),
        );
        assert_eq!(value_of(&sent), Value::Int(4));

        let mut buf = [0u8; 16];
        let (n, from) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
        peer.send_to(b"pong", from).unwrap();

        let info = value_of(&udp_recv_from(&sock, &Value::Int(16)));
        assert_eq!(bytes::to_vec(&field(&info, "buf")).unwrap(), b"pong");
        let addr = field(&info, "addr");
        assert_eq!(field(&addr, "port"), Value::Int(i64::from(peer_port)));
        socket_close(&sock);
    }

    #[test]
    fn test_socket_options() {
        let sock = value_of(&socket_udp());
        assert!(record::is_ok(&socket_set_ttl(&sock, &Value::Int(64))));
        assert!(record::is_ok(&socket_set_rcvbuf(&sock, &Value::Int(65536))));
        assert!(record::is_ok(&socket_set_sndbuf(&sock, &Value::Int(65536))));
        assert!(record::is_ok(&socket_set_reuseport(&sock, &Value::Bool(true))));
        assert!(record::is_ok(&socket_set_nonblocking(&sock, &Value::Bool(true))));

        // Nothing queued on a non-blocking socket: EAGAIN as a record.
        let r = udp_recv_from(&sock, &Value::Int(8));
        assert!(!record::is_ok(&r));
        assert!(field(&r, "error").as_str().unwrap().starts_with("udp_recv_from failed: "));

        let err = protect(|| socket_set_ttl(&sock, &Value::Int(300))).unwrap_err();
        assert_eq!(err.as_str(), Some("socket_set_ttl expects 0..255"));
        let err = protect(|| socket_set_rcvbuf(&sock, &Value::Int(-1))).unwrap_err();
        assert_eq!(err.as_str(), Some("socket_set_rcvbuf expects a non-negative size"));
        socket_close(&sock);
    }

    #[test]
    fn test_dns_lookup_localhost() {
        let r = dns_lookup(&make_string("localhost"));
        let ips = value_of(&r);
        assert!(crate::collections::list::len(&ips) >= 1);
        let r = dns_lookup(&make_string(""));
        assert_eq!(
            field(&r, "error").as_str(),
            Some("dns_lookup expects a non-empty hostname")
        );
    }
}
