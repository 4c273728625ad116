//! TLS sessions over program sockets, using rustls with the ring provider.
//!
//! A session is created from a config dict, then bound to a socket by
//! `tls_connect`, which runs the full handshake before returning. The
//! session owns the descriptor it was given and closes it on `tls_close`.
//!
//! Config keys, all optional:
//! - `mode`: `"client"` (default) or `"server"`
//! - `server_name`: name to verify, default `"localhost"`
//! - `insecure`: skip server certificate verification (client only)
//! - `ca_pem`: trust these roots instead of the bundled web PKI roots
//! - `cert_pem`, `key_pem`: server identity, required in server mode

use std::io::{Read, Write};
use std::net::TcpStream;
use std::os::unix::io::{FromRawFd, IntoRawFd};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::{
    ClientConfig, ClientConnection, DigitallySignedStruct, Error, RootCertStore, ServerConfig,
    ServerConnection, SignatureScheme, StreamOwned,
};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};

use crate::collections::{bytes, dict};
use crate::value::{make_string, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Client,
    Server,
}

struct Settings {
    mode: Mode,
    server_name: String,
    insecure: bool,
    ca_pem: Option<String>,
    cert_pem: Option<String>,
    key_pem: Option<String>,
}

enum Config {
    Client(Arc<ClientConfig>),
    Server(Arc<ServerConfig>),
}

enum Stream {
    Client(StreamOwned<ClientConnection, TcpStream>),
    Server(StreamOwned<ServerConnection, TcpStream>),
}

struct Session {
    server_name: String,
    config: Config,
    stream: Option<Stream>,
}

/// Table of live sessions. Ids start at 1 and are never reused.
pub(crate) struct Sessions {
    table: Mutex<FxHashMap<i64, Arc<Mutex<Session>>>>,
    next_id: AtomicI64,
}

// ── Configuration ───────────────────────────────────────────────────

fn install_provider() {
    // Fails harmlessly when a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();
}

fn non_empty_string(config: &Value, key: &str) -> Option<String> {
    let v = dict::get_default(config, &make_string(key), &Value::Nil);
    v.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

fn settings(config: &Value) -> Result<Settings, String> {
    match config {
        Value::Nil => {
            return Ok(Settings {
                mode: Mode::Client,
                server_name: "localhost".to_string(),
                insecure: false,
                ca_pem: None,
                cert_pem: None,
                key_pem: None,
            })
        }
        Value::Dict(_) => {}
        _ => return Err("tls_client_new expects a config dict".to_string()),
    }
    let mode = match non_empty_string(config, "mode") {
        Some(m) if m.eq_ignore_ascii_case("server") => Mode::Server,
        _ => Mode::Client,
    };
    let insecure = matches!(
        dict::get_default(config, &make_string("insecure"), &Value::Nil),
        Value::Bool(true)
    );
    Ok(Settings {
        mode,
        server_name: non_empty_string(config, "server_name")
            .unwrap_or_else(|| "localhost".to_string()),
        insecure,
        ca_pem: non_empty_string(config, "ca_pem"),
        cert_pem: non_empty_string(config, "cert_pem"),
        key_pem: non_empty_string(config, "key_pem"),
    })
}

fn client_config(settings: &Settings) -> Result<Arc<ClientConfig>, String> {
    if settings.insecure {
        let config = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipCertVerification))
            .with_no_client_auth();
        return Ok(Arc::new(config));
    }

    let roots = match &settings.ca_pem {
        Some(pem) => {
            let certs = CertificateDer::pem_slice_iter(pem.as_bytes())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| format!("Invalid CA certs: {e:?}"))?;
            let mut roots = RootCertStore::empty();
            let (added, _ignored) = roots.add_parsable_certificates(certs);
            if added == 0 {
                return Err("No valid CA certificates found".to_string());
            }
            roots
        }
        None => RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    };
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

fn server_config(settings: &Settings) -> Result<Arc<ServerConfig>, String> {
    let cert_pem = settings
        .cert_pem
        .as_ref()
        .ok_or("Server cert_pem is required")?;
    let key_pem = settings
        .key_pem
        .as_ref()
        .ok_or("Server key_pem is required")?;

    let certs = CertificateDer::pem_slice_iter(cert_pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("Invalid server cert: {e:?}"))?;
    let key = PrivateKeyDer::from_pem_slice(key_pem.as_bytes())
        .map_err(|e| format!("Invalid server key: {e:?}"))?;
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| format!("Invalid server TLS config: {e}"))?;
    Ok(Arc::new(config))
}

// ── Sessions ────────────────────────────────────────────────────────

fn handshake(session: &Session, mut tcp: TcpStream) -> Result<Stream, (TcpStream, String)> {
    let failed = |e: std::io::Error| format!("TLS handshake failed: {e}");
    if let Err(e) = tcp.set_nonblocking(false) {
        return Err((tcp, failed(e)));
    }
    match &session.config {
        Config::Client(config) => {
            let name = match ServerName::try_from(session.server_name.clone()) {
                Ok(name) => name,
                Err(_) => return Err((tcp, "Invalid server_name".to_string())),
            };
            let mut conn = match ClientConnection::new(Arc::clone(config), name) {
                Ok(conn) => conn,
                Err(e) => return Err((tcp, e.to_string())),
            };
            while conn.is_handshaking() {
                if let Err(e) = conn.complete_io(&mut tcp) {
                    return Err((tcp, failed(e)));
                }
            }
            Ok(Stream::Client(StreamOwned::new(conn, tcp)))
        }
        Config::Server(config) => {
            let mut conn = match ServerConnection::new(Arc::clone(config)) {
                Ok(conn) => conn,
                Err(e) => return Err((tcp, e.to_string())),
            };
            while conn.is_handshaking() {
                if let Err(e) = conn.complete_io(&mut tcp) {
                    return Err((tcp, failed(e)));
                }
            }
            Ok(Stream::Server(StreamOwned::new(conn, tcp)))
        }
    }
}

impl Sessions {
    pub(crate) fn new() -> Self {
        Sessions {
            table: Mutex::new(FxHashMap::default()),
            next_id: AtomicI64::new(1),
        }
    }

    fn lookup(&self, op: &str, tls: &Value) -> Result<Arc<Mutex<Session>>, String> {
        let id = match tls {
            Value::Int(id) if *id > 0 => *id,
            _ => return Err(format!("{op} expects a TLS handle")),
        };
        self.table
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| "Unknown TLS handle".to_string())
    }

    pub(crate) fn create(&self, config: &Value) -> Result<Value, String> {
        install_provider();
        let settings = settings(config)?;
        let config = match settings.mode {
            Mode::Client => Config::Client(client_config(&settings)?),
            Mode::Server => Config::Server(server_config(&settings)?),
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.table.lock().insert(
            id,
            Arc::new(Mutex::new(Session {
                server_name: settings.server_name,
                config,
                stream: None,
            })),
        );
        log::debug!("tls session {id} created ({:?})", settings.mode);
        Ok(Value::Int(id))
    }

    /// Handshake over `fd`. On success the session owns `fd`; on failure
    /// ownership stays with the caller.
    pub(crate) fn connect(&self, tls: &Value, fd: i32) -> Result<Value, String> {
        let session = self.lookup("tls_connect", tls)?;
        let mut session = session.lock();
        if session.stream.is_some() {
            return Err("TLS session already connected".to_string());
        }
        let tcp = unsafe { TcpStream::from_raw_fd(fd) };
        match handshake(&session, tcp) {
            Ok(stream) => {
                session.stream = Some(stream);
                Ok(Value::Nil)
            }
            Err((tcp, msg)) => {
                let _ = tcp.into_raw_fd();
                log::debug!("tls_connect: {msg}");
                Err(msg)
            }
        }
    }

    pub(crate) fn send(&self, tls: &Value, buf: &Value) -> Result<Value, String> {
        let data = bytes::to_vec(buf).ok_or("tls_send expects bytes")?;
        let session = self.lookup("tls_send", tls)?;
        let mut session = session.lock();
        let stream = session.stream.as_mut().ok_or("TLS not connected")?;
        let sent = match stream {
            Stream::Client(s) => s.write(&data).and_then(|n| s.flush().map(|_| n)),
            Stream::Server(s) => s.write(&data).and_then(|n| s.flush().map(|_| n)),
        }
        .map_err(|e| format!("TLS send failed: {e}"))?;
        Ok(Value::Int(sent as i64))
    }

    pub(crate) fn recv(&self, tls: &Value, max_len: i64) -> Result<Value, String> {
        let session = self.lookup("tls_recv", tls)?;
        let mut session = session.lock();
        let stream = session.stream.as_mut().ok_or("TLS not connected")?;
        let mut buf = vec![0u8; max_len.max(0) as usize];
        let n = match stream {
            Stream::Client(s) => s.read(&mut buf),
            Stream::Server(s) => s.read(&mut buf),
        }
        .map_err(|e| format!("TLS recv failed: {e}"))?;
        buf.truncate(n);
        Ok(bytes::from_slice(&buf))
    }

    /// Drop the session, sending close_notify first when connected.
    pub(crate) fn close(&self, tls: &Value) -> Result<Value, String> {
        let session = self.lookup("tls_close", tls)?;
        if let Value::Int(id) = tls {
            self.table.lock().remove(id);
        }
        let mut session = session.lock();
        match session.stream.take() {
            Some(Stream::Client(mut s)) => {
                s.conn.send_close_notify();
                let _ = s.flush();
            }
            Some(Stream::Server(mut s)) => {
                s.conn.send_close_notify();
                let _ = s.flush();
            }
            None => {}
        }
        Ok(Value::Nil)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().len()
    }
}

// ── Certificate verification ────────────────────────────────────────

/// Accepts any server certificate. Used only when a config sets
/// `insecure: aye`; handshake signatures are still checked.
#[derive(Debug)]
struct SkipCertVerification;

impl ServerCertVerifier for SkipCertVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
