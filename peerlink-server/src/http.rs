//! Auxiliary HTTP status listener.
//!
//! Serves `GET /status` as plain text. Every connection gets one response
//! and is closed.

use crate::handle::ServerHandle;
use std::fmt::Write as _;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const MAX_REQUEST: usize = 8 * 1024;
const MAX_HEADERS: usize = 32;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Binds the listener synchronously so bind errors surface from `listen`.
pub(crate) fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
    let listener = std::net::TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    TcpListener::from_std(listener)
}

/// Accepts connections until shutdown is requested.
pub(crate) async fn serve(listener: TcpListener, server: ServerHandle) {
    let token = server.shared.shutdown.clone();
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let server = server.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &server).await {
                            tracing::debug!("HTTP connection from {} failed: {}", addr, e);
                        }
                    });
                }
                Err(e) => tracing::warn!("HTTP accept error: {}", e),
            },
        }
    }
    tracing::debug!("HTTP side-channel stopped");
}

async fn handle_connection(mut stream: TcpStream, server: &ServerHandle) -> io::Result<()> {
    let request = tokio::time::timeout(READ_TIMEOUT, read_request(&mut stream))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "request read timed out"))??;

    let response = match request {
        Request::Complete { method, path } => route(&method, &path, server),
        Request::Invalid | Request::Partial => {
            Response::text(400, "Bad Request", "bad request\n")
        }
    };
    stream.write_all(&response.to_bytes()).await?;
    stream.shutdown().await
}

async fn read_request(stream: &mut TcpStream) -> io::Result<Request> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(Request::Invalid);
        }
        buf.extend_from_slice(&chunk[..n]);
        match parse_request(&buf) {
            Request::Partial if buf.len() < MAX_REQUEST => continue,
            Request::Partial => return Ok(Request::Invalid),
            done => return Ok(done),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Request {
    Complete { method: String, path: String },
    Partial,
    Invalid,
}

fn parse_request(buf: &[u8]) -> Request {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);
    match request.parse(buf) {
        Ok(httparse::Status::Complete(_)) => match (request.method, request.path) {
            (Some(method), Some(path)) => Request::Complete {
                method: method.to_string(),
                path: path.to_string(),
            },
            _ => Request::Invalid,
        },
        Ok(httparse::Status::Partial) => Request::Partial,
        Err(_) => Request::Invalid,
    }
}

fn route(method: &str, path: &str, server: &ServerHandle) -> Response {
    let path = path.split('?').next().unwrap_or(path);
    match (method, path) {
        ("GET", "/status") => Response::text(200, "OK", status_body(server)),
        ("GET", _) => Response::text(404, "Not Found", "not found\n"),
        _ => Response::text(405, "Method Not Allowed", "method not allowed\n"),
    }
}

fn status_body(server: &ServerHandle) -> String {
    let stats = server.stats();
    let mut body = String::new();
    let _ = writeln!(body, "state: {}", server.state());
    let _ = writeln!(body, "port: {}", server.config().port);
    let _ = writeln!(
        body,
        "sessions: {}/{}",
        server.session_count(),
        server.config().max_sessions
    );
    let _ = writeln!(body, "events_dispatched: {}", stats.events_dispatched);
    let _ = writeln!(body, "anomalies: {}", stats.anomalies);
    let _ = writeln!(body, "refused_connections: {}", stats.refused_connections);
    let _ = writeln!(body, "handler_failures: {}", stats.handler_failures);
    let _ = writeln!(body, "poll_errors: {}", stats.poll_errors);
    body
}

struct Response {
    status: u16,
    reason: &'static str,
    body: String,
}

impl Response {
    fn text(status: u16, reason: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            reason,
            body: body.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status,
            self.reason,
            self.body.len(),
            self.body
        )
        .into_bytes()
    }
}
