//! Minimal HTTP front door: request-head parsing and the upgrade hook.
//!
//! This is the collaborator layer in front of the protocol engine. It
//! reads exactly one request head off a fresh TCP connection, runs the
//! pure admission check from [`crate::protocol::handshake`], writes the
//! 101 or 400 response, and on
//! success stops treating the connection as HTTP: the raw transport is
//! handed to [`Session::new`] and never touched here again.

// ============================================================================
// Imports
// ============================================================================

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::frame::Role;
use crate::protocol::handshake::{check_request, response_headers};
use crate::transport::session::Session;

// ============================================================================
// Types
// ============================================================================

/// Session type produced by a successful upgrade.
pub type ServerSession = Session<BufReader<TcpStream>>;

/// Upper bound on request-head lines, against a hostile client.
const MAX_HEAD_LINES: usize = 128;

/// Body sent with every rejected handshake.
const REJECT_BODY: &str = "Invalid WebSocket handshake.\n";

// ============================================================================
// Upgrade
// ============================================================================

/// Performs the server half of the upgrade handshake.
///
/// Returns the session and the request path (for routing).
///
/// # Errors
///
/// Returns [`Error::Handshake`] after answering 400 if admission
/// fails, or [`Error::Io`] for transport failures.
pub async fn upgrade(stream: TcpStream) -> Result<(ServerSession, String)> {
    let mut stream = BufReader::new(stream);
    let request = read_request_head(&mut stream).await?;

    let admitted = check_request(request.http_1_1, |name| request.header(name));
    let key = match admitted {
        Ok(key) => key,
        Err(e) => {
            debug!(path = %request.path, error = %e, "handshake rejected");
            let response = format!(
                "HTTP/1.1 400 Bad Request\r\n\
                 Content-Type: text/plain\r\n\
                 Content-Length: {}\r\n\
                 Connection: close\r\n\
                 \r\n\
                 {REJECT_BODY}",
                REJECT_BODY.len()
            );
            stream.write_all(response.as_bytes()).await?;
            stream.flush().await?;
            return Err(e);
        }
    };

    let mut response = String::from("HTTP/1.1 101 Switching Protocols\r\n");
    for (name, value) in response_headers(key) {
        response.push_str(name);
        response.push_str(": ");
        response.push_str(&value);
        response.push_str("\r\n");
    }
    response.push_str("\r\n");
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;

    debug!(path = %request.path, "connection upgraded");
    Ok((Session::new(stream, Role::Server), request.path))
}

// ============================================================================
// Request head
// ============================================================================

/// One parsed request head: request line plus lowercased header names.
struct RequestHead {
    path: String,
    http_1_1: bool,
    headers: Vec<(String, String)>,
}

impl RequestHead {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Reads the request line and headers, up to the blank line.
async fn read_request_head(stream: &mut BufReader<TcpStream>) -> Result<RequestHead> {
    let mut request_line = String::new();
    if stream.read_line(&mut request_line).await? == 0 {
        return Err(Error::handshake("connection closed before the request"));
    }

    let mut parts = request_line.split_ascii_whitespace();
    let (method, path, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(path), Some(version), None) => (method, path, version),
        _ => {
            return Err(Error::handshake(format!(
                "malformed request line {:?}",
                request_line.trim_end()
            )));
        }
    };
    if method != "GET" {
        return Err(Error::handshake(format!("method {method} not supported")));
    }
    let path = path.to_owned();
    let http_1_1 = version == "HTTP/1.1";

    let mut headers = Vec::new();
    loop {
        if headers.len() > MAX_HEAD_LINES {
            return Err(Error::handshake("request head too large"));
        }
        let mut line = String::new();
        if stream.read_line(&mut line).await? == 0 {
            return Err(Error::handshake("connection closed inside the head"));
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(Error::handshake(format!("malformed header line {line:?}")));
        };
        headers.push((name.trim().to_ascii_lowercase(), value.trim().to_owned()));
    }

    Ok(RequestHead {
        path,
        http_1_1,
        headers,
    })
}
