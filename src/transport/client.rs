//! Client-side connection establishment.
//!
//! Dials a `ws://` URL, performs the upgrade handshake, verifies the
//! server's accept token, and returns a client-role
//! [`Session`](crate::transport::Session).

// ============================================================================
// Imports
// ============================================================================

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::frame::Role;
use crate::protocol::handshake::{WS_VERSION, accept_token, generate_key};
use crate::transport::session::Session;

// ============================================================================
// Types
// ============================================================================

/// Session type produced by [`connect`].
pub type ClientSession = Session<BufReader<TcpStream>>;

/// Default port for `ws://` URLs.
const WS_DEFAULT_PORT: u16 = 80;

/// Upper bound on response-head lines, against a hostile server.
const MAX_HEAD_LINES: usize = 128;

// ============================================================================
// Connect
// ============================================================================

/// Connects to a `ws://` URL and completes the upgrade handshake.
///
/// # Errors
///
/// - [`Error::Handshake`] for a malformed URL, a non-101 response, a
///   wrong accept token, or an extension/sub-protocol offered by the
///   server (neither is supported).
/// - [`Error::Io`] for transport failures.
pub async fn connect(url: &str) -> Result<ClientSession> {
    let url = Url::parse(url).map_err(|e| Error::handshake(format!("invalid URL: {e}")))?;
    if url.scheme() != "ws" {
        return Err(Error::handshake(format!(
            "unsupported scheme {:?}",
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| Error::handshake("URL has no host"))?;
    let port = url.port().unwrap_or(WS_DEFAULT_PORT);
    let host_header = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    };
    let path = url.path();

    let stream = TcpStream::connect((host, port)).await?;
    let mut stream = BufReader::new(stream);

    // Send the upgrade request.
    let key = generate_key();
    let request = format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host_header}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: {WS_VERSION}\r\n\
         \r\n"
    );
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    // Read and validate the response head.
    let (status_line, headers) = read_response_head(&mut stream).await?;
    validate_response(&status_line, &headers, &key)?;

    debug!(%host_header, path, "WebSocket connection established");

    Ok(Session::new(stream, Role::Client))
}

// ============================================================================
// Response Validation
// ============================================================================

/// Reads the status line and headers, up to the blank line.
async fn read_response_head(
    stream: &mut BufReader<TcpStream>,
) -> Result<(String, Vec<(String, String)>)> {
    let mut status_line = String::new();
    if stream.read_line(&mut status_line).await? == 0 {
        return Err(Error::handshake("server closed during handshake"));
    }
    let status_line = status_line.trim_end().to_owned();

    let mut headers = Vec::new();
    loop {
        if headers.len() > MAX_HEAD_LINES {
            return Err(Error::handshake("response head too large"));
        }
        let mut line = String::new();
        if stream.read_line(&mut line).await? == 0 {
            return Err(Error::handshake("server closed during handshake"));
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
    Ok((status_line, headers))
}

/// Checks the 101 response against the key we sent.
fn validate_response(status_line: &str, headers: &[(String, String)], key: &str) -> Result<()> {
    let get = |name: &str| {
        headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    };

    let mut parts = status_line.split_ascii_whitespace();
    match (parts.next(), parts.next()) {
        (Some("HTTP/1.1"), Some("101")) => {}
        _ => {
            return Err(Error::handshake(format!(
                "upgrade refused: {status_line:?}"
            )));
        }
    }

    match get("upgrade") {
        Some(upgrade) if upgrade.eq_ignore_ascii_case("websocket") => {}
        _ => return Err(Error::handshake("response Upgrade is not websocket")),
    }

    match get("connection") {
        Some(connection)
            if connection
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade")) => {}
        _ => return Err(Error::handshake("response Connection lacks upgrade")),
    }

    match get("sec-websocket-accept") {
        Some(accept) if accept == accept_token(key) => {}
        _ => return Err(Error::handshake("Sec-WebSocket-Accept mismatch")),
    }

    // Neither extensions nor sub-protocols are supported; a server
    // selecting one would change the framing under us.
    if get("sec-websocket-extensions").is_some() {
        return Err(Error::handshake("server selected an extension"));
    }
    if get("sec-websocket-protocol").is_some() {
        return Err(Error::handshake("server selected a sub-protocol"));
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
