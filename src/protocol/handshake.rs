//! WebSocket upgrade handshake admission.
//!
//! Stateless validation over HTTP request headers plus the accept-token
//! computation. This module never touches a socket: the HTTP collaborator
//! layer calls [`check_request`] with its parsed headers, writes the 101
//! or 400 response itself, and on success hands the raw transport to a
//! [`Session`](crate::transport::Session).
//!
//! # Admission Rules
//!
//! A request is admitted when all of the following hold:
//!
//! | Check | Requirement |
//! |-------|-------------|
//! | Version | HTTP/1.1 |
//! | `Host` | present, non-empty |
//! | `Upgrade` | equals `websocket` (case-insensitive) |
//! | `Connection` | comma-separated tokens include `upgrade` (case-insensitive) |
//! | `Sec-WebSocket-Key` | base64 of exactly 16 bytes |
//! | `Sec-WebSocket-Version` | `13` |
//!
//! On success the response carries
//! `Sec-WebSocket-Accept: base64(SHA-1(key ++ GUID))`.

// ============================================================================
// Imports
// ============================================================================

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Fixed GUID appended to the key before hashing (RFC 6455 §1.3).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only supported protocol version.
pub const WS_VERSION: &str = "13";

// ============================================================================
// Admission Check
// ============================================================================

/// Validates an inbound upgrade request and returns its key.
///
/// `http_1_1` tells whether the request line carried `HTTP/1.1`;
/// `get_header` must look headers up case-insensitively and return the
/// raw value.
///
/// # Errors
///
/// Returns [`Error::Handshake`] naming the first failed check. The
/// caller answers with status 400 and performs no upgrade.
pub fn check_request<'a, F>(http_1_1: bool, get_header: F) -> Result<&'a str>
where
    F: Fn(&str) -> Option<&'a str>,
{
    if !http_1_1 {
        return Err(Error::handshake("HTTP/1.1 required"));
    }

    match get_header("host") {
        Some(host) if !host.trim().is_empty() => {}
        _ => return Err(Error::handshake("missing Host header")),
    }

    match get_header("upgrade") {
        Some(upgrade) if upgrade.trim().eq_ignore_ascii_case("websocket") => {}
        Some(other) => {
            return Err(Error::handshake(format!("Upgrade is {other:?}, not websocket")));
        }
        None => return Err(Error::handshake("missing Upgrade header")),
    }

    match get_header("connection") {
        Some(connection)
            if connection
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade")) => {}
        Some(other) => {
            return Err(Error::handshake(format!(
                "Connection {other:?} lacks an upgrade token"
            )));
        }
        None => return Err(Error::handshake("missing Connection header")),
    }

    match get_header("sec-websocket-version") {
        Some(WS_VERSION) => {}
        Some(other) => {
            return Err(Error::handshake(format!(
                "unsupported Sec-WebSocket-Version {other:?}"
            )));
        }
        None => return Err(Error::handshake("missing Sec-WebSocket-Version header")),
    }

    let key = get_header("sec-websocket-key")
        .ok_or_else(|| Error::handshake("missing Sec-WebSocket-Key header"))?;
    match BASE64.decode(key.trim()) {
        Ok(raw) if raw.len() == 16 => Ok(key),
        Ok(raw) => Err(Error::handshake(format!(
            "Sec-WebSocket-Key decodes to {} bytes, expected 16",
            raw.len()
        ))),
        Err(_) => Err(Error::handshake("Sec-WebSocket-Key is not valid base64")),
    }
}

/// Computes the accept token for a key.
///
/// `base64(SHA-1(key ++ GUID))`, per RFC 6455 §4.2.2.
#[must_use]
pub fn accept_token(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.trim().as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Builds the 101 response headers for an admitted key.
#[must_use]
pub fn response_headers(key: &str) -> [(&'static str, String); 3] {
    [
        ("Upgrade", "websocket".to_owned()),
        ("Connection", "Upgrade".to_owned()),
        ("Sec-WebSocket-Accept", accept_token(key)),
    ]
}

/// Generates a fresh client key: 16 random bytes, base64-encoded.
#[must_use]
pub fn generate_key() -> String {
    let raw: [u8; 16] = rand::random();
    BASE64.encode(raw)
}

// ============================================================================
// Tests
// ============================================================================
