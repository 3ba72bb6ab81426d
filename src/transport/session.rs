//! WebSocket session state machine.
//!
//! A [`Session`] owns one connection's protocol state: fragmentation
//! reassembly, control-frame handling, the close handshake, and the
//! message-level read/write API used by higher layers.
//!
//! # States
//!
//! A session moves monotonically `open → closing → closed`. Closing is
//! entered the moment either side sends or receives a close frame. Once
//! `local_closed`, no further writes; once `remote_closed`, no further
//! application reads.
//!
//! # Splitting
//!
//! [`Session::into_split`] yields a reader and a writer half sharing the
//! close flags, so a server-side pump can deliver published updates to a
//! peer while blocked reading from it.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf, split};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::frame::{Frame, Opcode, Role};

// ============================================================================
// Message
// ============================================================================

/// One complete application message, fragments reassembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// UTF-8 text message.
    Text(String),
    /// Binary message.
    Binary(Vec<u8>),
}

impl Message {
    /// Returns the text payload, if this is a text message.
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Consumes the message, returning the text payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sequencing`] for a binary message, for callers
    /// whose protocol is text-only.
    pub fn into_text(self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Binary(bytes) => Err(Error::sequencing(format!(
                "expected a text message, received {} binary bytes",
                bytes.len()
            ))),
        }
    }
}

// ============================================================================
// Shared close state
// ============================================================================

/// Close flags shared between the reader and writer halves.
#[derive(Debug, Default)]
struct Shared {
    local_closed: AtomicBool,
    remote_closed: AtomicBool,
}

impl Shared {
    #[inline]
    fn local_closed(&self) -> bool {
        self.local_closed.load(Ordering::Acquire)
    }

    #[inline]
    fn remote_closed(&self) -> bool {
        self.remote_closed.load(Ordering::Acquire)
    }
}

// ============================================================================
// SessionEvent
// ============================================================================

/// What the reader half surfaced from the frame stream.
///
/// Pongs are swallowed; close frames end the stream (`Ok(None)`).
#[derive(Debug)]
pub enum SessionEvent {
    /// A complete data message.
    Message(Message),
    /// A ping that needs a pong with the same payload.
    Ping(Vec<u8>),
}

// ============================================================================
// SessionReader
// ============================================================================

/// Reading half of a session.
///
/// Owns fragmentation reassembly. Pings surface as
/// [`SessionEvent::Ping`] so whoever holds the writer half can answer
/// them.
#[derive(Debug)]
pub struct SessionReader<S> {
    stream: ReadHalf<S>,
    role: Role,
    shared: Arc<Shared>,
    /// Reassembly buffer for an in-flight fragmented message.
    partial: Option<(Opcode, Vec<u8>)>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SessionReader<S> {
    /// Reads until a complete message, a ping, or end of stream.
    ///
    /// Returns `Ok(None)` once the peer's close frame is observed or the
    /// transport ends. Subsequent calls fail with
    /// [`Error::ConnectionClosed`].
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the remote side already closed.
    /// - [`Error::Protocol`] for framing violations, a continuation
    ///   frame with a non-zero opcode, a data frame starting with a
    ///   continuation opcode, or invalid UTF-8 in a text message.
    pub async fn next_event(&mut self) -> Result<Option<SessionEvent>> {
        if self.shared.remote_closed() {
            return Err(Error::ConnectionClosed);
        }

        loop {
            let Some(frame) = Frame::read_from(&mut self.stream, self.role).await? else {
                // Transport ended without a close frame.
                debug!("stream ended without close handshake");
                self.shared.remote_closed.store(true, Ordering::Release);
                return Ok(None);
            };
            trace!(opcode = ?frame.opcode, fin = frame.fin, len = frame.payload.len(), "frame");

            match frame.opcode {
                Opcode::Close => {
                    self.shared.remote_closed.store(true, Ordering::Release);
                    return Ok(None);
                }
                Opcode::Ping => return Ok(Some(SessionEvent::Ping(frame.payload))),
                Opcode::Pong => continue, // unsolicited pongs are ignored
                Opcode::Continuation => match self.partial.as_mut() {
                    Some((_, data)) => {
                        data.extend_from_slice(&frame.payload);
                        if frame.fin {
                            let (opcode, data) = self.partial.take().expect("partial present");
                            return Ok(Some(SessionEvent::Message(assemble(opcode, data)?)));
                        }
                    }
                    None => {
                        return Err(Error::protocol("continuation frame outside a message"));
                    }
                },
                Opcode::Text | Opcode::Binary => {
                    if self.partial.is_some() {
                        return Err(Error::protocol(
                            "data frame with non-zero opcode inside a fragmented message",
                        ));
                    }
                    if frame.fin {
                        return Ok(Some(SessionEvent::Message(assemble(
                            frame.opcode,
                            frame.payload,
                        )?)));
                    }
                    self.partial = Some((frame.opcode, frame.payload));
                }
            }
        }
    }
}

/// Joins reassembled payload bytes into a message.
fn assemble(opcode: Opcode, data: Vec<u8>) -> Result<Message> {
    match opcode {
        Opcode::Text => String::from_utf8(data)
            .map(Message::Text)
            .map_err(|_| Error::protocol("text message is not valid UTF-8")),
        Opcode::Binary => Ok(Message::Binary(data)),
        _ => unreachable!("assemble is only called for data opcodes"),
    }
}

// ============================================================================
// SessionWriter
// ============================================================================

/// Writing half of a session.
#[derive(Debug)]
pub struct SessionWriter<S> {
    stream: WriteHalf<S>,
    role: Role,
    shared: Arc<Shared>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SessionWriter<S> {
    /// Sends a text message as a single opcode-1 frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] once `local_closed`.
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.send_frame(Frame::text(text)).await
    }

    /// Sends a binary message as a single opcode-2 frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] once `local_closed`.
    pub async fn send_binary(&mut self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send_frame(Frame::binary(data)).await
    }

    /// Answers a ping.
    pub async fn pong(&mut self, payload: Vec<u8>) -> Result<()> {
        self.send_frame(Frame::pong(payload)).await
    }

    /// Sends a ping.
    pub async fn ping(&mut self, payload: impl Into<Vec<u8>>) -> Result<()> {
        self.send_frame(Frame::ping(payload)).await
    }

    /// Sends the close frame, if not already sent.
    ///
    /// Idempotent; further writes fail with
    /// [`Error::ConnectionClosed`].
    pub async fn close(&mut self, payload: impl Into<Vec<u8>>) -> Result<()> {
        if self.shared.local_closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        Frame::close(payload.into())
            .write_into(&mut self.stream, self.role)
            .await
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<()> {
        if self.shared.local_closed() {
            return Err(Error::ConnectionClosed);
        }
        frame.write_into(&mut self.stream, self.role).await
    }
}

// ============================================================================
// Session
// ============================================================================

/// One connection's message-level protocol state machine.
///
/// Constructed by whichever layer completed the upgrade handshake: the
/// server's upgrade hook or [`connect`](crate::transport::client::connect).
#[derive(Debug)]
pub struct Session<S> {
    reader: SessionReader<S>,
    writer: SessionWriter<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Session<S> {
    /// Takes ownership of an upgraded transport.
    pub fn new(stream: S, role: Role) -> Self {
        let shared = Arc::new(Shared::default());
        let (read, write) = split(stream);
        Self {
            reader: SessionReader {
                stream: read,
                role,
                shared: Arc::clone(&shared),
                partial: None,
            },
            writer: SessionWriter {
                stream: write,
                role,
                shared,
            },
        }
    }

    /// Returns which end of the connection this session is.
    #[inline]
    #[must_use]
    pub const fn role(&self) -> Role {
        self.reader.role
    }

    /// Returns `true` until either side has started the close handshake.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.reader.shared.local_closed() && !self.reader.shared.remote_closed()
    }

    /// Reads the next complete data message.
    ///
    /// Control frames never surface: pings are answered with pongs
    /// automatically, pongs are ignored, and a close frame completes the
    /// close handshake and yields `Ok(None)`. End of transport also
    /// yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] for framing or reassembly violations.
    /// - [`Error::ConnectionClosed`] for reads after end-of-stream was
    ///   already returned.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        loop {
            match self.reader.next_event().await? {
                Some(SessionEvent::Message(message)) => return Ok(Some(message)),
                Some(SessionEvent::Ping(payload)) => self.writer.pong(payload).await?,
                None => {
                    // Reply to the peer's close if we have not closed
                    // yet. Best effort: the transport may already be
                    // gone when the stream ended without a close frame.
                    if let Err(e) = self.writer.close(Vec::new()).await {
                        debug!(error = %e, "close reply failed");
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Reads the next message and requires it to be text.
    ///
    /// # Errors
    ///
    /// As [`Session::recv`], plus [`Error::Sequencing`] for a binary
    /// message.
    pub async fn recv_text(&mut self) -> Result<Option<String>> {
        match self.recv().await? {
            Some(message) => Ok(Some(message.into_text()?)),
            None => Ok(None),
        }
    }

    /// Sends a text message.
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.writer.send_text(text).await
    }

    /// Sends a binary message.
    pub async fn send_binary(&mut self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.writer.send_binary(data).await
    }

    /// Sends a ping.
    pub async fn ping(&mut self, payload: impl Into<Vec<u8>>) -> Result<()> {
        self.writer.ping(payload).await
    }

    /// Closes the session.
    ///
    /// Idempotent. Sends the close frame, then, in the server role,
    /// drains and discards input until the peer's close frame is
    /// observed. A client prefers to wait for the server-initiated close
    /// instead of calling this first (protocol courtesy, not enforced).
    pub async fn close(&mut self, payload: impl Into<Vec<u8>>) -> Result<()> {
        if self.reader.shared.local_closed() {
            return Ok(());
        }
        self.writer.close(payload.into()).await?;

        if self.role() == Role::Server && !self.reader.shared.remote_closed() {
            // Drain until the peer answers our close.
            loop {
                match self.reader.next_event().await {
                    Ok(Some(_)) => continue,
                    Ok(None) | Err(_) => break,
                }
            }
        }
        Ok(())
    }

    /// Splits into independently usable reader and writer halves.
    ///
    /// The halves share the close flags: closing the writer makes
    /// further writes fail, and the reader observing the peer's close
    /// ends the reading side.
    #[must_use]
    pub fn into_split(self) -> (SessionReader<S>, SessionWriter<S>) {
        (self.reader, self.writer)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncWriteExt, DuplexStream, duplex};

    fn pair() -> (Session<DuplexStream>, Session<DuplexStream>) {
        let (a, b) = duplex(1 << 20);
        (Session::new(a, Role::Client), Session::new(b, Role::Server))
    }

    #[tokio::test]
    async fn test_text_echo_both_directions() {
        let (mut client, mut server) = pair();

        client.send_text("0 3 4 1").await.unwrap();
        let msg = server.recv().await.unwrap().unwrap();
        assert_eq!(msg, Message::Text("0 3 4 1".into()));

        server.send_text("run").await.unwrap();
        let msg = client.recv_text().await.unwrap().unwrap();
        assert_eq!(msg, "run");
    }

    #[tokio::test]
    async fn test_binary_message() {
        let (mut client, mut server) = pair();
        client.send_binary(vec![1, 2, 3]).await.unwrap();
        let msg = server.recv().await.unwrap().unwrap();
        assert_eq!(msg, Message::Binary(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_three_fragment_reassembly() {
        let (mut raw, b) = duplex(1 << 16);
        let mut server = Session::new(b, Role::Server);

        let fragments = [
            Frame {
                fin: false,
                opcode: Opcode::Text,
                payload: b"Hel".to_vec(),
            },
            Frame {
                fin: false,
                opcode: Opcode::Continuation,
                payload: b"lo, ".to_vec(),
            },
            Frame {
                fin: true,
                opcode: Opcode::Continuation,
                payload: b"world".to_vec(),
            },
        ];
        for frame in &fragments {
            raw.write_all(&frame.encode(Role::Client)).await.unwrap();
        }

        let msg = server.recv_text().await.unwrap().unwrap();
        assert_eq!(msg, "Hello, world");
    }

    #[tokio::test]
    async fn test_nonzero_opcode_mid_fragmentation_rejected() {
        let (mut raw, b) = duplex(1 << 16);
        let mut server = Session::new(b, Role::Server);

        let first = Frame {
            fin: false,
            opcode: Opcode::Text,
            payload: b"part".to_vec(),
        };
        // Second fragment illegally restarts as a text frame.
        let second = Frame {
            fin: true,
            opcode: Opcode::Text,
            payload: b"ial".to_vec(),
        };
        raw.write_all(&first.encode(Role::Client)).await.unwrap();
        raw.write_all(&second.encode(Role::Client)).await.unwrap();

        let err = server.recv().await.unwrap_err();
        assert!(err.is_protocol_error());
    }

    #[tokio::test]
    async fn test_stray_continuation_rejected() {
        let (mut raw, b) = duplex(1 << 16);
        let mut server = Session::new(b, Role::Server);

        let frame = Frame {
            fin: true,
            opcode: Opcode::Continuation,
            payload: b"orphan".to_vec(),
        };
        raw.write_all(&frame.encode(Role::Client)).await.unwrap();

        let err = server.recv().await.unwrap_err();
        assert!(err.is_protocol_error());
    }

    #[tokio::test]
    async fn test_ping_answered_with_pong() {
        let (mut raw, b) = duplex(1 << 16);
        let mut server = Session::new(b, Role::Server);

        raw.write_all(&Frame::ping(b"marco".to_vec()).encode(Role::Client))
            .await
            .unwrap();
        raw.write_all(&Frame::text("data").encode(Role::Client))
            .await
            .unwrap();

        // recv surfaces the data message, never the ping.
        let msg = server.recv_text().await.unwrap().unwrap();
        assert_eq!(msg, "data");

        // The pong came back with the same payload.
        let pong = Frame::read_from(&mut raw, Role::Client)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pong.opcode, Opcode::Pong);
        assert_eq!(pong.payload, b"marco");
    }

    #[tokio::test]
    async fn test_unsolicited_pong_ignored() {
        let (mut raw, b) = duplex(1 << 16);
        let mut server = Session::new(b, Role::Server);

        raw.write_all(&Frame::pong(b"?".to_vec()).encode(Role::Client))
            .await
            .unwrap();
        raw.write_all(&Frame::text("after").encode(Role::Client))
            .await
            .unwrap();

        assert_eq!(server.recv_text().await.unwrap().unwrap(), "after");
    }

    #[tokio::test]
    async fn test_close_handshake() {
        let (mut client, mut server) = pair();

        // Server initiates; drain runs concurrently with the client's
        // recv/reply.
        let server_task = tokio::spawn(async move {
            server.close(Vec::new()).await.unwrap();
            server
        });

        // Client observes end of stream and replies with its own close.
        let end = client.recv().await.unwrap();
        assert!(end.is_none());
        assert!(!client.is_open());

        let server = server_task.await.unwrap();
        assert!(!server.is_open());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut client, _server) = pair();
        client.close(Vec::new()).await.unwrap();
        client.close(Vec::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (mut client, _server) = pair();
        client.close(Vec::new()).await.unwrap();
        let err = client.send_text("late").await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_recv_after_end_of_stream_fails() {
        let (client, b) = duplex(1 << 16);
        let mut server = Session::new(b, Role::Server);

        drop(client);
        assert!(server.recv().await.unwrap().is_none());
        let err = server.recv().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_split_halves_share_close_state() {
        let (a, b) = duplex(1 << 16);
        let client = Session::new(a, Role::Client);
        let mut server = Session::new(b, Role::Server);

        let (mut reader, mut writer) = client.into_split();
        writer.send_text("from writer half").await.unwrap();
        assert_eq!(
            server.recv_text().await.unwrap().unwrap(),
            "from writer half"
        );

        writer.close(Vec::new()).await.unwrap();
        let err = writer.send_text("late").await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));

        // Server sees the close and replies; reader half observes it.
        assert!(server.recv().await.unwrap().is_none());
        assert!(reader.next_event().await.unwrap().is_none());
    }
}
