//! WebSocket frame codec (RFC 6455 framing layer).
//!
//! This module encodes and decodes individual protocol frames over a raw
//! byte stream. It has no knowledge of message semantics; fragmentation
//! reassembly and control-frame handling live in
//! [`Session`](crate::transport::Session).
//!
//! # Wire Format
//!
//! Big-endian throughout:
//!
//! ```text
//! byte 0: FIN(1) RSV(3, must be 0) OPCODE(4)
//! byte 1: MASK(1) LEN7(7)
//! LEN7 == 126 → next 2 bytes = 16-bit length
//! LEN7 == 127 → next 8 bytes = 64-bit length
//! MASK == 1   → next 4 bytes = masking key
//! remainder   → payload (XOR-masked with the cycled key if MASK == 1)
//! ```
//!
//! Clients mask every frame they send; servers never do. A reader in the
//! server role therefore requires the mask bit, and a reader in the client
//! role rejects it. Writers always pick the minimal length field; readers
//! accept any width.

// ============================================================================
// Imports
// ============================================================================

use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Maximum payload length of a control frame (close/ping/pong).
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Largest length representable in the inline 7-bit field.
const LEN7_MAX: usize = 125;

/// LEN7 marker for a 16-bit extended length.
const LEN16_MARKER: u8 = 126;

/// LEN7 marker for a 64-bit extended length.
const LEN64_MARKER: u8 = 127;

// ============================================================================
// Role
// ============================================================================

/// Which end of the connection a session is.
///
/// The role decides the masking direction: clients mask outgoing frames
/// and reject masked input, servers require masked input and write
/// unmasked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Dialing end. Masks outgoing frames.
    Client,
    /// Accepting end. Requires incoming frames to be masked.
    Server,
}

impl Role {
    /// Returns `true` if incoming frames must carry a masking key.
    #[inline]
    #[must_use]
    pub const fn expects_masked_input(self) -> bool {
        matches!(self, Self::Server)
    }

    /// Returns `true` if outgoing frames are masked.
    #[inline]
    #[must_use]
    pub const fn masks_output(self) -> bool {
        matches!(self, Self::Client)
    }
}

// ============================================================================
// Opcode
// ============================================================================

/// Frame opcode.
///
/// Values 3–7 and 11–15 are reserved and rejected on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation of a fragmented message.
    Continuation = 0x0,
    /// UTF-8 text data frame.
    Text = 0x1,
    /// Binary data frame.
    Binary = 0x2,
    /// Close control frame.
    Close = 0x8,
    /// Ping control frame.
    Ping = 0x9,
    /// Pong control frame.
    Pong = 0xA,
}

impl Opcode {
    /// Decodes the 4-bit opcode field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for reserved values.
    pub fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            _ => Err(Error::protocol(format!("reserved opcode {bits:#x}"))),
        }
    }

    /// Returns the 4-bit wire value.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Returns `true` for close, ping and pong.
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        self.bits() & 0x8 != 0
    }

    /// Returns `true` for text, binary and continuation.
    #[inline]
    #[must_use]
    pub const fn is_data(self) -> bool {
        !self.is_control()
    }
}

// ============================================================================
// Frame
// ============================================================================

/// One protocol-level unit: header plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment of the message.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: Opcode,
    /// Unmasked payload bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates an unfragmented text frame.
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            fin: true,
            opcode: Opcode::Text,
            payload: data.into().into_bytes(),
        }
    }

    /// Creates an unfragmented binary frame.
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            opcode: Opcode::Binary,
            payload: data.into(),
        }
    }

    /// Creates a close frame.
    pub fn close(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            opcode: Opcode::Close,
            payload: payload.into(),
        }
    }

    /// Creates a ping frame.
    pub fn ping(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            opcode: Opcode::Ping,
            payload: payload.into(),
        }
    }

    /// Creates a pong frame.
    pub fn pong(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            opcode: Opcode::Pong,
            payload: payload.into(),
        }
    }

    /// Reads one frame from the stream.
    ///
    /// Returns `Ok(None)` if the stream ends cleanly before the first
    /// header byte. A stream ending anywhere inside a frame is a
    /// [`Error::Protocol`] (declared length not satisfied).
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] for reserved bits, reserved opcodes, wrong
    ///   masking direction, fragmented or oversized control frames, or a
    ///   truncated frame.
    /// - [`Error::Io`] for underlying transport failures.
    pub async fn read_from<R>(reader: &mut R, role: Role) -> Result<Option<Self>>
    where
        R: AsyncRead + Unpin,
    {
        // First header byte; EOF here is a clean end of stream.
        let mut head = [0u8; 1];
        if reader.read(&mut head).await? == 0 {
            return Ok(None);
        }
        let head1 = head[0];

        let fin = head1 & 0b1000_0000 != 0;
        if head1 & 0b0111_0000 != 0 {
            return Err(Error::protocol("reserved bits must be 0"));
        }
        let opcode = Opcode::from_bits(head1 & 0b0000_1111)?;

        let head2 = read_exact(reader, 1).await?[0];
        let masked = head2 & 0b1000_0000 != 0;
        if masked != role.expects_masked_input() {
            return Err(Error::protocol(if masked {
                "unexpected masked frame from server"
            } else {
                "client frame is not masked"
            }));
        }

        // Length field: inline, 16-bit or 64-bit.
        let len7 = head2 & 0b0111_1111;
        let length = match len7 {
            LEN16_MARKER => {
                let ext = read_exact(reader, 2).await?;
                u16::from_be_bytes([ext[0], ext[1]]) as u64
            }
            LEN64_MARKER => {
                let ext = read_exact(reader, 8).await?;
                u64::from_be_bytes(ext.try_into().expect("8-byte read"))
            }
            n => n as u64,
        };

        if opcode.is_control() {
            if !fin {
                return Err(Error::protocol("control frames must not be fragmented"));
            }
            if length > MAX_CONTROL_PAYLOAD as u64 {
                return Err(Error::protocol(format!(
                    "control frame payload of {length} bytes exceeds {MAX_CONTROL_PAYLOAD}"
                )));
            }
        }

        let mask = if masked {
            let key = read_exact(reader, 4).await?;
            Some([key[0], key[1], key[2], key[3]])
        } else {
            None
        };

        let length = usize::try_from(length)
            .map_err(|_| Error::protocol(format!("frame length {length} overflows usize")))?;
        let mut payload = read_exact(reader, length).await?;
        if let Some(key) = mask {
            apply_mask(&mut payload, key);
        }

        Ok(Some(Self {
            fin,
            opcode,
            payload,
        }))
    }

    /// Encodes the frame into bytes, ready to write to the stream.
    ///
    /// A client role sets the mask bit, appends a random 4-byte key and
    /// masks the payload; a server role writes the payload as-is. The
    /// length field is always the minimal width for the payload length.
    #[must_use]
    pub fn encode(&self, role: Role) -> Vec<u8> {
        let length = self.payload.len();
        let mask_bit = if role.masks_output() { 0b1000_0000 } else { 0 };

        let mut buf = Vec::with_capacity(length + 14);
        buf.push(u8::from(self.fin) << 7 | self.opcode.bits());

        if length <= LEN7_MAX {
            buf.push(mask_bit | length as u8);
        } else if length <= u16::MAX as usize {
            buf.push(mask_bit | LEN16_MARKER);
            buf.extend_from_slice(&(length as u16).to_be_bytes());
        } else {
            buf.push(mask_bit | LEN64_MARKER);
            buf.extend_from_slice(&(length as u64).to_be_bytes());
        }

        if role.masks_output() {
            let key: [u8; 4] = rand::random();
            buf.extend_from_slice(&key);
            let start = buf.len();
            buf.extend_from_slice(&self.payload);
            apply_mask(&mut buf[start..], key);
        } else {
            buf.extend_from_slice(&self.payload);
        }

        buf
    }

    /// Encodes and writes the frame to the stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the write fails.
    pub async fn write_into<W>(&self, writer: &mut W, role: Role) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.encode(role)).await?;
        writer.flush().await?;
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// XOR-masks `payload` in place with the 4-byte key, cycled.
///
/// Masking is an involution: applying it twice with the same key
/// reproduces the original payload.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Reads exactly `n` bytes, mapping a short stream to a protocol error.
async fn read_exact<R>(reader: &mut R, n: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; n];
    reader.read_exact(&mut buf).await.map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            Error::protocol("stream ended before the declared frame length was satisfied")
        } else {
            Error::Io(e)
        }
    })?;
    Ok(buf)
}

// ============================================================================
// Tests
// ============================================================================
