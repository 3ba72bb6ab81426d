//! Per-connection pump.
//!
//! A relay handler must keep receiving published updates for a peer
//! while it is blocked reading that peer's own messages. The pump
//! splits the session and runs two tasks:
//!
//! - the **reader task** turns inbound text messages into a queue the
//!   handler receives from, and forwards pings to the writer task
//! - the **writer task** drains the outbound queue that the handler and
//!   the coordinator's [`Outbox`](crate::coordinator::Outbox) handles
//!   feed, so publishes never block anyone
//!
//! Shutting down sends the close frame; the reader task then observes
//! the peer's close reply and both tasks end.

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace, warn};

use crate::coordinator::Outbox;
use crate::identifiers::PeerId;
use crate::server::http::ServerSession;
use crate::transport::session::{SessionEvent, SessionReader, SessionWriter};

// ============================================================================
// Writer commands
// ============================================================================

/// Internal commands for the writer task.
enum WriterCmd {
    /// Answer a ping.
    Pong(Vec<u8>),
    /// Send the close frame and stop.
    Close,
}

// ============================================================================
// Peer
// ============================================================================

/// Handler-side handle to one pumped connection.
pub struct Peer {
    id: PeerId,
    outbound_tx: UnboundedSender<String>,
    ctrl_tx: UnboundedSender<WriterCmd>,
    inbound_rx: UnboundedReceiver<String>,
}

impl Peer {
    /// Splits the session and spawns the reader and writer tasks.
    pub fn spawn(session: ServerSession) -> Self {
        let id = PeerId::next();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let (reader, writer) = session.into_split();
        tokio::spawn(run_reader(id, reader, inbound_tx, ctrl_tx.clone()));
        tokio::spawn(run_writer(id, writer, outbound_rx, ctrl_rx));

        Self {
            id,
            outbound_tx,
            ctrl_tx,
            inbound_rx,
        }
    }

    /// Returns this connection's ID.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> PeerId {
        self.id
    }

    /// Returns a handle the coordinator's sets can hold.
    #[must_use]
    pub fn outbox(&self) -> Outbox {
        Outbox::new(self.id, self.outbound_tx.clone())
    }

    /// Queues a text message; returns `false` once the pump is gone.
    pub fn send(&self, message: &str) -> bool {
        self.outbound_tx.send(message.to_owned()).is_ok()
    }

    /// Receives the peer's next text message.
    ///
    /// Returns `None` once the peer closed or the transport ended.
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound_rx.recv().await
    }

    /// Starts the close handshake and lets the tasks wind down.
    pub fn shutdown(&self) {
        let _ = self.ctrl_tx.send(WriterCmd::Close);
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// Reader task: inbound messages into the handler's queue.
async fn run_reader(
    id: PeerId,
    mut reader: SessionReader<tokio::io::BufReader<tokio::net::TcpStream>>,
    inbound_tx: UnboundedSender<String>,
    ctrl_tx: UnboundedSender<WriterCmd>,
) {
    loop {
        match reader.next_event().await {
            Ok(Some(SessionEvent::Message(message))) => match message.into_text() {
                Ok(text) => {
                    if inbound_tx.send(text).is_err() {
                        // Handler is gone; keep reading only to finish
                        // the close handshake.
                        continue;
                    }
                }
                Err(e) => {
                    warn!(peer = %id, error = %e, "binary message on a text protocol");
                    break;
                }
            },
            Ok(Some(SessionEvent::Ping(payload))) => {
                if ctrl_tx.send(WriterCmd::Pong(payload)).is_err() {
                    break;
                }
            }
            Ok(None) => {
                trace!(peer = %id, "peer closed");
                break;
            }
            Err(e) => {
                debug!(peer = %id, error = %e, "read failed");
                break;
            }
        }
    }

    // Dropping inbound_tx ends the handler's recv loop; tell the writer
    // to answer with our close frame.
    let _ = ctrl_tx.send(WriterCmd::Close);
}

/// Writer task: drains the outbound queue onto the socket.
async fn run_writer(
    id: PeerId,
    mut writer: SessionWriter<tokio::io::BufReader<tokio::net::TcpStream>>,
    mut outbound_rx: UnboundedReceiver<String>,
    mut ctrl_rx: UnboundedReceiver<WriterCmd>,
) {
    loop {
        tokio::select! {
            cmd = ctrl_rx.recv() => match cmd {
                Some(WriterCmd::Pong(payload)) => {
                    if writer.pong(payload).await.is_err() {
                        break;
                    }
                }
                Some(WriterCmd::Close) | None => {
                    let _ = writer.close(Vec::new()).await;
                    break;
                }
            },
            message = outbound_rx.recv() => match message {
                Some(text) => {
                    if let Err(e) = writer.send_text(&text).await {
                        debug!(peer = %id, error = %e, "write failed");
                        break;
                    }
                }
                None => {
                    // Every outbox dropped: nothing can be delivered to
                    // this peer anymore.
                    let _ = writer.close(Vec::new()).await;
                    break;
                }
            },
        }
    }

    trace!(peer = %id, "writer task ended");
}
