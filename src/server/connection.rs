//! Framed connection handling and the per-session outbound conduit

use super::session::EvictionSignal;
use crate::protocol::{check_frame_length, frame_message, ProtocolError, LENGTH_PREFIX_SIZE};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// A rendered message, shared between every conduit it is queued on
pub type Payload = Arc<[u8]>;

/// Why a payload could not be queued for a session
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Outbound queue is full")]
    Full,

    #[error("Outbound queue is closed")]
    Closed,
}

/// Sending side of a session's outbound queue
///
/// Any number of broadcasters hold clones; the session's writer task is the
/// only consumer, so writes to the socket are never interleaved.
#[derive(Debug, Clone)]
pub struct Conduit {
    sender: mpsc::Sender<Payload>,
}

impl Conduit {
    /// Create a conduit and the receiver its writer task drains
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Payload>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Queue a payload without waiting
    pub fn try_deliver(&self, payload: Payload) -> Result<(), DeliveryError> {
        self.sender.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Read one length-prefixed frame from a stream
///
/// Returns `Ok(None)` when the peer closed the stream cleanly on a frame
/// boundary. A close in the middle of a frame is an error.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_size: u32,
) -> Result<Option<Vec<u8>>, ProtocolError> {
    let mut len_bytes = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;

    while filled < LENGTH_PREFIX_SIZE {
        let n = reader.read(&mut len_bytes[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(ProtocolError::TruncatedFrame);
        }
        filled += n;
    }

    let len = check_frame_length(u32::from_be_bytes(len_bytes), max_size)?;

    let mut buffer = vec![0u8; len];
    match reader.read_exact(&mut buffer).await {
        Ok(_) => Ok(Some(buffer)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(ProtocolError::TruncatedFrame)
        }
        Err(e) => Err(e.into()),
    }
}

/// Write one length-prefixed frame to a stream
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), ProtocolError> {
    let framed = frame_message(payload);
    writer.write_all(&framed).await?;
    writer.flush().await?;
    Ok(())
}

/// Task draining a session's conduit onto its socket
///
/// Ends when every conduit clone is dropped or a write fails. A failed write
/// raises the session's eviction signal so the relay tears the session down.
pub async fn session_writer_task<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut receiver: mpsc::Receiver<Payload>,
    eviction: EvictionSignal,
) {
    while let Some(payload) = receiver.recv().await {
        if let Err(e) = write_frame(&mut writer, &payload).await {
            tracing::warn!("Failed to write message to session: {}", e);
            eviction.raise();
            return;
        }
    }

    let _ = writer.shutdown().await;
    tracing::debug!("Session writer task finished");
}
