//! Per-connection relay loop
//!
//! A connection moves through handshake, joined and leaving phases. The
//! first frame names the session; every later frame is recorded to history
//! and broadcast to the other sessions. Read failure, clean close or an
//! eviction request ends the loop, after which the session is removed and its
//! departure announced.

use super::connection::{read_frame, session_writer_task, Conduit};
use super::registry::SessionRegistry;
use super::session::{EvictionSignal, Session, SessionId};
use crate::config::ServerConfig;
use crate::history::{HistoryRecord, HistoryRecorder};
use crate::protocol::Message;
use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// Everything a relay needs besides its own connection
#[derive(Clone)]
pub struct RelayContext {
    pub registry: Arc<SessionRegistry>,
    pub history: Option<HistoryRecorder>,
    pub settings: Arc<ServerConfig>,
}

impl RelayContext {
    pub fn new(
        registry: Arc<SessionRegistry>,
        history: Option<HistoryRecorder>,
        settings: ServerConfig,
    ) -> Self {
        Self {
            registry,
            history,
            settings: Arc::new(settings),
        }
    }

    fn record(&self, sender: &str, body: &[u8]) {
        if let Some(history) = &self.history {
            history.submit(HistoryRecord::new(
                sender,
                String::from_utf8_lossy(body).into_owned(),
            ));
        }
    }
}

/// Why the joined phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeaveReason {
    Closed,
    ReadFailed,
    Evicted,
}

/// Drive one connection from handshake to teardown
pub async fn run_relay<R, W>(mut reader: R, writer: W, peer: String, ctx: RelayContext) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let identity = match handshake(&mut reader, &ctx).await {
        Some(identity) => identity,
        None => {
            tracing::debug!("Connection from {} closed before joining", peer);
            return Ok(());
        }
    };

    let id = ctx.registry.next_id();
    let eviction = EvictionSignal::new();
    let (conduit, receiver) = Conduit::channel(ctx.settings.conduit_capacity);
    let writer_handle = tokio::spawn(session_writer_task(writer, receiver, eviction.clone()));

    let session = Session::new(id, identity.clone(), conduit, eviction.clone());
    if let Err(e) = ctx.registry.register(session).await {
        writer_handle.abort();
        return Err(e.into());
    }

    tracing::info!("{} ({}) joined as session {}", identity, peer, id);
    ctx.registry
        .broadcast(&Message::join(identity.as_str()), Some(id))
        .await;

    let reason = relay_messages(&mut reader, id, &identity, &eviction, &ctx).await;

    if let Some(session) = ctx.registry.deregister(id).await {
        ctx.registry
            .broadcast(&Message::leave(session.identity()), None)
            .await;
        let duration = chrono::Utc::now() - session.joined_at();
        tracing::info!(
            "{} ({}) left session {} after {}s ({:?})",
            session.identity(),
            peer,
            id,
            duration.num_seconds(),
            reason
        );
    }

    writer_handle.abort();
    Ok(())
}

/// Read the identity frame; `None` rejects the connection
async fn handshake<R>(reader: &mut R, ctx: &RelayContext) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let max = ctx.settings.max_message_size;
    let timeout = ctx.settings.handshake_timeout();

    let frame = if timeout.is_zero() {
        read_frame(reader, max).await
    } else {
        match tokio::time::timeout(timeout, read_frame(reader, max)).await {
            Ok(frame) => frame,
            Err(_) => {
                tracing::debug!("Handshake timed out");
                return None;
            }
        }
    };

    match frame {
        Ok(Some(bytes)) => {
            let identity = String::from_utf8_lossy(&bytes).trim().to_string();
            if identity.is_empty() {
                tracing::debug!("Client did not provide a name");
                None
            } else if !Message::join(identity.as_str()).fits_frame() {
                tracing::debug!("Client name of {} bytes is too long", identity.len());
                None
            } else {
                Some(identity)
            }
        }
        Ok(None) => None,
        Err(e) => {
            tracing::debug!("Handshake read failed: {}", e);
            None
        }
    }
}

async fn relay_messages<R>(
    reader: &mut R,
    id: SessionId,
    identity: &str,
    eviction: &EvictionSignal,
    ctx: &RelayContext,
) -> LeaveReason
where
    R: AsyncRead + Unpin,
{
    let max = ctx.settings.max_message_size;

    loop {
        tokio::select! {
            _ = eviction.raised() => {
                tracing::warn!("Session {} evicted after failed delivery", id);
                return LeaveReason::Evicted;
            }

            frame = read_frame(reader, max) => {
                match frame {
                    Ok(Some(body)) => {
                        if body.is_empty() {
                            continue;
                        }
                        let message = Message::chat(identity, body);
                        if !message.fits_frame() {
                            tracing::warn!(
                                "Dropping message from session {}: {} bytes once tagged",
                                id,
                                message.rendered_len()
                            );
                            continue;
                        }
                        tracing::debug!("Broadcasting {} bytes from {}", message.body.len(), identity);
                        ctx.record(identity, &message.body);
                        ctx.registry.broadcast(&message, Some(id)).await;
                    }
                    Ok(None) => return LeaveReason::Closed,
                    Err(e) => {
                        tracing::warn!("Error reading from session {}: {}", id, e);
                        return LeaveReason::ReadFailed;
                    }
                }
            }
        }
    }
}
