//! Session registry - the shared table of joined sessions

use super::session::{Recipient, Session, SessionId};
use crate::protocol::Message;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

/// Registry-specific errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Session {0} is already registered")]
    DuplicateSession(SessionId),
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Sessions the payload was queued for
    pub delivered: usize,

    /// Sessions whose queue rejected the payload and were told to leave
    pub evicted: Vec<SessionId>,
}

/// Table of live sessions keyed by id
///
/// All mutation goes through one lock. Broadcast copies its recipients while
/// holding the read guard and queues payloads after releasing it, so a stuck
/// peer never blocks registration or teardown of other sessions.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<BTreeMap<SessionId, Session>>,
    next_id: AtomicU64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh session id
    pub fn next_id(&self) -> SessionId {
        SessionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Insert a session under its id
    pub async fn register(&self, session: Session) -> Result<(), RegistryError> {
        let mut sessions = self.sessions.write().await;
        let id = session.id();
        if sessions.contains_key(&id) {
            return Err(RegistryError::DuplicateSession(id));
        }
        tracing::debug!("Registering session {} ({})", id, session.identity());
        sessions.insert(id, session);
        Ok(())
    }

    /// Remove a session, returning it if it was still present
    pub async fn deregister(&self, id: SessionId) -> Option<Session> {
        let removed = self.sessions.write().await.remove(&id);
        if removed.is_some() {
            tracing::debug!("Deregistered session {}", id);
        }
        removed
    }

    /// Queue a message for every session except `exclude`
    pub async fn broadcast(&self, message: &Message, exclude: Option<SessionId>) -> DeliveryReport {
        let recipients: Vec<Recipient> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|session| Some(session.id()) != exclude)
                .map(Session::recipient)
                .collect()
        };

        let payload = message.render();
        let mut report = DeliveryReport::default();

        for recipient in recipients {
            match recipient.deliver(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        "Failed to deliver message to session {}: {}",
                        recipient.id(),
                        e
                    );
                    report.evicted.push(recipient.id());
                }
            }
        }

        report
    }

    /// Ids and identities of joined sessions, in join order
    pub async fn snapshot(&self) -> Vec<(SessionId, String)> {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .map(|session| (session.id(), session.identity().to_string()))
            .collect()
    }

    pub async fn contains(&self, id: SessionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
