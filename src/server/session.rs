//! Session state for one joined connection

use super::connection::{Conduit, DeliveryError, Payload};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;

/// Opaque, never-reused session handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Request for a session's relay to tear it down
///
/// Raised by broadcasters when delivery fails and by the writer task when the
/// socket write fails. The permit is kept until the relay observes it.
#[derive(Debug, Clone, Default)]
pub struct EvictionSignal {
    notify: Arc<Notify>,
}

impl EvictionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.notify.notify_one();
    }

    /// Wait until the signal has been raised
    pub async fn raised(&self) {
        self.notify.notified().await;
    }
}

/// Server-side state of a joined client
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    identity: String,
    conduit: Conduit,
    eviction: EvictionSignal,
    joined_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        id: SessionId,
        identity: impl Into<String>,
        conduit: Conduit,
        eviction: EvictionSignal,
    ) -> Self {
        Self {
            id,
            identity: identity.into(),
            conduit,
            eviction,
            joined_at: Utc::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    /// Delivery handle that outlives the registry guard
    pub fn recipient(&self) -> Recipient {
        Recipient {
            id: self.id,
            conduit: self.conduit.clone(),
            eviction: self.eviction.clone(),
        }
    }
}

/// A session's delivery side, copied out of the registry for fan-out
#[derive(Debug, Clone)]
pub struct Recipient {
    id: SessionId,
    conduit: Conduit,
    eviction: EvictionSignal,
}

impl Recipient {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queue a payload; on failure ask the session's relay to leave
    pub fn deliver(&self, payload: Payload) -> Result<(), DeliveryError> {
        let result = self.conduit.try_deliver(payload);
        if result.is_err() {
            self.eviction.raise();
        }
        result
    }
}
