use std::fmt;
use std::sync::Weak;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use uuid::Uuid;

use super::broadcaster::Registry;
use super::event::PipelineEvent;

/// Registration key of a subscription inside the broadcaster
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One observer's bounded mailbox plus its membership in the broadcaster.
///
/// Dropping the subscription unregisters it, so every exit path of whoever
/// owns it (return, error, task abort) releases the slot. The back-reference
/// is weak: a subscription never keeps the broadcaster alive.
pub struct Subscription {
    id: SubscriberId,
    mailbox: mpsc::Receiver<PipelineEvent>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriberId,
        mailbox: mpsc::Receiver<PipelineEvent>,
        registry: Weak<Registry>,
    ) -> Self {
        Self {
            id,
            mailbox,
            registry,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the subscription has been unsubscribed (or the
    /// broadcaster shut down) and the mailbox is drained.
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        self.mailbox.recv().await
    }

    /// Take the next queued event without waiting
    pub fn try_recv(&mut self) -> Option<PipelineEvent> {
        match self.mailbox.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Number of events waiting in the mailbox
    pub fn pending(&self) -> usize {
        self.mailbox.len()
    }

    /// Whether the broadcaster still has this subscription registered
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| registry.contains(self.id))
            .unwrap_or(false)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("pending", &self.pending())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}
