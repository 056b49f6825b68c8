//! In-memory collaborators for tests and embedding.

use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::Mutex;

use super::{NotificationCategory, Notifier, NotifyOptions, Progression};
use crate::model::ParticipantId;
use crate::Result;

/// Keeps a running balance per participant.
#[derive(Debug, Clone, Default)]
pub struct MemoryProgression {
    balances: Arc<Mutex<HashMap<ParticipantId, u64>>>,
    credits: Arc<Mutex<Vec<(ParticipantId, u64)>>>,
}

impl MemoryProgression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, p: &ParticipantId) -> u64 {
        self.balances.lock().get(p).copied().unwrap_or(0)
    }

    /// Every credit, in call order.
    pub fn credits(&self) -> Vec<(ParticipantId, u64)> {
        self.credits.lock().clone()
    }
}

#[async_trait]
impl Progression for MemoryProgression {
    async fn credit_reward(&self, participant: &ParticipantId, amount: u64) -> Result<()> {
        *self.balances.lock().entry(participant.clone()).or_insert(0) += amount;
        self.credits.lock().push((participant.clone(), amount));
        Ok(())
    }
}

/// A notification captured by [`MemoryNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub to: ParticipantId,
    pub category: NotificationCategory,
    pub message: String,
    pub options: NotifyOptions,
}

/// Records notifications instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    sent: Arc<Mutex<Vec<SentNotification>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, p: &ParticipantId) -> Vec<SentNotification> {
        self.sent.lock().iter().filter(|n| &n.to == p).cloned().collect()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(
        &self,
        participant: &ParticipantId,
        category: NotificationCategory,
        message: &str,
        options: NotifyOptions,
    ) -> Result<()> {
        self.sent.lock().push(SentNotification {
            to: participant.clone(),
            category,
            message: message.to_string(),
            options,
        });
        Ok(())
    }
}
