//! # External Collaborators
//!
//! Narrow contracts for the services the engines call out to but do not own:
//!
//! | Trait | Used for |
//! |-------|----------|
//! | `Progression` | crediting seal and constellation rewards |
//! | `Notifier` | decay alerts (mode downgrade, fading bond) |
//!
//! Both are fire-and-forget from the engine's point of view: a failed call is
//! logged and the engine carries on.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::ParticipantId;
use crate::Result;

pub use memory::{MemoryNotifier, MemoryProgression, SentNotification};

/// Credits currency to participants.
#[async_trait]
pub trait Progression: Send + Sync + 'static {
    async fn credit_reward(&self, participant: &ParticipantId, amount: u64) -> Result<()>;
}

/// Category of a participant-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationCategory {
    /// A Bond dropped to a lower mode through decay.
    ModeDowngrade,
    /// A Bond's strength fell to the fading threshold.
    BondFading,
}

/// Delivery hints passed along with a notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotifyOptions {
    /// The other participant of the Bond the notification is about.
    pub partner: Option<ParticipantId>,
    /// Whether the client should surface it even when the player is busy.
    pub urgent: bool,
}

/// Sends notifications to participants.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(
        &self,
        participant: &ParticipantId,
        category: NotificationCategory,
        message: &str,
        options: NotifyOptions,
    ) -> Result<()>;
}
