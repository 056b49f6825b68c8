//! Outbound push messages.
//!
//! Engines never talk to the transport directly. They push [`Envelope`]s into
//! an [`Outbox`] handed to them at construction; whoever owns the receiving
//! end forwards them to connected participants.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::model::{Constellation, Mode, ParticipantDescriptor, ParticipantId, StarMemory};

/// Why a reward was credited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RewardReason {
    Seal,
    ConstellationFormed,
    ConstellationJoined,
}

/// A message for one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Outbound {
    BondUpdated {
        partner: ParticipantId,
        strength: f64,
        strength_delta: f64,
        mode: Mode,
        mode_changed: bool,
    },
    /// The partner submitted a seal word and is waiting for ours.
    SealRequested { from: ParticipantDescriptor },
    /// Our seal word is stored; waiting for the partner.
    SealPending { partner: ParticipantId },
    SealAccepted { star: StarMemory },
    SealFailed {
        partner: ParticipantId,
        /// Stable machine-readable reason, e.g. `below-threshold`.
        reason: String,
        message: String,
    },
    ConstellationFormed { constellation: Constellation },
    /// Sent to existing members when new members join.
    ConstellationExpanded {
        constellation: Constellation,
        new_members: Vec<ParticipantId>,
    },
    /// Sent to the new members themselves.
    ConstellationJoined { constellation: Constellation },
    RewardDistributed { amount: u64, reason: RewardReason },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub to: ParticipantId,
    pub event: Outbound,
}

/// Sending half of the outbound queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: Option<mpsc::UnboundedSender<Envelope>>,
}

impl Outbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// An outbox that discards everything.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, to: &ParticipantId, event: Outbound) {
        let Some(tx) = &self.tx else { return };
        if tx.send(Envelope { to: to.clone(), event }).is_err() {
            tracing::warn!(to = %to, "outbound receiver dropped; event discarded");
        }
    }
}

/// Take everything currently queued without waiting.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> Vec<Envelope> {
    let mut out = Vec::new();
    while let Ok(env) = rx.try_recv() {
        out.push(env);
    }
    out
}
