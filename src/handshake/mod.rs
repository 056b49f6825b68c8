//! # Handshake Coordinator
//!
//! The two-party commit in front of `BondEngine::seal_bond`. Each side submits
//! a word on its own; the seal is attempted only once words from both sides
//! are in.
//!
//! ```text
//!   X submits ──▶ pending {pair → (X, word)}      X: pending, Y: seal requested
//!   X again   ──▶ unchanged                       X: pending
//!   Y submits ──▶ entry removed ──▶ seal_bond(X, Y)
//! ```
//!
//! State is process-local and in-memory: it does not survive a restart and is
//! not shared between instances. Pending entries never expire on their own.

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::model::{PairKey, ParticipantDescriptor, ParticipantId};
use crate::Result;

/// One side's commitment, waiting for the other.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSeal {
    pub initiator: ParticipantDescriptor,
    pub partner: ParticipantId,
    pub word: String,
    pub realm: String,
    pub requested_at: DateTime<Utc>,
}

/// What a submission did to the pending map.
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeStep {
    /// First word for this pair; stored.
    Opened,
    /// The initiator submitted again; the stored entry is kept as it was.
    Resubmitted,
    /// The other side had already committed. Its entry has been removed and is
    /// handed back so the caller can seal.
    Matched(PendingSeal),
}

#[derive(Debug, Default)]
pub struct HandshakeCoordinator {
    pending: Mutex<HashMap<PairKey, PendingSeal>>,
}

impl HandshakeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `from`'s word for a seal with `partner`.
    ///
    /// The check-and-remove runs under one lock, so of two concurrent
    /// submissions from different sides exactly one sees `Matched`.
    pub fn submit(
        &self,
        from: &ParticipantDescriptor,
        partner: &ParticipantId,
        word: &str,
        realm: &str,
    ) -> Result<HandshakeStep> {
        let key = PairKey::new(&from.id, partner)?;
        let mut pending = self.pending.lock();

        let same_side = pending.get(&key).map(|p| p.initiator.id == from.id);
        match same_side {
            Some(true) => return Ok(HandshakeStep::Resubmitted),
            Some(false) => {
                if let Some(entry) = pending.remove(&key) {
                    tracing::debug!(pair = %key, "seal handshake matched");
                    return Ok(HandshakeStep::Matched(entry));
                }
            }
            None => {}
        }

        pending.insert(key.clone(), PendingSeal {
            initiator: from.clone(),
            partner: partner.clone(),
            word: word.to_string(),
            realm: realm.to_string(),
            requested_at: Utc::now(),
        });
        tracing::debug!(pair = %key, initiator = %from.id, "seal handshake opened");
        Ok(HandshakeStep::Opened)
    }

    /// The pending negotiation between `a` and `b`, if any.
    pub fn pending(&self, a: &ParticipantId, b: &ParticipantId) -> Option<PendingSeal> {
        let key = PairKey::new(a, b).ok()?;
        self.pending.lock().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
