//! # starbond: Bond Engine for Shared-Realm Social Play
//!
//! Players who spend time together in a realm build up a Bond. Bonds grow with
//! every interaction, fade when left alone, and can be sealed for good once
//! both sides agree on it. Sealed Bonds that link a group of players together
//! form a Constellation.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `RelationshipStore`, `Progression` and `Notifier` are the
//!    contracts with the outside world
//! 2. **Clean DTOs**: `Bond`, `StarMemory`, `Constellation` cross all boundaries
//! 3. **Ledger owns nothing**: strength and mode rules are pure functions
//! 4. **No ambient state**: timers, pending seals and outbound events all
//!    belong to one `Starbond` instance
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use starbond::{EngineConfig, InteractionKind, ParticipantDescriptor, SealStep, Starbond};
//!
//! # async fn example() -> starbond::Result<()> {
//! let (bonds, mut outbound) = Starbond::open_memory(EngineConfig::default())?;
//! bonds.start();
//!
//! let ada = ParticipantDescriptor::new("ada", "Ada", "#ffcc00");
//! let bo = ParticipantDescriptor::new("bo", "Bo", "#3366ff");
//! bonds.record_interaction(&ada.id, &bo.id, &InteractionKind::Gift, Some("meadow")).await;
//!
//! // later, once the bond is strong enough:
//! bonds.submit_seal_word(&ada, &bo.id, "dawn", "meadow").await;
//! if let SealStep::Sealed(star) = bonds.submit_seal_word(&bo, &ada.id, "ember", "meadow").await {
//!     println!("{} now shines in {}", star.combined_phrase(), star.realm);
//! }
//!
//! while let Ok(envelope) = outbound.try_recv() {
//!     println!("push to {}: {:?}", envelope.to, envelope.event);
//! }
//! bonds.stop().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod config;
pub mod ledger;
pub mod storage;
pub mod collab;
pub mod events;
pub mod bond;
pub mod handshake;
pub mod constellation;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Bond, Mode, Consent, InteractionKind, SharedMemory, SealWords,
    StarMemory, StarId, RealmPosition,
    Constellation, ConstellationId, Rarity,
    ParticipantId, ParticipantDescriptor, PairKey,
};

// ============================================================================
// Re-exports: Engines, storage, collaborators
// ============================================================================

pub use config::{EngineConfig, PatternSpec};
pub use ledger::StrengthLedger;
pub use storage::{RelationshipStore, MemoryStore, StoreConfig};
pub use collab::{Progression, Notifier, NotificationCategory, NotifyOptions};
pub use events::{Outbound, Envelope, Outbox, RewardReason};
pub use bond::{BondEngine, InteractionOutcome, SealError, DecayReport, DecayScheduler};
pub use handshake::{HandshakeCoordinator, HandshakeStep, PendingSeal};
pub use constellation::ConstellationEngine;

// ============================================================================
// Top-level Starbond handle
// ============================================================================

/// The external services a `Starbond` instance calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub progression: Arc<dyn Progression>,
    pub notifier: Arc<dyn Notifier>,
}

impl Default for Collaborators {
    /// In-memory stand-ins that record instead of delivering.
    fn default() -> Self {
        Self {
            progression: Arc::new(collab::MemoryProgression::new()),
            notifier: Arc::new(collab::MemoryNotifier::new()),
        }
    }
}

/// Outcome of one seal-word submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SealStep {
    /// Word stored; the partner has been asked for theirs.
    Pending,
    /// This participant already has a word pending for the pair.
    AlreadyPending,
    Sealed(StarMemory),
    Failed(SealError),
}

/// The primary entry point. Wires a store and the collaborators to the Bond,
/// handshake and Constellation engines, and owns the decay timer.
pub struct Starbond<S: RelationshipStore> {
    store: Arc<S>,
    bonds: Arc<BondEngine<S>>,
    handshakes: HandshakeCoordinator,
    scheduler: DecayScheduler,
    outbox: Outbox,
}

impl<S: RelationshipStore> Starbond<S> {
    /// Build an instance. Fails if `config` does not validate.
    pub fn new(
        store: S,
        config: EngineConfig,
        collaborators: Collaborators,
        outbox: Outbox,
    ) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(store);
        let bonds = Arc::new(BondEngine::new(
            store.clone(),
            config,
            collaborators.progression,
            collaborators.notifier,
            outbox.clone(),
        ));
        Ok(Self {
            store,
            bonds,
            handshakes: HandshakeCoordinator::new(),
            scheduler: DecayScheduler::new(),
            outbox,
        })
    }

    /// Access the underlying store (for advanced use).
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &Arc<BondEngine<S>> {
        &self.bonds
    }

    pub fn config(&self) -> &EngineConfig {
        self.bonds.config()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the periodic decay sweep. Must be called inside a tokio runtime.
    /// Returns `false` if it is already running.
    pub fn start(&self) -> bool {
        let period = Duration::from_secs(self.config().decay.interval_secs);
        self.scheduler.start(self.bonds.clone(), period)
    }

    /// Stop the decay sweep and wait for it to wind down.
    pub async fn stop(&self) -> bool {
        self.scheduler.stop().await
    }

    /// Stop the decay sweep, then flush and release the store.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop().await;
        self.store.shutdown().await
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Run one decay sweep now, outside the schedule.
    pub async fn process_decay(&self) -> DecayReport {
        self.bonds.process_decay().await
    }

    // ========================================================================
    // Bonds
    // ========================================================================

    pub async fn bond(&self, a: &ParticipantId, b: &ParticipantId) -> Option<Bond> {
        self.bonds.get_bond(a, b).await
    }

    pub async fn create_bond(
        &self,
        a: &ParticipantId,
        b: &ParticipantId,
        realm: Option<&str>,
    ) -> Option<Bond> {
        self.bonds.create_bond(a, b, realm).await
    }

    /// Record an interaction and push `BondUpdated` to both participants.
    /// A sealed Bond does not change, so nothing is pushed for it.
    pub async fn record_interaction(
        &self,
        a: &ParticipantId,
        b: &ParticipantId,
        kind: &InteractionKind,
        realm: Option<&str>,
    ) -> Option<InteractionOutcome> {
        let outcome = self.bonds.record_interaction(a, b, kind, realm).await?;
        if outcome.bond.sealed && outcome.strength_delta == 0.0 {
            return Some(outcome);
        }
        for (to, partner) in [(a, b), (b, a)] {
            self.outbox.send(to, Outbound::BondUpdated {
                partner: partner.clone(),
                strength: outcome.bond.strength,
                strength_delta: outcome.strength_delta,
                mode: outcome.bond.mode,
                mode_changed: outcome.mode_changed,
            });
        }
        Some(outcome)
    }

    pub async fn add_shared_memory(&self, a: &ParticipantId, b: &ParticipantId, text: &str) -> bool {
        self.bonds.add_shared_memory(a, b, text).await
    }

    pub async fn set_consent(&self, a: &ParticipantId, b: &ParticipantId, consent: Consent) -> bool {
        self.bonds.set_consent(a, b, consent).await
    }

    /// Every Bond of `p`, strongest first.
    pub async fn bonds_for(&self, p: &ParticipantId) -> Vec<Bond> {
        self.bonds.bonds_for(p).await
    }

    // ========================================================================
    // Sealing
    // ========================================================================

    /// Submit `from`'s seal word for their Bond with `partner`.
    ///
    /// The first word of a pair is held until the partner answers; the
    /// partner is told a seal was requested. The second word, from the other
    /// side, triggers the seal and both sides hear the result.
    pub async fn submit_seal_word(
        &self,
        from: &ParticipantDescriptor,
        partner: &ParticipantId,
        word: &str,
        realm: &str,
    ) -> SealStep {
        let max = self.config().seal.max_word_chars;
        let Some(word) = bond::normalize_seal_word(word, max) else {
            return self.refuse(&from.id, partner, SealError::InvalidWord);
        };

        let step = match self.handshakes.submit(from, partner, &word, realm) {
            Ok(step) => step,
            Err(e) => {
                tracing::debug!(from = %from.id, error = %e, "seal submission rejected");
                return self.refuse(&from.id, partner, SealError::NotExists);
            }
        };

        match step {
            HandshakeStep::Opened => {
                self.outbox.send(partner, Outbound::SealRequested { from: from.clone() });
                self.outbox.send(&from.id, Outbound::SealPending { partner: partner.clone() });
                SealStep::Pending
            }
            HandshakeStep::Resubmitted => {
                self.outbox.send(&from.id, Outbound::SealPending { partner: partner.clone() });
                SealStep::AlreadyPending
            }
            HandshakeStep::Matched(first) => {
                let sealed = self.bonds
                    .seal_bond(&first.initiator, from, &first.word, &word, &first.realm)
                    .await;
                match sealed {
                    Ok(star) => {
                        for p in [&first.initiator.id, &from.id] {
                            self.outbox.send(p, Outbound::SealAccepted { star: star.clone() });
                        }
                        SealStep::Sealed(star)
                    }
                    Err(e) => {
                        tracing::info!(pair = %format!("{}:{}", first.initiator.id, from.id), reason = e.reason(), "seal failed");
                        self.send_failure(&first.initiator.id, &from.id, &e);
                        self.send_failure(&from.id, &first.initiator.id, &e);
                        SealStep::Failed(e)
                    }
                }
            }
        }
    }

    fn refuse(&self, to: &ParticipantId, partner: &ParticipantId, error: SealError) -> SealStep {
        self.send_failure(to, partner, &error);
        SealStep::Failed(error)
    }

    fn send_failure(&self, to: &ParticipantId, partner: &ParticipantId, error: &SealError) {
        self.outbox.send(to, Outbound::SealFailed {
            partner: partner.clone(),
            reason: error.reason().to_string(),
            message: error.to_string(),
        });
    }

    /// The seal negotiation waiting between `a` and `b`, if any.
    pub fn pending_seal(&self, a: &ParticipantId, b: &ParticipantId) -> Option<PendingSeal> {
        self.handshakes.pending(a, b)
    }

    pub fn pending_seal_count(&self) -> usize {
        self.handshakes.len()
    }

    // ========================================================================
    // Stars and Constellations
    // ========================================================================

    /// Stars `p` is part of, brightest first.
    pub async fn star_memories_for(&self, p: &ParticipantId) -> Vec<StarMemory> {
        self.bonds.star_memories_for(p).await
    }

    /// Every star in `realm`, brightest first.
    pub async fn star_memories_in_realm(&self, realm: &str) -> Vec<StarMemory> {
        self.bonds.star_memories_in_realm(realm).await
    }

    pub async fn constellations_for(&self, p: &ParticipantId) -> Vec<Constellation> {
        self.bonds.constellations().constellations_for(p).await
    }

    pub async fn constellations_in_realm(&self, realm: &str) -> Vec<Constellation> {
        self.bonds.constellations().constellations_in_realm(realm).await
    }

    pub async fn check_for_constellation(
        &self,
        participants: &[ParticipantId],
        realm: &str,
    ) -> Option<Constellation> {
        self.bonds.constellations().check_for_constellation(participants, realm).await
    }

    pub async fn expand_constellation(
        &self,
        id: ConstellationId,
        stars: &[StarId],
    ) -> Option<Constellation> {
        self.bonds.constellations().expand_constellation(id, stars).await
    }
}

/// In-memory instance for testing and embedding.
impl Starbond<MemoryStore> {
    /// Memory store, in-memory collaborators, and the receiving end of the
    /// outbound channel.
    pub fn open_memory(
        config: EngineConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Envelope>)> {
        Self::open(StoreConfig::Memory, config)
    }

    /// Open with the given store configuration.
    pub fn open(
        store: StoreConfig,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Envelope>)> {
        let store = match store {
            StoreConfig::Memory => MemoryStore::new(),
        };
        let (outbox, rx) = Outbox::channel();
        let bonds = Self::new(store, config, Collaborators::default(), outbox)?;
        Ok((bonds, rx))
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid pair: {0}")]
    InvalidPair(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Failure policy helpers
// ============================================================================

/// Log an engine-boundary error and convert to `Option`.
///
/// Engines never let a store failure escape a public call; it is logged here
/// and the caller sees "nothing found".
#[inline]
pub(crate) fn log_and_convert<T>(result: Result<T>, context: &str) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(context, error = %e, "degraded to empty result");
            None
        }
    }
}

/// Log an engine-boundary error and fall back to `T::default()`.
#[inline]
pub(crate) fn log_and_default<T: Default>(result: Result<T>, context: &str) -> T {
    log_and_convert(result, context).unwrap_or_default()
}
