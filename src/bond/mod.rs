//! # Bond Engine
//!
//! Owns the Bond lifecycle:
//!
//! ```text
//!   first interaction ──▶ silent ──▶ whisper ──▶ voice ──▶ sealed (terminal)
//!                           ▲           │          │
//!                           └── decay ──┴──────────┘
//! ```
//!
//! `record_interaction` is the only way strength goes up; the decay sweep
//! (see [`decay`]) is the only way it goes down. Sealing freezes a Bond,
//! leaves a StarMemory behind and hands the group over to the
//! Constellation engine.
//!
//! Every public method follows the same failure policy: store errors are
//! logged and turned into `None` / `false` / empty results. Only
//! [`BondEngine::seal_bond`] reports failures, as a [`SealError`].

pub mod decay;
pub mod locks;

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;

use crate::collab::{Notifier, Progression};
use crate::config::EngineConfig;
use crate::constellation::ConstellationEngine;
use crate::events::{Outbound, Outbox, RewardReason};
use crate::ledger::StrengthLedger;
use crate::model::*;
use crate::storage::RelationshipStore;
use crate::{log_and_convert, log_and_default, Result};

pub use decay::{DecayReport, DecayScheduler};
use locks::PairLocks;

/// Horizontal half-extent of realm-space; stars land in `[-E, E)` on x and z.
const REALM_EXTENT: f64 = 500.0;
/// Stars hang between these heights.
const SKY_LOW: f64 = 120.0;
const SKY_HIGH: f64 = 320.0;

// ============================================================================
// Results
// ============================================================================

/// What one `record_interaction` call did.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionOutcome {
    pub bond: Bond,
    /// Strength actually added after clamping (0 for a sealed Bond).
    pub strength_delta: f64,
    pub mode_changed: bool,
    /// Whether this call created the Bond.
    pub created: bool,
}

/// Why a seal did not happen.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SealError {
    #[error("no bond exists between these participants")]
    NotExists,

    #[error("this bond is already sealed")]
    AlreadySealed,

    #[error("bond strength {strength:.1} is below the seal threshold {required:.1}")]
    BelowThreshold { strength: f64, required: f64 },

    #[error("seal word is empty")]
    InvalidWord,

    #[error("store failure: {0}")]
    Store(String),
}

impl SealError {
    /// Stable reason code sent to clients.
    pub fn reason(&self) -> &'static str {
        match self {
            SealError::NotExists => "not-exists",
            SealError::AlreadySealed => "already-sealed",
            SealError::BelowThreshold { .. } => "below-threshold",
            SealError::InvalidWord => "invalid-word",
            SealError::Store(_) => "store-failure",
        }
    }
}

impl From<crate::Error> for SealError {
    fn from(e: crate::Error) -> Self {
        SealError::Store(e.to_string())
    }
}

/// Trim a seal word and cut it to `max_chars` characters. `None` if nothing
/// is left.
pub fn normalize_seal_word(word: &str, max_chars: usize) -> Option<String> {
    let word: String = word.trim().chars().take(max_chars).collect();
    let word = word.trim_end().to_string();
    if word.is_empty() { None } else { Some(word) }
}

fn random_position() -> RealmPosition {
    let mut rng = rand::thread_rng();
    RealmPosition {
        x: rng.gen_range(-REALM_EXTENT..REALM_EXTENT),
        y: rng.gen_range(SKY_LOW..SKY_HIGH),
        z: rng.gen_range(-REALM_EXTENT..REALM_EXTENT),
    }
}

// ============================================================================
// BondEngine
// ============================================================================

pub struct BondEngine<S: RelationshipStore> {
    store: Arc<S>,
    ledger: StrengthLedger,
    config: EngineConfig,
    locks: Arc<PairLocks>,
    constellations: ConstellationEngine<S>,
    progression: Arc<dyn Progression>,
    notifier: Arc<dyn Notifier>,
    outbox: Outbox,
}

impl<S: RelationshipStore> BondEngine<S> {
    pub fn new(
        store: Arc<S>,
        config: EngineConfig,
        progression: Arc<dyn Progression>,
        notifier: Arc<dyn Notifier>,
        outbox: Outbox,
    ) -> Self {
        let locks = Arc::new(PairLocks::new());
        let constellations = ConstellationEngine::new(
            store.clone(),
            locks.clone(),
            &config,
            progression.clone(),
            outbox.clone(),
        );
        Self {
            store,
            ledger: StrengthLedger::from_config(&config),
            config,
            locks,
            constellations,
            progression,
            notifier,
            outbox,
        }
    }

    pub fn ledger(&self) -> &StrengthLedger {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn constellations(&self) -> &ConstellationEngine<S> {
        &self.constellations
    }

    // ========================================================================
    // Lookup / create
    // ========================================================================

    /// The Bond between `a` and `b`, in either order.
    pub async fn get_bond(&self, a: &ParticipantId, b: &ParticipantId) -> Option<Bond> {
        let key = log_and_convert(PairKey::new(a, b), "get_bond")?;
        log_and_convert(self.store.get_bond(&key).await, "get_bond").flatten()
    }

    /// Idempotent: returns the existing Bond if the pair already has one.
    pub async fn create_bond(
        &self,
        a: &ParticipantId,
        b: &ParticipantId,
        realm: Option<&str>,
    ) -> Option<Bond> {
        let key = log_and_convert(PairKey::new(a, b), "create_bond")?;
        let _guard = self.locks.lock(&key).await;
        log_and_convert(self.ensure_bond(key, realm).await, "create_bond").map(|(bond, _)| bond)
    }

    async fn ensure_bond(&self, key: PairKey, realm: Option<&str>) -> Result<(Bond, bool)> {
        let fresh = Bond::new(
            key,
            realm.map(str::to_string),
            self.ledger.clamp(self.config.initial_strength),
            Utc::now(),
        );
        let (bond, created) = self.store.insert_bond_if_absent(fresh).await?;
        if created {
            tracing::debug!(pair = %bond.key, realm = ?bond.realm, "bond created");
        }
        Ok((bond, created))
    }

    // ========================================================================
    // Interactions
    // ========================================================================

    /// Apply one interaction between `a` and `b`, creating their Bond on
    /// first contact.
    ///
    /// A sealed Bond is frozen: the call returns it untouched with a zero
    /// delta.
    pub async fn record_interaction(
        &self,
        a: &ParticipantId,
        b: &ParticipantId,
        kind: &InteractionKind,
        realm: Option<&str>,
    ) -> Option<InteractionOutcome> {
        log_and_convert(self.try_record(a, b, kind, realm).await, "record_interaction")
    }

    async fn try_record(
        &self,
        a: &ParticipantId,
        b: &ParticipantId,
        kind: &InteractionKind,
        realm: Option<&str>,
    ) -> Result<InteractionOutcome> {
        let key = PairKey::new(a, b)?;
        let _guard = self.locks.lock(&key).await;
        let (mut bond, created) = self.ensure_bond(key, realm).await?;

        if bond.sealed {
            return Ok(InteractionOutcome { bond, strength_delta: 0.0, mode_changed: false, created });
        }

        let before = bond.strength;
        bond.strength = self.ledger.clamp(before + self.ledger.gain_for(kind));
        bond.last_interaction = Utc::now();
        *bond.interactions.entry(kind.as_str().to_string()).or_insert(0) += 1;
        if bond.realm.is_none() {
            bond.realm = realm.map(str::to_string);
        }

        let old_mode = bond.mode;
        bond.mode = self.ledger.transition(bond.strength, old_mode, bond.sealed);
        self.store.put_bond(&bond).await?;

        let mode_changed = bond.mode != old_mode;
        if mode_changed {
            tracing::info!(pair = %bond.key, from = %old_mode, to = %bond.mode, "bond mode changed");
        }
        tracing::debug!(pair = %bond.key, %kind, strength = bond.strength, "interaction recorded");

        Ok(InteractionOutcome {
            strength_delta: bond.strength - before,
            bond,
            mode_changed,
            created,
        })
    }

    /// Append a shared memory to an unsealed Bond. `false` if there is no
    /// such Bond, it is sealed, or the store failed.
    pub async fn add_shared_memory(&self, a: &ParticipantId, b: &ParticipantId, text: &str) -> bool {
        log_and_default(self.try_add_memory(a, b, text).await, "add_shared_memory")
    }

    async fn try_add_memory(&self, a: &ParticipantId, b: &ParticipantId, text: &str) -> Result<bool> {
        let key = PairKey::new(a, b)?;
        let _guard = self.locks.lock(&key).await;
        let Some(mut bond) = self.store.get_bond(&key).await? else {
            return Ok(false);
        };
        if bond.sealed {
            return Ok(false);
        }
        let text: String = text.chars().take(self.config.memory_max_chars).collect();
        bond.push_memory(SharedMemory { text, recorded_at: Utc::now() }, self.config.memory_capacity);
        self.store.put_bond(&bond).await?;
        Ok(true)
    }

    /// Set consent on an unsealed Bond. `false` if there is no such Bond, it
    /// is sealed, or the store failed.
    pub async fn set_consent(&self, a: &ParticipantId, b: &ParticipantId, consent: Consent) -> bool {
        log_and_default(self.try_set_consent(a, b, consent).await, "set_consent")
    }

    async fn try_set_consent(&self, a: &ParticipantId, b: &ParticipantId, consent: Consent) -> Result<bool> {
        let key = PairKey::new(a, b)?;
        let _guard = self.locks.lock(&key).await;
        let Some(mut bond) = self.store.get_bond(&key).await? else {
            return Ok(false);
        };
        if bond.sealed {
            return Ok(false);
        }
        if bond.consent != consent {
            bond.consent = consent;
            self.store.put_bond(&bond).await?;
        }
        Ok(true)
    }

    // ========================================================================
    // Sealing
    // ========================================================================

    /// Seal the Bond between two participants with their chosen words.
    ///
    /// Words are stored in canonical pair order, whichever side submitted
    /// first. On success both sides are credited the seal reward and the pair
    /// plus their sealed partners are checked for a Constellation.
    pub async fn seal_bond(
        &self,
        first: &ParticipantDescriptor,
        second: &ParticipantDescriptor,
        first_word: &str,
        second_word: &str,
        realm: &str,
    ) -> std::result::Result<StarMemory, SealError> {
        let max = self.config.seal.max_word_chars;
        let first_word = normalize_seal_word(first_word, max).ok_or(SealError::InvalidWord)?;
        let second_word = normalize_seal_word(second_word, max).ok_or(SealError::InvalidWord)?;
        let key = PairKey::new(&first.id, &second.id).map_err(|_| SealError::NotExists)?;

        let star = {
            let _guard = self.locks.lock(&key).await;

            let mut bond = self.store.get_bond(&key).await?.ok_or(SealError::NotExists)?;
            if bond.sealed {
                return Err(SealError::AlreadySealed);
            }
            let required = self.config.seal.threshold;
            if bond.strength < required {
                return Err(SealError::BelowThreshold { strength: bond.strength, required });
            }

            let (low, high, low_word, high_word) = if key.low() == &first.id {
                (first, second, first_word, second_word)
            } else {
                (second, first, second_word, first_word)
            };

            let now = Utc::now();
            let star = self.store.insert_star_memory(NewStarMemory {
                pair: key.clone(),
                participants: [low.clone(), high.clone()],
                words: [low_word.clone(), high_word.clone()],
                realm: realm.to_string(),
                position: random_position(),
                brightness: self.ledger.brightness_for(bond.strength),
                created_at: now,
            }).await?;

            bond.sealed = true;
            bond.seal_words = Some(SealWords { low: low_word, high: high_word });
            bond.sealed_at = Some(now);
            bond.star_memory = Some(star.id);
            if bond.realm.is_none() {
                bond.realm = Some(realm.to_string());
            }
            if let Err(e) = self.store.put_bond(&bond).await {
                tracing::warn!(pair = %key, star = %star.id, error = %e, "bond seal failed; removing star");
                if let Err(cleanup) = self.store.delete_star_memory(star.id).await {
                    tracing::error!(pair = %key, star = %star.id, error = %cleanup, "orphaned star left behind");
                }
                return Err(e.into());
            }
            star
        };

        tracing::info!(pair = %key, star = %star.id, phrase = %star.combined_phrase(), realm, "bond sealed");

        let reward = self.config.seal.reward;
        for p in [key.low(), key.high()] {
            self.credit(p, reward, RewardReason::Seal).await;
        }

        let candidates = self.sealed_circle(&key).await;
        self.constellations.check_for_constellation(&candidates, realm).await;

        Ok(star)
    }

    /// The pair plus every sealed partner of either side.
    async fn sealed_circle(&self, key: &PairKey) -> Vec<ParticipantId> {
        let mut circle = std::collections::BTreeSet::new();
        for p in [key.low(), key.high()] {
            circle.insert(p.clone());
            let bonds = log_and_default(self.store.bonds_for_participant(p).await, "sealed_circle");
            circle.extend(
                bonds.iter()
                    .filter(|b| b.sealed)
                    .filter_map(|b| b.partner_of(p).cloned()),
            );
        }
        circle.into_iter().collect()
    }

    async fn credit(&self, p: &ParticipantId, amount: u64, reason: RewardReason) {
        if amount == 0 {
            return;
        }
        match self.progression.credit_reward(p, amount).await {
            Ok(()) => self.outbox.send(p, Outbound::RewardDistributed { amount, reason }),
            Err(e) => tracing::warn!(participant = %p, amount, error = %e, "reward credit failed"),
        }
    }

    // ========================================================================
    // Read views
    // ========================================================================

    /// Every Bond of `p`, strongest first.
    pub async fn bonds_for(&self, p: &ParticipantId) -> Vec<Bond> {
        let mut bonds = log_and_default(self.store.bonds_for_participant(p).await, "bonds_for");
        bonds.sort_by(|x, y| y.strength.total_cmp(&x.strength));
        bonds
    }

    /// Stars `p` is part of, brightest first.
    pub async fn star_memories_for(&self, p: &ParticipantId) -> Vec<StarMemory> {
        let mut stars = log_and_default(
            self.store.star_memories_for_participant(p).await,
            "star_memories_for",
        );
        stars.sort_by(|x, y| y.brightness.total_cmp(&x.brightness));
        stars
    }

    /// Every star in `realm`, brightest first.
    pub async fn star_memories_in_realm(&self, realm: &str) -> Vec<StarMemory> {
        let mut stars = log_and_default(
            self.store.star_memories_in_realm(realm).await,
            "star_memories_in_realm",
        );
        stars.sort_by(|x, y| y.brightness.total_cmp(&x.brightness));
        stars
    }
}

// ============================================================================
// Tests
// ============================================================================
