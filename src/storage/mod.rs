//! # Relationship Store Trait
//!
//! This is THE contract between the engines and durable storage.
//! Every read and write the Bond and Constellation engines need is here.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryStore` | `memory` | In-memory for testing/embedding |

pub mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::*;
use crate::Result;

pub use memory::MemoryStore;

// ============================================================================
// Store Configuration
// ============================================================================

/// Selects a store implementation.
#[derive(Debug, Clone, Default)]
pub enum StoreConfig {
    /// In-memory (no persistence)
    #[default]
    Memory,
}

// ============================================================================
// RelationshipStore Trait
// ============================================================================

/// The storage contract for Bonds, StarMemories and Constellations.
///
/// Writes are last-write-wins at the document level. Callers that need a
/// read-modify-write to be atomic serialize it themselves (the Bond engine
/// does so per pair).
#[async_trait]
pub trait RelationshipStore: Send + Sync + 'static {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Flush and release resources.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    // ========================================================================
    // Bonds
    // ========================================================================

    /// Get a Bond by its canonical pair key.
    async fn get_bond(&self, key: &PairKey) -> Result<Option<Bond>>;

    /// Insert `bond` unless one already exists for its pair.
    ///
    /// Returns the stored Bond and whether it was created by this call.
    async fn insert_bond_if_absent(&self, bond: Bond) -> Result<(Bond, bool)>;

    /// Replace a Bond (upsert).
    async fn put_bond(&self, bond: &Bond) -> Result<()>;

    /// All Bonds with `p` on either side.
    async fn bonds_for_participant(&self, p: &ParticipantId) -> Result<Vec<Bond>>;

    /// Unsealed Bonds whose last interaction is strictly before `before`.
    async fn stale_bonds(&self, before: DateTime<Utc>) -> Result<Vec<Bond>>;

    async fn bond_count(&self) -> Result<u64>;

    /// Sealed Bonds whose both endpoints are in `participants`.
    ///
    /// Default: query each participant and keep in-set sealed Bonds once.
    async fn sealed_bonds_among(
        &self,
        participants: &BTreeSet<ParticipantId>,
    ) -> Result<Vec<Bond>> {
        let mut seen = BTreeSet::new();
        let mut result = Vec::new();
        for p in participants {
            for bond in self.bonds_for_participant(p).await? {
                let inside = participants.contains(bond.key.low())
                    && participants.contains(bond.key.high());
                if bond.sealed && inside && seen.insert(bond.key.clone()) {
                    result.push(bond);
                }
            }
        }
        Ok(result)
    }

    // ========================================================================
    // StarMemories
    // ========================================================================

    /// Persist a new StarMemory and assign its id.
    async fn insert_star_memory(&self, star: NewStarMemory) -> Result<StarMemory>;

    async fn get_star_memory(&self, id: StarId) -> Result<Option<StarMemory>>;

    /// Replace a StarMemory. Fails with `NotFound` if it does not exist.
    async fn put_star_memory(&self, star: &StarMemory) -> Result<()>;

    /// Remove a StarMemory. Returns `false` if it did not exist.
    async fn delete_star_memory(&self, id: StarId) -> Result<bool>;

    async fn star_memories_for_participant(&self, p: &ParticipantId) -> Result<Vec<StarMemory>>;

    async fn star_memories_in_realm(&self, realm: &str) -> Result<Vec<StarMemory>>;

    // ========================================================================
    // Constellations
    // ========================================================================

    /// Persist a new Constellation and assign its id.
    ///
    /// Stores should reject a second Constellation with the same realm and
    /// participant set with `ConstraintViolation`.
    async fn insert_constellation(&self, constellation: NewConstellation) -> Result<Constellation>;

    async fn get_constellation(&self, id: ConstellationId) -> Result<Option<Constellation>>;

    /// Replace a Constellation. Fails with `NotFound` if it does not exist.
    async fn put_constellation(&self, constellation: &Constellation) -> Result<()>;

    async fn constellations_in_realm(&self, realm: &str) -> Result<Vec<Constellation>>;

    async fn constellations_for_participant(&self, p: &ParticipantId) -> Result<Vec<Constellation>>;
}
