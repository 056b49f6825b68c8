//! In-memory relationship store.
//!
//! This is the reference implementation of `RelationshipStore`.
//! It uses hash maps protected by `RwLock`.
//!
//! ## Limitations
//!
//! - **No persistence**: everything is lost when the store is dropped.
//! - **Per-collection locks**: a Bond write and a StarMemory write are two
//!   independent operations, not one transaction.
//! - **Query scans**: star and constellation queries scan their collection.
//!   Bonds are indexed by participant and, while unsealed, by
//!   `last_interaction` so the decay sweep is a range scan.
//!
//! `set_unavailable(true)` makes every call fail with `Error::Storage`, to
//! exercise the engines' degrade paths.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::model::*;
use crate::{Error, Result};
use super::RelationshipStore;

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory Bond / StarMemory / Constellation storage.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    bonds: RwLock<BondTable>,
    stars: RwLock<HashMap<StarId, StarMemory>>,
    constellations: RwLock<HashMap<ConstellationId, Constellation>>,
    next_star_id: AtomicU64,
    next_constellation_id: AtomicU64,
    unavailable: AtomicBool,
}

/// Bonds plus their secondary indexes, updated under one lock.
#[derive(Default)]
struct BondTable {
    by_key: HashMap<PairKey, Bond>,
    /// participant → pairs they belong to
    by_participant: HashMap<ParticipantId, BTreeSet<PairKey>>,
    /// (last_interaction, pair) for unsealed bonds only
    staleness: BTreeSet<(DateTime<Utc>, PairKey)>,
}

impl BondTable {
    fn upsert(&mut self, bond: Bond) {
        if let Some(old) = self.by_key.get(&bond.key) {
            self.staleness.remove(&(old.last_interaction, old.key.clone()));
        } else {
            for p in [bond.key.low(), bond.key.high()] {
                self.by_participant.entry(p.clone()).or_default().insert(bond.key.clone());
            }
        }
        if !bond.sealed {
            self.staleness.insert((bond.last_interaction, bond.key.clone()));
        }
        self.by_key.insert(bond.key.clone(), bond);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                bonds: RwLock::new(BondTable::default()),
                stars: RwLock::new(HashMap::new()),
                constellations: RwLock::new(HashMap::new()),
                next_star_id: AtomicU64::new(1),
                next_constellation_id: AtomicU64::new(1),
                unavailable: AtomicBool::new(false),
            }),
        }
    }

    /// Simulate an outage: while set, every call returns `Error::Storage`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            Err(Error::Storage("memory store is unavailable".into()))
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// RelationshipStore impl
// ============================================================================

#[async_trait]
impl RelationshipStore for MemoryStore {
    // ========================================================================
    // Bonds
    // ========================================================================

    async fn get_bond(&self, key: &PairKey) -> Result<Option<Bond>> {
        self.check()?;
        Ok(self.inner.bonds.read().by_key.get(key).cloned())
    }

    async fn insert_bond_if_absent(&self, bond: Bond) -> Result<(Bond, bool)> {
        self.check()?;
        let mut table = self.inner.bonds.write();
        if let Some(existing) = table.by_key.get(&bond.key) {
            return Ok((existing.clone(), false));
        }
        table.upsert(bond.clone());
        Ok((bond, true))
    }

    async fn put_bond(&self, bond: &Bond) -> Result<()> {
        self.check()?;
        self.inner.bonds.write().upsert(bond.clone());
        Ok(())
    }

    async fn bonds_for_participant(&self, p: &ParticipantId) -> Result<Vec<Bond>> {
        self.check()?;
        let table = self.inner.bonds.read();
        let Some(keys) = table.by_participant.get(p) else {
            return Ok(Vec::new());
        };
        Ok(keys.iter().filter_map(|k| table.by_key.get(k).cloned()).collect())
    }

    async fn stale_bonds(&self, before: DateTime<Utc>) -> Result<Vec<Bond>> {
        self.check()?;
        let table = self.inner.bonds.read();
        Ok(table
            .staleness
            .iter()
            .take_while(|(at, _)| *at < before)
            .filter_map(|(_, k)| table.by_key.get(k))
            .filter(|b| !b.sealed)
            .cloned()
            .collect())
    }

    async fn bond_count(&self) -> Result<u64> {
        self.check()?;
        Ok(self.inner.bonds.read().by_key.len() as u64)
    }

    // ========================================================================
    // StarMemories
    // ========================================================================

    async fn insert_star_memory(&self, star: NewStarMemory) -> Result<StarMemory> {
        self.check()?;
        let id = StarId(self.inner.next_star_id.fetch_add(1, Ordering::Relaxed));
        let star = StarMemory::from_new(id, star);
        self.inner.stars.write().insert(id, star.clone());
        Ok(star)
    }

    async fn get_star_memory(&self, id: StarId) -> Result<Option<StarMemory>> {
        self.check()?;
        Ok(self.inner.stars.read().get(&id).cloned())
    }

    async fn put_star_memory(&self, star: &StarMemory) -> Result<()> {
        self.check()?;
        let mut stars = self.inner.stars.write();
        let slot = stars.get_mut(&star.id)
            .ok_or_else(|| Error::NotFound(format!("StarMemory {}", star.id)))?;
        *slot = star.clone();
        Ok(())
    }

    async fn delete_star_memory(&self, id: StarId) -> Result<bool> {
        self.check()?;
        Ok(self.inner.stars.write().remove(&id).is_some())
    }

    async fn star_memories_for_participant(&self, p: &ParticipantId) -> Result<Vec<StarMemory>> {
        self.check()?;
        Ok(self.inner.stars.read().values().filter(|s| s.involves(p)).cloned().collect())
    }

    async fn star_memories_in_realm(&self, realm: &str) -> Result<Vec<StarMemory>> {
        self.check()?;
        Ok(self.inner.stars.read().values().filter(|s| s.realm == realm).cloned().collect())
    }

    // ========================================================================
    // Constellations
    // ========================================================================

    async fn insert_constellation(&self, constellation: NewConstellation) -> Result<Constellation> {
        self.check()?;
        let mut all = self.inner.constellations.write();
        let duplicate = all.values().any(|c| {
            c.realm == constellation.realm && c.participants == constellation.participants
        });
        if duplicate {
            return Err(Error::ConstraintViolation(format!(
                "a constellation with the same {} participants already exists in realm {}",
                constellation.participants.len(),
                constellation.realm
            )));
        }
        let id = ConstellationId(self.inner.next_constellation_id.fetch_add(1, Ordering::Relaxed));
        let constellation = Constellation::from_new(id, constellation);
        all.insert(id, constellation.clone());
        Ok(constellation)
    }

    async fn get_constellation(&self, id: ConstellationId) -> Result<Option<Constellation>> {
        self.check()?;
        Ok(self.inner.constellations.read().get(&id).cloned())
    }

    async fn put_constellation(&self, constellation: &Constellation) -> Result<()> {
        self.check()?;
        let mut all = self.inner.constellations.write();
        let clash = all.values().any(|c| {
            c.id != constellation.id
                && c.realm == constellation.realm
                && c.participants == constellation.participants
        });
        if clash {
            return Err(Error::ConstraintViolation(format!(
                "constellation {} would duplicate another participant set in realm {}",
                constellation.id, constellation.realm
            )));
        }
        let slot = all.get_mut(&constellation.id)
            .ok_or_else(|| Error::NotFound(format!("Constellation {}", constellation.id)))?;
        *slot = constellation.clone();
        Ok(())
    }

    async fn constellations_in_realm(&self, realm: &str) -> Result<Vec<Constellation>> {
        self.check()?;
        Ok(self.inner.constellations.read()
            .values()
            .filter(|c| c.realm == realm)
            .cloned()
            .collect())
    }

    async fn constellations_for_participant(&self, p: &ParticipantId) -> Result<Vec<Constellation>> {
        self.check()?;
        Ok(self.inner.constellations.read()
            .values()
            .filter(|c| c.has_member(p))
            .cloned()
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key(a: &str, b: &str) -> PairKey {
        PairKey::new(&a.into(), &b.into()).unwrap()
    }

    fn bond(a: &str, b: &str, at: DateTime<Utc>) -> Bond {
        Bond::new(key(a, b), Some("meadow".into()), 1.0, at)
    }

    #[tokio::test]
    async fn test_insert_if_absent_is_idempotent() {
        let db = MemoryStore::new();
        let now = Utc::now();

        let (_, created) = db.insert_bond_if_absent(bond("a", "b", now)).await.unwrap();
        assert!(created);

        let mut other = bond("b", "a", now);
        other.strength = 50.0;
        let (stored, created) = db.insert_bond_if_absent(other).await.unwrap();
        assert!(!created);
        assert_eq!(stored.strength, 1.0);
        assert_eq!(db.bond_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bonds_for_participant() {
        let db = MemoryStore::new();
        let now = Utc::now();
        db.put_bond(&bond("a", "b", now)).await.unwrap();
        db.put_bond(&bond("a", "c", now)).await.unwrap();
        db.put_bond(&bond("b", "c", now)).await.unwrap();

        assert_eq!(db.bonds_for_participant(&"a".into()).await.unwrap().len(), 2);
        assert!(db.bonds_for_participant(&"z".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_index_tracks_updates_and_seals() {
        let db = MemoryStore::new();
        let now = Utc::now();
        let old = now - Duration::hours(5);

        db.put_bond(&bond("a", "b", old)).await.unwrap();
        db.put_bond(&bond("c", "d", now)).await.unwrap();

        let stale = db.stale_bonds(now - Duration::hours(1)).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].key, key("a", "b"));

        // fresh interaction moves it out of the stale range
        let mut ab = stale[0].clone();
        ab.last_interaction = now;
        db.put_bond(&ab).await.unwrap();
        assert!(db.stale_bonds(now - Duration::hours(1)).await.unwrap().is_empty());

        // sealed bonds never show up
        ab.last_interaction = old;
        ab.sealed = true;
        db.put_bond(&ab).await.unwrap();
        assert!(db.stale_bonds(now).await.unwrap().iter().all(|b| b.key != ab.key));
    }

    #[tokio::test]
    async fn test_sealed_bonds_among_default_method() {
        let db = MemoryStore::new();
        let now = Utc::now();
        for (a, b, sealed) in [("a", "b", true), ("b", "c", true), ("c", "x", true), ("a", "c", false)] {
            let mut bd = bond(a, b, now);
            bd.sealed = sealed;
            db.put_bond(&bd).await.unwrap();
        }
        let set: BTreeSet<ParticipantId> = ["a", "b", "c"].iter().map(|s| ParticipantId::from(*s)).collect();
        let found = db.sealed_bonds_among(&set).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|b| b.key != key("c", "x")));
    }

    #[tokio::test]
    async fn test_duplicate_constellation_rejected() {
        let db = MemoryStore::new();
        let participants: BTreeSet<ParticipantId> =
            ["a", "b", "c"].iter().map(|s| ParticipantId::from(*s)).collect();
        let new = NewConstellation {
            name: "Lyra".into(),
            pattern: "triangle".into(),
            rarity: Rarity::Common,
            realm: "meadow".into(),
            participants,
            stars: StarList::new(),
            reward: 100,
            created_at: Utc::now(),
        };
        db.insert_constellation(new.clone()).await.unwrap();
        let err = db.insert_constellation(new.clone()).await.unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation(_)));

        let mut elsewhere = new;
        elsewhere.realm = "tundra".into();
        assert!(db.insert_constellation(elsewhere).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_star_memory() {
        let db = MemoryStore::new();
        let star = db.insert_star_memory(NewStarMemory {
            pair: key("a", "b"),
            participants: [
                ParticipantDescriptor::new("a", "A", "#fff"),
                ParticipantDescriptor::new("b", "B", "#000"),
            ],
            words: ["salt".into(), "sea".into()],
            realm: "meadow".into(),
            position: RealmPosition { x: 0.0, y: 1.0, z: 2.0 },
            brightness: 5.0,
            created_at: Utc::now(),
        }).await.unwrap();

        assert!(db.delete_star_memory(star.id).await.unwrap());
        assert!(db.get_star_memory(star.id).await.unwrap().is_none());
        assert!(!db.delete_star_memory(star.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let db = MemoryStore::new();
        db.set_unavailable(true);
        assert!(matches!(db.get_bond(&key("a", "b")).await, Err(Error::Storage(_))));
        db.set_unavailable(false);
        assert!(db.get_bond(&key("a", "b")).await.unwrap().is_none());
    }
}
