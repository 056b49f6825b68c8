//! # Constellation Engine
//!
//! Detects when the sealed Bonds among a candidate set of participants add up
//! to a rewarded group structure, persists it, and keeps it growing.
//!
//! ## Detection
//!
//! ```text
//! candidates ──▶ sealed Bonds with both ends inside ──▶ (players, edges)
//!                                                            │
//!            patterns in declared order, first match wins ◀──┘
//! ```
//!
//! Only the counts are checked, not the shape: three sealed Bonds hanging off
//! one hub count as three edges among four players just like a ring would.
//! Callers are expected to pass a sensible candidate set (the Bond engine
//! passes the freshly sealed pair plus all their sealed partners).
//!
//! ## Serialization
//!
//! Detection and expansion both hold the realm's lock from the first read of
//! the realm's Constellations to the last reward, so two seals landing in
//! the same realm never see the same snapshot. Lock order is realm, then
//! pair.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use rand::seq::SliceRandom;

use crate::bond::locks::{KeyedLocks, PairLocks};
use crate::collab::Progression;
use crate::config::{EngineConfig, PatternSpec, RewardTable};
use crate::events::{Outbound, Outbox, RewardReason};
use crate::model::*;
use crate::storage::RelationshipStore;
use crate::{log_and_convert, log_and_default, Error, Result};

const NAMES: &[&str] = &[
    "Lyra", "Vesper", "Aster", "Halcyon", "Corvina", "Seraphel", "Orrin", "Talitha",
    "Caelum", "Meridian", "Solenne", "Nadir", "Aurel", "Ismene", "Tamsin", "Eluned",
];

fn constellation_name(pattern: &PatternSpec) -> String {
    let base = NAMES.choose(&mut rand::thread_rng()).copied().unwrap_or("Nameless");
    let mut shape = pattern.name.clone();
    if let Some(first) = shape.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    format!("{base}'s {shape}")
}

pub struct ConstellationEngine<S: RelationshipStore> {
    store: Arc<S>,
    locks: Arc<PairLocks>,
    realms: KeyedLocks<String>,
    patterns: Vec<PatternSpec>,
    rewards: RewardTable,
    progression: Arc<dyn Progression>,
    outbox: Outbox,
}

impl<S: RelationshipStore> ConstellationEngine<S> {
    pub fn new(
        store: Arc<S>,
        locks: Arc<PairLocks>,
        config: &EngineConfig,
        progression: Arc<dyn Progression>,
        outbox: Outbox,
    ) -> Self {
        Self {
            store,
            locks,
            realms: KeyedLocks::new(),
            patterns: config.patterns.clone(),
            rewards: config.rewards.clone(),
            progression,
            outbox,
        }
    }

    /// Look for a Constellation among `participants` in `realm`.
    ///
    /// Returns the Constellation that was created or expanded, or `None` if
    /// no pattern matched, the exact participant set already has one, or the
    /// store failed.
    pub async fn check_for_constellation(
        &self,
        participants: &[ParticipantId],
        realm: &str,
    ) -> Option<Constellation> {
        let _realm = self.realms.lock(&realm.to_string()).await;
        log_and_convert(self.try_check(participants, realm).await, "check_for_constellation")
            .flatten()
    }

    /// Attach StarMemories (and their participants) to an existing
    /// Constellation. `None` if it does not exist or the store failed.
    pub async fn expand_constellation(
        &self,
        id: ConstellationId,
        new_stars: &[StarId],
    ) -> Option<Constellation> {
        log_and_convert(self.try_expand_locked(id, new_stars).await, "expand_constellation")
            .flatten()
    }

    pub async fn constellations_for(&self, p: &ParticipantId) -> Vec<Constellation> {
        let mut all = log_and_default(
            self.store.constellations_for_participant(p).await,
            "constellations_for",
        );
        all.sort_by_key(|c| (std::cmp::Reverse(c.rarity), c.created_at));
        all
    }

    pub async fn constellations_in_realm(&self, realm: &str) -> Vec<Constellation> {
        let mut all = log_and_default(
            self.store.constellations_in_realm(realm).await,
            "constellations_in_realm",
        );
        all.sort_by_key(|c| (std::cmp::Reverse(c.rarity), c.created_at));
        all
    }

    async fn try_check(
        &self,
        participants: &[ParticipantId],
        realm: &str,
    ) -> Result<Option<Constellation>> {
        let candidates: BTreeSet<ParticipantId> = participants.iter().cloned().collect();
        let bonds = self.store.sealed_bonds_among(&candidates).await?;

        let connected: BTreeSet<ParticipantId> = bonds
            .iter()
            .flat_map(|b| [b.key.low().clone(), b.key.high().clone()])
            .collect();
        let edges = bonds.len();

        let Some(pattern) = self.patterns.iter().find(|p| p.matches(connected.len(), edges)) else {
            tracing::debug!(players = connected.len(), edges, realm, "no constellation pattern matched");
            return Ok(None);
        };

        let existing = self.store.constellations_in_realm(realm).await?;
        if existing.iter().any(|c| c.participants == connected) {
            tracing::debug!(realm, players = connected.len(), "constellation already exists for this group");
            return Ok(None);
        }

        let stars: StarList = bonds.iter().filter_map(|b| b.star_memory).collect();

        // A smaller Constellation inside this group grows instead of being duplicated.
        let base = existing
            .iter()
            .filter(|c| c.participants.is_subset(&connected))
            .max_by_key(|c| c.participants.len());
        if let Some(base) = base {
            let fresh: Vec<StarId> = stars.iter().filter(|s| !base.stars.contains(s)).copied().collect();
            return self.try_expand(base.id, &fresh).await;
        }

        let reward = self.rewards.for_rarity(pattern.rarity);
        let new = NewConstellation {
            name: constellation_name(pattern),
            pattern: pattern.name.clone(),
            rarity: pattern.rarity,
            realm: realm.to_string(),
            participants: connected,
            stars,
            reward,
            created_at: Utc::now(),
        };
        let constellation = match self.store.insert_constellation(new).await {
            Ok(c) => c,
            // Another writer sharing the store formed it first.
            Err(Error::ConstraintViolation(msg)) => {
                tracing::debug!(realm, %msg, "constellation created concurrently");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        self.attach(&constellation, &constellation.stars).await?;

        tracing::info!(
            id = %constellation.id,
            name = %constellation.name,
            rarity = %constellation.rarity,
            players = constellation.participants.len(),
            realm,
            "constellation formed"
        );

        for p in &constellation.participants {
            self.outbox.send(p, Outbound::ConstellationFormed { constellation: constellation.clone() });
            self.reward(p, reward, RewardReason::ConstellationFormed).await;
        }

        Ok(Some(constellation))
    }

    async fn try_expand_locked(
        &self,
        id: ConstellationId,
        new_stars: &[StarId],
    ) -> Result<Option<Constellation>> {
        // The realm never changes, so it is safe to read it before locking.
        let Some(constellation) = self.store.get_constellation(id).await? else {
            return Ok(None);
        };
        let _realm = self.realms.lock(&constellation.realm).await;
        self.try_expand(id, new_stars).await
    }

    /// Caller holds the realm lock.
    async fn try_expand(
        &self,
        id: ConstellationId,
        new_stars: &[StarId],
    ) -> Result<Option<Constellation>> {
        let Some(mut constellation) = self.store.get_constellation(id).await? else {
            return Ok(None);
        };

        let mut added = StarList::new();
        let mut new_members = BTreeSet::new();
        for &star_id in new_stars {
            if constellation.stars.contains(&star_id) || added.contains(&star_id) {
                continue;
            }
            let Some(star) = self.store.get_star_memory(star_id).await? else {
                tracing::warn!(star = %star_id, constellation = %id, "skipping unknown star");
                continue;
            };
            for p in [star.pair.low(), star.pair.high()] {
                if !constellation.participants.contains(p) {
                    new_members.insert(p.clone());
                }
            }
            added.push(star_id);
        }

        if added.is_empty() {
            return Ok(Some(constellation));
        }

        let previous: Vec<ParticipantId> = constellation.participants.iter().cloned().collect();
        constellation.stars.extend(added.iter().copied());
        constellation.participants.extend(new_members.iter().cloned());
        constellation.expanded_at = Some(Utc::now());
        self.store.put_constellation(&constellation).await?;
        self.attach(&constellation, &added).await?;

        tracing::info!(
            id = %id,
            stars_added = added.len(),
            members_added = new_members.len(),
            "constellation expanded"
        );

        let joined: Vec<ParticipantId> = new_members.into_iter().collect();
        if !joined.is_empty() {
            for p in &previous {
                self.outbox.send(p, Outbound::ConstellationExpanded {
                    constellation: constellation.clone(),
                    new_members: joined.clone(),
                });
            }
        }
        for p in &joined {
            self.outbox.send(p, Outbound::ConstellationJoined { constellation: constellation.clone() });
            self.reward(p, constellation.reward, RewardReason::ConstellationJoined).await;
        }

        Ok(Some(constellation))
    }

    /// Record the back-reference on each star and its Bond.
    async fn attach(&self, constellation: &Constellation, stars: &[StarId]) -> Result<()> {
        for &star_id in stars {
            let Some(mut star) = self.store.get_star_memory(star_id).await? else {
                continue;
            };
            if star.constellation_id.is_none() {
                star.constellation_id = Some(constellation.id);
                self.store.put_star_memory(&star).await?;
            }

            let _guard = self.locks.lock(&star.pair).await;
            if let Some(mut bond) = self.store.get_bond(&star.pair).await? {
                if bond.constellation_ids.insert(constellation.id) {
                    self.store.put_bond(&bond).await?;
                }
            }
        }
        Ok(())
    }

    async fn reward(&self, p: &ParticipantId, amount: u64, reason: RewardReason) {
        if amount == 0 {
            return;
        }
        match self.progression.credit_reward(p, amount).await {
            Ok(()) => self.outbox.send(p, Outbound::RewardDistributed { amount, reason }),
            Err(e) => tracing::warn!(participant = %p, amount, error = %e, "reward credit failed"),
        }
    }
}
