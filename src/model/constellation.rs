//! Constellation: a rewarded group structure formed by sealed Bonds.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{ParticipantId, StarId};

/// Opaque Constellation identifier, assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConstellationId(pub u64);

impl std::fmt::Display for ConstellationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rarity tier, ordered from least to most rare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl std::fmt::Display for Rarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Rarity::Common => "common",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
        })
    }
}

pub type StarList = SmallVec<[StarId; 8]>;

/// Everything about a Constellation except its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConstellation {
    pub name: String,
    /// Name of the pattern that matched, e.g. `"triangle"`.
    pub pattern: String,
    pub rarity: Rarity,
    pub realm: String,
    pub participants: BTreeSet<ParticipantId>,
    pub stars: StarList,
    pub reward: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constellation {
    pub id: ConstellationId,
    pub name: String,
    pub pattern: String,
    pub rarity: Rarity,
    pub realm: String,
    pub participants: BTreeSet<ParticipantId>,
    pub stars: StarList,
    pub reward: u64,
    pub created_at: DateTime<Utc>,
    pub expanded_at: Option<DateTime<Utc>>,
}

impl Constellation {
    pub fn from_new(id: ConstellationId, new: NewConstellation) -> Self {
        Self {
            id,
            name: new.name,
            pattern: new.pattern,
            rarity: new.rarity,
            realm: new.realm,
            participants: new.participants,
            stars: new.stars,
            reward: new.reward,
            created_at: new.created_at,
            expanded_at: None,
        }
    }

    pub fn has_member(&self, p: &ParticipantId) -> bool {
        self.participants.contains(p)
    }
}
