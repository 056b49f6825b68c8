//! StarMemory: the artifact a Bond leaves behind when it is sealed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConstellationId, PairKey, ParticipantDescriptor, ParticipantId};

/// Opaque StarMemory identifier, assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StarId(pub u64);

impl std::fmt::Display for StarId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point in realm-space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RealmPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Everything about a star except its id. The store assigns the id on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStarMemory {
    pub pair: PairKey,
    /// Descriptors in canonical pair order (low, high).
    pub participants: [ParticipantDescriptor; 2],
    /// Words in canonical pair order (low, high).
    pub words: [String; 2],
    pub realm: String,
    pub position: RealmPosition,
    pub brightness: f64,
    pub created_at: DateTime<Utc>,
}

/// Immutable sealed-relationship artifact.
///
/// Only `constellation_id` changes after creation, when the star joins a
/// Constellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarMemory {
    pub id: StarId,
    pub pair: PairKey,
    pub participants: [ParticipantDescriptor; 2],
    pub words: [String; 2],
    pub realm: String,
    pub position: RealmPosition,
    pub brightness: f64,
    pub created_at: DateTime<Utc>,
    pub constellation_id: Option<ConstellationId>,
}

impl StarMemory {
    pub fn from_new(id: StarId, new: NewStarMemory) -> Self {
        Self {
            id,
            pair: new.pair,
            participants: new.participants,
            words: new.words,
            realm: new.realm,
            position: new.position,
            brightness: new.brightness,
            created_at: new.created_at,
            constellation_id: None,
        }
    }

    /// `"<low word> & <high word>"`.
    pub fn combined_phrase(&self) -> String {
        format!("{} & {}", self.words[0], self.words[1])
    }

    pub fn involves(&self, p: &ParticipantId) -> bool {
        self.pair.contains(p)
    }
}
