//! Bond: the pairwise relationship record.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConstellationId, PairKey, ParticipantId, StarId};

/// Communication-privilege tier of a Bond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Silent,
    Whisper,
    Voice,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Mode::Silent => "silent",
            Mode::Whisper => "whisper",
            Mode::Voice => "voice",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consent {
    Pending,
    Accepted,
}

/// Kind of interaction that feeds a Bond's strength.
///
/// `Other` carries any kind the ledger does not list; it still earns the
/// default gain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Pulse,
    Whisper,
    Sing,
    Gift,
    Resonance,
    Proximity,
    Other(String),
}

impl InteractionKind {
    pub fn as_str(&self) -> &str {
        match self {
            InteractionKind::Pulse => "pulse",
            InteractionKind::Whisper => "whisper",
            InteractionKind::Sing => "sing",
            InteractionKind::Gift => "gift",
            InteractionKind::Resonance => "resonance",
            InteractionKind::Proximity => "proximity",
            InteractionKind::Other(s) => s,
        }
    }
}

impl From<&str> for InteractionKind {
    fn from(s: &str) -> Self {
        match s {
            "pulse" => InteractionKind::Pulse,
            "whisper" => InteractionKind::Whisper,
            "sing" => InteractionKind::Sing,
            "gift" => InteractionKind::Gift,
            "resonance" => InteractionKind::Resonance,
            "proximity" => InteractionKind::Proximity,
            other => InteractionKind::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a Bond's shared-memory log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedMemory {
    pub text: String,
    pub recorded_at: DateTime<Utc>,
}

/// Words chosen by each side at sealing, in canonical pair order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealWords {
    /// Word of `PairKey::low()`.
    pub low: String,
    /// Word of `PairKey::high()`.
    pub high: String,
}

/// A relationship between exactly two participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bond {
    pub key: PairKey,
    pub realm: Option<String>,
    /// Always within `[0, max_strength]`.
    pub strength: f64,
    pub mode: Mode,
    pub consent: Consent,
    pub sealed: bool,
    pub seal_words: Option<SealWords>,
    pub sealed_at: Option<DateTime<Utc>>,
    pub star_memory: Option<StarId>,
    pub constellation_ids: BTreeSet<ConstellationId>,
    pub created_at: DateTime<Utc>,
    pub last_interaction: DateTime<Utc>,
    pub last_decayed_at: Option<DateTime<Utc>>,
    /// Interaction kind name → count.
    pub interactions: BTreeMap<String, u64>,
    pub shared_memories: VecDeque<SharedMemory>,
}

impl Bond {
    pub fn new(key: PairKey, realm: Option<String>, strength: f64, now: DateTime<Utc>) -> Self {
        Self {
            key,
            realm,
            strength,
            mode: Mode::Silent,
            consent: Consent::Pending,
            sealed: false,
            seal_words: None,
            sealed_at: None,
            star_memory: None,
            constellation_ids: BTreeSet::new(),
            created_at: now,
            last_interaction: now,
            last_decayed_at: None,
            interactions: BTreeMap::new(),
            shared_memories: VecDeque::new(),
        }
    }

    pub fn involves(&self, p: &ParticipantId) -> bool {
        self.key.contains(p)
    }

    pub fn partner_of(&self, p: &ParticipantId) -> Option<&ParticipantId> {
        self.key.other(p)
    }

    pub fn interaction_count(&self, kind: &InteractionKind) -> u64 {
        self.interactions.get(kind.as_str()).copied().unwrap_or(0)
    }

    /// Start of the idle window the decay sweep charges for.
    pub fn decay_anchor(&self) -> DateTime<Utc> {
        match self.last_decayed_at {
            Some(d) if d > self.last_interaction => d,
            _ => self.last_interaction,
        }
    }

    /// Append a memory, evicting the oldest entries beyond `capacity`.
    pub fn push_memory(&mut self, memory: SharedMemory, capacity: usize) {
        self.shared_memories.push_back(memory);
        while self.shared_memories.len() > capacity {
            self.shared_memories.pop_front();
        }
    }
}
