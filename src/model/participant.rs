//! Participant identity and canonical pair keys.

use serde::{Deserialize, Serialize};
use crate::{Error, Result};

/// Opaque participant (player) identifier, as handed over by the transport.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Display identity of a participant at the moment something is recorded
/// about them (a seal, a star).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantDescriptor {
    pub id: ParticipantId,
    pub display_name: String,
    /// Hex color string, e.g. `"#ffcc00"`.
    pub color: String,
}

impl ParticipantDescriptor {
    pub fn new(
        id: impl Into<ParticipantId>,
        display_name: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        Self { id: id.into(), display_name: display_name.into(), color: color.into() }
    }
}

/// Unordered participant pair, stored lower identifier first.
///
/// `PairKey::new(a, b) == PairKey::new(b, a)`; this is the unique key of a Bond
/// and of a pending seal negotiation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey {
    low: ParticipantId,
    high: ParticipantId,
}

impl PairKey {
    /// Canonicalize a pair. Fails for a self-pair.
    pub fn new(a: &ParticipantId, b: &ParticipantId) -> Result<Self> {
        match a.cmp(b) {
            std::cmp::Ordering::Less => Ok(Self { low: a.clone(), high: b.clone() }),
            std::cmp::Ordering::Greater => Ok(Self { low: b.clone(), high: a.clone() }),
            std::cmp::Ordering::Equal => Err(Error::InvalidPair(format!(
                "participant {a} cannot bond with themselves"
            ))),
        }
    }

    pub fn low(&self) -> &ParticipantId {
        &self.low
    }

    pub fn high(&self) -> &ParticipantId {
        &self.high
    }

    pub fn contains(&self, p: &ParticipantId) -> bool {
        &self.low == p || &self.high == p
    }

    /// The other end of the pair, if `from` is part of it.
    pub fn other(&self, from: &ParticipantId) -> Option<&ParticipantId> {
        if from == &self.low { Some(&self.high) }
        else if from == &self.high { Some(&self.low) }
        else { None }
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.low, self.high)
    }
}
