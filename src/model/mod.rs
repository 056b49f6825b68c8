//! # Bond Model
//!
//! Clean DTOs that cross every boundary: store ↔ engines ↔ transport.
//!
//! Design rule: this module is pure data with no I/O and no async.

pub mod participant;
pub mod bond;
pub mod star_memory;
pub mod constellation;

pub use participant::{ParticipantId, ParticipantDescriptor, PairKey};
pub use bond::{Bond, Mode, Consent, InteractionKind, SharedMemory, SealWords};
pub use star_memory::{StarMemory, NewStarMemory, StarId, RealmPosition};
pub use constellation::{Constellation, NewConstellation, ConstellationId, Rarity, StarList};
