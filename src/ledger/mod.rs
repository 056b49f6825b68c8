//! # Strength Ledger
//!
//! Pure mapping from interactions to strength, and from strength to mode.
//! No state beyond its thresholds, no I/O, no failure modes.
//!
//! ```text
//!   strength:  0 ──────── W ──────────────── V ──────── max
//!   mode:        silent   │     whisper      │   voice
//! ```

use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::model::{InteractionKind, Mode};

/// Built-in gain table. Anything not listed falls back to the default gain.
const BASE_GAINS: &[(&str, f64)] = &[
    ("pulse", 2.0),
    ("whisper", 3.0),
    ("sing", 5.0),
    ("gift", 15.0),
    ("resonance", 10.0),
    ("proximity", 0.5),
];

/// Brightness ceiling for a StarMemory.
pub const MAX_BRIGHTNESS: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct StrengthLedger {
    whisper: f64,
    voice: f64,
    max: f64,
    default_gain: f64,
    gains: BTreeMap<String, f64>,
}

impl Default for StrengthLedger {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl StrengthLedger {
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut gains: BTreeMap<String, f64> =
            BASE_GAINS.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        gains.extend(config.gains.iter().map(|(k, v)| (k.clone(), *v)));
        Self {
            whisper: config.whisper_threshold,
            voice: config.voice_threshold,
            max: config.max_strength,
            default_gain: config.default_gain,
            gains,
        }
    }

    pub fn max_strength(&self) -> f64 {
        self.max
    }

    /// Strength gained for one interaction. Unlisted kinds still earn the
    /// default gain.
    pub fn gain_for(&self, kind: &InteractionKind) -> f64 {
        self.gains.get(kind.as_str()).copied().unwrap_or(self.default_gain)
    }

    /// Clamp into `[0, max]`. NaN collapses to 0.
    pub fn clamp(&self, strength: f64) -> f64 {
        if strength.is_nan() { 0.0 } else { strength.clamp(0.0, self.max) }
    }

    /// Mode for an unsealed Bond at `strength`.
    ///
    /// Upward checks run voice first so one large gain can jump straight from
    /// silent to voice; downward is symmetric, so the result depends on
    /// `strength` alone.
    pub fn mode_for(&self, strength: f64, _current: Mode) -> Mode {
        if strength >= self.voice {
            Mode::Voice
        } else if strength >= self.whisper {
            Mode::Whisper
        } else {
            Mode::Silent
        }
    }

    /// Like [`mode_for`](Self::mode_for), but a sealed Bond keeps its mode.
    pub fn transition(&self, strength: f64, current: Mode, sealed: bool) -> Mode {
        if sealed { current } else { self.mode_for(strength, current) }
    }

    /// StarMemory brightness: `min(5, strength / 20)`.
    pub fn brightness_for(&self, strength: f64) -> f64 {
        (self.clamp(strength) / 20.0).min(MAX_BRIGHTNESS)
    }
}
