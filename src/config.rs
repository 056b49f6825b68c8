//! Engine configuration.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes:
//!
//! ```json
//! { "seal": { "threshold": 80 }, "decay": { "rate_per_hour": 2.0 } }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::Rarity;
use crate::{Error, Result};

/// Top-level configuration shared by all engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub whisper_threshold: f64,
    pub voice_threshold: f64,
    pub max_strength: f64,
    pub initial_strength: f64,
    /// Gain for any interaction kind without an entry in the built-in table
    /// or in `gains`.
    pub default_gain: f64,
    /// Per-kind overrides, keyed by kind name (`"gift"`, `"pulse"`, ...).
    pub gains: BTreeMap<String, f64>,
    pub memory_capacity: usize,
    pub memory_max_chars: usize,
    pub seal: SealConfig,
    pub decay: DecayConfig,
    /// Scanned in declared order; the first pattern that matches wins.
    pub patterns: Vec<PatternSpec>,
    pub rewards: RewardTable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SealConfig {
    /// Minimum strength a Bond needs before it can be sealed.
    pub threshold: f64,
    /// Currency credited to each side of a fresh seal.
    pub reward: u64,
    pub max_word_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Sweep period, and the idle time after which a Bond starts decaying.
    pub interval_secs: u64,
    pub rate_per_hour: f64,
    /// At or below this strength the pair gets a "fading" notification.
    pub fading_threshold: f64,
}

/// Minimum connectivity a group of sealed Bonds needs to form a Constellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub name: String,
    pub rarity: Rarity,
    pub min_players: usize,
    pub min_edges: usize,
}

impl PatternSpec {
    pub fn new(name: &str, rarity: Rarity, min_players: usize, min_edges: usize) -> Self {
        Self { name: name.to_string(), rarity, min_players, min_edges }
    }

    pub fn matches(&self, players: usize, edges: usize) -> bool {
        players >= self.min_players && edges >= self.min_edges
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardTable {
    pub common: u64,
    pub rare: u64,
    pub epic: u64,
    pub legendary: u64,
}

impl RewardTable {
    pub fn for_rarity(&self, rarity: Rarity) -> u64 {
        match rarity {
            Rarity::Common => self.common,
            Rarity::Rare => self.rare,
            Rarity::Epic => self.epic,
            Rarity::Legendary => self.legendary,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            whisper_threshold: 25.0,
            voice_threshold: 75.0,
            max_strength: 100.0,
            initial_strength: 1.0,
            default_gain: 1.0,
            gains: BTreeMap::new(),
            memory_capacity: 50,
            memory_max_chars: 200,
            seal: SealConfig::default(),
            decay: DecayConfig::default(),
            patterns: vec![
                PatternSpec::new("triangle", Rarity::Common, 3, 3),
                PatternSpec::new("square", Rarity::Rare, 4, 4),
                PatternSpec::new("star", Rarity::Epic, 5, 4),
                PatternSpec::new("galaxy", Rarity::Legendary, 7, 7),
            ],
            rewards: RewardTable::default(),
        }
    }
}

impl Default for SealConfig {
    fn default() -> Self {
        Self { threshold: 90.0, reward: 50, max_word_chars: 32 }
    }
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self { interval_secs: 3600, rate_per_hour: 1.0, fading_threshold: 5.0 }
    }
}

impl Default for RewardTable {
    fn default() -> Self {
        Self { common: 100, rare: 250, epic: 500, legendary: 1000 }
    }
}

/// Upper bound for `decay.interval_secs` (30 days).
pub const MAX_DECAY_INTERVAL_SECS: u64 = 30 * 24 * 3600;

impl EngineConfig {
    /// Parse from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let max = self.max_strength;
        if !(max > 0.0) {
            return Err(Error::Config(format!("max_strength must be positive, got {max}")));
        }
        for (name, v) in [
            ("whisper_threshold", self.whisper_threshold),
            ("voice_threshold", self.voice_threshold),
            ("seal.threshold", self.seal.threshold),
        ] {
            if !(v > 0.0 && v <= max) {
                return Err(Error::Config(format!("{name} must be in (0, {max}], got {v}")));
            }
        }
        if self.whisper_threshold >= self.voice_threshold {
            return Err(Error::Config(format!(
                "whisper_threshold ({}) must be below voice_threshold ({})",
                self.whisper_threshold, self.voice_threshold
            )));
        }
        if !(self.initial_strength >= 0.0 && self.initial_strength <= max) {
            return Err(Error::Config(format!("initial_strength must be in [0, {max}]")));
        }
        if self.memory_capacity == 0 {
            return Err(Error::Config("memory_capacity must be at least 1".into()));
        }
        if self.decay.interval_secs == 0 || self.decay.interval_secs > MAX_DECAY_INTERVAL_SECS {
            return Err(Error::Config(format!(
                "decay.interval_secs must be in [1, {MAX_DECAY_INTERVAL_SECS}], got {}",
                self.decay.interval_secs
            )));
        }
        let rates = [
            ("default_gain".to_string(), self.default_gain),
            ("decay.rate_per_hour".to_string(), self.decay.rate_per_hour),
            ("decay.fading_threshold".to_string(), self.decay.fading_threshold),
        ];
        let gains = self.gains.iter().map(|(k, v)| (format!("gains.{k}"), *v));
        for (name, v) in rates.into_iter().chain(gains) {
            if !(v.is_finite() && v >= 0.0) {
                return Err(Error::Config(format!("{name} must be finite and non-negative, got {v}")));
            }
        }
        if self.patterns.is_empty() {
            return Err(Error::Config("at least one constellation pattern is required".into()));
        }
        if let Some(p) = self.patterns.iter().find(|p| p.min_players < 3) {
            return Err(Error::Config(format!(
                "pattern '{}' needs at least 3 players, got {}",
                p.name, p.min_players
            )));
        }
        Ok(())
    }
}
