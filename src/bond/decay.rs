//! Decay: periodic strength loss for idle Bonds.
//!
//! A Bond is idle once its last interaction is older than one decay interval.
//! Each sweep charges `rate_per_hour` for every hour since the later of its
//! last interaction and its previous decay, clamps at zero, and lets the mode
//! fall with the strength. Sealed Bonds never decay.
//!
//! The sweep is driven by a [`DecayScheduler`] owned by whoever started it;
//! there is no process-wide timer.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::BondEngine;
use crate::collab::{NotificationCategory, NotifyOptions};
use crate::log_and_default;
use crate::model::{Bond, Mode, PairKey};
use crate::storage::RelationshipStore;
use crate::Result;

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecayReport {
    /// Idle Bonds returned by the store.
    pub scanned: usize,
    /// Bonds whose strength actually dropped.
    pub decayed: usize,
    /// Bonds that fell to a lower mode.
    pub downgraded: usize,
    /// Bonds that crossed the fading threshold.
    pub fading: usize,
}

/// Result of decaying one Bond, for notification purposes.
struct Decayed {
    bond: Bond,
    old_mode: Mode,
    crossed_fading: bool,
}

impl<S: RelationshipStore> BondEngine<S> {
    /// Run one sweep against the wall clock.
    pub async fn process_decay(&self) -> DecayReport {
        self.process_decay_at(Utc::now()).await
    }

    /// Run one sweep as if the current time were `now`.
    pub async fn process_decay_at(&self, now: DateTime<Utc>) -> DecayReport {
        let Some(cutoff) = i64::try_from(self.config.decay.interval_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|interval| now.checked_sub_signed(interval))
        else {
            tracing::warn!(interval_secs = self.config.decay.interval_secs, "decay interval out of range; sweep skipped");
            return DecayReport::default();
        };
        let idle = log_and_default(self.store.stale_bonds(cutoff).await, "process_decay");

        let mut report = DecayReport { scanned: idle.len(), ..DecayReport::default() };
        for bond in idle {
            let decayed = log_and_default(self.decay_one(&bond.key, cutoff, now).await, "process_decay");
            let Some(decayed) = decayed else { continue };

            report.decayed += 1;
            if decayed.bond.mode < decayed.old_mode {
                report.downgraded += 1;
                self.notify_pair(
                    &decayed.bond,
                    NotificationCategory::ModeDowngrade,
                    |partner| format!(
                        "Your bond with {partner} has faded from {} to {}.",
                        decayed.old_mode, decayed.bond.mode
                    ),
                ).await;
            }
            if decayed.crossed_fading {
                report.fading += 1;
                self.notify_pair(
                    &decayed.bond,
                    NotificationCategory::BondFading,
                    |partner| format!("Your bond with {partner} is about to fade away."),
                ).await;
            }
        }

        if report.decayed > 0 {
            tracing::info!(
                scanned = report.scanned,
                decayed = report.decayed,
                downgraded = report.downgraded,
                fading = report.fading,
                "decay sweep finished"
            );
        }
        report
    }

    /// Decay a single Bond under its pair lock. `None` if it no longer needs it.
    async fn decay_one(
        &self,
        key: &PairKey,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<Decayed>> {
        let _guard = self.locks.lock(key).await;

        // Re-read: a live interaction may have landed since the scan.
        let Some(mut bond) = self.store.get_bond(key).await? else {
            return Ok(None);
        };
        if bond.sealed || bond.last_interaction >= cutoff || bond.strength <= 0.0 {
            return Ok(None);
        }

        let idle = now - bond.decay_anchor();
        let hours = idle.num_seconds() as f64 / 3600.0;
        if hours <= 0.0 {
            return Ok(None);
        }

        let before = bond.strength;
        let old_mode = bond.mode;
        bond.strength = self.ledger.clamp(before - hours * self.config.decay.rate_per_hour);
        bond.mode = self.ledger.transition(bond.strength, old_mode, bond.sealed);
        bond.last_decayed_at = Some(now);
        self.store.put_bond(&bond).await?;

        tracing::debug!(pair = %bond.key, before, after = bond.strength, hours, "bond decayed");

        let fading = self.config.decay.fading_threshold;
        Ok(Some(Decayed {
            crossed_fading: before > fading && bond.strength <= fading,
            bond,
            old_mode,
        }))
    }

    async fn notify_pair(
        &self,
        bond: &Bond,
        category: NotificationCategory,
        message: impl Fn(&str) -> String,
    ) {
        for (to, partner) in [(bond.key.low(), bond.key.high()), (bond.key.high(), bond.key.low())] {
            let options = NotifyOptions { partner: Some(partner.clone()), urgent: false };
            let text = message(partner.as_str());
            if let Err(e) = self.notifier.notify(to, category, &text, options).await {
                tracing::warn!(participant = %to, error = %e, "decay notification failed");
            }
        }
    }
}

// ============================================================================
// DecayScheduler
// ============================================================================

struct Running {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns the periodic decay task of one engine instance.
#[derive(Default)]
pub struct DecayScheduler {
    running: Mutex<Option<Running>>,
}

impl DecayScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the sweep loop on the current tokio runtime. The first sweep runs
    /// one `period` after start. Returns `false` if already running.
    pub fn start<S: RelationshipStore>(&self, engine: Arc<BondEngine<S>>, period: Duration) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            return false;
        }

        let (stop, mut stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        engine.process_decay().await;
                    }
                }
            }
            tracing::debug!("decay loop exited");
        });

        tracing::info!(period_secs = period.as_secs(), "decay scheduler started");
        *running = Some(Running { stop, handle });
        true
    }

    /// Signal the loop to stop and wait for it. A sweep in progress finishes
    /// first. Returns `false` if it was not running.
    pub async fn stop(&self) -> bool {
        let running = self.running.lock().take();
        let Some(Running { stop, handle }) = running else {
            return false;
        };
        let _ = stop.send(());
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "decay loop ended abnormally");
        }
        tracing::info!("decay scheduler stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================
