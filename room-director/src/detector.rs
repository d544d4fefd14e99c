//! Change detection: decides whether pending changes justify a regeneration.

use crate::change_log::ChangeLog;
use crate::config::DirectorConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of evaluating an entity's change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Nothing to do (or suppressed by the cooldown).
    NoTrigger,
    /// An ordinary regeneration is warranted.
    Trigger,
    /// A regeneration was explicitly requested; ignores the cooldown.
    Forced,
}

impl Trigger {
    pub fn fires(&self) -> bool {
        !matches!(self, Trigger::NoTrigger)
    }
}

/// Thresholds the detector applies, taken from [`DirectorConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ChangeDetector {
    change_threshold: usize,
    max_staleness: chrono::Duration,
    cooldown: chrono::Duration,
}

impl ChangeDetector {
    pub fn new(config: &DirectorConfig) -> Self {
        Self {
            change_threshold: config.change_threshold,
            max_staleness: to_chrono(config.max_staleness),
            cooldown: to_chrono(config.cooldown),
        }
    }

    /// Evaluate the log.
    ///
    /// `created_at` stands in for `last_regenerated_at` when measuring
    /// staleness of an entity that was never regenerated.
    pub fn evaluate(
        &self,
        log: &ChangeLog,
        last_regenerated_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Trigger {
        if log.iter().any(|r| r.is_forced()) {
            return Trigger::Forced;
        }
        if log.is_empty() {
            return Trigger::NoTrigger;
        }

        let over_threshold = log.len() >= self.change_threshold;
        let pinned_change = log.iter().any(|r| r.pinned);
        let baseline = last_regenerated_at.unwrap_or(created_at);
        let stale = now - baseline > self.max_staleness;

        if !(over_threshold || pinned_change || stale) {
            return Trigger::NoTrigger;
        }

        if let Some(last) = last_regenerated_at {
            if now - last < self.cooldown {
                return Trigger::NoTrigger;
            }
        }

        Trigger::Trigger
    }
}

fn to_chrono(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}
