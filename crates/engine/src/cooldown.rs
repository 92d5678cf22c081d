//! Cooldown engine: per-position, per-tier alert suppression.
//!
//! After an alert for a tier fires, further alerts for the same position and
//! tier are suppressed until the cooldown elapses. A price bouncing between
//! two tiers therefore produces one alert per tier per cooldown window.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use kale_common::types::RiskTier;

/// Default cooldown duration in seconds (5 minutes).
pub const DEFAULT_COOLDOWN_SECONDS: u64 = 300;

/// In-memory cooldown engine.
pub struct CooldownEngine {
    cooldown: Duration,
    fired_at: HashMap<(Uuid, RiskTier), DateTime<Utc>>,
}

impl CooldownEngine {
    pub fn new(cooldown_seconds: u64) -> Self {
        Self {
            cooldown: i64::try_from(cooldown_seconds)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            fired_at: HashMap::new(),
        }
    }

    /// Returns `true` if no alert for this position and tier fired within the
    /// cooldown window, and starts a new window. Returns `false` otherwise.
    pub fn check_and_set(&mut self, position_id: Uuid, tier: RiskTier, now: DateTime<Utc>) -> bool {
        let key = (position_id, tier);

        if let Some(last) = self.fired_at.get(&key)
            && now - *last < self.cooldown
        {
            tracing::debug!(
                position_id = %position_id,
                tier = %tier,
                "Alert suppressed, position in cooldown"
            );
            return false;
        }

        self.fired_at.insert(key, now);
        true
    }

    /// Clear all cooldowns for a position.
    pub fn clear(&mut self, position_id: Uuid) {
        self.fired_at.retain(|(id, _), _| *id != position_id);
    }
}

impl Default for CooldownEngine {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_SECONDS)
    }
}
