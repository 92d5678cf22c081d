//! Risk monitoring pipeline.
//!
//! Receives price quotes from a feed subscription and, for every tracked position:
//! 1. Re-evaluates the position (via `RiskCalculator`)
//! 2. Compares the tier with the last reported tier
//! 3. Gates worse tiers through `HysteresisEngine`; recoveries report at once
//! 4. Suppresses repeats via `CooldownEngine` and emits a `RiskAlert`

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kale_common::error::AppError;
use kale_common::types::{Position, PriceQuote, RiskAssessment, RiskTier, Severity};

use crate::cooldown::CooldownEngine;
use crate::hysteresis::HysteresisEngine;
use crate::risk::RiskCalculator;

/// A tier change ready for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAlert {
    pub position_id: Uuid,
    /// `None` when this is the first tier reported for the position.
    pub previous_tier: Option<RiskTier>,
    pub tier: RiskTier,
    pub severity: Severity,
    pub title: String,
    pub body: String,
    pub assessment: RiskAssessment,
    pub triggered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct TrackedPosition {
    position: Position,
    reported_tier: Option<RiskTier>,
}

/// Re-evaluates tracked positions on each price tick and reports tier changes.
pub struct RiskMonitor {
    calculator: RiskCalculator,
    positions: HashMap<Uuid, TrackedPosition>,
    hysteresis: HysteresisEngine,
    cooldown: CooldownEngine,
    tick: u64,
}

impl RiskMonitor {
    pub fn new(calculator: RiskCalculator, hysteresis_ticks: u64, cooldown_seconds: u64) -> Self {
        Self {
            calculator,
            positions: HashMap::new(),
            hysteresis: HysteresisEngine::new(hysteresis_ticks),
            cooldown: CooldownEngine::new(cooldown_seconds),
            tick: 0,
        }
    }

    /// Start tracking a position under a fresh ID.
    pub fn track(&mut self, position: Position) -> Uuid {
        let id = Uuid::new_v4();
        self.positions.insert(
            id,
            TrackedPosition {
                position,
                reported_tier: None,
            },
        );
        tracing::info!(position_id = %id, "Tracking position");
        id
    }

    /// Replace a tracked position after a user action. The reported tier is
    /// kept so the next tick reports the effect of the action.
    pub fn update_position(&mut self, position_id: Uuid, position: Position) -> Result<(), AppError> {
        let tracked = self
            .positions
            .get_mut(&position_id)
            .ok_or_else(|| AppError::Validation(format!("unknown position {position_id}")))?;
        tracked.position = position;
        Ok(())
    }

    /// Stop tracking a position and drop its hysteresis and cooldown state.
    pub fn untrack(&mut self, position_id: Uuid) -> Option<Position> {
        self.hysteresis.reset(position_id);
        self.cooldown.clear(position_id);
        self.positions.remove(&position_id).map(|t| t.position)
    }

    pub fn position(&self, position_id: Uuid) -> Option<Position> {
        self.positions.get(&position_id).map(|t| t.position)
    }

    pub fn tracked_count(&self) -> usize {
        self.positions.len()
    }

    /// Evaluate every tracked position against a new quote.
    pub fn on_quote(&mut self, quote: &PriceQuote) -> Vec<RiskAlert> {
        self.tick += 1;
        let mut alerts = Vec::new();

        for (id, tracked) in self.positions.iter_mut() {
            let assessment = self.calculator.assess(&tracked.position, quote);
            let tier = assessment.tier;

            tracing::debug!(
                position_id = %id,
                tick = self.tick,
                health_factor = %assessment.health_factor,
                ltv = assessment.ltv,
                tier = %tier,
                "Position evaluated"
            );

            let previous = tracked.reported_tier;
            let degraded = match previous {
                Some(p) => tier.is_worse_than(p),
                // First observation only reports tiers that warrant attention
                None => tier.severity() != Severity::Info,
            };

            if degraded {
                if !self.hysteresis.check(*id, true, self.tick) {
                    continue;
                }
            } else {
                self.hysteresis.check(*id, false, self.tick);
                let recovered = matches!(previous, Some(p) if p.is_worse_than(tier));
                if !recovered {
                    if previous.is_none() {
                        tracked.reported_tier = Some(tier);
                    }
                    continue;
                }
            }

            tracked.reported_tier = Some(tier);

            if !self.cooldown.check_and_set(*id, tier, quote.as_of) {
                continue;
            }

            let alert = Self::translate_tier_change(*id, previous, &assessment, quote.as_of);
            tracing::info!(
                position_id = %id,
                previous_tier = ?previous,
                tier = %tier,
                severity = %alert.severity,
                "Risk alert created"
            );
            alerts.push(alert);
        }

        alerts
    }

    /// Translate a tier change into a human-readable alert.
    pub fn translate_tier_change(
        position_id: Uuid,
        previous: Option<RiskTier>,
        assessment: &RiskAssessment,
        triggered_at: DateTime<Utc>,
    ) -> RiskAlert {
        let title = match assessment.tier {
            RiskTier::Critical => "⚠️ Position Liquidatable",
            RiskTier::High => "Position At Risk",
            RiskTier::Moderate => "Health Factor Below Safe Level",
            RiskTier::Safe => "Position Safe",
            RiskTier::NoPosition => "Position Closed",
        }
        .to_string();

        let from = previous
            .map(|t| t.to_string())
            .unwrap_or_else(|| "untracked".to_string());

        let body = format!(
            "Position {} moved from {} to {}: health factor {}, LTV {:.1}%, collateral ${:.2}, debt ${:.2}",
            position_id,
            from,
            assessment.tier,
            assessment.health_factor,
            assessment.ltv,
            assessment.collateral_value_usd,
            assessment.debt_value_usd,
        );

        RiskAlert {
            position_id,
            previous_tier: previous,
            tier: assessment.tier,
            severity: assessment.tier.severity(),
            title,
            body,
            assessment: *assessment,
            triggered_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use kale_common::types::RiskParameters;

    fn quote_at(price: f64, at: DateTime<Utc>) -> PriceQuote {
        PriceQuote::usd_pegged(price, at)
    }

    fn monitor(hysteresis_ticks: u64, cooldown_seconds: u64) -> RiskMonitor {
        RiskMonitor::new(
            RiskCalculator::new(RiskParameters::new(0.75, 0.85).unwrap()),
            hysteresis_ticks,
            cooldown_seconds,
        )
    }

    #[test]
    fn test_safe_position_reports_nothing() {
        let mut m = monitor(1, 0);
        m.track(Position::new(100.0, 10.0));
        assert!(m.on_quote(&quote_at(1.0, Utc::now())).is_empty());
        assert!(m.on_quote(&quote_at(1.0, Utc::now())).is_empty());
    }

    #[test]
    fn test_first_observation_of_critical_position_alerts() {
        let mut m = monitor(1, 0);
        let id = m.track(Position::new(0.0, 10.0));
        let alerts = m.on_quote(&quote_at(0.5, Utc::now()));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].position_id, id);
        assert_eq!(alerts[0].previous_tier, None);
        assert_eq!(alerts[0].tier, RiskTier::Critical);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert!(alerts[0].body.contains("untracked"));
    }

    #[test]
    fn test_price_drop_degrades_then_recovers() {
        let mut m = monitor(1, 0);
        // 100 KALE, 40 USDC debt
        m.track(Position::new(100.0, 40.0));
        let t0 = Utc::now();

        // $1.00 → HF 2.125, safe baseline
        assert!(m.on_quote(&quote_at(1.0, t0)).is_empty());

        // $0.50 → HF 1.0625, high risk
        let alerts = m.on_quote(&quote_at(0.5, t0 + Duration::seconds(5)));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].previous_tier, Some(RiskTier::Safe));
        assert_eq!(alerts[0].tier, RiskTier::High);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert!(alerts[0].body.contains("1.06"));

        // Same tier again → nothing new
        assert!(m.on_quote(&quote_at(0.5, t0 + Duration::seconds(10))).is_empty());

        // $1.00 again → recovery reported immediately
        let alerts = m.on_quote(&quote_at(1.0, t0 + Duration::seconds(15)));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].previous_tier, Some(RiskTier::High));
        assert_eq!(alerts[0].tier, RiskTier::Safe);
        assert_eq!(alerts[0].severity, Severity::Info);
    }

    #[test]
    fn test_hysteresis_delays_degradation() {
        let mut m = monitor(3, 0);
        m.track(Position::new(100.0, 40.0));
        let t0 = Utc::now();

        assert!(m.on_quote(&quote_at(1.0, t0)).is_empty());
        assert!(m.on_quote(&quote_at(0.5, t0)).is_empty());
        assert!(m.on_quote(&quote_at(0.5, t0)).is_empty());
        let alerts = m.on_quote(&quote_at(0.5, t0));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].tier, RiskTier::High);
    }

    #[test]
    fn test_hysteresis_ignores_brief_dip() {
        let mut m = monitor(2, 0);
        m.track(Position::new(100.0, 40.0));
        let t0 = Utc::now();

        assert!(m.on_quote(&quote_at(1.0, t0)).is_empty());
        assert!(m.on_quote(&quote_at(0.5, t0)).is_empty());
        // Back to safe before the streak completes → nothing reported
        assert!(m.on_quote(&quote_at(1.0, t0)).is_empty());
        assert!(m.on_quote(&quote_at(0.5, t0)).is_empty());
    }

    #[test]
    fn test_cooldown_suppresses_flapping() {
        let mut m = monitor(1, 300);
        m.track(Position::new(100.0, 40.0));
        let t0 = Utc::now();

        assert!(m.on_quote(&quote_at(1.0, t0)).is_empty());
        assert_eq!(m.on_quote(&quote_at(0.5, t0 + Duration::seconds(1))).len(), 1);
        assert_eq!(m.on_quote(&quote_at(1.0, t0 + Duration::seconds(2))).len(), 1);
        // Back to high risk within the cooldown window → suppressed
        assert!(m.on_quote(&quote_at(0.5, t0 + Duration::seconds(3))).is_empty());
        // After the window it reports again
        assert!(m.on_quote(&quote_at(1.0, t0 + Duration::seconds(4))).is_empty());
        assert_eq!(m.on_quote(&quote_at(0.5, t0 + Duration::seconds(400))).len(), 1);
    }

    #[test]
    fn test_update_and_untrack() {
        let mut m = monitor(1, 0);
        let id = m.track(Position::new(100.0, 0.0));
        assert!(m.on_quote(&quote_at(0.5, Utc::now())).is_empty());

        m.update_position(id, Position::new(100.0, 45.0)).unwrap();
        let alerts = m.on_quote(&quote_at(0.5, Utc::now()));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].tier, RiskTier::Critical);

        assert_eq!(m.untrack(id), Some(Position::new(100.0, 45.0)));
        assert_eq!(m.tracked_count(), 0);
        assert!(m.update_position(id, Position::default()).is_err());
    }

    #[test]
    fn test_translate_liquidatable() {
        let calc = RiskCalculator::default();
        let assessment = calc.assess(&Position::new(100.0, 60.0), &quote_at(0.5, Utc::now()));
        let alert = RiskMonitor::translate_tier_change(
            Uuid::new_v4(),
            Some(RiskTier::High),
            &assessment,
            Utc::now(),
        );
        assert!(alert.title.contains("Liquidatable"));
        assert!(alert.body.contains("from high to critical"));
        assert!(alert.body.contains("LTV 120.0%"));
        assert_eq!(alert.severity, Severity::Critical);
    }
}
