//! Action gate: decides whether a borrow or withdrawal may proceed.
//!
//! A borrow must fit in the remaining capacity (`max_ltv`) and leave the
//! health factor at or above `MIN_BORROW_HEALTH_FACTOR`. A withdrawal must
//! not exceed the deposit and must leave the same health factor margin.
//! Deposits and repayments only lower risk and are checked by `Position`.

use kale_common::error::AppError;
use kale_common::types::{HealthFactor, Position, PriceQuote, RiskAssessment};

use crate::risk::{MIN_BORROW_HEALTH_FACTOR, RiskCalculator, value_of};

/// Gate for risk-increasing actions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionGate {
    calculator: RiskCalculator,
}

impl ActionGate {
    pub fn new(calculator: RiskCalculator) -> Self {
        Self { calculator }
    }

    /// Check a borrow of `amount` debt tokens.
    ///
    /// Returns the position and assessment after the borrow on success.
    pub fn check_borrow(
        &self,
        position: &Position,
        quote: &PriceQuote,
        amount: f64,
    ) -> Result<(Position, RiskAssessment), AppError> {
        let after = position.borrow(amount)?;
        let before = self.calculator.assess(position, quote);

        let requested_usd = value_of(amount, quote.debt_price_usd);
        if before.debt_value_usd + requested_usd > before.max_borrowable_usd {
            tracing::debug!(
                requested_usd,
                available_usd = before.available_to_borrow_usd,
                "Borrow rejected, exceeds capacity"
            );
            return Err(AppError::BorrowCapacityExceeded {
                requested_usd,
                available_usd: before.available_to_borrow_usd,
            });
        }

        let assessment = self.calculator.assess(&after, quote);
        Self::require_health(assessment.health_factor, "Borrow")?;

        tracing::debug!(
            amount,
            health_factor = %assessment.health_factor,
            tier = %assessment.tier,
            "Borrow allowed"
        );
        Ok((after, assessment))
    }

    /// Check a withdrawal of `amount` collateral tokens.
    pub fn check_withdraw(
        &self,
        position: &Position,
        quote: &PriceQuote,
        amount: f64,
    ) -> Result<(Position, RiskAssessment), AppError> {
        let after = position.withdraw(amount)?;
        let assessment = self.calculator.assess(&after, quote);
        Self::require_health(assessment.health_factor, "Withdraw")?;

        tracing::debug!(
            amount,
            health_factor = %assessment.health_factor,
            tier = %assessment.tier,
            "Withdraw allowed"
        );
        Ok((after, assessment))
    }

    /// Apply a deposit. Always lowers risk.
    pub fn deposit(
        &self,
        position: &Position,
        quote: &PriceQuote,
        amount: f64,
    ) -> Result<(Position, RiskAssessment), AppError> {
        let after = position.deposit(amount)?;
        Ok((after, self.calculator.assess(&after, quote)))
    }

    /// Apply a repayment. Always lowers risk.
    pub fn repay(
        &self,
        position: &Position,
        quote: &PriceQuote,
        amount: f64,
    ) -> Result<(Position, RiskAssessment), AppError> {
        let after = position.repay(amount)?;
        Ok((after, self.calculator.assess(&after, quote)))
    }

    fn require_health(health_factor: HealthFactor, action: &str) -> Result<(), AppError> {
        if health_factor.is_below(MIN_BORROW_HEALTH_FACTOR) {
            tracing::debug!(
                action,
                health_factor = %health_factor,
                minimum = MIN_BORROW_HEALTH_FACTOR,
                "Action rejected, health factor too low"
            );
            return Err(AppError::HealthFactorTooLow {
                health_factor: health_factor.as_f64(),
                minimum: MIN_BORROW_HEALTH_FACTOR,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kale_common::types::{RiskParameters, RiskTier};

    fn quote(price: f64) -> PriceQuote {
        PriceQuote::usd_pegged(price, Utc::now())
    }

    fn gate(max_ltv: f64, liquidation_threshold: f64) -> ActionGate {
        ActionGate::new(RiskCalculator::new(
            RiskParameters::new(max_ltv, liquidation_threshold).unwrap(),
        ))
    }

    #[test]
    fn test_borrow_up_to_capacity() {
        // $200 collateral at 75% max LTV → $150 capacity
        let g = gate(0.75, 0.85);
        let (after, assessment) = g
            .check_borrow(&Position::new(200.0, 0.0), &quote(1.0), 150.0)
            .unwrap();
        assert_eq!(after.debt_amount, 150.0);
        assert_eq!(assessment.available_to_borrow_usd, 0.0);
        assert_eq!(assessment.tier, RiskTier::Moderate);
    }

    #[test]
    fn test_borrow_over_capacity_rejected() {
        let g = gate(0.75, 0.85);
        let err = g
            .check_borrow(&Position::new(200.0, 100.0), &quote(1.0), 60.0)
            .unwrap_err();
        match err {
            AppError::BorrowCapacityExceeded {
                requested_usd,
                available_usd,
            } => {
                assert_eq!(requested_usd, 60.0);
                assert_eq!(available_usd, 50.0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_borrow_rejected_below_min_health_factor() {
        // max_ltv == liquidation threshold: capacity allows HF down to 1.0
        let g = gate(0.85, 0.85);
        let err = g
            .check_borrow(&Position::new(100.0, 0.0), &quote(1.0), 80.0)
            .unwrap_err();
        assert!(matches!(err, AppError::HealthFactorTooLow { .. }));

        // 85 * 1 / 77 ≈ 1.104 stays above 1.1
        assert!(
            g.check_borrow(&Position::new(100.0, 0.0), &quote(1.0), 77.0)
                .is_ok()
        );
    }

    #[test]
    fn test_borrow_invalid_amount() {
        let g = gate(0.75, 0.85);
        assert!(matches!(
            g.check_borrow(&Position::new(100.0, 0.0), &quote(1.0), 0.0),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_withdraw_without_debt_is_always_allowed() {
        let g = gate(0.75, 0.85);
        let (after, assessment) = g
            .check_withdraw(&Position::new(100.0, 0.0), &quote(0.5), 100.0)
            .unwrap();
        assert!(after.is_empty());
        assert_eq!(assessment.tier, RiskTier::NoPosition);
    }

    #[test]
    fn test_withdraw_rejected_when_it_endangers_position() {
        let g = gate(0.75, 0.85);
        // $100 collateral, $40 debt → HF 2.125. Withdrawing 70 leaves HF 0.6375.
        let err = g
            .check_withdraw(&Position::new(100.0, 40.0), &quote(1.0), 70.0)
            .unwrap_err();
        assert!(matches!(err, AppError::HealthFactorTooLow { .. }));

        // Withdrawing 40 leaves HF 1.275
        let (_, assessment) = g
            .check_withdraw(&Position::new(100.0, 40.0), &quote(1.0), 40.0)
            .unwrap();
        assert_eq!(assessment.tier, RiskTier::Moderate);
    }

    #[test]
    fn test_withdraw_more_than_deposited() {
        let g = gate(0.75, 0.85);
        assert!(matches!(
            g.check_withdraw(&Position::new(10.0, 0.0), &quote(1.0), 11.0),
            Err(AppError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_deposit_and_repay_lower_risk() {
        let g = gate(0.75, 0.85);
        let start = Position::new(100.0, 40.0);
        let q = quote(0.5);
        let (p, a) = g.deposit(&start, &q, 100.0).unwrap();
        assert_eq!(p.collateral_amount, 200.0);
        assert_eq!(a.tier, RiskTier::Safe);

        let (p, a) = g.repay(&start, &q, 40.0).unwrap();
        assert_eq!(p.debt_amount, 0.0);
        assert_eq!(a.health_factor, HealthFactor::Unbounded);
    }
}
