//! Risk calculator: collateral value, LTV and health factor of a position.
//!
//! Health factor uses the ratio form:
//! HF = (collateral_value * liquidation_threshold) / debt_value
//!
//! All functions are pure and total over non-negative finite inputs. Zero
//! collateral yields 0% LTV and zero debt yields an unbounded health factor,
//! so no division here can produce NaN. Inputs are validated by callers.

use kale_common::types::{HealthFactor, Position, PriceQuote, RiskAssessment, RiskParameters, RiskTier};

/// At or above this health factor a position is safe.
pub const SAFE_HEALTH_FACTOR: f64 = 1.5;

/// Borrows and withdrawals must leave the health factor at or above this.
pub const MIN_BORROW_HEALTH_FACTOR: f64 = 1.1;

/// Below this health factor a position is liquidatable.
pub const LIQUIDATION_HEALTH_FACTOR: f64 = 1.0;

/// USD value of a token amount.
pub fn value_of(amount: f64, price_usd: f64) -> f64 {
    amount * price_usd
}

/// Loan-to-value as a percentage.
///
/// Zero collateral is defined as 0% LTV, even if a debt value is passed.
pub fn compute_ltv(collateral_value_usd: f64, debt_value_usd: f64) -> f64 {
    if collateral_value_usd == 0.0 {
        return 0.0;
    }
    (debt_value_usd / collateral_value_usd) * 100.0
}

/// Health factor in ratio form. `Unbounded` when there is no debt.
pub fn compute_health_factor(
    collateral_value_usd: f64,
    debt_value_usd: f64,
    liquidation_threshold: f64,
) -> HealthFactor {
    if debt_value_usd == 0.0 {
        return HealthFactor::Unbounded;
    }
    HealthFactor::Ratio((collateral_value_usd * liquidation_threshold) / debt_value_usd)
}

/// Map a health factor to its tier. Each cutoff belongs to the safer tier.
pub fn classify_risk(health_factor: HealthFactor) -> RiskTier {
    match health_factor {
        HealthFactor::Unbounded => RiskTier::Safe,
        HealthFactor::Ratio(hf) if hf >= SAFE_HEALTH_FACTOR => RiskTier::Safe,
        HealthFactor::Ratio(hf) if hf >= MIN_BORROW_HEALTH_FACTOR => RiskTier::Moderate,
        HealthFactor::Ratio(hf) if hf >= LIQUIDATION_HEALTH_FACTOR => RiskTier::High,
        HealthFactor::Ratio(_) => RiskTier::Critical,
    }
}

/// Borrow capacity of the collateral. Existing debt is not subtracted.
pub fn max_borrowable(collateral_value_usd: f64, max_ltv: f64) -> f64 {
    collateral_value_usd * max_ltv
}

/// Remaining borrow capacity after existing debt, floored at zero.
pub fn available_to_borrow(collateral_value_usd: f64, current_debt_usd: f64, max_ltv: f64) -> f64 {
    (max_borrowable(collateral_value_usd, max_ltv) - current_debt_usd).max(0.0)
}

/// Evaluate a position against one price snapshot.
pub fn assess(position: &Position, quote: &PriceQuote, params: &RiskParameters) -> RiskAssessment {
    let collateral_value_usd = value_of(position.collateral_amount, quote.collateral_price_usd);
    let debt_value_usd = value_of(position.debt_amount, quote.debt_price_usd);
    let health_factor =
        compute_health_factor(collateral_value_usd, debt_value_usd, params.liquidation_threshold);

    let tier = if position.is_empty() {
        RiskTier::NoPosition
    } else {
        classify_risk(health_factor)
    };

    RiskAssessment {
        collateral_value_usd,
        debt_value_usd,
        ltv: compute_ltv(collateral_value_usd, debt_value_usd),
        health_factor,
        tier,
        max_borrowable_usd: max_borrowable(collateral_value_usd, params.max_ltv),
        available_to_borrow_usd: available_to_borrow(
            collateral_value_usd,
            debt_value_usd,
            params.max_ltv,
        ),
    }
}

/// Risk calculator bound to a market's parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskCalculator {
    params: RiskParameters,
}

impl RiskCalculator {
    pub fn new(params: RiskParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RiskParameters {
        &self.params
    }

    pub fn assess(&self, position: &Position, quote: &PriceQuote) -> RiskAssessment {
        assess(position, quote, &self.params)
    }
}
