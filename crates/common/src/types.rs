use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Symbol of the collateral asset.
pub const COLLATERAL_SYMBOL: &str = "KALE";

/// Symbol of the USD-pegged debt asset.
pub const DEBT_SYMBOL: &str = "USDC";

/// A user's lending position, in token units.
///
/// Actions never mutate a position in place: each returns the whole new
/// position, so derived values are always read from a consistent pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub collateral_amount: f64,
    pub debt_amount: f64,
}

impl Position {
    pub fn new(collateral_amount: f64, debt_amount: f64) -> Self {
        Self {
            collateral_amount,
            debt_amount,
        }
    }

    /// A position with neither collateral nor debt.
    pub fn is_empty(&self) -> bool {
        self.collateral_amount == 0.0 && self.debt_amount == 0.0
    }

    /// Add collateral.
    pub fn deposit(&self, amount: f64) -> Result<Self, AppError> {
        validate_amount(amount)?;
        Ok(Self {
            collateral_amount: self.collateral_amount + amount,
            ..*self
        })
    }

    /// Remove collateral. Fails if more than the deposited amount is requested.
    pub fn withdraw(&self, amount: f64) -> Result<Self, AppError> {
        validate_amount(amount)?;
        if amount > self.collateral_amount {
            return Err(AppError::InsufficientBalance {
                requested: amount,
                available: self.collateral_amount,
            });
        }
        Ok(Self {
            collateral_amount: self.collateral_amount - amount,
            ..*self
        })
    }

    /// Add debt. Capacity and health checks live in the engine's gate.
    pub fn borrow(&self, amount: f64) -> Result<Self, AppError> {
        validate_amount(amount)?;
        Ok(Self {
            debt_amount: self.debt_amount + amount,
            ..*self
        })
    }

    /// Pay back debt. Fails if more than the outstanding debt is repaid.
    pub fn repay(&self, amount: f64) -> Result<Self, AppError> {
        validate_amount(amount)?;
        if amount > self.debt_amount {
            return Err(AppError::InsufficientBalance {
                requested: amount,
                available: self.debt_amount,
            });
        }
        Ok(Self {
            debt_amount: self.debt_amount - amount,
            ..*self
        })
    }
}

fn validate_amount(amount: f64) -> Result<(), AppError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::Validation(format!(
            "amount must be a positive number, got {amount}"
        )));
    }
    Ok(())
}

/// Latest price of a single tracked asset, as supplied by a price feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPrice {
    pub symbol: String,
    pub price_usd: f64,
    pub as_of: DateTime<Utc>,
}

impl AssetPrice {
    pub fn new(symbol: impl Into<String>, price_usd: f64, as_of: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            price_usd,
            as_of,
        }
    }
}

/// Immutable price snapshot used for one risk evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub collateral_price_usd: f64,
    pub debt_price_usd: f64,
    pub as_of: DateTime<Utc>,
}

impl PriceQuote {
    /// Quote for a debt asset pegged at exactly one dollar.
    pub fn usd_pegged(collateral_price_usd: f64, as_of: DateTime<Utc>) -> Self {
        Self {
            collateral_price_usd,
            debt_price_usd: 1.0,
            as_of,
        }
    }

    /// Combine two per-asset prices. The snapshot is as old as its oldest leg.
    pub fn from_assets(collateral: &AssetPrice, debt: &AssetPrice) -> Self {
        Self {
            collateral_price_usd: collateral.price_usd,
            debt_price_usd: debt.price_usd,
            as_of: collateral.as_of.min(debt.as_of),
        }
    }
}

/// Static risk configuration for the lending market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskParameters {
    /// Maximum LTV (fraction) a borrower may open up to.
    pub max_ltv: f64,
    /// LTV (fraction) at which a position becomes liquidatable.
    pub liquidation_threshold: f64,
}

impl RiskParameters {
    pub const DEFAULT_MAX_LTV: f64 = 0.75;
    pub const DEFAULT_LIQUIDATION_THRESHOLD: f64 = 0.85;

    /// Build validated parameters: `0 < max_ltv <= liquidation_threshold <= 1`.
    pub fn new(max_ltv: f64, liquidation_threshold: f64) -> Result<Self, AppError> {
        let in_unit_range = |v: f64| v.is_finite() && v > 0.0 && v <= 1.0;

        if !in_unit_range(max_ltv) {
            return Err(AppError::Config(format!(
                "max_ltv must be in (0, 1], got {max_ltv}"
            )));
        }
        if !in_unit_range(liquidation_threshold) {
            return Err(AppError::Config(format!(
                "liquidation_threshold must be in (0, 1], got {liquidation_threshold}"
            )));
        }
        if max_ltv > liquidation_threshold {
            return Err(AppError::Config(format!(
                "max_ltv ({max_ltv}) must not exceed liquidation_threshold ({liquidation_threshold})"
            )));
        }

        Ok(Self {
            max_ltv,
            liquidation_threshold,
        })
    }
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            max_ltv: Self::DEFAULT_MAX_LTV,
            liquidation_threshold: Self::DEFAULT_LIQUIDATION_THRESHOLD,
        }
    }
}

/// Health factor in ratio form: `1.0` means collateral at the liquidation
/// threshold exactly covers debt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum HealthFactor {
    /// No debt: nothing can be liquidated.
    Unbounded,
    Ratio(f64),
}

impl HealthFactor {
    /// Ratio value, with `Unbounded` mapped to `f64::INFINITY`.
    pub fn as_f64(&self) -> f64 {
        match self {
            HealthFactor::Unbounded => f64::INFINITY,
            HealthFactor::Ratio(r) => *r,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, HealthFactor::Unbounded)
    }

    /// Whether this health factor is strictly below `minimum`.
    pub fn is_below(&self, minimum: f64) -> bool {
        match self {
            HealthFactor::Unbounded => false,
            HealthFactor::Ratio(r) => *r < minimum,
        }
    }
}

impl std::fmt::Display for HealthFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthFactor::Unbounded => write!(f, "∞"),
            HealthFactor::Ratio(r) => write!(f, "{:.2}", r),
        }
    }
}

/// Discrete risk classification of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Safe,
    Moderate,
    High,
    Critical,
    NoPosition,
}

impl RiskTier {
    /// Ordering by danger; `NoPosition` is the least dangerous.
    fn rank(&self) -> u8 {
        match self {
            RiskTier::NoPosition => 0,
            RiskTier::Safe => 1,
            RiskTier::Moderate => 2,
            RiskTier::High => 3,
            RiskTier::Critical => 4,
        }
    }

    pub fn is_worse_than(&self, other: RiskTier) -> bool {
        self.rank() > other.rank()
    }

    /// Alert severity used when a position enters this tier.
    pub fn severity(&self) -> Severity {
        match self {
            RiskTier::NoPosition | RiskTier::Safe | RiskTier::Moderate => Severity::Info,
            RiskTier::High => Severity::Warning,
            RiskTier::Critical => Severity::Critical,
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskTier::Safe => write!(f, "safe"),
            RiskTier::Moderate => write!(f, "moderate"),
            RiskTier::High => write!(f, "high"),
            RiskTier::Critical => write!(f, "critical"),
            RiskTier::NoPosition => write!(f, "no_position"),
        }
    }
}

/// Derived risk view of a position at one price snapshot. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub collateral_value_usd: f64,
    pub debt_value_usd: f64,
    /// Loan-to-value as a percentage.
    pub ltv: f64,
    pub health_factor: HealthFactor,
    pub tier: RiskTier,
    pub max_borrowable_usd: f64,
    pub available_to_borrow_usd: f64,
}

/// Alert severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_actions_return_new_values() {
        let p = Position::default();
        let p = p.deposit(100.0).unwrap();
        let p = p.borrow(30.0).unwrap();
        assert_eq!(p, Position::new(100.0, 30.0));

        let p = p.repay(10.0).unwrap().withdraw(40.0).unwrap();
        assert_eq!(p, Position::new(60.0, 20.0));
    }

    #[test]
    fn test_position_rejects_bad_amounts() {
        let p = Position::new(10.0, 5.0);
        assert!(matches!(p.deposit(0.0), Err(AppError::Validation(_))));
        assert!(matches!(p.borrow(-1.0), Err(AppError::Validation(_))));
        assert!(matches!(p.deposit(f64::NAN), Err(AppError::Validation(_))));
        assert!(matches!(
            p.withdraw(11.0),
            Err(AppError::InsufficientBalance { .. })
        ));
        assert!(matches!(
            p.repay(6.0),
            Err(AppError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_risk_parameters_validation() {
        assert!(RiskParameters::new(0.75, 0.85).is_ok());
        assert!(RiskParameters::new(0.85, 0.85).is_ok());
        assert!(RiskParameters::new(0.9, 0.85).is_err());
        assert!(RiskParameters::new(0.0, 0.85).is_err());
        assert!(RiskParameters::new(0.75, 1.2).is_err());
        assert!(RiskParameters::new(f64::NAN, 0.85).is_err());
        assert_eq!(
            RiskParameters::default(),
            RiskParameters::new(0.75, 0.85).unwrap()
        );
    }

    #[test]
    fn test_health_factor_display_and_json() {
        assert_eq!(HealthFactor::Unbounded.to_string(), "∞");
        assert_eq!(HealthFactor::Ratio(1.0625).to_string(), "1.06");

        let json = serde_json::to_value(HealthFactor::Unbounded).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "unbounded" }));
        let back: HealthFactor = serde_json::from_value(json).unwrap();
        assert!(back.is_unbounded());
    }

    #[test]
    fn test_tier_ordering_and_severity() {
        assert!(RiskTier::Critical.is_worse_than(RiskTier::High));
        assert!(RiskTier::Moderate.is_worse_than(RiskTier::Safe));
        assert!(RiskTier::Safe.is_worse_than(RiskTier::NoPosition));
        assert!(!RiskTier::Safe.is_worse_than(RiskTier::Safe));
        assert_eq!(RiskTier::High.severity(), Severity::Warning);
        assert_eq!(RiskTier::Critical.severity(), Severity::Critical);
        assert_eq!(RiskTier::Moderate.severity(), Severity::Info);
    }

    #[test]
    fn test_quote_from_assets_uses_oldest_timestamp() {
        let older = Utc::now() - chrono::Duration::seconds(30);
        let newer = Utc::now();
        let kale = AssetPrice::new(COLLATERAL_SYMBOL, 0.5, newer);
        let usdc = AssetPrice::new(DEBT_SYMBOL, 1.0, older);
        let quote = PriceQuote::from_assets(&kale, &usdc);
        assert_eq!(quote.collateral_price_usd, 0.5);
        assert_eq!(quote.debt_price_usd, 1.0);
        assert_eq!(quote.as_of, older);
    }
}
