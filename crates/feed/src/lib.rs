//! Price feeds for the risk engine.
//!
//! A `PriceFeed` produces the latest `PriceQuote` on demand. A
//! `PriceSubscription` owns the task that polls a feed and is the only
//! place a polling timer lives.

pub mod http;
pub mod subscription;

use std::future::Future;

use kale_common::error::AppError;
use kale_common::types::PriceQuote;

pub use http::HttpPriceFeed;
pub use subscription::PriceSubscription;

/// Source of collateral/debt price snapshots.
pub trait PriceFeed: Send + Sync {
    /// Latest available quote.
    fn latest(&self) -> impl Future<Output = Result<PriceQuote, AppError>> + Send;

    /// Human-readable source name, for logs.
    fn source(&self) -> &str;
}

/// Feed that always returns the same prices, stamped with the current time.
#[derive(Debug, Clone)]
pub struct StaticPriceFeed {
    collateral_price_usd: f64,
    debt_price_usd: f64,
}

impl StaticPriceFeed {
    pub fn new(collateral_price_usd: f64) -> Self {
        Self {
            collateral_price_usd,
            debt_price_usd: 1.0,
        }
    }

    pub fn with_debt_price(mut self, debt_price_usd: f64) -> Self {
        self.debt_price_usd = debt_price_usd;
        self
    }
}

impl PriceFeed for StaticPriceFeed {
    async fn latest(&self) -> Result<PriceQuote, AppError> {
        Ok(PriceQuote {
            collateral_price_usd: self.collateral_price_usd,
            debt_price_usd: self.debt_price_usd,
            as_of: chrono::Utc::now(),
        })
    }

    fn source(&self) -> &str {
        "static"
    }
}

/// Reject prices the risk calculator cannot use.
pub(crate) fn validate_price(symbol: &str, price: f64) -> Result<f64, AppError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(AppError::Feed(format!(
            "{symbol} price must be positive, got {price}"
        )));
    }
    Ok(price)
}
