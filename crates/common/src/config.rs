use crate::types::{Position, RiskParameters};

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Maximum LTV for opening borrows (default: 0.75)
    pub max_ltv: f64,

    /// LTV at which positions become liquidatable (default: 0.85)
    pub liquidation_threshold: f64,

    /// HTTP price endpoint returning `{ "price": <f64> }`.
    /// When unset, the monitor runs against a static quote.
    pub price_feed_url: Option<String>,

    /// Price polling interval in milliseconds (default: 5000)
    pub price_poll_interval_ms: u64,

    /// How long a fetched quote is served from cache, in milliseconds (default: 5000)
    pub price_cache_ttl_ms: u64,

    /// Collateral price used when no quote has ever been fetched (default: 0.5)
    pub fallback_price_usd: f64,

    /// Consecutive ticks a worse tier must hold before alerting (default: 1)
    pub monitor_hysteresis_ticks: u64,

    /// Cooldown between alerts for the same tier, in seconds (default: 300)
    pub monitor_cooldown_seconds: u64,

    /// Collateral amount of the monitored position
    pub position_collateral: f64,

    /// Debt amount of the monitored position
    pub position_debt: f64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Self {
            max_ltv: get("RISK_MAX_LTV", "0.75")
                .parse()
                .map_err(|_| anyhow::anyhow!("RISK_MAX_LTV must be a valid f64"))?,
            liquidation_threshold: get("RISK_LIQUIDATION_THRESHOLD", "0.85")
                .parse()
                .map_err(|_| anyhow::anyhow!("RISK_LIQUIDATION_THRESHOLD must be a valid f64"))?,
            price_feed_url: lookup("PRICE_FEED_URL").filter(|url| !url.trim().is_empty()),
            price_poll_interval_ms: get("PRICE_POLL_INTERVAL_MS", "5000")
                .parse()
                .map_err(|_| anyhow::anyhow!("PRICE_POLL_INTERVAL_MS must be a valid u64"))?,
            price_cache_ttl_ms: get("PRICE_CACHE_TTL_MS", "5000")
                .parse()
                .map_err(|_| anyhow::anyhow!("PRICE_CACHE_TTL_MS must be a valid u64"))?,
            fallback_price_usd: get("FALLBACK_PRICE_USD", "0.5")
                .parse()
                .map_err(|_| anyhow::anyhow!("FALLBACK_PRICE_USD must be a valid f64"))?,
            monitor_hysteresis_ticks: get("MONITOR_HYSTERESIS_TICKS", "1")
                .parse()
                .map_err(|_| anyhow::anyhow!("MONITOR_HYSTERESIS_TICKS must be a valid u64"))?,
            monitor_cooldown_seconds: get("MONITOR_COOLDOWN_SECONDS", "300")
                .parse()
                .map_err(|_| anyhow::anyhow!("MONITOR_COOLDOWN_SECONDS must be a valid u64"))?,
            position_collateral: get("POSITION_COLLATERAL", "0")
                .parse()
                .map_err(|_| anyhow::anyhow!("POSITION_COLLATERAL must be a valid f64"))?,
            position_debt: get("POSITION_DEBT", "0")
                .parse()
                .map_err(|_| anyhow::anyhow!("POSITION_DEBT must be a valid f64"))?,
        };

        // Fail at startup rather than on the first evaluation
        config.risk_parameters()?;
        if !(config.fallback_price_usd.is_finite() && config.fallback_price_usd > 0.0) {
            anyhow::bail!("FALLBACK_PRICE_USD must be positive");
        }
        for (key, amount) in [
            ("POSITION_COLLATERAL", config.position_collateral),
            ("POSITION_DEBT", config.position_debt),
        ] {
            if !(amount.is_finite() && amount >= 0.0) {
                anyhow::bail!("{key} must be a finite, non-negative amount");
            }
        }
        if config.price_poll_interval_ms == 0 {
            anyhow::bail!("PRICE_POLL_INTERVAL_MS must be greater than zero");
        }

        Ok(config)
    }

    /// Validated risk parameters.
    pub fn risk_parameters(&self) -> Result<RiskParameters, crate::error::AppError> {
        RiskParameters::new(self.max_ltv, self.liquidation_threshold)
    }

    /// The position the monitor binary tracks.
    pub fn position(&self) -> Position {
        Position::new(self.position_collateral, self.position_debt)
    }
}
