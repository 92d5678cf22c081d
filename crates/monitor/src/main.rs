//! KaleFi risk monitor binary entrypoint.
//!
//! Polls the configured price feed, re-evaluates the configured position on
//! every new quote and logs tier-change alerts as JSON.

use std::sync::Arc;
use std::time::Duration;

use kale_common::config::AppConfig;
use kale_engine::monitor::RiskMonitor;
use kale_engine::risk::RiskCalculator;
use kale_feed::{HttpPriceFeed, PriceFeed, PriceSubscription, StaticPriceFeed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kale_monitor=info,kale_engine=debug,kale_feed=info".into()),
        )
        .json()
        .init();

    tracing::info!("KaleFi risk monitor starting...");

    // Load configuration
    let config = AppConfig::from_env()?;
    let params = config.risk_parameters()?;
    tracing::info!(
        max_ltv = params.max_ltv,
        liquidation_threshold = params.liquidation_threshold,
        "Risk parameters loaded"
    );

    let monitor = RiskMonitor::new(
        RiskCalculator::new(params),
        config.monitor_hysteresis_ticks,
        config.monitor_cooldown_seconds,
    );

    match config.price_feed_url.clone() {
        Some(url) => {
            let feed = HttpPriceFeed::new(
                url,
                Duration::from_millis(config.price_cache_ttl_ms),
                config.fallback_price_usd,
            )?;
            run(feed, monitor, &config).await
        }
        None => {
            tracing::warn!(
                price = config.fallback_price_usd,
                "PRICE_FEED_URL not set, using a static price"
            );
            run(StaticPriceFeed::new(config.fallback_price_usd), monitor, &config).await
        }
    }
}

/// Evaluate the configured position on every quote until Ctrl+C.
async fn run<F>(feed: F, mut monitor: RiskMonitor, config: &AppConfig) -> anyhow::Result<()>
where
    F: PriceFeed + 'static,
{
    let position_id = monitor.track(config.position());
    tracing::info!(
        position_id = %position_id,
        collateral = config.position_collateral,
        debt = config.position_debt,
        "Monitoring position"
    );

    let mut subscription = PriceSubscription::spawn(
        Arc::new(feed),
        Duration::from_millis(config.price_poll_interval_ms),
    );

    loop {
        tokio::select! {
            quote = subscription.changed() => {
                let Some(quote) = quote else {
                    tracing::error!("Price subscription ended unexpectedly");
                    break;
                };

                for alert in monitor.on_quote(&quote) {
                    tracing::warn!(
                        severity = %alert.severity,
                        title = %alert.title,
                        alert = %serde_json::to_string(&alert)?,
                        "{}",
                        alert.body
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal, stopping gracefully...");
                break;
            }
        }
    }

    subscription.stop().await;
    tracing::info!("KaleFi risk monitor stopped.");
    Ok(())
}
