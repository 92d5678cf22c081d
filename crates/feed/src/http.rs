use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use kale_common::error::AppError;
use kale_common::types::{AssetPrice, COLLATERAL_SYMBOL, DEBT_SYMBOL, PriceQuote};

use crate::{PriceFeed, validate_price};

/// Request timeout for a single price fetch.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Response body of the price endpoint.
#[derive(Debug, Deserialize)]
struct PriceResponse {
    /// e.g. `KALE` or `KALE/USDC`
    #[serde(default)]
    symbol: Option<String>,
    price: f64,
}

#[derive(Debug, Clone, Copy)]
struct CachedQuote {
    quote: PriceQuote,
    fetched_at: Instant,
}

/// Polls an HTTP endpoint for the collateral price.
///
/// A fetched quote is served from cache until `cache_ttl` elapses. When a
/// fetch fails the last cached quote is served, and if nothing was ever
/// fetched the configured fallback price is used. The debt asset is USD-pegged.
pub struct HttpPriceFeed {
    client: reqwest::Client,
    url: String,
    cache_ttl: Duration,
    fallback_price_usd: f64,
    cache: Mutex<Option<CachedQuote>>,
}

impl HttpPriceFeed {
    pub fn new(
        url: impl Into<String>,
        cache_ttl: Duration,
        fallback_price_usd: f64,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Self::with_client(client, url, cache_ttl, fallback_price_usd)
    }

    /// Build the feed around an existing HTTP client.
    pub fn with_client(
        client: reqwest::Client,
        url: impl Into<String>,
        cache_ttl: Duration,
        fallback_price_usd: f64,
    ) -> Result<Self, AppError> {
        Ok(Self {
            client,
            url: url.into(),
            cache_ttl,
            fallback_price_usd: validate_price(COLLATERAL_SYMBOL, fallback_price_usd)?,
            cache: Mutex::new(None),
        })
    }

    /// Fetch a fresh quote, bypassing the cache.
    pub async fn fetch(&self) -> Result<PriceQuote, AppError> {
        let response: PriceResponse = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Self::quote_from_response(response, Utc::now())
    }

    fn quote_from_response(response: PriceResponse, now: DateTime<Utc>) -> Result<PriceQuote, AppError> {
        let symbol = response
            .symbol
            .unwrap_or_else(|| COLLATERAL_SYMBOL.to_string());
        let price = validate_price(&symbol, response.price)?;

        let collateral = AssetPrice::new(symbol, price, now);
        let debt = AssetPrice::new(DEBT_SYMBOL, 1.0, now);
        Ok(PriceQuote::from_assets(&collateral, &debt))
    }

    fn cached(&self) -> Option<CachedQuote> {
        *self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn store(&self, quote: PriceQuote) {
        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = Some(CachedQuote {
            quote,
            fetched_at: Instant::now(),
        });
    }
}

impl PriceFeed for HttpPriceFeed {
    async fn latest(&self) -> Result<PriceQuote, AppError> {
        if let Some(cached) = self.cached()
            && cached.fetched_at.elapsed() < self.cache_ttl
        {
            return Ok(cached.quote);
        }

        match self.fetch().await {
            Ok(quote) => {
                self.store(quote);
                tracing::debug!(
                    price = quote.collateral_price_usd,
                    url = %self.url,
                    "Fetched price"
                );
                Ok(quote)
            }
            Err(e) => {
                if let Some(cached) = self.cached() {
                    tracing::warn!(
                        error = %e,
                        price = cached.quote.collateral_price_usd,
                        "Price fetch failed, serving last known price"
                    );
                    return Ok(cached.quote);
                }

                tracing::warn!(
                    error = %e,
                    price = self.fallback_price_usd,
                    "Price fetch failed, serving fallback price"
                );
                Ok(PriceQuote::usd_pegged(self.fallback_price_usd, Utc::now()))
            }
        }
    }

    fn source(&self) -> &str {
        &self.url
    }
}
