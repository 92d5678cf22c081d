//! Price subscription: an owned, cancellable polling task.
//!
//! The task polls a `PriceFeed` on a fixed interval and publishes every quote
//! on a `watch` channel, so readers only ever see the latest snapshot. The
//! task lives exactly as long as its `PriceSubscription`: `stop()` cancels and
//! joins it, and dropping the subscription cancels it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use kale_common::types::PriceQuote;

use crate::PriceFeed;

/// Handle to a running price polling task.
pub struct PriceSubscription {
    receiver: watch::Receiver<Option<PriceQuote>>,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PriceSubscription {
    /// Spawn a polling task for `feed`. The first poll happens immediately.
    /// A zero interval is raised to one millisecond.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(feed: Arc<F>, poll_interval: Duration) -> Self
    where
        F: PriceFeed + 'static,
    {
        let poll_interval = poll_interval.max(Duration::from_millis(1));
        let (sender, receiver) = watch::channel(None);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(feed, poll_interval, sender, shutdown.clone()));

        Self {
            receiver,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Most recent quote, if one has been published.
    pub fn latest(&self) -> Option<PriceQuote> {
        *self.receiver.borrow()
    }

    /// Another receiver for the same quote stream.
    pub fn receiver(&self) -> watch::Receiver<Option<PriceQuote>> {
        self.receiver.clone()
    }

    /// Wait for the next published quote.
    ///
    /// Returns `None` once the polling task has ended.
    pub async fn changed(&mut self) -> Option<PriceQuote> {
        loop {
            self.receiver.changed().await.ok()?;
            if let Some(quote) = *self.receiver.borrow_and_update() {
                return Some(quote);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel the polling task and wait for it to exit.
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "Price polling task ended abnormally");
        }
    }
}

impl Drop for PriceSubscription {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn poll_loop<F>(
    feed: Arc<F>,
    poll_interval: Duration,
    sender: watch::Sender<Option<PriceQuote>>,
    shutdown: CancellationToken,
) where
    F: PriceFeed + 'static,
{
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        source = feed.source(),
        poll_interval_ms = poll_interval.as_millis() as u64,
        "Price subscription started"
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = feed.latest() => result,
        };

        match result {
            Ok(quote) => {
                if sender.send(Some(quote)).is_err() {
                    // Every receiver is gone
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, source = feed.source(), "Price poll failed");
            }
        }
    }

    tracing::info!(source = feed.source(), "Price subscription stopped");
}
