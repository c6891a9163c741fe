#[cfg(test)]
#[path = "metrics_test.rs"]
mod tests;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::backend::ArcBackend;
use crate::models::{ArcEventTx, Event};

/// Polls `/metrics` on a fixed interval until cancelled. Failed polls are
/// skipped silently.
pub struct MetricsPoller {
    backend: ArcBackend,
    event_tx: ArcEventTx,
    interval: Duration,
    cancel_token: CancellationToken,
}

impl MetricsPoller {
    pub fn new(
        backend: ArcBackend,
        event_tx: ArcEventTx,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            backend,
            event_tx,
            interval,
            cancel_token,
        }
    }

    pub async fn start(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    log::debug!("Metrics poller cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let metrics = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    log::debug!("Metrics poller cancelled");
                    return;
                }
                res = self.backend.metrics() => res,
            };

            match metrics {
                Ok(metrics) => {
                    log::trace!("{}", metrics);
                    if self.event_tx.send(Event::Metrics(metrics)).await.is_err() {
                        log::debug!("Event channel closed, stopping metrics poller");
                        return;
                    }
                }
                Err(err) => log::trace!("Skipping metrics poll: {:#}", err),
            }
        }
    }
}
