//! Periodic full-state polling.
//!
//! Polling is a safety net for the push channel: every tick fetches the whole device map and
//! hands it to the engine, which runs it through the same change detection as pushed events.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::api::DeviceApi;
use crate::engine::BatchSource;
use crate::engine::Fetched;

/// Spawn the poll loop. The first fetch happens immediately.
///
/// The loop runs until the receiving side of `tx` is dropped. Failed fetches are reported like
/// successful ones; the schedule never backs off.
pub fn spawn_poll_loop(
    api: Arc<dyn DeviceApi>,
    period: Duration,
    tx: mpsc::Sender<Fetched>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let result = api.fetch_devices().await;
            let fetched = Fetched {
                source: BatchSource::Poll,
                result,
            };
            if tx.send(fetched).await.is_err() {
                debug!("Poll receiver dropped, stopping poll loop");
                break;
            }
        }
    })
}
