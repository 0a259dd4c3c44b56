use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hojokin_collab::CollabHub;
use hojokin_protocol::{frames::EventFrame, methods::events};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info};

/// Drop section locks nobody refreshed. Runs until `shutdown` flips.
pub async fn run_lock_sweeper(hub: Arc<CollabHub>, interval_secs: u64, mut shutdown: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let expired = hub.expire_locks(Utc::now()).await;
                if !expired.is_empty() {
                    debug!(count = expired.len(), "expired section locks released");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("lock sweeper stopped");
}

/// Heartbeat `tick` event to every authenticated connection.
pub async fn run_heartbeat(hub: Arc<CollabHub>, interval_secs: u64, mut shutdown: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // the first tick fires immediately; skip it
    tick.tick().await;
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let frame = EventFrame::new(
                    events::TICK,
                    json!({ "ts": Utc::now().timestamp_millis() }),
                )
                .with_seq(hub.next_seq())
                .encode();
                hub.broadcast_all(&frame);
            }
            _ = shutdown.changed() => break,
        }
    }
}
