//! Staleness reaper — evicts sessions that stopped heartbeating.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use viewdeck_protocol::now_millis;

use crate::config::PresenceConfig;
use crate::presence_registry::PresenceRegistry;

/// Spawn the periodic sweep. It runs until `shutdown` flips to `true` or its
/// sender is dropped.
pub fn spawn_reaper(
    registry: Arc<PresenceRegistry>,
    config: PresenceConfig,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(run_reaper(registry, config, shutdown))
}

async fn run_reaper(
    registry: Arc<PresenceRegistry>,
    config: PresenceConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        component = "reaper",
        event = "reaper.started",
        stale_after_ms = config.stale_after_ms(),
        sweep_interval_ms = config.sweep_interval().as_millis() as u64,
        "Presence reaper started"
    );

    let mut interval = tokio::time::interval(config.sweep_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                sweep_once(&registry, config.stale_after_ms());
            }

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!(
        component = "reaper",
        event = "reaper.stopped",
        "Presence reaper stopped"
    );
}

/// One sweep against the wall clock read right now.
pub fn sweep_once(registry: &PresenceRegistry, stale_after_ms: u64) -> usize {
    let evicted = registry.evict_stale_sessions(now_millis(), stale_after_ms);
    if evicted > 0 {
        debug!(
            component = "reaper",
            event = "reaper.evicted",
            evicted = evicted,
            "Evicted stale viewer sessions"
        );
    }
    evicted
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn sweep_once_evicts_only_stale_sessions() {
        let registry = PresenceRegistry::new();
        let now = now_millis();
        registry.upsert_at("s1", "u1", "a@x.com", "old", now - 31_000);
        registry.upsert_at("s1", "u1", "a@x.com", "live", now);

        assert_eq!(sweep_once(&registry, 30_000), 1);
        assert_eq!(registry.viewer_count("s1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_sweeps_on_its_interval_and_stops_on_shutdown() {
        let registry = Arc::new(PresenceRegistry::new());
        let config = PresenceConfig::new(30_000, 10_000).expect("config");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = spawn_reaper(Arc::clone(&registry), config, shutdown_rx);

        // Let the immediate first tick run, then plant a stale session.
        tokio::time::sleep(Duration::from_millis(1)).await;
        registry.upsert_at("s1", "u1", "a@x.com", "t1", now_millis() - 60_000);
        assert_eq!(registry.viewer_count("s1"), 1);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(registry.viewer_count("s1"), 0);

        shutdown_tx.send(true).expect("reaper is listening");
        handle.await.expect("reaper exits cleanly");
    }

    #[tokio::test]
    async fn reaper_stops_when_shutdown_sender_drops() {
        let registry = Arc::new(PresenceRegistry::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_reaper(registry, PresenceConfig::default(), shutdown_rx);

        drop(shutdown_tx);
        handle.await.expect("reaper exits cleanly");
    }
}
