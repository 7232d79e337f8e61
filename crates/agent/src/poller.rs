//! Periodic presence snapshot for every stream, for list views.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use viewdeck_protocol::{ViewerSession, WindowCount};

use crate::transport::PresenceTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotState {
    pub viewers: BTreeMap<String, Vec<ViewerSession>>,
    pub window_counts: BTreeMap<String, Vec<WindowCount>>,
    /// True until the first fetch finishes, successful or not.
    pub loading: bool,
}

impl Default for SnapshotState {
    fn default() -> Self {
        Self {
            viewers: BTreeMap::new(),
            window_counts: BTreeMap::new(),
            loading: true,
        }
    }
}

/// Background task refreshing a [`SnapshotState`]. Stops when dropped.
pub struct SnapshotPoller {
    state: watch::Receiver<SnapshotState>,
    refetch: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SnapshotPoller {
    pub const DEFAULT_PERIOD: Duration = Duration::from_secs(5);

    /// Fetch immediately, then every `period`.
    pub fn spawn<T: PresenceTransport>(transport: T, period: Duration) -> Self {
        let (tx, state) = watch::channel(SnapshotState::default());
        let refetch = Arc::new(Notify::new());
        let task = tokio::spawn(run_poller(transport, period, tx, Arc::clone(&refetch)));
        Self {
            state,
            refetch,
            task,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SnapshotState> {
        self.state.clone()
    }

    pub fn current(&self) -> SnapshotState {
        self.state.borrow().clone()
    }

    /// Fetch again without waiting for the next period.
    pub fn refetch(&self) {
        self.refetch.notify_one();
    }
}

impl Drop for SnapshotPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_poller<T: PresenceTransport>(
    transport: T,
    period: Duration,
    tx: watch::Sender<SnapshotState>,
    refetch: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = refetch.notified() => {}
        }

        let fetched = transport.snapshot().await;
        tx.send_modify(|state| {
            match fetched {
                Ok(snapshot) if snapshot.success => {
                    state.viewers = snapshot.viewers;
                    state.window_counts = snapshot.window_counts;
                }
                Ok(_) => {
                    debug!(
                        component = "poller",
                        event = "poller.unsuccessful",
                        "Snapshot reported failure; keeping last state"
                    );
                }
                Err(err) => {
                    debug!(
                        component = "poller",
                        event = "poller.fetch_failed",
                        error = %err,
                        "Snapshot fetch failed; keeping last state"
                    );
                }
            }
            state.loading = false;
        });
    }
}
