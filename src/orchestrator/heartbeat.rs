//! Background liveness updater for the session record.
//!
//! A [`HeartbeatTask`] writes the session's liveness timestamp on a fixed
//! schedule, independent of the query loop. A failed write is logged and
//! counted but never stops the schedule; an external recovery mechanism
//! reclaims sessions whose heartbeats stop for long enough.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::metrics::{Metrics, HEARTBEAT_FAILED};
use crate::store::MetadataStore;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Builder for the heartbeat task.
///
/// Call [`spawn`](Self::spawn) to start it.
pub struct HeartbeatTask {
    store: Arc<dyn MetadataStore>,
    session_id: String,
    interval: Duration,
    initial_delay: Duration,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
}

impl HeartbeatTask {
    /// Construct a heartbeat task (does not start it yet).
    #[must_use]
    pub fn new(
        store: Arc<dyn MetadataStore>,
        session_id: String,
        interval: Duration,
        initial_delay: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            session_id,
            interval: interval.max(MIN_INTERVAL),
            initial_delay,
            metrics,
            cancel: CancellationToken::new(),
        }
    }

    /// Spawn the background task and return a handle for stopping it.
    #[must_use]
    pub fn spawn(self) -> HeartbeatHandle {
        let beats = Arc::new(AtomicU64::new(0));
        let cancel = self.cancel.clone();
        let span = info_span!("heartbeat", session_id = %self.session_id);
        let join_handle = tokio::spawn(self.run(Arc::clone(&beats)).instrument(span));

        HeartbeatHandle {
            cancel,
            beats,
            join_handle: Some(join_handle),
        }
    }

    async fn run(self, beats: Arc<AtomicU64>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.initial_delay, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    debug!("heartbeat cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }

            // A cancellation arriving mid-write abandons the write.
            let outcome = tokio::select! {
                () = self.cancel.cancelled() => {
                    debug!("heartbeat interrupted during write");
                    return;
                }
                outcome = self.store.record_heartbeat(&self.session_id) => outcome,
            };

            match outcome {
                Ok(()) => {
                    beats.fetch_add(1, Ordering::SeqCst);
                    debug!("heartbeat recorded");
                }
                Err(err) => {
                    self.metrics.increment(HEARTBEAT_FAILED);
                    warn!(%err, "heartbeat write failed");
                }
            }
        }
    }
}

/// Handle returned from [`HeartbeatTask::spawn`].
pub struct HeartbeatHandle {
    cancel: CancellationToken,
    beats: Arc<AtomicU64>,
    join_handle: Option<JoinHandle<()>>,
}

impl Drop for HeartbeatHandle {
    /// Cancel the background task when the handle is dropped.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl HeartbeatHandle {
    /// Successful heartbeat writes so far.
    #[must_use]
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::SeqCst)
    }

    /// Whether the task has been told to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel the task and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            if let Err(err) = handle.await {
                warn!(%err, "heartbeat task ended abnormally");
            }
        }
        info!(beats = self.beats(), "heartbeat stopped");
    }
}
