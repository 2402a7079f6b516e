//! # Rep Persistence Queue
//!
//! Fire-and-forget storage of detected reps.
//!
//! ## Architecture
//! - **RepWriter**: Handle held by the session; `submit` never blocks the sample stream
//! - **Worker task**: Drains the bounded queue and calls `create_rep` on the gateway
//!
//! ## Failure Policy
//! Reps are best-effort. A failed save is logged and counted, a full queue drops
//! the rep with a warning. Neither affects the local rep count.

use crate::gateway::{PersistenceGateway, SetId, WorkoutId};
use crate::segmentation::RepRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One rep waiting to be stored
#[derive(Debug, Clone)]
pub struct RepSubmission {
    pub workout_id: WorkoutId,
    pub set_id: SetId,
    pub rep: RepRecord,
}

/// Counters shared between the handle and the worker
#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    saved: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of the rep queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepWriterStats {
    pub submitted: u64,
    pub saved: u64,
    pub failed: u64,
    pub dropped: u64,
}

pub struct RepWriter {
    tx: Option<mpsc::Sender<RepSubmission>>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl RepWriter {
    /// Spawn the worker on `runtime` with a queue of `capacity` reps
    pub fn spawn(runtime: &Handle, gateway: Arc<dyn PersistenceGateway>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let worker = runtime.spawn(Self::worker_loop(rx, gateway, counters.clone()));

        Self {
            tx: Some(tx),
            worker: Some(worker),
            counters,
        }
    }

    /// Queue a rep for storage without waiting
    pub fn submit(&self, submission: RepSubmission) {
        let Some(tx) = &self.tx else {
            log::error!("Rep writer closed, rep {} not saved", submission.rep.rep_number);
            return;
        };

        match tx.try_send(submission) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(submission)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "Rep queue full, dropping rep {} of set {}",
                    submission.rep.rep_number,
                    submission.set_id
                );
            }
            Err(mpsc::error::TrySendError::Closed(submission)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                log::error!(
                    "Rep worker stopped, dropping rep {} of set {}",
                    submission.rep.rep_number,
                    submission.set_id
                );
            }
        }
    }

    pub fn stats(&self) -> RepWriterStats {
        RepWriterStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            saved: self.counters.saved.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting reps and wait until every queued rep has been attempted
    pub async fn close(mut self) -> RepWriterStats {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                log::error!("Rep worker panicked: {}", e);
            }
        }
        self.stats()
    }

    async fn worker_loop(
        mut rx: mpsc::Receiver<RepSubmission>,
        gateway: Arc<dyn PersistenceGateway>,
        counters: Arc<Counters>,
    ) {
        while let Some(submission) = rx.recv().await {
            let result = gateway
                .create_rep(&submission.workout_id, &submission.set_id, &submission.rep)
                .await;

            match result {
                Ok(rep_id) => {
                    counters.saved.fetch_add(1, Ordering::Relaxed);
                    log::debug!(
                        "Saved rep {} of set {} as {}",
                        submission.rep.rep_number,
                        submission.set_id,
                        rep_id
                    );
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    log::error!(
                        "Failed to save rep {} of set {}: {}",
                        submission.rep.rep_number,
                        submission.set_id,
                        e
                    );
                }
            }
        }

        log::debug!("Rep worker: queue closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayOp, MemoryGateway};
    use chrono::Utc;

    fn rep(n: u32) -> RepRecord {
        RepRecord {
            rep_number: n,
            start_index: 0,
            end_index: 6,
            start_timestamp: 0,
            end_timestamp: 60,
            peak_velocity: [0.5, 0.0, 0.0],
            peak_acceleration: [2.0, 0.0, 0.0],
            peak_velocity_magnitude: 0.5,
            peak_acceleration_magnitude: 2.0,
            peak_force: 120.0,
            peak_power: 60.0,
        }
    }

    async fn setup(gateway: &MemoryGateway) -> (WorkoutId, SetId) {
        let workout_id = gateway.create_workout(Utc::now()).await.unwrap();
        let set_id = gateway.create_set(&workout_id, "Squat", 60.0).await.unwrap();
        (workout_id, set_id)
    }

    #[tokio::test]
    async fn test_reps_are_saved() {
        let gateway = Arc::new(MemoryGateway::new());
        let (workout_id, set_id) = setup(&gateway).await;
        let writer = RepWriter::spawn(&Handle::current(), gateway.clone(), 8);

        for n in 1..=3 {
            writer.submit(RepSubmission {
                workout_id: workout_id.clone(),
                set_id: set_id.clone(),
                rep: rep(n),
            });
        }

        let stats = writer.close().await;
        assert_eq!(stats.submitted, 3);
        assert_eq!(stats.saved, 3);
        assert_eq!(gateway.workouts()[0].sets[0].reps.len(), 3);
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_propagated() {
        let gateway = Arc::new(MemoryGateway::new());
        let (workout_id, set_id) = setup(&gateway).await;
        gateway.fail_on(GatewayOp::CreateRep, true);
        let writer = RepWriter::spawn(&Handle::current(), gateway.clone(), 8);

        writer.submit(RepSubmission {
            workout_id,
            set_id,
            rep: rep(1),
        });

        let stats = writer.close().await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.saved, 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let gateway = Arc::new(MemoryGateway::new());
        let (workout_id, set_id) = setup(&gateway).await;
        let writer = RepWriter::spawn(&Handle::current(), gateway.clone(), 1);

        // Current-thread runtime: the worker cannot run until we yield
        for n in 1..=3 {
            writer.submit(RepSubmission {
                workout_id: workout_id.clone(),
                set_id: set_id.clone(),
                rep: rep(n),
            });
        }

        let stats = writer.close().await;
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.saved, 1);
    }
}
