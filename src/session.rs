//! # Workout Session Module
//!
//! State machine deciding when samples are recorded, plus the glue between the
//! sample stream, the rep detector, the set buffer and the persistence gateway.
//!
//! ## States
//! ```text
//! Idle --start_workout--> WorkoutActive --start_set--> SetActive
//!  ^                          |   ^                        |
//!  +-------end_workout--------+   +---------end_set--------+
//! ```
//! `end_workout` from `SetActive` ends the set first.
//!
//! ## Failure Handling
//! - Guard violations are rejected before anything changes.
//! - A failed `start_workout`, `start_set` or `end_workout` leaves the state as it was.
//! - A failed `end_set` still returns to `WorkoutActive` (recording has stopped) and
//!   keeps the finished set as a pending upload for `retry_pending_saves`.
//! - Rep saves go through the rep writer and never fail a transition.

use crate::aggregator::{SetBuffer, SetColumns};
use crate::error::{GatewayError, SessionError};
use crate::frame::SensorSample;
use crate::gateway::{PersistenceGateway, SetId, SetUpload, WorkoutId};
use crate::rep_writer::{RepSubmission, RepWriter, RepWriterStats};
use crate::segmentation::{RepDetector, RepRecord, SegmentationConfig};
use crate::stream::LinkState;
use chrono::Utc;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    WorkoutActive {
        workout_id: WorkoutId,
    },
    SetActive {
        workout_id: WorkoutId,
        set_id: SetId,
        exercise_type: String,
        weight: f32,
    },
}

impl SessionState {
    /// Human-readable description used in error messages
    pub fn describe(&self) -> &'static str {
        match self {
            SessionState::Idle => "no workout is active",
            SessionState::WorkoutActive { .. } => "a workout is active",
            SessionState::SetActive { .. } => "a set is active",
        }
    }
}

/// Point-in-time copy of the session for display
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub recording: bool,
    pub set_count: u32,
    pub rep_count: u32,
    pub sample_count: usize,
    pub pending_saves: usize,
}

/// Result of a successfully saved set
#[derive(Debug, Clone, PartialEq)]
pub struct SetSummary {
    pub workout_id: WorkoutId,
    pub set_id: SetId,
    pub exercise_type: String,
    pub weight: f32,
    pub rep_count: u32,
    pub sample_count: usize,
    pub columns: SetColumns,
}

pub struct WorkoutSession {
    state: SessionState,
    recording: bool,
    buffer: SetBuffer,
    detector: RepDetector,
    gateway: Arc<dyn PersistenceGateway>,
    rep_writer: RepWriter,
    link: LinkState,
    set_count: u32,
    pending_saves: Vec<SetUpload>,
}

fn guard(operation: &'static str, state: &SessionState) -> SessionError {
    SessionError::GuardViolation {
        operation,
        state: state.describe(),
    }
}

fn persistence(operation: &'static str) -> impl FnOnce(GatewayError) -> SessionError {
    move |source| SessionError::Persistence { operation, source }
}

impl WorkoutSession {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        rep_writer: RepWriter,
        segmentation: SegmentationConfig,
        link: LinkState,
    ) -> Self {
        log::debug!("Session using {} gateway", gateway.backend_type());
        Self {
            state: SessionState::Idle,
            recording: false,
            buffer: SetBuffer::new(),
            detector: RepDetector::new(segmentation),
            gateway,
            rep_writer,
            link,
            set_count: 0,
            pending_saves: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[cfg(test)]
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state.clone(),
            recording: self.recording,
            set_count: self.set_count,
            rep_count: self.buffer.rep_count(),
            sample_count: self.buffer.len(),
            pending_saves: self.pending_saves.len(),
        }
    }

    pub async fn start_workout(&mut self) -> Result<WorkoutId, SessionError> {
        if self.state != SessionState::Idle {
            return Err(guard("start a workout", &self.state));
        }
        if !self.link.is_up() {
            return Err(SessionError::NotConnected);
        }

        let workout_id = self
            .gateway
            .create_workout(Utc::now())
            .await
            .map_err(persistence("start workout"))?;

        log::info!("Workout {} started", workout_id);
        self.state = SessionState::WorkoutActive {
            workout_id: workout_id.clone(),
        };
        self.set_count = 0;
        Ok(workout_id)
    }

    pub async fn end_workout(&mut self) -> Result<WorkoutId, SessionError> {
        if matches!(self.state, SessionState::SetActive { .. }) {
            self.end_set().await?;
        }

        let workout_id = match &self.state {
            SessionState::WorkoutActive { workout_id } => workout_id.clone(),
            other => return Err(guard("end the workout", other)),
        };

        self.gateway
            .update_workout(&workout_id, Utc::now())
            .await
            .map_err(persistence("end workout"))?;

        if !self.pending_saves.is_empty() {
            log::warn!(
                "Workout {} ended with {} unsaved set(s) still pending",
                workout_id,
                self.pending_saves.len()
            );
        }
        log::info!("Workout {} ended after {} set(s)", workout_id, self.set_count);
        self.state = SessionState::Idle;
        Ok(workout_id)
    }

    pub async fn start_set(&mut self, exercise_type: &str, weight: f32) -> Result<SetId, SessionError> {
        let workout_id = match &self.state {
            SessionState::WorkoutActive { workout_id } => workout_id.clone(),
            other => return Err(guard("start a set", other)),
        };
        if !self.link.is_up() {
            return Err(SessionError::NotConnected);
        }

        let set_id = self
            .gateway
            .create_set(&workout_id, exercise_type, weight)
            .await
            .map_err(persistence("start set"))?;

        self.buffer.reset();
        self.detector.reset();
        self.recording = true;
        self.set_count += 1;

        log::info!(
            "Set {} started: {} @ {:.1} (set #{} of workout {})",
            set_id,
            exercise_type,
            weight,
            self.set_count,
            workout_id
        );
        self.state = SessionState::SetActive {
            workout_id,
            set_id: set_id.clone(),
            exercise_type: exercise_type.to_string(),
            weight,
        };
        Ok(set_id)
    }

    pub async fn end_set(&mut self) -> Result<SetSummary, SessionError> {
        let (workout_id, set_id, exercise_type, weight) = match &self.state {
            SessionState::SetActive {
                workout_id,
                set_id,
                exercise_type,
                weight,
            } => (workout_id.clone(), set_id.clone(), exercise_type.clone(), *weight),
            other => return Err(guard("end a set", other)),
        };

        self.recording = false;
        self.detector.abandon_partial();
        if self.buffer.is_empty() {
            log::warn!("Set {} ended without any samples", set_id);
        }
        let (columns, rep_count) = self.buffer.finalize();
        self.state = SessionState::WorkoutActive {
            workout_id: workout_id.clone(),
        };

        let upload = SetUpload {
            workout_id,
            set_id,
            end_time: Utc::now(),
            rep_count,
            columns,
        };

        if let Err(e) = self.gateway.update_set(&upload).await {
            log::error!(
                "Failed to save set {} ({} samples), keeping it for retry: {}",
                upload.set_id,
                upload.columns.len(),
                e
            );
            self.pending_saves.push(upload);
            return Err(SessionError::Persistence {
                operation: "save set",
                source: e,
            });
        }

        log::info!(
            "Set {} saved: {} rep(s), {} samples",
            upload.set_id,
            upload.rep_count,
            upload.columns.len()
        );
        Ok(SetSummary {
            sample_count: upload.columns.len(),
            workout_id: upload.workout_id,
            set_id: upload.set_id,
            exercise_type,
            weight,
            rep_count: upload.rep_count,
            columns: upload.columns,
        })
    }

    /// Resubmit sets whose save failed; returns how many were saved
    pub async fn retry_pending_saves(&mut self) -> Result<usize, SessionError> {
        let pending = std::mem::take(&mut self.pending_saves);
        let mut saved = 0;
        let mut last_error = None;

        for upload in pending {
            match self.gateway.update_set(&upload).await {
                Ok(()) => {
                    log::info!("Pending set {} saved", upload.set_id);
                    saved += 1;
                }
                Err(e) => {
                    log::error!("Retry of set {} failed: {}", upload.set_id, e);
                    last_error = Some(e);
                    self.pending_saves.push(upload);
                }
            }
        }

        match last_error {
            Some(source) => Err(SessionError::Persistence {
                operation: "save pending sets",
                source,
            }),
            None => Ok(saved),
        }
    }

    /// Record one sample if a set is recording
    ///
    /// Returns the rep completed by this sample, if any. The rep is queued for
    /// storage before returning.
    pub fn ingest(&mut self, sample: SensorSample) -> Option<RepRecord> {
        if !self.recording {
            return None;
        }
        let SessionState::SetActive {
            workout_id,
            set_id,
            weight,
            ..
        } = &self.state
        else {
            return None;
        };

        let index = self.buffer.push(sample);
        let rep = self.detector.process_sample(self.buffer.samples(), index, *weight)?;
        self.buffer.record_rep();

        log::info!(
            "Rep {} detected: peak velocity {:.2}, peak force {:.1}, peak power {:.1}",
            rep.rep_number,
            rep.peak_velocity_magnitude,
            rep.peak_force,
            rep.peak_power
        );
        self.rep_writer.submit(RepSubmission {
            workout_id: workout_id.clone(),
            set_id: set_id.clone(),
            rep: rep.clone(),
        });
        Some(rep)
    }

    /// Sensor link dropped: freeze the set without changing state
    pub fn link_lost(&mut self) {
        if !self.recording {
            return;
        }
        self.recording = false;
        self.detector.abandon_partial();
        log::warn!(
            "Sensor link lost during set, recording stopped with {} samples buffered",
            self.buffer.len()
        );
    }

    /// Wait for queued rep saves to finish
    pub async fn close(self) -> RepWriterStats {
        self.rep_writer.close().await
    }
}
