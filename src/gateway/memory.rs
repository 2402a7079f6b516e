//! In-memory gateway with per-operation failure injection.

use super::{PersistenceGateway, RepId, SetId, SetUpload, WorkoutId};
use crate::aggregator::SetColumns;
use crate::error::GatewayError;
use crate::segmentation::RepRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// Gateway operation, used to inject failures and count calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    CreateWorkout,
    CreateSet,
    UpdateSet,
    CreateRep,
    UpdateWorkout,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRep {
    pub id: RepId,
    pub record: RepRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredSet {
    pub id: SetId,
    pub exercise_type: String,
    pub weight: f32,
    pub end_time: Option<DateTime<Utc>>,
    pub rep_count: u32,
    pub columns: SetColumns,
    pub reps: Vec<StoredRep>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredWorkout {
    pub id: WorkoutId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub sets: Vec<StoredSet>,
}

#[derive(Default)]
struct Store {
    workouts: Vec<StoredWorkout>,
    next_id: u64,
    failing: HashSet<GatewayOp>,
    calls: HashMap<GatewayOp, usize>,
}

impl Store {
    /// Count the call and fail it if injected
    fn enter(&mut self, op: GatewayOp) -> Result<(), GatewayError> {
        *self.calls.entry(op).or_insert(0) += 1;
        if self.failing.contains(&op) {
            return Err(GatewayError::Io(format!("injected failure for {:?}", op)));
        }
        Ok(())
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn workout_mut(&mut self, id: &WorkoutId) -> Result<&mut StoredWorkout, GatewayError> {
        self.workouts
            .iter_mut()
            .find(|w| &w.id == id)
            .ok_or_else(|| GatewayError::NotFound(format!("workout {}", id)))
    }

    fn set_mut(&mut self, workout_id: &WorkoutId, set_id: &SetId) -> Result<&mut StoredSet, GatewayError> {
        self.workout_mut(workout_id)?
            .sets
            .iter_mut()
            .find(|s| &s.id == set_id)
            .ok_or_else(|| GatewayError::NotFound(format!("set {}", set_id)))
    }
}

/// Gateway that keeps everything in memory
///
/// Used for dry runs and tests. In tests any operation can be made to fail with
/// `fail_on`.
#[derive(Default)]
pub struct MemoryGateway {
    store: Mutex<Store>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every future call of `op` fail (or succeed again)
    #[cfg(test)]
    pub fn fail_on(&self, op: GatewayOp, failing: bool) {
        let mut store = self.lock();
        if failing {
            store.failing.insert(op);
        } else {
            store.failing.remove(&op);
        }
    }

    /// Number of times `op` was invoked, failed calls included
    #[cfg(test)]
    pub fn call_count(&self, op: GatewayOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Snapshot of all stored workouts
    pub fn workouts(&self) -> Vec<StoredWorkout> {
        self.lock().workouts.clone()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn create_workout(&self, start_time: DateTime<Utc>) -> Result<WorkoutId, GatewayError> {
        let mut store = self.lock();
        store.enter(GatewayOp::CreateWorkout)?;
        let id = WorkoutId(store.next_id("workout"));
        store.workouts.push(StoredWorkout {
            id: id.clone(),
            start_time,
            end_time: None,
            sets: Vec::new(),
        });
        Ok(id)
    }

    async fn create_set(
        &self,
        workout_id: &WorkoutId,
        exercise_type: &str,
        weight: f32,
    ) -> Result<SetId, GatewayError> {
        let mut store = self.lock();
        store.enter(GatewayOp::CreateSet)?;
        let id = SetId(store.next_id("set"));
        store.workout_mut(workout_id)?.sets.push(StoredSet {
            id: id.clone(),
            exercise_type: exercise_type.to_string(),
            weight,
            end_time: None,
            rep_count: 0,
            columns: SetColumns::default(),
            reps: Vec::new(),
        });
        Ok(id)
    }

    async fn update_set(&self, upload: &SetUpload) -> Result<(), GatewayError> {
        let mut store = self.lock();
        store.enter(GatewayOp::UpdateSet)?;
        let set = store.set_mut(&upload.workout_id, &upload.set_id)?;
        set.end_time = Some(upload.end_time);
        set.rep_count = upload.rep_count;
        set.columns = upload.columns.clone();
        Ok(())
    }

    async fn create_rep(
        &self,
        workout_id: &WorkoutId,
        set_id: &SetId,
        rep: &RepRecord,
    ) -> Result<RepId, GatewayError> {
        let mut store = self.lock();
        store.enter(GatewayOp::CreateRep)?;
        let id = RepId(store.next_id("rep"));
        store.set_mut(workout_id, set_id)?.reps.push(StoredRep {
            id: id.clone(),
            record: rep.clone(),
        });
        Ok(id)
    }

    async fn update_workout(
        &self,
        workout_id: &WorkoutId,
        end_time: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let mut store = self.lock();
        store.enter(GatewayOp::UpdateWorkout)?;
        store.workout_mut(workout_id)?.end_time = Some(end_time);
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
