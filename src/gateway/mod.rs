//! Persistence gateway interface.
//!
//! Durable storage of workouts, sets and reps lives behind this trait. The session
//! only needs the five operations below and treats every failure the same way.

mod jsonl;
mod memory;

pub use jsonl::JsonlGateway;
#[cfg(test)]
pub use memory::GatewayOp;
pub use memory::MemoryGateway;

use crate::aggregator::SetColumns;
use crate::error::GatewayError;
use crate::segmentation::RepRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_type!(WorkoutId);
id_type!(SetId);
id_type!(RepId);

/// Final payload of a set, handed to `update_set`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetUpload {
    pub workout_id: WorkoutId,
    pub set_id: SetId,
    pub end_time: DateTime<Utc>,
    pub rep_count: u32,
    pub columns: SetColumns,
}

/// Backend trait for storing training data
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn create_workout(&self, start_time: DateTime<Utc>) -> Result<WorkoutId, GatewayError>;

    async fn create_set(
        &self,
        workout_id: &WorkoutId,
        exercise_type: &str,
        weight: f32,
    ) -> Result<SetId, GatewayError>;

    async fn update_set(&self, upload: &SetUpload) -> Result<(), GatewayError>;

    async fn create_rep(
        &self,
        workout_id: &WorkoutId,
        set_id: &SetId,
        rep: &RepRecord,
    ) -> Result<RepId, GatewayError>;

    async fn update_workout(
        &self,
        workout_id: &WorkoutId,
        end_time: DateTime<Utc>,
    ) -> Result<(), GatewayError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
