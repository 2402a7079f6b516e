//! JSONL gateway - appends one JSON object per persistence call to a journal file

use super::{PersistenceGateway, RepId, SetId, SetUpload, WorkoutId};
use crate::error::GatewayError;
use crate::segmentation::RepRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

const JOURNAL_FILE: &str = "workouts.jsonl";

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalEntry<'a> {
    CreateWorkout {
        workout_id: &'a WorkoutId,
        start_time: DateTime<Utc>,
    },
    CreateSet {
        workout_id: &'a WorkoutId,
        set_id: &'a SetId,
        exercise_type: &'a str,
        weight: f32,
    },
    UpdateSet {
        set: &'a SetUpload,
    },
    CreateRep {
        workout_id: &'a WorkoutId,
        set_id: &'a SetId,
        rep_id: &'a RepId,
        rep: &'a RepRecord,
    },
    UpdateWorkout {
        workout_id: &'a WorkoutId,
        end_time: DateTime<Utc>,
    },
}

pub struct JsonlGateway {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    counter: AtomicU64,
}

impl JsonlGateway {
    /// Open (or create) the journal inside `output_dir`
    pub fn open(output_dir: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let output_dir = output_dir.as_ref();
        fs::create_dir_all(output_dir)?;

        let path = output_dir.join(JOURNAL_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        log::info!("📝 Writing workout journal to: {}", path.display());

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            counter: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}-{}", prefix, Utc::now().format("%Y%m%d%H%M%S"), n)
    }

    /// Append one entry and flush it to disk
    fn append(&self, entry: &JournalEntry<'_>) -> Result<(), GatewayError> {
        let json = serde_json::to_string(entry)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| GatewayError::Io("journal writer poisoned".to_string()))?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for JsonlGateway {
    async fn create_workout(&self, start_time: DateTime<Utc>) -> Result<WorkoutId, GatewayError> {
        let workout_id = WorkoutId(self.next_id("workout"));
        self.append(&JournalEntry::CreateWorkout {
            workout_id: &workout_id,
            start_time,
        })?;
        Ok(workout_id)
    }

    async fn create_set(
        &self,
        workout_id: &WorkoutId,
        exercise_type: &str,
        weight: f32,
    ) -> Result<SetId, GatewayError> {
        let set_id = SetId(self.next_id("set"));
        self.append(&JournalEntry::CreateSet {
            workout_id,
            set_id: &set_id,
            exercise_type,
            weight,
        })?;
        Ok(set_id)
    }

    async fn update_set(&self, upload: &SetUpload) -> Result<(), GatewayError> {
        self.append(&JournalEntry::UpdateSet { set: upload })
    }

    async fn create_rep(
        &self,
        workout_id: &WorkoutId,
        set_id: &SetId,
        rep: &RepRecord,
    ) -> Result<RepId, GatewayError> {
        let rep_id = RepId(self.next_id("rep"));
        self.append(&JournalEntry::CreateRep {
            workout_id,
            set_id,
            rep_id: &rep_id,
            rep,
        })?;
        Ok(rep_id)
    }

    async fn update_workout(
        &self,
        workout_id: &WorkoutId,
        end_time: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        self.append(&JournalEntry::UpdateWorkout {
            workout_id,
            end_time,
        })
    }

    fn backend_type(&self) -> &'static str {
        "jsonl"
    }
}
