//! # Set Aggregation Module
//!
//! Accumulates every sample recorded during an active set and converts the set
//! into the columnar layout stored by the persistence backend.
//!
//! ## Architecture
//! - **SetBuffer**: Native per-sample vector used by the rep detector while the set runs
//! - **SetColumns**: Per-axis arrays produced once when the set ends
//! - **Axis**: Column identifier for routing values
//!
//! ## Column Layout
//! ```text
//! set
//! ├── velocity_x      (f32, one entry per sample)
//! ├── velocity_y
//! ├── velocity_z
//! ├── acceleration_x
//! ├── acceleration_y
//! ├── acceleration_z
//! └── timestamps      (u32 device milliseconds)
//! ```
//! All columns always have the same length.

use crate::frame::SensorSample;
use serde::{Deserialize, Serialize};

/// Column identifier for the per-axis arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    VelocityX,
    VelocityY,
    VelocityZ,
    AccelerationX,
    AccelerationY,
    AccelerationZ,
}

impl Axis {
    /// Get the stored column name for this axis
    pub fn column_name(&self) -> &'static str {
        match self {
            Axis::VelocityX => "velocity_x",
            Axis::VelocityY => "velocity_y",
            Axis::VelocityZ => "velocity_z",
            Axis::AccelerationX => "acceleration_x",
            Axis::AccelerationY => "acceleration_y",
            Axis::AccelerationZ => "acceleration_z",
        }
    }

    /// Get all axes in storage order
    pub fn all() -> [Axis; 6] {
        [
            Axis::VelocityX,
            Axis::VelocityY,
            Axis::VelocityZ,
            Axis::AccelerationX,
            Axis::AccelerationY,
            Axis::AccelerationZ,
        ]
    }

    /// Read this axis from a sample
    pub fn value(&self, sample: &SensorSample) -> f32 {
        match self {
            Axis::VelocityX => sample.velocity[0],
            Axis::VelocityY => sample.velocity[1],
            Axis::VelocityZ => sample.velocity[2],
            Axis::AccelerationX => sample.acceleration[0],
            Axis::AccelerationY => sample.acceleration[1],
            Axis::AccelerationZ => sample.acceleration[2],
        }
    }
}

/// Columnar representation of a finished set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetColumns {
    pub velocity_x: Vec<f32>,
    pub velocity_y: Vec<f32>,
    pub velocity_z: Vec<f32>,
    pub acceleration_x: Vec<f32>,
    pub acceleration_y: Vec<f32>,
    pub acceleration_z: Vec<f32>,
    pub timestamps: Vec<u32>,
}

impl SetColumns {
    /// Decompose samples into per-axis arrays, preserving arrival order
    pub fn from_samples(samples: &[SensorSample]) -> Self {
        let mut columns = SetColumns::with_capacity(samples.len());
        for sample in samples {
            for axis in Axis::all() {
                columns.column_mut(axis).push(axis.value(sample));
            }
            columns.timestamps.push(sample.timestamp);
        }
        columns
    }

    fn with_capacity(n: usize) -> Self {
        Self {
            velocity_x: Vec::with_capacity(n),
            velocity_y: Vec::with_capacity(n),
            velocity_z: Vec::with_capacity(n),
            acceleration_x: Vec::with_capacity(n),
            acceleration_y: Vec::with_capacity(n),
            acceleration_z: Vec::with_capacity(n),
            timestamps: Vec::with_capacity(n),
        }
    }

    /// Get the array for one axis
    pub fn column(&self, axis: Axis) -> &[f32] {
        match axis {
            Axis::VelocityX => &self.velocity_x,
            Axis::VelocityY => &self.velocity_y,
            Axis::VelocityZ => &self.velocity_z,
            Axis::AccelerationX => &self.acceleration_x,
            Axis::AccelerationY => &self.acceleration_y,
            Axis::AccelerationZ => &self.acceleration_z,
        }
    }

    fn column_mut(&mut self, axis: Axis) -> &mut Vec<f32> {
        match axis {
            Axis::VelocityX => &mut self.velocity_x,
            Axis::VelocityY => &mut self.velocity_y,
            Axis::VelocityZ => &mut self.velocity_z,
            Axis::AccelerationX => &mut self.acceleration_x,
            Axis::AccelerationY => &mut self.acceleration_y,
            Axis::AccelerationZ => &mut self.acceleration_z,
        }
    }

    /// Number of samples (every column has this length)
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Ordered samples of the active set plus its rep count
#[derive(Debug, Default)]
pub struct SetBuffer {
    samples: Vec<SensorSample>,
    rep_count: u32,
}

impl SetBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard everything and start a fresh set
    pub fn reset(&mut self) {
        self.samples.clear();
        self.rep_count = 0;
    }

    /// Append a sample, returning its index within the set
    pub fn push(&mut self, sample: SensorSample) -> usize {
        self.samples.push(sample);
        self.samples.len() - 1
    }

    pub fn samples(&self) -> &[SensorSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn record_rep(&mut self) {
        self.rep_count += 1;
    }

    pub fn rep_count(&self) -> u32 {
        self.rep_count
    }

    /// Convert to columns, leaving the buffer empty
    pub fn finalize(&mut self) -> (SetColumns, u32) {
        let columns = SetColumns::from_samples(&self.samples);
        let rep_count = self.rep_count;
        self.reset();
        (columns, rep_count)
    }
}
