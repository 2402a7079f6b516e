//! Online repetition segmentation.
//!
//! Detects individual repetitions in the continuous sample stream of one set
//! using hysteresis on the velocity and acceleration magnitudes:
//! - Onset: velocity AND acceleration magnitude above their onset thresholds
//! - Offset: velocity magnitude alone drops below the velocity threshold
//!
//! Acceleration crosses zero several times per rep (concentric and eccentric
//! phases), so it never ends a rep.
//!
//! Spans shorter than the minimum duration are discarded as noise. For a completed
//! span the peak velocity and peak acceleration samples are located independently
//! and force/power are derived from the external load.

use crate::frame::{SensorSample, Vector3};
use serde::{Deserialize, Serialize};

/// Tunable thresholds for rep detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Velocity magnitude that opens a rep and whose undershoot closes it.
    pub velocity_onset: f32,
    /// Acceleration magnitude required (together with velocity) to open a rep.
    pub acceleration_onset: f32,
    /// A rep must span strictly more than this many sample steps.
    pub min_rep_samples: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            velocity_onset: 0.1,
            acceleration_onset: 0.5,
            min_rep_samples: 5,
        }
    }
}

/// A detected repetition with its peak kinematic and kinetic values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepRecord {
    /// 1-based position of the rep within its set.
    pub rep_number: u32,
    pub start_index: usize,
    pub end_index: usize,
    pub start_timestamp: u32,
    pub end_timestamp: u32,
    pub peak_velocity: Vector3,
    pub peak_acceleration: Vector3,
    pub peak_velocity_magnitude: f32,
    pub peak_acceleration_magnitude: f32,
    pub peak_force: f32,
    pub peak_power: f32,
}

/// Per-set rep detector.
///
/// Holds no samples itself; every call receives the set's sample buffer and the
/// index of the newly appended sample.
#[derive(Debug)]
pub struct RepDetector {
    config: SegmentationConfig,
    in_rep: bool,
    rep_start_index: usize,
    reps_detected: u32,
}

impl RepDetector {
    pub fn new(config: SegmentationConfig) -> Self {
        Self {
            config,
            in_rep: false,
            rep_start_index: 0,
            reps_detected: 0,
        }
    }

    /// Forget any partial rep and restart numbering. Called when a set starts.
    pub fn reset(&mut self) {
        self.in_rep = false;
        self.rep_start_index = 0;
        self.reps_detected = 0;
    }

    /// Drop an unfinished rep without touching the rep count.
    pub fn abandon_partial(&mut self) {
        if self.in_rep {
            log::debug!("Discarding partial rep started at sample {}", self.rep_start_index);
        }
        self.in_rep = false;
    }

    #[cfg(test)]
    pub fn is_in_rep(&self) -> bool {
        self.in_rep
    }

    #[cfg(test)]
    pub fn reps_detected(&self) -> u32 {
        self.reps_detected
    }

    /// Feed the sample at `index` of `samples`.
    ///
    /// Returns a record when this sample completes a rep.
    pub fn process_sample(
        &mut self,
        samples: &[SensorSample],
        index: usize,
        weight: f32,
    ) -> Option<RepRecord> {
        let sample = samples.get(index)?;
        let v_mag = sample.velocity_magnitude();
        let a_mag = sample.acceleration_magnitude();

        if !self.in_rep {
            if v_mag > self.config.velocity_onset && a_mag > self.config.acceleration_onset {
                self.in_rep = true;
                self.rep_start_index = index;
            }
            return None;
        }

        // NaN velocity neither opens nor closes a rep
        if !(v_mag < self.config.velocity_onset) {
            return None;
        }

        self.in_rep = false;
        let span = index - self.rep_start_index;
        if span <= self.config.min_rep_samples {
            log::debug!(
                "Ignoring {}-sample span at {} as noise",
                span,
                self.rep_start_index
            );
            return None;
        }

        self.reps_detected += 1;
        Some(Self::summarize(
            &samples[self.rep_start_index..=index],
            self.rep_start_index,
            self.reps_detected,
            weight,
        ))
    }

    /// Locate the peaks of a completed span and derive force and power.
    fn summarize(span: &[SensorSample], start_index: usize, rep_number: u32, weight: f32) -> RepRecord {
        let mut peak_velocity = [0.0; 3];
        let mut peak_acceleration = [0.0; 3];
        let mut peak_velocity_magnitude = 0.0f32;
        let mut peak_acceleration_magnitude = 0.0f32;

        for sample in span {
            let v_mag = sample.velocity_magnitude();
            if v_mag > peak_velocity_magnitude {
                peak_velocity_magnitude = v_mag;
                peak_velocity = sample.velocity;
            }

            let a_mag = sample.acceleration_magnitude();
            if a_mag > peak_acceleration_magnitude {
                peak_acceleration_magnitude = a_mag;
                peak_acceleration = sample.acceleration;
            }
        }

        let peak_force = weight * peak_acceleration_magnitude;
        let peak_power = peak_force * peak_velocity_magnitude;

        // span is never empty: it covers at least start..=end
        let first = &span[0];
        let last = &span[span.len() - 1];

        RepRecord {
            rep_number,
            start_index,
            end_index: start_index + span.len() - 1,
            start_timestamp: first.timestamp,
            end_timestamp: last.timestamp,
            peak_velocity,
            peak_acceleration,
            peak_velocity_magnitude,
            peak_acceleration_magnitude,
            peak_force,
            peak_power,
        }
    }
}

#[cfg(test)]
impl Default for RepDetector {
    fn default() -> Self {
        Self::new(SegmentationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::magnitude;

    fn sample(v: Vector3, a: Vector3, t: u32) -> SensorSample {
        SensorSample {
            velocity: v,
            acceleration: a,
            timestamp: t,
        }
    }

    fn quiet(t: u32) -> SensorSample {
        sample([0.02, 0.0, 0.0], [0.05, 0.0, 0.0], t)
    }

    /// Feed every sample in order, collecting emitted reps.
    fn run(detector: &mut RepDetector, samples: &[SensorSample], weight: f32) -> Vec<RepRecord> {
        (0..samples.len())
            .filter_map(|i| detector.process_sample(samples, i, weight))
            .collect()
    }

    #[test]
    fn test_below_threshold_emits_nothing() {
        // v_mag = 0.05, a_mag = 0.05
        let samples: Vec<_> = (0..100)
            .map(|t| sample([0.03, 0.04, 0.0], [0.0, 0.03, 0.04], t))
            .collect();
        let mut detector = RepDetector::default();

        assert!(run(&mut detector, &samples, 60.0).is_empty());
        assert!(!detector.is_in_rep());
        assert_eq!(detector.reps_detected(), 0);
    }

    #[test]
    fn test_single_rep_peaks() {
        let mut samples = vec![quiet(0), quiet(10)];
        let active = [
            ([0.2, 0.0, 0.0], [1.0, 0.0, 0.0]),
            ([0.4, 0.1, 0.0], [2.5, 0.5, 0.0]),
            ([0.6, 0.2, 0.0], [3.0, 1.0, 0.5]),
            ([0.9, 0.3, 0.1], [1.2, 0.0, 0.0]),
            ([0.7, 0.2, 0.1], [-0.8, -0.2, 0.0]),
            ([0.5, 0.1, 0.0], [-1.5, 0.0, 0.0]),
            ([0.3, 0.0, 0.0], [-2.0, -0.5, 0.0]),
            ([0.15, 0.0, 0.0], [-0.9, 0.0, 0.0]),
        ];
        for (i, (v, a)) in active.iter().enumerate() {
            samples.push(sample(*v, *a, 20 + 10 * i as u32));
        }
        samples.push(quiet(100));

        let weight = 60.0;
        let mut detector = RepDetector::default();
        let reps = run(&mut detector, &samples, weight);

        assert_eq!(reps.len(), 1);
        let rep = &reps[0];
        assert_eq!(rep.rep_number, 1);
        assert_eq!(rep.start_index, 2);
        assert_eq!(rep.end_index, 10);
        assert_eq!(rep.start_timestamp, 20);
        assert_eq!(rep.end_timestamp, 100);

        let max_v = active.iter().map(|(v, _)| magnitude(v)).fold(0.0f32, f32::max);
        let max_a = active.iter().map(|(_, a)| magnitude(a)).fold(0.0f32, f32::max);
        assert_eq!(rep.peak_velocity, [0.9, 0.3, 0.1]);
        assert_eq!(rep.peak_acceleration, [3.0, 1.0, 0.5]);
        assert_eq!(rep.peak_velocity_magnitude, max_v);
        assert_eq!(rep.peak_acceleration_magnitude, max_a);
        assert_eq!(rep.peak_force, weight * max_a);
        assert_eq!(rep.peak_power, weight * max_a * max_v);
    }

    #[test]
    fn test_short_span_is_noise() {
        let mut samples = vec![quiet(0)];
        for t in 1..=3 {
            samples.push(sample([0.5, 0.0, 0.0], [2.0, 0.0, 0.0], t));
        }
        samples.push(quiet(4));

        let mut detector = RepDetector::default();
        assert!(run(&mut detector, &samples, 40.0).is_empty());
        assert!(!detector.is_in_rep());
    }

    #[test]
    fn test_span_must_exceed_minimum() {
        // Onset at 1, offset at 6: span of exactly 5 is still noise
        let mut samples = vec![quiet(0)];
        for t in 1..=5 {
            samples.push(sample([0.5, 0.0, 0.0], [2.0, 0.0, 0.0], t));
        }
        samples.push(quiet(6));
        let mut detector = RepDetector::default();
        assert!(run(&mut detector, &samples, 40.0).is_empty());

        // One more active sample makes it a rep
        samples.insert(1, sample([0.5, 0.0, 0.0], [2.0, 0.0, 0.0], 0));
        detector.reset();
        assert_eq!(run(&mut detector, &samples, 40.0).len(), 1);
    }

    #[test]
    fn test_onset_requires_acceleration() {
        // Fast but unaccelerated motion never opens a rep
        let samples: Vec<_> = (0..20)
            .map(|t| sample([0.5, 0.0, 0.0], [0.1, 0.0, 0.0], t))
            .chain(std::iter::once(quiet(20)))
            .collect();
        let mut detector = RepDetector::default();
        assert!(run(&mut detector, &samples, 40.0).is_empty());
    }

    #[test]
    fn test_offset_ignores_acceleration() {
        // Acceleration collapses mid-rep; the rep stays open until velocity drops
        let mut samples = vec![sample([0.5, 0.0, 0.0], [2.0, 0.0, 0.0], 0)];
        for t in 1..8 {
            samples.push(sample([0.5, 0.0, 0.0], [0.0, 0.0, 0.0], t));
        }
        let mut detector = RepDetector::default();
        assert!(run(&mut detector, &samples, 40.0).is_empty());
        assert!(detector.is_in_rep());

        samples.push(quiet(8));
        assert!(detector.process_sample(&samples, 8, 40.0).is_some());
    }

    #[test]
    fn test_consecutive_reps_are_numbered() {
        let mut samples = Vec::new();
        for rep in 0..3u32 {
            samples.push(quiet(rep * 100));
            for t in 1..=8 {
                samples.push(sample([0.4, 0.0, 0.0], [1.5, 0.0, 0.0], rep * 100 + t));
            }
        }
        samples.push(quiet(1000));

        let mut detector = RepDetector::default();
        let numbers: Vec<u32> = run(&mut detector, &samples, 20.0)
            .iter()
            .map(|r| r.rep_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(detector.reps_detected(), 3);
    }

    #[test]
    fn test_abandon_partial_rep() {
        let samples: Vec<_> = (0..10)
            .map(|t| sample([0.5, 0.0, 0.0], [2.0, 0.0, 0.0], t))
            .collect();
        let mut detector = RepDetector::default();
        run(&mut detector, &samples, 40.0);
        assert!(detector.is_in_rep());

        detector.abandon_partial();
        assert!(!detector.is_in_rep());
        assert_eq!(detector.reps_detected(), 0);
    }

    #[test]
    fn test_nan_velocity_does_not_end_rep() {
        let active = |t| sample([0.5, 0.0, 0.0], [2.0, 0.0, 0.0], t);
        let mut samples = vec![quiet(0)];
        samples.extend((1..=6).map(active));
        samples.push(sample([f32::NAN, 0.0, 0.0], [2.0, 0.0, 0.0], 7));
        samples.extend((8..=10).map(active));
        samples.push(quiet(11));

        let mut detector = RepDetector::default();
        let reps = run(&mut detector, &samples, 50.0);
        assert_eq!(reps.len(), 1);
        assert_eq!((reps[0].start_index, reps[0].end_index), (1, 11));
        assert_eq!(reps[0].peak_velocity_magnitude, 0.5);
        assert!(reps[0].peak_power.is_finite());
    }

    #[test]
    fn test_nan_sample_does_not_open_rep() {
        let samples = vec![
            quiet(0),
            sample([f32::NAN, 0.0, 0.0], [2.0, 0.0, 0.0], 1),
            sample([0.5, 0.0, 0.0], [f32::NAN, 0.0, 0.0], 2),
            quiet(3),
        ];
        let mut detector = RepDetector::default();
        assert!(run(&mut detector, &samples, 50.0).is_empty());
        assert!(!detector.is_in_rep());
    }

    #[test]
    fn test_custom_thresholds() {
        let config = SegmentationConfig {
            velocity_onset: 1.0,
            acceleration_onset: 5.0,
            min_rep_samples: 2,
        };
        let mut samples = vec![quiet(0)];
        for t in 1..=3 {
            samples.push(sample([2.0, 0.0, 0.0], [6.0, 0.0, 0.0], t));
        }
        samples.push(sample([0.5, 0.0, 0.0], [6.0, 0.0, 0.0], 4));

        let mut detector = RepDetector::new(config);
        assert_eq!(run(&mut detector, &samples, 10.0).len(), 1);
    }
}
