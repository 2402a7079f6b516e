//! # Frame Decoding Module
//!
//! Turns raw notification payloads from the bar sensor into typed motion samples.
//!
//! ## Frame Layouts
//! ```text
//! 28 bytes: | vx f32 | vy f32 | vz f32 | ax f32 | ay f32 | az f32 | t u32 |
//! 12 bytes: | vx f32 | vy f32 | vz f32 |
//! ```
//! All fields are little-endian with no padding. The 12-byte layout is a degraded
//! velocity-only notification: acceleration and timestamp are carried forward from
//! the previous sample.
//!
//! Decoding is a pure function of the frame bytes and the previously decoded sample.
//! The only exception is a velocity-only frame with no previous sample, which takes
//! its timestamp from the wall clock.

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};

/// Length of a full velocity + acceleration + timestamp frame
pub const FULL_FRAME_LEN: usize = 28;
/// Length of a velocity-only frame
pub const VELOCITY_FRAME_LEN: usize = 12;

/// Three-axis vector as reported by the sensor
pub type Vector3 = [f32; 3];

/// Euclidean norm of a three-axis vector
pub fn magnitude(v: &Vector3) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// One decoded motion sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub velocity: Vector3,
    pub acceleration: Vector3,
    /// Device-local milliseconds, monotonic per connection
    pub timestamp: u32,
}

impl SensorSample {
    pub fn velocity_magnitude(&self) -> f32 {
        magnitude(&self.velocity)
    }

    pub fn acceleration_magnitude(&self) -> f32 {
        magnitude(&self.acceleration)
    }

    /// Encode into the 28-byte wire layout
    #[cfg(test)]
    pub fn to_frame(&self) -> [u8; FULL_FRAME_LEN] {
        let mut out = [0u8; FULL_FRAME_LEN];
        let floats = self.velocity.iter().chain(self.acceleration.iter());
        for (i, value) in floats.enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&value.to_le_bytes());
        }
        out[24..28].copy_from_slice(&self.timestamp.to_le_bytes());
        out
    }
}

fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn read_vector(bytes: &[u8], offset: usize) -> Vector3 {
    [
        read_f32(bytes, offset),
        read_f32(bytes, offset + 4),
        read_f32(bytes, offset + 8),
    ]
}

/// Milliseconds since the Unix epoch, truncated to the device timestamp width
fn wall_clock_ms() -> u32 {
    chrono::Utc::now().timestamp_millis() as u32
}

/// Decode a frame, using the wall clock when a velocity-only frame has no predecessor
pub fn decode(bytes: &[u8], previous: Option<&SensorSample>) -> Result<SensorSample, DecodeError> {
    decode_with_clock(bytes, previous, wall_clock_ms)
}

/// Decode a frame with an explicit fallback clock
///
/// `clock` is only consulted for a velocity-only frame with no previous sample.
pub fn decode_with_clock<F>(
    bytes: &[u8],
    previous: Option<&SensorSample>,
    clock: F,
) -> Result<SensorSample, DecodeError>
where
    F: FnOnce() -> u32,
{
    match bytes.len() {
        FULL_FRAME_LEN => Ok(SensorSample {
            velocity: read_vector(bytes, 0),
            acceleration: read_vector(bytes, 12),
            timestamp: u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]),
        }),
        VELOCITY_FRAME_LEN => {
            let velocity = read_vector(bytes, 0);
            Ok(match previous {
                Some(prev) => SensorSample { velocity, ..*prev },
                None => SensorSample {
                    velocity,
                    acceleration: [0.0; 3],
                    timestamp: clock(),
                },
            })
        }
        other => Err(DecodeError::UnrecognizedLength(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(v: Vector3, a: Vector3, t: u32) -> SensorSample {
        SensorSample {
            velocity: v,
            acceleration: a,
            timestamp: t,
        }
    }

    #[test]
    fn test_full_frame_exact_values() {
        let cases = [
            sample([0.0, -0.0, 1.5], [9.81, -3.25, 1e-7], 0),
            sample([f32::MAX, f32::MIN, f32::MIN_POSITIVE], [0.1, 0.2, 0.3], u32::MAX),
            sample([-123.456, 7.0e10, 3.0e-30], [-1.0, 1.0, 0.5], 86_400_000),
        ];

        for expected in cases {
            let frame = expected.to_frame();
            let decoded = decode(&frame, None).expect("28-byte frame must decode");
            for axis in 0..3 {
                assert_eq!(decoded.velocity[axis].to_bits(), expected.velocity[axis].to_bits());
                assert_eq!(
                    decoded.acceleration[axis].to_bits(),
                    expected.acceleration[axis].to_bits()
                );
            }
            assert_eq!(decoded.timestamp, expected.timestamp);
        }
    }

    #[test]
    fn test_field_order_is_little_endian() {
        let mut frame = [0u8; FULL_FRAME_LEN];
        frame[0..4].copy_from_slice(&1.0f32.to_le_bytes());
        frame[20..24].copy_from_slice(&2.0f32.to_le_bytes());
        frame[24..28].copy_from_slice(&[0x01, 0x02, 0x00, 0x00]);

        let decoded = decode(&frame, None).unwrap();
        assert_eq!(decoded.velocity, [1.0, 0.0, 0.0]);
        assert_eq!(decoded.acceleration, [0.0, 0.0, 2.0]);
        assert_eq!(decoded.timestamp, 0x0201);
    }

    #[test]
    fn test_velocity_frame_carries_previous_sample() {
        let previous = sample([0.0; 3], [1.0, 2.0, 3.0], 500);
        let frame = previous.to_frame();
        let mut velocity_only = frame[..VELOCITY_FRAME_LEN].to_vec();
        velocity_only[0..4].copy_from_slice(&0.75f32.to_le_bytes());

        let decoded = decode_with_clock(&velocity_only, Some(&previous), || panic!("clock used")).unwrap();
        assert_eq!(decoded.velocity, [0.75, 0.0, 0.0]);
        assert_eq!(decoded.acceleration, [1.0, 2.0, 3.0]);
        assert_eq!(decoded.timestamp, 500);
    }

    #[test]
    fn test_velocity_frame_without_previous_uses_clock() {
        let bytes = [0u8; VELOCITY_FRAME_LEN];
        let decoded = decode_with_clock(&bytes, None, || 42).unwrap();
        assert_eq!(decoded.acceleration, [0.0; 3]);
        assert_eq!(decoded.timestamp, 42);
    }

    #[test]
    fn test_other_lengths_rejected() {
        for len in (0..64).filter(|n| *n != FULL_FRAME_LEN && *n != VELOCITY_FRAME_LEN) {
            let bytes = vec![0xAB; len];
            assert_eq!(decode(&bytes, None), Err(DecodeError::UnrecognizedLength(len)));
        }
    }

    #[test]
    fn test_magnitude() {
        assert_eq!(magnitude(&[3.0, 4.0, 0.0]), 5.0);
        assert_eq!(magnitude(&[0.0, 0.0, 0.0]), 0.0);
    }
}
