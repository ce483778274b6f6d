// THEORY:
// The `trajectory` module is the memory of a tracking run. Where the detection
// stages are stateless and see one frame at a time, the `TrajectoryAccumulator`
// remembers every frame's outcome in order and hands the finished `Trajectory` to
// the renderer and the coordinate table writer.
//
// Key architectural principles:
// 1.  **One Observation per Frame**: Every decoded frame produces exactly one
//     `FrameObservation`, with or without a position. A miss is recorded as a gap,
//     never dropped and never interpolated.
// 2.  **Append-Only**: Observations are immutable once pushed. There is no API to
//     reorder, edit or remove them.
// 3.  **Owned Ordering**: The accumulator assigns frame indices and timestamps
//     itself, so strict ordering holds by construction. Observations that arrive
//     from outside (a coordinate table) are checked on the way in.

use crate::config::validate_fps;
use crate::error::{OrderError, Result};

/// A detected position in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

/// The outcome of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameObservation {
    /// Zero-based, increasing by one per decoded frame.
    pub frame_index: u64,
    /// Milliseconds since the first frame.
    pub timestamp_ms: u64,
    /// `None` when no qualifying region was found.
    pub position: Option<Position>,
}

/// Milliseconds at which frame `frame_index` is shown, rounded to the nearest ms.
pub fn timestamp_ms(frame_index: u64, fps: f64) -> u64 {
    (frame_index as f64 * 1000.0 / fps).round() as u64
}

/// An ordered, append-only sequence of observations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    observations: Vec<FrameObservation>,
    detections: usize,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an observation, rejecting anything that is not strictly after the
    /// current last frame in both index and timestamp.
    pub fn try_push(&mut self, observation: FrameObservation) -> std::result::Result<(), OrderError> {
        if let Some(last) = self.observations.last() {
            if observation.frame_index <= last.frame_index {
                return Err(OrderError::FrameIndex {
                    found: observation.frame_index,
                    previous: last.frame_index,
                });
            }
            if observation.timestamp_ms <= last.timestamp_ms {
                return Err(OrderError::Timestamp {
                    found: observation.timestamp_ms,
                    previous: last.timestamp_ms,
                });
            }
        }
        if observation.position.is_some() {
            self.detections += 1;
        }
        self.observations.push(observation);
        Ok(())
    }

    /// Total frames recorded.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Frames with a detected position.
    pub fn detection_count(&self) -> usize {
        self.detections
    }

    pub fn get(&self, index: usize) -> Option<&FrameObservation> {
        self.observations.get(index)
    }

    pub fn observations(&self) -> &[FrameObservation] {
        &self.observations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrameObservation> {
        self.observations.iter()
    }

    /// Smallest box containing every detected position, as (min, max).
    pub fn bounds(&self) -> Option<(Position, Position)> {
        let mut positions = self.observations.iter().filter_map(|o| o.position);
        let first = positions.next()?;
        Some(positions.fold((first, first), |(min, max), p| {
            (
                Position {
                    x: min.x.min(p.x),
                    y: min.y.min(p.y),
                },
                Position {
                    x: max.x.max(p.x),
                    y: max.y.max(p.y),
                },
            )
        }))
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a FrameObservation;
    type IntoIter = std::slice::Iter<'a, FrameObservation>;

    fn into_iter(self) -> Self::IntoIter {
        self.observations.iter()
    }
}

/// Builds a `Trajectory` from a live stream of per-frame detection results.
#[derive(Debug, Clone)]
pub struct TrajectoryAccumulator {
    trajectory: Trajectory,
    fps: f64,
}

impl TrajectoryAccumulator {
    pub fn new(fps: f64) -> Result<Self> {
        Ok(Self {
            trajectory: Trajectory::new(),
            fps: validate_fps(fps)?,
        })
    }

    /// Records the next frame's outcome and returns the stored observation.
    pub fn record(&mut self, position: Option<Position>) -> FrameObservation {
        let frame_index = self.trajectory.len() as u64;
        let observation = FrameObservation {
            frame_index,
            timestamp_ms: timestamp_ms(frame_index, self.fps),
            position,
        };
        // Indices step by one and fps is capped at 1000, so ordering always holds.
        if observation.position.is_some() {
            self.trajectory.detections += 1;
        }
        self.trajectory.observations.push(observation);
        observation
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frame_count(&self) -> usize {
        self.trajectory.len()
    }

    pub fn detection_count(&self) -> usize {
        self.trajectory.detection_count()
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn finish(self) -> Trajectory {
        self.trajectory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_step_by_one_and_gaps_are_kept() {
        let mut acc = TrajectoryAccumulator::new(30.0).unwrap();
        acc.record(Some(Position { x: 1, y: 1 }));
        acc.record(None);
        acc.record(Some(Position { x: 3, y: 3 }));

        assert_eq!(acc.frame_count(), 3);
        assert_eq!(acc.detection_count(), 2);
        let trajectory = acc.finish();
        let indices: Vec<u64> = trajectory.iter().map(|o| o.frame_index).collect();
        assert_eq!(indices, [0, 1, 2]);
        assert_eq!(trajectory.get(1).unwrap().position, None);
    }

    #[test]
    fn timestamps_follow_frame_rate() {
        assert_eq!(timestamp_ms(0, 30.0), 0);
        assert_eq!(timestamp_ms(1, 30.0), 33);
        assert_eq!(timestamp_ms(2, 30.0), 67);
        assert_eq!(timestamp_ms(3, 29.97), 100);

        let mut acc = TrajectoryAccumulator::new(1000.0).unwrap();
        let a = acc.record(None);
        let b = acc.record(None);
        assert!(b.timestamp_ms > a.timestamp_ms);
    }

    #[test]
    fn invalid_fps_is_a_configuration_error() {
        assert!(TrajectoryAccumulator::new(0.0).is_err());
        assert!(TrajectoryAccumulator::new(-5.0).is_err());
    }

    #[test]
    fn try_push_rejects_out_of_order_frames() {
        let mut trajectory = Trajectory::new();
        let obs = |frame_index, timestamp_ms| FrameObservation {
            frame_index,
            timestamp_ms,
            position: None,
        };
        trajectory.try_push(obs(0, 0)).unwrap();
        trajectory.try_push(obs(2, 50)).unwrap();
        assert_eq!(
            trajectory.try_push(obs(2, 60)),
            Err(OrderError::FrameIndex { found: 2, previous: 2 })
        );
        assert_eq!(
            trajectory.try_push(obs(1, 70)),
            Err(OrderError::FrameIndex { found: 1, previous: 2 })
        );
        assert_eq!(
            trajectory.try_push(obs(3, 50)),
            Err(OrderError::Timestamp { found: 50, previous: 50 })
        );
        assert_eq!(trajectory.len(), 2);
    }

    #[test]
    fn bounds_cover_detected_positions_only() {
        let mut acc = TrajectoryAccumulator::new(10.0).unwrap();
        assert!(acc.trajectory().bounds().is_none());
        acc.record(Some(Position { x: 5, y: 40 }));
        acc.record(None);
        acc.record(Some(Position { x: 20, y: 10 }));
        let (min, max) = acc.trajectory().bounds().unwrap();
        assert_eq!(min, Position { x: 5, y: 10 });
        assert_eq!(max, Position { x: 20, y: 40 });
    }
}
