//! DetectionResult - Annotation output
//!
//! Labeled 2D boxes for one accepted frame plus the candidates that were
//! filtered out.

use serde::{Deserialize, Serialize};

use crate::{ActorId, ClassId, FrameId, ImageData};

/// Axis-aligned 2D box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox2D {
    pub u_min: f64,
    pub v_min: f64,
    pub u_max: f64,
    pub v_max: f64,
}

impl BoundingBox2D {
    /// Box as `[[u1, v1], [u2, v2]]`
    pub fn corners(&self) -> [[f64; 2]; 2] {
        [[self.u_min, self.v_min], [self.u_max, self.v_max]]
    }

    pub fn width(&self) -> f64 {
        self.u_max - self.u_min
    }

    pub fn height(&self) -> f64 {
        self.v_max - self.v_min
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// `(cx, cy, w, h)` normalized to the image size
    pub fn normalized(&self, image_width: u32, image_height: u32) -> (f64, f64, f64, f64) {
        let iw = f64::from(image_width);
        let ih = f64::from(image_height);
        (
            (self.u_min + self.u_max) / 2.0 / iw,
            (self.v_min + self.v_max) / 2.0 / ih,
            self.width() / iw,
            self.height() / ih,
        )
    }
}

/// One labeled vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub actor_id: ActorId,
    pub bbox: BoundingBox2D,
    pub class_id: ClassId,

    /// Camera-to-vehicle distance (meters)
    pub distance: f64,

    /// Semantic LiDAR hits on the vehicle
    pub support_points: u32,
}

/// Why a candidate vehicle was not labeled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    /// Fewer LiDAR hits than the minimum
    InsufficientPoints,
    /// Archetype has no class id in the registry
    Unclassified,
    /// Box does not land inside the image
    OutOfView,
}

/// A vehicle that was seen but not labeled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredCandidate {
    pub actor_id: ActorId,
    pub support_points: u32,
    pub reason: FilterReason,
}

/// Detections for one accepted frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub frame: FrameId,

    /// Labeled vehicles
    pub accepted: Vec<Detection>,

    /// Candidates excluded from the output
    pub filtered: Vec<FilteredCandidate>,
}

impl DetectionResult {
    pub fn new(frame: FrameId) -> Self {
        Self {
            frame,
            ..Default::default()
        }
    }

    /// Accepted plus filtered candidates
    pub fn candidate_count(&self) -> usize {
        self.accepted.len() + self.filtered.len()
    }

    pub fn is_filtered(&self, actor_id: ActorId) -> bool {
        self.filtered.iter().any(|c| c.actor_id == actor_id)
    }

    pub fn boxes(&self) -> Vec<[[f64; 2]; 2]> {
        self.accepted.iter().map(|d| d.bbox.corners()).collect()
    }

    pub fn classes(&self) -> Vec<ClassId> {
        self.accepted.iter().map(|d| d.class_id).collect()
    }

    pub fn distances(&self) -> Vec<f64> {
        self.accepted.iter().map(|d| d.distance).collect()
    }
}

/// Unit of work handed to dataset sinks
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    /// Zero-based index among captured frames
    pub capture_index: u64,

    /// Simulator frame
    pub frame: FrameId,

    /// Simulation timestamp (seconds)
    pub timestamp: f64,

    /// Camera image the boxes refer to
    pub image: ImageData,

    pub result: DetectionResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_box() {
        let bbox = BoundingBox2D {
            u_min: 100.0,
            v_min: 150.0,
            u_max: 300.0,
            v_max: 450.0,
        };
        let (cx, cy, w, h) = bbox.normalized(800, 600);
        assert!((cx - 0.25).abs() < 1e-12);
        assert!((cy - 0.5).abs() < 1e-12);
        assert!((w - 0.25).abs() < 1e-12);
        assert!((h - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_result_accessors() {
        let mut result = DetectionResult::new(4);
        result.accepted.push(Detection {
            actor_id: 1,
            bbox: BoundingBox2D {
                u_min: 0.0,
                v_min: 0.0,
                u_max: 10.0,
                v_max: 5.0,
            },
            class_id: 2,
            distance: 12.5,
            support_points: 40,
        });
        result.filtered.push(FilteredCandidate {
            actor_id: 3,
            support_points: 2,
            reason: FilterReason::InsufficientPoints,
        });

        assert_eq!(result.candidate_count(), 2);
        assert!(result.is_filtered(3));
        assert!(!result.is_filtered(1));
        assert_eq!(result.classes(), vec![2]);
        assert_eq!(result.boxes(), vec![[[0.0, 0.0], [10.0, 5.0]]]);
    }
}
