//! Annotator trait - Annotation collaborator
//!
//! Turns one frame's vehicle state, camera pose and payloads into labeled
//! 2D boxes.

use std::collections::BTreeMap;

use crate::{
    ActorId, CameraView, ContractError, DetectionResult, ImageData, SemanticPointCloud,
    VehicleSnapshotIndex,
};

/// Annotator output
#[derive(Debug, Clone, Default)]
pub struct Annotation {
    pub result: DetectionResult,
    pub debug: AnnotationDebug,
}

/// Auxiliary data for inspection, never persisted by sinks
#[derive(Debug, Clone, Default)]
pub struct AnnotationDebug {
    /// LiDAR hits per vehicle
    pub support_points: BTreeMap<ActorId, u32>,

    /// Points that hit non-vehicle geometry or unknown actors
    pub unmatched_points: usize,
}

/// Annotation collaborator
///
/// Implementations own the class registry they label with.
pub trait Annotator: Send + Sync {
    /// Label every vehicle with at least `min_detect` LiDAR hits
    ///
    /// Vehicles below the threshold appear in `result.filtered`.
    fn annotate(
        &self,
        vehicles: &VehicleSnapshotIndex,
        camera: &CameraView,
        lidar: &SemanticPointCloud,
        image: &ImageData,
        min_detect: u32,
    ) -> Result<Annotation, ContractError>;
}
