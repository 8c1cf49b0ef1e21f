//! # Annotator
//!
//! Turns one synchronized frame into labeled 2D vehicle boxes:
//! - `snapshot`: frame-accurate vehicle poses and camera view
//! - `geometry`: world-to-pixel projection
//! - `projection`: LiDAR-supported filtering and classification

pub mod geometry;
pub mod projection;
pub mod snapshot;

pub use geometry::{intrinsics, transform_matrix, CameraProjection};
pub use projection::{ProjectionAnnotator, DEFAULT_MAX_DISTANCE, VEHICLE_TAG};
pub use snapshot::{build_snapshot_index, camera_view};
