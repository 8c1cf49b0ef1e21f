//! VehicleSnapshotIndex - annotation input
//!
//! Per-frame vehicle state joined from the world-tick snapshot and the live
//! actor list.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ActorId, FrameId, Location, Transform, Vector3};

/// Oriented 3D bounding box, relative to its actor
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox3D {
    /// Box center in actor-local coordinates
    pub location: Location,

    /// Half sizes along x, y, z
    pub extent: Vector3,
}

impl BoundingBox3D {
    /// The eight corners in actor-local coordinates
    pub fn local_corners(&self) -> [Location; 8] {
        let c = self.location;
        let e = self.extent;
        let mut corners = [Location::default(); 8];
        let mut i = 0;
        for sx in [-1.0, 1.0] {
            for sy in [-1.0, 1.0] {
                for sz in [-1.0, 1.0] {
                    corners[i] = Location {
                        x: c.x + sx * e.x,
                        y: c.y + sy * e.y,
                        z: c.z + sz * e.z,
                    };
                    i += 1;
                }
            }
        }
        corners
    }
}

/// One vehicle at one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub id: ActorId,

    /// Archetype, e.g. "vehicle.tesla.model3"
    pub type_id: String,

    /// World pose at the frame
    pub transform: Transform,

    /// Velocity at the frame (m/s)
    pub velocity: Vector3,

    /// Actor bounding box
    pub bounding_box: BoundingBox3D,
}

/// Vehicle state keyed by actor id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VehicleSnapshotIndex {
    /// Frame the poses belong to
    pub frame: FrameId,

    vehicles: BTreeMap<ActorId, VehicleSnapshot>,
}

impl VehicleSnapshotIndex {
    /// Create empty index for a frame
    pub fn new(frame: FrameId) -> Self {
        Self {
            frame,
            vehicles: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, vehicle: VehicleSnapshot) {
        self.vehicles.insert(vehicle.id, vehicle);
    }

    pub fn get(&self, actor_id: ActorId) -> Option<&VehicleSnapshot> {
        self.vehicles.get(&actor_id)
    }

    /// Vehicles in ascending actor id order
    pub fn iter(&self) -> impl Iterator<Item = &VehicleSnapshot> {
        self.vehicles.values()
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}

/// Camera pose and intrinsics at one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraView {
    /// Camera actor
    pub actor_id: ActorId,

    /// Vehicle the camera is mounted on (never labeled)
    pub parent_id: Option<ActorId>,

    /// World pose at the frame
    pub transform: Transform,

    /// Image width (pixels)
    pub width: u32,

    /// Image height (pixels)
    pub height: u32,

    /// Horizontal field of view (degrees)
    pub fov: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_corners_span_extent() {
        let bbox = BoundingBox3D {
            location: Location {
                x: 0.0,
                y: 0.0,
                z: 1.0,
            },
            extent: Vector3::new(2.0, 1.0, 0.5),
        };
        let corners = bbox.local_corners();
        let max_x = corners.iter().map(|c| c.x).fold(f64::MIN, f64::max);
        let min_z = corners.iter().map(|c| c.z).fold(f64::MAX, f64::min);
        assert_eq!(max_x, 2.0);
        assert_eq!(min_z, 0.5);
    }

    #[test]
    fn test_index_orders_by_actor_id() {
        let mut index = VehicleSnapshotIndex::new(3);
        for id in [9, 2, 5] {
            index.insert(VehicleSnapshot {
                id,
                type_id: "vehicle.audi.a2".into(),
                transform: Transform::default(),
                velocity: Vector3::default(),
                bounding_box: BoundingBox3D::default(),
            });
        }
        let ids: Vec<_> = index.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
        assert_eq!(index.len(), 3);
    }
}
