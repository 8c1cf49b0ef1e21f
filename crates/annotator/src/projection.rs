//! LiDAR-supported projection annotator

use std::collections::BTreeMap;
use std::path::Path;

use contracts::{
    ActorId, Annotation, AnnotationDebug, Annotator, CameraView, ClassRegistry, ContractError,
    Detection, DetectionResult, FilterReason, FilteredCandidate, ImageData, SemanticPointCloud,
    VehicleSnapshotIndex,
};
use tracing::{debug, instrument};

use crate::geometry::CameraProjection;

/// Semantic tag of vehicle points
pub const VEHICLE_TAG: u32 = 10;

/// Candidates farther than this from the camera are ignored (meters)
pub const DEFAULT_MAX_DISTANCE: f64 = 100.0;

/// Labels vehicles by projecting their 3D boxes into the camera image
///
/// A vehicle is labeled only if the semantic LiDAR hit it at least
/// `min_detect` times, its box lands inside the image and its archetype has
/// a class id.
#[derive(Debug, Clone)]
pub struct ProjectionAnnotator {
    registry: ClassRegistry,
    max_distance: f64,
}

impl ProjectionAnnotator {
    pub fn new(registry: ClassRegistry) -> Self {
        Self {
            registry,
            max_distance: DEFAULT_MAX_DISTANCE,
        }
    }

    /// Load the class registry from its JSON file
    pub fn from_registry_file(path: impl AsRef<Path>) -> Result<Self, ContractError> {
        Ok(Self::new(ClassRegistry::load(path)?))
    }

    pub fn with_max_distance(mut self, max_distance: f64) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    /// LiDAR hits per actor; points on non-vehicles count as unmatched
    fn count_support(
        vehicles: &VehicleSnapshotIndex,
        lidar: &SemanticPointCloud,
    ) -> (BTreeMap<ActorId, u32>, usize) {
        let mut support = BTreeMap::new();
        let mut unmatched = 0;
        for point in &lidar.points {
            if point.object_tag == VEHICLE_TAG && vehicles.get(point.object_idx).is_some() {
                *support.entry(point.object_idx).or_insert(0) += 1;
            } else {
                unmatched += 1;
            }
        }
        (support, unmatched)
    }
}

impl Annotator for ProjectionAnnotator {
    #[instrument(
        name = "projection_annotate",
        skip_all,
        fields(frame = vehicles.frame, vehicles = vehicles.len(), points = lidar.points.len(), min_detect)
    )]
    fn annotate(
        &self,
        vehicles: &VehicleSnapshotIndex,
        camera: &CameraView,
        lidar: &SemanticPointCloud,
        image: &ImageData,
        min_detect: u32,
    ) -> Result<Annotation, ContractError> {
        if (image.width, image.height) != (camera.width, camera.height) {
            return Err(ContractError::Annotation {
                frame: vehicles.frame,
                message: format!(
                    "image is {}x{} but camera view is {}x{}",
                    image.width, image.height, camera.width, camera.height
                ),
            });
        }
        let projection = CameraProjection::new(camera).ok_or_else(|| ContractError::Annotation {
            frame: vehicles.frame,
            message: "camera transform is not invertible".into(),
        })?;

        let (support, unmatched) = Self::count_support(vehicles, lidar);
        let mut result = DetectionResult::new(vehicles.frame);

        let candidates = vehicles.iter().filter(|v| {
            Some(v.id) != camera.parent_id
                && v.transform.location.distance(&camera.transform.location) <= self.max_distance
        });
        for vehicle in candidates {
            let support_points = support.get(&vehicle.id).copied().unwrap_or(0);
            let filtered = |reason| FilteredCandidate {
                actor_id: vehicle.id,
                support_points,
                reason,
            };

            if support_points < min_detect {
                result.filtered.push(filtered(FilterReason::InsufficientPoints));
                continue;
            }
            let Some(bbox) = projection.project_vehicle(vehicle) else {
                result.filtered.push(filtered(FilterReason::OutOfView));
                continue;
            };
            let Some(class_id) = self.registry.class_of(&vehicle.type_id) else {
                result.filtered.push(filtered(FilterReason::Unclassified));
                continue;
            };

            result.accepted.push(Detection {
                actor_id: vehicle.id,
                bbox,
                class_id,
                distance: vehicle.transform.location.distance(&camera.transform.location),
                support_points,
            });
        }

        debug!(
            accepted = result.accepted.len(),
            filtered = result.filtered.len(),
            unmatched,
            "frame annotated"
        );
        Ok(Annotation {
            result,
            debug: AnnotationDebug {
                support_points: support,
                unmatched_points: unmatched,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        BoundingBox3D, ImageFormat, Location, SemanticLidarPoint, Transform, Vector3,
        VehicleSnapshot,
    };

    const EGO: ActorId = 1;

    fn registry() -> ClassRegistry {
        let mut registry = ClassRegistry::new(BTreeMap::from([
            ("car".to_string(), 0),
            ("truck".to_string(), 1),
        ]));
        registry.insert("vehicle.audi.tt", Some(0));
        registry.insert("vehicle.carlamotors.carlacola", Some(1));
        registry.insert("vehicle.micro.microlino", None);
        registry
    }

    fn vehicle(id: ActorId, type_id: &str, x: f64, y: f64) -> VehicleSnapshot {
        VehicleSnapshot {
            id,
            type_id: type_id.into(),
            transform: Transform::from_location(x, y, 0.0),
            velocity: Vector3::default(),
            bounding_box: BoundingBox3D {
                location: Location {
                    x: 0.0,
                    y: 0.0,
                    z: 0.75,
                },
                extent: Vector3::new(2.0, 1.0, 0.75),
            },
        }
    }

    fn index() -> VehicleSnapshotIndex {
        let mut index = VehicleSnapshotIndex::new(40);
        index.insert(vehicle(EGO, "vehicle.audi.tt", 0.0, 0.0));
        index.insert(vehicle(2, "vehicle.audi.tt", 20.0, 0.0));
        index.insert(vehicle(3, "vehicle.carlamotors.carlacola", 30.0, 4.0));
        index.insert(vehicle(4, "vehicle.micro.microlino", 25.0, -3.0));
        index.insert(vehicle(5, "vehicle.audi.tt", -20.0, 0.0));
        index.insert(vehicle(6, "vehicle.audi.tt", 400.0, 0.0));
        index
    }

    fn camera() -> CameraView {
        CameraView {
            actor_id: 100,
            parent_id: Some(EGO),
            transform: Transform::from_location(1.5, 0.0, 2.4),
            width: 800,
            height: 600,
            fov: 90.0,
        }
    }

    fn image() -> ImageData {
        ImageData {
            width: 800,
            height: 600,
            fov: 90.0,
            format: ImageFormat::Bgra8,
            data: Default::default(),
        }
    }

    fn cloud(hits: &[(ActorId, u32)]) -> SemanticPointCloud {
        let mut points = Vec::new();
        for &(actor_id, count) in hits {
            for _ in 0..count {
                points.push(SemanticLidarPoint {
                    x: 0.0,
                    y: 0.0,
                    z: 0.0,
                    cos_inc_angle: 1.0,
                    object_idx: actor_id,
                    object_tag: VEHICLE_TAG,
                });
            }
        }
        points.push(SemanticLidarPoint {
            x: 1.0,
            y: 0.0,
            z: -2.4,
            cos_inc_angle: 0.5,
            object_idx: 0,
            object_tag: 7,
        });
        SemanticPointCloud {
            horizontal_angle: 0.0,
            points,
        }
    }

    #[test]
    fn test_filters_and_accepts() {
        let annotator = ProjectionAnnotator::new(registry());
        let lidar = cloud(&[(2, 30), (3, 4), (4, 30), (5, 30), (EGO, 50)]);
        let annotation = annotator
            .annotate(&index(), &camera(), &lidar, &image(), 10)
            .unwrap();
        let result = annotation.result;

        assert_eq!(result.frame, 40);
        assert_eq!(result.accepted.len(), 1);
        let detection = &result.accepted[0];
        assert_eq!(detection.actor_id, 2);
        assert_eq!(detection.class_id, 0);
        assert_eq!(detection.support_points, 30);
        assert!((detection.distance - 18.5).abs() < 0.2);

        let reason = |id| {
            result
                .filtered
                .iter()
                .find(|c| c.actor_id == id)
                .map(|c| c.reason)
        };
        assert_eq!(reason(3), Some(FilterReason::InsufficientPoints));
        assert_eq!(reason(4), Some(FilterReason::Unclassified));
        assert_eq!(reason(5), Some(FilterReason::OutOfView));
        // ego and vehicles beyond range are not candidates
        assert_eq!(reason(EGO), None);
        assert_eq!(reason(6), None);
        assert_eq!(result.candidate_count(), 4);

        assert_eq!(annotation.debug.support_points[&EGO], 50);
        assert_eq!(annotation.debug.unmatched_points, 1);
    }

    #[test]
    fn test_threshold_above_every_count_filters_all() {
        let annotator = ProjectionAnnotator::new(registry());
        let lidar = cloud(&[(2, 30), (3, 30), (4, 30), (5, 30)]);
        let result = annotator
            .annotate(&index(), &camera(), &lidar, &image(), 1000)
            .unwrap()
            .result;
        assert!(result.accepted.is_empty());
        assert_eq!(result.filtered.len(), result.candidate_count());
        assert!(result
            .filtered
            .iter()
            .all(|c| c.reason == FilterReason::InsufficientPoints));
    }

    #[test]
    fn test_image_size_mismatch_is_an_error() {
        let annotator = ProjectionAnnotator::new(registry());
        let mut small = image();
        small.width = 640;
        let err = annotator
            .annotate(&index(), &camera(), &cloud(&[]), &small, 10)
            .unwrap_err();
        assert!(matches!(err, ContractError::Annotation { frame: 40, .. }));
    }

    #[test]
    fn test_loads_registry_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vehicle_class.json");
        registry().save(&path).unwrap();

        let annotator = ProjectionAnnotator::from_registry_file(&path)
            .unwrap()
            .with_max_distance(10.0);
        assert_eq!(annotator.registry().class_of("vehicle.carlamotors.carlacola"), Some(1));

        let result = annotator
            .annotate(&index(), &camera(), &cloud(&[(2, 30)]), &image(), 10)
            .unwrap()
            .result;
        assert_eq!(result.candidate_count(), 0);
    }
}
