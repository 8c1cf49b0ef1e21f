//! Shared fixtures for sink and pipeline tests

use bytes::Bytes;
use contracts::{
    AnnotatedFrame, Annotation, Annotator, BoundingBox2D, CameraView, ContractError, Detection,
    DetectionResult, FilterReason, FilteredCandidate, FrameBundle, FrameId, ImageData, ImageFormat,
    SemanticPointCloud, SensorKind, SensorPacket, SensorPayload, Transform, VehicleSnapshotIndex,
    WorldSnapshot,
};

pub(crate) const WIDTH: u32 = 16;
pub(crate) const HEIGHT: u32 = 8;

pub(crate) fn image() -> ImageData {
    let data: Vec<u8> = (0..WIDTH * HEIGHT)
        .flat_map(|i| [(i % 255) as u8, 64, 128, 255])
        .collect();
    ImageData {
        width: WIDTH,
        height: HEIGHT,
        fov: 90.0,
        format: ImageFormat::Bgra8,
        data: Bytes::from(data),
    }
}

pub(crate) fn result(frame: FrameId) -> DetectionResult {
    DetectionResult {
        frame,
        accepted: vec![Detection {
            actor_id: 7,
            bbox: BoundingBox2D {
                u_min: 4.0,
                v_min: 2.0,
                u_max: 10.0,
                v_max: 6.0,
            },
            class_id: 1,
            distance: 21.5,
            support_points: 40,
        }],
        filtered: vec![FilteredCandidate {
            actor_id: 8,
            support_points: 3,
            reason: FilterReason::InsufficientPoints,
        }],
    }
}

pub(crate) fn annotated_frame(capture_index: u64, frame: FrameId) -> AnnotatedFrame {
    AnnotatedFrame {
        capture_index,
        frame,
        timestamp: frame as f64 * 0.05,
        image: image(),
        result: result(frame),
    }
}

pub(crate) fn camera() -> CameraView {
    CameraView {
        actor_id: 100,
        parent_id: Some(1),
        transform: Transform::default(),
        width: WIDTH,
        height: HEIGHT,
        fov: 90.0,
    }
}

fn packet(sensor_id: &str, kind: SensorKind, frame: FrameId, payload: SensorPayload) -> SensorPacket {
    SensorPacket {
        sensor_id: sensor_id.into(),
        sensor_kind: kind,
        frame,
        timestamp: frame as f64 * 0.05,
        payload,
    }
}

pub(crate) fn bundle(frame: FrameId) -> FrameBundle {
    FrameBundle::new(
        frame,
        vec![
            packet(
                "world_tick",
                SensorKind::WorldTick,
                frame,
                SensorPayload::WorldSnapshot(WorldSnapshot {
                    frame,
                    elapsed_seconds: frame as f64 * 0.05,
                    delta_seconds: 0.05,
                    actors: vec![],
                }),
            ),
            packet("rgb", SensorKind::Camera, frame, SensorPayload::Image(image())),
            packet(
                "lidar",
                SensorKind::SemanticLidar,
                frame,
                SensorPayload::SemanticPointCloud(SemanticPointCloud::default()),
            ),
        ],
    )
}

/// Returns the same detections for every frame
#[derive(Debug, Default)]
pub(crate) struct StaticAnnotator {
    pub(crate) fail: bool,
}

impl Annotator for StaticAnnotator {
    fn annotate(
        &self,
        vehicles: &VehicleSnapshotIndex,
        _camera: &CameraView,
        _lidar: &SemanticPointCloud,
        _image: &ImageData,
        _min_detect: u32,
    ) -> Result<Annotation, ContractError> {
        if self.fail {
            return Err(ContractError::Annotation {
                frame: vehicles.frame,
                message: "injected".into(),
            });
        }
        Ok(Annotation {
            result: result(vehicles.frame),
            debug: Default::default(),
        })
    }
}
