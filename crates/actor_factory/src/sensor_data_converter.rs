//! CARLA sensor data conversion
//!
//! Converts native CARLA measurements into `SensorPacket`s.
//! Only compiled when the `real-carla` feature is enabled.

use bytes::Bytes;
use carla::sensor::data::{Image, SemanticLidarMeasurement};
use carla::sensor::{SensorData, SensorDataBase};
use contracts::{
    ImageData, ImageFormat, SemanticLidarPoint, SemanticPointCloud, SensorKind, SensorPacket,
    SensorPayload,
};

fn image_to_payload(image: &Image, fov: f64) -> SensorPayload {
    SensorPayload::Image(ImageData {
        width: image.width() as u32,
        height: image.height() as u32,
        fov,
        format: ImageFormat::Bgra8,
        data: Bytes::copy_from_slice(image.as_raw_bytes()),
    })
}

fn semantic_lidar_to_payload(lidar: &SemanticLidarMeasurement) -> SensorPayload {
    let points = lidar
        .as_slice()
        .iter()
        .map(|detection| SemanticLidarPoint {
            x: detection.point.x,
            y: detection.point.y,
            z: detection.point.z,
            cos_inc_angle: detection.cos_inc_angle,
            object_idx: detection.object_idx,
            object_tag: detection.object_tag,
        })
        .collect();
    SensorPayload::SemanticPointCloud(SemanticPointCloud {
        horizontal_angle: lidar.horizontal_angle() as f64,
        points,
    })
}

/// Convert a CARLA measurement into a `SensorPacket`
///
/// Returns `None` if the data doesn't match the sensor kind.
pub fn convert_sensor_data(
    sensor_id: &str,
    sensor_kind: SensorKind,
    fov: f64,
    data: &SensorData,
) -> Option<SensorPacket> {
    let payload = match sensor_kind {
        SensorKind::Camera => {
            let image = Image::try_from(data.clone()).ok()?;
            image_to_payload(&image, fov)
        }
        SensorKind::SemanticLidar => {
            let lidar = SemanticLidarMeasurement::try_from(data.clone()).ok()?;
            semantic_lidar_to_payload(&lidar)
        }
        SensorKind::WorldTick => return None,
    };

    Some(SensorPacket {
        sensor_id: sensor_id.to_string(),
        sensor_kind,
        frame: data.frame() as u64,
        timestamp: data.timestamp(),
        payload,
    })
}
