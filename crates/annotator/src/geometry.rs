//! Pinhole projection in the simulator's coordinate frame
//!
//! World frame is left-handed: x forward, y right, z up. Rotations are in
//! degrees. Camera space uses x right, y down, z forward.

use contracts::{BoundingBox2D, CameraView, Location, Transform, VehicleSnapshot};
use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};

/// Points closer than this in front of the camera are not projected
const MIN_DEPTH: f64 = 1e-3;

/// Homogeneous local-to-world matrix of a transform
pub fn transform_matrix(transform: &Transform) -> Matrix4<f64> {
    let (sy, cy) = transform.rotation.yaw.to_radians().sin_cos();
    let (sr, cr) = transform.rotation.roll.to_radians().sin_cos();
    let (sp, cp) = transform.rotation.pitch.to_radians().sin_cos();
    let l = transform.location;

    Matrix4::new(
        cp * cy,
        cy * sp * sr - sy * cr,
        -cy * sp * cr - sy * sr,
        l.x,
        cp * sy,
        sy * sp * sr + cy * cr,
        -sy * sp * cr + cy * sr,
        l.y,
        sp,
        -cp * sr,
        cp * cr,
        l.z,
        0.0,
        0.0,
        0.0,
        1.0,
    )
}

/// Camera intrinsics for an image of `width` × `height` with horizontal `fov` (degrees)
pub fn intrinsics(width: u32, height: u32, fov: f64) -> Matrix3<f64> {
    let w = f64::from(width);
    let h = f64::from(height);
    let focal = w / (2.0 * (fov.to_radians() / 2.0).tan());
    Matrix3::new(focal, 0.0, w / 2.0, 0.0, focal, h / 2.0, 0.0, 0.0, 1.0)
}

/// World-to-image projection for one camera pose
#[derive(Debug, Clone)]
pub struct CameraProjection {
    world_to_camera: Matrix4<f64>,
    k: Matrix3<f64>,
    width: f64,
    height: f64,
}

impl CameraProjection {
    /// `None` if the camera pose is degenerate
    pub fn new(view: &CameraView) -> Option<Self> {
        Some(Self {
            world_to_camera: transform_matrix(&view.transform).try_inverse()?,
            k: intrinsics(view.width, view.height, view.fov),
            width: f64::from(view.width),
            height: f64::from(view.height),
        })
    }

    /// Pixel coordinates and depth of a world point, `None` behind the camera
    pub fn project(&self, point: &Location) -> Option<(f64, f64, f64)> {
        let local = self.world_to_camera * Vector4::new(point.x, point.y, point.z, 1.0);
        // simulator (forward, right, up) -> camera (right, down, forward)
        let camera = Vector3::new(local.y, -local.z, local.x);
        if camera.z < MIN_DEPTH {
            return None;
        }
        let pixel = self.k * camera;
        Some((pixel.x / pixel.z, pixel.y / pixel.z, camera.z))
    }

    /// 2D box around the vehicle's 3D box, clipped to the image
    ///
    /// `None` if no corner lies in front of the camera or the clipped box is empty.
    pub fn project_vehicle(&self, vehicle: &VehicleSnapshot) -> Option<BoundingBox2D> {
        let to_world = transform_matrix(&vehicle.transform);
        let mut u_min = f64::INFINITY;
        let mut v_min = f64::INFINITY;
        let mut u_max = f64::NEG_INFINITY;
        let mut v_max = f64::NEG_INFINITY;
        let mut projected = 0;

        for corner in vehicle.bounding_box.local_corners() {
            let world = to_world * Vector4::new(corner.x, corner.y, corner.z, 1.0);
            let Some((u, v, _)) = self.project(&Location {
                x: world.x,
                y: world.y,
                z: world.z,
            }) else {
                continue;
            };
            projected += 1;
            u_min = u_min.min(u);
            v_min = v_min.min(v);
            u_max = u_max.max(u);
            v_max = v_max.max(v);
        }
        if projected == 0 {
            return None;
        }

        let clipped = BoundingBox2D {
            u_min: u_min.clamp(0.0, self.width - 1.0),
            v_min: v_min.clamp(0.0, self.height - 1.0),
            u_max: u_max.clamp(0.0, self.width - 1.0),
            v_max: v_max.clamp(0.0, self.height - 1.0),
        };
        (clipped.area() > 0.0).then_some(clipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{BoundingBox3D, Rotation, Vector3 as Vec3};

    fn view(transform: Transform) -> CameraView {
        CameraView {
            actor_id: 1,
            parent_id: None,
            transform,
            width: 800,
            height: 600,
            fov: 90.0,
        }
    }

    fn vehicle(x: f64, y: f64) -> VehicleSnapshot {
        VehicleSnapshot {
            id: 2,
            type_id: "vehicle.audi.tt".into(),
            transform: Transform::from_location(x, y, 0.0),
            velocity: Vec3::default(),
            bounding_box: BoundingBox3D {
                location: Location {
                    x: 0.0,
                    y: 0.0,
                    z: 0.75,
                },
                extent: Vec3::new(2.0, 1.0, 0.75),
            },
        }
    }

    #[test]
    fn test_point_ahead_lands_on_principal_point() {
        let projection = CameraProjection::new(&view(Transform::default())).unwrap();
        let (u, v, depth) = projection
            .project(&Location {
                x: 10.0,
                y: 0.0,
                z: 0.0,
            })
            .unwrap();
        assert!((u - 400.0).abs() < 1e-9);
        assert!((v - 300.0).abs() < 1e-9);
        assert!((depth - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_right_and_up_map_to_image_axes() {
        let projection = CameraProjection::new(&view(Transform::default())).unwrap();
        // fov 90 => focal = 400
        let (u, v, _) = projection
            .project(&Location {
                x: 10.0,
                y: 1.0,
                z: 1.0,
            })
            .unwrap();
        assert!((u - 440.0).abs() < 1e-9);
        assert!((v - 260.0).abs() < 1e-9);
    }

    #[test]
    fn test_point_behind_camera_is_rejected() {
        let projection = CameraProjection::new(&view(Transform::default())).unwrap();
        assert!(projection
            .project(&Location {
                x: -5.0,
                y: 0.0,
                z: 0.0,
            })
            .is_none());
    }

    #[test]
    fn test_yawed_camera() {
        let camera = Transform {
            location: Location::default(),
            rotation: Rotation {
                pitch: 0.0,
                yaw: 90.0,
                roll: 0.0,
            },
        };
        let projection = CameraProjection::new(&view(camera)).unwrap();
        // facing +y now
        let (u, _, depth) = projection
            .project(&Location {
                x: 0.0,
                y: 10.0,
                z: 0.0,
            })
            .unwrap();
        assert!((u - 400.0).abs() < 1e-6);
        assert!((depth - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_vehicle_box_is_clipped_to_image() {
        let projection = CameraProjection::new(&view(Transform::default())).unwrap();
        let bbox = projection.project_vehicle(&vehicle(20.0, 0.0)).unwrap();
        assert!(bbox.u_min < 400.0 && bbox.u_max > 400.0);
        assert!(bbox.v_max <= 599.0);

        let partial = projection.project_vehicle(&vehicle(6.0, 6.0)).unwrap();
        assert_eq!(partial.u_max, 799.0);

        assert!(projection.project_vehicle(&vehicle(-20.0, 0.0)).is_none());
    }
}
