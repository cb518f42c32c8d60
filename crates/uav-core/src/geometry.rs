//! Frame geometry for camera-guided flight
//!
//! World quantities are NED (x north, y east, z down). Body and camera
//! frames are x-forward, y-right, z-down. Angles are radians unless the
//! parameter name says degrees.

use nalgebra::{Matrix3, Vector3};

use crate::{CameraIntrinsics, EulerAngles, Pose};

/// Rotate a body-frame velocity into the world frame by yaw.
///
/// The vertical component passes through unchanged.
pub fn body_to_world_velocity(v_front: f64, v_right: f64, v_down: f64, yaw: f64) -> Vector3<f64> {
    let (sin, cos) = yaw.sin_cos();
    Vector3::new(
        v_front * cos - v_right * sin,
        v_right * cos + v_front * sin,
        v_down,
    )
}

/// Inverse of [`body_to_world_velocity`].
pub fn world_to_body_velocity(velocity: &Vector3<f64>, yaw: f64) -> Vector3<f64> {
    body_to_world_velocity(velocity.x, velocity.y, velocity.z, -yaw)
}

/// Rotation matrix for an attitude given as (pitch, roll, yaw).
///
/// Built as `M_yaw * M_pitch * M_roll`, each factor written with the negated
/// angle. The product is the body-to-world rotation used to turn a camera
/// ray into a world direction.
pub fn rotation_matrix(pitch: f64, roll: f64, yaw: f64) -> Matrix3<f64> {
    let (sp, cp) = (-pitch).sin_cos();
    let m_pitch = Matrix3::new(
        cp, 0.0, -sp, //
        0.0, 1.0, 0.0, //
        sp, 0.0, cp,
    );

    let (sr, cr) = (-roll).sin_cos();
    let m_roll = Matrix3::new(
        1.0, 0.0, 0.0, //
        0.0, cr, sr, //
        0.0, -sr, cr,
    );

    let (sy, cy) = (-yaw).sin_cos();
    let m_yaw = Matrix3::new(
        cy, sy, 0.0, //
        -sy, cy, 0.0, //
        0.0, 0.0, 1.0,
    );

    m_yaw * m_pitch * m_roll
}

/// Same as [`rotation_matrix`] for an [`EulerAngles`] value.
pub fn attitude_matrix(attitude: &EulerAngles) -> Matrix3<f64> {
    rotation_matrix(attitude.pitch, attitude.roll, attitude.yaw)
}

/// Distance from the pinhole to the virtual image plane, in pixels.
pub fn virtual_focal_length(screen_width: f64, fov_degrees: f64) -> f64 {
    (screen_width / 2.0) / (fov_degrees / 2.0).to_radians().tan()
}

/// Angular offset of image point (u, v) from the image center.
///
/// Returns `(pitch, yaw)`: yaw is positive to the right, pitch is positive
/// upward (image v grows downward).
pub fn pixel_offset_to_angles(
    screen_width: f64,
    screen_height: f64,
    fov_degrees: f64,
    u: f64,
    v: f64,
) -> (f64, f64) {
    let focal = virtual_focal_length(screen_width, fov_degrees);
    let u_offset = u - screen_width / 2.0;
    let v_offset = screen_height / 2.0 - v;

    let yaw = (u_offset / focal).atan();
    let pitch = (v_offset / focal).atan();
    (pitch, yaw)
}

/// World velocity produced by a forward speed at the given attitude.
///
/// Rotates `(speed, 0, 0)` by the transpose of `Rz(yaw) * Ry(pitch) * Rx(roll)`.
pub fn body_frame_velocity_from_attitude(speed: f64, pitch: f64, roll: f64, yaw: f64) -> Vector3<f64> {
    rotation_matrix(pitch, roll, yaw).transpose() * Vector3::new(speed, 0.0, 0.0)
}

/// Camera-frame direction `(1, right, down)` towards image point (u, v).
pub fn camera_ray(intrinsics: &CameraIntrinsics, u: f64, v: f64) -> Vector3<f64> {
    let (width, height) = intrinsics.resolution.as_f64();
    let focal = intrinsics.focal_length();
    Vector3::new(1.0, (u - width / 2.0) / focal, (v - height / 2.0) / focal)
}

/// Intersection of a world ray with the ground plane z = 0.
///
/// Only rays pointing down (positive z) can reach the ground.
pub fn ground_intersection(origin: &Vector3<f64>, direction: &Vector3<f64>) -> Option<Vector3<f64>> {
    if direction.z <= 0.0 {
        return None;
    }

    let scale = (0.0 - origin.z) / direction.z;
    Some(Vector3::new(
        origin.x + scale * direction.x,
        origin.y + scale * direction.y,
        0.0,
    ))
}

/// Back-project image point (u, v) seen from `camera` onto the ground plane.
pub fn project_to_ground(camera: &Pose, intrinsics: &CameraIntrinsics, u: f64, v: f64) -> Option<Vector3<f64>> {
    let direction = attitude_matrix(&camera.orientation) * camera_ray(intrinsics, u, v);
    ground_intersection(&camera.position, &direction)
}

/// Project a world point into the image of `camera`.
///
/// Returns `None` for points behind the image plane. The result may lie
/// outside the frame.
pub fn project_to_image(camera: &Pose, intrinsics: &CameraIntrinsics, point: &Vector3<f64>) -> Option<(f64, f64)> {
    let local = attitude_matrix(&camera.orientation).transpose() * (point - camera.position);
    if local.x <= f64::EPSILON {
        return None;
    }

    let (width, height) = intrinsics.resolution.as_f64();
    let focal = intrinsics.focal_length();
    Some((
        width / 2.0 + focal * local.y / local.x,
        height / 2.0 + focal * local.z / local.x,
    ))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Resolution;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::f64::consts::{FRAC_PI_2, PI};

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics::new(Resolution::new(752, 480), 90.0)
    }

    #[test]
    fn test_rotation_matrix_is_orthogonal() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..500 {
            let m = rotation_matrix(
                rng.gen_range(-PI..PI),
                rng.gen_range(-PI..PI),
                rng.gen_range(-PI..PI),
            );
            let product = m.transpose() * m;
            assert_relative_eq!(product, Matrix3::identity(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_rotation_matrix_matches_yaw_pitch_roll_order() {
        let (pitch, roll, yaw) = (-0.4, 0.15, 1.2);
        let expected = Rotation3::from_euler_angles(roll, pitch, yaw);
        assert_relative_eq!(rotation_matrix(pitch, roll, yaw), *expected.matrix(), epsilon = 1e-12);
    }

    #[test]
    fn test_image_center_has_no_angular_offset() {
        for (w, h, fov) in [(752.0, 480.0, 90.0), (1920.0, 1080.0, 60.0), (640.0, 640.0, 120.0)] {
            let (pitch, yaw) = pixel_offset_to_angles(w, h, fov, w / 2.0, h / 2.0);
            assert_eq!(pitch, 0.0);
            assert_eq!(yaw, 0.0);
        }
    }

    #[test]
    fn test_pixel_offset_signs() {
        // right and above the center: positive yaw, positive pitch
        let (pitch, yaw) = pixel_offset_to_angles(752.0, 480.0, 90.0, 500.0, 100.0);
        assert!(yaw > 0.0);
        assert!(pitch > 0.0);

        // at the right frame edge with a 90 degree FOV the yaw is 45 degrees
        let (_, edge_yaw) = pixel_offset_to_angles(752.0, 480.0, 90.0, 752.0, 240.0);
        assert_relative_eq!(edge_yaw, PI / 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_body_world_velocity_round_trip() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let (f, r, d) = (rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0), rng.gen_range(-2.0..2.0));
            let yaw = rng.gen_range(-PI..PI);

            let world = body_to_world_velocity(f, r, d, yaw);
            let body = world_to_body_velocity(&world, yaw);
            assert_relative_eq!(body, Vector3::new(f, r, d), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_body_to_world_facing_east() {
        let world = body_to_world_velocity(2.0, 0.0, 0.5, FRAC_PI_2);
        assert_relative_eq!(world, Vector3::new(0.0, 2.0, 0.5), epsilon = 1e-12);
    }

    #[test]
    fn test_body_frame_velocity_from_attitude() {
        let level = body_frame_velocity_from_attitude(3.0, 0.0, 0.0, 0.0);
        assert_relative_eq!(level, Vector3::new(3.0, 0.0, 0.0), epsilon = 1e-12);

        let turned = body_frame_velocity_from_attitude(3.0, 0.0, 0.0, FRAC_PI_2);
        assert_relative_eq!(turned, Vector3::new(0.0, -3.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_downward_camera_projects_center_below_itself() {
        let camera = Pose::new(
            Vector3::new(10.0, -4.0, -20.0),
            EulerAngles::new(-FRAC_PI_2, 0.0, 0.7),
        );
        let ground = project_to_ground(&camera, &intrinsics(), 376.0, 240.0).unwrap();
        assert_relative_eq!(ground, Vector3::new(10.0, -4.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_level_camera_cannot_reach_ground_above_horizon() {
        let camera = Pose::new(Vector3::new(0.0, 0.0, -20.0), EulerAngles::default());
        assert!(project_to_ground(&camera, &intrinsics(), 376.0, 100.0).is_none());
        assert!(project_to_ground(&camera, &intrinsics(), 376.0, 240.0).is_none());
        assert!(project_to_ground(&camera, &intrinsics(), 376.0, 400.0).is_some());
    }

    #[test]
    fn test_image_projection_inverts_ground_projection() {
        let camera = Pose::new(
            Vector3::new(3.0, 7.0, -25.0),
            EulerAngles::new(-0.9, 0.0, -0.3),
        );
        let intrinsics = intrinsics();
        let ground = project_to_ground(&camera, &intrinsics, 420.0, 330.0).unwrap();
        let (u, v) = project_to_image(&camera, &intrinsics, &ground).unwrap();
        assert_relative_eq!(u, 420.0, epsilon = 1e-6);
        assert_relative_eq!(v, 330.0, epsilon = 1e-6);
    }

    #[test]
    fn test_points_behind_camera_do_not_project() {
        let camera = Pose::new(Vector3::new(0.0, 0.0, -10.0), EulerAngles::default());
        assert!(project_to_image(&camera, &intrinsics(), &Vector3::new(-5.0, 0.0, 0.0)).is_none());
    }
}
