//! Additional math helpers layered on top of `glam`.

use glam::{DMat3, DQuat, DVec3};

/// Converts angular velocity vector (radians/sec) into a quaternion delta.
pub fn angular_velocity_to_quat(angular: DVec3, dt: f64) -> DQuat {
    let angle = angular.length() * dt;
    if angle.abs() < 1e-12 {
        return DQuat::IDENTITY;
    }
    DQuat::from_axis_angle(angular.normalize(), angle)
}

/// Rotates a body-frame inverse inertia into world frame.
pub fn world_inverse_inertia(rotation: DQuat, local_inverse: DMat3) -> DMat3 {
    let r = DMat3::from_quat(rotation);
    r * local_inverse * r.transpose()
}

pub fn inertia_sphere(radius: f64, mass: f64) -> DMat3 {
    DMat3::from_diagonal(DVec3::splat(0.4 * mass * radius * radius))
}

/// Two unit vectors spanning the plane orthogonal to `normal`.
pub fn orthonormal_tangents(normal: DVec3) -> (DVec3, DVec3) {
    let helper = if normal.x.abs() < 0.9 { DVec3::X } else { DVec3::Y };
    let u = normal.cross(helper).normalize();
    let w = normal.cross(u);
    (u, w)
}
