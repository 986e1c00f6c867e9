//! Quaternion for 3D rotations

use bytemuck::{Pod, Zeroable};
use std::ops::Mul;

use super::{Mat4, Vec3, ZERO_TOLERANCE};

/// Quaternion for representing 3D rotations
///
/// Euler conversions use degrees and the Y·X·Z order: the rotation about Z is
/// applied first, then X, then Y (yaw, pitch, roll).
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    /// Identity quaternion (no rotation)
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Create a new quaternion
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Set all components in place
    pub fn set(&mut self, x: f32, y: f32, z: f32, w: f32) -> &mut Self {
        self.x = x;
        self.y = y;
        self.z = z;
        self.w = w;
        self
    }

    /// Create from axis-angle representation (radians)
    ///
    /// A near-zero axis yields the identity.
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let len = axis.length();
        if len < ZERO_TOLERANCE {
            return Self::IDENTITY;
        }

        let (s, c) = (angle * 0.5).sin_cos();
        let inv_len = 1.0 / len;
        Self {
            x: axis.x * inv_len * s,
            y: axis.y * inv_len * s,
            z: axis.z * inv_len * s,
            w: c,
        }
    }

    pub fn from_rotation_x(angle: f32) -> Self {
        let (s, c) = (angle * 0.5).sin_cos();
        Self::new(s, 0.0, 0.0, c)
    }

    pub fn from_rotation_y(angle: f32) -> Self {
        let (s, c) = (angle * 0.5).sin_cos();
        Self::new(0.0, s, 0.0, c)
    }

    pub fn from_rotation_z(angle: f32) -> Self {
        let (s, c) = (angle * 0.5).sin_cos();
        Self::new(0.0, 0.0, s, c)
    }

    /// Create from Euler angles in degrees (Y·X·Z order)
    pub fn from_euler_degrees(x: f32, y: f32, z: f32) -> Self {
        let qy = Self::from_rotation_y(y.to_radians());
        let qx = Self::from_rotation_x(x.to_radians());
        let qz = Self::from_rotation_z(z.to_radians());
        qy * qx * qz
    }

    /// Create from Euler angles in degrees stored in a vector
    pub fn from_euler(euler: Vec3) -> Self {
        Self::from_euler_degrees(euler.x, euler.y, euler.z)
    }

    /// Convert to Euler angles in degrees (Y·X·Z order)
    ///
    /// Near the ±90° pitch singularity the roll is folded into the yaw.
    pub fn to_euler_degrees(&self) -> Vec3 {
        let Quat { x, y, z, w } = *self;
        let m12 = 2.0 * (y * z - w * x);

        if m12.abs() < 1.0 - ZERO_TOLERANCE {
            let pitch = (-m12).asin();
            let yaw = (2.0 * (x * z + w * y)).atan2(1.0 - 2.0 * (x * x + y * y));
            let roll = (2.0 * (x * y + w * z)).atan2(1.0 - 2.0 * (x * x + z * z));
            Vec3::new(pitch.to_degrees(), yaw.to_degrees(), roll.to_degrees())
        } else {
            let pitch = std::f32::consts::FRAC_PI_2.copysign(-m12);
            let yaw = (-2.0 * (x * z - w * y)).atan2(1.0 - 2.0 * (y * y + z * z));
            Vec3::new(pitch.to_degrees(), yaw.to_degrees(), 0.0)
        }
    }

    /// Build a rotation from three orthonormal basis vectors (the rotated X, Y and Z axes)
    pub fn from_rotation_axes(x_axis: Vec3, y_axis: Vec3, z_axis: Vec3) -> Self {
        let (m00, m10, m20) = (x_axis.x, x_axis.y, x_axis.z);
        let (m01, m11, m21) = (y_axis.x, y_axis.y, y_axis.z);
        let (m02, m12, m22) = (z_axis.x, z_axis.y, z_axis.z);

        let trace = m00 + m11 + m22;
        let q = if trace > 0.0 {
            let s = 0.5 / (trace + 1.0).sqrt();
            Self::new((m21 - m12) * s, (m02 - m20) * s, (m10 - m01) * s, 0.25 / s)
        } else if m00 > m11 && m00 > m22 {
            let s = 2.0 * (1.0 + m00 - m11 - m22).sqrt();
            Self::new(0.25 * s, (m01 + m10) / s, (m02 + m20) / s, (m21 - m12) / s)
        } else if m11 > m22 {
            let s = 2.0 * (1.0 + m11 - m00 - m22).sqrt();
            Self::new((m01 + m10) / s, 0.25 * s, (m12 + m21) / s, (m02 - m20) / s)
        } else {
            let s = 2.0 * (1.0 + m22 - m00 - m11).sqrt();
            Self::new((m02 + m20) / s, (m12 + m21) / s, 0.25 * s, (m10 - m01) / s)
        };
        q.normalize()
    }

    /// Extract the rotation of a matrix whose upper 3x3 has no scale
    pub fn from_rotation_matrix(m: &Mat4) -> Self {
        let c = &m.cols;
        Self::from_rotation_axes(
            Vec3::new(c[0][0], c[0][1], c[0][2]),
            Vec3::new(c[1][0], c[1][1], c[1][2]),
            Vec3::new(c[2][0], c[2][1], c[2][2]),
        )
    }

    pub fn length(&self) -> f32 {
        self.dot(*self).sqrt()
    }

    /// Normalize the quaternion
    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len < ZERO_TOLERANCE {
            return Self::IDENTITY;
        }
        let inv_len = 1.0 / len;
        Self {
            x: self.x * inv_len,
            y: self.y * inv_len,
            z: self.z * inv_len,
            w: self.w * inv_len,
        }
    }

    /// Get the conjugate (inverse for unit quaternions)
    pub fn conjugate(&self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
            w: self.w,
        }
    }

    /// Inverse rotation, valid for non-unit quaternions too
    pub fn inverse(&self) -> Self {
        let len_sq = self.dot(*self);
        if len_sq < ZERO_TOLERANCE {
            return Self::IDENTITY;
        }
        let inv = 1.0 / len_sq;
        Self::new(-self.x * inv, -self.y * inv, -self.z * inv, self.w * inv)
    }

    /// Invert in place
    pub fn invert(&mut self) -> &mut Self {
        *self = self.inverse();
        self
    }

    /// Multiply in place: `self = self * other`
    pub fn multiply_assign(&mut self, other: &Quat) -> &mut Self {
        *self = Self::multiply(self, other);
        self
    }

    /// Dot product of two quaternions
    pub fn dot(&self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    /// Multiply two quaternions (static version), `a` applied after `b`
    pub fn multiply(a: &Quat, b: &Quat) -> Quat {
        Quat {
            x: a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
            y: a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
            z: a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
            w: a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
        }
    }

    /// Rotate a vector by this quaternion
    pub fn rotate_vec3(&self, v: Vec3) -> Vec3 {
        let u = Vec3::new(self.x, self.y, self.z);
        let t = u.cross(v) * 2.0;
        v + t * self.w + u.cross(t)
    }

    /// Instance method for slerp
    pub fn slerp(&self, other: Self, t: f32) -> Self {
        Self::slerp_static(self, &other, t)
    }

    /// Spherical linear interpolation (static version)
    pub fn slerp_static(a: &Quat, b: &Quat, t: f32) -> Quat {
        let mut cos_half_theta = a.dot(*b);

        // If negative dot, negate one quaternion to take shorter path
        let mut b = *b;
        if cos_half_theta < 0.0 {
            b = Self::new(-b.x, -b.y, -b.z, -b.w);
            cos_half_theta = -cos_half_theta;
        }

        // If quaternions are close, use linear interpolation
        if cos_half_theta > 0.9995 {
            return Self::new(
                a.x + t * (b.x - a.x),
                a.y + t * (b.y - a.y),
                a.z + t * (b.z - a.z),
                a.w + t * (b.w - a.w),
            )
            .normalize();
        }

        let half_theta = cos_half_theta.acos();
        let sin_half_theta = (1.0 - cos_half_theta * cos_half_theta).sqrt();

        let ratio_a = ((1.0 - t) * half_theta).sin() / sin_half_theta;
        let ratio_b = (t * half_theta).sin() / sin_half_theta;

        Self::new(
            a.x * ratio_a + b.x * ratio_b,
            a.y * ratio_a + b.y * ratio_b,
            a.z * ratio_a + b.z * ratio_b,
            a.w * ratio_a + b.w * ratio_b,
        )
    }

    /// Convert to a 4x4 rotation matrix
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_quat(*self)
    }

    /// True if both quaternions describe the same rotation within `epsilon`
    pub fn approx_eq_rotation(&self, other: Quat, epsilon: f32) -> bool {
        (1.0 - self.dot(other).abs()) <= epsilon
    }
}

impl Mul for Quat {
    type Output = Quat;

    fn mul(self, rhs: Quat) -> Quat {
        Quat::multiply(&self, &rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vec3_near(a: Vec3, b: Vec3) {
        assert!(a.approx_eq(b, 1e-3), "{a:?} != {b:?}");
    }

    #[test]
    fn test_euler_round_trip() {
        let cases = [
            Vec3::new(10.0, 20.0, 30.0),
            Vec3::new(-45.0, 120.0, 5.0),
            Vec3::new(80.0, -170.0, -60.0),
            Vec3::new(0.0, 0.0, 0.0),
        ];
        for euler in cases {
            let q = Quat::from_euler(euler);
            assert_vec3_near(q.to_euler_degrees(), euler);
        }
    }

    #[test]
    fn test_euler_order_is_yxz() {
        let q = Quat::from_euler_degrees(30.0, 40.0, 50.0);
        let expected = Quat::from_rotation_y(40f32.to_radians())
            * Quat::from_rotation_x(30f32.to_radians())
            * Quat::from_rotation_z(50f32.to_radians());
        assert!(q.approx_eq_rotation(expected, 1e-6));
    }

    #[test]
    fn test_rotate_vec3() {
        let q = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        // +X rotated 90° about +Y lands on -Z
        assert_vec3_near(q.rotate_vec3(Vec3::RIGHT), Vec3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn test_matrix_round_trip() {
        let q = Quat::from_euler_degrees(15.0, -70.0, 33.0);
        let back = Quat::from_rotation_matrix(&q.to_mat4());
        assert!(q.approx_eq_rotation(back, 1e-5));
    }

    #[test]
    fn test_inverse() {
        let q = Quat::from_axis_angle(Vec3::new(1.0, 2.0, 3.0), 1.2);
        let id = q * q.inverse();
        assert!(id.approx_eq_rotation(Quat::IDENTITY, 1e-6));

        let mut p = q;
        p.invert();
        assert!(p.approx_eq_rotation(q.conjugate(), 1e-6));
    }

    #[test]
    fn test_slerp_endpoints() {
        let a = Quat::IDENTITY;
        let b = Quat::from_rotation_z(1.0);
        assert!(a.slerp(b, 0.0).approx_eq_rotation(a, 1e-6));
        assert!(a.slerp(b, 1.0).approx_eq_rotation(b, 1e-6));
    }
}
