//! 4x4 matrix

use bytemuck::{Pod, Zeroable};
use std::ops::Mul;

use super::{Quat, Vec3, Vec4, ZERO_TOLERANCE};

/// 4x4 transformation matrix (column-major)
///
/// `cols[c][r]` is the element in column `c`, row `r`.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Mat4 {
    pub cols: [[f32; 4]; 4],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4 {
    pub const IDENTITY: Mat4 = Mat4 {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub fn translation(x: f32, y: f32, z: f32) -> Self {
        Self {
            cols: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [x, y, z, 1.0],
            ],
        }
    }

    pub fn from_translation(v: Vec3) -> Self {
        Self::translation(v.x, v.y, v.z)
    }

    pub fn scale(x: f32, y: f32, z: f32) -> Self {
        Self {
            cols: [
                [x, 0.0, 0.0, 0.0],
                [0.0, y, 0.0, 0.0],
                [0.0, 0.0, z, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    pub fn from_scale(v: Vec3) -> Self {
        Self::scale(v.x, v.y, v.z)
    }

    /// Rotation matrix from a (unit) quaternion
    pub fn from_quat(q: Quat) -> Self {
        let x2 = q.x + q.x;
        let y2 = q.y + q.y;
        let z2 = q.z + q.z;

        let xx = q.x * x2;
        let xy = q.x * y2;
        let xz = q.x * z2;
        let yy = q.y * y2;
        let yz = q.y * z2;
        let zz = q.z * z2;
        let wx = q.w * x2;
        let wy = q.w * y2;
        let wz = q.w * z2;

        Self {
            cols: [
                [1.0 - (yy + zz), xy + wz, xz - wy, 0.0],
                [xy - wz, 1.0 - (xx + zz), yz + wx, 0.0],
                [xz + wy, yz - wx, 1.0 - (xx + yy), 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Affine transform `T * R * S`
    pub fn compose(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        let mut m = Self::from_quat(rotation);
        for (col, s) in m.cols.iter_mut().zip([scale.x, scale.y, scale.z]) {
            col[0] *= s;
            col[1] *= s;
            col[2] *= s;
        }
        m.cols[3] = [position.x, position.y, position.z, 1.0];
        m
    }

    /// Split an affine matrix into translation, rotation and scale
    ///
    /// A negative determinant is folded into the X scale. Zero scale on any axis
    /// yields the identity rotation.
    pub fn decompose(&self) -> (Vec3, Quat, Vec3) {
        let translation = self.get_translation();
        let c = &self.cols;
        let mut sx = Vec3::new(c[0][0], c[0][1], c[0][2]).length();
        let sy = Vec3::new(c[1][0], c[1][1], c[1][2]).length();
        let sz = Vec3::new(c[2][0], c[2][1], c[2][2]).length();

        if self.determinant() < 0.0 {
            sx = -sx;
        }

        if sx.abs() < ZERO_TOLERANCE || sy < ZERO_TOLERANCE || sz < ZERO_TOLERANCE {
            return (translation, Quat::IDENTITY, Vec3::new(sx, sy, sz));
        }

        let rotation = Quat::from_rotation_axes(
            Vec3::new(c[0][0], c[0][1], c[0][2]) * (1.0 / sx),
            Vec3::new(c[1][0], c[1][1], c[1][2]) * (1.0 / sy),
            Vec3::new(c[2][0], c[2][1], c[2][2]) * (1.0 / sz),
        );
        (translation, rotation, Vec3::new(sx, sy, sz))
    }

    pub fn get_translation(&self) -> Vec3 {
        Vec3::new(self.cols[3][0], self.cols[3][1], self.cols[3][2])
    }

    /// Get a column as a vector, ignoring the fourth component
    pub fn column3(&self, idx: usize) -> Vec3 {
        let c = self.cols[idx];
        Vec3::new(c[0], c[1], c[2])
    }

    /// Multiply two matrices (static version)
    pub fn multiply(a: &Mat4, b: &Mat4) -> Mat4 {
        let mut result = [[0.0f32; 4]; 4];
        for (i, col) in result.iter_mut().enumerate() {
            for (j, cell) in col.iter_mut().enumerate() {
                for k in 0..4 {
                    *cell += a.cols[k][j] * b.cols[i][k];
                }
            }
        }
        Mat4 { cols: result }
    }

    /// Multiply in place: `self = self * other`
    pub fn multiply_assign(&mut self, other: &Mat4) -> &mut Self {
        *self = Self::multiply(self, other);
        self
    }

    pub fn transpose(&self) -> Mat4 {
        let mut result = [[0.0f32; 4]; 4];
        for (c, col) in result.iter_mut().enumerate() {
            for (r, cell) in col.iter_mut().enumerate() {
                *cell = self.cols[r][c];
            }
        }
        Mat4 { cols: result }
    }

    pub fn determinant(&self) -> f32 {
        let a = self.to_cols_array();
        let b00 = a[0] * a[5] - a[1] * a[4];
        let b01 = a[0] * a[6] - a[2] * a[4];
        let b02 = a[0] * a[7] - a[3] * a[4];
        let b03 = a[1] * a[6] - a[2] * a[5];
        let b04 = a[1] * a[7] - a[3] * a[5];
        let b05 = a[2] * a[7] - a[3] * a[6];
        let b06 = a[8] * a[13] - a[9] * a[12];
        let b07 = a[8] * a[14] - a[10] * a[12];
        let b08 = a[8] * a[15] - a[11] * a[12];
        let b09 = a[9] * a[14] - a[10] * a[13];
        let b10 = a[9] * a[15] - a[11] * a[13];
        let b11 = a[10] * a[15] - a[11] * a[14];
        b00 * b11 - b01 * b10 + b02 * b09 + b03 * b08 - b04 * b07 + b05 * b06
    }

    /// Inverse, or `None` if the matrix is singular
    pub fn try_inverse(&self) -> Option<Mat4> {
        let a = self.to_cols_array();
        let (a00, a01, a02, a03) = (a[0], a[1], a[2], a[3]);
        let (a10, a11, a12, a13) = (a[4], a[5], a[6], a[7]);
        let (a20, a21, a22, a23) = (a[8], a[9], a[10], a[11]);
        let (a30, a31, a32, a33) = (a[12], a[13], a[14], a[15]);

        let b00 = a00 * a11 - a01 * a10;
        let b01 = a00 * a12 - a02 * a10;
        let b02 = a00 * a13 - a03 * a10;
        let b03 = a01 * a12 - a02 * a11;
        let b04 = a01 * a13 - a03 * a11;
        let b05 = a02 * a13 - a03 * a12;
        let b06 = a20 * a31 - a21 * a30;
        let b07 = a20 * a32 - a22 * a30;
        let b08 = a20 * a33 - a23 * a30;
        let b09 = a21 * a32 - a22 * a31;
        let b10 = a21 * a33 - a23 * a31;
        let b11 = a22 * a33 - a23 * a32;

        let det = b00 * b11 - b01 * b10 + b02 * b09 + b03 * b08 - b04 * b07 + b05 * b06;
        if det.abs() < f32::EPSILON * f32::EPSILON {
            return None;
        }
        let inv = 1.0 / det;

        Some(Self::from_cols_array(&[
            (a11 * b11 - a12 * b10 + a13 * b09) * inv,
            (a02 * b10 - a01 * b11 - a03 * b09) * inv,
            (a31 * b05 - a32 * b04 + a33 * b03) * inv,
            (a22 * b04 - a21 * b05 - a23 * b03) * inv,
            (a12 * b08 - a10 * b11 - a13 * b07) * inv,
            (a00 * b11 - a02 * b08 + a03 * b07) * inv,
            (a32 * b02 - a30 * b05 - a33 * b01) * inv,
            (a20 * b05 - a22 * b02 + a23 * b01) * inv,
            (a10 * b10 - a11 * b08 + a13 * b06) * inv,
            (a01 * b08 - a00 * b10 - a03 * b06) * inv,
            (a30 * b04 - a31 * b02 + a33 * b00) * inv,
            (a21 * b02 - a20 * b04 - a23 * b00) * inv,
            (a11 * b07 - a10 * b09 - a12 * b06) * inv,
            (a00 * b09 - a01 * b07 + a02 * b06) * inv,
            (a31 * b01 - a30 * b03 - a32 * b00) * inv,
            (a20 * b03 - a21 * b01 + a22 * b00) * inv,
        ]))
    }

    /// Inverse, falling back to the identity for singular matrices
    pub fn inverse(&self) -> Mat4 {
        self.try_inverse().unwrap_or(Mat4::IDENTITY)
    }

    /// Invert in place; returns false and leaves `self` untouched if singular
    pub fn invert(&mut self) -> bool {
        match self.try_inverse() {
            Some(inv) => {
                *self = inv;
                true
            }
            None => false,
        }
    }

    /// Inverse-transpose, used to transform normals
    pub fn normal_matrix(&self) -> Mat4 {
        self.inverse().transpose()
    }

    /// Transform a point (w = 1)
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let v = self.transform_vec4(Vec4::new(p.x, p.y, p.z, 1.0));
        if (v.w - 1.0).abs() > ZERO_TOLERANCE && v.w.abs() > ZERO_TOLERANCE {
            Vec3::new(v.x / v.w, v.y / v.w, v.z / v.w)
        } else {
            v.xyz()
        }
    }

    /// Transform a direction (w = 0, ignores translation)
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        self.transform_vec4(Vec4::new(v.x, v.y, v.z, 0.0)).xyz()
    }

    pub fn transform_vec4(&self, v: Vec4) -> Vec4 {
        let c = &self.cols;
        Vec4::new(
            c[0][0] * v.x + c[1][0] * v.y + c[2][0] * v.z + c[3][0] * v.w,
            c[0][1] * v.x + c[1][1] * v.y + c[2][1] * v.z + c[3][1] * v.w,
            c[0][2] * v.x + c[1][2] * v.y + c[2][2] * v.z + c[3][2] * v.w,
            c[0][3] * v.x + c[1][3] * v.y + c[2][3] * v.z + c[3][3] * v.w,
        )
    }

    /// Create a look-at view matrix (right-handed)
    pub fn look_at_rh(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let f = (eye - target).normalize();
        let s = up.cross(f).normalize();
        let u = f.cross(s);

        Mat4 {
            cols: [
                [s.x, u.x, f.x, 0.0],
                [s.y, u.y, f.y, 0.0],
                [s.z, u.z, f.z, 0.0],
                [-s.dot(eye), -u.dot(eye), -f.dot(eye), 1.0],
            ],
        }
    }

    /// Create a perspective projection matrix (right-handed, depth 0 to 1)
    ///
    /// `fov_y` is in radians.
    pub fn perspective_rh(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let f = 1.0 / (fov_y * 0.5).tan();
        let range_inv = 1.0 / (near - far);

        Mat4 {
            cols: [
                [f / aspect, 0.0, 0.0, 0.0],
                [0.0, f, 0.0, 0.0],
                [0.0, 0.0, far * range_inv, -1.0],
                [0.0, 0.0, near * far * range_inv, 0.0],
            ],
        }
    }

    /// Create an orthographic projection matrix (right-handed, depth 0 to 1)
    pub fn orthographic_rh(
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) -> Mat4 {
        let rml = right - left;
        let tmb = top - bottom;
        let range_inv = 1.0 / (near - far);

        Mat4 {
            cols: [
                [2.0 / rml, 0.0, 0.0, 0.0],
                [0.0, 2.0 / tmb, 0.0, 0.0],
                [0.0, 0.0, range_inv, 0.0],
                [
                    -(right + left) / rml,
                    -(top + bottom) / tmb,
                    near * range_inv,
                    1.0,
                ],
            ],
        }
    }

    /// Convert to column-major array
    pub fn to_cols_array(&self) -> [f32; 16] {
        bytemuck::cast(self.cols)
    }

    /// Create from column-major array
    pub fn from_cols_array(arr: &[f32; 16]) -> Mat4 {
        Mat4 {
            cols: bytemuck::cast(*arr),
        }
    }

    pub fn approx_eq(&self, other: &Mat4, epsilon: f32) -> bool {
        self.to_cols_array()
            .iter()
            .zip(other.to_cols_array().iter())
            .all(|(a, b)| (a - b).abs() <= epsilon)
    }
}

impl Mul for Mat4 {
    type Output = Mat4;

    fn mul(self, rhs: Mat4) -> Mat4 {
        Mat4::multiply(&self, &rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiply_translation() {
        let a = Mat4::translation(1.0, 2.0, 3.0);
        let b = Mat4::translation(4.0, 5.0, 6.0);
        assert_eq!((a * b).get_translation(), Vec3::new(5.0, 7.0, 9.0));
    }

    #[test]
    fn test_inverse() {
        let m = Mat4::compose(
            Vec3::new(1.0, -2.0, 3.0),
            Quat::from_euler_degrees(20.0, 30.0, 40.0),
            Vec3::new(2.0, 0.5, 1.5),
        );
        let product = m * m.inverse();
        assert!(product.approx_eq(&Mat4::IDENTITY, 1e-5));

        let mut singular = Mat4::scale(0.0, 1.0, 1.0);
        assert!(!singular.invert());
        assert_eq!(singular, Mat4::scale(0.0, 1.0, 1.0));
    }

    #[test]
    fn test_compose_decompose() {
        let pos = Vec3::new(3.0, 4.0, 5.0);
        let rot = Quat::from_euler_degrees(10.0, -35.0, 60.0);
        let scale = Vec3::new(1.0, 2.0, 3.0);
        let (p, r, s) = Mat4::compose(pos, rot, scale).decompose();
        assert!(p.approx_eq(pos, 1e-5));
        assert!(r.approx_eq_rotation(rot, 1e-5));
        assert!(s.approx_eq(scale, 1e-5));
    }

    #[test]
    fn test_transform_point() {
        let m = Mat4::compose(
            Vec3::new(0.0, 1.0, 0.0),
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            Vec3::ONE,
        );
        let p = m.transform_point(Vec3::RIGHT);
        assert!(p.approx_eq(Vec3::new(0.0, 1.0, -1.0), 1e-5));
        let v = m.transform_vector(Vec3::RIGHT);
        assert!(v.approx_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));
    }

    #[test]
    fn test_look_at_inverse_is_world() {
        let eye = Vec3::new(0.0, 0.0, 10.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::UP);
        assert!(view.inverse().get_translation().approx_eq(eye, 1e-5));
    }

    #[test]
    fn test_cols_array_round_trip() {
        let m = Mat4::translation(7.0, 8.0, 9.0);
        let arr = m.to_cols_array();
        assert_eq!(arr[12], 7.0);
        assert_eq!(Mat4::from_cols_array(&arr), m);
    }
}
