//! Math primitives for 3D graphics
//!
//! All matrices are column-major and right-handed. Angles handed to public APIs are
//! in degrees unless the function name says otherwise.

mod color;
mod mat4;
mod quat;
mod vector;

pub use color::Color;
pub use mat4::Mat4;
pub use quat::Quat;
pub use vector::{Vec2, Vec3, Vec4};

/// Lengths and determinants below this are treated as zero.
pub const ZERO_TOLERANCE: f32 = 1e-6;

/// Compare two floats with an absolute tolerance.
#[inline]
pub fn approx_eq(a: f32, b: f32, epsilon: f32) -> bool {
    (a - b).abs() <= epsilon
}
