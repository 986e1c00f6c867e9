//! Prism Core
//!
//! Foundation types shared by every Prism crate:
//!
//! - **Math**: `Vec2`, `Vec3`, `Vec4`, `Quat`, `Mat4` and `Color`, plain `#[repr(C)]`
//!   value types that can be uploaded to the GPU as-is
//! - **Update flags**: a small observer mechanism used to tell caches owned by one
//!   subsystem that state owned by another subsystem changed
//!
//! Everything here is single-threaded; update flags are `!Send`.

pub mod math;
pub mod update_flag;

pub use math::{Color, Mat4, Quat, Vec2, Vec3, Vec4, ZERO_TOLERANCE};
pub use update_flag::{
    BoolUpdateFlag, FlagKey, ListenerUpdateFlag, UpdateFlag, UpdateFlagHandle, UpdateFlagManager,
};
