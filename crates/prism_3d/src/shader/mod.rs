//! Shader state
//!
//! Values flow from [`ShaderData`] owned by the scene, cameras, renderers and
//! materials into [`ShaderProgram`] uniforms. Every uniform is filed into a block
//! matching the update frequency of the data that feeds it, so the render loop
//! can skip whole blocks whose source did not change.

mod data;
mod macros;
mod preprocess;
mod program;
mod property;
mod registry;
mod uniform;
mod value;

pub use data::ShaderData;
pub use macros::{ShaderMacro, ShaderMacroCollection};
pub use preprocess::preprocess;
pub use program::{ProgramState, ShaderProgram};
pub use property::{IntoShaderProperty, ShaderDataGroup, ShaderProperty};
pub use registry::{Shader, ShaderProgramPool, UNLIT_SHADER};
pub use uniform::{ShaderUniform, ShaderUniformBlock, UniformBlockKind, UploadKind};
pub use value::ShaderValue;
