//! Materials
//!
//! A [`Material`] pairs a [`Shader`] with the Material-group shader data that
//! parameterizes it, plus the render queue and fixed-function state used when
//! drawing with it.

mod unlit;

pub use unlit::UnlitMaterial;

use prism_gpu::RenderState;
use slotmap::new_key_type;
use std::sync::Arc;

use crate::shader::{Shader, ShaderData, ShaderDataGroup};

new_key_type! {
    /// Handle to a material stored in a scene
    pub struct MaterialId;
}

/// Draw order bucket
///
/// Queues render in ascending order. Opaque and alpha-tested geometry is
/// sorted front to back, transparent geometry back to front.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderQueueType {
    #[default]
    Opaque = 1000,
    AlphaTest = 2000,
    Transparent = 3000,
}

impl RenderQueueType {
    pub fn value(self) -> u32 {
        self as u32
    }

    /// Whether elements of this queue are drawn farthest first
    pub fn sorts_back_to_front(self) -> bool {
        matches!(self, RenderQueueType::Transparent)
    }
}

/// Shader plus the values it is drawn with
#[derive(Debug)]
pub struct Material {
    name: String,
    shader: Arc<Shader>,
    shader_data: ShaderData,
    render_queue_type: RenderQueueType,
    pub render_state: RenderState,
}

impl Material {
    pub fn new(shader: Arc<Shader>) -> Self {
        Self {
            name: shader.name().to_string(),
            shader,
            shader_data: ShaderData::new(ShaderDataGroup::Material),
            render_queue_type: RenderQueueType::Opaque,
            render_state: RenderState::opaque(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shader(&self) -> &Arc<Shader> {
        &self.shader
    }

    pub fn shader_data(&self) -> &ShaderData {
        &self.shader_data
    }

    pub fn shader_data_mut(&mut self) -> &mut ShaderData {
        &mut self.shader_data
    }

    pub fn render_queue_type(&self) -> RenderQueueType {
        self.render_queue_type
    }

    /// Change the queue; switching into or out of the transparent queue
    /// also swaps the render state for the matching preset
    pub fn set_render_queue_type(&mut self, queue: RenderQueueType) {
        if queue == self.render_queue_type {
            return;
        }
        if queue.sorts_back_to_front() {
            self.render_state = RenderState::transparent();
        } else if self.render_queue_type.sorts_back_to_front() {
            self.render_state = RenderState::opaque();
        }
        self.render_queue_type = queue;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_ordering() {
        assert!(RenderQueueType::Opaque < RenderQueueType::AlphaTest);
        assert!(RenderQueueType::AlphaTest < RenderQueueType::Transparent);
        assert_eq!(RenderQueueType::Transparent.value(), 3000);
    }

    #[test]
    fn test_transparent_queue_swaps_render_state() {
        let mut material = Material::new(Shader::create_default());
        assert_eq!(material.render_state, RenderState::opaque());

        material.set_render_queue_type(RenderQueueType::Transparent);
        assert_eq!(material.render_state, RenderState::transparent());

        material.set_render_queue_type(RenderQueueType::AlphaTest);
        assert_eq!(material.render_state, RenderState::opaque());
    }
}
