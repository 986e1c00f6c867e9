//! Engine and frame loop
//!
//! Each [`Engine::update`] runs one frame:
//!
//! 1. advance the clock and write per-frame scene values
//! 2. upload meshes whose CPU data changed
//! 3. render the active camera, which fixes the view for the frame
//! 4. update every drawable mesh renderer and queue it
//! 5. sort the queue and draw each element
//!
//! Per element, uniform blocks are uploaded according to how often their data
//! changes. Every program remembers the frame, camera, renderer and material it
//! last uploaded; a block is re-sent only when its owner differs from that
//! marker. A program that was not current before the element still gets its
//! textures rebound, since texture units are shared between programs.

use prism_gpu::RenderDevice;
use rustc_hash::FxHashSet;
use std::ops::AddAssign;
use tracing::{debug, info, trace, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::render::{RenderElement, RenderQueue};
use crate::scene::{Camera, Entity, Scene};
use crate::shader::{
    ShaderData, ShaderMacroCollection, ShaderProgram, ShaderProgramPool, UniformBlockKind,
};
use crate::time::Time;

/// Counters for one or more frames
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames: u64,
    /// Render elements drawn
    pub elements: u32,
    pub draw_calls: u32,
    pub program_switches: u32,
    /// Elements skipped because their program failed to build
    pub skipped: u32,
}

impl AddAssign for FrameStats {
    fn add_assign(&mut self, other: Self) {
        self.frames += other.frames;
        self.elements += other.elements;
        self.draw_calls += other.draw_calls;
        self.program_switches += other.program_switches;
        self.skipped += other.skipped;
    }
}

/// Owns a device and a scene and renders the scene every frame
pub struct Engine<D: RenderDevice> {
    device: D,
    config: EngineConfig,
    scene: Scene,
    time: Time,
    programs: ShaderProgramPool,
    queue: RenderQueue,
    reported_invalid: FxHashSet<u32>,
}

impl<D: RenderDevice> Engine<D> {
    /// Create an engine with a main camera placed from the config
    pub fn new(mut device: D, config: EngineConfig) -> Result<Self> {
        if device.is_context_lost() {
            return Err(Error::ContextUnavailable(
                "render device reports a lost context".to_string(),
            ));
        }

        let mut scene = Scene::from_config(&config.scene)?;
        let camera = scene.create_entity("Main Camera");
        if let Some(mut transform) = scene.transform_mut(camera) {
            transform.set_position(config.camera.position());
            transform.look_at(config.camera.target(), prism_core::Vec3::UP);
        }
        scene.add_camera(camera, Camera::from_config(&config.camera))?;

        let render = &config.engine;
        device.viewport(0, 0, render.viewport_width, render.viewport_height);
        info!(
            width = render.viewport_width,
            height = render.viewport_height,
            scene = %scene.name(),
            "engine initialized"
        );

        Ok(Self {
            device,
            time: Time::from_config(&config.engine),
            config,
            scene,
            programs: ShaderProgramPool::new(),
            queue: RenderQueue::new(),
            reported_invalid: FxHashSet::default(),
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn time(&self) -> &Time {
        &self.time
    }

    pub fn time_mut(&mut self) -> &mut Time {
        &mut self.time
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn programs(&self) -> &ShaderProgramPool {
        &self.programs
    }

    /// Run one frame
    pub fn update(&mut self) -> Result<FrameStats> {
        if self.device.is_context_lost() {
            return Err(Error::ContextUnavailable(
                "render device lost its context".to_string(),
            ));
        }

        self.time.tick();
        let frame = self.time.frame_count();
        self.scene.update_shader_data(self.time.elapsed())?;

        for mesh in self.scene.meshes_mut() {
            if mesh.needs_upload() {
                mesh.upload_data(&mut self.device, false)?;
            }
        }

        self.device.clear(self.config.engine.clear_color());
        let mut stats = FrameStats {
            frames: 1,
            ..Default::default()
        };

        let viewport = self.device.viewport_size();
        let Some((camera, matrices, camera_position)) = self.scene.render_camera(viewport)? else {
            trace!(frame, "no active camera");
            return Ok(stats);
        };

        let mut queue = std::mem::take(&mut self.queue);
        queue.clear();
        self.scene
            .collect_render_elements(&matrices, camera_position, &mut queue)?;
        queue.sort();

        for element in queue.elements() {
            self.render_element(element, camera, frame, &mut stats);
        }
        self.queue = queue;

        trace!(
            frame,
            elements = stats.elements,
            draw_calls = stats.draw_calls,
            program_switches = stats.program_switches,
            "frame rendered"
        );
        Ok(stats)
    }

    /// Run `frames` frames and return the summed stats
    pub fn run(&mut self, frames: u64) -> Result<FrameStats> {
        let mut total = FrameStats::default();
        for _ in 0..frames {
            total += self.update()?;
        }
        debug!(
            frames = total.frames,
            draw_calls = total.draw_calls,
            program_switches = total.program_switches,
            "run finished"
        );
        Ok(total)
    }

    fn render_element(
        &mut self,
        element: &RenderElement,
        camera: Entity,
        frame: u64,
        stats: &mut FrameStats,
    ) {
        let Self {
            device,
            scene,
            programs,
            reported_invalid,
            ..
        } = self;
        let device: &mut dyn RenderDevice = device;

        let (Some(material), Some(mesh), Some(renderer), Some(camera_component)) = (
            scene.material(element.material),
            scene.mesh(element.mesh),
            scene.mesh_renderer(element.entity),
            scene.camera(camera),
        ) else {
            return;
        };
        let scene_data = scene.shader_data();
        let camera_data = camera_component.shader_data();
        let renderer_data = renderer.shader_data();
        let material_data = material.shader_data();

        let mut macros =
            ShaderMacroCollection::union(scene_data.macro_collection(), camera_data.macro_collection());
        macros.union_with(renderer_data.macro_collection());
        macros.union_with(material_data.macro_collection());

        let previous = device.current_program();
        let program = programs.get_program(device, material.shader(), &macros);
        if !program.is_valid() {
            if reported_invalid.insert(program.id()) {
                warn!(
                    shader = %material.shader().name(),
                    program = program.id(),
                    "skipping draws with invalid shader program"
                );
            }
            stats.skipped += 1;
            return;
        }

        let switched = previous != program.handle();
        program.bind(device);
        if switched {
            stats.program_switches += 1;
        }
        program.group_other_uniforms();

        let mut markers = program.markers;
        if markers.frame != Some(frame) {
            program.upload_all(device, UniformBlockKind::Scene, scene_data);
            program.upload_all(device, UniformBlockKind::Camera, camera_data);
            program.upload_all(device, UniformBlockKind::Renderer, renderer_data);
            program.upload_all(device, UniformBlockKind::Material, material_data);
            markers.frame = Some(frame);
            markers.camera = Some(camera);
            markers.renderer = Some(element.entity);
            markers.material = Some(element.material);
        } else {
            if switched {
                program.upload_textures(device, UniformBlockKind::Scene, scene_data);
            }
            upload_if_changed(
                program,
                device,
                UniformBlockKind::Camera,
                camera_data,
                &mut markers.camera,
                camera,
                switched,
            );
            upload_if_changed(
                program,
                device,
                UniformBlockKind::Renderer,
                renderer_data,
                &mut markers.renderer,
                element.entity,
                switched,
            );
            upload_if_changed(
                program,
                device,
                UniformBlockKind::Material,
                material_data,
                &mut markers.material,
                element.material,
                switched,
            );
        }
        program.markers = markers;

        device.apply_render_state(&material.render_state);
        stats.draw_calls += mesh.draw(device, program);
        stats.elements += 1;
    }

    /// Delete every GPU object the engine created
    pub fn shutdown(&mut self) {
        self.programs.destroy(&mut self.device);
        for mesh in self.scene.meshes_mut() {
            mesh.destroy(&mut self.device);
        }
        self.reported_invalid.clear();
        info!("engine shut down");
    }
}

/// Re-send a block whose owner changed, or only its textures after a program switch
fn upload_if_changed<K: PartialEq>(
    program: &mut ShaderProgram,
    device: &mut dyn RenderDevice,
    kind: UniformBlockKind,
    data: &ShaderData,
    last: &mut Option<K>,
    current: K,
    switched: bool,
) {
    if last.as_ref() != Some(&current) {
        program.upload_all(device, kind, data);
        *last = Some(current);
    } else if switched {
        program.upload_textures(device, kind, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::{Material, RenderQueueType, UnlitMaterial};
    use crate::mesh::Mesh;
    use crate::shader::Shader;
    use prism_core::{Color, Vec3};
    use prism_gpu::{GpuCall, HeadlessDevice};

    const PROBE_VERTEX: &str = r#"
struct VertexInput {
    @location(0) POSITION: vec3<f32>,
}

@group(0) @binding(0) var<uniform> u_viewMat: mat4x4<f32>;
@group(0) @binding(1) var<uniform> u_MVPMat: mat4x4<f32>;

@vertex
fn vs_main(v: VertexInput) -> @builtin(position) vec4<f32> {
    return u_MVPMat * u_viewMat * vec4<f32>(v.POSITION, 1.0);
}
"#;

    const PROBE_FRAGMENT: &str = r#"
@group(1) @binding(0) var<uniform> u_baseColor: vec4<f32>;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return u_baseColor;
}
"#;

    fn engine() -> Engine<HeadlessDevice> {
        let config = EngineConfig::from_toml(
            r#"
            [engine]
            fixed_time_step = 0.016
            "#,
        )
        .unwrap();
        Engine::new(HeadlessDevice::new(800, 600), config).unwrap()
    }

    fn add_cubes(engine: &mut Engine<HeadlessDevice>, material: Material, count: usize) {
        let scene = engine.scene_mut();
        let mesh = scene.add_mesh(Mesh::cuboid(1.0, 1.0, 1.0));
        let material = scene.add_material(material);
        for i in 0..count {
            let e = scene.create_entity(format!("cube{i}"));
            scene
                .transform_mut(e)
                .unwrap()
                .set_position_xyz(i as f32 * 2.0, 0.0, 0.0);
            scene.add_mesh_renderer(e, mesh, material).unwrap();
        }
    }

    fn matrix_uploads(device: &HeadlessDevice) -> usize {
        device.count_calls(|c| matches!(c, GpuCall::UniformMatrix4fv { .. }))
    }

    #[test]
    fn test_context_lost_is_rejected() {
        let mut device = HeadlessDevice::default();
        device.set_context_lost(true);
        let result = Engine::new(device, EngineConfig::default());
        assert!(matches!(result, Err(Error::ContextUnavailable(_))));
    }

    #[test]
    fn test_main_camera_from_config() {
        let engine = engine();
        let camera = engine.scene().active_camera().unwrap();
        let transform = engine.scene().transform(camera).unwrap();
        assert_eq!(transform.world_position(), Vec3::new(0.0, 0.0, 10.0));
        assert!(transform
            .world_forward()
            .approx_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));
    }

    #[test]
    fn test_one_draw_per_renderer_and_camera_uploaded_once() {
        let mut engine = engine();
        let shader = Shader::create("engine_camera_probe", PROBE_VERTEX, PROBE_FRAGMENT).unwrap();
        let mut material = Material::new(shader);
        material
            .shader_data_mut()
            .set_color("u_baseColor", Color::RED)
            .unwrap();
        add_cubes(&mut engine, material, 3);
        engine.device_mut().clear_calls();

        let stats = engine.update().unwrap();
        assert_eq!(stats.elements, 3);
        assert_eq!(stats.draw_calls, 3);
        assert_eq!(stats.program_switches, 1);
        assert_eq!(stats.skipped, 0);

        let device = engine.device();
        assert_eq!(device.stats().draw_calls, 3);
        // One view matrix for the frame plus one MVP per renderer
        assert_eq!(matrix_uploads(device), 4);
        assert_eq!(device.count_calls(|c| matches!(c, GpuCall::Uniform4f(..))), 1);

        // Next frame re-sends the per-frame blocks; the cached color is skipped
        engine.device_mut().clear_calls();
        engine.update().unwrap();
        assert_eq!(matrix_uploads(engine.device()), 4);
        assert_eq!(
            engine.device().count_calls(|c| matches!(c, GpuCall::Uniform4f(..))),
            0
        );
        assert_eq!(engine.device().stats().program_switches, 0);
    }

    #[test]
    fn test_invalid_program_is_skipped() {
        let mut engine = engine();
        let shader = Shader::create("engine_broken", "fn broken( {", PROBE_FRAGMENT).unwrap();
        add_cubes(&mut engine, Material::new(shader), 2);

        let stats = engine.run(2).unwrap();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.skipped, 4);
        assert_eq!(stats.draw_calls, 0);
        assert_eq!(engine.programs().len(), 1);
    }

    #[test]
    fn test_unlit_cubes_render() {
        let mut engine = engine();
        let mut material = UnlitMaterial::new().unwrap();
        material.set_base_color(Color::GREEN).unwrap();
        add_cubes(&mut engine, material.into(), 4);

        let stats = engine.run(3).unwrap();
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.draw_calls, 12);
        assert_eq!(stats.skipped, 0);

        let indexed = engine.device().count_calls(|c| {
            matches!(c, GpuCall::DrawElements { count: 36, .. })
        });
        assert_eq!(indexed, 12);
    }

    #[test]
    fn test_transparent_drawn_after_opaque() {
        let mut engine = engine();
        let opaque = UnlitMaterial::new().unwrap();
        let mut transparent = UnlitMaterial::new().unwrap();
        transparent.set_render_queue_type(RenderQueueType::Transparent);
        add_cubes(&mut engine, transparent.into(), 1);
        add_cubes(&mut engine, opaque.into(), 1);
        engine.device_mut().clear_calls();

        engine.update().unwrap();
        let states: Vec<bool> = engine
            .device()
            .calls()
            .iter()
            .filter_map(|c| match c {
                GpuCall::ApplyRenderState(state) => Some(state.blend.is_some()),
                _ => None,
            })
            .collect();
        assert_eq!(states, vec![false, true]);
    }

    #[test]
    fn test_no_camera_draws_nothing() {
        let mut engine = engine();
        add_cubes(&mut engine, UnlitMaterial::new().unwrap().into(), 2);
        let camera = engine.scene().active_camera().unwrap();
        engine.scene_mut().remove_camera(camera);

        let stats = engine.update().unwrap();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.draw_calls, 0);
    }

    #[test]
    fn test_lost_context_stops_update() {
        let mut engine = engine();
        engine.device_mut().set_context_lost(true);
        assert!(matches!(engine.update(), Err(Error::ContextUnavailable(_))));
    }

    #[test]
    fn test_shutdown_releases_gpu_objects() {
        let mut engine = engine();
        add_cubes(&mut engine, UnlitMaterial::new().unwrap().into(), 1);
        engine.update().unwrap();
        assert!(engine.device().program_count() > 0);

        engine.shutdown();
        assert_eq!(engine.device().program_count(), 0);
        assert_eq!(engine.device().buffer_count(), 0);
    }
}
