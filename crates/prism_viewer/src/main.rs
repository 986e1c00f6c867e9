//! Prism Viewer
//!
//! Builds a grid of cubes and renders it on the headless device, then reports
//! how many GPU calls the frames took.

use anyhow::{Context, Result};
use clap::Parser;
use prism_3d::prelude::*;
use prism_gpu::{HeadlessDevice, RenderDevice, TextureDesc, TextureFormat};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "prism-viewer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Render a test scene on the headless Prism device", long_about = None)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frames to render
    #[arg(short, long, default_value = "60")]
    frames: u64,

    /// Cubes in the grid
    #[arg(short, long, default_value = "64")]
    entities: usize,

    /// Spin the cubes every frame
    #[arg(long)]
    animate: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let mut device = HeadlessDevice::new(
        config.engine.viewport_width,
        config.engine.viewport_height,
    );
    let checker = device.create_texture(&TextureDesc::new_2d(64, 64, TextureFormat::Rgba8Unorm))?;

    let mut engine = Engine::new(device, config)?;
    let cubes = build_scene(engine.scene_mut(), cli.entities, checker)?;
    info!(cubes = cubes.len(), frames = cli.frames, "scene ready");

    let mut total = FrameStats::default();
    for _ in 0..cli.frames {
        if cli.animate {
            let delta = engine.time().delta_time();
            for &cube in &cubes {
                if let Some(mut transform) = engine.scene_mut().transform_mut(cube) {
                    transform.rotate_xyz(0.0, 90.0 * delta, 0.0, true);
                }
            }
        }
        total += engine.update()?;
    }

    let calls = engine.device().stats();
    println!("frames:           {}", total.frames);
    println!("draw calls:       {}", total.draw_calls);
    println!("program switches: {}", total.program_switches);
    println!("skipped elements: {}", total.skipped);
    println!("uniform uploads:  {}", calls.uniform_uploads);
    println!("texture binds:    {}", calls.texture_binds);
    println!("gpu calls:        {}", calls.total);

    engine.shutdown();
    Ok(())
}

/// Lay out `count` cubes on a square grid, alternating plain and textured
/// materials, with every fourth cube transparent
fn build_scene(
    scene: &mut Scene,
    count: usize,
    texture: prism_gpu::TextureHandle,
) -> Result<Vec<Entity>> {
    let mesh = scene.add_mesh(Mesh::cuboid(1.0, 1.0, 1.0));
    let floor_mesh = scene.add_mesh(Mesh::plane(40.0, 40.0));

    let mut plain = UnlitMaterial::new()?;
    plain.set_base_color(Color::rgb(0.8, 0.3, 0.2))?;
    let plain = scene.add_material(plain);

    let mut textured = UnlitMaterial::new()?;
    textured.set_base_texture(Some(texture))?;
    let textured = scene.add_material(textured);

    let mut glass = UnlitMaterial::new()?;
    glass.set_base_color(Color::rgba(0.4, 0.6, 1.0, 0.5))?;
    glass.set_render_queue_type(RenderQueueType::Transparent);
    let glass = scene.add_material(glass);

    let floor = scene.create_entity("floor");
    scene
        .transform_mut(floor)
        .context("floor entity missing")?
        .set_position_xyz(0.0, -1.0, 0.0);
    scene.add_mesh_renderer(floor, floor_mesh, plain)?;

    let grid = scene.create_entity("grid");
    let side = (count as f32).sqrt().ceil().max(1.0) as usize;
    let offset = (side as f32 - 1.0) * 0.5 * 2.0;

    let mut cubes = Vec::with_capacity(count);
    for i in 0..count {
        let cube = scene.create_child(grid, format!("cube{i}"))?;
        let (row, col) = (i / side, i % side);
        scene
            .transform_mut(cube)
            .context("cube entity missing")?
            .set_position_xyz(col as f32 * 2.0 - offset, 0.0, row as f32 * -2.0);

        let material = match i % 4 {
            3 => glass,
            1 => textured,
            _ => plain,
        };
        scene.add_mesh_renderer(cube, mesh, material)?;
        cubes.push(cube);
    }
    Ok(cubes)
}
