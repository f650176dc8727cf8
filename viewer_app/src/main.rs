//! Animated model viewer
//!
//! Opens a window, uploads the configured model and texture, then renders
//! the model spinning about the vertical axis until the window closes.
//! Fatal renderer errors log a diagnostic and terminate with a nonzero exit
//! code; a resized or out-of-date surface only costs a skipped frame.

use std::time::Instant;

use glfw::{Action, Key, WindowEvent};
use nalgebra::{Matrix4, Point3, Vector3};

use render_engine::assets::{ImageData, MeshData};
use render_engine::config::ViewerConfig;
use render_engine::render::{UniformBufferObject, VulkanRenderer, WindowHandle};

const CONFIG_PATH: &str = "viewer.toml";

/// Fallback texture when the configured file is missing
const FALLBACK_COLOR: [u8; 4] = [200, 200, 200, 255];

fn main() {
    env_logger::init();

    if let Err(error) = run() {
        log::error!("fatal: {}", error);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ViewerConfig::load_or_default(CONFIG_PATH);

    let mut window = WindowHandle::new(
        config.window_width,
        config.window_height,
        &config.app_name,
    );

    let mesh = MeshData::from_obj_file(&config.model_path)?;
    let image = match ImageData::from_file(&config.texture_path) {
        Ok(image) => image,
        Err(error) => {
            log::warn!(
                "Could not load texture {:?} ({}), using solid color",
                config.texture_path,
                error
            );
            ImageData::solid_color(1, 1, FALLBACK_COLOR)
        }
    };

    let vertex_spirv = std::fs::read(&config.vertex_shader_path).map_err(|e| {
        format!(
            "failed to read vertex shader {:?}: {}",
            config.vertex_shader_path, e
        )
    })?;
    let fragment_spirv = std::fs::read(&config.fragment_shader_path).map_err(|e| {
        format!(
            "failed to read fragment shader {:?}: {}",
            config.fragment_shader_path, e
        )
    })?;

    let mut renderer = VulkanRenderer::new(
        &mut window,
        &config.renderer_config(),
        &mesh,
        &image,
        &vertex_spirv,
        &fragment_spirv,
    )?;

    log::info!("Entering frame loop");
    let start = Instant::now();

    while !window.should_close() {
        window.poll_events();

        let mut resized = false;
        let events: Vec<_> = window.event_iter().collect();
        for (_, event) in events {
            match event {
                WindowEvent::FramebufferSize(_, _) => resized = true,
                WindowEvent::Key(Key::Escape, _, Action::Press, _) => {
                    window.set_should_close(true);
                }
                _ => {}
            }
        }

        // a minimized window has a 0x0 framebuffer; sleep on events instead
        // of spinning
        if window.is_minimized() {
            window.wait_events();
            continue;
        }

        if resized {
            renderer.on_resize(&window)?;
        }

        let ubo = animate(start.elapsed().as_secs_f32(), renderer.aspect_ratio());
        renderer.draw_frame(&ubo)?;
    }

    renderer.wait_idle();
    log::info!("Shutting down");
    Ok(())
}

/// Spin the model about +Z at 90 degrees per second under a fixed camera
fn animate(elapsed_seconds: f32, aspect_ratio: f32) -> UniformBufferObject {
    let angle = elapsed_seconds * 90.0_f32.to_radians();
    let model = Matrix4::from_axis_angle(&Vector3::z_axis(), angle);

    let view = Matrix4::look_at_rh(
        &Point3::new(2.0, 2.0, 2.0),
        &Point3::origin(),
        &Vector3::z(),
    );

    let mut projection = Matrix4::new_perspective(
        aspect_ratio,
        45.0_f32.to_radians(),
        0.1,
        10.0,
    );
    // nalgebra produces OpenGL clip space; Vulkan's Y axis points down
    projection[(1, 1)] *= -1.0;

    UniformBufferObject::from_matrices(&model, &view, &projection)
}
