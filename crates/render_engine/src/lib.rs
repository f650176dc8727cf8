//! # Render Engine
//!
//! Vulkan rendering core for the animated model viewer.
//!
//! The crate is organized around the resources a single-pass, textured-model
//! renderer actually needs:
//!
//! - **`render::vulkan`**: device and queue selection, typed buffer/image
//!   allocation, staged uploads, the image layout state machine, swapchain
//!   lifecycle, and the double-buffered frame synchronization protocol.
//! - **`render::window`**: GLFW window wrapper providing the drawable
//!   surface, framebuffer size, and resize/close signals.
//! - **`assets`**: decoders that turn model and image files into the flat
//!   vertex/index and RGBA8 pixel arrays the GPU layer consumes.
//! - **`config`**: viewer configuration with runtime-selectable validation
//!   layers and frame-in-flight count.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use render_engine::config::ViewerConfig;
//! use render_engine::assets::{ImageData, MeshData};
//! use render_engine::render::{VulkanRenderer, WindowHandle};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ViewerConfig::default();
//!     let mut window = WindowHandle::new(800, 600, "viewer");
//!     let mesh = MeshData::from_obj_file(&config.model_path)?;
//!     let image = ImageData::from_file(&config.texture_path)?;
//!     let vert = std::fs::read(&config.vertex_shader_path)?;
//!     let frag = std::fs::read(&config.fragment_shader_path)?;
//!     let renderer = VulkanRenderer::new(
//!         &mut window, &config.renderer_config(), &mesh, &image, &vert, &frag,
//!     )?;
//!     renderer.wait_idle();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod assets;
pub mod config;
pub mod render;
