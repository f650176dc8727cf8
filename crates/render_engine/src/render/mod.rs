//! Rendering subsystem
//!
//! `vulkan` holds the GPU resource and synchronization layer, `window` the
//! GLFW collaborator, `primitives` the vertex and uniform data shared
//! between the CPU and the shaders.

pub mod primitives;
pub mod vulkan;
pub mod window;

pub use primitives::{UniformBufferObject, Vertex};
pub use vulkan::renderer::{FrameStatus, VulkanRenderer};
pub use vulkan::{VulkanError, VulkanResult};
pub use window::WindowHandle;

/// Renderer construction options
///
/// Runtime options deliberately, not compile-time constants: the same binary
/// can run with validation on or off and with a different frame ring depth.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Application name reported to the driver
    pub app_name: String,
    /// Enable the Khronos validation layer and debug messenger
    pub enable_validation: bool,
    /// Number of frames the CPU may record ahead of the GPU (ring size)
    pub frames_in_flight: usize,
    /// Render pass clear color (RGBA)
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "Model Viewer".to_string(),
            enable_validation: cfg!(debug_assertions),
            frames_in_flight: 2,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}
