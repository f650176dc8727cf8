//! Vulkan resource and synchronization layer
//!
//! Organized leaves-first: memory-type selection, buffers, images and
//! textures at the bottom; device and swapchain lifecycle above them; the
//! per-frame synchronization protocol and the orchestrating renderer on top.

pub mod buffer;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod frame;
pub mod image;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod render_pass;
pub mod renderer;
pub mod surface;
pub mod swapchain;
pub mod texture;

pub use buffer::{Buffer, BufferRequirements};
pub use descriptor::{DescriptorPool, DescriptorSetLayout};
pub use device::{Device, QueueFamilies};
pub use error::{VulkanError, VulkanResult};
pub use frame::{FrameCursor, FrameResources};
pub use image::{Image, ImageParameters};
pub use instance::VulkanInstance;
pub use pipeline::GraphicsPipeline;
pub use render_pass::RenderPass;
pub use renderer::{FrameStatus, VulkanRenderer};
pub use surface::WindowSurface;
pub use swapchain::Swapchain;
pub use texture::Texture;
