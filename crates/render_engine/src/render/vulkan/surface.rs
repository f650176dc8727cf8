//! Window surface ownership

use ash::extensions::khr::Surface as SurfaceLoader;
use ash::vk;

use crate::render::vulkan::{VulkanError, VulkanInstance, VulkanResult};
use crate::render::window::WindowHandle;

/// Owned Vulkan surface for a window, destroyed with its loader on drop
pub struct WindowSurface {
    loader: SurfaceLoader,
    handle: vk::SurfaceKHR,
}

impl WindowSurface {
    /// Create the surface for a window
    pub fn new(instance: &VulkanInstance, window: &mut WindowHandle) -> VulkanResult<Self> {
        let loader = SurfaceLoader::new(instance.entry(), instance.instance());

        let mut handle = vk::SurfaceKHR::null();
        let result = window.create_window_surface(instance.instance().handle(), &mut handle);
        if result != vk::Result::SUCCESS {
            return Err(VulkanError::Api(result));
        }

        Ok(Self { loader, handle })
    }

    /// The surface extension loader
    pub fn loader(&self) -> &SurfaceLoader {
        &self.loader
    }

    /// The raw surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }
}

impl Drop for WindowSurface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
    }
}
