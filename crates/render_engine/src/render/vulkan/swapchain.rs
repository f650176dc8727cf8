//! Swapchain lifecycle
//!
//! The chain's image count, format and extent are fixed for its lifetime; a
//! resize replaces the whole object after the device idles. Framebuffer
//! creation is a separate explicit step because the render pass depends on
//! the chosen surface format, which is only known after the chain exists —
//! the caller sequences the two.

use ash::vk;

use crate::render::vulkan::device::Device;
use crate::render::vulkan::surface::WindowSurface;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Surface capabilities, formats and present modes for an adapter
pub struct SupportDetails {
    /// Surface capability limits
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Available surface formats
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Available present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SupportDetails {
    /// Query swapchain support for an adapter/surface pair
    pub fn query(
        surface: &WindowSurface,
        physical_device: vk::PhysicalDevice,
    ) -> VulkanResult<Self> {
        unsafe {
            let capabilities = surface
                .loader()
                .get_physical_device_surface_capabilities(physical_device, surface.handle())
                .map_err(VulkanError::Api)?;
            let formats = surface
                .loader()
                .get_physical_device_surface_formats(physical_device, surface.handle())
                .map_err(VulkanError::Api)?;
            let present_modes = surface
                .loader()
                .get_physical_device_surface_present_modes(physical_device, surface.handle())
                .map_err(VulkanError::Api)?;

            Ok(Self {
                capabilities,
                formats,
                present_modes,
            })
        }
    }

    /// Whether a swapchain can be built at all
    pub fn adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Pick a surface format, preferring sRGB BGRA8
pub(crate) fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
) -> VulkanResult<vk::SurfaceFormatKHR> {
    if available.is_empty() {
        return Err(VulkanError::InitializationFailed(
            "no available surface formats".to_string(),
        ));
    }

    for format in available {
        if format.format == vk::Format::B8G8R8A8_SRGB
            && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        {
            return Ok(*format);
        }
    }

    Ok(available[0])
}

/// Resolve the chain extent from the surface bounds and window size
///
/// Surfaces that report a fixed current extent dictate it verbatim;
/// otherwise the window's pixel size is clamped into the surface's bounds.
pub(crate) fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: window_extent.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: window_extent.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One image beyond the minimum, bounded by the maximum when it is finite
///
/// The extra image lets the driver hand out a new target while the previous
/// frame is still being presented, reducing acquire stalls.
pub(crate) fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count = count.min(capabilities.max_image_count);
    }
    count
}

/// Result of an image acquisition attempt
pub enum AcquireResult {
    /// An image is ready for rendering
    Ready {
        /// Index of the acquired chain image
        index: u32,
        /// The surface no longer matches exactly but presenting still works
        suboptimal: bool,
    },
    /// The surface changed; the frame must be abandoned and the chain rebuilt
    OutOfDate,
}

/// Owned swapchain with per-image views and framebuffers
///
/// The image handles themselves are borrowed from the presentation engine
/// and are not destroyed here.
pub struct Swapchain {
    device: ash::Device,
    loader: ash::extensions::khr::Swapchain,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Build a swapchain for the current window size
    pub fn new(
        device: &Device,
        surface: &WindowSurface,
        window_extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        Self::build(device, surface, window_extent, vk::SwapchainKHR::null())
    }

    /// Build a replacement chain, handing the driver the old one
    pub fn new_with_old(
        device: &Device,
        surface: &WindowSurface,
        window_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        Self::build(device, surface, window_extent, old_swapchain)
    }

    fn build(
        device: &Device,
        surface: &WindowSurface,
        window_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let support = SupportDetails::query(surface, device.adapter().physical_device)?;
        let surface_format = choose_surface_format(&support.formats)?;
        let extent = choose_extent(&support.capabilities, window_extent);
        let image_count = choose_image_count(&support.capabilities);

        let families = device.families();
        let family_indices = [
            families.graphics.expect("device construction checked families"),
            families.present.expect("device construction checked families"),
        ];

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true)
            .old_swapchain(old_swapchain);

        // with distinct queue families the images are shared across both;
        // the shared-family case keeps exclusive ownership
        create_info = if families.shared() {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let loader = device.swapchain_loader().clone();
        let swapchain = unsafe {
            loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let images = unsafe {
            loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };

        let raw = device.raw();
        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe {
                raw.create_image_view(&view_info, None)
                    .map_err(VulkanError::Api)?
            };
            image_views.push(view);
        }

        log::debug!(
            "Swapchain created: {} images, {:?}, {}x{}",
            images.len(),
            surface_format.format,
            extent.width,
            extent.height
        );

        Ok(Self {
            device: raw,
            loader,
            swapchain,
            images,
            image_views,
            framebuffers: Vec::new(),
            format: surface_format.format,
            extent,
        })
    }

    /// Build one framebuffer per chain image for a render pass
    ///
    /// Separate from construction because the render pass is built from the
    /// chain's chosen format.
    pub fn initialize_framebuffers(&mut self, render_pass: vk::RenderPass) -> VulkanResult<()> {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe {
                self.device.destroy_framebuffer(framebuffer, None);
            }
        }

        for &view in &self.image_views {
            let attachments = [view];
            let create_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);

            let framebuffer = unsafe {
                self.device
                    .create_framebuffer(&create_info, None)
                    .map_err(VulkanError::Api)?
            };
            self.framebuffers.push(framebuffer);
        }

        Ok(())
    }

    /// Request the next presentable image, signaling `semaphore` when ready
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> VulkanResult<AcquireResult> {
        let result = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        };

        match result {
            Ok((index, suboptimal)) => Ok(AcquireResult::Ready { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireResult::OutOfDate),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// The raw swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// The swapchain extension loader
    pub fn loader(&self) -> &ash::extensions::khr::Swapchain {
        &self.loader
    }

    /// Chosen image format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Chosen extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Width-over-height of the chain extent
    pub fn aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height.max(1) as f32
    }

    /// Number of images in the chain
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether the chain holds no images (never true for a built chain)
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Framebuffer for a chain image
    pub fn framebuffer(&self, image_index: usize) -> vk::Framebuffer {
        self.framebuffers[image_index]
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.destroy_framebuffer(framebuffer, None);
            }
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(
        current: (u32, u32),
        min: (u32, u32),
        max: (u32, u32),
        min_images: u32,
        max_images: u32,
    ) -> vk::SurfaceCapabilitiesKHR {
        let mut caps = vk::SurfaceCapabilitiesKHR::default();
        caps.current_extent = vk::Extent2D {
            width: current.0,
            height: current.1,
        };
        caps.min_image_extent = vk::Extent2D {
            width: min.0,
            height: min.1,
        };
        caps.max_image_extent = vk::Extent2D {
            width: max.0,
            height: max.1,
        };
        caps.min_image_count = min_images;
        caps.max_image_count = max_images;
        caps
    }

    #[test]
    fn oversized_window_clamps_to_surface_maximum() {
        let caps = capabilities((u32::MAX, u32::MAX), (1, 1), (4096, 4096), 2, 8);
        let extent = choose_extent(
            &caps,
            vk::Extent2D {
                width: 8000,
                height: 8000,
            },
        );
        assert_eq!(extent.width, 4096);
        assert_eq!(extent.height, 4096);
    }

    #[test]
    fn undersized_window_clamps_to_surface_minimum() {
        let caps = capabilities((u32::MAX, u32::MAX), (16, 16), (4096, 4096), 2, 8);
        let extent = choose_extent(
            &caps,
            vk::Extent2D {
                width: 2,
                height: 2,
            },
        );
        assert_eq!(extent.width, 16);
        assert_eq!(extent.height, 16);
    }

    #[test]
    fn fixed_current_extent_overrides_window_size() {
        let caps = capabilities((1280, 720), (1, 1), (4096, 4096), 2, 8);
        let extent = choose_extent(
            &caps,
            vk::Extent2D {
                width: 8000,
                height: 8000,
            },
        );
        // the surface dictates its extent; the request is ignored entirely
        assert_eq!(extent.width, 1280);
        assert_eq!(extent.height, 720);
    }

    #[test]
    fn image_count_is_min_plus_one_bounded_by_max() {
        let caps = capabilities((0, 0), (1, 1), (1, 1), 2, 8);
        assert_eq!(choose_image_count(&caps), 3);

        let tight = capabilities((0, 0), (1, 1), (1, 1), 3, 3);
        assert_eq!(choose_image_count(&tight), 3);

        // zero max means unbounded
        let unbounded = capabilities((0, 0), (1, 1), (1, 1), 4, 0);
        assert_eq!(choose_image_count(&unbounded), 5);
    }

    #[test]
    fn preferred_surface_format_wins_when_present() {
        let preferred = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let other = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };

        let chosen = choose_surface_format(&[other, preferred]).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);

        let fallback = choose_surface_format(&[other]).unwrap();
        assert_eq!(fallback.format, vk::Format::R8G8B8A8_UNORM);

        assert!(choose_surface_format(&[]).is_err());
    }
}
