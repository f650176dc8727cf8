//! Sampled textures
//!
//! A `Texture` composes an uploaded `Image` with a sampler and exposes the
//! combined-image-sampler descriptor the fragment shader binds.

use ash::vk;

use crate::assets::ImageData;
use crate::render::vulkan::device::Device;
use crate::render::vulkan::image::{Image, ImageParameters};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Image plus sampler
pub struct Texture {
    device: ash::Device,
    image: Image,
    sampler: vk::Sampler,
}

impl Texture {
    /// Upload decoded image data and build a sampler for it
    pub fn from_image_data(device: &Device, image_data: &ImageData) -> VulkanResult<Self> {
        if image_data.channels != 4 {
            return Err(VulkanError::InvalidRequirements(
                "texture upload expects RGBA8 pixel data",
            ));
        }

        let image = Image::from_pixels(
            device,
            image_data.width,
            image_data.height,
            &image_data.data,
            &ImageParameters::texture(),
        )?;

        let sampler = Self::create_sampler(device, image.mip_levels())?;

        Ok(Self {
            device: device.raw(),
            image,
            sampler,
        })
    }

    /// Linear, repeating sampler covering the full mip chain
    ///
    /// Anisotropy is enabled only when the adapter supports it; selection
    /// preferred but did not require such adapters.
    fn create_sampler(device: &Device, mip_levels: u32) -> VulkanResult<vk::Sampler> {
        let enable_anisotropy = device.adapter().features.sampler_anisotropy == vk::TRUE;
        let max_anisotropy = if enable_anisotropy {
            device.adapter().properties.limits.max_sampler_anisotropy
        } else {
            1.0
        };

        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .mip_lod_bias(0.0)
            .anisotropy_enable(enable_anisotropy)
            .max_anisotropy(max_anisotropy)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .min_lod(0.0)
            .max_lod(mip_levels as f32)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false);

        unsafe {
            device
                .handle()
                .create_sampler(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    /// Combined-image-sampler descriptor info
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo::builder()
            .sampler(self.sampler)
            .image_view(self.image.view())
            .image_layout(self.image.layout())
            .build()
    }

    /// The underlying image
    pub fn image(&self) -> &Image {
        &self.image
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}
