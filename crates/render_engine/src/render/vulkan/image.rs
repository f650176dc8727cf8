//! GPU image ownership, the layout state machine and mipmap generation
//!
//! An image's `layout` field is the single source of truth and is mutated
//! only by the transition operation. Only the transitions this pipeline
//! actually performs are supported — the table is a fixed match, and adding
//! a transition means adding a case, not generalizing a rule engine.

use ash::vk;

use crate::render::vulkan::buffer::Buffer;
use crate::render::vulkan::device::{record_one_time, Device};
use crate::render::vulkan::memory;
use crate::render::vulkan::{BufferRequirements, VulkanError, VulkanResult};

/// Bytes per pixel for all uploaded images (RGBA8)
pub const BYTES_PER_PIXEL: vk::DeviceSize = 4;

/// Number of mip levels for a base extent: `floor(log2(max(w, h))) + 1`
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    u32::BITS - largest.leading_zeros()
}

/// Halve a blit extent, flooring at one texel
fn half_extent(value: i32) -> i32 {
    (value / 2).max(1)
}

/// Pipeline stages and access masks for a supported layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TransitionMasks {
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

/// The fixed table of supported layout transitions
///
/// Everything else is `UnsupportedTransition`: images move from undefined
/// into transfer-destination for upload, through transfer-source while the
/// mip chain is generated, and finally into shader-read-only for sampling.
pub(crate) fn transition_masks(
    from: vk::ImageLayout,
    to: vk::ImageLayout,
) -> VulkanResult<TransitionMasks> {
    use vk::ImageLayout as Layout;

    match (from, to) {
        (Layout::UNDEFINED, Layout::TRANSFER_DST_OPTIMAL) => Ok(TransitionMasks {
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
        }),
        (Layout::TRANSFER_DST_OPTIMAL, Layout::TRANSFER_SRC_OPTIMAL) => Ok(TransitionMasks {
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::TRANSFER_READ,
        }),
        (Layout::TRANSFER_DST_OPTIMAL, Layout::SHADER_READ_ONLY_OPTIMAL) => Ok(TransitionMasks {
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
        }),
        (Layout::TRANSFER_SRC_OPTIMAL, Layout::SHADER_READ_ONLY_OPTIMAL) => Ok(TransitionMasks {
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            src_access: vk::AccessFlags::TRANSFER_READ,
            dst_access: vk::AccessFlags::SHADER_READ,
        }),
        _ => Err(VulkanError::UnsupportedTransition { from, to }),
    }
}

/// Creation parameters for an image
#[derive(Debug, Clone, Copy)]
pub struct ImageParameters {
    /// Memory property flags for the backing allocation
    pub memory_properties: vk::MemoryPropertyFlags,
    /// Image usage flags
    pub usage: vk::ImageUsageFlags,
    /// Image tiling
    pub tiling: vk::ImageTiling,
    /// Texel format
    pub format: vk::Format,
    /// Aspect covered by the image view and barriers
    pub aspect: vk::ImageAspectFlags,
    /// Generate a full mip chain on upload
    pub mipmapped: bool,
}

impl ImageParameters {
    /// Parameters for a sampled, mipmapped texture
    ///
    /// Transfer-source usage is required because the mip chain is generated
    /// by blitting each level from the previous one.
    pub fn texture() -> Self {
        Self {
            memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            usage: vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::TRANSFER_SRC,
            tiling: vk::ImageTiling::OPTIMAL,
            format: vk::Format::R8G8B8A8_SRGB,
            aspect: vk::ImageAspectFlags::COLOR,
            mipmapped: true,
        }
    }
}

/// Owned Vulkan image with memory, view and tracked layout
pub struct Image {
    device: ash::Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    layout: vk::ImageLayout,
    format: vk::Format,
    tiling: vk::ImageTiling,
    aspect: vk::ImageAspectFlags,
    extent: vk::Extent3D,
    mip_levels: u32,
}

impl Image {
    /// Create an image and allocate, bind and view its memory
    pub fn new(
        device: &Device,
        width: u32,
        height: u32,
        parameters: &ImageParameters,
    ) -> VulkanResult<Self> {
        if width == 0 || height == 0 {
            return Err(VulkanError::InvalidRequirements("image extent must be nonzero"));
        }
        if parameters.mipmapped && !parameters.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC) {
            return Err(VulkanError::InvalidRequirements(
                "mipmapped images need transfer-source usage for blits",
            ));
        }

        let raw = device.raw();
        let extent = vk::Extent3D {
            width,
            height,
            depth: 1,
        };
        let mip_levels = if parameters.mipmapped {
            mip_level_count(width, height)
        } else {
            1
        };

        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(extent)
            .mip_levels(mip_levels)
            .array_layers(1)
            .format(parameters.format)
            .tiling(parameters.tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(parameters.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            raw.create_image(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let memory_requirements = unsafe { raw.get_image_memory_requirements(image) };
        let allocate_info = memory::allocation_info(
            device.memory_properties(),
            &memory_requirements,
            parameters.memory_properties,
        )?;

        let memory = unsafe {
            raw.allocate_memory(&allocate_info, None)
                .map_err(VulkanError::Api)?
        };

        unsafe {
            raw.bind_image_memory(image, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        // the view can only be created once memory is bound
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(parameters.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: parameters.aspect,
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe {
            raw.create_image_view(&view_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device: raw,
            image,
            memory,
            view,
            layout: vk::ImageLayout::UNDEFINED,
            format: parameters.format,
            tiling: parameters.tiling,
            aspect: parameters.aspect,
            extent,
            mip_levels,
        })
    }

    /// Upload pixels into a new image, ending shader-read-only
    ///
    /// The complete startup path: staging buffer, transfer-destination
    /// transition, copy, mip chain when requested, and the final transition
    /// into the sampled layout. The one-time submission blocks, so the
    /// staging buffer is safely dropped on return.
    pub fn from_pixels(
        device: &Device,
        width: u32,
        height: u32,
        pixels: &[u8],
        parameters: &ImageParameters,
    ) -> VulkanResult<Self> {
        let expected = BYTES_PER_PIXEL * vk::DeviceSize::from(width) * vk::DeviceSize::from(height);
        if pixels.len() as vk::DeviceSize != expected {
            return Err(VulkanError::SizeMismatch {
                expected,
                actual: pixels.len() as vk::DeviceSize,
            });
        }

        let mut staging = Buffer::new(device, &BufferRequirements::staging(expected)?)?;
        staging.fill(pixels)?;

        let mut image = Image::new(device, width, height, parameters)?;

        record_one_time(device, |command_buffer| {
            image.transition_layout(command_buffer, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;
            image.fill(command_buffer, &staging)?;
            if image.mip_levels > 1 {
                image.generate_mipmaps(device, command_buffer)?;
            }
            // mip generation leaves the chain transfer-source; either way one
            // explicit transition remains before the image can be sampled
            image.transition_layout(command_buffer, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        })?;

        Ok(image)
    }

    /// Record a layout transition for every mip level
    pub fn transition_layout(
        &mut self,
        command_buffer: vk::CommandBuffer,
        new_layout: vk::ImageLayout,
    ) -> VulkanResult<()> {
        let masks = transition_masks(self.layout, new_layout)?;
        self.record_barrier(command_buffer, 0, self.mip_levels, self.layout, new_layout, masks);
        self.layout = new_layout;
        Ok(())
    }

    /// Record a transition barrier for a single mip level
    fn level_transition(
        &self,
        command_buffer: vk::CommandBuffer,
        level: u32,
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    ) -> VulkanResult<()> {
        let masks = transition_masks(from, to)?;
        self.record_barrier(command_buffer, level, 1, from, to, masks);
        Ok(())
    }

    fn record_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        base_mip_level: u32,
        level_count: u32,
        from: vk::ImageLayout,
        to: vk::ImageLayout,
        masks: TransitionMasks,
    ) {
        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(from)
            .new_layout(to)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: self.aspect,
                base_mip_level,
                level_count,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access);

        unsafe {
            self.device.cmd_pipeline_barrier(
                command_buffer,
                masks.src_stage,
                masks.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier.build()],
            );
        }
    }

    /// Record a buffer-to-image copy into mip level zero
    ///
    /// The source must hold exactly `4 * width * height` bytes, and the
    /// image must already be in the transfer-destination layout — calling
    /// out of sequence is a caller bug, not a runtime condition.
    pub fn fill(&self, command_buffer: vk::CommandBuffer, source: &Buffer) -> VulkanResult<()> {
        let expected =
            BYTES_PER_PIXEL * vk::DeviceSize::from(self.extent.width) * vk::DeviceSize::from(self.extent.height);
        if source.size() != expected {
            return Err(VulkanError::SizeMismatch {
                expected,
                actual: source.size(),
            });
        }
        debug_assert_eq!(
            self.layout,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            "fill requires a transfer-destination layout"
        );

        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: self.aspect,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(self.extent);

        unsafe {
            self.device.cmd_copy_buffer_to_image(
                command_buffer,
                source.handle(),
                self.image,
                self.layout,
                &[region.build()],
            );
        }

        Ok(())
    }

    /// Record mip chain generation by repeated half-size blits
    ///
    /// Each level is blitted from the previous one after that level moves to
    /// transfer-source; the last written level is moved there too, so the
    /// whole chain ends in `TRANSFER_SRC_OPTIMAL`. The image is not yet
    /// sampleable — one further transition is required.
    pub fn generate_mipmaps(
        &mut self,
        device: &Device,
        command_buffer: vk::CommandBuffer,
    ) -> VulkanResult<()> {
        if !device.supports_linear_filter(self.format, self.tiling) {
            return Err(VulkanError::UnsupportedFilterForMipmap(self.format));
        }
        debug_assert_eq!(
            self.layout,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            "mip generation starts from a freshly filled transfer destination"
        );

        let mut mip_width = self.extent.width as i32;
        let mut mip_height = self.extent.height as i32;

        for level in 1..self.mip_levels {
            self.level_transition(
                command_buffer,
                level - 1,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            )?;

            let next_width = half_extent(mip_width);
            let next_height = half_extent(mip_height);

            let blit = vk::ImageBlit::builder()
                .src_offsets([
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D {
                        x: mip_width,
                        y: mip_height,
                        z: 1,
                    },
                ])
                .src_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: self.aspect,
                    mip_level: level - 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .dst_offsets([
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D {
                        x: next_width,
                        y: next_height,
                        z: 1,
                    },
                ])
                .dst_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: self.aspect,
                    mip_level: level,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            unsafe {
                self.device.cmd_blit_image(
                    command_buffer,
                    self.image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    self.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit.build()],
                    vk::Filter::LINEAR,
                );
            }

            mip_width = next_width;
            mip_height = next_height;
        }

        // the last written level never became a blit source; move it so the
        // whole chain shares one layout
        self.level_transition(
            command_buffer,
            self.mip_levels - 1,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )?;
        self.layout = vk::ImageLayout::TRANSFER_SRC_OPTIMAL;

        Ok(())
    }

    /// The image view covering all mip levels
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Current layout as tracked by the transition operation
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    /// Texel format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Number of mip levels
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_count_matches_log2_of_largest_side() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(512, 512), 10);
        assert_eq!(mip_level_count(300, 200), 9);
        assert_eq!(mip_level_count(1024, 1), 11);
        assert_eq!(mip_level_count(1, 1024), 11);
    }

    #[test]
    fn halving_floors_at_one_texel() {
        assert_eq!(half_extent(300), 150);
        assert_eq!(half_extent(3), 1);
        assert_eq!(half_extent(2), 1);
        assert_eq!(half_extent(1), 1);
    }

    #[test]
    fn halving_chain_length_matches_mip_count() {
        for (width, height) in [(1u32, 1u32), (512, 512), (300, 200), (640, 480)] {
            let mut w = width as i32;
            let mut h = height as i32;
            let mut levels = 1;
            while w > 1 || h > 1 {
                w = half_extent(w);
                h = half_extent(h);
                levels += 1;
            }
            assert_eq!(
                levels,
                mip_level_count(width, height),
                "chain for {}x{}",
                width,
                height
            );
        }
    }

    #[test]
    fn only_enumerated_transitions_are_supported() {
        use vk::ImageLayout as Layout;

        let supported = [
            (Layout::UNDEFINED, Layout::TRANSFER_DST_OPTIMAL),
            (Layout::TRANSFER_DST_OPTIMAL, Layout::TRANSFER_SRC_OPTIMAL),
            (Layout::TRANSFER_DST_OPTIMAL, Layout::SHADER_READ_ONLY_OPTIMAL),
            (Layout::TRANSFER_SRC_OPTIMAL, Layout::SHADER_READ_ONLY_OPTIMAL),
        ];
        for (from, to) in supported {
            assert!(
                transition_masks(from, to).is_ok(),
                "{:?} -> {:?} should be supported",
                from,
                to
            );
        }

        let rejected = [
            (Layout::UNDEFINED, Layout::SHADER_READ_ONLY_OPTIMAL),
            (Layout::UNDEFINED, Layout::TRANSFER_SRC_OPTIMAL),
            (Layout::SHADER_READ_ONLY_OPTIMAL, Layout::TRANSFER_DST_OPTIMAL),
            (Layout::TRANSFER_SRC_OPTIMAL, Layout::TRANSFER_DST_OPTIMAL),
            (Layout::UNDEFINED, Layout::PRESENT_SRC_KHR),
        ];
        for (from, to) in rejected {
            match transition_masks(from, to) {
                Err(VulkanError::UnsupportedTransition { from: f, to: t }) => {
                    assert_eq!((f, t), (from, to));
                }
                other => panic!(
                    "{:?} -> {:?} should be rejected, got {:?}",
                    from,
                    to,
                    other.map(|_| ())
                ),
            }
        }
    }

    #[test]
    fn upload_transition_writes_before_transfer_reads() {
        let masks = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags::empty());
        assert_eq!(masks.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(masks.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);

        let masks = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )
        .unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(masks.dst_access, vk::AccessFlags::TRANSFER_READ);
    }

    #[test]
    fn final_mip_transition_reaches_fragment_sampling() {
        // after mip generation the chain sits in transfer-source; the last
        // transition before sampling must order transfer reads against
        // fragment shader reads
        let masks = transition_masks(
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags::TRANSFER_READ);
        assert_eq!(masks.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }
}
