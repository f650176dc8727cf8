//! Renderer orchestration
//!
//! `VulkanRenderer` owns every GPU object and drives the per-frame protocol:
//! wait on the slot fence, acquire, reset, record, submit, present, advance.
//! An out-of-date surface abandons the current frame and is reported as a
//! status, not an error; the caller triggers the swapchain rebuild from its
//! resize notification.

use ash::vk;

use crate::assets::{ImageData, MeshData};
use crate::render::primitives::UniformBufferObject;
use crate::render::vulkan::buffer::{Buffer, BufferRequirements};
use crate::render::vulkan::descriptor::{DescriptorPool, DescriptorSetLayout};
use crate::render::vulkan::device::Device;
use crate::render::vulkan::frame::{FrameCursor, FrameResources, PresentOutcome};
use crate::render::vulkan::instance::VulkanInstance;
use crate::render::vulkan::pipeline::GraphicsPipeline;
use crate::render::vulkan::render_pass::RenderPass;
use crate::render::vulkan::surface::WindowSurface;
use crate::render::vulkan::swapchain::{AcquireResult, Swapchain};
use crate::render::vulkan::texture::Texture;
use crate::render::vulkan::{VulkanError, VulkanResult};
use crate::render::window::WindowHandle;
use crate::render::RendererConfig;

/// Outcome of a `draw_frame` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was rendered and queued for presentation
    Presented,
    /// The surface was out of date; the frame was abandoned without error
    SkippedOutOfDate,
}

/// GPU-resident model geometry and texture
struct ModelResources {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
    texture: Texture,
}

/// Owns the device, swapchain, pipeline and frame ring, and submits frames
pub struct VulkanRenderer {
    // declaration order is drop order: frames and resources release before
    // the swapchain and device, the surface before the instance
    frames: Vec<FrameResources>,
    model: ModelResources,
    pipeline: GraphicsPipeline,
    descriptor_pool: DescriptorPool,
    descriptor_layout: DescriptorSetLayout,
    render_pass: RenderPass,
    swapchain: Swapchain,
    device: Device,
    surface: WindowSurface,
    instance: VulkanInstance,
    cursor: FrameCursor,
    clear_color: [f32; 4],
}

impl VulkanRenderer {
    /// Build the full renderer: device, uploaded model, swapchain, pipeline
    /// and the frame ring
    pub fn new(
        window: &mut WindowHandle,
        config: &RendererConfig,
        mesh: &MeshData,
        image: &ImageData,
        vertex_spirv: &[u8],
        fragment_spirv: &[u8],
    ) -> VulkanResult<Self> {
        log::debug!("Creating VulkanRenderer...");

        let cursor = FrameCursor::new(config.frames_in_flight)?;

        let instance = VulkanInstance::new(window, &config.app_name, config.enable_validation)?;
        let surface = WindowSurface::new(&instance, window)?;
        let device = Device::new(&instance, &surface)?;

        let model = Self::upload_model(&device, mesh, image)?;

        let (width, height) = window.framebuffer_size();
        let window_extent = vk::Extent2D { width, height };
        let mut swapchain = Swapchain::new(&device, &surface, window_extent)?;

        let render_pass = RenderPass::new_forward(&device, swapchain.format())?;
        swapchain.initialize_framebuffers(render_pass.handle())?;

        let descriptor_layout = DescriptorSetLayout::for_model(&device)?;
        let descriptor_pool = DescriptorPool::new(&device, config.frames_in_flight as u32)?;

        let pipeline = GraphicsPipeline::new(
            &device,
            render_pass.handle(),
            &descriptor_layout,
            vertex_spirv,
            fragment_spirv,
        )?;

        let frames = (0..config.frames_in_flight)
            .map(|_| FrameResources::new(&device, &descriptor_pool, &descriptor_layout, &model.texture))
            .collect::<VulkanResult<Vec<_>>>()?;

        log::info!(
            "VulkanRenderer ready: {} frames in flight, {} swapchain images",
            frames.len(),
            swapchain.len()
        );

        Ok(Self {
            frames,
            model,
            pipeline,
            descriptor_pool,
            descriptor_layout,
            render_pass,
            swapchain,
            device,
            surface,
            instance,
            cursor,
            clear_color: config.clear_color,
        })
    }

    /// Upload geometry and texture through the staging protocol
    fn upload_model(
        device: &Device,
        mesh: &MeshData,
        image: &ImageData,
    ) -> VulkanResult<ModelResources> {
        if mesh.vertices.is_empty() || mesh.indices.is_empty() {
            return Err(VulkanError::InvalidRequirements("model has no geometry"));
        }

        let vertex_bytes: &[u8] = bytemuck::cast_slice(&mesh.vertices);
        let vertex_buffer = Buffer::upload(
            device,
            vertex_bytes,
            &BufferRequirements::vertex(vertex_bytes.len() as vk::DeviceSize)?,
        )?;

        let index_bytes: &[u8] = bytemuck::cast_slice(&mesh.indices);
        let index_buffer = Buffer::upload(
            device,
            index_bytes,
            &BufferRequirements::index(index_bytes.len() as vk::DeviceSize)?,
        )?;

        let texture = Texture::from_image_data(device, image)?;

        log::debug!(
            "Model uploaded: {} vertices, {} indices, {}x{} texture",
            mesh.vertices.len(),
            mesh.indices.len(),
            image.width,
            image.height
        );

        Ok(ModelResources {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
            texture,
        })
    }

    /// Render and present one frame with the given uniform data
    pub fn draw_frame(&mut self, ubo: &UniformBufferObject) -> VulkanResult<FrameStatus> {
        let slot = self.cursor.index();

        // gate on this slot's fence: proof the GPU finished the previous
        // submission that references this slot's resources
        self.frames[slot].wait_until_ready()?;

        let acquire = self
            .swapchain
            .acquire_next_image(self.frames[slot].image_available().handle())?;
        let image_index = match acquire {
            AcquireResult::Ready { index, .. } => index,
            AcquireResult::OutOfDate => {
                log::debug!("Swapchain out of date at acquire, skipping frame");
                return Ok(FrameStatus::SkippedOutOfDate);
            }
        };

        self.frames[slot].reset()?;
        self.frames[slot].write_uniform(ubo)?;

        let command_buffer = self.frames[slot].command_buffer();
        let descriptor_set = self.frames[slot].descriptor_set();
        self.record_commands(command_buffer, descriptor_set, image_index)?;

        self.frames[slot].submit_to(self.device.graphics_queue())?;

        match self.frames[slot].present_to(
            self.device.present_queue(),
            &self.swapchain,
            image_index,
        )? {
            PresentOutcome::Presented { suboptimal } => {
                if suboptimal {
                    log::trace!("Presented to a suboptimal swapchain");
                }
            }
            PresentOutcome::OutOfDate => {
                log::debug!("Swapchain out of date at present, skipping frame");
                return Ok(FrameStatus::SkippedOutOfDate);
            }
        }

        self.cursor.advance();
        Ok(FrameStatus::Presented)
    }

    /// Record this frame's commands into the now-empty command buffer
    fn record_commands(
        &self,
        command_buffer: vk::CommandBuffer,
        descriptor_set: vk::DescriptorSet,
        image_index: u32,
    ) -> VulkanResult<()> {
        let device = self.device.handle();
        let extent = self.swapchain.extent();

        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe {
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass.handle())
            .framebuffer(self.swapchain.framebuffer(image_index as usize))
            .render_area(render_area)
            .clear_values(&clear_values);

        unsafe {
            device.cmd_begin_render_pass(
                command_buffer,
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );

            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.handle(),
            );
            device.cmd_bind_vertex_buffers(
                command_buffer,
                0,
                &[self.model.vertex_buffer.handle()],
                &[0],
            );
            device.cmd_bind_index_buffer(
                command_buffer,
                self.model.index_buffer.handle(),
                0,
                vk::IndexType::UINT32,
            );
            device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout(),
                0,
                &[descriptor_set],
                &[],
            );

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(command_buffer, 0, &[render_area]);

            device.cmd_draw_indexed(command_buffer, self.model.index_count, 1, 0, 0, 0);

            device.cmd_end_render_pass(command_buffer);
            device
                .end_command_buffer(command_buffer)
                .map_err(VulkanError::Api)?;
        }

        Ok(())
    }

    /// Rebuild the swapchain for the window's current framebuffer size
    ///
    /// Called from the application's resize notification. A 0x0 framebuffer
    /// (minimized window) is ignored; the caller waits for events instead.
    pub fn on_resize(&mut self, window: &WindowHandle) -> VulkanResult<()> {
        let (width, height) = window.framebuffer_size();
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.rebuild_swapchain(vk::Extent2D { width, height })
    }

    /// Replace the swapchain and its framebuffers after a device idle
    ///
    /// Idling is the simple correctness strategy: once the device is idle,
    /// no in-flight frame can still reference the old chain's views or
    /// framebuffers, so dropping them is safe.
    fn rebuild_swapchain(&mut self, window_extent: vk::Extent2D) -> VulkanResult<()> {
        self.device.wait_idle()?;

        let mut replacement = Swapchain::new_with_old(
            &self.device,
            &self.surface,
            window_extent,
            self.swapchain.handle(),
        )?;
        replacement.initialize_framebuffers(self.render_pass.handle())?;

        self.swapchain = replacement;
        log::debug!(
            "Swapchain rebuilt at {}x{}",
            window_extent.width,
            window_extent.height
        );
        Ok(())
    }

    /// Width-over-height of the current swapchain extent
    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.aspect_ratio()
    }

    /// Whether validation layers are active
    pub fn validation_enabled(&self) -> bool {
        self.instance.validation_enabled()
    }

    /// Block until the device finishes all submitted work
    pub fn wait_idle(&self) {
        if let Err(e) = self.device.wait_idle() {
            log::warn!("device_wait_idle failed during shutdown: {}", e);
        }
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        // no field may be destroyed while the GPU still references it
        self.wait_idle();
    }
}
