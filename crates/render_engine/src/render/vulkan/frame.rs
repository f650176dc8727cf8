//! Per-frame resources and the frame synchronization protocol
//!
//! Each in-flight frame owns a command buffer, a persistently mapped uniform
//! buffer, a descriptor set and three synchronization primitives. A slot is
//! never reused until its fence has signaled — that fence wait is the only
//! CPU suspension point in the steady-state loop and is what stops the CPU
//! from overwriting a command buffer the GPU is still consuming.

use ash::vk;

use crate::render::primitives::UniformBufferObject;
use crate::render::vulkan::buffer::{Buffer, BufferRequirements};
use crate::render::vulkan::descriptor::{DescriptorPool, DescriptorSetLayout};
use crate::render::vulkan::device::Device;
use crate::render::vulkan::swapchain::Swapchain;
use crate::render::vulkan::texture::Texture;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// GPU-GPU ordering primitive with RAII cleanup
pub struct Semaphore {
    device: ash::Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create an unsignaled binary semaphore
    pub fn new(device: ash::Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self { device, semaphore })
    }

    /// The raw semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// CPU-observable, GPU-signaled completion flag with RAII cleanup
pub struct Fence {
    device: ash::Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a fence, optionally already signaled
    ///
    /// Frame fences start signaled so the first wait on a never-submitted
    /// slot returns immediately.
    pub fn new(device: ash::Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe {
            device
                .create_fence(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self { device, fence })
    }

    /// Block until the fence signals
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, timeout)
                .map_err(VulkanError::Api)
        }
    }

    /// Reset the fence to unsignaled
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_fences(&[self.fence])
                .map_err(VulkanError::Api)
        }
    }

    /// The raw fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Round-robin index over the frame ring
///
/// The ring size is a construction parameter rather than a constant so the
/// in-flight depth can be tuned without recompiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCursor {
    index: usize,
    count: usize,
}

impl FrameCursor {
    /// Create a cursor over `count` frame slots
    pub fn new(count: usize) -> VulkanResult<Self> {
        if count == 0 {
            return Err(VulkanError::InvalidRequirements(
                "at least one frame in flight is required",
            ));
        }
        Ok(Self { index: 0, count })
    }

    /// Current slot index
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of slots in the ring
    pub fn count(&self) -> usize {
        self.count
    }

    /// Move to the next slot, wrapping at the ring size
    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.count;
    }
}

/// Outcome of a presentation attempt
pub enum PresentOutcome {
    /// The image was queued for presentation
    Presented {
        /// The surface no longer matches exactly; a rebuild will follow
        suboptimal: bool,
    },
    /// The surface changed under us; the frame is abandoned
    OutOfDate,
}

/// Resources owned by one in-flight frame slot
pub struct FrameResources {
    device: ash::Device,
    command_buffer: vk::CommandBuffer,
    uniform_buffer: Buffer,
    descriptor_set: vk::DescriptorSet,
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
}

impl FrameResources {
    /// Build one frame slot: command buffer, mapped uniform buffer,
    /// descriptor set and synchronization primitives
    pub fn new(
        device: &Device,
        descriptor_pool: &DescriptorPool,
        descriptor_layout: &DescriptorSetLayout,
        texture: &Texture,
    ) -> VulkanResult<Self> {
        let raw = device.raw();

        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(device.command_pool())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe {
            raw.allocate_command_buffers(&allocate_info)
                .map_err(VulkanError::Api)?[0]
        };

        let uniform_size = std::mem::size_of::<UniformBufferObject>() as vk::DeviceSize;
        let uniform_buffer = Buffer::new(device, &BufferRequirements::uniform(uniform_size)?)?;

        let descriptor_set = descriptor_pool.allocate(descriptor_layout)?;
        Self::write_descriptors(&raw, descriptor_set, &uniform_buffer, texture);

        let image_available = Semaphore::new(raw.clone())?;
        let render_finished = Semaphore::new(raw.clone())?;
        let in_flight = Fence::new(raw.clone(), true)?;

        Ok(Self {
            device: raw,
            command_buffer,
            uniform_buffer,
            descriptor_set,
            image_available,
            render_finished,
            in_flight,
        })
    }

    fn write_descriptors(
        device: &ash::Device,
        descriptor_set: vk::DescriptorSet,
        uniform_buffer: &Buffer,
        texture: &Texture,
    ) {
        let buffer_infos = [uniform_buffer.descriptor_info()];
        let image_infos = [texture.descriptor_info()];

        let writes = [
            vk::WriteDescriptorSet::builder()
                .dst_set(descriptor_set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_infos)
                .build(),
            vk::WriteDescriptorSet::builder()
                .dst_set(descriptor_set)
                .dst_binding(1)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&image_infos)
                .build(),
        ];

        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }
    }

    /// Block until the GPU finishes this slot's previous submission
    ///
    /// No timeout bound: a wait that fails is a driver-level failure, not
    /// something to retry.
    pub fn wait_until_ready(&self) -> VulkanResult<()> {
        self.in_flight.wait(u64::MAX)
    }

    /// Reset the fence and command buffer for re-recording
    ///
    /// Only valid after `wait_until_ready` has proven the GPU is done with
    /// both.
    pub fn reset(&self) -> VulkanResult<()> {
        self.in_flight.reset()?;
        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)
        }
    }

    /// Write this frame's uniform data through the persistent mapping
    pub fn write_uniform(&mut self, ubo: &UniformBufferObject) -> VulkanResult<()> {
        self.uniform_buffer.fill(bytemuck::bytes_of(ubo))
    }

    /// Submit the recorded command buffer to the graphics queue
    ///
    /// Waits on image-available at the color-attachment-output stage,
    /// signals render-finished for presentation and this slot's fence for
    /// the next CPU wait.
    pub fn submit_to(&self, graphics_queue: vk::Queue) -> VulkanResult<()> {
        let wait_semaphores = [self.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffer];
        let signal_semaphores = [self.render_finished.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .queue_submit(graphics_queue, &[submit_info.build()], self.in_flight.handle())
                .map_err(VulkanError::Api)
        }
    }

    /// Present the rendered image, waiting on render-finished
    pub fn present_to(
        &self,
        present_queue: vk::Queue,
        swapchain: &Swapchain,
        image_index: u32,
    ) -> VulkanResult<PresentOutcome> {
        let wait_semaphores = [self.render_finished.handle()];
        let swapchains = [swapchain.handle()];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            swapchain
                .loader()
                .queue_present(present_queue, &present_info)
        };

        match result {
            Ok(suboptimal) => Ok(PresentOutcome::Presented { suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// This slot's command buffer
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// This slot's descriptor set
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    /// Semaphore signaled when the acquired image becomes available
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_requires_at_least_one_slot() {
        assert!(FrameCursor::new(0).is_err());
        assert!(FrameCursor::new(1).is_ok());
    }

    #[test]
    fn cursor_round_robins_over_two_slots() {
        let mut cursor = FrameCursor::new(2).unwrap();
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(cursor.index());
            cursor.advance();
        }
        assert_eq!(seen, [0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn cursor_generalizes_to_deeper_rings() {
        let mut cursor = FrameCursor::new(3).unwrap();
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(cursor.index());
            cursor.advance();
        }
        assert_eq!(seen, [0, 1, 2, 0, 1, 2, 0]);
    }

    /// Simulates the frame loop against a GPU whose work completes three
    /// ticks after submission. The blocking fence wait must stall the CPU
    /// timeline so a slot is never re-recorded while its previous
    /// submission is still outstanding.
    #[test]
    fn slot_is_never_reused_before_its_fence_signals() {
        const SLOTS: usize = 2;
        const GPU_LATENCY: u64 = 3;

        let mut cursor = FrameCursor::new(SLOTS).unwrap();
        // tick at which each slot's outstanding work completes; fences start
        // signaled, modeled as completion at tick 0
        let mut completes_at = [0u64; SLOTS];
        let mut cpu_time = 0u64;

        for frame in 0..20u64 {
            let slot = cursor.index();

            // wait_until_ready: the CPU cannot proceed before the slot's
            // previous submission has completed
            cpu_time = cpu_time.max(completes_at[slot]);

            // reset + record + submit happen strictly after the wait
            assert!(
                completes_at[slot] <= cpu_time,
                "frame {}: slot {} re-recorded while GPU work was outstanding",
                frame,
                slot
            );

            cpu_time += 1; // recording takes time
            completes_at[slot] = cpu_time + GPU_LATENCY;

            cursor.advance();
        }

        // with two slots and a slow GPU the CPU must have been throttled to
        // GPU pace rather than racing ahead
        assert!(cpu_time >= GPU_LATENCY * (20 / SLOTS as u64 - 1));
    }
}
