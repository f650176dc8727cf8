//! GPU buffer ownership and the staged upload protocol
//!
//! A `Buffer` owns its Vulkan buffer handle and backing memory as one
//! non-duplicable resource; moves transfer ownership and there is no copy.
//! Uniform buffers stay persistently mapped because they are rewritten every
//! frame; staging buffers are filled once through a transient map and
//! dropped after the device-side copy completes.

use ash::vk;

use crate::render::vulkan::device::{record_one_time, Device};
use crate::render::vulkan::memory;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Requirements describing a buffer before it exists
///
/// Validated at construction: a `keep_mapped` request without host-visible
/// memory fails here, before any device allocation is attempted.
#[derive(Debug, Clone, Copy)]
pub struct BufferRequirements {
    /// Buffer size in bytes
    pub size: vk::DeviceSize,
    /// Memory property flags the backing allocation must satisfy
    pub properties: vk::MemoryPropertyFlags,
    /// Buffer usage flags
    pub usage: vk::BufferUsageFlags,
    /// Queue sharing mode
    pub sharing_mode: vk::SharingMode,
    /// Map immediately and keep the pointer for the buffer's lifetime
    pub keep_mapped: bool,
}

impl BufferRequirements {
    /// Validate and build a requirement set
    pub fn new(
        size: vk::DeviceSize,
        properties: vk::MemoryPropertyFlags,
        usage: vk::BufferUsageFlags,
        sharing_mode: vk::SharingMode,
        keep_mapped: bool,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::InvalidRequirements("buffer size must be nonzero"));
        }
        if keep_mapped && !properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            return Err(VulkanError::InvalidRequirements(
                "keep_mapped requires host-visible memory",
            ));
        }

        Ok(Self {
            size,
            properties,
            usage,
            sharing_mode,
            keep_mapped,
        })
    }

    /// Host-visible transfer source, filled once and discarded
    pub fn staging(size: vk::DeviceSize) -> VulkanResult<Self> {
        Self::new(
            size,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::SharingMode::EXCLUSIVE,
            false,
        )
    }

    /// Device-local vertex buffer, populated via staging copy
    pub fn vertex(size: vk::DeviceSize) -> VulkanResult<Self> {
        Self::new(
            size,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::SharingMode::EXCLUSIVE,
            false,
        )
    }

    /// Device-local index buffer, populated via staging copy
    pub fn index(size: vk::DeviceSize) -> VulkanResult<Self> {
        Self::new(
            size,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::SharingMode::EXCLUSIVE,
            false,
        )
    }

    /// Persistently mapped uniform buffer, rewritten every frame
    pub fn uniform(size: vk::DeviceSize) -> VulkanResult<Self> {
        Self::new(
            size,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::SharingMode::EXCLUSIVE,
            true,
        )
    }
}

/// Owned Vulkan buffer plus its backing memory
pub struct Buffer {
    device: ash::Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    mapped: Option<*mut u8>,
}

impl Buffer {
    /// Create a buffer and allocate, bind and optionally map its memory
    ///
    /// The actual allocation size comes from the device's reported memory
    /// requirements, which may exceed the requested size.
    pub fn new(device: &Device, requirements: &BufferRequirements) -> VulkanResult<Self> {
        let raw = device.raw();

        let create_info = vk::BufferCreateInfo::builder()
            .size(requirements.size)
            .usage(requirements.usage)
            .sharing_mode(requirements.sharing_mode);

        let buffer = unsafe {
            raw.create_buffer(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let memory_requirements = unsafe { raw.get_buffer_memory_requirements(buffer) };
        let allocate_info = memory::allocation_info(
            device.memory_properties(),
            &memory_requirements,
            requirements.properties,
        )?;

        let memory = unsafe {
            raw.allocate_memory(&allocate_info, None)
                .map_err(VulkanError::Api)?
        };

        unsafe {
            raw.bind_buffer_memory(buffer, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        let mapped = if requirements.keep_mapped {
            let pointer = unsafe {
                raw.map_memory(memory, 0, requirements.size, vk::MemoryMapFlags::empty())
                    .map_err(VulkanError::Api)?
            };
            Some(pointer.cast::<u8>())
        } else {
            None
        };

        Ok(Self {
            device: raw,
            buffer,
            memory,
            size: requirements.size,
            mapped,
        })
    }

    /// Write `data` into the buffer; its length must equal the declared size
    ///
    /// Persistently mapped buffers are written through the held pointer;
    /// otherwise the memory is mapped, copied into and unmapped as one
    /// sequence.
    pub fn fill(&mut self, data: &[u8]) -> VulkanResult<()> {
        check_matching_sizes(self.size, data.len() as vk::DeviceSize)?;

        if let Some(pointer) = self.mapped {
            unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), pointer, data.len());
            }
            return Ok(());
        }

        unsafe {
            let pointer = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?
                .cast::<u8>();
            std::ptr::copy_nonoverlapping(data.as_ptr(), pointer, data.len());
            self.device.unmap_memory(self.memory);
        }

        Ok(())
    }

    /// Record a device-side copy between two equally-sized buffers
    ///
    /// The caller owns submission and must keep both buffers alive until the
    /// copy has executed on the GPU.
    pub fn copy(
        source: &Buffer,
        destination: &Buffer,
        command_buffer: vk::CommandBuffer,
    ) -> VulkanResult<()> {
        check_matching_sizes(destination.size, source.size)?;

        let region = vk::BufferCopy::builder()
            .src_offset(0)
            .dst_offset(0)
            .size(source.size)
            .build();

        unsafe {
            source
                .device
                .cmd_copy_buffer(command_buffer, source.buffer, destination.buffer, &[region]);
        }

        Ok(())
    }

    /// Upload host data into a device-local buffer via a staging buffer
    ///
    /// Device-local memory is typically not host-writable, so the bytes go
    /// through a host-visible staging buffer and a recorded copy. The
    /// one-time submission blocks until the GPU finishes, which is what makes
    /// dropping the staging buffer on return safe.
    pub fn upload(
        device: &Device,
        data: &[u8],
        requirements: &BufferRequirements,
    ) -> VulkanResult<Self> {
        let mut staging = Buffer::new(device, &BufferRequirements::staging(requirements.size)?)?;
        staging.fill(data)?;

        let destination = Buffer::new(device, requirements)?;

        record_one_time(device, |command_buffer| {
            Buffer::copy(&staging, &destination, command_buffer)
        })?;

        Ok(destination)
    }

    /// The raw buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Declared size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Descriptor info covering the whole buffer
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::builder()
            .buffer(self.buffer)
            .offset(0)
            .range(self.size)
            .build()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            // unmap before freeing the memory it points into
            if self.mapped.take().is_some() {
                self.device.unmap_memory(self.memory);
            }
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Require two byte sizes to match exactly
fn check_matching_sizes(expected: vk::DeviceSize, actual: vk::DeviceSize) -> VulkanResult<()> {
    if expected != actual {
        return Err(VulkanError::SizeMismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_mapped_requires_host_visible_memory() {
        // must fail before any device call is possible
        let result = BufferRequirements::new(
            64,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::SharingMode::EXCLUSIVE,
            true,
        );
        assert!(matches!(result, Err(VulkanError::InvalidRequirements(_))));

        let ok = BufferRequirements::new(
            64,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::SharingMode::EXCLUSIVE,
            true,
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn zero_sized_buffers_are_rejected() {
        let result = BufferRequirements::staging(0);
        assert!(matches!(result, Err(VulkanError::InvalidRequirements(_))));
    }

    #[test]
    fn named_requirements_have_expected_shapes() {
        let staging = BufferRequirements::staging(128).unwrap();
        assert!(staging.properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
        assert!(staging.usage.contains(vk::BufferUsageFlags::TRANSFER_SRC));
        assert!(!staging.keep_mapped);

        let vertex = BufferRequirements::vertex(128).unwrap();
        assert!(vertex.properties.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL));
        assert!(vertex.usage.contains(vk::BufferUsageFlags::TRANSFER_DST));

        let uniform = BufferRequirements::uniform(128).unwrap();
        assert!(uniform.keep_mapped, "uniform buffers stay mapped for per-frame writes");
    }

    #[test]
    fn size_check_rejects_every_mismatch() {
        assert!(check_matching_sizes(16, 16).is_ok());

        for (expected, actual) in [(0, 7), (7, 0), (16, 15), (15, 16)] {
            match check_matching_sizes(expected, actual) {
                Err(VulkanError::SizeMismatch {
                    expected: e,
                    actual: a,
                }) => {
                    assert_eq!((e, a), (expected, actual));
                }
                other => panic!("expected SizeMismatch, got {:?}", other),
            }
        }
    }
}
